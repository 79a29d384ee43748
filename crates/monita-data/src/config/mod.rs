//! Service configuration module

pub mod null_handling;
pub mod settings;

pub use null_handling::*;
pub use settings::*;
