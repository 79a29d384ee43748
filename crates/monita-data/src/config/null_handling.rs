//! Null value handling for data loading

use serde::{Deserialize, Serialize};

/// Null value configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NullConfig {
    /// Patterns to treat as null
    pub patterns: Vec<String>,

    /// Whether to trim whitespace before checking
    pub trim_whitespace: bool,

    /// Case sensitive matching
    pub case_sensitive: bool,
}

impl Default for NullConfig {
    fn default() -> Self {
        Self {
            patterns: [
                "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "1.#IND",
                "1.#QNAN", "<NA>", "N/A", "NA", "NULL", "NaN", "None",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            trim_whitespace: true,
            case_sensitive: false,
        }
    }
}

impl NullConfig {
    /// Check if a value should be treated as null
    pub fn is_null(&self, value: &str) -> bool {
        let test_value = if self.trim_whitespace {
            value.trim()
        } else {
            value
        };

        self.patterns.iter().any(|pattern| {
            if self.case_sensitive {
                test_value == pattern
            } else {
                test_value.eq_ignore_ascii_case(pattern)
            }
        })
    }

    /// Map a raw cell to `None` when it matches a null pattern
    pub fn normalize(&self, value: String) -> Option<String> {
        if self.is_null(&value) {
            None
        } else {
            Some(value)
        }
    }

    /// Add a null pattern
    pub fn add_pattern(&mut self, pattern: String) {
        if !self.patterns.contains(&pattern) {
            self.patterns.push(pattern);
        }
    }
}
