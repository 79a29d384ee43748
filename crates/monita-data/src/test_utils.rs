//! Test doubles: a local HTTP server and an in-memory catalog

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use monita_core::{Catalog, CatalogError, CatalogResource, Dataset, DatasetResource, SearchQuery};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

const BODY_CHUNK: usize = 64 * 1024;

/// Canned response served by [`MockServer`]
#[derive(Debug, Clone)]
pub struct MockResponse {
    status: u16,
    body: Vec<u8>,
    content_type: &'static str,
    content_length: Option<u64>,
    send_length: bool,
    headers: Vec<(&'static str, String)>,
}

impl MockResponse {
    pub fn ok(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            body,
            content_type: "text/csv",
            content_length: None,
            send_length: true,
            headers: Vec::new(),
        }
    }

    pub fn json(value: serde_json::Value) -> Self {
        Self {
            content_type: "application/json",
            ..Self::ok(value.to_string().into_bytes())
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            ..Self::ok(Vec::new())
        }
    }

    /// Advertise a length other than the body's (HEAD responses)
    pub fn with_content_length(mut self, length: u64) -> Self {
        self.content_length = Some(length);
        self
    }

    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        self.headers.push((name, value.to_string()));
        self
    }

    /// Stream the body until the connection closes
    pub fn without_content_length(mut self) -> Self {
        self.send_length = false;
        self
    }

    fn head(&self) -> Vec<u8> {
        let reason = match self.status {
            200 => "OK",
            302 => "Found",
            404 => "Not Found",
            500 => "Internal Server Error",
            502 => "Bad Gateway",
            503 => "Service Unavailable",
            _ => "Status",
        };
        let mut head = format!(
            "HTTP/1.1 {} {reason}\r\nContent-Type: {}\r\nConnection: close\r\n",
            self.status, self.content_type
        );
        if self.send_length {
            let length = self.content_length.unwrap_or(self.body.len() as u64);
            head.push_str(&format!("Content-Length: {length}\r\n"));
        }
        for (name, value) in &self.headers {
            head.push_str(&format!("{name}: {value}\r\n"));
        }
        head.push_str("\r\n");
        head.into_bytes()
    }
}

/// Handle to a running test server
pub struct MockServer {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<String>>>,
    body_bytes_sent: Arc<AtomicUsize>,
}

impl MockServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Requests served so far
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// `"METHOD /path?query"` for every request, in arrival order
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    /// Body bytes the client has accepted, across all responses
    pub fn body_bytes_sent(&self) -> usize {
        self.body_bytes_sent.load(Ordering::SeqCst)
    }
}

/// Serve every request through `handler(request, index)`
pub async fn spawn_server<H>(handler: H) -> MockServer
where
    H: Fn(&str, usize) -> MockResponse + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let requests = Arc::new(Mutex::new(Vec::new()));
    let body_bytes_sent = Arc::new(AtomicUsize::new(0));
    let handler = Arc::new(handler);

    let server_hits = hits.clone();
    let server_requests = requests.clone();
    let server_sent = body_bytes_sent.clone();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let hits = server_hits.clone();
            let requests = server_requests.clone();
            let sent = server_sent.clone();
            let handler = handler.clone();

            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }

                let text = String::from_utf8_lossy(&buf);
                let request: String = text
                    .lines()
                    .next()
                    .unwrap_or_default()
                    .split_whitespace()
                    .take(2)
                    .collect::<Vec<_>>()
                    .join(" ");

                let index = hits.fetch_add(1, Ordering::SeqCst);
                requests.lock().push(request.clone());

                let response = handler(&request, index);
                if socket.write_all(&response.head()).await.is_err() {
                    return;
                }
                if !request.starts_with("HEAD ") {
                    // Small writes so a client that hangs up stops the transfer
                    for chunk in response.body.chunks(BODY_CHUNK) {
                        if socket.write_all(chunk).await.is_err() {
                            return;
                        }
                        sent.fetch_add(chunk.len(), Ordering::SeqCst);
                    }
                }
                let _ = socket.shutdown().await;
            });
        }
    });

    MockServer {
        addr,
        hits,
        requests,
        body_bytes_sent,
    }
}

/// Serve `responses` in order, repeating the last one
pub async fn spawn_sequence(responses: Vec<MockResponse>) -> MockServer {
    spawn_server(move |_, index| {
        let idx = index.min(responses.len().saturating_sub(1));
        responses[idx].clone()
    })
    .await
}

/// In-memory catalog that counts lookups
#[derive(Default)]
pub struct StaticCatalog {
    resources: Vec<CatalogResource>,
    datasets: Vec<Dataset>,
    lookups: AtomicUsize,
    failing: bool,
}

impl StaticCatalog {
    pub fn new(resources: Vec<CatalogResource>) -> Self {
        Self {
            resources,
            ..Default::default()
        }
    }

    pub fn with_datasets(mut self, datasets: Vec<Dataset>) -> Self {
        self.datasets = datasets;
        self
    }

    /// Every call fails with a transport error
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Default::default()
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Catalog for StaticCatalog {
    async fn resource_show(&self, id: &str) -> Result<Option<CatalogResource>, CatalogError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(CatalogError::Transport("connection refused".to_string()));
        }
        Ok(self.resources.iter().find(|r| r.id == id).cloned())
    }

    async fn package_search(&self, query: &SearchQuery) -> Result<Vec<Dataset>, CatalogError> {
        if self.failing {
            return Err(CatalogError::Transport("connection refused".to_string()));
        }
        Ok(self
            .datasets
            .iter()
            .filter(|d| query.format.as_deref().map_or(true, |f| d.has_resource_format(f)))
            .skip(query.start)
            .take(query.rows)
            .cloned()
            .collect())
    }

    fn catalog_name(&self) -> &str {
        "static"
    }
}

/// Catalog entry pointing at `url`
pub fn resource(id: &str, url: &str, format: &str) -> CatalogResource {
    CatalogResource {
        id: id.to_string(),
        url: url.to_string(),
        format: format.to_string(),
        name: None,
    }
}

/// Dataset with a single resource of `format`
pub fn dataset(id: &str, format: &str) -> Dataset {
    Dataset {
        id: id.to_string(),
        name: id.to_string(),
        title: None,
        notes: None,
        resources: vec![DatasetResource {
            id: format!("{id}-r1"),
            name: None,
            url: format!("https://datos.cali.gov.co/{id}.{}", format.to_ascii_lowercase()),
            format: format.to_string(),
        }],
    }
}

/// XLSX with a date column, a text column, a numeric column with one `NA`,
/// a sparse fourth column and a blank row before the last data row
pub fn sample_workbook() -> Vec<u8> {
    let mut workbook = rust_xlsxwriter::Workbook::new();
    let date_format = rust_xlsxwriter::Format::new().set_num_format("yyyy-mm-dd");
    let sheet = workbook.add_worksheet();

    sheet.write_string(0, 0, "fecha").unwrap();
    sheet.write_string(0, 1, "zona").unwrap();
    sheet.write_string(0, 2, "consumo").unwrap();

    let days = [(1, 16), (2, 17), (4, 18)];
    for (row, day) in days {
        let date = rust_xlsxwriter::ExcelDateTime::from_ymd(2023, 7, day).unwrap();
        sheet
            .write_datetime_with_format(row, 0, &date, &date_format)
            .unwrap();
    }
    sheet.write_string(1, 1, "Norte").unwrap();
    sheet.write_number(1, 2, 12.5).unwrap();
    sheet.write_string(1, 3, "x").unwrap();
    sheet.write_string(2, 1, "Sur").unwrap();
    sheet.write_string(2, 2, "NA").unwrap();
    sheet.write_string(4, 1, "Centro").unwrap();
    sheet.write_number(4, 2, 7.0).unwrap();

    workbook.save_to_buffer().unwrap()
}
