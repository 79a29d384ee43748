//! End-to-end pipeline tests against a local HTTP server

use std::collections::HashMap;
use std::sync::Arc;

use monita_core::{Catalog, CatalogError, CatalogResource, Dataset, SearchQuery};
use monita_data::{DataError, FilterQuery, ResourceService, Settings};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

const AGUA_CSV: &str = "\u{feff}zona;consumo;estrato\n\
Norte;120.5;3\n\
Sur;80;2\n\
Norte Alto;;4\n\
Centro;95;3\n\
norte;60;1\n\
Oriente;110;2\n";

/// Serves fixed bodies by path; HEAD gets the headers only
async fn serve(files: HashMap<&'static str, &'static str>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let files = files.clone();
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }
                let request = String::from_utf8_lossy(&buf).to_string();
                let mut parts = request.split_whitespace();
                let method = parts.next().unwrap_or_default().to_string();
                let path = parts.next().unwrap_or_default().to_string();

                let response = match files.get(path.as_str()) {
                    Some(body) => {
                        let mut out = format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: text/csv\r\n\
                             Content-Length: {}\r\nConnection: close\r\n\r\n",
                            body.len()
                        );
                        if method != "HEAD" {
                            out.push_str(body);
                        }
                        out
                    }
                    None => "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\
                             Connection: close\r\n\r\n"
                        .to_string(),
                };
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{addr}")
}

struct FixedCatalog {
    resources: Vec<CatalogResource>,
}

#[async_trait::async_trait]
impl Catalog for FixedCatalog {
    async fn resource_show(&self, id: &str) -> Result<Option<CatalogResource>, CatalogError> {
        Ok(self.resources.iter().find(|r| r.id == id).cloned())
    }

    async fn package_search(&self, _query: &SearchQuery) -> Result<Vec<Dataset>, CatalogError> {
        Ok(Vec::new())
    }

    fn catalog_name(&self) -> &str {
        "fixed"
    }
}

async fn service() -> ResourceService {
    let base = serve(HashMap::from([("/agua.csv", AGUA_CSV)])).await;
    let resources = vec![
        CatalogResource {
            id: "agua".to_string(),
            url: format!("{base}/agua.csv"),
            format: "CSV".to_string(),
            name: Some("Consumo de agua".to_string()),
        },
        CatalogResource {
            id: "perdido".to_string(),
            url: format!("{base}/perdido.csv"),
            format: "CSV".to_string(),
            name: None,
        },
    ];
    let settings = Settings {
        allowed_domains: vec!["127.0.0.1".to_string()],
        max_retries: 0,
        ..Settings::default()
    };
    ResourceService::new(settings, Arc::new(FixedCatalog { resources })).unwrap()
}

#[tokio::test]
async fn test_columns_detect_kinds() {
    let svc = service().await;
    let columns = svc.columns("agua").await.unwrap();
    let json = serde_json::to_value(&columns).unwrap();
    assert_eq!(
        json,
        serde_json::json!({"columns": [
            {"name": "zona", "kind": "text"},
            {"name": "consumo", "kind": "numeric"},
            {"name": "estrato", "kind": "numeric"}
        ]})
    );
}

#[tokio::test]
async fn test_filter_counts_matches_before_paging() {
    let svc = service().await;
    let query = FilterQuery {
        filters: Some(r#"{"zona": "norte"}"#.to_string()),
        sort_by: Some("consumo".to_string()),
        sort_order: Some("desc".to_string()),
        page_size: Some(2),
        page: Some(1),
    };
    let result = svc.filter("agua", &query).await.unwrap();
    assert_eq!(result.total, 3);
    assert_eq!(result.total_pages, 2);
    assert_eq!(result.rows.len(), 2);
    assert_eq!(result.rows[0]["consumo"], 120.5);
    assert_eq!(result.rows[1]["consumo"], 60.0);

    let second = svc
        .filter("agua", &FilterQuery { page: Some(2), ..query.clone() })
        .await
        .unwrap();
    assert_eq!(second.rows.len(), 1);
    assert_eq!(second.rows[0]["zona"], "Norte Alto");
    assert!(second.rows[0]["consumo"].is_null());
}

#[tokio::test]
async fn test_pages_cover_every_row_once() {
    let svc = service().await;
    let mut seen = Vec::new();
    for page in 1..=3 {
        let query = FilterQuery {
            page: Some(page),
            page_size: Some(2),
            ..Default::default()
        };
        let result = svc.filter("agua", &query).await.unwrap();
        assert_eq!(result.total, 6);
        assert_eq!(result.total_pages, 3);
        seen.extend(result.rows.into_iter().map(|r| r["zona"].clone()));
    }
    assert_eq!(seen.len(), 6);
    assert_eq!(seen[0], "Norte");
    assert_eq!(seen[5], "Oriente");
}

#[tokio::test]
async fn test_kpis_and_chart() {
    let svc = service().await;
    let kpis = svc.kpis("agua").await.unwrap().kpis;
    assert_eq!(kpis.len(), 2);
    assert_eq!(kpis[0].column, "consumo");
    assert_eq!(kpis[0].count, 5);
    assert_eq!(kpis[0].min, Some(60.0));
    assert_eq!(kpis[0].max, Some(120.5));

    let chart = svc.chart("agua", "estrato", "bar", 10).await.unwrap();
    let labels: Vec<&str> = chart.data.iter().map(|b| b.label.as_str()).collect();
    assert_eq!(labels, vec!["1", "2", "3", "4"]);

    let pie = svc.chart("agua", "zona", "pie", 10).await.unwrap();
    assert_eq!(pie.data.len(), 6);

    let missing = svc.chart("agua", "presion", "histogram", 10).await.unwrap_err();
    assert!(matches!(missing, DataError::NotFound(_)));
}

#[tokio::test]
async fn test_unreachable_resource_is_upstream_error() {
    let svc = service().await;
    let err = svc.preview("perdido", 5).await.unwrap_err();
    assert!(matches!(err, DataError::UpstreamUnavailable(_)));

    let err = svc.preview("otro", 5).await.unwrap_err();
    assert!(matches!(err, DataError::NotFound(_)));
}
