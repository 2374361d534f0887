use crate::domain::model::Record;
use crate::domain::ports::{ConfigProvider, PartsDatabase};
use crate::utils::error::{PartsError, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use std::time::Duration;
use tokio::net::TcpStream;

pub const DEFAULT_URL: &str = "http://localhost:8113";
pub const DEFAULT_TUNNEL_PORT: u16 = 8113;
const PARTS_TABLE: &str = "mtd_cmsr.parts";
const TEC_TABLE: &str = "mtd_cmsr.c3060";

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// SQL tuple literal; a single element has no trailing comma.
fn sql_tuple(ids: &[String]) -> String {
    let items: Vec<String> = ids
        .iter()
        .map(|id| {
            if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
                id.clone()
            } else {
                quote(id)
            }
        })
        .collect();
    format!("({})", items.join(", "))
}

pub fn sql_parts_in_range(barcode_min: &str, barcode_max: &str) -> String {
    format!(
        "select s.* from {} s where s.BARCODE >= {} and s.BARCODE <= {}",
        PARTS_TABLE,
        quote(barcode_min),
        quote(barcode_max)
    )
}

pub fn sql_part_barcodes(kind_of_part: &str, locations: &[i64]) -> String {
    let query = format!(
        "select s.BARCODE from {} s where s.KIND_OF_PART = {}",
        PARTS_TABLE,
        quote(kind_of_part)
    );
    match locations {
        [] => query,
        [single] => format!("{} AND s.LOCATION_ID = {}", query, single),
        many => {
            let ids: Vec<String> = many.iter().map(|id| id.to_string()).collect();
            format!("{} AND s.LOCATION_ID IN ({})", query, ids.join(", "))
        }
    }
}

pub fn sql_daughters(parent_ids: &[String]) -> String {
    format!(
        "select s.* from {} s where s.PART_PARENT_ID in {}",
        PARTS_TABLE,
        sql_tuple(parent_ids)
    )
}

pub fn sql_tec_resistances(barcode_min: &str, barcode_max: &str) -> String {
    format!(
        "select s.part_barcode,s.rac from {} s where s.part_barcode >= {} and s.part_barcode <= {}",
        TEC_TABLE,
        quote(barcode_min),
        quote(barcode_max)
    )
}

/// Client for the REST query interface of the construction database.
///
/// A query is submitted with `POST /query` (SQL as the body, query id as the
/// response) and its rows are read back with `GET /query/{id}/data`.
#[derive(Debug, Clone)]
pub struct RhApiClient {
    client: Client,
    base_url: String,
    tunnel_port: Option<u16>,
    format: String,
}

impl RhApiClient {
    pub fn new(base_url: &str, tunnel_port: Option<u16>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            tunnel_port,
            format: "json2".to_string(),
        }
    }

    pub fn from_config<C: ConfigProvider + ?Sized>(config: &C, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let port = config.tunnel_port();
        Ok(Self {
            client,
            base_url: config.database_url().trim_end_matches('/').to_string(),
            tunnel_port: (port != 0).then_some(port),
            format: "json2".to_string(),
        })
    }

    pub fn with_format(mut self, format: &str) -> Self {
        self.format = format.to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fails unless something listens on the local tunnel port.
    pub async fn ensure_tunnel(&self) -> Result<()> {
        let Some(port) = self.tunnel_port else {
            return Ok(());
        };

        let probe = tokio::time::timeout(
            Duration::from_secs(2),
            TcpStream::connect(("127.0.0.1", port)),
        )
        .await;

        match probe {
            Ok(Ok(_)) => Ok(()),
            _ => Err(PartsError::TunnelClosed { port }),
        }
    }

    async fn submit(&self, sql: &str) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/query", self.base_url))
            .header(CONTENT_TYPE, "text/plain")
            .body(sql.to_string())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(PartsError::QueryFailed {
                status: status.as_u16(),
                body,
            });
        }

        let query_id = body.trim().trim_matches('"').to_string();
        if query_id.is_empty() {
            return Err(PartsError::MalformedResponse {
                message: "empty query id".to_string(),
            });
        }
        Ok(query_id)
    }

    /// Run a statement and return all result rows.
    pub async fn query(&self, sql: &str) -> Result<Vec<Record>> {
        self.ensure_tunnel().await?;
        tracing::debug!("Querying database: {}", sql);

        let query_id = self.submit(sql).await?;
        let response = self
            .client
            .get(format!("{}/query/{}/data", self.base_url, query_id))
            .query(&[("f", self.format.as_str())])
            .header(ACCEPT, format!("application/{}", self.format))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PartsError::QueryFailed {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body: serde_json::Value = response.json().await?;
        let rows = parse_rows(body)?;
        tracing::debug!("Query {} returned {} row(s)", query_id, rows.len());
        Ok(rows)
    }
}

/// Rows of a `json2` response: `{"data": [{...}, ...]}`, or a bare array.
pub fn parse_rows(body: serde_json::Value) -> Result<Vec<Record>> {
    let items = match body {
        serde_json::Value::Object(mut obj) => match obj.remove("data") {
            Some(serde_json::Value::Array(items)) => items,
            _ => {
                return Err(PartsError::MalformedResponse {
                    message: "response has no 'data' array".to_string(),
                })
            }
        },
        serde_json::Value::Array(items) => items,
        other => {
            return Err(PartsError::MalformedResponse {
                message: format!("unexpected response: {}", other),
            })
        }
    };

    items
        .into_iter()
        .map(|item| match item {
            serde_json::Value::Object(obj) => Ok(Record::from_object(obj)),
            other => Err(PartsError::MalformedResponse {
                message: format!("row is not an object: {}", other),
            }),
        })
        .collect()
}

#[async_trait]
impl PartsDatabase for RhApiClient {
    async fn part_barcodes(&self, kind_of_part: &str, locations: &[i64]) -> Result<Vec<String>> {
        let rows = self.query(&sql_part_barcodes(kind_of_part, locations)).await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get_str("barcode"))
            .map(|bc| bc.trim().to_string())
            .filter(|bc| !bc.is_empty())
            .collect())
    }

    async fn parts_in_range(&self, barcode_min: &str, barcode_max: &str) -> Result<Vec<Record>> {
        self.query(&sql_parts_in_range(barcode_min, barcode_max))
            .await
    }

    async fn daughters_of(&self, parent_ids: &[String]) -> Result<Vec<Record>> {
        if parent_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.query(&sql_daughters(parent_ids)).await
    }

    async fn tec_resistances(&self, barcode_min: &str, barcode_max: &str) -> Result<Vec<Record>> {
        self.query(&sql_tec_resistances(barcode_min, barcode_max))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[test]
    fn test_sql_part_barcodes_with_locations() {
        assert_eq!(
            sql_part_barcodes("DetectorModule", &[]),
            "select s.BARCODE from mtd_cmsr.parts s where s.KIND_OF_PART = 'DetectorModule'"
        );
        assert!(sql_part_barcodes("DetectorModule", &[1003]).ends_with(" AND s.LOCATION_ID = 1003"));
        assert!(sql_part_barcodes("DetectorModule", &[1003, 1004])
            .ends_with(" AND s.LOCATION_ID IN (1003, 1004)"));
    }

    #[test]
    fn test_sql_daughters_single_id_has_no_trailing_comma() {
        assert_eq!(
            sql_daughters(&["42".to_string()]),
            "select s.* from mtd_cmsr.parts s where s.PART_PARENT_ID in (42)"
        );
        assert!(sql_daughters(&["1".to_string(), "2".to_string()]).ends_with("in (1, 2)"));
    }

    #[test]
    fn test_sql_quotes_are_escaped() {
        assert!(sql_parts_in_range("1'", "2").contains("s.BARCODE >= '1'''"));
        assert_eq!(
            sql_tec_resistances("10", "20"),
            "select s.part_barcode,s.rac from mtd_cmsr.c3060 s where s.part_barcode >= '10' and s.part_barcode <= '20'"
        );
    }

    #[test]
    fn test_parse_rows() {
        let rows = parse_rows(serde_json::json!({"data": [{"barcode": "1"}, {"barcode": "2"}]})).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(parse_rows(serde_json::json!({"rows": []})).is_err());
        assert!(parse_rows(serde_json::json!({"data": [1]})).is_err());
    }

    #[tokio::test]
    async fn test_query_submits_then_reads_data() {
        let server = MockServer::start();
        let submit = server.mock(|when, then| {
            when.method(POST)
                .path("/query")
                .body_contains("KIND_OF_PART = 'SensorModule'");
            then.status(200).body("q-17");
        });
        let data = server.mock(|when, then| {
            when.method(GET).path("/query/q-17/data");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!({"data": [{"barcode": " 32110040000010 "}]}));
        });

        let client = RhApiClient::new(&server.base_url(), Some(server.port()));
        let barcodes = client.part_barcodes("SensorModule", &[]).await.unwrap();

        submit.assert();
        data.assert();
        assert_eq!(barcodes, vec!["32110040000010"]);
    }

    #[tokio::test]
    async fn test_query_error_status() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/query");
            then.status(400).body("ORA-00942: table or view does not exist");
        });

        let client = RhApiClient::new(&server.base_url(), None);
        let err = client.query("select 1 from dual").await.unwrap_err();
        assert!(matches!(err, PartsError::QueryFailed { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_closed_tunnel() {
        // bind then drop to get a port nothing listens on
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = RhApiClient::new(DEFAULT_URL, Some(port));
        let err = client.query("select 1 from dual").await.unwrap_err();
        assert!(matches!(err, PartsError::TunnelClosed { port: p } if p == port));
    }
}
