// Endpoint wrappers and pagination for the funding-agency open data API.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::api_client::ResilientApiClient;
use crate::types::EntityKind;
use crate::utils::logger::logger;
use crate::utils::{SyncError, SyncResult};

pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const DEFAULT_MAX_PAGES: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FundingEndpoint {
    /// Calls for proposals ("utlysningar")
    Calls,
    /// Applications ("ansokningar")
    Applications,
    /// Funded activities ("finansierade aktiviteter")
    Activities,
}

impl FundingEndpoint {
    pub fn path(&self) -> &'static str {
        match self {
            FundingEndpoint::Calls => "/utlysningar",
            FundingEndpoint::Applications => "/ansokningar",
            FundingEndpoint::Activities => "/finansieradeaktiviteter",
        }
    }

    pub fn name(&self) -> &'static str {
        self.path().trim_start_matches('/')
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim_matches('/') {
            "utlysningar" => Some(FundingEndpoint::Calls),
            "ansokningar" => Some(FundingEndpoint::Applications),
            "finansieradeaktiviteter" => Some(FundingEndpoint::Activities),
            _ => None,
        }
    }

    pub fn for_entity(entity: EntityKind) -> Self {
        match entity {
            EntityKind::Grants => FundingEndpoint::Calls,
            EntityKind::Applications => FundingEndpoint::Applications,
            EntityKind::Activities => FundingEndpoint::Activities,
        }
    }
}

/// Caller-supplied query for a single page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FundingQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub search: Option<String>,
    pub updated_after: Option<String>,
}

impl FundingQuery {
    pub fn validate(&self) -> SyncResult<()> {
        if let Some(limit) = self.limit {
            if limit == 0 || limit > DEFAULT_PAGE_SIZE {
                return Err(SyncError::validation_failure(format!(
                    "limit must be between 1 and {}",
                    DEFAULT_PAGE_SIZE
                )));
            }
        }
        if let Some(offset) = self.offset {
            if offset > 99_999 {
                return Err(SyncError::validation_failure("offset is out of range"));
            }
        }
        if let Some(search) = &self.search {
            if search.chars().count() > 100 {
                return Err(SyncError::validation_failure(
                    "search must be at most 100 characters",
                ));
            }
        }
        Ok(())
    }

    pub fn to_params(&self) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        if let Some(limit) = self.limit {
            params.insert("limit".to_string(), limit.to_string());
        }
        if let Some(offset) = self.offset {
            params.insert("offset".to_string(), offset.to_string());
        }
        if let Some(search) = &self.search {
            params.insert("search".to_string(), search.clone());
        }
        if let Some(updated_after) = &self.updated_after {
            params.insert("updated_after".to_string(), updated_after.clone());
        }
        params
    }

    /// Parses `limit`, `offset` and `search` from URL query pairs.
    pub fn from_pairs<'a, I>(pairs: I) -> SyncResult<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut query = FundingQuery::default();
        for (key, value) in pairs {
            match key {
                "limit" => query.limit = Some(parse_number(key, value, 3)?),
                "offset" => query.offset = Some(parse_number(key, value, 5)?),
                "search" => query.search = Some(value.to_string()),
                _ => {}
            }
        }
        query.validate()?;
        Ok(query)
    }
}

fn parse_number(key: &str, value: &str, max_digits: usize) -> SyncResult<u32> {
    if value.is_empty() || value.len() > max_digits || !value.chars().all(|c| c.is_ascii_digit())
    {
        return Err(SyncError::validation_failure(format!(
            "{} must be a number with at most {} digits",
            key, max_digits
        )));
    }
    value
        .parse()
        .map_err(|_| SyncError::validation_failure(format!("{} is not a valid number", key)))
}

/// A page body: `{ results, totalRecords? }` or a bare array.
#[derive(Debug, Clone, PartialEq)]
pub struct FundingPage {
    pub results: Vec<Value>,
    pub total_records: Option<u64>,
}

impl FundingPage {
    pub fn from_body(body: Value) -> SyncResult<Self> {
        match body {
            Value::Array(results) => Ok(Self {
                results,
                total_records: None,
            }),
            Value::Object(mut map) => {
                let total_records = map.get("totalRecords").and_then(Value::as_u64);
                let results = match map.remove("results") {
                    Some(Value::Array(results)) => results,
                    None | Some(Value::Null) => Vec::new(),
                    Some(_) => {
                        return Err(SyncError::api_error(
                            "Upstream 'results' field is not an array",
                        ))
                    }
                };
                Ok(Self {
                    results,
                    total_records,
                })
            }
            Value::Null => Ok(Self {
                results: Vec::new(),
                total_records: None,
            }),
            _ => Err(SyncError::api_error("Unexpected upstream page shape")),
        }
    }
}

pub struct FundingApi {
    client: Arc<ResilientApiClient>,
    page_size: u32,
    max_pages: u32,
}

impl FundingApi {
    pub fn new(client: Arc<ResilientApiClient>) -> Self {
        Self {
            client,
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    pub fn with_paging(mut self, page_size: u32, max_pages: u32) -> Self {
        self.page_size = page_size.max(1);
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn client(&self) -> &ResilientApiClient {
        &self.client
    }

    /// Raw body of one page (cached GET).
    pub async fn get_page(&self, endpoint: FundingEndpoint, query: &FundingQuery) -> SyncResult<Value> {
        self.client.get(endpoint.path(), &query.to_params()).await
    }

    /// Walks `limit`/`offset` pages until a short or empty page, `totalRecords`,
    /// or the page cap.
    pub async fn get_all_pages(
        &self,
        endpoint: FundingEndpoint,
        query: &FundingQuery,
    ) -> SyncResult<Vec<Value>> {
        let mut all = Vec::new();
        let mut offset = query.offset.unwrap_or(0);

        for page_index in 0..self.max_pages {
            let page_query = FundingQuery {
                limit: Some(self.page_size),
                offset: Some(offset),
                ..query.clone()
            };
            let page = FundingPage::from_body(self.get_page(endpoint, &page_query).await?)?;
            let fetched = page.results.len();
            all.extend(page.results);

            let reached_total = page
                .total_records
                .is_some_and(|total| all.len() as u64 >= total);
            if fetched == 0 || fetched < self.page_size as usize || reached_total {
                break;
            }
            if page_index + 1 == self.max_pages {
                logger().warn_with_meta(
                    "Page cap reached, results may be truncated",
                    Some(&serde_json::json!({
                        "endpoint": endpoint.path(),
                        "maxPages": self.max_pages,
                        "records": all.len(),
                    })),
                );
            }
            offset += self.page_size;
        }

        Ok(all)
    }

    /// Every record of `entity`, limited to changes after `since` when given.
    pub async fn fetch_entity(
        &self,
        entity: EntityKind,
        since: Option<DateTime<Utc>>,
    ) -> SyncResult<Vec<Value>> {
        let query = FundingQuery {
            updated_after: since.map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ..FundingQuery::default()
        };
        self.get_all_pages(FundingEndpoint::for_entity(entity), &query)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::core::infrastructure::retry::RetryPolicy;
    use crate::services::core::upstream::api_client::ApiClientConfig;
    use crate::services::core::upstream::transport::UpstreamResponse;
    use crate::test_utils::MockTransport;
    use chrono::TimeZone;
    use serde_json::json;

    fn api(transport: Arc<MockTransport>, page_size: u32) -> FundingApi {
        let config = ApiClientConfig {
            base_url: "https://data.example/api".to_string(),
            retry: RetryPolicy::api_client().with_base_delay_ms(1),
            ..Default::default()
        };
        let client = ResilientApiClient::new(config, transport).unwrap();
        FundingApi::new(Arc::new(client)).with_paging(page_size, 10)
    }

    fn query_value(request: &crate::services::core::upstream::transport::UpstreamRequest, key: &str) -> Option<String> {
        request
            .query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    #[test]
    fn test_page_shapes() {
        let wrapped = FundingPage::from_body(json!({"results": [{"a": 1}], "totalRecords": 5})).unwrap();
        assert_eq!(wrapped.results.len(), 1);
        assert_eq!(wrapped.total_records, Some(5));

        let bare = FundingPage::from_body(json!([{"a": 1}, {"a": 2}])).unwrap();
        assert_eq!(bare.results.len(), 2);
        assert!(FundingPage::from_body(json!("nope")).is_err());
    }

    #[test]
    fn test_query_validation_and_parsing() {
        let query = FundingQuery::from_pairs([("limit", "50"), ("offset", "100"), ("x", "y")]).unwrap();
        assert_eq!(query.limit, Some(50));
        assert_eq!(query.offset, Some(100));

        assert!(FundingQuery::from_pairs([("limit", "abc")]).is_err());
        assert!(FundingQuery::from_pairs([("limit", "1000")]).is_err());
        assert!(FundingQuery::from_pairs([("limit", "0")]).is_err());
        let long = "x".repeat(101);
        assert!(FundingQuery::from_pairs([("search", long.as_str())]).is_err());
    }

    #[tokio::test]
    async fn test_get_all_pages_stops_on_short_page() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(200, json!([{"id": "1"}, {"id": "2"}]));
        transport.push_json(200, json!([{"id": "3"}]));

        let records = api(transport.clone(), 2)
            .get_all_pages(FundingEndpoint::Calls, &FundingQuery::default())
            .await
            .unwrap();
        assert_eq!(records.len(), 3);

        let sent = transport.requests();
        assert_eq!(sent.len(), 2);
        assert_eq!(query_value(&sent[0], "offset").as_deref(), Some("0"));
        assert_eq!(query_value(&sent[1], "offset").as_deref(), Some("2"));
        assert_eq!(query_value(&sent[1], "limit").as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_get_all_pages_honors_total_records() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(200, json!({"results": [{"id": "1"}, {"id": "2"}], "totalRecords": 2}));

        let records = api(transport.clone(), 2)
            .get_all_pages(FundingEndpoint::Applications, &FundingQuery::default())
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_fetch_entity_sends_incremental_filter() {
        let transport = Arc::new(MockTransport::new());
        transport.push_response(UpstreamResponse::new(200, "[]"));
        let since = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();

        let records = api(transport.clone(), 100)
            .fetch_entity(EntityKind::Activities, Some(since))
            .await
            .unwrap();
        assert!(records.is_empty());

        let sent = transport.requests();
        assert!(sent[0].url.ends_with("/finansieradeaktiviteter"));
        assert_eq!(
            query_value(&sent[0], "updated_after").as_deref(),
            Some("2024-05-01T08:30:00Z")
        );
    }
}
