// Metrics service client
use crate::application::metrics_repository::MetricsRepository;
use crate::domain::catalog::{DimensionDefinition, MetricDefinition};
use crate::domain::error::StudioError;
use crate::domain::series::{AggregateGroup, Availability, LatestValue, MetricQuery, SeriesResult};
use crate::domain::tile::{Filter, Grain};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const PAGE_SIZE: usize = 500;

#[derive(Debug, Clone)]
pub struct MetricsClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct TimeseriesResponse {
    #[serde(default)]
    series: Vec<SeriesResult>,
}

#[derive(Debug, Deserialize)]
struct AggregateResponse {
    #[serde(default)]
    groups: Vec<AggregateGroup>,
}

#[derive(Debug, Serialize)]
struct QueryFilter<'a> {
    dimension_id: i64,
    value_ids: &'a [i64],
}

#[derive(Debug, Serialize)]
struct QueryBody<'a> {
    metric_keys: &'a [String],
    grain: Grain,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    group_by: &'a [String],
    filters: Vec<QueryFilter<'a>>,
}

impl<'a> From<&'a MetricQuery> for QueryBody<'a> {
    fn from(query: &'a MetricQuery) -> Self {
        Self {
            metric_keys: &query.metric_keys,
            grain: query.grain,
            start_time: query.start_time,
            end_time: query.end_time,
            group_by: &query.group_by,
            filters: query
                .filters
                .iter()
                .filter(|f| f.is_active())
                .map(|f| QueryFilter {
                    dimension_id: f.dimension_id,
                    value_ids: &f.value_ids,
                })
                .collect(),
        }
    }
}

/// `dimension_id:value_id|value_id` pairs for the GET endpoints.
pub fn dimension_params(filters: &[Filter]) -> Vec<(&'static str, String)> {
    filters
        .iter()
        .filter(|f| f.is_active())
        .map(|f| {
            let values: Vec<String> = f.value_ids.iter().map(i64::to_string).collect();
            ("dimensions", format!("{}:{}", f.dimension_id, values.join("|")))
        })
        .collect()
}

/// Turn a non-success response into `StudioError::Http`, keeping the body for messages.
pub async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StudioError::Http {
        status: status.as_u16(),
        body,
    }
    .into())
}

impl MetricsClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, params: &[(&str, String)]) -> Result<T> {
        let response = self
            .client
            .get(self.url(path))
            .query(params)
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("Failed to send request to metrics service: {}", path))?;

        check_status(response)
            .await?
            .json::<T>()
            .await
            .with_context(|| format!("Failed to parse metrics response: {}", path))
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to send request to metrics service: {}", path))?;

        check_status(response)
            .await?
            .json::<T>()
            .await
            .with_context(|| format!("Failed to parse metrics response: {}", path))
    }

    /// Follow offset pagination until a short page comes back.
    async fn list_all<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        loop {
            let params = [
                ("limit", PAGE_SIZE.to_string()),
                ("offset", items.len().to_string()),
            ];
            let page: Page<T> = self.get(path, &params).await?;
            let count = page.items.len();
            items.extend(page.items);
            if count < PAGE_SIZE {
                return Ok(items);
            }
        }
    }
}

#[async_trait]
impl MetricsRepository for MetricsClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn list_metrics(&self) -> Result<Vec<MetricDefinition>> {
        self.list_all("/v1/metrics").await
    }

    async fn list_dimensions(&self) -> Result<Vec<DimensionDefinition>> {
        self.list_all("/v1/dimensions").await
    }

    async fn availability(
        &self,
        metric_key: &str,
        grain: Grain,
        filters: &[Filter],
    ) -> Result<Availability> {
        let path = format!("/v1/metrics/{}/availability", urlencoding::encode(metric_key));
        let mut params = vec![("grain", grain.as_str().to_string())];
        params.extend(dimension_params(filters));
        self.get(&path, &params).await
    }

    async fn timeseries(&self, query: &MetricQuery) -> Result<Vec<SeriesResult>> {
        tracing::debug!(
            "Querying timeseries for {:?} at {} grain",
            query.metric_keys,
            query.grain
        );
        let response: TimeseriesResponse =
            self.post("/v1/query/timeseries", &QueryBody::from(query)).await?;
        Ok(response.series)
    }

    async fn aggregate(&self, query: &MetricQuery) -> Result<Vec<AggregateGroup>> {
        let response: AggregateResponse =
            self.post("/v1/query/aggregate", &QueryBody::from(query)).await?;
        Ok(response.groups)
    }

    async fn latest(&self, metric_key: &str, grain: Grain, filters: &[Filter]) -> Result<LatestValue> {
        let mut params = vec![
            ("metric_key", metric_key.to_string()),
            ("grain", grain.as_str().to_string()),
        ];
        params.extend(dimension_params(filters));
        self.get("/v1/query/latest", &params).await
    }
}
