//! Prometheus instant-query adapter.
//!
//! Issues `GET <endpoint>?query=<expr>` against the HTTP API and reads
//! the first sample of the returned instant vector (or the scalar).

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::provider::{MetricQueryError, MetricQueryResult, MetricsProvider};

/// Cap on how much of an error body ends up in an error message.
const MAX_ERROR_BODY: usize = 256;

/// Queries a Prometheus-compatible `/api/v1/query` endpoint.
#[derive(Debug, Clone)]
pub struct PrometheusProvider {
    endpoint: Url,
    timeout: Duration,
}

impl PrometheusProvider {
    pub fn new(endpoint: &str, timeout: Duration) -> MetricQueryResult<Self> {
        let endpoint =
            Url::parse(endpoint).map_err(|e| MetricQueryError::Endpoint(format!("{endpoint}: {e}")))?;
        Ok(Self { endpoint, timeout })
    }

    fn query_url(&self, expression: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("query", expression);
        url
    }
}

#[async_trait]
impl MetricsProvider for PrometheusProvider {
    async fn query(&self, expression: &str) -> MetricQueryResult<Option<f64>> {
        let url = self.query_url(expression);
        let resp = canary_core::http::get(url.as_str(), self.timeout).await?;

        if !resp.status.is_success() {
            let body = String::from_utf8_lossy(&resp.body);
            return Err(MetricQueryError::Status {
                status: resp.status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        let value = parse_response(&resp.body)?;
        debug!(%expression, ?value, "prometheus query answered");
        Ok(value)
    }

    async fn ready(&self) -> MetricQueryResult<()> {
        match self.query("vector(1)").await? {
            Some(_) => Ok(()),
            None => Err(MetricQueryError::Decode(
                "probe query vector(1) returned no sample".to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "resultType", content = "result", rename_all = "lowercase")]
enum QueryData {
    Vector(Vec<VectorSample>),
    Scalar(SamplePair),
    Matrix(serde_json::Value),
    String(serde_json::Value),
}

#[derive(Debug, Deserialize)]
struct VectorSample {
    value: SamplePair,
}

/// `[<unix seconds>, "<value>"]`
type SamplePair = (f64, String);

/// Extract the first sample from a query response body.
///
/// `NaN` samples (e.g. a ratio over zero requests) read as "not found".
fn parse_response(body: &[u8]) -> MetricQueryResult<Option<f64>> {
    let resp: QueryResponse =
        serde_json::from_slice(body).map_err(|e| MetricQueryError::Decode(e.to_string()))?;

    if resp.status != "success" {
        return Err(MetricQueryError::Query(format!(
            "{}: {}",
            resp.error_type.as_deref().unwrap_or("error"),
            resp.error.as_deref().unwrap_or("no error message")
        )));
    }

    let raw = match resp.data {
        Some(QueryData::Vector(samples)) => match samples.into_iter().next() {
            Some(sample) => sample.value.1,
            None => return Ok(None),
        },
        Some(QueryData::Scalar((_, value))) => value,
        Some(QueryData::Matrix(_)) | Some(QueryData::String(_)) => {
            return Err(MetricQueryError::Decode(
                "expected an instant vector or scalar result".to_string(),
            ));
        }
        None => return Ok(None),
    };

    let value: f64 = raw
        .parse()
        .map_err(|_| MetricQueryError::Decode(format!("sample {raw:?} is not a number")))?;
    Ok((!value.is_nan()).then_some(value))
}
