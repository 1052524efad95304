//! Backend contract for reading and changing replica counts, plus the
//! HTTP client that talks to a functions provider.
use super::scaling_error::ScalingError;
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use std::collections::HashMap;
use std::time::Duration;

const DEFAULT_MIN_REPLICAS: u64 = 1;
const DEFAULT_SCALING_FACTOR: u8 = 20;
const DEFAULT_MAX_REPLICAS: u64 = 100;

const MIN_SCALE_LABEL: &str = "com.openfaas.scale.min";
const MAX_SCALE_LABEL: &str = "com.openfaas.scale.max";
const SCALING_FACTOR_LABEL: &str = "com.openfaas.scale.factor";

/// Lists and sets replica counts for a function.
#[async_trait]
pub trait ServiceQuery: Send + Sync {
    async fn get_replicas(&self, service: &str) -> Result<ServiceQueryResponse, ScalingError>;

    async fn set_replicas(&self, service: &str, count: u64) -> Result<(), ScalingError>;
}

/// Last observed replica state of one function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceQueryResponse {
    pub replicas: u64,
    pub min_replicas: u64,
    pub max_replicas: u64,
    pub scaling_factor: u8,
    pub available_replicas: u64,
    pub annotations: HashMap<String, String>,
}

impl ServiceQueryResponse {
    /// Replica count to request when scaling up from zero.
    pub fn scale_target(&self) -> u64 {
        self.min_replicas.max(1)
    }
}

/// `ServiceQuery` over the provider's REST API.
#[derive(Clone)]
pub struct ExternalServiceQuery {
    client: reqwest::Client,
    base_url: Url,
    auth_token: Option<String>,
    namespace: String,
    include_usage: bool,
}

impl ExternalServiceQuery {
    pub fn new(
        base_url: Url,
        auth_token: Option<String>,
        namespace: impl Into<String>,
    ) -> Result<Self, ScalingError> {
        let client = reqwest::ClientBuilder::new()
            .timeout(Duration::from_secs(3))
            .build()?;

        Ok(Self {
            client,
            base_url: with_trailing_slash(base_url),
            auth_token,
            namespace: namespace.into(),
            include_usage: false,
        })
    }

    fn endpoint(&self, route: &str, service: &str) -> Result<Url, ScalingError> {
        if !valid_function_name(service) {
            return Err(ScalingError::HttpError(
                StatusCode::BAD_REQUEST,
                format!("invalid function name {}", service),
            ));
        }
        self.base_url
            .join(&format!("{}{}", route, service))
            .map_err(|e| ScalingError::HttpError(StatusCode::BAD_REQUEST, e.to_string()))
    }

    fn namespace_query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if !self.namespace.is_empty() {
            query.push(("namespace", self.namespace.clone()));
        }
        query
    }
}

/// A function name must be a single plain path segment so it can be
/// spliced into provider URLs.
pub fn valid_function_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '%', '?', '#'])
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct FunctionStatus {
    #[serde(default)]
    replicas: u64,
    #[serde(default, alias = "available_replicas")]
    available_replicas: u64,
    #[serde(default)]
    labels: Option<HashMap<String, String>>,
    #[serde(default)]
    annotations: Option<HashMap<String, String>>,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct ScaleServiceRequest<'a> {
    service_name: &'a str,
    namespace: &'a str,
    replicas: u64,
}

#[async_trait]
impl ServiceQuery for ExternalServiceQuery {
    async fn get_replicas(&self, service: &str) -> Result<ServiceQueryResponse, ScalingError> {
        let url = self.endpoint("system/function/", service)?;

        let mut query = self.namespace_query();
        query.push(("usage", self.include_usage.to_string()));

        let mut req = self.client.get(url).query(&query);
        if let Some(token) = &self.auth_token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.map_err(|e| {
            ScalingError::HttpError(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Request failed: {}", e),
            )
        })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| {
            ScalingError::HttpError(status, format!("Failed to read response: {}", e))
        })?;

        match status {
            StatusCode::OK => {
                let function: FunctionStatus = serde_json::from_str(&body)?;
                parse_function_status(function)
            }
            _ => Err(ScalingError::HttpError(status, body)),
        }
    }

    async fn set_replicas(&self, service: &str, count: u64) -> Result<(), ScalingError> {
        let url = self.endpoint("system/scale-function/", service)?;

        let payload = ScaleServiceRequest {
            service_name: service,
            namespace: &self.namespace,
            replicas: count,
        };

        let mut req = self
            .client
            .post(url.clone())
            .query(&self.namespace_query())
            .json(&payload);
        if let Some(token) = &self.auth_token {
            req = req.bearer_auth(token);
        }

        let start = std::time::Instant::now();
        let resp = req.send().await.map_err(|e| {
            ScalingError::HttpError(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Request failed: {}", e),
            )
        })?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| {
            ScalingError::HttpError(status, format!("Failed to read response: {}", e))
        })?;

        log::info!(
            "SetReplicas [{}.{}] took: {:.4}s",
            service,
            self.namespace,
            start.elapsed().as_secs_f64()
        );

        match status {
            StatusCode::OK | StatusCode::ACCEPTED => Ok(()),
            _ => Err(ScalingError::HttpError(
                status,
                format!("{} - {} - {} - {}", body, url, service, self.namespace),
            )),
        }
    }
}

fn parse_function_status(function: FunctionStatus) -> Result<ServiceQueryResponse, ScalingError> {
    let mut min = DEFAULT_MIN_REPLICAS;
    let mut max = DEFAULT_MAX_REPLICAS;
    let mut factor = DEFAULT_SCALING_FACTOR;

    if let Some(labels) = &function.labels {
        min = parse_label(labels, MIN_SCALE_LABEL, min)?;
        max = parse_label(labels, MAX_SCALE_LABEL, max)?;
        factor = parse_label(labels, SCALING_FACTOR_LABEL, factor)?;

        if factor > 100 {
            return Err(ScalingError::InvalidFactor(factor as u64));
        }
    }

    Ok(ServiceQueryResponse {
        replicas: function.replicas,
        max_replicas: max,
        min_replicas: min,
        scaling_factor: factor,
        available_replicas: function.available_replicas,
        annotations: function.annotations.unwrap_or_default(),
    })
}

fn parse_label<T: std::str::FromStr>(
    labels: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ScalingError> {
    labels
        .get(key)
        .map(|v| {
            v.parse()
                .map_err(|_| ScalingError::LabelParse(format!("Invalid {} value: {}", key, v)))
        })
        .transpose()
        .map(|v| v.unwrap_or(default))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{mock, Matcher};

    fn provider() -> ExternalServiceQuery {
        let base_url = Url::parse(&mockito::server_url()).unwrap();
        ExternalServiceQuery::new(base_url, None, "openfaas-fn").unwrap()
    }

    #[test]
    fn scale_target_defaults_to_one() {
        let mut resp = ServiceQueryResponse::default();
        assert_eq!(resp.scale_target(), 1);
        resp.min_replicas = 3;
        assert_eq!(resp.scale_target(), 3);
    }

    #[test]
    fn function_names_must_be_plain_segments() {
        assert!(valid_function_name("figlet"));
        assert!(valid_function_name("figlet.openfaas-fn"));
        for name in ["", ".", "..", "%2e%2e", "a/b", "a%2Fb", "a?b", "a\\b"] {
            assert!(!valid_function_name(name), "{name}");
        }
    }

    #[tokio::test]
    async fn dot_segment_name_never_reaches_provider() {
        let err = provider().get_replicas("..").await.unwrap_err();
        assert!(matches!(err, ScalingError::HttpError(status, _) if status == StatusCode::BAD_REQUEST));

        let err = provider().set_replicas("%2e%2e", 1).await.unwrap_err();
        assert!(matches!(err, ScalingError::HttpError(status, _) if status == StatusCode::BAD_REQUEST));
    }

    #[test]
    fn labels_fall_back_to_defaults() {
        let status = FunctionStatus {
            replicas: 0,
            available_replicas: 0,
            labels: None,
            annotations: None,
        };
        let resp = parse_function_status(status).unwrap();
        assert_eq!(resp.min_replicas, DEFAULT_MIN_REPLICAS);
        assert_eq!(resp.max_replicas, DEFAULT_MAX_REPLICAS);
        assert_eq!(resp.scaling_factor, DEFAULT_SCALING_FACTOR);
    }

    #[test]
    fn bad_min_scale_label_is_rejected() {
        let labels = HashMap::from([(MIN_SCALE_LABEL.to_string(), "two".to_string())]);
        let status = FunctionStatus {
            replicas: 0,
            available_replicas: 0,
            labels: Some(labels),
            annotations: None,
        };
        assert!(matches!(
            parse_function_status(status),
            Err(ScalingError::LabelParse(_))
        ));
    }

    #[tokio::test]
    async fn test_get_replicas() {
        let _mock = mock("GET", "/system/function/figlet")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("namespace".into(), "openfaas-fn".into()),
                Matcher::UrlEncoded("usage".into(), "false".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"
                {
                    "name": "figlet",
                    "replicas": 3,
                    "availableReplicas": 2,
                    "labels": {
                        "com.openfaas.scale.min": "2",
                        "com.openfaas.scale.max": "10",
                        "com.openfaas.scale.factor": "30"
                    },
                    "annotations": {"topic": "cron"}
                }
            "#,
            )
            .create();

        let response = provider().get_replicas("figlet").await.unwrap();

        assert_eq!(response.replicas, 3);
        assert_eq!(response.available_replicas, 2);
        assert_eq!(response.min_replicas, 2);
        assert_eq!(response.max_replicas, 10);
        assert_eq!(response.scaling_factor, 30);
        assert_eq!(response.annotations.get("topic").map(String::as_str), Some("cron"));
    }

    #[tokio::test]
    async fn test_get_replicas_not_found() {
        let _mock = mock("GET", "/system/function/missing")
            .match_query(Matcher::Any)
            .with_status(404)
            .with_body("function not found")
            .create();

        let err = provider().get_replicas("missing").await.unwrap_err();

        match err {
            ScalingError::HttpError(status, body) => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert_eq!(body, "function not found");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_set_replicas() {
        let _mock = mock("POST", "/system/scale-function/nodeinfo")
            .match_query(Matcher::UrlEncoded("namespace".into(), "openfaas-fn".into()))
            .match_body(Matcher::JsonString(
                r#"{"serviceName":"nodeinfo","namespace":"openfaas-fn","replicas":5}"#.into(),
            ))
            .with_status(202)
            .create();

        let result = provider().set_replicas("nodeinfo", 5).await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_set_replicas_rejected() {
        let _mock = mock("POST", "/system/scale-function/env")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("quota exceeded")
            .create();

        let err = provider().set_replicas("env", 1).await.unwrap_err();

        match err {
            ScalingError::HttpError(status, body) => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert!(body.starts_with("quota exceeded"), "{body}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
