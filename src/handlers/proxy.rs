// Relays function invocations to the functions provider once the
// scale-from-zero middleware has let them through.
use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse, ResponseError};
use reqwest::Url;
use std::time::Duration;

// Headers that describe the payload and are safe to pass through.
const FORWARDED_HEADERS: [&str; 4] = ["content-type", "accept", "authorization", "user-agent"];

#[derive(thiserror::Error, Debug)]
pub enum ProxyError {
    #[error("unable to build upstream request: {0}")]
    BadRequest(String),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),
}

impl ResponseError for ProxyError {
    fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

#[derive(Clone)]
pub struct Upstream {
    client: reqwest::Client,
    base_url: Url,
}

impl Upstream {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, ProxyError> {
        let client = reqwest::ClientBuilder::new().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    fn target(&self, req: &HttpRequest) -> Result<Url, ProxyError> {
        let mut url = self
            .base_url
            .join(req.path().trim_start_matches('/'))
            .map_err(|e| ProxyError::BadRequest(e.to_string()))?;
        let query = req.query_string();
        url.set_query((!query.is_empty()).then_some(query));
        Ok(url)
    }
}

pub async fn forward_request(
    req: HttpRequest,
    body: web::Bytes,
    upstream: web::Data<Upstream>,
) -> Result<HttpResponse, ProxyError> {
    let url = upstream.target(&req)?;
    let method = reqwest::Method::from_bytes(req.method().as_str().as_bytes())
        .map_err(|e| ProxyError::BadRequest(e.to_string()))?;

    let mut outbound = upstream.client.request(method, url).body(body.to_vec());
    for name in FORWARDED_HEADERS {
        if let Some(value) = req.headers().get(name).and_then(|v| v.to_str().ok()) {
            outbound = outbound.header(name, value);
        }
    }

    let resp = outbound.send().await?;
    let status = StatusCode::from_u16(resp.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = resp.bytes().await?;

    let mut response = HttpResponse::build(status);
    if let Some(content_type) = content_type {
        response.content_type(content_type);
    }
    Ok(response.body(bytes.to_vec()))
}
