use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::location::Coordinates;
use crate::session::Content;

pub const ASSISTANT_PATH: &str = "shopping-assistant";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TurnRequest {
    pub user_query: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl TurnRequest {
    pub fn new(query: impl Into<String>, at: Coordinates) -> Self {
        Self {
            user_query: query.into(),
            latitude: at.latitude,
            longitude: at.longitude,
        }
    }
}

/// Success body. The backend answers under `response_lines`; older builds
/// used `response` with a bare string. When several are present the first
/// in that order (then `reply`) wins.
#[derive(Debug, Deserialize)]
struct TurnResponse {
    response_lines: Option<Content>,
    response: Option<Content>,
    reply: Option<Content>,
}

impl TurnResponse {
    fn into_reply(self) -> Option<Content> {
        self.response_lines.or(self.response).or(self.reply)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("endpoint returned {0}")]
    Status(StatusCode),
    #[error("malformed response body: {0}")]
    Malformed(String),
}

impl EndpointError {
    /// Short label for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            EndpointError::Network(_) => "network",
            EndpointError::Timeout(_) => "timeout",
            EndpointError::Status(_) => "status",
            EndpointError::Malformed(_) => "malformed",
        }
    }
}

#[async_trait]
pub trait AssistantEndpoint: Send + Sync {
    async fn ask(&self, req: &TurnRequest) -> Result<Content, EndpointError>;
}

#[derive(Clone)]
pub struct HttpAssistant {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpAssistant {
    pub fn new(base_url: &Url) -> Result<Self, url::ParseError> {
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: base_url.join(ASSISTANT_PATH)?,
        })
    }
}

#[async_trait]
impl AssistantEndpoint for HttpAssistant {
    async fn ask(&self, req: &TurnRequest) -> Result<Content, EndpointError> {
        let resp = self
            .client
            .post(self.endpoint.clone())
            .json(req)
            .send()
            .await
            .map_err(EndpointError::Network)?;
        if !resp.status().is_success() {
            return Err(EndpointError::Status(resp.status()));
        }
        let body = resp.bytes().await.map_err(EndpointError::Network)?;
        let parsed: TurnResponse =
            serde_json::from_slice(&body).map_err(|e| EndpointError::Malformed(e.to_string()))?;
        parsed
            .into_reply()
            .ok_or_else(|| EndpointError::Malformed("no reply field in body".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::StatusCode as AxumStatus, routing::post};
    use std::sync::{Arc, Mutex};

    async fn spawn(app: Router) -> Url {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Url::parse(&format!("http://{}/", addr)).unwrap()
    }

    async fn replying(body: serde_json::Value) -> HttpAssistant {
        let app = Router::new().route(
            "/shopping-assistant",
            post(move || {
                let body = body.clone();
                async move { Json(body) }
            }),
        );
        HttpAssistant::new(&spawn(app).await).unwrap()
    }

    fn req() -> TurnRequest {
        TurnRequest::new("caut o rochie", crate::location::FALLBACK_COORDINATES)
    }

    #[tokio::test]
    async fn posts_query_and_coordinates() {
        let seen: Arc<Mutex<Option<serde_json::Value>>> = Arc::default();
        let sink = seen.clone();
        let app = Router::new().route(
            "/shopping-assistant",
            post(move |Json(body): Json<serde_json::Value>| {
                let sink = sink.clone();
                async move {
                    *sink.lock().unwrap() = Some(body);
                    Json(serde_json::json!({"response_lines": ["ok"]}))
                }
            }),
        );
        let base = spawn(app).await;
        let client = HttpAssistant::new(&base).unwrap();
        client.ask(&req()).await.unwrap();

        let body = seen.lock().unwrap().clone().unwrap();
        assert_eq!(body["user_query"], "caut o rochie");
        assert_eq!(body["latitude"], 44.4268);
        assert_eq!(body["longitude"], 26.1025);
    }

    #[tokio::test]
    async fn line_list_reply_is_passed_through() {
        let app = Router::new().route(
            "/shopping-assistant",
            post(|| async { Json(serde_json::json!({"response_lines": ["line1", "", "line2"]})) }),
        );
        let client = HttpAssistant::new(&spawn(app).await).unwrap();
        let got = client.ask(&req()).await.unwrap();
        assert_eq!(got, Content::Lines(vec!["line1".into(), "".into(), "line2".into()]));
    }

    #[tokio::test]
    async fn string_reply_under_alias_is_accepted() {
        let client = replying(serde_json::json!({"reply": "hello"})).await;
        assert_eq!(client.ask(&req()).await.unwrap(), Content::Text("hello".into()));

        let client = replying(serde_json::json!({"response": "salut"})).await;
        assert_eq!(client.ask(&req()).await.unwrap(), Content::Text("salut".into()));
    }

    #[tokio::test]
    async fn canonical_field_wins_when_several_are_present() {
        let client = replying(serde_json::json!({
            "response": "vechi",
            "response_lines": ["nou", "rand"],
            "reply": "altul"
        }))
        .await;
        let got = client.ask(&req()).await.unwrap();
        assert_eq!(got, Content::Lines(vec!["nou".into(), "rand".into()]));

        let client = replying(serde_json::json!({"reply": "altul", "response": "vechi"})).await;
        assert_eq!(client.ask(&req()).await.unwrap(), Content::Text("vechi".into()));
    }

    #[tokio::test]
    async fn server_error_is_a_status_failure() {
        let app = Router::new().route(
            "/shopping-assistant",
            post(|| async { (AxumStatus::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let client = HttpAssistant::new(&spawn(app).await).unwrap();
        let err = client.ask(&req()).await.unwrap_err();
        assert!(matches!(err, EndpointError::Status(s) if s == StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(err.kind(), "status");
    }

    #[tokio::test]
    async fn non_json_body_is_malformed() {
        let app = Router::new()
            .route("/shopping-assistant", post(|| async { "<html>oops</html>" }));
        let client = HttpAssistant::new(&spawn(app).await).unwrap();
        let err = client.ask(&req()).await.unwrap_err();
        assert_eq!(err.kind(), "malformed");

        let client = replying(serde_json::json!({"answer": 3})).await;
        assert_eq!(client.ask(&req()).await.unwrap_err().kind(), "malformed");

        let client = replying(serde_json::json!({"response_lines": 3})).await;
        assert_eq!(client.ask(&req()).await.unwrap_err().kind(), "malformed");
    }

    #[tokio::test]
    async fn unreachable_host_is_a_network_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let base = Url::parse(&format!("http://{}/", addr)).unwrap();
        let err = HttpAssistant::new(&base).unwrap().ask(&req()).await.unwrap_err();
        assert_eq!(err.kind(), "network");
    }
}
