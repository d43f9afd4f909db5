//! In-process Grafana stand-in for tests
//!
//! Responses are scripted per method and path. Each route replays its
//! responses in order and then keeps repeating the last one. Unscripted
//! routes answer 404.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use super::GrafanaClient;

#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: String,
}

#[derive(Default)]
struct MockState {
    routes: Mutex<HashMap<(String, String), VecDeque<MockResponse>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

pub struct MockGrafana {
    addr: SocketAddr,
    state: Arc<MockState>,
    server: JoinHandle<()>,
}

impl MockGrafana {
    pub async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(MockState::default());

        let app = Router::new().fallback(handle).with_state(state.clone());
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            server,
        }
    }

    /// Base URL of the mock, with trailing slash
    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    /// Client authenticated with `test-token`, bypassing any proxy settings
    pub fn client(&self) -> GrafanaClient {
        GrafanaClient::with_builder(
            reqwest::Client::builder().no_proxy(),
            &self.url(),
            "test-token",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    /// Queue a response for `method path`
    pub fn on(&self, method: &str, path: &str, status: u16, body: impl Into<String>) -> &Self {
        self.state
            .routes
            .lock()
            .entry((method.to_string(), path.to_string()))
            .or_default()
            .push_back(MockResponse {
                status,
                body: body.into(),
            });
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().clone()
    }

    pub fn requests_to(&self, method: &str, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }

    /// Method and path of every request, in order
    pub fn calls(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(|r| format!("{} {}", r.method, r.path))
            .collect()
    }
}

impl Drop for MockGrafana {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn handle(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    state.requests.lock().push(RecordedRequest {
        method: method.to_string(),
        path: path.clone(),
        headers: headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
            .collect(),
        body: String::from_utf8_lossy(&body).to_string(),
    });

    let scripted = {
        let mut routes = state.routes.lock();
        routes
            .get_mut(&(method.to_string(), path))
            .and_then(|queue| {
                if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().cloned()
                }
            })
    };

    let MockResponse { status, body } = scripted.unwrap_or(MockResponse {
        status: 404,
        body: r#"{"message":"not found"}"#.to_string(),
    });
    let status = StatusCode::from_u16(status).unwrap();

    (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
}
