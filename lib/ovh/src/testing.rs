//! A tiny in-process stand-in for the OVHcloud API.
//!
//! Routes are matched by exact path, `/auth/time` is always served and every
//! other route requires the signature headers, like the real API.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use serde::Serialize;
use tokio::net::TcpListener;

/// The UNIX time reported by `/auth/time`
pub const SERVER_TIME: i64 = 1_700_000_000;

#[derive(Default)]
struct State {
    routes: BTreeMap<String, (StatusCode, String)>,
    requests: Vec<String>,
}

#[derive(Clone)]
pub struct MockServer {
    endpoint: String,
    state: Arc<Mutex<State>>,
}

impl MockServer {
    pub async fn start() -> MockServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(State::default()));

        let shared = Arc::clone(&state);
        tokio::spawn(async move {
            loop {
                let Ok((conn, _peer)) = listener.accept().await else {
                    break;
                };

                let state = Arc::clone(&shared);
                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        let resp = handle(&state, req);
                        async move { Ok::<_, Infallible>(resp) }
                    });

                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(conn), service)
                        .await;
                });
            }
        });

        MockServer {
            endpoint: format!("http://{addr}"),
            state,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Reply `200 OK` with `body` encoded as JSON
    pub fn ok(&self, path: &str, body: impl Serialize) {
        let body = serde_json::to_string(&body).unwrap();
        self.state
            .lock()
            .unwrap()
            .routes
            .insert(path.to_string(), (StatusCode::OK, body));
    }

    /// Reply an API error
    pub fn error(&self, path: &str, status: StatusCode, message: &str) {
        let body = serde_json::json!({ "class": "Client::Error", "message": message }).to_string();
        self.state
            .lock()
            .unwrap()
            .routes
            .insert(path.to_string(), (status, body));
    }

    /// Paths requested so far, in order
    pub fn requests(&self) -> Vec<String> {
        self.state.lock().unwrap().requests.clone()
    }
}

fn handle(state: &Mutex<State>, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let path = req.uri().path().to_string();
    let mut state = state.lock().unwrap();
    state.requests.push(path.clone());

    let (status, body) = if path == "/auth/time" {
        (StatusCode::OK, SERVER_TIME.to_string())
    } else if !signed(&req) {
        (
            StatusCode::UNAUTHORIZED,
            r#"{"message":"Invalid signature"}"#.to_string(),
        )
    } else {
        state.routes.get(&path).cloned().unwrap_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                r#"{"message":"Got an invalid (or empty) URL"}"#.to_string(),
            )
        })
    };

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("X-Ovh-QueryID", format!("EU.mock-{}", state.requests.len()))
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

fn signed(req: &Request<Incoming>) -> bool {
    let headers = req.headers();

    let signature = headers
        .get("X-Ovh-Signature")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("$1$"));

    signature
        && headers.contains_key("X-Ovh-Application")
        && headers.contains_key("X-Ovh-Consumer")
        && headers.contains_key("X-Ovh-Timestamp")
}
