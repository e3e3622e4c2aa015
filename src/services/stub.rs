//! Local axum server for exercising the reqwest clients in tests.
//!
//! Routes are matched in order on method and path (query ignored); a route
//! limited with [`Route::times`] stops matching once used up. Unmatched
//! requests get `404`. Every request is recorded, matched or not.

use std::sync::{Arc, Mutex};

use axum::{
    body::Bytes,
    extract::State,
    http::{header, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub(crate) struct Recorded {
    pub method: String,
    pub path: String,
    pub body: Vec<u8>,
}

impl Recorded {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Route {
    method: &'static str,
    path: String,
    status: u16,
    body: Vec<u8>,
    content_type: &'static str,
    hang: bool,
    remaining: Option<usize>,
}

impl Route {
    pub fn json(method: &'static str, path: &str, status: u16, body: serde_json::Value) -> Self {
        Self {
            method,
            path: path.to_string(),
            status,
            body: body.to_string().into_bytes(),
            content_type: "application/json",
            hang: false,
            remaining: None,
        }
    }

    pub fn bytes(method: &'static str, path: &str, status: u16, body: &[u8]) -> Self {
        Self {
            content_type: "application/octet-stream",
            body: body.to_vec(),
            ..Self::json(method, path, status, serde_json::Value::Null)
        }
    }

    /// Accept the request and never answer.
    pub fn hang(method: &'static str, path: &str) -> Self {
        Self {
            hang: true,
            ..Self::json(method, path, 200, serde_json::Value::Null)
        }
    }

    pub fn times(mut self, n: usize) -> Self {
        self.remaining = Some(n);
        self
    }

    fn matches(&self, method: &Method, path: &str) -> bool {
        self.method == method.as_str() && self.path == path && self.remaining != Some(0)
    }
}

#[derive(Clone, Default)]
struct StubState {
    routes: Arc<Mutex<Vec<Route>>>,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

pub(crate) struct StubServer {
    base: String,
    state: StubState,
    task: JoinHandle<()>,
}

impl StubServer {
    pub async fn start(routes: Vec<Route>) -> Self {
        let state = StubState {
            routes: Arc::new(Mutex::new(routes)),
            requests: Arc::default(),
        };
        let app = Router::new().fallback(respond).with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { base, state, task }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.requests.lock().unwrap().clone()
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn respond(State(stub): State<StubState>, method: Method, uri: Uri, body: Bytes) -> Response {
    let path = uri.path().to_string();
    stub.requests.lock().unwrap().push(Recorded {
        method: method.to_string(),
        path: path.clone(),
        body: body.to_vec(),
    });

    let route = {
        let mut routes = stub.routes.lock().unwrap();
        routes.iter_mut().find(|r| r.matches(&method, &path)).map(|r| {
            if let Some(n) = r.remaining.as_mut() {
                *n -= 1;
            }
            r.clone()
        })
    };

    match route {
        Some(route) if route.hang => std::future::pending().await,
        Some(route) => {
            let status = StatusCode::from_u16(route.status).unwrap();
            (status, [(header::CONTENT_TYPE, route.content_type)], route.body).into_response()
        }
        None => (StatusCode::NOT_FOUND, "not found").into_response(),
    }
}
