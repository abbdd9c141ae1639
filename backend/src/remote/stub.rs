//! In-process HTTP server standing in for the tagging, generation and storage services.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use actix_web::http::StatusCode;
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};

use crate::config::RemoteCallConfig;

/// How long a delayed stub sits on a response; far past `short_deadline`.
pub const SLOW_REPLY: Duration = Duration::from_secs(2);

/// Remote settings that give up long before a delayed stub answers.
pub fn short_deadline() -> RemoteCallConfig {
    RemoteCallConfig {
        timeout: Duration::from_millis(50),
        max_attempts: 1,
        retry_base_delay: Duration::from_millis(1),
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

struct StubState {
    responses: Vec<(u16, String)>,
    delay: Duration,
    requests: Mutex<Vec<RecordedRequest>>,
}

pub struct StubServer {
    pub base_url: String,
    state: Arc<StubState>,
}

impl StubServer {
    /// Serves `responses` in order, repeating the last one once exhausted.
    pub async fn start(responses: Vec<(u16, &str)>) -> std::io::Result<Self> {
        Self::start_delayed(responses, Duration::ZERO).await
    }

    /// Like `start`, but holds every response back for `delay` after the request is read.
    pub async fn start_delayed(
        responses: Vec<(u16, &str)>,
        delay: Duration,
    ) -> std::io::Result<Self> {
        let state = Arc::new(StubState {
            responses: responses
                .into_iter()
                .map(|(status, body)| (status, body.to_string()))
                .collect(),
            delay,
            requests: Mutex::new(Vec::new()),
        });
        let data = web::Data::from(state.clone());
        let server = HttpServer::new(move || {
            App::new()
                .app_data(data.clone())
                .default_service(web::to(respond))
        })
        .workers(1)
        .bind(("127.0.0.1", 0))?;
        let addr = server.addrs()[0];
        actix_web::rt::spawn(server.run());
        Ok(Self {
            base_url: format!("http://{}", addr),
            state,
        })
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }
}

async fn respond(req: HttpRequest, body: web::Bytes, state: web::Data<StubState>) -> HttpResponse {
    let reply = {
        let mut requests = state.requests.lock().unwrap();
        requests.push(RecordedRequest {
            method: req.method().to_string(),
            path: req.path().to_string(),
            query: req.query_string().to_string(),
            headers: req
                .headers()
                .iter()
                .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or_default().to_string()))
                .collect(),
            body: body.to_vec(),
        });
        let index = (requests.len() - 1).min(state.responses.len().saturating_sub(1));
        state.responses.get(index).cloned()
    };

    if !state.delay.is_zero() {
        actix_web::rt::time::sleep(state.delay).await;
    }

    match reply {
        Some((status, body)) => HttpResponse::build(StatusCode::from_u16(status).unwrap())
            .content_type("application/json")
            .body(body),
        None => HttpResponse::NotFound().finish(),
    }
}
