//! Shared test transport.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use horizon_lattice_graphql::{
    FetchError, HttpMethod, Result, Transport, TransportRequest, TransportResponse,
};
use parking_lot::Mutex;
use serde_json::{Value, json};

/// One scripted reply.
pub enum Reply {
    Json(u16, Value),
    Raw(u16, &'static str),
    Fail(FetchError),
}

impl Reply {
    pub fn data(data: Value) -> Self {
        Self::Json(200, json!({ "data": data }))
    }

    pub fn not_found() -> Self {
        Self::Json(200, json!({ "errors": [{ "message": "PersistedQueryNotFound" }] }))
    }
}

/// A transport that replays scripted replies and records every request.
///
/// When the script runs out, requests are answered with `{"data":{}}`.
#[derive(Clone, Default)]
pub struct MockTransport {
    script: Arc<Mutex<VecDeque<(Reply, Option<Duration>)>>>,
    calls: Arc<Mutex<Vec<TransportRequest>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, reply: Reply) -> Self {
        self.script.lock().push_back((reply, None));
        self
    }

    pub fn reply_after(self, delay: Duration, reply: Reply) -> Self {
        self.script.lock().push_back((reply, Some(delay)));
        self
    }

    pub fn calls(&self) -> Vec<TransportRequest> {
        self.calls.lock().clone()
    }

    pub fn methods(&self) -> Vec<HttpMethod> {
        self.calls.lock().iter().map(|c| c.method).collect()
    }

    pub fn body(&self, index: usize) -> Value {
        let calls = self.calls.lock();
        let body = calls[index].body.as_deref().expect("request has no body");
        serde_json::from_str(body).expect("body is not JSON")
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn fetch(&self, request: TransportRequest) -> Result<TransportResponse> {
        self.calls.lock().push(request);
        let next = self.script.lock().pop_front();
        let Some((reply, delay)) = next else {
            return Ok(TransportResponse::new(200, r#"{"data":{}}"#));
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match reply {
            Reply::Json(status, body) => Ok(TransportResponse::new(status, body.to_string())),
            Reply::Raw(status, body) => Ok(TransportResponse::new(status, body)),
            Reply::Fail(err) => Err(err),
        }
    }
}

/// A transport that answers each request after a delay taken from its
/// `delay` variable, echoing the variable `id` back as data.
#[derive(Clone, Default)]
pub struct EchoTransport {
    pub completed: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Transport for EchoTransport {
    async fn fetch(&self, request: TransportRequest) -> Result<TransportResponse> {
        let body: Value = serde_json::from_str(request.body.as_deref().unwrap_or("{}"))?;
        let id = body["variables"]["id"].as_str().unwrap_or_default().to_string();
        let delay = body["variables"]["delay"].as_u64().unwrap_or(0);

        tokio::time::sleep(Duration::from_millis(delay)).await;
        self.completed.lock().push(id.clone());

        Ok(TransportResponse::new(200, json!({ "data": { "id": id } }).to_string()))
    }
}
