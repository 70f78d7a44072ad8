#![allow(dead_code)]

use async_trait::async_trait;
use fetchcache::{FetchError, Transport, TransportResponse};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::Semaphore;

/// Canned-response transport that counts calls per URL.
///
/// With a gate, every fetch waits for a permit, which keeps keys in flight
/// until the test calls `release`.
#[derive(Default)]
pub struct MockTransport {
    responses: Mutex<HashMap<String, Result<(u16, String), FetchError>>>,
    calls: Mutex<HashMap<String, usize>>,
    total: AtomicUsize,
    gate: Option<Semaphore>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    pub fn respond(self, url: &str, status: u16, body: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), Ok((status, body.to_string())));
        self
    }

    pub fn fail(self, url: &str, message: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), Err(FetchError::transport(message)));
        self
    }

    pub fn release(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn fetch(&self, url: &str) -> Result<TransportResponse, FetchError> {
        self.total.fetch_add(1, Ordering::SeqCst);
        *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        let response = self.responses.lock().unwrap().get(url).cloned();
        match response {
            Some(Ok((status, body))) => Ok(TransportResponse::new(status, body)),
            Some(Err(e)) => Err(e),
            None => Ok(TransportResponse::new(404, "")),
        }
    }
}
