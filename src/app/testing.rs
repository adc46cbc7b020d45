//! In-memory collaborators for crawl tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::analyze::DiscoverySink;
use super::error::FetchError;
use super::fetch::PageFetcher;

/// Serves canned pages and counts how often each address was requested.
#[derive(Default)]
pub struct FakeFetcher {
    pages: HashMap<String, Result<String, u16>>,
    calls: Mutex<HashMap<String, usize>>,
    latency: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn page(mut self, url: &str, body: String) -> Self {
        self.pages.insert(url.to_string(), Ok(body));
        self
    }

    pub fn failing(mut self, url: &str, status: u16) -> Self {
        self.pages.insert(url.to_string(), Err(status));
        self
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        *self.calls.lock().unwrap().entry(url.to_string()).or_insert(0) += 1;
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        match self.pages.get(url) {
            Some(Ok(body)) => Ok(body.clone().into_bytes()),
            Some(Err(status)) => Err(FetchError::HttpStatus(*status)),
            None => Err(FetchError::HttpStatus(404)),
        }
    }
}

#[derive(Default)]
pub struct CollectingSink(Mutex<Vec<String>>);

impl CollectingSink {
    pub fn urls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, url: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|u| *u == url).count()
    }
}

impl DiscoverySink for CollectingSink {
    fn discovered(&self, url: &str) {
        self.0.lock().unwrap().push(url.to_string());
    }
}

pub fn html_page(text: &str, links: &[&str]) -> String {
    let anchors = links
        .iter()
        .map(|link| format!("<a href=\"{link}\">link</a>"))
        .collect::<String>();
    format!("<html><body><p>{text}</p>{anchors}</body></html>")
}
