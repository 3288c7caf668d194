//! Prometheus counters for the DNS server and HTTP API.
//!
//! A single [`Metrics`] value is created at startup and handed to the DNS handler and the API
//! state; there are no process-global collectors.

use crate::error::Error;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    dns_requests_total: IntCounterVec,
    api_requests_total: IntCounterVec,
}

impl Metrics {
    /// # Errors
    ///
    /// Returns [`Error::Metrics`] if a collector can't be created or registered.
    pub fn new() -> Result<Self, Error> {
        let registry = Registry::new();

        let dns_requests_total = IntCounterVec::new(
            Opts::new(
                "acmetxt_dns_requests_total",
                "DNS queries for names in the configured zones, by outcome",
            ),
            &["outcome"],
        )?;
        let api_requests_total = IntCounterVec::new(
            Opts::new("acmetxt_api_requests_total", "HTTP API requests, by endpoint"),
            &["endpoint"],
        )?;

        registry.register(Box::new(dns_requests_total.clone()))?;
        registry.register(Box::new(api_requests_total.clone()))?;

        Ok(Self {
            registry,
            dns_requests_total,
            api_requests_total,
        })
    }

    pub fn inc_dns(&self, outcome: &str) {
        self.dns_requests_total.with_label_values(&[outcome]).inc();
    }

    pub fn inc_api(&self, endpoint: &str) {
        self.api_requests_total.with_label_values(&[endpoint]).inc();
    }

    /// Encode every registered metric in the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Metrics`] if encoding fails.
    pub fn render(&self) -> Result<Vec<u8>, Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }
}
