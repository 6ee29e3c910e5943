//! Per-request telemetry record.
//!
//! A Transaction is created when the request enters the worker and finalized
//! just before the response is written. Phase fields stay absent when the
//! phase did not execute. Timestamps are UTC ISO-8601; durations are
//! milliseconds, clamped to zero against clock skew.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Cache disposition of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CacheOutcome {
    #[serde(rename = "no-cache")]
    NoCache,
    #[serde(rename = "match")]
    Match,
    #[serde(rename = "miss")]
    Miss,
}

/// Flat per-request record delivered to the post-transaction sink.
#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
    pub id: Uuid,
    pub start: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,

    pub client_ip: String,
    pub method: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub request_bytes: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolving_start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolving_end: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolving_duration: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub preprocessing_start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preprocessing_end: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preprocessing_duration: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub postprocessing_start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postprocessing_end: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postprocessing_duration: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_request_start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_request_end: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_request_duration: Option<u64>,

    pub cancelled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancellation_reason: Option<String>,

    pub cache: CacheOutcome,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
    pub response_bytes: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_overhead: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overhead_pct: Option<f64>,
}

impl Transaction {
    pub fn begin(
        client_ip: String,
        method: String,
        url: String,
        user_agent: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            start: Utc::now(),
            end: None,
            duration: None,
            client_ip,
            method,
            url,
            user_agent,
            request_bytes: 0,
            resolving_start: None,
            resolving_end: None,
            resolving_duration: None,
            preprocessing_start: None,
            preprocessing_end: None,
            preprocessing_duration: None,
            postprocessing_start: None,
            postprocessing_end: None,
            postprocessing_duration: None,
            target_type: None,
            target_request_start: None,
            target_request_end: None,
            target_request_duration: None,
            cancelled: false,
            cancellation_reason: None,
            cache: CacheOutcome::NoCache,
            status: None,
            status_text: None,
            response_bytes: 0,
            total_overhead: None,
            overhead_pct: None,
        }
    }

    pub fn start_resolving(&mut self) {
        self.resolving_start = Some(Utc::now());
    }

    pub fn end_resolving(&mut self) {
        let end = Utc::now();
        self.resolving_end = Some(end);
        self.resolving_duration = elapsed_ms(self.resolving_start, end);
    }

    pub fn start_preprocessing(&mut self) {
        self.preprocessing_start = Some(Utc::now());
    }

    pub fn end_preprocessing(&mut self) {
        let end = Utc::now();
        self.preprocessing_end = Some(end);
        self.preprocessing_duration = elapsed_ms(self.preprocessing_start, end);
    }

    pub fn start_postprocessing(&mut self) {
        self.postprocessing_start = Some(Utc::now());
    }

    pub fn end_postprocessing(&mut self) {
        let end = Utc::now();
        self.postprocessing_end = Some(end);
        self.postprocessing_duration = elapsed_ms(self.postprocessing_start, end);
    }

    pub fn start_target_request(&mut self, target_type: &'static str) {
        self.target_type = Some(target_type);
        self.target_request_start = Some(Utc::now());
    }

    pub fn end_target_request(&mut self) {
        let end = Utc::now();
        self.target_request_end = Some(end);
        self.target_request_duration = elapsed_ms(self.target_request_start, end);
    }

    pub fn cancel(&mut self, reason: impl Into<String>) {
        self.cancelled = true;
        self.cancellation_reason = Some(reason.into());
    }

    /// Stamp the end of the request and derive durations and overhead.
    pub fn finalize(&mut self, status: u16, status_text: Option<&str>, response_bytes: u64) {
        let end = Utc::now();
        self.end = Some(end);
        let duration = elapsed_ms(Some(self.start), end).unwrap_or(0);
        self.duration = Some(duration);

        self.status = Some(status);
        self.status_text = status_text.map(str::to_owned);
        self.response_bytes = response_bytes;

        let overhead = duration.saturating_sub(self.target_request_duration.unwrap_or(0));
        self.total_overhead = Some(overhead);
        self.overhead_pct = if duration > 0 {
            Some((overhead as f64 / duration as f64) * 100.0)
        } else {
            Some(0.0)
        };
    }
}

fn elapsed_ms(start: Option<DateTime<Utc>>, end: DateTime<Utc>) -> Option<u64> {
    start.map(|s| (end - s).num_milliseconds().max(0) as u64)
}
