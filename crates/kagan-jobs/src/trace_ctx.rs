use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// TraceContext — W3C Trace Context propagation
// ---------------------------------------------------------------------------

/// Lightweight W3C Trace Context for propagating correlation IDs across
/// agent spawns, HTTP requests, and async task boundaries.
///
/// This is a simplified implementation of the W3C Trace Context specification
/// that carries a trace ID, span ID, and optional baggage through the system.
///
/// Usage:
/// ```ignore
/// let ctx = TraceContext::new();
/// let child = ctx.child_span();
/// // Pass ctx.to_headers() when spawning an agent or making an HTTP call
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    /// Unique trace ID (spans the entire request lifecycle).
    pub trace_id: String,
    /// Current span ID.
    pub span_id: String,
    /// Parent span ID (None for root spans).
    pub parent_span_id: Option<String>,
    /// Sampling flag (true = sampled).
    pub sampled: bool,
    /// Arbitrary key-value baggage propagated across boundaries.
    pub baggage: HashMap<String, String>,
}

impl TraceContext {
    /// Create a new root trace context.
    pub fn new() -> Self {
        Self {
            trace_id: Uuid::new_v4().to_string().replace('-', ""),
            span_id: Self::generate_span_id(),
            parent_span_id: None,
            sampled: true,
            baggage: HashMap::new(),
        }
    }

    /// Create a child span under this context (same trace, new span).
    pub fn child_span(&self) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            span_id: Self::generate_span_id(),
            parent_span_id: Some(self.span_id.clone()),
            sampled: self.sampled,
            baggage: self.baggage.clone(),
        }
    }

    /// Add a baggage item.
    pub fn with_baggage(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.baggage.insert(key.into(), value.into());
        self
    }

    /// Set sampling flag.
    pub fn with_sampled(mut self, sampled: bool) -> Self {
        self.sampled = sampled;
        self
    }

    /// Serialize to W3C `traceparent` header format.
    ///
    /// Format: `{version}-{trace_id}-{span_id}-{flags}`
    pub fn to_traceparent(&self) -> String {
        let flags = if self.sampled { "01" } else { "00" };
        // Pad/truncate trace_id to 32 hex chars, span_id to 16 hex chars
        let trace_id = format!("{:0>32}", &self.trace_id[..self.trace_id.len().min(32)]);
        let span_id = format!("{:0>16}", &self.span_id[..self.span_id.len().min(16)]);
        format!("00-{}-{}-{}", trace_id, span_id, flags)
    }

    /// Parse from a W3C `traceparent` header.
    pub fn from_traceparent(header: &str) -> Option<Self> {
        let parts: Vec<&str> = header.split('-').collect();
        if parts.len() != 4 {
            return None;
        }

        let _version = parts[0];
        let trace_id = parts[1].to_string();
        let span_id = parts[2].to_string();
        let flags = parts[3];

        if trace_id.len() != 32 || span_id.len() != 16 {
            return None;
        }

        let sampled = flags.ends_with('1');

        Some(Self {
            trace_id,
            span_id,
            parent_span_id: None,
            sampled,
            baggage: HashMap::new(),
        })
    }

    /// Convert to HTTP headers for propagation.
    pub fn to_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert("traceparent".to_string(), self.to_traceparent());

        if !self.baggage.is_empty() {
            let baggage_str = self
                .baggage
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(",");
            headers.insert("baggage".to_string(), baggage_str);
        }

        headers
    }

    /// Parse from HTTP headers.
    pub fn from_headers(headers: &HashMap<String, String>) -> Option<Self> {
        let traceparent = headers.get("traceparent")?;
        let mut ctx = Self::from_traceparent(traceparent)?;

        if let Some(baggage_str) = headers.get("baggage") {
            for item in baggage_str.split(',') {
                if let Some((key, value)) = item.split_once('=') {
                    ctx.baggage
                        .insert(key.trim().to_string(), value.trim().to_string());
                }
            }
        }

        Some(ctx)
    }

    /// Convert to environment variables for subprocess propagation.
    pub fn to_env_vars(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();
        env.insert("TRACEPARENT".to_string(), self.to_traceparent());
        env.insert("AT_TRACE_ID".to_string(), self.trace_id.clone());
        env.insert("AT_SPAN_ID".to_string(), self.span_id.clone());
        if let Some(ref parent) = self.parent_span_id {
            env.insert("AT_PARENT_SPAN_ID".to_string(), parent.clone());
        }
        for (k, v) in &self.baggage {
            env.insert(format!("AT_BAGGAGE_{}", k.to_uppercase()), v.clone());
        }
        env
    }

    /// Reconstruct from environment variables.
    pub fn from_env_vars(env: &HashMap<String, String>) -> Option<Self> {
        if let Some(traceparent) = env.get("TRACEPARENT") {
            return Self::from_traceparent(traceparent);
        }

        let trace_id = env.get("AT_TRACE_ID")?.clone();
        let span_id = env.get("AT_SPAN_ID")?.clone();
        let parent_span_id = env.get("AT_PARENT_SPAN_ID").cloned();

        let mut baggage = HashMap::new();
        for (k, v) in env {
            if let Some(key) = k.strip_prefix("AT_BAGGAGE_") {
                baggage.insert(key.to_lowercase(), v.clone());
            }
        }

        Some(Self {
            trace_id,
            span_id,
            parent_span_id,
            sampled: true,
            baggage,
        })
    }

    /// Check if this is a root span.
    pub fn is_root(&self) -> bool {
        self.parent_span_id.is_none()
    }

    fn generate_span_id() -> String {
        let id = Uuid::new_v4();
        let bytes = id.as_bytes();
        hex::encode(&bytes[..8])
    }
}

impl Default for TraceContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TraceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_traceparent())
    }
}

// ---------------------------------------------------------------------------
// hex encoding (minimal, avoids adding the `hex` crate just for 8 bytes)
// ---------------------------------------------------------------------------

mod hex {
    const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";

    pub fn encode(bytes: &[u8]) -> String {
        let mut s = String::with_capacity(bytes.len() * 2);
        for &b in bytes {
            s.push(HEX_CHARS[(b >> 4) as usize] as char);
            s.push(HEX_CHARS[(b & 0x0f) as usize] as char);
        }
        s
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
