//! expopush-http: `reqwest` transport for the Expo push API.
//!
//! [`HttpPushTransport`] implements
//! [`PushTransport`](expopush_core::PushTransport): one HTTP call per batch,
//! API error bodies decoded into
//! [`TransportError::Api`](expopush_core::TransportError::Api). Concurrency,
//! rate limiting and batching stay in `expopush-core`.

pub mod client;

pub use client::{
    BuildError, HttpPushTransport, HttpTransportConfig, COMPRESSION_THRESHOLD, DEFAULT_BASE_URL,
};
