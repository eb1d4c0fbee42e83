//! expopush-core: batching engine and push-domain types for the Expo push API.
//!
//! # Overview
//!
//! The push API caps every request (100 notifications per send, 1000 ids per
//! receipt lookup) and throttles clients. This crate turns an arbitrarily
//! large input into capacity-bounded requests, runs them concurrently under a
//! rate limit, and reassembles one index-stable result:
//!
//! - [`chunk()`]: greedy splitting of weighted [`WorkItem`]s into [`Batch`]es
//! - [`Dispatcher`] / [`dispatch()`]: bounded-concurrency, rate-limited
//!   execution of a [`BatchHandler`] with per-batch failure isolation
//! - [`aggregate()`]: [`BatchOutcome`]s folded into a [`BatchRun`] holding results
//!   by global index plus an [`ErrorLog`] of failed index ranges
//! - [`BatchEngine`]: the three stages behind one call
//! - [`ExpoPush`]: notification sends and receipt lookups over any
//!   [`PushTransport`]
//! - [`push`] module: messages, tickets, receipts and error codes

pub mod aggregate;
pub mod batch;
pub mod chunk;
pub mod client;
pub mod collection;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod handler;
pub mod policy;
pub mod push;
pub mod transport;

pub use aggregate::{aggregate, BatchRun};
pub use batch::{Batch, BatchEntry, BatchFailure, BatchOutcome, FailureKind, WorkItem};
pub use chunk::chunk;
pub use client::ExpoPush;
pub use collection::{ErrorLog, IndexedCollection, ResultCollection};
pub use dispatch::{dispatch, Dispatcher, FailurePolicy};
pub use engine::{BatchEngine, EngineConfig};
pub use error::{EngineError, TransportError};
pub use handler::{handler_fn, BatchHandler, HandlerFn};
pub use policy::{RateLimitConfig, RateLimiter};
pub use push::{
    ApiError, DeliveryErrorCode, PushError, PushErrorCode, PushMessage, PushReceipt, PushTicket,
    PushToken, ReceiptStatus, Recipients, TicketPayload,
};
pub use transport::PushTransport;
