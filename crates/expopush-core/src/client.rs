//! `ExpoPush`: batched notification sends and receipt lookups over a
//! [`PushTransport`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::aggregate::BatchRun;
use crate::batch::{Batch, BatchFailure, BatchOutcome};
use crate::dispatch::result_count_message;
use crate::engine::{BatchEngine, EngineConfig};
use crate::error::EngineError;
use crate::handler::BatchHandler;
use crate::push::message::{flatten_tokens, PushMessage};
use crate::push::receipt::{PushReceipt, MAX_RECEIPT_COUNT};
use crate::push::ticket::PushTicket;
use crate::push::MAX_NOTIFICATION_COUNT;
use crate::transport::PushTransport;

/// Push API client.
///
/// Notifications go out in requests of at most 100 recipients (a message to
/// more recipients is split across requests); receipts are fetched 1000 ids
/// per request. Ticket and receipt `i` always corresponds to recipient or id
/// `i` of the input, and is absent only if its request failed.
pub struct ExpoPush {
    transport: Arc<dyn PushTransport>,
    engine: BatchEngine,
}

impl ExpoPush {
    /// Client with the push API's default limits (6 concurrent requests, 6
    /// requests per second).
    pub fn new(transport: Arc<dyn PushTransport>) -> Self {
        Self {
            transport,
            engine: BatchEngine::with_defaults(),
        }
    }

    pub fn with_config(
        transport: Arc<dyn PushTransport>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            transport,
            engine: BatchEngine::new(config)?,
        })
    }

    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    /// Send `messages`, one ticket per recipient.
    pub async fn send_notifications(
        &self,
        messages: &[PushMessage],
    ) -> Result<BatchRun<PushTicket>, EngineError> {
        for message in messages {
            message.validate()?;
        }
        let handler = Arc::new(SendHandler {
            transport: self.transport.clone(),
        });
        self.engine
            .send_in_batches(messages, MAX_NOTIFICATION_COUNT, handler)
            .await
    }

    /// Fetch the receipts for `ids`, one receipt per id.
    pub async fn get_receipts(&self, ids: &[String]) -> Result<BatchRun<PushReceipt>, EngineError> {
        let handler = Arc::new(ReceiptHandler {
            transport: self.transport.clone(),
        });
        self.engine
            .send_in_batches(ids, MAX_RECEIPT_COUNT, handler)
            .await
    }
}

struct SendHandler {
    transport: Arc<dyn PushTransport>,
}

#[async_trait]
impl BatchHandler<PushMessage, PushTicket> for SendHandler {
    async fn handle(&self, batch: Batch<PushMessage>) -> BatchOutcome<PushTicket> {
        let messages: Vec<PushMessage> = batch.items().cloned().collect();
        let tokens = flatten_tokens(&messages);

        match self.transport.send_messages(&messages).await {
            Ok(payloads) => {
                if payloads.len() != tokens.len() {
                    return BatchOutcome::Failure(BatchFailure::transport(result_count_message(
                        tokens.len(),
                        payloads.len(),
                    )));
                }
                let tickets = tokens
                    .into_iter()
                    .zip(payloads)
                    .map(|(token, payload)| PushTicket::new(token, payload))
                    .collect();
                BatchOutcome::Success(tickets)
            }
            Err(err) => BatchOutcome::Failure(err.into()),
        }
    }
}

struct ReceiptHandler {
    transport: Arc<dyn PushTransport>,
}

#[async_trait]
impl BatchHandler<String, PushReceipt> for ReceiptHandler {
    async fn handle(&self, batch: Batch<String>) -> BatchOutcome<PushReceipt> {
        let ids: Vec<String> = batch.items().cloned().collect();
        self.transport.fetch_receipts(&ids).await.into()
    }
}
