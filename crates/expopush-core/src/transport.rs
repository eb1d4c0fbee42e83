//! The `PushTransport` trait: the external collaborator every batch goes
//! through.

use async_trait::async_trait;

use crate::error::TransportError;
use crate::push::message::PushMessage;
use crate::push::receipt::PushReceipt;
use crate::push::ticket::TicketPayload;

/// Sends one request to the push API.
///
/// Implementations own everything below the batch: HTTP, auth, compression,
/// per-call timeouts. A timeout must surface as an ordinary
/// [`TransportError`], never as a panic or a hang.
///
/// # Thread Safety
/// Implementations must be `Send + Sync`; they are stored as
/// `Arc<dyn PushTransport>` and shared by every dispatch worker.
#[async_trait]
pub trait PushTransport: Send + Sync + 'static {
    /// Send one batch of messages; returns one ticket payload per recipient,
    /// in recipient order.
    async fn send_messages(
        &self,
        messages: &[PushMessage],
    ) -> Result<Vec<TicketPayload>, TransportError>;

    /// Look up receipts; returns exactly one receipt per id, in `ids` order.
    async fn fetch_receipts(&self, ids: &[String]) -> Result<Vec<PushReceipt>, TransportError>;

    /// The transport's identifier (base URL or name).
    fn name(&self) -> &str;
}
