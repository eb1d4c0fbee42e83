//! Push-domain types for the two batched operations: sending notifications
//! and fetching receipts.

pub mod error;
pub mod message;
pub mod receipt;
pub mod ticket;

pub use error::{ApiError, DeliveryErrorCode, PushError, PushErrorCode};
pub use message::{
    flatten_tokens, InterruptionLevel, Priority, PushMessage, PushToken, Recipients, RichContent,
    MAX_MESSAGE_DATA_BYTES,
};
pub use receipt::{align_receipts, PushReceipt, ReceiptStatus, MAX_RECEIPT_COUNT};
pub use ticket::{DeliveryDetails, PushTicket, TicketPayload};

/// Maximum number of notifications per send request.
pub const MAX_NOTIFICATION_COUNT: usize = 100;
