//! Push tickets: the per-recipient result of a send request.

use serde::{Deserialize, Serialize};

use super::error::DeliveryErrorCode;
use super::message::PushToken;

/// Error details attached to a failed ticket or receipt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryDetails {
    #[serde(default)]
    pub error: DeliveryErrorCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expo_push_token: Option<PushToken>,
}

/// One entry of a send response's `data` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TicketPayload {
    Ok {
        id: String,
    },
    Error {
        message: String,
        #[serde(default)]
        details: DeliveryDetails,
    },
}

/// A ticket paired with the recipient it was issued for.
///
/// A rejected recipient is still a ticket (status `error`); only a failed
/// request leaves no ticket at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushTicket {
    pub token: PushToken,
    #[serde(flatten)]
    pub status: TicketPayload,
}

impl PushTicket {
    pub fn new(token: PushToken, status: TicketPayload) -> Self {
        Self { token, status }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.status, TicketPayload::Ok { .. })
    }

    /// Receipt id to poll later; only successful tickets have one.
    pub fn receipt_id(&self) -> Option<&str> {
        match &self.status {
            TicketPayload::Ok { id } => Some(id.as_str()),
            TicketPayload::Error { .. } => None,
        }
    }

    pub fn error_code(&self) -> Option<DeliveryErrorCode> {
        match &self.status {
            TicketPayload::Ok { .. } => None,
            TicketPayload::Error { details, .. } => Some(details.error),
        }
    }
}
