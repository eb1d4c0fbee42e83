//! Push receipts: the delivery result looked up by ticket id.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::error::DeliveryErrorCode;
use super::ticket::DeliveryDetails;

/// Maximum number of receipt ids per `getReceipts` request.
pub const MAX_RECEIPT_COUNT: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ReceiptStatus {
    Ok,
    Error {
        message: String,
        #[serde(default)]
        details: DeliveryDetails,
    },
    /// The API has no receipt for this id yet.
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushReceipt {
    pub id: String,
    #[serde(flatten)]
    pub status: ReceiptStatus,
}

impl PushReceipt {
    pub fn is_ok(&self) -> bool {
        matches!(self.status, ReceiptStatus::Ok)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.status, ReceiptStatus::Pending)
    }

    pub fn error_code(&self) -> Option<DeliveryErrorCode> {
        match &self.status {
            ReceiptStatus::Error { details, .. } => Some(details.error),
            _ => None,
        }
    }
}

/// Order the `data` map of a receipts response by the requested `ids`.
///
/// Ids absent from the response come back [`ReceiptStatus::Pending`], so the
/// result always has exactly one receipt per requested id. An id requested
/// more than once gets the same receipt at every position.
pub fn align_receipts(ids: &[String], data: HashMap<String, ReceiptStatus>) -> Vec<PushReceipt> {
    ids.iter()
        .map(|id| PushReceipt {
            id: id.clone(),
            status: data.get(id).cloned().unwrap_or(ReceiptStatus::Pending),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_follows_request_order_and_marks_missing() {
        let raw = r#"{
            "c": {"status": "error", "message": "too big", "details": {"error": "MessageTooBig"}},
            "a": {"status": "ok"}
        }"#;
        let data: HashMap<String, ReceiptStatus> = serde_json::from_str(raw).unwrap();
        let ids: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();

        let receipts = align_receipts(&ids, data);
        assert_eq!(receipts.len(), 3);
        assert!(receipts[0].is_ok());
        assert!(receipts[1].is_pending());
        assert_eq!(receipts[2].error_code(), Some(DeliveryErrorCode::MessageTooBig));
        assert_eq!(receipts[2].id, "c");
    }

    #[test]
    fn duplicate_ids_share_one_receipt() {
        let mut data = HashMap::new();
        data.insert("a".to_string(), ReceiptStatus::Ok);
        let ids = vec!["a".to_string(), "b".to_string(), "a".to_string()];

        let receipts = align_receipts(&ids, data);
        assert!(receipts[0].is_ok());
        assert!(receipts[1].is_pending());
        assert!(receipts[2].is_ok());
        assert_eq!(receipts[2].id, "a");
    }
}
