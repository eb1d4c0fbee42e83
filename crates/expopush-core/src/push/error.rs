//! Error codes, decoded API errors and error-log entries.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Request-level error code reported by the push API (or synthesized by the
/// engine for failures that produced no structured response).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PushErrorCode {
    #[default]
    Unknown,
    Failed,
    Unauthorized,
    TooManyRequests,
    PushTooManyExperienceIds,
    PushTooManyNotifications,
    PushTooManyReceipts,
}

impl PushErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Failed => "FAILED",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::TooManyRequests => "TOO_MANY_REQUESTS",
            Self::PushTooManyExperienceIds => "PUSH_TOO_MANY_EXPERIENCE_IDS",
            Self::PushTooManyNotifications => "PUSH_TOO_MANY_NOTIFICATIONS",
            Self::PushTooManyReceipts => "PUSH_TOO_MANY_RECEIPTS",
        }
    }

    /// Decode a wire code; anything unrecognised becomes [`Self::Unknown`].
    pub fn from_code(code: &str) -> Self {
        match code {
            "FAILED" => Self::Failed,
            "UNAUTHORIZED" => Self::Unauthorized,
            "TOO_MANY_REQUESTS" => Self::TooManyRequests,
            "PUSH_TOO_MANY_EXPERIENCE_IDS" => Self::PushTooManyExperienceIds,
            "PUSH_TOO_MANY_NOTIFICATIONS" => Self::PushTooManyNotifications,
            "PUSH_TOO_MANY_RECEIPTS" => Self::PushTooManyReceipts,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for PushErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for PushErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PushErrorCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = Option::<String>::deserialize(deserializer)?;
        Ok(code.as_deref().map(Self::from_code).unwrap_or_default())
    }
}

/// Per-recipient delivery error carried by a failed ticket or receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeliveryErrorCode {
    #[default]
    Unknown,
    DeviceNotRegistered,
    InvalidCredentials,
    MessageRateExceeded,
    MessageTooBig,
    MismatchSenderId,
}

impl DeliveryErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::DeviceNotRegistered => "DeviceNotRegistered",
            Self::InvalidCredentials => "InvalidCredentials",
            Self::MessageRateExceeded => "MessageRateExceeded",
            Self::MessageTooBig => "MessageTooBig",
            Self::MismatchSenderId => "MismatchSenderId",
        }
    }

    pub fn from_code(code: &str) -> Self {
        match code {
            "DeviceNotRegistered" => Self::DeviceNotRegistered,
            "InvalidCredentials" => Self::InvalidCredentials,
            "MessageRateExceeded" => Self::MessageRateExceeded,
            "MessageTooBig" => Self::MessageTooBig,
            "MismatchSenderId" => Self::MismatchSenderId,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for DeliveryErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for DeliveryErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DeliveryErrorCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = Option::<String>::deserialize(deserializer)?;
        Ok(code.as_deref().map(Self::from_code).unwrap_or_default())
    }
}

/// One decoded error object from a failed request's `errors` array.
///
/// A single failed call may carry several of these (e.g. a validation error
/// and a rate-limit error together).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: PushErrorCode,
    #[serde(default = "unknown_message")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

fn unknown_message() -> String {
    "Unknown error".into()
}

impl ApiError {
    pub fn new(code: PushErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// An error-log entry: a batch-level failure and the logical index range it
/// left without results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushError {
    pub code: PushErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub start_index: usize,
    pub end_index: usize,
}

impl PushError {
    /// Returns `true` if `index` falls inside this entry's range.
    pub fn covers(&self, index: usize) -> bool {
        (self.start_index..=self.end_index).contains(&index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_api_errors() {
        let raw = r#"[
            {"code": "PUSH_TOO_MANY_EXPERIENCE_IDS", "message": "mixed projects", "details": {"a": ["t"]}},
            {"code": "SOMETHING_NEW", "message": "?"},
            {"message": "no code"},
            {}
        ]"#;
        let errors: Vec<ApiError> = serde_json::from_str(raw).unwrap();

        assert_eq!(errors[0].code, PushErrorCode::PushTooManyExperienceIds);
        assert!(errors[0].details.is_some());
        assert_eq!(errors[1].code, PushErrorCode::Unknown);
        assert_eq!(errors[2].code, PushErrorCode::Unknown);
        assert_eq!(errors[3].message, "Unknown error");
    }

    #[test]
    fn delivery_codes_fall_back_to_unknown() {
        let codes: Vec<DeliveryErrorCode> =
            serde_json::from_str(r#"["DeviceNotRegistered", "MessageTooBig", "Brand New", null]"#).unwrap();
        assert_eq!(
            codes,
            vec![
                DeliveryErrorCode::DeviceNotRegistered,
                DeliveryErrorCode::MessageTooBig,
                DeliveryErrorCode::Unknown,
                DeliveryErrorCode::Unknown,
            ]
        );
        assert_eq!(serde_json::to_string(&DeliveryErrorCode::MismatchSenderId).unwrap(), r#""MismatchSenderId""#);
    }

    #[test]
    fn error_log_entry_uses_camel_case() {
        let entry = PushError {
            code: PushErrorCode::Failed,
            message: "connection reset".into(),
            details: None,
            start_index: 100,
            end_index: 199,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["code"], "FAILED");
        assert_eq!(json["startIndex"], 100);
        assert_eq!(json["endIndex"], 199);
        assert!(json.get("details").is_none());
    }

    #[test]
    fn covers_is_inclusive() {
        let entry = PushError {
            code: PushErrorCode::Unknown,
            message: String::new(),
            details: None,
            start_index: 500,
            end_index: 599,
        };
        assert!(entry.covers(500));
        assert!(entry.covers(599));
        assert!(!entry.covers(600));
        assert!(!entry.covers(499));
    }
}
