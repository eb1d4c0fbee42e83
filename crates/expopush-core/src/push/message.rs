//! Push tokens and messages.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::batch::WorkItem;
use crate::error::EngineError;

/// Maximum JSON size of a single message's `data` field.
pub const MAX_MESSAGE_DATA_BYTES: usize = 4096;

/// An Expo push token (`ExponentPushToken[...]`). The value is passed
/// through untouched; the API is the judge of its validity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PushToken(String);

impl PushToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PushToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PushToken {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Who a message is addressed to: one token, or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Recipients {
    One(PushToken),
    Many(Vec<PushToken>),
}

impl Recipients {
    pub fn len(&self) -> usize {
        match self {
            Self::One(_) => 1,
            Self::Many(tokens) => tokens.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn tokens(&self) -> &[PushToken] {
        match self {
            Self::One(token) => std::slice::from_ref(token),
            Self::Many(tokens) => tokens,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Default,
    Normal,
    High,
}

/// iOS interruption level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InterruptionLevel {
    Active,
    Critical,
    Passive,
    TimeSensitive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RichContent {
    pub image: String,
}

/// A notification sent to one or more recipients.
///
/// A message addressed to `n` tokens yields `n` tickets, so its weight is its
/// recipient count and it can be split across requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    pub to: Recipients,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interruption_level: Option<InterruptionLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rich_content: Option<RichContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub mutable_content: bool,
    #[serde(default, rename = "_contentAvailable", skip_serializing_if = "is_false")]
    pub content_available: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl PushMessage {
    /// A message with only recipients set.
    pub fn new(to: Recipients) -> Self {
        Self {
            to,
            title: None,
            subtitle: None,
            body: None,
            ttl: None,
            data: None,
            expiration: None,
            priority: None,
            sound: None,
            badge: None,
            interruption_level: None,
            channel_id: None,
            icon: None,
            rich_content: None,
            category_id: None,
            mutable_content: false,
            content_available: false,
        }
    }

    pub fn to_token(token: impl Into<String>) -> Self {
        Self::new(Recipients::One(PushToken::new(token)))
    }

    pub fn to_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Recipients::Many(tokens.into_iter().map(PushToken::new).collect()))
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Number of notifications (and tickets) this message produces.
    pub fn notification_count(&self) -> usize {
        self.to.len()
    }

    /// Copy of this message addressed to `to` instead.
    pub fn copy_to(&self, to: Recipients) -> Self {
        Self { to, ..self.clone() }
    }

    /// Reject a `data` payload larger than [`MAX_MESSAGE_DATA_BYTES`].
    pub fn validate(&self) -> Result<(), EngineError> {
        let Some(data) = &self.data else {
            return Ok(());
        };
        let encoded = serde_json::to_vec(data).map_err(|e| {
            EngineError::invalid(format!("push message data could not be encoded as JSON: {e}"))
        })?;
        if encoded.len() > MAX_MESSAGE_DATA_BYTES {
            return Err(EngineError::invalid(format!(
                "push message data is {} bytes, the limit is {MAX_MESSAGE_DATA_BYTES}",
                encoded.len()
            )));
        }
        Ok(())
    }
}

impl WorkItem for PushMessage {
    fn weight(&self) -> usize {
        self.notification_count()
    }

    fn is_splittable(&self) -> bool {
        matches!(self.to, Recipients::Many(_))
    }

    fn slice(&self, range: Range<usize>) -> Self {
        self.copy_to(Recipients::Many(self.to.tokens()[range].to_vec()))
    }
}

/// Every recipient of `messages`, in send order.
pub fn flatten_tokens<'a, I>(messages: I) -> Vec<PushToken>
where
    I: IntoIterator<Item = &'a PushMessage>,
{
    messages
        .into_iter()
        .flat_map(|m| m.to.tokens().iter().cloned())
        .collect()
}
