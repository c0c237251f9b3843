use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;
use strum::{AsRefStr, Display, EnumString};

/// A contact thread as listed in the sidebar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub wa_id: String,
    #[serde(default)]
    pub contact_name: String,
    #[serde(default)]
    pub last_message: String,
    #[serde(default, deserialize_with = "de_timestamp")]
    pub last_timestamp: i64,
    #[serde(default)]
    pub unread_count: u32,
}

/// One message within a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default)]
    pub message_id: String,
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    pub wa_id: String,
    #[serde(default)]
    pub message_body: String,
    #[serde(default, deserialize_with = "de_timestamp")]
    pub timestamp: i64,
    #[serde(default)]
    pub is_from_business: bool,
    #[serde(default)]
    pub status: MessageStatus,
}

impl Message {
    /// Stable identity for rendering: the backend message id, else the record id
    pub fn key(&self) -> &str {
        if self.message_id.is_empty() {
            self.record_id.as_deref().unwrap_or_default()
        } else {
            &self.message_id
        }
    }
}

/// Fields carried by a `message_update` event. Only what the server sent
/// is applied; a bare status change leaves body and timestamp alone.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageUpdate {
    #[serde(default)]
    pub message_id: String,
    #[serde(rename = "_id", default)]
    pub record_id: Option<String>,
    pub wa_id: String,
    pub message_body: Option<String>,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub timestamp: Option<i64>,
    pub is_from_business: Option<bool>,
    pub status: Option<MessageStatus>,
}

impl MessageUpdate {
    pub fn key(&self) -> &str {
        if self.message_id.is_empty() {
            self.record_id.as_deref().unwrap_or_default()
        } else {
            &self.message_id
        }
    }
}

impl Message {
    /// Merge the fields present in `update` into this message
    pub fn apply_update(&mut self, update: MessageUpdate) {
        if let Some(body) = update.message_body {
            self.message_body = body;
        }
        if let Some(timestamp) = update.timestamp {
            self.timestamp = timestamp;
        }
        if let Some(from_business) = update.is_from_business {
            self.is_from_business = from_business;
        }
        if let Some(status) = update.status {
            self.status = status;
        }
    }
}

/// Delivery status of a business-sent message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, EnumString, AsRefStr, Display)]
#[strum(serialize_all = "lowercase")]
pub enum MessageStatus {
    #[default]
    Sent,
    Delivered,
    Read,
}

impl Serialize for MessageStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_ref())
    }
}

// Anything the backend sends that we don't recognise renders as `sent`.
impl<'de> Deserialize<'de> for MessageStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw
            .and_then(|s| MessageStatus::from_str(&s.to_lowercase()).ok())
            .unwrap_or_default())
    }
}

/// Payload of the `messages_read` live event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesRead {
    pub wa_id: String,
    #[serde(default)]
    pub message_ids: Vec<String>,
}

/// `{ success, data }` wrapper used by every REST response
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub success: bool,
    pub data: Option<T>,
}

impl<T> ApiEnvelope<Vec<T>> {
    /// Missing or null collections are treated as empty
    pub fn into_items(self) -> Vec<T> {
        self.data.unwrap_or_default()
    }
}

/// Request body for `POST /messages/send`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest<'a> {
    pub wa_id: &'a str,
    pub message_body: &'a str,
    pub contact_name: &'a str,
}

fn de_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    Ok(de_opt_timestamp(deserializer)?.unwrap_or(0))
}

fn de_opt_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Int(v)) => Ok(Some(v)),
        Some(Raw::Float(v)) => Ok(Some(v as i64)),
        Some(Raw::Text(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

/// Up to two uppercase initials taken from the first letters of the words in `name`
pub fn initials(name: &str) -> String {
    name.split_whitespace()
        .filter_map(|word| word.chars().next())
        .flat_map(char::to_uppercase)
        .take(2)
        .collect()
}
