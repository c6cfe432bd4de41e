use std::fmt;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::state::TableId;

/// Segment of the ready-food topic that carries the table id,
/// as in `osensa/table/{id}/food`.
const TABLE_SEGMENT: usize = 2;
const PREVIEW_LEN: usize = 40;

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("topic {0:?} has no table segment")]
    InvalidTopic(String),

    #[error("table id {0:?} is not a positive number")]
    InvalidTableId(String),

    #[error("payload is not valid JSON: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    #[error("payload has no foodName")]
    MissingFoodName,

    #[error("payload has no integer tableId")]
    MissingTableId,
}

/// A message received from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub received_at: DateTime<Local>,
}

impl MqttMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        MqttMessage {
            topic: topic.into(),
            payload: payload.into(),
            received_at: Local::now(),
        }
    }

    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

impl fmt::Display for MqttMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let text = self.payload_text();
        let preview: String = text.chars().take(PREVIEW_LEN).collect();
        let ellipsis = if text.chars().count() > PREVIEW_LEN { "..." } else { "" };
        write!(
            f,
            "{} {} - {}{}",
            self.received_at.format("%H:%M:%S"),
            self.topic,
            preview,
            ellipsis
        )
    }
}

/// Payload published by the kitchen when food is ready for a table.
/// The table itself is carried in the topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyFood {
    pub food_name: String,
}

/// Payload a table publishes to order food from the kitchen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub table_id: TableId,
    pub food_name: String,
}

impl Order {
    pub fn new(table_id: TableId, food_name: impl Into<String>) -> Self {
        Order {
            table_id,
            food_name: food_name.into(),
        }
    }

    pub fn to_payload(&self) -> Result<Vec<u8>, MessageError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// An order as the kitchen reads it off the wire. Any JSON integer is taken
/// as the table id, whether or not such a table exists; the ready food is
/// announced on that table's topic regardless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    pub table_id: i64,
    pub food_name: String,
}

impl OrderRequest {
    /// Parses an order payload. `tableId` must be a JSON integer and
    /// `foodName` a non-empty string.
    pub fn from_payload(payload: &[u8]) -> Result<Self, MessageError> {
        let value: Value = serde_json::from_slice(payload)?;
        let table_id = value
            .get("tableId")
            .and_then(Value::as_i64)
            .ok_or(MessageError::MissingTableId)?;
        let food_name = food_name_of(&value)?;
        Ok(OrderRequest {
            table_id,
            food_name,
        })
    }
}

/// Topic the kitchen publishes ready food for `table_id` on.
pub fn food_ready_topic(table_id: impl fmt::Display) -> String {
    format!("osensa/table/{}/food", table_id)
}

/// Extracts the table and food name from a ready-food message.
pub fn parse_ready_food(topic: &str, payload: &[u8]) -> Result<(TableId, ReadyFood), MessageError> {
    let segment = topic
        .split('/')
        .nth(TABLE_SEGMENT)
        .ok_or_else(|| MessageError::InvalidTopic(topic.to_string()))?;
    // Strict: "3abc", "3.0" and " 3" are rejected, not read as table 3.
    let table_id = match segment.parse::<u32>() {
        Ok(id) if id != 0 => TableId(id),
        _ => return Err(MessageError::InvalidTableId(segment.to_string())),
    };

    let value: Value = serde_json::from_slice(payload)?;
    let food_name = food_name_of(&value)?;
    Ok((table_id, ReadyFood { food_name }))
}

fn food_name_of(value: &Value) -> Result<String, MessageError> {
    match value.get("foodName").and_then(Value::as_str) {
        Some(name) if !name.is_empty() => Ok(name.to_string()),
        _ => Err(MessageError::MissingFoodName),
    }
}
