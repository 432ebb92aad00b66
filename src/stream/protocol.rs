//! Frames exchanged with the backend's event stream.

use crate::error::{DeckError, Result};
use crate::stream::{StreamEvent, Topic};
use serde::{Deserialize, Serialize};

/// Sent once every time the socket opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeFrame<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub guild_id: &'a str,
    pub endpoints: &'a [String],
}

impl<'a> SubscribeFrame<'a> {
    #[must_use]
    pub const fn new(guild_id: &'a str, endpoints: &'a [String]) -> Self {
        Self {
            kind: "subscribe",
            guild_id,
            endpoints,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    guild_id: Option<String>,
    #[serde(default)]
    data: serde_json::Map<String, serde_json::Value>,
}

fn is_update(kind: &str) -> bool {
    matches!(kind, "update" | "immediate_update")
}

/// Decode one text frame into notifications.
///
/// An update yields one [`Topic::Key`] event per key of its `data` object,
/// in key order, followed by one [`Topic::All`] event carrying the whole
/// object. Other frame types yield nothing.
///
/// # Errors
/// Returns `DeckError::Stream` if the frame is not a JSON object with a
/// `type` field.
pub fn decode_frame(text: &str, default_guild: &str) -> Result<Vec<StreamEvent>> {
    let frame: UpdateFrame =
        serde_json::from_str(text).map_err(|e| DeckError::Stream(format!("bad frame: {e}")))?;

    if !is_update(&frame.kind) {
        return Ok(Vec::new());
    }

    let guild_id = frame
        .guild_id
        .unwrap_or_else(|| default_guild.to_string());

    let mut events: Vec<StreamEvent> = frame
        .data
        .iter()
        .map(|(key, payload)| StreamEvent {
            guild_id: guild_id.clone(),
            topic: Topic::Key(key.clone()),
            payload: payload.clone(),
        })
        .collect();

    events.push(StreamEvent {
        guild_id,
        topic: Topic::All,
        payload: serde_json::Value::Object(frame.data),
    });

    Ok(events)
}
