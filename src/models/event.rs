// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Recommended event model and conversion from workflow payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key under which the events workflow returns its list.
pub const RECOMMENDED_EVENTS_KEY: &str = "recommended_events";

/// A recommended event stored for a user.
///
/// All fields are optional; the workflow output is not strictly typed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub name: Option<String>,
    pub address: Option<String>,
    /// Postal code
    pub zip: Option<String>,
    /// Accessibility flag as received ("true"/"false" or free text)
    pub accessible: Option<String>,
    /// Free-of-charge flag as received
    pub priceless: Option<String>,
    /// `YYYY-MM-DD HH:MM` or `YYYY-MM-DD`
    pub date: Option<String>,
    /// Description
    pub text: Option<String>,
    pub relevance_score: Option<f64>,
}

impl Event {
    /// Convert one entry of the workflow's event list.
    ///
    /// Non-object entries yield `None`.
    pub fn from_json(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let text_field = |key: &str| obj.get(key).and_then(value_as_text);

        Some(Self {
            name: text_field("name"),
            address: text_field("address"),
            zip: text_field("zip"),
            accessible: text_field("accessible"),
            priceless: text_field("priceless"),
            date: text_field("date"),
            text: text_field("text"),
            relevance_score: obj.get("relevance_score").and_then(value_as_f64),
        })
    }
}

/// Pull the event list out of an extracted workflow payload.
///
/// Returns `None` when the payload has no `recommended_events` list, which
/// means "leave the stored events alone". An empty list is `Some(vec![])`.
pub fn recommended_events(payload: &Value) -> Option<Vec<Event>> {
    let list = payload.get(RECOMMENDED_EVENTS_KEY)?.as_array()?;
    Some(list.iter().filter_map(Event::from_json).collect())
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
