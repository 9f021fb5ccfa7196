//! Steuerpakete (Text-Frames)
//!
//! Text-Frames tragen ein JSON-Objekt mit den optionalen Feldern
//! `type`, `status`, `error` und `message`. Das Format ist offen: jede
//! andere Form wird nicht abgelehnt, sondern als unbekannt durchgereicht.
//! Kein Steuerpaket ist fuer die Sitzung fatal.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Rohe Form eines Steuerpakets
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlPacket {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Value>,
}

/// Ausgewertetes Steuerpaket
///
/// Vorrang bei mehreren Feldern: `error`, dann `status`, dann `message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    Fehler { typ: Option<String>, text: String },
    Status { typ: Option<String>, text: String },
    Nachricht { typ: Option<String>, text: String },
    /// Kein JSON-Objekt oder keines der erkannten Felder gesetzt
    Unbekannt { roh: String },
}

impl ControlMessage {
    /// Parst einen Text-Frame, schlaegt nie fehl
    pub fn parse(text: &str) -> Self {
        let unbekannt = || ControlMessage::Unbekannt {
            roh: text.to_string(),
        };

        let value: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(_) => return unbekannt(),
        };
        if !value.is_object() {
            return unbekannt();
        }
        let packet: ControlPacket = match serde_json::from_value(value) {
            Ok(p) => p,
            Err(_) => return unbekannt(),
        };

        let typ = packet.typ.as_ref().and_then(feld_text);
        if let Some(text) = packet.error.as_ref().and_then(feld_text) {
            ControlMessage::Fehler { typ, text }
        } else if let Some(text) = packet.status.as_ref().and_then(feld_text) {
            ControlMessage::Status { typ, text }
        } else if let Some(text) = packet.message.as_ref().and_then(feld_text) {
            ControlMessage::Nachricht { typ, text }
        } else {
            unbekannt()
        }
    }

    /// Statuszeile fuer die Anzeige, `None` fuer unbekannte Pakete
    pub fn status_text(&self) -> Option<String> {
        match self {
            ControlMessage::Fehler { text, .. } => Some(format!("Server-Fehler: {text}")),
            ControlMessage::Status { text, .. } => Some(format!("Server-Status: {text}")),
            ControlMessage::Nachricht { text, .. } => Some(format!("Server: {text}")),
            ControlMessage::Unbekannt { .. } => None,
        }
    }

    pub fn ist_fehler(&self) -> bool {
        matches!(self, ControlMessage::Fehler { .. })
    }
}

/// Leere, `null` und `false` zaehlen als nicht gesetzt
fn feld_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        andere => Some(andere.to_string()),
    }
}
