//! Zustaende einer Duplex-Sitzung
//!
//! `TurnState` beschreibt wer gerade spricht, `ConnectionState` den
//! Zustand des Transports. Beide sind unabhaengig, der Verbindungszustand
//! bestimmt aber welche Sprechzug-Uebergaenge erlaubt sind.

use serde::{Deserialize, Serialize};

/// Sprechzug-Zustand
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    /// Niemand spricht
    #[default]
    Idle,
    /// Mikrofon ist offen, Benutzer haelt die Sprechtaste
    Listening,
    /// Aeusserung wird transkodiert und gesendet
    Uploading,
    /// Aeusserung gesendet, Antwort steht aus
    AwaitingReply,
    /// Antwort der Gegenseite wird abgespielt
    Speaking,
}

impl TurnState {
    /// Gibt den menschenlesbaren Namen zurueck
    pub fn bezeichnung(&self) -> &'static str {
        match self {
            TurnState::Idle => "bereit",
            TurnState::Listening => "hoert zu",
            TurnState::Uploading => "sendet",
            TurnState::AwaitingReply => "wartet auf Antwort",
            TurnState::Speaking => "Gegenseite spricht",
        }
    }
}

/// Verbindungszustand des Transports
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

impl ConnectionState {
    pub fn ist_verbunden(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// Momentaufnahme beider Zustaende
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub turn: TurnState,
    pub connection: ConnectionState,
}
