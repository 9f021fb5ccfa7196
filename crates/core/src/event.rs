//! Sitzungs-Ereignisse
//!
//! Alles was eine laufende Sitzung nach aussen meldet. Die Ereignisse
//! werden ueber einen tokio-Broadcast-Kanal verteilt; Abonnenten die
//! zu langsam lesen verlieren Ereignisse, nie die Sitzung.

use serde::{Deserialize, Serialize};

use crate::state::{ConnectionState, TurnState};

/// Alle Ereignisse einer Duplex-Sitzung
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionEvent {
    /// Verbindungszustand hat sich geaendert
    VerbindungGeaendert(ConnectionState),
    /// Sprechzug-Zustand hat sich geaendert
    SprechzugGeaendert(TurnState),
    /// Neue Statusmeldung
    Status(String),
    /// Fehler der Aufnahme-, Transkodierungs- oder Sendestrecke
    Fehler(String),
    /// Aeusserung wurde gesendet
    AeusserungGesendet { samples: usize, bytes: usize },
    /// Verbindung geschlossen
    Geschlossen { code: Option<u16>, wiederverbinden: bool },
}
