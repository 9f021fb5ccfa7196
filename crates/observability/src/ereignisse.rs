//! Sitzungs-Ereignisse als Tracing-Events
//!
//! Haengt sich an den Broadcast-Kanal einer Sitzung und schreibt jedes
//! Ereignis mit strukturierten Feldern ins Log. Der Task endet, sobald
//! die Sitzung ihren Sender fallen laesst.

use talkback_core::SessionEvent;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Startet den Protokoll-Task, liefert am Ende die Anzahl gelesener Ereignisse
pub fn ereignisse_protokollieren(mut rx: broadcast::Receiver<SessionEvent>) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let mut gelesen = 0u64;
        loop {
            match rx.recv().await {
                Ok(event) => {
                    gelesen += 1;
                    protokollieren(&event);
                }
                Err(RecvError::Lagged(verpasst)) => {
                    warn!(verpasst, "Ereignis-Protokoll kommt nicht hinterher");
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!(gelesen, "Ereignis-Protokoll beendet");
        gelesen
    })
}

fn protokollieren(event: &SessionEvent) {
    match event {
        SessionEvent::VerbindungGeaendert(zustand) => {
            info!(verbindung = ?zustand, "Verbindungszustand geaendert")
        }
        SessionEvent::SprechzugGeaendert(zustand) => {
            debug!(sprechzug = ?zustand, "Sprechzug geaendert")
        }
        SessionEvent::Status(text) => debug!(status = %text, "Status"),
        SessionEvent::Fehler(text) => warn!(fehler = %text, "Sitzungsfehler"),
        SessionEvent::AeusserungGesendet { samples, bytes } => {
            info!(samples, bytes, "Aeusserung gesendet")
        }
        SessionEvent::Geschlossen {
            code,
            wiederverbinden,
        } => info!(?code, wiederverbinden, "Verbindung geschlossen"),
    }
}
