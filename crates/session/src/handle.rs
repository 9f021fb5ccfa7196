//! Handle einer laufenden Sitzung
//!
//! Das Handle ist billig klonbar und die einzige Verbindung nach aussen:
//! Tastenbefehle gehen ueber einen Kanal an den Sitzungs-Task, Zustand
//! kommt ueber `watch`- und Broadcast-Kanaele zurueck.

use std::sync::Arc;

use parking_lot::Mutex;
use talkback_core::{SessionEvent, SessionSnapshot};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::status::{StatusEintrag, StatusLog};

/// Antwort auf Druecken oder Loslassen der Sprechtaste
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TalkResponse {
    Accepted,
    Rejected(String),
}

#[derive(Debug)]
pub(crate) enum Befehl {
    Press(oneshot::Sender<TalkResponse>),
    Release(oneshot::Sender<TalkResponse>),
    Shutdown(oneshot::Sender<()>),
}

#[derive(Clone)]
pub struct SessionHandle {
    pub(crate) befehle: mpsc::Sender<Befehl>,
    pub(crate) speaking: watch::Receiver<bool>,
    pub(crate) status: watch::Receiver<String>,
    pub(crate) snapshot: watch::Receiver<SessionSnapshot>,
    pub(crate) events: broadcast::Sender<SessionEvent>,
    pub(crate) log: Arc<Mutex<StatusLog>>,
}

impl SessionHandle {
    /// Sprechtaste gedrueckt
    pub async fn press(&self) -> TalkResponse {
        self.anfragen(Befehl::Press).await
    }

    /// Sprechtaste losgelassen
    pub async fn release(&self) -> TalkResponse {
        self.anfragen(Befehl::Release).await
    }

    async fn anfragen(&self, befehl: fn(oneshot::Sender<TalkResponse>) -> Befehl) -> TalkResponse {
        let (tx, rx) = oneshot::channel();
        if self.befehle.send(befehl(tx)).await.is_err() {
            return TalkResponse::Rejected("Sitzung ist beendet".into());
        }
        rx.await
            .unwrap_or_else(|_| TalkResponse::Rejected("Sitzung ist beendet".into()))
    }

    /// Baut die Sitzung ab und wartet bis sie beendet ist
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.befehle.send(Befehl::Shutdown(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }

    /// Spricht die Gegenseite gerade?
    pub fn speaking(&self) -> watch::Receiver<bool> {
        self.speaking.clone()
    }

    /// Aktuelle Statuszeile
    pub fn status(&self) -> watch::Receiver<String> {
        self.status.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        *self.snapshot.borrow()
    }

    pub fn events_abonnieren(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Die letzten Statusmeldungen, aelteste zuerst
    pub fn status_log(&self) -> Vec<StatusEintrag> {
        self.log.lock().eintraege()
    }
}
