//! Wiederverbindungs-Regel
//!
//! Feste Wartezeit ohne Backoff, ein Versuch pro Schliessen. Nach
//! `max_versuche` aufeinanderfolgenden Fehlschlaegen wird aufgegeben;
//! jede erfolgreiche Verbindung setzt den Zaehler zurueck.

use std::time::Duration;

use talkback_protocol::{CloseCode, CloseDisposition};

/// Entscheidung nach einem Verbindungsende
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Folge {
    /// Normal geschlossen, getrennt bleiben
    Beenden,
    /// Nach der Wartezeit neu verbinden
    Wiederverbinden(Duration),
    /// Zu viele Fehlschlaege in Folge
    Aufgeben,
}

#[derive(Debug, Clone)]
pub struct Reconnector {
    verzoegerung: Duration,
    max_versuche: u32,
    fehlschlaege: u32,
}

impl Reconnector {
    pub fn new(verzoegerung: Duration, max_versuche: u32) -> Self {
        Self {
            verzoegerung,
            max_versuche,
            fehlschlaege: 0,
        }
    }

    /// Verbindung steht
    pub fn verbunden(&mut self) {
        self.fehlschlaege = 0;
    }

    /// Verbindung mit `code` beendet oder (bei `ABNORMAL`) nicht zustande gekommen
    pub fn nach_schliessen(&mut self, code: CloseCode) -> Folge {
        match CloseDisposition::fuer(Some(code)) {
            CloseDisposition::Beenden => Folge::Beenden,
            CloseDisposition::Wiederverbinden => {
                self.fehlschlaege += 1;
                if self.fehlschlaege > self.max_versuche {
                    Folge::Aufgeben
                } else {
                    Folge::Wiederverbinden(self.verzoegerung)
                }
            }
        }
    }

    pub fn fehlschlaege(&self) -> u32 {
        self.fehlschlaege
    }
}
