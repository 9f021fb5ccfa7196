//! Sprechzug-Zustandsmaschine
//!
//! Rein synchron: haelt `TurnState` und `ConnectionState` und
//! beantwortet jede Eingabe mit einem Uebergang oder einer Ablehnung.
//! Seiteneffekte (Mikrofon, Wiedergabe, Transport) loest die Sitzung aus.
//!
//! ```text
//! Idle --press--> Listening --release--> Uploading --gesendet--> AwaitingReply
//!   ^                                        |                        |
//!   |<-------------- Fehler / leer ----------+                   erster Chunk
//!   |                                                                 v
//!   +<------------------------ leergelaufen ------------------- Speaking
//! ```

use serde::{Deserialize, Serialize};
use talkback_core::{ConnectionState, SessionSnapshot, TurnState};

/// Verhalten bei Tastendruck waehrend die Gegenseite spricht
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BargeIn {
    /// Druck wird abgelehnt
    #[default]
    Reject,
    /// Wiedergabe wird abgebrochen, Aufnahme startet
    Interrupt,
}

/// Grund fuer eine abgelehnte Taste
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ablehnung {
    NichtVerbunden,
    GegenseiteSpricht,
    AufnahmeLaeuft,
    UploadLaeuft,
    KeineAufnahme,
}

impl std::fmt::Display for Ablehnung {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Ablehnung::NichtVerbunden => "nicht verbunden",
            Ablehnung::GegenseiteSpricht => "Gegenseite spricht",
            Ablehnung::AufnahmeLaeuft => "Aufnahme laeuft bereits",
            Ablehnung::UploadLaeuft => "vorherige Aeusserung wird noch gesendet",
            Ablehnung::KeineAufnahme => "keine laufende Aufnahme",
        };
        f.write_str(text)
    }
}

/// Erlaubter Tastendruck
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Druck {
    Aufnehmen,
    /// Erst Wiedergabe abbrechen, dann aufnehmen
    UnterbrechenUndAufnehmen,
}

/// Was mit einem eingehenden Audio-Chunk passiert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkAktion {
    /// Abspielen; `neuer_zug` wenn die Wiedergabe neu gestartet werden muss
    Abspielen { neuer_zug: bool },
    /// Waehrend Aufnahme oder Upload
    Verwerfen,
}

#[derive(Debug, Clone)]
pub struct TurnMachine {
    turn: TurnState,
    connection: ConnectionState,
    barge_in: BargeIn,
}

impl TurnMachine {
    pub fn new(barge_in: BargeIn) -> Self {
        Self {
            turn: TurnState::Idle,
            connection: ConnectionState::Disconnected,
            barge_in,
        }
    }

    pub fn turn(&self) -> TurnState {
        self.turn
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn barge_in(&self) -> BargeIn {
        self.barge_in
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            turn: self.turn,
            connection: self.connection,
        }
    }

    /// Setzt den Verbindungszustand
    ///
    /// Ohne Verbindung gibt es keinen Sprechzug mehr: alles ausser
    /// `Connected` setzt den Zug auf `Idle` zurueck.
    pub fn verbindung_setzen(&mut self, connection: ConnectionState) {
        self.connection = connection;
        if !connection.ist_verbunden() {
            self.turn = TurnState::Idle;
        }
    }

    /// Prueft einen Tastendruck, aendert den Zustand noch nicht
    pub fn press(&self) -> Result<Druck, Ablehnung> {
        if !self.connection.ist_verbunden() {
            return Err(Ablehnung::NichtVerbunden);
        }
        match self.turn {
            TurnState::Idle | TurnState::AwaitingReply => Ok(Druck::Aufnehmen),
            TurnState::Speaking => match self.barge_in {
                BargeIn::Reject => Err(Ablehnung::GegenseiteSpricht),
                BargeIn::Interrupt => Ok(Druck::UnterbrechenUndAufnehmen),
            },
            TurnState::Listening => Err(Ablehnung::AufnahmeLaeuft),
            TurnState::Uploading => Err(Ablehnung::UploadLaeuft),
        }
    }

    /// Mikrofon ist belegt
    pub fn aufnahme_gestartet(&mut self) {
        self.turn = TurnState::Listening;
    }

    /// Taste losgelassen: `Listening -> Uploading`
    pub fn release(&mut self) -> Result<(), Ablehnung> {
        if self.turn != TurnState::Listening {
            return Err(Ablehnung::KeineAufnahme);
        }
        self.turn = TurnState::Uploading;
        Ok(())
    }

    /// Aeusserung ist gesendet: `Uploading -> AwaitingReply`
    pub fn gesendet(&mut self) -> bool {
        if self.turn != TurnState::Uploading {
            return false;
        }
        self.turn = TurnState::AwaitingReply;
        true
    }

    /// Aufnahme oder Upload gescheitert
    pub fn abbrechen(&mut self) {
        if matches!(self.turn, TurnState::Listening | TurnState::Uploading) {
            self.turn = TurnState::Idle;
        }
    }

    /// Eingehender Audio-Chunk
    pub fn chunk(&mut self) -> ChunkAktion {
        match self.turn {
            TurnState::AwaitingReply | TurnState::Idle => {
                self.turn = TurnState::Speaking;
                ChunkAktion::Abspielen { neuer_zug: true }
            }
            TurnState::Speaking => ChunkAktion::Abspielen { neuer_zug: false },
            TurnState::Listening | TurnState::Uploading => ChunkAktion::Verwerfen,
        }
    }

    /// Wiedergabe leergelaufen: `Speaking -> Idle`
    pub fn leergelaufen(&mut self) -> bool {
        if self.turn != TurnState::Speaking {
            return false;
        }
        self.turn = TurnState::Idle;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verbunden(barge_in: BargeIn) -> TurnMachine {
        let mut m = TurnMachine::new(barge_in);
        m.verbindung_setzen(ConnectionState::Connected);
        m
    }

    #[test]
    fn startzustand() {
        let m = TurnMachine::new(BargeIn::default());
        assert_eq!(m.snapshot(), SessionSnapshot::default());
        assert_eq!(m.barge_in(), BargeIn::Reject);
    }

    #[test]
    fn voller_sprechzug() {
        let mut m = verbunden(BargeIn::Reject);
        assert_eq!(m.press(), Ok(Druck::Aufnehmen));
        m.aufnahme_gestartet();
        assert_eq!(m.turn(), TurnState::Listening);
        assert_eq!(m.release(), Ok(()));
        assert_eq!(m.turn(), TurnState::Uploading);
        assert!(m.gesendet());
        assert_eq!(m.turn(), TurnState::AwaitingReply);
        assert_eq!(m.chunk(), ChunkAktion::Abspielen { neuer_zug: true });
        assert_eq!(m.turn(), TurnState::Speaking);
        assert_eq!(m.chunk(), ChunkAktion::Abspielen { neuer_zug: false });
        assert!(m.leergelaufen());
        assert_eq!(m.turn(), TurnState::Idle);
    }

    #[test]
    fn ohne_verbindung_abgelehnt() {
        let m = TurnMachine::new(BargeIn::Interrupt);
        assert_eq!(m.press(), Err(Ablehnung::NichtVerbunden));
    }

    #[test]
    fn waehrend_wiedergabe_abgelehnt() {
        let mut m = verbunden(BargeIn::Reject);
        m.chunk();
        assert_eq!(m.press(), Err(Ablehnung::GegenseiteSpricht));
    }

    #[test]
    fn unterbrechen_erlaubt() {
        let mut m = verbunden(BargeIn::Interrupt);
        m.chunk();
        assert_eq!(m.press(), Ok(Druck::UnterbrechenUndAufnehmen));
    }

    #[test]
    fn nur_eine_aeusserung_unterwegs() {
        let mut m = verbunden(BargeIn::Reject);
        m.aufnahme_gestartet();
        assert_eq!(m.press(), Err(Ablehnung::AufnahmeLaeuft));
        m.release().unwrap();
        assert_eq!(m.press(), Err(Ablehnung::UploadLaeuft));
    }

    #[test]
    fn loslassen_ohne_aufnahme_ignoriert() {
        let mut m = verbunden(BargeIn::Reject);
        assert_eq!(m.release(), Err(Ablehnung::KeineAufnahme));
        assert_eq!(m.turn(), TurnState::Idle);
    }

    #[test]
    fn chunks_waehrend_aufnahme_verworfen() {
        let mut m = verbunden(BargeIn::Reject);
        m.aufnahme_gestartet();
        assert_eq!(m.chunk(), ChunkAktion::Verwerfen);
        m.release().unwrap();
        assert_eq!(m.chunk(), ChunkAktion::Verwerfen);
        assert_eq!(m.turn(), TurnState::Uploading);
    }

    #[test]
    fn trennung_setzt_zug_zurueck() {
        let mut m = verbunden(BargeIn::Reject);
        m.chunk();
        m.verbindung_setzen(ConnectionState::Disconnected);
        assert_eq!(m.turn(), TurnState::Idle);
        assert!(!m.leergelaufen());
    }

    #[test]
    fn barge_in_aus_toml_text() {
        #[derive(Deserialize)]
        struct W {
            b: BargeIn,
        }
        let w: W = serde_json::from_str(r#"{"b":"interrupt"}"#).unwrap();
        assert_eq!(w.b, BargeIn::Interrupt);
    }
}
