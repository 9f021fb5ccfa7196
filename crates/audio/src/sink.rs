//! Ausgabe-Abstraktion fuer die Wiedergabe
//!
//! Ein `PlaybackSink` nimmt Puffer mit absolutem Startzeitpunkt auf
//! seiner eigenen Zeitachse entgegen ("spiele ab T"). Fertig gespielte
//! Puffer meldet er asynchron als `PlaybackEvent::Finished` ueber den
//! Kanal, den er beim Erstellen zurueckgibt. Abgebrochene Puffer werden
//! nie gemeldet.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::PlaybackError;
use crate::pcm::PcmBuffer;

/// Kennung eines an den Sink uebergebenen Puffers
pub type BufferId = u64;

/// Meldung des Sinks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    Finished { id: BufferId },
}

pub type PlaybackEventSender = mpsc::UnboundedSender<PlaybackEvent>;
pub type PlaybackEventReceiver = mpsc::UnboundedReceiver<PlaybackEvent>;

/// Ziel der Wiedergabe
pub trait PlaybackSink: Send {
    /// Aktuelle Zeit der Ausgabe-Uhr in Sekunden
    fn now(&self) -> f64;

    /// Plant einen Puffer ab `start` (Sekunden auf der Ausgabe-Uhr)
    fn schedule(&mut self, id: BufferId, buffer: PcmBuffer, start: f64)
        -> Result<(), PlaybackError>;

    /// Bricht alle noch nicht beendeten Puffer ab
    fn cancel_all(&mut self);
}

// ---------------------------------------------------------------------------
// ManualSink
// ---------------------------------------------------------------------------

/// Ein geplanter Puffer, wie ihn der `ManualSink` gesehen hat
#[derive(Debug, Clone, PartialEq)]
pub struct GeplanterPuffer {
    pub id: BufferId,
    pub start: f64,
    pub dauer: f64,
    pub samples: usize,
    pub abgebrochen: bool,
    pub beendet: bool,
}

impl GeplanterPuffer {
    pub fn ende(&self) -> f64 {
        self.start + self.dauer
    }
}

#[derive(Debug, Default)]
struct ManualZustand {
    zeit: f64,
    geplant: Vec<GeplanterPuffer>,
    abbrueche: usize,
}

/// Sink mit virtueller Uhr
///
/// Die Uhr laeuft nur wenn der Test sie vorstellt. `vorlaufen_bis`
/// meldet alle bis dahin fertigen Puffer in Startreihenfolge.
/// Klone teilen sich den Zustand.
#[derive(Debug, Clone)]
pub struct ManualSink {
    zustand: Arc<Mutex<ManualZustand>>,
    events: PlaybackEventSender,
}

impl ManualSink {
    /// Erstellt den Sink und den Empfaenger seiner Meldungen
    pub fn new() -> (Self, PlaybackEventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Self {
            zustand: Arc::new(Mutex::new(ManualZustand::default())),
            events: tx,
        };
        (sink, rx)
    }

    /// Stellt die Uhr, ohne fertige Puffer zu melden
    pub fn zeit_setzen(&self, t: f64) {
        self.zustand.lock().zeit = t;
    }

    /// Stellt die Uhr vor und meldet alle bis `t` fertigen Puffer
    ///
    /// Gibt die gemeldeten IDs in Reihenfolge zurueck.
    pub fn vorlaufen_bis(&self, t: f64) -> Vec<BufferId> {
        let mut z = self.zustand.lock();
        z.zeit = z.zeit.max(t);
        let jetzt = z.zeit;
        let mut fertig: Vec<&mut GeplanterPuffer> = z
            .geplant
            .iter_mut()
            .filter(|p| !p.abgebrochen && !p.beendet && p.ende() <= jetzt + 1e-9)
            .collect();
        fertig.sort_by(|a, b| a.start.total_cmp(&b.start));

        let mut ids = Vec::with_capacity(fertig.len());
        for p in fertig {
            p.beendet = true;
            ids.push(p.id);
            let _ = self.events.send(PlaybackEvent::Finished { id: p.id });
        }
        ids
    }

    /// Alles bisher Geplante
    pub fn geplant(&self) -> Vec<GeplanterPuffer> {
        self.zustand.lock().geplant.clone()
    }

    /// Geplante Puffer die weder beendet noch abgebrochen sind
    pub fn ausstehend(&self) -> Vec<GeplanterPuffer> {
        self.zustand
            .lock()
            .geplant
            .iter()
            .filter(|p| !p.abgebrochen && !p.beendet)
            .cloned()
            .collect()
    }

    pub fn abbrueche(&self) -> usize {
        self.zustand.lock().abbrueche
    }
}

impl PlaybackSink for ManualSink {
    fn now(&self) -> f64 {
        self.zustand.lock().zeit
    }

    fn schedule(
        &mut self,
        id: BufferId,
        buffer: PcmBuffer,
        start: f64,
    ) -> Result<(), PlaybackError> {
        self.zustand.lock().geplant.push(GeplanterPuffer {
            id,
            start,
            dauer: buffer.duration(),
            samples: buffer.len(),
            abgebrochen: false,
            beendet: false,
        });
        Ok(())
    }

    fn cancel_all(&mut self) {
        let mut z = self.zustand.lock();
        z.abbrueche += 1;
        for p in z.geplant.iter_mut().filter(|p| !p.beendet) {
            p.abgebrochen = true;
        }
    }
}
