//! DuplexSession – eine Sprechverbindung
//!
//! Ein tokio-Task besitzt Transport, Zustandsmaschine, Aufnahme und
//! Wiedergabe. Alles was von aussen oder aus Hilfstasks kommt, landet
//! als Nachricht in der `select!`-Schleife:
//!
//! - Befehle vom `SessionHandle`
//! - eingehende Frames des Transports
//! - interne Meldungen (Verbindungsaufbau, Transkodierung, Leerlauf),
//!   jeweils mit der Epoche markiert in der sie entstanden sind
//! - Fertigmeldungen des Ausgabegeraets
//! - der Aufnahme-Takt, nur solange aufgenommen wird
//! - der Wiederverbindungs-Timer
//!
//! Jeder Abbau erhoeht die Epoche; aeltere Meldungen werden verworfen.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use talkback_audio::{
    CaptureController, CaptureError, CaptureHandle, CaptureProgress, PcmBuffer, PcmTranscoder,
    PlaybackEvent, PlaybackEventReceiver, StreamingPlaybackScheduler, TranscodeError,
};
use talkback_core::{ConnectionState, SessionEvent, SessionSnapshot, TurnState};
use talkback_protocol::{
    decode_pcm_frame, encode_pcm_frame, CloseCode, ControlMessage, StreamEndpoint,
    PLAYBACK_SAMPLE_RATE, UPLOAD_SAMPLE_RATE,
};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::error::TransportError;
use crate::handle::{Befehl, SessionHandle, TalkResponse};
use crate::reconnect::{Folge, Reconnector};
use crate::status::StatusLog;
use crate::transport::{Connector, Eingehend, Transport};
use crate::turn::{BargeIn, ChunkAktion, Druck, TurnMachine};

const BEFEHL_KANAL_GROESSE: usize = 32;
const EVENT_KANAL_GROESSE: usize = 256;

/// Einstellungen einer Sitzung
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub endpoint: StreamEndpoint,
    pub reconnect_delay: Duration,
    pub max_reconnect_attempts: u32,
    /// Rate der gesendeten Aeusserungen
    pub upload_sample_rate: u32,
    /// Rate der empfangenen PCM-Frames
    pub playback_sample_rate: u32,
    pub barge_in: BargeIn,
    /// Wie oft das Mikrofon waehrend der Aufnahme geleert wird
    pub capture_takt: Duration,
}

impl SessionConfig {
    pub fn new(endpoint: StreamEndpoint) -> Self {
        Self {
            endpoint,
            reconnect_delay: Duration::from_secs(5),
            max_reconnect_attempts: 5,
            upload_sample_rate: UPLOAD_SAMPLE_RATE,
            playback_sample_rate: PLAYBACK_SAMPLE_RATE,
            barge_in: BargeIn::default(),
            capture_takt: Duration::from_millis(20),
        }
    }
}

/// Audio-Bausteine die die Sitzung uebernimmt
pub struct SessionAudio {
    pub capture: CaptureController,
    pub scheduler: StreamingPlaybackScheduler,
    pub sink_events: PlaybackEventReceiver,
}

enum InternArt {
    Verbunden(Result<Transport, TransportError>),
    Transkodiert(Result<PcmBuffer, TranscodeError>),
    Leergelaufen { wiedergabe: u64 },
}

struct Intern {
    epoch: u64,
    art: InternArt,
}

pub struct DuplexSession {
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    maschine: TurnMachine,
    reconnector: Reconnector,
    transport: Option<Transport>,
    wiederverbinden_um: Option<Instant>,

    capture: CaptureController,
    aufnahme: Option<CaptureHandle>,
    transcoder: PcmTranscoder,
    scheduler: StreamingPlaybackScheduler,
    sink_events: PlaybackEventReceiver,

    epoch: u64,
    wiedergabe_gen: u64,

    befehle: mpsc::Receiver<Befehl>,
    intern_tx: mpsc::UnboundedSender<Intern>,
    intern_rx: mpsc::UnboundedReceiver<Intern>,

    speaking_tx: watch::Sender<bool>,
    status_tx: watch::Sender<String>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    events_tx: broadcast::Sender<SessionEvent>,
    log: Arc<Mutex<StatusLog>>,
    gemeldet: SessionSnapshot,
}

impl DuplexSession {
    /// Startet die Sitzung als eigenen Task und verbindet sofort
    pub fn spawn(
        config: SessionConfig,
        connector: Arc<dyn Connector>,
        audio: SessionAudio,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (befehle_tx, befehle_rx) = mpsc::channel(BEFEHL_KANAL_GROESSE);
        let (intern_tx, intern_rx) = mpsc::unbounded_channel();
        let (speaking_tx, speaking_rx) = watch::channel(false);
        let (status_tx, status_rx) = watch::channel(String::new());
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::default());
        let (events_tx, _) = broadcast::channel(EVENT_KANAL_GROESSE);
        let log = Arc::new(Mutex::new(StatusLog::default()));

        let handle = SessionHandle {
            befehle: befehle_tx,
            speaking: speaking_rx,
            status: status_rx,
            snapshot: snapshot_rx,
            events: events_tx.clone(),
            log: Arc::clone(&log),
        };

        let session = DuplexSession {
            maschine: TurnMachine::new(config.barge_in),
            reconnector: Reconnector::new(config.reconnect_delay, config.max_reconnect_attempts),
            config,
            connector,
            transport: None,
            wiederverbinden_um: None,
            capture: audio.capture,
            aufnahme: None,
            transcoder: PcmTranscoder::new(),
            scheduler: audio.scheduler,
            sink_events: audio.sink_events,
            epoch: 0,
            wiedergabe_gen: 0,
            befehle: befehle_rx,
            intern_tx,
            intern_rx,
            speaking_tx,
            status_tx,
            snapshot_tx,
            events_tx,
            log,
            gemeldet: SessionSnapshot::default(),
        };

        let task = tokio::spawn(session.run());
        (handle, task)
    }

    async fn run(mut self) {
        info!(endpoint = %self.config.endpoint, barge_in = ?self.config.barge_in, "Sitzung gestartet");
        self.verbinden();
        self.veroeffentlichen();

        let mut capture_takt = tokio::time::interval(self.config.capture_takt);
        capture_takt.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let wiederverbinden_um = self.wiederverbinden_um;
            let nimmt_auf = self.aufnahme.is_some();

            tokio::select! {
                befehl = self.befehle.recv() => match befehl {
                    Some(Befehl::Press(antwort)) => {
                        let r = self.press();
                        self.veroeffentlichen();
                        let _ = antwort.send(r);
                    }
                    Some(Befehl::Release(antwort)) => {
                        let r = self.release();
                        self.veroeffentlichen();
                        let _ = antwort.send(r);
                    }
                    Some(Befehl::Shutdown(fertig)) => {
                        self.beenden();
                        self.veroeffentlichen();
                        let _ = fertig.send(());
                        break;
                    }
                    None => {
                        debug!("Alle Handles gedroppt");
                        self.beenden();
                        break;
                    }
                },
                eingehend = naechstes_eingehend(&mut self.transport) => self.eingehend(eingehend),
                Some(intern) = self.intern_rx.recv() => self.intern(intern),
                Some(PlaybackEvent::Finished { id }) = self.sink_events.recv() => {
                    self.scheduler.on_finished(id);
                }
                _ = capture_takt.tick(), if nimmt_auf => self.capture_pumpen(),
                _ = tokio::time::sleep_until(wiederverbinden_um.unwrap_or_else(Instant::now)),
                    if wiederverbinden_um.is_some() =>
                {
                    self.wiederverbinden_um = None;
                    self.verbinden();
                }
            }

            self.veroeffentlichen();
        }

        self.veroeffentlichen();
        info!("Sitzung beendet");
    }

    // -----------------------------------------------------------------------
    // Sprechtaste
    // -----------------------------------------------------------------------

    fn press(&mut self) -> TalkResponse {
        let druck = match self.maschine.press() {
            Ok(d) => d,
            Err(grund) => {
                debug!(%grund, zustand = self.maschine.turn().bezeichnung(), "Sprechtaste abgelehnt");
                self.status(format!("Aufnahme gerade nicht moeglich: {grund}"));
                return TalkResponse::Rejected(grund.to_string());
            }
        };

        if druck == Druck::UnterbrechenUndAufnehmen {
            info!("Wiedergabe fuer neue Aufnahme unterbrochen");
            self.wiedergabe_gen += 1;
            self.scheduler.stop_and_clear();
            self.maschine.leergelaufen();
        }

        match self.capture.begin() {
            Ok(handle) => {
                self.aufnahme = Some(handle);
                self.maschine.aufnahme_gestartet();
                self.status("Hoere zu...");
                TalkResponse::Accepted
            }
            Err(e) => {
                self.fehler(format!("Mikrofon-Fehler: {e}"));
                TalkResponse::Rejected(e.to_string())
            }
        }
    }

    fn release(&mut self) -> TalkResponse {
        if let Err(grund) = self.maschine.release() {
            trace!(%grund, "Loslassen ignoriert");
            return TalkResponse::Rejected(grund.to_string());
        }
        match self.aufnahme.take() {
            Some(handle) => {
                self.aufnahme_abschliessen(handle);
                TalkResponse::Accepted
            }
            None => {
                self.maschine.abbrechen();
                TalkResponse::Rejected("keine laufende Aufnahme".into())
            }
        }
    }

    fn capture_pumpen(&mut self) {
        let Some(handle) = self.aufnahme.as_ref() else {
            return;
        };
        match self.capture.pump(handle) {
            Ok(CaptureProgress::Laeuft { .. }) => {}
            Ok(CaptureProgress::LimitReached { frames }) => {
                info!(frames, "Maximale Aeusserungslaenge erreicht");
                self.status("Maximale Laenge erreicht, Aufnahme wird gesendet");
                if self.maschine.release().is_ok() {
                    if let Some(handle) = self.aufnahme.take() {
                        self.aufnahme_abschliessen(handle);
                    }
                }
            }
            Err(e) => {
                self.aufnahme = None;
                self.maschine.abbrechen();
                self.fehler(format!("Mikrofon-Fehler: {e}"));
            }
        }
    }

    /// Beendet die Aufnahme und startet die Transkodierung
    fn aufnahme_abschliessen(&mut self, handle: CaptureHandle) {
        match self.capture.end(handle) {
            Ok(utterance) => {
                self.status("Verarbeite Audio...");
                let transcoder = self.transcoder;
                let ziel_rate = self.config.upload_sample_rate;
                let epoch = self.epoch;
                let tx = self.intern_tx.clone();
                tokio::spawn(async move {
                    let ergebnis = tokio::task::spawn_blocking(move || {
                        transcoder.transcode(utterance, ziel_rate)
                    })
                    .await
                    .unwrap_or_else(|e| {
                        Err(TranscodeError::Decode(format!("Transkodierung abgebrochen: {e}")))
                    });
                    let _ = tx.send(Intern {
                        epoch,
                        art: InternArt::Transkodiert(ergebnis),
                    });
                });
            }
            Err(CaptureError::EmptyCapture) => {
                self.maschine.abbrechen();
                self.status("Keine Audiodaten aufgenommen.");
            }
            Err(e) => {
                self.maschine.abbrechen();
                self.fehler(format!("Mikrofon-Fehler: {e}"));
            }
        }
    }

    fn transkodiert(&mut self, ergebnis: Result<PcmBuffer, TranscodeError>) {
        if self.maschine.turn() != TurnState::Uploading {
            debug!("Transkodierung ausserhalb des Uploads verworfen");
            return;
        }

        let pcm = match ergebnis {
            Ok(pcm) => pcm,
            Err(e) => {
                self.maschine.abbrechen();
                self.fehler(format!("Fehler bei der Audioverarbeitung: {e}"));
                return;
            }
        };

        let daten = encode_pcm_frame(pcm.samples());
        let bytes = daten.len();
        let gesendet = match &self.transport {
            Some(t) => t.send_binary(daten),
            None => Err(TransportError::Geschlossen),
        };

        match gesendet {
            Ok(()) => {
                self.maschine.gesendet();
                info!(samples = pcm.len(), bytes, "Aeusserung gesendet");
                self.event(SessionEvent::AeusserungGesendet {
                    samples: pcm.len(),
                    bytes,
                });
                self.status(format!("Audio gesendet ({:.1} KB)", bytes as f64 / 1024.0));
            }
            Err(e) => {
                self.maschine.abbrechen();
                self.fehler(format!("Senden nicht moeglich: {e}"));
            }
        }
    }

    // -----------------------------------------------------------------------
    // Eingehende Frames
    // -----------------------------------------------------------------------

    fn eingehend(&mut self, eingehend: Eingehend) {
        match eingehend {
            Eingehend::Text(text) => {
                let nachricht = ControlMessage::parse(&text);
                if nachricht.ist_fehler() {
                    warn!(roh = %text, "Server meldet Fehler");
                }
                match nachricht.status_text() {
                    Some(zeile) => self.status(zeile),
                    None => debug!(roh = %text, "Unbekanntes Steuerpaket ignoriert"),
                }
            }
            Eingehend::Binaer(daten) => self.audio_empfangen(&daten),
            Eingehend::Geschlossen(code) => {
                info!(%code, "Verbindung vom Server geschlossen");
                self.transport = None;
                self.verbindung_verloren(code);
            }
        }
    }

    fn audio_empfangen(&mut self, daten: &[u8]) {
        let frame = match decode_pcm_frame(daten) {
            Ok(f) => f,
            Err(_) => {
                debug!("Leerer Audio-Frame ignoriert");
                return;
            }
        };
        if frame.abgeschnitten {
            warn!(
                bytes = daten.len(),
                "Audio-Frame mit ungerader Laenge, letztes Byte verworfen"
            );
        }

        match self.maschine.chunk() {
            ChunkAktion::Verwerfen => {
                warn!(
                    zustand = self.maschine.turn().bezeichnung(),
                    bytes = daten.len(),
                    "Audio waehrend eigener Aeusserung verworfen"
                );
            }
            ChunkAktion::Abspielen { neuer_zug } => {
                self.status(format!("Audio empfangen ({} Bytes)", daten.len()));
                // Leerlauf schon gemeldet, aber noch nicht verarbeitet: neu scharf machen
                if neuer_zug || !self.scheduler.wartet_auf_leerlauf() {
                    self.wiedergabe_starten();
                }
                self.scheduler
                    .enqueue(PcmBuffer::new(frame.samples, self.config.playback_sample_rate));
            }
        }
    }

    fn wiedergabe_starten(&mut self) {
        self.wiedergabe_gen += 1;
        let wiedergabe = self.wiedergabe_gen;
        let epoch = self.epoch;
        let tx = self.intern_tx.clone();
        self.scheduler.start(move || {
            let _ = tx.send(Intern {
                epoch,
                art: InternArt::Leergelaufen { wiedergabe },
            });
        });
    }

    // -----------------------------------------------------------------------
    // Interne Meldungen
    // -----------------------------------------------------------------------

    fn intern(&mut self, intern: Intern) {
        if intern.epoch != self.epoch {
            trace!(epoch = intern.epoch, aktuell = self.epoch, "Veraltete Meldung verworfen");
            return;
        }
        match intern.art {
            InternArt::Verbunden(Ok(transport)) => {
                if self.maschine.connection() != ConnectionState::Connecting {
                    return;
                }
                self.transport = Some(transport);
                self.maschine.verbindung_setzen(ConnectionState::Connected);
                self.reconnector.verbunden();
                info!(endpoint = %self.config.endpoint, "Verbunden");
                self.status("Verbunden");
            }
            InternArt::Verbunden(Err(e)) => {
                warn!(fehler = %e, "Verbindungsaufbau fehlgeschlagen");
                self.fehler(format!("Verbindungsfehler: {e}"));
                self.verbindung_verloren(CloseCode::ABNORMAL);
            }
            InternArt::Transkodiert(ergebnis) => self.transkodiert(ergebnis),
            InternArt::Leergelaufen { wiedergabe } => {
                if wiedergabe != self.wiedergabe_gen {
                    trace!(wiedergabe, "Veralteter Leerlauf verworfen");
                    return;
                }
                if self.maschine.leergelaufen() {
                    self.status("Server-Audio beendet.");
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Verbindung
    // -----------------------------------------------------------------------

    fn verbinden(&mut self) {
        self.maschine.verbindung_setzen(ConnectionState::Connecting);
        self.status(format!(
            "Verbinde mit {}...",
            self.config.endpoint.host_anzeige()
        ));

        let connector = Arc::clone(&self.connector);
        let endpoint = self.config.endpoint.clone();
        let epoch = self.epoch;
        let tx = self.intern_tx.clone();
        tokio::spawn(async move {
            let ergebnis = connector.connect(&endpoint).await;
            let _ = tx.send(Intern {
                epoch,
                art: InternArt::Verbunden(ergebnis),
            });
        });
    }

    fn verbindung_verloren(&mut self, code: CloseCode) {
        self.abbauen();
        self.maschine.verbindung_setzen(ConnectionState::Disconnected);

        let folge = self.reconnector.nach_schliessen(code);
        self.event(SessionEvent::Geschlossen {
            code: Some(code.0),
            wiederverbinden: matches!(folge, Folge::Wiederverbinden(_)),
        });
        self.status(format!("Verbindung geschlossen (Code {code})"));

        match folge {
            Folge::Beenden => {}
            Folge::Wiederverbinden(verzoegerung) => {
                info!(%code, ?verzoegerung, "Wiederverbindung geplant");
                self.status(format!(
                    "Neuer Verbindungsversuch in {}s...",
                    verzoegerung.as_secs()
                ));
                self.wiederverbinden_um = Some(Instant::now() + verzoegerung);
            }
            Folge::Aufgeben => {
                warn!(
                    fehlschlaege = self.reconnector.fehlschlaege(),
                    "Wiederverbindung aufgegeben"
                );
                self.fehler(format!(
                    "Wiederverbindung nach {} Fehlversuchen aufgegeben",
                    self.config.max_reconnect_attempts
                ));
            }
        }
    }

    /// Aufnahme und Wiedergabe abbauen, laufende Meldungen entwerten
    ///
    /// Jeder Schritt laeuft unabhaengig vom Erfolg des vorigen.
    fn abbauen(&mut self) {
        self.epoch += 1;
        if let Some(handle) = self.aufnahme.take() {
            self.capture.cancel(handle);
        }
        self.capture.verwerfen();
        self.wiedergabe_gen += 1;
        self.scheduler.stop_and_clear();
    }

    fn beenden(&mut self) {
        info!("Sitzung wird abgebaut");
        self.wiederverbinden_um = None;
        self.abbauen();
        if let Some(transport) = self.transport.take() {
            self.maschine.verbindung_setzen(ConnectionState::Closing);
            self.veroeffentlichen();
            transport.close(CloseCode::NORMAL);
        }
        self.maschine.verbindung_setzen(ConnectionState::Disconnected);
        self.status("Sitzung beendet");
    }

    // -----------------------------------------------------------------------
    // Meldungen nach aussen
    // -----------------------------------------------------------------------

    fn status(&mut self, text: impl Into<String>) {
        let text = text.into();
        debug!(status = %text, "Statusmeldung");
        self.log.lock().hinzufuegen(text.clone());
        self.status_tx.send_replace(text.clone());
        self.event(SessionEvent::Status(text));
    }

    fn fehler(&mut self, text: String) {
        warn!(fehler = %text, "Fehler in der Sitzung");
        self.event(SessionEvent::Fehler(text.clone()));
        self.status(text);
    }

    fn event(&self, event: SessionEvent) {
        // Ohne Abonnenten geht das Ereignis verloren
        let _ = self.events_tx.send(event);
    }

    fn veroeffentlichen(&mut self) {
        let snap = self.maschine.snapshot();
        if snap == self.gemeldet {
            return;
        }
        if snap.connection != self.gemeldet.connection {
            self.event(SessionEvent::VerbindungGeaendert(snap.connection));
        }
        if snap.turn != self.gemeldet.turn {
            self.event(SessionEvent::SprechzugGeaendert(snap.turn));
        }
        self.speaking_tx.send_replace(snap.turn == TurnState::Speaking);
        self.snapshot_tx.send_replace(snap);
        self.gemeldet = snap;
    }
}

async fn naechstes_eingehend(transport: &mut Option<Transport>) -> Eingehend {
    match transport {
        Some(t) => t.recv().await,
        None => std::future::pending().await,
    }
}
