//! CaptureController – Sprechtaste zu komprimierter Aufnahme
//!
//! Solange die Sprechtaste gehalten wird, liest der Controller das
//! Eingabegeraet leer und kodiert jeden vollstaendigen 20-ms-Frame als
//! Opus. Beim Loslassen wird der Rest mit Stille aufgefuellt, das Geraet
//! freigegeben und der fertige Container zurueckgegeben.
//!
//! Das Geraet ist exklusiv: pro Controller laeuft hoechstens eine
//! Aufnahme, ein zweites `begin` schlaegt mit `Busy` fehl.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::codec::OpusEncoder;
use crate::container::{CapturedUtterance, OpusFramedWriter};
use crate::error::CaptureError;
use talkback_protocol::codec::{ChannelCount, OpusConfig, SampleRate};

// ---------------------------------------------------------------------------
// Eingabegeraet
// ---------------------------------------------------------------------------

/// Format das ein Eingabegeraet nach dem Belegen liefert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Abstraktion ueber das Mikrofon
///
/// `drain` haengt alle seit dem letzten Aufruf aufgelaufenen interleaved
/// Samples an `out` an und gibt ihre Anzahl zurueck.
pub trait AudioInput: Send {
    fn acquire(&mut self) -> Result<InputFormat, CaptureError>;
    fn drain(&mut self, out: &mut Vec<f32>) -> usize;
    fn release(&mut self);
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Einstellungen des Controllers
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    /// Laengste Aeusserung; danach meldet `pump` `LimitReached`
    pub max_utterance: Duration,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            max_utterance: Duration::from_secs(10),
        }
    }
}

/// Nachweis einer laufenden Aufnahme
///
/// Nicht klonbar: `end` und `cancel` verbrauchen das Handle.
#[derive(Debug, PartialEq, Eq)]
pub struct CaptureHandle {
    id: u64,
}

impl CaptureHandle {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Zwischenstand einer laufenden Aufnahme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureProgress {
    Laeuft { frames: u64 },
    /// Maximale Aeusserungslaenge erreicht, weitere Samples werden verworfen
    LimitReached { frames: u64 },
}

struct AktiveAufnahme {
    id: u64,
    encoder: OpusEncoder,
    writer: OpusFramedWriter,
    /// Noch nicht kodierte interleaved Samples
    offen: Vec<f32>,
    kanaele: usize,
    /// Encoder-Vorlauf in Frames pro Kanal
    vorlauf: usize,
    frames: u64,
    limit_frames: u64,
}

impl AktiveAufnahme {
    /// Uebernimmt neue Samples bis zum Limit und kodiert volle Frames
    fn aufnehmen(&mut self, neu: &[f32]) -> Result<(), CaptureError> {
        let rest = self.limit_frames.saturating_sub(self.frames) as usize * self.kanaele;
        let uebernehmen = neu.len().min(rest);
        // Nur ganze Frames zaehlen
        let uebernehmen = uebernehmen - uebernehmen % self.kanaele;
        self.offen.extend_from_slice(&neu[..uebernehmen]);
        self.frames += (uebernehmen / self.kanaele) as u64;

        let frame_len = self.encoder.frame_len();
        while self.offen.len() >= frame_len {
            let paket = self.encoder.encode(&self.offen[..frame_len])?;
            self.writer.paket_anhaengen(&paket);
            self.offen.drain(..frame_len);
        }
        Ok(())
    }

    fn limit_erreicht(&self) -> bool {
        self.frames >= self.limit_frames
    }

    /// Kodiert den letzten, mit Stille aufgefuellten Frame
    fn abschliessen(mut self) -> Result<Option<CapturedUtterance>, CaptureError> {
        if self.frames == 0 {
            return Ok(None);
        }
        // Stille fuer den Encoder-Vorlauf, dann bis zur Framegrenze
        let frame_len = self.encoder.frame_len();
        let ende = self.offen.len() + self.vorlauf * self.kanaele;
        self.offen.resize(ende.div_ceil(frame_len) * frame_len, 0.0);
        for frame in self.offen.chunks(frame_len) {
            let paket = self.encoder.encode(frame)?;
            self.writer.paket_anhaengen(&paket);
        }
        Ok(Some(self.writer.abschliessen(self.frames)))
    }
}

/// Steuert Belegen, Kodieren und Freigeben des Eingabegeraets
pub struct CaptureController {
    input: Box<dyn AudioInput>,
    settings: CaptureSettings,
    aktiv: Option<AktiveAufnahme>,
    naechste_id: u64,
    lese_puffer: Vec<f32>,
}

impl CaptureController {
    pub fn new(input: Box<dyn AudioInput>, settings: CaptureSettings) -> Self {
        Self {
            input,
            settings,
            aktiv: None,
            naechste_id: 1,
            lese_puffer: Vec::new(),
        }
    }

    /// Belegt das Geraet und startet die Kodierung
    pub fn begin(&mut self) -> Result<CaptureHandle, CaptureError> {
        if self.aktiv.is_some() {
            return Err(CaptureError::Busy);
        }

        let format = self.input.acquire()?;
        let aufnahme = match self.aufnahme_vorbereiten(format) {
            Ok(a) => a,
            Err(e) => {
                self.input.release();
                return Err(e);
            }
        };

        let id = aufnahme.id;
        self.aktiv = Some(aufnahme);
        info!(
            id,
            rate = format.sample_rate,
            kanaele = format.channels,
            "Aufnahme gestartet"
        );
        Ok(CaptureHandle { id })
    }

    fn aufnahme_vorbereiten(&mut self, format: InputFormat) -> Result<AktiveAufnahme, CaptureError> {
        let rate = SampleRate::from_hz(format.sample_rate).ok_or_else(|| {
            CaptureError::UnsupportedFormat(format!(
                "{} Hz ist keine Opus-Rate",
                format.sample_rate
            ))
        })?;
        let kanaele = ChannelCount::from_count(format.channels).ok_or_else(|| {
            CaptureError::UnsupportedFormat(format!("{} Kanaele", format.channels))
        })?;

        let config = OpusConfig::fuer_aufnahme(rate, kanaele);
        let encoder = OpusEncoder::new(config.clone())?;
        let vorlauf = encoder.vorlauf()?;
        let limit_frames =
            (self.settings.max_utterance.as_secs_f64() * format.sample_rate as f64).ceil() as u64;

        let id = self.naechste_id;
        self.naechste_id += 1;

        Ok(AktiveAufnahme {
            id,
            encoder,
            writer: OpusFramedWriter::new(config, vorlauf.min(u16::MAX as u32) as u16),
            offen: Vec::new(),
            kanaele: format.channels as usize,
            vorlauf: vorlauf as usize,
            frames: 0,
            limit_frames,
        })
    }

    /// Liest das Geraet leer und kodiert alle vollstaendigen Frames
    pub fn pump(&mut self, handle: &CaptureHandle) -> Result<CaptureProgress, CaptureError> {
        self.pruefe_handle(handle)?;

        self.lese_puffer.clear();
        self.input.drain(&mut self.lese_puffer);

        let ergebnis = match self.aktiv.as_mut() {
            Some(aufnahme) => aufnahme.aufnehmen(&self.lese_puffer).map(|_| {
                if aufnahme.limit_erreicht() {
                    CaptureProgress::LimitReached {
                        frames: aufnahme.frames,
                    }
                } else {
                    CaptureProgress::Laeuft {
                        frames: aufnahme.frames,
                    }
                }
            }),
            None => Err(CaptureError::StaleHandle),
        };

        if let Err(e) = &ergebnis {
            warn!(fehler = %e, "Aufnahme abgebrochen");
            self.verwerfen();
        }
        ergebnis
    }

    /// Beendet die Aufnahme, gibt das Geraet frei und liefert den Container
    ///
    /// Ohne aufgenommene Samples kommt `EmptyCapture` statt eines leeren Puffers.
    pub fn end(&mut self, handle: CaptureHandle) -> Result<CapturedUtterance, CaptureError> {
        self.pruefe_handle(&handle)?;

        self.lese_puffer.clear();
        self.input.drain(&mut self.lese_puffer);
        self.input.release();

        let mut aufnahme = self.aktiv.take().ok_or(CaptureError::StaleHandle)?;
        aufnahme.aufnehmen(&self.lese_puffer)?;
        let frames = aufnahme.frames;

        match aufnahme.abschliessen()? {
            Some(utterance) => {
                info!(
                    id = handle.id,
                    frames,
                    bytes = utterance.len(),
                    "Aufnahme beendet"
                );
                Ok(utterance)
            }
            None => {
                debug!(id = handle.id, "Aufnahme ohne Samples beendet");
                Err(CaptureError::EmptyCapture)
            }
        }
    }

    /// Bricht die Aufnahme ab und verwirft alle Daten
    pub fn cancel(&mut self, handle: CaptureHandle) {
        if self.pruefe_handle(&handle).is_ok() {
            debug!(id = handle.id, "Aufnahme verworfen");
            self.verwerfen();
        }
    }

    /// Verwirft eine eventuell laufende Aufnahme ohne Handle
    ///
    /// Fuer den Abbau der Sitzung, wenn das Handle schon verloren ist.
    pub fn verwerfen(&mut self) {
        if self.aktiv.take().is_some() {
            self.input.release();
        }
    }

    pub fn ist_aktiv(&self) -> bool {
        self.aktiv.is_some()
    }

    fn pruefe_handle(&self, handle: &CaptureHandle) -> Result<(), CaptureError> {
        match &self.aktiv {
            Some(a) if a.id == handle.id => Ok(()),
            _ => Err(CaptureError::StaleHandle),
        }
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        self.verwerfen();
    }
}

// ---------------------------------------------------------------------------
// MockInput
// ---------------------------------------------------------------------------

/// Fehler den `MockInput` beim Belegen liefern soll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFehler {
    ZugriffVerweigert,
    KeinGeraet,
}

#[derive(Debug, Default)]
struct MockZustand {
    samples: VecDeque<f32>,
    belegt: bool,
    belegungen: usize,
    freigaben: usize,
    fehler: Option<MockFehler>,
}

/// Eingabegeraet ohne Hardware
///
/// Klone teilen sich den Zustand: der Test behaelt einen Klon und
/// speist Samples ein, waehrend der Controller den anderen besitzt.
/// Samples die eingespeist werden waehrend das Geraet nicht belegt ist,
/// gehen verloren, wie bei einem echten Mikrofon.
#[derive(Debug, Clone)]
pub struct MockInput {
    format: InputFormat,
    zustand: Arc<Mutex<MockZustand>>,
}

impl MockInput {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            format: InputFormat {
                sample_rate,
                channels,
            },
            zustand: Arc::new(Mutex::new(MockZustand::default())),
        }
    }

    /// Naechstes `acquire` schlaegt mit diesem Fehler fehl
    pub fn fehler_setzen(&self, fehler: Option<MockFehler>) {
        self.zustand.lock().fehler = fehler;
    }

    /// Speist interleaved Samples ein
    pub fn einspeisen(&self, samples: &[f32]) {
        let mut z = self.zustand.lock();
        if z.belegt {
            z.samples.extend(samples.iter().copied());
        }
    }

    /// Speist einen Sinuston der gegebenen Dauer ein
    pub fn sinus_einspeisen(&self, freq: f32, sekunden: f32) {
        let rate = self.format.sample_rate as f32;
        let frames = (sekunden * rate).round() as usize;
        let kanaele = self.format.channels as usize;
        let mut samples = Vec::with_capacity(frames * kanaele);
        for i in 0..frames {
            let s = (i as f32 * freq * 2.0 * std::f32::consts::PI / rate).sin() * 0.5;
            samples.extend(std::iter::repeat(s).take(kanaele));
        }
        self.einspeisen(&samples);
    }

    pub fn ist_belegt(&self) -> bool {
        self.zustand.lock().belegt
    }

    pub fn belegungen(&self) -> usize {
        self.zustand.lock().belegungen
    }

    pub fn freigaben(&self) -> usize {
        self.zustand.lock().freigaben
    }
}

impl AudioInput for MockInput {
    fn acquire(&mut self) -> Result<InputFormat, CaptureError> {
        let mut z = self.zustand.lock();
        match z.fehler {
            Some(MockFehler::ZugriffVerweigert) => {
                return Err(CaptureError::PermissionDenied("Mock".into()))
            }
            Some(MockFehler::KeinGeraet) => return Err(CaptureError::NoDevice("Mock".into())),
            None => {}
        }
        z.belegt = true;
        z.belegungen += 1;
        z.samples.clear();
        Ok(self.format)
    }

    fn drain(&mut self, out: &mut Vec<f32>) -> usize {
        let mut z = self.zustand.lock();
        let n = z.samples.len();
        out.extend(z.samples.drain(..));
        n
    }

    fn release(&mut self) {
        let mut z = self.zustand.lock();
        if z.belegt {
            z.belegt = false;
            z.freigaben += 1;
        }
        z.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerCodec;
    use crate::transcode::PcmTranscoder;

    fn controller(rate: u32, kanaele: u16) -> (CaptureController, MockInput) {
        let mic = MockInput::new(rate, kanaele);
        let ctrl = CaptureController::new(Box::new(mic.clone()), CaptureSettings::default());
        (ctrl, mic)
    }

    #[test]
    fn zwei_sekunden_ergeben_32000_samples() {
        let (mut ctrl, mic) = controller(48000, 1);
        let handle = ctrl.begin().unwrap();
        mic.sinus_einspeisen(440.0, 2.0);
        let utt = ctrl.end(handle).unwrap();
        assert_eq!(utt.codec(), ContainerCodec::OpusFramed);

        let pcm = PcmTranscoder::new().transcode(utt, 16000).unwrap();
        assert_eq!(pcm.number_of_channels(), 1);
        assert!((pcm.len() as i64 - 32000).abs() <= 1, "{} Samples", pcm.len());
    }

    #[test]
    fn pump_kodiert_inkrementell() {
        let (mut ctrl, mic) = controller(16000, 2);
        let handle = ctrl.begin().unwrap();
        mic.sinus_einspeisen(300.0, 0.5);
        assert_eq!(
            ctrl.pump(&handle).unwrap(),
            CaptureProgress::Laeuft { frames: 8000 }
        );
        mic.sinus_einspeisen(300.0, 0.25);
        let utt = ctrl.end(handle).unwrap();
        let pcm = PcmTranscoder::new().transcode(utt, 16000).unwrap();
        assert_eq!(pcm.len(), 12000);
    }

    #[test]
    fn leere_aufnahme_ist_explizit() {
        let (mut ctrl, mic) = controller(48000, 1);
        let handle = ctrl.begin().unwrap();
        assert!(matches!(ctrl.end(handle), Err(CaptureError::EmptyCapture)));
        assert!(!mic.ist_belegt());
        assert!(!ctrl.ist_aktiv());
    }

    #[test]
    fn geraet_ist_exklusiv() {
        let (mut ctrl, mic) = controller(48000, 1);
        let handle = ctrl.begin().unwrap();
        assert!(matches!(ctrl.begin(), Err(CaptureError::Busy)));
        assert_eq!(mic.belegungen(), 1);
        ctrl.cancel(handle);
        assert!(!mic.ist_belegt());
        assert_eq!(mic.freigaben(), 1);
        // Danach wieder moeglich
        let handle = ctrl.begin().unwrap();
        ctrl.cancel(handle);
    }

    #[test]
    fn altes_handle_wird_abgelehnt() {
        let (mut ctrl, _mic) = controller(48000, 1);
        let alt = ctrl.begin().unwrap();
        let alt_id = alt.id();
        ctrl.cancel(alt);
        let neu = ctrl.begin().unwrap();
        assert_ne!(neu.id(), alt_id);
        let gefaelscht = CaptureHandle { id: alt_id };
        assert!(matches!(ctrl.pump(&gefaelscht), Err(CaptureError::StaleHandle)));
        assert!(ctrl.ist_aktiv(), "Fremdes Handle darf die Aufnahme nicht beenden");
        ctrl.cancel(neu);
    }

    #[test]
    fn limit_wird_gemeldet_und_eingehalten() {
        let mic = MockInput::new(16000, 1);
        let mut ctrl = CaptureController::new(
            Box::new(mic.clone()),
            CaptureSettings {
                max_utterance: Duration::from_millis(500),
            },
        );
        let handle = ctrl.begin().unwrap();
        mic.sinus_einspeisen(200.0, 0.8);
        assert_eq!(
            ctrl.pump(&handle).unwrap(),
            CaptureProgress::LimitReached { frames: 8000 }
        );
        let pcm = PcmTranscoder::new()
            .transcode(ctrl.end(handle).unwrap(), 16000)
            .unwrap();
        assert_eq!(pcm.len(), 8000);
    }

    #[test]
    fn belegungsfehler_werden_durchgereicht() {
        let (mut ctrl, mic) = controller(48000, 1);
        mic.fehler_setzen(Some(MockFehler::ZugriffVerweigert));
        assert!(matches!(ctrl.begin(), Err(CaptureError::PermissionDenied(_))));
        mic.fehler_setzen(Some(MockFehler::KeinGeraet));
        assert!(matches!(ctrl.begin(), Err(CaptureError::NoDevice(_))));
        assert!(!ctrl.ist_aktiv());
    }

    #[test]
    fn nicht_opus_rate_gibt_geraet_frei() {
        let (mut ctrl, mic) = controller(44100, 1);
        assert!(matches!(ctrl.begin(), Err(CaptureError::UnsupportedFormat(_))));
        assert!(!mic.ist_belegt());
        assert!(!ctrl.ist_aktiv());
    }

    #[test]
    fn samples_vor_belegung_gehen_verloren() {
        let (mut ctrl, mic) = controller(16000, 1);
        mic.sinus_einspeisen(200.0, 1.0);
        let handle = ctrl.begin().unwrap();
        assert!(matches!(ctrl.end(handle), Err(CaptureError::EmptyCapture)));
    }
}
