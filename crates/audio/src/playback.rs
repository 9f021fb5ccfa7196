//! Lautsprecher-Ausgabe via cpal
//!
//! `CpalSink` fuehrt eine eigene Zeitachse in Frames der Stream-Rate
//! (`PlaybackConfig::sample_rate`). Geplante Puffer liegen mit ihrem
//! Start-Frame in einer geteilten Liste; aneinanderliegende Puffer
//! stossen dadurch Sample-genau aneinander. Der Output-Callback mischt
//! die Zeitachse fortlaufend und zaehlt die gemischten Frames mit;
//! `now()` ist diese Zaehlung in Sekunden. Laeuft das Geraet mit einer
//! anderen Rate, setzt ein einziger Resampler im Callback den gesamten
//! gemischten Strom um, nicht jeden Puffer einzeln. Sobald ein Puffer
//! vollstaendig gemischt ist, geht `PlaybackEvent::Finished` an den
//! Besitzer.
//!
//! cpal::Stream ist !Send, deshalb lebt der Stream in einem eigenen
//! Thread bis der Sink gedroppt wird.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SampleRate, SizedSample, Stream, StreamConfig};
use parking_lot::Mutex;
use rubato::{FftFixedOut, Resampler};
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

use crate::device::load_cpal_output_device;
use crate::error::PlaybackError;
use crate::pcm::PcmBuffer;
use crate::sink::{BufferId, PlaybackEvent, PlaybackEventReceiver, PlaybackEventSender, PlaybackSink};

/// Ausgabe-Frames pro Resampler-Durchlauf
const WANDLER_CHUNK: usize = 256;

/// Konfiguration der Ausgabe
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Teil des Geraetenamens, `None` fuer das Standardgeraet
    pub device: Option<String>,
    /// Rate der geplanten Puffer in Hz, zugleich bevorzugte Geraeterate
    pub sample_rate: u32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: talkback_protocol::PLAYBACK_SAMPLE_RATE,
        }
    }
}

/// Ein geplanter Puffer auf der Frame-Zeitachse
struct Eintrag {
    id: BufferId,
    start_frame: u64,
    samples: Vec<f32>,
}

impl Eintrag {
    fn ende_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

#[derive(Default)]
struct Zeitachse {
    eintraege: Vec<Eintrag>,
}

struct Geteilt {
    zeitachse: Mutex<Zeitachse>,
    /// Gemischte Frames in Stream-Rate
    frames_gespielt: AtomicU64,
}

impl Geteilt {
    fn neu() -> Self {
        Self {
            zeitachse: Mutex::new(Zeitachse::default()),
            frames_gespielt: AtomicU64::new(0),
        }
    }

    fn jetzt(&self, rate: u32) -> f64 {
        self.frames_gespielt.load(Ordering::Acquire) as f64 / rate as f64
    }

    /// Legt einen Puffer an seinen Start-Frame in der Stream-Rate
    fn einplanen(
        &self,
        id: BufferId,
        buffer: &PcmBuffer,
        start: f64,
        rate: u32,
    ) -> Result<(), PlaybackError> {
        if buffer.sample_rate() != rate {
            return Err(PlaybackError::Stream(format!(
                "Puffer mit {} Hz passt nicht zur Stream-Rate {} Hz",
                buffer.sample_rate(),
                rate
            )));
        }
        let start_frame = (start.max(0.0) * rate as f64).round() as u64;
        let samples = buffer.to_f32();
        trace!(id, start_frame, frames = samples.len(), "Puffer an Ausgabe uebergeben");
        self.zeitachse.lock().eintraege.push(Eintrag {
            id,
            start_frame,
            samples,
        });
        Ok(())
    }
}

/// Ausgabe ueber ein cpal-Geraet
pub struct CpalSink {
    geteilt: Arc<Geteilt>,
    /// Rate der Zeitachse
    stream_rate: u32,
    /// Rate des Geraets
    rate: u32,
    kanaele: u16,
    stop_tx: crossbeam_channel::Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl CpalSink {
    /// Oeffnet das Ausgabegeraet
    ///
    /// Gibt den Sink und den Empfaenger seiner Fertigmeldungen zurueck.
    pub fn oeffnen(config: PlaybackConfig) -> Result<(Self, PlaybackEventReceiver), PlaybackError> {
        if config.sample_rate == 0 {
            return Err(PlaybackError::Stream("Stream-Rate 0 Hz".into()));
        }
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let geteilt = Arc::new(Geteilt::neu());
        let stream_rate = config.sample_rate;

        let (bereit_tx, bereit_rx) = std_mpsc::sync_channel::<Result<(u32, u16), PlaybackError>>(1);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let thread_geteilt = Arc::clone(&geteilt);

        let thread = std::thread::Builder::new()
            .name("talkback-playback".to_string())
            .spawn(move || {
                let stream = match open_playback_stream(&config, thread_geteilt, events_tx) {
                    Ok(v) => v,
                    Err(e) => {
                        let _ = bereit_tx.send(Err(e));
                        return;
                    }
                };
                let (stream, rate, kanaele) = stream;
                if bereit_tx.send(Ok((rate, kanaele))).is_err() {
                    return;
                }
                let _ = stop_rx.recv();
                drop(stream);
                debug!("Playback-Thread beendet");
            })
            .map_err(|e| PlaybackError::Stream(e.to_string()))?;

        match bereit_rx.recv() {
            Ok(Ok((rate, kanaele))) => Ok((
                Self {
                    geteilt,
                    stream_rate,
                    rate,
                    kanaele,
                    stop_tx,
                    thread: Some(thread),
                },
                events_rx,
            )),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(PlaybackError::Stream(
                    "Playback-Thread ohne Rueckmeldung beendet".into(),
                ))
            }
        }
    }

    /// Tatsaechliche Ausgaberate des Geraets
    pub fn sample_rate(&self) -> u32 {
        self.rate
    }

    pub fn channels(&self) -> u16 {
        self.kanaele
    }
}

impl PlaybackSink for CpalSink {
    fn now(&self) -> f64 {
        self.geteilt.jetzt(self.stream_rate)
    }

    fn schedule(
        &mut self,
        id: BufferId,
        buffer: PcmBuffer,
        start: f64,
    ) -> Result<(), PlaybackError> {
        self.geteilt.einplanen(id, &buffer, start, self.stream_rate)
    }

    fn cancel_all(&mut self) {
        self.geteilt.zeitachse.lock().eintraege.clear();
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Playback-Thread ist abgestuerzt");
            }
        }
    }
}

/// Mischt alle Eintraege in einen Block ab `ab_frame`
///
/// `out` ist interleaved mit `kanaele` Kanaelen; Mono wird auf alle
/// Kanaele dupliziert. Vollstaendig ausgegebene Eintraege werden
/// entfernt und ihre IDs in `fertig` gesammelt.
fn block_mischen(
    zeitachse: &mut Zeitachse,
    ab_frame: u64,
    out: &mut [f32],
    kanaele: usize,
    fertig: &mut Vec<BufferId>,
) {
    let kanaele = kanaele.max(1);
    out.fill(0.0);
    let frames = (out.len() / kanaele) as u64;
    let bis_frame = ab_frame + frames;

    for eintrag in &zeitachse.eintraege {
        let von = eintrag.start_frame.max(ab_frame);
        let bis = eintrag.ende_frame().min(bis_frame);
        for f in von..bis {
            let s = eintrag.samples[(f - eintrag.start_frame) as usize];
            let basis = (f - ab_frame) as usize * kanaele;
            for k in &mut out[basis..basis + kanaele] {
                *k += s;
            }
        }
    }
    for s in out.iter_mut() {
        *s = s.clamp(-1.0, 1.0);
    }

    zeitachse.eintraege.retain(|e| {
        if e.ende_frame() <= bis_frame {
            fertig.push(e.id);
            false
        } else {
            true
        }
    });
}

fn callback_block(
    geteilt: &Geteilt,
    events: &PlaybackEventSender,
    out: &mut [f32],
    kanaele: usize,
    fertig: &mut Vec<BufferId>,
) {
    let ab_frame = geteilt.frames_gespielt.load(Ordering::Acquire);
    {
        let mut zeitachse = geteilt.zeitachse.lock();
        block_mischen(&mut zeitachse, ab_frame, out, kanaele, fertig);
    }
    geteilt
        .frames_gespielt
        .fetch_add((out.len() / kanaele.max(1)) as u64, Ordering::Release);
    for id in fertig.drain(..) {
        let _ = events.send(PlaybackEvent::Finished { id });
    }
}

/// Fortlaufender Resampler von Stream-Rate auf Geraeterate
///
/// Lebt so lange wie der Stream; auch Stille zwischen Puffern laeuft
/// durch denselben Resampler.
struct Wandler {
    resampler: FftFixedOut<f32>,
    eingang: Vec<Vec<f32>>,
    ausgang: Vec<Vec<f32>>,
    fifo: VecDeque<f32>,
}

impl Wandler {
    fn neu(stream_rate: u32, geraet_rate: u32) -> Result<Self, PlaybackError> {
        let resampler = FftFixedOut::<f32>::new(
            stream_rate as usize,
            geraet_rate as usize,
            WANDLER_CHUNK,
            1,
            1,
        )
        .map_err(|e| PlaybackError::Stream(format!("Resampler-Initialisierung: {e}")))?;
        let eingang = resampler.input_buffer_allocate(true);
        let ausgang = resampler.output_buffer_allocate(true);
        Ok(Self {
            resampler,
            eingang,
            ausgang,
            fifo: VecDeque::with_capacity(4 * WANDLER_CHUNK),
        })
    }
}

/// Fuellt die Ausgabebloecke des Geraets aus der Zeitachse
struct Mischer {
    geteilt: Arc<Geteilt>,
    events: PlaybackEventSender,
    kanaele: usize,
    wandler: Option<Wandler>,
    fertig: Vec<BufferId>,
}

impl Mischer {
    fn neu(
        geteilt: Arc<Geteilt>,
        events: PlaybackEventSender,
        kanaele: usize,
        stream_rate: u32,
        geraet_rate: u32,
    ) -> Result<Self, PlaybackError> {
        let wandler = if stream_rate == geraet_rate {
            None
        } else {
            debug!(stream_rate, geraet_rate, "Ausgabe wird fortlaufend resampelt");
            Some(Wandler::neu(stream_rate, geraet_rate)?)
        };
        Ok(Self {
            geteilt,
            events,
            kanaele: kanaele.max(1),
            wandler,
            fertig: Vec::new(),
        })
    }

    /// Fuellt einen interleaved Block in Geraeterate
    fn fuellen(&mut self, out: &mut [f32]) {
        let kanaele = self.kanaele;
        let Some(w) = self.wandler.as_mut() else {
            callback_block(&self.geteilt, &self.events, out, kanaele, &mut self.fertig);
            return;
        };

        let frames = out.len() / kanaele;
        while w.fifo.len() < frames {
            let n = w.resampler.input_frames_next();
            w.eingang[0].resize(n, 0.0);
            callback_block(&self.geteilt, &self.events, &mut w.eingang[0], 1, &mut self.fertig);
            match w.resampler.process_into_buffer(&w.eingang, &mut w.ausgang, None) {
                Ok((_, geschrieben)) => w.fifo.extend(&w.ausgang[0][..geschrieben]),
                Err(e) => {
                    error!("Resampler-Fehler: {}", e);
                    w.fifo.extend(std::iter::repeat(0.0).take(frames));
                }
            }
        }
        for frame in out.chunks_mut(kanaele) {
            let s = w.fifo.pop_front().unwrap_or(0.0);
            frame.fill(s);
        }
    }
}

/// Wandelt gemischte Float-Samples in das Geraeteformat
fn in_format_schreiben<T: SizedSample + FromSample<f32>>(quelle: &[f32], ziel: &mut [T]) {
    for (o, s) in ziel.iter_mut().zip(quelle) {
        *o = <T as cpal::Sample>::from_sample(*s);
    }
}

fn ausgabe_stream<T: SizedSample + FromSample<f32>>(
    device: &Device,
    config: &StreamConfig,
    mut mischer: Mischer,
) -> Result<Stream, cpal::BuildStreamError> {
    let mut float_buf = Vec::new();
    device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            float_buf.resize(data.len(), 0.0);
            mischer.fuellen(&mut float_buf);
            in_format_schreiben(&float_buf, data);
        },
        |err| error!("Playback-Fehler: {}", err),
        None,
    )
}

/// Sucht Mono, sonst Stereo bei der gewuenschten Rate, sonst die
/// Standardkonfiguration des Geraets
fn format_waehlen(device: &Device, rate: u32) -> Result<(StreamConfig, SampleFormat), PlaybackError> {
    let passend = |kanaele: u16| {
        device.supported_output_configs().ok()?.find(|c| {
            c.channels() == kanaele
                && c.min_sample_rate() <= SampleRate(rate)
                && c.max_sample_rate() >= SampleRate(rate)
        })
    };

    if let Some(c) = passend(1).or_else(|| passend(2)) {
        let format = c.sample_format();
        return Ok((c.with_sample_rate(SampleRate(rate)).config(), format));
    }

    let standard = device
        .default_output_config()
        .map_err(|e| PlaybackError::Stream(e.to_string()))?;
    debug!(
        rate = standard.sample_rate().0,
        "Keine passende Ausgabe bei {} Hz, verwende Standardformat", rate
    );
    let format = standard.sample_format();
    Ok((standard.config(), format))
}

fn open_playback_stream(
    config: &PlaybackConfig,
    geteilt: Arc<Geteilt>,
    events: PlaybackEventSender,
) -> Result<(Stream, u32, u16), PlaybackError> {
    let device = load_cpal_output_device(config.device.as_deref())
        .map_err(|e| PlaybackError::NoDevice(e.to_string()))?;
    let (stream_config, sample_format) = format_waehlen(&device, config.sample_rate)?;
    if stream_config.sample_rate.0 != config.sample_rate {
        warn!(
            stream_rate = config.sample_rate,
            geraet_rate = stream_config.sample_rate.0,
            "Geraet laeuft mit anderer Rate"
        );
    }
    let mischer = Mischer::neu(
        geteilt,
        events,
        stream_config.channels as usize,
        config.sample_rate,
        stream_config.sample_rate.0,
    )?;

    let stream = match sample_format {
        SampleFormat::F32 => ausgabe_stream::<f32>(&device, &stream_config, mischer),
        SampleFormat::I16 => ausgabe_stream::<i16>(&device, &stream_config, mischer),
        SampleFormat::U16 => ausgabe_stream::<u16>(&device, &stream_config, mischer),
        SampleFormat::I32 => ausgabe_stream::<i32>(&device, &stream_config, mischer),
        andere => {
            return Err(PlaybackError::Stream(format!(
                "Nicht unterstuetztes Sample-Format: {:?}",
                andere
            )))
        }
    }
    .map_err(|e| match e {
        cpal::BuildStreamError::DeviceNotAvailable => PlaybackError::NoDevice(e.to_string()),
        andere => PlaybackError::Stream(andere.to_string()),
    })?;

    stream
        .play()
        .map_err(|e| PlaybackError::Stream(e.to_string()))?;

    debug!(
        "Playback-Stream geoeffnet: {}Hz {}ch {:?}",
        stream_config.sample_rate.0, stream_config.channels, sample_format
    );

    Ok((stream, stream_config.sample_rate.0, stream_config.channels))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eintrag(id: BufferId, start_frame: u64, wert: f32, frames: usize) -> Eintrag {
        Eintrag {
            id,
            start_frame,
            samples: vec![wert; frames],
        }
    }

    fn sinus(frames: usize, rate: u32) -> Vec<f32> {
        (0..frames)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / rate as f32).sin())
            .collect()
    }

    /// Zieht `frames` Mono-Frames in Bloecken von `block` aus dem Mischer
    fn ziehen(mischer: &mut Mischer, frames: usize, block: usize) -> Vec<f32> {
        let mut alles = Vec::with_capacity(frames);
        let mut out = vec![0.0f32; block * mischer.kanaele];
        while alles.len() < frames {
            mischer.fuellen(&mut out);
            alles.extend(out.iter().step_by(mischer.kanaele));
        }
        alles.truncate(frames);
        alles
    }

    #[test]
    fn puffer_beginnt_am_start_frame() {
        let mut zeitachse = Zeitachse::default();
        zeitachse.eintraege.push(eintrag(1, 4, 0.5, 3));
        let mut out = vec![1.0f32; 8];
        let mut fertig = Vec::new();
        block_mischen(&mut zeitachse, 0, &mut out, 1, &mut fertig);
        assert_eq!(out, vec![0.0, 0.0, 0.0, 0.0, 0.5, 0.5, 0.5, 0.0]);
        assert_eq!(fertig, vec![1]);
        assert!(zeitachse.eintraege.is_empty());
    }

    #[test]
    fn puffer_ueber_blockgrenze() {
        let mut zeitachse = Zeitachse::default();
        zeitachse.eintraege.push(eintrag(9, 2, 0.25, 4));
        let mut fertig = Vec::new();

        let mut erster = vec![0.0f32; 4];
        block_mischen(&mut zeitachse, 0, &mut erster, 1, &mut fertig);
        assert_eq!(erster, vec![0.0, 0.0, 0.25, 0.25]);
        assert!(fertig.is_empty(), "Noch nicht fertig gespielt");

        let mut zweiter = vec![0.0f32; 4];
        block_mischen(&mut zeitachse, 4, &mut zweiter, 1, &mut fertig);
        assert_eq!(zweiter, vec![0.25, 0.25, 0.0, 0.0]);
        assert_eq!(fertig, vec![9]);
    }

    #[test]
    fn aufeinanderfolgende_puffer_ohne_luecke() {
        let mut zeitachse = Zeitachse::default();
        zeitachse.eintraege.push(eintrag(1, 0, 0.1, 3));
        zeitachse.eintraege.push(eintrag(2, 3, 0.2, 3));
        let mut out = vec![0.0f32; 6];
        let mut fertig = Vec::new();
        block_mischen(&mut zeitachse, 0, &mut out, 1, &mut fertig);
        assert_eq!(out, vec![0.1, 0.1, 0.1, 0.2, 0.2, 0.2]);
        assert_eq!(fertig, vec![1, 2]);
    }

    #[test]
    fn mono_auf_stereo_dupliziert() {
        let mut zeitachse = Zeitachse::default();
        zeitachse.eintraege.push(eintrag(1, 1, 0.5, 1));
        let mut out = vec![0.0f32; 4];
        let mut fertig = Vec::new();
        block_mischen(&mut zeitachse, 0, &mut out, 2, &mut fertig);
        assert_eq!(out, vec![0.0, 0.0, 0.5, 0.5]);
    }

    #[test]
    fn callback_zaehlt_frames_und_meldet() {
        let geteilt = Geteilt::neu();
        geteilt.zeitachse.lock().eintraege.push(eintrag(5, 0, 0.1, 2));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut out = vec![0.0f32; 8];
        let mut fertig = Vec::new();
        callback_block(&geteilt, &tx, &mut out, 2, &mut fertig);
        assert_eq!(geteilt.frames_gespielt.load(Ordering::Acquire), 4);
        assert_eq!(rx.try_recv().unwrap(), PlaybackEvent::Finished { id: 5 });
    }

    #[test]
    fn fremde_rate_wird_abgelehnt() {
        let geteilt = Geteilt::neu();
        let ergebnis = geteilt.einplanen(1, &PcmBuffer::stille(0.1, 16000), 0.0, 24000);
        assert!(matches!(ergebnis, Err(PlaybackError::Stream(_))));
        assert!(geteilt.zeitachse.lock().eintraege.is_empty());
    }

    #[test]
    fn gleiche_rate_ohne_resampler() {
        let geteilt = Arc::new(Geteilt::neu());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut mischer = Mischer::neu(Arc::clone(&geteilt), tx, 2, 24000, 24000).unwrap();
        assert!(mischer.wandler.is_none());

        geteilt
            .einplanen(3, &PcmBuffer::from_f32(&[0.5; 4], 24000), 0.0, 24000)
            .unwrap();
        let mut out = vec![0.0f32; 12];
        mischer.fuellen(&mut out);
        assert!((out[0] - 0.5).abs() < 1e-3);
        assert!((out[7] - 0.5).abs() < 1e-3);
        assert_eq!(out[8], 0.0);
        assert_eq!(rx.try_recv().unwrap(), PlaybackEvent::Finished { id: 3 });
    }

    /// Zwei Haelften eines Sinus klingen bei 48 kHz genau wie der ganze Sinus
    #[test]
    fn naht_zwischen_puffern_bei_48k() {
        let signal = sinus(24000, 24000);
        let teilung = 12014;

        let geteilt = Arc::new(Geteilt::neu());
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut mischer = Mischer::neu(Arc::clone(&geteilt), tx, 1, 24000, 48000).unwrap();
        geteilt
            .einplanen(1, &PcmBuffer::from_f32(&signal[..teilung], 24000), 0.0, 24000)
            .unwrap();
        geteilt
            .einplanen(
                2,
                &PcmBuffer::from_f32(&signal[teilung..], 24000),
                teilung as f64 / 24000.0,
                24000,
            )
            .unwrap();

        let ganz_geteilt = Arc::new(Geteilt::neu());
        let (tx, _rx2) = mpsc::unbounded_channel();
        let mut ganz = Mischer::neu(Arc::clone(&ganz_geteilt), tx, 1, 24000, 48000).unwrap();
        ganz_geteilt
            .einplanen(1, &PcmBuffer::from_f32(&signal, 24000), 0.0, 24000)
            .unwrap();

        let zwei_teile = ziehen(&mut mischer, 50000, 480);
        let am_stueck = ziehen(&mut ganz, 50000, 480);

        let max_fehler = zwei_teile
            .iter()
            .zip(&am_stueck)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f32, f32::max);
        assert!(max_fehler < 1e-6, "Abweichung an der Naht: {max_fehler}");

        // Steigung eines 440-Hz-Sinus mit 0.5 Amplitude bei 48 kHz < 0.03
        let max_sprung = zwei_teile[1000..46000]
            .windows(2)
            .map(|w| (w[1] - w[0]).abs())
            .fold(0.0f32, f32::max);
        assert!(max_sprung < 0.05, "Sprung im Signal: {max_sprung}");
    }

    /// 44.1 kHz Geraet: Zeitachse und Fertigmeldung driften nicht
    #[test]
    fn mischer_bei_44100_ohne_drift() {
        let geteilt = Arc::new(Geteilt::neu());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut mischer = Mischer::neu(Arc::clone(&geteilt), tx, 2, 24000, 44100).unwrap();
        assert!(mischer.wandler.is_some());

        geteilt
            .einplanen(1, &PcmBuffer::from_f32(&sinus(12000, 24000), 24000), 0.0, 24000)
            .unwrap();
        geteilt
            .einplanen(
                2,
                &PcmBuffer::from_f32(&sinus(12000, 24000), 24000),
                0.5,
                24000,
            )
            .unwrap();

        let block = 441;
        let mut out = vec![0.0f32; block * 2];
        let mut gezogen = 0usize;
        let mut fertig_bei = Vec::new();
        while gezogen < 3 * 44100 {
            mischer.fuellen(&mut out);
            gezogen += block;
            while let Ok(PlaybackEvent::Finished { id }) = rx.try_recv() {
                fertig_bei.push((id, gezogen));
            }
        }

        assert_eq!(fertig_bei.iter().map(|(id, _)| *id).collect::<Vec<_>>(), vec![1, 2]);
        let toleranz = 4 * WANDLER_CHUNK;
        let (_, bei) = fertig_bei[1];
        assert!(
            bei.abs_diff(44100) <= toleranz,
            "Fertigmeldung bei {bei} Geraete-Frames"
        );
        // Nach drei Sekunden Geraetezeit steht die Zeitachse bei drei Sekunden
        let jetzt = geteilt.jetzt(24000);
        assert!((jetzt - 3.0).abs() < toleranz as f64 / 24000.0, "Zeitachse bei {jetzt}");
    }

    #[test]
    fn ganzzahlige_formate() {
        let quelle = [0.0f32, -1.0, 0.5];

        let mut u16_out = [0u16; 3];
        in_format_schreiben(&quelle, &mut u16_out);
        assert_eq!(u16_out[0], 32768);
        assert_eq!(u16_out[1], 0);
        assert!(u16_out[2] > 32768);

        let mut i32_out = [0i32; 3];
        in_format_schreiben(&quelle, &mut i32_out);
        assert_eq!(i32_out[0], 0);
        assert_eq!(i32_out[1], i32::MIN);
        assert!(i32_out[2] > 1_000_000_000);
    }

    #[test]
    fn playback_config_default() {
        let config = PlaybackConfig::default();
        assert_eq!(config.sample_rate, 24000);
        assert!(config.device.is_none());
    }

    #[test]
    #[ignore = "Benoetigt Audio-Hardware"]
    fn ausgabe_oeffnen_und_abspielen() {
        let (mut sink, mut rx) = CpalSink::oeffnen(PlaybackConfig::default())
            .expect("Ausgabe sollte oeffenbar sein");
        let start = sink.now() + 0.05;
        sink.schedule(1, PcmBuffer::stille(0.2, 24000), start)
            .expect("Planen sollte klappen");
        std::thread::sleep(std::time::Duration::from_millis(500));
        assert_eq!(rx.try_recv().ok(), Some(PlaybackEvent::Finished { id: 1 }));
    }
}
