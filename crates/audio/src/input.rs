//! Mikrofon-Eingabe via cpal
//!
//! Oeffnet einen cpal InputStream und schreibt Samples in einen
//! lock-free Ring-Buffer. cpal::Stream ist !Send, deshalb lebt der
//! Stream in einem eigenen Thread, der nur fuer die Dauer einer
//! Aufnahme existiert. Der Consumer wird beim Belegen uebergeben.

use std::sync::mpsc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BuildStreamError, Device, PlayStreamError, SampleFormat, Stream, StreamConfig};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapRb};
use tracing::{debug, error, warn};

use crate::capture::{AudioInput, InputFormat};
use crate::device::load_cpal_input_device;
use crate::error::CaptureError;
use crate::pcm::dequantize;

/// Raten in Praeferenz-Reihenfolge, alle von Opus unterstuetzt
const OPUS_RATEN: [u32; 5] = [48000, 24000, 16000, 12000, 8000];

/// Konfiguration fuer die Mikrofon-Eingabe
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Teil des Geraetenamens, `None` fuer das Standardgeraet
    pub device: Option<String>,
    /// Gewuenschte Abtastrate in Hz
    pub sample_rate: u32,
    /// Gewuenschte Kanalanzahl (1 = Mono, 2 = Stereo)
    pub channels: u16,
    /// Ring-Buffer Kapazitaet in Sekunden
    pub buffer_secs: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: 48000,
            channels: 1,
            buffer_secs: 2,
        }
    }
}

struct LaufendeEingabe {
    consumer: HeapCons<f32>,
    stop_tx: crossbeam_channel::Sender<()>,
    thread: JoinHandle<()>,
}

/// Mikrofon ueber cpal
pub struct CpalInput {
    config: CaptureConfig,
    laufend: Option<LaufendeEingabe>,
    lese_puffer: Vec<f32>,
}

impl CpalInput {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            laufend: None,
            lese_puffer: vec![0.0; 4096],
        }
    }
}

impl AudioInput for CpalInput {
    fn acquire(&mut self) -> Result<InputFormat, CaptureError> {
        if self.laufend.is_some() {
            return Err(CaptureError::Busy);
        }

        let (bereit_tx, bereit_rx) =
            mpsc::sync_channel::<Result<(InputFormat, HeapCons<f32>), CaptureError>>(1);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let config = self.config.clone();

        let thread = std::thread::Builder::new()
            .name("talkback-capture".to_string())
            .spawn(move || {
                let (stream, format, consumer) = match open_capture_stream(&config) {
                    Ok(v) => v,
                    Err(e) => {
                        let _ = bereit_tx.send(Err(e));
                        return;
                    }
                };
                if bereit_tx.send(Ok((format, consumer))).is_err() {
                    return;
                }
                // Stream bleibt bis zum Stop-Signal (oder Sender-Drop) am Leben
                let _ = stop_rx.recv();
                drop(stream);
                debug!("Capture-Thread beendet");
            })
            .map_err(|e| CaptureError::Stream(e.to_string()))?;

        match bereit_rx.recv() {
            Ok(Ok((format, consumer))) => {
                self.laufend = Some(LaufendeEingabe {
                    consumer,
                    stop_tx,
                    thread,
                });
                Ok(format)
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(CaptureError::Stream("Capture-Thread ohne Rueckmeldung beendet".into()))
            }
        }
    }

    fn drain(&mut self, out: &mut Vec<f32>) -> usize {
        let Some(laufend) = self.laufend.as_mut() else {
            return 0;
        };
        let mut gesamt = 0;
        loop {
            let n = laufend.consumer.pop_slice(&mut self.lese_puffer);
            if n == 0 {
                break;
            }
            out.extend_from_slice(&self.lese_puffer[..n]);
            gesamt += n;
        }
        gesamt
    }

    fn release(&mut self) {
        if let Some(laufend) = self.laufend.take() {
            let _ = laufend.stop_tx.send(());
            if laufend.thread.join().is_err() {
                error!("Capture-Thread ist abgestuerzt");
            }
            debug!("Mikrofon freigegeben");
        }
    }
}

impl Drop for CpalInput {
    fn drop(&mut self) {
        self.release();
    }
}

/// Waehlt ein unterstuetztes Format
///
/// Gewuenschte Rate und Kanalzahl zuerst, danach jede Opus-Rate mit
/// Mono oder Stereo.
fn format_waehlen(
    device: &Device,
    wunsch: &CaptureConfig,
) -> Result<(StreamConfig, SampleFormat), CaptureError> {
    let configs: Vec<_> = device
        .supported_input_configs()
        .map_err(|e| CaptureError::UnsupportedFormat(e.to_string()))?
        .collect();

    let raten = std::iter::once(wunsch.sample_rate)
        .chain(OPUS_RATEN)
        .filter(|r| OPUS_RATEN.contains(r));

    for rate in raten {
        for kanaele in [wunsch.channels, 1, 2] {
            let passend = configs.iter().find(|c| {
                c.channels() == kanaele
                    && c.min_sample_rate().0 <= rate
                    && c.max_sample_rate().0 >= rate
            });
            if let Some(c) = passend {
                let stream_config = StreamConfig {
                    channels: kanaele,
                    sample_rate: cpal::SampleRate(rate),
                    buffer_size: cpal::BufferSize::Default,
                };
                return Ok((stream_config, c.sample_format()));
            }
        }
    }

    Err(CaptureError::UnsupportedFormat(
        "Geraet bietet keine Opus-Rate in Mono oder Stereo an".into(),
    ))
}

/// Oeffnet den Capture-Stream im aufrufenden Thread
fn open_capture_stream(
    config: &CaptureConfig,
) -> Result<(Stream, InputFormat, HeapCons<f32>), CaptureError> {
    let device = load_cpal_input_device(config.device.as_deref())
        .map_err(|e| CaptureError::NoDevice(e.to_string()))?;
    let (stream_config, sample_format) = format_waehlen(&device, config)?;

    let kapazitaet = (stream_config.sample_rate.0 * stream_config.channels as u32
        * config.buffer_secs.max(1)) as usize;
    let rb = HeapRb::<f32>::new(kapazitaet);
    let (mut producer, consumer) = rb.split();

    let err_fn = |err| error!("Capture-Fehler: {}", err);

    let stream = match sample_format {
        SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _| {
                let written = producer.push_slice(data);
                if written < data.len() {
                    warn!(
                        "Capture Ring-Buffer voll, {} Samples verworfen",
                        data.len() - written
                    );
                }
            },
            err_fn,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _| {
                let floats: Vec<f32> = data.iter().map(|&s| dequantize(s)).collect();
                if producer.push_slice(&floats) < floats.len() {
                    warn!("Capture Ring-Buffer voll");
                }
            },
            err_fn,
            None,
        ),
        SampleFormat::U16 => device.build_input_stream(
            &stream_config,
            move |data: &[u16], _| {
                let floats: Vec<f32> = data
                    .iter()
                    .map(|&s| (s as f32 - 32768.0) / 32768.0)
                    .collect();
                if producer.push_slice(&floats) < floats.len() {
                    warn!("Capture Ring-Buffer voll");
                }
            },
            err_fn,
            None,
        ),
        andere => {
            return Err(CaptureError::UnsupportedFormat(format!(
                "Nicht unterstuetztes Sample-Format: {:?}",
                andere
            )))
        }
    }
    .map_err(build_fehler)?;

    stream.play().map_err(play_fehler)?;

    debug!(
        "Capture-Stream geoeffnet: {}Hz {}ch {:?}",
        stream_config.sample_rate.0, stream_config.channels, sample_format
    );

    let format = InputFormat {
        sample_rate: stream_config.sample_rate.0,
        channels: stream_config.channels,
    };
    Ok((stream, format, consumer))
}

fn ist_zugriffsfehler(beschreibung: &str) -> bool {
    let klein = beschreibung.to_lowercase();
    klein.contains("permission") || klein.contains("denied") || klein.contains("not allowed")
}

fn build_fehler(e: BuildStreamError) -> CaptureError {
    match e {
        BuildStreamError::DeviceNotAvailable => CaptureError::NoDevice(e.to_string()),
        BuildStreamError::StreamConfigNotSupported | BuildStreamError::InvalidArgument => {
            CaptureError::UnsupportedFormat(e.to_string())
        }
        BuildStreamError::BackendSpecific { err } if ist_zugriffsfehler(&err.description) => {
            CaptureError::PermissionDenied(err.description)
        }
        andere => CaptureError::Stream(andere.to_string()),
    }
}

fn play_fehler(e: PlayStreamError) -> CaptureError {
    match e {
        PlayStreamError::DeviceNotAvailable => CaptureError::NoDevice(e.to_string()),
        PlayStreamError::BackendSpecific { err } if ist_zugriffsfehler(&err.description) => {
            CaptureError::PermissionDenied(err.description)
        }
        andere => CaptureError::Stream(andere.to_string()),
    }
}
