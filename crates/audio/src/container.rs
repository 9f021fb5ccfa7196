//! Container fuer aufgenommene Aeusserungen
//!
//! Eine `CapturedUtterance` ist ein undurchsichtiger Byte-Puffer mit
//! Codec-Kennung. Sie entsteht beim Loslassen der Sprechtaste und wird
//! genau einmal transkodiert.
//!
//! ## OpusFramed
//! ```text
//! "TBOP" | version u8 | kanaele u8 | rate u32 LE | frame_ms_x10 u16 LE
//!        | vorlauf u16 LE | frames u64 LE
//! dann je Paket: laenge u16 LE | opus-bytes
//! ```
//! `vorlauf` ist der Encoder-Vorlauf in Frames pro Kanal; so viele Frames
//! werden beim Dekodieren vorne verworfen. `frames` ist die Anzahl
//! gueltiger PCM-Frames pro Kanal. Der Schluss ist mit Stille aufgefuellt;
//! danach wird auf `frames` gekuerzt, damit die Dauer exakt der Aufnahme
//! entspricht.
//!
//! ## Wav
//! RIFF/WAVE mit 8/16/24/32-Bit-Integer oder 32-Bit-Float, beliebige
//! Rate und Kanalzahl.

use std::io::Cursor;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::{debug, trace};

use crate::codec::OpusDecoder;
use crate::error::TranscodeError;
use talkback_protocol::codec::{ChannelCount, OpusConfig, SampleRate};

const MAGIC: &[u8; 4] = b"TBOP";
const VERSION: u8 = 2;
const HEADER_LEN: usize = 4 + 1 + 1 + 4 + 2 + 2 + 8;

/// Codec-Kennung einer Aufnahme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerCodec {
    /// Laengenpraefixierte Opus-Pakete mit Kopf
    OpusFramed,
    /// RIFF/WAVE
    Wav,
}

/// Komprimierte Aufnahme einer Aeusserung
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedUtterance {
    bytes: Bytes,
    codec: ContainerCodec,
}

impl CapturedUtterance {
    pub fn new(bytes: impl Into<Bytes>, codec: ContainerCodec) -> Self {
        Self {
            bytes: bytes.into(),
            codec,
        }
    }

    /// Verpackt interleaved 16-Bit-Samples als WAV
    pub fn wav_aus_samples(
        samples: &[i16],
        sample_rate: u32,
        channels: u16,
    ) -> Result<Self, TranscodeError> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)
                .map_err(|e| TranscodeError::Decode(e.to_string()))?;
            for &s in samples {
                writer
                    .write_sample(s)
                    .map_err(|e| TranscodeError::Decode(e.to_string()))?;
            }
            writer
                .finalize()
                .map_err(|e| TranscodeError::Decode(e.to_string()))?;
        }
        Ok(Self::new(cursor.into_inner(), ContainerCodec::Wav))
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn codec(&self) -> ContainerCodec {
        self.codec
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Dekodierter Inhalt eines Containers
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    /// Interleaved Samples in `[-1, 1]`
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedAudio {
    /// Frames pro Kanal
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    pub fn duration(&self) -> f64 {
        self.frames() as f64 / self.sample_rate.max(1) as f64
    }
}

// ---------------------------------------------------------------------------
// OpusFramed schreiben
// ---------------------------------------------------------------------------

/// Sammelt kodierte Opus-Pakete einer laufenden Aufnahme
#[derive(Debug)]
pub struct OpusFramedWriter {
    config: OpusConfig,
    vorlauf: u16,
    pakete: BytesMut,
    paket_anzahl: usize,
}

impl OpusFramedWriter {
    /// `vorlauf` ist der Encoder-Vorlauf in Frames pro Kanal
    pub fn new(config: OpusConfig, vorlauf: u16) -> Self {
        Self {
            config,
            vorlauf,
            pakete: BytesMut::new(),
            paket_anzahl: 0,
        }
    }

    /// Haengt ein kodiertes Paket an
    pub fn paket_anhaengen(&mut self, paket: &[u8]) {
        // Opus-Pakete sind durch MAX_PAKET_BYTES im Encoder begrenzt
        let laenge = paket.len().min(u16::MAX as usize);
        self.pakete.put_u16_le(laenge as u16);
        self.pakete.put_slice(&paket[..laenge]);
        self.paket_anzahl += 1;
    }

    pub fn paket_anzahl(&self) -> usize {
        self.paket_anzahl
    }

    /// Schliesst den Container ab
    ///
    /// `frames` ist die Zahl der tatsaechlich aufgenommenen Frames pro Kanal.
    pub fn abschliessen(self, frames: u64) -> CapturedUtterance {
        let mut out = BytesMut::with_capacity(HEADER_LEN + self.pakete.len());
        out.put_slice(MAGIC);
        out.put_u8(VERSION);
        out.put_u8(self.config.channels.count() as u8);
        out.put_u32_le(self.config.sample_rate.hz());
        out.put_u16_le(self.config.frame_size as u16);
        out.put_u16_le(self.vorlauf);
        out.put_u64_le(frames);
        out.put_slice(&self.pakete);
        trace!(
            pakete = self.paket_anzahl,
            bytes = out.len(),
            "OpusFramed-Container abgeschlossen"
        );
        CapturedUtterance::new(out.freeze(), ContainerCodec::OpusFramed)
    }
}

// ---------------------------------------------------------------------------
// Dekodieren
// ---------------------------------------------------------------------------

/// Dekodiert einen Container zu Float-Samples in nativer Rate und Kanalzahl
pub fn decode_container(utterance: &CapturedUtterance) -> Result<DecodedAudio, TranscodeError> {
    let decoded = match utterance.codec() {
        ContainerCodec::OpusFramed => decode_opus_framed(utterance.bytes().clone())?,
        ContainerCodec::Wav => decode_wav(utterance.bytes())?,
    };
    debug!(
        codec = ?utterance.codec(),
        rate = decoded.sample_rate,
        kanaele = decoded.channels,
        frames = decoded.frames(),
        "Container dekodiert"
    );
    Ok(decoded)
}

fn decode_opus_framed(mut buf: Bytes) -> Result<DecodedAudio, TranscodeError> {
    if buf.len() < HEADER_LEN {
        return Err(TranscodeError::Decode(format!(
            "OpusFramed-Kopf zu kurz: {} Bytes",
            buf.len()
        )));
    }
    if &buf[..4] != MAGIC {
        return Err(TranscodeError::Decode("Falsche Kennung im OpusFramed-Kopf".into()));
    }
    buf.advance(4);

    let version = buf.get_u8();
    if version != VERSION {
        return Err(TranscodeError::Decode(format!(
            "OpusFramed-Version {version} nicht unterstuetzt"
        )));
    }
    let kanaele = buf.get_u8();
    let rate = buf.get_u32_le();
    let _frame_ms_x10 = buf.get_u16_le();
    let vorlauf = buf.get_u16_le() as usize;
    let frames = buf.get_u64_le();

    let channels = ChannelCount::from_count(kanaele as u16)
        .ok_or_else(|| TranscodeError::Decode(format!("Ungueltige Kanalzahl {kanaele}")))?;
    let sample_rate = SampleRate::from_hz(rate)
        .ok_or_else(|| TranscodeError::Decode(format!("Keine Opus-Rate: {rate} Hz")))?;

    let mut decoder = OpusDecoder::new(sample_rate, channels)?;
    let mut samples = Vec::new();
    while buf.has_remaining() {
        if buf.remaining() < 2 {
            return Err(TranscodeError::Decode("Abgeschnittene Paketlaenge".into()));
        }
        let laenge = buf.get_u16_le() as usize;
        if buf.remaining() < laenge {
            return Err(TranscodeError::Decode(format!(
                "Paket mit {laenge} Bytes, nur {} vorhanden",
                buf.remaining()
            )));
        }
        let paket = buf.split_to(laenge);
        samples.extend(decoder.decode(&paket)?);
    }

    let kanaele = channels.count() as usize;
    let vorne = vorlauf.saturating_mul(kanaele).min(samples.len());
    samples.drain(..vorne);
    samples.truncate((frames as usize).saturating_mul(kanaele));

    Ok(DecodedAudio {
        samples,
        sample_rate: rate,
        channels: channels.count(),
    })
}

fn decode_wav(bytes: &Bytes) -> Result<DecodedAudio, TranscodeError> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes.as_ref()))
        .map_err(|e| TranscodeError::Decode(format!("WAV nicht lesbar: {e}")))?;
    let spec = reader.spec();
    if spec.channels == 0 {
        return Err(TranscodeError::Decode("WAV ohne Kanaele".into()));
    }

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| TranscodeError::Decode(format!("WAV-Samples nicht lesbar: {e}")))?,
        hound::SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                return Err(TranscodeError::Decode(format!(
                    "{} Bit pro Sample nicht unterstuetzt",
                    spec.bits_per_sample
                )));
            }
            let skala = (1u64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / skala))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| TranscodeError::Decode(format!("WAV-Samples nicht lesbar: {e}")))?
        }
    };

    Ok(DecodedAudio {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::OpusEncoder;
    use talkback_protocol::codec::AudioPreset;

    #[test]
    fn wav_stereo_wird_gelesen() {
        let utt = CapturedUtterance::wav_aus_samples(&[i16::MIN, 0, 16384, i16::MAX], 44100, 2)
            .unwrap();
        assert_eq!(utt.codec(), ContainerCodec::Wav);
        let dec = decode_container(&utt).unwrap();
        assert_eq!(dec.sample_rate, 44100);
        assert_eq!(dec.channels, 2);
        assert_eq!(dec.frames(), 2);
        assert_eq!(dec.samples[0], -1.0);
        assert_eq!(dec.samples[2], 0.5);
    }

    #[test]
    fn opus_framed_kuerzt_auf_gueltige_frames() {
        let config = AudioPreset::Speech.config();
        let mut enc = OpusEncoder::new(config.clone()).unwrap();
        let mut writer = OpusFramedWriter::new(config, 0);
        for _ in 0..3 {
            let paket = enc.encode(&vec![0.1f32; enc.frame_len()]).unwrap();
            writer.paket_anhaengen(&paket);
        }
        assert_eq!(writer.paket_anzahl(), 3);
        // 2.5 Frames a 320 Samples aufgenommen
        let utt = writer.abschliessen(800);
        let dec = decode_container(&utt).unwrap();
        assert_eq!(dec.sample_rate, 16000);
        assert_eq!(dec.channels, 1);
        assert_eq!(dec.frames(), 800);
    }

    #[test]
    fn kaputte_container_sind_dekodierfehler() {
        let kurz = CapturedUtterance::new(vec![1u8, 2, 3], ContainerCodec::OpusFramed);
        assert!(matches!(decode_container(&kurz), Err(TranscodeError::Decode(_))));

        let mut falsch = BytesMut::new();
        falsch.put_slice(b"XXXX");
        falsch.put_slice(&[0u8; HEADER_LEN - 4]);
        let falsch = CapturedUtterance::new(falsch.freeze(), ContainerCodec::OpusFramed);
        assert!(matches!(decode_container(&falsch), Err(TranscodeError::Decode(_))));

        let kein_wav = CapturedUtterance::new(vec![0u8; 64], ContainerCodec::Wav);
        assert!(matches!(decode_container(&kein_wav), Err(TranscodeError::Decode(_))));
    }

    #[test]
    fn abgeschnittenes_paket_ist_fehler() {
        let config = AudioPreset::Speech.config();
        let mut writer = OpusFramedWriter::new(config, 0);
        writer.paket_anhaengen(&[0x08, 0x01, 0x02]);
        let utt = writer.abschliessen(320);
        let mut bytes = utt.bytes().to_vec();
        bytes.truncate(bytes.len() - 1);
        let utt = CapturedUtterance::new(bytes, ContainerCodec::OpusFramed);
        assert!(decode_container(&utt).is_err());
    }

    /// Ein Ton ab Sample 320 beginnt nach dem Dekodieren wieder bei 320
    #[test]
    fn vorlauf_wird_beim_dekodieren_verworfen() {
        let config = AudioPreset::Speech.config();
        let mut enc = OpusEncoder::new(config.clone()).unwrap();
        let vorlauf = enc.vorlauf().unwrap() as usize;
        assert!(vorlauf > 0);
        let mut writer = OpusFramedWriter::new(config, vorlauf as u16);

        let frame_len = enc.frame_len();
        let mut signal = vec![0.0f32; 320];
        signal.extend((0..1280).map(|i| {
            0.5 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 16000.0).sin()
        }));
        let frames = signal.len();
        signal.resize(frames + vorlauf, 0.0);
        signal.resize(signal.len().div_ceil(frame_len) * frame_len, 0.0);
        for frame in signal.chunks(frame_len) {
            let paket = enc.encode(frame).unwrap();
            writer.paket_anhaengen(&paket);
        }

        let dec = decode_container(&writer.abschliessen(frames as u64)).unwrap();
        assert_eq!(dec.frames(), frames);
        let einsatz = dec
            .samples
            .iter()
            .position(|s| s.abs() > 0.05)
            .expect("Ton fehlt");
        assert!(
            (270..=340).contains(&einsatz),
            "Ton beginnt bei {einsatz}, Vorlauf {vorlauf}"
        );
        // Auch das Ende der Aufnahme ist noch enthalten
        let schluss = &dec.samples[frames - 160..];
        assert!(schluss.iter().any(|s| s.abs() > 0.1));
    }
}
