//! PCM-Binaer-Frames
//!
//! Ein Binaer-Frame ist rohes lineares PCM: 16 Bit vorzeichenbehaftet,
//! Little Endian, Mono, ohne Header.
//!
//! - Client -> Server: 16000 Hz, genau eine Aeusserung pro Frame
//! - Server -> Client: 24000 Hz, beliebig viele Frames pro Antwort

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Abtastrate der hochgeladenen Aeusserungen
pub const UPLOAD_SAMPLE_RATE: u32 = 16000;

/// Abtastrate der Antwort-Frames
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Bytes pro Sample
pub const BYTES_PER_SAMPLE: usize = 2;

/// Fehler beim Lesen eines PCM-Frames
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PcmFrameError {
    #[error("PCM-Frame ist leer")]
    Leer,
}

/// Ergebnis des Dekodierens eines eingehenden Frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPcmFrame {
    pub samples: Vec<i16>,
    /// Ungerade Byte-Anzahl: das letzte Byte wurde verworfen
    pub abgeschnitten: bool,
}

/// Kodiert Samples als Little-Endian-Frame
pub fn encode_pcm_frame(samples: &[i16]) -> Bytes {
    let mut buf = BytesMut::with_capacity(samples.len() * BYTES_PER_SAMPLE);
    for &s in samples {
        buf.put_i16_le(s);
    }
    buf.freeze()
}

/// Dekodiert einen eingehenden Frame
///
/// Ein einzelnes ueberzaehliges Byte wird verworfen und im Ergebnis
/// markiert; der Frame bleibt abspielbar.
pub fn decode_pcm_frame(data: &[u8]) -> Result<DecodedPcmFrame, PcmFrameError> {
    if data.is_empty() {
        return Err(PcmFrameError::Leer);
    }
    let samples = data
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();
    Ok(DecodedPcmFrame {
        samples,
        abgeschnitten: data.len() % BYTES_PER_SAMPLE != 0,
    })
}
