//! PcmTranscoder – Aufnahme zu linearem PCM
//!
//! Reihenfolge:
//! 1. Container dekodieren (native Rate, native Kanaele, f32)
//! 2. Auf Mono mitteln
//! 3. Auf die Zielrate resampeln, exakt `ceil(dauer * ziel)` Frames
//! 4. Asymmetrisch auf 16 Bit quantisieren
//!
//! Mitteln und Resampling sind beide linear; erst zu mitteln und dann
//! einen Kanal zu resampeln ergibt dasselbe Signal wie umgekehrt.

use tracing::debug;

use crate::container::{decode_container, CapturedUtterance};
use crate::error::TranscodeError;
use crate::pcm::{downmix_mono, PcmBuffer};
use crate::resample::resample_mono;

/// Zustandsloser Transkodierer
#[derive(Debug, Default, Clone, Copy)]
pub struct PcmTranscoder;

impl PcmTranscoder {
    pub fn new() -> Self {
        Self
    }

    /// Transkodiert eine Aufnahme zu Mono-PCM mit `target_rate`
    ///
    /// Die Aufnahme wird verbraucht, unabhaengig vom Ergebnis.
    pub fn transcode(
        &self,
        compressed: CapturedUtterance,
        target_rate: u32,
    ) -> Result<PcmBuffer, TranscodeError> {
        if target_rate == 0 {
            return Err(TranscodeError::Resample("Zielrate 0 Hz".into()));
        }

        let decoded = decode_container(&compressed)?;
        drop(compressed);

        if decoded.frames() == 0 {
            return Err(TranscodeError::Decode("Container enthaelt keine Samples".into()));
        }

        let mono = downmix_mono(&decoded.samples, decoded.channels as usize);
        let resampelt = resample_mono(&mono, decoded.sample_rate, target_rate)?;
        let buffer = PcmBuffer::from_f32(&resampelt, target_rate);

        debug!(
            quell_rate = decoded.sample_rate,
            quell_kanaele = decoded.channels,
            ziel_rate = target_rate,
            samples = buffer.len(),
            dauer = buffer.duration(),
            "Aeusserung transkodiert"
        );
        Ok(buffer)
    }
}
