//! Lineares PCM
//!
//! `PcmBuffer` ist das Austauschformat zwischen Transkodierung, Transport
//! und Wiedergabe: 16-Bit-Samples, Mono, feste Rate, unveraenderlich.
//!
//! Die Quantisierung ist absichtlich asymmetrisch: negative Werte werden
//! mit 32768 skaliert, nicht-negative mit 32767, sodass -1.0 genau auf
//! `i16::MIN` und 1.0 genau auf `i16::MAX` faellt.

use std::sync::Arc;

/// Unveraenderlicher Mono-PCM-Puffer
///
/// Die Samples liegen hinter einem `Arc`, Klone sind billig. Das ist
/// wichtig weil derselbe Puffer in Warteschlange und Ausgabegeraet lebt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmBuffer {
    samples: Arc<[i16]>,
    sample_rate: u32,
}

impl PcmBuffer {
    /// Erstellt einen Puffer aus Samples und Rate
    ///
    /// Eine Rate von 0 wird auf 1 angehoben, damit `duration()` endlich bleibt.
    pub fn new(samples: impl Into<Arc<[i16]>>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate: sample_rate.max(1),
        }
    }

    /// Quantisiert normalisierte Float-Samples zu einem Puffer
    pub fn from_f32(samples: &[f32], sample_rate: u32) -> Self {
        let quantisiert: Vec<i16> = samples.iter().map(|&s| quantize(s)).collect();
        Self::new(quantisiert, sample_rate)
    }

    /// Stille der gegebenen Laenge
    pub fn stille(sekunden: f64, sample_rate: u32) -> Self {
        let frames = (sekunden * sample_rate as f64).round().max(0.0) as usize;
        Self::new(vec![0i16; frames], sample_rate)
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Kanalanzahl, nach der Transkodierung immer 1
    pub fn number_of_channels(&self) -> u16 {
        1
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Dauer in Sekunden (`len / sample_rate`)
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Dequantisierte Samples fuer die Wiedergabe
    pub fn to_f32(&self) -> Vec<f32> {
        self.samples.iter().map(|&s| dequantize(s)).collect()
    }
}

/// Float-Sample zu 16 Bit
///
/// Klemmt auf `[-1, 1]`; NaN wird zu Stille.
pub fn quantize(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0).round() as i16
    } else {
        (s * 32767.0).round() as i16
    }
}

/// 16 Bit zu Float-Sample, Umkehrung von `quantize`
pub fn dequantize(sample: i16) -> f32 {
    if sample < 0 {
        sample as f32 / 32768.0
    } else {
        sample as f32 / 32767.0
    }
}

/// Mischt interleaved Samples per arithmetischem Mittel auf Mono
///
/// Ein unvollstaendiger letzter Frame wird verworfen.
pub fn downmix_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}
