//! Offline-Resampling via rubato
//!
//! Die ganze Aeusserung liegt bereits im Speicher, deshalb laeuft das
//! Resampling in einem Durchgang. Die Ausgangsverzoegerung des FFT-
//! Resamplers wird abgeschnitten und das Ergebnis auf genau
//! `ceil(frames * ziel / quelle)` Frames gebracht.

use rubato::{FftFixedIn, Resampler};
use tracing::trace;

use crate::error::TranscodeError;

const CHUNK_SIZE: usize = 1024;
const SUB_CHUNKS: usize = 2;

/// Anzahl der Ziel-Frames fuer eine gegebene Quelllaenge
///
/// Entspricht `ceil(dauer * ziel_rate)`.
pub fn ziel_frames(quell_frames: usize, quell_rate: u32, ziel_rate: u32) -> usize {
    if quell_rate == 0 {
        return 0;
    }
    let zaehler = quell_frames as u64 * ziel_rate as u64;
    zaehler.div_ceil(quell_rate as u64) as usize
}

/// Resampelt ein Mono-Signal von `quell_rate` nach `ziel_rate`
pub fn resample_mono(
    input: &[f32],
    quell_rate: u32,
    ziel_rate: u32,
) -> Result<Vec<f32>, TranscodeError> {
    if quell_rate == 0 || ziel_rate == 0 {
        return Err(TranscodeError::Resample(format!(
            "Ungueltige Rate: {quell_rate} Hz -> {ziel_rate} Hz"
        )));
    }
    if quell_rate == ziel_rate || input.is_empty() {
        return Ok(input.to_vec());
    }

    let ziel = ziel_frames(input.len(), quell_rate, ziel_rate);

    let mut resampler = FftFixedIn::<f64>::new(
        quell_rate as usize,
        ziel_rate as usize,
        CHUNK_SIZE,
        SUB_CHUNKS,
        1,
    )
    .map_err(|e| TranscodeError::Resample(format!("Resampler-Initialisierung: {e}")))?;

    let verzoegerung = resampler.output_delay();
    let benoetigt = ziel + verzoegerung;

    let eingabe: Vec<f64> = input.iter().map(|&s| f64::from(s)).collect();
    let mut ausgabe: Vec<f64> = Vec::with_capacity(benoetigt + resampler.output_frames_max());

    let mut pos = 0;
    while pos < eingabe.len() {
        let n = resampler.input_frames_next();
        let ende = (pos + n).min(eingabe.len());
        let chunk = &eingabe[pos..ende];
        let ergebnis = if chunk.len() == n {
            resampler.process(&[chunk], None)
        } else {
            resampler.process_partial(Some(&[chunk]), None)
        }
        .map_err(|e| TranscodeError::Resample(e.to_string()))?;
        ausgabe.extend_from_slice(&ergebnis[0]);
        pos = ende;
    }

    // Restliche Verzoegerung mit Stille herausschieben
    while ausgabe.len() < benoetigt {
        let ergebnis = resampler
            .process_partial(None::<&[Vec<f64>]>, None)
            .map_err(|e| TranscodeError::Resample(e.to_string()))?;
        if ergebnis[0].is_empty() {
            break;
        }
        ausgabe.extend_from_slice(&ergebnis[0]);
    }

    let mut resampelt: Vec<f32> = ausgabe
        .into_iter()
        .skip(verzoegerung)
        .take(ziel)
        .map(|s| s as f32)
        .collect();
    resampelt.resize(ziel, 0.0);

    trace!(
        quell_rate,
        ziel_rate,
        eingabe = input.len(),
        ausgabe = resampelt.len(),
        verzoegerung,
        "Resampling abgeschlossen"
    );
    Ok(resampelt)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sinus(freq: f32, rate: u32, frames: usize, amplitude: f32) -> Vec<f32> {
        (0..frames)
            .map(|i| (i as f32 * freq * 2.0 * std::f32::consts::PI / rate as f32).sin() * amplitude)
            .collect()
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn ziel_frames_rundet_auf() {
        assert_eq!(ziel_frames(48000, 48000, 16000), 16000);
        assert_eq!(ziel_frames(1, 48000, 16000), 1);
        assert_eq!(ziel_frames(44100, 44100, 16000), 16000);
        assert_eq!(ziel_frames(100, 44100, 16000), 37); // 36.28 -> 37
        assert_eq!(ziel_frames(0, 48000, 16000), 0);
    }

    #[test]
    fn dauer_bleibt_erhalten() {
        for (quelle, ziel, frames) in [
            (48000u32, 16000u32, 48000usize),
            (44100, 16000, 30000),
            (8000, 16000, 12345),
            (22050, 24000, 999),
        ] {
            let out = resample_mono(&vec![0.0; frames], quelle, ziel).unwrap();
            let dauer_ein = frames as f64 / quelle as f64;
            let dauer_aus = out.len() as f64 / ziel as f64;
            assert!(
                (dauer_ein - dauer_aus).abs() <= 1.0 / ziel as f64,
                "{quelle}->{ziel}: {dauer_ein}s vs {dauer_aus}s"
            );
        }
    }

    #[test]
    fn pegel_bleibt_erhalten() {
        let ein = sinus(440.0, 48000, 48000, 0.5);
        let aus = resample_mono(&ein, 48000, 16000).unwrap();
        assert_eq!(aus.len(), 16000);
        // Randbereiche wegen Einschwingen auslassen
        let mitte = &aus[2000..14000];
        let erwartet = 0.5 / std::f32::consts::SQRT_2;
        assert!(
            (rms(mitte) - erwartet).abs() < erwartet * 0.1,
            "RMS {} statt {}",
            rms(mitte),
            erwartet
        );
    }

    #[test]
    fn gleiche_rate_ist_kopie() {
        let ein = vec![0.1, -0.2, 0.3];
        assert_eq!(resample_mono(&ein, 16000, 16000).unwrap(), ein);
    }

    #[test]
    fn rate_null_ist_fehler() {
        assert!(matches!(
            resample_mono(&[0.0; 10], 48000, 0),
            Err(TranscodeError::Resample(_))
        ));
    }
}
