//! StreamingPlaybackScheduler – lueckenlose Wiedergabe
//!
//! Spielt eine vorher unbekannte Folge von PCM-Puffern, die einzeln aus
//! dem Netz eintreffen, als ein durchgehendes Signal ab und meldet genau
//! einmal pro `start()`, wenn die Folge vollstaendig abgespielt ist.
//!
//! Jeder Puffer beginnt bei `max(jetzt, naechster_start)`; danach wird
//! `naechster_start` um seine Dauer weitergeschoben. Solange die Uhr
//! nicht ueberholt, beginnt jeder Puffer exakt am Ende des vorigen.
//!
//! Fertigmeldungen kommen als Nachricht (`on_finished`) vom Besitzer,
//! nie als Rueckruf aus dem Audio-Thread.

use std::collections::VecDeque;

use tracing::{debug, trace, warn};

use crate::pcm::PcmBuffer;
use crate::sink::{BufferId, PlaybackSink};

/// Rueckruf beim Leerlaufen, wird hoechstens einmal aufgerufen
pub type DrainedCallback = Box<dyn FnOnce() + Send + 'static>;

/// Unterhalb dieser Restdauer gilt die Wiedergabe als leer
const EPSILON_SECS: f64 = 1e-6;

/// Einstellungen des Schedulers
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Wie viele Puffer gleichzeitig beim Sink liegen duerfen (mindestens 1)
    pub lookahead: usize,
    /// Kuerzere Puffer sind Spreu und werden nicht abgespielt
    pub min_dauer_secs: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            lookahead: 2,
            min_dauer_secs: 0.002,
        }
    }
}

/// Momentaufnahme der Zaehler
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackStats {
    pub geplant: u64,
    pub beendet: u64,
    pub spreu: u64,
    pub fehlgeschlagen: u64,
    pub warteschlange: usize,
    pub beim_sink: usize,
    pub noch_geplant_secs: f64,
    pub naechster_start: f64,
}

struct BeimSink {
    id: BufferId,
    dauer: f64,
}

/// Plant eingehende Puffer lueckenlos auf einer Zeitachse
pub struct StreamingPlaybackScheduler {
    sink: Box<dyn PlaybackSink>,
    config: SchedulerConfig,
    warteschlange: VecDeque<PcmBuffer>,
    beim_sink: VecDeque<BeimSink>,
    naechster_start: f64,
    noch_geplant: f64,
    on_drained: Option<DrainedCallback>,
    /// Wurde seit dem letzten Abbau schon ein Puffer geplant?
    hat_geplant: bool,
    naechste_id: BufferId,
    stats: PlaybackStats,
}

impl StreamingPlaybackScheduler {
    pub fn new(sink: Box<dyn PlaybackSink>, mut config: SchedulerConfig) -> Self {
        config.lookahead = config.lookahead.max(1);
        Self {
            sink,
            config,
            warteschlange: VecDeque::new(),
            beim_sink: VecDeque::new(),
            naechster_start: 0.0,
            noch_geplant: 0.0,
            on_drained: None,
            hat_geplant: false,
            naechste_id: 1,
            stats: PlaybackStats::default(),
        }
    }

    /// Setzt alles zurueck und installiert den Leerlauf-Rueckruf
    ///
    /// Ein laufender Strom wird vorher vollstaendig abgebaut; sein
    /// Rueckruf feuert dabei noch.
    pub fn start(&mut self, on_drained: impl FnOnce() + Send + 'static) {
        self.stop_and_clear();
        self.on_drained = Some(Box::new(on_drained));
        debug!("Wiedergabe gestartet");
    }

    /// Haengt einen Puffer an und plant sofort, falls der Sink Platz hat
    pub fn enqueue(&mut self, chunk: PcmBuffer) {
        if chunk.duration() < self.config.min_dauer_secs {
            self.stats.spreu += 1;
            trace!(samples = chunk.len(), "Spreu verworfen");
            // Spreu vor dem ersten Puffer beendet den Strom nicht
            if self.hat_geplant {
                self.leerlauf_pruefen();
            }
            return;
        }
        self.warteschlange.push_back(chunk);
        self.auffuellen();
    }

    /// Fertigmeldung des Sinks verarbeiten
    ///
    /// Unbekannte IDs (abgebrochene oder fremde Puffer) werden ignoriert.
    pub fn on_finished(&mut self, id: BufferId) {
        let Some(pos) = self.beim_sink.iter().position(|b| b.id == id) else {
            trace!(id, "Fertigmeldung fuer unbekannten Puffer ignoriert");
            return;
        };
        if let Some(fertig) = self.beim_sink.remove(pos) {
            self.noch_geplant = (self.noch_geplant - fertig.dauer).max(0.0);
            self.stats.beendet += 1;
        }

        if !self.warteschlange.is_empty() {
            self.auffuellen();
        } else {
            self.leerlauf_pruefen();
        }
    }

    /// Bricht alles ab und feuert einen noch ausstehenden Rueckruf
    pub fn stop_and_clear(&mut self) {
        self.sink.cancel_all();
        let verworfen = self.warteschlange.len() + self.beim_sink.len();
        self.warteschlange.clear();
        self.beim_sink.clear();
        self.noch_geplant = 0.0;
        self.naechster_start = 0.0;
        self.hat_geplant = false;
        if verworfen > 0 {
            debug!(verworfen, "Wiedergabe abgebrochen");
        }
        if let Some(cb) = self.on_drained.take() {
            cb();
        }
    }

    /// Laeuft noch Wiedergabe oder wartet etwas?
    pub fn ist_aktiv(&self) -> bool {
        !self.warteschlange.is_empty() || !self.beim_sink.is_empty()
    }

    /// Ist ein Leerlauf-Rueckruf installiert?
    pub fn wartet_auf_leerlauf(&self) -> bool {
        self.on_drained.is_some()
    }

    pub fn next_start(&self) -> f64 {
        self.naechster_start
    }

    pub fn stats(&self) -> PlaybackStats {
        PlaybackStats {
            warteschlange: self.warteschlange.len(),
            beim_sink: self.beim_sink.len(),
            noch_geplant_secs: self.noch_geplant,
            naechster_start: self.naechster_start,
            ..self.stats.clone()
        }
    }

    fn auffuellen(&mut self) {
        while self.beim_sink.len() < self.config.lookahead && !self.warteschlange.is_empty() {
            self.schedule_next();
        }
        self.leerlauf_pruefen();
    }

    fn schedule_next(&mut self) {
        let Some(buffer) = self.warteschlange.pop_front() else {
            return;
        };
        let dauer = buffer.duration();
        let start = self.sink.now().max(self.naechster_start);
        let id = self.naechste_id;
        self.naechste_id += 1;

        match self.sink.schedule(id, buffer, start) {
            Ok(()) => {
                self.naechster_start = start + dauer;
                self.noch_geplant += dauer;
                self.beim_sink.push_back(BeimSink { id, dauer });
                self.hat_geplant = true;
                self.stats.geplant += 1;
                trace!(id, start, dauer, "Puffer geplant");
            }
            Err(e) => {
                self.stats.fehlgeschlagen += 1;
                warn!(id, fehler = %e, "Puffer konnte nicht geplant werden");
            }
        }
    }

    fn leerlauf_pruefen(&mut self) {
        if self.warteschlange.is_empty()
            && self.beim_sink.is_empty()
            && self.noch_geplant < EPSILON_SECS
        {
            self.noch_geplant = 0.0;
            if let Some(cb) = self.on_drained.take() {
                debug!("Wiedergabe leergelaufen");
                cb();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::ManualSink;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const RATE: u32 = 24000;
    const SAMPLE: f64 = 1.0 / RATE as f64;

    fn scheduler(lookahead: usize) -> (StreamingPlaybackScheduler, ManualSink) {
        let (sink, _rx) = ManualSink::new();
        let config = SchedulerConfig {
            lookahead,
            ..SchedulerConfig::default()
        };
        (
            StreamingPlaybackScheduler::new(Box::new(sink.clone()), config),
            sink,
        )
    }

    fn zaehler() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
        let n = Arc::new(AtomicUsize::new(0));
        let n2 = Arc::clone(&n);
        (n, move || {
            n2.fetch_add(1, Ordering::SeqCst);
        })
    }

    /// Laesst die Uhr bis `t` laufen
    ///
    /// Haelt an jedem Pufferende an und reicht die Fertigmeldung sofort
    /// weiter, wie ein Sink ohne Meldelatenz.
    fn laufen(s: &mut StreamingPlaybackScheduler, sink: &ManualSink, t: f64) {
        loop {
            let naechstes_ende = sink
                .ausstehend()
                .iter()
                .map(|p| p.ende())
                .filter(|e| *e <= t + 1e-9)
                .min_by(|a, b| a.total_cmp(b));
            let Some(ende) = naechstes_ende else {
                break;
            };
            for id in sink.vorlaufen_bis(ende) {
                s.on_finished(id);
            }
        }
        sink.vorlaufen_bis(t);
    }

    #[test]
    fn drei_sekundenpuffer_lueckenlos() {
        for lookahead in [1, 2, 3] {
            let (mut s, sink) = scheduler(lookahead);
            let t0 = 5.0;
            sink.zeit_setzen(t0);
            let (leer, cb) = zaehler();
            s.start(cb);
            for _ in 0..3 {
                s.enqueue(PcmBuffer::stille(1.0, RATE));
            }

            laufen(&mut s, &sink, t0 + 2.999);
            assert_eq!(leer.load(Ordering::SeqCst), 0, "lookahead {lookahead}");
            laufen(&mut s, &sink, t0 + 3.0);
            assert_eq!(leer.load(Ordering::SeqCst), 1, "lookahead {lookahead}");

            let starts: Vec<f64> = sink.geplant().iter().map(|p| p.start).collect();
            assert_eq!(starts.len(), 3);
            for (i, start) in starts.iter().enumerate() {
                assert!(
                    (start - (t0 + i as f64)).abs() <= SAMPLE,
                    "Puffer {i} startet bei {start}"
                );
            }
        }
    }

    #[test]
    fn start_zeiten_steigen_und_schliessen_an() {
        let (mut s, sink) = scheduler(1);
        sink.zeit_setzen(1.0);
        s.start(|| {});
        let laengen = [0.25, 0.5, 0.01, 1.0, 0.125];
        for l in laengen {
            s.enqueue(PcmBuffer::stille(l, RATE));
        }
        // Uhr in kleinen Schritten mit Jitter vorstellen
        let mut t = 1.0;
        while s.ist_aktiv() {
            t += 0.0173;
            laufen(&mut s, &sink, t);
        }
        let geplant = sink.geplant();
        assert_eq!(geplant.len(), laengen.len());
        for paar in geplant.windows(2) {
            assert!(paar[1].start >= paar[0].start);
            assert!((paar[1].start - paar[0].ende()).abs() <= SAMPLE);
        }
    }

    #[test]
    fn uhr_ueberholt_naechsten_start() {
        let (mut s, sink) = scheduler(1);
        s.start(|| {});
        s.enqueue(PcmBuffer::stille(0.5, RATE));
        laufen(&mut s, &sink, 0.5);
        // Netzwerkpause: naechster Puffer kommt erst bei t=2
        sink.zeit_setzen(2.0);
        s.enqueue(PcmBuffer::stille(0.5, RATE));
        let geplant = sink.geplant();
        assert_eq!(geplant[1].start, 2.0);
        assert_eq!(s.next_start(), 2.5);
    }

    #[test]
    fn fifo_reihenfolge() {
        let (mut s, sink) = scheduler(2);
        s.start(|| {});
        let laengen = [480usize, 2400, 240, 4800, 960, 1200];
        for n in laengen {
            s.enqueue(PcmBuffer::new(vec![1i16; n], RATE));
        }
        let mut t = 0.0;
        while s.ist_aktiv() {
            t += 0.031;
            laufen(&mut s, &sink, t);
        }
        let reihenfolge: Vec<usize> = sink.geplant().iter().map(|p| p.samples).collect();
        assert_eq!(reihenfolge, laengen.to_vec());
        let ids: Vec<BufferId> = sink.geplant().iter().map(|p| p.id).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn stop_feuert_genau_einmal() {
        let (mut s, sink) = scheduler(2);
        let (leer, cb) = zaehler();
        s.start(cb);
        s.enqueue(PcmBuffer::stille(1.0, RATE));
        s.enqueue(PcmBuffer::stille(1.0, RATE));
        s.enqueue(PcmBuffer::stille(1.0, RATE));
        s.stop_and_clear();
        assert_eq!(leer.load(Ordering::SeqCst), 1);
        assert!(!s.ist_aktiv());

        // Spaete Fertigmeldungen der abgebrochenen Puffer sind wirkungslos
        for p in sink.geplant() {
            s.on_finished(p.id);
        }
        s.stop_and_clear();
        assert_eq!(leer.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn erneuter_start_baut_vorherigen_strom_ab() {
        let (mut s, sink) = scheduler(2);
        let (erster, cb1) = zaehler();
        let (zweiter, cb2) = zaehler();
        s.start(cb1);
        s.enqueue(PcmBuffer::stille(1.0, RATE));
        s.start(cb2);
        assert_eq!(erster.load(Ordering::SeqCst), 1);
        assert_eq!(sink.abbrueche(), 2);
        s.enqueue(PcmBuffer::stille(0.5, RATE));
        laufen(&mut s, &sink, 10.0);
        assert_eq!(zweiter.load(Ordering::SeqCst), 1);
        assert_eq!(erster.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn spreu_wird_nicht_geplant() {
        let (mut s, sink) = scheduler(2);
        let (leer, cb) = zaehler();
        s.start(cb);
        s.enqueue(PcmBuffer::stille(0.5, RATE));
        s.enqueue(PcmBuffer::new(vec![0i16; 10], RATE));
        s.enqueue(PcmBuffer::stille(0.5, RATE));
        let stats = s.stats();
        assert_eq!(stats.spreu, 1);
        assert_eq!(stats.geplant, 2);
        assert!((s.next_start() - 1.0).abs() <= SAMPLE);
        laufen(&mut s, &sink, 1.0);
        assert_eq!(leer.load(Ordering::SeqCst), 1);
        assert_eq!(sink.geplant().len(), 2);
    }

    #[test]
    fn spreu_als_erster_chunk_haelt_strom_offen() {
        let (mut s, sink) = scheduler(2);
        let (leer, cb) = zaehler();
        s.start(cb);
        s.enqueue(PcmBuffer::new(vec![0i16; 3], RATE));
        assert_eq!(leer.load(Ordering::SeqCst), 0);
        assert!(s.wartet_auf_leerlauf());
        assert_eq!(s.stats().spreu, 1);

        // Der eigentliche Ton kommt danach und beendet den Strom
        s.enqueue(PcmBuffer::stille(0.25, RATE));
        laufen(&mut s, &sink, 0.25);
        assert_eq!(leer.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn neuer_strom_setzt_spreu_regel_zurueck() {
        let (mut s, sink) = scheduler(2);
        let (leer, cb) = zaehler();
        s.start(cb);
        s.enqueue(PcmBuffer::stille(0.25, RATE));
        for id in sink.vorlaufen_bis(0.25) {
            s.on_finished(id);
        }
        assert_eq!(leer.load(Ordering::SeqCst), 1);

        // Neuer Strom: Spreu nach dem Abbau zaehlt wieder als erster Chunk
        let (zweiter, cb2) = zaehler();
        s.start(cb2);
        s.enqueue(PcmBuffer::new(vec![0i16; 3], RATE));
        assert_eq!(zweiter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn enqueue_ohne_start_erlaubt() {
        let (mut s, sink) = scheduler(1);
        s.enqueue(PcmBuffer::stille(0.25, RATE));
        assert!(s.ist_aktiv());
        assert!(!s.wartet_auf_leerlauf());
        laufen(&mut s, &sink, 1.0);
        assert!(!s.ist_aktiv());
        assert_eq!(s.stats().beendet, 1);
    }

    #[test]
    fn lookahead_begrenzt_puffer_beim_sink() {
        let (mut s, sink) = scheduler(2);
        s.start(|| {});
        for _ in 0..5 {
            s.enqueue(PcmBuffer::stille(0.2, RATE));
        }
        assert_eq!(sink.ausstehend().len(), 2);
        assert_eq!(s.stats().warteschlange, 3);
        laufen(&mut s, &sink, 0.2);
        assert_eq!(sink.ausstehend().len(), 2);
        assert_eq!(s.stats().warteschlange, 2);
    }
}
