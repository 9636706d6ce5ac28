/// Sound engine: procedural 8-bit style sound effects via rodio.
///
/// All sounds are generated as in-memory WAV buffers at init time.
/// Playback is fire-and-forget (non-blocking) via rodio's Sink.
///
/// Compile with `--no-default-features` or without "sound" feature
/// to disable audio entirely (the stub SoundEngine does nothing).

use divergence::sim::event::GameEvent;

/// One effect per kind of event worth hearing.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Sfx {
    Step,
    Push,
    Pickup,
    Drop,
    Branch,
    Merge,
    Fall,
    Victory,
    Reject,
}

impl Sfx {
    const COUNT: usize = 9;

    #[cfg_attr(not(feature = "sound"), allow(dead_code))]
    const ALL: [Sfx; Sfx::COUNT] = [
        Sfx::Step, Sfx::Push, Sfx::Pickup, Sfx::Drop, Sfx::Branch,
        Sfx::Merge, Sfx::Fall, Sfx::Victory, Sfx::Reject,
    ];

    fn for_event(event: &GameEvent) -> Option<Sfx> {
        match event {
            GameEvent::Moved { .. } | GameEvent::Turned { .. } | GameEvent::FocusSwitched => Some(Sfx::Step),
            GameEvent::Pushed { .. } | GameEvent::HoleFilled { .. } => Some(Sfx::Push),
            GameEvent::PickedUp { .. } | GameEvent::Converged { .. } => Some(Sfx::Pickup),
            GameEvent::Dropped { .. } => Some(Sfx::Drop),
            GameEvent::Branched => Some(Sfx::Branch),
            GameEvent::Merged | GameEvent::Inherited => Some(Sfx::Merge),
            GameEvent::Fell => Some(Sfx::Fall),
            GameEvent::Victory => Some(Sfx::Victory),
            GameEvent::Rejected { .. } => Some(Sfx::Reject),
            GameEvent::Undone | GameEvent::Reset => None,
        }
    }
}

/// The one effect to play for an intent's events: the last event that has
/// a sound wins, so a push plays over its step and victory over both.
pub fn pick(events: &[GameEvent]) -> Option<Sfx> {
    events.iter().rev().find_map(Sfx::for_event)
}

#[cfg(feature = "sound")]
mod inner {
    use std::f32::consts::PI;
    use std::io::Cursor;
    use std::sync::Arc;

    use rodio::{OutputStream, OutputStreamHandle, Sink};

    use super::Sfx;

    const SAMPLE_RATE: u32 = 22050;

    /// Pre-generated WAV buffers, indexed by `Sfx as usize`.
    pub struct SoundEngine {
        _stream: OutputStream,
        handle: OutputStreamHandle,
        buffers: Vec<Arc<Vec<u8>>>,
    }

    impl SoundEngine {
        pub fn new() -> Option<Self> {
            let (stream, handle) = OutputStream::try_default().ok()?;
            let buffers = Sfx::ALL.iter().map(|&s| Arc::new(make_wav(&generate(s)))).collect();
            Some(SoundEngine { _stream: stream, handle, buffers })
        }

        pub fn play(&self, sfx: Sfx) {
            let Some(buf) = self.buffers.get(sfx as usize) else {
                return;
            };
            if let Ok(sink) = Sink::try_new(&self.handle) {
                let cursor = Cursor::new(buf.as_ref().clone());
                if let Ok(src) = rodio::Decoder::new(cursor) {
                    sink.append(src);
                    sink.detach(); // fire-and-forget
                }
            }
        }
    }

    fn generate(sfx: Sfx) -> Vec<f32> {
        match sfx {
            Sfx::Step => gen_blip(660.0, 0.025, 0.12),
            Sfx::Push => gen_thud(),
            Sfx::Pickup => gen_notes(&[784.0, 1047.0], 0.04, 0.22),
            Sfx::Drop => gen_notes(&[1047.0, 784.0], 0.04, 0.22),
            Sfx::Branch => gen_sweep(300.0, 1200.0, 0.18),
            Sfx::Merge => gen_sweep(1200.0, 300.0, 0.18),
            Sfx::Fall => gen_notes(&[440.0, 370.0, 311.0, 261.0], 0.12, 0.3),
            Sfx::Victory => gen_notes(&[523.0, 659.0, 784.0, 1047.0], 0.1, 0.3),
            Sfx::Reject => gen_blip(150.0, 0.06, 0.2),
        }
    }

    // ════════════════════════════════════════════════════════════
    //  Waveform generators: all produce Vec<f32> mono samples
    // ════════════════════════════════════════════════════════════

    /// Simple sine blip at given frequency and duration
    fn gen_blip(freq: f32, duration: f32, volume: f32) -> Vec<f32> {
        let n = (SAMPLE_RATE as f32 * duration) as usize;
        (0..n)
            .map(|i| {
                let t = i as f32 / SAMPLE_RATE as f32;
                let env = 1.0 - (i as f32 / n as f32); // linear fade out
                (t * freq * 2.0 * PI).sin() * env * volume
            })
            .collect()
    }

    /// Note sequence with a square-ish timbre (sine + 3rd harmonic)
    fn gen_notes(notes: &[f32], note_dur: f32, volume: f32) -> Vec<f32> {
        let mut samples = Vec::new();
        for &freq in notes {
            let n = (SAMPLE_RATE as f32 * note_dur) as usize;
            for i in 0..n {
                let t = i as f32 / SAMPLE_RATE as f32;
                let env = 1.0 - (i as f32 / n as f32).powf(0.5);
                let wave = (t * freq * 2.0 * PI).sin() * 0.7
                    + (t * freq * 3.0 * 2.0 * PI).sin() * 0.3;
                samples.push(wave * env * volume);
            }
        }
        samples
    }

    /// Linear pitch sweep between two frequencies
    fn gen_sweep(from: f32, to: f32, duration: f32) -> Vec<f32> {
        let n = (SAMPLE_RATE as f32 * duration) as usize;
        let mut phase = 0.0_f32;
        (0..n)
            .map(|i| {
                let t = i as f32 / n as f32;
                let freq = from + (to - from) * t;
                phase += freq / SAMPLE_RATE as f32;
                let env = (1.0 - t).powf(0.6);
                (phase * 2.0 * PI).sin() * env * 0.25
            })
            .collect()
    }

    /// Box scrape: short noise burst over a low tone
    fn gen_thud() -> Vec<f32> {
        let n = (SAMPLE_RATE as f32 * 0.08) as usize;
        let mut rng: u32 = 12345;
        (0..n)
            .map(|i| {
                let t = i as f32 / n as f32;
                let ti = i as f32 / SAMPLE_RATE as f32;
                let tone = (ti * 120.0 * 2.0 * PI).sin();
                // Simple LCG noise
                rng = rng.wrapping_mul(1103515245).wrapping_add(12345);
                let noise = (rng as f32 / u32::MAX as f32) * 2.0 - 1.0;
                (tone * 0.6 + noise * 0.4) * (1.0 - t).powf(0.8) * 0.3
            })
            .collect()
    }

    // ════════════════════════════════════════════════════════════
    //  WAV encoder: wraps f32 samples into a valid WAV buffer
    // ════════════════════════════════════════════════════════════

    fn make_wav(samples: &[f32]) -> Vec<u8> {
        let num_channels: u16 = 1;
        let bits_per_sample: u16 = 16;
        let byte_rate = SAMPLE_RATE * (num_channels as u32) * (bits_per_sample as u32) / 8;
        let block_align = num_channels * bits_per_sample / 8;
        let data_size = samples.len() as u32 * 2;
        let file_size = 36 + data_size;

        let mut buf = Vec::with_capacity(44 + data_size as usize);

        // RIFF header
        buf.extend_from_slice(b"RIFF");
        buf.extend_from_slice(&file_size.to_le_bytes());
        buf.extend_from_slice(b"WAVE");

        // fmt chunk
        buf.extend_from_slice(b"fmt ");
        buf.extend_from_slice(&16u32.to_le_bytes());
        buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
        buf.extend_from_slice(&num_channels.to_le_bytes());
        buf.extend_from_slice(&SAMPLE_RATE.to_le_bytes());
        buf.extend_from_slice(&byte_rate.to_le_bytes());
        buf.extend_from_slice(&block_align.to_le_bytes());
        buf.extend_from_slice(&bits_per_sample.to_le_bytes());

        // data chunk
        buf.extend_from_slice(b"data");
        buf.extend_from_slice(&data_size.to_le_bytes());

        for &s in samples {
            let val = (s.clamp(-1.0, 1.0) * 32767.0) as i16;
            buf.extend_from_slice(&val.to_le_bytes());
        }

        buf
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn wav_header_matches_payload() {
            let samples = generate(Sfx::Step);
            let wav = make_wav(&samples);
            assert_eq!(&wav[0..4], b"RIFF");
            assert_eq!(&wav[8..12], b"WAVE");
            assert_eq!(wav.len(), 44 + samples.len() * 2);
        }
    }
}

// ════════════════════════════════════════════════════════════
//  Public API: compiles to no-ops when sound feature is off
// ════════════════════════════════════════════════════════════

#[cfg(feature = "sound")]
pub use inner::SoundEngine;

#[cfg(not(feature = "sound"))]
pub struct SoundEngine;

#[cfg(not(feature = "sound"))]
impl SoundEngine {
    pub fn new() -> Option<Self> { Some(SoundEngine) }
    pub fn play(&self, _sfx: Sfx) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use divergence::domain::entity::Intent;
    use divergence::domain::terrain::Pos;

    #[test]
    fn last_audible_event_wins() {
        let events = [
            GameEvent::Moved { to: Pos::new(1, 0) },
            GameEvent::Pushed { id: 1, to: Pos::new(2, 0) },
        ];
        assert_eq!(pick(&events), Some(Sfx::Push));

        let events = [GameEvent::Moved { to: Pos::new(1, 0) }, GameEvent::Victory];
        assert_eq!(pick(&events), Some(Sfx::Victory));
    }

    #[test]
    fn silent_events() {
        assert_eq!(pick(&[GameEvent::Undone]), None);
        assert_eq!(pick(&[]), None);
        assert_eq!(pick(&[GameEvent::Rejected { intent: Intent::Branch }]), Some(Sfx::Reject));
    }
}
