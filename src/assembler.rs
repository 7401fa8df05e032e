//! Turns decoded frames into caller-facing audio.
//!
//! Both delivery modes share one pending buffer:
//!
//! * **Batch** keeps every frame until [`Assembler::finish`], then hands the
//!   whole utterance back in one piece.
//! * **Stream** withholds audio until `pre_buffer_samples` have accumulated,
//!   releases that prefix as the first chunk, and from then on forwards every
//!   frame as its own chunk.  A generation that ends before the threshold is
//!   flushed by `finish`.
//!
//! The samples delivered are the same in both modes; only the cut points
//! differ.

use crate::SAMPLE_RATE;

/// PCM produced by one decoder call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioFrame {
    pub samples: Vec<i16>,
}

impl AudioFrame {
    pub fn new(samples: Vec<i16>) -> Self {
        Self { samples }
    }
}

/// Unit of audio handed to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    pub sample_rate: u32,
    pub samples: Vec<i16>,
}

impl AudioChunk {
    fn new(samples: Vec<i16>) -> Self {
        Self { sample_rate: SAMPLE_RATE, samples }
    }

    pub fn duration_secs(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Batch,
    Stream { pre_buffer_samples: usize },
}

impl Delivery {
    /// Streaming delivery with a pre-buffer of `seconds` at [`SAMPLE_RATE`].
    pub fn stream(seconds: f32) -> Self {
        let pre_buffer_samples = (seconds.max(0.0) * SAMPLE_RATE as f32).ceil() as usize;
        Delivery::Stream { pre_buffer_samples }
    }
}

#[derive(Debug)]
pub struct Assembler {
    delivery: Delivery,
    pending: Vec<i16>,
    primed: bool,
    emitted_samples: usize,
}

impl Assembler {
    pub fn new(delivery: Delivery) -> Self {
        Self { delivery, pending: Vec::new(), primed: false, emitted_samples: 0 }
    }

    /// Accept one decoded frame; returns a chunk when one is due.
    pub fn push(&mut self, frame: AudioFrame) -> Option<AudioChunk> {
        let threshold = match self.delivery {
            Delivery::Batch => {
                self.pending.extend(frame.samples);
                return None;
            }
            Delivery::Stream { pre_buffer_samples } => pre_buffer_samples,
        };

        if frame.samples.is_empty() {
            return None;
        }
        if self.primed {
            return Some(self.emit(frame.samples));
        }

        self.pending.extend(frame.samples);
        if self.pending.len() < threshold {
            return None;
        }
        self.primed = true;
        let prefix = std::mem::take(&mut self.pending);
        Some(self.emit(prefix))
    }

    /// Release whatever is still pending at end of generation.
    pub fn finish(&mut self) -> Option<AudioChunk> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(self.emit(rest))
    }

    /// Samples held back from the caller.
    pub fn pending_samples(&self) -> usize {
        self.pending.len()
    }

    pub fn emitted_samples(&self) -> usize {
        self.emitted_samples
    }

    fn emit(&mut self, samples: Vec<i16>) -> AudioChunk {
        self.emitted_samples += samples.len();
        AudioChunk::new(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(n: usize, len: usize) -> Vec<AudioFrame> {
        (0..n)
            .map(|i| AudioFrame::new((0..len).map(|j| (i * len + j) as i16).collect()))
            .collect()
    }

    fn run(delivery: Delivery, input: Vec<AudioFrame>) -> Vec<AudioChunk> {
        let mut asm = Assembler::new(delivery);
        let mut out: Vec<AudioChunk> = input.into_iter().filter_map(|f| asm.push(f)).collect();
        out.extend(asm.finish());
        out
    }

    #[test]
    fn test_batch_emits_once_at_end() {
        let mut asm = Assembler::new(Delivery::Batch);
        for f in frames(5, 100) {
            assert!(asm.push(f).is_none());
        }
        assert_eq!(asm.pending_samples(), 500);
        let all = asm.finish().unwrap();
        assert_eq!(all.samples.len(), 500);
        assert_eq!(all.sample_rate, SAMPLE_RATE);
    }

    #[test]
    fn test_zero_pre_buffer_emits_every_frame() {
        let out = run(Delivery::Stream { pre_buffer_samples: 0 }, frames(4, 100));
        assert_eq!(out.len(), 4);
        assert!(out.iter().all(|c| c.samples.len() == 100));
    }

    #[test]
    fn test_pre_buffer_withholds_prefix() {
        let out = run(Delivery::Stream { pre_buffer_samples: 250 }, frames(6, 100));
        let sizes: Vec<usize> = out.iter().map(|c| c.samples.len()).collect();
        assert_eq!(sizes, vec![300, 100, 100, 100]);
    }

    #[test]
    fn test_short_generation_flushed_by_finish() {
        let out = run(Delivery::Stream { pre_buffer_samples: 10_000 }, frames(3, 100));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].samples.len(), 300);
    }

    #[test]
    fn test_stream_concat_matches_batch() {
        let batch = run(Delivery::Batch, frames(9, 77)).remove(0).samples;
        for pre in [0, 1, 77, 200, 1_000, 100_000] {
            let chunks = run(Delivery::Stream { pre_buffer_samples: pre }, frames(9, 77));
            let joined: Vec<i16> = chunks.into_iter().flat_map(|c| c.samples).collect();
            assert_eq!(joined, batch, "pre_buffer_samples = {pre}");
        }
    }

    #[test]
    fn test_first_chunk_grows_with_pre_buffer() {
        let mut last = 0;
        for pre in [0, 50, 150, 320, 900] {
            let out = run(Delivery::Stream { pre_buffer_samples: pre }, frames(8, 64));
            let total: usize = out.iter().map(|c| c.samples.len()).sum();
            assert_eq!(total, 8 * 64);
            assert!(out[0].samples.len() >= last);
            last = out[0].samples.len();
        }
    }

    #[test]
    fn test_empty_frames_are_ignored() {
        let mut asm = Assembler::new(Delivery::Stream { pre_buffer_samples: 0 });
        assert!(asm.push(AudioFrame::default()).is_none());
        assert!(asm.finish().is_none());
        assert_eq!(asm.emitted_samples(), 0);
    }

    #[test]
    fn test_delivery_from_seconds() {
        assert_eq!(Delivery::stream(0.0), Delivery::Stream { pre_buffer_samples: 0 });
        assert_eq!(Delivery::stream(1.5), Delivery::Stream { pre_buffer_samples: 36_000 });
    }
}
