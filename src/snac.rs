//! SNAC audio decoder on ONNX Runtime.
//!
//! Uses [`ort`] to run the 24 kHz SNAC decoder exported to ONNX.  The
//! three model inputs are the code layers of a window of `F` frames:
//!
//! | Name      | Shape       | dtype |
//! |-----------|-------------|-------|
//! | `codes_0` | `[1, F]`    | int64 |
//! | `codes_1` | `[1, 2F]`   | int64 |
//! | `codes_2` | `[1, 4F]`   | int64 |
//!
//! Each 7-code frame `[c0 … c6]` contributes `c0` to layer 0, `c1 c4` to
//! layer 1 and `c2 c3 c5 c6` to layer 2.

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use ort::{session::Session, value::Tensor};

use crate::{
    backend::{AudioDecoder, ResourceLimits},
    codes::{CODEBOOK_SIZE, CODES_PER_FRAME},
};

/// Audio sample rate produced by the decoder.
pub const SAMPLE_RATE: u32 = 24_000;

/// Slice of the decoded window that belongs to the newest frame.
const OUTPUT_START: usize = 2048;
const OUTPUT_END: usize = 4096;

/// Split a window of whole frames into SNAC's three code layers.
pub fn split_layers(codes: &[u32]) -> Result<[Vec<i64>; 3]> {
    if codes.is_empty() || codes.len() % CODES_PER_FRAME != 0 {
        bail!(
            "decoder window must hold whole {}-code frames, got {} codes",
            CODES_PER_FRAME,
            codes.len()
        );
    }
    if let Some(bad) = codes.iter().find(|&&c| c >= CODEBOOK_SIZE) {
        bail!("audio code {} outside codebook of size {}", bad, CODEBOOK_SIZE);
    }

    let frames = codes.len() / CODES_PER_FRAME;
    let mut l0 = Vec::with_capacity(frames);
    let mut l1 = Vec::with_capacity(frames * 2);
    let mut l2 = Vec::with_capacity(frames * 4);
    for f in codes.chunks_exact(CODES_PER_FRAME) {
        let f: Vec<i64> = f.iter().map(|&c| c as i64).collect();
        l0.push(f[0]);
        l1.extend([f[1], f[4]]);
        l2.extend([f[2], f[3], f[5], f[6]]);
    }
    Ok([l0, l1, l2])
}

/// Convert decoder output in [-1.0, 1.0] to i16 PCM.
fn to_pcm(audio: &[f32]) -> Vec<i16> {
    audio
        .iter()
        .map(|&s| (s * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect()
}

/// ONNX SNAC decoder handle.
pub struct SnacDecoder {
    session: Session,
}

impl SnacDecoder {
    /// Load the decoder graph, honouring the thread limit when one is set.
    pub fn load(model_path: &Path, limits: &ResourceLimits) -> Result<Self> {
        let mut builder = Session::builder().context("Failed to create ORT session builder")?;
        if limits.n_threads > 0 {
            builder = builder
                .with_intra_threads(limits.n_threads)
                .map_err(|e| anyhow!("Cannot set ORT intra-op threads: {e}"))?;
        }
        let session = builder
            .commit_from_file(model_path)
            .with_context(|| format!("Cannot load SNAC decoder: {}", model_path.display()))?;
        Ok(Self { session })
    }
}

impl AudioDecoder for SnacDecoder {
    fn decode(&mut self, codes: &[u32]) -> Result<Vec<i16>> {
        let [l0, l1, l2] = split_layers(codes)?;

        let t0 = Tensor::<i64>::from_array(([1usize, l0.len()], l0))
            .context("Failed to build codes_0 tensor")?;
        let t1 = Tensor::<i64>::from_array(([1usize, l1.len()], l1))
            .context("Failed to build codes_1 tensor")?;
        let t2 = Tensor::<i64>::from_array(([1usize, l2.len()], l2))
            .context("Failed to build codes_2 tensor")?;

        let outputs = self
            .session
            .run(ort::inputs![t0, t1, t2])
            .context("SNAC inference failed")?;

        // Output 0 is the waveform, shape [1, 1, T].
        let (_shape, audio) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("Failed to extract audio tensor")?;

        if audio.len() < OUTPUT_END {
            bail!("SNAC produced {} samples, expected at least {}", audio.len(), OUTPUT_END);
        }
        Ok(to_pcm(&audio[OUTPUT_START..OUTPUT_END]))
    }
}
