//! Per-step token sampling.
//!
//! The policy is applied in a fixed order:
//!
//! 1. temperature scaling of the logits, then softmax
//! 2. top-k truncation
//! 3. top-p nucleus: smallest prefix whose cumulative probability ≥ `top_p`
//! 4. min-p floor: drop candidates whose probability is below `min_p`
//! 5. draw one token from the renormalised survivors
//!
//! Every truncation keeps at least the most likely candidate, so a draw is
//! always possible.

use anyhow::{bail, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Numeric sampling controls for one generation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingParams {
    /// Logit divisor; must be > 0.
    pub temperature: f32,
    /// Nucleus mass in (0, 1].
    pub top_p: f32,
    /// Candidates kept after ranking; must be ≥ 1.
    pub top_k: usize,
    /// Probability floor in [0, 1).
    pub min_p: f32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.8,
            top_p: 0.95,
            top_k: 40,
            min_p: 0.05,
        }
    }
}

impl SamplingParams {
    /// Check every range, returning a message naming the first offending field.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !(self.temperature > 0.0 && self.temperature.is_finite()) {
            return Err(format!("temperature must be > 0 (got {})", self.temperature));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(format!("top_p must be in (0, 1] (got {})", self.top_p));
        }
        if self.top_k == 0 {
            return Err("top_k must be >= 1".to_string());
        }
        if !(self.min_p >= 0.0 && self.min_p < 1.0) {
            return Err(format!("min_p must be in [0, 1) (got {})", self.min_p));
        }
        Ok(())
    }
}

const TOP_P_TOLERANCE: f64 = 1e-6;

/// Draw the next token id from raw `logits`.
pub fn sample_next(logits: &[f32], params: &SamplingParams, rng: &mut impl Rng) -> Result<u32> {
    if logits.is_empty() {
        bail!("model returned an empty logit vector");
    }

    let scaled: Vec<f32> = logits.iter().map(|&x| x / params.temperature).collect();
    let probs = softmax(&scaled);

    // Rank by probability desc; ties broken by lower index.
    let mut candidates: Vec<(usize, f32)> = probs.into_iter().enumerate().collect();
    candidates.sort_by(|(ia, pa), (ib, pb)| {
        pb.partial_cmp(pa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| ia.cmp(ib))
    });

    candidates.truncate(params.top_k.max(1));
    renormalize(&mut candidates);

    // Mass that lands on `top_p` up to f32 rounding counts as reaching it.
    let target = f64::from(params.top_p) - TOP_P_TOLERANCE;
    let mut cum = 0.0f64;
    let mut nucleus = candidates.len();
    for (i, &(_, p)) in candidates.iter().enumerate() {
        cum += f64::from(p);
        if cum >= target {
            nucleus = i + 1;
            break;
        }
    }
    candidates.truncate(nucleus.max(1));
    renormalize(&mut candidates);

    if params.min_p > 0.0 {
        let head = candidates[0];
        candidates.retain(|&(_, p)| p >= params.min_p);
        if candidates.is_empty() {
            candidates.push(head);
        }
        renormalize(&mut candidates);
    }

    Ok(draw(&candidates, rng))
}

fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores
        .iter()
        .copied()
        .filter(|x| x.is_finite())
        .fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return vec![1.0 / scores.len() as f32; scores.len()];
    }

    let exps: Vec<f32> = scores
        .iter()
        .map(|&x| if x.is_finite() { (x - max).exp() } else { 0.0 })
        .collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

fn renormalize(candidates: &mut [(usize, f32)]) {
    let sum: f32 = candidates.iter().map(|(_, p)| p).sum();
    if sum > 0.0 {
        for (_, p) in candidates.iter_mut() {
            *p /= sum;
        }
    }
}

fn draw(candidates: &[(usize, f32)], rng: &mut impl Rng) -> u32 {
    let r: f32 = rng.gen::<f32>();
    let mut cum = 0.0f32;
    for &(id, p) in candidates {
        cum += p;
        if r < cum {
            return id as u32;
        }
    }
    // Rounding left `cum` just under 1.0.
    candidates[candidates.len() - 1].0 as u32
}
