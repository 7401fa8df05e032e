//! Audio-code extraction from generated token pieces.
//!
//! The model speaks audio through pieces of the form `<custom_token_N>`.
//! Codes come in frames of seven, one per SNAC codebook slot, and each slot
//! owns its own 4096-wide band of custom tokens:
//!
//! ```text
//! code = N - 10 - (index mod 7) * 4096
//! ```
//!
//! where `index` counts the codes accepted so far in this generation.

use once_cell::sync::Lazy;
use regex::Regex;

/// Codes per SNAC frame.
pub const CODES_PER_FRAME: usize = 7;

/// Frames handed to the decoder per call; the decoder needs left context.
pub const WINDOW_FRAMES: usize = 4;

/// Size of each SNAC codebook.
pub const CODEBOOK_SIZE: u32 = 4096;

const WINDOW_CODES: usize = CODES_PER_FRAME * WINDOW_FRAMES;

/// Offset of custom token numbering in the tokenizer's added vocabulary.
const CUSTOM_TOKEN_OFFSET: i64 = 10;

static RE_CUSTOM_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"<custom_token_(\d+)>$").unwrap());

/// Audio code carried by `piece`, if any.
///
/// The trimmed piece must end with a custom token, and only that last token
/// counts; anything outside the codebook range is rejected.
pub fn audio_code(piece: &str, index: usize) -> Option<u32> {
    let caps = RE_CUSTOM_TOKEN.captures(piece.trim())?;
    let number: i64 = caps[1].parse().ok()?;
    let code = number - CUSTOM_TOKEN_OFFSET - (index % CODES_PER_FRAME) as i64 * CODEBOOK_SIZE as i64;
    (0..CODEBOOK_SIZE as i64).contains(&code).then_some(code as u32)
}

/// Collects codes and releases a decode window at each completed frame.
#[derive(Debug, Default)]
pub struct CodeWindow {
    codes: Vec<u32>,
    accepted: usize,
}

impl CodeWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of codes accepted so far (the `index` for [`audio_code`]).
    pub fn accepted(&self) -> usize {
        self.accepted
    }

    /// Add one code.  Returns the latest `WINDOW_FRAMES` frames once a frame
    /// completes and enough context has accumulated.
    pub fn push(&mut self, code: u32) -> Option<&[u32]> {
        self.codes.push(code);
        self.accepted += 1;

        if self.accepted % CODES_PER_FRAME != 0 || self.codes.len() < WINDOW_CODES {
            return None;
        }
        let excess = self.codes.len() - WINDOW_CODES;
        self.codes.drain(..excess);
        Some(&self.codes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_offsets() {
        assert_eq!(audio_code("<custom_token_10>", 0), Some(0));
        assert_eq!(audio_code("<custom_token_4106>", 1), Some(0));
        assert_eq!(audio_code("<custom_token_4200>", 1), Some(94));
        assert_eq!(audio_code("<custom_token_28681>", 6), Some(4095));
    }

    #[test]
    fn test_index_wraps_every_frame() {
        assert_eq!(audio_code("<custom_token_15>", 7), Some(5));
        assert_eq!(audio_code("<custom_token_4111>", 8), Some(5));
    }

    #[test]
    fn test_last_token_wins() {
        assert_eq!(audio_code(" <custom_token_11><custom_token_12> ", 0), Some(2));
    }

    #[test]
    fn test_non_audio_pieces() {
        assert_eq!(audio_code("hello", 0), None);
        assert_eq!(audio_code("<|eot_id|>", 0), None);
        assert_eq!(audio_code("<custom_token_>", 0), None);
        assert_eq!(audio_code("<custom_token_12", 0), None);
    }

    #[test]
    fn test_trailing_text_after_token_rejected() {
        assert_eq!(audio_code("<custom_token_4200>x", 1), None);
        assert_eq!(audio_code("<custom_token_11><custom_token_", 0), None);
        assert_eq!(audio_code("x<custom_token_4200>\n", 1), Some(94));
    }

    #[test]
    fn test_out_of_band_codes_rejected() {
        // Slot 0 band is [10, 4106).
        assert_eq!(audio_code("<custom_token_9>", 0), None);
        assert_eq!(audio_code("<custom_token_4106>", 0), None);
        // A slot-1 token arriving at slot 0.
        assert_eq!(audio_code("<custom_token_5000>", 0), None);
    }

    #[test]
    fn test_window_released_per_frame_after_warmup() {
        let mut w = CodeWindow::new();
        let mut released = Vec::new();
        for i in 0..(CODES_PER_FRAME * 6) as u32 {
            if let Some(win) = w.push(i) {
                released.push(win.to_vec());
            }
        }
        // Frames 4, 5 and 6 complete with full context.
        assert_eq!(released.len(), 3);
        for win in &released {
            assert_eq!(win.len(), WINDOW_CODES);
        }
        assert_eq!(released[0][0], 0);
        assert_eq!(*released[2].last().unwrap(), (CODES_PER_FRAME * 6 - 1) as u32);
        assert_eq!(released[2][0], (CODES_PER_FRAME * 2) as u32);
    }

    #[test]
    fn test_partial_frame_never_released() {
        let mut w = CodeWindow::new();
        for i in 0..(WINDOW_CODES - 1) as u32 {
            assert!(w.push(i).is_none());
        }
        assert_eq!(w.accepted(), WINDOW_CODES - 1);
    }
}
