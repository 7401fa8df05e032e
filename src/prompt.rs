//! Prompt formatting for Orpheus-style models.
//!
//! The model expects `<|audio|>{voice}: {text}<|eot_id|>`.  Both markers are
//! special tokens of the model's tokenizer and must be passed through verbatim.

use crate::catalog::{Gender, VoiceCatalogEntry};

/// Opens an audio generation turn.
pub const START_MARKER: &str = "<|audio|>";

/// Closes the text turn (the tokenizer's end-of-turn token).
pub const END_MARKER: &str = "<|eot_id|>";

/// Resolve `voice` against the catalog entry.
///
/// Unknown voices are replaced by the entry's default for `fallback` and a
/// warning is logged; this never fails.
pub fn resolve_voice<'a>(voice: &'a str, entry: &'a VoiceCatalogEntry, fallback: Gender) -> &'a str {
    if entry.has_voice(voice) {
        return voice;
    }
    let substitute = entry.default_voice(fallback);
    tracing::warn!(
        voice,
        language = %entry.language_code,
        substitute,
        "voice not recognized, using default"
    );
    substitute
}

/// Build the exact prompt string for `text` spoken by `voice`.
pub fn format_prompt(text: &str, voice: &str, entry: &VoiceCatalogEntry, fallback: Gender) -> String {
    let voice = resolve_voice(voice, entry, fallback);
    format!("{START_MARKER}{voice}: {text}{END_MARKER}")
}
