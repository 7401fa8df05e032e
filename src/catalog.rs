//! Static language → voice table.
//!
//! The built-in table is `data/voices.json`, embedded at compile time and
//! parsed on first use.  Every lookup here is pure and may be called before
//! any session is initialised.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{bail, Context};
use once_cell::sync::Lazy;
use serde::Deserialize;

use crate::error::{Result, TtsError};

const BUILTIN_CATALOG: &str = include_str!("../data/voices.json");

static BUILTIN: Lazy<VoiceCatalog> = Lazy::new(|| {
    VoiceCatalog::from_json(BUILTIN_CATALOG).expect("embedded voices.json is a valid catalog")
});

/// Which of a language's two default voices to pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Gender {
    #[default]
    Male,
    Female,
}

/// Where a language's model weights live on the HuggingFace Hub.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModelSource {
    pub repo_id: String,
    /// GGUF file name inside the repository.
    pub file: String,
}

/// One language row of the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VoiceCatalogEntry {
    #[serde(skip)]
    pub language_code: String,
    pub voices: BTreeSet<String>,
    pub default_male_voice: String,
    pub default_female_voice: String,
    #[serde(default)]
    pub model: Option<ModelSource>,
}

impl VoiceCatalogEntry {
    pub fn default_voice(&self, gender: Gender) -> &str {
        match gender {
            Gender::Male => &self.default_male_voice,
            Gender::Female => &self.default_female_voice,
        }
    }

    pub fn has_voice(&self, voice: &str) -> bool {
        self.voices.contains(voice)
    }
}

/// Immutable language → voices table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceCatalog {
    entries: BTreeMap<String, VoiceCatalogEntry>,
}

impl VoiceCatalog {
    /// The catalog shipped with the crate.
    pub fn builtin() -> &'static VoiceCatalog {
        &BUILTIN
    }

    /// Parse a catalog of shape `{ lang: { voices, default_male_voice,
    /// default_female_voice, model? } }` and check that every default voice
    /// belongs to its own voice set.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let mut entries: BTreeMap<String, VoiceCatalogEntry> =
            serde_json::from_str(json).context("voice catalog is not valid JSON")?;

        for (lang, entry) in entries.iter_mut() {
            if entry.voices.is_empty() {
                bail!("language '{}' has no voices", lang);
            }
            for default in [&entry.default_male_voice, &entry.default_female_voice] {
                if !entry.voices.contains(default) {
                    bail!(
                        "default voice '{}' of language '{}' is not among its voices {:?}",
                        default,
                        lang,
                        entry.voices
                    );
                }
            }
            entry.language_code = lang.clone();
        }

        Ok(Self { entries })
    }

    pub fn languages(&self) -> BTreeSet<String> {
        self.entries.keys().cloned().collect()
    }

    /// Look up a language, failing with [`TtsError::UnsupportedLanguage`].
    pub fn entry(&self, language: &str) -> Result<&VoiceCatalogEntry> {
        self.entries
            .get(language)
            .ok_or_else(|| TtsError::UnsupportedLanguage {
                language: language.to_string(),
                supported: self.entries.keys().cloned().collect(),
            })
    }

    pub fn voices(&self, language: &str) -> Result<&BTreeSet<String>> {
        Ok(&self.entry(language)?.voices)
    }

    pub fn default_voice(&self, language: &str, gender: Gender) -> Result<&str> {
        Ok(self.entry(language)?.default_voice(gender))
    }
}

// ─── Free lookups over the built-in catalog ──────────────────────────────────

/// Language codes with a registered model.
pub fn supported_languages() -> BTreeSet<String> {
    VoiceCatalog::builtin().languages()
}

/// Voice IDs available for `language`.
pub fn available_voices(language: &str) -> Result<BTreeSet<String>> {
    VoiceCatalog::builtin().voices(language).cloned()
}

pub fn default_male_voice(language: &str) -> Result<String> {
    VoiceCatalog::builtin()
        .default_voice(language, Gender::Male)
        .map(str::to_string)
}

pub fn default_female_voice(language: &str) -> Result<String> {
    VoiceCatalog::builtin()
        .default_voice(language, Gender::Female)
        .map(str::to_string)
}
