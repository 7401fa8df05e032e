//! Error taxonomy shared by every public entry point.
//!
//! Collaborator boundaries (language model, audio decoder, model loader)
//! report [`anyhow::Error`]; those are wrapped here without losing the
//! source chain.  An unknown voice is *not* an error: it is substituted with
//! a default and reported through `tracing`.

use std::path::PathBuf;

/// Everything that can go wrong while configuring or driving a session.
#[derive(Debug, thiserror::Error)]
pub enum TtsError {
    /// The language code is absent from the voice catalog.
    #[error("language '{language}' is not supported; supported languages are: {supported:?}")]
    UnsupportedLanguage {
        language: String,
        supported: Vec<String>,
    },

    /// A generation was requested before [`initialize`](crate::TtsSession::initialize).
    #[error("TTS model not initialized; call initialize() first")]
    NotInitialized,

    /// The calling thread still holds a live [`AudioStream`](crate::AudioStream)
    /// on this session; waiting for the lock would never return.
    #[error("a stream on this thread still holds the session; drop it first")]
    StreamInProgress,

    /// A request field is outside its documented range.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The model loader could not produce a model for the language.
    #[error("failed to load model for '{language}'")]
    ModelLoad {
        language: String,
        #[source]
        source: anyhow::Error,
    },

    /// The language model or the audio decoder failed mid-generation.
    #[error("inference failed")]
    Inference(#[source] anyhow::Error),

    /// The audio file sink could not write `path`.
    #[error("cannot write audio file {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },
}

pub type Result<T> = std::result::Result<T, TtsError>;
