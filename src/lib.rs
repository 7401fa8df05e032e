//! # osal_tts
//!
//! Streaming text-to-speech for Orpheus-style token models: a language model
//! emits SNAC audio codes as `<custom_token_N>` pieces, and a SNAC decoder
//! turns them into 24 kHz 16-bit PCM.
//!
//! ## Quick start
//!
//! ```ignore
//! use osal_tts::{download::HubLoader, GenerationRequest, InitOptions, TtsSession};
//!
//! // `start_llama` wraps your GGUF runtime as a `LanguageModel`.
//! let session = TtsSession::new(HubLoader::new(start_llama));
//! session.initialize(InitOptions::new("en").with_credentials(hf_token))?;
//!
//! // Whole utterance, also written to disk.
//! let request = GenerationRequest::builder("Hello world").voice("tara").build()?;
//! let (rate, samples) = session.synthesize(&request, Some("out.wav".as_ref()))?;
//!
//! // Or chunk by chunk, first audio after ~0.5 s of buffered speech.
//! let request = GenerationRequest::builder("Hello world").pre_buffer_seconds(0.5).build()?;
//! for chunk in session.synthesize_stream(&request)? {
//!     play(chunk?.samples);
//! }
//! ```
//!
//! Voice lookups work without a session:
//!
//! ```
//! assert!(osal_tts::supported_languages().contains("en"));
//! assert!(osal_tts::available_voices("zz").is_err());
//! ```
//!
//! ## Pipeline
//! 1. **Validation**: language, session state, request ranges; nothing runs
//!    on the model until all pass.
//! 2. **Prompt**: `<|audio|>{voice}: {text}<|eot_id|>`, unknown voices
//!    replaced by the language default.
//! 3. **Decode loop**: temperature → top-k → top-p → min-p sampling until
//!    end-of-sequence or `max_tokens`.
//! 4. **Audio codes**: custom tokens mapped to SNAC codes, 7 per frame.
//! 5. **SNAC decode**: each completed frame decoded with 3 frames of context.
//! 6. **Assembly**: one buffer (batch) or pre-buffered chunks (stream).
//!
//! One [`TtsSession`] runs one generation at a time; concurrent calls queue
//! on the session lock.

pub mod assembler;
pub mod backend;
pub mod catalog;
pub mod codes;
pub mod download;
pub mod error;
pub mod generate;
pub mod prompt;
pub mod sampling;
pub mod session;
pub mod snac;
pub mod wav;

// ─── Re-exports for convenience ─────────────────────────────────────────────

pub use assembler::{AudioChunk, AudioFrame, Delivery};
pub use backend::{AudioDecoder, LanguageModel, LoadRequest, LoadedModel, ModelLoader, ResourceLimits};
pub use catalog::{
    available_voices, default_female_voice, default_male_voice, supported_languages, Gender,
    VoiceCatalog, VoiceCatalogEntry,
};
pub use error::{Result, TtsError};
pub use generate::{GenerationRequest, GenerationRequestBuilder, StopReason};
pub use sampling::SamplingParams;
pub use session::{AudioStream, InitOptions, SessionPhase, TtsSession};

/// Audio sample rate of every chunk and file produced.
pub use snac::SAMPLE_RATE;
