//! Model session: one loaded model, one generation at a time.
//!
//! A [`TtsSession`] owns at most one [`LoadedModel`] behind a mutex.  Every
//! generation holds that mutex from prompt tokenisation until its last chunk
//! has been delivered, so concurrent callers queue up instead of interleaving
//! decode steps on a shared model context.  [`initialize`](TtsSession::initialize)
//! and [`teardown`](TtsSession::teardown) take the same mutex and therefore
//! never overlap an in-flight generation.
//!
//! Streaming generations return an [`AudioStream`] that keeps the lock while
//! it is alive.  Dropping it early cancels the generation, discards any
//! withheld audio and releases the lock.  Calling back into the session from
//! the thread that holds a live stream fails with
//! [`TtsError::StreamInProgress`] instead of waiting on itself.

use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use crate::{
    assembler::{Assembler, AudioChunk, Delivery},
    backend::{LoadRequest, LoadedModel, ModelLoader, ResourceLimits},
    catalog::{Gender, VoiceCatalog, VoiceCatalogEntry},
    error::{Result, TtsError},
    generate::{GenerationRequest, StopReason, Synthesis},
    prompt::format_prompt,
    wav::write_wav,
    SAMPLE_RATE,
};

// ─────────────────────────────────────────────────────────────────────────────
// Options and state
// ─────────────────────────────────────────────────────────────────────────────

/// Arguments to [`TtsSession::initialize`].
#[derive(Clone)]
pub struct InitOptions {
    /// Token for the model hub, if the weights are gated.
    pub credentials: Option<String>,
    pub language: String,
    pub limits: ResourceLimits,
    /// Forwarded to the loader (download progress, backend logging).
    pub verbose: bool,
    /// Default that replaces an unspecified or unknown voice.
    pub voice_fallback: Gender,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            credentials: None,
            language: "en".to_string(),
            limits: ResourceLimits::default(),
            verbose: true,
            voice_fallback: Gender::Male,
        }
    }
}

impl InitOptions {
    pub fn new(language: impl Into<String>) -> Self {
        Self { language: language.into(), ..Self::default() }
    }

    pub fn with_credentials(mut self, token: impl Into<String>) -> Self {
        self.credentials = Some(token.into());
        self
    }
}

impl std::fmt::Debug for InitOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitOptions")
            .field("credentials", &self.credentials.as_ref().map(|_| "<redacted>"))
            .field("language", &self.language)
            .field("limits", &self.limits)
            .field("verbose", &self.verbose)
            .field("voice_fallback", &self.voice_fallback)
            .finish()
    }
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Ready,
    Generating,
}

impl SessionPhase {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => SessionPhase::Ready,
            2 => SessionPhase::Generating,
            _ => SessionPhase::Uninitialized,
        }
    }
}

struct Engine {
    entry: VoiceCatalogEntry,
    fallback: Gender,
    loaded: LoadedModel,
}

// ─────────────────────────────────────────────────────────────────────────────
// TtsSession
// ─────────────────────────────────────────────────────────────────────────────

/// Owner of a single model instance.
///
/// Sessions are independent: run one per language by giving each its own
/// loader output.
pub struct TtsSession<L> {
    loader: L,
    catalog: VoiceCatalog,
    engine: Mutex<Option<Engine>>,
    phase: AtomicU8,
    /// Thread holding the live stream, if any.
    stream_owner: Mutex<Option<ThreadId>>,
}

impl<L: ModelLoader> TtsSession<L> {
    /// An uninitialised session over the built-in voice catalog.
    pub fn new(loader: L) -> Self {
        Self::with_catalog(loader, VoiceCatalog::builtin().clone())
    }

    pub fn with_catalog(loader: L, catalog: VoiceCatalog) -> Self {
        Self {
            loader,
            catalog,
            engine: Mutex::new(None),
            phase: AtomicU8::new(SessionPhase::Uninitialized as u8),
            stream_owner: Mutex::new(None),
        }
    }

    pub fn catalog(&self) -> &VoiceCatalog {
        &self.catalog
    }

    pub fn phase(&self) -> SessionPhase {
        SessionPhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    /// Load the model for `options.language`.
    ///
    /// An already loaded model is released before the new one is acquired.
    /// Blocks while another thread's generation is in flight.
    pub fn initialize(&self, options: InitOptions) -> Result<()> {
        let entry = self.catalog.entry(&options.language)?.clone();

        let mut slot = self.lock()?;
        if let Some(previous) = slot.take() {
            tracing::warn!(
                previous = %previous.entry.language_code,
                language = %entry.language_code,
                "TTS model is already initialized; re-initializing"
            );
            drop(previous);
            self.set_phase(SessionPhase::Uninitialized);
        }

        let request = LoadRequest {
            entry: &entry,
            credentials: options.credentials.as_deref(),
            limits: options.limits,
            verbose: options.verbose,
        };
        let loaded = self.loader.load(&request).map_err(|source| TtsError::ModelLoad {
            language: entry.language_code.clone(),
            source,
        })?;

        tracing::info!(language = %entry.language_code, "TTS initialized");
        *slot = Some(Engine { entry, fallback: options.voice_fallback, loaded });
        self.set_phase(SessionPhase::Ready);
        Ok(())
    }

    /// Release the model.  Calling this on an uninitialised session is a no-op.
    pub fn teardown(&self) -> Result<()> {
        let mut slot = self.lock()?;
        if let Some(engine) = slot.take() {
            tracing::info!(language = %engine.entry.language_code, "TTS model released");
        }
        self.set_phase(SessionPhase::Uninitialized);
        Ok(())
    }

    /// Generate the whole utterance, optionally saving it as a WAV file.
    pub fn synthesize(
        &self,
        request: &GenerationRequest,
        output_path: Option<&Path>,
    ) -> Result<(u32, Vec<i16>)> {
        let mut stream = self.generate(request, Delivery::Batch)?;
        let mut samples = Vec::new();
        for chunk in &mut stream {
            samples.extend(chunk?.samples);
        }
        drop(stream);

        if let Some(path) = output_path {
            write_wav(path, SAMPLE_RATE, &samples)?;
        }
        Ok((SAMPLE_RATE, samples))
    }

    /// Generate lazily; chunks are produced as the caller pulls them.
    pub fn synthesize_stream(&self, request: &GenerationRequest) -> Result<AudioStream<'_>> {
        self.generate(request, Delivery::stream(request.pre_buffer_seconds()))
    }

    /// Start a generation with an explicit delivery mode.
    ///
    /// Fails with [`TtsError::NotInitialized`] before touching the model when
    /// no model is loaded.  An unspecified voice resolves to the language
    /// default of the configured fallback gender.
    pub fn generate(&self, request: &GenerationRequest, delivery: Delivery) -> Result<AudioStream<'_>> {
        let mut guard = self.lock()?;
        let engine = guard.as_mut().ok_or(TtsError::NotInitialized)?;

        let voice = request
            .voice_id()
            .unwrap_or_else(|| engine.entry.default_voice(engine.fallback));
        let prompt = format_prompt(request.text(), voice, &engine.entry, engine.fallback);
        tracing::debug!(
            language = %engine.entry.language_code,
            max_tokens = request.max_tokens(),
            ?delivery,
            "starting generation"
        );

        let synthesis = Synthesis::start(&mut engine.loaded, &prompt, request)?;
        self.set_phase(SessionPhase::Generating);
        *owner_slot(&self.stream_owner) = Some(thread::current().id());

        Ok(AudioStream {
            guard,
            phase: &self.phase,
            owner: &self.stream_owner,
            synthesis,
            assembler: Assembler::new(delivery),
            finished: false,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Engine>>> {
        if *owner_slot(&self.stream_owner) == Some(thread::current().id()) {
            return Err(TtsError::StreamInProgress);
        }
        Ok(self.engine.lock().unwrap_or_else(|poisoned: PoisonError<_>| {
            tracing::warn!("session lock poisoned by a panicked generation; recovering");
            poisoned.into_inner()
        }))
    }

    fn set_phase(&self, phase: SessionPhase) {
        self.phase.store(phase as u8, Ordering::SeqCst);
        *owner_slot(&self.stream_owner) = None;
    }
}

fn owner_slot(owner: &Mutex<Option<ThreadId>>) -> MutexGuard<'_, Option<ThreadId>> {
    owner.lock().unwrap_or_else(PoisonError::into_inner)
}

// ─────────────────────────────────────────────────────────────────────────────
// AudioStream
// ─────────────────────────────────────────────────────────────────────────────

/// A lazy, finite, single-use sequence of audio chunks.
///
/// Each call to `next` runs just enough decode steps to produce one chunk,
/// so the producer never runs ahead of the consumer.
///
/// The stream holds the session's `MutexGuard`, so it is not `Send`: consume
/// it on the thread that started it and forward the chunks (which are
/// `Send`) to a playback thread over a channel.
pub struct AudioStream<'a> {
    guard: MutexGuard<'a, Option<Engine>>,
    phase: &'a AtomicU8,
    owner: &'a Mutex<Option<ThreadId>>,
    synthesis: Synthesis,
    assembler: Assembler,
    finished: bool,
}

impl AudioStream<'_> {
    pub fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    pub fn tokens_generated(&self) -> usize {
        self.synthesis.tokens_generated()
    }

    /// Why generation stopped, once it has.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.synthesis.stop_reason()
    }
}

impl Iterator for AudioStream<'_> {
    type Item = Result<AudioChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let Some(engine) = self.guard.as_mut() else {
            self.finished = true;
            return Some(Err(TtsError::NotInitialized));
        };

        loop {
            match self.synthesis.next_frame(&mut engine.loaded) {
                Ok(Some(frame)) => {
                    if let Some(chunk) = self.assembler.push(frame) {
                        return Some(Ok(chunk));
                    }
                }
                Ok(None) => {
                    self.finished = true;
                    return self.assembler.finish().map(Ok);
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

impl Drop for AudioStream<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!(
                discarded_samples = self.assembler.pending_samples(),
                tokens = self.synthesis.tokens_generated(),
                "stream cancelled"
            );
        }
        let phase = match self.guard.is_some() {
            true => SessionPhase::Ready,
            false => SessionPhase::Uninitialized,
        };
        self.phase.store(phase as u8, Ordering::SeqCst);
    }
}
