//! Generation requests and the token decode loop.
//!
//! [`DecodeLoop`] samples one token per step against a [`LanguageModel`] and
//! stops on end-of-sequence or when the token budget is spent.
//! [`Synthesis`] layers audio on top: it feeds sampled pieces through
//! [`CodeWindow`] and decodes each completed window into an [`AudioFrame`]
//! as soon as it exists.

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use crate::{
    assembler::AudioFrame,
    backend::{LanguageModel, LoadedModel},
    codes::{audio_code, CodeWindow},
    error::{Result, TtsError},
    sampling::{sample_next, SamplingParams},
};

const DEFAULT_MAX_TOKENS: usize = 2048;
const DEFAULT_PRE_BUFFER_SECONDS: f32 = 1.5;

// ─────────────────────────────────────────────────────────────────────────────
// GenerationRequest
// ─────────────────────────────────────────────────────────────────────────────

/// A validated, immutable description of one synthesis call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    text: String,
    voice_id: Option<String>,
    sampling: SamplingParams,
    max_tokens: usize,
    pre_buffer_seconds: f32,
    seed: Option<u64>,
}

impl GenerationRequest {
    /// Start a request for `text` with default sampling settings.
    pub fn builder(text: impl Into<String>) -> GenerationRequestBuilder {
        GenerationRequestBuilder {
            text: text.into(),
            voice_id: None,
            sampling: SamplingParams::default(),
            max_tokens: DEFAULT_MAX_TOKENS,
            pre_buffer_seconds: DEFAULT_PRE_BUFFER_SECONDS,
            seed: None,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Requested voice; `None` means the session language's default.
    pub fn voice_id(&self) -> Option<&str> {
        self.voice_id.as_deref()
    }

    pub fn sampling(&self) -> &SamplingParams {
        &self.sampling
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub fn pre_buffer_seconds(&self) -> f32 {
        self.pre_buffer_seconds
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }
}

#[derive(Debug, Clone)]
pub struct GenerationRequestBuilder {
    text: String,
    voice_id: Option<String>,
    sampling: SamplingParams,
    max_tokens: usize,
    pre_buffer_seconds: f32,
    seed: Option<u64>,
}

impl GenerationRequestBuilder {
    pub fn voice(mut self, voice_id: impl Into<String>) -> Self {
        self.voice_id = Some(voice_id.into());
        self
    }

    pub fn sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.sampling.temperature = temperature;
        self
    }

    pub fn top_p(mut self, top_p: f32) -> Self {
        self.sampling.top_p = top_p;
        self
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.sampling.top_k = top_k;
        self
    }

    pub fn min_p(mut self, min_p: f32) -> Self {
        self.sampling.min_p = min_p;
        self
    }

    pub fn max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Seconds of audio to accumulate before the first streamed chunk.
    pub fn pre_buffer_seconds(mut self, seconds: f32) -> Self {
        self.pre_buffer_seconds = seconds;
        self
    }

    /// Fix the sampling RNG so identical requests replay identical audio.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<GenerationRequest> {
        if self.text.trim().is_empty() {
            return Err(TtsError::InvalidRequest("text must not be empty".into()));
        }
        self.sampling.validate().map_err(TtsError::InvalidRequest)?;
        if self.max_tokens == 0 {
            return Err(TtsError::InvalidRequest("max_tokens must be >= 1".into()));
        }
        if !(self.pre_buffer_seconds >= 0.0 && self.pre_buffer_seconds.is_finite()) {
            return Err(TtsError::InvalidRequest(format!(
                "pre_buffer_seconds must be >= 0 (got {})",
                self.pre_buffer_seconds
            )));
        }

        Ok(GenerationRequest {
            text: self.text,
            voice_id: self.voice_id,
            sampling: self.sampling,
            max_tokens: self.max_tokens,
            pre_buffer_seconds: self.pre_buffer_seconds,
            seed: self.seed,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Decode loop
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndOfSequence,
    TokenBudget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Token(u32),
    Finished(StopReason),
}

/// Token-by-token sampling against a language model.
pub struct DecodeLoop {
    context: Vec<u32>,
    sampling: SamplingParams,
    max_tokens: usize,
    produced: usize,
    eos: u32,
    rng: ChaCha20Rng,
    stop: Option<StopReason>,
}

impl DecodeLoop {
    /// Reset `model` and tokenise `prompt` as the initial context.
    pub fn start(model: &mut dyn LanguageModel, prompt: &str, request: &GenerationRequest) -> Result<Self> {
        model.reset();
        let context = model.tokenize(prompt).map_err(TtsError::Inference)?;
        let rng = match request.seed() {
            Some(seed) => ChaCha20Rng::seed_from_u64(seed),
            None => ChaCha20Rng::from_entropy(),
        };

        Ok(Self {
            context,
            sampling: *request.sampling(),
            max_tokens: request.max_tokens(),
            produced: 0,
            eos: model.eos_token(),
            rng,
            stop: None,
        })
    }

    /// Sample one token, or report why generation is over.
    ///
    /// The end-of-sequence token counts against the budget but is never
    /// returned as a [`Step::Token`].
    pub fn step(&mut self, model: &mut dyn LanguageModel) -> Result<Step> {
        if let Some(reason) = self.stop {
            return Ok(Step::Finished(reason));
        }
        if self.produced >= self.max_tokens {
            self.stop = Some(StopReason::TokenBudget);
            return Ok(Step::Finished(StopReason::TokenBudget));
        }

        let logits = model.next_logits(&self.context).map_err(TtsError::Inference)?;
        let token = sample_next(&logits, &self.sampling, &mut self.rng).map_err(TtsError::Inference)?;
        self.produced += 1;

        if token == self.eos {
            self.stop = Some(StopReason::EndOfSequence);
            return Ok(Step::Finished(StopReason::EndOfSequence));
        }
        self.context.push(token);
        Ok(Step::Token(token))
    }

    /// Tokens sampled so far, end-of-sequence included.
    pub fn produced(&self) -> usize {
        self.produced
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Synthesis: tokens → frames
// ─────────────────────────────────────────────────────────────────────────────

/// Drives a [`DecodeLoop`] and decodes audio codes as they complete.
pub struct Synthesis {
    decode: DecodeLoop,
    window: CodeWindow,
    frames: usize,
}

impl Synthesis {
    pub fn start(loaded: &mut LoadedModel, prompt: &str, request: &GenerationRequest) -> Result<Self> {
        let decode = DecodeLoop::start(loaded.model.as_mut(), prompt, request)?;
        Ok(Self { decode, window: CodeWindow::new(), frames: 0 })
    }

    /// Advance until one frame is decoded; `None` once generation has stopped.
    pub fn next_frame(&mut self, loaded: &mut LoadedModel) -> Result<Option<AudioFrame>> {
        loop {
            let token = match self.decode.step(loaded.model.as_mut())? {
                Step::Token(token) => token,
                Step::Finished(reason) => {
                    tracing::debug!(
                        ?reason,
                        tokens = self.decode.produced(),
                        frames = self.frames,
                        "generation finished"
                    );
                    return Ok(None);
                }
            };

            let piece = loaded.model.token_piece(token);
            let Some(code) = audio_code(&piece, self.window.accepted()) else {
                tracing::trace!(token, piece = %piece, "skipping non-audio token");
                continue;
            };
            if let Some(window) = self.window.push(code) {
                let samples = loaded.decoder.decode(window).map_err(TtsError::Inference)?;
                self.frames += 1;
                return Ok(Some(AudioFrame::new(samples)));
            }
        }
    }

    pub fn tokens_generated(&self) -> usize {
        self.decode.produced()
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.decode.stop_reason()
    }
}
