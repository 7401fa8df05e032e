//! Collaborator boundaries: the token model, the audio decoder, and the
//! loader that produces both for a language.
//!
//! Implementations are assumed non-reentrant; the session guarantees that at
//! most one generation drives a [`LoadedModel`] at any time.

use anyhow::Result;

use crate::catalog::VoiceCatalogEntry;

/// Autoregressive token model (e.g. an Orpheus GGUF under llama.cpp).
pub trait LanguageModel: Send {
    /// Tokenise a fully formatted prompt, special markers included.
    fn tokenize(&self, prompt: &str) -> Result<Vec<u32>>;

    /// Logits over the whole vocabulary for the token following `context`.
    fn next_logits(&mut self, context: &[u32]) -> Result<Vec<f32>>;

    /// Text of a single token, e.g. `<custom_token_4107>`.
    fn token_piece(&self, token: u32) -> String;

    /// Token that ends the audio stream.
    fn eos_token(&self) -> u32;

    /// Drop any cached context before a new generation starts.
    fn reset(&mut self) {}
}

/// Turns a window of audio codes into 16-bit PCM at [`SAMPLE_RATE`](crate::SAMPLE_RATE).
pub trait AudioDecoder: Send {
    fn decode(&mut self, codes: &[u32]) -> Result<Vec<i16>>;
}

/// The exclusively owned model handle of a session.
pub struct LoadedModel {
    pub model: Box<dyn LanguageModel>,
    pub decoder: Box<dyn AudioDecoder>,
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("model", &"<LanguageModel>")
            .field("decoder", &"<AudioDecoder>")
            .finish()
    }
}

/// Compute budget handed to the loader.  Zero means "let the backend decide".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Model layers offloaded to the GPU.
    pub n_gpu_layers: u32,
    /// CPU threads for inference.
    pub n_threads: usize,
}

/// Everything a loader needs to materialise a model for one language.
#[derive(Clone, Copy)]
pub struct LoadRequest<'a> {
    pub entry: &'a VoiceCatalogEntry,
    pub credentials: Option<&'a str>,
    pub limits: ResourceLimits,
    pub verbose: bool,
}

impl std::fmt::Debug for LoadRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadRequest")
            .field("language", &self.entry.language_code)
            .field("credentials", &self.credentials.map(|_| "<redacted>"))
            .field("limits", &self.limits)
            .field("verbose", &self.verbose)
            .finish()
    }
}

/// Acquires model weights and builds a [`LoadedModel`].
pub trait ModelLoader: Send + Sync {
    fn load(&self, request: &LoadRequest<'_>) -> Result<LoadedModel>;
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory doubles for tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use anyhow::bail;

    use super::*;
    use crate::codes::{CODEBOOK_SIZE, CODES_PER_FRAME};

    pub const EOS: u32 = 0;
    const PROMPT: u32 = 1;
    const FIRST_SCRIPTED: u32 = 2;

    /// Samples the echo decoder emits per code of the newest frame.
    pub const SAMPLES_PER_CODE: usize = 40;
    pub const FRAME_SAMPLES: usize = SAMPLES_PER_CODE * CODES_PER_FRAME;

    /// Shared observation points across clones of a scripted backend.
    #[derive(Debug, Default)]
    pub struct Recorder {
        pub steps: AtomicUsize,
        pub live_models: AtomicUsize,
        pub peak_live_models: AtomicUsize,
        pub loads: AtomicUsize,
        in_flight: AtomicBool,
        pub overlapped: AtomicBool,
        /// Every prompt handed to `tokenize`, in call order.
        pub prompts: Mutex<Vec<String>>,
    }

    impl Recorder {
        pub fn last_prompt(&self) -> Option<String> {
            self.prompts.lock().unwrap().last().cloned()
        }
    }

    /// Piece text for the `index`-th audio code of a stream.
    pub fn custom_token(code: u32, index: usize) -> String {
        format!("<custom_token_{}>", code as usize + 10 + (index % CODES_PER_FRAME) * CODEBOOK_SIZE as usize)
    }

    /// A token script that yields exactly `frames` frames of audio codes.
    pub fn audio_pieces(frames: usize) -> Vec<String> {
        (0..frames * CODES_PER_FRAME)
            .map(|i| custom_token(((i * 31) % 4000 + 1) as u32, i))
            .collect()
    }

    /// Plays back a fixed list of pieces, then emits EOS.
    pub struct ScriptedModel {
        pieces: Vec<String>,
        pub delay: Option<Duration>,
        pub fail_at_step: Option<usize>,
        pub eos_after_script: bool,
        recorder: Arc<Recorder>,
    }

    impl ScriptedModel {
        pub fn new(pieces: Vec<String>, recorder: Arc<Recorder>) -> Self {
            let live = recorder.live_models.fetch_add(1, Ordering::SeqCst) + 1;
            recorder.peak_live_models.fetch_max(live, Ordering::SeqCst);
            Self { pieces, delay: None, fail_at_step: None, eos_after_script: true, recorder }
        }
    }

    impl Drop for ScriptedModel {
        fn drop(&mut self) {
            self.recorder.live_models.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl LanguageModel for ScriptedModel {
        fn tokenize(&self, prompt: &str) -> Result<Vec<u32>> {
            self.recorder.prompts.lock().unwrap().push(prompt.to_string());
            Ok(vec![PROMPT])
        }

        fn next_logits(&mut self, context: &[u32]) -> Result<Vec<f32>> {
            if self.recorder.in_flight.swap(true, Ordering::SeqCst) {
                self.recorder.overlapped.store(true, Ordering::SeqCst);
            }
            let step = context.len() - 1;
            self.recorder.steps.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            self.recorder.in_flight.store(false, Ordering::SeqCst);

            if self.fail_at_step == Some(step) {
                bail!("simulated resource exhaustion at step {step}");
            }

            let vocab = FIRST_SCRIPTED as usize + self.pieces.len();
            let target = match step < self.pieces.len() {
                true => FIRST_SCRIPTED + step as u32,
                false if self.eos_after_script => EOS,
                // Loop over the script so only the token budget stops us.
                false => FIRST_SCRIPTED + (step % self.pieces.len()) as u32,
            };
            let mut logits = vec![0.0f32; vocab];
            logits[target as usize] = 20.0;
            Ok(logits)
        }

        fn token_piece(&self, token: u32) -> String {
            match token {
                EOS => "<|end_of_speech|>".to_string(),
                PROMPT => "<|audio|>".to_string(),
                t => self.pieces[(t - FIRST_SCRIPTED) as usize].clone(),
            }
        }

        fn eos_token(&self) -> u32 {
            EOS
        }
    }

    /// Emits `SAMPLES_PER_CODE` copies of every code of the newest frame.
    pub struct EchoDecoder;

    impl AudioDecoder for EchoDecoder {
        fn decode(&mut self, codes: &[u32]) -> Result<Vec<i16>> {
            let newest = &codes[codes.len() - CODES_PER_FRAME..];
            Ok(newest
                .iter()
                .flat_map(|&c| std::iter::repeat(c as i16).take(SAMPLES_PER_CODE))
                .collect())
        }
    }

    /// Loader producing scripted models; every load is observable via `recorder`.
    pub struct ScriptedLoader {
        pub pieces: Vec<String>,
        pub delay: Option<Duration>,
        pub fail_at_step: Option<usize>,
        pub eos_after_script: bool,
        pub recorder: Arc<Recorder>,
    }

    impl ScriptedLoader {
        pub fn new(frames: usize) -> Self {
            Self {
                pieces: audio_pieces(frames),
                delay: None,
                fail_at_step: None,
                eos_after_script: true,
                recorder: Arc::new(Recorder::default()),
            }
        }
    }

    impl ModelLoader for ScriptedLoader {
        fn load(&self, _request: &LoadRequest<'_>) -> Result<LoadedModel> {
            self.recorder.loads.fetch_add(1, Ordering::SeqCst);
            let mut model = ScriptedModel::new(self.pieces.clone(), self.recorder.clone());
            model.delay = self.delay;
            model.fail_at_step = self.fail_at_step;
            model.eos_after_script = self.eos_after_script;
            Ok(LoadedModel { model: Box::new(model), decoder: Box::new(EchoDecoder) })
        }
    }
}
