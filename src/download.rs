//! HuggingFace Hub model acquisition.
//!
//! [`HubLoader`] downloads the language's GGUF weights (named in the voice
//! catalog) and the SNAC decoder, then hands the weights path to a
//! caller-supplied constructor for the token-model runtime.  The decoder is
//! built here with [`SnacDecoder`].

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hf_hub::api::sync::{Api, ApiBuilder};

use crate::{
    backend::{LanguageModel, LoadRequest, LoadedModel, ModelLoader},
    snac::SnacDecoder,
};

/// Repository of the 24 kHz SNAC decoder exported to ONNX.
pub const SNAC_REPO: &str = "onnx-community/snac_24khz-ONNX";

/// Decoder graph inside [`SNAC_REPO`].
pub const SNAC_DECODER_FILE: &str = "onnx/decoder_model.onnx";

/// Local paths of everything a session needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFiles {
    pub weights: PathBuf,
    pub decoder: PathBuf,
}

/// Download a single file from a HuggingFace repository.
fn hf_download(api: &Api, repo_id: &str, filename: &str) -> Result<PathBuf> {
    let repo = api.model(repo_id.to_string());
    repo.get(filename)
        .with_context(|| format!("Failed to download '{}' from '{}'", filename, repo_id))
}

/// Fetch (or reuse from the Hub cache) the files for `request`'s language.
///
/// Files are cached in the HuggingFace Hub cache directory
/// (`~/.cache/huggingface/hub` by default).
pub fn fetch_model_files(request: &LoadRequest<'_>) -> Result<ModelFiles> {
    let entry = request.entry;
    let source = entry.model.as_ref().with_context(|| {
        format!("No model repository registered for language '{}'", entry.language_code)
    })?;

    let api = ApiBuilder::new()
        .with_token(request.credentials.map(str::to_string))
        .with_progress(request.verbose)
        .build()
        .context("Failed to initialise HuggingFace Hub client")?;

    tracing::info!(repo = %source.repo_id, file = %source.file, "fetching model weights");
    let weights = hf_download(&api, &source.repo_id, &source.file)?;

    tracing::info!(repo = SNAC_REPO, file = SNAC_DECODER_FILE, "fetching SNAC decoder");
    let decoder = hf_download(&api, SNAC_REPO, SNAC_DECODER_FILE)?;

    Ok(ModelFiles { weights, decoder })
}

/// [`ModelLoader`] that sources everything from the Hub.
///
/// `build_model` turns the downloaded weights into a running
/// [`LanguageModel`]; it receives the load request so it can apply the
/// resource limits and verbosity.
pub struct HubLoader<F> {
    build_model: F,
}

impl<F> HubLoader<F>
where
    F: Fn(&Path, &LoadRequest<'_>) -> Result<Box<dyn LanguageModel>> + Send + Sync,
{
    pub fn new(build_model: F) -> Self {
        Self { build_model }
    }
}

impl<F> ModelLoader for HubLoader<F>
where
    F: Fn(&Path, &LoadRequest<'_>) -> Result<Box<dyn LanguageModel>> + Send + Sync,
{
    fn load(&self, request: &LoadRequest<'_>) -> Result<LoadedModel> {
        let files = fetch_model_files(request)?;

        let model = (self.build_model)(&files.weights, request)
            .with_context(|| format!("Cannot start model runtime: {}", files.weights.display()))?;
        let decoder = SnacDecoder::load(&files.decoder, &request.limits)?;

        Ok(LoadedModel { model, decoder: Box::new(decoder) })
    }
}
