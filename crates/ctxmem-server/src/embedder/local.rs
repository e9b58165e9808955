// crates/ctxmem-server/src/embedder/local.rs
// Local MiniLM-class sentence embedding model via candle + hf-hub.

use super::{truncate_input, l2_normalize, EmbedOutcome, Embedder};
use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use hf_hub::{api::tokio::Api, Repo, RepoType};
use once_cell::sync::OnceCell;
use tokenizers::Tokenizer;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

const MODEL_ID: &str = "sentence-transformers/all-MiniLM-L6-v2";
const MODEL_REVISION: &str = "main";
const DIMENSIONS: usize = 384;

struct Inner {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

/// Embedder backed by a one-shot-loaded local BERT-family model.
///
/// Initialization is idempotent: concurrent first calls to `embed()`
/// collapse onto the same `OnceCell` init future rather than racing to
/// download/load the model twice (§4.1).
pub struct LocalEmbedder {
    inner: OnceCell<Option<Inner>>,
    init_lock: Mutex<()>,
}

impl LocalEmbedder {
    pub fn new() -> Self {
        Self {
            inner: OnceCell::new(),
            init_lock: Mutex::new(()),
        }
    }

    async fn ensure_loaded(&self) -> bool {
        if let Some(inner) = self.inner.get() {
            return inner.is_some();
        }

        let _guard = self.init_lock.lock().await;
        if let Some(inner) = self.inner.get() {
            return inner.is_some();
        }

        let loaded = match Self::load().await {
            Ok(inner) => {
                info!(model = MODEL_ID, "local embedding model loaded");
                Some(inner)
            }
            Err(e) => {
                error!(error = %e, "failed to load local embedding model, falling back permanently");
                None
            }
        };
        let available = loaded.is_some();
        let _ = self.inner.set(loaded);
        available
    }

    async fn load() -> anyhow::Result<Inner> {
        let device = Device::Cpu;
        let repo = Repo::with_revision(
            MODEL_ID.to_string(),
            RepoType::Model,
            MODEL_REVISION.to_string(),
        );
        let api = Api::new()?;
        let api_repo = api.repo(repo);

        let config_filename = api_repo.get("config.json").await?;
        let tokenizer_filename = api_repo.get("tokenizer.json").await?;
        let weights_filename = api_repo.get("model.safetensors").await?;

        let config = std::fs::read_to_string(config_filename)?;
        let config: Config = serde_json::from_str(&config)?;

        let tokenizer = Tokenizer::from_file(tokenizer_filename)
            .map_err(|e| anyhow::anyhow!("failed to load tokenizer: {e}"))?;

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_filename], DTYPE, &device)?
        };
        let model = BertModel::load(vb, &config)?;

        Ok(Inner {
            model,
            tokenizer,
            device,
        })
    }

    fn encode(inner: &Inner, text: &str) -> anyhow::Result<Vec<f32>> {
        let tokens = inner
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow::anyhow!("tokenization error: {e}"))?;

        let token_ids = Tensor::new(tokens.get_ids(), &inner.device)?.unsqueeze(0)?;
        let token_type_ids = Tensor::new(tokens.get_type_ids(), &inner.device)?.unsqueeze(0)?;

        let output = inner.model.forward(&token_ids, &token_type_ids, None)?;
        let embedding = Self::mean_pooling(&inner.device, &output, tokens.get_attention_mask())?;
        let embedding_vec = embedding.to_vec1::<f32>()?;
        Ok(l2_normalize(embedding_vec))
    }

    fn mean_pooling(device: &Device, embeddings: &Tensor, attention_mask: &[u32]) -> anyhow::Result<Tensor> {
        let mask = Tensor::new(attention_mask, device)?
            .to_dtype(DType::F32)?
            .unsqueeze(0)?
            .unsqueeze(2)?;
        let masked = embeddings.broadcast_mul(&mask)?;
        let sum = masked.sum(1)?;
        let count = mask.sum(1)?.clamp(1f32, f32::INFINITY)?;
        let mean = sum.broadcast_div(&count)?;
        Ok(mean.squeeze(0)?)
    }
}

impl Default for LocalEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    async fn embed(&self, text: &str) -> EmbedOutcome {
        if !self.ensure_loaded().await {
            return EmbedOutcome::Unavailable;
        }
        let Some(Some(inner)) = self.inner.get() else {
            return EmbedOutcome::Unavailable;
        };
        let text = truncate_input(text).to_string();
        match Self::encode(inner, &text) {
            Ok(v) => EmbedOutcome::Vector(v),
            Err(e) => {
                warn!(error = %e, "embedding inference failed for this call");
                EmbedOutcome::Unavailable
            }
        }
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }

    fn is_available(&self) -> bool {
        // `None` means load has not been attempted yet, not that it
        // succeeded; only a completed `Some(Some(_))` counts as available.
        matches!(self.inner.get(), Some(Some(_)))
    }
}
