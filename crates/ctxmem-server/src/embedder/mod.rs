// crates/ctxmem-server/src/embedder/mod.rs
// Text -> fixed-dimension unit vector, or a first-class Unavailable outcome.

#[cfg(feature = "local-embedder")]
mod local;

#[cfg(feature = "local-embedder")]
pub use local::LocalEmbedder;

use async_trait::async_trait;

/// Hard cap applied before tokenization (§4.1).
const MAX_INPUT_CHARS: usize = 8192;

/// Outcome of an embedding attempt. `Unavailable` is not an error to
/// propagate -- it flips the Vector Index into fallback mode for that call.
#[derive(Debug, Clone)]
pub enum EmbedOutcome {
    Vector(Vec<f32>),
    Unavailable,
}

/// A handle to an embedding backend, constructed once at startup and shared
/// by reference. Never modeled as ambient global state, so tests can inject
/// a stub.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed `text` into a unit-norm vector of `dimensions()` length, or
    /// report that the model is unavailable for this call.
    async fn embed(&self, text: &str) -> EmbedOutcome;

    /// Fixed dimensionality this embedder produces.
    fn dimensions(&self) -> usize;

    /// Whether this embedder initialized successfully. A `false` here means
    /// every future call returns `Unavailable` -- init failure never retries.
    fn is_available(&self) -> bool;
}

fn truncate_input(text: &str) -> &str {
    if text.len() <= MAX_INPUT_CHARS {
        return text;
    }
    let mut end = MAX_INPUT_CHARS;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    v
}

/// A permanently-unavailable embedder, used when the `local-embedder`
/// feature is disabled or model load failed, and in tests that exercise
/// keyword fallback mode.
pub struct NullEmbedder {
    dimensions: usize,
}

impl NullEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

#[async_trait]
impl Embedder for NullEmbedder {
    async fn embed(&self, _text: &str) -> EmbedOutcome {
        EmbedOutcome::Unavailable
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// A deterministic, dependency-free embedder for tests: hashes words into
/// buckets of a fixed dimension so that semantically overlapping text
/// produces similar vectors, without loading any model.
pub struct StubEmbedder {
    dimensions: usize,
}

impl StubEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, text: &str) -> EmbedOutcome {
        let text = truncate_input(text);
        let mut v = vec![0f32; self.dimensions];
        for word in text.split_whitespace() {
            let bucket = simple_hash(word) % self.dimensions as u64;
            v[bucket as usize] += 1.0;
        }
        EmbedOutcome::Vector(l2_normalize(v))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn is_available(&self) -> bool {
        true
    }
}

fn simple_hash(s: &str) -> u64 {
    let mut h: u64 = 1469598103934665603;
    for b in s.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(1099511628211);
    }
    h
}
