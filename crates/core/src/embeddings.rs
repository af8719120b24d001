use crate::models::TextChunk;
use tracing::debug;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 384;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;
    fn embed(&self, text: &str) -> Vec<f32>;
}

/// Bag of character trigrams taken per word, each word padded with `<` and
/// `>` so prefixes and suffixes count. Buckets come from 64-bit FNV-1a, which
/// must stay fixed while vectors stored in the graph are in use.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

fn fnv1a(chars: &[char]) -> u64 {
    let mut buffer = [0u8; 4];
    chars.iter().fold(FNV_OFFSET, |hash, c| {
        c.encode_utf8(&mut buffer)
            .bytes()
            .fold(hash, |hash, byte| (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME))
    })
}

impl Embedder for CharacterNgramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let buckets = self.dimensions.max(1);
        let mut vector = vec![0f32; buckets];

        for word in text.split_whitespace() {
            let padded = std::iter::once('<')
                .chain(word.chars().flat_map(char::to_lowercase))
                .chain(std::iter::once('>'))
                .collect::<Vec<_>>();
            for gram in padded.windows(3) {
                vector[(fnv1a(gram) % buckets as u64) as usize] += 1.0;
            }
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            vector.iter_mut().for_each(|value| *value /= magnitude);
        }
        vector
    }
}

/// One vector per input, in order; blank inputs get the zero vector.
pub fn embed_batch(embedder: &dyn Embedder, texts: &[&str]) -> Vec<Vec<f32>> {
    let blank = texts.iter().filter(|text| text.trim().is_empty()).count();
    if blank > 0 {
        debug!(blank, total = texts.len(), "embedding batch contains blank texts");
    }
    texts.iter().map(|text| embedder.embed(text)).collect()
}

pub fn embed_chunks(embedder: &dyn Embedder, chunks: &mut [TextChunk]) {
    let texts = chunks.iter().map(|chunk| chunk.text.as_str()).collect::<Vec<_>>();
    let vectors = embed_batch(embedder, &texts);
    for (chunk, vector) in chunks.iter_mut().zip(vectors) {
        chunk.embedding = Some(vector);
    }
}

/// Cosine similarity; zero when either side is the zero vector.
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    let dot = left.iter().zip(right).map(|(a, b)| a * b).sum::<f32>();
    let left_norm = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|value| value * value).sum::<f32>().sqrt();
    if left_norm == 0.0 || right_norm == 0.0 {
        0.0
    } else {
        dot / (left_norm * right_norm)
    }
}
