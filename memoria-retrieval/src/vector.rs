//! Optional vector-index seam for hybrid retrieval (§4.G, §10).
//!
//! Embedding-based similarity is never required for a functioning ranked
//! result: absent a `VectorIndex`, retrieval runs lexical-only.

use memoria_core::{ChunkId, TenantId};

/// A caller-supplied vector index over chunk embeddings.
pub trait VectorIndex: Send + Sync {
    /// Return up to `top_k` `(chunk_id, cosine_similarity)` pairs for
    /// `tenant`, most similar first.
    fn query(&self, tenant: TenantId, embedding: &[f32], top_k: usize) -> Vec<(ChunkId, f32)>;
}

/// Cosine similarity between two equal-length vectors, `0.0` if either is
/// zero-length or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_have_cosine_similarity_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_have_cosine_similarity_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn mismatched_lengths_are_zero() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }
}
