//! memoria-retrieval — hybrid lexical + vector retrieval over effective
//! chunks (§4.G).

mod scoring;
mod vector;

pub use scoring::{recency_decay, token_overlap_similarity};
pub use vector::VectorIndex;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use memoria_core::{Channel, Chunk, ChunkId, MemoriaResult, Scope, Sensitivity, TenantId};
use memoria_memory::resolve_effective;
use memoria_storage::Storage;

/// Input to a retrieval query (§4.G).
#[derive(Debug, Clone)]
pub struct RetrievalQuery {
    pub tenant: TenantId,
    pub query_text: String,
    pub query_embedding: Option<Vec<f32>>,
    pub caller_channel: Channel,
    pub allowed_sensitivities: HashSet<Sensitivity>,
    pub scope: Option<Scope>,
    pub subject_type: Option<String>,
    pub subject_id: Option<String>,
    pub project_id: Option<String>,
    pub candidate_pool_max: usize,
    pub retrieved_chunks_max: usize,
    pub recency_half_life_secs: i64,
    pub alpha: f32,
    pub beta: f32,
    pub gamma: f32,
}

/// A chunk with its fused retrieval score, for inclusion in an ACB's
/// `evidence` section (§4.I).
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Result of a retrieval query (§4.G), including the candidate pool size
/// for provenance (§4.I step 10).
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub chunks: Vec<ScoredChunk>,
    pub candidate_pool_size: usize,
}

/// Retrieval component (§4.G), backed by any [`Storage`] implementation and
/// an optional [`VectorIndex`] for the hybrid path.
pub struct Retrieval {
    storage: Arc<dyn Storage>,
    vector_index: Option<Arc<dyn VectorIndex>>,
}

impl Retrieval {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage, vector_index: None }
    }

    pub fn with_vector_index(storage: Arc<dyn Storage>, vector_index: Arc<dyn VectorIndex>) -> Self {
        Self { storage, vector_index: Some(vector_index) }
    }

    /// Run retrieval for `query` (§4.G steps 1-4, plus the hybrid RRF fusion
    /// of step 4 when a vector index and query embedding are both present).
    pub fn retrieve(&self, query: &RetrievalQuery) -> MemoriaResult<RetrievalResult> {
        let raw = self.storage.chunk_list_by_tenant(query.tenant)?;

        let mut candidates: Vec<Chunk> = Vec::with_capacity(raw.len());
        for chunk in raw {
            let edits = self.storage.edit_list_by_target(query.tenant, &chunk.id.to_string())?;
            let effective = resolve_effective(&chunk, &edits);
            if !effective.visible_to_retrieval(query.caller_channel) {
                continue;
            }
            if !query.allowed_sensitivities.is_empty()
                && !query.allowed_sensitivities.contains(&effective.chunk.sensitivity)
            {
                continue;
            }
            if let Some(scope) = query.scope {
                if effective.chunk.scope != scope {
                    continue;
                }
            }
            if query.subject_type.is_some() && effective.chunk.subject_type != query.subject_type {
                continue;
            }
            if query.subject_id.is_some() && effective.chunk.subject_id != query.subject_id {
                continue;
            }
            if query.project_id.is_some() && effective.chunk.project_id != query.project_id {
                continue;
            }
            // §4.G step 1: candidate generation is a full-text match over
            // effective_chunks.text, not every visible chunk — a chunk with
            // no token overlap with the query never becomes a candidate,
            // regardless of its recency or importance.
            if token_overlap_similarity(&query.query_text, &effective.chunk.text) <= 0.0 {
                continue;
            }
            candidates.push(effective.chunk);
        }

        // Deterministic ordering before the pool cap: newest first, ties
        // broken by id, so a fixed tenant snapshot always yields the same
        // capped pool (§4.G determinism).
        candidates.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.to_string().cmp(&a.id.to_string())));
        let candidate_pool_size = candidates.len().min(query.candidate_pool_max);
        candidates.truncate(query.candidate_pool_max);

        let now = Utc::now();
        let mut scored: Vec<ScoredChunk> = candidates
            .into_iter()
            .map(|chunk| {
                let similarity = token_overlap_similarity(&query.query_text, &chunk.text);
                let age_secs = (now - chunk.timestamp).num_seconds().max(0);
                let recency = recency_decay(age_secs, query.recency_half_life_secs);
                let score = query.alpha * similarity + query.beta * recency + query.gamma * chunk.importance;
                ScoredChunk { chunk, score }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.chunk.id.to_string().cmp(&a.chunk.id.to_string()))
        });

        if let (Some(index), Some(embedding)) = (&self.vector_index, &query.query_embedding) {
            scored = fuse_with_vector_ranking(scored, index.as_ref(), query.tenant, embedding, &self.storage, query)?;
        }

        scored.truncate(query.retrieved_chunks_max);

        Ok(RetrievalResult { chunks: scored, candidate_pool_size })
    }
}

/// Reciprocal Rank Fusion (k=60) of the lexical ranking with a vector
/// ranking (§4.G step 4).
fn fuse_with_vector_ranking(
    lexical: Vec<ScoredChunk>,
    index: &dyn VectorIndex,
    tenant: TenantId,
    embedding: &[f32],
    storage: &Arc<dyn Storage>,
    query: &RetrievalQuery,
) -> MemoriaResult<Vec<ScoredChunk>> {
    const K: f32 = 60.0;
    let vector_ranked = index.query(tenant, embedding, query.candidate_pool_max);

    let mut fused: std::collections::HashMap<ChunkId, (Chunk, f32)> = std::collections::HashMap::new();
    for (rank, item) in lexical.iter().enumerate() {
        fused.insert(item.chunk.id, (item.chunk.clone(), 1.0 / (K + rank as f32 + 1.0)));
    }
    for (rank, (chunk_id, _similarity)) in vector_ranked.into_iter().enumerate() {
        let rrf = 1.0 / (K + rank as f32 + 1.0);
        if let Some(entry) = fused.get_mut(&chunk_id) {
            entry.1 += rrf;
        } else if let Some(chunk) = storage.chunk_get(tenant, chunk_id)? {
            fused.insert(chunk_id, (chunk, rrf));
        }
    }

    let mut result: Vec<ScoredChunk> = fused.into_values().map(|(chunk, score)| ScoredChunk { chunk, score }).collect();
    result.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.chunk.id.to_string().cmp(&a.chunk.id.to_string()))
    });
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoria_core::{EntityIdType, EventKind};
    use memoria_storage::MemoryStorage;

    fn insert_chunk(storage: &dyn Storage, tenant: TenantId, text: &str, importance: f32, age_secs: i64) -> ChunkId {
        let id = ChunkId::now_v7();
        let chunk = Chunk {
            id,
            tenant,
            source_event: memoria_core::EventId::now_v7(),
            timestamp: Utc::now() - chrono::Duration::seconds(age_secs),
            kind: EventKind::Message,
            channel: Channel::Private,
            sensitivity: Sensitivity::None,
            tags: Default::default(),
            token_estimate: text.len() as u32 / 4,
            importance,
            text: text.to_string(),
            scope: Scope::Session,
            subject_type: None,
            subject_id: None,
            project_id: None,
            embedding: None,
        };
        storage.chunk_insert(&chunk).unwrap();
        id
    }

    fn default_query(tenant: TenantId, text: &str) -> RetrievalQuery {
        RetrievalQuery {
            tenant,
            query_text: text.to_string(),
            query_embedding: None,
            caller_channel: Channel::Private,
            allowed_sensitivities: HashSet::new(),
            scope: None,
            subject_type: None,
            subject_id: None,
            project_id: None,
            candidate_pool_max: 2000,
            retrieved_chunks_max: 200,
            recency_half_life_secs: 86_400,
            alpha: 0.6,
            beta: 0.3,
            gamma: 0.1,
        }
    }

    #[test]
    fn relevant_text_ranks_above_irrelevant_text() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let tenant = TenantId::now_v7();
        insert_chunk(storage.as_ref(), tenant, "database migration rollback plan", 0.5, 10);
        insert_chunk(storage.as_ref(), tenant, "lunch order for the team", 0.5, 10);

        let retrieval = Retrieval::new(storage);
        let result = retrieval.retrieve(&default_query(tenant, "database migration rollback")).unwrap();
        assert_eq!(result.chunks[0].chunk.text, "database migration rollback plan");
    }

    #[test]
    fn retrieval_is_deterministic_for_fixed_state() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let tenant = TenantId::now_v7();
        for i in 0..5 {
            insert_chunk(storage.as_ref(), tenant, &format!("event number {i}"), 0.5, i);
        }
        let retrieval = Retrieval::new(storage);
        let q = default_query(tenant, "event number");
        let first = retrieval.retrieve(&q).unwrap();
        let second = retrieval.retrieve(&q).unwrap();
        let ids_a: Vec<_> = first.chunks.iter().map(|c| c.chunk.id).collect();
        let ids_b: Vec<_> = second.chunks.iter().map(|c| c.chunk.id).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn disallowed_sensitivity_is_excluded() {
        let storage = Arc::new(MemoryStorage::new());
        let tenant = TenantId::now_v7();
        let id = insert_chunk(storage.as_ref(), tenant, "secret plan", 0.5, 1);
        {
            let mut chunk = storage.chunk_get(tenant, id).unwrap().unwrap();
            chunk.sensitivity = Sensitivity::Secret;
            storage.chunk_insert(&chunk).unwrap();
        }
        let retrieval = Retrieval::new(storage);
        let mut q = default_query(tenant, "secret plan");
        q.allowed_sensitivities.insert(Sensitivity::None);
        let result = retrieval.retrieve(&q).unwrap();
        assert!(result.chunks.is_empty());
    }

    #[test]
    fn candidate_pool_is_capped() {
        let storage = Arc::new(MemoryStorage::new());
        let tenant = TenantId::now_v7();
        for i in 0..10 {
            insert_chunk(storage.as_ref(), tenant, &format!("chunk {i}"), 0.5, i);
        }
        let retrieval = Retrieval::new(storage);
        let mut q = default_query(tenant, "chunk");
        q.candidate_pool_max = 3;
        let result = retrieval.retrieve(&q).unwrap();
        assert_eq!(result.candidate_pool_size, 3);
    }
}
