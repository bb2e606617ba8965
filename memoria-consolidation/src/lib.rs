//! memoria-consolidation — background stratified-layer projection (§4.L,
//! optional).
//!
//! Runs off the request path and is never invoked synchronously from
//! `build_acb`: when it has not run (or is disabled), the Assembler's
//! `rules`/`decisions` fetches fall back to direct retrieval over raw
//! chunks/decisions, so the ACB schema is identical either way. Modeled as
//! a trait with one production-shaped implementation, the same seam
//! `memoria_retrieval::VectorIndex` uses for its optional hybrid path.
//!
//! Consolidation never mutates or deletes the originals it summarizes: a
//! synthesized layer is written as a brand new `knowledge_note`-kind
//! [`Event`], appended like any other event.

use std::collections::HashSet;
use std::sync::Arc;

use memoria_core::{
    Actor, ActorType, Channel, Chunk, ConsolidationLayer, Event, EventId, EventKind,
    EntityIdType, KnowledgeNote, KnowledgeNoteId, MemoriaResult, Scope, Sensitivity, SessionId,
    TenantId, Timestamp, estimate_tokens, truncate_to_tokens,
};
use memoria_storage::Storage;

/// Token budget for one synthesized knowledge note's text.
const NOTE_TOKEN_BUDGET: u32 = 512;

/// Background consolidation (§4.L). One call to [`Consolidator::consolidate`]
/// is one consolidation pass for a tenant; callers schedule it on whatever
/// cadence they like (a cron tick, an idle-daemon timer) — nothing in this
/// crate runs on its own.
pub trait Consolidator: Send + Sync {
    /// Run one consolidation pass for `tenant` as of `now`, returning the
    /// ids of any `knowledge_note` events it wrote.
    fn consolidate(&self, tenant: TenantId, now: Timestamp) -> MemoriaResult<Vec<EventId>>;
}

/// Groups a tenant's chunks into an enduring "identity" layer (high
/// importance, no time bound) and a "reflection" layer (a recency-windowed
/// synthesis), each written back as one `knowledge_note` event (§4.L).
pub struct WindowedConsolidator {
    storage: Arc<dyn Storage>,
    reflection_window_secs: i64,
    identity_importance_threshold: f32,
}

impl WindowedConsolidator {
    pub fn new(storage: Arc<dyn Storage>, reflection_window_secs: i64, identity_importance_threshold: f32) -> Self {
        Self { storage, reflection_window_secs, identity_importance_threshold }
    }

    fn synthesize(&self, tenant: TenantId, layer: ConsolidationLayer, chunks: &[Chunk], now: Timestamp) -> MemoriaResult<Option<EventId>> {
        if chunks.is_empty() {
            return Ok(None);
        }
        let mut ordered = chunks.to_vec();
        ordered.sort_by(|a, b| b.importance.partial_cmp(&a.importance).unwrap_or(std::cmp::Ordering::Equal));

        let mut text = String::new();
        for chunk in &ordered {
            if estimate_tokens(&text) >= NOTE_TOKEN_BUDGET {
                break;
            }
            if !text.is_empty() {
                text.push_str("\n\n");
            }
            text.push_str(&chunk.text);
        }
        text = truncate_to_tokens(&text, NOTE_TOKEN_BUDGET);

        let window_start = ordered.iter().map(|c| c.timestamp).min().unwrap_or(now);
        let window_end = ordered.iter().map(|c| c.timestamp).max().unwrap_or(now);
        let note = KnowledgeNote {
            id: KnowledgeNoteId::now_v7(),
            tenant,
            layer,
            text,
            source_chunk_ids: ordered.iter().map(|c| c.id).collect(),
            window_start,
            window_end,
            created_at: now,
        };

        let event = Event {
            id: EventId::now_v7(),
            timestamp: now,
            tenant,
            // Consolidation is a tenant-wide background pass, not tied to
            // any one conversation, so it has no natural session; the nil
            // session id marks a system-authored event.
            session: SessionId::nil(),
            channel: Channel::Agent,
            actor: Actor { actor_type: ActorType::Agent, id: "memoria-consolidation".to_string() },
            kind: EventKind::KnowledgeNote,
            sensitivity: Sensitivity::None,
            tags: HashSet::new(),
            content: serde_json::to_value(&note).map_err(|e| memoria_core::MemoriaError::Internal(e.to_string()))?,
            refs: note.source_chunk_ids.iter().map(|id| id.to_string()).collect(),
            scope: Scope::Global,
            subject_type: None,
            subject_id: None,
            project_id: None,
        };
        self.storage.event_insert(&event)?;
        Ok(Some(event.id))
    }
}

impl Consolidator for WindowedConsolidator {
    fn consolidate(&self, tenant: TenantId, now: Timestamp) -> MemoriaResult<Vec<EventId>> {
        let chunks = self.storage.chunk_list_by_tenant(tenant)?;

        let identity_candidates: Vec<Chunk> =
            chunks.iter().filter(|c| c.importance >= self.identity_importance_threshold).cloned().collect();

        let window_start = now - chrono::Duration::seconds(self.reflection_window_secs);
        let reflection_candidates: Vec<Chunk> = chunks.iter().filter(|c| c.timestamp >= window_start && c.timestamp <= now).cloned().collect();

        let mut written = Vec::new();
        if let Some(id) = self.synthesize(tenant, ConsolidationLayer::Identity, &identity_candidates, now)? {
            written.push(id);
        }
        if let Some(id) = self.synthesize(tenant, ConsolidationLayer::Reflection, &reflection_candidates, now)? {
            written.push(id);
        }
        Ok(written)
    }
}
