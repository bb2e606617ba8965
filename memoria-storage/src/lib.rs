//! memoria-storage — the Storage Adapter (§4.B).
//!
//! `Storage` is a single object-safe, `Send + Sync` trait with one method
//! family per entity kind. [`MemoryStorage`] is a process-local, lock
//! protected in-memory implementation that backs tests and the reference
//! deployment; it is not the contract. Any type implementing `Storage`
//! (including a future SQL-backed adapter) is a legal Storage Adapter.
//!
//! `effective_chunks` (§4.B) is deliberately not a method here: it is a pure
//! function of `(chunk, edits-for-that-chunk)` computed by the Effective-View
//! Resolver in `memoria-memory` from the raw chunks and edits this trait
//! hands back, so history is never rewritten and nothing here special-cases
//! edit application.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use memoria_core::{
    Artifact, ArtifactId, Capsule, CapsuleId, Chunk, ChunkId, Decision, DecisionId, DecisionStatus,
    Edge, EdgeDirection, EdgeId, Event, EventId, GraphEdgeType, MemoryEdit, MemoryEditId,
    MemoriaResult, NodeRef, Scope, SessionId, StorageError, Task, TaskId, TenantId,
};

/// The Storage Adapter trait (§4.B). All methods are tenant-scoped: an
/// implementation must never return an entity belonging to a different
/// tenant than the one requested, reporting a mismatch as "not found"
/// (§7 — cross-tenant access is `NotFound`, never `Forbidden`).
pub trait Storage: Send + Sync {
    // ---- Event (§4.C Recorder) ----
    fn event_insert(&self, event: &Event) -> MemoriaResult<()>;
    fn event_get(&self, tenant: TenantId, id: EventId) -> MemoriaResult<Option<Event>>;
    /// Events for a session in strict timestamp order (§5 ordering guarantee).
    fn event_list_by_session(
        &self,
        tenant: TenantId,
        session: SessionId,
        limit: usize,
    ) -> MemoriaResult<Vec<Event>>;

    // ---- Artifact (§4.C overflow payload) ----
    fn artifact_insert(&self, artifact: &Artifact) -> MemoriaResult<()>;
    fn artifact_get(&self, tenant: TenantId, id: ArtifactId) -> MemoriaResult<Option<Artifact>>;

    // ---- Chunk (§4.B, candidate source for Retrieval) ----
    fn chunk_insert(&self, chunk: &Chunk) -> MemoriaResult<()>;
    fn chunk_get(&self, tenant: TenantId, id: ChunkId) -> MemoriaResult<Option<Chunk>>;
    fn chunk_list_by_tenant(&self, tenant: TenantId) -> MemoriaResult<Vec<Chunk>>;
    fn chunk_list_by_source_event(
        &self,
        tenant: TenantId,
        source_event: EventId,
    ) -> MemoriaResult<Vec<Chunk>>;

    // ---- MemoryEdit (§4.E Memory Surgery) ----
    fn edit_insert(&self, edit: &MemoryEdit) -> MemoriaResult<()>;
    fn edit_get(&self, tenant: TenantId, id: MemoryEditId) -> MemoriaResult<Option<MemoryEdit>>;
    fn edit_list_by_target(
        &self,
        tenant: TenantId,
        target_id: &str,
    ) -> MemoriaResult<Vec<MemoryEdit>>;
    fn edit_update(&self, tenant: TenantId, edit: &MemoryEdit) -> MemoriaResult<()>;

    /// Serialize concurrent `create_edit`/`approve_edit`/`reject_edit` calls
    /// against the same `(tenant, target_id)` pair, mirroring the advisory
    /// lock pattern used elsewhere in this codebase for cross-cutting mutual
    /// exclusion, scaled to an in-process mutex since there is one storage
    /// process (§4.E, §5).
    fn with_edit_lock(&self, tenant: TenantId, target_id: &str, f: &mut dyn FnMut());

    // ---- Capsule (§4.F Capsule Service) ----
    fn capsule_insert(&self, capsule: &Capsule) -> MemoriaResult<()>;
    fn capsule_get(&self, tenant: TenantId, id: CapsuleId) -> MemoriaResult<Option<Capsule>>;
    fn capsule_list_by_agent(&self, tenant: TenantId, agent: &str) -> MemoriaResult<Vec<Capsule>>;
    fn capsule_update(&self, tenant: TenantId, capsule: &Capsule) -> MemoriaResult<()>;

    // ---- Decision ----
    fn decision_insert(&self, decision: &Decision) -> MemoriaResult<()>;
    fn decision_get(&self, tenant: TenantId, id: DecisionId) -> MemoriaResult<Option<Decision>>;
    fn decision_list(
        &self,
        tenant: TenantId,
        status: Option<DecisionStatus>,
        scope: Option<Scope>,
    ) -> MemoriaResult<Vec<Decision>>;
    fn decision_update(&self, tenant: TenantId, decision: &Decision) -> MemoriaResult<()>;

    // ---- Task ----
    fn task_insert(&self, task: &Task) -> MemoriaResult<()>;
    fn task_get(&self, tenant: TenantId, id: TaskId) -> MemoriaResult<Option<Task>>;
    fn task_list_by_project(&self, tenant: TenantId, project: &str) -> MemoriaResult<Vec<Task>>;
    fn task_update(&self, tenant: TenantId, task: &Task) -> MemoriaResult<()>;

    // ---- Edge / graph (§4.J) ----
    fn edge_insert(&self, edge: &Edge) -> MemoriaResult<()>;
    fn edge_get(&self, tenant: TenantId, id: EdgeId) -> MemoriaResult<Option<Edge>>;
    fn edge_list_by_node(
        &self,
        tenant: TenantId,
        node: &NodeRef,
        direction: EdgeDirection,
        edge_type: Option<GraphEdgeType>,
    ) -> MemoriaResult<Vec<Edge>>;
    fn edge_update(&self, tenant: TenantId, edge: &Edge) -> MemoriaResult<()>;
    fn edge_delete(&self, tenant: TenantId, id: EdgeId) -> MemoriaResult<()>;
    /// Cascade-delete every edge touching `node` (§3 Node/Edge invariant).
    fn edge_delete_by_node(&self, tenant: TenantId, node: &NodeRef) -> MemoriaResult<()>;
}

fn not_found(entity: &'static str, id: impl std::fmt::Display) -> memoria_core::MemoriaError {
    StorageError::NotFound { entity, id: id.to_string() }.into()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Key<T>(TenantId, T);

/// Process-local, lock-protected in-memory [`Storage`] implementation (§4.B).
/// Backs tests and the reference single-process deployment.
#[derive(Default)]
pub struct MemoryStorage {
    events: RwLock<HashMap<Key<EventId>, Event>>,
    chunks: RwLock<HashMap<Key<ChunkId>, Chunk>>,
    edits: RwLock<HashMap<Key<MemoryEditId>, MemoryEdit>>,
    capsules: RwLock<HashMap<Key<CapsuleId>, Capsule>>,
    decisions: RwLock<HashMap<Key<DecisionId>, Decision>>,
    tasks: RwLock<HashMap<Key<TaskId>, Task>>,
    edges: RwLock<HashMap<Key<EdgeId>, Edge>>,
    artifacts: RwLock<HashMap<Key<ArtifactId>, Artifact>>,
    edit_locks: Mutex<HashMap<(TenantId, String), Arc<Mutex<()>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn event_insert(&self, event: &Event) -> MemoriaResult<()> {
        self.events
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .insert(Key(event.tenant, event.id), event.clone());
        Ok(())
    }

    fn event_get(&self, tenant: TenantId, id: EventId) -> MemoriaResult<Option<Event>> {
        Ok(self
            .events
            .read()
            .map_err(|_| StorageError::LockPoisoned)?
            .get(&Key(tenant, id))
            .cloned())
    }

    fn event_list_by_session(
        &self,
        tenant: TenantId,
        session: SessionId,
        limit: usize,
    ) -> MemoriaResult<Vec<Event>> {
        let events = self.events.read().map_err(|_| StorageError::LockPoisoned)?;
        let mut matched: Vec<Event> = events
            .values()
            .filter(|e| e.tenant == tenant && e.session == session)
            .cloned()
            .collect();
        matched.sort_by_key(|e| e.timestamp);
        if matched.len() > limit {
            matched = matched.split_off(matched.len() - limit);
        }
        Ok(matched)
    }

    fn artifact_insert(&self, artifact: &Artifact) -> MemoriaResult<()> {
        self.artifacts
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .insert(Key(artifact.tenant, artifact.id), artifact.clone());
        Ok(())
    }

    fn artifact_get(&self, tenant: TenantId, id: ArtifactId) -> MemoriaResult<Option<Artifact>> {
        Ok(self
            .artifacts
            .read()
            .map_err(|_| StorageError::LockPoisoned)?
            .get(&Key(tenant, id))
            .cloned())
    }

    fn chunk_insert(&self, chunk: &Chunk) -> MemoriaResult<()> {
        self.chunks
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .insert(Key(chunk.tenant, chunk.id), chunk.clone());
        Ok(())
    }

    fn chunk_get(&self, tenant: TenantId, id: ChunkId) -> MemoriaResult<Option<Chunk>> {
        Ok(self
            .chunks
            .read()
            .map_err(|_| StorageError::LockPoisoned)?
            .get(&Key(tenant, id))
            .cloned())
    }

    fn chunk_list_by_tenant(&self, tenant: TenantId) -> MemoriaResult<Vec<Chunk>> {
        Ok(self
            .chunks
            .read()
            .map_err(|_| StorageError::LockPoisoned)?
            .values()
            .filter(|c| c.tenant == tenant)
            .cloned()
            .collect())
    }

    fn chunk_list_by_source_event(
        &self,
        tenant: TenantId,
        source_event: EventId,
    ) -> MemoriaResult<Vec<Chunk>> {
        Ok(self
            .chunks
            .read()
            .map_err(|_| StorageError::LockPoisoned)?
            .values()
            .filter(|c| c.tenant == tenant && c.source_event == source_event)
            .cloned()
            .collect())
    }

    fn edit_insert(&self, edit: &MemoryEdit) -> MemoriaResult<()> {
        self.edits
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .insert(Key(edit.tenant, edit.id), edit.clone());
        Ok(())
    }

    fn edit_get(&self, tenant: TenantId, id: MemoryEditId) -> MemoriaResult<Option<MemoryEdit>> {
        Ok(self
            .edits
            .read()
            .map_err(|_| StorageError::LockPoisoned)?
            .get(&Key(tenant, id))
            .cloned())
    }

    fn edit_list_by_target(
        &self,
        tenant: TenantId,
        target_id: &str,
    ) -> MemoriaResult<Vec<MemoryEdit>> {
        Ok(self
            .edits
            .read()
            .map_err(|_| StorageError::LockPoisoned)?
            .values()
            .filter(|e| e.tenant == tenant && e.target_id == target_id)
            .cloned()
            .collect())
    }

    fn edit_update(&self, tenant: TenantId, edit: &MemoryEdit) -> MemoriaResult<()> {
        let mut edits = self.edits.write().map_err(|_| StorageError::LockPoisoned)?;
        let key = Key(tenant, edit.id);
        if !edits.contains_key(&key) {
            return Err(not_found("memory_edit", edit.id));
        }
        edits.insert(key, edit.clone());
        Ok(())
    }

    fn with_edit_lock(&self, tenant: TenantId, target_id: &str, f: &mut dyn FnMut()) {
        let lock = {
            let mut locks = self.edit_locks.lock().expect("edit lock registry poisoned");
            locks
                .entry((tenant, target_id.to_string()))
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _guard = lock.lock().expect("per-target edit mutex poisoned");
        f();
    }

    fn capsule_insert(&self, capsule: &Capsule) -> MemoriaResult<()> {
        self.capsules
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .insert(Key(capsule.tenant, capsule.id), capsule.clone());
        Ok(())
    }

    fn capsule_get(&self, tenant: TenantId, id: CapsuleId) -> MemoriaResult<Option<Capsule>> {
        Ok(self
            .capsules
            .read()
            .map_err(|_| StorageError::LockPoisoned)?
            .get(&Key(tenant, id))
            .cloned())
    }

    fn capsule_list_by_agent(&self, tenant: TenantId, agent: &str) -> MemoriaResult<Vec<Capsule>> {
        Ok(self
            .capsules
            .read()
            .map_err(|_| StorageError::LockPoisoned)?
            .values()
            .filter(|c| c.tenant == tenant && c.audience_agent_ids.contains(agent))
            .cloned()
            .collect())
    }

    fn capsule_update(&self, tenant: TenantId, capsule: &Capsule) -> MemoriaResult<()> {
        let mut capsules = self.capsules.write().map_err(|_| StorageError::LockPoisoned)?;
        let key = Key(tenant, capsule.id);
        if !capsules.contains_key(&key) {
            return Err(not_found("capsule", capsule.id));
        }
        capsules.insert(key, capsule.clone());
        Ok(())
    }

    fn decision_insert(&self, decision: &Decision) -> MemoriaResult<()> {
        self.decisions
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .insert(Key(decision.tenant, decision.id), decision.clone());
        Ok(())
    }

    fn decision_get(&self, tenant: TenantId, id: DecisionId) -> MemoriaResult<Option<Decision>> {
        Ok(self
            .decisions
            .read()
            .map_err(|_| StorageError::LockPoisoned)?
            .get(&Key(tenant, id))
            .cloned())
    }

    fn decision_list(
        &self,
        tenant: TenantId,
        status: Option<DecisionStatus>,
        scope: Option<Scope>,
    ) -> MemoriaResult<Vec<Decision>> {
        Ok(self
            .decisions
            .read()
            .map_err(|_| StorageError::LockPoisoned)?
            .values()
            .filter(|d| d.tenant == tenant)
            .filter(|d| status.map(|s| d.status == s).unwrap_or(true))
            .filter(|d| scope.map(|s| d.scope == s).unwrap_or(true))
            .cloned()
            .collect())
    }

    fn decision_update(&self, tenant: TenantId, decision: &Decision) -> MemoriaResult<()> {
        let mut decisions = self.decisions.write().map_err(|_| StorageError::LockPoisoned)?;
        let key = Key(tenant, decision.id);
        if !decisions.contains_key(&key) {
            return Err(not_found("decision", decision.id));
        }
        decisions.insert(key, decision.clone());
        Ok(())
    }

    fn task_insert(&self, task: &Task) -> MemoriaResult<()> {
        self.tasks
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .insert(Key(task.tenant, task.id), task.clone());
        Ok(())
    }

    fn task_get(&self, tenant: TenantId, id: TaskId) -> MemoriaResult<Option<Task>> {
        Ok(self
            .tasks
            .read()
            .map_err(|_| StorageError::LockPoisoned)?
            .get(&Key(tenant, id))
            .cloned())
    }

    fn task_list_by_project(&self, tenant: TenantId, project: &str) -> MemoriaResult<Vec<Task>> {
        Ok(self
            .tasks
            .read()
            .map_err(|_| StorageError::LockPoisoned)?
            .values()
            .filter(|t| t.tenant == tenant && t.project.as_deref() == Some(project))
            .cloned()
            .collect())
    }

    fn task_update(&self, tenant: TenantId, task: &Task) -> MemoriaResult<()> {
        let mut tasks = self.tasks.write().map_err(|_| StorageError::LockPoisoned)?;
        let key = Key(tenant, task.id);
        if !tasks.contains_key(&key) {
            return Err(not_found("task", task.id));
        }
        tasks.insert(key, task.clone());
        Ok(())
    }

    fn edge_insert(&self, edge: &Edge) -> MemoriaResult<()> {
        self.edges
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .insert(Key(edge.tenant, edge.id), edge.clone());
        Ok(())
    }

    fn edge_get(&self, tenant: TenantId, id: EdgeId) -> MemoriaResult<Option<Edge>> {
        Ok(self
            .edges
            .read()
            .map_err(|_| StorageError::LockPoisoned)?
            .get(&Key(tenant, id))
            .cloned())
    }

    fn edge_list_by_node(
        &self,
        tenant: TenantId,
        node: &NodeRef,
        direction: EdgeDirection,
        edge_type: Option<GraphEdgeType>,
    ) -> MemoriaResult<Vec<Edge>> {
        Ok(self
            .edges
            .read()
            .map_err(|_| StorageError::LockPoisoned)?
            .values()
            .filter(|e| e.tenant == tenant)
            .filter(|e| match direction {
                EdgeDirection::Out => &e.from == node,
                EdgeDirection::In => &e.to == node,
                EdgeDirection::Both => &e.from == node || &e.to == node,
            })
            .filter(|e| edge_type.map(|t| e.edge_type == t).unwrap_or(true))
            .cloned()
            .collect())
    }

    fn edge_update(&self, tenant: TenantId, edge: &Edge) -> MemoriaResult<()> {
        let mut edges = self.edges.write().map_err(|_| StorageError::LockPoisoned)?;
        let key = Key(tenant, edge.id);
        if !edges.contains_key(&key) {
            return Err(not_found("edge", edge.id));
        }
        edges.insert(key, edge.clone());
        Ok(())
    }

    fn edge_delete(&self, tenant: TenantId, id: EdgeId) -> MemoriaResult<()> {
        let mut edges = self.edges.write().map_err(|_| StorageError::LockPoisoned)?;
        if edges.remove(&Key(tenant, id)).is_none() {
            return Err(not_found("edge", id));
        }
        Ok(())
    }

    fn edge_delete_by_node(&self, tenant: TenantId, node: &NodeRef) -> MemoriaResult<()> {
        let mut edges = self.edges.write().map_err(|_| StorageError::LockPoisoned)?;
        edges.retain(|k, e| !(k.0 == tenant && (&e.from == node || &e.to == node)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoria_core::{
        Actor, ActorType, Channel, EventKind, Scope as ScopeEnum, Sensitivity,
    };
    use std::collections::HashSet;

    fn sample_event(tenant: TenantId, session: SessionId) -> Event {
        Event {
            id: EventId::now_v7(),
            timestamp: chrono::Utc::now(),
            tenant,
            session,
            channel: Channel::Private,
            actor: Actor { actor_type: ActorType::Human, id: "u1".into() },
            kind: EventKind::Message,
            sensitivity: Sensitivity::None,
            tags: HashSet::new(),
            content: serde_json::json!({"text": "hello"}),
            refs: HashSet::new(),
            scope: ScopeEnum::Session,
            subject_type: None,
            subject_id: None,
            project_id: None,
        }
    }

    #[test]
    fn event_insert_and_get_roundtrip() {
        let storage = MemoryStorage::new();
        let tenant = TenantId::now_v7();
        let session = SessionId::now_v7();
        let event = sample_event(tenant, session);
        storage.event_insert(&event).unwrap();
        let fetched = storage.event_get(tenant, event.id).unwrap();
        assert_eq!(fetched.unwrap().id, event.id);
    }

    #[test]
    fn event_get_is_tenant_scoped() {
        let storage = MemoryStorage::new();
        let tenant_a = TenantId::now_v7();
        let tenant_b = TenantId::now_v7();
        let session = SessionId::now_v7();
        let event = sample_event(tenant_a, session);
        storage.event_insert(&event).unwrap();
        assert!(storage.event_get(tenant_b, event.id).unwrap().is_none());
    }

    #[test]
    fn event_list_by_session_is_chronological() {
        let storage = MemoryStorage::new();
        let tenant = TenantId::now_v7();
        let session = SessionId::now_v7();
        let mut first = sample_event(tenant, session);
        first.timestamp = chrono::Utc::now() - chrono::Duration::seconds(10);
        let second = sample_event(tenant, session);
        storage.event_insert(&second).unwrap();
        storage.event_insert(&first).unwrap();

        let listed = storage.event_list_by_session(tenant, session, 10).unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].timestamp <= listed[1].timestamp);
    }

    #[test]
    fn edit_update_on_unknown_id_is_not_found() {
        let storage = MemoryStorage::new();
        let tenant = TenantId::now_v7();
        let edit = MemoryEdit {
            id: memoria_core::MemoryEditId::now_v7(),
            tenant,
            target_type: memoria_core::EditTargetType::Chunk,
            target_id: "chk_x".into(),
            op: memoria_core::EditOp::Retract,
            reason: "test".into(),
            proposed_by: memoria_core::ProposedBy::Human,
            status: memoria_core::EditStatus::Pending,
            created_at: chrono::Utc::now(),
            applied_at: None,
            patch: memoria_core::EditPatch::Retract,
        };
        let err = storage.edit_update(tenant, &edit).unwrap_err();
        assert!(matches!(err, memoria_core::MemoriaError::NotFound(_)));
    }

    #[test]
    fn with_edit_lock_serializes_same_target() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let storage = Arc::new(MemoryStorage::new());
        let tenant = TenantId::now_v7();
        let counter = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = vec![];
        for _ in 0..8 {
            let storage = storage.clone();
            let counter = counter.clone();
            let max_seen = max_seen.clone();
            handles.push(std::thread::spawn(move || {
                storage.with_edit_lock(tenant, "chk_shared", &mut || {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(n, Ordering::SeqCst);
                    std::thread::sleep(std::time::Duration::from_millis(1));
                    counter.fetch_sub(1, Ordering::SeqCst);
                });
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }
}
