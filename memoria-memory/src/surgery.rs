//! Memory Surgery (§4.E): propose, approve, and reject edits against a
//! chunk, event, or decision, serialized per `(tenant, target_id)`.

use std::sync::Arc;

use chrono::Utc;
use memoria_core::{
    EditOp, EditPatch, EditStatus, EditTargetType, EntityIdType, MemoriaError, MemoriaResult,
    MemoryEdit, MemoryEditId, ProposedBy, SurgeryError, TenantId, ValidationError,
};
use memoria_storage::Storage;

/// Memory Surgery service (§4.E), operating over any [`Storage`] implementation.
pub struct MemorySurgery {
    storage: Arc<dyn Storage>,
}

impl MemorySurgery {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Propose (and optionally immediately approve) an edit against a target.
    /// Concurrent calls against the same `(tenant, target_id)` are serialized
    /// via the storage layer's advisory lock (§4.E, §5).
    pub fn create_edit(
        &self,
        tenant: TenantId,
        target_type: EditTargetType,
        target_id: String,
        reason: String,
        proposed_by: ProposedBy,
        patch: EditPatch,
        auto_approve: bool,
    ) -> MemoriaResult<MemoryEditId> {
        if !patch.is_well_formed() {
            return Err(ValidationError::InvalidValue {
                field: "patch".to_string(),
                reason: format!("{:?} patch is missing its required field(s)", patch.op()),
            }
            .into());
        }

        if !self.target_exists(tenant, target_type, &target_id)? {
            return Err(SurgeryError::TargetNotFound { target_id: target_id.clone() }.into());
        }

        let mut result: MemoriaResult<MemoryEditId> = Err(MemoriaError::Internal(
            "edit lock callback never ran".to_string(),
        ));
        self.storage.with_edit_lock(tenant, &target_id, &mut || {
            result = (|| {
                let now = Utc::now();
                let op = patch.op();
                let id = MemoryEditId::now_v7();
                let status = if auto_approve { EditStatus::Approved } else { EditStatus::Pending };
                let edit = MemoryEdit {
                    id,
                    tenant,
                    target_type,
                    target_id: target_id.clone(),
                    op,
                    reason: reason.clone(),
                    proposed_by,
                    status,
                    created_at: now,
                    applied_at: if auto_approve { Some(now) } else { None },
                    patch: patch.clone(),
                };
                self.storage.edit_insert(&edit)?;
                Ok(id)
            })();
        });
        result
    }

    /// Approve a `pending` edit. Fails with `NotFound` for any edit not
    /// currently pending (§4.E — approved edits are immutable).
    pub fn approve_edit(&self, tenant: TenantId, edit_id: MemoryEditId) -> MemoriaResult<()> {
        self.transition(tenant, edit_id, EditStatus::Approved)
    }

    /// Reject a `pending` edit. Fails with `NotFound` for any edit not
    /// currently pending.
    pub fn reject_edit(&self, tenant: TenantId, edit_id: MemoryEditId) -> MemoriaResult<()> {
        self.transition(tenant, edit_id, EditStatus::Rejected)
    }

    fn transition(&self, tenant: TenantId, edit_id: MemoryEditId, to: EditStatus) -> MemoriaResult<()> {
        let mut result = Ok(());
        // Resolve the target id first so we can take the per-target lock
        // before the read-then-write below.
        let edit = self
            .storage
            .edit_get(tenant, edit_id)?
            .ok_or_else(|| SurgeryError::TargetNotFound { target_id: edit_id.to_string() })?;

        self.storage.with_edit_lock(tenant, &edit.target_id, &mut || {
            result = (|| {
                let mut edit = self
                    .storage
                    .edit_get(tenant, edit_id)?
                    .ok_or_else(|| SurgeryError::TargetNotFound { target_id: edit_id.to_string() })?;
                if edit.status != EditStatus::Pending {
                    return Err(SurgeryError::AlreadyResolved {
                        edit_id: edit_id.to_string(),
                        status: edit.status.to_string(),
                    }
                    .into());
                }
                edit.status = to;
                if to == EditStatus::Approved {
                    edit.applied_at = Some(Utc::now());
                }
                self.storage.edit_update(tenant, &edit)
            })();
        });
        result
    }

    /// All edits on record for a target, newest first.
    pub fn list_edits(&self, tenant: TenantId, target_id: &str) -> MemoriaResult<Vec<MemoryEdit>> {
        let mut edits = self.storage.edit_list_by_target(tenant, target_id)?;
        edits.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(edits)
    }

    pub fn get_edit(&self, tenant: TenantId, edit_id: MemoryEditId) -> MemoriaResult<MemoryEdit> {
        self.storage
            .edit_get(tenant, edit_id)?
            .ok_or_else(|| SurgeryError::TargetNotFound { target_id: edit_id.to_string() }.into())
    }

    /// Whether `target_id` resolves to an existing entity of `target_type`
    /// in `tenant` (§4.E — an edit may only be proposed against a real
    /// target). An id that doesn't even parse as the expected entity id
    /// counts as not found.
    fn target_exists(&self, tenant: TenantId, target_type: EditTargetType, target_id: &str) -> MemoriaResult<bool> {
        Ok(match target_type {
            EditTargetType::Chunk => target_id
                .parse::<memoria_core::ChunkId>()
                .ok()
                .map(|id| self.storage.chunk_get(tenant, id))
                .transpose()?
                .flatten()
                .is_some(),
            EditTargetType::Event => target_id
                .parse::<memoria_core::EventId>()
                .ok()
                .map(|id| self.storage.event_get(tenant, id))
                .transpose()?
                .flatten()
                .is_some(),
            EditTargetType::Decision => target_id
                .parse::<memoria_core::DecisionId>()
                .ok()
                .map(|id| self.storage.decision_get(tenant, id))
                .transpose()?
                .flatten()
                .is_some(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoria_core::{Channel, Chunk, ChunkId, EventId, EventKind, Scope, Sensitivity};
    use memoria_storage::MemoryStorage;

    fn surgery() -> (MemorySurgery, TenantId) {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        (MemorySurgery::new(storage), TenantId::now_v7())
    }

    /// Inserts a real chunk directly through the surgery's own storage
    /// handle, so `create_edit`'s target-exists check has something to find.
    fn insert_chunk(surgery: &MemorySurgery, tenant: TenantId) -> ChunkId {
        let id = ChunkId::now_v7();
        let chunk = Chunk {
            id,
            tenant,
            source_event: EventId::now_v7(),
            timestamp: Utc::now(),
            kind: EventKind::Message,
            channel: Channel::Private,
            sensitivity: Sensitivity::None,
            tags: Default::default(),
            token_estimate: 10,
            importance: 0.5,
            text: "original text".to_string(),
            scope: Scope::Session,
            subject_type: None,
            subject_id: None,
            project_id: None,
            embedding: None,
        };
        surgery.storage.chunk_insert(&chunk).unwrap();
        id
    }

    #[test]
    fn create_edit_without_auto_approve_is_pending() {
        let (surgery, tenant) = surgery();
        let target = insert_chunk(&surgery, tenant);
        let id = surgery
            .create_edit(
                tenant,
                EditTargetType::Chunk,
                target.to_string(),
                "bad info".into(),
                ProposedBy::Human,
                EditPatch::Retract,
                false,
            )
            .unwrap();
        let edit = surgery.get_edit(tenant, id).unwrap();
        assert_eq!(edit.status, EditStatus::Pending);
        assert!(edit.applied_at.is_none());
    }

    #[test]
    fn auto_approve_transitions_immediately() {
        let (surgery, tenant) = surgery();
        let target = insert_chunk(&surgery, tenant);
        let id = surgery
            .create_edit(
                tenant,
                EditTargetType::Chunk,
                target.to_string(),
                "bad info".into(),
                ProposedBy::Human,
                EditPatch::Retract,
                true,
            )
            .unwrap();
        let edit = surgery.get_edit(tenant, id).unwrap();
        assert_eq!(edit.status, EditStatus::Approved);
        assert!(edit.applied_at.is_some());
    }

    #[test]
    fn malformed_patch_is_rejected() {
        let (surgery, tenant) = surgery();
        let err = surgery
            .create_edit(
                tenant,
                EditTargetType::Chunk,
                "chk_1".into(),
                "reason".into(),
                ProposedBy::Human,
                EditPatch::Amend { text: None, importance: None },
                false,
            )
            .unwrap_err();
        assert!(matches!(err, MemoriaError::InvalidInput(_)));
    }

    #[test]
    fn create_edit_against_missing_target_is_not_found() {
        let (surgery, tenant) = surgery();
        let err = surgery
            .create_edit(
                tenant,
                EditTargetType::Chunk,
                ChunkId::now_v7().to_string(),
                "reason".into(),
                ProposedBy::Human,
                EditPatch::Retract,
                false,
            )
            .unwrap_err();
        assert!(matches!(err, MemoriaError::NotFound(_)));
    }

    #[test]
    fn approving_an_already_approved_edit_fails_not_found() {
        let (surgery, tenant) = surgery();
        let target = insert_chunk(&surgery, tenant);
        let id = surgery
            .create_edit(
                tenant,
                EditTargetType::Chunk,
                target.to_string(),
                "reason".into(),
                ProposedBy::Human,
                EditPatch::Retract,
                true,
            )
            .unwrap();
        let err = surgery.approve_edit(tenant, id).unwrap_err();
        assert!(matches!(err, MemoriaError::NotFound(_)));
    }

    #[test]
    fn reject_marks_edit_rejected() {
        let (surgery, tenant) = surgery();
        let target = insert_chunk(&surgery, tenant);
        let id = surgery
            .create_edit(
                tenant,
                EditTargetType::Chunk,
                target.to_string(),
                "reason".into(),
                ProposedBy::Agent,
                EditPatch::Quarantine,
                false,
            )
            .unwrap();
        surgery.reject_edit(tenant, id).unwrap();
        let edit = surgery.get_edit(tenant, id).unwrap();
        assert_eq!(edit.status, EditStatus::Rejected);
    }
}
