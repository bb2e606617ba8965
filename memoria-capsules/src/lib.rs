//! memoria-capsules — Capsule Service (§4.F): bounded, revocable bundles of
//! memory handed from one agent to another.
//!
//! Capsule status is a plain two-state enum (`active`/`revoked`) rather than
//! a typestate generic, since expiry is a derived property of `expires_at`
//! compared against the current time rather than a third stored state —
//! unlike a full handoff lifecycle, a capsule never needs compile-time
//! guarantees about which methods are legal in which state.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use memoria_core::{
    Capsule, CapsuleId, CapsuleItems, CapsuleStatus, EntityIdType, MemoriaResult, Scope, TenantId,
    ValidationError,
};
use memoria_storage::Storage;

/// Capsule Service (§4.F), operating over any [`Storage`] implementation.
pub struct CapsuleService {
    storage: Arc<dyn Storage>,
}

impl CapsuleService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// `create_capsule` (§4.F): validates every referenced item and audience
    /// agent exists, computes `expires_at`, and starts the capsule `active`.
    #[allow(clippy::too_many_arguments)]
    pub fn create_capsule(
        &self,
        tenant: TenantId,
        author_agent_id: String,
        scope: Scope,
        subject_type: Option<String>,
        subject_id: Option<String>,
        audience_agent_ids: HashSet<String>,
        items: CapsuleItems,
        risks: Vec<String>,
        ttl_days: u32,
    ) -> MemoriaResult<CapsuleId> {
        if audience_agent_ids.is_empty() {
            return Err(ValidationError::RequiredFieldMissing { field: "audience_agent_ids".to_string() }.into());
        }

        for chunk_id in &items.chunks {
            if self.storage.chunk_get(tenant, *chunk_id)?.is_none() {
                return Err(ValidationError::InvalidValue {
                    field: "items.chunks".to_string(),
                    reason: format!("{chunk_id} does not exist in tenant"),
                }
                .into());
            }
        }
        for decision_id in &items.decisions {
            if self.storage.decision_get(tenant, *decision_id)?.is_none() {
                return Err(ValidationError::InvalidValue {
                    field: "items.decisions".to_string(),
                    reason: format!("{decision_id} does not exist in tenant"),
                }
                .into());
            }
        }

        let created_at = Utc::now();
        let expires_at = created_at + chrono::Duration::days(ttl_days as i64);
        let id = CapsuleId::now_v7();
        let capsule = Capsule {
            id,
            tenant,
            scope,
            subject_type,
            subject_id,
            author_agent_id,
            audience_agent_ids,
            items,
            risks,
            ttl_days,
            created_at,
            expires_at,
            status: CapsuleStatus::Active,
            revoked_at: None,
        };
        self.storage.capsule_insert(&capsule)?;
        Ok(id)
    }

    /// `list_capsules` (§4.F): capsules where `status=active`, unexpired,
    /// and `agent` is in the audience.
    pub fn list_capsules(&self, tenant: TenantId, agent: &str) -> MemoriaResult<Vec<Capsule>> {
        let now = Utc::now();
        Ok(self
            .storage
            .capsule_list_by_agent(tenant, agent)?
            .into_iter()
            .filter(|c| c.status == CapsuleStatus::Active && now < c.expires_at)
            .collect())
    }

    /// `get_capsule` (§4.F): a revoked or expired capsule, or one `agent` is
    /// not audience for, is indistinguishable from non-existence to the
    /// caller, so this returns `Ok(None)` rather than surfacing status.
    pub fn get_capsule(&self, tenant: TenantId, id: CapsuleId, agent: &str) -> MemoriaResult<Option<Capsule>> {
        let Some(capsule) = self.storage.capsule_get(tenant, id)? else {
            return Ok(None);
        };
        let now = Utc::now();
        if capsule.status != CapsuleStatus::Active
            || now >= capsule.expires_at
            || !capsule.audience_agent_ids.contains(agent)
        {
            return Ok(None);
        }
        Ok(Some(capsule))
    }

    /// `revoke_capsule` (§4.F): sets `status=revoked, revoked_at=now`.
    pub fn revoke_capsule(&self, tenant: TenantId, id: CapsuleId) -> MemoriaResult<()> {
        let mut capsule = self
            .storage
            .capsule_get(tenant, id)?
            .ok_or_else(|| memoria_core::StorageError::NotFound { entity: "capsule", id: id.to_string() })?;
        capsule.status = CapsuleStatus::Revoked;
        capsule.revoked_at = Some(Utc::now());
        self.storage.capsule_update(tenant, &capsule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoria_storage::MemoryStorage;

    fn service() -> (CapsuleService, TenantId) {
        (CapsuleService::new(Arc::new(MemoryStorage::new())), TenantId::now_v7())
    }

    fn audience(agent: &str) -> HashSet<String> {
        let mut set = HashSet::new();
        set.insert(agent.to_string());
        set
    }

    #[test]
    fn create_capsule_with_no_items_succeeds() {
        let (service, tenant) = service();
        let id = service
            .create_capsule(
                tenant,
                "agent-a".into(),
                Scope::Session,
                None,
                None,
                audience("agent-b"),
                CapsuleItems::default(),
                vec![],
                7,
            )
            .unwrap();
        let capsule = service.get_capsule(tenant, id, "agent-b").unwrap().unwrap();
        assert_eq!(capsule.status, CapsuleStatus::Active);
    }

    #[test]
    fn create_capsule_rejects_empty_audience() {
        let (service, tenant) = service();
        let err = service
            .create_capsule(
                tenant,
                "agent-a".into(),
                Scope::Session,
                None,
                None,
                HashSet::new(),
                CapsuleItems::default(),
                vec![],
                7,
            )
            .unwrap_err();
        assert!(matches!(err, memoria_core::MemoriaError::InvalidInput(_)));
    }

    #[test]
    fn non_audience_agent_cannot_get_capsule() {
        let (service, tenant) = service();
        let id = service
            .create_capsule(
                tenant,
                "agent-a".into(),
                Scope::Session,
                None,
                None,
                audience("agent-b"),
                CapsuleItems::default(),
                vec![],
                7,
            )
            .unwrap();
        assert!(service.get_capsule(tenant, id, "agent-c").unwrap().is_none());
    }

    #[test]
    fn revoked_capsule_is_invisible_to_get_and_list() {
        let (service, tenant) = service();
        let id = service
            .create_capsule(
                tenant,
                "agent-a".into(),
                Scope::Session,
                None,
                None,
                audience("agent-b"),
                CapsuleItems::default(),
                vec![],
                7,
            )
            .unwrap();
        service.revoke_capsule(tenant, id).unwrap();
        assert!(service.get_capsule(tenant, id, "agent-b").unwrap().is_none());
        assert!(service.list_capsules(tenant, "agent-b").unwrap().is_empty());
    }

    #[test]
    fn expires_at_is_created_at_plus_ttl_days() {
        let (service, tenant) = service();
        let id = service
            .create_capsule(
                tenant,
                "agent-a".into(),
                Scope::Session,
                None,
                None,
                audience("agent-b"),
                CapsuleItems::default(),
                vec![],
                3,
            )
            .unwrap();
        let capsule = service.storage.capsule_get(tenant, id).unwrap().unwrap();
        let expected = capsule.created_at + chrono::Duration::days(3);
        assert_eq!(capsule.expires_at, expected);
    }
}
