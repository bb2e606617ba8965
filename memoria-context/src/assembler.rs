//! ACB Assembler (§4.I): `build_acb` composes the mode, section budgets,
//! and every section's candidate items into one token-bounded Active
//! Context Bundle with full provenance.
//!
//! "Rules" has no dedicated entity in the data model; this assembler treats
//! `scope=policy` decisions as the durable rules/identity view and merges in
//! whatever sticky invariants (§4.H) are pinned for the session, ahead of
//! everything else in that section's packing order.

use std::collections::HashSet;
use std::sync::Arc;

use memoria_core::{
    AcbId, AcbSection, AgentId, Channel, EntityIdType, MemoriaConfig, MemoriaResult, Mode,
    OmissionReason, Scope, SessionId, Sensitivity, TenantId, Timestamp, estimate_tokens,
};
use memoria_capsules::CapsuleService;
use serde::Serialize;
use memoria_retrieval::{Retrieval, RetrievalQuery};
use memoria_storage::Storage;

use crate::budget::{allocate_section_budgets, SectionBudgets};
use crate::mode::detect_mode;
use crate::sticky::StickyStore;

/// Input to one `build_acb` call (§4.I contract).
#[derive(Debug, Clone)]
pub struct BuildAcbRequest {
    pub tenant: TenantId,
    pub session: SessionId,
    pub agent: AgentId,
    pub channel: Channel,
    pub intent: String,
    pub query_text: String,
    pub max_tokens: Option<u32>,
    pub include_capsules: bool,
    pub allowed_sensitivities: HashSet<Sensitivity>,
    pub project_id: Option<String>,
}

/// One packed item within a section, carrying enough provenance to trace
/// it back to its source entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcbItem {
    pub ref_id: String,
    pub text: String,
    pub token_estimate: u32,
    pub score: f32,
}

/// Packed output for one ACB section.
#[derive(Debug, Clone, PartialEq)]
pub struct AcbSectionOutput {
    pub section: AcbSection,
    pub budget_tokens: u32,
    pub items: Vec<AcbItem>,
    pub tokens_used: u32,
}

/// An item that was generated as a candidate but did not make it into the
/// bundle (§4.I step 9).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Omission {
    pub section: AcbSection,
    pub ref_id: String,
    pub reason: OmissionReason,
}

/// Full provenance record for one assembled ACB (§4.I step 10).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Provenance {
    pub mode: Mode,
    pub mode_confidence: f32,
    pub candidate_pool_size: usize,
    pub sticky_invariant_count: usize,
    pub total_tokens_used: u32,
}

/// An assembled Active Context Bundle (§3 ACB, §4.I).
#[derive(Debug, Clone, PartialEq)]
pub struct Acb {
    pub id: AcbId,
    pub tenant: TenantId,
    pub session: SessionId,
    pub created_at: Timestamp,
    pub mode: Mode,
    pub sections: Vec<AcbSectionOutput>,
    pub omissions: Vec<Omission>,
    pub provenance: Provenance,
}

impl Acb {
    pub fn section(&self, section: AcbSection) -> Option<&AcbSectionOutput> {
        self.sections.iter().find(|s| s.section == section)
    }
}

/// One greedily-packed candidate before section budgets are applied.
struct Candidate {
    ref_id: String,
    text: String,
    score: f32,
}

impl Candidate {
    fn new(ref_id: impl Into<String>, text: impl Into<String>, score: f32) -> Self {
        Self { ref_id: ref_id.into(), text: text.into(), score }
    }
}

/// Pack `candidates` (already in the caller's preferred order) into `budget`
/// tokens, admitting items while they still fit and recording every
/// remaining item as a `Budget` omission (§4.I step 9).
fn pack_section(section: AcbSection, budget: u32, candidates: Vec<Candidate>) -> (AcbSectionOutput, Vec<Omission>) {
    let mut items = Vec::new();
    let mut omissions = Vec::new();
    let mut used = 0u32;
    for candidate in candidates {
        let token_estimate = estimate_tokens(&candidate.text);
        if used + token_estimate <= budget {
            used += token_estimate;
            items.push(AcbItem { ref_id: candidate.ref_id, text: candidate.text, token_estimate, score: candidate.score });
        } else {
            omissions.push(Omission { section, ref_id: candidate.ref_id, reason: OmissionReason::Budget });
        }
    }
    (AcbSectionOutput { section, budget_tokens: budget, items, tokens_used: used }, omissions)
}

/// Precedence order for resolving overlapping decision scopes: later entries
/// win over earlier ones when a more specific scope is present (§4.I step 5).
const SCOPE_PRECEDENCE: &[Scope] = &[Scope::Global, Scope::Policy, Scope::Project, Scope::User, Scope::Session];

fn scope_rank(scope: Scope) -> usize {
    SCOPE_PRECEDENCE.iter().position(|s| *s == scope).unwrap_or(0)
}

/// ACB Assembler (§4.I), composing the Mode Detector, Budget Allocator,
/// Retrieval, Capsule Service, and sticky invariant store into one
/// `build_acb` entry point.
pub struct Assembler {
    storage: Arc<dyn Storage>,
    retrieval: Retrieval,
    capsules: CapsuleService,
    sticky: Arc<StickyStore>,
    config: MemoriaConfig,
}

impl Assembler {
    pub fn new(storage: Arc<dyn Storage>, sticky: Arc<StickyStore>, config: MemoriaConfig) -> Self {
        let retrieval = Retrieval::new(storage.clone());
        let capsules = CapsuleService::new(storage.clone());
        Self { storage, retrieval, capsules, sticky, config }
    }

    fn fractions_for(&self, mode: Mode) -> memoria_core::SectionBudgetFractions {
        let key = mode.as_db_str();
        self.config
            .budget
            .per_mode_fractions
            .iter()
            .find(|(m, _)| m == key)
            .map(|(_, f)| *f)
            .unwrap_or_else(|| {
                self.config
                    .budget
                    .per_mode_fractions
                    .first()
                    .expect("at least one per-mode fraction set is configured")
                    .1
            })
    }

    /// `build_acb` (§4.I): the 10-step assembly algorithm.
    pub fn build_acb(&self, req: &BuildAcbRequest) -> MemoriaResult<Acb> {
        // Step 1: mode detection.
        let (mode, mode_confidence) = detect_mode(&req.intent, &req.query_text);

        // Step 2-3: section budgets from the mode's fraction table.
        let max_tokens = req.max_tokens.unwrap_or(self.config.budget.max_tokens);
        let fractions = self.fractions_for(mode);
        let budgets: SectionBudgets = allocate_section_budgets(max_tokens, &fractions);

        let mut all_omissions = Vec::new();

        // Step 4: rules/identity view — policy-scoped decisions, with
        // sticky invariants pinned ahead of everything else in the section.
        let sticky_invariants = self.sticky.get(req.session);
        let mut rules_candidates: Vec<Candidate> = sticky_invariants
            .iter()
            .map(|inv| Candidate::new(format!("sticky:{}", inv.pinned_at.timestamp()), inv.text.clone(), 1.0))
            .collect();
        let policy_decisions = self.storage.decision_list(req.tenant, None, Some(Scope::Policy))?;
        rules_candidates.extend(
            policy_decisions
                .iter()
                .filter(|d| d.status == memoria_core::DecisionStatus::Active)
                .map(|d| Candidate::new(d.id.to_string(), d.text.clone(), 0.5)),
        );
        let (rules_section, rules_omissions) = pack_section(AcbSection::Rules, budgets.rules, rules_candidates);
        all_omissions.extend(rules_omissions);

        // Step 5: task state, most urgent first (open/doing before blocked/done,
        // then by priority descending).
        let mut tasks = match &req.project_id {
            Some(project) => self.storage.task_list_by_project(req.tenant, project)?,
            None => Vec::new(),
        };
        tasks.sort_by(|a, b| {
            task_urgency_rank(a.status)
                .cmp(&task_urgency_rank(b.status))
                .then_with(|| b.priority.cmp(&a.priority))
        });
        let task_candidates: Vec<Candidate> = tasks
            .iter()
            .map(|t| Candidate::new(t.id.to_string(), render_task(t), 0.0))
            .collect();
        let (task_section, task_omissions) = pack_section(AcbSection::TaskState, budgets.task_state, task_candidates);
        all_omissions.extend(task_omissions);

        // Step 6: active decisions, most specific scope first.
        let mut decisions = self.storage.decision_list(req.tenant, Some(memoria_core::DecisionStatus::Active), None)?;
        decisions.retain(|d| d.scope != Scope::Policy);
        decisions.sort_by(|a, b| scope_rank(b.scope).cmp(&scope_rank(a.scope)).then_with(|| b.created_at.cmp(&a.created_at)));
        let decision_candidates: Vec<Candidate> = decisions
            .iter()
            .map(|d| Candidate::new(d.id.to_string(), render_decision(d), 0.0))
            .collect();
        let (decision_section, decision_omissions) = pack_section(AcbSection::Decisions, budgets.decisions, decision_candidates);
        all_omissions.extend(decision_omissions);

        // Step 7: evidence, via Retrieval's fused score.
        let retrieval_query = RetrievalQuery {
            tenant: req.tenant,
            query_text: req.query_text.clone(),
            query_embedding: None,
            caller_channel: req.channel,
            allowed_sensitivities: req.allowed_sensitivities.clone(),
            scope: None,
            subject_type: None,
            subject_id: None,
            project_id: req.project_id.clone(),
            candidate_pool_max: self.config.retrieval.candidate_pool_max as usize,
            retrieved_chunks_max: self.config.retrieval.retrieved_chunks_max as usize,
            recency_half_life_secs: self.config.retrieval.recency_half_life_secs as i64,
            alpha: self.config.retrieval.alpha,
            beta: self.config.retrieval.beta,
            gamma: self.config.retrieval.gamma,
        };
        let retrieval_result = self.retrieval.retrieve(&retrieval_query)?;
        let evidence_candidates: Vec<Candidate> = retrieval_result
            .chunks
            .iter()
            .map(|scored| Candidate::new(scored.chunk.id.to_string(), scored.chunk.text.clone(), scored.score))
            .collect();
        let (evidence_section, evidence_omissions) = pack_section(AcbSection::Evidence, budgets.evidence, evidence_candidates);
        all_omissions.extend(evidence_omissions);

        // Step 8: recent window — the session's most recent chunks, newest first.
        let recent_events = self.storage.event_list_by_session(req.tenant, req.session, 200)?;
        let mut recent_chunks = Vec::new();
        for event in &recent_events {
            recent_chunks.extend(self.storage.chunk_list_by_source_event(req.tenant, event.id)?);
        }
        recent_chunks.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        let recent_candidates: Vec<Candidate> =
            recent_chunks.iter().map(|c| Candidate::new(c.id.to_string(), c.text.clone(), 0.0)).collect();
        let (recent_section, recent_omissions) = pack_section(AcbSection::Recent, budgets.recent, recent_candidates);
        all_omissions.extend(recent_omissions);

        // Step 9: capsules, only when the caller opts in.
        let capsule_candidates: Vec<Candidate> = if req.include_capsules {
            self.capsules
                .list_capsules(req.tenant, &req.agent.to_string())?
                .iter()
                .map(|c| Candidate::new(c.id.to_string(), render_capsule(c), 0.0))
                .collect()
        } else {
            Vec::new()
        };
        let (capsules_section, capsule_omissions) = pack_section(AcbSection::Capsules, budgets.capsules, capsule_candidates);
        all_omissions.extend(capsule_omissions);

        let sections = vec![rules_section, task_section, decision_section, evidence_section, recent_section, capsules_section];
        let total_tokens_used = sections.iter().map(|s| s.tokens_used).sum();

        Ok(Acb {
            id: AcbId::now_v7(),
            tenant: req.tenant,
            session: req.session,
            created_at: chrono::Utc::now(),
            mode,
            sections,
            omissions: all_omissions,
            provenance: Provenance {
                mode,
                mode_confidence,
                candidate_pool_size: retrieval_result.candidate_pool_size,
                sticky_invariant_count: sticky_invariants.len(),
                total_tokens_used,
            },
        })
    }
}

fn task_urgency_rank(status: memoria_core::TaskStatus) -> u8 {
    use memoria_core::TaskStatus::*;
    match status {
        Doing => 0,
        Blocked => 1,
        Open => 2,
        Review => 3,
        Backlog => 4,
        Done => 5,
    }
}

fn render_task(task: &memoria_core::Task) -> String {
    format!("[{}] {}", task.status, task.title)
}

fn render_decision(decision: &memoria_core::Decision) -> String {
    decision.text.clone()
}

fn render_capsule(capsule: &memoria_core::Capsule) -> String {
    format!("capsule from {} ({} chunks, {} decisions)", capsule.author_agent_id, capsule.items.chunks.len(), capsule.items.decisions.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoria_core::{DecisionId, DecisionStatus, TaskId, TaskStatus};
    use memoria_storage::MemoryStorage;
    use std::collections::HashSet as StdHashSet;

    fn assembler() -> (Assembler, TenantId, SessionId) {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let sticky = Arc::new(StickyStore::new());
        let assembler = Assembler::new(storage, sticky, MemoriaConfig::reference());
        (assembler, TenantId::now_v7(), SessionId::now_v7())
    }

    fn base_request(tenant: TenantId, session: SessionId) -> BuildAcbRequest {
        BuildAcbRequest {
            tenant,
            session,
            agent: AgentId::now_v7(),
            channel: Channel::Private,
            intent: "".to_string(),
            query_text: "".to_string(),
            max_tokens: None,
            include_capsules: false,
            allowed_sensitivities: StdHashSet::new(),
            project_id: None,
        }
    }

    #[test]
    fn empty_tenant_produces_empty_sections_with_provenance() {
        let (assembler, tenant, session) = assembler();
        let acb = assembler.build_acb(&base_request(tenant, session)).unwrap();
        assert!(acb.sections.iter().all(|s| s.items.is_empty()));
        assert_eq!(acb.provenance.sticky_invariant_count, 0);
    }

    #[test]
    fn sticky_invariant_is_pinned_into_rules() {
        let (assembler, tenant, session) = assembler();
        assembler.sticky.observe(session, memoria_core::EventKind::Message, "you must never delete production data");
        let acb = assembler.build_acb(&base_request(tenant, session)).unwrap();
        let rules = acb.section(AcbSection::Rules).unwrap();
        assert_eq!(rules.items.len(), 1);
        assert_eq!(acb.provenance.sticky_invariant_count, 1);
    }

    #[test]
    fn active_decision_appears_in_decisions_section() {
        let (assembler, tenant, session) = assembler();
        let decision = memoria_core::Decision {
            id: DecisionId::now_v7(),
            tenant,
            status: DecisionStatus::Active,
            scope: Scope::Project,
            text: "use postgres for the primary store".to_string(),
            rationale: None,
            constraints: vec![],
            alternatives: vec![],
            consequences: vec![],
            refs: StdHashSet::new(),
            created_at: chrono::Utc::now(),
            supersedes: None,
        };
        assembler.storage.decision_insert(&decision).unwrap();
        let acb = assembler.build_acb(&base_request(tenant, session)).unwrap();
        let decisions = acb.section(AcbSection::Decisions).unwrap();
        assert_eq!(decisions.items.len(), 1);
    }

    #[test]
    fn tiny_budget_omits_items_with_budget_reason() {
        let (assembler, tenant, session) = assembler();
        let decision = memoria_core::Decision {
            id: DecisionId::now_v7(),
            tenant,
            status: DecisionStatus::Active,
            scope: Scope::Project,
            text: "a".repeat(4000),
            rationale: None,
            constraints: vec![],
            alternatives: vec![],
            consequences: vec![],
            refs: StdHashSet::new(),
            created_at: chrono::Utc::now(),
            supersedes: None,
        };
        assembler.storage.decision_insert(&decision).unwrap();
        let mut req = base_request(tenant, session);
        req.max_tokens = Some(10);
        let acb = assembler.build_acb(&req).unwrap();
        assert!(acb.omissions.iter().any(|o| o.section == AcbSection::Decisions && o.reason == OmissionReason::Budget));
    }

    #[test]
    fn task_state_prioritizes_doing_over_backlog() {
        let (assembler, tenant, session) = assembler();
        let backlog = memoria_core::Task {
            id: TaskId::now_v7(),
            tenant,
            status: TaskStatus::Backlog,
            title: "someday".to_string(),
            details: None,
            refs: StdHashSet::new(),
            priority: 0,
            blocked_by: StdHashSet::new(),
            start_date: None,
            due_date: None,
            estimate: None,
            progress: None,
            assignee: None,
            project: Some("proj-a".to_string()),
        };
        let doing = memoria_core::Task { id: TaskId::now_v7(), status: TaskStatus::Doing, title: "in flight".to_string(), ..backlog.clone() };
        assembler.storage.task_insert(&backlog).unwrap();
        assembler.storage.task_insert(&doing).unwrap();
        let mut req = base_request(tenant, session);
        req.project_id = Some("proj-a".to_string());
        let acb = assembler.build_acb(&req).unwrap();
        let tasks = acb.section(AcbSection::TaskState).unwrap();
        assert_eq!(tasks.items[0].ref_id, doing.id.to_string());
    }
}
