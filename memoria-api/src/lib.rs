//! memoria-api — the Recorder (§4.C) and the in-process `ToolRegistry` that
//! exposes every primary tool in §6 over one synchronous call boundary.
//!
//! `MemoriaApi::new` wires every component crate's service over one shared
//! [`Storage`] and registers each §6 tool as one dispatch entry. A
//! transport (HTTP, JSON-RPC) wraps `ToolRegistry::call`/`manifest`; none is
//! built here, matching the spec's explicit non-goal.

mod recorder;
mod registry;

pub use recorder::{Recorder, RecordEventOutcome, RecordEventRequest};
pub use registry::{ToolCategory, ToolDescriptor, ToolRegistry};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use memoria_capsules::CapsuleService;
use memoria_context::{Assembler, BuildAcbRequest, StickyStore};
use memoria_core::{
    Actor, CapsuleItems, Channel, DecisionStatus, EditOp, EditPatch, EditTargetType,
    EntityIdType, EventId, GraphEdgeType, EdgeDirection, EdgeId, HealthCheck, MemoriaConfig,
    MemoriaError, MemoriaResult, MemoryEditId, NodeKind, NodeRef, ProposedBy, Scope, Sensitivity,
    TaskId, TaskStatus, TenantId, ValidationError,
};
use memoria_graph::Graph;
use memoria_memory::MemorySurgery;
use memoria_retrieval::{Retrieval, RetrievalQuery};
use memoria_storage::Storage;
use serde_json::{json, Value};

fn required_str(value: &Value, field: &str) -> MemoriaResult<String> {
    value
        .get(field)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| ValidationError::RequiredFieldMissing { field: field.to_string() }.into())
}

fn required_id<T: EntityIdType + std::str::FromStr>(value: &Value, field: &str) -> MemoriaResult<T> {
    let raw = required_str(value, field)?;
    raw.parse::<T>().map_err(|_| ValidationError::InvalidValue { field: field.to_string(), reason: "not a valid id".to_string() }.into())
}

fn optional_str(value: &Value, field: &str) -> Option<String> {
    value.get(field).and_then(|v| v.as_str()).map(str::to_string)
}

fn string_set(value: &Value, field: &str) -> HashSet<String> {
    value
        .get(field)
        .and_then(|v| v.as_array())
        .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

/// Wires every component service over one shared [`Storage`] and exposes a
/// `ToolRegistry` implementing every primary tool in §6.
pub struct MemoriaApi {
    pub storage: Arc<dyn Storage>,
    pub config: MemoriaConfig,
    pub recorder: Arc<Recorder>,
    pub assembler: Arc<Assembler>,
    pub surgery: Arc<MemorySurgery>,
    pub capsules: Arc<CapsuleService>,
    pub graph: Arc<Graph>,
    pub retrieval: Arc<Retrieval>,
    pub sticky: Arc<StickyStore>,
}

impl MemoriaApi {
    pub fn new(storage: Arc<dyn Storage>, config: MemoriaConfig) -> Self {
        let sticky = Arc::new(StickyStore::new());
        Self {
            recorder: Arc::new(Recorder::new(storage.clone(), config.clone())),
            assembler: Arc::new(Assembler::new(storage.clone(), sticky.clone(), config.clone())),
            surgery: Arc::new(MemorySurgery::new(storage.clone())),
            capsules: Arc::new(CapsuleService::new(storage.clone())),
            graph: Arc::new(Graph::new(storage.clone(), config.graph)),
            retrieval: Arc::new(Retrieval::new(storage.clone())),
            sticky,
            storage,
            config,
        }
    }

    /// Build a [`ToolRegistry`] with every §6 primary tool registered
    /// against this instance's services.
    pub fn tool_registry(self: &Arc<Self>) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        register_event_tools(&mut registry, self.clone());
        register_acb_tools(&mut registry, self.clone());
        register_capsule_tools(&mut registry, self.clone());
        register_edit_tools(&mut registry, self.clone());
        register_graph_tools(&mut registry, self.clone());
        register_task_tools(&mut registry, self.clone());
        registry
    }

    /// Liveness/readiness check for the daemon: storage is reachable when a
    /// cheap read against it does not error.
    pub fn health_check(&self) -> HealthCheck {
        match self.storage.decision_list(TenantId::nil(), None, None) {
            Ok(_) => HealthCheck::healthy("memoria"),
            Err(e) => HealthCheck::unhealthy("memoria", e.to_string()),
        }
    }
}

fn register_event_tools(registry: &mut ToolRegistry, api: Arc<MemoriaApi>) {
    {
        let api = api.clone();
        registry.register(
            ToolDescriptor {
                name: "record_event",
                category: ToolCategory::Event,
                description: "Record one event through the Recorder: validate, redact, persist, derive chunks and any decision/task upsert.",
                input_schema: json!({"type": "object", "required": ["tenant_id", "session_id", "channel", "actor", "kind", "content"]}),
            },
            move |input| {
                let tenant: TenantId = required_id(&input, "tenant_id")?;
                let session = required_id(&input, "session_id")?;
                let channel: Channel = required_str(&input, "channel")?.parse().map_err(|_| MemoriaError::InvalidInput("channel".to_string()))?;
                let actor_type = required_str(&input, "actor")?;
                let actor = Actor {
                    actor_type: actor_type.parse().map_err(|_| MemoriaError::InvalidInput("actor.actor_type".to_string()))?,
                    id: required_str(&input, "actor_id")?,
                };
                let kind = required_str(&input, "kind")?.parse().map_err(|_| MemoriaError::InvalidInput("kind".to_string()))?;
                let content = input.get("content").cloned().unwrap_or(Value::Null);
                let tags = string_set(&input, "tags");
                let refs = string_set(&input, "refs");
                let scope: Option<Scope> = optional_str(&input, "scope").and_then(|s| s.parse().ok());
                let req = RecordEventRequest {
                    tenant,
                    session,
                    channel,
                    actor,
                    kind,
                    content,
                    tags,
                    refs,
                    scope,
                    subject_type: optional_str(&input, "subject_type"),
                    subject_id: optional_str(&input, "subject_id"),
                    project_id: optional_str(&input, "project_id"),
                };
                let outcome = api.recorder.record_event(req)?;
                Ok(json!({
                    "event_id": outcome.event_id.to_string(),
                    "chunk_ids": outcome.chunk_ids.iter().map(|c| c.to_string()).collect::<Vec<_>>(),
                    "artifact_id": outcome.artifact_id.map(|a| a.to_string()),
                    "redacted": outcome.redacted,
                }))
            },
        );
    }

    {
        let api = api.clone();
        registry.register(
            ToolDescriptor {
                name: "get_event",
                category: ToolCategory::Event,
                description: "Fetch one event by id, tenant-scoped.",
                input_schema: json!({"type": "object", "required": ["tenant_id", "event_id"]}),
            },
            move |input| {
                let tenant: TenantId = required_id(&input, "tenant_id")?;
                let event_id: EventId = required_id(&input, "event_id")?;
                let event = api
                    .storage
                    .event_get(tenant, event_id)?
                    .ok_or_else(|| MemoriaError::NotFound(format!("event {event_id}")))?;
                serde_json::to_value(&event).map_err(|e| MemoriaError::Internal(e.to_string()))
            },
        );
    }

    {
        let api = api.clone();
        registry.register(
            ToolDescriptor {
                name: "search_chunks",
                category: ToolCategory::Event,
                description: "Paginated hybrid lexical/vector chunk search via Retrieval.",
                input_schema: json!({"type": "object", "required": ["tenant_id", "query_text"]}),
            },
            move |input| {
                let tenant: TenantId = required_id(&input, "tenant_id")?;
                let query_text = required_str(&input, "query_text")?;
                let caller_channel: Channel = optional_str(&input, "channel").and_then(|s| s.parse().ok()).unwrap_or(Channel::Private);
                let allowed_sensitivities: HashSet<Sensitivity> = input
                    .get("allowed_sensitivities")
                    .and_then(|v| v.as_array())
                    .map(|items| items.iter().filter_map(|v| v.as_str().and_then(|s| s.parse().ok())).collect())
                    .unwrap_or_else(|| [Sensitivity::None, Sensitivity::Low].into_iter().collect());
                let retrieval_cfg = api.config.retrieval;
                let query = RetrievalQuery {
                    tenant,
                    query_text,
                    query_embedding: None,
                    caller_channel,
                    allowed_sensitivities,
                    scope: optional_str(&input, "scope").and_then(|s| s.parse().ok()),
                    subject_type: optional_str(&input, "subject_type"),
                    subject_id: optional_str(&input, "subject_id"),
                    project_id: optional_str(&input, "project_id"),
                    candidate_pool_max: retrieval_cfg.candidate_pool_max as usize,
                    retrieved_chunks_max: input.get("limit").and_then(|v| v.as_u64()).map(|n| n as usize).unwrap_or(retrieval_cfg.retrieved_chunks_max as usize),
                    recency_half_life_secs: retrieval_cfg.recency_half_life_secs as i64,
                    alpha: retrieval_cfg.alpha,
                    beta: retrieval_cfg.beta,
                    gamma: retrieval_cfg.gamma,
                };
                let result = api.retrieval.retrieve(&query)?;
                Ok(json!({
                    "candidate_pool_size": result.candidate_pool_size,
                    "chunks": result.chunks.iter().map(|sc| json!({"chunk": sc.chunk, "score": sc.score})).collect::<Vec<_>>(),
                }))
            },
        );
    }

    {
        let api = api.clone();
        registry.register(
            ToolDescriptor {
                name: "get_chunk_timeline",
                category: ToolCategory::Event,
                description: "Events in the same session temporally near a chunk, within an optional window.",
                input_schema: json!({"type": "object", "required": ["tenant_id", "chunk_id"]}),
            },
            move |input| {
                let tenant: TenantId = required_id(&input, "tenant_id")?;
                let chunk_id = required_id(&input, "chunk_id")?;
                let window_seconds = input.get("window_seconds").and_then(|v| v.as_i64()).unwrap_or(3600);

                let chunk = api.storage.chunk_get(tenant, chunk_id)?.ok_or_else(|| MemoriaError::NotFound(format!("chunk {chunk_id}")))?;
                let source_event = api
                    .storage
                    .event_get(tenant, chunk.source_event)?
                    .ok_or_else(|| MemoriaError::NotFound(format!("event {}", chunk.source_event)))?;

                let window = chrono::Duration::seconds(window_seconds);
                let events = api.storage.event_list_by_session(tenant, source_event.session, 10_000)?;
                let nearby: Vec<_> = events
                    .into_iter()
                    .filter(|e| (e.timestamp - chunk.timestamp).abs() <= window)
                    .collect();
                serde_json::to_value(&nearby).map_err(|e| MemoriaError::Internal(e.to_string()))
            },
        );
    }

    registry.register(
        ToolDescriptor {
            name: "query_decisions",
            category: ToolCategory::Event,
            description: "Tenant-scoped decisions, optionally filtered by status and scope.",
            input_schema: json!({"type": "object", "required": ["tenant_id"]}),
        },
        move |input| {
            let tenant: TenantId = required_id(&input, "tenant_id")?;
            let status: Option<DecisionStatus> = optional_str(&input, "status").and_then(|s| s.parse().ok());
            let scope: Option<Scope> = optional_str(&input, "scope").and_then(|s| s.parse().ok());
            let decisions = api.storage.decision_list(tenant, status, scope)?;
            serde_json::to_value(&decisions).map_err(|e| MemoriaError::Internal(e.to_string()))
        },
    );
}

fn register_acb_tools(registry: &mut ToolRegistry, api: Arc<MemoriaApi>) {
    registry.register(
        ToolDescriptor {
            name: "build_acb",
            category: ToolCategory::Acb,
            description: "Assemble a mode-aware, token-budgeted Active Context Bundle.",
            input_schema: json!({"type": "object", "required": ["tenant_id", "session_id", "agent_id", "channel", "intent", "query_text"]}),
        },
        move |input| {
            let allowed_sensitivities: HashSet<Sensitivity> = input
                .get("allowed_sensitivities")
                .and_then(|v| v.as_array())
                .map(|items| items.iter().filter_map(|v| v.as_str().and_then(|s| s.parse().ok())).collect())
                .unwrap_or_else(|| [Sensitivity::None, Sensitivity::Low].into_iter().collect());
            let req = BuildAcbRequest {
                tenant: required_id(&input, "tenant_id")?,
                session: required_id(&input, "session_id")?,
                agent: required_id(&input, "agent_id")?,
                channel: required_str(&input, "channel")?.parse().map_err(|_| MemoriaError::InvalidInput("channel".to_string()))?,
                intent: required_str(&input, "intent")?,
                query_text: required_str(&input, "query_text")?,
                max_tokens: input.get("max_tokens").and_then(|v| v.as_u64()).map(|n| n as u32),
                include_capsules: input.get("include_capsules").and_then(|v| v.as_bool()).unwrap_or(true),
                allowed_sensitivities,
                project_id: optional_str(&input, "project_id"),
            };
            let acb = api.assembler.build_acb(&req)?;
            serde_json::to_value(&AcbView::from(acb)).map_err(|e| MemoriaError::Internal(e.to_string()))
        },
    );
}

/// Serializable view of [`memoria_context::Acb`] matching the §6 response
/// shape (`acb_id`, `budget_tokens`, `token_used_est`, named sections).
#[derive(serde::Serialize)]
struct AcbView {
    acb_id: String,
    mode: String,
    mode_confidence: f32,
    budget_tokens: u32,
    token_used_est: u32,
    sections: Vec<AcbSectionView>,
    omissions: Vec<memoria_context::Omission>,
    provenance: memoria_context::Provenance,
}

#[derive(serde::Serialize)]
struct AcbSectionView {
    name: String,
    items: Vec<memoria_context::AcbItem>,
    token_est: u32,
}

impl From<memoria_context::Acb> for AcbView {
    fn from(acb: memoria_context::Acb) -> Self {
        use memoria_core::EntityIdType;
        let budget_tokens = acb.sections.iter().map(|s| s.budget_tokens).sum();
        AcbView {
            acb_id: acb.id.to_string(),
            mode: acb.mode.to_string(),
            mode_confidence: acb.provenance.mode_confidence,
            budget_tokens,
            token_used_est: acb.provenance.total_tokens_used,
            sections: acb
                .sections
                .into_iter()
                .map(|s| AcbSectionView { name: s.section.to_string(), items: s.items, token_est: s.tokens_used })
                .collect(),
            omissions: acb.omissions,
            provenance: acb.provenance,
        }
    }
}

fn register_capsule_tools(registry: &mut ToolRegistry, api: Arc<MemoriaApi>) {
    {
        let api = api.clone();
        registry.register(
            ToolDescriptor {
                name: "create_capsule",
                category: ToolCategory::Capsule,
                description: "Create a bounded, revocable memory bundle for agent-to-agent transfer.",
                input_schema: json!({"type": "object", "required": ["tenant_id", "author_agent_id", "scope", "audience_agent_ids"]}),
            },
            move |input| {
                let tenant: TenantId = required_id(&input, "tenant_id")?;
                let author_agent_id = required_str(&input, "author_agent_id")?;
                let scope: Scope = required_str(&input, "scope")?.parse().map_err(|_| MemoriaError::InvalidInput("scope".to_string()))?;
                let audience_agent_ids = string_set(&input, "audience_agent_ids");
                let items = CapsuleItems {
                    chunks: input.get("chunk_ids").and_then(|v| v.as_array()).map(|a| a.iter().filter_map(|v| v.as_str().and_then(|s| s.parse().ok())).collect()).unwrap_or_default(),
                    decisions: input.get("decision_ids").and_then(|v| v.as_array()).map(|a| a.iter().filter_map(|v| v.as_str().and_then(|s| s.parse().ok())).collect()).unwrap_or_default(),
                    artifacts: input.get("artifact_ids").and_then(|v| v.as_array()).map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect()).unwrap_or_default(),
                };
                let risks: Vec<String> = input.get("risks").and_then(|v| v.as_array()).map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect()).unwrap_or_default();
                let ttl_days = input.get("ttl_days").and_then(|v| v.as_u64()).map(|n| n as u32).unwrap_or(api.config.capsules.default_ttl_days);
                let id = api.capsules.create_capsule(tenant, author_agent_id, scope, optional_str(&input, "subject_type"), optional_str(&input, "subject_id"), audience_agent_ids, items, risks, ttl_days)?;
                Ok(json!({"capsule_id": id.to_string()}))
            },
        );
    }
    {
        let api = api.clone();
        registry.register(
            ToolDescriptor {
                name: "list_capsules",
                category: ToolCategory::Capsule,
                description: "Active, unexpired capsules where the calling agent is in the audience.",
                input_schema: json!({"type": "object", "required": ["tenant_id", "agent_id"]}),
            },
            move |input| {
                let tenant: TenantId = required_id(&input, "tenant_id")?;
                let agent_id = required_str(&input, "agent_id")?;
                let capsules = api.capsules.list_capsules(tenant, &agent_id)?;
                serde_json::to_value(&capsules).map_err(|e| MemoriaError::Internal(e.to_string()))
            },
        );
    }
    {
        let api = api.clone();
        registry.register(
            ToolDescriptor {
                name: "get_capsule",
                category: ToolCategory::Capsule,
                description: "Fetch one capsule by id; revoked/expired/non-audience reads return not-found.",
                input_schema: json!({"type": "object", "required": ["tenant_id", "capsule_id", "agent_id"]}),
            },
            move |input| {
                let tenant: TenantId = required_id(&input, "tenant_id")?;
                let capsule_id = required_id(&input, "capsule_id")?;
                let agent_id = required_str(&input, "agent_id")?;
                let capsule = api
                    .capsules
                    .get_capsule(tenant, capsule_id, &agent_id)?
                    .ok_or_else(|| MemoriaError::NotFound(format!("capsule {capsule_id}")))?;
                serde_json::to_value(&capsule).map_err(|e| MemoriaError::Internal(e.to_string()))
            },
        );
    }
    registry.register(
        ToolDescriptor {
            name: "revoke_capsule",
            category: ToolCategory::Capsule,
            description: "Revoke a capsule, making it unreachable to any audience agent.",
            input_schema: json!({"type": "object", "required": ["tenant_id", "capsule_id"]}),
        },
        move |input| {
            let tenant: TenantId = required_id(&input, "tenant_id")?;
            let capsule_id = required_id(&input, "capsule_id")?;
            api.capsules.revoke_capsule(tenant, capsule_id)?;
            Ok(json!({"ok": true}))
        },
    );
}

fn register_edit_tools(registry: &mut ToolRegistry, api: Arc<MemoriaApi>) {
    {
        let api = api.clone();
        registry.register(
            ToolDescriptor {
                name: "create_edit",
                category: ToolCategory::Edit,
                description: "Propose (and optionally auto-approve) a memory surgery edit against a chunk, event, or decision.",
                input_schema: json!({"type": "object", "required": ["tenant_id", "target_type", "target_id", "op", "reason", "proposed_by"]}),
            },
            move |input| {
                let tenant: TenantId = required_id(&input, "tenant_id")?;
                let target_type: EditTargetType = required_str(&input, "target_type")?.parse().map_err(|_| MemoriaError::InvalidInput("target_type".to_string()))?;
                let target_id = required_str(&input, "target_id")?;
                let reason = required_str(&input, "reason")?;
                let proposed_by: ProposedBy = required_str(&input, "proposed_by")?.parse().map_err(|_| MemoriaError::InvalidInput("proposed_by".to_string()))?;
                let op: EditOp = required_str(&input, "op")?.parse().map_err(|_| MemoriaError::InvalidInput("op".to_string()))?;
                let patch = patch_from_op(op, &input)?;
                let auto_approve = input.get("auto_approve").and_then(|v| v.as_bool()).unwrap_or(false);
                let id = api.surgery.create_edit(tenant, target_type, target_id, reason, proposed_by, patch, auto_approve)?;
                Ok(json!({"edit_id": id.to_string()}))
            },
        );
    }
    {
        let api = api.clone();
        registry.register(
            ToolDescriptor {
                name: "list_edits",
                category: ToolCategory::Edit,
                description: "Every edit (any status) proposed against one target.",
                input_schema: json!({"type": "object", "required": ["tenant_id", "target_id"]}),
            },
            move |input| {
                let tenant: TenantId = required_id(&input, "tenant_id")?;
                let target_id = required_str(&input, "target_id")?;
                let edits = api.surgery.list_edits(tenant, &target_id)?;
                serde_json::to_value(&edits).map_err(|e| MemoriaError::Internal(e.to_string()))
            },
        );
    }
    {
        let api = api.clone();
        registry.register(
            ToolDescriptor {
                name: "get_edit",
                category: ToolCategory::Edit,
                description: "Fetch one edit by id.",
                input_schema: json!({"type": "object", "required": ["tenant_id", "edit_id"]}),
            },
            move |input| {
                let tenant: TenantId = required_id(&input, "tenant_id")?;
                let edit_id: MemoryEditId = required_id(&input, "edit_id")?;
                let edit = api.surgery.get_edit(tenant, edit_id)?;
                serde_json::to_value(&edit).map_err(|e| MemoriaError::Internal(e.to_string()))
            },
        );
    }
    {
        let api = api.clone();
        registry.register(
            ToolDescriptor {
                name: "approve_edit",
                category: ToolCategory::Edit,
                description: "Approve a pending edit.",
                input_schema: json!({"type": "object", "required": ["tenant_id", "edit_id"]}),
            },
            move |input| {
                let tenant: TenantId = required_id(&input, "tenant_id")?;
                let edit_id: MemoryEditId = required_id(&input, "edit_id")?;
                api.surgery.approve_edit(tenant, edit_id)?;
                Ok(json!({"ok": true}))
            },
        );
    }
    registry.register(
        ToolDescriptor {
            name: "reject_edit",
            category: ToolCategory::Edit,
            description: "Reject a pending edit.",
            input_schema: json!({"type": "object", "required": ["tenant_id", "edit_id"]}),
        },
        move |input| {
            let tenant: TenantId = required_id(&input, "tenant_id")?;
            let edit_id: MemoryEditId = required_id(&input, "edit_id")?;
            api.surgery.reject_edit(tenant, edit_id)?;
            Ok(json!({"ok": true}))
        },
    );
}

fn patch_from_op(op: EditOp, input: &Value) -> MemoriaResult<EditPatch> {
    let patch = input.get("patch").cloned().unwrap_or(Value::Null);
    Ok(match op {
        EditOp::Retract => EditPatch::Retract,
        EditOp::Quarantine => EditPatch::Quarantine,
        EditOp::Amend => EditPatch::Amend {
            text: patch.get("text").and_then(|v| v.as_str()).map(str::to_string),
            importance: patch.get("importance").and_then(|v| v.as_f64()).map(|v| v as f32),
        },
        EditOp::Attenuate => EditPatch::Attenuate {
            importance: patch.get("importance").and_then(|v| v.as_f64()).map(|v| v as f32),
            importance_delta: patch.get("importance_delta").and_then(|v| v.as_f64()).map(|v| v as f32),
        },
        EditOp::Block => EditPatch::Block {
            channel: patch
                .get("channel")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ValidationError::RequiredFieldMissing { field: "patch.channel".to_string() })?
                .parse()
                .map_err(|_| MemoriaError::InvalidInput("patch.channel".to_string()))?,
        },
    })
}

fn node_ref_from(input: &Value, field: &str) -> MemoriaResult<NodeRef> {
    let node = input.get(field).ok_or_else(|| ValidationError::RequiredFieldMissing { field: field.to_string() })?;
    let kind: NodeKind = node
        .get("kind")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ValidationError::RequiredFieldMissing { field: format!("{field}.kind") })?
        .parse()
        .map_err(|_| MemoriaError::InvalidInput(format!("{field}.kind")))?;
    let id = node
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ValidationError::RequiredFieldMissing { field: format!("{field}.id") })?
        .to_string();
    Ok(NodeRef { kind, id })
}

fn register_graph_tools(registry: &mut ToolRegistry, api: Arc<MemoriaApi>) {
    {
        let api = api.clone();
        registry.register(
            ToolDescriptor {
                name: "create_edge",
                category: ToolCategory::Graph,
                description: "Create a typed edge between two graph nodes; rejects a depends_on edge that would close a cycle.",
                input_schema: json!({"type": "object", "required": ["tenant_id", "from", "to", "edge_type"]}),
            },
            move |input| {
                let tenant: TenantId = required_id(&input, "tenant_id")?;
                let from = node_ref_from(&input, "from")?;
                let to = node_ref_from(&input, "to")?;
                let edge_type: GraphEdgeType = required_str(&input, "edge_type")?.parse().map_err(|_| MemoriaError::InvalidInput("edge_type".to_string()))?;
                let properties = input.get("properties").cloned().unwrap_or_else(|| json!({}));
                let id = api.graph.create_edge(tenant, from, to, edge_type, properties)?;
                Ok(json!({"edge_id": id.to_string()}))
            },
        );
    }
    {
        let api = api.clone();
        registry.register(
            ToolDescriptor {
                name: "get_edges",
                category: ToolCategory::Graph,
                description: "Edges touching a node in a direction, optionally filtered by edge type.",
                input_schema: json!({"type": "object", "required": ["tenant_id", "node", "direction"]}),
            },
            move |input| {
                let tenant: TenantId = required_id(&input, "tenant_id")?;
                let node = node_ref_from(&input, "node")?;
                let direction: EdgeDirection = required_str(&input, "direction")?.parse().map_err(|_| MemoriaError::InvalidInput("direction".to_string()))?;
                let edge_type: Option<GraphEdgeType> = optional_str(&input, "edge_type").and_then(|s| s.parse().ok());
                let edges = api.graph.get_edges(tenant, &node, direction, edge_type)?;
                serde_json::to_value(&edges).map_err(|e| MemoriaError::Internal(e.to_string()))
            },
        );
    }
    {
        let api = api.clone();
        registry.register(
            ToolDescriptor {
                name: "traverse",
                category: ToolCategory::Graph,
                description: "Breadth-first walk outward from a root node, depth-capped, visiting each node once.",
                input_schema: json!({"type": "object", "required": ["tenant_id", "root", "direction"]}),
            },
            move |input| {
                let tenant: TenantId = required_id(&input, "tenant_id")?;
                let root = node_ref_from(&input, "root")?;
                let direction: EdgeDirection = required_str(&input, "direction")?.parse().map_err(|_| MemoriaError::InvalidInput("direction".to_string()))?;
                let edge_type: Option<GraphEdgeType> = optional_str(&input, "edge_type").and_then(|s| s.parse().ok());
                let max_depth = input.get("max_depth").and_then(|v| v.as_u64()).map(|n| n as u32);
                let steps = api.graph.traverse(tenant, &root, direction, edge_type, max_depth)?;
                serde_json::to_value(&steps).map_err(|e| MemoriaError::Internal(e.to_string()))
            },
        );
    }
    {
        let api = api.clone();
        registry.register(
            ToolDescriptor {
                name: "update_edge_properties",
                category: ToolCategory::Graph,
                description: "Shallow-merge into one edge's properties; endpoints and type are immutable.",
                input_schema: json!({"type": "object", "required": ["tenant_id", "edge_id", "properties"]}),
            },
            move |input| {
                let tenant: TenantId = required_id(&input, "tenant_id")?;
                let edge_id: EdgeId = required_id(&input, "edge_id")?;
                let properties = input.get("properties").cloned().unwrap_or_else(|| json!({}));
                api.graph.update_edge_properties(tenant, edge_id, properties)?;
                Ok(json!({"ok": true}))
            },
        );
    }
    {
        let api = api.clone();
        registry.register(
            ToolDescriptor {
                name: "delete_edge",
                category: ToolCategory::Graph,
                description: "Delete one edge by id.",
                input_schema: json!({"type": "object", "required": ["tenant_id", "edge_id"]}),
            },
            move |input| {
                let tenant: TenantId = required_id(&input, "tenant_id")?;
                let edge_id: EdgeId = required_id(&input, "edge_id")?;
                api.graph.delete_edge(tenant, edge_id)?;
                Ok(json!({"ok": true}))
            },
        );
    }
    registry.register(
        ToolDescriptor {
            name: "get_project_tasks",
            category: ToolCategory::Graph,
            description: "Tasks reachable one hop from a project node via parent_of edges.",
            input_schema: json!({"type": "object", "required": ["tenant_id", "project_node"]}),
        },
        move |input| {
            let tenant: TenantId = required_id(&input, "tenant_id")?;
            let project_node = node_ref_from(&input, "project_node")?;
            let tasks = api.graph.get_project_tasks(tenant, &project_node)?;
            serde_json::to_value(&tasks).map_err(|e| MemoriaError::Internal(e.to_string()))
        },
    );
}

fn register_task_tools(registry: &mut ToolRegistry, api: Arc<MemoriaApi>) {
    {
        let api = api.clone();
        registry.register(
            ToolDescriptor {
                name: "create_task",
                category: ToolCategory::Task,
                description: "Create a new task.",
                input_schema: json!({"type": "object", "required": ["tenant_id", "title"]}),
            },
            move |input| {
                let tenant: TenantId = required_id(&input, "tenant_id")?;
                let title = required_str(&input, "title")?;
                let status: TaskStatus = optional_str(&input, "status").and_then(|s| s.parse().ok()).unwrap_or(TaskStatus::Backlog);
                let task = memoria_core::Task {
                    id: TaskId::now_v7(),
                    tenant,
                    status,
                    title,
                    details: optional_str(&input, "details"),
                    refs: string_set(&input, "refs"),
                    priority: input.get("priority").and_then(|v| v.as_i64()).unwrap_or(0) as i32,
                    blocked_by: HashSet::new(),
                    start_date: None,
                    due_date: None,
                    estimate: None,
                    progress: None,
                    assignee: optional_str(&input, "assignee"),
                    project: optional_str(&input, "project"),
                };
                api.storage.task_insert(&task)?;
                Ok(json!({"task_id": task.id.to_string()}))
            },
        );
    }
    {
        let api = api.clone();
        registry.register(
            ToolDescriptor {
                name: "get_task",
                category: ToolCategory::Task,
                description: "Fetch one task by id.",
                input_schema: json!({"type": "object", "required": ["tenant_id", "task_id"]}),
            },
            move |input| {
                let tenant: TenantId = required_id(&input, "tenant_id")?;
                let task_id: TaskId = required_id(&input, "task_id")?;
                let task = api.storage.task_get(tenant, task_id)?.ok_or_else(|| MemoriaError::NotFound(format!("task {task_id}")))?;
                serde_json::to_value(&task).map_err(|e| MemoriaError::Internal(e.to_string()))
            },
        );
    }
    {
        let api = api.clone();
        registry.register(
            ToolDescriptor {
                name: "update_task",
                category: ToolCategory::Task,
                description: "Update an existing task's mutable fields.",
                input_schema: json!({"type": "object", "required": ["tenant_id", "task_id"]}),
            },
            move |input| {
                let tenant: TenantId = required_id(&input, "tenant_id")?;
                let task_id: TaskId = required_id(&input, "task_id")?;
                let mut task = api.storage.task_get(tenant, task_id)?.ok_or_else(|| MemoriaError::NotFound(format!("task {task_id}")))?;
                if let Some(status) = optional_str(&input, "status").and_then(|s| s.parse().ok()) {
                    task.status = status;
                }
                if let Some(title) = optional_str(&input, "title") {
                    task.title = title;
                }
                if let Some(details) = optional_str(&input, "details") {
                    task.details = Some(details);
                }
                if let Some(priority) = input.get("priority").and_then(|v| v.as_i64()) {
                    task.priority = priority as i32;
                }
                if let Some(progress) = input.get("progress").and_then(|v| v.as_f64()) {
                    task.progress = Some(progress as f32);
                }
                api.storage.task_update(tenant, &task)?;
                Ok(json!({"ok": true}))
            },
        );
    }
    {
        let api = api.clone();
        registry.register(
            ToolDescriptor {
                name: "get_task_dependencies",
                category: ToolCategory::Task,
                description: "Tasks a given task depends on, to a given depth, via depends_on edges.",
                input_schema: json!({"type": "object", "required": ["tenant_id", "task_id"]}),
            },
            move |input| {
                let tenant: TenantId = required_id(&input, "tenant_id")?;
                let task_id: TaskId = required_id(&input, "task_id")?;
                let depth = input.get("depth").and_then(|v| v.as_u64()).map(|n| n as u32);
                let root = NodeRef { kind: NodeKind::Task, id: task_id.to_string() };
                let steps = api.graph.traverse(tenant, &root, EdgeDirection::Out, Some(GraphEdgeType::DependsOn), depth)?;
                serde_json::to_value(&steps).map_err(|e| MemoriaError::Internal(e.to_string()))
            },
        );
    }
    registry.register(
        ToolDescriptor {
            name: "get_project_summary",
            category: ToolCategory::Task,
            description: "Task counts by status for one project.",
            input_schema: json!({"type": "object", "required": ["tenant_id", "project"]}),
        },
        move |input| {
            let tenant: TenantId = required_id(&input, "tenant_id")?;
            let project = required_str(&input, "project")?;
            let tasks = api.storage.task_list_by_project(tenant, &project)?;
            let mut counts: HashMap<&'static str, usize> = HashMap::new();
            for task in &tasks {
                *counts.entry(task.status.as_db_str()).or_insert(0) += 1;
            }
            Ok(json!({"project": project, "total": tasks.len(), "by_status": counts}))
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoria_core::{ActorType, AgentId, SessionId};
    use memoria_storage::MemoryStorage;

    fn api() -> Arc<MemoriaApi> {
        Arc::new(MemoriaApi::new(Arc::new(MemoryStorage::new()), MemoriaConfig::reference()))
    }

    #[test]
    fn manifest_lists_every_primary_tool_category() {
        let api = api();
        let registry = api.tool_registry();
        let manifest = registry.manifest();
        let names: HashSet<&str> = manifest.iter().map(|t| t.name).collect();
        for expected in ["record_event", "build_acb", "get_event", "search_chunks", "create_capsule", "create_edit", "create_edge", "get_project_tasks", "create_task"] {
            assert!(names.contains(expected), "missing tool {expected}");
        }
    }

    #[test]
    fn record_event_tool_roundtrips_through_json() {
        let api = api();
        let registry = api.tool_registry();
        let tenant = TenantId::now_v7();
        let session = SessionId::now_v7();
        let input = json!({
            "tenant_id": tenant.to_string(),
            "session_id": session.to_string(),
            "channel": "private",
            "actor": "human",
            "actor_id": "u1",
            "kind": "message",
            "content": {"text": "hello from the registry"},
        });
        let result = registry.call("record_event", input).unwrap();
        assert!(result.get("event_id").is_some());
    }

    #[test]
    fn build_acb_tool_returns_sections() {
        let api = api();
        let registry = api.tool_registry();
        let tenant = TenantId::now_v7();
        let session = SessionId::now_v7();
        let agent = AgentId::now_v7();
        let input = json!({
            "tenant_id": tenant.to_string(),
            "session_id": session.to_string(),
            "agent_id": agent.to_string(),
            "channel": "private",
            "intent": "",
            "query_text": "what are we doing",
        });
        let result = registry.call("build_acb", input).unwrap();
        assert!(result.get("sections").and_then(|v| v.as_array()).is_some());
    }

    #[test]
    fn get_event_not_found_surfaces_as_not_found() {
        let api = api();
        let registry = api.tool_registry();
        let tenant = TenantId::now_v7();
        let input = json!({"tenant_id": tenant.to_string(), "event_id": EventId::now_v7().to_string()});
        let err = registry.call("get_event", input).unwrap_err();
        assert!(matches!(err, MemoriaError::NotFound(_)));
    }

    #[test]
    fn create_task_then_get_project_summary() {
        let api = api();
        let registry = api.tool_registry();
        let tenant = TenantId::now_v7();
        registry
            .call("create_task", json!({"tenant_id": tenant.to_string(), "title": "ship it", "project": "proj-1", "status": "doing"}))
            .unwrap();
        let summary = registry.call("get_project_summary", json!({"tenant_id": tenant.to_string(), "project": "proj-1"})).unwrap();
        assert_eq!(summary["total"], json!(1));
    }

    #[test]
    fn create_edge_then_traverse() {
        let api = api();
        let registry = api.tool_registry();
        let tenant = TenantId::now_v7();
        let t1 = registry.call("create_task", json!({"tenant_id": tenant.to_string(), "title": "t1"})).unwrap();
        let t2 = registry.call("create_task", json!({"tenant_id": tenant.to_string(), "title": "t2"})).unwrap();
        let from = json!({"kind": "task", "id": t1["task_id"]});
        let to = json!({"kind": "task", "id": t2["task_id"]});
        registry
            .call("create_edge", json!({"tenant_id": tenant.to_string(), "from": from, "to": to, "edge_type": "depends_on"}))
            .unwrap();
        let steps = registry
            .call("traverse", json!({"tenant_id": tenant.to_string(), "root": from, "direction": "out"}))
            .unwrap();
        assert_eq!(steps.as_array().unwrap().len(), 1);
    }

    #[test]
    fn create_edge_against_missing_endpoint_surfaces_as_not_found() {
        let api = api();
        let registry = api.tool_registry();
        let tenant = TenantId::now_v7();
        let t1 = registry.call("create_task", json!({"tenant_id": tenant.to_string(), "title": "t1"})).unwrap();
        let from = json!({"kind": "task", "id": t1["task_id"]});
        let phantom_to = json!({"kind": "task", "id": TaskId::now_v7().to_string()});
        let err = registry
            .call("create_edge", json!({"tenant_id": tenant.to_string(), "from": from, "to": phantom_to, "edge_type": "related_to"}))
            .unwrap_err();
        assert!(matches!(err, MemoriaError::NotFound(_)));
    }

    #[test]
    fn health_check_reports_healthy_over_working_storage() {
        let api = api();
        let check = api.health_check();
        assert_eq!(check.status, memoria_core::HealthStatus::Healthy);
    }

    #[test]
    fn unregistered_tool_name_is_not_found() {
        let api = api();
        let registry = api.tool_registry();
        let err = registry.call("nonexistent_tool", json!({})).unwrap_err();
        assert!(matches!(err, MemoriaError::NotFound(_)));
    }
}
