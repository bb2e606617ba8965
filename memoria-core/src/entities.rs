//! Entity types for the memoria data model (§3 Data Model).
//!
//! Pure data structures with no storage or business logic; `memoria-storage`
//! and the component crates operate on these types but do not extend them.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::{
    ActorType, CapsuleId, CapsuleStatus, Channel, ChunkId, DecisionId, DecisionStatus, EditOp,
    EditStatus, EditTargetType, EventId, EventKind, GraphEdgeType, MemoryEditId, ProposedBy,
    Scope, Sensitivity, SessionId, TaskId, TaskStatus, TenantId, Timestamp,
};

/// Who or what produced an [`Event`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Actor {
    pub actor_type: ActorType,
    pub id: String,
}

/// Append-only ground truth record (§3 Event, §4.C Recorder).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub tenant: TenantId,
    pub session: SessionId,
    pub channel: Channel,
    pub actor: Actor,
    pub kind: EventKind,
    pub sensitivity: Sensitivity,
    pub tags: HashSet<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub content: serde_json::Value,
    pub refs: HashSet<String>,
    pub scope: Scope,
    pub subject_type: Option<String>,
    pub subject_id: Option<String>,
    pub project_id: Option<String>,
}

/// A retrieval unit derived from exactly one source [`Event`] (§3 Chunk).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Chunk {
    pub id: ChunkId,
    pub tenant: TenantId,
    pub source_event: EventId,
    pub timestamp: Timestamp,
    pub kind: EventKind,
    pub channel: Channel,
    pub sensitivity: Sensitivity,
    pub tags: HashSet<String>,
    /// Computed once at insert per the fixed token-estimate heuristic (§4.C); trusted thereafter.
    pub token_estimate: u32,
    pub importance: f32,
    pub text: String,
    pub scope: Scope,
    pub subject_type: Option<String>,
    pub subject_id: Option<String>,
    pub project_id: Option<String>,
    /// Caller-supplied embedding vector, if any (§4.G hybrid retrieval, §10 `VectorIndex`).
    pub embedding: Option<Vec<f32>>,
}

/// Operation-specific patch payload for a [`MemoryEdit`] (§3 patch shapes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EditPatch {
    Retract,
    Amend {
        text: Option<String>,
        importance: Option<f32>,
    },
    Attenuate {
        importance: Option<f32>,
        importance_delta: Option<f32>,
    },
    Quarantine,
    Block {
        channel: Channel,
    },
}

impl EditPatch {
    pub fn op(&self) -> EditOp {
        match self {
            EditPatch::Retract => EditOp::Retract,
            EditPatch::Amend { .. } => EditOp::Amend,
            EditPatch::Attenuate { .. } => EditOp::Attenuate,
            EditPatch::Quarantine => EditOp::Quarantine,
            EditPatch::Block { .. } => EditOp::Block,
        }
    }

    /// Enforce the "at least one field present" / "required field present"
    /// shape rules from §3 before a [`MemoryEdit`] is accepted.
    pub fn is_well_formed(&self) -> bool {
        match self {
            EditPatch::Retract | EditPatch::Quarantine | EditPatch::Block { .. } => true,
            EditPatch::Amend { text, importance } => text.is_some() || importance.is_some(),
            EditPatch::Attenuate { importance, importance_delta } => {
                importance.is_some() || importance_delta.is_some()
            }
        }
    }
}

/// A memory-surgery edit proposal/decision against a chunk, event, or decision (§3, §4.E).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct MemoryEdit {
    pub id: MemoryEditId,
    pub tenant: TenantId,
    pub target_type: EditTargetType,
    pub target_id: String,
    pub op: EditOp,
    pub reason: String,
    pub proposed_by: ProposedBy,
    pub status: EditStatus,
    pub created_at: Timestamp,
    pub applied_at: Option<Timestamp>,
    pub patch: EditPatch,
}

/// The set of items a [`Capsule`] carries for agent-to-agent transfer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CapsuleItems {
    pub chunks: Vec<ChunkId>,
    pub decisions: Vec<DecisionId>,
    pub artifacts: Vec<String>,
}

/// A bounded, revocable bundle of memory handed from one agent to another (§3, §4.F).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Capsule {
    pub id: CapsuleId,
    pub tenant: TenantId,
    pub scope: Scope,
    pub subject_type: Option<String>,
    pub subject_id: Option<String>,
    pub author_agent_id: String,
    pub audience_agent_ids: HashSet<String>,
    pub items: CapsuleItems,
    pub risks: Vec<String>,
    pub ttl_days: u32,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    pub status: CapsuleStatus,
    pub revoked_at: Option<Timestamp>,
}

/// A recorded decision, possibly superseding an earlier one (§3, state machine in §4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Decision {
    pub id: DecisionId,
    pub tenant: TenantId,
    pub status: DecisionStatus,
    pub scope: Scope,
    pub text: String,
    pub rationale: Option<String>,
    pub constraints: Vec<String>,
    pub alternatives: Vec<String>,
    pub consequences: Vec<String>,
    pub refs: HashSet<String>,
    pub created_at: Timestamp,
    pub supersedes: Option<DecisionId>,
}

/// A unit of tracked work (§3 Task).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Task {
    pub id: TaskId,
    pub tenant: TenantId,
    pub status: TaskStatus,
    pub title: String,
    pub details: Option<String>,
    pub refs: HashSet<String>,
    pub priority: i32,
    pub blocked_by: HashSet<TaskId>,
    pub start_date: Option<Timestamp>,
    pub due_date: Option<Timestamp>,
    pub estimate: Option<f32>,
    pub progress: Option<f32>,
    pub assignee: Option<String>,
    pub project: Option<String>,
}

/// Kind of an addressable graph node (§3 Node / Edge); the node itself is
/// just the referenced entity's own id, so there is no separate Node row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct NodeRef {
    pub kind: crate::NodeKind,
    pub id: String,
}

/// A typed relationship between two graph nodes (§3, §4.J).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Edge {
    pub id: crate::EdgeId,
    pub tenant: TenantId,
    pub from: NodeRef,
    pub to: NodeRef,
    pub edge_type: GraphEdgeType,
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub properties: serde_json::Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Overflow payload for content too large to inline into a chunk (§4.C).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Artifact {
    pub id: crate::ArtifactId,
    pub tenant: TenantId,
    pub source_event: EventId,
    pub content_type: String,
    pub bytes: Vec<u8>,
    pub created_at: Timestamp,
}

/// A synthesized, stratified-layer memory item produced by Consolidation (§4.L).
/// Written as an ordinary `knowledge_note`-kind [`Event`]; this struct is the
/// decoded view of that event's content payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct KnowledgeNote {
    pub id: crate::KnowledgeNoteId,
    pub tenant: TenantId,
    pub layer: ConsolidationLayer,
    pub text: String,
    pub source_chunk_ids: Vec<ChunkId>,
    pub window_start: Timestamp,
    pub window_end: Timestamp,
    pub created_at: Timestamp,
}

/// Stratified layer a [`KnowledgeNote`] belongs to (§4.L).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum ConsolidationLayer {
    Identity,
    Reflection,
    Recent,
}
