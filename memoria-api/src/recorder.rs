//! Recorder (§4.C): the single write path for ingesting events.
//!
//! Everything a `record_event` call does — validation, redaction, chunk
//! derivation, decision/task upsert — happens inside one method call, the
//! in-process stand-in for "one transaction" this workspace uses elsewhere
//! for a single-process `Storage` (§4.E's edit lock is the same shape).

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use memoria_core::{
    Actor, ArtifactId, Channel, Chunk, ChunkId, Decision, DecisionId, DecisionStatus, EntityIdType,
    Event, EventId, EventKind, MemoriaConfig, MemoriaError, MemoriaResult, Scope, Sensitivity,
    SessionId, Task, TaskId, TaskStatus, TenantId, ValidationError, estimate_tokens,
};
use memoria_policy::apply_policy;
use memoria_storage::Storage;

/// Importance seeding constants (§4.C), fixed in v1 per the spec's "not
/// configurable" note.
const IMPORTANCE_BASELINE: f32 = 0.5;
const IMPORTANCE_DECISION_BONUS: f32 = 0.2;
const IMPORTANCE_PINNED_TAG_BONUS: f32 = 0.1;
const IMPORTANCE_ENTRYPOINT_SIGNAL_BONUS: f32 = 0.1;

const ENTRYPOINT_SIGNALS: &[&str] = &["readme", "main.rs", "index.ts", "index.js", "__init__.py", "cargo.toml", "package.json"];

/// Maximum number of times `record_event` regenerates the event id and
/// retries after a `Conflict` from storage (§4.C).
const MAX_ID_RETRIES: u32 = 1;

/// Input to one `record_event` call (§4.C contract).
#[derive(Debug, Clone)]
pub struct RecordEventRequest {
    pub tenant: TenantId,
    pub session: SessionId,
    pub channel: Channel,
    pub actor: Actor,
    pub kind: EventKind,
    pub content: serde_json::Value,
    pub tags: HashSet<String>,
    pub refs: HashSet<String>,
    pub scope: Option<Scope>,
    pub subject_type: Option<String>,
    pub subject_id: Option<String>,
    pub project_id: Option<String>,
}

/// Result of one `record_event` call.
#[derive(Debug, Clone)]
pub struct RecordEventOutcome {
    pub event_id: EventId,
    pub chunk_ids: Vec<ChunkId>,
    pub artifact_id: Option<ArtifactId>,
    pub redacted: bool,
}

/// Recorder (§4.C), operating over any [`Storage`] implementation.
pub struct Recorder {
    storage: Arc<dyn Storage>,
    config: MemoriaConfig,
}

impl Recorder {
    pub fn new(storage: Arc<dyn Storage>, config: MemoriaConfig) -> Self {
        Self { storage, config }
    }

    /// `record_event` (§4.C).
    pub fn record_event(&self, req: RecordEventRequest) -> MemoriaResult<RecordEventOutcome> {
        self.validate_shape(&req)?;

        let scope = req.scope.unwrap_or_else(|| derive_scope(&req, self.config.ingestion.default_scope));
        let (subject_type, subject_id) = derive_subject(&req);

        let mut content = req.content.clone();
        let mut tags = req.tags.clone();
        let (sensitivity, policy_outcome) =
            apply_policy(&mut content, &mut tags, Sensitivity::None, &self.config.privacy);

        let mut event_id = EventId::now_v7();
        let now = Utc::now();

        let artifact_id = if req.kind == EventKind::ToolResult {
            self.truncate_tool_result(&req.tenant, event_id, &mut content)?
        } else {
            None
        };

        let mut attempts = 0;
        loop {
            let event = Event {
                id: event_id,
                timestamp: now,
                tenant: req.tenant,
                session: req.session,
                channel: req.channel,
                actor: req.actor.clone(),
                kind: req.kind,
                sensitivity,
                tags: tags.clone(),
                content: content.clone(),
                refs: req.refs.clone(),
                scope,
                subject_type: subject_type.clone(),
                subject_id: subject_id.clone(),
                project_id: req.project_id.clone(),
            };

            if self.storage.event_get(req.tenant, event_id)?.is_some() {
                if attempts >= MAX_ID_RETRIES {
                    return Err(MemoriaError::Conflict(format!("event id {event_id} already exists")));
                }
                attempts += 1;
                event_id = EventId::now_v7();
                continue;
            }

            self.storage.event_insert(&event)?;
            let chunk_ids = self.derive_chunks(&event)?;

            if event.kind == EventKind::Decision {
                self.upsert_decision(&event)?;
            }
            if event.kind == EventKind::TaskUpdate {
                self.upsert_task(&event)?;
            }

            return Ok(RecordEventOutcome { event_id, chunk_ids, artifact_id, redacted: policy_outcome.redacted });
        }
    }

    /// Per-kind required-field validation (§4.C).
    fn validate_shape(&self, req: &RecordEventRequest) -> MemoriaResult<()> {
        let missing = |field: &str| {
            Err(ValidationError::RequiredFieldMissing { field: field.to_string() }.into())
        };
        match req.kind {
            EventKind::Message => {
                if req.content.get("text").and_then(|v| v.as_str()).is_none() {
                    return missing("content.text");
                }
            }
            EventKind::ToolResult => {
                if req.content.get("excerpt_text").and_then(|v| v.as_str()).is_none() {
                    return missing("content.excerpt_text");
                }
                if req.content.get("tool").and_then(|v| v.as_str()).is_none() {
                    return missing("content.tool");
                }
            }
            EventKind::ToolCall => {
                if req.content.get("tool").and_then(|v| v.as_str()).is_none() {
                    return missing("content.tool");
                }
            }
            EventKind::Decision => {
                if req.content.get("text").and_then(|v| v.as_str()).is_none() {
                    return missing("content.text");
                }
            }
            EventKind::TaskUpdate => {
                if req.content.get("title").and_then(|v| v.as_str()).is_none() {
                    return missing("content.title");
                }
                if req.content.get("status").and_then(|v| v.as_str()).is_none() {
                    return missing("content.status");
                }
            }
            EventKind::Artifact | EventKind::Handoff | EventKind::KnowledgeNote => {}
        }
        Ok(())
    }

    /// Truncate `tool_result` content to the configured excerpt cap,
    /// spilling the full payload into an [`memoria_core::Artifact`] row when
    /// it overflows. Large tool outputs never inflate chunks (§4.C).
    fn truncate_tool_result(
        &self,
        tenant: &TenantId,
        source_event: EventId,
        content: &mut serde_json::Value,
    ) -> MemoriaResult<Option<ArtifactId>> {
        let Some(excerpt) = content.get("excerpt_text").and_then(|v| v.as_str()).map(str::to_string) else {
            return Ok(None);
        };
        let cap = self.config.ingestion.max_bytes_per_tool_result as usize;
        if excerpt.len() <= cap {
            return Ok(None);
        }

        let full_bytes = excerpt.clone().into_bytes();
        let artifact_id = ArtifactId::now_v7();
        let artifact = memoria_core::Artifact {
            id: artifact_id,
            tenant: *tenant,
            source_event,
            content_type: "text/plain".to_string(),
            bytes: full_bytes,
            created_at: Utc::now(),
        };
        self.storage.artifact_insert(&artifact)?;

        let truncated = excerpt.as_bytes()[..cap].to_vec();
        let truncated = String::from_utf8_lossy(&truncated).into_owned();
        content["excerpt_text"] = serde_json::Value::String(truncated);
        content["truncated"] = serde_json::Value::Bool(true);
        content["artifact_id"] = serde_json::Value::String(artifact_id.to_string());
        Ok(Some(artifact_id))
    }

    /// Produce this event's chunks (§4.C): one by default, text selected per
    /// kind, importance seeded by the fixed rule table.
    fn derive_chunks(&self, event: &Event) -> MemoriaResult<Vec<ChunkId>> {
        let text = match event.kind {
            EventKind::Message => event.content.get("text").and_then(|v| v.as_str()),
            EventKind::ToolResult => event.content.get("excerpt_text").and_then(|v| v.as_str()),
            EventKind::Decision => event.content.get("text").and_then(|v| v.as_str()),
            _ => None,
        };
        let Some(text) = text else { return Ok(Vec::new()) };

        let mut importance = IMPORTANCE_BASELINE;
        if event.kind == EventKind::Decision {
            importance += IMPORTANCE_DECISION_BONUS;
        }
        let pinned_count = event.tags.iter().filter(|t| t.eq_ignore_ascii_case("pinned")).count();
        importance += IMPORTANCE_PINNED_TAG_BONUS * pinned_count as f32;
        if event.kind == EventKind::ToolResult {
            let lower = text.to_ascii_lowercase();
            if ENTRYPOINT_SIGNALS.iter().any(|signal| lower.contains(signal)) {
                importance += IMPORTANCE_ENTRYPOINT_SIGNAL_BONUS;
            }
        }
        let importance = importance.clamp(0.0, 1.0);

        let chunk = Chunk {
            id: ChunkId::now_v7(),
            tenant: event.tenant,
            source_event: event.id,
            timestamp: event.timestamp,
            kind: event.kind,
            channel: event.channel,
            sensitivity: event.sensitivity,
            tags: event.tags.clone(),
            token_estimate: estimate_tokens(text),
            importance,
            text: text.to_string(),
            scope: event.scope,
            subject_type: event.subject_type.clone(),
            subject_id: event.subject_id.clone(),
            project_id: event.project_id.clone(),
            embedding: None,
        };
        self.storage.chunk_insert(&chunk)?;
        Ok(vec![chunk.id])
    }

    /// Upsert a [`Decision`] for a `kind=decision` event, flipping the
    /// predecessor to `superseded` when `supersedes` is set (§4.C).
    fn upsert_decision(&self, event: &Event) -> MemoriaResult<()> {
        let text = event.content.get("text").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let rationale = event.content.get("rationale").and_then(|v| v.as_str()).map(str::to_string);
        let constraints = string_array(&event.content, "constraints");
        let alternatives = string_array(&event.content, "alternatives");
        let consequences = string_array(&event.content, "consequences");
        let supersedes = event
            .content
            .get("supersedes")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<DecisionId>().ok());

        if let Some(predecessor_id) = supersedes {
            if let Some(mut predecessor) = self.storage.decision_get(event.tenant, predecessor_id)? {
                predecessor.status = DecisionStatus::Superseded;
                self.storage.decision_update(event.tenant, &predecessor)?;
            }
        }

        let decision = Decision {
            id: DecisionId::now_v7(),
            tenant: event.tenant,
            status: DecisionStatus::Active,
            scope: event.scope,
            text,
            rationale,
            constraints,
            alternatives,
            consequences,
            refs: event.refs.clone(),
            created_at: event.timestamp,
            supersedes,
        };
        self.storage.decision_insert(&decision)
    }

    /// Upsert a [`Task`] for a `kind=task_update` event (§4.C).
    fn upsert_task(&self, event: &Event) -> MemoriaResult<()> {
        let existing_id =
            event.content.get("task_id").and_then(|v| v.as_str()).and_then(|s| s.parse::<TaskId>().ok());

        let title = event.content.get("title").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let status: TaskStatus = event
            .content
            .get("status")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .unwrap_or(TaskStatus::Open);
        let details = event.content.get("details").and_then(|v| v.as_str()).map(str::to_string);
        let priority = event.content.get("priority").and_then(|v| v.as_i64()).unwrap_or(0) as i32;
        let project = event.project_id.clone().or_else(|| event.content.get("project").and_then(|v| v.as_str()).map(str::to_string));
        let assignee = event.content.get("assignee").and_then(|v| v.as_str()).map(str::to_string);

        if let Some(id) = existing_id {
            if let Some(mut task) = self.storage.task_get(event.tenant, id)? {
                task.status = status;
                task.title = title;
                task.details = details;
                task.priority = priority;
                task.project = project;
                task.assignee = assignee;
                return self.storage.task_update(event.tenant, &task);
            }
        }

        let task = Task {
            id: existing_id.unwrap_or_else(TaskId::now_v7),
            tenant: event.tenant,
            status,
            title,
            details,
            refs: event.refs.clone(),
            priority,
            blocked_by: HashSet::new(),
            start_date: None,
            due_date: None,
            estimate: None,
            progress: None,
            assignee,
            project,
        };
        self.storage.task_insert(&task)
    }
}

fn string_array(content: &serde_json::Value, field: &str) -> Vec<String> {
    content
        .get(field)
        .and_then(|v| v.as_array())
        .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

/// Heuristic scope/subject extraction from explicit fields, tags, and
/// channel (§4.C).
fn derive_scope(req: &RecordEventRequest, default_scope: Scope) -> Scope {
    if req.tags.iter().any(|t| t.starts_with("project:")) {
        return Scope::Project;
    }
    if req.tags.iter().any(|t| t.starts_with("user:")) {
        return Scope::User;
    }
    if req.channel == Channel::Private {
        return Scope::Session;
    }
    default_scope
}

fn derive_subject(req: &RecordEventRequest) -> (Option<String>, Option<String>) {
    if req.subject_type.is_some() || req.subject_id.is_some() {
        return (req.subject_type.clone(), req.subject_id.clone());
    }
    for tag in &req.tags {
        if let Some(rest) = tag.strip_prefix("subject:") {
            if let Some((kind, id)) = rest.split_once(':') {
                return (Some(kind.to_string()), Some(id.to_string()));
            }
        }
    }
    for tag in &req.tags {
        if let Some(id) = tag.strip_prefix("user:") {
            return (Some("user".to_string()), Some(id.to_string()));
        }
        if let Some(id) = tag.strip_prefix("project:") {
            return (Some("project".to_string()), Some(id.to_string()));
        }
    }
    (None, None)
}
