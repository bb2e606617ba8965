//! memoria-graph — the typed relationship graph (§3 Node/Edge, §4.J).
//!
//! There is no separate node table: a [`NodeRef`] is just the referenced
//! entity's own kind and id, so a node "exists" exactly when the entity it
//! names exists. Edges are the only thing this crate stores, via the
//! `edge_*` family on [`Storage`].

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use memoria_core::{
    Edge, EdgeDirection, EdgeId, EntityIdType, GraphConfig, GraphEdgeType, GraphError, MemoriaResult,
    NodeKind, NodeRef, TenantId,
};
use memoria_storage::Storage;
use serde::Serialize;

/// A project's tasks (one hop via `parent_of` edges) grouped into Kanban
/// columns by the connecting edge's `properties.status`, each column
/// ordered by task priority (descending) then edge creation time
/// (ascending) — §4.J.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProjectKanban {
    pub todo: Vec<NodeRef>,
    pub doing: Vec<NodeRef>,
    pub done: Vec<NodeRef>,
}

/// One step of a [`Graph::traverse`] result: the edge taken and the depth at
/// which it was reached (root's direct edges are depth 1).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraversalStep {
    pub edge: Edge,
    pub depth: u32,
}

/// The relationship graph (§4.J), backed by any [`Storage`] implementation.
pub struct Graph {
    storage: Arc<dyn Storage>,
    config: GraphConfig,
}

impl Graph {
    pub fn new(storage: Arc<dyn Storage>, config: GraphConfig) -> Self {
        Self { storage, config }
    }

    /// `create_edge` (§4.J): rejects a `depends_on` edge that would close a
    /// cycle in the depends_on subgraph.
    pub fn create_edge(
        &self,
        tenant: TenantId,
        from: NodeRef,
        to: NodeRef,
        edge_type: GraphEdgeType,
        properties: serde_json::Value,
    ) -> MemoriaResult<EdgeId> {
        if !self.node_exists(tenant, &from)? {
            return Err(GraphError::NodeNotFound { id: from.id.clone() }.into());
        }
        if !self.node_exists(tenant, &to)? {
            return Err(GraphError::NodeNotFound { id: to.id.clone() }.into());
        }

        if edge_type == GraphEdgeType::DependsOn && self.reaches(tenant, &to, &from, GraphEdgeType::DependsOn)? {
            return Err(GraphError::WouldCreateCycle { from: format!("{:?}", from), to: format!("{:?}", to) }.into());
        }

        let now = chrono::Utc::now();
        let id = EdgeId::now_v7();
        let edge = Edge { id, tenant, from, to, edge_type, properties, created_at: now, updated_at: now };
        self.storage.edge_insert(&edge)?;
        Ok(id)
    }

    /// `get_edges` (§4.J): edges touching `node` in the given `direction`,
    /// optionally filtered to one `edge_type`.
    pub fn get_edges(
        &self,
        tenant: TenantId,
        node: &NodeRef,
        direction: EdgeDirection,
        edge_type: Option<GraphEdgeType>,
    ) -> MemoriaResult<Vec<Edge>> {
        self.storage.edge_list_by_node(tenant, node, direction, edge_type)
    }

    /// `traverse` (§4.J): breadth-first walk outward from `root` following
    /// `edge_type` (when given) up to the configured max depth, visiting
    /// each node at most once. Exceeding the depth cap truncates silently
    /// rather than erroring, since an agent's context is naturally bounded.
    pub fn traverse(
        &self,
        tenant: TenantId,
        root: &NodeRef,
        direction: EdgeDirection,
        edge_type: Option<GraphEdgeType>,
        max_depth: Option<u32>,
    ) -> MemoriaResult<Vec<TraversalStep>> {
        let max_depth = max_depth.unwrap_or(self.config.max_traversal_depth).min(self.config.max_traversal_depth);

        let mut visited = HashSet::new();
        visited.insert(root.clone());
        let mut queue = VecDeque::new();
        queue.push_back((root.clone(), 0u32));
        let mut steps = Vec::new();

        while let Some((node, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for edge in self.storage.edge_list_by_node(tenant, &node, direction, edge_type)? {
                let next = match direction {
                    EdgeDirection::Out => edge.to.clone(),
                    EdgeDirection::In => edge.from.clone(),
                    EdgeDirection::Both => {
                        if edge.from == node {
                            edge.to.clone()
                        } else {
                            edge.from.clone()
                        }
                    }
                };
                if visited.insert(next.clone()) {
                    steps.push(TraversalStep { edge, depth: depth + 1 });
                    queue.push_back((next, depth + 1));
                }
            }
        }

        Ok(steps)
    }

    /// `update_edge_properties` (§4.J): shallow-merges `patch` into the
    /// existing `properties` object and bumps `updated_at`; the edge's
    /// endpoints and type are immutable once created. A key set to `null`
    /// in `patch` is removed from `properties`. If the existing properties
    /// (or the patch) isn't a JSON object, the patch simply replaces it.
    pub fn update_edge_properties(&self, tenant: TenantId, id: EdgeId, patch: serde_json::Value) -> MemoriaResult<()> {
        let mut edge = self
            .storage
            .edge_get(tenant, id)?
            .ok_or_else(|| GraphError::NodeNotFound { id: id.to_string() })?;

        let merged = if let (Some(existing), Some(patch_obj)) = (edge.properties.as_object(), patch.as_object()) {
            let mut merged = existing.clone();
            for (key, value) in patch_obj {
                if value.is_null() {
                    merged.remove(key);
                } else {
                    merged.insert(key.clone(), value.clone());
                }
            }
            serde_json::Value::Object(merged)
        } else {
            patch
        };
        edge.properties = merged;
        edge.updated_at = chrono::Utc::now();
        self.storage.edge_update(tenant, &edge)
    }

    /// `delete_edge` (§4.J).
    pub fn delete_edge(&self, tenant: TenantId, id: EdgeId) -> MemoriaResult<()> {
        self.storage.edge_delete(tenant, id)
    }

    /// `get_project_tasks` (§4.J task Kanban projection): tasks reachable
    /// one hop from a project node via `parent_of` edges, grouped into
    /// columns by the edge's `properties.status` and ordered within each
    /// column by task priority (descending) then edge creation time
    /// (ascending). An edge with a missing or unrecognized `status` lands
    /// in `todo`.
    pub fn get_project_tasks(&self, tenant: TenantId, project_node: &NodeRef) -> MemoriaResult<ProjectKanban> {
        let mut todo: Vec<(Edge, i32)> = Vec::new();
        let mut doing: Vec<(Edge, i32)> = Vec::new();
        let mut done: Vec<(Edge, i32)> = Vec::new();

        for edge in self
            .storage
            .edge_list_by_node(tenant, project_node, EdgeDirection::Out, Some(GraphEdgeType::ParentOf))?
            .into_iter()
            .filter(|e| e.to.kind == NodeKind::Task)
        {
            let priority = self.task_priority(tenant, &edge.to)?;
            match edge.properties.get("status").and_then(|v| v.as_str()) {
                Some("doing") => doing.push((edge, priority)),
                Some("done") => done.push((edge, priority)),
                _ => todo.push((edge, priority)),
            }
        }

        let rank = |col: &mut Vec<(Edge, i32)>| {
            col.sort_by(|(edge_a, pri_a), (edge_b, pri_b)| {
                pri_b.cmp(pri_a).then_with(|| edge_a.created_at.cmp(&edge_b.created_at))
            });
        };
        rank(&mut todo);
        rank(&mut doing);
        rank(&mut done);

        Ok(ProjectKanban {
            todo: todo.into_iter().map(|(e, _)| e.to).collect(),
            doing: doing.into_iter().map(|(e, _)| e.to).collect(),
            done: done.into_iter().map(|(e, _)| e.to).collect(),
        })
    }

    /// Priority of the task a `NodeRef` points at, 0 if it can't be
    /// resolved (missing or unparseable id never blocks the Kanban view,
    /// it just sorts that task last within its column).
    fn task_priority(&self, tenant: TenantId, node: &NodeRef) -> MemoriaResult<i32> {
        Ok(node
            .id
            .parse::<memoria_core::TaskId>()
            .ok()
            .map(|id| self.storage.task_get(tenant, id))
            .transpose()?
            .flatten()
            .map(|t| t.priority)
            .unwrap_or(0))
    }

    /// Whether `node` resolves to an existing entity (§4.J — both edge
    /// endpoints must exist at edge-create time). An id that doesn't parse
    /// as the expected entity id for its `kind` counts as not found.
    fn node_exists(&self, tenant: TenantId, node: &NodeRef) -> MemoriaResult<bool> {
        Ok(match node.kind {
            NodeKind::Event | NodeKind::KnowledgeNote => node
                .id
                .parse::<memoria_core::EventId>()
                .ok()
                .map(|id| self.storage.event_get(tenant, id))
                .transpose()?
                .flatten()
                .is_some(),
            NodeKind::Chunk => node
                .id
                .parse::<memoria_core::ChunkId>()
                .ok()
                .map(|id| self.storage.chunk_get(tenant, id))
                .transpose()?
                .flatten()
                .is_some(),
            NodeKind::Decision => node
                .id
                .parse::<memoria_core::DecisionId>()
                .ok()
                .map(|id| self.storage.decision_get(tenant, id))
                .transpose()?
                .flatten()
                .is_some(),
            NodeKind::Task => node
                .id
                .parse::<memoria_core::TaskId>()
                .ok()
                .map(|id| self.storage.task_get(tenant, id))
                .transpose()?
                .flatten()
                .is_some(),
            NodeKind::Capsule => node
                .id
                .parse::<memoria_core::CapsuleId>()
                .ok()
                .map(|id| self.storage.capsule_get(tenant, id))
                .transpose()?
                .flatten()
                .is_some(),
        })
    }

    /// Whether `from` can reach `to` by following `edge_type` edges
    /// outward, bounded by the configured max depth (cycle-detection helper
    /// for `create_edge`).
    fn reaches(&self, tenant: TenantId, from: &NodeRef, to: &NodeRef, edge_type: GraphEdgeType) -> MemoriaResult<bool> {
        if from == to {
            return Ok(true);
        }
        let mut visited = HashSet::new();
        visited.insert(from.clone());
        let mut queue = VecDeque::new();
        queue.push_back((from.clone(), 0u32));

        while let Some((node, depth)) = queue.pop_front() {
            if depth >= self.config.max_traversal_depth {
                continue;
            }
            for edge in self.storage.edge_list_by_node(tenant, &node, EdgeDirection::Out, Some(edge_type))? {
                if &edge.to == to {
                    return Ok(true);
                }
                if visited.insert(edge.to.clone()) {
                    queue.push_back((edge.to.clone(), depth + 1));
                }
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoria_core::{NodeKind, Task, TaskId, TaskStatus};
    use memoria_storage::MemoryStorage;

    fn graph() -> (Graph, TenantId) {
        (Graph::new(Arc::new(MemoryStorage::new()), GraphConfig { max_traversal_depth: 5 }), TenantId::now_v7())
    }

    /// Inserts a real task through the graph's own storage handle and
    /// returns a `NodeRef` pointing at it, so `create_edge`'s
    /// endpoint-exists check has something to find.
    fn task_node(graph: &Graph, tenant: TenantId, priority: i32) -> NodeRef {
        let id = TaskId::now_v7();
        let task = Task {
            id,
            tenant,
            status: TaskStatus::Backlog,
            title: "task".to_string(),
            details: None,
            refs: Default::default(),
            priority,
            blocked_by: Default::default(),
            start_date: None,
            due_date: None,
            estimate: None,
            progress: None,
            assignee: None,
            project: None,
        };
        graph.storage.task_insert(&task).unwrap();
        NodeRef { kind: NodeKind::Task, id: id.to_string() }
    }

    #[test]
    fn create_and_get_edges_roundtrip() {
        let (graph, tenant) = graph();
        let a = task_node(&graph, tenant, 0);
        let b = task_node(&graph, tenant, 0);
        graph.create_edge(tenant, a.clone(), b.clone(), GraphEdgeType::RelatedTo, serde_json::json!({})).unwrap();
        let out_edges = graph.get_edges(tenant, &a, EdgeDirection::Out, None).unwrap();
        assert_eq!(out_edges.len(), 1);
        assert_eq!(out_edges[0].to, b);
    }

    #[test]
    fn create_edge_against_missing_endpoint_is_not_found() {
        let (graph, tenant) = graph();
        let a = task_node(&graph, tenant, 0);
        let phantom = NodeRef { kind: NodeKind::Task, id: TaskId::now_v7().to_string() };
        let err = graph.create_edge(tenant, a, phantom, GraphEdgeType::RelatedTo, serde_json::json!({})).unwrap_err();
        assert!(matches!(err, memoria_core::MemoriaError::NotFound(_)));
    }

    #[test]
    fn direct_cycle_in_depends_on_is_rejected() {
        let (graph, tenant) = graph();
        let a = task_node(&graph, tenant, 0);
        let b = task_node(&graph, tenant, 0);
        graph.create_edge(tenant, a.clone(), b.clone(), GraphEdgeType::DependsOn, serde_json::json!({})).unwrap();
        let err = graph.create_edge(tenant, b, a, GraphEdgeType::DependsOn, serde_json::json!({})).unwrap_err();
        assert!(matches!(err, memoria_core::MemoriaError::CircularDependency(_)));
    }

    #[test]
    fn transitive_cycle_in_depends_on_is_rejected() {
        let (graph, tenant) = graph();
        let a = task_node(&graph, tenant, 0);
        let b = task_node(&graph, tenant, 0);
        let c = task_node(&graph, tenant, 0);
        graph.create_edge(tenant, a.clone(), b.clone(), GraphEdgeType::DependsOn, serde_json::json!({})).unwrap();
        graph.create_edge(tenant, b.clone(), c.clone(), GraphEdgeType::DependsOn, serde_json::json!({})).unwrap();
        let err = graph.create_edge(tenant, c, a, GraphEdgeType::DependsOn, serde_json::json!({})).unwrap_err();
        assert!(matches!(err, memoria_core::MemoriaError::CircularDependency(_)));
    }

    #[test]
    fn non_depends_on_edges_never_trigger_cycle_detection() {
        let (graph, tenant) = graph();
        let a = task_node(&graph, tenant, 0);
        let b = task_node(&graph, tenant, 0);
        graph.create_edge(tenant, a.clone(), b.clone(), GraphEdgeType::RelatedTo, serde_json::json!({})).unwrap();
        graph.create_edge(tenant, b, a, GraphEdgeType::RelatedTo, serde_json::json!({})).unwrap();
    }

    #[test]
    fn traverse_visits_each_node_once_and_respects_depth_cap() {
        let (graph, tenant) = graph();
        let a = task_node(&graph, tenant, 0);
        let b = task_node(&graph, tenant, 0);
        let c = task_node(&graph, tenant, 0);
        graph.create_edge(tenant, a.clone(), b.clone(), GraphEdgeType::RelatedTo, serde_json::json!({})).unwrap();
        graph.create_edge(tenant, b.clone(), c.clone(), GraphEdgeType::RelatedTo, serde_json::json!({})).unwrap();
        let steps = graph.traverse(tenant, &a, EdgeDirection::Out, None, Some(1)).unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].edge.to, b);
    }

    #[test]
    fn delete_edge_removes_it() {
        let (graph, tenant) = graph();
        let a = task_node(&graph, tenant, 0);
        let b = task_node(&graph, tenant, 0);
        let id = graph.create_edge(tenant, a.clone(), b, GraphEdgeType::RelatedTo, serde_json::json!({})).unwrap();
        graph.delete_edge(tenant, id).unwrap();
        assert!(graph.get_edges(tenant, &a, EdgeDirection::Out, None).unwrap().is_empty());
    }

    #[test]
    fn update_edge_properties_merges_into_existing_payload() {
        let (graph, tenant) = graph();
        let a = task_node(&graph, tenant, 0);
        let b = task_node(&graph, tenant, 0);
        let id = graph
            .create_edge(tenant, a, b, GraphEdgeType::RelatedTo, serde_json::json!({"k": 1, "j": 3}))
            .unwrap();
        graph.update_edge_properties(tenant, id, serde_json::json!({"k": 2})).unwrap();
        let edge = graph.storage.edge_get(tenant, id).unwrap().unwrap();
        assert_eq!(edge.properties, serde_json::json!({"k": 2, "j": 3}));
    }

    #[test]
    fn update_edge_properties_removes_null_keys() {
        let (graph, tenant) = graph();
        let a = task_node(&graph, tenant, 0);
        let b = task_node(&graph, tenant, 0);
        let id = graph
            .create_edge(tenant, a, b, GraphEdgeType::RelatedTo, serde_json::json!({"k": 1, "j": 3}))
            .unwrap();
        graph.update_edge_properties(tenant, id, serde_json::json!({"j": null})).unwrap();
        let edge = graph.storage.edge_get(tenant, id).unwrap().unwrap();
        assert_eq!(edge.properties, serde_json::json!({"k": 1}));
    }

    #[test]
    fn get_project_tasks_groups_into_kanban_columns_ordered_by_priority() {
        let (graph, tenant) = graph();
        let project = NodeRef { kind: NodeKind::Decision, id: "proj-1".to_string() };
        let todo_low = task_node(&graph, tenant, 1);
        let todo_high = task_node(&graph, tenant, 5);
        let doing_task = task_node(&graph, tenant, 0);
        let done_task = task_node(&graph, tenant, 0);

        // The project node itself need not exist as a real entity to be
        // the `from` side of a parent_of edge in this test's direct
        // storage insert, since create_edge's endpoint check runs on
        // `create_edge` calls, not on raw storage writes.
        for (task, status) in [
            (&todo_low, None),
            (&todo_high, None),
            (&doing_task, Some("doing")),
            (&done_task, Some("done")),
        ] {
            let props = match status {
                Some(s) => serde_json::json!({"status": s}),
                None => serde_json::json!({}),
            };
            let edge = Edge {
                id: EdgeId::now_v7(),
                tenant,
                from: project.clone(),
                to: task.clone(),
                edge_type: GraphEdgeType::ParentOf,
                properties: props,
                created_at: chrono::Utc::now(),
                updated_at: chrono::Utc::now(),
            };
            graph.storage.edge_insert(&edge).unwrap();
        }

        let kanban = graph.get_project_tasks(tenant, &project).unwrap();
        assert_eq!(kanban.todo, vec![todo_high, todo_low]);
        assert_eq!(kanban.doing, vec![doing_task]);
        assert_eq!(kanban.done, vec![done_task]);
    }
}
