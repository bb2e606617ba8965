//! In-process `ToolRegistry` (§6 External Interfaces).
//!
//! Each tool is one dispatch entry: a name, a JSON-schema-shaped
//! input/output description, and a handler closure over the core services.
//! Modeled on this codebase's own MCP tool list/dispatch pattern (name,
//! description, `input_schema: serde_json::Value`, `match name { ... }`),
//! adapted to a synchronous in-process call boundary rather than an async
//! HTTP route — the transport §6 excludes would wrap this registry, not
//! replace it.

use std::collections::HashMap;

use memoria_core::MemoriaResult;
use serde_json::Value;

/// Category a tool belongs to, for `manifest()` discovery grouping (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCategory {
    Event,
    Acb,
    Capsule,
    Edit,
    Graph,
    Task,
}

impl ToolCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolCategory::Event => "event",
            ToolCategory::Acb => "acb",
            ToolCategory::Capsule => "capsule",
            ToolCategory::Edit => "edit",
            ToolCategory::Graph => "graph",
            ToolCategory::Task => "task",
        }
    }
}

/// Discoverable description of one registered tool (§6), independent of its
/// handler.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub category: ToolCategory,
    pub description: &'static str,
    pub input_schema: Value,
}

struct RegisteredTool {
    descriptor: ToolDescriptor,
    handler: Box<dyn Fn(Value) -> MemoriaResult<Value> + Send + Sync>,
}

/// An in-process registry of tools (§6), dispatched by name with
/// JSON-compatible request/response values.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<&'static str, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        descriptor: ToolDescriptor,
        handler: impl Fn(Value) -> MemoriaResult<Value> + Send + Sync + 'static,
    ) {
        let name = descriptor.name;
        self.tools.insert(name, RegisteredTool { descriptor, handler: Box::new(handler) });
    }

    /// Dispatch one call by tool name (§6).
    pub fn call(&self, name: &str, input: Value) -> MemoriaResult<Value> {
        let Some(tool) = self.tools.get(name) else {
            return Err(memoria_core::MemoriaError::NotFound(format!("tool {name} is not registered")));
        };
        (tool.handler)(input)
    }

    /// Every registered tool's discoverable description (§6 `manifest()`).
    pub fn manifest(&self) -> Vec<ToolDescriptor> {
        let mut tools: Vec<ToolDescriptor> = self.tools.values().map(|t| t.descriptor.clone()).collect();
        tools.sort_by_key(|t| t.name);
        tools
    }
}
