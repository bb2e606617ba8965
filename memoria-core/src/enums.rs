//! Enum types shared across memoria entities.
//!
//! Every enum follows the same shape: a plain Rust enum, an `as_db_str`
//! canonical string, a permissive `from_db_str`/`FromStr` (via
//! [`normalize_token`]) that accepts case/separator variation, and a
//! `Display` that prints the canonical string. This keeps wire and
//! storage representations stable while tolerating caller input like
//! `"tool-result"` or `"TOOL_RESULT"` for `tool_result`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Strip whitespace/underscore/dash and lowercase, for permissive enum parsing.
fn normalize_token(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Generic parse error for any of this module's enums.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumParseError {
    pub type_name: &'static str,
    pub input: String,
}

impl fmt::Display for EnumParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: '{}'", self.type_name, self.input)
    }
}

impl std::error::Error for EnumParseError {}

macro_rules! db_str_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident { $($variant:ident => $db:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
        #[serde(try_from = "String", into = "String")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_db_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $db),+
                }
            }

            pub fn from_db_str(s: &str) -> Result<Self, EnumParseError> {
                let normalized = normalize_token(s);
                match normalized.as_str() {
                    $(v if v == normalize_token($db) => Ok(Self::$variant),)+
                    _ => Err(EnumParseError { type_name: stringify!($name), input: s.to_string() }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.as_db_str())
            }
        }

        impl FromStr for $name {
            type Err = EnumParseError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_db_str(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = EnumParseError;
            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::from_db_str(&s)
            }
        }

        impl From<$name> for String {
            fn from(v: $name) -> String {
                v.as_db_str().to_string()
            }
        }
    };
}

db_str_enum! {
    /// Visibility channel an event/chunk was recorded on.
    pub enum Channel {
        Private => "private",
        Public => "public",
        Team => "team",
        Agent => "agent",
    }
}

db_str_enum! {
    /// Who produced an event.
    pub enum ActorType {
        Human => "human",
        Agent => "agent",
        Tool => "tool",
    }
}

db_str_enum! {
    /// Kind of an event's payload (§3 Event).
    pub enum EventKind {
        Message => "message",
        ToolCall => "tool_call",
        ToolResult => "tool_result",
        Decision => "decision",
        TaskUpdate => "task_update",
        Artifact => "artifact",
        Handoff => "handoff",
        KnowledgeNote => "knowledge_note",
    }
}

db_str_enum! {
    /// Sensitivity classification, most restrictive last.
    pub enum Sensitivity {
        None => "none",
        Low => "low",
        High => "high",
        Secret => "secret",
    }
}

impl Sensitivity {
    /// Ranking used to compare "at least as sensitive as" without deriving Ord
    /// on the wire representation (keeps `Secret` last by definition, not by
    /// declaration order, if the enum is ever reordered).
    pub fn rank(&self) -> u8 {
        match self {
            Sensitivity::None => 0,
            Sensitivity::Low => 1,
            Sensitivity::High => 2,
            Sensitivity::Secret => 3,
        }
    }
}

db_str_enum! {
    /// Axis of validity for a memory item (§3 Event/Chunk `scope`).
    pub enum Scope {
        Session => "session",
        User => "user",
        Project => "project",
        Policy => "policy",
        Global => "global",
    }
}

impl Default for Scope {
    fn default() -> Self {
        Scope::Global
    }
}

db_str_enum! {
    /// Who proposed a memory edit.
    pub enum ProposedBy {
        Human => "human",
        Agent => "agent",
    }
}

db_str_enum! {
    /// Target kind a [`crate::MemoryEdit`] applies to.
    pub enum EditTargetType {
        Chunk => "chunk",
        Event => "event",
        Decision => "decision",
    }
}

db_str_enum! {
    /// Memory surgery operation (§3 MemoryEdit, §4.D/E).
    pub enum EditOp {
        Retract => "retract",
        Amend => "amend",
        Quarantine => "quarantine",
        Attenuate => "attenuate",
        Block => "block",
    }
}

db_str_enum! {
    /// Lifecycle status of a memory edit (§4 state machines).
    pub enum EditStatus {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
    }
}

db_str_enum! {
    /// Lifecycle status of a capsule (§4 state machines).
    pub enum CapsuleStatus {
        Active => "active",
        Revoked => "revoked",
    }
}

db_str_enum! {
    /// Lifecycle status of a decision (§4 state machines).
    pub enum DecisionStatus {
        Active => "active",
        Superseded => "superseded",
    }
}

db_str_enum! {
    /// Lifecycle status of a task.
    pub enum TaskStatus {
        Backlog => "backlog",
        Open => "open",
        Doing => "doing",
        Review => "review",
        Blocked => "blocked",
        Done => "done",
    }
}

db_str_enum! {
    /// Kind of addressable node in the relationship graph (§3 Node/Edge).
    pub enum NodeKind {
        Event => "event",
        Chunk => "chunk",
        Decision => "decision",
        Task => "task",
        Capsule => "capsule",
        KnowledgeNote => "knowledge_note",
    }
}

db_str_enum! {
    /// Typed relationship between two graph nodes (§4.J).
    pub enum GraphEdgeType {
        ParentOf => "parent_of",
        ChildOf => "child_of",
        References => "references",
        CreatedBy => "created_by",
        RelatedTo => "related_to",
        DependsOn => "depends_on",
    }
}

db_str_enum! {
    /// Traversal direction relative to a node (§4.J `get_edges`).
    pub enum EdgeDirection {
        In => "in",
        Out => "out",
        Both => "both",
    }
}

db_str_enum! {
    /// Detected interaction mode (§4.H), selects the ACB budget profile.
    pub enum Mode {
        Task => "task",
        Exploration => "exploration",
        Debugging => "debugging",
        Learning => "learning",
        General => "general",
    }
}

db_str_enum! {
    /// Why a retrieved candidate was left out of the assembled ACB (§4.I).
    pub enum OmissionReason {
        Budget => "budget",
        Privacy => "privacy",
        Policy => "policy",
        ChannelBlocked => "channel_blocked",
        TruncatedToolOutput => "truncated_tool_output",
    }
}

db_str_enum! {
    /// Named section of an Active Context Bundle (§4.H/I), in fixed packing priority.
    pub enum AcbSection {
        Rules => "rules",
        TaskState => "task_state",
        Decisions => "decisions",
        Evidence => "evidence",
        Recent => "recent",
        Capsules => "capsules",
    }
}

impl AcbSection {
    /// Sections in the fixed priority order the Assembler packs them (§4.I step 8).
    pub const PRIORITY_ORDER: [AcbSection; 6] = [
        AcbSection::Rules,
        AcbSection::TaskState,
        AcbSection::Decisions,
        AcbSection::Evidence,
        AcbSection::Recent,
        AcbSection::Capsules,
    ];
}
