//! Identity types for memoria entities.
//!
//! Every entity kind gets its own newtype around a UUIDv7. UUIDv7's leading
//! bits are a millisecond timestamp, so ids are naturally sortable by
//! creation time without a separate sequence column. The `Display` form adds
//! the kind's short prefix (`evt_`, `chk_`, …) so an id printed anywhere is
//! self-describing; `FromStr` accepts both the prefixed and bare-UUID forms.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;
use uuid::Uuid;

pub use chrono::{DateTime, Utc};

/// Timestamp type using UTC timezone; all comparisons use absolute instants.
pub type Timestamp = DateTime<Utc>;

/// Duration in milliseconds for TTL and timeout values.
pub type DurationMs = i64;

// ============================================================================
// ENTITY ID TYPE SYSTEM
// ============================================================================

/// Trait for type-safe, kind-prefixed entity IDs.
///
/// Each entity type has its own strongly-typed ID so that, e.g., a
/// `ChunkId` cannot be passed where an `EventId` is expected.
pub trait EntityIdType:
    Copy
    + Clone
    + Eq
    + PartialEq
    + Hash
    + fmt::Debug
    + fmt::Display
    + FromStr
    + Serialize
    + serde::de::DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// The name of the entity kind (e.g., "tenant", "event").
    const ENTITY_NAME: &'static str;

    /// The short id prefix used in the `Display` form (e.g., "evt").
    const PREFIX: &'static str;

    /// Create a new ID from a UUID.
    fn new(uuid: Uuid) -> Self;

    /// Get the underlying UUID.
    fn as_uuid(&self) -> Uuid;

    /// Create a nil (all zeros) ID.
    fn nil() -> Self {
        Self::new(Uuid::nil())
    }

    /// Create a new timestamp-sortable UUIDv7 ID. This is the normal way
    /// to mint an id for a freshly created entity.
    fn now_v7() -> Self {
        Self::new(Uuid::now_v7())
    }

    /// Create a new random UUIDv4 ID (used only where ordering is irrelevant).
    fn new_v4() -> Self {
        Self::new(Uuid::new_v4())
    }
}

/// Error type for parsing entity IDs from strings.
#[derive(Debug, Clone)]
pub struct EntityIdParseError {
    pub entity_name: &'static str,
    pub input: String,
}

impl fmt::Display for EntityIdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to parse {} id from '{}'",
            self.entity_name, self.input
        )
    }
}

impl std::error::Error for EntityIdParseError {}

/// Macro to define a type-safe, prefixed entity ID newtype.
macro_rules! define_entity_id {
    ($name:ident, $entity:literal, $prefix:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        #[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
        pub struct $name(Uuid);

        impl EntityIdType for $name {
            const ENTITY_NAME: &'static str = $entity;
            const PREFIX: &'static str = $prefix;

            fn new(uuid: Uuid) -> Self {
                Self(uuid)
            }

            fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", Self::PREFIX, self.0)
            }
        }

        impl FromStr for $name {
            type Err = EntityIdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let bare = s
                    .strip_prefix(concat!($prefix, "_"))
                    .unwrap_or(s);
                Uuid::from_str(bare)
                    .map(Self::new)
                    .map_err(|_| EntityIdParseError {
                        entity_name: Self::ENTITY_NAME,
                        input: s.to_string(),
                    })
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::nil()
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

// ============================================================================
// ENTITY ID TYPES (§4.A)
// ============================================================================

define_entity_id!(TenantId, "tenant", "ten", "Type-safe ID for a tenant.");
define_entity_id!(SessionId, "session", "ses", "Type-safe ID for a session.");
define_entity_id!(AgentId, "agent", "agt", "Type-safe ID for an agent or human actor.");
define_entity_id!(EventId, "event", "evt", "Type-safe ID for an append-only event.");
define_entity_id!(ChunkId, "chunk", "chk", "Type-safe ID for a retrieval chunk.");
define_entity_id!(DecisionId, "decision", "dec", "Type-safe ID for a decision.");
define_entity_id!(TaskId, "task", "tsk", "Type-safe ID for a task.");
define_entity_id!(CapsuleId, "capsule", "cap", "Type-safe ID for a capsule.");
define_entity_id!(MemoryEditId, "memory_edit", "edt", "Type-safe ID for a memory edit.");
define_entity_id!(EdgeId, "edge", "edge", "Type-safe ID for a graph edge.");
define_entity_id!(ArtifactId, "artifact", "art", "Type-safe ID for an artifact (overflow payload).");
define_entity_id!(
    KnowledgeNoteId,
    "knowledge_note",
    "kn",
    "Type-safe ID for a consolidation-produced knowledge note."
);
define_entity_id!(AcbId, "acb", "acb", "Type-safe ID for an assembled Active Context Bundle.");

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_type_safety() {
        let tenant_id = TenantId::now_v7();
        let event_id = EventId::now_v7();
        assert_ne!(tenant_id.as_uuid(), event_id.as_uuid());
    }

    #[test]
    fn test_entity_id_display_has_prefix() {
        let id = EventId::new(Uuid::nil());
        assert_eq!(
            id.to_string(),
            "evt_00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_entity_id_from_str_accepts_prefixed_and_bare() {
        let uuid_str = "550e8400-e29b-41d4-a716-446655440000";
        let prefixed = format!("evt_{uuid_str}");

        let a: EventId = prefixed.parse().expect("prefixed form should parse");
        let b: EventId = uuid_str.parse().expect("bare uuid should also parse");
        assert_eq!(a, b);
    }

    #[test]
    fn test_entity_id_parse_error() {
        let result: Result<TenantId, _> = "not-a-uuid".parse();
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().entity_name, "tenant");
    }

    #[test]
    fn test_entity_id_serde_roundtrip() {
        let id = ChunkId::now_v7();
        let json = serde_json::to_string(&id).expect("serialize");
        let back: ChunkId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(id, back);
    }

    #[test]
    fn test_entity_id_default_is_nil() {
        assert_eq!(TenantId::default(), TenantId::nil());
    }

    #[test]
    fn test_ids_are_time_sortable() {
        let a = EventId::now_v7();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = EventId::now_v7();
        assert!(a.as_uuid() < b.as_uuid());
    }
}
