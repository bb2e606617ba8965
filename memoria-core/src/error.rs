//! Error types for memoria operations.
//!
//! Every component in the daemon raises its own narrow error enum (storage,
//! validation, policy, graph, config) and those fold into the single
//! [`MemoriaError`] taxonomy at the service boundary. The taxonomy itself is
//! fixed at the eight kinds a caller needs to make a retry/surface decision:
//! `InvalidInput`, `NotFound`, `Conflict`, `CircularDependency`, `Forbidden`,
//! `DeadlineExceeded`, `Unavailable`, `Internal`.

use thiserror::Error;

/// Storage adapter errors (§4.B Storage Adapter).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("write failed for {entity}: {reason}")]
    WriteFailed { entity: &'static str, reason: String },

    #[error("backend unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("storage lock poisoned")]
    LockPoisoned,
}

/// Input validation errors, raised before any storage mutation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("constraint violation on {constraint}: {reason}")]
    ConstraintViolation { constraint: String, reason: String },
}

/// Configuration errors, raised once at daemon startup (§10 Configuration).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Policy & redaction errors (§4.K Policy & Redaction).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("channel {channel} is not permitted to carry sensitivity {sensitivity}")]
    ChannelNotAllowed { channel: String, sensitivity: String },

    #[error("content blocked by policy: {reason}")]
    Blocked { reason: String },
}

/// Relationship graph errors (§4.J Graph).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("edge {from} -> {to} would create a cycle")]
    WouldCreateCycle { from: String, to: String },

    #[error("node not found: {id}")]
    NodeNotFound { id: String },

    #[error("traversal exceeded max depth {max_depth}")]
    TraversalDepthExceeded { max_depth: u32 },
}

/// Memory surgery errors (§4.E Memory Surgery).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SurgeryError {
    #[error("edit target {target_id} not found")]
    TargetNotFound { target_id: String },

    #[error("edit {edit_id} already {status}, cannot transition")]
    AlreadyResolved { edit_id: String, status: String },

    #[error("conflicting edit already pending for target {target_id}")]
    ConflictingEditPending { target_id: String },
}

/// Capsule service errors (§4.F Capsule Service).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CapsuleError {
    #[error("capsule {capsule_id} is revoked")]
    Revoked { capsule_id: String },

    #[error("capsule {capsule_id} exceeds max transfer size")]
    TooLarge { capsule_id: String },
}

/// Master error type for memoria operations.
///
/// This is the only error type that crosses a service boundary (tool
/// dispatch, storage trait methods, the public crate API); component errors
/// above convert into it via the `From` impls below.
#[derive(Debug, Clone, Error)]
pub enum MemoriaError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("circular dependency: {0}")]
    CircularDependency(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StorageError> for MemoriaError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound { .. } => MemoriaError::NotFound(e.to_string()),
            StorageError::Unavailable { .. } | StorageError::LockPoisoned => {
                MemoriaError::Unavailable(e.to_string())
            }
            StorageError::WriteFailed { .. } => MemoriaError::Internal(e.to_string()),
        }
    }
}

impl From<ValidationError> for MemoriaError {
    fn from(e: ValidationError) -> Self {
        MemoriaError::InvalidInput(e.to_string())
    }
}

impl From<ConfigError> for MemoriaError {
    fn from(e: ConfigError) -> Self {
        MemoriaError::InvalidInput(e.to_string())
    }
}

impl From<PolicyError> for MemoriaError {
    fn from(e: PolicyError) -> Self {
        MemoriaError::Forbidden(e.to_string())
    }
}

impl From<GraphError> for MemoriaError {
    fn from(e: GraphError) -> Self {
        match e {
            GraphError::WouldCreateCycle { .. } => MemoriaError::CircularDependency(e.to_string()),
            GraphError::NodeNotFound { .. } => MemoriaError::NotFound(e.to_string()),
            GraphError::TraversalDepthExceeded { .. } => MemoriaError::InvalidInput(e.to_string()),
        }
    }
}

impl From<SurgeryError> for MemoriaError {
    fn from(e: SurgeryError) -> Self {
        match e {
            SurgeryError::TargetNotFound { .. } | SurgeryError::AlreadyResolved { .. } => {
                MemoriaError::NotFound(e.to_string())
            }
            SurgeryError::ConflictingEditPending { .. } => MemoriaError::Conflict(e.to_string()),
        }
    }
}

impl From<CapsuleError> for MemoriaError {
    fn from(e: CapsuleError) -> Self {
        match e {
            CapsuleError::Revoked { .. } => MemoriaError::Forbidden(e.to_string()),
            CapsuleError::TooLarge { .. } => MemoriaError::InvalidInput(e.to_string()),
        }
    }
}

/// Result type alias for memoria operations.
pub type MemoriaResult<T> = Result<T, MemoriaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_not_found_maps_to_not_found() {
        let e = StorageError::NotFound { entity: "chunk", id: "chk_1".into() };
        assert!(matches!(MemoriaError::from(e), MemoriaError::NotFound(_)));
    }

    #[test]
    fn graph_cycle_maps_to_circular_dependency() {
        let e = GraphError::WouldCreateCycle { from: "a".into(), to: "b".into() };
        assert!(matches!(MemoriaError::from(e), MemoriaError::CircularDependency(_)));
    }

    #[test]
    fn policy_error_maps_to_forbidden() {
        let e = PolicyError::Blocked { reason: "secret-shaped token".into() };
        assert!(matches!(MemoriaError::from(e), MemoriaError::Forbidden(_)));
    }

    #[test]
    fn capsule_revoked_maps_to_forbidden() {
        let e = CapsuleError::Revoked { capsule_id: "cap_1".into() };
        assert!(matches!(MemoriaError::from(e), MemoriaError::Forbidden(_)));
    }
}
