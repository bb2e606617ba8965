//! Sticky invariants (§4.H): hard constraints and blocking errors pinned
//! into a non-displaceable sub-budget of `rules` for the rest of a session.
//!
//! Kept in an in-process, session-keyed store rather than a storage table,
//! matching the "read-mostly, invalidate by session, no distributed state"
//! resource model (§5) — there is exactly one daemon process.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;
use memoria_core::{EventKind, SessionId, Timestamp};

const HARD_CONSTRAINT_MARKERS: &[&str] = &["must", "never", "required"];

/// A pinned hard constraint or blocking error (§4.H).
#[derive(Debug, Clone, PartialEq)]
pub struct StickyInvariant {
    pub text: String,
    pub pinned_at: Timestamp,
}

/// Session-keyed store of sticky invariants.
#[derive(Default)]
pub struct StickyStore {
    by_session: RwLock<HashMap<SessionId, Vec<StickyInvariant>>>,
}

impl StickyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan an event's text content for hard-constraint markers or a
    /// blocking-error signal and pin any found invariant for `session`.
    pub fn observe(&self, session: SessionId, kind: EventKind, text: &str) {
        let lower = text.to_ascii_lowercase();
        let is_hard_constraint = HARD_CONSTRAINT_MARKERS.iter().any(|m| lower.contains(m));
        let is_blocking_error = kind == EventKind::ToolResult && lower.contains("error");
        if !is_hard_constraint && !is_blocking_error {
            return;
        }
        let invariant = StickyInvariant { text: text.to_string(), pinned_at: Utc::now() };
        let mut store = self.by_session.write().expect("sticky store poisoned");
        let entry = store.entry(session).or_default();
        if !entry.iter().any(|i| i.text == invariant.text) {
            entry.push(invariant);
        }
    }

    /// All invariants currently pinned for `session`, oldest first.
    pub fn get(&self, session: SessionId) -> Vec<StickyInvariant> {
        self.by_session
            .read()
            .expect("sticky store poisoned")
            .get(&session)
            .cloned()
            .unwrap_or_default()
    }

    /// Explicit user release of every invariant pinned for `session`.
    pub fn release(&self, session: SessionId) {
        self.by_session.write().expect("sticky store poisoned").remove(&session);
    }
}
