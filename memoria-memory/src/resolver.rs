//! Effective-View Resolver (§4.D).
//!
//! Composes a chunk's raw row with its approved edits into the view every
//! other component actually reads. History is never rewritten: this is a
//! pure function of `(chunk, edits)`, recomputed on every read rather than
//! stored, so it always reflects the latest approved edit set.

use std::collections::HashSet;

use memoria_core::{Channel, Chunk, EditOp, EditStatus, MemoryEdit};

/// The effective representation of a [`Chunk`] after composing its approved
/// edits (§4.D). Carries the same fields retrieval and assembly need, plus
/// the edit-derived flags.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveChunk {
    pub chunk: Chunk,
    pub is_retracted: bool,
    pub is_quarantined: bool,
    pub blocked_channels: HashSet<Channel>,
    pub edits_applied_count: usize,
}

impl EffectiveChunk {
    /// Whether this view should ever be returned from an auto-retrieval
    /// query (as opposed to an explicit get-by-id), per §4.D.
    pub fn visible_to_retrieval(&self, caller_channel: Channel) -> bool {
        !self.is_retracted && !self.is_quarantined && !self.blocked_channels.contains(&caller_channel)
    }
}

/// Sort key for same-type edit tie-breaking: `applied_at` DESC, then edit id
/// DESC (§4.D). Edits without `applied_at` sort last since they are not yet
/// approved and should never reach this function.
fn tie_break_key(edit: &MemoryEdit) -> (std::cmp::Reverse<i64>, std::cmp::Reverse<String>) {
    let applied_nanos = edit.applied_at.map(|t| t.timestamp_nanos_opt().unwrap_or(0)).unwrap_or(i64::MIN);
    (std::cmp::Reverse(applied_nanos), std::cmp::Reverse(edit.id.to_string()))
}

/// Resolve a chunk's effective view by composing its approved edits (§4.D).
/// Only `approved` edits participate; `pending`/`rejected` edits never
/// affect the effective view.
pub fn resolve_effective(chunk: &Chunk, edits: &[MemoryEdit]) -> EffectiveChunk {
    let mut approved: Vec<&MemoryEdit> = edits
        .iter()
        .filter(|e| e.status == EditStatus::Approved)
        .collect();
    approved.sort_by_key(|e| tie_break_key(e));

    let mut effective = chunk.clone();
    let mut is_retracted = false;
    let mut is_quarantined = false;
    let mut blocked_channels = HashSet::new();
    let mut attenuation_sum = 0.0_f32;
    let mut attenuation_absolute: Option<f32> = None;
    let mut amend_applied = false;

    // Iterate oldest-first so that "latest wins" / "sum of deltas" behave
    // correctly, even though `approved` is sorted newest-first for the
    // amend tie-break below.
    for edit in approved.iter().rev() {
        match (edit.op, &edit.patch) {
            (EditOp::Retract, _) => is_retracted = true,
            (EditOp::Quarantine, _) => is_quarantined = true,
            (EditOp::Block, memoria_core::EditPatch::Block { channel }) => {
                blocked_channels.insert(*channel);
            }
            (EditOp::Attenuate, memoria_core::EditPatch::Attenuate { importance, importance_delta }) => {
                if let Some(abs) = importance {
                    attenuation_absolute = Some(*abs);
                    attenuation_sum = 0.0;
                } else if let Some(delta) = importance_delta {
                    attenuation_sum += delta;
                }
            }
            _ => {}
        }
    }

    // Amend: latest by applied_at wins, so take the first in the
    // newest-first `approved` ordering.
    for edit in approved.iter() {
        if let (EditOp::Amend, memoria_core::EditPatch::Amend { text, importance }) = (edit.op, &edit.patch) {
            if !amend_applied {
                if let Some(text) = text {
                    effective.text = text.clone();
                }
                if let Some(importance) = importance {
                    effective.importance = *importance;
                }
                amend_applied = true;
            }
        }
    }

    if attenuation_absolute.is_some() || attenuation_sum != 0.0 {
        let base = attenuation_absolute.unwrap_or(effective.importance);
        effective.importance = (base + attenuation_sum).clamp(0.0, 1.0);
    }

    let edits_applied_count = approved.len();

    EffectiveChunk {
        chunk: effective,
        is_retracted,
        is_quarantined,
        blocked_channels,
        edits_applied_count,
    }
}
