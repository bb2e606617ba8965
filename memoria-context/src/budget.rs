//! Section budget allocation (§4.H).
//!
//! Generalizes the token-budget/segment-tracking machinery this codebase
//! uses elsewhere for packing heterogeneous sections under one ceiling, from
//! six fixed section names (user/system/persona/artifacts/notes/history) to
//! the ACB section set (rules/task_state/decisions/evidence/recent/capsules).

use memoria_core::{AcbSection, SectionBudgetFractions};

/// Per-section token caps for one `build_acb` call, computed from the
/// mode's fraction table and the caller's `max_tokens`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionBudgets {
    pub rules: u32,
    pub task_state: u32,
    pub decisions: u32,
    pub evidence: u32,
    pub recent: u32,
    pub capsules: u32,
}

impl SectionBudgets {
    pub fn get(&self, section: AcbSection) -> u32 {
        match section {
            AcbSection::Rules => self.rules,
            AcbSection::TaskState => self.task_state,
            AcbSection::Decisions => self.decisions,
            AcbSection::Evidence => self.evidence,
            AcbSection::Recent => self.recent,
            AcbSection::Capsules => self.capsules,
        }
    }
}

/// Allocate per-section token budgets for `max_tokens` total, using the
/// given mode's fraction table (§4.H table).
pub fn allocate_section_budgets(max_tokens: u32, fractions: &SectionBudgetFractions) -> SectionBudgets {
    let scale = |fraction: f32| (max_tokens as f32 * fraction).floor() as u32;
    SectionBudgets {
        rules: scale(fractions.rules),
        task_state: scale(fractions.task_state),
        decisions: scale(fractions.decisions),
        evidence: scale(fractions.evidence),
        recent: scale(fractions.recent),
        capsules: scale(fractions.capsules),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_never_exceeds_max_tokens_in_aggregate() {
        let fractions = SectionBudgetFractions {
            rules: 0.15,
            task_state: 0.10,
            decisions: 0.15,
            evidence: 0.35,
            recent: 0.20,
            capsules: 0.05,
        };
        let budgets = allocate_section_budgets(65_000, &fractions);
        let total = budgets.rules + budgets.task_state + budgets.decisions + budgets.evidence + budgets.recent + budgets.capsules;
        assert!(total <= 65_000);
    }

    #[test]
    fn zero_fraction_yields_zero_budget() {
        let fractions = SectionBudgetFractions {
            rules: 0.0,
            task_state: 0.0,
            decisions: 0.0,
            evidence: 1.0,
            recent: 0.0,
            capsules: 0.0,
        };
        let budgets = allocate_section_budgets(1000, &fractions);
        assert_eq!(budgets.task_state, 0);
        assert_eq!(budgets.evidence, 1000);
    }
}
