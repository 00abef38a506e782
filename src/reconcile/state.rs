use super::diff::Plan;

/// Reconcile progress for one object
#[derive(Debug, Clone, PartialEq)]
pub enum Phase<T> {
    NeedsDiff,
    Pushing(Plan<T>),
    Committing(Plan<T>),
    Converged,
}

impl<T> Phase<T> {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::NeedsDiff => "needs_diff",
            Phase::Pushing(_) => "pushing",
            Phase::Committing(_) => "committing",
            Phase::Converged => "converged",
        }
    }
}

/// What a reconcile call ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Object no longer exists
    Deleted,
    /// Status already matched spec
    UpToDate,
    /// Changes were pushed and committed to status
    Pushed { del: usize, add: usize, update: usize },
}

impl ReconcileOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ReconcileOutcome::Deleted => "deleted",
            ReconcileOutcome::UpToDate => "up_to_date",
            ReconcileOutcome::Pushed { .. } => "pushed",
        }
    }
}
