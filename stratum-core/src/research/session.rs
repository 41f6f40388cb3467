//! Research run state machine.
//!
//! A run moves strictly forward:
//! `Plan -> ExecuteInitial -> Analyze -> CollectFollowUps -> (ExecuteFollowUp)? -> Merge -> Synthesize -> Done`.
//! Follow-up searches run at most once and are never re-analyzed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

/// Current phase of a research run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResearchPhase {
    /// Building the layered query plan.
    Plan,
    /// Running the planned queries.
    ExecuteInitial,
    /// Asking the model for gap analysis.
    Analyze,
    /// Turning gaps into follow-up queries.
    CollectFollowUps,
    /// Running follow-up queries.
    ExecuteFollowUp,
    /// Combining result sets and rescoring sources.
    Merge,
    /// Writing the final narrative.
    Synthesize,
    Done,
}

impl ResearchPhase {
    /// Whether `next` may directly follow this phase.
    pub fn can_advance_to(self, next: ResearchPhase) -> bool {
        use ResearchPhase::*;
        matches!(
            (self, next),
            (Plan, ExecuteInitial)
                | (ExecuteInitial, Analyze)
                | (Analyze, CollectFollowUps)
                | (CollectFollowUps, ExecuteFollowUp)
                | (CollectFollowUps, Merge)
                | (ExecuteFollowUp, Merge)
                | (Merge, Synthesize)
                | (Synthesize, Done)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResearchPhase::Plan => "plan",
            ResearchPhase::ExecuteInitial => "execute_initial",
            ResearchPhase::Analyze => "analyze",
            ResearchPhase::CollectFollowUps => "collect_follow_ups",
            ResearchPhase::ExecuteFollowUp => "execute_follow_up",
            ResearchPhase::Merge => "merge",
            ResearchPhase::Synthesize => "synthesize",
            ResearchPhase::Done => "done",
        }
    }
}

impl std::fmt::Display for ResearchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bookkeeping for one research run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchSession {
    pub id: Uuid,
    pub topic: String,
    pub phase: ResearchPhase,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Phases visited, in order.
    pub history: Vec<ResearchPhase>,
}

impl ResearchSession {
    pub fn new(topic: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            topic: topic.into(),
            phase: ResearchPhase::Plan,
            created_at: now,
            updated_at: now,
            history: vec![ResearchPhase::Plan],
        }
    }

    /// Move to `next` if the transition is legal.
    ///
    /// Returns false and leaves the phase unchanged otherwise.
    pub fn transition(&mut self, next: ResearchPhase) -> bool {
        if !self.phase.can_advance_to(next) {
            warn!(session = %self.id, from = %self.phase, to = %next, "Rejected research phase transition");
            return false;
        }
        debug!(session = %self.id, from = %self.phase, to = %next, "Research phase transition");
        self.phase = next;
        self.updated_at = Utc::now();
        self.history.push(next);
        true
    }

    pub fn is_done(&self) -> bool {
        self.phase == ResearchPhase::Done
    }

    /// Whether follow-up searches were executed in this run.
    pub fn ran_follow_ups(&self) -> bool {
        self.history.contains(&ResearchPhase::ExecuteFollowUp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ResearchPhase::*;

    #[test]
    fn test_full_lifecycle_with_follow_ups() {
        let mut session = ResearchSession::new("edge computing");
        for phase in [
            ExecuteInitial,
            Analyze,
            CollectFollowUps,
            ExecuteFollowUp,
            Merge,
            Synthesize,
            Done,
        ] {
            assert!(session.transition(phase), "transition to {phase} failed");
        }
        assert!(session.is_done());
        assert!(session.ran_follow_ups());
        assert_eq!(session.history.len(), 8);
    }

    #[test]
    fn test_follow_ups_can_be_skipped() {
        let mut session = ResearchSession::new("t");
        for phase in [ExecuteInitial, Analyze, CollectFollowUps, Merge] {
            assert!(session.transition(phase));
        }
        assert!(!session.ran_follow_ups());
    }

    #[test]
    fn test_no_loop_back_or_skipping() {
        let mut session = ResearchSession::new("t");
        assert!(!session.transition(Analyze));
        assert_eq!(session.phase, Plan);

        for phase in [ExecuteInitial, Analyze, CollectFollowUps, ExecuteFollowUp] {
            session.transition(phase);
        }
        assert!(!session.transition(Analyze));
        assert!(!session.transition(ExecuteFollowUp));
        assert_eq!(session.phase, ExecuteFollowUp);
        assert!(!Done.can_advance_to(Plan));
    }

    #[test]
    fn test_phase_serialization() {
        assert_eq!(
            serde_json::to_value(CollectFollowUps).unwrap(),
            serde_json::json!("collect_follow_ups")
        );
        assert_eq!(ExecuteFollowUp.to_string(), "execute_follow_up");
    }
}
