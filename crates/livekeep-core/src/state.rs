//! Capture task lifecycle.
//!
//! ```text
//! Pending → Resolving → Capturing → Finalizing → Done
//!              │                                  ▲
//!              └──────────── (filtered) ──────────┘
//! any non-terminal state → Failed
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Resolving,
    Capturing,
    Finalizing,
    Done,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;
        match (self, next) {
            (Pending, Resolving)
            | (Resolving, Capturing)
            | (Resolving, Done)
            | (Capturing, Finalizing)
            | (Finalizing, Done) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Resolving => "resolving",
            Self::Capturing => "capturing",
            Self::Finalizing => "finalizing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current state of one task plus the path it took to get there.
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: TaskState,
    history: Vec<TaskState>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: TaskState::Pending,
            history: vec![TaskState::Pending],
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn history(&self) -> &[TaskState] {
        &self.history
    }

    /// Move to `next`, returning the previous state.
    pub fn advance(&mut self, next: TaskState) -> Result<TaskState, CoreError> {
        if !self.state.can_transition_to(next) {
            return Err(CoreError::IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        let prev = self.state;
        self.state = next;
        self.history.push(next);
        Ok(prev)
    }

    /// Move to `Failed` unless already terminal.
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.state = TaskState::Failed;
            self.history.push(TaskState::Failed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TaskState::*;

    const ALL: [TaskState; 6] = [Pending, Resolving, Capturing, Finalizing, Done, Failed];

    #[test]
    fn happy_path() {
        let mut sm = StateMachine::new();
        for next in [Resolving, Capturing, Finalizing, Done] {
            sm.advance(next).expect("legal");
        }
        assert_eq!(sm.state(), Done);
        assert_eq!(sm.history(), &[Pending, Resolving, Capturing, Finalizing, Done]);
    }

    #[test]
    fn filtered_path_skips_capture() {
        let mut sm = StateMachine::new();
        sm.advance(Resolving).expect("legal");
        sm.advance(Done).expect("legal");
        assert!(!sm.history().contains(&Capturing));
    }

    #[test]
    fn failed_reachable_from_every_non_terminal_state() {
        for from in ALL {
            assert_eq!(from.can_transition_to(Failed), !from.is_terminal(), "{from}");
        }
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for from in [Done, Failed] {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn illegal_transition_rejected() {
        let mut sm = StateMachine::new();
        let err = sm.advance(Capturing).unwrap_err();
        assert!(matches!(
            err,
            CoreError::IllegalTransition { from: Pending, to: Capturing }
        ));
        assert_eq!(sm.state(), Pending);
    }

    #[test]
    fn fail_is_idempotent_and_sticky() {
        let mut sm = StateMachine::new();
        sm.advance(Resolving).expect("legal");
        sm.fail();
        sm.fail();
        assert_eq!(sm.state(), Failed);
        assert_eq!(sm.history(), &[Pending, Resolving, Failed]);
    }
}
