//! The execution context's lifecycle state machine.
//!
//! `Initializing -> Ready -> Processing -> (Idle | Error) -> Terminating`.
//! `Ready` and `Idle` are equivalent entry points for new work. `Error` is
//! recoverable only through an explicit re-initialization; the machine
//! never self-heals. `Terminating` is absorbing: any transition attempted
//! from it is a structural error indicating a caller bug.

use serde::Serialize;

/// Lifecycle state of one execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Initializing,
    Ready,
    Processing,
    Idle,
    Error,
    Terminating,
}

impl EngineState {
    /// Whether new work may start from this state.
    pub fn accepts_work(self) -> bool {
        matches!(self, EngineState::Ready | EngineState::Idle)
    }
}

/// Rejected transition attempts.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// The requested transition is not in the lifecycle graph.
    #[error("Illegal engine state transition: {from:?} -> {to:?}")]
    IllegalTransition { from: EngineState, to: EngineState },

    /// A job is already processing; the single-job invariant forbids a
    /// second one on the same context.
    #[error("Engine is already processing a job")]
    Busy,

    /// The context is terminating. Structural: the caller should not be
    /// issuing work against a context it has already shut down.
    #[error("Engine context is terminating and accepts no further transitions")]
    Terminated,
}

/// Tracks and enforces the lifecycle of one execution context.
///
/// Owned by the context's run loop; never shared across threads.
#[derive(Debug)]
pub struct EngineStateMachine {
    state: EngineState,
}

impl EngineStateMachine {
    pub fn new() -> Self {
        Self {
            state: EngineState::Initializing,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// `Initializing -> Ready`, completing (re-)initialization.
    pub fn mark_ready(&mut self) -> Result<(), StateError> {
        self.transition(EngineState::Ready, |from| {
            matches!(from, EngineState::Initializing)
        })
    }

    /// `Ready | Idle -> Processing`. Rejects a second concurrent job with
    /// [`StateError::Busy`], and an un-reinitialized error state with
    /// [`StateError::IllegalTransition`].
    pub fn begin_processing(&mut self) -> Result<(), StateError> {
        if self.state == EngineState::Processing {
            return Err(StateError::Busy);
        }
        self.transition(EngineState::Processing, EngineState::accepts_work)
    }

    /// `Processing -> Idle`, the context is ready for the next job.
    pub fn finish_processing(&mut self) -> Result<(), StateError> {
        self.transition(EngineState::Idle, |from| {
            matches!(from, EngineState::Processing)
        })
    }

    /// Any working state `-> Error`. The context stays poisoned until
    /// [`Self::reinitialize`] is called.
    pub fn fail(&mut self) -> Result<(), StateError> {
        self.transition(EngineState::Error, |from| from != EngineState::Error)
    }

    /// `Error -> Initializing`, the explicit recovery step. A fresh
    /// [`Self::mark_ready`] must follow once the new instance is up.
    pub fn reinitialize(&mut self) -> Result<(), StateError> {
        self.transition(EngineState::Initializing, |from| {
            matches!(from, EngineState::Error)
        })
    }

    /// Any state `-> Terminating`. Absorbing.
    pub fn begin_terminating(&mut self) -> Result<(), StateError> {
        self.transition(EngineState::Terminating, |_| true)
    }

    fn transition(
        &mut self,
        to: EngineState,
        legal_from: impl Fn(EngineState) -> bool,
    ) -> Result<(), StateError> {
        if self.state == EngineState::Terminating {
            return Err(StateError::Terminated);
        }
        if !legal_from(self.state) {
            return Err(StateError::IllegalTransition {
                from: self.state,
                to,
            });
        }
        tracing::debug!(from = ?self.state, ?to, "Engine state transition");
        self.state = to;
        Ok(())
    }
}

impl Default for EngineStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn ready_machine() -> EngineStateMachine {
        let mut sm = EngineStateMachine::new();
        sm.mark_ready().unwrap();
        sm
    }

    #[test]
    fn happy_path_cycles_through_idle() {
        let mut sm = ready_machine();
        sm.begin_processing().unwrap();
        sm.finish_processing().unwrap();
        assert_eq!(sm.state(), EngineState::Idle);
        // Idle is an equivalent entry point for the next job.
        sm.begin_processing().unwrap();
        assert_eq!(sm.state(), EngineState::Processing);
    }

    #[test]
    fn processing_rejects_a_second_job() {
        let mut sm = ready_machine();
        sm.begin_processing().unwrap();
        assert_matches!(sm.begin_processing(), Err(StateError::Busy));
    }

    #[test]
    fn initializing_does_not_accept_work() {
        let mut sm = EngineStateMachine::new();
        assert_matches!(
            sm.begin_processing(),
            Err(StateError::IllegalTransition { .. })
        );
    }

    #[test]
    fn error_state_requires_explicit_reinitialization() {
        let mut sm = ready_machine();
        sm.begin_processing().unwrap();
        sm.fail().unwrap();
        assert_matches!(
            sm.begin_processing(),
            Err(StateError::IllegalTransition { .. })
        );
        sm.reinitialize().unwrap();
        sm.mark_ready().unwrap();
        sm.begin_processing().unwrap();
    }

    #[test]
    fn reinitialize_only_applies_to_error_state() {
        let mut sm = ready_machine();
        assert_matches!(
            sm.reinitialize(),
            Err(StateError::IllegalTransition { .. })
        );
    }

    #[test]
    fn terminating_is_absorbing() {
        let mut sm = ready_machine();
        sm.begin_terminating().unwrap();
        assert_matches!(sm.begin_processing(), Err(StateError::Terminated));
        assert_matches!(sm.mark_ready(), Err(StateError::Terminated));
        assert_matches!(sm.fail(), Err(StateError::Terminated));
        assert_matches!(sm.begin_terminating(), Err(StateError::Terminated));
    }

    #[test]
    fn termination_is_reachable_from_any_live_state() {
        for setup in [
            |_: &mut EngineStateMachine| {},
            |sm: &mut EngineStateMachine| sm.mark_ready().unwrap(),
            |sm: &mut EngineStateMachine| {
                sm.mark_ready().unwrap();
                sm.begin_processing().unwrap();
            },
            |sm: &mut EngineStateMachine| {
                sm.mark_ready().unwrap();
                sm.begin_processing().unwrap();
                sm.fail().unwrap();
            },
        ] {
            let mut sm = EngineStateMachine::new();
            setup(&mut sm);
            sm.begin_terminating().unwrap();
            assert_eq!(sm.state(), EngineState::Terminating);
        }
    }
}
