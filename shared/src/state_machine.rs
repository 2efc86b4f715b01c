//! Dispatch State Machine
//!
//! Defines the valid transitions of the command dispatch engine. At most one
//! command executes at a time, and an emergency blocks the queue until it
//! settles.

/// States of the dispatch engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchState {
    /// Nothing in flight; the queue may be dequeued
    #[default]
    Idle,
    /// A normal command is being sent or awaiting its reply
    Executing,
    /// The emergency command is in flight; the queue is frozen
    Emergency,
}

/// Events that can trigger state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchEvent {
    /// Head of the queue taken for execution
    Dequeued,
    /// The executing command settled (success, refusal or failure)
    Settled,
    /// Emergency requested by the caller
    EmergencyRequested,
    /// The emergency command settled
    EmergencySettled,
    /// Engine torn down
    Reset,
}

/// Result of a state transition attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition was valid and state changed
    Success(DispatchState),
    /// Transition was invalid from current state
    Invalid {
        from: DispatchState,
        event: DispatchEvent,
    },
}

/// The dispatch state machine
#[derive(Debug, Default)]
pub struct DispatchStateMachine {
    current_state: DispatchState,
}

impl DispatchStateMachine {
    /// Create a new state machine in Idle state
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current state
    pub fn state(&self) -> DispatchState {
        self.current_state
    }

    /// Whether the head of the queue may be taken now
    pub fn can_dequeue(&self) -> bool {
        self.current_state == DispatchState::Idle
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: DispatchEvent) -> TransitionResult {
        match self.get_next_state(event) {
            Some(state) => {
                self.current_state = state;
                TransitionResult::Success(state)
            }
            None => TransitionResult::Invalid {
                from: self.current_state,
                event,
            },
        }
    }

    /// Get the next state for a given event, if the transition is valid
    fn get_next_state(&self, event: DispatchEvent) -> Option<DispatchState> {
        use DispatchEvent::*;
        use DispatchState::*;

        match (self.current_state, event) {
            // Emergency and teardown win from anywhere
            (_, EmergencyRequested) => Some(Emergency),
            (_, Reset) => Some(Idle),

            (Idle, Dequeued) => Some(Executing),
            (Executing, Settled) => Some(Idle),
            (Emergency, EmergencySettled) => Some(Idle),

            _ => None,
        }
    }
}

/// Check if a transition from one state to another is generally valid
pub fn is_valid_transition(from: DispatchState, to: DispatchState) -> bool {
    use DispatchState::*;

    match (from, to) {
        (_, Emergency) => true,
        (_, Idle) => true,
        (Idle, Executing) => true,
        _ => false,
    }
}
