// SPDX-License-Identifier: GPL-3.0-only

//! Device lifecycle as a pure transition function
//!
//! The device wrapper feeds every request and every adapter outcome through
//! [`transition`] and performs the returned [`Effect`]. Keeping the table here
//! means the fail-fast close on record errors can be tested without an
//! adapter.
//!
//! ```text
//!            open ok                    record ok
//!   ┌────────┐ ───────────────▶ ┌────────┐ ◀──┐
//!   │ Closed │                  │ Opened │ ───┘
//!   └────────┘ ◀─────────────── └────────┘
//!          close / record failed (adapter closed)
//! ```

use super::types::State;

/// Something that happened to a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    OpenRequested,
    OpenSucceeded,
    OpenFailed,
    CloseRequested,
    RecordRequested,
    RecordSucceeded,
    RecordFailed,
}

/// Side effect the wrapper must carry out for a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Nothing,
    /// Call through to the adapter operation that was requested
    InvokeAdapter,
    /// Call the adapter's close
    CloseAdapter,
    /// Refuse the request with `InvalidState` without touching the adapter
    Reject,
}

/// Result of applying an event to a state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub next: State,
    pub effect: Effect,
}

impl Step {
    const fn new(next: State, effect: Effect) -> Self {
        Self { next, effect }
    }
}

/// Apply `event` to `state`
pub const fn transition(state: State, event: Event) -> Step {
    use Effect::*;
    use State::*;

    match (state, event) {
        (Closed, Event::OpenRequested) => Step::new(Closed, InvokeAdapter),
        // A second open would leak the first capture session
        (Opened, Event::OpenRequested) => Step::new(Opened, Reject),
        (_, Event::OpenSucceeded) => Step::new(Opened, Nothing),
        (_, Event::OpenFailed) => Step::new(Closed, Nothing),

        (Opened, Event::CloseRequested) => Step::new(Closed, CloseAdapter),
        (Closed, Event::CloseRequested) => Step::new(Closed, Nothing),

        (Opened, Event::RecordRequested) => Step::new(Opened, InvokeAdapter),
        (Closed, Event::RecordRequested) => Step::new(Closed, Reject),
        (Opened, Event::RecordSucceeded) => Step::new(Opened, Nothing),
        (Opened, Event::RecordFailed) => Step::new(Closed, CloseAdapter),
        (Closed, Event::RecordSucceeded | Event::RecordFailed) => Step::new(Closed, Nothing),
    }
}
