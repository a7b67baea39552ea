//! Session state machine
//!
//! Pure state transitions in the Elm style: `transition` takes the current
//! [`LoopState`] and an [`Event`] and returns the next state plus the
//! [`Effect`]s the session runtime must carry out. No I/O happens here.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::Event;
pub use state::{LoopState, SessionContext, SessionState};
pub use transition::{transition, TransitionError, TransitionResult};
