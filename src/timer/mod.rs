//! Timers for both kinds of tracked work. [engine::TimerEngine] holds the state machine and is
//! specialized through [tracking::Tracking]:
//!  - [billable::Billable] tracks time entries against projects.
//!  - [focus::Focus] tracks focus sessions.

pub mod billable;
pub mod engine;
pub mod focus;
pub mod state;
pub mod ticker;
pub mod tracking;
