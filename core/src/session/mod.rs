//! Match session
//!
//! A [`Session`] tracks one connection to one opponent, from the connect call
//! through any number of matches, until the channel closes.
//!
//! # Phase Flow
//!
//! ```text
//! Idle ──connect/accept──▶ Connecting ──open──▶ Connected
//!                                                   │ ready (either side)
//!                                                   ▼
//!                                             AwaitingReady ◀──────────┐
//!                                                   │ both ready       │ ready/reset
//!                                                   ▼                  │
//!                                              Countdown ──▶ Active ──▶ Resolved
//!
//! any phase ──close/failure/leave──▶ Idle
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use tugwar_core::{MatchSettings, Session, SessionEvent};
//!
//! let mut session = Session::new(MatchSettings::default());
//! session.apply(SessionEvent::IdentityAssigned("10.0.0.2:7780".into()));
//!
//! for effect in session.apply(SessionEvent::ConnectRequested("10.0.0.3:7780".into())) {
//!     // hand effect to the runner
//! }
//! ```

mod machine;
mod types;

#[cfg(test)]
mod tests;

pub use machine::Session;
pub use types::{Effect, Effects, MatchResult, Phase, ResolvedBy, Role, SessionEvent};
