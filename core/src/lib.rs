//! Tugwar Core - two-player tug of war over a direct peer connection
//!
//! This crate owns everything about a match that is not rendering:
//!
//! - [`Session`] - The single mutable aggregate and its transition function
//! - [`bar`] - Score differential to tug-bar position, win detection
//! - [`timers`] - Generation-guarded countdown and match clocks
//! - [`net`] - Message codec and the transport capability (TCP, loopback)
//! - [`Presentation`] - The port the session reports state changes through
//! - [`GameRunner`] - Run-to-completion driver wiring all of the above
//!
//! # Architecture
//!
//! ```text
//!   transport events ─┐
//!   user input ───────┼──▶ Session::apply(event) ──▶ effects
//!   timer ticks ──────┘                                │
//!                          ┌───────────────┬───────────┴──────┐
//!                          ▼               ▼                  ▼
//!                     Transport::send  TickScheduler    Presentation
//! ```

pub mod bar;
pub mod config;
pub mod error;
pub mod net;
pub mod presentation;
pub mod runner;
pub mod session;
pub mod timers;

pub use bar::{Outcome, PlayerSide};
pub use config::{GameConfig, MatchSettings, NetworkSettings};
pub use error::{BarError, ConfigError, SessionError, TransportError};
pub use net::{GameMessage, Transport, TransportEvent};
pub use presentation::{ConnectionStatus, Notification, Presentation};
pub use runner::GameRunner;
pub use session::{Effect, Effects, MatchResult, Phase, ResolvedBy, Role, Session, SessionEvent};
pub use timers::{TickScheduler, TimerKind, TimerToken};
