//! Networking for Tugwar
//!
//! - [`messages`] - Protocol messages and their framing
//! - [`transport`] - The transport capability the session is driven by
//! - [`tcp`] - TCP implementation for LAN/localhost play
//! - [`loopback`] - In-process implementation for tests and hot-seat play
//!
//! # Protocol Flow
//!
//! ```text
//! Initiator                      Receiver
//!   |                              |
//!   |=== channel open ============>|
//!   |                              |
//!   |--- Ready ------------------->|  (either order)
//!   |<-- Ready --------------------|
//!   |                              |
//!   |   countdown      countdown   |
//!   |                              |
//!   |--- Click ------------------->|  (many, both directions)
//!   |<-- Click --------------------|
//!   |                              |
//!   |--- Reset ------------------->|  (on local resolution)
//!   |<-- Reset --------------------|
//! ```

pub mod loopback;
pub mod messages;
pub mod tcp;
pub mod transport;

pub use loopback::{LoopbackNetwork, LoopbackTransport};
pub use messages::{DecodeError, FrameBuffer, GameMessage, TUGW_HEADER_SIZE, TUGW_MAGIC, TUGW_VERSION};
pub use tcp::TcpTransport;
pub use transport::{Link, LinkState, Transport, TransportEvent};
