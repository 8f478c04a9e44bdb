//! Transport capability
//!
//! A transport provides one reliable, ordered, bidirectional channel to a
//! remote peer named by an opaque identifier. It is polled, never blocks, and
//! reports everything that happens through [`TransportEvent`]s. Game logic
//! never sees raw I/O errors: failures surface as `Failed` events or as
//! `Err` from `connect`/`send`, which the runner turns into session events.

use crate::error::TransportError;
use crate::net::messages::GameMessage;

/// Events reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The local identifier is known (startup or after re-establishing)
    IdentityAssigned(String),
    /// A remote peer opened a channel to us and it was accepted
    Incoming { remote_id: String },
    /// The channel is open for traffic
    Opened { remote_id: String },
    /// A message arrived on the open channel
    Message(GameMessage),
    /// The channel closed (either side)
    Closed,
    /// The channel failed
    Failed(TransportError),
    /// The listening/signaling endpoint dropped; the runner may call
    /// [`Transport::reconnect`] after a delay
    SignalingLost,
}

/// A peer-to-peer channel provider.
///
/// Implementations keep at most one channel. An inbound request that arrives
/// while a channel is open or mid-handshake is closed immediately and
/// produces no event.
pub trait Transport {
    /// Local identifier, once assigned.
    fn local_id(&self) -> Option<&str>;

    /// Begin opening a channel to `remote_id`.
    fn connect(&mut self, remote_id: &str) -> Result<(), TransportError>;

    /// Send one message on the open channel.
    fn send(&mut self, msg: GameMessage) -> Result<(), TransportError>;

    /// Close the channel, if any. Produces no `Closed` event locally.
    fn close(&mut self);

    /// Next pending event (non-blocking).
    fn poll(&mut self) -> Option<TransportEvent>;

    /// Re-establish the signaling endpoint after `SignalingLost`.
    fn reconnect(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Lifecycle of the single channel slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Closed,
    Handshaking,
    Open,
}

/// Holds the one channel a transport may own.
#[derive(Debug)]
pub struct Link<C> {
    state: LinkState,
    remote_id: Option<String>,
    channel: Option<C>,
}

impl<C> Default for Link<C> {
    fn default() -> Self {
        Self {
            state: LinkState::Closed,
            remote_id: None,
            channel: None,
        }
    }
}

impl<C> Link<C> {
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Open or mid-handshake.
    pub fn is_busy(&self) -> bool {
        self.state != LinkState::Closed
    }

    pub fn remote_id(&self) -> Option<&str> {
        self.remote_id.as_deref()
    }

    /// Claim the slot for a new channel in the handshaking state.
    pub fn begin(&mut self, remote_id: &str, channel: C) -> Result<(), TransportError> {
        if self.is_busy() {
            return Err(TransportError::AlreadyConnected);
        }
        self.state = LinkState::Handshaking;
        self.remote_id = Some(remote_id.to_string());
        self.channel = Some(channel);
        Ok(())
    }

    pub fn mark_open(&mut self) {
        if self.state == LinkState::Handshaking {
            self.state = LinkState::Open;
        }
    }

    /// Channel for sending; only an open channel qualifies.
    pub fn open_channel(&mut self) -> Result<&mut C, TransportError> {
        match (self.state, self.channel.as_mut()) {
            (LinkState::Open, Some(channel)) => Ok(channel),
            _ => Err(TransportError::NotConnected),
        }
    }

    /// Channel in any non-closed state, for reading.
    pub fn channel_mut(&mut self) -> Option<&mut C> {
        self.channel.as_mut()
    }

    /// Release the slot and hand back the channel.
    pub fn take(&mut self) -> Option<C> {
        self.state = LinkState::Closed;
        self.remote_id = None;
        self.channel.take()
    }
}
