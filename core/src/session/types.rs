//! Core types for tugwar sessions

use smallvec::SmallVec;

use crate::bar::{Outcome, PlayerSide};
use crate::error::TransportError;
use crate::net::GameMessage;
use crate::presentation::Notification;
use crate::timers::TimerToken;

/// Which side of the connect call this process was on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    #[default]
    Unassigned,
    /// Originated the connect call; plays as Player One
    Initiator,
    /// Accepted an inbound connection; plays as Player Two
    Receiver,
}

impl Role {
    /// Seat on the bar, once known.
    pub fn side(self) -> Option<PlayerSide> {
        match self {
            Self::Unassigned => None,
            Self::Initiator => Some(PlayerSide::One),
            Self::Receiver => Some(PlayerSide::Two),
        }
    }

    /// Role the remote peer holds.
    pub fn counterpart(self) -> Self {
        match self {
            Self::Unassigned => Self::Unassigned,
            Self::Initiator => Self::Receiver,
            Self::Receiver => Self::Initiator,
        }
    }
}

/// Session phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// No channel
    #[default]
    Idle,
    /// Channel requested or accepted, not yet open
    Connecting,
    /// Channel open, nobody ready
    Connected,
    /// Ready handshake in progress
    AwaitingReady,
    /// Both ready, pre-match countdown running
    Countdown,
    /// Match clock running, clicks count
    Active,
    /// Match over, result shown
    Resolved,
}

impl Phase {
    /// Whether a channel is open or opening.
    pub fn is_connected(self) -> bool {
        !matches!(self, Self::Idle)
    }
}

/// How a match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedBy {
    /// Differential reached the push threshold
    Push,
    /// Match clock ran out
    Time,
}

/// Final result of a match, in local perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchResult {
    pub outcome: Outcome,
    pub resolved_by: ResolvedBy,
    pub my_score: u32,
    pub opponent_score: u32,
}

/// Everything that can happen to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Transport assigned the local identifier
    IdentityAssigned(String),
    /// User asked to connect to `remote_id`
    ConnectRequested(String),
    /// Transport accepted an inbound channel
    IncomingAccepted(String),
    /// Channel open for traffic
    TransportOpened(String),
    /// Channel closed by the peer
    TransportClosed,
    /// Channel or transport failed
    TransportFailed(TransportError),
    /// Peer message arrived
    MessageReceived(GameMessage),
    /// User pressed ready
    ReadyPressed,
    /// User pressed play again
    PlayAgainPressed,
    /// User clicked during a match
    Clicked,
    /// User chose to leave the current opponent
    LeaveRequested,
    /// One time unit elapsed for the timer identified by the token
    TimerTick(TimerToken),
}

impl From<GameMessage> for SessionEvent {
    fn from(msg: GameMessage) -> Self {
        Self::MessageReceived(msg)
    }
}

/// Side effects requested by a transition, executed in order by the runner.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Open a channel to the remote peer
    Connect(String),
    /// Send a message on the open channel
    Send(GameMessage),
    /// Close the channel
    Close,
    /// Begin ticking a timer, replacing its slot
    StartTimer(TimerToken),
    /// Stop ticking one timer
    StopTimer(TimerToken),
    /// Stop every timer
    CancelTimers,
    /// Update the presentation
    Notify(Notification),
}

/// Effects of one transition.
pub type Effects = SmallVec<[Effect; 8]>;
