//! Presentation port
//!
//! One-way notifications from the session to whatever renders it. The session
//! never calls the port directly; it returns [`Notification`]s as effects and
//! the runner delivers them in order.

use crate::bar::Outcome;
use crate::session::{Phase, ResolvedBy, Role};

/// Connection status shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
    /// Recoverable failure, the user may retry immediately
    Error(String),
    /// Transport is gone for good, restart required
    Terminated(String),
}

/// UI sink for session state.
pub trait Presentation {
    fn on_phase_changed(&mut self, phase: Phase);

    /// `bar_percentage` is the local player's share of the bar.
    fn on_score_changed(&mut self, my_score: u32, opponent_score: u32, bar_percentage: f64);

    fn on_countdown_tick(&mut self, seconds_left: u32);

    fn on_time_tick(&mut self, seconds_left: u32);

    fn on_match_result(
        &mut self,
        outcome: Outcome,
        resolved_by: ResolvedBy,
        my_score: u32,
        opponent_score: u32,
    );

    fn on_role_assigned(&mut self, role: Role);

    fn on_connection_status(&mut self, status: &ConnectionStatus);

    /// Whether the play-again control should be enabled.
    fn on_rematch_available(&mut self, _available: bool) {}
}

/// A single presentation update.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    PhaseChanged(Phase),
    ScoreChanged {
        my_score: u32,
        opponent_score: u32,
        bar_percentage: f64,
    },
    CountdownTick(u32),
    TimeTick(u32),
    MatchResult {
        outcome: Outcome,
        resolved_by: ResolvedBy,
        my_score: u32,
        opponent_score: u32,
    },
    RoleAssigned(Role),
    ConnectionStatus(ConnectionStatus),
    RematchAvailable(bool),
}

impl Notification {
    /// Hand this update to `port`.
    pub fn deliver(self, port: &mut dyn Presentation) {
        match self {
            Self::PhaseChanged(phase) => port.on_phase_changed(phase),
            Self::ScoreChanged {
                my_score,
                opponent_score,
                bar_percentage,
            } => port.on_score_changed(my_score, opponent_score, bar_percentage),
            Self::CountdownTick(left) => port.on_countdown_tick(left),
            Self::TimeTick(left) => port.on_time_tick(left),
            Self::MatchResult {
                outcome,
                resolved_by,
                my_score,
                opponent_score,
            } => port.on_match_result(outcome, resolved_by, my_score, opponent_score),
            Self::RoleAssigned(role) => port.on_role_assigned(role),
            Self::ConnectionStatus(status) => port.on_connection_status(&status),
            Self::RematchAvailable(available) => port.on_rematch_available(available),
        }
    }
}

impl From<ConnectionStatus> for Notification {
    fn from(status: ConnectionStatus) -> Self {
        Self::ConnectionStatus(status)
    }
}

/// Records every update; handy for tests and headless embedding.
impl Presentation for Vec<Notification> {
    fn on_phase_changed(&mut self, phase: Phase) {
        self.push(Notification::PhaseChanged(phase));
    }

    fn on_score_changed(&mut self, my_score: u32, opponent_score: u32, bar_percentage: f64) {
        self.push(Notification::ScoreChanged {
            my_score,
            opponent_score,
            bar_percentage,
        });
    }

    fn on_countdown_tick(&mut self, seconds_left: u32) {
        self.push(Notification::CountdownTick(seconds_left));
    }

    fn on_time_tick(&mut self, seconds_left: u32) {
        self.push(Notification::TimeTick(seconds_left));
    }

    fn on_match_result(
        &mut self,
        outcome: Outcome,
        resolved_by: ResolvedBy,
        my_score: u32,
        opponent_score: u32,
    ) {
        self.push(Notification::MatchResult {
            outcome,
            resolved_by,
            my_score,
            opponent_score,
        });
    }

    fn on_role_assigned(&mut self, role: Role) {
        self.push(Notification::RoleAssigned(role));
    }

    fn on_connection_status(&mut self, status: &ConnectionStatus) {
        self.push(Notification::ConnectionStatus(status.clone()));
    }

    fn on_rematch_available(&mut self, available: bool) {
        self.push(Notification::RematchAvailable(available));
    }
}
