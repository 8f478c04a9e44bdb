//! Session state machine
//!
//! [`Session`] is the only mutable state of a match. Every change goes through
//! [`Session::handle`] (or [`Session::apply`]), which mutates the session and
//! returns the effects the caller must execute. Nothing here performs I/O.

use crate::bar::{self, Outcome};
use crate::config::MatchSettings;
use crate::error::{BarError, SessionError, TransportError};
use crate::net::GameMessage;
use crate::presentation::{ConnectionStatus, Notification};
use crate::timers::{RunningTimer, Tick, TimerKind, TimerSlot, TimerToken};

use super::types::{Effect, Effects, MatchResult, Phase, ResolvedBy, Role, SessionEvent};

/// One match-making session between this process and a single peer.
#[derive(Debug, Clone)]
pub struct Session {
    settings: MatchSettings,
    local_id: Option<String>,
    remote_id: Option<String>,
    role: Role,
    phase: Phase,
    my_score: u32,
    opponent_score: u32,
    my_ready: bool,
    opponent_ready: bool,
    /// Countdown or match clock, whichever the phase needs
    clock: Option<RunningTimer>,
    /// Rematch cool-down
    cooldown: Option<RunningTimer>,
    /// Bumped on every timer start and every reset
    generation: u64,
    last_result: Option<MatchResult>,
    /// Transport is gone for good
    terminated: bool,
}

impl Session {
    pub fn new(settings: MatchSettings) -> Self {
        Self {
            settings,
            local_id: None,
            remote_id: None,
            role: Role::Unassigned,
            phase: Phase::Idle,
            my_score: 0,
            opponent_score: 0,
            my_ready: false,
            opponent_ready: false,
            clock: None,
            cooldown: None,
            generation: 0,
            last_result: None,
            terminated: false,
        }
    }

    pub fn settings(&self) -> &MatchSettings {
        &self.settings
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn local_id(&self) -> Option<&str> {
        self.local_id.as_deref()
    }

    pub fn remote_id(&self) -> Option<&str> {
        self.remote_id.as_deref()
    }

    pub fn my_score(&self) -> u32 {
        self.my_score
    }

    pub fn opponent_score(&self) -> u32 {
        self.opponent_score
    }

    pub fn my_ready(&self) -> bool {
        self.my_ready
    }

    pub fn opponent_ready(&self) -> bool {
        self.opponent_ready
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn last_result(&self) -> Option<MatchResult> {
        self.last_result
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Match clock units left, only while a match is running.
    pub fn time_remaining(&self) -> Option<u32> {
        self.clock
            .filter(|c| c.kind() == TimerKind::Match)
            .map(|c| c.remaining())
    }

    /// Countdown units left, only while the countdown is running.
    pub fn countdown_remaining(&self) -> Option<u32> {
        self.clock
            .filter(|c| c.kind() == TimerKind::Countdown)
            .map(|c| c.remaining())
    }

    pub fn is_cooling_down(&self) -> bool {
        self.cooldown.is_some()
    }

    /// Whether the play-again control should be enabled.
    pub fn rematch_available(&self) -> bool {
        !self.terminated
            && self.cooldown.is_none()
            && !self.my_ready
            && matches!(self.phase, Phase::Resolved | Phase::AwaitingReady)
    }

    /// Local player's share of the bar.
    pub fn bar_percentage(&self) -> Result<f64, BarError> {
        bar::local_share(
            self.my_score,
            self.opponent_score,
            self.role,
            self.settings.push_threshold,
        )
    }

    /// Validate a connect request and return the normalised remote id.
    pub fn check_connect(&self, remote_id: &str) -> Result<String, SessionError> {
        if self.terminated {
            return Err(SessionError::Terminated);
        }
        let remote_id = remote_id.trim();
        if remote_id.is_empty() {
            return Err(SessionError::InvalidRemoteId);
        }
        if self.phase != Phase::Idle {
            return Err(SessionError::AlreadyConnected);
        }
        let Some(local_id) = self.local_id.as_deref() else {
            return Err(SessionError::IdentityPending);
        };
        if remote_id == local_id {
            return Err(SessionError::SelfConnectAttempt);
        }
        Ok(remote_id.to_string())
    }

    /// Apply an event, turning rejections into their presentation effects.
    pub fn apply(&mut self, event: SessionEvent) -> Effects {
        match self.handle(event) {
            Ok(fx) => fx,
            Err(e) => self.rejection_effects(&e),
        }
    }

    /// Apply an event. User actions the current phase does not allow are
    /// returned as errors and leave the session untouched.
    pub fn handle(&mut self, event: SessionEvent) -> Result<Effects, SessionError> {
        let mut fx = Effects::new();
        match event {
            SessionEvent::IdentityAssigned(id) => self.on_identity(id),
            SessionEvent::ConnectRequested(remote_id) => self.on_connect(&remote_id, &mut fx)?,
            SessionEvent::IncomingAccepted(remote_id) => self.on_incoming(remote_id, &mut fx),
            SessionEvent::TransportOpened(remote_id) => self.on_opened(remote_id, &mut fx),
            SessionEvent::TransportClosed => self.on_closed(&mut fx),
            SessionEvent::TransportFailed(err) => self.on_failed(err, &mut fx),
            SessionEvent::MessageReceived(msg) => self.on_message(msg, &mut fx),
            SessionEvent::ReadyPressed => self.on_local_ready("ready", &mut fx)?,
            SessionEvent::PlayAgainPressed => self.on_local_ready("play again", &mut fx)?,
            SessionEvent::Clicked => self.on_click(&mut fx)?,
            SessionEvent::LeaveRequested => self.on_leave(&mut fx)?,
            SessionEvent::TimerTick(token) => self.on_tick(token, &mut fx),
        }
        Ok(fx)
    }

    /// Effects that report a rejected user action.
    pub fn rejection_effects(&self, err: &SessionError) -> Effects {
        let mut fx = Effects::new();
        if err.is_connect_rejection() {
            tracing::warn!(error = %err, "Connect rejected");
            fx.push(notify(ConnectionStatus::Error(err.to_string()).into()));
        } else {
            tracing::debug!(error = %err, "Action rejected");
        }
        fx
    }

    // ------------------------------------------------------------------
    // Connection lifecycle
    // ------------------------------------------------------------------

    fn on_identity(&mut self, id: String) {
        match self.local_id.as_deref() {
            None => {
                tracing::info!(%id, "Local identity assigned");
                self.local_id = Some(id);
            }
            Some(current) if current == id => {}
            Some(current) => {
                tracing::warn!(%current, new = %id, "Ignoring identity change");
            }
        }
    }

    fn on_connect(&mut self, remote_id: &str, fx: &mut Effects) -> Result<(), SessionError> {
        let remote_id = self.check_connect(remote_id)?;

        tracing::info!(%remote_id, "Connecting as initiator");
        self.role = Role::Initiator;
        self.remote_id = Some(remote_id.clone());
        self.set_phase(Phase::Connecting, fx);
        fx.push(notify(Notification::RoleAssigned(self.role)));
        fx.push(notify(ConnectionStatus::Connecting.into()));
        fx.push(Effect::Connect(remote_id));
        Ok(())
    }

    fn on_incoming(&mut self, remote_id: String, fx: &mut Effects) {
        if self.phase != Phase::Idle || self.terminated {
            tracing::warn!(%remote_id, phase = ?self.phase, "Ignoring inbound connection");
            return;
        }

        tracing::info!(%remote_id, "Accepted connection as receiver");
        self.role = Role::Receiver;
        self.remote_id = Some(remote_id);
        self.set_phase(Phase::Connecting, fx);
        fx.push(notify(Notification::RoleAssigned(self.role)));
        fx.push(notify(ConnectionStatus::Connecting.into()));
    }

    fn on_opened(&mut self, remote_id: String, fx: &mut Effects) {
        if self.phase != Phase::Connecting {
            tracing::debug!(%remote_id, phase = ?self.phase, "Ignoring open outside Connecting");
            return;
        }

        tracing::info!(%remote_id, role = ?self.role, "Connected");
        self.remote_id = Some(remote_id);
        self.reset_match_state();
        self.last_result = None;
        fx.push(notify(ConnectionStatus::Connected.into()));
        self.set_phase(Phase::Connected, fx);
        self.push_score(fx);
    }

    fn on_closed(&mut self, fx: &mut Effects) {
        if self.phase == Phase::Idle {
            return;
        }
        tracing::info!(remote_id = ?self.remote_id, "Connection closed");
        self.teardown(fx);
        fx.push(notify(ConnectionStatus::Disconnected.into()));
        self.set_phase(Phase::Idle, fx);
    }

    fn on_failed(&mut self, err: TransportError, fx: &mut Effects) {
        let was_connected = self.phase.is_connected();
        if was_connected {
            tracing::warn!(error = %err, phase = ?self.phase, "Connection failed");
            self.teardown(fx);
            fx.push(Effect::Close);
        } else {
            tracing::warn!(error = %err, "Transport failure while idle");
        }

        if err.is_critical() {
            self.terminated = true;
            fx.push(notify(ConnectionStatus::Terminated(err.to_string()).into()));
        } else {
            fx.push(notify(ConnectionStatus::Error(err.to_string()).into()));
            if was_connected {
                fx.push(notify(ConnectionStatus::Disconnected.into()));
            }
        }
        if was_connected {
            self.set_phase(Phase::Idle, fx);
        }
    }

    fn on_leave(&mut self, fx: &mut Effects) -> Result<(), SessionError> {
        if self.phase == Phase::Idle {
            return Err(SessionError::NotAllowed {
                action: "leave",
                phase: self.phase,
            });
        }
        tracing::info!(remote_id = ?self.remote_id, "Leaving session");
        self.teardown(fx);
        fx.push(Effect::Close);
        fx.push(notify(ConnectionStatus::Disconnected.into()));
        self.set_phase(Phase::Idle, fx);
        Ok(())
    }

    /// Drop everything tied to the connection. Phase is set by the caller.
    fn teardown(&mut self, fx: &mut Effects) {
        self.generation += 1;
        self.clock = None;
        self.cooldown = None;
        self.role = Role::Unassigned;
        self.remote_id = None;
        self.last_result = None;
        self.reset_match_state();
        fx.push(Effect::CancelTimers);
    }

    // ------------------------------------------------------------------
    // Peer messages
    // ------------------------------------------------------------------

    fn on_message(&mut self, msg: GameMessage, fx: &mut Effects) {
        match msg {
            GameMessage::Click => self.on_remote_click(fx),
            GameMessage::Ready => self.on_remote_ready(fx),
            GameMessage::Reset => self.on_remote_reset(fx),
        }
    }

    fn on_remote_click(&mut self, fx: &mut Effects) {
        if self.phase != Phase::Active {
            tracing::debug!(phase = ?self.phase, "Ignoring stale click");
            return;
        }
        self.opponent_score += 1;
        self.push_score(fx);
        self.check_push(fx);
    }

    fn on_remote_ready(&mut self, fx: &mut Effects) {
        match self.phase {
            Phase::Connected => {
                self.opponent_ready = true;
                self.set_phase(Phase::AwaitingReady, fx);
            }
            Phase::AwaitingReady => {
                self.opponent_ready = true;
                self.maybe_start_countdown(fx);
            }
            Phase::Resolved => {
                // The opponent already moved on to the next match.
                self.return_to_ready(fx);
                self.opponent_ready = true;
                fx.push(notify(Notification::RematchAvailable(self.rematch_available())));
            }
            phase => tracing::debug!(?phase, "Ignoring ready"),
        }
    }

    fn on_remote_reset(&mut self, fx: &mut Effects) {
        match self.phase {
            Phase::Resolved => {
                tracing::debug!("Opponent reset, returning to ready handshake");
                self.return_to_ready(fx);
                fx.push(notify(Notification::RematchAvailable(self.rematch_available())));
            }
            Phase::Connected | Phase::AwaitingReady => {}
            phase => tracing::debug!(?phase, "Ignoring reset"),
        }
    }

    // ------------------------------------------------------------------
    // Local input
    // ------------------------------------------------------------------

    fn on_local_ready(&mut self, action: &'static str, fx: &mut Effects) -> Result<(), SessionError> {
        if self.terminated {
            return Err(SessionError::Terminated);
        }
        if self.cooldown.is_some() {
            return Err(SessionError::CoolingDown);
        }

        match self.phase {
            Phase::Connected => self.set_phase(Phase::AwaitingReady, fx),
            Phase::AwaitingReady if self.my_ready => return Ok(()),
            Phase::AwaitingReady => {}
            Phase::Resolved => self.return_to_ready(fx),
            phase => return Err(SessionError::NotAllowed { action, phase }),
        }

        tracing::info!("Local player ready");
        self.my_ready = true;
        fx.push(Effect::Send(GameMessage::Ready));
        fx.push(notify(Notification::RematchAvailable(false)));
        self.maybe_start_countdown(fx);
        Ok(())
    }

    fn on_click(&mut self, fx: &mut Effects) -> Result<(), SessionError> {
        if self.phase != Phase::Active {
            return Err(SessionError::NotAllowed {
                action: "click",
                phase: self.phase,
            });
        }
        self.my_score += 1;
        fx.push(Effect::Send(GameMessage::Click));
        self.push_score(fx);
        self.check_push(fx);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Match flow
    // ------------------------------------------------------------------

    /// Resolved -> AwaitingReady with a clean slate. The cool-down keeps
    /// running.
    fn return_to_ready(&mut self, fx: &mut Effects) {
        self.generation += 1;
        self.reset_match_state();
        self.set_phase(Phase::AwaitingReady, fx);
        self.push_score(fx);
    }

    fn maybe_start_countdown(&mut self, fx: &mut Effects) {
        if self.phase != Phase::AwaitingReady || !self.my_ready || !self.opponent_ready {
            return;
        }

        tracing::info!("Both players ready, starting countdown");
        self.my_score = 0;
        self.opponent_score = 0;
        let duration = self.settings.countdown_secs;
        if duration == 0 {
            self.begin_match(fx);
            return;
        }

        self.start_clock(TimerKind::Countdown, duration, fx);
        self.set_phase(Phase::Countdown, fx);
        fx.push(notify(Notification::CountdownTick(duration)));
    }

    fn begin_match(&mut self, fx: &mut Effects) {
        tracing::info!("Match started");
        self.my_score = 0;
        self.opponent_score = 0;
        let duration = self.settings.match_duration_secs;
        self.start_clock(TimerKind::Match, duration, fx);
        self.set_phase(Phase::Active, fx);
        fx.push(notify(Notification::TimeTick(duration)));
        self.push_score(fx);
    }

    fn check_push(&mut self, fx: &mut Effects) {
        if let Some(outcome) = bar::push_outcome(
            self.my_score,
            self.opponent_score,
            self.settings.push_threshold,
        ) {
            self.resolve(outcome, ResolvedBy::Push, fx);
        }
    }

    fn resolve(&mut self, outcome: Outcome, resolved_by: ResolvedBy, fx: &mut Effects) {
        if self.phase != Phase::Active {
            return;
        }
        if let Some(clock) = self.clock.take() {
            fx.push(Effect::StopTimer(clock.token()));
        }

        let result = MatchResult {
            outcome,
            resolved_by,
            my_score: self.my_score,
            opponent_score: self.opponent_score,
        };
        tracing::info!(
            ?outcome,
            ?resolved_by,
            my_score = self.my_score,
            opponent_score = self.opponent_score,
            "Match resolved"
        );

        self.last_result = Some(result);
        self.my_ready = false;
        self.opponent_ready = false;
        self.set_phase(Phase::Resolved, fx);
        fx.push(notify(Notification::MatchResult {
            outcome,
            resolved_by,
            my_score: result.my_score,
            opponent_score: result.opponent_score,
        }));
        fx.push(Effect::Send(GameMessage::Reset));

        if self.settings.cooldown_secs > 0 {
            let token = self.next_token(TimerKind::Cooldown);
            self.cooldown = Some(RunningTimer::new(token, self.settings.cooldown_secs));
            fx.push(Effect::StartTimer(token));
        }
        fx.push(notify(Notification::RematchAvailable(self.rematch_available())));
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    fn next_token(&mut self, kind: TimerKind) -> TimerToken {
        self.generation += 1;
        TimerToken {
            kind,
            generation: self.generation,
        }
    }

    fn start_clock(&mut self, kind: TimerKind, duration: u32, fx: &mut Effects) {
        if let Some(stale) = self.clock.take() {
            fx.push(Effect::StopTimer(stale.token()));
        }
        let token = self.next_token(kind);
        self.clock = Some(RunningTimer::new(token, duration));
        fx.push(Effect::StartTimer(token));
    }

    fn on_tick(&mut self, token: TimerToken, fx: &mut Effects) {
        let slot = match token.kind.slot() {
            TimerSlot::Clock => &mut self.clock,
            TimerSlot::Cooldown => &mut self.cooldown,
        };
        let Some(tick) = slot.as_mut().and_then(|timer| timer.tick(token)) else {
            tracing::trace!(?token, "Ignoring stale timer tick");
            return;
        };
        if tick == Tick::Expired {
            *slot = None;
            fx.push(Effect::StopTimer(token));
        }

        match (token.kind, tick) {
            (TimerKind::Countdown, Tick::Running(left)) => {
                fx.push(notify(Notification::CountdownTick(left)));
            }
            (TimerKind::Countdown, Tick::Expired) => {
                fx.push(notify(Notification::CountdownTick(0)));
                self.begin_match(fx);
            }
            (TimerKind::Match, Tick::Running(left)) => {
                fx.push(notify(Notification::TimeTick(left)));
            }
            (TimerKind::Match, Tick::Expired) => {
                fx.push(notify(Notification::TimeTick(0)));
                let outcome = bar::score_outcome(self.my_score, self.opponent_score);
                self.resolve(outcome, ResolvedBy::Time, fx);
            }
            (TimerKind::Cooldown, Tick::Running(_)) => {}
            (TimerKind::Cooldown, Tick::Expired) => {
                tracing::debug!("Rematch cool-down finished");
                if self.rematch_available() {
                    fx.push(notify(Notification::RematchAvailable(true)));
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn reset_match_state(&mut self) {
        self.my_score = 0;
        self.opponent_score = 0;
        self.my_ready = false;
        self.opponent_ready = false;
    }

    fn set_phase(&mut self, phase: Phase, fx: &mut Effects) {
        if self.phase == phase {
            return;
        }
        tracing::debug!(from = ?self.phase, to = ?phase, "Phase change");
        self.phase = phase;
        fx.push(notify(Notification::PhaseChanged(phase)));
    }

    fn push_score(&self, fx: &mut Effects) {
        match self.bar_percentage() {
            Ok(bar_percentage) => fx.push(notify(Notification::ScoreChanged {
                my_score: self.my_score,
                opponent_score: self.opponent_score,
                bar_percentage,
            })),
            Err(e) => tracing::warn!(error = %e, "Skipping bar update"),
        }
    }
}

fn notify(notification: Notification) -> Effect {
    Effect::Notify(notification)
}
