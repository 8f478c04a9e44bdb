//! Game runner
//!
//! Drives a [`Session`] from a single thread. Transport events, user input and
//! timer ticks are all fed through [`GameRunner::pump`] or the input methods,
//! each of which runs to completion: the session transition is applied, then
//! every effect it returned is executed in order. No two transitions ever
//! interleave.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::config::{GameConfig, MatchSettings};
use crate::error::{SessionError, TransportError};
use crate::net::{Transport, TransportEvent};
use crate::presentation::Presentation;
use crate::session::{Effect, Effects, Session, SessionEvent};
use crate::timers::TickScheduler;

/// Owns a session together with the ports it talks to.
pub struct GameRunner<T: Transport, P: Presentation> {
    session: Session,
    transport: T,
    presentation: P,
    scheduler: TickScheduler,
    /// Delay between losing the signaling endpoint and retrying it
    reconnect_delay: Duration,
    /// Pending signaling retry
    reconnect_at: Option<Instant>,
}

impl<T: Transport, P: Presentation> GameRunner<T, P> {
    pub fn new(
        settings: MatchSettings,
        reconnect_delay: Duration,
        transport: T,
        presentation: P,
    ) -> Self {
        let scheduler = TickScheduler::new(Duration::from_millis(settings.tick_interval_ms));
        Self {
            session: Session::new(settings),
            transport,
            presentation,
            scheduler,
            reconnect_delay,
            reconnect_at: None,
        }
    }

    /// Build a runner from loaded configuration.
    pub fn from_config(config: &GameConfig, transport: T, presentation: P) -> Self {
        Self::new(
            config.game.clone(),
            Duration::from_millis(config.network.reconnect_delay_ms),
            transport,
            presentation,
        )
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn presentation(&self) -> &P {
        &self.presentation
    }

    pub fn presentation_mut(&mut self) -> &mut P {
        &mut self.presentation
    }

    /// Earliest instant [`pump`](Self::pump) has timed work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.scheduler.next_deadline(), self.reconnect_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    // ------------------------------------------------------------------
    // User input
    // ------------------------------------------------------------------

    pub fn connect(&mut self, remote_id: &str, now: Instant) -> Result<(), SessionError> {
        self.user_action(SessionEvent::ConnectRequested(remote_id.to_string()), now)
    }

    pub fn ready(&mut self, now: Instant) -> Result<(), SessionError> {
        self.user_action(SessionEvent::ReadyPressed, now)
    }

    pub fn play_again(&mut self, now: Instant) -> Result<(), SessionError> {
        self.user_action(SessionEvent::PlayAgainPressed, now)
    }

    pub fn click(&mut self, now: Instant) -> Result<(), SessionError> {
        self.user_action(SessionEvent::Clicked, now)
    }

    pub fn leave(&mut self, now: Instant) -> Result<(), SessionError> {
        self.user_action(SessionEvent::LeaveRequested, now)
    }

    fn user_action(&mut self, event: SessionEvent, now: Instant) -> Result<(), SessionError> {
        let mut pending = VecDeque::new();
        let result = match self.session.handle(event) {
            Ok(fx) => {
                self.execute(fx, now, &mut pending);
                Ok(())
            }
            Err(e) => {
                let fx = self.session.rejection_effects(&e);
                self.execute(fx, now, &mut pending);
                Err(e)
            }
        };
        self.drain(pending, now);
        result
    }

    // ------------------------------------------------------------------
    // Event loop
    // ------------------------------------------------------------------

    /// Process everything that is due at `now`: a pending signaling retry,
    /// all queued transport events, then all due timer ticks.
    pub fn pump(&mut self, now: Instant) {
        if let Some(at) = self.reconnect_at
            && at <= now
        {
            self.reconnect_at = None;
            self.retry_signaling(now);
        }

        while let Some(event) = self.transport.poll() {
            self.on_transport_event(event, now);
        }

        for token in self.scheduler.poll(now) {
            self.dispatch(SessionEvent::TimerTick(token), now);
        }
    }

    fn on_transport_event(&mut self, event: TransportEvent, now: Instant) {
        let event = match event {
            TransportEvent::IdentityAssigned(id) => SessionEvent::IdentityAssigned(id),
            TransportEvent::Incoming { remote_id } => SessionEvent::IncomingAccepted(remote_id),
            TransportEvent::Opened { remote_id } => SessionEvent::TransportOpened(remote_id),
            TransportEvent::Message(msg) => SessionEvent::MessageReceived(msg),
            TransportEvent::Closed => SessionEvent::TransportClosed,
            TransportEvent::Failed(err) => SessionEvent::TransportFailed(err),
            TransportEvent::SignalingLost => {
                if self.session.is_terminated() {
                    return;
                }
                tracing::warn!(
                    delay_ms = self.reconnect_delay.as_millis() as u64,
                    "Signaling lost, scheduling reconnect"
                );
                self.reconnect_at = Some(now + self.reconnect_delay);
                return;
            }
        };
        self.dispatch(event, now);
    }

    fn retry_signaling(&mut self, now: Instant) {
        match self.transport.reconnect() {
            Ok(()) => tracing::info!("Signaling re-established"),
            Err(e) => {
                tracing::error!(error = %e, "Signaling reconnect failed");
                let err = if e.is_critical() {
                    e
                } else {
                    TransportError::Critical(e.to_string())
                };
                self.dispatch(SessionEvent::TransportFailed(err), now);
            }
        }
    }

    fn dispatch(&mut self, event: SessionEvent, now: Instant) {
        self.drain(VecDeque::from([event]), now);
    }

    /// Apply events until no follow-up events remain.
    fn drain(&mut self, mut pending: VecDeque<SessionEvent>, now: Instant) {
        while let Some(event) = pending.pop_front() {
            let fx = self.session.apply(event);
            self.execute(fx, now, &mut pending);
        }
    }

    /// Run effects in order. Port failures become follow-up events.
    fn execute(&mut self, fx: Effects, now: Instant, pending: &mut VecDeque<SessionEvent>) {
        let mut link_failed = false;
        for effect in fx {
            match effect {
                Effect::Connect(remote_id) => {
                    if let Err(e) = self.transport.connect(&remote_id) {
                        tracing::warn!(%remote_id, error = %e, "Connect failed");
                        pending.push_back(SessionEvent::TransportFailed(e));
                    }
                }
                Effect::Send(msg) => {
                    if link_failed {
                        continue;
                    }
                    if let Err(e) = self.transport.send(msg) {
                        tracing::warn!(?msg, error = %e, "Send failed");
                        link_failed = true;
                        pending.push_back(SessionEvent::TransportFailed(e));
                    }
                }
                Effect::Close => self.transport.close(),
                Effect::StartTimer(token) => self.scheduler.start(token, now),
                Effect::StopTimer(token) => self.scheduler.stop(token),
                Effect::CancelTimers => self.scheduler.cancel_all(),
                Effect::Notify(notification) => notification.deliver(&mut self.presentation),
            }
        }
    }
}
