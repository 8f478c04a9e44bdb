//! Transition tests for the session state machine

#![cfg(test)]

use super::*;
use crate::bar::Outcome;
use crate::config::MatchSettings;
use crate::error::{SessionError, TransportError};
use crate::net::GameMessage;
use crate::presentation::{ConnectionStatus, Notification};
use crate::timers::{TimerKind, TimerToken};

const LOCAL: &str = "10.0.0.2:7780";
const REMOTE: &str = "10.0.0.3:7780";

fn test_settings() -> MatchSettings {
    MatchSettings {
        match_duration_secs: 20,
        countdown_secs: 5,
        push_threshold: 50,
        cooldown_secs: 3,
        tick_interval_ms: 1000,
    }
}

fn notifications(fx: &Effects) -> Vec<Notification> {
    fx.iter()
        .filter_map(|e| match e {
            Effect::Notify(n) => Some(n.clone()),
            _ => None,
        })
        .collect()
}

fn sent(fx: &Effects) -> Vec<GameMessage> {
    fx.iter()
        .filter_map(|e| match e {
            Effect::Send(msg) => Some(*msg),
            _ => None,
        })
        .collect()
}

fn started(fx: &Effects) -> Vec<TimerToken> {
    fx.iter()
        .filter_map(|e| match e {
            Effect::StartTimer(token) => Some(*token),
            _ => None,
        })
        .collect()
}

fn last_bar(fx: &Effects) -> Option<f64> {
    notifications(fx).into_iter().rev().find_map(|n| match n {
        Notification::ScoreChanged { bar_percentage, .. } => Some(bar_percentage),
        _ => None,
    })
}

fn connected(role: Role, settings: MatchSettings) -> Session {
    let mut session = Session::new(settings);
    session.apply(SessionEvent::IdentityAssigned(LOCAL.into()));
    match role {
        Role::Initiator => session.apply(SessionEvent::ConnectRequested(REMOTE.into())),
        Role::Receiver => session.apply(SessionEvent::IncomingAccepted(REMOTE.into())),
        Role::Unassigned => panic!("connected() needs a role"),
    };
    session.apply(SessionEvent::TransportOpened(REMOTE.into()));
    assert_eq!(session.phase(), Phase::Connected);
    session
}

/// Ready on both sides, returning the countdown token.
fn start_countdown(session: &mut Session) -> TimerToken {
    session.handle(SessionEvent::ReadyPressed).unwrap();
    let fx = session.apply(GameMessage::Ready.into());
    assert_eq!(session.phase(), Phase::Countdown);
    started(&fx)[0]
}

/// Run a session into an active match, returning it with the match token.
fn active(role: Role, settings: MatchSettings) -> (Session, TimerToken) {
    let countdown = settings.countdown_secs;
    let mut session = connected(role, settings);
    let token = start_countdown(&mut session);

    let mut match_token = None;
    for _ in 0..countdown {
        let fx = session.apply(SessionEvent::TimerTick(token));
        match_token = started(&fx).first().copied().or(match_token);
    }
    assert_eq!(session.phase(), Phase::Active);
    (session, match_token.unwrap())
}

fn resolved(role: Role) -> Session {
    let settings = MatchSettings {
        push_threshold: 2,
        ..test_settings()
    };
    let (mut session, _) = active(role, settings);
    session.handle(SessionEvent::Clicked).unwrap();
    session.handle(SessionEvent::Clicked).unwrap();
    assert_eq!(session.phase(), Phase::Resolved);
    session
}

fn cooldown_token(session: &Session) -> TimerToken {
    // The cool-down token is the newest generation handed out.
    TimerToken {
        kind: TimerKind::Cooldown,
        generation: session.generation(),
    }
}

// ============================================================================
// Connection
// ============================================================================

#[test]
fn test_initiator_and_receiver_roles() {
    let mut initiator = Session::new(test_settings());
    initiator.apply(SessionEvent::IdentityAssigned(LOCAL.into()));
    let fx = initiator.apply(SessionEvent::ConnectRequested(format!("  {REMOTE} ")));
    assert_eq!(initiator.role(), Role::Initiator);
    assert_eq!(initiator.phase(), Phase::Connecting);
    assert_eq!(initiator.remote_id(), Some(REMOTE));
    assert!(fx.contains(&Effect::Connect(REMOTE.into())));
    assert!(notifications(&fx).contains(&Notification::RoleAssigned(Role::Initiator)));

    let mut receiver = Session::new(test_settings());
    let fx = receiver.apply(SessionEvent::IncomingAccepted(REMOTE.into()));
    assert_eq!(receiver.role(), Role::Receiver);
    assert!(notifications(&fx).contains(&Notification::RoleAssigned(Role::Receiver)));
    assert!(!fx.iter().any(|e| matches!(e, Effect::Connect(_))));
}

#[test]
fn test_transport_open_reports_centred_bar() {
    let mut session = Session::new(test_settings());
    session.apply(SessionEvent::IncomingAccepted(REMOTE.into()));
    let fx = session.apply(SessionEvent::TransportOpened(REMOTE.into()));

    let updates = notifications(&fx);
    assert!(updates.contains(&Notification::ConnectionStatus(ConnectionStatus::Connected)));
    assert!(updates.contains(&Notification::PhaseChanged(Phase::Connected)));
    assert_eq!(last_bar(&fx), Some(50.0));
}

#[test]
fn test_connect_validation() {
    let mut session = Session::new(test_settings());
    assert_eq!(
        session.handle(SessionEvent::ConnectRequested(REMOTE.into())),
        Err(SessionError::IdentityPending)
    );

    session.apply(SessionEvent::IdentityAssigned(LOCAL.into()));
    assert_eq!(
        session.handle(SessionEvent::ConnectRequested("   ".into())),
        Err(SessionError::InvalidRemoteId)
    );
    assert_eq!(
        session.handle(SessionEvent::ConnectRequested(LOCAL.into())),
        Err(SessionError::SelfConnectAttempt)
    );

    // Rejections leave the session untouched but are reported.
    let fx = session.apply(SessionEvent::ConnectRequested(LOCAL.into()));
    assert_eq!(session.phase(), Phase::Idle);
    assert_eq!(session.role(), Role::Unassigned);
    assert_eq!(
        notifications(&fx),
        vec![Notification::ConnectionStatus(ConnectionStatus::Error(
            SessionError::SelfConnectAttempt.to_string()
        ))]
    );

    session.apply(SessionEvent::ConnectRequested(REMOTE.into()));
    assert_eq!(
        session.handle(SessionEvent::ConnectRequested("10.0.0.4:7780".into())),
        Err(SessionError::AlreadyConnected)
    );
}

#[test]
fn test_identity_is_immutable() {
    let mut session = Session::new(test_settings());
    session.apply(SessionEvent::IdentityAssigned(LOCAL.into()));
    session.apply(SessionEvent::IdentityAssigned("somewhere-else".into()));
    assert_eq!(session.local_id(), Some(LOCAL));
}

#[test]
fn test_inbound_while_connected_is_ignored() {
    let mut session = connected(Role::Initiator, test_settings());
    let fx = session.apply(SessionEvent::IncomingAccepted("10.0.0.9:7780".into()));
    assert!(fx.is_empty());
    assert_eq!(session.role(), Role::Initiator);
    assert_eq!(session.remote_id(), Some(REMOTE));
    assert_eq!(session.phase(), Phase::Connected);
}

#[test]
fn test_peer_unavailable_returns_to_idle() {
    let mut session = Session::new(test_settings());
    session.apply(SessionEvent::IdentityAssigned(LOCAL.into()));
    session.apply(SessionEvent::ConnectRequested(REMOTE.into()));

    let fx = session.apply(SessionEvent::TransportFailed(TransportError::PeerUnavailable(
        REMOTE.into(),
    )));
    assert_eq!(session.phase(), Phase::Idle);
    assert_eq!(session.role(), Role::Unassigned);
    assert!(!session.is_terminated());
    assert!(notifications(&fx).iter().any(|n| matches!(
        n,
        Notification::ConnectionStatus(ConnectionStatus::Error(_))
    )));

    // User may retry straight away.
    assert!(session.handle(SessionEvent::ConnectRequested(REMOTE.into())).is_ok());
}

#[test]
fn test_channel_error_reports_disconnect() {
    let (mut active_session, _) = active(Role::Initiator, test_settings());
    let fx = active_session.apply(SessionEvent::TransportFailed(TransportError::Failure(
        "reset".into(),
    )));
    assert_eq!(active_session.phase(), Phase::Idle);
    assert!(fx.contains(&Effect::CancelTimers));
    assert_eq!(
        notifications(&fx),
        vec![
            Notification::ConnectionStatus(ConnectionStatus::Error(
                "Transport failure: reset".into()
            )),
            Notification::ConnectionStatus(ConnectionStatus::Disconnected),
            Notification::PhaseChanged(Phase::Idle),
        ]
    );

    let mut session = connected(Role::Receiver, test_settings());
    let fx = session.apply(SessionEvent::TransportFailed(TransportError::NotConnected));
    assert_eq!(session.phase(), Phase::Idle);
    assert!(notifications(&fx).contains(&Notification::ConnectionStatus(
        ConnectionStatus::Disconnected
    )));
    assert!(!session.is_terminated());
}

#[test]
fn test_failure_while_idle_stays_idle() {
    let mut session = Session::new(test_settings());
    session.apply(SessionEvent::IdentityAssigned(LOCAL.into()));

    let fx = session.apply(SessionEvent::TransportFailed(TransportError::Failure(
        "stray".into(),
    )));
    assert_eq!(session.phase(), Phase::Idle);
    assert_eq!(
        notifications(&fx),
        vec![Notification::ConnectionStatus(ConnectionStatus::Error(
            "Transport failure: stray".into()
        ))]
    );
}

#[test]
fn test_critical_failure_terminates() {
    let mut session = connected(Role::Receiver, test_settings());
    let fx = session.apply(SessionEvent::TransportFailed(TransportError::Critical(
        "listener gone".into(),
    )));

    assert!(session.is_terminated());
    assert_eq!(session.phase(), Phase::Idle);
    assert!(fx.contains(&Effect::CancelTimers));
    assert!(notifications(&fx).iter().any(|n| matches!(
        n,
        Notification::ConnectionStatus(ConnectionStatus::Terminated(_))
    )));
    assert_eq!(
        session.handle(SessionEvent::ConnectRequested(REMOTE.into())),
        Err(SessionError::Terminated)
    );
    assert!(session
        .apply(SessionEvent::IncomingAccepted(REMOTE.into()))
        .is_empty());
}

#[test]
fn test_leave_closes_channel() {
    let (mut session, _) = active(Role::Initiator, test_settings());
    let fx = session.handle(SessionEvent::LeaveRequested).unwrap();

    assert!(fx.contains(&Effect::Close));
    assert!(fx.contains(&Effect::CancelTimers));
    assert_eq!(session.phase(), Phase::Idle);
    assert_eq!(session.remote_id(), None);
    assert!(matches!(
        session.handle(SessionEvent::LeaveRequested),
        Err(SessionError::NotAllowed { action: "leave", phase: Phase::Idle })
    ));
}

// ============================================================================
// Ready handshake and countdown
// ============================================================================

#[test]
fn test_ready_in_either_order_starts_countdown() {
    let mut local_first = connected(Role::Initiator, test_settings());
    let fx = local_first.handle(SessionEvent::ReadyPressed).unwrap();
    assert_eq!(sent(&fx), vec![GameMessage::Ready]);
    assert_eq!(local_first.phase(), Phase::AwaitingReady);
    let fx = local_first.apply(GameMessage::Ready.into());
    assert_eq!(local_first.phase(), Phase::Countdown);
    assert!(notifications(&fx).contains(&Notification::CountdownTick(5)));
    assert_eq!(local_first.countdown_remaining(), Some(5));

    let mut remote_first = connected(Role::Receiver, test_settings());
    remote_first.apply(GameMessage::Ready.into());
    assert_eq!(remote_first.phase(), Phase::AwaitingReady);
    assert!(remote_first.opponent_ready());
    remote_first.handle(SessionEvent::ReadyPressed).unwrap();
    assert_eq!(remote_first.phase(), Phase::Countdown);
}

#[test]
fn test_repeated_ready_is_noop() {
    let mut session = connected(Role::Initiator, test_settings());
    session.handle(SessionEvent::ReadyPressed).unwrap();
    let fx = session.handle(SessionEvent::ReadyPressed).unwrap();
    assert!(fx.is_empty());
    assert_eq!(session.phase(), Phase::AwaitingReady);
}

#[test]
fn test_countdown_ticks_then_match_starts() {
    let mut session = connected(Role::Initiator, test_settings());
    let token = start_countdown(&mut session);

    let mut ticks = Vec::new();
    let mut match_fx = Effects::new();
    for _ in 0..5 {
        let fx = session.apply(SessionEvent::TimerTick(token));
        for n in notifications(&fx) {
            if let Notification::CountdownTick(left) = n {
                ticks.push(left);
            }
        }
        match_fx = fx;
    }

    assert_eq!(ticks, vec![4, 3, 2, 1, 0]);
    assert_eq!(session.phase(), Phase::Active);
    assert_eq!(session.time_remaining(), Some(20));
    assert_eq!(session.countdown_remaining(), None);
    assert!(notifications(&match_fx).contains(&Notification::TimeTick(20)));
    assert_eq!(started(&match_fx)[0].kind, TimerKind::Match);
}

#[test]
fn test_zero_countdown_starts_immediately() {
    let settings = MatchSettings {
        countdown_secs: 0,
        ..test_settings()
    };
    let mut session = connected(Role::Initiator, settings);
    session.handle(SessionEvent::ReadyPressed).unwrap();
    session.apply(GameMessage::Ready.into());
    assert_eq!(session.phase(), Phase::Active);
}

#[test]
fn test_clicks_before_match_are_rejected() {
    let mut session = connected(Role::Initiator, test_settings());
    start_countdown(&mut session);

    assert!(matches!(
        session.handle(SessionEvent::Clicked),
        Err(SessionError::NotAllowed { action: "click", phase: Phase::Countdown })
    ));
    assert!(session.apply(GameMessage::Click.into()).is_empty());
    assert_eq!(session.my_score(), 0);
    assert_eq!(session.opponent_score(), 0);
}

#[test]
fn test_disconnect_mid_countdown_discards_ticks() {
    let mut session = connected(Role::Initiator, test_settings());
    let token = start_countdown(&mut session);
    session.apply(SessionEvent::TimerTick(token));

    let fx = session.apply(SessionEvent::TransportClosed);
    assert!(fx.contains(&Effect::CancelTimers));
    assert!(notifications(&fx).contains(&Notification::ConnectionStatus(
        ConnectionStatus::Disconnected
    )));
    assert_eq!(session.phase(), Phase::Idle);
    assert_eq!(session.role(), Role::Unassigned);
    assert!(!session.my_ready());
    assert!(!session.opponent_ready());

    // Ticks still in flight must not resurrect the countdown.
    for _ in 0..5 {
        assert!(session.apply(SessionEvent::TimerTick(token)).is_empty());
    }
    assert_eq!(session.phase(), Phase::Idle);
    assert_eq!(session.countdown_remaining(), None);
}

// ============================================================================
// Match resolution
// ============================================================================

#[test]
fn test_push_win_at_threshold() {
    let (mut session, match_token) = active(Role::Initiator, test_settings());

    for _ in 0..49 {
        session.handle(SessionEvent::Clicked).unwrap();
    }
    assert_eq!(session.phase(), Phase::Active);

    let fx = session.handle(SessionEvent::Clicked).unwrap();
    assert_eq!(sent(&fx), vec![GameMessage::Click, GameMessage::Reset]);
    assert!(fx.contains(&Effect::StopTimer(match_token)));
    assert_eq!(last_bar(&fx), Some(100.0));
    assert_eq!(session.phase(), Phase::Resolved);
    assert_eq!(
        session.last_result(),
        Some(MatchResult {
            outcome: Outcome::Win,
            resolved_by: ResolvedBy::Push,
            my_score: 50,
            opponent_score: 0,
        })
    );
    assert!(notifications(&fx).contains(&Notification::MatchResult {
        outcome: Outcome::Win,
        resolved_by: ResolvedBy::Push,
        my_score: 50,
        opponent_score: 0,
    }));
}

#[test]
fn test_receiver_push_loss() {
    let (mut session, _) = active(Role::Receiver, test_settings());

    let mut fx = Effects::new();
    for _ in 0..50 {
        fx = session.apply(GameMessage::Click.into());
    }
    assert_eq!(last_bar(&fx), Some(0.0));
    assert_eq!(session.last_result().map(|r| r.outcome), Some(Outcome::Loss));
    assert_eq!(sent(&fx), vec![GameMessage::Reset]);
}

#[test]
fn test_threshold_minus_one_does_not_resolve() {
    let settings = MatchSettings {
        push_threshold: 10,
        ..test_settings()
    };
    let (mut session, _) = active(Role::Initiator, settings);

    for _ in 0..3 {
        session.apply(GameMessage::Click.into());
    }
    for _ in 0..12 {
        session.handle(SessionEvent::Clicked).unwrap();
    }
    // 12 - 3 = 9, one short
    assert_eq!(session.phase(), Phase::Active);
    session.handle(SessionEvent::Clicked).unwrap();
    assert_eq!(session.phase(), Phase::Resolved);
}

#[test]
fn test_time_expiry_higher_score_wins() {
    let (mut session, match_token) = active(Role::Initiator, test_settings());
    for _ in 0..10 {
        session.handle(SessionEvent::Clicked).unwrap();
    }
    for _ in 0..7 {
        session.apply(GameMessage::Click.into());
    }

    for _ in 0..19 {
        session.apply(SessionEvent::TimerTick(match_token));
    }
    assert_eq!(session.phase(), Phase::Active);
    assert_eq!(session.time_remaining(), Some(1));

    let fx = session.apply(SessionEvent::TimerTick(match_token));
    assert!(notifications(&fx).contains(&Notification::TimeTick(0)));
    assert_eq!(
        session.last_result(),
        Some(MatchResult {
            outcome: Outcome::Win,
            resolved_by: ResolvedBy::Time,
            my_score: 10,
            opponent_score: 7,
        })
    );
    assert_eq!(sent(&fx), vec![GameMessage::Reset]);
}

#[test]
fn test_time_expiry_equal_scores_draw() {
    let (mut session, match_token) = active(Role::Receiver, test_settings());
    for _ in 0..5 {
        session.handle(SessionEvent::Clicked).unwrap();
        session.apply(GameMessage::Click.into());
    }
    for _ in 0..20 {
        session.apply(SessionEvent::TimerTick(match_token));
    }
    assert_eq!(session.last_result().map(|r| r.outcome), Some(Outcome::Draw));
}

#[test]
fn test_clicks_after_resolution_are_ignored() {
    let mut session = resolved(Role::Initiator);
    let result = session.last_result();

    assert!(session.apply(GameMessage::Click.into()).is_empty());
    assert!(session.handle(SessionEvent::Clicked).is_err());
    assert_eq!(session.last_result(), result);
    assert_eq!(session.my_score(), 2);
}

// ============================================================================
// Rematch
// ============================================================================

#[test]
fn test_cooldown_blocks_play_again() {
    let mut session = resolved(Role::Initiator);
    assert!(session.is_cooling_down());
    assert!(!session.rematch_available());
    assert_eq!(
        session.handle(SessionEvent::PlayAgainPressed),
        Err(SessionError::CoolingDown)
    );

    let token = cooldown_token(&session);
    session.apply(SessionEvent::TimerTick(token));
    session.apply(SessionEvent::TimerTick(token));
    let fx = session.apply(SessionEvent::TimerTick(token));
    assert!(notifications(&fx).contains(&Notification::RematchAvailable(true)));
    assert!(session.rematch_available());

    let fx = session.handle(SessionEvent::PlayAgainPressed).unwrap();
    assert_eq!(sent(&fx), vec![GameMessage::Ready]);
    assert_eq!(session.phase(), Phase::AwaitingReady);
    assert_eq!(session.my_score(), 0);
    assert!(session.my_ready());
}

#[test]
fn test_remote_reset_is_idempotent() {
    let mut session = resolved(Role::Receiver);

    let fx = session.apply(GameMessage::Reset.into());
    assert!(notifications(&fx).contains(&Notification::PhaseChanged(Phase::AwaitingReady)));
    let phase = session.phase();
    let generation = session.generation();

    assert!(session.apply(GameMessage::Reset.into()).is_empty());
    assert_eq!(session.phase(), phase);
    assert_eq!(session.generation(), generation);
    assert_eq!(session.my_score(), 0);
    assert_eq!(session.opponent_score(), 0);
}

#[test]
fn test_remote_ready_in_resolved_starts_handshake() {
    let mut session = resolved(Role::Initiator);
    let token = cooldown_token(&session);

    session.apply(GameMessage::Ready.into());
    assert_eq!(session.phase(), Phase::AwaitingReady);
    assert!(session.opponent_ready());
    assert!(!session.my_ready());

    // Cool-down survives the reset.
    for _ in 0..3 {
        session.apply(SessionEvent::TimerTick(token));
    }
    assert!(!session.is_cooling_down());

    session.handle(SessionEvent::PlayAgainPressed).unwrap();
    assert_eq!(session.phase(), Phase::Countdown);
}

#[test]
fn test_reset_ignored_during_match() {
    let (mut session, _) = active(Role::Initiator, test_settings());
    session.handle(SessionEvent::Clicked).unwrap();
    assert!(session.apply(GameMessage::Reset.into()).is_empty());
    assert_eq!(session.phase(), Phase::Active);
    assert_eq!(session.my_score(), 1);
}

#[test]
fn test_unassigned_role_skips_bar_update() {
    let session = Session::new(test_settings());
    assert!(session.bar_percentage().is_err());
}
