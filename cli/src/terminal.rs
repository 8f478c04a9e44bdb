//! Terminal presentation
//!
//! Renders session updates as plain lines on any writer (stdout in the
//! binary, a byte buffer in tests).

use std::fmt;
use std::io::Write;

use tugwar_core::{ConnectionStatus, Outcome, Phase, Presentation, ResolvedBy, Role};

/// Characters in the rendered bar, excluding brackets.
pub const BAR_WIDTH: usize = 40;

/// Render the local player's share as `[#####-----]`.
///
/// The local side fills from the left.
pub fn render_bar(local_share: f64, width: usize) -> String {
    let share = local_share.clamp(0.0, 100.0);
    let filled = ((share / 100.0) * width as f64).round() as usize;
    let filled = filled.min(width);
    format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
}

/// Writes every update as a line of text.
pub struct TerminalPresentation<W: Write> {
    out: W,
}

impl<W: Write> TerminalPresentation<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Print a free-form line (help text, prompts).
    pub fn message(&mut self, text: impl fmt::Display) {
        self.line(format_args!("{text}"));
    }

    fn line(&mut self, args: fmt::Arguments<'_>) {
        if let Err(e) = self.out.write_fmt(args).and_then(|()| self.out.write_all(b"\n")) {
            tracing::debug!(error = %e, "Terminal write failed");
            return;
        }
        let _ = self.out.flush();
    }
}

impl<W: Write> Presentation for TerminalPresentation<W> {
    fn on_phase_changed(&mut self, phase: Phase) {
        match phase {
            Phase::Idle => self.line(format_args!("Waiting for an opponent. 'j <id>' to join one.")),
            Phase::Connecting => self.line(format_args!("Connecting...")),
            Phase::Connected => self.line(format_args!("Opponent found. Press 'r' when ready.")),
            Phase::AwaitingReady => self.line(format_args!("Waiting for both players to be ready.")),
            Phase::Countdown => self.line(format_args!("Get ready!")),
            Phase::Active => self.line(format_args!("PULL! (enter / c / space)")),
            Phase::Resolved => {}
        }
    }

    fn on_score_changed(&mut self, my_score: u32, opponent_score: u32, bar_percentage: f64) {
        self.line(format_args!(
            "{} you {my_score} : {opponent_score} them",
            render_bar(bar_percentage, BAR_WIDTH)
        ));
    }

    fn on_countdown_tick(&mut self, seconds_left: u32) {
        if seconds_left > 0 {
            self.line(format_args!("  {seconds_left}..."));
        }
    }

    fn on_time_tick(&mut self, seconds_left: u32) {
        self.line(format_args!("  {seconds_left}s left"));
    }

    fn on_match_result(
        &mut self,
        outcome: Outcome,
        resolved_by: ResolvedBy,
        my_score: u32,
        opponent_score: u32,
    ) {
        let banner = match outcome {
            Outcome::Win => "YOU WIN",
            Outcome::Loss => "YOU LOSE",
            Outcome::Draw => "DRAW",
        };
        let how = match resolved_by {
            ResolvedBy::Push => "by push",
            ResolvedBy::Time => "on time",
        };
        self.line(format_args!("*** {banner} {how} ({my_score} : {opponent_score}) ***"));
    }

    fn on_role_assigned(&mut self, role: Role) {
        match role {
            Role::Initiator => self.line(format_args!("You are Player One.")),
            Role::Receiver => self.line(format_args!("You are Player Two.")),
            Role::Unassigned => {}
        }
    }

    fn on_connection_status(&mut self, status: &ConnectionStatus) {
        match status {
            ConnectionStatus::Connecting => {}
            ConnectionStatus::Connected => self.line(format_args!("Connected.")),
            ConnectionStatus::Disconnected => self.line(format_args!("Disconnected.")),
            ConnectionStatus::Error(reason) => self.line(format_args!("Error: {reason}")),
            ConnectionStatus::Terminated(reason) => {
                self.line(format_args!("Connection lost for good ({reason}). Restart to play again."))
            }
        }
    }

    fn on_rematch_available(&mut self, available: bool) {
        if available {
            self.line(format_args!("Press 'p' to play again."));
        }
    }
}
