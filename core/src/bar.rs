//! Score/bar model
//!
//! Maps the click differential onto a shared tug-bar. The bar is expressed as
//! Player One's share in percent: 50 is the centre, 100 means Player One
//! pulled the marker all the way, 0 means Player Two did. Player Two's share is
//! always the complement.

use crate::error::BarError;
use crate::session::Role;

/// Centre of the bar in percent.
pub const BAR_CENTRE: f64 = 50.0;

/// Fixed seat on the bar, independent of which process is looking at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerSide {
    One,
    Two,
}

/// Result of a match from the local player's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Win,
    Loss,
    Draw,
}

/// Player One's share of the bar in `[0, 100]`.
///
/// `my_score` and `opponent_score` are in local perspective; the role decides
/// which of them belongs to Player One.
pub fn bar_position(
    my_score: u32,
    opponent_score: u32,
    role: Role,
    threshold: u32,
) -> Result<f64, BarError> {
    if threshold == 0 {
        return Err(BarError::InvalidThreshold);
    }
    let side = role.side().ok_or(BarError::RoleNotAssigned)?;
    let (p1, p2) = match side {
        PlayerSide::One => (my_score, opponent_score),
        PlayerSide::Two => (opponent_score, my_score),
    };

    let differential = i64::from(p1) - i64::from(p2);
    let percentage = BAR_CENTRE + BAR_CENTRE * differential as f64 / f64::from(threshold);
    Ok(percentage.clamp(0.0, 100.0))
}

/// Share of the bar owned by the local player.
pub fn local_share(
    my_score: u32,
    opponent_score: u32,
    role: Role,
    threshold: u32,
) -> Result<f64, BarError> {
    let p1_share = bar_position(my_score, opponent_score, role, threshold)?;
    Ok(match role.side() {
        Some(PlayerSide::One) => p1_share,
        _ => 100.0 - p1_share,
    })
}

/// Push-win check: `Some` once the differential reaches the threshold in
/// either direction.
pub fn push_outcome(my_score: u32, opponent_score: u32, threshold: u32) -> Option<Outcome> {
    let differential = i64::from(my_score) - i64::from(opponent_score);
    let threshold = i64::from(threshold);
    if differential >= threshold {
        Some(Outcome::Win)
    } else if differential <= -threshold {
        Some(Outcome::Loss)
    } else {
        None
    }
}

/// Time-expiry result: strictly higher score wins, equal scores draw.
pub fn score_outcome(my_score: u32, opponent_score: u32) -> Outcome {
    match my_score.cmp(&opponent_score) {
        std::cmp::Ordering::Greater => Outcome::Win,
        std::cmp::Ordering::Less => Outcome::Loss,
        std::cmp::Ordering::Equal => Outcome::Draw,
    }
}
