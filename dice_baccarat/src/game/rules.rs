//! Point totals and third-draw rules.
//!
//! Side B plays the part of the player hand and side A the banker hand. Both
//! rule functions operate on point totals (already reduced mod 10), never on
//! raw draws.

use super::entities::{BetClass, DieValue};

/// A two-draw total at or above this value is a natural.
pub const NATURAL_THRESHOLD: u8 = 8;

/// Highest total at which the player side still draws a third value.
pub const PLAYER_STAND_ABOVE: u8 = 5;

/// Point total of a hand: the sum of its draws, mod 10.
#[must_use]
pub fn total(draws: &[DieValue]) -> u8 {
    let sum: u32 = draws.iter().map(|&v| u32::from(v)).sum();
    (sum % 10) as u8
}

/// Whether either side's opening total is a natural, which suppresses all
/// third draws for both sides.
#[must_use]
pub fn is_natural(total_a: u8, total_b: u8) -> bool {
    total_a >= NATURAL_THRESHOLD || total_b >= NATURAL_THRESHOLD
}

/// Player side (B) draws a third value on 0-5 and stands on 6-7.
///
/// Only meaningful when [`is_natural`] is false.
#[must_use]
pub fn player_draws_third(player_total: u8) -> bool {
    player_total <= PLAYER_STAND_ABOVE
}

/// Banker side (A) third-draw table.
///
/// `player_third` is the value of the player's third draw, or `None` when the
/// player stood. The table is kept general over the third value even though
/// dice can never produce 8 or more.
#[must_use]
pub fn banker_draws_third(banker_total: u8, player_third: Option<u8>) -> bool {
    let Some(t) = player_third else {
        return banker_total <= PLAYER_STAND_ABOVE;
    };

    match banker_total {
        0..=2 => true,
        3 => t != 8,
        4 => (2..=7).contains(&t),
        5 => (4..=7).contains(&t),
        6 => (6..=7).contains(&t),
        _ => false,
    }
}

/// Winning class for the final totals. Equal totals are a tie.
#[must_use]
pub fn winner(total_a: u8, total_b: u8) -> BetClass {
    match total_a.cmp(&total_b) {
        std::cmp::Ordering::Greater => BetClass::SideA,
        std::cmp::Ordering::Less => BetClass::SideB,
        std::cmp::Ordering::Equal => BetClass::Tie,
    }
}
