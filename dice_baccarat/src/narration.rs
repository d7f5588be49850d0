//! Chat texts announced during a round.

use chrono::{DateTime, Utc};

use crate::game::{BetClass, DieValue, Game, Outcome, Points, Settlement, Side};

pub fn round_opened(game: &Game, now: DateTime<Utc>) -> String {
    let secs = (game.betting_deadline - now).num_seconds().max(0);
    format!(
        "🎲 Round {} is open! Place your bets on Banker, Player or Tie. Betting closes in {}s.",
        game.round_id, secs
    )
}

pub fn countdown(seconds_left: i64) -> String {
    format!("⏰ {seconds_left}s left to bet")
}

pub fn bet_accepted(name: &str, class: BetClass, amount: Points, stake: Points) -> String {
    format!("✅ {name} bet {amount} on {class} (total {stake} on {class})")
}

/// Summary sent when betting closes.
pub fn bet_summary(game: &Game) -> String {
    if game.bets.is_empty() {
        return "🛑 Betting closed. No bets this round, dealing anyway.".to_string();
    }

    let mut lines = vec![format!(
        "🛑 Betting closed. {} participant(s), {} points staked:",
        game.bets.len(),
        game.total_staked()
    )];
    for bets in game.bets.values() {
        let stakes: Vec<String> = bets
            .stakes
            .iter()
            .map(|(class, amount)| format!("{class} {amount}"))
            .collect();
        lines.push(format!("• {}: {}", bets.display_name, stakes.join(", ")));
    }
    lines.join("\n")
}

pub fn drawing(side: Side, index: u8) -> String {
    if index == 3 {
        format!("🃏 {side} draws a third die...")
    } else {
        format!("🃏 Rolling {side} die {index}...")
    }
}

pub fn draw_revealed(side: Side, index: u8, value: DieValue, fallback: bool) -> String {
    if fallback {
        format!("🎲 {side} die {index}: {value} (house roll)")
    } else {
        format!("🎲 {side} die {index}: {value}")
    }
}

pub fn natural(outcome_a: u8, outcome_b: u8) -> String {
    format!("✨ Natural! Banker {outcome_a}, Player {outcome_b}. No third dice.")
}

/// Final result with winners and losers.
pub fn result(game: &Game, outcome: &Outcome, settlements: &[Settlement]) -> String {
    let headline = match outcome.winner {
        BetClass::Tie => format!("🤝 Tie at {}!", outcome.total_a),
        winner => format!(
            "🏆 {winner} wins, Banker {} vs Player {}",
            outcome.total_a, outcome.total_b
        ),
    };

    let mut lines = vec![
        format!("Round {} result", game.round_id),
        format!(
            "Banker {:?} = {} | Player {:?} = {}",
            game.draws.a, outcome.total_a, game.draws.b, outcome.total_b
        ),
        headline,
    ];

    let (winners, losers): (Vec<&Settlement>, Vec<&Settlement>) =
        settlements.iter().partition(|s| s.net > 0);

    if settlements.is_empty() {
        lines.push("No bets were placed.".to_string());
    }
    if !winners.is_empty() {
        lines.push("Winners:".to_string());
        for s in winners {
            lines.push(format!("• {} +{}", s.display_name, s.net));
        }
    }
    if !losers.is_empty() {
        lines.push("Losers:".to_string());
        for s in losers {
            lines.push(format!("• {} {}", s.display_name, s.net));
        }
    }

    lines.join("\n")
}

pub fn round_stopped() -> String {
    "⛔ The game was stopped.".to_string()
}

pub fn round_failed(round_id: &str) -> String {
    format!("⚠️ Round {round_id} could not be completed and was cancelled. Bets are void.")
}

pub fn auto_repeat(enabled: bool) -> String {
    if enabled {
        "🔁 Auto mode on, the next round opens automatically.".to_string()
    } else {
        "⏹ Auto mode off.".to_string()
    }
}
