//! The deal sequence: which die is rolled when.

use crate::{
    effects::{EffectQueue, QueueError},
    game::{Draws, RoomId, Side, rules},
    narration,
};

/// Roll a full round through `queue`.
///
/// First A1, B1, A2, B2. A natural on either side ends the deal. Otherwise
/// side B may take a third die, then side A decides with knowledge of it.
///
/// # Errors
///
/// Only when the queue is cleared or shut down mid-deal. Failed rolls are
/// already replaced by fallback values inside the queue.
pub async fn deal(queue: &EffectQueue, room: RoomId) -> Result<Draws, QueueError> {
    let mut draws = Draws::default();

    for (side, index) in [(Side::A, 1), (Side::B, 1), (Side::A, 2), (Side::B, 2)] {
        draw(queue, room, &mut draws, side, index).await?;
    }

    let total_a = draws.total(Side::A);
    let total_b = draws.total(Side::B);

    if rules::is_natural(total_a, total_b) {
        queue
            .enqueue_notify(room, narration::natural(total_a, total_b), false)
            .await?;
        return Ok(draws);
    }

    if rules::player_draws_third(total_b) {
        draw(queue, room, &mut draws, Side::B, 3).await?;
    }

    if rules::banker_draws_third(total_a, draws.third(Side::B)) {
        draw(queue, room, &mut draws, Side::A, 3).await?;
    }

    Ok(draws)
}

async fn draw(
    queue: &EffectQueue,
    room: RoomId,
    draws: &mut Draws,
    side: Side,
    index: u8,
) -> Result<(), QueueError> {
    queue
        .enqueue_notify(room, narration::drawing(side, index), false)
        .await?;
    let value = queue.enqueue_draw(room, side, index).await?;
    draws.push(side, value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        effects::{QueueConfig, channel::testing::MockChannel},
        game::RoundId,
    };
    use std::{sync::Arc, time::Duration};

    fn start(channel: &MockChannel) -> EffectQueue {
        let config = QueueConfig {
            min_gap: Duration::from_millis(10),
            reveal_delay: Duration::from_millis(10),
            ..QueueConfig::default()
        };
        let (queue, worker) = EffectQueue::new(Arc::new(channel.clone()), config);
        tokio::spawn(worker.run());
        queue.set_active_game(RoundId::from("deal"));
        queue
    }

    #[tokio::test(start_paused = true)]
    async fn test_natural_stops_after_four_draws() {
        // A: 4 + 4 = 8 is a natural
        let channel = MockChannel::new().with_draws([4, 1, 4, 1]);
        let queue = start(&channel);

        let draws = deal(&queue, 1).await.unwrap();
        assert_eq!(draws.a, vec![4, 4]);
        assert_eq!(draws.b, vec![1, 1]);
        assert_eq!(channel.drawn(), vec![4, 1, 4, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_both_sides_draw_third() {
        // A: 1 + 2 = 3, B: 1 + 1 = 2. B draws 5, A at 3 with t=5 draws.
        let channel = MockChannel::new().with_draws([1, 1, 2, 1, 5, 6]);
        let queue = start(&channel);

        let draws = deal(&queue, 1).await.unwrap();
        assert_eq!(draws.b, vec![1, 1, 5]);
        assert_eq!(draws.a, vec![1, 2, 6]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_banker_stands_on_seven_after_player_third() {
        // A: 3 + 4 = 7, B: 2 + 2 = 4 draws a third, A stands on 7
        let channel = MockChannel::new().with_draws([3, 2, 4, 2, 6]);
        let queue = start(&channel);

        let draws = deal(&queue, 1).await.unwrap();
        assert_eq!(draws.a, vec![3, 4]);
        assert_eq!(draws.b, vec![2, 2, 6]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_player_stands_banker_uses_plain_rule() {
        // A: 1 + 1 = 2 draws, B: 3 + 3 = 6 stands
        let channel = MockChannel::new().with_draws([1, 3, 1, 3, 4]);
        let queue = start(&channel);

        let draws = deal(&queue, 1).await.unwrap();
        assert_eq!(draws.a, vec![1, 1, 4]);
        assert_eq!(draws.b, vec![3, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_draw_is_announced_before_it_is_rolled() {
        let channel = MockChannel::new().with_draws([4, 1, 4, 1]);
        let queue = start(&channel);
        deal(&queue, 1).await.unwrap();
        queue.enqueue_notify(1, "flush", true).await.unwrap();

        let texts = channel.texts();
        assert!(texts[0].contains("Rolling"));
        assert!(texts[1].contains(": 4"));
        assert!(texts[texts.len() - 2].contains("Natural"));
    }
}
