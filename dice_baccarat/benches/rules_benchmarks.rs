use chrono::{Duration, Utc};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use dice_baccarat::game::{BetClass, BetLimits, Game, Outcome, Phase, rules};
use std::hint::black_box;

/// Helper to create a finished round with `n` participants spread over all classes
fn finished_game(n: i64) -> Game {
    let now = Utc::now();
    let limits = BetLimits {
        max_per_class: 10_000,
        max_total: 25_000,
    };
    let mut game = Game::new(1, Duration::seconds(30), now);
    for participant in 0..n {
        let class = BetClass::ALL[(participant % 3) as usize];
        game.place_bet(participant, "p", class, 100 + participant, &limits, now)
            .unwrap();
    }
    game.draws.a = vec![2, 3, 1];
    game.draws.b = vec![1, 1, 4];
    game.outcome = Some(Outcome::from_draws(&game.draws));
    game.phase = Phase::Finished;
    game
}

/// Benchmark every opening/third-draw combination of the banker table
fn bench_banker_table(c: &mut Criterion) {
    c.bench_function("banker_draws_third_table", |b| {
        b.iter(|| {
            let mut draws = 0;
            for total in 0..=9u8 {
                for third in (1..=6u8).map(Some).chain([None]) {
                    if rules::banker_draws_third(black_box(total), black_box(third)) {
                        draws += 1;
                    }
                }
            }
            draws
        });
    });
}

/// Benchmark totals of full three-draw hands
fn bench_total(c: &mut Criterion) {
    let hand = [6u8, 5, 4];
    c.bench_function("total_three_draws", |b| {
        b.iter(|| rules::total(black_box(&hand)));
    });
}

/// Benchmark settlement with increasing participant counts
fn bench_settle(c: &mut Criterion) {
    let mut group = c.benchmark_group("settle");

    for n in [2, 20, 200] {
        let game = finished_game(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &game, |b, game| {
            b.iter(|| game.settle(black_box(8)));
        });
    }

    group.finish();
}

/// Benchmark bet validation against ceilings
fn bench_place_bet(c: &mut Criterion) {
    let now = Utc::now();
    let limits = BetLimits {
        max_per_class: 10_000,
        max_total: 25_000,
    };
    let base = Game::new(1, Duration::seconds(30), now);

    c.bench_function("place_bet_accumulate", |b| {
        b.iter(|| {
            let mut game = base.clone();
            for participant in 0..10 {
                let _ = game.place_bet(participant, "p", BetClass::Tie, 50, &limits, now);
                let _ = game.place_bet(participant, "p", BetClass::Tie, 50, &limits, now);
            }
            game
        });
    });
}

criterion_group!(
    benches,
    bench_banker_table,
    bench_total,
    bench_settle,
    bench_place_bet
);
criterion_main!(benches);
