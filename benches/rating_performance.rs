//! Performance benchmarks for rating calculations

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rivalry::game::{NewGame, NewSide, RatingBook};
use rivalry::rating::{EntityRating, RatingEngine, SideInput};
use rivalry::roster::{draft_order, DraftSide};
use rivalry::types::ContextPolicy;

fn side(size: usize, ratings: &[i64]) -> SideInput {
    SideInput {
        size,
        entities: ratings
            .iter()
            .map(|&rating| EntityRating {
                rating,
                prior_games: 25,
            })
            .collect(),
    }
}

/// Book with a ladder of confirmed duels and 2v2s
fn create_bench_book(engine: &RatingEngine, games: usize) -> RatingBook {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut book = RatingBook::new(engine.starting_rating());
    book.register_context("bench", ContextPolicy::default())
        .unwrap();
    for i in 0..12 {
        let id = format!("player_{}", i);
        book.register_member(&id, &id, "bench", start).unwrap();
    }

    for i in 0..games {
        let at = start + Duration::minutes(i as i64);
        let pick = |offset: usize| format!("player_{}", (i + offset) % 12);
        let sides = if i % 3 == 0 {
            vec![
                NewSide::of([pick(0), pick(1)]),
                NewSide::of([pick(2), pick(5)]),
            ]
        } else {
            vec![NewSide::of([pick(0)]), NewSide::of([pick(7)])]
        };
        let game_id = book
            .create_game(
                NewGame {
                    context_id: "bench".to_string(),
                    ranked: true,
                    sides,
                },
                at,
            )
            .unwrap();
        let winner = book.game(game_id).unwrap().sides[i % 2].id;
        book.declare_winner(engine, game_id, winner, true, at)
            .unwrap();
    }
    book
}

fn bench_win_probabilities(c: &mut Criterion) {
    let engine = RatingEngine::default();
    let duel = vec![side(1, &[1100]), side(1, &[950])];
    let free_for_all: Vec<SideInput> = (0..6)
        .map(|i| side(2, &[900 + i * 40, 1000 + i * 25]))
        .collect();
    let uneven = vec![side(1, &[1200]), side(3, &[1000, 980, 1010]), side(2, &[1050, 990])];

    c.bench_function("win_probabilities_duel", |b| {
        b.iter(|| black_box(engine.win_probabilities(&duel)))
    });
    c.bench_function("win_probabilities_6_sides", |b| {
        b.iter(|| black_box(engine.win_probabilities(&free_for_all)))
    });
    c.bench_function("win_probabilities_handicap", |b| {
        b.iter(|| black_box(engine.win_probabilities(&uneven)))
    });
}

fn bench_recalculate_all(c: &mut Criterion) {
    let engine = RatingEngine::default();
    let book = create_bench_book(&engine, 500);

    c.bench_function("recalculate_all_500_games", |b| {
        b.iter(|| {
            let mut book = book.clone();
            black_box(book.recalculate_all(&engine))
        })
    });
}

fn bench_draft_order(c: &mut Criterion) {
    let sides: Vec<DraftSide> = [5usize, 4, 3]
        .iter()
        .enumerate()
        .map(|(index, &size)| DraftSide {
            side_id: uuid::Uuid::new_v4(),
            size,
            members: (0..size).map(|m| format!("s{}_m{}", index, m)).collect(),
        })
        .collect();

    c.bench_function("draft_order_3_sides", |b| {
        b.iter(|| black_box(draft_order(&sides)))
    });
}

criterion_group!(
    benches,
    bench_win_probabilities,
    bench_recalculate_all,
    bench_draft_order
);
criterion_main!(benches);
