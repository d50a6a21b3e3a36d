//! Criterion benchmarks for a full round of scripted play.
//!
//! Run with:
//!     cargo bench --bench round_cycle

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rand::{Rng, SeedableRng, rngs::StdRng};

use powergrid::game::bot::play_rounds;
use powergrid::game::{MatchConfig, MatchState, PlayerId};

fn table(match_id: [u8; 16], seats: u8) -> MatchState {
    let mut state = MatchState::new(match_id, MatchConfig::default());
    for i in 1..=seats {
        state.add_player(PlayerId::new([i; 16]), &format!("bot{i}")).unwrap();
    }
    state.start_match().unwrap();
    state
}

fn bench_round(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(7);
    let mut group = c.benchmark_group("round_cycle");

    for seats in [2u8, 4, 6] {
        group.bench_with_input(BenchmarkId::new("one_round", seats), &seats, |b, &seats| {
            b.iter_batched(
                || table(rng.gen(), seats),
                |mut state| {
                    play_rounds(&mut state, 1).unwrap();
                    black_box(state.compute_hash())
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_state_hash(c: &mut Criterion) {
    let mut state = table([9; 16], 4);
    play_rounds(&mut state, 3).unwrap();
    c.bench_function("compute_hash_after_three_rounds", |b| b.iter(|| black_box(state.compute_hash())));
}

criterion_group!(benches, bench_round, bench_state_hash);
criterion_main!(benches);
