use criterion::{black_box, criterion_group, criterion_main, Criterion};

use pollexam_core::model::{Participant, UserResult};
use pollexam_core::scoring::{apply_answer, rank, settle};

fn make_results(n: usize, questions: usize) -> Vec<UserResult> {
    (0..n)
        .map(|p| {
            let mut result = UserResult::new(Participant::new(p as i64, format!("user {p}")));
            for q in 0..questions {
                if (p + q) % 3 != 0 {
                    apply_answer(&mut result, q, q % 4, (p * q) % 4, 1.0, 0.25);
                }
            }
            settle(&mut result, questions);
            result
        })
        .collect()
}

fn bench_apply_answer(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply_answer");

    group.bench_function("correct", |b| {
        b.iter(|| {
            let mut result = UserResult::new(Participant::new(1, "bench"));
            apply_answer(&mut result, black_box(0), 2, black_box(2), 1.0, 0.25)
        })
    });

    group.bench_function("100_answers_and_settle", |b| {
        b.iter(|| {
            let mut result = UserResult::new(Participant::new(1, "bench"));
            for q in 0..100 {
                apply_answer(&mut result, q, q % 4, black_box(q % 3), 1.0, 0.25);
            }
            settle(&mut result, black_box(120));
            result
        })
    });

    group.finish();
}

fn bench_rank(c: &mut Criterion) {
    let mut group = c.benchmark_group("rank");

    let small = make_results(10, 20);
    let medium = make_results(200, 50);
    let large = make_results(5000, 100);

    group.bench_function("10_participants", |b| {
        b.iter(|| rank(black_box(small.clone())))
    });

    group.bench_function("200_participants", |b| {
        b.iter(|| rank(black_box(medium.clone())))
    });

    group.bench_function("5000_participants", |b| {
        b.iter(|| rank(black_box(large.clone())))
    });

    group.finish();
}

criterion_group!(benches, bench_apply_answer, bench_rank);
criterion_main!(benches);
