//! Criterion benchmarks for the hot registry paths: creation, destruction,
//! and view iteration.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use strata_ecs::prelude::*;

#[derive(Clone, Copy)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Clone, Copy)]
struct Velocity {
    dx: f32,
    dy: f32,
}

#[derive(Clone, Copy)]
struct Mass(f32);

const ENTITY_COUNT: usize = 10_000;

fn populated_registry() -> (Registry, Vec<Entity>) {
    let mut registry = Registry::new();
    let mut entities = Vec::with_capacity(ENTITY_COUNT);
    for i in 0..ENTITY_COUNT {
        let e = if i % 2 == 0 {
            registry
                .create((
                    Position {
                        x: i as f32,
                        y: 0.0,
                    },
                    Velocity { dx: 1.0, dy: 1.0 },
                ))
                .unwrap()
        } else {
            registry
                .create((
                    Position {
                        x: i as f32,
                        y: 0.0,
                    },
                    Velocity { dx: 1.0, dy: 1.0 },
                    Mass(1.0),
                ))
                .unwrap()
        };
        entities.push(e);
    }
    (registry, entities)
}

fn bench_create(c: &mut Criterion) {
    c.bench_function("create_10k_two_archetypes", |b| {
        b.iter(|| {
            let (registry, _) = populated_registry();
            black_box(registry.entity_count())
        })
    });
}

fn bench_destroy(c: &mut Criterion) {
    c.bench_function("destroy_10k", |b| {
        b.iter_with_setup(populated_registry, |(mut registry, entities)| {
            for e in entities {
                registry.destroy(e).unwrap();
            }
            black_box(registry.entity_count())
        })
    });
}

fn bench_iterate(c: &mut Criterion) {
    let (mut registry, _) = populated_registry();
    c.bench_function("iterate_10k_pos_vel", |b| {
        b.iter(|| {
            let mut sum = 0.0f32;
            registry.each::<(&Position, &Velocity)>(|(pos, vel)| {
                sum += pos.x * vel.dx + pos.y * vel.dy;
            });
            black_box(sum)
        })
    });
    c.bench_function("integrate_10k_pos_vel", |b| {
        b.iter(|| {
            registry.each_mut::<(&mut Position, &Velocity)>(|(pos, vel)| {
                pos.x += vel.dx;
                pos.y += vel.dy;
            });
        })
    });
}

fn bench_get(c: &mut Criterion) {
    let (registry, entities) = populated_registry();
    c.bench_function("get_10k_random_access", |b| {
        b.iter(|| {
            let mut sum = 0.0f32;
            for &e in &entities {
                sum += registry.get::<Position>(e).unwrap().x;
            }
            black_box(sum)
        })
    });
}

criterion_group!(benches, bench_create, bench_destroy, bench_iterate, bench_get);
criterion_main!(benches);
