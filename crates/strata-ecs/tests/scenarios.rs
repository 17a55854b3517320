//! End-to-end scenarios exercising the public registry surface: creation,
//! destruction, typed access, and views across mixed archetypes.

use strata_ecs::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Weights {
    a: u32,
    b: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Motion {
    f: f32,
    i: i32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Letters {
    c: char,
    e: char,
}

#[test]
fn create_entities_across_two_archetypes() {
    let mut registry = Registry::new();
    let a = registry
        .create((Weights { a: 1, b: 2 }, Letters { c: '<', e: '>' }))
        .unwrap();
    let b = registry
        .create((Weights { a: 7, b: 3 }, Letters { c: 'K', e: 'L' }))
        .unwrap();
    let c = registry.create((Motion { f: 0.0, i: 0 },)).unwrap();

    assert!(registry.alive(a) && registry.alive(b) && registry.alive(c));
    assert_eq!(registry.archetype_count(), 2);
}

#[test]
fn destroy_leaves_other_entities_untouched() {
    let mut registry = Registry::new();
    let a = registry
        .create((Weights { a: 1, b: 2 }, Letters { c: '<', e: '>' }))
        .unwrap();
    let b = registry
        .create((Weights { a: 7, b: 3 }, Letters { c: 'K', e: 'L' }))
        .unwrap();
    let c = registry.create((Motion { f: 0.0, i: 0 },)).unwrap();

    registry.destroy(a).unwrap();

    assert!(!registry.alive(a));
    assert!(registry.alive(b));
    assert!(registry.alive(c));
    assert_eq!(registry.get::<Weights>(b).unwrap(), &Weights { a: 7, b: 3 });
    assert_eq!(
        registry.get::<Letters>(b).unwrap(),
        &Letters { c: 'K', e: 'L' }
    );
}

#[test]
fn typed_get_single_and_tuple() {
    let mut registry = Registry::new();
    let a = registry
        .create((Motion { f: 0.345, i: -45 }, Letters { c: 'e', e: 'f' }))
        .unwrap();
    let b = registry
        .create((Motion { f: 0.678, i: -9 }, Letters { c: 'g', e: 'k' }))
        .unwrap();

    assert_eq!(registry.get::<Letters>(a).unwrap().c, 'e');

    let (motion, letters) = registry.fetch::<(&Motion, &Letters)>(b).unwrap();
    assert_eq!(motion.f, 0.678);
    assert_eq!(letters.c, 'g');
}

#[test]
fn has_reflects_the_composition() {
    let mut registry = Registry::new();
    let x = registry
        .create((Motion { f: 1.0, i: 2 }, Letters { c: 'a', e: 'b' }))
        .unwrap();

    assert!(registry.has::<Motion>(x).unwrap());
    assert!(registry.has::<Letters>(x).unwrap());
    assert!(!registry.has::<Weights>(x).unwrap());
}

#[test]
fn view_size_spans_superset_archetypes() {
    let mut registry = Registry::new();
    registry
        .create((Weights { a: 1, b: 1 }, Letters { c: 'a', e: 'b' }))
        .unwrap();
    registry
        .create((Weights { a: 2, b: 2 }, Letters { c: 'c', e: 'd' }))
        .unwrap();
    registry
        .create((
            Weights { a: 3, b: 3 },
            Letters { c: 'e', e: 'f' },
            Motion { f: 0.5, i: 5 },
        ))
        .unwrap();
    // Does not match: no Letters.
    registry.create((Weights { a: 9, b: 9 },)).unwrap();

    assert_eq!(registry.view::<(&Weights, &Letters)>().size(), 3);
}

#[test]
fn view_iteration_yields_created_values_archetype_major() {
    let mut registry = Registry::new();
    registry
        .create((Weights { a: 1, b: 1 }, Letters { c: 'a', e: 'b' }))
        .unwrap();
    registry
        .create((Weights { a: 2, b: 2 }, Letters { c: 'c', e: 'd' }))
        .unwrap();
    registry
        .create((
            Weights { a: 3, b: 3 },
            Letters { c: 'e', e: 'f' },
            Motion { f: 0.5, i: 5 },
        ))
        .unwrap();

    let view = registry.view::<(&Weights, &Letters)>();
    let yielded: Vec<(Weights, Letters)> = view.iter().map(|(w, l)| (*w, *l)).collect();

    assert_eq!(yielded.len(), 3);
    // Within one archetype, insertion order is preserved; the two-component
    // archetype was created first.
    assert_eq!(yielded[0].0, Weights { a: 1, b: 1 });
    assert_eq!(yielded[1].0, Weights { a: 2, b: 2 });
    assert_eq!(yielded[2].0, Weights { a: 3, b: 3 });
    assert_eq!(yielded[2].1, Letters { c: 'e', e: 'f' });
    assert_eq!(view.size(), yielded.len());
}

#[test]
fn views_can_read_entity_handles() {
    let mut registry = Registry::new();
    let a = registry.create((Weights { a: 1, b: 1 },)).unwrap();
    let b = registry.create((Weights { a: 2, b: 2 },)).unwrap();

    let handles: Vec<Entity> = registry
        .view::<(&Entity, &Weights)>()
        .iter()
        .map(|(e, _)| *e)
        .collect();
    assert_eq!(handles, vec![a, b]);
}

#[test]
fn mutable_view_updates_every_matching_entity() {
    let mut registry = Registry::new();
    let entities: Vec<Entity> = (0..10)
        .map(|i| {
            registry
                .create((Weights { a: i, b: 0 }, Motion { f: 1.5, i: 1 }))
                .unwrap()
        })
        .collect();

    registry.each_mut::<(&mut Weights, &Motion)>(|(w, m)| {
        w.b = (w.a as u64) * m.i as u64 + 1;
    });

    for (i, e) in entities.iter().enumerate() {
        assert_eq!(registry.get::<Weights>(*e).unwrap().b, i as u64 + 1);
    }
}
