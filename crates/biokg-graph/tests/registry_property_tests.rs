use biokg_graph::{EquivalenceTable, IdentifierRegistry, NodeKind, PrefixMap};
use proptest::prelude::*;
use std::collections::BTreeSet;

const MAX_IDS: usize = 24;

fn curie_strategy() -> impl Strategy<Value = String> {
    (prop::sample::select(vec!["HP", "GO", "MONDO", "CHEBI"]), 0u32..500)
        .prop_map(|(prefix, n)| format!("{prefix}:{n:07}"))
}

fn kind_strategy() -> impl Strategy<Value = NodeKind> {
    prop_oneof![Just(NodeKind::Class), Just(NodeKind::Instance)]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn registering_twice_returns_the_same_id(
        ids in prop::collection::vec((curie_strategy(), kind_strategy()), 1..MAX_IDS)
    ) {
        let registry = IdentifierRegistry::new();
        let first: Vec<_> = ids
            .iter()
            .map(|(id, kind)| registry.register(id, *kind).unwrap())
            .collect();
        let second: Vec<_> = ids
            .iter()
            .map(|(id, kind)| registry.register(id, *kind).unwrap())
            .collect();
        prop_assert_eq!(&first, &second);

        for (raw, id) in ids.iter().map(|(raw, _)| raw).zip(&first) {
            prop_assert_eq!(&registry.resolve(raw).unwrap(), id);
        }

        let distinct: BTreeSet<_> = ids.iter().map(|(raw, _)| raw.clone()).collect();
        prop_assert_eq!(registry.len(), distinct.len());
    }

    #[test]
    fn equivalence_representative_is_independent_of_pair_order(
        pairs in prop::collection::vec((curie_strategy(), curie_strategy()), 1..MAX_IDS),
        seed in any::<u64>()
    ) {
        let prefixes = PrefixMap::new();
        let forward = EquivalenceTable::from_pairs(&prefixes, pairs.iter().cloned()).unwrap();

        let mut shuffled: Vec<(String, String)> =
            pairs.iter().map(|(a, b)| (b.clone(), a.clone())).collect();
        shuffled.reverse();
        let rot = (seed as usize) % shuffled.len();
        shuffled.rotate_left(rot);
        let backward = EquivalenceTable::from_pairs(&prefixes, shuffled).unwrap();

        for (a, b) in &pairs {
            for raw in [a, b] {
                let iri = prefixes.normalize(raw).unwrap();
                prop_assert_eq!(forward.canonical(&iri), backward.canonical(&iri));
            }
            let ia = prefixes.normalize(a).unwrap();
            let ib = prefixes.normalize(b).unwrap();
            prop_assert_eq!(forward.canonical(&ia), forward.canonical(&ib));
        }
    }

    #[test]
    fn class_registration_wins_in_any_order(
        kinds in prop::collection::vec(kind_strategy(), 1..8)
    ) {
        let registry = IdentifierRegistry::new();
        let mut id = None;
        for kind in &kinds {
            id = Some(registry.register("PR:000001", *kind).unwrap());
        }
        let expected = if kinds.contains(&NodeKind::Class) {
            NodeKind::Class
        } else {
            NodeKind::Instance
        };
        prop_assert_eq!(registry.kind_of(&id.unwrap()), Some(expected));
    }
}

#[test]
fn concurrent_registration_yields_identical_ids() {
    let registry = IdentifierRegistry::new();
    let ids: Vec<String> = (0..200).map(|n| format!("MONDO:{n:07}")).collect();

    let per_thread: Vec<Vec<_>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let registry = &registry;
                let ids = &ids;
                scope.spawn(move || {
                    let mut order: Vec<&String> = ids.iter().collect();
                    if t % 2 == 1 {
                        order.reverse();
                    }
                    let mut out: Vec<_> = order
                        .into_iter()
                        .map(|raw| registry.register(raw, NodeKind::Class).unwrap())
                        .collect();
                    out.sort();
                    out
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for ids in &per_thread[1..] {
        assert_eq!(ids, &per_thread[0]);
    }
    assert_eq!(registry.len(), 200);
}
