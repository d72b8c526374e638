use std::collections::BTreeSet;

use proptest::prelude::*;
use proptest_derive::Arbitrary;

use crate::VebSet;

/// Reference model using `BTreeSet` for comparison.
#[derive(Default, Clone)]
struct Model {
    set: BTreeSet<u64>,
}

impl Model {
    fn insert(&mut self, x: u64) {
        self.set.insert(x);
    }

    fn remove(&mut self, x: u64) {
        self.set.remove(&x);
    }

    fn contains(&self, x: u64) -> bool {
        self.set.contains(&x)
    }

    fn successor(&self, x: u64) -> Option<u64> {
        self.set.range(x + 1..).next().copied()
    }

    fn predecessor(&self, x: u64) -> Option<u64> {
        if x == 0 {
            None
        } else {
            self.set.range(..x).next_back().copied()
        }
    }

    fn min(&self) -> Option<u64> {
        self.set.iter().next().copied()
    }

    fn max(&self) -> Option<u64> {
        self.set.iter().next_back().copied()
    }

    fn len(&self) -> usize {
        self.set.len()
    }
}

/// Key generator biased to land keys in each of the four node levels'
/// native ranges, since uniform `u64` sampling would almost never produce
/// a value small enough to exercise `Leaf256` or `Node16`.
#[derive(Debug, Clone, Copy)]
struct Key(u64);

impl Arbitrary for Key {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        prop_oneof![
            (0u64..256).prop_map(Key),
            (0u64..65_536).prop_map(Key),
            (0u64..(1u64 << 32)).prop_map(Key),
            any::<u64>().prop_map(Key),
        ]
        .boxed()
    }
}

#[derive(Arbitrary, Debug, Clone)]
enum Action {
    Insert(Key),
    Remove(Key),
    Contains(Key),
    Successor(Key),
    Predecessor(Key),
}

/// Executes a sequence of actions against both a `VebSet` and a
/// `BTreeSet`-backed model, asserting agreement after every step.
#[derive(Default)]
struct Test {
    set: VebSet,
    model: Model,
}

impl Test {
    fn execute(&mut self, action: Action) {
        match action {
            Action::Insert(Key(x)) => {
                self.set.insert(x);
                self.model.insert(x);
            }
            Action::Remove(Key(x)) => {
                self.set.remove(x);
                self.model.remove(x);
            }
            Action::Contains(Key(x)) => {
                assert_eq!(
                    self.set.contains(x),
                    self.model.contains(x),
                    "contains mismatch at {x}"
                );
            }
            Action::Successor(Key(x)) => {
                assert_eq!(
                    self.set.successor(x),
                    self.model.successor(x),
                    "successor mismatch at {x}"
                );
            }
            Action::Predecessor(Key(x)) => {
                assert_eq!(
                    self.set.predecessor(x),
                    self.model.predecessor(x),
                    "predecessor mismatch at {x}"
                );
            }
        }
        assert_eq!(self.set.size(), self.model.len(), "size mismatch");
        assert_eq!(self.set.is_empty(), self.model.len() == 0, "is_empty mismatch");
        assert_eq!(self.set.min(), self.model.min(), "min mismatch");
        assert_eq!(self.set.max(), self.model.max(), "max mismatch");
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn proptest_vs_btreeset(actions in prop::collection::vec(any::<Action>(), 1..128)) {
        let mut test = Test::default();
        for action in actions {
            test.execute(action);
        }
    }

    #[test]
    fn serialize_roundtrip_is_lossless(keys in prop::collection::vec(any::<Key>(), 0..80)) {
        let mut set = VebSet::create();
        for Key(x) in keys {
            set.insert(x);
        }
        let bytes = set.serialize();
        let restored = VebSet::deserialize(&bytes).unwrap();
        prop_assert_eq!(restored.to_array(), set.to_array());
    }

    #[test]
    fn union_is_commutative_and_idempotent(
        a_keys in prop::collection::vec(any::<Key>(), 0..40),
        b_keys in prop::collection::vec(any::<Key>(), 0..40),
    ) {
        let mut a = VebSet::create();
        for Key(x) in &a_keys {
            a.insert(*x);
        }
        let mut b = VebSet::create();
        for Key(x) in &b_keys {
            b.insert(*x);
        }

        let mut ab = a.clone();
        ab.union(&b);
        let mut ba = b.clone();
        ba.union(&a);
        prop_assert_eq!(ab.to_array(), ba.to_array());

        let mut aa = a.clone();
        aa.union(&a);
        prop_assert_eq!(aa.to_array(), a.to_array());

        let model: BTreeSet<u64> = a_keys
            .iter()
            .chain(b_keys.iter())
            .map(|Key(x)| *x)
            .collect();
        prop_assert_eq!(ab.to_array(), model.into_iter().collect::<Vec<_>>());
    }

    #[test]
    fn intersection_and_xor_agree_with_set_algebra(
        a_keys in prop::collection::vec(any::<Key>(), 0..40),
        b_keys in prop::collection::vec(any::<Key>(), 0..40),
    ) {
        let mut a = VebSet::create();
        for Key(x) in &a_keys {
            a.insert(*x);
        }
        let mut b = VebSet::create();
        for Key(x) in &b_keys {
            b.insert(*x);
        }

        let a_model: BTreeSet<u64> = a_keys.iter().map(|Key(x)| *x).collect();
        let b_model: BTreeSet<u64> = b_keys.iter().map(|Key(x)| *x).collect();

        let mut inter = a.clone();
        inter.intersection(&b);
        let expected_inter: Vec<u64> = a_model.intersection(&b_model).copied().collect();
        prop_assert_eq!(inter.to_array(), expected_inter);

        let mut xor = a.clone();
        xor.symmetric_difference(&b);
        let expected_xor: Vec<u64> = a_model.symmetric_difference(&b_model).copied().collect();
        prop_assert_eq!(xor.to_array(), expected_xor);

        // a ^ a == empty
        let mut self_xor = a.clone();
        self_xor.symmetric_difference(&a);
        prop_assert!(self_xor.is_empty());

        // |a| + |b| - |a & b| == |a | b|
        let mut union = a.clone();
        union.union(&b);
        prop_assert_eq!(union.size() + inter.size(), a.size() + b.size());
    }
}
