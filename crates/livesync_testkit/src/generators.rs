//! Property-based test generators using proptest.

use livesync_codec::{Path, Value};
use proptest::prelude::*;

/// Upper bound (exclusive) of the keys produced by [`arb_small_key`] and
/// [`arb_keyed_list`]. Small enough that collisions are common.
pub const KEY_RANGE: i64 = 40;

/// Strategy for arbitrary documents.
pub fn arb_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        (-1.0e9f64..1.0e9).prop_map(Value::Float),
        "[a-z0-9 ]{0,12}".prop_map(Value::Text),
    ];
    leaf.prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..6)
                .prop_map(|fields| Value::Map(fields.into_iter().collect())),
        ]
    })
}

/// Strategy for a list key in `0..KEY_RANGE`.
pub fn arb_small_key() -> impl Strategy<Value = Value> {
    (0..KEY_RANGE).prop_map(Value::Integer)
}

/// Strategy for lists of `{"id": n}` documents sorted by unique `id`.
pub fn arb_keyed_list(max_len: usize) -> impl Strategy<Value = Vec<Value>> {
    prop::collection::btree_set(0..KEY_RANGE, 0..=max_len).prop_map(|ids| {
        ids.into_iter()
            .map(|id| Value::empty_map().with("id", id))
            .collect()
    })
}

/// Strategy for observation paths: either a name or a short segment list.
pub fn arb_path() -> impl Strategy<Value = Path> {
    prop_oneof![
        "[a-z]{1,10}".prop_map(|name: String| Path::from(name)),
        prop::collection::vec("[a-z]{1,6}", 1..4).prop_map(Path::from_segments),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn keyed_lists_are_strictly_sorted(items in arb_keyed_list(30)) {
            let keys: Vec<&Value> = items.iter().map(|item| item.field("id")).collect();
            prop_assert!(keys.windows(2).all(|pair| pair[0] < pair[1]));
        }

        #[test]
        fn values_equal_themselves(value in arb_value()) {
            prop_assert_eq!(value.cmp_total(&value), std::cmp::Ordering::Equal);
        }
    }
}
