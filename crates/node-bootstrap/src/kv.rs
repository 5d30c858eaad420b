//! Deterministic flattening of key/value maps into the delimiter-joined
//! strings used on kubelet command lines, in node label lists and in OS tuning
//! files.
//!
//! Map iteration order never leaks into the output: pairs are always sorted by
//! key before they are joined, so rendering the same map twice produces the
//! same bytes.

use std::{collections::BTreeMap, fmt::Display};

/// The maximum length of a Kubernetes label value.
pub const LABEL_VALUE_MAX_LEN: usize = 63;

/// Characters a label value must not end with.
const FORBIDDEN_LABEL_VALUE_SUFFIXES: [char; 3] = ['-', '_', '.'];

/// Joins `key<separator>value` pairs with `,`, sorted by key in ascending
/// lexicographic order.
///
/// ```
/// # use std::collections::BTreeMap;
/// use node_bootstrap::kv::join_sorted;
///
/// let eviction = BTreeMap::from([
///     ("nodefs.available", "10%"),
///     ("memory.available", "750Mi"),
/// ]);
///
/// assert_eq!(
///     join_sorted(eviction, "<"),
///     "memory.available<750Mi,nodefs.available<10%"
/// );
/// ```
///
/// An empty input produces an empty string. Callers must not emit a flag for
/// it, see [`insert_joined`].
pub fn join_sorted<K, V>(pairs: impl IntoIterator<Item = (K, V)>, separator: &str) -> String
where
    K: Display,
    V: Display,
{
    join_sorted_with(pairs, separator, ",")
}

/// Joins `key=value` pairs with `delimiter`, sorted by key in ascending
/// lexicographic order.
///
/// This is the form used by sysctl and systemd drop-in content, which put
/// pairs next to each other separated by spaces.
pub fn create_sorted_key_value_pairs<K, V>(
    pairs: impl IntoIterator<Item = (K, V)>,
    delimiter: &str,
) -> String
where
    K: Display,
    V: Display,
{
    join_sorted_with(pairs, "=", delimiter)
}

/// Inserts `name` into `target` with the [`join_sorted`] form of `pairs` as
/// its value. Nothing is inserted if `pairs` is empty.
pub fn insert_joined<K, V>(
    target: &mut BTreeMap<String, String>,
    name: &str,
    pairs: impl IntoIterator<Item = (K, V)>,
    separator: &str,
) where
    K: Display,
    V: Display,
{
    let joined = join_sorted(pairs, separator);
    if !joined.is_empty() {
        target.insert(name.to_owned(), joined);
    }
}

fn join_sorted_with<K, V>(
    pairs: impl IntoIterator<Item = (K, V)>,
    separator: &str,
    delimiter: &str,
) -> String
where
    K: Display,
    V: Display,
{
    let mut pairs = pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect::<Vec<_>>();
    pairs.sort_by(|(lhs, _), (rhs, _)| lhs.cmp(rhs));

    pairs
        .iter()
        .map(|(key, value)| format!("{key}{separator}{value}"))
        .collect::<Vec<_>>()
        .join(delimiter)
}

/// Turns a free-text identifier (usually an Azure resource group name) into a
/// string usable as a label value on cluster-managed resources.
///
/// Parentheses are replaced with `-`, the result is truncated to
/// [`LABEL_VALUE_MAX_LEN`] characters, and a trailing `-`, `_` or `.` is
/// followed by (or, at the length limit, replaced with) a `z`.
///
/// ```
/// use node_bootstrap::kv::normalize_label_value;
///
/// assert_eq!(normalize_label_value("my(rg)"), "my-rg-z");
/// ```
pub fn normalize_label_value(input: &str) -> String {
    let mut normalized = input
        .chars()
        .map(|c| match c {
            '(' | ')' => '-',
            c => c,
        })
        .take(LABEL_VALUE_MAX_LEN)
        .collect::<String>();

    if normalized.ends_with(FORBIDDEN_LABEL_VALUE_SUFFIXES) {
        if normalized.chars().count() >= LABEL_VALUE_MAX_LEN {
            normalized.pop();
        }
        normalized.push('z');
    }

    normalized
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(&[], "=", "")]
    #[case(&[("key1", "value1")], "=", "key1=value1")]
    #[case(&[("b", "valb"), ("a", "vala"), ("c", "valc")], "=", "a=vala,b=valb,c=valc")]
    #[case(&[("nodefs.available", "10%"), ("memory.available", "750Mi")], "<", "memory.available<750Mi,nodefs.available<10%")]
    fn join_sorted_pairs(
        #[case] pairs: &[(&str, &str)],
        #[case] separator: &str,
        #[case] expected: &str,
    ) {
        let map = pairs.iter().copied().collect::<HashMap<_, _>>();
        assert_eq!(join_sorted(map, separator), expected);
    }

    #[test]
    fn join_sorted_keys_are_strictly_ascending() {
        let map = (0..50)
            .map(|i| (format!("key-{}", (i * 37) % 50), i))
            .collect::<HashMap<_, _>>();

        let joined = join_sorted(&map, "=");
        let keys = joined
            .split(',')
            .map(|pair| pair.split_once('=').map(|(key, _)| key).unwrap())
            .collect::<Vec<_>>();

        assert_eq!(keys.len(), map.len());
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }

    #[rstest]
    #[case(&[], ",", "")]
    #[case(&[("key1", 1)], " ", "key1=1")]
    #[case(&[("key1", 1), ("key2", 2)], ",", "key1=1,key2=2")]
    #[case(&[("key1", 1), ("key2", 2)], " ", "key1=1 key2=2")]
    #[case(&[("b", 2), ("a", 1), ("c", 3)], ",", "a=1,b=2,c=3")]
    fn sorted_key_value_pairs(
        #[case] pairs: &[(&str, i32)],
        #[case] delimiter: &str,
        #[case] expected: &str,
    ) {
        let map = pairs.iter().copied().collect::<HashMap<_, _>>();
        assert_eq!(create_sorted_key_value_pairs(map, delimiter), expected);
    }

    #[test]
    fn insert_joined_skips_empty_maps() {
        let mut flags = BTreeMap::new();

        insert_joined(&mut flags, "--kube-reserved", BTreeMap::<&str, &str>::new(), "=");
        assert!(flags.is_empty());

        insert_joined(&mut flags, "--kube-reserved", [("cpu", "100m")], "=");
        assert_eq!(flags.get("--kube-reserved").map(String::as_str), Some("cpu=100m"));
    }

    #[rstest]
    #[case("my-rg", "my-rg")]
    #[case("my(rg)", "my-rg-z")]
    #[case("rg_", "rg_z")]
    #[case("rg.", "rg.z")]
    #[case(&"a".repeat(70), &"a".repeat(63))]
    #[case(&format!("{}-", "a".repeat(62)), &format!("{}z", "a".repeat(62)))]
    #[case(&format!("{}-b", "a".repeat(62)), &format!("{}z", "a".repeat(62)))]
    #[case(&format!("{}_", "a".repeat(61)), &format!("{}_z", "a".repeat(61)))]
    fn normalize_label_values(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_label_value(input), expected);
    }

    #[rstest]
    #[case("MC_my-resource-group_my-cluster_westeurope")]
    #[case("(((((((((((((((((((((((((((((((((((((((((((((((((((((((((((((((((")]
    #[case("rg.with.dots.")]
    #[case(&"x_".repeat(40))]
    fn normalized_label_values_are_bounded(#[case] input: &str) {
        let normalized = normalize_label_value(input);

        assert!(!normalized.is_empty());
        assert!(normalized.chars().count() <= LABEL_VALUE_MAX_LEN);
        assert!(!normalized.ends_with(FORBIDDEN_LABEL_VALUE_SUFFIXES));
    }
}
