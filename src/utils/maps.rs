/// Whether any entry of a map satisfies `predicate`.
///
/// Accepts anything iterating as key/value reference pairs, such as `&BTreeMap`, `&IndexMap`
/// or a JSON object.
pub fn any<'a, K, V, M, F>(map: M, mut predicate: F) -> bool
where
    K: 'a + ?Sized,
    V: 'a + ?Sized,
    M: IntoIterator<Item = (&'a K, &'a V)>,
    F: FnMut(&K, &V) -> bool,
{
    map.into_iter().any(|(key, value)| predicate(key, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn matches_on_key_or_value() {
        let map = BTreeMap::from([(1u64, "a"), (2, "b")]);
        assert!(any(&map, |k, _| *k == 2));
        assert!(any(&map, |_, v| *v == "a"));
        assert!(!any(&map, |k, v| *k == 1 && *v == "b"));
    }

    #[test]
    fn empty_map_has_no_match() {
        let map: IndexMap<String, String> = IndexMap::new();
        assert!(!any(&map, |_, _| true));
    }

    #[test]
    fn works_over_json_objects() {
        let data = json!({"title": "Dune", "pages": 412});
        let object = data.as_object().expect("should be an object");
        assert!(any(object, |_, v| v.is_number()));
        assert!(!any(object, |k, _| k.starts_with("author")));
    }
}
