//! Query-string parsing shared by the HTTP/1.1 and HTTP/2 request paths
//! (spec.md §4.5). Percent-decoding itself is treated as a pure helper
//! collaborator, delegated to the `percent-encoding` crate rather than
//! hand-rolled, per the ambient-stack rule.

use percent_encoding::percent_decode_str;
use std::str::FromStr;

/// Ordered, duplicate-preserving key/value pairs from a request target's
/// query component.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    pub fn parse(raw: &str) -> Self {
        let mut pairs = Vec::new();
        if raw.is_empty() {
            return QueryParams(pairs);
        }
        for pair in raw.split('&') {
            if pair.is_empty() {
                continue;
            }
            let (k, v) = match pair.split_once('=') {
                Some((k, v)) => (k, v),
                None => (pair, ""),
            };
            let key = percent_decode_str(k).decode_utf8_lossy().into_owned();
            let value = percent_decode_str(v).decode_utf8_lossy().into_owned();
            pairs.push((key, value));
        }
        QueryParams(pairs)
    }

    /// Splits `target` into (path, query_params); `path` never contains `?`.
    pub fn split_target(target: &str) -> (&str, Self) {
        match target.split_once('?') {
            Some((path, query)) => (path, Self::parse(query)),
            None => (target, Self::parse("")),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// First value for `key`, parsed as `T`.
    pub fn get<T: FromStr>(&self, key: &str) -> Option<T> {
        self.0.iter().find(|(k, _)| k == key).and_then(|(_, v)| v.parse().ok())
    }

    /// All values for `key`, parsed as `T`, in order; entries that fail to
    /// parse are skipped rather than aborting the whole collection.
    pub fn get_all<T: FromStr>(&self, key: &str) -> Vec<T> {
        self.0.iter().filter(|(k, _)| k == key).filter_map(|(_, v)| v.parse().ok()).collect()
    }

    pub fn raw(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_path_from_query() {
        let (path, q) = QueryParams::split_target("/search?q=rust&page=2");
        assert_eq!(path, "/search");
        assert_eq!(q.get::<u32>("page"), Some(2));
        assert_eq!(q.raw("q"), Some("rust"));
    }

    #[test]
    fn missing_equals_yields_empty_value() {
        let q = QueryParams::parse("flag");
        assert_eq!(q.raw("flag"), Some(""));
    }

    #[test]
    fn duplicate_keys_are_all_preserved_in_order() {
        let q = QueryParams::parse("tag=a&tag=b&tag=c");
        assert_eq!(q.get_all::<String>("tag"), vec!["a", "b", "c"]);
    }

    #[test]
    fn percent_decodes_both_sides() {
        let q = QueryParams::parse("na%20me=va%2Flue");
        assert_eq!(q.raw("na me"), Some("va/lue"));
    }
}
