use once_cell::sync::Lazy;
use regex::Regex;

static SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static SLASHES: Lazy<Regex> = Lazy::new(|| Regex::new(r"/+").expect("valid regex"));
static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z_\-0-9.]").expect("valid regex"));

/// Normalizes a raw metric name into something Graphite accepts as a path.
///
/// Runs of whitespace become `_`, runs of forward slashes become `-`, and anything else outside of `[A-Za-z0-9_.-]`
/// is removed. Normalizing an already-normalized key returns it unchanged.
pub fn normalize_key(raw: &str) -> String {
    let key = SPACES.replace_all(raw, "_");
    let key = SLASHES.replace_all(&key, "-");
    NON_ALNUM.replace_all(&key, "").into_owned()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::normalize_key;

    #[test]
    fn normalization() {
        let cases = [
            ("gorets", "gorets"),
            ("foo.bar-baz_quux", "foo.bar-baz_quux"),
            ("foo bar", "foo_bar"),
            ("foo \t\n bar", "foo_bar"),
            ("foo/bar", "foo-bar"),
            ("foo///bar", "foo-bar"),
            ("foo:bar|baz@", "foobarbaz"),
            ("héllo wörld", "hllo_wrld"),
            ("", ""),
        ];

        for (raw, expected) in cases {
            assert_eq!(normalize_key(raw), expected, "normalizing {:?}", raw);
        }
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent(raw in ".*") {
            let once = normalize_key(&raw);
            prop_assert_eq!(normalize_key(&once), once.clone());
            prop_assert!(once.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.'));
        }
    }
}
