//! External field naming.
//!
//! A field is addressed from the outside by its explicit override when it
//! declares one, otherwise by the snake_case form of its declared name.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

/// Override value that removes a field from schemas and binding.
pub const EXCLUDED: &str = "-";

static CAPITALISED_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(.)([A-Z][a-z]+)").unwrap_or_else(|err| panic!("invalid pattern: {err}"))
});

static UPPERCASE_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([a-z0-9])([A-Z])").unwrap_or_else(|err| panic!("invalid pattern: {err}"))
});

/// Converts a declared name to its conventional external form.
///
/// An underscore is inserted before a capitalised word that follows any
/// character and before an uppercase run that follows a lowercase letter or
/// digit; the result is lower-cased. Names that are already snake_case come
/// back unchanged.
///
/// ```rust,ignore
/// assert_eq!(snake_case("MetricBatchSize"), "metric_batch_size");
/// assert_eq!(snake_case("HTTPTimeout"), "http_timeout");
/// ```
pub fn snake_case(declared: &str) -> String {
    let spaced = CAPITALISED_WORD.replace_all(declared, "${1}_${2}");
    let spaced = UPPERCASE_RUN.replace_all(&spaced, "${1}_${2}");
    spaced.to_lowercase()
}

/// Resolves the external name of a field.
///
/// Returns `None` when the override is the exclusion sentinel.
pub fn external_name<'a>(declared: &'a str, rename: Option<&'a str>) -> Option<Cow<'a, str>> {
    match rename {
        Some(EXCLUDED) => None,
        Some(name) if !name.is_empty() => Some(Cow::Borrowed(name)),
        _ => {
            let declared = declared.strip_prefix("r#").unwrap_or(declared);
            let converted = snake_case(declared);
            if converted == declared {
                Some(Cow::Borrowed(declared))
            } else {
                Some(Cow::Owned(converted))
            }
        }
    }
}
