//! Environment variable interpolation for manifests
//!
//! Supported forms:
//! - `${VAR}`: value of `VAR`
//! - `${VAR:-default}`: value of `VAR`, or `default` when unset or empty
//! - `$${VAR}`: escape, emitted literally as `${VAR}`

use regex::{Captures, Regex};
use std::sync::OnceLock;

use crate::error::{CoreError, Result};

fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$(\$?)\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("interpolation pattern is valid")
    })
}

/// Interpolate using the process environment
pub fn interpolate_env(input: &str, strict: bool) -> Result<String> {
    interpolate_with(input, strict, |name| std::env::var(name).ok())
}

/// Interpolate using a custom lookup
///
/// In strict mode an undefined variable without default is an error; otherwise
/// it expands to the empty string.
pub fn interpolate_with<F>(input: &str, strict: bool, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut output = String::with_capacity(input.len());
    let mut last = 0;

    for caps in pattern().captures_iter(input) {
        let whole = caps.get(0).expect("group 0 always matches");
        output.push_str(&input[last..whole.start()]);
        last = whole.end();

        if !caps[1].is_empty() {
            // Escaped: drop one `$`
            output.push_str(&whole.as_str()[1..]);
            continue;
        }

        output.push_str(&expand(&caps, strict, &lookup)?);
    }

    output.push_str(&input[last..]);
    Ok(output)
}

fn expand<F>(caps: &Captures<'_>, strict: bool, lookup: &F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let name = &caps[2];
    let default = caps.get(3).map(|m| m.as_str());

    match (lookup(name), default) {
        (Some(value), Some(default)) if value.is_empty() => Ok(default.to_string()),
        (Some(value), _) => Ok(value),
        (None, Some(default)) => Ok(default.to_string()),
        (None, None) if strict => Err(CoreError::UndefinedVariable {
            name: name.to_string(),
        }),
        (None, None) => {
            tracing::warn!(variable = name, "environment variable not set, using empty string");
            Ok(String::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_simple_substitution() {
        let out = interpolate_with("cluster: ${CLUSTER}", true, env(&[("CLUSTER", "prod")])).unwrap();
        assert_eq!(out, "cluster: prod");
    }

    #[test]
    fn test_default_value() {
        let out = interpolate_with("a: ${MISSING:-fallback}", true, env(&[])).unwrap();
        assert_eq!(out, "a: fallback");

        let out = interpolate_with("a: ${EMPTY:-fallback}", true, env(&[("EMPTY", "")])).unwrap();
        assert_eq!(out, "a: fallback");

        let out = interpolate_with("a: ${SET:-fallback}", true, env(&[("SET", "x")])).unwrap();
        assert_eq!(out, "a: x");
    }

    #[test]
    fn test_escape_passes_through() {
        let out = interpolate_with("a: $${HOME} b: $${X:-y}", true, env(&[])).unwrap();
        assert_eq!(out, "a: ${HOME} b: ${X:-y}");
    }

    #[test]
    fn test_strict_undefined_is_error() {
        let err = interpolate_with("a: ${NOPE}", true, env(&[])).unwrap_err();
        assert!(matches!(err, CoreError::UndefinedVariable { ref name } if name == "NOPE"));
    }

    #[test]
    fn test_lenient_undefined_is_empty() {
        let out = interpolate_with("a: '${NOPE}'", false, env(&[])).unwrap();
        assert_eq!(out, "a: ''");
    }

    #[test]
    fn test_untouched_text() {
        let input = "price: $5 and {braces} and $NAME";
        assert_eq!(interpolate_with(input, true, env(&[])).unwrap(), input);
    }
}
