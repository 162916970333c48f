//! Environment substitution for YAML configs
//!
//! Handles `${VAR}` and `${VAR:-default}` references. A reference to an
//! unset variable without a default is a configuration error; every such
//! variable is reported at once. Lines that are YAML comments are left as-is.

use crate::error::{Error, Result};
use regex::{Captures, Regex};
use std::sync::LazyLock;

/// Regex for matching `${NAME}` and `${NAME:-default}`
static ENV_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").unwrap()
});

/// Substitute `${VAR}` references from the process environment
pub fn substitute_env(text: &str) -> Result<String> {
    substitute_with(text, |name| std::env::var(name).ok())
}

/// Substitute `${VAR}` references using `lookup`.
///
/// `${VAR:-default}` falls back to `default` when the variable is unset or
/// empty, the same as a POSIX shell.
pub fn substitute_with(text: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<String> {
    let mut missing: Vec<String> = Vec::new();
    let mut lines = Vec::new();

    for line in text.split_inclusive('\n') {
        if line.trim_start().starts_with('#') {
            lines.push(line.to_string());
            continue;
        }
        let rendered = ENV_REGEX.replace_all(line, |cap: &Captures<'_>| {
            let name = &cap[1];
            let value = lookup(name).filter(|v| !v.is_empty() || cap.get(2).is_none());
            match (value, cap.get(2)) {
                (Some(value), _) => value,
                (None, Some(default)) => default.as_str().to_string(),
                (None, None) => {
                    if !missing.iter().any(|m| m == name) {
                        missing.push(name.to_string());
                    }
                    String::new()
                }
            }
        });
        lines.push(rendered.into_owned());
    }

    if missing.is_empty() {
        Ok(lines.concat())
    } else {
        Err(Error::undefined_var(missing.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_simple_substitution() {
        let result = substitute_with("password: ${MB_PASSWORD}", env(&[("MB_PASSWORD", "s3cret")])).unwrap();
        assert_eq!(result, "password: s3cret");
    }

    #[test]
    fn test_multiple_substitutions() {
        let result = substitute_with(
            "url: https://${HOST}:${PORT}/api",
            env(&[("HOST", "airflow.local"), ("PORT", "8080")]),
        )
        .unwrap();
        assert_eq!(result, "url: https://airflow.local:8080/api");
    }

    #[test]
    fn test_default_value() {
        let lookup = env(&[("EMPTY", "")]);
        assert_eq!(substitute_with("a: ${UNSET:-fallback}", &lookup).unwrap(), "a: fallback");
        assert_eq!(substitute_with("a: ${EMPTY:-fallback}", &lookup).unwrap(), "a: fallback");
        assert_eq!(substitute_with("a: ${UNSET:-}", &lookup).unwrap(), "a: ");
    }

    #[test]
    fn test_empty_value_without_default_is_kept() {
        assert_eq!(substitute_with("a: '${EMPTY}'", env(&[("EMPTY", "")])).unwrap(), "a: ''");
    }

    #[test]
    fn test_undefined_variables_reported_together() {
        let err = substitute_with("a: ${ONE}\nb: ${TWO}\nc: ${ONE}\n", env(&[])).unwrap_err();
        assert!(err.is_config());
        assert_eq!(err.to_string(), "Undefined environment variable: ONE, TWO");
    }

    #[test]
    fn test_comment_lines_untouched() {
        let text = "# token: ${NOT_SET}\nname: ${NAME}\n";
        let result = substitute_with(text, env(&[("NAME", "x")])).unwrap();
        assert_eq!(result, "# token: ${NOT_SET}\nname: x\n");
    }

    #[test]
    fn test_no_references() {
        let text = "plain: value\n";
        assert_eq!(substitute_with(text, env(&[])).unwrap(), text);
        assert_eq!(substitute_with("$HOME {not} a ref", env(&[])).unwrap(), "$HOME {not} a ref");
    }
}
