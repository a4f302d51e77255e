use std::sync::LazyLock;

use regex::{Captures, Regex};
use thiserror::Error;

/// `{{ env.VAR }}` or `{{ env.VAR | default("fallback") }}`
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{\{\s*([A-Za-z0-9_.]+)\s*(?:\|\s*default\("([^"]*)"\))?\s*\}\}"#).expect("must be valid regex")
});

/// Failure expanding a placeholder
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpandError {
    #[error("environment variable not found: `{0}`")]
    MissingVar(String),
    #[error("only variables scoped with 'env.' are supported: `{0}`")]
    UnsupportedScope(String),
}

/// Expand environment placeholders in raw config text
///
/// Comment lines are copied untouched so commented-out secrets never need to
/// be set.
pub(crate) fn expand_env(input: &str) -> Result<String, ExpandError> {
    let lines = input
        .split('\n')
        .map(|line| {
            if line.trim_start().starts_with('#') {
                Ok(line.to_owned())
            } else {
                expand_line(line)
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(lines.join("\n"))
}

fn expand_line(line: &str) -> Result<String, ExpandError> {
    let mut expanded = String::with_capacity(line.len());
    let mut cursor = 0;

    for captures in PLACEHOLDER.captures_iter(line) {
        let Some(whole) = captures.get(0) else { continue };
        expanded.push_str(&line[cursor..whole.start()]);
        expanded.push_str(&resolve(&captures)?);
        cursor = whole.end();
    }

    expanded.push_str(&line[cursor..]);
    Ok(expanded)
}

fn resolve(captures: &Captures<'_>) -> Result<String, ExpandError> {
    let key = captures.get(1).map_or("", |m| m.as_str());
    let fallback = captures.get(2).map(|m| m.as_str());

    let var = match key.split_once('.') {
        Some(("env", var)) if !var.is_empty() && !var.contains('.') => var,
        _ => return Err(ExpandError::UnsupportedScope(key.to_owned())),
    };

    match (std::env::var(var), fallback) {
        (Ok(value), _) => Ok(value),
        (Err(_), Some(fallback)) => Ok(fallback.to_owned()),
        (Err(_), None) => Err(ExpandError::MissingVar(var.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_without_placeholders_is_unchanged() {
        let input = "[providers.openai]\napi_key = \"sk\"\n";
        assert_eq!(expand_env(input).unwrap(), input);
    }

    #[test]
    fn variables_are_substituted() {
        temp_env::with_vars([("RELAY_A", Some("one")), ("RELAY_B", Some("two"))], || {
            let result = expand_env("a = \"{{ env.RELAY_A }}\"\nb = \"{{env.RELAY_B}}-x\"").unwrap();
            assert_eq!(result, "a = \"one\"\nb = \"two-x\"");
        });
    }

    #[test]
    fn missing_variable_is_an_error() {
        temp_env::with_var_unset("RELAY_MISSING", || {
            let err = expand_env("key = \"{{ env.RELAY_MISSING }}\"").unwrap_err();
            assert_eq!(err, ExpandError::MissingVar("RELAY_MISSING".to_owned()));
        });
    }

    #[test]
    fn default_applies_only_when_unset() {
        let input = "key = \"{{ env.RELAY_OPTIONAL | default(\"fallback\") }}\"";

        temp_env::with_var_unset("RELAY_OPTIONAL", || {
            assert_eq!(expand_env(input).unwrap(), "key = \"fallback\"");
        });
        temp_env::with_var("RELAY_OPTIONAL", Some("actual"), || {
            assert_eq!(expand_env(input).unwrap(), "key = \"actual\"");
        });
    }

    #[test]
    fn only_env_scope_is_supported() {
        let err = expand_env("key = \"{{ vault.TOKEN }}\"").unwrap_err();
        assert_eq!(err, ExpandError::UnsupportedScope("vault.TOKEN".to_owned()));
    }

    #[test]
    fn comments_are_not_expanded() {
        temp_env::with_vars([("RELAY_SET", Some("v")), ("RELAY_UNSET", None::<&str>)], || {
            let input = "  # old = \"{{ env.RELAY_UNSET }}\"\nkey = \"{{ env.RELAY_SET }}\"";
            assert_eq!(
                expand_env(input).unwrap(),
                "  # old = \"{{ env.RELAY_UNSET }}\"\nkey = \"v\""
            );
        });
    }
}
