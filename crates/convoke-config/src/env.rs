//! Environment variable substitution.
//!
//! Any string leaf in the parsed document may contain `${NAME}` references,
//! replaced with the value of env var `NAME` at load time.  Only uppercase
//! names are treated as env references; lowercase dotted placeholders such
//! as `${input.path}` belong to the step template language and pass through
//! untouched.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::error::{ConfigError, Result};

fn env_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([A-Z][A-Z0-9_]*)\}").expect("static pattern"))
}

/// Substitute `${NAME}` references in every string leaf of `value`.
///
/// Fails with [`ConfigError::EnvVarMissing`] on the first unresolvable name.
pub fn substitute(value: &mut Value) -> Result<()> {
    match value {
        Value::String(s) => {
            if let Some(replaced) = substitute_str(s)? {
                *s = replaced;
            }
            Ok(())
        }
        Value::Array(items) => {
            for item in items {
                substitute(item)?;
            }
            Ok(())
        }
        Value::Object(map) => {
            for (_, v) in map.iter_mut() {
                substitute(v)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Substitute one string.  Returns `None` when the string contains no env
/// references.
fn substitute_str(s: &str) -> Result<Option<String>> {
    let pattern = env_pattern();
    if !pattern.is_match(s) {
        return Ok(None);
    }

    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for caps in pattern.captures_iter(s) {
        let whole = caps.get(0).expect("match");
        let name = &caps[1];
        let value = std::env::var(name).map_err(|_| ConfigError::EnvVarMissing {
            name: name.to_string(),
        })?;
        out.push_str(&s[last..whole.start()]);
        out.push_str(&value);
        last = whole.end();
    }
    out.push_str(&s[last..]);
    Ok(Some(out))
}
