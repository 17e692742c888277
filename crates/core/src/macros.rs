//! `{{key}}` macro substitution.
//!
//! Templates (SQL dumps, config files, and the paths pointing at them) carry
//! `{{name}}` tokens that are replaced by the value of the option with the
//! same name.

use std::sync::LazyLock;

use regex::Regex;

use crate::options::Options;

/// Regex pattern matching `{{placeholder}}` tokens.
pub const PLACEHOLDER_PATTERN: &str = r"\{\{([^{}]+)\}\}";

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(PLACEHOLDER_PATTERN).expect("valid regex"));

/// Build the literal token for `key`, e.g. `db_name` → `{{db_name}}`.
pub fn token(key: &str) -> String {
    format!("{{{{{key}}}}}")
}

/// Replace every `{{key}}` in `text` with the matching option value.
///
/// Keys are applied one after another in the options' iteration order
/// (ascending key order). A value that itself contains a token may be
/// substituted again when its key comes later. Tokens with no matching
/// option are left untouched.
///
/// # Examples
///
/// ```
/// use deploy_tool_core::macros::replace;
/// use deploy_tool_core::options::Options;
///
/// let options = Options::from_iter([("db_host", "localhost")]);
/// assert_eq!(replace("host={{db_host}}", &options), "host=localhost");
/// assert_eq!(replace("{{other}}", &options), "{{other}}");
/// ```
pub fn replace(text: &str, options: &Options) -> String {
    let mut text = text.to_string();
    for (key, value) in options.iter() {
        let token = token(key);
        if text.contains(&token) {
            text = text.replace(&token, value);
        }
    }
    text
}

/// Distinct placeholder names in `text`, in order of first appearance.
pub fn placeholders(text: &str) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for cap in PLACEHOLDER_RE.captures_iter(text) {
        let name = cap[1].to_string();
        if !seen.contains(&name) {
            seen.push(name);
        }
    }
    seen
}
