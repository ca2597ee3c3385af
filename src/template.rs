//! Template personalization: `{{key}}` substitution over recipient
//! variables. Pure string work, no template engine.

use std::collections::HashMap;

/// Replace every `{{key}}` placeholder with the matching variable value.
///
/// Keys are matched case-insensitively and with underscores ignored, so
/// `{{firstName}}`, `{{firstname}}` and `{{first_name}}` all resolve the
/// same variable. A placeholder with no matching variable renders as the
/// empty string; raw `{{key}}` text never survives into output.
///
/// The scan is a single pass over the input and substituted values are
/// never re-scanned, so a variable containing `{{...}}` stays literal.
pub fn personalize(template: &str, variables: &HashMap<String, String>) -> String {
    let vars = normalized(variables);
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        match after_open.find("}}") {
            Some(close) => {
                let key = normalize_key(after_open[..close].trim());
                if let Some(value) = vars.get(&key) {
                    out.push_str(value);
                }
                rest = &after_open[close + 2..];
            }
            None => {
                // Unterminated placeholder: keep the tail verbatim.
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Lowercased, underscore-free variable map with the derived `firstname` /
/// `lastname` split out of `name` when not independently supplied.
fn normalized(variables: &HashMap<String, String>) -> HashMap<String, String> {
    let mut vars: HashMap<String, String> = variables
        .iter()
        .map(|(k, v)| (normalize_key(k), v.clone()))
        .collect();

    if let Some(name) = vars.get("name").cloned() {
        let mut parts = name.split_whitespace();
        let first = parts.next().unwrap_or_default().to_string();
        let last = parts.collect::<Vec<_>>().join(" ");
        vars.entry("firstname".to_string()).or_insert(first);
        vars.entry("lastname".to_string()).or_insert(last);
    }
    vars
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
