//! Placeholder grammar: `{{VAR:name}}` or
//! `{{VAR:name|join="sep"|default="fallback"}}` (spec §4.3 step 3).

use regex::Regex;
use std::sync::OnceLock;

/// One parsed placeholder occurrence, with its span in the source template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub full_match: String,
    pub name: String,
    pub join: String,
    pub default: Option<String>,
}

fn pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"\{\{VAR:(?P<name>[A-Za-z0-9_]+)(?:\|join="(?P<join>(?:[^"\\]|\\.)*)")?(?:\|default="(?P<default>(?:[^"\\]|\\.)*)")?\}\}"#,
        )
        .expect("placeholder regex is a compile-time constant")
    })
}

/// Resolves `\n`, `\t`, `\r`, `\\` escapes inside a quoted option value
/// (spec §4.3 step 3 "backslash-escapes").
fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('\\') => out.push('\\'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Default separator between concatenated chunk bodies: two newlines.
pub const DEFAULT_JOIN: &str = "\n\n";

/// Scans `template` for placeholders in textual order (spec §4.3 step 5).
pub fn scan(template: &str) -> Vec<Placeholder> {
    pattern()
        .captures_iter(template)
        .map(|caps| Placeholder {
            full_match: caps[0].to_string(),
            name: caps["name"].to_string(),
            join: caps
                .name("join")
                .map(|m| unescape(m.as_str()))
                .unwrap_or_else(|| DEFAULT_JOIN.to_string()),
            default: caps.name("default").map(|m| unescape(m.as_str())),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_placeholder() {
        let found = scan("hello {{VAR:name}} world");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "name");
        assert_eq!(found[0].join, DEFAULT_JOIN);
        assert_eq!(found[0].default, None);
    }

    #[test]
    fn parses_join_and_default_with_escapes() {
        let found = scan(r#"{{VAR:x|join="\n---\n"|default="n/a"}}"#);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].join, "\n---\n");
        assert_eq!(found[0].default.as_deref(), Some("n/a"));
    }

    #[test]
    fn scans_in_textual_order() {
        let found = scan("{{VAR:b}} then {{VAR:a}}");
        assert_eq!(found[0].name, "b");
        assert_eq!(found[1].name, "a");
    }
}
