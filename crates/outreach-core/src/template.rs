//! Message personalization
//!
//! Placeholders are `{name}` where `name` is an identifier
//! (`[A-Za-z_][A-Za-z0-9_]*`). Anything else in braces is left as written.

use regex::{Captures, Regex};
use std::sync::OnceLock;

use crate::Target;

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder regex is valid")
    })
}

/// Substitute every placeholder with the target's attribute, or nothing
///
/// Substitution is a single pass: inserted values are never re-expanded.
pub fn render(template: &str, target: &Target) -> String {
    let attributes = target.attributes();
    placeholder_pattern()
        .replace_all(template, |caps: &Captures<'_>| {
            attributes.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned()
}

/// Placeholder names used by a template, in order of appearance
pub fn placeholders(template: &str) -> Vec<String> {
    placeholder_pattern()
        .captures_iter(template)
        .map(|caps| caps[1].to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ada() -> Target {
        Target::new("https://example.com/in/ada")
            .with_name("Ada", "Lovelace")
            .with_industry("computing")
            .with_topic("analytical engines")
            .with_attribute("company", "Babbage & Co")
    }

    #[test]
    fn test_full_substitution() {
        let out = render(
            "Hi {first_name} {last_name}, {company} in {industry}: {topic}?",
            &ada(),
        );
        assert_eq!(
            out,
            "Hi Ada Lovelace, Babbage & Co in computing: analytical engines?"
        );
        assert!(placeholders(&out).is_empty());
    }

    #[test]
    fn test_camel_case_name_placeholders() {
        let target: Target = serde_json::from_str(
            r#"{"url": "https://site.test/in/ada", "firstName": "Ada", "lastName": "Lovelace"}"#,
        )
        .unwrap();
        assert_eq!(
            render("Hi {firstName} {lastName}!", &target),
            "Hi Ada Lovelace!"
        );
    }

    #[test]
    fn test_template_without_placeholders_is_unchanged() {
        let template = "Hello there, { not a placeholder } and {} stay put.";
        assert_eq!(render(template, &ada()), template);
    }

    #[test]
    fn test_missing_attribute_becomes_empty() {
        assert_eq!(render("Hi {nickname}!", &ada()), "Hi !");
    }

    #[test]
    fn test_single_pass_no_recursive_expansion() {
        let target = Target::new("https://example.com/in/x").with_attribute("trick", "{first_name}");
        assert_eq!(render("{trick}", &target), "{first_name}");
    }

    #[test]
    fn test_placeholders_listing() {
        assert_eq!(
            placeholders("{a} and {b_2} but not {3x}"),
            vec!["a".to_string(), "b_2".to_string()]
        );
    }
}
