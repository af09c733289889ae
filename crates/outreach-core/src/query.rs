//! Query descriptors evaluated against the rendered surface

use serde::{Deserialize, Serialize};

/// One candidate query for locating an element
///
/// The representation is data only; how a query is evaluated is up to the
/// surface implementation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Query {
    /// CSS selector
    Css(String),
    /// XPath expression
    #[serde(rename = "xpath")]
    XPath(String),
    /// Element with the given tag whose normalized text contains `text`
    Text { tag: String, text: String },
}

impl Query {
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    pub fn xpath(expr: impl Into<String>) -> Self {
        Self::XPath(expr.into())
    }

    pub fn text(tag: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Text {
            tag: tag.into(),
            text: text.into(),
        }
    }

    /// Equivalent XPath expression for text queries
    pub fn text_xpath(tag: &str, text: &str) -> String {
        format!(
            "//{}[contains(normalize-space(.), {})]",
            tag,
            xpath_literal(text)
        )
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Css(s) => write!(f, "css={}", s),
            Self::XPath(x) => write!(f, "xpath={}", x),
            Self::Text { tag, text } => write!(f, "text={}:{}", tag, text),
        }
    }
}

/// Quote a string for use inside an XPath expression
fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        return format!("'{}'", value);
    }
    if !value.contains('"') {
        return format!("\"{}\"", value);
    }

    let parts: Vec<String> = value.split('\'').map(|p| format!("'{}'", p)).collect();
    format!("concat({})", parts.join(", \"'\", "))
}
