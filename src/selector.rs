use select::document::Document;
use select::node::Node;
use select::predicate::Predicate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A selector tree that can live in a job file and be matched without a CSS parser.
///
/// Useful for pinning a metric element by stable attributes when a page's
/// class names are generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "args", rename_all = "snake_case")]
pub enum StructuredSelector {
    Tag(String),
    Class(String),
    Id(String),
    /// Attribute presence, or an exact value when `value` is set.
    Attribute { key: String, value: Option<String> },
    All(Vec<StructuredSelector>),
    Any(Vec<StructuredSelector>),
    Descendant {
        ancestor: Box<StructuredSelector>,
        descendant: Box<StructuredSelector>,
    },
    Child {
        parent: Box<StructuredSelector>,
        child: Box<StructuredSelector>,
    },
}

impl StructuredSelector {
    pub fn attribute(key: impl Into<String>, value: impl Into<String>) -> Self {
        StructuredSelector::Attribute {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    /// Text of the first node in document order that matches.
    pub fn first_text(&self, html: &str) -> Option<String> {
        let document = Document::from(html);
        document.find(self).next().map(|node| node.text())
    }
}

impl fmt::Display for StructuredSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructuredSelector::Tag(tag) => write!(f, "{}", tag),
            StructuredSelector::Class(class) => write!(f, ".{}", class),
            StructuredSelector::Id(id) => write!(f, "#{}", id),
            StructuredSelector::Attribute { key, value: Some(v) } => write!(f, "[{}='{}']", key, v),
            StructuredSelector::Attribute { key, value: None } => write!(f, "[{}]", key),
            StructuredSelector::All(parts) => {
                for part in parts {
                    write!(f, "{}", part)?;
                }
                Ok(())
            }
            StructuredSelector::Any(parts) => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", part)?;
                }
                Ok(())
            }
            StructuredSelector::Descendant {
                ancestor,
                descendant,
            } => write!(f, "{} {}", ancestor, descendant),
            StructuredSelector::Child { parent, child } => write!(f, "{} > {}", parent, child),
        }
    }
}

impl Predicate for StructuredSelector {
    fn matches(&self, node: &Node) -> bool {
        match self {
            StructuredSelector::Tag(tag) => node.name() == Some(tag.as_str()),
            StructuredSelector::Class(class) => node
                .attr("class")
                .is_some_and(|classes| classes.split_whitespace().any(|c| c == class)),
            StructuredSelector::Id(id) => node.attr("id") == Some(id.as_str()),
            StructuredSelector::Attribute { key, value } => match value {
                Some(v) => node.attr(key.as_str()) == Some(v.as_str()),
                None => node.attr(key.as_str()).is_some(),
            },
            StructuredSelector::All(parts) => parts.iter().all(|s| s.matches(node)),
            StructuredSelector::Any(parts) => parts.iter().any(|s| s.matches(node)),
            StructuredSelector::Descendant {
                ancestor,
                descendant,
            } => {
                if !descendant.matches(node) {
                    return false;
                }
                let mut current = node.parent();
                while let Some(parent) = current {
                    if ancestor.matches(&parent) {
                        return true;
                    }
                    current = parent.parent();
                }
                false
            }
            StructuredSelector::Child { parent, child } => {
                child.matches(node) && node.parent().is_some_and(|p| parent.matches(&p))
            }
        }
    }
}

impl Predicate for &StructuredSelector {
    fn matches(&self, node: &Node) -> bool {
        (*self).matches(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playcount() -> StructuredSelector {
        StructuredSelector::All(vec![
            StructuredSelector::Tag("span".into()),
            StructuredSelector::attribute("data-testid", "playcount"),
        ])
    }

    #[test]
    fn renders_css() {
        assert_eq!(playcount().to_string(), "span[data-testid='playcount']");

        let nested = StructuredSelector::Child {
            parent: Box::new(StructuredSelector::Id("main".into())),
            child: Box::new(StructuredSelector::Class("count".into())),
        };
        assert_eq!(nested.to_string(), "#main > .count");
    }

    #[test]
    fn finds_first_matching_text() {
        let html = r#"<html><body>
            <span data-testid="title">Song</span>
            <span data-testid="playcount">12,345</span>
            <span data-testid="playcount">99</span>
        </body></html>"#;
        assert_eq!(playcount().first_text(html).as_deref(), Some("12,345"));
    }

    #[test]
    fn descendant_requires_ancestor() {
        let selector = StructuredSelector::Descendant {
            ancestor: Box::new(StructuredSelector::Tag("section".into())),
            descendant: Box::new(StructuredSelector::Class("count".into())),
        };
        let outside = r#"<div><b class="count">1</b></div>"#;
        let inside = r#"<section><div><b class="count">2</b></div></section>"#;
        assert_eq!(selector.first_text(outside), None);
        assert_eq!(selector.first_text(inside).as_deref(), Some("2"));
    }

    #[test]
    fn deserializes_from_job_file_shape() {
        let json = r#"{"kind":"attribute","args":{"key":"data-testid","value":"playcount"}}"#;
        let selector: StructuredSelector = serde_json::from_str(json).unwrap();
        assert_eq!(selector, StructuredSelector::attribute("data-testid", "playcount"));
    }
}
