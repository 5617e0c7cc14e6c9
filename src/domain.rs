//! Value types for the gateway's addressing scheme.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

static SITE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9_-]+$").unwrap());
static EXPERIMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]+$").unwrap());
static NODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]+(-?[a-z0-9]*-?[0-9]*)$").unwrap());

/// An opaque, non-empty decimal-digit experiment identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Experiment(String);

impl Experiment {
    pub fn parse(raw: &str) -> Option<Self> {
        if !raw.is_empty() && EXPERIMENT_RE.is_match(raw) {
            Some(Self(raw.to_owned()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Experiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lowercase alphanumeric/hyphen/underscore site identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Site(String);

impl Site {
    pub fn parse(raw: &str) -> Option<Self> {
        if !raw.is_empty() && SITE_RE.is_match(raw) {
            Some(Self(raw.to_owned()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Short node name, e.g. `node-1`, `m3-42`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Node(String);

impl Node {
    pub fn parse(raw: &str) -> Option<Self> {
        if !raw.is_empty() && NODE_RE.is_match(raw) {
            Some(Self(raw.to_owned()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether a session exchanges UTF-8 text or raw binary frames with its node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Text,
    Binary,
}

impl Mode {
    pub fn is_text(self) -> bool {
        matches!(self, Mode::Text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn experiment_requires_all_digits() {
        assert!(Experiment::parse("123").is_some());
        assert!(Experiment::parse("").is_none());
        assert!(Experiment::parse("12a").is_none());
    }

    #[test]
    fn site_allows_hyphen_underscore() {
        assert!(Site::parse("saclay-1").is_some());
        assert!(Site::parse("my_site").is_some());
        assert!(Site::parse("").is_none());
        assert!(Site::parse("Saclay").is_none());
    }

    #[test]
    fn node_matches_shape() {
        assert!(Node::parse("node-1").is_some());
        assert!(Node::parse("m3-42").is_some());
        assert!(Node::parse("a1b2c3").is_some());
        assert!(Node::parse("").is_none());
        assert!(Node::parse("Node-1").is_none());
    }
}
