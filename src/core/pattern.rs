use std::fmt::Display;

use anyhow::Result;
use regex::Regex;
use thiserror::Error;

use crate::core::uri::WildcardUri;

/// Error for an unknown match style name.
#[derive(Debug, Error)]
#[error("invalid match style \"{0}\"")]
pub struct InvalidMatchStyle(String);

/// How a URI pattern should be matched against candidate URIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStyle {
    /// The candidate must equal the pattern URI exactly.
    Exact,
    /// The candidate must start with the pattern URI.
    Prefix,
    /// Empty components in the pattern URI match any sequence of characters.
    Wildcard,
}

impl Display for MatchStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::Prefix => write!(f, "prefix"),
            Self::Wildcard => write!(f, "wildcard"),
        }
    }
}

impl TryFrom<&str> for MatchStyle {
    type Error = InvalidMatchStyle;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "exact" => Ok(Self::Exact),
            "prefix" => Ok(Self::Prefix),
            "wildcard" => Ok(Self::Wildcard),
            _ => Err(InvalidMatchStyle(value.to_owned())),
        }
    }
}

#[derive(Debug)]
enum Matcher {
    Exact(String),
    Prefix(String),
    Regex(Regex),
}

/// A single URI pattern, compiled once at registration time.
///
/// When no explicit [`MatchStyle`] is given, the style is inferred from the
/// pattern itself: a trailing `**` matches the stem plus any number of
/// further components, a trailing `*` is a plain prefix, and an embedded `*`
/// matches any sequence of characters in its place.
#[derive(Debug)]
pub struct UriPattern {
    uri: WildcardUri,
    matcher: Matcher,
}

impl UriPattern {
    /// Compiles a pattern from a URI and an optional explicit match style.
    pub fn new(uri: WildcardUri, style: Option<MatchStyle>) -> Result<Self> {
        let matcher = Self::compile(uri.as_ref(), style)?;
        Ok(Self { uri, matcher })
    }

    fn compile(raw: &str, style: Option<MatchStyle>) -> Result<Matcher> {
        match style {
            Some(MatchStyle::Exact) => Ok(Matcher::Exact(raw.to_owned())),
            Some(MatchStyle::Prefix) => Ok(Matcher::Prefix(raw.to_owned())),
            Some(MatchStyle::Wildcard) => {
                let regex = raw
                    .split('.')
                    .map(|component| {
                        if component.is_empty() {
                            ".*".to_owned()
                        } else {
                            regex::escape(component)
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(r"\.");
                Ok(Matcher::Regex(Regex::new(&format!("^{regex}$"))?))
            }
            None => {
                if let Some(stem) = raw.strip_suffix("**") {
                    // Open-ended: anchor the start only, so any suffix of
                    // further components matches.
                    let regex = stem
                        .split('*')
                        .map(regex::escape)
                        .collect::<Vec<_>>()
                        .join(".*");
                    Ok(Matcher::Regex(Regex::new(&format!("^{regex}"))?))
                } else if let Some(stem) = raw.strip_suffix('*') {
                    Ok(Matcher::Prefix(stem.to_owned()))
                } else if raw.contains('*') {
                    let regex = raw
                        .split('*')
                        .map(regex::escape)
                        .collect::<Vec<_>>()
                        .join(".*");
                    Ok(Matcher::Regex(Regex::new(&format!("^{regex}$"))?))
                } else {
                    Ok(Matcher::Exact(raw.to_owned()))
                }
            }
        }
    }

    /// The URI the pattern was compiled from.
    pub fn uri(&self) -> &WildcardUri {
        &self.uri
    }

    /// Checks whether the candidate URI matches the pattern.
    pub fn matches(&self, uri: &str) -> bool {
        match &self.matcher {
            Matcher::Exact(exact) => uri == exact,
            Matcher::Prefix(stem) => uri.starts_with(stem),
            Matcher::Regex(regex) => regex.is_match(uri),
        }
    }
}

#[cfg(test)]
mod pattern_test {
    use crate::core::{
        pattern::{
            MatchStyle,
            UriPattern,
        },
        uri::WildcardUri,
    };

    fn pattern(uri: &str, style: Option<MatchStyle>) -> UriPattern {
        UriPattern::new(WildcardUri::try_from(uri).unwrap(), style).unwrap()
    }

    #[test]
    fn matches_exact_uris() {
        let exact = pattern("a", None);
        assert!(exact.matches("a"));
        assert!(!exact.matches("b"));
        assert!(!exact.matches("a.b"));

        let longer = pattern("a.b", None);
        assert!(!longer.matches("a"));
    }

    #[test]
    fn matches_prefixes() {
        let prefix = pattern("a*", None);
        assert!(prefix.matches("a"));
        assert!(prefix.matches("a.b"));
        assert!(!prefix.matches("b"));
    }

    #[test]
    fn matches_open_ended_suffixes() {
        let open = pattern("a**", None);
        assert!(open.matches("a"));
        assert!(open.matches("a.b"));
        assert!(open.matches("a.b.c"));
        assert!(!open.matches("b"));
    }

    #[test]
    fn matches_embedded_wildcards() {
        let embedded = pattern("a.*.b", None);
        assert!(embedded.matches("a.c.b"));
        assert!(embedded.matches("a.c.d.b"));
        assert!(!embedded.matches("a.c.d"));
    }

    #[test]
    fn explicit_exact_disables_inference() {
        let exact = pattern("a.*.b", Some(MatchStyle::Exact));
        assert!(exact.matches("a.*.b"));
        assert!(!exact.matches("a.*.d"));
        assert!(!exact.matches("a.c.b"));
    }

    #[test]
    fn explicit_prefix() {
        let prefix = pattern("a.b", Some(MatchStyle::Prefix));
        assert!(prefix.matches("a.b"));
        assert!(prefix.matches("a.b.c"));
        assert!(!prefix.matches("a.c"));
    }

    #[test]
    fn explicit_wildcard_uses_empty_components() {
        let plain = pattern("a.b", Some(MatchStyle::Wildcard));
        assert!(plain.matches("a.b"));
        assert!(!plain.matches("a.d.b"));

        let wildcard = pattern("a..b", Some(MatchStyle::Wildcard));
        assert!(wildcard.matches("a.c.b"));
        assert!(wildcard.matches("a.c.d.b"));
        assert!(!wildcard.matches("a.c.d"));
    }

    #[test]
    fn parses_match_style_names() {
        assert_matches::assert_matches!(MatchStyle::try_from("exact"), Ok(MatchStyle::Exact));
        assert_matches::assert_matches!(MatchStyle::try_from("prefix"), Ok(MatchStyle::Prefix));
        assert_matches::assert_matches!(
            MatchStyle::try_from("wildcard"),
            Ok(MatchStyle::Wildcard)
        );
        assert_matches::assert_matches!(MatchStyle::try_from("fuzzy"), Err(_));
    }
}
