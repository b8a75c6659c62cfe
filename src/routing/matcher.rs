//! Path matching logic.
//!
//! # Responsibilities
//! - Match literal endpoint paths (optional trailing slash)
//! - Match pattern endpoint paths and extract positional captures
//!
//! # Design Decisions
//! - Literal paths are stored without their trailing slash
//! - Patterns are anchored at the start and must consume the whole path
//! - Matching runs against the path component only; the query never
//!   participates

use regex::Regex;

/// Matcher for one endpoint.
#[derive(Debug, Clone)]
pub enum PathMatcher {
    /// Literal path, trailing slash stripped.
    Static(String),
    /// Anchored pattern; `source` keeps the registered text.
    Pattern { source: String, regex: Regex },
}

impl PathMatcher {
    pub fn literal(path: impl Into<String>) -> Self {
        let path = path.into();
        let trimmed = path.strip_suffix('/').unwrap_or(&path).to_string();
        PathMatcher::Static(trimmed)
    }

    /// Compile a pattern endpoint. The pattern's own capture groups become
    /// the handler's positional arguments.
    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!(r"^(?:{})(?:\?|$)", pattern))?;
        Ok(PathMatcher::Pattern {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn is_static(&self) -> bool {
        matches!(self, PathMatcher::Static(_))
    }

    /// Registered path or pattern text.
    pub fn as_str(&self) -> &str {
        match self {
            PathMatcher::Static(path) => path,
            PathMatcher::Pattern { source, .. } => source,
        }
    }

    /// Returns the captures if `path` matches. Static matches capture nothing;
    /// groups that did not participate capture an empty string.
    pub fn captures(&self, path: &str) -> Option<Vec<String>> {
        match self {
            PathMatcher::Static(literal) => {
                let rest = path.strip_prefix(literal.as_str())?;
                if rest.is_empty() || rest == "/" {
                    Some(Vec::new())
                } else {
                    None
                }
            }
            PathMatcher::Pattern { regex, .. } => {
                let caps = regex.captures(path)?;
                Some(
                    caps.iter()
                        .skip(1)
                        .map(|group| group.map(|m| m.as_str().to_string()).unwrap_or_default())
                        .collect(),
                )
            }
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        self.captures(path).is_some()
    }
}

impl std::fmt::Display for PathMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PartialEq for PathMatcher {
    fn eq(&self, other: &Self) -> bool {
        self.is_static() == other.is_static() && self.as_str() == other.as_str()
    }
}
