//! Hierarchical field identifiers.
//!
//! Field names are flat strings such as `addresses.2.city`, where every `.N.` marks a row of a
//! repeating list. `FieldPath` parses these strings into named segments carrying an optional row
//! index, so that a list coordinator can renumber the rows at one nesting depth without touching
//! indices belonging to enclosing or nested lists.

use std::fmt;
use std::str::FromStr;

/// Errors produced while parsing field identifiers
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    #[error("Field identifier is empty")]
    Empty,

    #[error("Field identifier '{0}' contains an empty segment")]
    EmptySegment(String),
}

/// One named segment of a field path, optionally followed by a list row index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Segment {
    pub name: String,
    pub index: Option<u32>,
}

/// A parsed field identifier.
///
/// `a.1.b.3.c` parses to `[(a, 1), (b, 3), (c, -)]`. A numeric token only counts as a row index
/// when it sits between two non-numeric tokens, so the final segment never carries an index and
/// `to_string()` always reproduces the parsed input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<Segment>,
}

fn row_index(token: &str) -> Option<u32> {
    token
        .parse::<u32>()
        .ok()
        .filter(|index| *index > 0 && index.to_string() == token)
}

impl FieldPath {
    /// Parse a flat identifier string.
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        if raw.is_empty() {
            return Err(IdentifierError::Empty);
        }

        let tokens: Vec<&str> = raw.split('.').collect();
        if tokens.iter().any(|token| token.is_empty()) {
            return Err(IdentifierError::EmptySegment(raw.to_string()));
        }

        let last = tokens.len() - 1;
        let mut segments = Vec::new();
        let mut name: Vec<&str> = Vec::new();

        for (position, token) in tokens.iter().enumerate() {
            let index = if !name.is_empty() && position < last {
                row_index(token)
            } else {
                None
            };

            match index {
                Some(index) => {
                    segments.push(Segment {
                        name: name.join("."),
                        index: Some(index),
                    });
                    name.clear();
                }
                None => name.push(token),
            }
        }

        segments.push(Segment {
            name: name.join("."),
            index: None,
        });

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Number of list row indices embedded in this identifier.
    pub fn list_depth(&self) -> usize {
        self.segments.iter().filter(|s| s.index.is_some()).count()
    }

    /// Row index at a 1-based list depth.
    pub fn index_at_depth(&self, depth: usize) -> Option<u32> {
        if depth == 0 {
            return None;
        }
        self.segments
            .iter()
            .filter_map(|s| s.index)
            .nth(depth - 1)
    }

    /// Replace the row index at `depth` with `to`, but only if it currently equals `from`.
    ///
    /// Indices at every other depth are left alone, which is what keeps nested lists stable
    /// while an enclosing list is reordered.
    pub fn rewrite_index(&self, from: u32, to: u32, depth: usize) -> Self {
        let mut seen = 0;
        let segments = self
            .segments
            .iter()
            .map(|segment| {
                let mut segment = segment.clone();
                if let Some(index) = segment.index {
                    seen += 1;
                    if seen == depth && index == from {
                        segment.index = Some(to);
                    }
                }
                segment
            })
            .collect();
        Self { segments }
    }

    /// Build the identifier of a list row member: `self` + `.index.` + `suffix`.
    pub fn with_row(&self, index: u32, suffix: &str) -> Result<Self, IdentifierError> {
        let suffix = Self::parse(suffix)?;
        let mut segments = self.segments.clone();
        if let Some(last) = segments.last_mut() {
            last.index = Some(index);
        }
        segments.extend(suffix.segments);
        Ok(Self { segments })
    }

    /// If this identifier lives in a row of the list based at `base`, return that row's index.
    pub fn row_index_under(&self, base: &FieldPath) -> Option<u32> {
        let n = base.segments.len();
        if self.segments.len() <= n {
            return None;
        }
        let (prefix, tail) = base.segments.split_at(n - 1);
        if self.segments[..n - 1] != *prefix {
            return None;
        }
        let candidate = &self.segments[n - 1];
        if candidate.name == tail[0].name {
            candidate.index
        } else {
            None
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (position, segment) in self.segments.iter().enumerate() {
            if position > 0 {
                f.write_str(".")?;
            }
            f.write_str(&segment.name)?;
            if let Some(index) = segment.index {
                write!(f, ".{}", index)?;
            }
        }
        Ok(())
    }
}

impl FromStr for FieldPath {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Rewrite the row index of a flat identifier string.
///
/// Strings that do not parse as field paths are returned untouched.
pub fn rewrite_flat(raw: &str, from: u32, to: u32, depth: usize) -> String {
    match FieldPath::parse(raw) {
        Ok(path) => path.rewrite_index(from, to, depth).to_string(),
        Err(_) => raw.to_string(),
    }
}

/// Compose `base.index.suffix` from flat strings.
pub fn compound(base: &str, index: u32, suffix: &str) -> Result<String, IdentifierError> {
    Ok(FieldPath::parse(base)?.with_row(index, suffix)?.to_string())
}
