//! Dotted identifier paths.

use smallvec::SmallVec;

/// A dotted identifier split into its segments.
///
/// Segments borrow from the source string; most identifiers are shallow so
/// the segment list lives inline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentPath<'a> {
    source: &'a str,
    segments: SmallVec<[&'a str; 8]>,
}

impl<'a> IdentPath<'a> {
    pub fn parse(source: &'a str) -> Self {
        Self {
            source,
            segments: source.split('.').collect(),
        }
    }

    pub fn as_str(&self) -> &'a str {
        self.source
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    pub fn segments(&self) -> &[&'a str] {
        &self.segments
    }

    pub fn last(&self) -> &'a str {
        self.segments.last().copied().unwrap_or("")
    }

    /// The identifier made of the first `depth` segments.
    pub fn prefix(&self, depth: usize) -> &'a str {
        if depth >= self.segments.len() {
            return self.source;
        }
        let len = self.segments[..depth]
            .iter()
            .map(|s| s.len())
            .sum::<usize>()
            + depth.saturating_sub(1);
        &self.source[..len]
    }

    /// Every strict prefix, shallowest first.
    pub fn strict_prefixes(&self) -> impl Iterator<Item = &'a str> + '_ {
        (1..self.segments.len()).map(move |depth| self.prefix(depth))
    }
}

/// The part of `descendant` below `ancestor`, if `ancestor` is a strict
/// prefix of it on a segment boundary.
pub fn relative<'a>(ancestor: &str, descendant: &'a str) -> Option<&'a str> {
    descendant
        .strip_prefix(ancestor)
        .and_then(|rest| rest.strip_prefix('.'))
        .filter(|rest| !rest.is_empty())
}

/// Join two identifier fragments, skipping empty sides.
pub fn join(base: &str, rest: &str) -> String {
    match (base.is_empty(), rest.is_empty()) {
        (true, _) => rest.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{base}.{rest}"),
    }
}
