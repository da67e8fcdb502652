//! NodeID grammar: `prefix ":" kind (":" part)*`.
//!
//! One parser/formatter pair shared by every [`super::Source`] so producers
//! and consumers agree on round-trip formatting.

pub const KNOWN_PREFIXES: &[&str] = &["library", "playlists", "file", "downloads"];

/// A parsed node id: its source prefix, kind, and the remaining `:`-joined
/// parts (e.g. `library:artist:Beatles` → `("library", ["artist",
/// "Beatles"])`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeId {
    pub prefix: String,
    pub parts: Vec<String>,
}

impl NodeId {
    pub fn kind(&self) -> Option<&str> {
        self.parts.first().map(|s| s.as_str())
    }
}

/// `ParseID`: splits on `:`, validates the prefix against
/// [`KNOWN_PREFIXES`], and returns the remaining parts.
pub fn parse(id: &str) -> Option<NodeId> {
    let mut segments = id.split(':');
    let prefix = segments.next()?.to_string();
    if !KNOWN_PREFIXES.contains(&prefix.as_str()) {
        return None;
    }
    let parts: Vec<String> = segments.map(|s| s.to_string()).collect();
    if parts.is_empty() {
        return None;
    }
    Some(NodeId { prefix, parts })
}

/// `FormatID`: the matching formatter, guaranteeing
/// `parse(format(prefix, parts)) == Some((prefix, parts))`.
pub fn format(prefix: &str, parts: &[&str]) -> String {
    let mut out = String::from(prefix);
    for part in parts {
        out.push(':');
        out.push_str(part);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Property: `ParseID(FormatID(prefix, parts…)) = (parts, true)`.
    #[test]
    fn parse_format_round_trips_for_every_known_prefix() {
        for prefix in KNOWN_PREFIXES {
            let formatted = format(prefix, &["artist", "Beatles"]);
            let parsed = parse(&formatted).unwrap();
            assert_eq!(parsed.prefix, *prefix);
            assert_eq!(parsed.parts, vec!["artist", "Beatles"]);
        }
    }

    #[test]
    fn unknown_prefix_is_rejected() {
        assert!(parse("bogus:artist:Beatles").is_none());
    }

    #[test]
    fn single_segment_with_no_parts_is_invalid() {
        assert!(parse("library").is_none());
    }

    #[test]
    fn parts_containing_literal_colons_still_round_trip_by_segment() {
        let formatted = format("playlists", &["track", "42", "3"]);
        assert_eq!(formatted, "playlists:track:42:3");
        let parsed = parse(&formatted).unwrap();
        assert_eq!(parsed.parts, vec!["track", "42", "3"]);
    }
}
