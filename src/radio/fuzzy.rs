//! Fuzzy artist matching: case-folded, punctuation-stripped Levenshtein
//! similarity against the local library.

/// Strip everything from the first `(` onward (remaster/reissue suffixes
/// like "Artist (Remastered 2009)"), lowercase, and drop punctuation.
fn normalize(name: &str) -> String {
    let without_suffix = name.split('(').next().unwrap_or(name);
    without_suffix
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Best local-library artist matching `candidate`, if its normalized
/// Jaro-Winkler-ish similarity (via `strsim::normalized_levenshtein`) meets
/// `threshold`.
pub fn best_match<'a>(candidate: &str, library_artists: &'a [String], threshold: f64) -> Option<(&'a String, f64)> {
    let normalized_candidate = normalize(candidate);
    library_artists
        .iter()
        .map(|artist| {
            let score = strsim::normalized_levenshtein(&normalized_candidate, &normalize(artist));
            (artist, score)
        })
        .filter(|(_, score)| *score >= threshold)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_name_matches_with_score_one() {
        let library = vec!["The Beatles".to_string()];
        let (matched, score) = best_match("The Beatles", &library, 0.8).unwrap();
        assert_eq!(matched, "The Beatles");
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn remaster_suffix_is_ignored() {
        let library = vec!["Pink Floyd".to_string()];
        let (matched, _) = best_match("Pink Floyd (Remastered 2011)", &library, 0.8).unwrap();
        assert_eq!(matched, "Pink Floyd");
    }

    #[test]
    fn below_threshold_matches_are_dropped() {
        let library = vec!["Completely Different Band".to_string()];
        assert!(best_match("The Beatles", &library, 0.8).is_none());
    }

    #[test]
    fn case_and_punctuation_are_ignored() {
        let library = vec!["Guns N' Roses".to_string()];
        let (matched, score) = best_match("guns n roses", &library, 0.8).unwrap();
        assert_eq!(matched, "Guns N' Roses");
        assert!(score > 0.9);
    }
}
