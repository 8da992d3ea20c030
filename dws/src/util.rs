//! Shared utility functions
//!
//! Identifier handling used by the registry, environments and dispatch.

/// Case-fold an identifier into a map key.
///
/// Every name-keyed table (classes, interfaces, methods, fields, variables)
/// is keyed by the normalized form; display names are kept separately.
pub fn normalize(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// Case-insensitive identifier comparison
pub fn same_name(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Calculate Levenshtein edit distance between two strings.
/// Uses O(min(m,n)) space with two-row optimization.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let m = a_chars.len();
    let n = b_chars.len();

    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr: Vec<usize> = vec![0; n + 1];

    for i in 1..=m {
        curr[0] = i;
        for j in 1..=n {
            let cost = if a_chars[i - 1].eq_ignore_ascii_case(&b_chars[j - 1]) {
                0
            } else {
                1
            };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}

/// Closest known name within edit distance 2, for "did you mean" hints
pub fn suggest_similar<'a>(name: &str, candidates: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    candidates
        .into_iter()
        .map(|c| (levenshtein_distance(name, c), c))
        .filter(|(d, _)| *d > 0 && *d <= 2)
        .min_by_key(|(d, _)| *d)
        .map(|(_, c)| c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_folds_case() {
        assert_eq!(normalize("TMyClass"), "tmyclass");
        assert_eq!(normalize("create"), normalize("CREATE"));
    }

    #[test]
    fn test_levenshtein_ignores_case() {
        assert_eq!(levenshtein_distance("PrintLn", "println"), 0);
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
    }

    #[test]
    fn test_suggest_similar() {
        let names = ["PrintLn", "IntToStr", "Length"];
        assert_eq!(suggest_similar("PrntLn", names), Some("PrintLn"));
        assert_eq!(suggest_similar("Zzzzzz", names), None);
    }
}
