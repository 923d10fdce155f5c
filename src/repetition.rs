//! Fuzzy repetition detection over a sliding window of recent outputs.
//!
//! Exact matching would miss near-duplicate stalling (the same diagnostic
//! with a changing timestamp), so the detector uses a normalized
//! edit-distance ratio. The window is bounded, keeping each check O(W)
//! in comparisons; the caller owns the window update.

/// Computes the normalized similarity ratio between two strings.
///
/// `1.0 - levenshtein(a, b) / max(len)`, computed over characters.
/// Symmetric in its arguments; two empty strings are identical (1.0).
#[must_use]
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    let max_len = a_chars.len().max(b_chars.len());
    if max_len == 0 {
        return 1.0;
    }

    let distance = levenshtein(&a_chars, &b_chars);
    1.0 - (distance as f64 / max_len as f64)
}

/// Character-level Levenshtein distance (single-row dynamic program).
fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, &ca) in a.iter().enumerate() {
        let mut prev_diag = row[0];
        row[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            let next = (prev_diag + cost).min(row[j] + 1).min(row[j + 1] + 1);
            prev_diag = row[j + 1];
            row[j + 1] = next;
        }
    }
    row[b.len()]
}

/// Returns true if `current` is a near-duplicate of any window element.
///
/// Pure function: the caller updates the window afterward via
/// [`push_window`]. An empty `current` never counts as looping.
#[must_use]
pub fn is_looping(current: &str, window: &[String], threshold: f64) -> bool {
    if current.is_empty() {
        return false;
    }
    window
        .iter()
        .any(|prior| similarity_ratio(current, prior) >= threshold)
}

/// Appends `current` to the window and trims it to at most `capacity`
/// elements, dropping the oldest first.
pub fn push_window(window: &mut Vec<String>, current: String, capacity: usize) {
    window.push(current);
    if window.len() > capacity {
        let excess = window.len() - capacity;
        window.drain(..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_strings_ratio_one() {
        assert!((similarity_ratio("abc", "abc") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_disjoint_strings_ratio_zero() {
        assert!(similarity_ratio("aaaa", "bbbb") < f64::EPSILON);
    }

    #[test]
    fn test_ratio_is_symmetric() {
        let pairs = [
            ("running cargo test", "running cargo check"),
            ("", "nonempty"),
            ("short", "a much longer string entirely"),
        ];
        for (a, b) in pairs {
            assert!((similarity_ratio(a, b) - similarity_ratio(b, a)).abs() < 1e-12);
        }
    }

    #[test]
    fn test_both_empty_are_identical() {
        assert!((similarity_ratio("", "") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_near_duplicate_with_timestamp_change() {
        let a = "error[E0308]: mismatched types at 12:01:05";
        let b = "error[E0308]: mismatched types at 12:03:41";
        assert!(similarity_ratio(a, b) > 0.85);
    }

    #[test]
    fn test_is_looping_threshold_boundary() {
        let window = vec!["abcd".to_string()];
        // "abcx" vs "abcd": distance 1 over len 4 -> ratio 0.75.
        assert!(is_looping("abcx", &window, 0.75));
        assert!(!is_looping("abcx", &window, 0.76));
    }

    #[test]
    fn test_empty_current_never_loops() {
        let window = vec![String::new(), "anything".to_string()];
        assert!(!is_looping("", &window, 0.0));
    }

    #[test]
    fn test_empty_window_never_loops() {
        assert!(!is_looping("output", &[], 0.5));
    }

    #[test]
    fn test_identical_output_in_window_detected() {
        let window = vec![
            "iteration summary: no changes".to_string(),
            "something else".to_string(),
        ];
        assert!(is_looping("iteration summary: no changes", &window, 1.0));
    }

    #[test]
    fn test_push_window_trims_oldest() {
        let mut window = Vec::new();
        for i in 0..7 {
            push_window(&mut window, format!("output {i}"), 5);
        }
        assert_eq!(window.len(), 5);
        assert_eq!(window[0], "output 2");
        assert_eq!(window[4], "output 6");
    }

    #[test]
    fn test_unicode_boundaries() {
        // Character-level, not byte-level: multibyte chars count once.
        assert!((similarity_ratio("héllo", "héllo") - 1.0).abs() < f64::EPSILON);
        let ratio = similarity_ratio("héllo", "hállo");
        assert!((ratio - 0.8).abs() < 1e-12);
    }
}
