//! Typo-tolerant token matching.
//!
//! Edit distance is optimal string alignment (Levenshtein plus adjacent
//! transpositions). The allowed distance grows with token length:
//!
//! | Token length | Max edits |
//! |--------------|-----------|
//! | 1–2          | 0         |
//! | 3–5          | 1         |
//! | 6+           | 2         |

/// Splits `text` into lower-cased alphanumeric tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

pub fn max_edits(token: &str) -> usize {
    match token.chars().count() {
        0..=2 => 0,
        3..=5 => 1,
        _ => 2,
    }
}

/// Edit distance between `a` and `b` if it is at most `limit`.
pub fn distance_within(a: &str, b: &str, limit: usize) -> Option<usize> {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.len().abs_diff(b.len()) > limit {
        return None;
    }
    if a == b {
        return Some(0);
    }

    let cols = b.len() + 1;
    let mut prev2 = vec![0usize; cols];
    let mut prev: Vec<usize> = (0..cols).collect();
    let mut cur = vec![0usize; cols];

    for i in 1..=a.len() {
        cur[0] = i;
        let mut row_min = cur[0];
        for j in 1..cols {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            let mut d = (prev[j] + 1).min(cur[j - 1] + 1).min(prev[j - 1] + cost);
            if i > 1 && j > 1 && a[i - 1] == b[j - 2] && a[i - 2] == b[j - 1] {
                d = d.min(prev2[j - 2] + 1);
            }
            cur[j] = d;
            row_min = row_min.min(d);
        }
        if row_min > limit {
            return None;
        }
        std::mem::swap(&mut prev2, &mut prev);
        std::mem::swap(&mut prev, &mut cur);
    }

    let d = prev[cols - 1];
    (d <= limit).then_some(d)
}

/// Best similarity of `query_token` against any of `field_tokens`, in `(0, 1]`.
fn best_token_score(query_token: &str, field_tokens: &[String]) -> Option<f64> {
    let limit = max_edits(query_token);
    field_tokens
        .iter()
        .filter_map(|t| distance_within(query_token, t, limit))
        .min()
        .map(|d| 1.0 / (1.0 + d as f64))
}

/// Scores one field: the sum of per-token similarities, `None` if no query
/// token matched at all.
fn field_score(query_tokens: &[String], field: &str) -> Option<f64> {
    let field_tokens = tokenize(field);
    let mut matched = false;
    let mut total = 0.0;
    for q in query_tokens {
        if let Some(s) = best_token_score(q, &field_tokens) {
            matched = true;
            total += s;
        }
    }
    matched.then_some(total)
}

/// Best-field score across `fields`; `None` when nothing matched.
pub fn score(query_tokens: &[String], fields: &[&str]) -> Option<f64> {
    fields
        .iter()
        .filter_map(|f| field_score(query_tokens, f))
        .fold(None, |best: Option<f64>, s| Some(best.map_or(s, |b| b.max(s))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("Grandma's Apple-Pie, 2nd try!"),
            vec!["grandma", "s", "apple", "pie", "2nd", "try"]
        );
        assert!(tokenize("  ,, ").is_empty());
    }

    #[test]
    fn test_max_edits_by_length() {
        assert_eq!(max_edits("to"), 0);
        assert_eq!(max_edits("soup"), 1);
        assert_eq!(max_edits("lasagna"), 2);
    }

    #[test]
    fn test_distance() {
        assert_eq!(distance_within("pasta", "pasta", 1), Some(0));
        assert_eq!(distance_within("psata", "pasta", 1), Some(1));
        assert_eq!(distance_within("lasgna", "lasagna", 2), Some(1));
        assert_eq!(distance_within("spaghetti", "spagetty", 2), Some(2));
        assert_eq!(distance_within("curry", "cake", 1), None);
        assert_eq!(distance_within("a", "abcd", 2), None);
    }

    #[test]
    fn test_short_tokens_need_exact_match() {
        let q = tokenize("ox");
        assert!(score(&q, &["oxtail stew with ox"]).is_some());
        assert!(score(&q, &["ax"]).is_none());
    }

    #[test]
    fn test_typo_tolerated() {
        let q = tokenize("chiken curyy");
        let s = score(&q, &["Chicken Curry", "A spicy dish"]).unwrap();
        assert!(s > 0.0);
    }

    #[test]
    fn test_closer_match_scores_higher() {
        let q = tokenize("lasagna");
        let exact = score(&q, &["Lasagna"]).unwrap();
        let typo = score(&q, &["Lasagne"]).unwrap();
        assert!(exact > typo);
    }

    #[test]
    fn test_no_match() {
        let q = tokenize("sushi");
        assert!(score(&q, &["Beef stew", "slow cooked"]).is_none());
    }
}
