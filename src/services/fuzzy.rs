//! Fuzzy string matching utilities using Levenshtein distance
//!
//! Used to rerank recipe candidates by how closely their titles match the
//! user's wording. All lengths are counted in chars, so Arabic text scores
//! the same way Latin text does.

/// Minimum number of single-char insertions, deletions or substitutions
/// turning `source_chars` into `target_chars`
fn levenshtein_chars(source_chars: &[char], target_chars: &[char]) -> usize {
    let source_len = source_chars.len();
    let target_len = target_chars.len();

    if source_len == 0 {
        return target_len;
    }
    if target_len == 0 {
        return source_len;
    }

    // Two rows instead of the full matrix
    let mut previous_row: Vec<usize> = (0..=target_len).collect();
    let mut current_row: Vec<usize> = vec![0; target_len + 1];

    for (source_idx, source_char) in source_chars.iter().enumerate() {
        if let Some(first) = current_row.first_mut() {
            *first = source_idx + 1;
        }

        for (target_idx, target_char) in target_chars.iter().enumerate() {
            let cost = usize::from(source_char != target_char);

            let deletion = previous_row
                .get(target_idx + 1)
                .map_or(usize::MAX, |v| v + 1);
            let insertion = current_row
                .get(target_idx)
                .map_or(usize::MAX, |v| v + 1);
            let substitution = previous_row
                .get(target_idx)
                .map_or(usize::MAX, |v| v + cost);

            if let Some(cell) = current_row.get_mut(target_idx + 1) {
                *cell = deletion.min(insertion).min(substitution);
            }
        }

        std::mem::swap(&mut previous_row, &mut current_row);
    }

    previous_row
        .get(target_len)
        .copied()
        .unwrap_or(source_len.max(target_len))
}

/// Best similarity between `query` and any same-length window of `target`.
///
/// Mirrors a partial ratio: a short dish name scores high against a long
/// title that contains a near-spelling of it.
#[must_use]
pub fn partial_score(query: &str, target: &str) -> f64 {
    let query_chars: Vec<char> = query.trim().to_lowercase().chars().collect();
    let target_chars: Vec<char> = target.trim().to_lowercase().chars().collect();

    if query_chars.is_empty() || target_chars.is_empty() {
        return 0.0;
    }
    if query_chars.len() >= target_chars.len() {
        let distance = levenshtein_chars(&query_chars, &target_chars);
        return 1.0 - (distance as f64 / query_chars.len() as f64);
    }

    target_chars
        .windows(query_chars.len())
        .map(|window| {
            let distance = levenshtein_chars(&query_chars, window);
            1.0 - (distance as f64 / query_chars.len() as f64)
        })
        .fold(0.0, f64::max)
}
