//! Tiered, deterministic search over summary records.
//!
//! Rank order for a query `s`: exact `Type` match, then
//! case-insensitive exact `Name`, then substring on `Name`, then fuzzy
//! tokens tolerant of one edit. Ties break on `ID`, which makes the
//! ordering reproducible for identical inputs.

/// Which tier a summary matched at. Lower is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SearchTier {
    /// Query equals the `Type` constant (`TECH_AGRICULTURE`).
    ExactType,
    /// Query equals the display name, ignoring case.
    ExactName,
    /// Query is a substring of the display name.
    Substring,
    /// Every query token matches a name token within one edit.
    Fuzzy,
}

/// Score one summary against the query.
fn tier_of(summary: &serde_json::Value, query: &str) -> Option<SearchTier> {
    let type_name = summary.get("Type").and_then(|v| v.as_str()).unwrap_or("");
    let name = summary.get("Name").and_then(|v| v.as_str()).unwrap_or("");

    if !type_name.is_empty() && query == type_name {
        return Some(SearchTier::ExactType);
    }
    if !name.is_empty() && query.eq_ignore_ascii_case(name) {
        return Some(SearchTier::ExactName);
    }
    let query_lower = query.to_ascii_lowercase();
    let name_lower = name.to_ascii_lowercase();
    if !name_lower.is_empty() && name_lower.contains(&query_lower) {
        return Some(SearchTier::Substring);
    }
    let name_tokens: Vec<&str> = name_lower.split_whitespace().collect();
    if !name_tokens.is_empty()
        && query_lower.split_whitespace().all(|qt| {
            name_tokens
                .iter()
                .any(|nt| within_one_edit(qt, nt))
        })
    {
        return Some(SearchTier::Fuzzy);
    }
    None
}

/// Rank summaries against the query and take the best `max` results.
/// The output ordering is a pure function of the inputs.
pub fn rank(summaries: &[serde_json::Value], query: &str, max: usize) -> Vec<serde_json::Value> {
    let mut matched: Vec<(SearchTier, i64, &serde_json::Value)> = summaries
        .iter()
        .filter_map(|s| {
            let tier = tier_of(s, query)?;
            let id = s.get("ID").and_then(|v| v.as_i64()).unwrap_or(i64::MAX);
            Some((tier, id, s))
        })
        .collect();
    matched.sort_by_key(|(tier, id, _)| (*tier, *id));
    matched.into_iter().take(max).map(|(_, _, s)| s.clone()).collect()
}

/// Whether two tokens differ by at most one insertion, deletion, or
/// substitution.
fn within_one_edit(a: &str, b: &str) -> bool {
    let (a, b): (Vec<char>, Vec<char>) = (a.chars().collect(), b.chars().collect());
    let (short, long) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
    match long.len() - short.len() {
        0 => short.iter().zip(long.iter()).filter(|(x, y)| x != y).count() <= 1,
        1 => {
            // One insertion: skip the first mismatch in the longer token.
            let mut i = 0;
            let mut skipped = false;
            for j in 0..long.len() {
                if i < short.len() && short[i] == long[j] {
                    i += 1;
                } else if skipped {
                    return false;
                } else {
                    skipped = true;
                }
            }
            true
        }
        _ => false,
    }
}
