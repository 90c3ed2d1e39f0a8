//! Name normalization and candidate filtering.
//!
//! Cache keys, fallback lookups, hint matching and origin exclusion all
//! compare names through [`normalize`].

use super::types::Country;

/// Trim surrounding whitespace and lower-case.
pub fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

/// `normalize` for optional input; `None` becomes the empty string.
pub fn normalize_opt(name: Option<&str>) -> String {
    name.map(normalize).unwrap_or_default()
}

/// Case-insensitive equality after normalization.
pub fn same_name(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

/// Narrow `candidates` to those whose label contains `query`
/// (case-insensitive). A blank query keeps everything.
pub fn filter_candidates<T: AsRef<str>>(candidates: &[T], query: &str) -> Vec<String> {
    let q = normalize(query);
    candidates
        .iter()
        .map(AsRef::as_ref)
        .filter(|c| q.is_empty() || c.to_lowercase().contains(&q))
        .map(str::to_string)
        .collect()
}

/// Drop blank names, trim the rest and keep the first of any names that
/// normalize equal. Order is preserved.
pub fn dedupe_names<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = std::collections::HashSet::new();
    names
        .into_iter()
        .filter_map(|n| {
            let trimmed = n.as_ref().trim();
            if trimmed.is_empty() || !seen.insert(normalize(trimmed)) {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}

/// Trim country names, drop blanks and case-insensitive duplicates (first
/// wins), then sort by name ignoring case.
pub fn tidy_countries(countries: Vec<Country>) -> Vec<Country> {
    let mut seen = std::collections::HashSet::new();
    let mut out: Vec<Country> = countries
        .into_iter()
        .filter_map(|mut c| {
            let trimmed = c.name.trim();
            if trimmed.is_empty() || !seen.insert(normalize(trimmed)) {
                return None;
            }
            c.name = trimmed.to_string();
            Some(c)
        })
        .collect();
    out.sort_by_cached_key(|c| normalize(&c.name));
    out
}

/// Remove the origin city (case-insensitive) from a city list.
pub fn exclude_origin(cities: Vec<String>, origin: Option<&str>) -> Vec<String> {
    let origin = normalize_opt(origin);
    if origin.is_empty() {
        return cities;
    }
    cities.into_iter().filter(|c| normalize(c) != origin).collect()
}

/// Find the candidate matching `name` case-insensitively.
pub fn find_name<'a, T: AsRef<str>>(candidates: &'a [T], name: &str) -> Option<&'a T> {
    let wanted = normalize(name);
    if wanted.is_empty() {
        return None;
    }
    candidates.iter().find(|c| normalize(c.as_ref()) == wanted)
}
