use std::collections::HashSet;

/// Canonical names for one language partition: lowercased, prefix stripped,
/// deduplicated, first-occurrence order preserved. Entries carrying another
/// language's prefix belong to a different importer instance and are dropped.
pub(crate) fn normalize_tags(raw: &[String], lang: &str) -> Vec<String> {
    let prefix = format!("{}:", lang.trim().to_lowercase());
    let mut seen = HashSet::new();
    let mut names = Vec::new();

    for entry in raw {
        let entry = entry.trim().to_lowercase();
        let Some(rest) = entry.strip_prefix(&prefix) else {
            continue;
        };
        let name = rest.trim();
        if name.is_empty() {
            continue;
        }
        if seen.insert(name.to_string()) {
            names.push(name.to_string());
        }
    }

    names
}
