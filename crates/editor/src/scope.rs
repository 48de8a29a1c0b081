// Scope index: the catalog of subtrees an AI run may target.
//
// Derived from the current document on every run and never persisted.
// Entries are ordered by family, then by key, so the same document always
// yields the same index.

use atelier_common::path::PathAddress;
use atelier_common::types::ScopeIndexEntry;
use serde_json::{Map, Value};

/// Upper bound on catalog size sent to the planner.
pub const MAX_SCOPE_ENTRIES: usize = 200;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeIndex {
    entries: Vec<ScopeIndexEntry>,
}

impl ScopeIndex {
    /// Enumerate color tokens, typography groups, button variants, and
    /// per-section layout blocks.
    pub fn build(doc: &Value) -> Self {
        let mut families: [Vec<ScopeIndexEntry>; 4] = Default::default();
        let [colors_out, typography_out, buttons_out, layouts_out] = &mut families;

        if let Some(colors) = group(doc, "colors") {
            for key in sorted_keys(colors) {
                push(colors_out, "color", key, &["colors", key]);
            }
        }
        if let Some(typography) = group(doc, "typography") {
            for key in sorted_keys(typography).filter(|k| typography[*k].is_object()) {
                push(typography_out, "typography", key, &["typography", key]);
            }
        }
        if let Some(buttons) = group(doc, "buttons") {
            for key in sorted_keys(buttons).filter(|k| buttons[*k].is_object()) {
                push(buttons_out, "button", key, &["buttons", key]);
            }
        }
        if let Some(sections) = group(doc, "sections") {
            for key in sorted_keys(sections) {
                if sections[key].get("layout").is_some_and(Value::is_object) {
                    push(layouts_out, "layout", key, &["sections", key, "layout"]);
                }
            }
        }

        let lens: [usize; 4] = std::array::from_fn(|i| families[i].len());
        let shares = fair_shares(&lens, MAX_SCOPE_ENTRIES);
        let entries = families
            .into_iter()
            .zip(shares)
            .flat_map(|(family, share)| family.into_iter().take(share))
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[ScopeIndexEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<ScopeIndexEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: &PathAddress) -> bool {
        self.entries.iter().any(|entry| &entry.path == path)
    }
}

fn group<'a>(doc: &'a Value, name: &str) -> Option<&'a Map<String, Value>> {
    doc.get(name).and_then(Value::as_object)
}

fn sorted_keys(map: &Map<String, Value>) -> impl Iterator<Item = &str> {
    let mut keys: Vec<&str> = map.keys().map(String::as_str).collect();
    keys.sort_unstable();
    keys.into_iter()
}

/// Split `budget` across families so a large one can't crowd out the rest:
/// smaller families keep everything, the remainder is divided evenly.
fn fair_shares<const N: usize>(lens: &[usize; N], budget: usize) -> [usize; N] {
    let mut order: Vec<usize> = (0..N).collect();
    order.sort_by_key(|&i| lens[i]);
    let mut shares = [0; N];
    let mut remaining = budget;
    for (taken, &i) in order.iter().enumerate() {
        let share = lens[i].min(remaining / (N - taken));
        shares[i] = share;
        remaining -= share;
    }
    shares
}

/// Keys containing `.` can't be addressed by a dotted path; they are skipped.
fn push(entries: &mut Vec<ScopeIndexEntry>, kind: &str, key: &str, segments: &[&str]) {
    if key.is_empty() || key.contains('.') {
        return;
    }
    if let Ok(path) = PathAddress::parse(&segments.join(".")) {
        entries.push(ScopeIndexEntry { id: format!("{kind}:{key}"), path });
    }
}
