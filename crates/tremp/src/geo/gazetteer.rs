//! In-memory settlement geocoder.
//!
//! Maps user-written place labels to coordinates without a network call.
//! The feature set ships as a packaged JSON asset and is loaded once at
//! startup; deployments can override it with a larger file on disk.
//!
//! Lookup never errors: an unmatched label is `None` and the caller decides
//! the fallback (in practice, name-exact matching plus a reply telling the
//! user the label was not located).

use crate::geo::Point;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

/// One settlement in the feature set. Immutable after load.
#[derive(Deserialize, Clone, Debug)]
pub struct GazetteerEntry {
    pub id: String,
    pub name_he: String,
    pub name_en: String,
    pub kind: String,
    pub population: u32,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl GazetteerEntry {
    pub fn point(&self) -> Point {
        Point::new(self.lat, self.lon)
    }
}

/// The loaded gazetteer: entries plus a normalized-label index.
///
/// Read-only after construction; share by reference ([`Gazetteer::bundled`]
/// hands out a `&'static`).
pub struct Gazetteer {
    entries: Vec<GazetteerEntry>,
    index: HashMap<String, usize>,
}

static BUNDLED: OnceLock<Gazetteer> = OnceLock::new();
const BUNDLED_JSON: &str = include_str!("../../assets/settlements.json");

impl Gazetteer {
    /// The gazetteer packaged with the crate, loaded on first use.
    pub fn bundled() -> &'static Gazetteer {
        BUNDLED.get_or_init(|| {
            Gazetteer::from_json_str(BUNDLED_JSON).expect("packaged settlements.json is valid")
        })
    }

    /// Parse a gazetteer from a JSON feature array.
    pub fn from_json_str(json: &str) -> Result<Self, String> {
        let entries: Vec<GazetteerEntry> =
            serde_json::from_str(json).map_err(|e| format!("invalid gazetteer JSON: {e}"))?;
        Ok(Self::from_entries(entries))
    }

    /// Load a gazetteer override from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, String> {
        let json = std::fs::read_to_string(path.as_ref())
            .map_err(|e| format!("cannot read gazetteer file: {e}"))?;
        Self::from_json_str(&json)
    }

    /// Build the normalized-label index.
    ///
    /// Ambiguous labels resolve deterministically at build time: the entry
    /// with the highest population wins, ties broken by lexicographic id.
    pub fn from_entries(entries: Vec<GazetteerEntry>) -> Self {
        let mut index: HashMap<String, usize> = HashMap::new();
        for (i, entry) in entries.iter().enumerate() {
            let labels = std::iter::once(entry.name_he.as_str())
                .chain(std::iter::once(entry.name_en.as_str()))
                .chain(entry.aliases.iter().map(String::as_str));
            for label in labels {
                let key = normalize(label);
                if key.is_empty() {
                    continue;
                }
                match index.get(&key) {
                    Some(&existing) if !wins(entry, &entries[existing]) => {}
                    _ => {
                        index.insert(key, i);
                    }
                }
            }
        }
        Self { entries, index }
    }

    /// Resolve a user-written label to coordinates.
    pub fn lookup(&self, label: &str) -> Option<Point> {
        self.entry(label).map(GazetteerEntry::point)
    }

    /// Resolve a user-written label to its full entry.
    pub fn entry(&self, label: &str) -> Option<&GazetteerEntry> {
        let key = normalize(label);
        self.index.get(&key).map(|&i| &self.entries[i])
    }

    /// Whether two labels resolve to the same settlement.
    ///
    /// Unresolvable labels compare by normalized string equality, so
    /// name-exact matching still works when the gazetteer misses.
    pub fn same_settlement(&self, a: &str, b: &str) -> bool {
        match (self.entry(a), self.entry(b)) {
            (Some(ea), Some(eb)) => ea.id == eb.id,
            _ => normalize(a) == normalize(b),
        }
    }

    /// All known canonical Hebrew names, sorted. Used by diagnostics.
    pub fn known_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.iter().map(|e| e.name_he.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Whether `a` beats `b` for an ambiguous label.
fn wins(a: &GazetteerEntry, b: &GazetteerEntry) -> bool {
    a.population > b.population || (a.population == b.population && a.id < b.id)
}

/// Normalize a place label for matching.
///
/// Lowercase-folds, maps dashes and underscores to spaces, strips
/// apostrophes (ASCII, typographic, and Hebrew geresh), drops all other
/// punctuation, and collapses whitespace.
pub fn normalize(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for c in label.chars() {
        match c {
            '-' | '_' => out.push(' '),
            '\'' | '`' | '\u{2019}' | '\u{05F3}' => {}
            c if c.is_alphanumeric() => out.extend(c.to_lowercase()),
            c if c.is_whitespace() => out.push(' '),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_folds_case_dashes_and_apostrophes() {
        assert_eq!(normalize("Tel-Aviv"), "tel aviv");
        assert_eq!(normalize("  תל   אביב "), "תל אביב");
        assert_eq!(normalize("תל-אביב"), "תל אביב");
        assert_eq!(normalize("Ra'anana"), "raanana");
        assert_eq!(normalize("גברעם!"), "גברעם");
    }

    #[test]
    fn bundled_lookup_by_hebrew_english_and_alias() {
        let g = Gazetteer::bundled();
        let he = g.lookup("תל אביב").unwrap();
        let dashed = g.lookup("תל-אביב").unwrap();
        let en = g.lookup("tel aviv").unwrap();
        let alias = g.lookup("TA").unwrap();
        assert_eq!(he, dashed);
        assert_eq!(he, en);
        assert_eq!(he, alias);
        assert!((he.lat - 32.0853).abs() < 1e-6);
    }

    #[test]
    fn unknown_label_is_none() {
        let g = Gazetteer::bundled();
        assert!(g.lookup("כפר שאינו קיים").is_none());
        assert!(g.entry("atlantis").is_none());
    }

    #[test]
    fn same_settlement_falls_back_to_string_equality() {
        let g = Gazetteer::bundled();
        assert!(g.same_settlement("תל אביב", "tel-aviv"));
        assert!(g.same_settlement("חניון שאינו ממופה", "חניון שאינו ממופה"));
        assert!(!g.same_settlement("תל אביב", "ירושלים"));
    }

    #[test]
    fn ambiguity_resolved_by_population_then_id() {
        let json = r#"[
            {"id": "b-town", "name_he": "נווה", "name_en": "Neve", "kind": "town",
             "population": 1000, "lat": 31.0, "lon": 34.0, "aliases": []},
            {"id": "a-town", "name_he": "נווה", "name_en": "Neve", "kind": "town",
             "population": 1000, "lat": 32.0, "lon": 35.0, "aliases": []},
            {"id": "c-city", "name_he": "נווה", "name_en": "Neve", "kind": "city",
             "population": 90000, "lat": 33.0, "lon": 36.0, "aliases": []}
        ]"#;
        let g = Gazetteer::from_json_str(json).unwrap();
        // Highest population wins regardless of file order.
        assert_eq!(g.entry("נווה").unwrap().id, "c-city");

        let json_tied = r#"[
            {"id": "b-town", "name_he": "נווה", "name_en": "Neve", "kind": "town",
             "population": 1000, "lat": 31.0, "lon": 34.0, "aliases": []},
            {"id": "a-town", "name_he": "נווה", "name_en": "Neve", "kind": "town",
             "population": 1000, "lat": 32.0, "lon": 35.0, "aliases": []}
        ]"#;
        let g = Gazetteer::from_json_str(json_tied).unwrap();
        assert_eq!(g.entry("neve").unwrap().id, "a-town");
    }

    #[test]
    fn known_names_sorted_and_complete() {
        let g = Gazetteer::bundled();
        let names = g.known_names();
        assert_eq!(names.len(), g.len());
        assert!(names.windows(2).all(|w| w[0] <= w[1]));
        assert!(names.contains(&"גברעם"));
    }
}
