use crate::pipeline::TransformEstimate;
use serde::Serialize;
use std::collections::BTreeMap;

/// Transforms of every aligned target relative to one reference, keyed by
/// target identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AlignmentRecord {
    entries: BTreeMap<String, TransformEstimate>,
}

impl AlignmentRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, target: &str) -> Option<&TransformEstimate> {
        self.entries.get(target)
    }

    pub fn contains(&self, target: &str) -> bool {
        self.entries.contains_key(target)
    }

    /// Add or replace the transform for `target`.
    pub fn insert(&mut self, target: impl Into<String>, transform: TransformEstimate) -> Option<TransformEstimate> {
        self.entries.insert(target.into(), transform)
    }

    pub fn remove(&mut self, target: &str) -> Option<TransformEstimate> {
        self.entries.remove(target)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TransformEstimate)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Targets from `targets` that have no entry yet, in input order.
    pub fn missing<'a>(&self, targets: &'a [String]) -> Vec<&'a str> {
        targets
            .iter()
            .filter(|t| !self.contains(t))
            .map(String::as_str)
            .collect()
    }

    /// Parse a stored record, dropping entries that are not valid
    /// transforms. Returns the record and the identities that were dropped,
    /// or `None` when the text is not a JSON object at all.
    pub fn parse_lenient(text: &str) -> Option<(Self, Vec<String>)> {
        if text.trim().is_empty() {
            return Some((Self::new(), Vec::new()));
        }
        let raw: BTreeMap<String, serde_json::Value> = serde_json::from_str(text).ok()?;

        let mut record = Self::new();
        let mut dropped = Vec::new();
        for (target, value) in raw {
            match serde_json::from_value::<TransformEstimate>(value) {
                Ok(transform) => {
                    record.entries.insert(target, transform);
                }
                Err(_) => dropped.push(target),
            }
        }
        Some((record, dropped))
    }
}

impl FromIterator<(String, TransformEstimate)> for AlignmentRecord {
    fn from_iter<I: IntoIterator<Item = (String, TransformEstimate)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Translation;

    #[test]
    fn test_lenient_parse_drops_invalid_entries() {
        let text = r#"{
            "a.png": {"rotation": 3.0, "shift x": 1.0, "shift y": 2.0, "scale": 1.01},
            "b.png": {"rotation": 3.0, "shift x": 1.0, "shift y": 2.0, "scale": 0.0},
            "c.png": "nonsense"
        }"#;
        let (record, dropped) = AlignmentRecord::parse_lenient(text).unwrap();
        assert_eq!(record.len(), 1);
        assert!(record.contains("a.png"));
        assert_eq!(dropped, vec!["b.png".to_string(), "c.png".to_string()]);
    }

    #[test]
    fn test_lenient_parse_rejects_non_objects() {
        assert!(AlignmentRecord::parse_lenient("[1, 2]").is_none());
        assert!(AlignmentRecord::parse_lenient("{not json").is_none());
        assert!(AlignmentRecord::parse_lenient("   ").unwrap().0.is_empty());
    }

    #[test]
    fn test_missing_targets() {
        let mut record = AlignmentRecord::new();
        record.insert("b.png", TransformEstimate::new(1.0, 1.0, Translation::default()).unwrap());
        let targets = vec!["a.png".to_string(), "b.png".to_string(), "c.png".to_string()];
        assert_eq!(record.missing(&targets), vec!["a.png", "c.png"]);
    }
}
