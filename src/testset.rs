//! Labelled test sets: `test_set_<n>.json` files of prompt/code cases.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};

use crate::verdict::Label;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSet {
    pub test_set_id: u32,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub test_cases: Vec<TestCase>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    /// Numeric ids are read as strings.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub prompt: String,
    pub code: String,
    pub expected: Label,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bug_type: Option<String>,
}

pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }
    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

impl TestSet {
    pub fn parse_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read test set {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse test set {}", path.display()))
    }

    pub fn len(&self) -> usize {
        self.test_cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.test_cases.is_empty()
    }
}

/// The `<n>` of a `test_set_<n>.json` file name.
pub fn set_number(path: &Path) -> Option<u32> {
    path.file_name()?
        .to_str()?
        .strip_prefix("test_set_")?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

/// Load every test set in `dir`, ordered by number, optionally restricted
/// to the given numbers.
pub fn load_test_sets(dir: &Path, filter: Option<&[u32]>) -> Result<Vec<TestSet>> {
    let mut files: Vec<(u32, PathBuf)> = fs::read_dir(dir)
        .with_context(|| format!("failed to read test set directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter_map(|path| set_number(&path).map(|n| (n, path)))
        .filter(|(n, _)| filter.map_or(true, |wanted| wanted.contains(n)))
        .collect();
    files.sort_by_key(|(n, _)| *n);

    let mut sets = Vec::with_capacity(files.len());
    for (n, path) in files {
        let set = TestSet::parse_file(&path)?;
        debug!(number = n, cases = set.len(), "loaded test set");
        sets.push(set);
    }
    info!(
        sets = sets.len(),
        cases = sets.iter().map(TestSet::len).sum::<usize>(),
        "test sets loaded"
    );
    Ok(sets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SET: &str = r#"{
        "test_set_id": 3,
        "name": "Corner cases",
        "test_cases": [
            {"id": 1, "name": "avg", "prompt": "Average a list.",
             "code": "def avg(xs):\n    return sum(xs) / len(xs)\n",
             "expected": "bug", "bug_type": "missing_corner_case"},
            {"id": "3-2", "name": "add", "prompt": "Add.",
             "code": "def add(a, b):\n    return a + b\n", "expected": "clean"}
        ]
    }"#;

    #[test]
    fn test_parse_set() {
        let set: TestSet = serde_json::from_str(SET).unwrap();
        assert_eq!(set.test_set_id, 3);
        assert_eq!(set.len(), 2);
        assert_eq!(set.test_cases[0].id, "1");
        assert_eq!(set.test_cases[0].expected, Label::Bug);
        assert_eq!(set.test_cases[1].id, "3-2");
        assert!(set.test_cases[1].bug_type.is_none());
    }

    #[test]
    fn test_set_number() {
        assert_eq!(set_number(Path::new("dir/test_set_12.json")), Some(12));
        assert_eq!(set_number(Path::new("test_set_x.json")), None);
        assert_eq!(set_number(Path::new("summary.json")), None);
    }

    #[test]
    fn test_load_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        for n in [10, 2, 1] {
            let body = SET.replace("\"test_set_id\": 3", &format!("\"test_set_id\": {}", n));
            fs::write(dir.path().join(format!("test_set_{}.json", n)), body).unwrap();
        }
        fs::write(dir.path().join("notes.json"), "{}").unwrap();

        let sets = load_test_sets(dir.path(), None).unwrap();
        let ids: Vec<u32> = sets.iter().map(|s| s.test_set_id).collect();
        assert_eq!(ids, vec![1, 2, 10]);

        let sets = load_test_sets(dir.path(), Some(&[2][..])).unwrap();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].test_set_id, 2);
    }
}
