//! Dedup Engine
//!
//! Cross-revision duplication and residual counts, computed from raw asset
//! id sets loaded straight from the snapshots (the index is not involved).

use crate::model::DatasetRevision;
use crate::snapshot::{SnapshotLoader, SnapshotResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Result of a dedup query, keyed by revision key (`branch@task`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryDatasetDupResult {
    /// Asset ids seen again in a later candidate
    pub duplication: u64,
    /// Asset count of every candidate
    pub total_count: BTreeMap<String, u64>,
    /// Per corrodee: asset ids not covered by any candidate
    pub residual_count: BTreeMap<String, u64>,
}

/// Pure set computation over named asset id lists
///
/// Candidates are visited in order; an id already seen in an earlier
/// candidate counts as one duplicate per repeat occurrence.
pub fn compute_dup<S: AsRef<str>>(
    candidates: &[(String, Vec<S>)],
    corrodees: &[(String, Vec<S>)],
) -> QueryDatasetDupResult {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut result = QueryDatasetDupResult::default();

    for (key, ids) in candidates {
        let mut local: HashSet<&str> = HashSet::new();
        for id in ids {
            let id = id.as_ref();
            if !local.insert(id) {
                continue;
            }
            if !seen.insert(id) {
                result.duplication += 1;
            }
        }
        result.total_count.insert(key.clone(), local.len() as u64);
    }

    for (key, ids) in corrodees {
        let remaining: HashSet<&str> = ids
            .iter()
            .map(|id| id.as_ref())
            .filter(|id| !seen.contains(id))
            .collect();
        result.residual_count.insert(key.clone(), remaining.len() as u64);
    }

    result
}

/// Load asset id sets and compute duplication
pub struct DedupEngine {
    loader: SnapshotLoader,
}

impl DedupEngine {
    pub fn new(loader: SnapshotLoader) -> Self {
        Self { loader }
    }

    pub fn dataset_dup(
        &self,
        candidates: &[DatasetRevision],
        corrodees: &[DatasetRevision],
    ) -> SnapshotResult<QueryDatasetDupResult> {
        let load = |revisions: &[DatasetRevision]| -> SnapshotResult<Vec<(String, Vec<String>)>> {
            revisions
                .iter()
                .map(|rev| -> SnapshotResult<(String, Vec<String>)> {
                    Ok((rev.revision_key(), self.loader.asset_ids(rev)?))
                })
                .collect()
        };

        let candidate_ids = load(candidates)?;
        let corrodee_ids = load(corrodees)?;
        let result = compute_dup(&candidate_ids, &corrodee_ids);

        tracing::debug!(
            candidates = candidates.len(),
            corrodees = corrodees.len(),
            duplication = result.duplication,
            "Computed dataset duplication"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::SnapshotError;
    use crate::testing::write_ids;
    use tempfile::tempdir;

    fn named(key: &str, ids: &[&'static str]) -> (String, Vec<&'static str>) {
        (key.to_string(), ids.to_vec())
    }

    #[test]
    fn test_concrete_scenario() {
        let result = compute_dup(
            &[named("C1", &["a", "b", "c"]), named("C2", &["b", "c", "d"])],
            &[named("D", &["a", "e"])],
        );
        assert_eq!(result.duplication, 2);
        assert_eq!(result.total_count["C1"], 3);
        assert_eq!(result.total_count["C2"], 3);
        assert_eq!(result.residual_count["D"], 1);
    }

    #[test]
    fn test_first_occurrence_never_counts() {
        let result = compute_dup(
            &[named("C1", &["a", "a"]), named("C2", &["x"]), named("C3", &["a", "x"])],
            &[],
        );
        assert_eq!(result.duplication, 2);
        assert_eq!(result.total_count["C1"], 1);
        assert!(result.residual_count.is_empty());
    }

    #[test]
    fn test_no_candidates_leaves_everything_residual() {
        let result = compute_dup(&[], &[named("D", &["a", "b", "b"])]);
        assert_eq!(result.duplication, 0);
        assert_eq!(result.residual_count["D"], 2);
    }

    #[test]
    fn test_dataset_dup_from_snapshots() {
        let dir = tempdir().unwrap();
        let c1 = write_ids(dir.path(), "c1", &["a", "b", "c"]);
        let c2 = write_ids(dir.path(), "c2", &["b", "c", "d"]);
        let d = write_ids(dir.path(), "d", &["a", "e"]);

        let engine = DedupEngine::new(SnapshotLoader::filesystem());
        let result = engine.dataset_dup(&[c1, c2], &[d]).unwrap();
        assert_eq!(result.duplication, 2);
        assert_eq!(result.total_count["c1@t"], 3);
        assert_eq!(result.residual_count["d@t"], 1);

        let missing = DatasetRevision::new(dir.path(), "u", "repo", "nope", "t");
        let result = engine.dataset_dup(&[missing], &[]);
        assert!(matches!(result, Err(SnapshotError::RevisionNotFound(_))));
    }
}
