//! On-disk artifacts consumed by the ingestion engines.
//!
//! A model artifact carries the trained LDA state the pipeline needs:
//! the vocabulary and the dense topics × vocabulary weight matrix.
//! A comparison artifact carries a topics(model_0) × topics(model_1)
//! matrix of externally computed similarity or distance values.
//!
//! Both are JSON. Missing files, unreadable bytes, ragged matrices and
//! non-finite values are [`StoreError::ArtifactLoad`] failures; checking a
//! comparison matrix against the registered models' topic counts happens
//! in the comparison engine, where it is a validation failure.

use serde::Deserialize;
use std::cmp::Ordering;
use std::path::Path;

use crate::error::{StoreError, StoreResult};

/// A trained topic model loaded from disk.
#[derive(Debug, Deserialize)]
pub struct TopicModelArtifact {
    pub vocabulary: Vec<String>,
    pub weights: Vec<Vec<f64>>,
}

impl TopicModelArtifact {
    pub fn load(path: &Path) -> StoreResult<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|err| StoreError::artifact(path, err))?;
        let artifact: TopicModelArtifact =
            serde_json::from_str(&content).map_err(|err| StoreError::artifact(path, err))?;
        if let Err(reason) = artifact.check_shape() {
            return Err(StoreError::artifact(path, reason));
        }
        Ok(artifact)
    }

    fn check_shape(&self) -> Result<(), String> {
        if self.vocabulary.is_empty() {
            return Err("vocabulary is empty".to_string());
        }
        if self.weights.is_empty() {
            return Err("weight matrix has no topic rows".to_string());
        }
        for (index, row) in self.weights.iter().enumerate() {
            if row.len() != self.vocabulary.len() {
                return Err(format!(
                    "topic row {} has {} weights but the vocabulary has {} terms",
                    index,
                    row.len(),
                    self.vocabulary.len()
                ));
            }
            if row.iter().any(|w| !w.is_finite()) {
                return Err(format!("topic row {} contains a non-finite weight", index));
            }
        }
        Ok(())
    }

    pub fn num_topics(&self) -> usize {
        self.weights.len()
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    /// The `top_n` highest-weight column indices of every topic, paired
    /// with their weights, in descending weight order. Ties go to the
    /// lower column index. `top_n` beyond the vocabulary size selects the
    /// whole vocabulary.
    pub fn top_terms(&self, top_n: usize) -> Vec<Vec<(usize, f64)>> {
        let n = top_n.min(self.vocabulary_size());
        self.weights
            .iter()
            .map(|row| {
                let mut indices: Vec<usize> = (0..row.len()).collect();
                indices.sort_by(|&a, &b| {
                    row[b]
                        .partial_cmp(&row[a])
                        .unwrap_or(Ordering::Equal)
                        .then(a.cmp(&b))
                });
                indices.truncate(n);
                indices.into_iter().map(|i| (i, row[i])).collect()
            })
            .collect()
    }
}

/// An externally computed topic-pair value matrix.
#[derive(Debug, Deserialize)]
pub struct ComparisonMatrix {
    pub values: Vec<Vec<f64>>,
}

impl ComparisonMatrix {
    pub fn load(path: &Path) -> StoreResult<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|err| StoreError::artifact(path, err))?;
        let matrix: ComparisonMatrix =
            serde_json::from_str(&content).map_err(|err| StoreError::artifact(path, err))?;
        if matrix.values.is_empty() {
            return Err(StoreError::artifact(path, "comparison matrix is empty"));
        }
        let cols = matrix.values[0].len();
        for (index, row) in matrix.values.iter().enumerate() {
            if row.len() != cols {
                return Err(StoreError::artifact(
                    path,
                    format!("row {} has {} columns, expected {}", index, row.len(), cols),
                ));
            }
            if row.iter().any(|v| !v.is_finite()) {
                return Err(StoreError::artifact(
                    path,
                    format!("row {} contains a non-finite value", index),
                ));
            }
        }
        Ok(matrix)
    }

    pub fn rows(&self) -> usize {
        self.values.len()
    }

    pub fn cols(&self) -> usize {
        self.values[0].len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn artifact(vocabulary: &[&str], weights: Vec<Vec<f64>>) -> TopicModelArtifact {
        TopicModelArtifact {
            vocabulary: vocabulary.iter().map(|s| s.to_string()).collect(),
            weights,
        }
    }

    #[test]
    fn selects_top_terms_in_descending_weight_order() {
        let model = artifact(
            &["a", "b", "c", "d"],
            vec![
                vec![0.1, 0.4, 0.2, 0.3],
                vec![0.25, 0.25, 0.25, 0.25],
            ],
        );
        let top = model.top_terms(2);
        // Topic 0: b (0.4) then d (0.3)
        assert_eq!(top[0], vec![(1, 0.4), (3, 0.3)]);
        // Topic 1: all tied, the lower column index wins
        assert_eq!(top[1], vec![(0, 0.25), (1, 0.25)]);
    }

    #[test]
    fn top_n_clamps_to_vocabulary_size() {
        let model = artifact(&["a", "b"], vec![vec![0.6, 0.4]]);
        let top = model.top_terms(50);
        assert_eq!(top[0].len(), 2);
        assert_eq!(top[0][0], (0, 0.6));
    }

    #[test]
    fn ragged_matrix_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        fs::write(
            &path,
            r#"{"vocabulary": ["a", "b"], "weights": [[0.5, 0.5], [1.0]]}"#,
        )
        .unwrap();
        let err = TopicModelArtifact::load(&path).unwrap_err();
        assert!(matches!(err, StoreError::ArtifactLoad { .. }));
    }

    #[test]
    fn missing_file_fails_to_load() {
        let err = TopicModelArtifact::load(Path::new("/nonexistent/model.json")).unwrap_err();
        assert!(matches!(err, StoreError::ArtifactLoad { .. }));
    }

    #[test]
    fn comparison_matrix_reports_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matrix.json");
        fs::write(&path, r#"{"values": [[0.9, 0.1, 0.2], [0.3, 0.8, 0.4]]}"#).unwrap();
        let matrix = ComparisonMatrix::load(&path).unwrap();
        assert_eq!(matrix.rows(), 2);
        assert_eq!(matrix.cols(), 3);
    }

    #[test]
    fn comparison_matrix_rejects_ragged_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matrix.json");
        fs::write(&path, r#"{"values": [[0.9, 0.1], [0.3]]}"#).unwrap();
        assert!(ComparisonMatrix::load(&path).is_err());
    }
}
