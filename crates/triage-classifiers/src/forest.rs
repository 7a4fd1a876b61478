//! Random forest artifact
//!
//! An ensemble of binary decision trees exported from training. Each split
//! sends a row left when `x[feature] <= threshold`. Leaves hold per-class
//! weights (sample counts or fractions); a tree's vote is the normalised leaf
//! distribution and the forest's probability is the mean vote.

use crate::model::{numeric_row, TriageModel};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use triage_core::{Error, FeatureVector, Result};

/// Number of classes for the binary triage label
const NUM_CLASSES: usize = 2;

/// A single tree node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: Vec<f64>,
    },
}

/// A decision tree stored as a flat node array rooted at index 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    /// Normalised class distribution for a row
    fn vote(&self, row: &[f64]) -> [f64; NUM_CLASSES] {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
                TreeNode::Leaf { value } => {
                    let total: f64 = value.iter().sum();
                    return [value[0] / total, value[1] / total];
                }
            }
        }
    }

    /// Children must come after their parent, so every walk terminates
    fn validate(&self, tree: usize, num_features: usize) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(Error::model_load(format!("tree {tree} has no nodes")));
        }
        for (index, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= num_features {
                        return Err(Error::model_load(format!(
                            "tree {tree} node {index} splits on feature {feature}, model has {num_features}"
                        )));
                    }
                    if !threshold.is_finite() {
                        return Err(Error::model_load(format!(
                            "tree {tree} node {index} has a non-finite threshold"
                        )));
                    }
                    for child in [left, right] {
                        if *child <= index || *child >= self.nodes.len() {
                            return Err(Error::model_load(format!(
                                "tree {tree} node {index} has invalid child {child}"
                            )));
                        }
                    }
                }
                TreeNode::Leaf { value } => {
                    if value.len() != NUM_CLASSES {
                        return Err(Error::model_load(format!(
                            "tree {tree} leaf {index} has {} classes, expected {NUM_CLASSES}",
                            value.len()
                        )));
                    }
                    if value.iter().any(|v| !v.is_finite() || *v < 0.0)
                        || value.iter().sum::<f64>() <= 0.0
                    {
                        return Err(Error::model_load(format!(
                            "tree {tree} leaf {index} has invalid class weights"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Random forest classifier artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestModel {
    pub name: String,

    /// Training-time feature order
    pub feature_names: Vec<String>,

    /// Ordinal encoding owned by the artifact, by field name
    #[serde(default)]
    pub categories: HashMap<String, Vec<String>>,

    pub trees: Vec<DecisionTree>,
}

impl RandomForestModel {
    /// Structural checks run once at load time
    pub fn validate(&self) -> Result<()> {
        if self.feature_names.is_empty() {
            return Err(Error::model_load(format!(
                "model '{}' declares no features",
                self.name
            )));
        }
        if self.trees.is_empty() {
            return Err(Error::model_load(format!(
                "model '{}' has no trees",
                self.name
            )));
        }
        for (tree, t) in self.trees.iter().enumerate() {
            t.validate(tree, self.feature_names.len())?;
        }
        Ok(())
    }

    fn probabilities(&self, vector: &FeatureVector) -> Result<[f64; NUM_CLASSES]> {
        let row = numeric_row(vector, &self.categories)?;
        if row.len() != self.feature_names.len() {
            return Err(Error::schema_mismatch(format!(
                "model '{}' expects {} features, got {}",
                self.name,
                self.feature_names.len(),
                row.len()
            )));
        }

        let mut sum = [0.0; NUM_CLASSES];
        for tree in &self.trees {
            let vote = tree.vote(&row);
            sum[0] += vote[0];
            sum[1] += vote[1];
        }
        let n = self.trees.len() as f64;
        Ok([sum[0] / n, sum[1] / n])
    }
}

impl TriageModel for RandomForestModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict(&self, vector: &FeatureVector) -> Result<u8> {
        let [not_urgent, urgent] = self.probabilities(vector)?;
        // Ties go to the lower class index.
        Ok(u8::from(urgent > not_urgent))
    }

    fn predict_proba(&self, vector: &FeatureVector) -> Result<Option<Vec<f64>>> {
        Ok(Some(self.probabilities(vector)?.to_vec()))
    }
}
