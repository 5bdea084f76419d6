//! Model training module
//!
//! Provides the seven classifier families, their hyperparameter tables and
//! the orchestrator that runs a complete training session:
//! - Decision trees, Random Forests and gradient boosted trees
//! - Support Vector Machines with Platt-scaled probabilities
//! - Multinomial logistic regression
//! - K-Nearest Neighbors
//! - Gaussian Naive Bayes

pub mod decision_tree;
pub mod estimator;
pub mod gradient_boosting;
pub mod hyperparams;
pub mod knn;
pub mod logistic;
pub mod metrics;
pub mod naive_bayes;
pub mod orchestrator;
pub mod random_forest;
pub mod split;
pub mod svm;

pub use decision_tree::{Criterion, DecisionTree, TreeNode};
pub use estimator::{Estimator, Model};
pub use gradient_boosting::{GradientBoostingClassifier, GradientBoostingConfig};
pub use hyperparams::{ModelFamily, ParamKind, ParamSpec, DEFAULT_RANDOM_STATE};
pub use knn::{KNNClassifier, KNNConfig, SearchAlgorithm, WeightScheme};
pub use logistic::{LogisticRegression, Solver};
pub use metrics::{ClassMetrics, ClassificationMetrics, ClassificationReport};
pub use naive_bayes::GaussianNaiveBayes;
pub use orchestrator::{
    short_id, FamilyInfo, Trainer, TrainerConfig, TrainingOutcome, TrainingRequest, ValidationReport,
};
pub use random_forest::{MaxFeatures, RandomForest};
pub use split::{train_test_split, SplitIndices};
pub use svm::{Gamma, Kernel, SVMClassifier, SVMConfig};

/// Index of the first maximum; 0 for an empty input
pub(crate) fn argmax<'a>(values: impl IntoIterator<Item = &'a f64>) -> usize {
    let mut best = 0;
    let mut best_value = f64::NEG_INFINITY;
    for (i, &v) in values.into_iter().enumerate() {
        if v > best_value {
            best = i;
            best_value = v;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argmax_first_maximum() {
        assert_eq!(argmax(&[0.2, 0.5, 0.5, 0.1]), 1);
        assert_eq!(argmax(&Vec::<f64>::new()), 0);
    }
}
