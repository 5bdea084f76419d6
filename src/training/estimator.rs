//! Fitted-model wrapper shared by training and serving

use super::decision_tree::{Criterion, DecisionTree};
use super::gradient_boosting::{GradientBoostingClassifier, GradientBoostingConfig};
use super::hyperparams::{ModelFamily, Params};
use super::knn::{KNNClassifier, KNNConfig, SearchAlgorithm, WeightScheme};
use super::logistic::{LogisticRegression, Solver};
use super::naive_bayes::GaussianNaiveBayes;
use super::random_forest::{MaxFeatures, RandomForest};
use super::svm::{Gamma, Kernel, SVMClassifier, SVMConfig};
use crate::error::{ExoError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One of the seven classifier families
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "family", content = "model")]
pub enum Model {
    RandomForest(RandomForest),
    GradientBoosting(GradientBoostingClassifier),
    SVM(SVMClassifier),
    DecisionTree(DecisionTree),
    LogisticRegression(LogisticRegression),
    KNN(KNNClassifier),
    NaiveBayes(GaussianNaiveBayes),
}

fn parse_option<T: serde::de::DeserializeOwned>(name: &str, value: &str) -> Result<T> {
    serde_json::from_value(Value::String(value.to_string()))
        .map_err(|_| ExoError::invalid_param(name, value, "unsupported option"))
}

impl Model {
    /// Unfitted model configured from cleaned hyperparameters
    pub fn build(family: ModelFamily, hyperparameters: &Map<String, Value>) -> Result<Self> {
        let p = Params(hyperparameters);
        let model = match family {
            ModelFamily::RandomForest => {
                let mut rf = RandomForest::new(p.usize("n_estimators").unwrap_or(100))
                    .with_min_samples_split(p.usize("min_samples_split").unwrap_or(2))
                    .with_min_samples_leaf(p.usize("min_samples_leaf").unwrap_or(1))
                    .with_random_state(p.seed());
                if let Some(depth) = p.usize("max_depth") {
                    rf = rf.with_max_depth(depth);
                }
                if let Some(mf) = p.str("max_features") {
                    let max_features = match mf {
                        "sqrt" => MaxFeatures::Sqrt,
                        "log2" => MaxFeatures::Log2,
                        other => return Err(ExoError::invalid_param("max_features", other, "unsupported option")),
                    };
                    rf = rf.with_max_features(max_features);
                }
                Model::RandomForest(rf)
            }
            ModelFamily::GradientBoosting => {
                let defaults = GradientBoostingConfig::default();
                Model::GradientBoosting(GradientBoostingClassifier::new(GradientBoostingConfig {
                    n_estimators: p.usize("n_estimators").unwrap_or(defaults.n_estimators),
                    learning_rate: p.f64("learning_rate").unwrap_or(defaults.learning_rate),
                    max_depth: p.usize("max_depth").unwrap_or(defaults.max_depth),
                    subsample: p.f64("subsample").unwrap_or(defaults.subsample),
                    random_state: Some(p.seed()),
                    ..defaults
                }))
            }
            ModelFamily::SVM => {
                let kernel: Kernel = match p.str("kernel") {
                    Some(k) => parse_option("kernel", k)?,
                    None => Kernel::default(),
                };
                let gamma: Gamma = match p.str("gamma") {
                    Some(g) => parse_option("gamma", g)?,
                    None => Gamma::default(),
                };
                Model::SVM(SVMClassifier::new(SVMConfig {
                    c: p.f64("C").unwrap_or(1.0),
                    kernel,
                    gamma,
                    probability: p.bool("probability").unwrap_or(true),
                    random_state: Some(p.seed()),
                    ..Default::default()
                }))
            }
            ModelFamily::DecisionTree => {
                let criterion = match p.str("criterion").unwrap_or("gini") {
                    "gini" => Criterion::Gini,
                    "entropy" => Criterion::Entropy,
                    other => return Err(ExoError::invalid_param("criterion", other, "unsupported option")),
                };
                let mut tree = DecisionTree::new_classifier()
                    .with_min_samples_split(p.usize("min_samples_split").unwrap_or(2))
                    .with_criterion(criterion)
                    .with_random_state(p.seed());
                if let Some(depth) = p.usize("max_depth") {
                    tree = tree.with_max_depth(depth);
                }
                Model::DecisionTree(tree)
            }
            ModelFamily::LogisticRegression => {
                let solver: Solver = match p.str("solver") {
                    Some(s) => parse_option("solver", s)?,
                    None => Solver::default(),
                };
                Model::LogisticRegression(
                    LogisticRegression::new()
                        .with_c(p.f64("C").unwrap_or(1.0))
                        .with_max_iter(p.usize("max_iter").unwrap_or(500))
                        .with_solver(solver)
                        .with_random_state(p.seed()),
                )
            }
            ModelFamily::KNN => {
                let weights: WeightScheme = match p.str("weights") {
                    Some(w) => parse_option("weights", w)?,
                    None => WeightScheme::default(),
                };
                let algorithm: SearchAlgorithm = match p.str("algorithm") {
                    Some(a) => parse_option("algorithm", a)?,
                    None => SearchAlgorithm::default(),
                };
                Model::KNN(KNNClassifier::new(KNNConfig {
                    n_neighbors: p.usize("n_neighbors").unwrap_or(5),
                    weights,
                    algorithm,
                    parallel: true,
                }))
            }
            ModelFamily::NaiveBayes => Model::NaiveBayes(
                GaussianNaiveBayes::new().with_var_smoothing(p.f64("var_smoothing").unwrap_or(1e-9)),
            ),
        };
        Ok(model)
    }

    pub fn family(&self) -> ModelFamily {
        match self {
            Model::RandomForest(_) => ModelFamily::RandomForest,
            Model::GradientBoosting(_) => ModelFamily::GradientBoosting,
            Model::SVM(_) => ModelFamily::SVM,
            Model::DecisionTree(_) => ModelFamily::DecisionTree,
            Model::LogisticRegression(_) => ModelFamily::LogisticRegression,
            Model::KNN(_) => ModelFamily::KNN,
            Model::NaiveBayes(_) => ModelFamily::NaiveBayes,
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &[usize], n_classes: usize) -> Result<()> {
        match self {
            Model::RandomForest(m) => m.fit(x, y, n_classes).map(|_| ()),
            Model::GradientBoosting(m) => m.fit(x, y, n_classes),
            Model::SVM(m) => m.fit(x, y, n_classes),
            Model::DecisionTree(m) => m.fit_classifier(x, y, n_classes).map(|_| ()),
            Model::LogisticRegression(m) => m.fit(x, y, n_classes).map(|_| ()),
            Model::KNN(m) => m.fit(x, y, n_classes),
            Model::NaiveBayes(m) => m.fit(x, y, n_classes),
        }
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<usize>> {
        match self {
            Model::RandomForest(m) => m.predict(x),
            Model::GradientBoosting(m) => m.predict(x),
            Model::SVM(m) => m.predict(x),
            Model::DecisionTree(m) => m.predict(x),
            Model::LogisticRegression(m) => m.predict(x),
            Model::KNN(m) => m.predict(x),
            Model::NaiveBayes(m) => m.predict(x),
        }
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        match self {
            Model::RandomForest(m) => m.predict_proba(x),
            Model::GradientBoosting(m) => m.predict_proba(x),
            Model::SVM(m) => m.predict_proba(x),
            Model::DecisionTree(m) => m.predict_proba(x),
            Model::LogisticRegression(m) => m.predict_proba(x),
            Model::KNN(m) => m.predict_proba(x),
            Model::NaiveBayes(m) => m.predict_proba(x),
        }
    }

    /// Importance per transformed feature, when the family defines one
    pub fn feature_importances(&self) -> Option<Vec<f64>> {
        match self {
            Model::RandomForest(m) => m.feature_importances().map(|a| a.to_vec()),
            Model::GradientBoosting(m) => {
                let imp = m.feature_importances();
                (!imp.is_empty()).then(|| imp.to_vec())
            }
            Model::DecisionTree(m) => m.feature_importances().map(|a| a.to_vec()),
            Model::LogisticRegression(m) => m.coefficient_importances().map(|a| a.to_vec()),
            Model::SVM(_) | Model::KNN(_) | Model::NaiveBayes(_) => None,
        }
    }
}

/// A model tagged with whether it can produce class probabilities.
///
/// The tag is fixed at construction: every family supports probabilities
/// except an SVM built with `probability = false`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Estimator {
    Probabilistic(Model),
    Plain(Model),
}

impl Estimator {
    pub fn new(model: Model) -> Self {
        match &model {
            Model::SVM(svm) if !svm.has_probability() => Estimator::Plain(model),
            _ => Estimator::Probabilistic(model),
        }
    }

    /// Build an unfitted estimator for a family
    pub fn build(family: ModelFamily, hyperparameters: &Map<String, Value>) -> Result<Self> {
        Model::build(family, hyperparameters).map(Self::new)
    }

    pub fn model(&self) -> &Model {
        match self {
            Estimator::Probabilistic(m) | Estimator::Plain(m) => m,
        }
    }

    fn model_mut(&mut self) -> &mut Model {
        match self {
            Estimator::Probabilistic(m) | Estimator::Plain(m) => m,
        }
    }

    pub fn family(&self) -> ModelFamily {
        self.model().family()
    }

    pub fn supports_proba(&self) -> bool {
        matches!(self, Estimator::Probabilistic(_))
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &[usize], n_classes: usize) -> Result<()> {
        self.model_mut().fit(x, y, n_classes)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<usize>> {
        self.model().predict(x)
    }

    /// `None` for estimators without probability support
    pub fn predict_proba(&self, x: &Array2<f64>) -> Option<Result<Array2<f64>>> {
        match self {
            Estimator::Probabilistic(m) => Some(m.predict_proba(x)),
            Estimator::Plain(_) => None,
        }
    }

    pub fn feature_importances(&self) -> Option<Vec<f64>> {
        self.model().feature_importances()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use serde_json::json;

    fn data() -> (Array2<f64>, Vec<usize>) {
        let x = array![
            [0.0, 0.1], [0.2, 0.0], [0.1, 0.3], [0.3, 0.2], [0.2, 0.2],
            [3.0, 3.1], [3.2, 3.0], [3.1, 3.3], [3.3, 3.2], [3.2, 3.2]
        ];
        (x, vec![0, 0, 0, 0, 0, 1, 1, 1, 1, 1])
    }

    #[test]
    fn test_every_family_fits_and_predicts() {
        let (x, y) = data();
        let params = json!({"n_estimators": 10, "n_neighbors": 3});
        for family in ModelFamily::ALL {
            let mut relevant = Map::new();
            for (k, v) in params.as_object().unwrap() {
                let known = super::super::hyperparams::specification(family)
                    .iter()
                    .any(|spec| spec.name == k);
                if known {
                    relevant.insert(k.clone(), v.clone());
                }
            }
            let mut estimator = Estimator::build(family, &relevant).unwrap();
            let result = estimator.fit(&x, &y, 2);
            assert!(result.is_ok(), "{} failed to fit: {:?}", family, result.err());
            assert_eq!(estimator.family(), family);
            assert_eq!(estimator.predict(&x).unwrap().len(), 10);
            let proba = estimator.predict_proba(&x).unwrap().unwrap();
            assert_eq!(proba.dim(), (10, 2));
        }
    }

    #[test]
    fn test_svm_without_probability_is_plain() {
        let params = json!({"probability": false});
        let estimator = Estimator::build(ModelFamily::SVM, params.as_object().unwrap()).unwrap();
        assert!(!estimator.supports_proba());
        assert!(estimator.predict_proba(&array![[0.0, 0.0]]).is_none());
    }

    #[test]
    fn test_serde_round_trip_keeps_tag() {
        let (x, y) = data();
        let mut estimator = Estimator::build(ModelFamily::DecisionTree, &Map::new()).unwrap();
        estimator.fit(&x, &y, 2).unwrap();

        let json = serde_json::to_string(&estimator).unwrap();
        let restored: Estimator = serde_json::from_str(&json).unwrap();
        assert!(restored.supports_proba());
        assert_eq!(restored.predict(&x).unwrap(), estimator.predict(&x).unwrap());
    }
}
