//! Model families and their tunable hyperparameters

use crate::error::{ExoError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Seed applied to every seeded family unless the caller overrides it
pub const DEFAULT_RANDOM_STATE: u64 = 42;

/// The classifier families that can be trained and served
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModelFamily {
    RandomForest,
    GradientBoosting,
    SVM,
    DecisionTree,
    LogisticRegression,
    KNN,
    NaiveBayes,
}

impl ModelFamily {
    pub const ALL: [ModelFamily; 7] = [
        ModelFamily::RandomForest,
        ModelFamily::GradientBoosting,
        ModelFamily::SVM,
        ModelFamily::DecisionTree,
        ModelFamily::LogisticRegression,
        ModelFamily::KNN,
        ModelFamily::NaiveBayes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFamily::RandomForest => "RandomForest",
            ModelFamily::GradientBoosting => "GradientBoosting",
            ModelFamily::SVM => "SVM",
            ModelFamily::DecisionTree => "DecisionTree",
            ModelFamily::LogisticRegression => "LogisticRegression",
            ModelFamily::KNN => "KNN",
            ModelFamily::NaiveBayes => "NaiveBayes",
        }
    }

    /// Human readable name used in listings
    pub fn display_name(&self) -> &'static str {
        match self {
            ModelFamily::RandomForest => "Random Forest",
            ModelFamily::GradientBoosting => "Gradient Boosting",
            ModelFamily::SVM => "Support Vector Machine",
            ModelFamily::DecisionTree => "Decision Tree",
            ModelFamily::LogisticRegression => "Logistic Regression",
            ModelFamily::KNN => "K-Nearest Neighbors",
            ModelFamily::NaiveBayes => "Gaussian Naive Bayes",
        }
    }

    /// Families whose fit consumes a random seed
    pub fn is_seeded(&self) -> bool {
        !matches!(self, ModelFamily::KNN | ModelFamily::NaiveBayes)
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelFamily {
    type Err = ExoError;

    fn from_str(s: &str) -> Result<Self> {
        ModelFamily::ALL
            .into_iter()
            .find(|family| family.as_str() == s)
            .ok_or_else(|| ExoError::UnknownModelFamily(s.to_string()))
    }
}

/// Value domain of a single hyperparameter
#[derive(Debug, Clone, PartialEq)]
pub enum ParamKind {
    Int { min: i64, max: i64 },
    Float { min: f64, max: f64 },
    Select { options: &'static [&'static str] },
}

/// Description of one tunable hyperparameter
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    /// `Value::Null` means the estimator's own unbounded default
    pub default: Value,
    pub description: &'static str,
}

impl ParamSpec {
    fn int(name: &'static str, default: Option<i64>, min: i64, max: i64, description: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::Int { min, max },
            default: default.map_or(Value::Null, Value::from),
            description,
        }
    }

    fn float(name: &'static str, default: f64, min: f64, max: f64, description: &'static str) -> Self {
        Self { name, kind: ParamKind::Float { min, max }, default: Value::from(default), description }
    }

    fn select(
        name: &'static str,
        default: &'static str,
        options: &'static [&'static str],
        description: &'static str,
    ) -> Self {
        Self { name, kind: ParamKind::Select { options }, default: Value::from(default), description }
    }

    /// JSON rendering served to clients
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        match &self.kind {
            ParamKind::Int { min, max } => {
                obj.insert("type".into(), "int".into());
                obj.insert("min".into(), (*min).into());
                obj.insert("max".into(), (*max).into());
            }
            ParamKind::Float { min, max } => {
                obj.insert("type".into(), "float".into());
                obj.insert("min".into(), (*min).into());
                obj.insert("max".into(), (*max).into());
            }
            ParamKind::Select { options } => {
                obj.insert("type".into(), "select".into());
                obj.insert("options".into(), options.to_vec().into());
            }
        }
        obj.insert("default".into(), self.default.clone());
        obj.insert("description".into(), self.description.into());
        Value::Object(obj)
    }

    fn check(&self, value: &Value) -> Result<()> {
        let reject = |reason: String| Err(ExoError::invalid_param(self.name, value, reason));
        match &self.kind {
            ParamKind::Int { min, max } => match as_integer(value) {
                Some(v) if (*min..=*max).contains(&v) => Ok(()),
                Some(_) => reject(format!("must be between {} and {}", min, max)),
                None => reject("must be an integer".to_string()),
            },
            ParamKind::Float { min, max } => match value.as_f64() {
                Some(v) if v >= *min && v <= *max => Ok(()),
                Some(_) => reject(format!("must be between {} and {}", min, max)),
                None => reject("must be a number".to_string()),
            },
            ParamKind::Select { options } => match value.as_str() {
                Some(v) if options.contains(&v) => Ok(()),
                _ => reject(format!("must be one of: {}", options.join(", "))),
            },
        }
    }
}

/// Integers may arrive as `100` or `100.0`
fn as_integer(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|v| v.fract() == 0.0 && v.abs() < i64::MAX as f64)
            .map(|v| v as i64)
    })
}

/// Tunable hyperparameters for a family
pub fn specification(family: ModelFamily) -> Vec<ParamSpec> {
    match family {
        ModelFamily::RandomForest => vec![
            ParamSpec::int("n_estimators", Some(100), 10, 500, "Number of trees in the forest"),
            ParamSpec::int("max_depth", None, 1, 50, "Maximum depth of each tree (None for unlimited)"),
            ParamSpec::int("min_samples_split", Some(2), 2, 20, "Minimum samples required to split a node"),
            ParamSpec::int("min_samples_leaf", Some(1), 1, 20, "Minimum samples required in a leaf"),
            ParamSpec::select("max_features", "sqrt", &["sqrt", "log2", "None"], "Features considered at each split"),
        ],
        ModelFamily::GradientBoosting => vec![
            ParamSpec::int("n_estimators", Some(100), 10, 500, "Number of boosting stages"),
            ParamSpec::float("learning_rate", 0.1, 0.001, 1.0, "Shrinkage applied to each tree"),
            ParamSpec::int("max_depth", Some(3), 1, 20, "Maximum depth of each tree"),
            ParamSpec::float("subsample", 1.0, 0.1, 1.0, "Fraction of rows used per stage"),
        ],
        ModelFamily::SVM => vec![
            ParamSpec::float("C", 1.0, 0.001, 100.0, "Regularization parameter"),
            ParamSpec::select("kernel", "rbf", &["linear", "poly", "rbf", "sigmoid"], "Kernel type"),
            ParamSpec::select("gamma", "scale", &["scale", "auto"], "Kernel coefficient"),
        ],
        ModelFamily::DecisionTree => vec![
            ParamSpec::int("max_depth", None, 1, 50, "Maximum depth of the tree (None for unlimited)"),
            ParamSpec::int("min_samples_split", Some(2), 2, 20, "Minimum samples required to split a node"),
            ParamSpec::select("criterion", "gini", &["gini", "entropy"], "Split quality measure"),
        ],
        ModelFamily::LogisticRegression => vec![
            ParamSpec::float("C", 1.0, 0.001, 100.0, "Inverse regularization strength"),
            ParamSpec::int("max_iter", Some(500), 100, 2000, "Maximum solver iterations"),
            ParamSpec::select("solver", "lbfgs", &["lbfgs", "liblinear", "saga"], "Optimization algorithm"),
        ],
        ModelFamily::KNN => vec![
            ParamSpec::int("n_neighbors", Some(5), 1, 50, "Number of neighbors"),
            ParamSpec::select("weights", "uniform", &["uniform", "distance"], "Neighbor weighting"),
            ParamSpec::select(
                "algorithm",
                "auto",
                &["auto", "ball_tree", "kd_tree", "brute"],
                "Neighbor search algorithm",
            ),
        ],
        ModelFamily::NaiveBayes => vec![ParamSpec::float(
            "var_smoothing",
            1e-9,
            1e-12,
            1e-3,
            "Portion of the largest variance added for stability",
        )],
    }
}

/// Parameter table keyed by name, as served over the API
pub fn specification_json(family: ModelFamily) -> Value {
    let map: Map<String, Value> = specification(family)
        .iter()
        .map(|spec| (spec.name.to_string(), spec.to_json()))
        .collect();
    Value::Object(map)
}

fn is_unset(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s == "None",
        _ => false,
    }
}

/// Drop unset values and validate the rest against the family's table.
///
/// Besides the tabulated parameters, `random_state` is accepted for seeded
/// families and `probability` for SVM.
pub fn clean_hyperparameters(family: ModelFamily, raw: &Map<String, Value>) -> Result<Map<String, Value>> {
    let spec = specification(family);
    let mut cleaned = Map::new();

    for (name, value) in raw {
        if is_unset(value) {
            continue;
        }
        match name.as_str() {
            "random_state" if family.is_seeded() => {
                if as_integer(value).map_or(true, |v| v < 0) {
                    return Err(ExoError::invalid_param(name, value, "must be a non-negative integer"));
                }
            }
            "probability" if family == ModelFamily::SVM => {
                if !value.is_boolean() {
                    return Err(ExoError::invalid_param(name, value, "must be a boolean"));
                }
            }
            _ => match spec.iter().find(|p| p.name == name) {
                Some(param) => param.check(value)?,
                None => {
                    return Err(ExoError::invalid_param(
                        name,
                        value,
                        format!("unknown parameter for {}", family),
                    ))
                }
            },
        }
        cleaned.insert(name.clone(), value.clone());
    }

    Ok(cleaned)
}

/// Typed lookups over cleaned hyperparameters
pub(crate) struct Params<'a>(pub &'a Map<String, Value>);

impl Params<'_> {
    pub fn usize(&self, name: &str) -> Option<usize> {
        self.0.get(name).and_then(as_integer).and_then(|v| usize::try_from(v).ok())
    }

    pub fn f64(&self, name: &str) -> Option<f64> {
        self.0.get(name).and_then(Value::as_f64)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.0.get(name).and_then(Value::as_bool)
    }

    pub fn seed(&self) -> u64 {
        self.usize("random_state").map_or(DEFAULT_RANDOM_STATE, |v| v as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_every_family_has_parameters() {
        for family in ModelFamily::ALL {
            assert!(!specification(family).is_empty(), "{} has no parameters", family);
            assert_eq!(family.as_str().parse::<ModelFamily>().unwrap(), family);
        }
    }

    #[test]
    fn test_unknown_family() {
        assert!(matches!(
            "Transformer".parse::<ModelFamily>(),
            Err(ExoError::UnknownModelFamily(_))
        ));
    }

    #[test]
    fn test_none_values_dropped() {
        let raw = map(json!({"max_depth": null, "max_features": "None", "n_estimators": 50}));
        let cleaned = clean_hyperparameters(ModelFamily::RandomForest, &raw).unwrap();
        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned["n_estimators"], json!(50));
    }

    #[test]
    fn test_out_of_bounds_rejected() {
        let raw = map(json!({"n_estimators": 5000}));
        let result = clean_hyperparameters(ModelFamily::RandomForest, &raw);
        assert!(matches!(result, Err(ExoError::InvalidParameter { .. })));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let raw = map(json!({"n_estimators": 10}));
        assert!(clean_hyperparameters(ModelFamily::NaiveBayes, &raw).is_err());
    }

    #[test]
    fn test_select_and_extra_keys() {
        let raw = map(json!({"kernel": "linear", "probability": false, "random_state": 7}));
        assert!(clean_hyperparameters(ModelFamily::SVM, &raw).is_ok());

        let bad = map(json!({"kernel": "cubic"}));
        assert!(clean_hyperparameters(ModelFamily::SVM, &bad).is_err());

        let seeded_knn = map(json!({"random_state": 7}));
        assert!(clean_hyperparameters(ModelFamily::KNN, &seeded_knn).is_err());
    }

    #[test]
    fn test_integral_float_accepted_as_int() {
        let raw = map(json!({"n_neighbors": 7.0}));
        let cleaned = clean_hyperparameters(ModelFamily::KNN, &raw).unwrap();
        assert_eq!(Params(&cleaned).usize("n_neighbors"), Some(7));
    }

    #[test]
    fn test_specification_json_shape() {
        let spec = specification_json(ModelFamily::GradientBoosting);
        assert_eq!(spec["learning_rate"]["type"], "float");
        assert_eq!(spec["learning_rate"]["default"], json!(0.1));
        let rf = specification_json(ModelFamily::RandomForest);
        assert_eq!(rf["max_depth"]["default"], Value::Null);
        assert_eq!(rf["max_features"]["options"], json!(["sqrt", "log2", "None"]));
    }
}
