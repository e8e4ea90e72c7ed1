use serde::Deserialize;
use std::{fs, path::Path};
use thiserror::Error;
use tracing::{info, warn};
use trip_features::{FeatureVector, SchemaCatalog};

/// The scoring contract the server depends on.
pub trait Scorer: Send + Sync {
    fn score(&self, features: &FeatureVector) -> Result<f64, ModelError>;
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to read model: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse model JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unsupported booster {0:?}, only gbtree is supported")]
    UnsupportedBooster(String),

    #[error("unsupported objective {0:?}")]
    UnsupportedObjective(String),

    #[error("malformed model: {0}")]
    Malformed(String),

    #[error("feature length mismatch: got {got}, expected {expected}")]
    FeatureCount { expected: usize, got: usize },

    #[error("model feature {index} is {model:?} but schema has {schema:?}")]
    FeatureName {
        index: usize,
        model: String,
        schema: String,
    },
}

// Objectives whose prediction is the raw margin.
const IDENTITY_OBJECTIVES: [&str; 4] = [
    "reg:squarederror",
    "reg:squaredlogerror",
    "reg:absoluteerror",
    "reg:pseudohubererror",
];

// ---------- XGBoost JSON layout ----------

#[derive(Deserialize)]
struct ModelJson {
    learner: LearnerJson,
}

#[derive(Deserialize)]
struct LearnerJson {
    #[serde(default)]
    feature_names: Vec<String>,
    gradient_booster: BoosterJson,
    learner_model_param: LearnerParamJson,
    objective: ObjectiveJson,
}

#[derive(Deserialize)]
struct BoosterJson {
    name: String,
    model: Option<GbTreeJson>,
}

#[derive(Deserialize)]
struct GbTreeJson {
    trees: Vec<TreeJson>,
}

#[derive(Deserialize)]
struct TreeJson {
    left_children: Vec<i32>,
    right_children: Vec<i32>,
    split_indices: Vec<u32>,
    split_conditions: Vec<f32>,
    default_left: Vec<Flag>,
    #[serde(default)]
    split_type: Vec<u8>,
}

// Older dumps write 0/1, newer ones write booleans.
#[derive(Deserialize, Clone, Copy)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(u8),
}

impl Flag {
    fn get(self) -> bool {
        match self {
            Flag::Bool(b) => b,
            Flag::Int(i) => i != 0,
        }
    }
}

#[derive(Deserialize)]
struct LearnerParamJson {
    base_score: String,
    num_feature: String,
}

#[derive(Deserialize)]
struct ObjectiveJson {
    name: String,
}

// ---------- Evaluated form ----------

#[derive(Debug, Clone, Copy)]
enum Node {
    Split {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
        default_left: bool,
    },
    Leaf(f32),
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn from_json(t: TreeJson, num_feature: usize, tree_idx: usize) -> Result<Self, ModelError> {
        let n = t.left_children.len();
        if [
            t.right_children.len(),
            t.split_indices.len(),
            t.split_conditions.len(),
            t.default_left.len(),
        ]
        .iter()
        .any(|&len| len != n)
            || n == 0
        {
            return Err(ModelError::Malformed(format!(
                "tree {} has inconsistent node arrays",
                tree_idx
            )));
        }
        if t.split_type.iter().any(|&s| s != 0) {
            return Err(ModelError::Malformed(format!(
                "tree {} uses categorical splits",
                tree_idx
            )));
        }

        let mut nodes = Vec::with_capacity(n);
        for i in 0..n {
            let (l, r) = (t.left_children[i], t.right_children[i]);
            if l == -1 {
                nodes.push(Node::Leaf(t.split_conditions[i]));
                continue;
            }
            // children always come after their parent, which rules out cycles
            let child = |c: i32| -> Result<usize, ModelError> {
                usize::try_from(c)
                    .ok()
                    .filter(|&c| c > i && c < n)
                    .ok_or_else(|| {
                        ModelError::Malformed(format!("tree {} node {} has bad child {}", tree_idx, i, c))
                    })
            };
            let feature = t.split_indices[i] as usize;
            if feature >= num_feature {
                return Err(ModelError::Malformed(format!(
                    "tree {} node {} splits on feature {} of {}",
                    tree_idx, i, feature, num_feature
                )));
            }
            nodes.push(Node::Split {
                feature,
                threshold: t.split_conditions[i],
                left: child(l)?,
                right: child(r)?,
                default_left: t.default_left[i].get(),
            });
        }
        Ok(Self { nodes })
    }

    fn leaf_value(&self, x: &[f32]) -> f32 {
        let mut idx = 0;
        loop {
            match self.nodes[idx] {
                Node::Leaf(v) => return v,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    default_left,
                } => {
                    let v = x[feature];
                    idx = if v.is_nan() {
                        if default_left {
                            left
                        } else {
                            right
                        }
                    } else if v < threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }
}

/// Gradient-boosted regression trees loaded from an XGBoost JSON model.
#[derive(Debug, Clone)]
pub struct XgbModel {
    trees: Vec<Tree>,
    base_score: f32,
    pub num_feature: usize,
    pub feature_names: Vec<String>,
    pub objective: String,
}

fn parse_param<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, ModelError> {
    // xgboost >= 2 wraps scalars as "[1.5E1]"
    let s = raw.trim().trim_start_matches('[').trim_end_matches(']');
    s.parse()
        .map_err(|_| ModelError::Malformed(format!("{} is not numeric: {:?}", name, raw)))
}

impl XgbModel {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let txt = fs::read_to_string(path)?;
        let model = Self::from_json(&txt)?;
        info!(
            "loaded {} trees from {} (objective={}, num_feature={})",
            model.trees.len(),
            path.display(),
            model.objective,
            model.num_feature
        );
        Ok(model)
    }

    pub fn from_json(txt: &str) -> Result<Self, ModelError> {
        let json: ModelJson = serde_json::from_str(txt)?;
        let learner = json.learner;

        if learner.gradient_booster.name != "gbtree" {
            return Err(ModelError::UnsupportedBooster(learner.gradient_booster.name));
        }
        let objective = learner.objective.name;
        if !IDENTITY_OBJECTIVES.contains(&objective.as_str()) {
            return Err(ModelError::UnsupportedObjective(objective));
        }

        let num_feature: usize =
            parse_param("num_feature", &learner.learner_model_param.num_feature)?;
        let base_score: f32 = parse_param("base_score", &learner.learner_model_param.base_score)?;

        let trees = learner
            .gradient_booster
            .model
            .ok_or_else(|| ModelError::Malformed("gbtree has no model".into()))?
            .trees
            .into_iter()
            .enumerate()
            .map(|(i, t)| Tree::from_json(t, num_feature, i))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            trees,
            base_score,
            num_feature,
            feature_names: learner.feature_names,
            objective,
        })
    }

    /// Startup guard: the model must have been trained on this exact layout.
    pub fn check_schema(&self, catalog: &SchemaCatalog) -> Result<(), ModelError> {
        if self.num_feature != catalog.len() {
            return Err(ModelError::FeatureCount {
                expected: self.num_feature,
                got: catalog.len(),
            });
        }
        if self.feature_names.is_empty() {
            warn!("model carries no feature names; relying on column count only");
            return Ok(());
        }
        for (index, (model, schema)) in self.feature_names.iter().zip(catalog.columns()).enumerate() {
            if model != schema {
                return Err(ModelError::FeatureName {
                    index,
                    model: model.clone(),
                    schema: schema.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn predict(&self, x: &[f64]) -> Result<f64, ModelError> {
        if x.len() != self.num_feature {
            return Err(ModelError::FeatureCount {
                expected: self.num_feature,
                got: x.len(),
            });
        }
        let x: Vec<f32> = x.iter().map(|&v| v as f32).collect();
        let margin = self
            .trees
            .iter()
            .fold(self.base_score, |acc, t| acc + t.leaf_value(&x));
        Ok(f64::from(margin))
    }
}

impl Scorer for XgbModel {
    fn score(&self, features: &FeatureVector) -> Result<f64, ModelError> {
        self.predict(features.values())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Two stumps over two features, in the layout xgboost's save_model writes.
    const MODEL: &str = r#"{
      "learner": {
        "attributes": {},
        "feature_names": ["trip_distance", "pickup_hour"],
        "feature_types": ["float", "float"],
        "gradient_booster": {
          "model": {
            "gbtree_model_param": {"num_parallel_tree": "1", "num_trees": "2"},
            "tree_info": [0, 0],
            "trees": [
              {
                "base_weights": [0.0, 1.0, 2.0],
                "categories": [], "categories_nodes": [], "categories_segments": [], "categories_sizes": [],
                "default_left": [1, 0, 0],
                "id": 0,
                "left_children": [1, -1, -1],
                "loss_changes": [1.0, 0.0, 0.0],
                "parents": [2147483647, 0, 0],
                "right_children": [2, -1, -1],
                "split_conditions": [2.5, 4.0, 10.0],
                "split_indices": [0, 0, 0],
                "split_type": [0, 0, 0],
                "sum_hessian": [3.0, 1.0, 2.0],
                "tree_param": {"num_deleted": "0", "num_feature": "2", "num_nodes": "3", "size_leaf_vector": "1"}
              },
              {
                "default_left": [false, false, false],
                "id": 1,
                "left_children": [1, -1, -1],
                "right_children": [2, -1, -1],
                "split_conditions": [7.0, -1.0, 3.0],
                "split_indices": [1, 0, 0]
              }
            ]
          },
          "name": "gbtree"
        },
        "learner_model_param": {"base_score": "[5E-1]", "boost_from_average": "1", "num_class": "0", "num_feature": "2", "num_target": "1"},
        "objective": {"name": "reg:squarederror", "reg_loss_param": {"scale_pos_weight": "1"}}
      },
      "version": [2, 0, 3]
    }"#;

    #[test]
    fn evaluates_trees() {
        let m = XgbModel::from_json(MODEL).unwrap();
        assert_eq!(m.num_feature, 2);
        // distance 1.0 < 2.5 -> 4.0; hour 8 >= 7 -> 3.0
        assert_eq!(m.predict(&[1.0, 8.0]).unwrap(), 0.5 + 4.0 + 3.0);
        // distance 3.0 -> 10.0; hour 6 -> -1.0
        assert_eq!(m.predict(&[3.0, 6.0]).unwrap(), 0.5 + 10.0 - 1.0);
        // NaN distance follows default_left
        assert_eq!(m.predict(&[f64::NAN, 6.0]).unwrap(), 0.5 + 4.0 - 1.0);
    }

    #[test]
    fn checks_schema_and_length() {
        let m = XgbModel::from_json(MODEL).unwrap();
        let ok = SchemaCatalog::from_header(["trip_distance", "pickup_hour"], "trip_time").unwrap();
        assert!(m.check_schema(&ok).is_ok());
        let swapped = SchemaCatalog::from_header(["pickup_hour", "trip_distance"], "trip_time").unwrap();
        assert!(matches!(
            m.check_schema(&swapped),
            Err(ModelError::FeatureName { index: 0, .. })
        ));
        assert!(matches!(
            m.predict(&[1.0]),
            Err(ModelError::FeatureCount { expected: 2, got: 1 })
        ));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xgb.json");
        std::fs::write(&path, MODEL).unwrap();
        let m = XgbModel::load(&path).unwrap();
        assert_eq!(m.feature_names, ["trip_distance", "pickup_hour"]);
        assert!(matches!(
            XgbModel::load(dir.path().join("missing.json")),
            Err(ModelError::Io(_))
        ));
    }

    #[test]
    fn rejects_unsupported_models() {
        let logistic = MODEL.replace("reg:squarederror", "binary:logistic");
        assert!(matches!(
            XgbModel::from_json(&logistic),
            Err(ModelError::UnsupportedObjective(_))
        ));
        let dart = MODEL.replace("\"gbtree\"", "\"dart\"");
        assert!(matches!(
            XgbModel::from_json(&dart),
            Err(ModelError::UnsupportedBooster(_))
        ));
        let cyclic = MODEL.replace("\"left_children\": [1, -1, -1]", "\"left_children\": [0, -1, -1]");
        assert!(matches!(XgbModel::from_json(&cyclic), Err(ModelError::Malformed(_))));
    }
}
