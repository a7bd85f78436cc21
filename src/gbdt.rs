use crate::config::GbdtParams;
use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Gradient-boosted regression: an ensemble of shallow regression trees fit
/// sequentially on residuals. Predictions are clamped at zero since the
/// target is a daily count.
#[derive(Debug, Clone)]
pub struct GbdtModel {
    params: GbdtParams,
    feature_names: Vec<String>,
    init_prediction: f64,
    trees: Vec<TreeNode>,
    /// Per-feature share of total variance reduction, summing to 1.
    importances: Vec<f64>,
}

#[derive(Debug, Clone)]
enum TreeNode {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    fn predict(&self, row: &[f64]) -> f64 {
        match self {
            TreeNode::Leaf { value } => *value,
            TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if row[*feature] <= *threshold {
                    left.predict(row)
                } else {
                    right.predict(row)
                }
            }
        }
    }
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

fn sum_sq_dev(sum: f64, sum_sq: f64, count: usize) -> f64 {
    sum_sq - sum * sum / count as f64
}

fn best_split(
    rows: &[Vec<f64>],
    residuals: &[f64],
    indices: &[usize],
    min_samples_leaf: usize,
) -> Option<SplitCandidate> {
    if indices.len() < 2 * min_samples_leaf {
        return None;
    }

    let total_sum: f64 = indices.iter().map(|&i| residuals[i]).sum();
    let total_sum_sq: f64 = indices.iter().map(|&i| residuals[i] * residuals[i]).sum();
    let parent_ssd = sum_sq_dev(total_sum, total_sum_sq, indices.len());

    let feature_count = rows[0].len();
    let mut best: Option<SplitCandidate> = None;

    for feature in 0..feature_count {
        let mut ordered: Vec<(f64, f64)> = indices
            .iter()
            .map(|&i| (rows[i][feature], residuals[i]))
            .collect();
        ordered.sort_unstable_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut left_sum = 0.0;
        let mut left_sum_sq = 0.0;
        for split_at in 1..ordered.len() {
            let (value, residual) = ordered[split_at - 1];
            left_sum += residual;
            left_sum_sq += residual * residual;

            let right_count = ordered.len() - split_at;
            if split_at < min_samples_leaf || right_count < min_samples_leaf {
                continue;
            }
            let next_value = ordered[split_at].0;
            if next_value <= value {
                continue;
            }

            let right_sum = total_sum - left_sum;
            let right_sum_sq = total_sum_sq - left_sum_sq;
            let gain = parent_ssd
                - sum_sq_dev(left_sum, left_sum_sq, split_at)
                - sum_sq_dev(right_sum, right_sum_sq, right_count);
            if gain <= 0.0 {
                continue;
            }
            if best.as_ref().map_or(true, |b| gain > b.gain) {
                best = Some(SplitCandidate {
                    feature,
                    threshold: (value + next_value) / 2.0,
                    gain,
                });
            }
        }
    }

    best
}

fn build_tree(
    rows: &[Vec<f64>],
    residuals: &[f64],
    indices: &[usize],
    depth: usize,
    params: &GbdtParams,
    gains: &mut [f64],
) -> TreeNode {
    let mean = if indices.is_empty() {
        0.0
    } else {
        indices.iter().map(|&i| residuals[i]).sum::<f64>() / indices.len() as f64
    };

    if depth >= params.max_depth {
        return TreeNode::Leaf { value: mean };
    }
    let Some(split) = best_split(rows, residuals, indices, params.min_samples_leaf) else {
        return TreeNode::Leaf { value: mean };
    };

    gains[split.feature] += split.gain;

    let (left, right): (Vec<usize>, Vec<usize>) = indices
        .iter()
        .copied()
        .partition(|&i| rows[i][split.feature] <= split.threshold);

    TreeNode::Split {
        feature: split.feature,
        threshold: split.threshold,
        left: Box::new(build_tree(rows, residuals, &left, depth + 1, params, gains)),
        right: Box::new(build_tree(rows, residuals, &right, depth + 1, params, gains)),
    }
}

impl GbdtModel {
    /// Fits the ensemble. Rows must share the feature layout named by
    /// `feature_names`; the fit is deterministic under a fixed seed.
    pub fn fit(
        rows: &[Vec<f64>],
        targets: &[f64],
        feature_names: &[&str],
        params: GbdtParams,
    ) -> Result<Self> {
        params.validate()?;
        if rows.is_empty() {
            return Err(anyhow!("cannot fit a model on zero rows"));
        }
        if rows.len() != targets.len() {
            return Err(anyhow!(
                "feature rows ({}) and targets ({}) differ in length",
                rows.len(),
                targets.len()
            ));
        }
        for row in rows {
            if row.len() != feature_names.len() {
                return Err(anyhow!(
                    "feature row width {} does not match schema width {}",
                    row.len(),
                    feature_names.len()
                ));
            }
        }

        let n = rows.len();
        let init_prediction = targets.iter().sum::<f64>() / n as f64;
        let mut predictions = vec![init_prediction; n];
        let mut residuals = vec![0.0; n];
        let mut gains = vec![0.0; feature_names.len()];
        let mut trees = Vec::with_capacity(params.n_trees);

        let mut rng = StdRng::seed_from_u64(params.seed);
        let sample_size = ((n as f64 * params.subsample).floor() as usize).clamp(1, n);

        for _ in 0..params.n_trees {
            for i in 0..n {
                residuals[i] = targets[i] - predictions[i];
            }

            let indices: Vec<usize> = if sample_size < n {
                rand::seq::index::sample(&mut rng, n, sample_size).into_vec()
            } else {
                (0..n).collect()
            };

            let tree = build_tree(rows, &residuals, &indices, 0, &params, &mut gains);
            for (i, row) in rows.iter().enumerate() {
                predictions[i] += params.learning_rate * tree.predict(row);
            }
            trees.push(tree);
        }

        let total_gain: f64 = gains.iter().sum();
        let importances = if total_gain > 0.0 {
            gains.iter().map(|g| g / total_gain).collect()
        } else {
            vec![0.0; feature_names.len()]
        };

        Ok(Self {
            params,
            feature_names: feature_names.iter().map(|s| s.to_string()).collect(),
            init_prediction,
            trees,
            importances,
        })
    }

    /// Predicted daily lead count for one feature vector.
    pub fn predict(&self, row: &[f64]) -> Result<f64> {
        if row.len() != self.feature_names.len() {
            return Err(anyhow!(
                "feature vector width {} does not match the trained schema width {}",
                row.len(),
                self.feature_names.len()
            ));
        }
        let boosted: f64 = self
            .trees
            .iter()
            .map(|tree| tree.predict(row))
            .sum::<f64>();
        Ok((self.init_prediction + self.params.learning_rate * boosted).max(0.0))
    }

    pub fn predict_many(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        rows.iter().map(|row| self.predict(row)).collect()
    }

    /// Relative importance per feature, descending. Shares sum to 1 when any
    /// split happened.
    pub fn feature_importance(&self) -> Vec<(String, f64)> {
        let mut pairs: Vec<(String, f64)> = self
            .feature_names
            .iter()
            .cloned()
            .zip(self.importances.iter().copied())
            .collect();
        pairs.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        pairs
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_dataset() -> (Vec<Vec<f64>>, Vec<f64>) {
        // Target depends on the first feature only; the second is noise-free filler.
        let rows: Vec<Vec<f64>> = (0..120)
            .map(|i| vec![(i % 40) as f64, ((i * 7) % 11) as f64])
            .collect();
        let targets: Vec<f64> = rows.iter().map(|row| 3.0 * row[0] + 5.0).collect();
        (rows, targets)
    }

    #[test]
    fn fit_reduces_error_on_learnable_signal() {
        let (rows, targets) = toy_dataset();
        let model =
            GbdtModel::fit(&rows, &targets, &["signal", "filler"], GbdtParams::default()).unwrap();
        let predictions = model.predict_many(&rows).unwrap();
        let mae: f64 = predictions
            .iter()
            .zip(&targets)
            .map(|(p, t)| (p - t).abs())
            .sum::<f64>()
            / targets.len() as f64;
        let spread = targets.iter().cloned().fold(f64::MIN, f64::max)
            - targets.iter().cloned().fold(f64::MAX, f64::min);
        assert!(mae < spread * 0.1, "in-sample MAE too high: {mae}");
    }

    #[test]
    fn fit_is_deterministic_under_fixed_seed() {
        let (rows, targets) = toy_dataset();
        let params = GbdtParams::default();
        let a = GbdtModel::fit(&rows, &targets, &["signal", "filler"], params).unwrap();
        let b = GbdtModel::fit(&rows, &targets, &["signal", "filler"], params).unwrap();
        let probe = vec![17.0, 3.0];
        assert_eq!(a.predict(&probe).unwrap(), b.predict(&probe).unwrap());
    }

    #[test]
    fn importances_sum_to_one_and_rank_the_signal() {
        let (rows, targets) = toy_dataset();
        let model =
            GbdtModel::fit(&rows, &targets, &["signal", "filler"], GbdtParams::default()).unwrap();
        let importance = model.feature_importance();
        let total: f64 = importance.iter().map(|(_, v)| v).sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert_eq!(importance[0].0, "signal");
        assert!(importance[0].1 > 0.6);
    }

    #[test]
    fn predictions_never_go_negative() {
        let rows: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64]).collect();
        let targets: Vec<f64> = (0..40).map(|i| if i < 30 { 0.0 } else { 2.0 }).collect();
        let model = GbdtModel::fit(&rows, &targets, &["x"], GbdtParams::default()).unwrap();
        for row in &rows {
            assert!(model.predict(row).unwrap() >= 0.0);
        }
    }

    #[test]
    fn mismatched_vector_width_is_a_contract_violation() {
        let (rows, targets) = toy_dataset();
        let model =
            GbdtModel::fit(&rows, &targets, &["signal", "filler"], GbdtParams::default()).unwrap();
        assert!(model.predict(&[1.0]).is_err());
    }
}
