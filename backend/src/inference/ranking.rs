use std::cmp::Ordering;
use std::sync::Arc;

use super::InferenceError;
use super::labels::ClassLabels;
use crate::config::{OutputActivation, RankingConfig};

#[derive(Debug, Clone, PartialEq)]
pub struct RankedClass {
    pub index: usize,
    pub label: String,
    /// Percent, `probability * 100`.
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    pub predicted_index: usize,
    pub predicted_label: String,
    pub confidence: f32,
    pub ranked: Vec<RankedClass>,
    /// True when softmax was applied to the raw output.
    pub normalized: bool,
}

/// Non-negative, finite, and summing to one within `tolerance`.
pub fn is_probability_distribution(values: &[f32], tolerance: f32) -> bool {
    if values.is_empty() || values.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return false;
    }
    let sum: f64 = values.iter().map(|v| *v as f64).sum();
    (sum - 1.0).abs() <= tolerance as f64
}

/// Softmax with the maximum subtracted before exponentiation.
pub fn softmax(values: &[f32]) -> Vec<f32> {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = values.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Index of the largest value; the first one wins on ties.
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Indices of the `k` largest values, descending, ties by ascending index.
pub fn top_k(values: &[f32], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| {
        values[b]
            .partial_cmp(&values[a])
            .unwrap_or(Ordering::Equal)
            .then(a.cmp(&b))
    });
    order.truncate(k);
    order
}

pub struct Ranker {
    config: RankingConfig,
    labels: Arc<ClassLabels>,
}

impl Ranker {
    pub fn new(config: RankingConfig, labels: Arc<ClassLabels>) -> Self {
        Self { config, labels }
    }

    pub fn labels(&self) -> &ClassLabels {
        &self.labels
    }

    /// Returns the probability vector and whether softmax was applied.
    /// Softmax is applied at most once.
    pub fn probabilities(&self, raw: &[f32]) -> Result<(Vec<f32>, bool), InferenceError> {
        if let Some(i) = raw.iter().position(|v| !v.is_finite()) {
            return Err(InferenceError::Backend(format!(
                "classifier output {} is not finite ({})",
                i, raw[i]
            )));
        }

        let looks_normalized = is_probability_distribution(raw, self.config.tolerance);
        match self.config.output_activation {
            OutputActivation::Probabilities => {
                if !looks_normalized {
                    log::warn!(
                        "Output configured as probabilities but sums to {:.6}",
                        raw.iter().sum::<f32>()
                    );
                }
                Ok((raw.to_vec(), false))
            }
            OutputActivation::Logits => Ok((softmax(raw), true)),
            OutputActivation::Auto if looks_normalized => Ok((raw.to_vec(), false)),
            OutputActivation::Auto => Ok((softmax(raw), true)),
        }
    }

    pub fn rank(&self, raw: &[f32]) -> Result<PredictionResult, InferenceError> {
        if raw.len() != self.labels.len() {
            return Err(InferenceError::Configuration(format!(
                "classifier returned {} scores for {} labels",
                raw.len(),
                self.labels.len()
            )));
        }

        let (probs, normalized) = self.probabilities(raw)?;
        let predicted_index = argmax(&probs).ok_or_else(|| {
            InferenceError::Configuration("classifier returned no scores".to_string())
        })?;

        let ranked = top_k(&probs, self.config.top_k)
            .into_iter()
            .map(|i| self.ranked_class(i, probs[i]))
            .collect::<Result<Vec<_>, _>>()?;
        let top = self.ranked_class(predicted_index, probs[predicted_index])?;

        Ok(PredictionResult {
            predicted_index,
            predicted_label: top.label,
            confidence: top.confidence,
            ranked,
            normalized,
        })
    }

    fn ranked_class(&self, index: usize, probability: f32) -> Result<RankedClass, InferenceError> {
        let label = self.labels.get(index).ok_or_else(|| {
            InferenceError::Configuration(format!("no label for class index {}", index))
        })?;
        Ok(RankedClass {
            index,
            label: label.to_string(),
            confidence: probability * 100.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranker(n: usize, activation: OutputActivation) -> Ranker {
        let labels = ClassLabels::new((0..n).map(|i| format!("class_{}", i)).collect()).unwrap();
        Ranker::new(
            RankingConfig {
                output_activation: activation,
                ..RankingConfig::default()
            },
            Arc::new(labels),
        )
    }

    fn scenario_one() -> Vec<f32> {
        let mut v = vec![0.05f32; 16];
        v[5] = 0.25;
        v
    }

    #[test]
    fn normalized_output_is_used_as_is() {
        let result = ranker(16, OutputActivation::Auto).rank(&scenario_one()).unwrap();
        assert!(!result.normalized);
        assert_eq!(result.predicted_index, 5);
        assert_eq!(result.predicted_label, "class_5");
        assert!((result.confidence - 25.0).abs() < 1e-4);
        assert_eq!(result.ranked[0].index, 5);
        assert!((result.ranked[1].confidence - 5.0).abs() < 1e-4);
    }

    #[test]
    fn logits_are_normalized_exactly_once() {
        let logits = vec![1.0f32, 2.0, 3.0, 0.5, -1.0];
        let r = ranker(5, OutputActivation::Auto);
        let (probs, normalized) = r.probabilities(&logits).unwrap();
        assert!(normalized);
        assert_eq!(probs, softmax(&logits));
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);

        let result = r.rank(&logits).unwrap();
        assert_eq!(result.predicted_index, 2);
        let expected = 100.0 * 3.0f32.exp() / logits.iter().map(|v| v.exp()).sum::<f32>();
        assert!((result.confidence - expected).abs() < 1e-3);
    }

    #[test]
    fn probabilities_are_not_renormalized() {
        let probs = vec![0.7f32, 0.2, 0.1];
        let (out, normalized) = ranker(3, OutputActivation::Auto).probabilities(&probs).unwrap();
        assert!(!normalized);
        assert_eq!(out, probs);

        // a second softmax would flatten 0.7 to about 0.46
        let twice = softmax(&probs);
        assert!(twice[0] < 0.5);
    }

    #[test]
    fn tolerance_band_is_respected() {
        assert!(is_probability_distribution(&[0.5, 0.505], 1e-2));
        assert!(!is_probability_distribution(&[0.5, 0.52], 1e-2));
        assert!(!is_probability_distribution(&[1.2, -0.2], 1e-2));
        assert!(!is_probability_distribution(&[], 1e-2));
    }

    #[test]
    fn explicit_activation_overrides_detection() {
        // sums to one but the model emits logits
        let raw = vec![0.6f32, 0.4];
        let (_, normalized) = ranker(2, OutputActivation::Logits).probabilities(&raw).unwrap();
        assert!(normalized);

        // does not sum to one but the model is declared softmax
        let raw = vec![0.6f32, 0.6];
        let (out, normalized) = ranker(2, OutputActivation::Probabilities)
            .probabilities(&raw)
            .unwrap();
        assert!(!normalized);
        assert_eq!(out, raw);
    }

    #[test]
    fn ties_pick_lowest_index() {
        let raw = vec![0.1f32, 0.4, 0.1, 0.4];
        let r = ranker(4, OutputActivation::Auto);
        for _ in 0..10 {
            let result = r.rank(&raw).unwrap();
            assert_eq!(result.predicted_index, 1);
            let order: Vec<usize> = result.ranked.iter().map(|c| c.index).collect();
            assert_eq!(order, vec![1, 3, 0, 2]);
        }
    }

    #[test]
    fn top_five_of_sixteen_is_sorted() {
        let raw: Vec<f32> = (0..16).map(|i| ((i * 7) % 16) as f32).collect();
        let result = ranker(16, OutputActivation::Auto).rank(&raw).unwrap();
        assert_eq!(result.ranked.len(), 5);
        for pair in result.ranked.windows(2) {
            assert!(
                pair[0].confidence > pair[1].confidence
                    || (pair[0].confidence == pair[1].confidence && pair[0].index < pair[1].index)
            );
        }
        assert_eq!(result.ranked[0].index, result.predicted_index);
    }

    #[test]
    fn fewer_classes_than_k_returns_all() {
        let result = ranker(3, OutputActivation::Auto).rank(&[0.2, 0.5, 0.3]).unwrap();
        assert_eq!(result.ranked.len(), 3);
        assert_eq!(
            result.ranked.iter().map(|c| c.index).collect::<Vec<_>>(),
            vec![1, 2, 0]
        );
    }

    #[test]
    fn length_mismatch_is_configuration_error() {
        let err = ranker(15, OutputActivation::Auto).rank(&scenario_one()).unwrap_err();
        assert!(matches!(err, InferenceError::Configuration(_)));
    }

    #[test]
    fn non_finite_output_is_rejected() {
        let err = ranker(2, OutputActivation::Auto)
            .rank(&[f32::NAN, 0.5])
            .unwrap_err();
        assert!(matches!(err, InferenceError::Backend(_)));
    }

    #[test]
    fn softmax_is_stable_for_large_logits() {
        let probs = softmax(&[1000.0, 1001.0]);
        assert!(probs.iter().all(|p| p.is_finite()));
        assert!(probs[1] > probs[0]);
    }
}
