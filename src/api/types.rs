use serde::{Deserialize, Deserializer, Serialize};

use crate::ml::ParameterShapes;

// ============================================================================
// Inference Types
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct PredictRequest {
    /// 784 raw pixel intensities (0-255), row-major 28x28
    pub image: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    pub prediction: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrainRequest {
    pub image: Vec<f64>,
    /// Digit class; integral floats such as `5.0` are accepted
    #[serde(deserialize_with = "integral_label")]
    pub label: i64,
}

/// Range checks happen in the classifier so that `12` and `12.0` both
/// surface as an invalid label.
fn integral_label<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let number = serde_json::Number::deserialize(deserializer)?;
    if let Some(label) = number.as_i64() {
        return Ok(label);
    }
    match number.as_f64() {
        Some(v) if v.fract() == 0.0 && v.abs() <= i64::MAX as f64 / 2.0 => Ok(v as i64),
        _ => Err(D::Error::custom(format!(
            "label must be an integer, got {number}"
        ))),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainResponse {
    pub status: String,
    pub prediction_before: usize,
    pub persisted: bool,
}

// ============================================================================
// Model / Health Types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub hidden_units: usize,
    pub shapes: ParameterShapes,
    pub updates_applied: u64,
    pub persist_on_train: bool,
    pub learning_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub hidden_units: usize,
    pub updates_applied: u64,
    pub persist_on_train: bool,
    pub uptime_secs: i64,
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn label_of(value: serde_json::Value) -> Result<i64, serde_json::Error> {
        serde_json::from_value::<TrainRequest>(json!({ "image": [], "label": value }))
            .map(|req| req.label)
    }

    #[test]
    fn label_accepts_integral_floats() {
        assert_eq!(label_of(json!(5)).unwrap(), 5);
        assert_eq!(label_of(json!(5.0)).unwrap(), 5);
        assert_eq!(label_of(json!(12.0)).unwrap(), 12);
        assert_eq!(label_of(json!(-1.0)).unwrap(), -1);
    }

    #[test]
    fn label_rejects_fractions_and_non_numbers() {
        assert!(label_of(json!(5.5)).is_err());
        assert!(label_of(json!("5")).is_err());
        assert!(label_of(json!(1e300)).is_err());
    }
}
