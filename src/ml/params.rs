//! The classifier's parameter set: `W1 (H x 784)`, `b1 (H x 1)`,
//! `W2 (10 x H)`, `b2 (10 x 1)`.
//!
//! Shapes are validated once when a set is built or loaded; the engine
//! relies on them afterwards.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{DigitError, Result};
use crate::ml::tensor::Matrix;

/// Pixels per input image (28 x 28).
pub const INPUT_DIM: usize = 784;

/// Output classes (digits 0-9).
pub const NUM_CLASSES: usize = 10;

const KEYS: [&str; 4] = ["W1", "b1", "W2", "b2"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    #[serde(rename = "W1")]
    pub w1: Matrix,
    #[serde(rename = "b1")]
    pub b1: Matrix,
    #[serde(rename = "W2")]
    pub w2: Matrix,
    #[serde(rename = "b2")]
    pub b2: Matrix,
}

/// Tensor shapes as `[rows, cols]`, reported by the model summary endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParameterShapes {
    #[serde(rename = "W1")]
    pub w1: [usize; 2],
    #[serde(rename = "b1")]
    pub b1: [usize; 2],
    #[serde(rename = "W2")]
    pub w2: [usize; 2],
    #[serde(rename = "b2")]
    pub b2: [usize; 2],
}

impl Parameters {
    /// Build a validated parameter set.
    pub fn new(w1: Matrix, b1: Matrix, w2: Matrix, b2: Matrix) -> Result<Self> {
        let params = Self { w1, b1, w2, b2 };
        params.validate().map_err(DigitError::Schema)?;
        Ok(params)
    }

    /// Fresh parameters with every entry uniform in `[-0.5, 0.5)`.
    pub fn random<R: Rng + ?Sized>(hidden: usize, rng: &mut R) -> Result<Self> {
        if hidden == 0 {
            return Err(DigitError::InvalidInput(
                "hidden layer width must be > 0".to_string(),
            ));
        }
        let mut sample = |rows: usize, cols: usize| {
            let data = (0..rows * cols).map(|_| rng.gen::<f64>() - 0.5).collect();
            Matrix::from_vec(rows, cols, data)
        };
        let w1 = sample(hidden, INPUT_DIM)?;
        let b1 = sample(hidden, 1)?;
        let w2 = sample(NUM_CLASSES, hidden)?;
        let b2 = sample(NUM_CLASSES, 1)?;
        Self::new(w1, b1, w2, b2)
    }

    /// Decode the persisted record `{"W1": .., "b1": .., "W2": .., "b2": ..}`.
    ///
    /// Missing or unknown keys, non-numeric or ragged arrays and inconsistent
    /// shapes are all reported as [`DigitError::Schema`].
    pub fn from_json_value(value: serde_json::Value) -> Result<Self> {
        let serde_json::Value::Object(mut record) = value else {
            return Err(DigitError::Schema(
                "model record must be a JSON object".to_string(),
            ));
        };

        let mut tensors = Vec::with_capacity(KEYS.len());
        for key in KEYS {
            let raw = record
                .remove(key)
                .ok_or_else(|| DigitError::Schema(format!("missing key \"{key}\"")))?;
            let tensor: Matrix = serde_json::from_value(raw)
                .map_err(|e| DigitError::Schema(format!("\"{key}\" is not a numeric array: {e}")))?;
            tensors.push(tensor);
        }
        if let Some(extra) = record.keys().next() {
            return Err(DigitError::Schema(format!("unexpected key \"{extra}\"")));
        }

        let mut it = tensors.into_iter();
        match (it.next(), it.next(), it.next(), it.next()) {
            (Some(w1), Some(b1), Some(w2), Some(b2)) => Self::new(w1, b1, w2, b2),
            _ => Err(DigitError::Internal("tensor count mismatch".to_string())),
        }
    }

    /// Hidden layer width `H`.
    pub fn hidden_units(&self) -> usize {
        self.w1.rows()
    }

    pub fn shapes(&self) -> ParameterShapes {
        let s = |m: &Matrix| [m.rows(), m.cols()];
        ParameterShapes {
            w1: s(&self.w1),
            b1: s(&self.b1),
            w2: s(&self.w2),
            b2: s(&self.b2),
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        let hidden = self.w1.rows();
        if hidden == 0 {
            return Err("W1 must have at least one row".to_string());
        }
        if self.w1.cols() != INPUT_DIM {
            return Err(format!(
                "W1 has {} columns, expected {INPUT_DIM}",
                self.w1.cols()
            ));
        }
        if self.b1.shape() != (hidden, 1) {
            return Err(format!(
                "b1 shape {:?} != ({hidden}, 1)",
                self.b1.shape()
            ));
        }
        if self.w2.shape() != (NUM_CLASSES, hidden) {
            return Err(format!(
                "W2 shape {:?} != ({NUM_CLASSES}, {hidden})",
                self.w2.shape()
            ));
        }
        if self.b2.shape() != (NUM_CLASSES, 1) {
            return Err(format!(
                "b2 shape {:?} != ({NUM_CLASSES}, 1)",
                self.b2.shape()
            ));
        }
        for (name, m) in [
            ("W1", &self.w1),
            ("b1", &self.b1),
            ("W2", &self.w2),
            ("b2", &self.b2),
        ] {
            if !m.is_finite() {
                return Err(format!("{name} contains non-finite values"));
            }
        }
        Ok(())
    }
}
