//! Prediction and single-example training on top of the shared parameter
//! store.
//!
//! Raw pixel intensities arrive in 0..=255 and are scaled to [0, 1] here, so
//! the engine only ever sees normalized `784 x 1` columns.

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::error::{DigitError, Result};
use crate::ml::{engine, Matrix, INPUT_DIM, NUM_CLASSES};
use crate::persistence::ParameterStore;

/// Maximum raw pixel intensity.
pub const PIXEL_SCALE: f64 = 255.0;

#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub class: usize,
    pub probabilities: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainOutcome {
    pub label: usize,
    /// Class predicted by the parameters the step started from.
    pub prediction_before: usize,
    pub label_probability_before: f64,
    pub label_probability_after: f64,
    pub persisted: bool,
    pub version: u64,
}

/// Validate a raw image and turn it into a normalized input column.
pub fn normalize_image(pixels: &[f64]) -> Result<Matrix> {
    if pixels.len() != INPUT_DIM {
        return Err(DigitError::InvalidInput(format!(
            "image must contain exactly {INPUT_DIM} values, got {}",
            pixels.len()
        )));
    }
    if let Some(idx) = pixels.iter().position(|v| !v.is_finite()) {
        return Err(DigitError::InvalidInput(format!(
            "image value at index {idx} is not a finite number"
        )));
    }
    Ok(Matrix::column(
        pixels.iter().map(|v| v / PIXEL_SCALE).collect(),
    ))
}

fn validate_label(label: i64) -> Result<usize> {
    usize::try_from(label)
        .ok()
        .filter(|&l| l < NUM_CLASSES)
        .ok_or(DigitError::InvalidLabel(label))
}

#[derive(Clone)]
pub struct ClassifierService {
    store: Arc<ParameterStore>,
    learning_rate: f64,
}

impl ClassifierService {
    pub fn new(store: Arc<ParameterStore>, learning_rate: f64) -> Self {
        Self {
            store,
            learning_rate,
        }
    }

    pub fn store(&self) -> &Arc<ParameterStore> {
        &self.store
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub async fn predict(&self, pixels: &[f64]) -> Result<Prediction> {
        let started = Instant::now();
        let x = normalize_image(pixels)?;
        let params = self.store.snapshot().await;

        let act = engine::forward(&params, &x)?;
        let class = engine::predict(&act.a2);

        info!(
            class,
            confidence = act.a2.get(class, 0),
            latency_us = started.elapsed().as_micros() as u64,
            "prediction served"
        );
        Ok(Prediction {
            class,
            probabilities: act.a2.as_slice().to_vec(),
        })
    }

    /// One gradient descent step on `(pixels, label)`, committed atomically.
    pub async fn train(&self, pixels: &[f64], label: i64) -> Result<TrainOutcome> {
        let started = Instant::now();
        let label_idx = validate_label(label)?;
        let x = normalize_image(pixels)?;
        let alpha = self.learning_rate;

        let committed = self
            .store
            .apply(|params| {
                let step = engine::train_step(params, &x, label, alpha)?;
                let after = engine::forward(&step.params, &x)?;
                let stats = (
                    engine::predict(&step.before.a2),
                    step.before.a2.get(label_idx, 0),
                    after.a2.get(label_idx, 0),
                );
                Ok((step.params, stats))
            })
            .await?;

        let (prediction_before, before, after) = committed.value;
        info!(
            label = label_idx,
            prediction_before,
            p_before = before,
            p_after = after,
            persisted = committed.persisted,
            version = committed.version,
            latency_us = started.elapsed().as_micros() as u64,
            "trained on one sample"
        );

        Ok(TrainOutcome {
            label: label_idx,
            prediction_before,
            label_probability_before: before,
            label_probability_after: after,
            persisted: committed.persisted,
            version: committed.version,
        })
    }
}
