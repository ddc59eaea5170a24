//! Forward/backward propagation and the gradient-descent update for the
//! 784 -> H -> 10 classifier.
//!
//! Every function here is pure: inputs are borrowed, results are new values,
//! nothing is cached between calls. Batch size is always one example, so no
//! `1/m` averaging is applied to the gradients.

use crate::error::{DigitError, Result};
use crate::ml::params::{Parameters, NUM_CLASSES};
use crate::ml::tensor::Matrix;

/// Intermediate values of one forward pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Activations {
    pub z1: Matrix,
    pub a1: Matrix,
    pub z2: Matrix,
    /// Class distribution (`10 x 1`, sums to 1).
    pub a2: Matrix,
}

/// Gradients of the cross-entropy loss w.r.t. each parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradients {
    pub dw1: Matrix,
    pub db1: Matrix,
    pub dw2: Matrix,
    pub db2: Matrix,
}

/// Result of [`train_step`]: the updated set plus the pre-update forward pass.
#[derive(Debug, Clone)]
pub struct TrainStep {
    pub params: Parameters,
    pub before: Activations,
}

/// `max(z, 0)`; NaN passes through so bad inputs surface as numeric errors.
pub fn relu(z: &Matrix) -> Matrix {
    z.map(|v| if v < 0.0 { 0.0 } else { v })
}

pub fn relu_deriv(z: &Matrix) -> Matrix {
    z.map(|v| if v > 0.0 { 1.0 } else { 0.0 })
}

/// Softmax over the whole vector.
///
/// The max logit is subtracted first; for finite inputs this only changes
/// rounding, and it keeps `exp` from overflowing on large logits.
pub fn softmax(z: &Matrix) -> Matrix {
    let max = z
        .as_slice()
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    let shift = if max.is_finite() { max } else { 0.0 };
    let exp = z.map(|v| (v - shift).exp());
    let sum: f64 = exp.as_slice().iter().sum();
    exp.map(|v| v / sum)
}

/// `Z1 = W1·X + b1`, `A1 = ReLU(Z1)`, `Z2 = W2·A1 + b2`, `A2 = softmax(Z2)`.
pub fn forward(params: &Parameters, x: &Matrix) -> Result<Activations> {
    let expected = (params.w1.cols(), 1);
    if x.shape() != expected {
        return Err(DigitError::InvalidInput(format!(
            "input shape {:?} != {:?}",
            x.shape(),
            expected
        )));
    }

    let z1 = params.w1.dot(x)?.add(&params.b1)?;
    let a1 = relu(&z1);
    let z2 = params.w2.dot(&a1)?.add(&params.b2)?;
    let a2 = softmax(&z2);

    if !a2.is_finite() {
        return Err(DigitError::Numeric(
            "forward pass produced non-finite probabilities".to_string(),
        ));
    }

    Ok(Activations { z1, a1, z2, a2 })
}

/// Index of the largest entry; ties go to the lowest index.
pub fn predict(a2: &Matrix) -> usize {
    let values = a2.as_slice();
    let mut best = 0;
    for (idx, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = idx;
        }
    }
    best
}

/// A `10 x 1` column with a single 1 at `label`.
pub fn one_hot(label: i64) -> Result<Matrix> {
    let idx = usize::try_from(label)
        .ok()
        .filter(|&i| i < NUM_CLASSES)
        .ok_or(DigitError::InvalidLabel(label))?;
    let mut values = vec![0.0; NUM_CLASSES];
    values[idx] = 1.0;
    Ok(Matrix::column(values))
}

pub fn backward(
    act: &Activations,
    params: &Parameters,
    x: &Matrix,
    label: i64,
) -> Result<Gradients> {
    let target = one_hot(label)?;

    let dz2 = act.a2.sub(&target)?;
    let dw2 = dz2.dot(&act.a1.transpose())?;
    let db2 = dz2.sum_cols();

    let dz1 = params
        .w2
        .transpose()
        .dot(&dz2)?
        .hadamard(&relu_deriv(&act.z1))?;
    let dw1 = dz1.dot(&x.transpose())?;
    let db1 = dz1.sum_cols();

    let grads = Gradients { dw1, db1, dw2, db2 };
    if ![&grads.dw1, &grads.db1, &grads.dw2, &grads.db2]
        .iter()
        .all(|g| g.is_finite())
    {
        return Err(DigitError::Numeric(
            "backward pass produced non-finite gradients".to_string(),
        ));
    }
    Ok(grads)
}

/// `p <- p - alpha * dp` for every parameter, returning a new set.
///
/// `alpha` is trusted to be finite and positive.
pub fn update(params: &Parameters, grads: &Gradients, alpha: f64) -> Result<Parameters> {
    Ok(Parameters {
        w1: params.w1.sub_scaled(&grads.dw1, alpha)?,
        b1: params.b1.sub_scaled(&grads.db1, alpha)?,
        w2: params.w2.sub_scaled(&grads.dw2, alpha)?,
        b2: params.b2.sub_scaled(&grads.db2, alpha)?,
    })
}

/// One single-example gradient descent step.
pub fn train_step(params: &Parameters, x: &Matrix, label: i64, alpha: f64) -> Result<TrainStep> {
    let before = forward(params, x)?;
    let grads = backward(&before, params, x, label)?;
    let params = update(params, &grads, alpha)?;
    Ok(TrainStep { params, before })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::params::INPUT_DIM;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn col(values: &[f64]) -> Matrix {
        Matrix::column(values.to_vec())
    }

    fn rows(values: Vec<Vec<f64>>) -> Matrix {
        Matrix::from_rows(values).unwrap()
    }

    /// 3 inputs, 2 hidden units (the second one inactive), 10 outputs.
    fn tiny_network() -> (Parameters, Matrix) {
        let w1 = rows(vec![vec![0.2, -0.3, 0.4], vec![-0.5, 0.1, -0.2]]);
        let b1 = col(&[0.1, 0.05]);
        let w2 = rows(
            (0..NUM_CLASSES)
                .map(|k| vec![0.1 * k as f64 - 0.4, 0.05 * (k % 3) as f64])
                .collect(),
        );
        let b2 = col(&(0..NUM_CLASSES).map(|k| 0.01 * k as f64).collect::<Vec<_>>());
        let x = col(&[0.5, -1.0, 2.0]);
        (Parameters { w1, b1, w2, b2 }, x)
    }

    fn loss(params: &Parameters, x: &Matrix, label: usize) -> f64 {
        -forward(params, x).unwrap().a2.get(label, 0).ln()
    }

    fn seeded_params(hidden: usize) -> Parameters {
        let mut rng = StdRng::seed_from_u64(42);
        let mut params = Parameters::random(hidden, &mut rng).unwrap();
        params.w1 = params.w1.map(|v| v * 0.01);
        params
    }

    #[test]
    fn softmax_of_zero_input_sums_to_one() {
        let params = seeded_params(16);
        let x = Matrix::zeros(INPUT_DIM, 1);
        let act = forward(&params, &x).unwrap();
        let sum: f64 = act.a2.as_slice().iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert_eq!(act.a2.shape(), (NUM_CLASSES, 1));
    }

    #[test]
    fn softmax_matches_unshifted_formula_for_normal_inputs() {
        let z = col(&[0.3, -1.2, 2.5, 0.0]);
        let denom: f64 = z.as_slice().iter().map(|v| v.exp()).sum();
        let naive: Vec<f64> = z.as_slice().iter().map(|v| v.exp() / denom).collect();
        let stable = softmax(&z);
        for (a, b) in stable.as_slice().iter().zip(&naive) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn softmax_survives_huge_logits() {
        let p = softmax(&col(&[1000.0, 0.0, -1000.0]));
        assert!(p.is_finite());
        assert!((p.get(0, 0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn predict_picks_unique_max() {
        let a2 = col(&[0.05, 0.05, 0.1, 0.02, 0.5, 0.08, 0.05, 0.05, 0.05, 0.05]);
        assert_eq!(predict(&a2), 4);
    }

    #[test]
    fn predict_breaks_ties_to_lowest_index() {
        let a2 = col(&[0.1, 0.3, 0.1, 0.3, 0.2, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(predict(&a2), 1);
    }

    #[test]
    fn one_hot_places_single_one() {
        for label in [3_i64, 9] {
            let v = one_hot(label).unwrap();
            assert_eq!(v.shape(), (NUM_CLASSES, 1));
            for (idx, &value) in v.as_slice().iter().enumerate() {
                let expected = if idx as i64 == label { 1.0 } else { 0.0 };
                assert_eq!(value, expected);
            }
        }
    }

    #[test]
    fn one_hot_rejects_out_of_range() {
        assert!(matches!(one_hot(10), Err(DigitError::InvalidLabel(10))));
        assert!(matches!(one_hot(-1), Err(DigitError::InvalidLabel(-1))));
    }

    #[test]
    fn forward_is_deterministic() {
        let params = seeded_params(8);
        let x = Matrix::column((0..INPUT_DIM).map(|i| (i % 7) as f64 / 7.0).collect());
        let first = forward(&params, &x).unwrap();
        let second = forward(&params, &x).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn forward_rejects_wrong_input_length() {
        let params = seeded_params(4);
        let x = Matrix::zeros(700, 1);
        assert!(matches!(
            forward(&params, &x),
            Err(DigitError::InvalidInput(_))
        ));
    }

    #[test]
    fn forward_reports_non_finite_output() {
        let (params, _) = tiny_network();
        let x = col(&[f64::NAN, 0.0, 0.0]);
        assert!(matches!(forward(&params, &x), Err(DigitError::Numeric(_))));
    }

    #[test]
    fn backward_matches_hand_derivation() {
        let (params, x) = tiny_network();
        let label = 2;
        let act = forward(&params, &x).unwrap();
        let grads = backward(&act, &params, &x, label).unwrap();

        // z1 = [1.3, -0.7]: only the first hidden unit is active.
        assert!((act.z1.get(0, 0) - 1.3).abs() < 1e-12);
        assert!((act.z1.get(1, 0) + 0.7).abs() < 1e-12);

        for k in 0..NUM_CLASSES {
            let target = if k as i64 == label { 1.0 } else { 0.0 };
            let dz2 = act.a2.get(k, 0) - target;
            assert!((grads.db2.get(k, 0) - dz2).abs() < 1e-12);
            assert!((grads.dw2.get(k, 0) - dz2 * 1.3).abs() < 1e-12);
            assert_eq!(grads.dw2.get(k, 1), 0.0);
        }

        let dz1: f64 = (0..NUM_CLASSES)
            .map(|k| params.w2.get(k, 0) * grads.db2.get(k, 0))
            .sum();
        assert!((grads.db1.get(0, 0) - dz1).abs() < 1e-12);
        assert_eq!(grads.db1.get(1, 0), 0.0);
        for i in 0..3 {
            assert!((grads.dw1.get(0, i) - dz1 * x.get(i, 0)).abs() < 1e-12);
            assert_eq!(grads.dw1.get(1, i), 0.0);
        }
    }

    fn w1(p: &mut Parameters) -> &mut Matrix {
        &mut p.w1
    }

    fn b1(p: &mut Parameters) -> &mut Matrix {
        &mut p.b1
    }

    fn w2(p: &mut Parameters) -> &mut Matrix {
        &mut p.w2
    }

    fn b2(p: &mut Parameters) -> &mut Matrix {
        &mut p.b2
    }

    fn assert_close_to_numeric(
        params: &Parameters,
        x: &Matrix,
        label: usize,
        analytic: &Matrix,
        select: fn(&mut Parameters) -> &mut Matrix,
    ) {
        let eps = 1e-6;
        let (r, c) = analytic.shape();
        for i in 0..r {
            for j in 0..c {
                let nudge = |delta: f64| {
                    let mut p = params.clone();
                    let m = select(&mut p);
                    let mut data = m.as_slice().to_vec();
                    data[i * c + j] += delta;
                    *m = Matrix::from_vec(r, c, data).unwrap();
                    loss(&p, x, label)
                };
                let numeric = (nudge(eps) - nudge(-eps)) / (2.0 * eps);
                let expected = analytic.get(i, j);
                assert!(
                    (numeric - expected).abs() < 1e-5,
                    "({i},{j}): numeric {numeric} vs analytic {expected}"
                );
            }
        }
    }

    #[test]
    fn backward_agrees_with_finite_differences() {
        let (params, x) = tiny_network();
        let label = 7;
        let act = forward(&params, &x).unwrap();
        let grads = backward(&act, &params, &x, label as i64).unwrap();

        assert_close_to_numeric(&params, &x, label, &grads.dw1, w1);
        assert_close_to_numeric(&params, &x, label, &grads.db1, b1);
        assert_close_to_numeric(&params, &x, label, &grads.dw2, w2);
        assert_close_to_numeric(&params, &x, label, &grads.db2, b2);
    }

    #[test]
    fn backward_does_not_mutate_inputs() {
        let (params, x) = tiny_network();
        let snapshot = params.clone();
        let act = forward(&params, &x).unwrap();
        let act_snapshot = act.clone();
        backward(&act, &params, &x, 0).unwrap();
        assert_eq!(params, snapshot);
        assert_eq!(act, act_snapshot);
    }

    #[test]
    fn update_with_zero_alpha_is_identity() {
        let (params, x) = tiny_network();
        let act = forward(&params, &x).unwrap();
        let grads = backward(&act, &params, &x, 4).unwrap();
        let updated = update(&params, &grads, 0.0).unwrap();
        assert_eq!(updated, params);
    }

    #[test]
    fn update_moves_against_gradient() {
        let (params, x) = tiny_network();
        let act = forward(&params, &x).unwrap();
        let grads = backward(&act, &params, &x, 4).unwrap();
        let updated = update(&params, &grads, 0.5).unwrap();
        let expected = params.b2.get(4, 0) - 0.5 * grads.db2.get(4, 0);
        assert_eq!(updated.b2.get(4, 0), expected);
        assert!(updated.b2.get(4, 0) > params.b2.get(4, 0));
    }

    #[test]
    fn train_step_raises_target_probability() {
        let params = seeded_params(10);
        let mut pixels = vec![0.0; INPUT_DIM];
        for idx in (300..310).chain(400..405) {
            pixels[idx] = 1.0;
        }
        let x = Matrix::column(pixels);

        let step = train_step(&params, &x, 5, 0.1).unwrap();
        let after = forward(&step.params, &x).unwrap();
        assert!(after.a2.get(5, 0) > step.before.a2.get(5, 0));
    }
}
