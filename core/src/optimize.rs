//! Derivative-free minimisation (Nelder–Mead simplex).
//!
//! Deterministic: the same objective, start point and options always walk
//! the same path. Non-finite objective values are treated as +inf so the
//! simplex retreats from regions where a likelihood breaks down.

use crate::{
    config::OptimizerConfig,
    error::{ScoreError, ScoreResult},
    rng::{RngBank, RngSlot},
};

#[derive(Debug, Clone)]
pub struct NelderMeadOptions {
    pub max_iterations: usize,
    /// Convergence threshold on both the spread of objective values and
    /// the spread of vertices.
    pub tolerance: f64,
    /// Edge length of the initial simplex along each axis.
    pub initial_step: f64,
}

impl Default for NelderMeadOptions {
    fn default() -> Self {
        Self {
            max_iterations: 2000,
            tolerance: 1e-8,
            initial_step: 0.5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Minimum {
    pub x: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub converged: bool,
}

const REFLECT: f64 = 1.0;
const EXPAND: f64 = 2.0;
const CONTRACT: f64 = 0.5;
const SHRINK: f64 = 0.5;

pub fn nelder_mead<F>(mut objective: F, x0: &[f64], options: &NelderMeadOptions) -> Minimum
where
    F: FnMut(&[f64]) -> f64,
{
    let n = x0.len();
    let mut eval = |x: &[f64]| {
        let v = objective(x);
        if v.is_finite() { v } else { f64::INFINITY }
    };

    let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
    simplex.push(x0.to_vec());
    for k in 0..n {
        let mut vertex = x0.to_vec();
        vertex[k] += options.initial_step;
        simplex.push(vertex);
    }
    let mut values: Vec<f64> = simplex.iter().map(|v| eval(v)).collect();

    let mut iterations = 0;
    let mut converged = false;

    while iterations < options.max_iterations {
        // Order vertices best → worst. Stable sort keeps ties deterministic.
        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&i, &j| values[i].total_cmp(&values[j]));
        simplex = order.iter().map(|&i| simplex[i].clone()).collect();
        values = order.iter().map(|&i| values[i]).collect();

        let f_spread = values
            .iter()
            .skip(1)
            .map(|v| (v - values[0]).abs())
            .fold(0.0, f64::max);
        let x_spread = simplex
            .iter()
            .skip(1)
            .flat_map(|v| v.iter().zip(&simplex[0]).map(|(a, b)| (a - b).abs()))
            .fold(0.0, f64::max);
        if values[0].is_finite() && f_spread <= options.tolerance && x_spread <= options.tolerance {
            converged = true;
            break;
        }
        iterations += 1;

        let centroid: Vec<f64> = (0..n)
            .map(|k| simplex[..n].iter().map(|v| v[k]).sum::<f64>() / n as f64)
            .collect();
        let toward = |coef: f64, from: &[f64]| -> Vec<f64> {
            centroid
                .iter()
                .zip(from)
                .map(|(c, w)| c + coef * (c - w))
                .collect()
        };

        let worst = simplex[n].clone();
        let reflected = toward(REFLECT, &worst);
        let f_reflected = eval(&reflected);

        if f_reflected < values[0] {
            let expanded = toward(REFLECT * EXPAND, &worst);
            let f_expanded = eval(&expanded);
            if f_expanded < f_reflected {
                simplex[n] = expanded;
                values[n] = f_expanded;
            } else {
                simplex[n] = reflected;
                values[n] = f_reflected;
            }
            continue;
        }

        if f_reflected < values[n - 1] {
            simplex[n] = reflected;
            values[n] = f_reflected;
            continue;
        }

        let (contracted, f_contracted) = if f_reflected < values[n] {
            let outside = toward(REFLECT * CONTRACT, &worst);
            let f = eval(&outside);
            (outside, f)
        } else {
            let inside = toward(-CONTRACT, &worst);
            let f = eval(&inside);
            (inside, f)
        };

        if f_contracted < values[n].min(f_reflected) {
            simplex[n] = contracted;
            values[n] = f_contracted;
            continue;
        }

        // Shrink every vertex toward the best one.
        let best = simplex[0].clone();
        for i in 1..=n {
            let shrunk: Vec<f64> = best
                .iter()
                .zip(&simplex[i])
                .map(|(b, v)| b + SHRINK * (v - b))
                .collect();
            values[i] = eval(&shrunk);
            simplex[i] = shrunk;
        }
    }

    let best = (0..=n)
        .min_by(|&i, &j| values[i].total_cmp(&values[j]))
        .unwrap_or(0);
    Minimum {
        x: simplex[best].clone(),
        value: values[best],
        iterations,
        converged,
    }
}

/// Minimise a likelihood over log-parameters. The first start is the
/// origin (all parameters 1.0); further starts are jittered from the
/// optimiser RNG stream and only tried when an earlier start could not
/// produce a finite optimum.
pub fn minimize_from_starts<F>(
    model: &'static str,
    mut objective: F,
    dim: usize,
    config: &OptimizerConfig,
) -> ScoreResult<Minimum>
where
    F: FnMut(&[f64]) -> f64,
{
    let mut rng = RngBank::new(config.seed).for_slot(RngSlot::Optimizer);
    let options = NelderMeadOptions {
        max_iterations: config.max_iterations,
        tolerance: config.tolerance,
        ..Default::default()
    };

    for attempt in 0..=config.restarts {
        let start: Vec<f64> = if attempt == 0 {
            vec![0.0; dim]
        } else {
            (0..dim).map(|_| rng.next_signed() * 2.0).collect()
        };
        if !objective(&start).is_finite() {
            log::debug!("{model}: start {attempt} {start:?} has non-finite objective, skipping");
            continue;
        }

        let min = nelder_mead(&mut objective, &start, &options);
        if !min.value.is_finite() {
            log::debug!("{model}: start {attempt} diverged");
            continue;
        }
        if !min.converged {
            log::warn!(
                "{model}: optimiser stopped after {} iterations without meeting tolerance {}",
                min.iterations, config.tolerance,
            );
        }
        log::debug!(
            "{model}: start {attempt} reached objective {:.6} in {} iterations",
            min.value, min.iterations,
        );
        return Ok(min);
    }

    Err(ScoreError::fit(
        model,
        format!(
            "likelihood is non-finite from all {} starting points",
            config.restarts + 1
        ),
    ))
}
