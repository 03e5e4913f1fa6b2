//! Per-dimension Parzen-estimator sampling used by [`crate::TpeSearch`].

use rand::Rng;

use crate::search::{quantize, ParameterKind, ParameterValue};

/// Propose a value for one dimension given the values seen in good and bad
/// trials.
pub(crate) fn sample_dimension<R: Rng>(
    kind: &ParameterKind,
    good: &[ParameterValue],
    bad: &[ParameterValue],
    n_candidates: usize,
    rng: &mut R,
) -> ParameterValue {
    if good.is_empty() {
        return kind.sample(rng);
    }
    match kind {
        ParameterKind::Uniform { low, high } => {
            ParameterValue::Float(continuous(good, bad, *low, *high, false, n_candidates, rng))
        }
        ParameterKind::LogUniform { low, high } => {
            ParameterValue::Float(continuous(good, bad, *low, *high, true, n_candidates, rng))
        }
        ParameterKind::QLogUniform { low, high, q } => {
            let v = continuous(good, bad, *low, *high, true, n_candidates, rng);
            ParameterValue::Float(quantize(v, *low, *high, *q))
        }
        ParameterKind::IntRange { low, high } => {
            let v = continuous(
                good,
                bad,
                *low as f64 - 0.5,
                *high as f64 + 0.5,
                false,
                n_candidates,
                rng,
            );
            ParameterValue::Int((v.round() as i64).clamp(*low, *high))
        }
        ParameterKind::Choice { values } => {
            let idx = categorical(good, bad, values, rng);
            ParameterValue::Json(values[idx].clone())
        }
    }
}

/// Draw candidates around good observations and keep the one with the
/// highest good/bad density ratio.
fn continuous<R: Rng>(
    good: &[ParameterValue],
    bad: &[ParameterValue],
    low: f64,
    high: f64,
    log: bool,
    n_candidates: usize,
    rng: &mut R,
) -> f64 {
    let to_space = |v: f64| if log { v.ln() } else { v };
    let (lo, hi) = (to_space(low), to_space(high));
    let project = |values: &[ParameterValue]| -> Vec<f64> {
        values
            .iter()
            .filter_map(ParameterValue::as_f64)
            .filter(|v| !log || *v > 0.0)
            .map(to_space)
            .collect()
    };
    let good_x = project(good);
    let bad_x = project(bad);
    if good_x.is_empty() || hi <= lo {
        let x = rng.random_range(lo..=hi.max(lo));
        return if log { x.exp() } else { x };
    }

    let bandwidth = ((hi - lo) / 10.0).max(f64::EPSILON);
    let mut best = (lo, f64::NEG_INFINITY);
    for _ in 0..n_candidates.max(1) {
        let base = good_x[rng.random_range(0..good_x.len())];
        let candidate = (base + gaussian(rng) * bandwidth).clamp(lo, hi);
        let ratio = kde(candidate, &good_x, bandwidth) / (kde(candidate, &bad_x, bandwidth) + 1e-12);
        if ratio > best.1 {
            best = (candidate, ratio);
        }
    }
    if log {
        best.0.exp().clamp(low, high)
    } else {
        best.0
    }
}

fn categorical<R: Rng>(
    good: &[ParameterValue],
    bad: &[ParameterValue],
    choices: &[serde_json::Value],
    rng: &mut R,
) -> usize {
    let counts = |values: &[ParameterValue]| -> Vec<f64> {
        let mut counts = vec![1.0; choices.len()];
        for value in values {
            let json = value.to_json();
            if let Some(i) = choices
                .iter()
                .position(|c| *c == json || (c.is_number() && c.as_f64() == json.as_f64()))
            {
                counts[i] += 1.0;
            }
        }
        counts
    };
    let (l, g) = (counts(good), counts(bad));
    let weights: Vec<f64> = l.iter().zip(&g).map(|(l, g)| l / g).collect();
    let total: f64 = weights.iter().sum();

    let r = rng.random::<f64>() * total;
    let mut cumsum = 0.0;
    for (i, w) in weights.iter().enumerate() {
        cumsum += w;
        if r < cumsum {
            return i;
        }
    }
    choices.len() - 1
}

fn kde(x: f64, values: &[f64], bandwidth: f64) -> f64 {
    if values.is_empty() {
        return 1.0;
    }
    values
        .iter()
        .map(|v| (-(x - v).powi(2) / (2.0 * bandwidth * bandwidth)).exp())
        .sum::<f64>()
        / values.len() as f64
}

fn gaussian<R: Rng>(rng: &mut R) -> f64 {
    let u1: f64 = rng.random::<f64>().max(1e-10);
    let u2: f64 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}
