//! Search space definitions and point-sampling strategies.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use st_types::TuneError;
use std::collections::{HashMap, VecDeque};

use crate::tpe;

/// A single parameter dimension in the search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    /// Configuration key the sampled value overrides (e.g. "lr").
    pub name: String,
    /// The kind of search range.
    pub kind: ParameterKind,
}

/// Describes how a parameter is sampled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParameterKind {
    /// Continuous uniform range [low, high].
    Uniform { low: f64, high: f64 },
    /// Integer range [low, high] inclusive.
    IntRange { low: i64, high: i64 },
    /// Log-uniform range (sampled in log-space then exponentiated).
    LogUniform { low: f64, high: f64 },
    /// Log-uniform rounded to the nearest multiple of `q`, kept inside [low, high].
    QLogUniform { low: f64, high: f64, q: f64 },
    /// Categorical choices.
    Choice { values: Vec<serde_json::Value> },
}

impl ParameterKind {
    pub fn sample<R: Rng>(&self, rng: &mut R) -> ParameterValue {
        match self {
            Self::Uniform { low, high } => ParameterValue::Float(rng.random_range(*low..=*high)),
            Self::IntRange { low, high } => ParameterValue::Int(rng.random_range(*low..=*high)),
            Self::LogUniform { low, high } => {
                let log_val: f64 = rng.random_range(low.ln()..=high.ln());
                ParameterValue::Float(log_val.exp())
            }
            Self::QLogUniform { low, high, q } => {
                let log_val: f64 = rng.random_range(low.ln()..=high.ln());
                ParameterValue::Float(quantize(log_val.exp(), *low, *high, *q))
            }
            Self::Choice { values } => {
                let idx = rng.random_range(0..values.len());
                ParameterValue::Json(values[idx].clone())
            }
        }
    }

    /// Whether `value` could have been produced by this dimension.
    pub fn contains(&self, value: &ParameterValue) -> bool {
        match (self, value) {
            (Self::Choice { values }, v) => values
                .iter()
                .any(|c| *c == v.to_json() || (c.is_number() && c.as_f64() == v.as_f64())),
            (Self::IntRange { low, high }, v) => v
                .as_f64()
                .is_some_and(|f| f.fract() == 0.0 && f >= *low as f64 && f <= *high as f64),
            (
                Self::Uniform { low, high }
                | Self::LogUniform { low, high }
                | Self::QLogUniform { low, high, .. },
                v,
            ) => v.as_f64().is_some_and(|f| f >= *low && f <= *high),
        }
    }

    fn validate(&self, name: &str) -> Result<(), TuneError> {
        let invalid = |message: String| TuneError::InvalidSearchSpace {
            message: format!("{name}: {message}"),
        };
        match self {
            Self::Uniform { low, high } if !(low <= high) => {
                Err(invalid(format!("empty range [{low}, {high}]")))
            }
            Self::IntRange { low, high } if low > high => {
                Err(invalid(format!("empty range [{low}, {high}]")))
            }
            Self::LogUniform { low, high } | Self::QLogUniform { low, high, .. }
                if !(*low > 0.0 && low <= high) =>
            {
                Err(invalid(format!("log range needs 0 < low <= high, got [{low}, {high}]")))
            }
            Self::QLogUniform { q, .. } if !(*q > 0.0) => {
                Err(invalid(format!("quantum must be positive, got {q}")))
            }
            Self::Choice { values } if values.is_empty() => Err(invalid("no choices".into())),
            _ => Ok(()),
        }
    }
}

/// Round `value` to a multiple of `q` without leaving [low, high].
pub(crate) fn quantize(value: f64, low: f64, high: f64, q: f64) -> f64 {
    let rounded = (value / q).round() * q;
    // Strip representation noise such as 0.005000000000000001.
    let decimals = (-q.log10()).ceil().max(0.0) as i32 + 1;
    let scale = 10f64.powi(decimals);
    ((rounded * scale).round() / scale).clamp(low, high)
}

/// A concrete parameter value produced by a search strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
    Json(serde_json::Value),
}

impl ParameterValue {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Float(v) => serde_json::json!(v),
            Self::Int(v) => serde_json::json!(v),
            Self::Json(v) => v.clone(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::Json(v) => v.as_f64(),
        }
    }
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Json(v) => write!(f, "{v}"),
        }
    }
}

/// One point in the search space.
pub type Point = HashMap<String, ParameterValue>;

/// The full search space: an ordered list of parameter definitions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchSpace {
    pub parameters: Vec<ParameterDef>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self {
            parameters: Vec::new(),
        }
    }

    fn add(mut self, name: impl Into<String>, kind: ParameterKind) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind,
        });
        self
    }

    pub fn add_uniform(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.add(name, ParameterKind::Uniform { low, high })
    }

    pub fn add_int(self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.add(name, ParameterKind::IntRange { low, high })
    }

    pub fn add_log_uniform(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.add(name, ParameterKind::LogUniform { low, high })
    }

    pub fn add_qlog_uniform(self, name: impl Into<String>, low: f64, high: f64, q: f64) -> Self {
        self.add(name, ParameterKind::QLogUniform { low, high, q })
    }

    pub fn add_choice(self, name: impl Into<String>, values: Vec<serde_json::Value>) -> Self {
        self.add(name, ParameterKind::Choice { values })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().map(|p| p.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&ParameterDef> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn validate(&self) -> Result<(), TuneError> {
        for (i, param) in self.parameters.iter().enumerate() {
            if self.parameters[..i].iter().any(|p| p.name == param.name) {
                return Err(TuneError::InvalidSearchSpace {
                    message: format!("duplicate parameter {}", param.name),
                });
            }
            param.kind.validate(&param.name)?;
        }
        Ok(())
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> Point {
        self.parameters
            .iter()
            .map(|p| (p.name.clone(), p.kind.sample(rng)))
            .collect()
    }

    /// Fill dimensions missing from `point` with random samples.
    fn complete<R: Rng>(&self, mut point: Point, rng: &mut R) -> Point {
        for param in &self.parameters {
            if !point.contains_key(&param.name) {
                point.insert(param.name.clone(), param.kind.sample(rng));
            }
        }
        point
    }

    /// Check an explicit starting point against the space.
    pub fn check_point(&self, point: &Point) -> Result<(), TuneError> {
        for (name, value) in point {
            let def = self.get(name).ok_or_else(|| TuneError::InvalidSearchSpace {
                message: format!("initial point sets {name}, which is not in the search space"),
            })?;
            if !def.kind.contains(value) {
                return Err(TuneError::InvalidSearchSpace {
                    message: format!("initial point {name}={value} is outside its range"),
                });
            }
        }
        Ok(())
    }

    /// Whether every dimension of `point` lies inside the space.
    pub fn contains(&self, point: &Point) -> bool {
        self.parameters.iter().all(|p| {
            point
                .get(&p.name)
                .is_some_and(|value| p.kind.contains(value))
        })
    }
}

// ---------------------------------------------------------------------------
// Search strategies
// ---------------------------------------------------------------------------

/// Common trait for all search strategies.
pub trait SearchStrategy: Send {
    /// Generate the next batch of points to evaluate. May return fewer than
    /// `count` when the strategy is exhausted.
    fn suggest(&mut self, count: usize) -> Vec<Point>;

    /// Report a finished trial so adaptive strategies can learn.
    /// `objective` is oriented so that larger is better.
    fn report(&mut self, _params: &Point, _objective: f64) {}

    /// Reject initial points that `space` cannot hold.
    fn check(&self, _space: &SearchSpace) -> Result<(), TuneError> {
        Ok(())
    }

    /// Human-readable strategy name.
    fn name(&self) -> &str;
}

fn seeded(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

// ---- Random search ----

/// Independent random sampling across the search space.
#[derive(Debug, Clone)]
pub struct RandomSearch {
    space: SearchSpace,
    initial_points: VecDeque<Point>,
    rng: StdRng,
}

impl RandomSearch {
    pub fn new(space: SearchSpace) -> Self {
        Self {
            space,
            initial_points: VecDeque::new(),
            rng: seeded(None),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = seeded(Some(seed));
        self
    }

    /// Points evaluated, in order, before any random sample.
    pub fn with_points_to_evaluate(mut self, points: Vec<Point>) -> Self {
        self.initial_points = points.into();
        self
    }

    fn next_point(&mut self) -> Point {
        match self.initial_points.pop_front() {
            Some(point) => self.space.complete(point, &mut self.rng),
            None => self.space.sample(&mut self.rng),
        }
    }
}

impl SearchStrategy for RandomSearch {
    fn suggest(&mut self, count: usize) -> Vec<Point> {
        (0..count).map(|_| self.next_point()).collect()
    }

    fn check(&self, space: &SearchSpace) -> Result<(), TuneError> {
        self.initial_points.iter().try_for_each(|p| space.check_point(p))
    }

    fn name(&self) -> &str {
        "random"
    }
}

// ---- Tree-structured Parzen estimator ----

/// Tree-structured Parzen estimator search.
///
/// Evaluates the explicit initial points first, then draws
/// `n_initial_points` random samples, then proposes points that maximise
/// the ratio between a density fitted to the best `gamma` fraction of
/// finished trials and one fitted to the rest.
#[derive(Debug, Clone)]
pub struct TpeSearch {
    space: SearchSpace,
    initial_points: VecDeque<Point>,
    observations: Vec<(Point, f64)>,
    n_initial_points: usize,
    gamma: f64,
    n_candidates: usize,
    suggested: usize,
    rng: StdRng,
}

impl TpeSearch {
    pub fn new(space: SearchSpace) -> Self {
        Self {
            space,
            initial_points: VecDeque::new(),
            observations: Vec::new(),
            n_initial_points: 20,
            gamma: 0.25,
            n_candidates: 24,
            suggested: 0,
            rng: seeded(None),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = seeded(Some(seed));
        self
    }

    pub fn with_points_to_evaluate(mut self, points: Vec<Point>) -> Self {
        self.initial_points = points.into();
        self
    }

    /// Random samples drawn before the estimator takes over.
    pub fn with_initial_samples(mut self, n: usize) -> Self {
        self.n_initial_points = n;
        self
    }

    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma.clamp(0.01, 0.99);
        self
    }

    pub fn observations(&self) -> usize {
        self.observations.len()
    }

    fn next_point(&mut self) -> Point {
        if let Some(point) = self.initial_points.pop_front() {
            return self.space.complete(point, &mut self.rng);
        }
        self.suggested += 1;
        if self.suggested <= self.n_initial_points || self.observations.len() < 2 {
            return self.space.sample(&mut self.rng);
        }
        self.guided_sample()
    }

    fn guided_sample(&mut self) -> Point {
        let mut ranked: Vec<&(Point, f64)> = self.observations.iter().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let n_good = ((ranked.len() as f64) * self.gamma).ceil() as usize;
        let n_good = n_good.clamp(1, ranked.len() - 1);
        let (good, bad) = ranked.split_at(n_good);

        let mut point = HashMap::new();
        for param in &self.space.parameters {
            let values = |set: &[&(Point, f64)]| -> Vec<ParameterValue> {
                set.iter()
                    .filter_map(|(p, _)| p.get(&param.name).cloned())
                    .collect()
            };
            let value = tpe::sample_dimension(
                &param.kind,
                &values(good),
                &values(bad),
                self.n_candidates,
                &mut self.rng,
            );
            point.insert(param.name.clone(), value);
        }
        point
    }
}

impl SearchStrategy for TpeSearch {
    fn suggest(&mut self, count: usize) -> Vec<Point> {
        (0..count).map(|_| self.next_point()).collect()
    }

    fn check(&self, space: &SearchSpace) -> Result<(), TuneError> {
        self.initial_points.iter().try_for_each(|p| space.check_point(p))
    }

    fn report(&mut self, params: &Point, objective: f64) {
        if objective.is_finite() {
            self.observations.push((params.clone(), objective));
        }
    }

    fn name(&self) -> &str {
        "tpe"
    }
}
