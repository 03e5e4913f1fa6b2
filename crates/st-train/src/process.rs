//! Drives an external training program.
//!
//! The configuration is written to the child's stdin as one JSON object.
//! Every stdout line that parses as a JSON object with numeric fields is one
//! epoch's metrics, e.g. `{"mAP": 0.61, "segm_mAP": 0.57}`; other lines are
//! passed through to the log.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use st_types::{EpochReport, TrainConfig, TrainError};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::reporter::Reporter;
use crate::Trainable;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessTrainer {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl ProcessTrainer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: HashMap::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    fn spawn(&self) -> Result<Child, TrainError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        command.spawn().map_err(|e| TrainError::Process {
            message: format!("failed to start {}: {e}", self.program),
        })
    }
}

/// Bare tokens Python's `json.dumps` writes for non-finite floats.
const NON_FINITE: [(&str, f64); 3] = [
    ("-Infinity", f64::NEG_INFINITY),
    ("Infinity", f64::INFINITY),
    ("NaN", f64::NAN),
];

/// Parse one stdout line into a metric mapping. Non-numeric fields are
/// ignored; `None` means the line is not a metrics line.
///
/// `NaN` and `Infinity` are accepted so a diverged epoch still reaches the
/// tuner and fails the trial there.
pub fn parse_metrics_line(line: &str) -> Option<HashMap<String, f64>> {
    let line = line.trim();
    if !line.starts_with('{') {
        return None;
    }
    let (object, lenient): (serde_json::Map<String, serde_json::Value>, bool) =
        match serde_json::from_str(line) {
            Ok(object) => (object, false),
            Err(_) => (serde_json::from_str(&quote_non_finite(line)).ok()?, true),
        };
    let metrics: HashMap<String, f64> = object
        .into_iter()
        .filter_map(|(k, v)| {
            let value = v
                .as_f64()
                .or_else(|| v.as_str().filter(|_| lenient).and_then(non_finite))?;
            Some((k, value))
        })
        .collect();
    if metrics.is_empty() {
        None
    } else {
        Some(metrics)
    }
}

fn non_finite(token: &str) -> Option<f64> {
    NON_FINITE
        .iter()
        .find(|(name, _)| *name == token)
        .map(|(_, value)| *value)
}

/// Quote bare non-finite tokens outside string literals.
fn quote_non_finite(line: &str) -> String {
    let mut out = String::with_capacity(line.len() + 8);
    let mut in_string = false;
    let mut escaped = false;
    let mut rest = line;
    while let Some(c) = rest.chars().next() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
        } else if let Some((token, _)) = NON_FINITE.iter().find(|(t, _)| rest.starts_with(*t)) {
            out.push('"');
            out.push_str(token);
            out.push('"');
            rest = &rest[token.len()..];
            continue;
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    out
}

async fn kill(child: &mut Child) {
    if let Err(e) = child.kill().await {
        warn!(error = %e, "failed to kill trainer process");
    }
}

#[async_trait]
impl Trainable for ProcessTrainer {
    async fn train(&self, config: TrainConfig, reporter: Reporter) -> Result<(), TrainError> {
        let mut child = self.spawn()?;
        let io_error = |e: std::io::Error| TrainError::Process {
            message: e.to_string(),
        };

        let payload = serde_json::to_vec(&config).map_err(|e| TrainError::Process {
            message: e.to_string(),
        })?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&payload).await.map_err(io_error)?;
            stdin.shutdown().await.map_err(io_error)?;
        }

        let stdout = child.stdout.take().ok_or_else(|| TrainError::Process {
            message: "trainer stdout not captured".into(),
        })?;
        let mut lines = BufReader::new(stdout).lines();
        let mut epoch = 0;

        while let Some(line) = lines.next_line().await.map_err(io_error)? {
            let Some(mut metrics) = parse_metrics_line(&line) else {
                debug!(program = %self.program, "{line}");
                continue;
            };
            epoch = match metrics.remove("epoch") {
                Some(e) if e >= 1.0 => e as usize,
                _ => epoch + 1,
            };
            let report = EpochReport::new(epoch, metrics);

            if config.report_to_tuner {
                if let Err(e) = reporter.report(report).await {
                    kill(&mut child).await;
                    return Err(e);
                }
            } else {
                info!(epoch, metrics = ?report.metrics, "epoch finished");
            }
        }

        let status = child.wait().await.map_err(io_error)?;
        if !status.success() {
            return Err(TrainError::ExecutionFailed {
                message: format!("{} exited with {status}", self.program),
            });
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.program
    }
}
