//! Typed per-epoch result channel from a running trial to the tuner.

use serde::{Deserialize, Serialize};
use st_types::{EpochReport, TrainError};
use tokio::sync::{mpsc, oneshot};
use tracing::info;

/// Scheduler verdict for a trial after one of its reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Continue,
    Stop,
}

/// One report in flight, with the slot the tuner answers on.
#[derive(Debug)]
pub struct ReportRequest {
    pub report: EpochReport,
    pub reply: oneshot::Sender<Decision>,
}

/// Handle a training procedure uses to publish epoch metrics.
///
/// Every [`Reporter::report`] call suspends the trial until the tuner has
/// decided whether it may continue, which makes each epoch boundary a safe
/// cancellation point.
#[derive(Debug, Clone)]
pub struct Reporter {
    tx: Option<mpsc::Sender<ReportRequest>>,
}

impl Reporter {
    /// Connected reporter plus the receiving end for the tuner.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ReportRequest>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }

    /// Reporter for standalone runs: reports are logged and always continue.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn is_connected(&self) -> bool {
        self.tx.is_some()
    }

    /// Publish `report` and wait for the tuner's decision.
    ///
    /// Returns `TrainError::Stopped` if the tuner stops the trial or has gone
    /// away.
    pub async fn report(&self, report: EpochReport) -> Result<(), TrainError> {
        let Some(tx) = &self.tx else {
            info!(epoch = report.epoch, metrics = ?report.metrics, "epoch finished");
            return Ok(());
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(ReportRequest {
            report,
            reply: reply_tx,
        })
        .await
        .map_err(|_| TrainError::Stopped)?;

        match reply_rx.await {
            Ok(Decision::Continue) => Ok(()),
            Ok(Decision::Stop) | Err(_) => Err(TrainError::Stopped),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_reporter_always_continues() {
        let reporter = Reporter::disabled();
        assert!(!reporter.is_connected());
        assert!(reporter.report(EpochReport::with_map(1, 0.3)).await.is_ok());
    }

    #[tokio::test]
    async fn report_waits_for_decision() {
        let (reporter, mut rx) = Reporter::channel(4);

        let tuner = tokio::spawn(async move {
            let mut epochs = Vec::new();
            while let Some(request) = rx.recv().await {
                epochs.push(request.report.epoch);
                let decision = if request.report.epoch >= 2 {
                    Decision::Stop
                } else {
                    Decision::Continue
                };
                let _ = request.reply.send(decision);
            }
            epochs
        });

        assert!(reporter.report(EpochReport::with_map(1, 0.1)).await.is_ok());
        assert_eq!(
            reporter.report(EpochReport::with_map(2, 0.2)).await,
            Err(TrainError::Stopped)
        );
        drop(reporter);
        assert_eq!(tuner.await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn closed_tuner_stops_trial() {
        let (reporter, rx) = Reporter::channel(1);
        drop(rx);
        assert_eq!(
            reporter.report(EpochReport::with_map(1, 0.1)).await,
            Err(TrainError::Stopped)
        );
    }
}
