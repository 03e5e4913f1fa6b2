//! Per-trial resource quotas and the shared pool trials draw them from.

use serde::{Deserialize, Serialize};
use st_types::TuneError;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Resource requirements for a single trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerResources {
    /// CPU cores per trial.
    pub num_cpus: u32,
    /// Accelerators per trial (0 = CPU only).
    pub num_gpus: u32,
}

impl Default for WorkerResources {
    fn default() -> Self {
        Self {
            num_cpus: 4,
            num_gpus: 1,
        }
    }
}

/// Shared pool of CPU and accelerator slots.
///
/// Trials that do not fit wait in [`ResourcePool::acquire`] until enough
/// capacity is released. CPU is always taken before GPU so two waiting trials
/// can never hold each other's missing half.
#[derive(Debug, Clone)]
pub struct ResourcePool {
    total: WorkerResources,
    cpus: Arc<Semaphore>,
    gpus: Arc<Semaphore>,
}

impl ResourcePool {
    pub fn new(total: WorkerResources) -> Self {
        Self {
            total,
            cpus: Arc::new(Semaphore::new(total.num_cpus as usize)),
            gpus: Arc::new(Semaphore::new(total.num_gpus as usize)),
        }
    }

    /// Pool sized to this machine's cores and `num_gpus` accelerators.
    pub fn local(num_gpus: u32) -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(1);
        Self::new(WorkerResources {
            num_cpus: cpus,
            num_gpus,
        })
    }

    pub fn total(&self) -> WorkerResources {
        self.total
    }

    pub fn available(&self) -> WorkerResources {
        WorkerResources {
            num_cpus: self.cpus.available_permits() as u32,
            num_gpus: self.gpus.available_permits() as u32,
        }
    }

    /// Errors if `request` could never be satisfied, even by an idle pool.
    pub fn check_fits(&self, request: &WorkerResources) -> Result<(), TuneError> {
        for (resource, requested, available) in [
            ("cpu", request.num_cpus, self.total.num_cpus),
            ("gpu", request.num_gpus, self.total.num_gpus),
        ] {
            if requested > available {
                return Err(TuneError::QuotaExceedsPool {
                    resource: resource.to_string(),
                    requested,
                    available,
                });
            }
        }
        Ok(())
    }

    /// How many trials of size `request` the idle pool can hold at once.
    /// `None` when the request is empty and therefore unbounded.
    pub fn max_concurrent(&self, request: &WorkerResources) -> Option<usize> {
        let fit = |have: u32, need: u32| (need > 0).then(|| (have / need) as usize);
        match (
            fit(self.total.num_cpus, request.num_cpus),
            fit(self.total.num_gpus, request.num_gpus),
        ) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Wait until `request` fits, then hold it until the lease is dropped.
    pub async fn acquire(&self, request: WorkerResources) -> Result<ResourceLease, TuneError> {
        self.check_fits(&request)?;
        let closed = |_| TuneError::PoolClosed;
        let cpu = take(&self.cpus, request.num_cpus).await.map_err(closed)?;
        let gpu = take(&self.gpus, request.num_gpus).await.map_err(closed)?;
        Ok(ResourceLease {
            resources: request,
            _cpu: cpu,
            _gpu: gpu,
        })
    }
}

async fn take(
    semaphore: &Arc<Semaphore>,
    n: u32,
) -> Result<Option<OwnedSemaphorePermit>, tokio::sync::AcquireError> {
    if n == 0 {
        return Ok(None);
    }
    semaphore.clone().acquire_many_owned(n).await.map(Some)
}

/// Resources held by a running trial; released on drop.
#[derive(Debug)]
pub struct ResourceLease {
    pub resources: WorkerResources,
    _cpu: Option<OwnedSemaphorePermit>,
    _gpu: Option<OwnedSemaphorePermit>,
}
