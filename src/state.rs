use crate::error::AppError;
use crate::sim::NodeSummary;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Starting,
    Running,
    Finished,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationSnapshot {
    pub sim_time: Duration,
    pub channel_busy_ratio: f64,
    pub nodes: Vec<NodeSummary>,
    pub timestamp: SystemTime,
}

#[derive(Debug)]
pub struct AppState {
    profile: Option<String>,
    status: RunStatus,
    status_tx: watch::Sender<RunStatus>,
    snapshot: Option<SimulationSnapshot>,
    snapshot_tx: watch::Sender<Option<SimulationSnapshot>>,
}

impl AppState {
    pub fn new() -> Self {
        let (status_tx, _status_rx) = watch::channel(RunStatus::Starting);
        let (snapshot_tx, _snapshot_rx) = watch::channel(None);
        Self {
            profile: None,
            status: RunStatus::Starting,
            status_tx,
            snapshot: None,
            snapshot_tx,
        }
    }

    pub fn profile(&self) -> Option<&str> {
        self.profile.as_deref()
    }

    pub fn set_profile(&mut self, profile: impl Into<String>) {
        self.profile = Some(profile.into());
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn subscribe_status(&self) -> watch::Receiver<RunStatus> {
        self.status_tx.subscribe()
    }

    pub fn set_status(&mut self, status: RunStatus) -> Result<(), AppError> {
        self.status = status;
        self.status_tx.send(status).map_err(|_| AppError::WatchSend)
    }

    pub fn snapshot(&self) -> Option<&SimulationSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn subscribe_snapshot(&self) -> watch::Receiver<Option<SimulationSnapshot>> {
        self.snapshot_tx.subscribe()
    }

    pub fn set_snapshot(&mut self, snapshot: SimulationSnapshot) -> Result<(), AppError> {
        self.snapshot = Some(snapshot.clone());
        self.snapshot_tx
            .send(Some(snapshot))
            .map_err(|_| AppError::WatchSend)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
