//! Worker status reference data, resolved once at startup.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::model::{StatusId, StatusRecord, WindowId, Worker, WorkerState, WorkerStatus};
use crate::ports::WorkerStore;

/// Cached worker status table.
#[derive(Debug, Clone)]
pub struct StatusTable {
    records: Vec<StatusRecord>,
    by_status: HashMap<WorkerStatus, StatusId>,
}

impl StatusTable {
    /// Read the status table and check the lifecycle statuses are all present.
    pub async fn load(store: &dyn WorkerStore) -> Result<Self> {
        Self::from_records(store.statuses().await?)
    }

    pub fn from_records(records: Vec<StatusRecord>) -> Result<Self> {
        let mut by_status = HashMap::new();
        for status in WorkerStatus::ALL {
            let record = records
                .iter()
                .find(|r| r.name == status.as_str())
                .ok_or_else(|| {
                    Error::Config(format!("worker status '{status}' is missing from reference data"))
                })?;
            by_status.insert(status, record.id);
        }
        Ok(Self { records, by_status })
    }

    pub fn resolve(&self, status: WorkerStatus) -> Result<StatusId> {
        self.by_status
            .get(&status)
            .copied()
            .ok_or_else(|| Error::Config(format!("worker status '{status}' is not loaded")))
    }

    /// Resolve any status row by name, including ones the lifecycle ignores.
    pub fn resolve_name(&self, name: &str) -> Result<StatusId> {
        self.records
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.id)
            .ok_or_else(|| Error::Config(format!("unknown worker status: {name}")))
    }

    pub fn record(&self, id: StatusId) -> Option<&StatusRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn record_by_name(&self, name: &str) -> Option<&StatusRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    pub fn records(&self) -> &[StatusRecord] {
        &self.records
    }

    pub fn status_of(&self, id: StatusId) -> Option<WorkerStatus> {
        self.by_status
            .iter()
            .find_map(|(status, sid)| (*sid == id).then_some(*status))
    }

    pub fn state_of(&self, worker: &Worker) -> WorkerState {
        match self.status_of(worker.status_id) {
            Some(WorkerStatus::Work) if worker.window_id.is_some() => WorkerState::Working,
            Some(WorkerStatus::Break) => WorkerState::OnBreak,
            Some(WorkerStatus::NotWork) => WorkerState::OffShift,
            _ => WorkerState::Unassigned,
        }
    }

    /// Window bound if and only if status is `work`.
    pub fn is_consistent(&self, worker: &Worker) -> bool {
        self.admits(worker.status_id, worker.window_id)
    }

    pub fn admits(&self, status: StatusId, window: Option<WindowId>) -> bool {
        let working = self.status_of(status) == Some(WorkerStatus::Work);
        working == window.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{UserId, WindowId, WorkerId};

    fn records() -> Vec<StatusRecord> {
        vec![
            StatusRecord { id: StatusId(1), name: "work".into() },
            StatusRecord { id: StatusId(2), name: "break".into() },
            StatusRecord { id: StatusId(3), name: "not work".into() },
            StatusRecord { id: StatusId(4), name: "training".into() },
        ]
    }

    fn worker(status: i64, window: Option<i64>) -> Worker {
        Worker {
            id: WorkerId(1),
            user_id: UserId(10),
            status_id: StatusId(status),
            window_id: window.map(WindowId),
        }
    }

    #[test]
    fn missing_status_is_a_config_error() {
        let mut rows = records();
        rows.retain(|r| r.name != "break");
        let err = StatusTable::from_records(rows).unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("break")));
    }

    #[test]
    fn resolves_by_status_and_name() {
        let table = StatusTable::from_records(records()).unwrap();
        assert_eq!(table.resolve(WorkerStatus::NotWork).unwrap(), StatusId(3));
        assert_eq!(table.resolve_name("training").unwrap(), StatusId(4));
        assert!(matches!(table.resolve_name("lunch"), Err(Error::Config(_))));
        assert_eq!(table.status_of(StatusId(2)), Some(WorkerStatus::Break));
        assert_eq!(table.status_of(StatusId(4)), None);
    }

    #[test]
    fn derives_state_from_status_and_window() {
        let table = StatusTable::from_records(records()).unwrap();
        assert_eq!(table.state_of(&worker(1, Some(5))), WorkerState::Working);
        assert_eq!(table.state_of(&worker(1, None)), WorkerState::Unassigned);
        assert_eq!(table.state_of(&worker(2, None)), WorkerState::OnBreak);
        assert_eq!(table.state_of(&worker(3, None)), WorkerState::OffShift);
        assert_eq!(table.state_of(&worker(4, None)), WorkerState::Unassigned);

        assert!(table.is_consistent(&worker(1, Some(5))));
        assert!(!table.is_consistent(&worker(1, None)));
        assert!(!table.is_consistent(&worker(2, Some(5))));
    }
}
