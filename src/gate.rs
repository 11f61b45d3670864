//! Operating-hours gates.

use async_trait::async_trait;
use chrono::{Local, NaiveTime};

use crate::error::Result;
use crate::ports::OperatingHours;

/// Daily opening window in local time.
///
/// `closes_at` earlier than `opens_at` means the window wraps past midnight.
/// Equal bounds mean the service never closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleGate {
    pub opens_at: NaiveTime,
    pub closes_at: NaiveTime,
}

impl ScheduleGate {
    pub fn new(opens_at: NaiveTime, closes_at: NaiveTime) -> Self {
        Self {
            opens_at,
            closes_at,
        }
    }

    pub fn is_open_at(&self, at: NaiveTime) -> bool {
        if self.opens_at == self.closes_at {
            true
        } else if self.opens_at < self.closes_at {
            at >= self.opens_at && at < self.closes_at
        } else {
            at >= self.opens_at || at < self.closes_at
        }
    }
}

#[async_trait]
impl OperatingHours for ScheduleGate {
    async fn is_within_operating_hours(&self) -> Result<bool> {
        Ok(self.is_open_at(Local::now().time()))
    }
}

/// A gate with a fixed answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHours(pub bool);

#[async_trait]
impl OperatingHours for FixedHours {
    async fn is_within_operating_hours(&self) -> Result<bool> {
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn daytime_window_includes_open_excludes_close() {
        let gate = ScheduleGate::new(t(8, 0), t(20, 0));
        assert!(gate.is_open_at(t(8, 0)));
        assert!(gate.is_open_at(t(13, 30)));
        assert!(!gate.is_open_at(t(20, 0)));
        assert!(!gate.is_open_at(t(7, 59)));
    }

    #[test]
    fn overnight_window_wraps_midnight() {
        let gate = ScheduleGate::new(t(22, 0), t(6, 0));
        assert!(gate.is_open_at(t(23, 0)));
        assert!(gate.is_open_at(t(2, 0)));
        assert!(!gate.is_open_at(t(12, 0)));
    }

    #[test]
    fn equal_bounds_never_close() {
        let gate = ScheduleGate::new(t(0, 0), t(0, 0));
        assert!(gate.is_open_at(t(3, 0)));
        assert!(gate.is_open_at(t(23, 59)));
    }

    #[tokio::test]
    async fn fixed_hours_returns_its_answer() {
        assert!(FixedHours(true).is_within_operating_hours().await.unwrap());
        assert!(!FixedHours(false).is_within_operating_hours().await.unwrap());
    }
}
