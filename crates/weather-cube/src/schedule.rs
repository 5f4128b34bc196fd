//! Day/night gate deciding whether the display should be driven.

use chrono::Timelike;

use crate::error::ConfigError;

pub const DEFAULT_START_HOUR: u32 = 9;
pub const DEFAULT_END_HOUR: u32 = 22;

/// Whether the display should show weather or stay dark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleState {
    Active,
    Quiet,
}

/// Inclusive window of active hours in local time.
///
/// A window whose start is after its end wraps midnight, e.g. 20..=6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveHours {
    start_hour: u32,
    end_hour: u32,
}

impl Default for ActiveHours {
    fn default() -> Self {
        Self {
            start_hour: DEFAULT_START_HOUR,
            end_hour: DEFAULT_END_HOUR,
        }
    }
}

impl ActiveHours {
    pub fn new(start_hour: u32, end_hour: u32) -> Result<Self, ConfigError> {
        if start_hour > 23 || end_hour > 23 {
            return Err(ConfigError::Invalid(format!(
                "active hours must be within 0..=23, got {}..={}",
                start_hour, end_hour
            )));
        }
        Ok(Self {
            start_hour,
            end_hour,
        })
    }

    pub fn start_hour(&self) -> u32 {
        self.start_hour
    }

    pub fn end_hour(&self) -> u32 {
        self.end_hour
    }

    /// Only the hour of `time` is considered.
    pub fn is_active_hour<T: Timelike>(&self, time: &T) -> bool {
        self.contains_hour(time.hour())
    }

    pub fn state_at<T: Timelike>(&self, time: &T) -> ScheduleState {
        if self.is_active_hour(time) {
            ScheduleState::Active
        } else {
            ScheduleState::Quiet
        }
    }

    fn contains_hour(&self, hour: u32) -> bool {
        if self.start_hour <= self.end_hour {
            (self.start_hour..=self.end_hour).contains(&hour)
        } else {
            hour >= self.start_hour || hour <= self.end_hour
        }
    }
}
