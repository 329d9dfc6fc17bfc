//! Scheduling computations over dependency networks.

pub mod cpm;

pub use cpm::{CriticalPath, ScheduleEntry};
