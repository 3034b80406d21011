//! Command usage tracking and achievements.
//!
//! [`Tracker`] plugs into the execution pipeline as its event sink,
//! counting successful commands per [`Category`] and unlocking
//! [`ACHIEVEMENTS`] as thresholds are crossed. State lives in a single
//! JSON file.

mod achievements;
mod category;
mod tracker;

pub use achievements::{ACHIEVEMENTS, Achievement};
pub use category::{ALL_CATEGORIES, Category};
pub use tracker::{HistoryEntry, Progress, Tracker};
