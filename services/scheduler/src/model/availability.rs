//! Caregiver availability slots.
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A bookable opening: one caregiver on one calendar date.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Availability {
    pub date: NaiveDate,
    pub caregiver: String,
}
