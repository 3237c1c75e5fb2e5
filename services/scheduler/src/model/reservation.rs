//! Confirmed appointment records.
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub type AppointmentId = u64;

/// A confirmed appointment linking a patient, caregiver, date, and vaccine.
///
/// Ids are issued by the store's appointment counter and are never reused,
/// even after the reservation is canceled.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub appointment_id: AppointmentId,
    pub date: NaiveDate,
    pub caregiver: String,
    pub patient: String,
    pub vaccine: String,
}
