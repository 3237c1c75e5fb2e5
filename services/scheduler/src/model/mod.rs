//! Scheduler data model module.
//!
//! # Purpose
//! Re-exports the identity, vaccine, availability, and reservation records
//! shared by the session gate, the stores, and the reservation workflow.
mod availability;
mod identity;
mod reservation;
mod vaccine;

pub use availability::Availability;
pub use identity::{Identity, Principal, Role};
pub use reservation::{AppointmentId, Reservation};
pub use vaccine::Vaccine;
