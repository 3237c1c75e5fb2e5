//! Account and reservation workflows.
//!
//! # Purpose
//! Sequences store calls for the operations that carry invariants: account
//! creation, login verification, and the reserve/cancel critical sections.
//! Simpler commands (dose additions, availability uploads, listings) call the
//! store directly from the dispatcher.
mod accounts;
mod reservation;

pub use accounts::{authenticate, create_account};
pub use reservation::{cancel, reserve};
