//! Persistence contracts for the scheduler.
//!
//! # Purpose
//! Defines the credential, inventory, availability, and reservation operations
//! the session gate and workflow need, plus the transactional handle used for
//! the reserve and cancel critical sections.
//!
//! # Key invariants
//! - Every mutation that spans more than one ledger runs inside a single
//!   [`LedgerTx`] and becomes visible only on [`LedgerTx::commit`].
//! - Dropping a transaction without committing rolls it back.
//! - Appointment ids come from a counter advanced inside the transaction, so an
//!   id is never handed out twice.
use crate::model::{AppointmentId, Identity, Reservation, Role, Vaccine};
use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

pub mod memory;
pub mod postgres;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if postgres::is_serialization_failure(&err) {
            return StoreError::Conflict("concurrent update, transaction rolled back".into());
        }
        StoreError::Unexpected(err.into())
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::Unexpected(err.into())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Reads and writes that make up one atomic unit of work.
///
/// Implementations hold whatever isolation the backend offers at its strongest
/// (serializable for Postgres, an exclusive lock for the in-memory store) from
/// the first call until `commit` or drop.
#[async_trait]
pub trait LedgerTx: Send {
    /// Lexicographically smallest caregiver with an opening on `date`.
    async fn first_available_caregiver(&mut self, date: NaiveDate) -> StoreResult<Option<String>>;
    async fn remove_availability(&mut self, caregiver: &str, date: NaiveDate) -> StoreResult<()>;
    async fn restore_availability(&mut self, caregiver: &str, date: NaiveDate) -> StoreResult<()>;

    async fn get_vaccine(&mut self, name: &str) -> StoreResult<Option<Vaccine>>;
    /// Apply `delta` to a vaccine's doses; fails with `Conflict` instead of
    /// going below zero and with `NotFound` for an unknown vaccine.
    async fn adjust_doses(&mut self, name: &str, delta: i64) -> StoreResult<Vaccine>;

    async fn caregiver_has_reservation(
        &mut self,
        caregiver: &str,
        date: NaiveDate,
    ) -> StoreResult<bool>;
    async fn next_appointment_id(&mut self) -> StoreResult<AppointmentId>;
    async fn insert_reservation(&mut self, reservation: &Reservation) -> StoreResult<()>;
    async fn get_reservation(&mut self, id: AppointmentId) -> StoreResult<Option<Reservation>>;
    async fn delete_reservation(&mut self, id: AppointmentId) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

#[async_trait]
pub trait SchedulerStore: Send + Sync {
    /// Open a transaction for a multi-ledger critical section.
    async fn begin(&self) -> StoreResult<Box<dyn LedgerTx>>;

    /// Persist a new account; `Conflict` when the username is taken for the role.
    async fn create_identity(&self, identity: Identity) -> StoreResult<()>;
    async fn get_identity(&self, role: Role, username: &str) -> StoreResult<Option<Identity>>;
    async fn username_exists(&self, role: Role, username: &str) -> StoreResult<bool>;

    async fn add_availability(&self, caregiver: &str, date: NaiveDate) -> StoreResult<()>;
    /// Caregivers with an opening on `date`, ascending by username.
    async fn list_available_caregivers(&self, date: NaiveDate) -> StoreResult<Vec<String>>;

    /// Create `name` with `doses` or add `doses` to the existing count.
    async fn add_doses(&self, name: &str, doses: u64) -> StoreResult<Vaccine>;
    /// All vaccines in the order they were first added.
    async fn list_vaccines(&self) -> StoreResult<Vec<Vaccine>>;

    /// Reservations for a patient, ascending by appointment id.
    async fn list_patient_reservations(&self, patient: &str) -> StoreResult<Vec<Reservation>>;
    /// Reservations for a caregiver, ascending by appointment id.
    async fn list_caregiver_reservations(&self, caregiver: &str)
    -> StoreResult<Vec<Reservation>>;

    async fn health_check(&self) -> StoreResult<()>;
    fn is_durable(&self) -> bool;
    fn backend_name(&self) -> &'static str;
}
