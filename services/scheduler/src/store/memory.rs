//! In-memory implementation of the scheduler store.
//!
//! # Purpose
//! Implements [`SchedulerStore`] entirely in memory. It exists for:
//! - local runs and tests (no external dependencies)
//! - sessions where durability is not required
//!
//! # Durability and consistency
//! - **Not durable**: all state is lost when the process exits.
//! - All ledgers live behind one `tokio::sync::Mutex`. A transaction takes the
//!   lock as an owned guard for its whole lifetime and mutates a private copy of
//!   the ledgers; `commit` swaps the copy in, dropping the transaction discards
//!   it. Readers never observe a half-applied reserve or cancel.
//! - Holding the lock for the transaction serializes critical sections, which
//!   is the in-process equivalent of serializable isolation.
use super::{LedgerTx, SchedulerStore, StoreError, StoreResult};
use crate::model::{AppointmentId, Availability, Identity, Reservation, Role, Vaccine};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Every ledger the scheduler persists.
///
/// `availabilities` orders by `(date, caregiver)`, so the first entry for a date
/// is the lexicographically smallest caregiver. `vaccines` keeps insertion order.
#[derive(Debug, Clone, Default)]
struct Ledgers {
    patients: HashMap<String, Identity>,
    caregivers: HashMap<String, Identity>,
    availabilities: BTreeSet<Availability>,
    vaccines: Vec<Vaccine>,
    reservations: BTreeMap<AppointmentId, Reservation>,
    /// Last appointment id handed out; never decremented.
    last_appointment_id: AppointmentId,
}

impl Ledgers {
    fn identities(&self, role: Role) -> &HashMap<String, Identity> {
        match role {
            Role::Patient => &self.patients,
            Role::Caregiver => &self.caregivers,
        }
    }

    fn identities_mut(&mut self, role: Role) -> &mut HashMap<String, Identity> {
        match role {
            Role::Patient => &mut self.patients,
            Role::Caregiver => &mut self.caregivers,
        }
    }

    fn vaccine_mut(&mut self, name: &str) -> Option<&mut Vaccine> {
        self.vaccines.iter_mut().find(|vaccine| vaccine.name == name)
    }
}

/// In-memory scheduler store.
///
/// ## Data structures
/// - Credentials are stored in one `HashMap` per role, keyed by username.
/// - Availability slots live in a `BTreeSet` ordered by `(date, caregiver)`.
/// - Reservations live in a `BTreeMap` keyed by appointment id, so listings come
///   out in id order without sorting.
///
/// Everything sits behind a single `Arc<Mutex<...>>` so:
/// - the store can be shared by several sessions
/// - a transaction can hold the lock for its whole lifetime
/// - plain reads never see a half-applied transaction
///
/// # Example
/// ```rust
/// use scheduler::store::SchedulerStore;
/// use scheduler::store::memory::InMemoryStore;
///
/// # async fn demo() {
/// let store = InMemoryStore::new();
/// assert!(!store.is_durable());
/// assert_eq!(store.backend_name(), "memory");
/// # }
/// ```
#[derive(Default)]
pub struct InMemoryStore {
    /// All ledgers, swapped wholesale on transaction commit.
    ledgers: Arc<Mutex<Ledgers>>,
}

impl InMemoryStore {
    /// Create an empty store with the appointment counter at zero.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Transaction over a private copy of the ledgers.
///
/// The owned guard keeps every other transaction and plain read out until this
/// one commits or is dropped.
struct MemoryTx {
    /// Exclusive hold on the shared ledgers.
    guard: OwnedMutexGuard<Ledgers>,
    /// Copy the transaction mutates; becomes the shared state on commit.
    working: Ledgers,
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn first_available_caregiver(&mut self, date: NaiveDate) -> StoreResult<Option<String>> {
        // Set order makes the first match the smallest username.
        Ok(self
            .working
            .availabilities
            .iter()
            .find(|slot| slot.date == date)
            .map(|slot| slot.caregiver.clone()))
    }

    async fn remove_availability(&mut self, caregiver: &str, date: NaiveDate) -> StoreResult<()> {
        let slot = Availability {
            date,
            caregiver: caregiver.to_string(),
        };
        if !self.working.availabilities.remove(&slot) {
            return Err(StoreError::NotFound("availability".into()));
        }
        Ok(())
    }

    async fn restore_availability(&mut self, caregiver: &str, date: NaiveDate) -> StoreResult<()> {
        // A caregiver may have re-uploaded the same date after the booking.
        self.working.availabilities.insert(Availability {
            date,
            caregiver: caregiver.to_string(),
        });
        Ok(())
    }

    async fn get_vaccine(&mut self, name: &str) -> StoreResult<Option<Vaccine>> {
        Ok(self
            .working
            .vaccines
            .iter()
            .find(|vaccine| vaccine.name == name)
            .cloned())
    }

    async fn adjust_doses(&mut self, name: &str, delta: i64) -> StoreResult<Vaccine> {
        let vaccine = self
            .working
            .vaccine_mut(name)
            .ok_or_else(|| StoreError::NotFound("vaccine".into()))?;
        let doses = vaccine
            .doses
            .checked_add_signed(delta)
            .ok_or_else(|| StoreError::Conflict("not enough doses".into()))?;
        vaccine.doses = doses;
        Ok(vaccine.clone())
    }

    async fn caregiver_has_reservation(
        &mut self,
        caregiver: &str,
        date: NaiveDate,
    ) -> StoreResult<bool> {
        Ok(self
            .working
            .reservations
            .values()
            .any(|reservation| reservation.caregiver == caregiver && reservation.date == date))
    }

    /// Advance the counter in the working copy. A rollback discards the
    /// increment, so only committed reservations consume ids.
    async fn next_appointment_id(&mut self) -> StoreResult<AppointmentId> {
        self.working.last_appointment_id += 1;
        Ok(self.working.last_appointment_id)
    }

    async fn insert_reservation(&mut self, reservation: &Reservation) -> StoreResult<()> {
        if self
            .working
            .reservations
            .contains_key(&reservation.appointment_id)
        {
            return Err(StoreError::Conflict("appointment id exists".into()));
        }
        self.working
            .reservations
            .insert(reservation.appointment_id, reservation.clone());
        Ok(())
    }

    async fn get_reservation(&mut self, id: AppointmentId) -> StoreResult<Option<Reservation>> {
        Ok(self.working.reservations.get(&id).cloned())
    }

    async fn delete_reservation(&mut self, id: AppointmentId) -> StoreResult<()> {
        self.working
            .reservations
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound("reservation".into()))
    }

    /// Publish the working copy and release the lock.
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

#[async_trait]
impl SchedulerStore for InMemoryStore {
    /// Take the store lock and snapshot the ledgers.
    ///
    /// Waits while another transaction is open.
    async fn begin(&self) -> StoreResult<Box<dyn LedgerTx>> {
        let guard = Arc::clone(&self.ledgers).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx { guard, working }))
    }

    /// # Errors
    /// - `Conflict` if the username already exists for the identity's role.
    async fn create_identity(&self, identity: Identity) -> StoreResult<()> {
        let mut ledgers = self.ledgers.lock().await;
        let accounts = ledgers.identities_mut(identity.role);
        if accounts.contains_key(&identity.username) {
            return Err(StoreError::Conflict("username taken".into()));
        }
        accounts.insert(identity.username.clone(), identity);
        Ok(())
    }

    async fn get_identity(&self, role: Role, username: &str) -> StoreResult<Option<Identity>> {
        Ok(self
            .ledgers
            .lock()
            .await
            .identities(role)
            .get(username)
            .cloned())
    }

    async fn username_exists(&self, role: Role, username: &str) -> StoreResult<bool> {
        Ok(self
            .ledgers
            .lock()
            .await
            .identities(role)
            .contains_key(username))
    }

    /// # Errors
    /// - `Conflict` if the caregiver already has an opening on `date`.
    async fn add_availability(&self, caregiver: &str, date: NaiveDate) -> StoreResult<()> {
        let inserted = self.ledgers.lock().await.availabilities.insert(Availability {
            date,
            caregiver: caregiver.to_string(),
        });
        if !inserted {
            return Err(StoreError::Conflict("availability exists".into()));
        }
        Ok(())
    }

    async fn list_available_caregivers(&self, date: NaiveDate) -> StoreResult<Vec<String>> {
        Ok(self
            .ledgers
            .lock()
            .await
            .availabilities
            .iter()
            .filter(|slot| slot.date == date)
            .map(|slot| slot.caregiver.clone())
            .collect())
    }

    /// New vaccines are appended so listings keep first-added order.
    ///
    /// # Errors
    /// - `Conflict` if the count would overflow `u64`.
    async fn add_doses(&self, name: &str, doses: u64) -> StoreResult<Vaccine> {
        let mut ledgers = self.ledgers.lock().await;
        if let Some(vaccine) = ledgers.vaccine_mut(name) {
            vaccine.doses = vaccine
                .doses
                .checked_add(doses)
                .ok_or_else(|| StoreError::Conflict("dose count overflow".into()))?;
            return Ok(vaccine.clone());
        }
        let vaccine = Vaccine {
            name: name.to_string(),
            doses,
        };
        ledgers.vaccines.push(vaccine.clone());
        Ok(vaccine)
    }

    async fn list_vaccines(&self) -> StoreResult<Vec<Vaccine>> {
        Ok(self.ledgers.lock().await.vaccines.clone())
    }

    async fn list_patient_reservations(&self, patient: &str) -> StoreResult<Vec<Reservation>> {
        Ok(self
            .ledgers
            .lock()
            .await
            .reservations
            .values()
            .filter(|reservation| reservation.patient == patient)
            .cloned()
            .collect())
    }

    async fn list_caregiver_reservations(
        &self,
        caregiver: &str,
    ) -> StoreResult<Vec<Reservation>> {
        Ok(self
            .ledgers
            .lock()
            .await
            .reservations
            .values()
            .filter(|reservation| reservation.caregiver == caregiver)
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
