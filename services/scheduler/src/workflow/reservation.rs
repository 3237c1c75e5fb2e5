//! Reserve and cancel critical sections.
//!
//! Each operation runs every read and write inside one [`LedgerTx`]. Any early
//! return drops the transaction, which rolls it back, so a failed reserve never
//! leaves a decremented dose count, a consumed slot, or an orphan reservation.
use crate::error::{SchedulerError, SchedulerResult};
use crate::model::{AppointmentId, Principal, Reservation, Role};
use crate::store::SchedulerStore;
use chrono::NaiveDate;

/// Book the first caregiver available on `date` for `patient` with one dose
/// of `vaccine`.
///
/// The caregiver is the lexicographically smallest username with an opening
/// on `date`.
///
/// # Errors
/// - `NoCaregiverAvailable` when nobody has an opening on `date`.
/// - `NotEnoughDoses` when `vaccine` is unknown or has no doses left.
/// - `CaregiverAlreadyBooked` when the chosen caregiver already holds a
///   reservation on `date`.
/// - `Store` for persistence failures, including serialization conflicts with
///   another process.
pub async fn reserve(
    store: &dyn SchedulerStore,
    patient: &Principal,
    date: NaiveDate,
    vaccine: &str,
) -> SchedulerResult<Reservation> {
    if !patient.is_patient() {
        return Err(SchedulerError::WrongRole {
            required: Role::Patient,
        });
    }

    let mut tx = store.begin().await?;
    let caregiver = tx
        .first_available_caregiver(date)
        .await?
        .ok_or(SchedulerError::NoCaregiverAvailable)?;

    let in_stock = tx
        .get_vaccine(vaccine)
        .await?
        .is_some_and(|stock| stock.doses > 0);
    if !in_stock {
        return Err(SchedulerError::NotEnoughDoses);
    }

    if tx.caregiver_has_reservation(&caregiver, date).await? {
        tracing::warn!(%caregiver, %date, "slot still listed for a booked caregiver");
        return Err(SchedulerError::CaregiverAlreadyBooked);
    }

    let reservation = Reservation {
        appointment_id: tx.next_appointment_id().await?,
        date,
        caregiver,
        patient: patient.username.clone(),
        vaccine: vaccine.to_string(),
    };
    tx.insert_reservation(&reservation).await?;
    tx.remove_availability(&reservation.caregiver, date).await?;
    tx.adjust_doses(vaccine, -1).await?;
    tx.commit().await?;

    metrics::counter!("scheduler_reservations_total").increment(1);
    tracing::info!(
        appointment_id = reservation.appointment_id,
        caregiver = %reservation.caregiver,
        patient = %reservation.patient,
        vaccine,
        %date,
        "appointment reserved"
    );
    Ok(reservation)
}

/// Cancel an appointment, returning its slot to the caregiver and its dose to
/// inventory.
///
/// Any logged-in principal may cancel any appointment id.
///
/// # Errors
/// - `AppointmentNotFound` when no reservation has `appointment_id`; nothing
///   is changed.
/// - `Store` for persistence failures.
pub async fn cancel(
    store: &dyn SchedulerStore,
    appointment_id: AppointmentId,
) -> SchedulerResult<Reservation> {
    let mut tx = store.begin().await?;
    let reservation = tx
        .get_reservation(appointment_id)
        .await?
        .ok_or(SchedulerError::AppointmentNotFound(appointment_id))?;

    tx.restore_availability(&reservation.caregiver, reservation.date)
        .await?;
    tx.delete_reservation(appointment_id).await?;
    tx.adjust_doses(&reservation.vaccine, 1).await?;
    tx.commit().await?;

    metrics::counter!("scheduler_cancellations_total").increment(1);
    tracing::info!(
        appointment_id,
        caregiver = %reservation.caregiver,
        vaccine = %reservation.vaccine,
        "appointment canceled"
    );
    Ok(reservation)
}
