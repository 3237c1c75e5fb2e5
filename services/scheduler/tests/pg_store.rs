#![cfg(feature = "pg-tests")]

use chrono::NaiveDate;
use scheduler::config::PostgresConfig;
use scheduler::error::SchedulerError;
use scheduler::model::{Identity, Principal, Role};
use scheduler::store::postgres::PostgresStore;
use scheduler::store::{SchedulerStore, StoreError};
use scheduler::workflow;
use serial_test::serial;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;

fn date(value: &str) -> NaiveDate {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("date")
}

async fn reset_postgres(url: &str) -> Result<(), sqlx::Error> {
    let pool = match tokio::time::timeout(
        std::time::Duration::from_secs(2),
        PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(std::time::Duration::from_secs(2))
            .connect(url),
    )
    .await
    {
        Ok(result) => result?,
        Err(_) => return Err(sqlx::Error::PoolTimedOut),
    };
    let has_schema: bool =
        sqlx::query_scalar("SELECT to_regclass('public.reservations') IS NOT NULL")
            .fetch_one(&pool)
            .await?;
    if !has_schema {
        return Ok(());
    }
    sqlx::query("TRUNCATE reservations, availabilities, vaccines, patients, caregivers")
        .execute(&pool)
        .await?;
    sqlx::query("UPDATE appointment_counter SET last_id = 0")
        .execute(&pool)
        .await
        .map(|_| ())
}

async fn pg_store() -> Option<Arc<PostgresStore>> {
    let url = match std::env::var("SCHEDULER_TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!("skipping pg-tests: set SCHEDULER_TEST_DATABASE_URL or DATABASE_URL");
            return None;
        }
    };
    if let Err(err) = reset_postgres(&url).await {
        eprintln!("skipping pg-tests: cannot connect to postgres: {err}");
        return None;
    }
    let pg_cfg = PostgresConfig {
        url,
        max_connections: 5,
        connect_timeout_ms: 5_000,
        acquire_timeout_ms: 5_000,
    };
    match PostgresStore::connect(&pg_cfg).await {
        Ok(store) => Some(Arc::new(store)),
        Err(err) => {
            eprintln!("skipping pg-tests: connect postgres store failed: {err}");
            None
        }
    }
}

fn identity(role: Role, username: &str) -> Identity {
    Identity {
        role,
        username: username.to_string(),
        salt: vec![1; 16],
        password_hash: vec![2; 32],
    }
}

#[tokio::test]
#[serial]
async fn pg_identities_are_unique_per_role() {
    let Some(store) = pg_store().await else {
        return;
    };

    store
        .create_identity(identity(Role::Patient, "pat"))
        .await
        .expect("patient");
    let err = store
        .create_identity(identity(Role::Patient, "pat"))
        .await
        .expect_err("duplicate patient");
    assert!(matches!(err, StoreError::Conflict(_)));
    store
        .create_identity(identity(Role::Caregiver, "pat"))
        .await
        .expect("caregiver with same name");

    let stored = store
        .get_identity(Role::Patient, "pat")
        .await
        .expect("lookup")
        .expect("present");
    assert_eq!(stored.salt, vec![1; 16]);
    assert_eq!(stored.password_hash, vec![2; 32]);
    assert!(!store.username_exists(Role::Caregiver, "nobody").await.expect("exists"));
}

#[tokio::test]
#[serial]
async fn pg_inventory_and_availability_listing() {
    let Some(store) = pg_store().await else {
        return;
    };

    store.add_doses("Pfizer", 3).await.expect("pfizer");
    store.add_doses("Moderna", 1).await.expect("moderna");
    let pfizer = store.add_doses("Pfizer", 2).await.expect("pfizer again");
    assert_eq!(pfizer.doses, 5);
    let names: Vec<_> = store
        .list_vaccines()
        .await
        .expect("vaccines")
        .into_iter()
        .map(|vaccine| vaccine.name)
        .collect();
    assert_eq!(names, vec!["Pfizer", "Moderna"]);

    for caregiver in ["carol", "amy"] {
        store
            .create_identity(identity(Role::Caregiver, caregiver))
            .await
            .expect("caregiver");
        store
            .add_availability(caregiver, date("2024-06-01"))
            .await
            .expect("availability");
    }
    let err = store
        .add_availability("amy", date("2024-06-01"))
        .await
        .expect_err("duplicate availability");
    assert!(matches!(err, StoreError::Conflict(_)));
    assert_eq!(
        store
            .list_available_caregivers(date("2024-06-01"))
            .await
            .expect("caregivers"),
        vec!["amy", "carol"]
    );
}

#[tokio::test]
#[serial]
async fn pg_reserve_and_cancel_round_trip() {
    let Some(store) = pg_store().await else {
        return;
    };

    store
        .create_identity(identity(Role::Caregiver, "carol"))
        .await
        .expect("caregiver");
    store
        .create_identity(identity(Role::Patient, "pat"))
        .await
        .expect("patient");
    store
        .add_availability("carol", date("2024-06-01"))
        .await
        .expect("availability");
    store.add_doses("Pfizer", 5).await.expect("doses");

    let patient = Principal::patient("pat");
    let reservation = workflow::reserve(store.as_ref(), &patient, date("2024-06-01"), "Pfizer")
        .await
        .expect("reserve");
    assert_eq!(reservation.appointment_id, 1);
    assert_eq!(reservation.caregiver, "carol");
    assert_eq!(store.list_vaccines().await.expect("vaccines")[0].doses, 4);
    assert!(
        store
            .list_available_caregivers(date("2024-06-01"))
            .await
            .expect("caregivers")
            .is_empty()
    );
    assert_eq!(
        store
            .list_caregiver_reservations("carol")
            .await
            .expect("caregiver view"),
        vec![reservation.clone()]
    );

    workflow::cancel(store.as_ref(), 1).await.expect("cancel");
    assert_eq!(store.list_vaccines().await.expect("vaccines")[0].doses, 5);
    assert_eq!(
        store
            .list_available_caregivers(date("2024-06-01"))
            .await
            .expect("caregivers"),
        vec!["carol"]
    );
    assert!(
        store
            .list_patient_reservations("pat")
            .await
            .expect("patient view")
            .is_empty()
    );

    let again = workflow::reserve(store.as_ref(), &patient, date("2024-06-01"), "Pfizer")
        .await
        .expect("reserve again");
    assert_eq!(again.appointment_id, 2);
}

#[tokio::test]
#[serial]
async fn pg_failed_reserve_rolls_back() {
    let Some(store) = pg_store().await else {
        return;
    };

    store
        .create_identity(identity(Role::Caregiver, "carol"))
        .await
        .expect("caregiver");
    store
        .create_identity(identity(Role::Patient, "pat"))
        .await
        .expect("patient");
    store
        .add_availability("carol", date("2024-06-01"))
        .await
        .expect("availability");
    store.add_doses("Pfizer", 0).await.expect("doses");

    let patient = Principal::patient("pat");
    let err = workflow::reserve(store.as_ref(), &patient, date("2024-06-01"), "Pfizer")
        .await
        .expect_err("no doses");
    assert!(matches!(
        err,
        scheduler::error::SchedulerError::NotEnoughDoses
    ));
    assert_eq!(
        store
            .list_available_caregivers(date("2024-06-01"))
            .await
            .expect("caregivers"),
        vec!["carol"]
    );
    assert!(
        store
            .list_patient_reservations("pat")
            .await
            .expect("patient view")
            .is_empty()
    );
    assert!(store.is_durable());
    assert_eq!(store.backend_name(), "postgres");
    store.health_check().await.expect("health");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn pg_concurrent_reservers_share_one_slot_safely() {
    let Some(store) = pg_store().await else {
        return;
    };

    store
        .create_identity(identity(Role::Caregiver, "amy"))
        .await
        .expect("caregiver");
    for index in 0..8 {
        store
            .create_identity(identity(Role::Patient, &format!("pat{index}")))
            .await
            .expect("patient");
    }
    store
        .add_availability("amy", date("2024-06-01"))
        .await
        .expect("availability");
    store.add_doses("Pfizer", 5).await.expect("doses");

    let mut handles = Vec::new();
    for index in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let patient = Principal::patient(format!("pat{index}"));
            workflow::reserve(store.as_ref(), &patient, date("2024-06-01"), "Pfizer").await
        }));
    }

    let mut booked = Vec::new();
    for handle in handles {
        match handle.await.expect("join") {
            Ok(reservation) => booked.push(reservation.appointment_id),
            // Losers either abort on a serialization conflict or start after
            // the winner committed and find the slot gone.
            Err(err) => assert!(
                matches!(
                    err,
                    SchedulerError::Store(StoreError::Conflict(_))
                        | SchedulerError::NoCaregiverAvailable
                ),
                "unexpected error: {err}"
            ),
        }
    }
    assert_eq!(booked.len(), 1);
    assert_eq!(store.list_vaccines().await.expect("vaccines")[0].doses, 4);
    assert!(
        store
            .list_available_caregivers(date("2024-06-01"))
            .await
            .expect("caregivers")
            .is_empty()
    );
    assert_eq!(
        store
            .list_caregiver_reservations("amy")
            .await
            .expect("caregiver view")
            .len(),
        1
    );
}
