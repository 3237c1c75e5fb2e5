//! Postgres-backed implementation of the scheduler store.
//!
//! # What this module is
//! Implements [`SchedulerStore`] using Postgres (via `sqlx`) as the durable,
//! shared store for accounts, availability slots, vaccine inventory, and
//! reservations.
//!
//! # Key invariants
//! - Reserve and cancel run inside one transaction opened at `SERIALIZABLE`
//!   isolation, so several scheduler processes sharing the database cannot
//!   interleave their read-then-write sequences.
//! - Appointment ids come from the single-row `appointment_counter` table,
//!   advanced inside the same transaction as the insert. A rolled-back
//!   reservation leaves a gap; ids are never reused.
//! - `vaccines.doses` carries a `CHECK (doses >= 0)` constraint in addition to
//!   the guarded update in [`LedgerTx::adjust_doses`].
//!
//! # Security notes
//! - Database URLs may contain credentials; avoid logging them.
//! - Dynamic SQL is limited to the fixed credential table names in
//!   [`identity_table`].
//!
//! # Operational notes
//! Migrations are embedded with `sqlx::migrate!("./migrations")` and run on
//! connect so commands can assume the schema exists.
use super::{LedgerTx, SchedulerStore, StoreError, StoreResult};
use crate::config::PostgresConfig;
use crate::model::{AppointmentId, Identity, Reservation, Role, Vaccine};
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::str::FromStr;
use std::time::Duration;

/// Durable scheduler store backed by Postgres.
///
/// # Example
/// ```rust,no_run
/// use scheduler::config::PostgresConfig;
/// use scheduler::store::postgres::PostgresStore;
///
/// async fn open(pg: PostgresConfig) {
///     let _ = PostgresStore::connect(&pg).await;
/// }
/// ```
pub struct PostgresStore {
    pool: PgPool,
}

#[derive(Debug, Clone, FromRow)]
struct DbIdentity {
    username: String,
    salt: Vec<u8>,
    password_hash: Vec<u8>,
}

#[derive(Debug, Clone, FromRow)]
struct DbVaccine {
    name: String,
    doses: i64,
}

#[derive(Debug, Clone, FromRow)]
struct DbReservation {
    appointment_id: i64,
    reserved_on: NaiveDate,
    caregiver: String,
    patient: String,
    vaccine: String,
}

impl PostgresStore {
    /// Connect to Postgres and apply the embedded migrations.
    ///
    /// # Errors
    /// - Connection, pool setup, or migration failures.
    pub async fn connect(pg: &PostgresConfig) -> StoreResult<Self> {
        Self::connect_internal(pg, true).await
    }

    /// Connect without running migrations, for tests that manage the schema.
    #[cfg(any(test, feature = "pg-tests"))]
    pub async fn connect_without_migrations(pg: &PostgresConfig) -> StoreResult<Self> {
        Self::connect_internal(pg, false).await
    }

    async fn connect_internal(pg: &PostgresConfig, run_migrations: bool) -> StoreResult<Self> {
        // Fail fast on an unreachable database instead of hanging the prompt.
        let connect_options = PgConnectOptions::from_str(&pg.url)?;
        let pool = tokio::time::timeout(
            Duration::from_millis(pg.connect_timeout_ms),
            PgPoolOptions::new()
                .max_connections(pg.max_connections)
                .acquire_timeout(Duration::from_millis(pg.acquire_timeout_ms))
                .connect_with(connect_options),
        )
        .await
        .map_err(|_| sqlx::Error::PoolTimedOut)??;

        if run_migrations {
            sqlx::migrate!("./migrations").run(&pool).await?;
        }

        Ok(Self { pool })
    }
}

/// Open transaction plus the connection it is pinned to.
///
/// Dropping a `sqlx::Transaction` without committing issues a rollback.
struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn first_available_caregiver(&mut self, date: NaiveDate) -> StoreResult<Option<String>> {
        let caregiver = sqlx::query_scalar::<_, String>(
            "SELECT caregiver FROM availabilities WHERE available_on = $1 ORDER BY caregiver LIMIT 1",
        )
        .bind(date)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(caregiver)
    }

    async fn remove_availability(&mut self, caregiver: &str, date: NaiveDate) -> StoreResult<()> {
        let result =
            sqlx::query("DELETE FROM availabilities WHERE available_on = $1 AND caregiver = $2")
                .bind(date)
                .bind(caregiver)
                .execute(&mut *self.tx)
                .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("availability".into()));
        }
        Ok(())
    }

    async fn restore_availability(&mut self, caregiver: &str, date: NaiveDate) -> StoreResult<()> {
        // The caregiver may have re-uploaded the same date after the booking.
        sqlx::query(
            "INSERT INTO availabilities (available_on, caregiver) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(date)
        .bind(caregiver)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_vaccine(&mut self, name: &str) -> StoreResult<Option<Vaccine>> {
        let row = sqlx::query_as::<_, DbVaccine>("SELECT name, doses FROM vaccines WHERE name = $1")
            .bind(name)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(vaccine_from_db).transpose()
    }

    async fn adjust_doses(&mut self, name: &str, delta: i64) -> StoreResult<Vaccine> {
        let row = sqlx::query_as::<_, DbVaccine>(
            "UPDATE vaccines SET doses = doses + $2 WHERE name = $1 AND doses + $2 >= 0 RETURNING name, doses",
        )
        .bind(name)
        .bind(delta)
        .fetch_optional(&mut *self.tx)
        .await?;
        match row {
            Some(row) => vaccine_from_db(row),
            None => {
                let exists = sqlx::query_scalar::<_, i64>(
                    "SELECT COUNT(*) FROM vaccines WHERE name = $1",
                )
                .bind(name)
                .fetch_one(&mut *self.tx)
                .await?
                    > 0;
                if exists {
                    Err(StoreError::Conflict("not enough doses".into()))
                } else {
                    Err(StoreError::NotFound("vaccine".into()))
                }
            }
        }
    }

    async fn caregiver_has_reservation(
        &mut self,
        caregiver: &str,
        date: NaiveDate,
    ) -> StoreResult<bool> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM reservations WHERE caregiver = $1 AND reserved_on = $2",
        )
        .bind(caregiver)
        .bind(date)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(count > 0)
    }

    async fn next_appointment_id(&mut self) -> StoreResult<AppointmentId> {
        // The row lock taken by the UPDATE serializes concurrent reservers.
        let id = sqlx::query_scalar::<_, i64>(
            "UPDATE appointment_counter SET last_id = last_id + 1 RETURNING last_id",
        )
        .fetch_one(&mut *self.tx)
        .await?;
        from_db_u64(id, "appointment id")
    }

    async fn insert_reservation(&mut self, reservation: &Reservation) -> StoreResult<()> {
        let insert = sqlx::query(
            r#"INSERT INTO reservations (appointment_id, reserved_on, caregiver, patient, vaccine)
               VALUES ($1, $2, $3, $4, $5)"#,
        )
        .bind(to_db_i64(reservation.appointment_id, "appointment id")?)
        .bind(reservation.date)
        .bind(&reservation.caregiver)
        .bind(&reservation.patient)
        .bind(&reservation.vaccine)
        .execute(&mut *self.tx)
        .await;
        if let Err(err) = insert {
            if is_unique_violation(&err) {
                return Err(StoreError::Conflict("reservation exists".into()));
            }
            return Err(err.into());
        }
        Ok(())
    }

    async fn get_reservation(&mut self, id: AppointmentId) -> StoreResult<Option<Reservation>> {
        let row = sqlx::query_as::<_, DbReservation>(
            r#"SELECT appointment_id, reserved_on, caregiver, patient, vaccine
               FROM reservations WHERE appointment_id = $1"#,
        )
        .bind(to_db_i64(id, "appointment id")?)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(reservation_from_db).transpose()
    }

    async fn delete_reservation(&mut self, id: AppointmentId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM reservations WHERE appointment_id = $1")
            .bind(to_db_i64(id, "appointment id")?)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("reservation".into()));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl SchedulerStore for PostgresStore {
    async fn begin(&self) -> StoreResult<Box<dyn LedgerTx>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;
        Ok(Box::new(PgLedgerTx { tx }))
    }

    async fn create_identity(&self, identity: Identity) -> StoreResult<()> {
        let table = identity_table(identity.role);
        // `table` comes from a fixed allowlist; never format user input here.
        let query =
            format!("INSERT INTO {table} (username, salt, password_hash) VALUES ($1, $2, $3)");
        let insert = sqlx::query(&query)
            .bind(&identity.username)
            .bind(&identity.salt)
            .bind(&identity.password_hash)
            .execute(&self.pool)
            .await;
        if let Err(err) = insert {
            if is_unique_violation(&err) {
                return Err(StoreError::Conflict("username taken".into()));
            }
            return Err(err.into());
        }
        Ok(())
    }

    async fn get_identity(&self, role: Role, username: &str) -> StoreResult<Option<Identity>> {
        let table = identity_table(role);
        let query = format!("SELECT username, salt, password_hash FROM {table} WHERE username = $1");
        let row = sqlx::query_as::<_, DbIdentity>(&query)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| Identity {
            role,
            username: row.username,
            salt: row.salt,
            password_hash: row.password_hash,
        }))
    }

    async fn username_exists(&self, role: Role, username: &str) -> StoreResult<bool> {
        let table = identity_table(role);
        let query = format!("SELECT COUNT(*) FROM {table} WHERE username = $1");
        let count = sqlx::query_scalar::<_, i64>(&query)
            .bind(username)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    async fn add_availability(&self, caregiver: &str, date: NaiveDate) -> StoreResult<()> {
        let insert =
            sqlx::query("INSERT INTO availabilities (available_on, caregiver) VALUES ($1, $2)")
                .bind(date)
                .bind(caregiver)
                .execute(&self.pool)
                .await;
        if let Err(err) = insert {
            if is_unique_violation(&err) {
                return Err(StoreError::Conflict("availability exists".into()));
            }
            return Err(err.into());
        }
        Ok(())
    }

    async fn list_available_caregivers(&self, date: NaiveDate) -> StoreResult<Vec<String>> {
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT caregiver FROM availabilities WHERE available_on = $1 ORDER BY caregiver",
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn add_doses(&self, name: &str, doses: u64) -> StoreResult<Vaccine> {
        let row = sqlx::query_as::<_, DbVaccine>(
            r#"INSERT INTO vaccines (name, doses) VALUES ($1, $2)
               ON CONFLICT (name) DO UPDATE SET doses = vaccines.doses + EXCLUDED.doses
               RETURNING name, doses"#,
        )
        .bind(name)
        .bind(to_db_i64(doses, "doses")?)
        .fetch_one(&self.pool)
        .await?;
        vaccine_from_db(row)
    }

    async fn list_vaccines(&self) -> StoreResult<Vec<Vaccine>> {
        let rows =
            sqlx::query_as::<_, DbVaccine>("SELECT name, doses FROM vaccines ORDER BY added_seq")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(vaccine_from_db).collect()
    }

    async fn list_patient_reservations(&self, patient: &str) -> StoreResult<Vec<Reservation>> {
        let rows = sqlx::query_as::<_, DbReservation>(
            r#"SELECT appointment_id, reserved_on, caregiver, patient, vaccine
               FROM reservations WHERE patient = $1 ORDER BY appointment_id"#,
        )
        .bind(patient)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(reservation_from_db).collect()
    }

    async fn list_caregiver_reservations(
        &self,
        caregiver: &str,
    ) -> StoreResult<Vec<Reservation>> {
        let rows = sqlx::query_as::<_, DbReservation>(
            r#"SELECT appointment_id, reserved_on, caregiver, patient, vaccine
               FROM reservations WHERE caregiver = $1 ORDER BY appointment_id"#,
        )
        .bind(caregiver)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(reservation_from_db).collect()
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn is_durable(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

fn identity_table(role: Role) -> &'static str {
    match role {
        Role::Patient => "patients",
        Role::Caregiver => "caregivers",
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    database_code_is(err, &["23505"])
}

/// Serialization failures and deadlocks; the transaction can be retried.
pub(crate) fn is_serialization_failure(err: &sqlx::Error) -> bool {
    database_code_is(err, &["40001", "40P01"])
}

fn database_code_is(err: &sqlx::Error, codes: &[&str]) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err
            .code()
            .map(|code| codes.iter().any(|candidate| code == *candidate))
            .unwrap_or(false);
    }
    false
}

fn to_db_i64(value: u64, label: &str) -> StoreResult<i64> {
    i64::try_from(value).map_err(|_| StoreError::Unexpected(anyhow!("{label} out of range")))
}

fn from_db_u64(value: i64, label: &str) -> StoreResult<u64> {
    u64::try_from(value).map_err(|_| StoreError::Unexpected(anyhow!("invalid {label} {value}")))
}

fn vaccine_from_db(row: DbVaccine) -> StoreResult<Vaccine> {
    Ok(Vaccine {
        name: row.name,
        doses: from_db_u64(row.doses, "doses")?,
    })
}

fn reservation_from_db(row: DbReservation) -> StoreResult<Reservation> {
    Ok(Reservation {
        appointment_id: from_db_u64(row.appointment_id, "appointment id")?,
        date: row.reserved_on,
        caregiver: row.caregiver,
        patient: row.patient,
        vaccine: row.vaccine,
    })
}
