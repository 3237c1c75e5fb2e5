//! Outcome errors for scheduler commands.
//!
//! Every variant is recoverable at the command level: the dispatcher renders it
//! as a line of output and keeps reading commands.
use crate::auth::password::WeakPassword;
use crate::model::{AppointmentId, Role};
use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("weak password: {0}")]
    WeakPassword(#[from] WeakPassword),

    #[error("not logged in")]
    NotLoggedIn,
    #[error("already logged in")]
    AlreadyLoggedIn,
    #[error("{required} session required")]
    WrongRole { required: Role },
    #[error("login failed")]
    LoginFailed,

    #[error("username taken")]
    UsernameTaken,
    #[error("appointment {0} does not exist")]
    AppointmentNotFound(AppointmentId),

    #[error("no caregiver is available")]
    NoCaregiverAvailable,
    #[error("not enough available doses")]
    NotEnoughDoses,
    #[error("caregiver already booked for that date")]
    CaregiverAlreadyBooked,

    #[error("credential error: {0}")]
    Credential(anyhow::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SchedulerError {
    /// Coarse category logged with every failed command.
    pub fn kind(&self) -> &'static str {
        match self {
            SchedulerError::WeakPassword(_) => "invalid_input",
            SchedulerError::NotLoggedIn
            | SchedulerError::AlreadyLoggedIn
            | SchedulerError::WrongRole { .. }
            | SchedulerError::LoginFailed => "authorization",
            SchedulerError::UsernameTaken | SchedulerError::AppointmentNotFound(_) => "not_found",
            SchedulerError::NoCaregiverAvailable
            | SchedulerError::NotEnoughDoses
            | SchedulerError::CaregiverAlreadyBooked => "capacity",
            SchedulerError::Credential(_) | SchedulerError::Store(_) => "internal",
        }
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
