//! Command-line parsing for the interactive prompt.
//!
//! A line is split on whitespace; the first token names the operation and the
//! rest are its arguments. Argument validation is deferred to the handler so
//! session checks can run first, matching the order users see errors in.
use crate::model::AppointmentId;
use chrono::NaiveDate;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreatePatient,
    CreateCaregiver,
    LoginPatient,
    LoginCaregiver,
    SearchCaregiverSchedule,
    Reserve,
    UploadAvailability,
    Cancel,
    AddDoses,
    ShowAppointments,
    Logout,
    Quit,
}

impl Operation {
    pub const ALL: [Operation; 12] = [
        Operation::CreatePatient,
        Operation::CreateCaregiver,
        Operation::LoginPatient,
        Operation::LoginCaregiver,
        Operation::SearchCaregiverSchedule,
        Operation::Reserve,
        Operation::UploadAvailability,
        Operation::Cancel,
        Operation::AddDoses,
        Operation::ShowAppointments,
        Operation::Logout,
        Operation::Quit,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Operation::CreatePatient => "create_patient",
            Operation::CreateCaregiver => "create_caregiver",
            Operation::LoginPatient => "login_patient",
            Operation::LoginCaregiver => "login_caregiver",
            Operation::SearchCaregiverSchedule => "search_caregiver_schedule",
            Operation::Reserve => "reserve",
            Operation::UploadAvailability => "upload_availability",
            Operation::Cancel => "cancel",
            Operation::AddDoses => "add_doses",
            Operation::ShowAppointments => "show_appointments",
            Operation::Logout => "logout",
            Operation::Quit => "quit",
        }
    }

    pub fn usage(&self) -> &'static str {
        match self {
            Operation::CreatePatient => "create_patient <username> <password>",
            Operation::CreateCaregiver => "create_caregiver <username> <password>",
            Operation::LoginPatient => "login_patient <username> <password>",
            Operation::LoginCaregiver => "login_caregiver <username> <password>",
            Operation::SearchCaregiverSchedule => "search_caregiver_schedule <date>",
            Operation::Reserve => "reserve <date> <vaccine>",
            Operation::UploadAvailability => "upload_availability <date>",
            Operation::Cancel => "cancel <appointment_id>",
            Operation::AddDoses => "add_doses <vaccine> <number>",
            Operation::ShowAppointments => "show_appointments",
            Operation::Logout => "logout",
            Operation::Quit => "quit",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operation {
    type Err = CommandError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|operation| operation.name() == value)
            .ok_or_else(|| CommandError::UnknownOperation(value.to_string()))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("invalid operation name: {0}")]
    UnknownOperation(String),
    #[error("{operation} expects {expected} argument(s), got {actual}")]
    WrongArity {
        operation: Operation,
        expected: usize,
        actual: usize,
    },
    #[error("invalid date: {0}")]
    InvalidDate(String),
    #[error("invalid appointment id: {0}")]
    InvalidAppointmentId(String),
    #[error("invalid dose count: {0}")]
    InvalidDoseCount(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub operation: Operation,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let mut tokens = line.split_whitespace();
        let operation = tokens.next().ok_or(CommandError::Empty)?.parse()?;
        Ok(Self {
            operation,
            args: tokens.map(str::to_string).collect(),
        })
    }

    /// Borrow exactly `N` arguments or report the arity mismatch.
    pub fn expect_args<const N: usize>(&self) -> Result<[&str; N], CommandError> {
        if self.args.len() != N {
            return Err(CommandError::WrongArity {
                operation: self.operation,
                expected: N,
                actual: self.args.len(),
            });
        }
        Ok(std::array::from_fn(|index| self.args[index].as_str()))
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate, CommandError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|_| CommandError::InvalidDate(value.to_string()))
}

/// Appointment ids are positive integers.
pub fn parse_appointment_id(value: &str) -> Result<AppointmentId, CommandError> {
    value
        .parse::<AppointmentId>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| CommandError::InvalidAppointmentId(value.to_string()))
}

pub fn parse_dose_count(value: &str) -> Result<u64, CommandError> {
    value
        .parse::<u64>()
        .map_err(|_| CommandError::InvalidDoseCount(value.to_string()))
}
