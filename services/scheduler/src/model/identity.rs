//! Account identities and the roles they authenticate as.
//!
//! # Purpose
//! Defines stored credentials (`Identity`) and the public part of a logged-in
//! account (`Principal`) handed to the session gate and workflow.
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Patient,
    Caregiver,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Caregiver => "caregiver",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored credential record for one account.
///
/// Usernames are unique per role and compared case-sensitively. The record is
/// immutable once created.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    pub role: Role,
    pub username: String,
    pub salt: Vec<u8>,
    pub password_hash: Vec<u8>,
}

impl Identity {
    pub fn principal(&self) -> Principal {
        Principal {
            role: self.role,
            username: self.username.clone(),
        }
    }
}

// Salt and hash stay out of logs.
impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("role", &self.role)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
pub struct Principal {
    pub role: Role,
    pub username: String,
}

impl Principal {
    pub fn patient(username: impl Into<String>) -> Self {
        Self {
            role: Role::Patient,
            username: username.into(),
        }
    }

    pub fn caregiver(username: impl Into<String>) -> Self {
        Self {
            role: Role::Caregiver,
            username: username.into(),
        }
    }

    pub fn is_patient(&self) -> bool {
        self.role == Role::Patient
    }
}
