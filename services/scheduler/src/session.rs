//! Per-process login state.
//!
//! # Purpose
//! Holds at most one authenticated principal (a patient or a caregiver, never
//! both) and answers the role checks every gated command performs. The session
//! is an ordinary value owned by the dispatcher, so tests can run several
//! independent sessions against one store.
use crate::error::{SchedulerError, SchedulerResult};
use crate::model::{Principal, Role};

#[derive(Debug, Default)]
pub struct Session {
    current: Option<Principal>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&Principal> {
        self.current.as_ref()
    }

    pub fn is_logged_in(&self) -> bool {
        self.current.is_some()
    }

    /// Fails with `AlreadyLoggedIn` while any principal is active.
    pub fn ensure_logged_out(&self) -> SchedulerResult<()> {
        if self.is_logged_in() {
            return Err(SchedulerError::AlreadyLoggedIn);
        }
        Ok(())
    }

    pub fn login(&mut self, principal: Principal) -> SchedulerResult<()> {
        self.ensure_logged_out()?;
        tracing::debug!(role = %principal.role, username = %principal.username, "session opened");
        self.current = Some(principal);
        Ok(())
    }

    pub fn logout(&mut self) -> SchedulerResult<Principal> {
        let principal = self.current.take().ok_or(SchedulerError::NotLoggedIn)?;
        tracing::debug!(role = %principal.role, username = %principal.username, "session closed");
        Ok(principal)
    }

    pub fn require_any(&self) -> SchedulerResult<&Principal> {
        self.current.as_ref().ok_or(SchedulerError::NotLoggedIn)
    }

    /// Require an active session for `role`.
    ///
    /// No session yields `NotLoggedIn`; a session for the other role yields
    /// `WrongRole` so callers can word the two cases differently.
    pub fn require(&self, role: Role) -> SchedulerResult<&Principal> {
        let principal = self.require_any()?;
        if principal.role != role {
            return Err(SchedulerError::WrongRole { required: role });
        }
        Ok(principal)
    }
}
