//! Account authentication helpers.
//!
//! # Purpose
//! Groups the password strength rule and salted credential hashing used when
//! accounts are created and when they log in.
pub mod credentials;
pub mod password;
