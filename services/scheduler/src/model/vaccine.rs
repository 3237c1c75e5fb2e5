//! Vaccine inventory records.
use serde::{Deserialize, Serialize};

/// A named vaccine and its remaining dose count.
///
/// `doses` never goes below zero; stores reject adjustments that would.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Vaccine {
    pub name: String,
    pub doses: u64,
}
