//! Shared primitive types used across both scoring engines.

/// A stable, unique customer identifier (`master_id` in the source table).
pub type CustomerId = String;

/// The canonical scoring-run identifier.
pub type RunId = String;

/// Durations in the CLTV engine are measured in weeks.
pub type Weeks = f64;

pub const DAYS_PER_WEEK: f64 = 7.0;
