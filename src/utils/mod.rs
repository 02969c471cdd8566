pub mod json;

use chrono::{DateTime, NaiveDateTime, Utc};

pub fn to_iso(dt: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).to_rfc3339()
}

/// Emails are compared case-insensitively and stored normalized.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
