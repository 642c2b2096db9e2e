use bcrypt::DEFAULT_COST;

use crate::error::{AppErr, AppResult};

/// bcrypt hash (`$2b$…`), salt embedded. CPU bound: call off the async workers.
pub fn hash(password: &str) -> AppResult<String> {
    bcrypt::hash(password, DEFAULT_COST).map_err(|e| AppErr::Internal(format!("hash password: {e}")))
}

/// A malformed stored hash counts as a mismatch.
pub fn verify(stored: &str, password: &str) -> bool {
    bcrypt::verify(password, stored).unwrap_or(false)
}
