use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Verification tokens are valid for one hour.
pub const VERIFICATION_TTL_MINUTES: i64 = 60;

const TOKEN_LEN: usize = 48;

/// Random URL-safe verification token.
pub fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

pub fn verification_expiry(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::minutes(VERIFICATION_TTL_MINUTES)
}
