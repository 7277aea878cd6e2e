use crate::error::InitDataError;

/// Oldest accepted payload, in seconds. An age of exactly this value still passes.
pub const DEFAULT_MAX_AGE_SECS: i64 = 30 * 60;
/// How far ahead of the local clock an `auth_date` may be.
pub const DEFAULT_MAX_FUTURE_SKEW_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    pub max_age_secs: i64,
    /// `None` accepts any future-dated payload.
    pub max_future_skew_secs: Option<i64>,
    /// Skip the age checks entirely. The timestamp must still parse.
    pub skip: bool,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self {
            max_age_secs: DEFAULT_MAX_AGE_SECS,
            max_future_skew_secs: Some(DEFAULT_MAX_FUTURE_SKEW_SECS),
            skip: false,
        }
    }
}

pub fn parse_auth_date(decoded: Option<&str>) -> Result<i64, InitDataError> {
    let raw = decoded.ok_or(InitDataError::MissingTimestamp)?;
    raw.parse::<i64>()
        .map_err(|_| InitDataError::InvalidTimestamp)
}

impl FreshnessPolicy {
    pub fn check(&self, auth_date: i64, now_unix: i64) -> Result<(), InitDataError> {
        if self.skip {
            return Ok(());
        }

        let age = now_unix.saturating_sub(auth_date);
        if age > self.max_age_secs {
            return Err(InitDataError::StaleSession);
        }

        if let Some(skew) = self.max_future_skew_secs
            && auth_date > now_unix.saturating_add(skew)
        {
            return Err(InitDataError::TimestampInFuture);
        }

        Ok(())
    }
}
