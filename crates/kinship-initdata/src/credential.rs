use std::fmt;
use std::str::FromStr;

use zeroize::Zeroizing;

use crate::error::InitDataError;

/// The platform-issued application credential (`<numeric id>:<token>`).
///
/// The token part never appears in `Debug` output.
#[derive(Clone)]
pub struct BotCredential {
    value: Zeroizing<String>,
    id_len: usize,
}

impl BotCredential {
    pub fn parse(value: &str) -> Result<Self, InitDataError> {
        let value = value.trim();
        let (id, token) = value
            .split_once(':')
            .ok_or(InitDataError::InvalidCredential)?;

        if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InitDataError::InvalidCredential);
        }
        if token.is_empty()
            || !token
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
        {
            return Err(InitDataError::InvalidCredential);
        }

        Ok(Self {
            value: Zeroizing::new(value.to_string()),
            id_len: id.len(),
        })
    }

    /// The numeric application id before the colon. Not secret.
    pub fn bot_id(&self) -> &str {
        &self.value[..self.id_len]
    }

    pub(crate) fn expose(&self) -> &str {
        self.value.as_str()
    }
}

impl FromStr for BotCredential {
    type Err = InitDataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Debug for BotCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotCredential")
            .field("bot_id", &self.bot_id())
            .field("token", &"<redacted>")
            .finish()
    }
}
