//! Rate-limit metadata reported by the external API on every response.

use serde::{Deserialize, Serialize};

/// Quota information parsed from a single response. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitHeaders {
    /// Requests allowed in the upstream window.
    pub limit: u32,
    /// Requests remaining in the upstream window.
    pub remaining: u32,
    /// When the upstream window resets, in Unix seconds.
    pub reset_at_unix_secs: u64,
}

impl RateLimitHeaders {
    /// Parse rate-limit metadata from response header pairs.
    ///
    /// Header names are matched case-insensitively and both the
    /// `x-rate-limit-*` and `x-ratelimit-*` spellings are accepted. Returns
    /// `None` unless all three of `limit`, `remaining` and `reset` parse.
    pub fn from_headers<'a, I>(headers: I) -> Option<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut limit = None;
        let mut remaining = None;
        let mut reset = None;

        for (name, value) in headers {
            let name = name.trim().to_ascii_lowercase();
            let Some(field) = name
                .strip_prefix("x-rate-limit-")
                .or_else(|| name.strip_prefix("x-ratelimit-"))
            else {
                continue;
            };
            let value = value.trim();
            match field {
                "limit" => limit = value.parse::<u32>().ok(),
                "remaining" => remaining = value.parse::<u32>().ok(),
                "reset" => reset = value.parse::<u64>().ok(),
                _ => {}
            }
        }

        Some(Self {
            limit: limit?,
            remaining: remaining?,
            reset_at_unix_secs: reset?,
        })
    }

    /// Fraction of the upstream quota still available.
    #[must_use]
    pub fn remaining_ratio(&self) -> f64 {
        if self.limit == 0 {
            return 0.0;
        }
        f64::from(self.remaining) / f64::from(self.limit)
    }

    /// Whether the remaining quota has dropped below `threshold`.
    #[must_use]
    pub fn is_low(&self, threshold: f64) -> bool {
        self.remaining_ratio() < threshold
    }

    /// Seconds until the upstream window resets, relative to `now_secs`.
    #[must_use]
    pub const fn seconds_until_reset(&self, now_secs: u64) -> u64 {
        self.reset_at_unix_secs.saturating_sub(now_secs)
    }
}
