use std::time::Duration;

use crate::config::RetryPolicy;

impl RetryPolicy {
    /// Whether a URL that already failed `retry_count` times may be attempted again.
    pub fn allows_retry(&self, retry_count: u32) -> bool {
        retry_count < self.max_retries
    }

    /// Delay before retry number `retry` (1-indexed): `base_delay * multiplier^(retry - 1)`.
    ///
    /// Only depends on its arguments, saturates at [`Duration::MAX`].
    pub fn delay(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1);

        if self.multiplier.fract() == 0.0 && self.multiplier <= u32::MAX as f64 {
            let factor = (self.multiplier as u32).checked_pow(exp);
            return factor
                .and_then(|f| self.base_delay.checked_mul(f))
                .unwrap_or(Duration::MAX);
        }

        let exp = i32::try_from(exp).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exp);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}
