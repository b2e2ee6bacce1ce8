use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::config::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlStatus {
    /// Claimable, the next `try_claim` starts an attempt
    Pending,
    /// Failed, waiting out its backoff delay before becoming `Pending` again
    Backoff,
    InFlight,
    Succeeded,
    Failed,
}

impl UrlStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlRecord {
    pub url: String,
    pub status: UrlStatus,
    pub retry_count: u32,
    pub next_delay: Duration,
}

/// Outcome of [`Frontier::try_claim`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// The caller now owns the only in-flight attempt for this URL.
    Fresh,
    AlreadyInFlight,
    AlreadySucceeded,
    AlreadyFailed,
}

/// Outcome of [`Frontier::record_failure_or_retry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retry {
    After(Duration),
    PermanentlyFailed,
}

/// Every URL seen during a run, with its status and retry bookkeeping.
///
/// All reads and writes go through a single lock over the whole map.
#[derive(Debug)]
pub struct Frontier {
    policy: RetryPolicy,
    records: Mutex<HashMap<String, UrlRecord>>,
}

impl Frontier {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            records: Mutex::new(HashMap::new()),
        }
    }

    fn records(&self) -> MutexGuard<'_, HashMap<String, UrlRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn try_claim(&self, url: &str) -> Claim {
        let mut records = self.records();
        match records.get_mut(url) {
            None => {
                records.insert(
                    url.to_string(),
                    UrlRecord {
                        url: url.to_string(),
                        status: UrlStatus::InFlight,
                        retry_count: 0,
                        next_delay: self.policy.base_delay,
                    },
                );
                Claim::Fresh
            }
            Some(rec) => match rec.status {
                UrlStatus::Pending => {
                    rec.status = UrlStatus::InFlight;
                    Claim::Fresh
                }
                UrlStatus::InFlight | UrlStatus::Backoff => Claim::AlreadyInFlight,
                UrlStatus::Succeeded => Claim::AlreadySucceeded,
                UrlStatus::Failed => Claim::AlreadyFailed,
            },
        }
    }

    pub fn record_success(&self, url: &str) {
        self.update(url, UrlStatus::InFlight, |rec| rec.status = UrlStatus::Succeeded);
    }

    /// Counts a failed attempt. A URL allowed to retry stays unclaimable until
    /// [`Frontier::release_retry`] is called for it.
    pub fn record_failure_or_retry(&self, url: &str) -> Retry {
        let policy = self.policy;
        self.update(url, UrlStatus::InFlight, |rec| {
            let allowed = policy.allows_retry(rec.retry_count);
            rec.retry_count = rec.retry_count.saturating_add(1);
            if allowed {
                let delay = policy.delay(rec.retry_count);
                rec.next_delay = policy.delay(rec.retry_count.saturating_add(1));
                rec.status = UrlStatus::Backoff;
                Retry::After(delay)
            } else {
                rec.status = UrlStatus::Failed;
                Retry::PermanentlyFailed
            }
        })
        .unwrap_or(Retry::PermanentlyFailed)
    }

    /// Marks the URL as failed without going through the retry policy.
    pub fn record_permanent_failure(&self, url: &str) {
        self.update(url, UrlStatus::InFlight, |rec| rec.status = UrlStatus::Failed);
    }

    /// Ends the backoff delay of a URL, the next `try_claim` will be `Fresh`.
    pub fn release_retry(&self, url: &str) -> bool {
        self.update(url, UrlStatus::Backoff, |rec| rec.status = UrlStatus::Pending)
            .is_some()
    }

    fn update<F, R>(&self, url: &str, from: UrlStatus, f: F) -> Option<R>
    where
        F: FnOnce(&mut UrlRecord) -> R,
    {
        let mut records = self.records();
        match records.get_mut(url) {
            Some(rec) if rec.status == from => Some(f(rec)),
            Some(rec) => {
                log::error!("Unexpected transition for {url} in state {:?}", rec.status);
                None
            }
            None => {
                log::error!("Unclaimed URL {url} cannot be updated");
                None
            }
        }
    }

    pub fn get(&self, url: &str) -> Option<UrlRecord> {
        self.records().get(url).cloned()
    }

    pub fn snapshot(&self) -> Vec<UrlRecord> {
        self.records().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    fn frontier(max_retries: u32) -> Frontier {
        Frontier::new(RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(10),
            multiplier: 2.0,
        })
    }

    #[test]
    fn claim_is_a_dedup_gate() {
        let f = frontier(3);
        assert_eq!(f.try_claim("a"), Claim::Fresh);
        assert_eq!(f.try_claim("a"), Claim::AlreadyInFlight);
        f.record_success("a");
        assert_eq!(f.try_claim("a"), Claim::AlreadySucceeded);
        assert_eq!(f.len(), 1);
        assert_eq!(f.get("a").unwrap().status, UrlStatus::Succeeded);
    }

    #[test]
    fn concurrent_claims_have_one_winner() {
        let f = Arc::new(frontier(3));
        let handles = (0..16)
            .map(|_| {
                let f = f.clone();
                thread::spawn(move || f.try_claim("same"))
            })
            .collect::<Vec<_>>();
        let fresh = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|c| *c == Claim::Fresh)
            .count();
        assert_eq!(fresh, 1);
    }

    #[test]
    fn retries_then_fails() {
        let f = frontier(2);

        assert_eq!(f.try_claim("b"), Claim::Fresh);
        assert_eq!(
            f.record_failure_or_retry("b"),
            Retry::After(Duration::from_millis(10))
        );
        assert_eq!(f.get("b").unwrap().status, UrlStatus::Backoff);

        assert!(f.release_retry("b"));
        assert_eq!(f.try_claim("b"), Claim::Fresh);
        assert_eq!(
            f.record_failure_or_retry("b"),
            Retry::After(Duration::from_millis(20))
        );

        assert!(f.release_retry("b"));
        assert_eq!(f.try_claim("b"), Claim::Fresh);
        assert_eq!(f.record_failure_or_retry("b"), Retry::PermanentlyFailed);

        let rec = f.get("b").unwrap();
        assert_eq!(rec.status, UrlStatus::Failed);
        assert_eq!(rec.retry_count, 3);
        assert_eq!(f.try_claim("b"), Claim::AlreadyFailed);
    }

    #[test]
    fn success_keeps_retry_count() {
        let f = frontier(3);
        f.try_claim("c");
        f.record_failure_or_retry("c");
        f.release_retry("c");
        f.try_claim("c");
        f.record_success("c");

        let rec = f.get("c").unwrap();
        assert_eq!(rec.status, UrlStatus::Succeeded);
        assert_eq!(rec.retry_count, 1);
    }

    #[test]
    fn backoff_is_not_claimable() {
        let f = frontier(3);
        f.try_claim("e");
        f.record_failure_or_retry("e");

        assert_eq!(f.try_claim("e"), Claim::AlreadyInFlight);
        assert_eq!(f.try_claim("e"), Claim::AlreadyInFlight);
        assert_eq!(f.get("e").unwrap().status, UrlStatus::Backoff);

        assert!(f.release_retry("e"));
        assert!(!f.release_retry("e"));
        assert_eq!(f.try_claim("e"), Claim::Fresh);
        assert_eq!(f.try_claim("e"), Claim::AlreadyInFlight);
    }

    #[test]
    fn permanent_failure_skips_retries() {
        let f = frontier(3);
        f.try_claim("bad");
        f.record_permanent_failure("bad");

        let rec = f.get("bad").unwrap();
        assert_eq!(rec.status, UrlStatus::Failed);
        assert_eq!(rec.retry_count, 0);
    }

    #[test]
    fn terminal_states_do_not_move() {
        let f = frontier(3);
        f.try_claim("d");
        f.record_success("d");
        f.record_permanent_failure("d");
        assert_eq!(f.record_failure_or_retry("d"), Retry::PermanentlyFailed);
        assert!(!f.release_retry("d"));
        assert_eq!(f.get("d").unwrap().status, UrlStatus::Succeeded);
        assert!(f.get("unknown").is_none());
    }
}
