use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::frontier::UrlRecord;

/// Outcome of a run. Partial failures are reported here, never raised.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    /// URLs fetched successfully, in completion order
    pub succeeded: Vec<String>,
    /// URLs that were given up on, in completion order
    pub failed: Vec<String>,
    /// Items accepted by the sink
    pub item_count: u64,
    /// Retry count of every URL that failed at least once
    pub retries: BTreeMap<String, u32>,
    pub parse_errors: u64,
    pub sink_errors: u64,
}

#[derive(Debug, Default)]
pub(crate) struct ReportBuilder {
    report: Mutex<RunReport>,
}

impl ReportBuilder {
    fn report(&self) -> MutexGuard<'_, RunReport> {
        self.report.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn succeeded(&self, url: &str) {
        self.report().succeeded.push(url.to_string());
    }

    pub fn failed(&self, url: &str) {
        self.report().failed.push(url.to_string());
    }

    pub fn item_delivered(&self) {
        self.report().item_count += 1;
    }

    pub fn parse_error(&self) {
        self.report().parse_errors += 1;
    }

    pub fn sink_error(&self) {
        self.report().sink_errors += 1;
    }

    pub fn finalize(&self, records: Vec<UrlRecord>) -> RunReport {
        let mut report = self.report().clone();
        report.retries = records
            .into_iter()
            .filter(|rec| rec.retry_count > 0)
            .map(|rec| (rec.url, rec.retry_count))
            .collect();
        report
    }
}
