use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, Result};
use crossbeam_channel::{Receiver, Sender};
use futures::{future, FutureExt};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use crate::config::{RequestTemplate, RunConfig};
use crate::error::FetchError;
use crate::fetcher::Fetcher;
use crate::frontier::{Claim, Frontier, Retry};
use crate::handler::{Document, ItemSink, ParseHandler, ParseResult};
use crate::pending::PendingCounter;
use crate::report::{ReportBuilder, RunReport};

/// State shared by every worker of a run.
#[derive(Debug)]
struct Shared {
    frontier: Frontier,
    pending: PendingCounter,
    report: ReportBuilder,
}

/// A single crawl run: seeds, workers, and the collaborators they call.
pub struct Crawler<F: ?Sized, H: ?Sized, S: ?Sized> {
    config: RunConfig,
    fetcher: Arc<F>,
    handler: Arc<H>,
    sink: Arc<S>,
}

impl<F, H, S> Crawler<F, H, S>
where
    F: Fetcher + ?Sized + 'static,
    H: ParseHandler + ?Sized + 'static,
    S: ItemSink + ?Sized + 'static,
{
    pub fn new(config: RunConfig, fetcher: Arc<F>, handler: Arc<H>, sink: Arc<S>) -> Self {
        Self {
            config,
            fetcher,
            handler,
            sink,
        }
    }

    /// Crawls until every discovered URL is resolved, then shuts the workers down.
    ///
    /// Only fails on an invalid config, or when interrupted by Ctrl-C if
    /// `handle_sigint` is set.
    pub async fn run(self) -> Result<RunReport> {
        let Self {
            config,
            fetcher,
            handler,
            sink,
        } = self;
        config.validate()?;

        let shared = Arc::new(Shared {
            frontier: Frontier::new(config.retry),
            pending: PendingCounter::new(),
            report: ReportBuilder::default(),
        });
        let request = Arc::new(config.request.clone());

        let (tx_url, rx_url) = mpsc::unbounded_channel::<String>();
        let (tx_doc, rx_doc) = crossbeam_channel::unbounded::<Document>();
        let (tx_stop, rx_stop) = crossbeam_channel::bounded::<()>(0);
        let (tx_shutdown, rx_shutdown) = watch::channel(false);

        // Seeds

        shared.pending.add(config.start_urls.len());
        for url in &config.start_urls {
            log::info!("Starting with {url}");
            tx_url.send(url.clone())?;
        }

        // Parse workers

        let mut parse_workers = vec![];
        for id in 0..config.parse_workers {
            let worker = ParseWorker {
                rx_doc: rx_doc.clone(),
                rx_stop: rx_stop.clone(),
                tx_url: tx_url.clone(),
                shared: shared.clone(),
                handler: handler.clone(),
                sink: sink.clone(),
            };
            let worker = thread::Builder::new()
                .name(format!("parse-{id}"))
                .spawn(move || worker.run())?;
            parse_workers.push(worker);
        }

        // Crawl workers

        let rx_url = Arc::new(Mutex::new(rx_url));
        let crawl_workers = (0..config.crawl_workers)
            .map(|id| {
                let worker = CrawlWorker {
                    id,
                    rx_url: rx_url.clone(),
                    rx_shutdown: rx_shutdown.clone(),
                    tx_url: tx_url.clone(),
                    tx_doc: tx_doc.clone(),
                    shared: shared.clone(),
                    fetcher: fetcher.clone(),
                    request: request.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect::<Vec<_>>();

        // Quiescence

        let sigint = async {
            if !config.handle_sigint {
                return future::pending::<()>().await;
            }
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::warn!("Couldn't listen for SIGINT: {e}");
                future::pending::<()>().await
            }
        };
        let interrupted = tokio::select! {
            _ = shared.pending.wait_zero() => false,
            _ = sigint => true,
        };

        // Shutdown, the queues are only dropped once every worker has exited

        tx_shutdown.send_replace(true);
        drop(tx_stop);

        let joined = join_workers(crawl_workers, parse_workers).await;
        drop((tx_url, rx_url, tx_doc, rx_doc));
        joined?;

        if interrupted {
            return Err(anyhow!("Interrupted"));
        }

        let report = shared.report.finalize(shared.frontier.snapshot());
        log::info!(
            "Crawl done: {} succeeded, {} failed, {} items",
            report.succeeded.len(),
            report.failed.len(),
            report.item_count
        );
        Ok(report)
    }
}

/// Runs a [`Crawler`] built from the given parts.
pub async fn crawl<F, H, S>(
    config: RunConfig,
    fetcher: Arc<F>,
    handler: Arc<H>,
    sink: Arc<S>,
) -> Result<RunReport>
where
    F: Fetcher + ?Sized + 'static,
    H: ParseHandler + ?Sized + 'static,
    S: ItemSink + ?Sized + 'static,
{
    Crawler::new(config, fetcher, handler, sink).run().await
}

/// Waits for every worker, then reports the first one that panicked.
async fn join_workers(
    crawl_workers: Vec<JoinHandle<()>>,
    parse_workers: Vec<thread::JoinHandle<()>>,
) -> Result<()> {
    let crawled = future::join_all(crawl_workers).await;
    let parsed = tokio::task::spawn_blocking(move || {
        parse_workers
            .into_iter()
            .map(thread::JoinHandle::join)
            .collect::<Vec<_>>()
    })
    .await?;

    for res in crawled {
        res?;
    }
    if parsed.iter().any(Result::is_err) {
        return Err(anyhow!("Parse worker panicked"));
    }
    Ok(())
}

struct CrawlWorker<F: ?Sized> {
    id: usize,
    rx_url: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    rx_shutdown: watch::Receiver<bool>,
    tx_url: mpsc::UnboundedSender<String>,
    tx_doc: Sender<Document>,
    shared: Arc<Shared>,
    fetcher: Arc<F>,
    request: Arc<RequestTemplate>,
}

impl<F> CrawlWorker<F>
where
    F: Fetcher + ?Sized,
{
    async fn run(mut self) {
        loop {
            let url = tokio::select! {
                biased;
                _ = self.rx_shutdown.changed() => break,
                url = next_url(&self.rx_url) => match url {
                    Some(url) => url,
                    None => break,
                },
            };
            self.crawl(url).await;
        }
        log::debug!("Crawl worker {} stopped", self.id);
    }

    async fn crawl(&self, url: String) {
        let Shared {
            frontier,
            pending,
            report,
        } = &*self.shared;

        match frontier.try_claim(&url) {
            Claim::Fresh => (),
            claim => {
                log::debug!("Skipping {url}: {claim:?}");
                pending.done();
                return;
            }
        }

        log::debug!("Crawl - Got URL: {url}");
        let fetched = AssertUnwindSafe(self.fetcher.fetch(&url, &self.request))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(FetchError::Other(anyhow!("Fetcher panicked on {url}"))));

        match fetched {
            Ok(document) => {
                frontier.record_success(&url);
                report.succeeded(&url);
                // Same unit of work, resolved by the parse worker
                if self.tx_doc.send(document).is_err() {
                    log::error!("Couldn't queue {url} for parsing, parse queue closed");
                    pending.done();
                }
            }
            Err(e) if !e.is_retryable() => {
                log::warn!("Skipping URL: {e}");
                frontier.record_permanent_failure(&url);
                report.failed(&url);
                pending.done();
            }
            Err(e) => match frontier.record_failure_or_retry(&url) {
                Retry::After(delay) => {
                    log::info!("Retrying {url} in {delay:?} got: {e}");
                    let tx_url = self.tx_url.clone();
                    let shared = self.shared.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        shared.frontier.release_retry(&url);
                        if let Err(e) = tx_url.send(url) {
                            log::debug!("Dropped retry of {}, crawl queue closed", e.0);
                        }
                    });
                }
                Retry::PermanentlyFailed => {
                    log::warn!("Skipping URL {url} after retries got: {e}");
                    report.failed(&url);
                    pending.done();
                }
            },
        }
    }
}

async fn next_url(rx_url: &Mutex<mpsc::UnboundedReceiver<String>>) -> Option<String> {
    rx_url.lock().await.recv().await
}

struct ParseWorker<H: ?Sized, S: ?Sized> {
    rx_doc: Receiver<Document>,
    rx_stop: Receiver<()>,
    tx_url: mpsc::UnboundedSender<String>,
    shared: Arc<Shared>,
    handler: Arc<H>,
    sink: Arc<S>,
}

impl<H, S> ParseWorker<H, S>
where
    H: ParseHandler + ?Sized,
    S: ItemSink + ?Sized,
{
    fn run(self) {
        loop {
            crossbeam_channel::select! {
                recv(self.rx_doc) -> doc => match doc {
                    Ok(doc) => self.parse(doc),
                    Err(_) => break,
                },
                recv(self.rx_stop) -> _ => break,
            }
        }
        log::debug!(
            "Parse worker {} stopped",
            thread::current().name().unwrap_or_default()
        );
    }

    fn parse(&self, document: Document) {
        let Shared {
            pending, report, ..
        } = &*self.shared;

        let result = match panic::catch_unwind(AssertUnwindSafe(|| self.handler.parse(&document))) {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                log::error!("Skipping parse for page {} got: {e}", document.url);
                report.parse_error();
                ParseResult::default()
            }
            Err(_) => {
                log::error!("Parse handler panicked on page {}", document.url);
                report.parse_error();
                ParseResult::default()
            }
        };

        for url in result.discovered_urls {
            // Counted before it becomes visible to any crawl worker
            pending.add(1);
            if let Err(e) = self.tx_url.send(url) {
                log::error!("Couldn't queue URL {}, crawl queue closed", e.0);
                pending.done();
            }
        }

        for item in result.items {
            match panic::catch_unwind(AssertUnwindSafe(|| self.sink.accept(item))) {
                Ok(Ok(())) => report.item_delivered(),
                Ok(Err(e)) => {
                    log::error!("Couldn't deliver item from {} got: {e}", document.url);
                    report.sink_error();
                }
                Err(_) => {
                    log::error!("Item sink panicked on item from {}", document.url);
                    report.sink_error();
                }
            }
        }

        pending.done();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn joins_every_worker_before_failing() {
        let parsed = Arc::new(AtomicBool::new(false));

        let crawl_workers = vec![
            tokio::spawn(async {}),
            tokio::spawn(async { panic!("crawl worker bug") }),
        ];
        let flag = parsed.clone();
        let parse_workers = vec![thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            flag.store(true, Ordering::SeqCst);
        })];

        let err = join_workers(crawl_workers, parse_workers)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("panicked"), "{err}");
        assert!(parsed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn parse_worker_panic_is_reported() {
        let parse_workers = vec![thread::spawn(|| panic!("parse worker bug"))];
        let err = join_workers(vec![], parse_workers).await.unwrap_err();
        assert_eq!(err.to_string(), "Parse worker panicked");
    }
}
