use std::fs::{self, File};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail};
use clap::{CommandFactory, Parser};
use clap_complete::{generate, Shell};
use serde::Deserialize;
use skitter_crawler::{
    crawl as crawl_run, CsvSink, CsvWriterConfig, Document, FetcherConfig, ItemSink,
    ReqwestFetcher, RunConfig,
};
use skitter_extract::{ExtractionRules, RulesHandler};
use tokio::runtime;

/// Skitter web crawler
#[derive(Debug, Parser)]
#[clap(version)]
pub struct Args {
    #[clap(subcommand)]
    pub cmd: SubCommand,
}

#[derive(Debug, clap::Subcommand)]
pub enum SubCommand {
    #[clap(name = "crawl")]
    Crawl(CrawlArgs),
    #[clap(name = "extract")]
    Extract(ExtractArgs),
    #[clap(hide = true)]
    Completion,
}

/// Sections of the yaml configuration file
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkitterConfig {
    #[serde(default)]
    pub crawler: RunConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub rules: ExtractionRules,
    #[serde(default)]
    pub csv: CsvWriterConfig,
}

impl SkitterConfig {
    fn load(path: Option<&PathBuf>) -> anyhow::Result<Self> {
        match path {
            Some(path) => {
                let file = File::open(path)
                    .map_err(|e| anyhow!("Couldn't open config {}: {e}", path.display()))?;
                Ok(serde_yaml::from_reader(file)?)
            }
            None => Ok(Self::default()),
        }
    }
}

/// Crawl from start URLs and extract items from every page
#[derive(Debug, clap::Args)]
pub struct CrawlArgs {
    /// URLs to start from, added to the configured ones
    #[clap(value_name = "START_URL")]
    pub start_urls: Vec<String>,
    /// Path to the yaml configuration file (crawler, fetcher, rules and csv sections)
    #[clap(env = "SKITTER_CONFIG", parse(from_os_str), long, short)]
    pub config: Option<PathBuf>,
    /// Path to the CSV output file, stdout when missing
    #[clap(parse(from_os_str), long, short)]
    pub output_file: Option<PathBuf>,
    /// Path to a JSON file receiving the run report
    #[clap(parse(from_os_str), long)]
    pub report: Option<PathBuf>,
    /// Override crawler's number of concurrent fetches
    #[clap(long)]
    pub crawl_workers: Option<usize>,
    /// Override crawler's number of CPU workers used to parse pages
    #[clap(long)]
    pub parse_workers: Option<usize>,
    /// Override crawler's maximum retries of a failing URL
    #[clap(long)]
    pub max_retries: Option<u32>,
    /// Override crawler's delay before the first retry, in seconds
    #[clap(long)]
    pub base_delay: Option<f64>,
    /// Override crawler's user agent
    #[clap(long)]
    pub user_agent: Option<String>,
    /// No SIGINT handling, the run can only end by itself
    #[clap(long)]
    pub no_sigint: bool,
    /// When quiet no logs are outputted
    #[clap(long, short)]
    pub quiet: bool,
}

impl TryFrom<&CrawlArgs> for SkitterConfig {
    type Error = anyhow::Error;

    fn try_from(args: &CrawlArgs) -> Result<Self, Self::Error> {
        let mut conf = SkitterConfig::load(args.config.as_ref())?;
        let crawler = &mut conf.crawler;

        crawler.start_urls.extend(args.start_urls.iter().cloned());
        if let Some(crawl_workers) = args.crawl_workers {
            crawler.crawl_workers = crawl_workers;
        }
        if let Some(parse_workers) = args.parse_workers {
            crawler.parse_workers = parse_workers;
        }
        if let Some(max_retries) = args.max_retries {
            crawler.retry.max_retries = max_retries;
        }
        if let Some(base_delay) = args.base_delay {
            crawler.retry.base_delay = Duration::try_from_secs_f64(base_delay)
                .map_err(|e| anyhow!("Invalid base delay {base_delay}: {e}"))?;
        }
        if let Some(user_agent) = &args.user_agent {
            crawler.request.user_agent = user_agent.to_string();
        }
        if args.no_sigint {
            crawler.handle_sigint = false;
        }
        Ok(conf)
    }
}

pub fn crawl(args: CrawlArgs) -> anyhow::Result<()> {
    let conf = SkitterConfig::try_from(&args)?;
    let columns = conf.rules.columns();
    let handler = RulesHandler::new(conf.rules)?;
    let fetcher = ReqwestFetcher::new(&conf.fetcher)?;
    let sink = Arc::new(match &args.output_file {
        Some(path) => CsvSink::create(path, columns, &conf.csv)?,
        None => CsvSink::stdout(columns, &conf.csv)?,
    });

    let rt = runtime::Builder::new_multi_thread().enable_all().build()?;
    let report = rt.block_on(crawl_run(
        conf.crawler,
        Arc::new(fetcher),
        Arc::new(handler),
        sink.clone(),
    ));
    sink.finish();
    let report = report?;

    eprintln!(
        "Crawled {} pages ({} failed), extracted {} items",
        report.succeeded.len(),
        report.failed.len(),
        report.item_count
    );
    if let Some(path) = &args.report {
        serde_json::to_writer_pretty(File::create(path)?, &report)?;
    }
    Ok(())
}

/// Apply extraction rules to a single page, items are printed to stdout and links to stderr
#[derive(Debug, clap::Args)]
#[clap(group = clap::ArgGroup::new("page").required(true))]
pub struct ExtractArgs {
    /// Path to the yaml configuration file, only the rules and csv sections are used
    #[clap(env = "SKITTER_CONFIG", parse(from_os_str), long, short)]
    pub config: Option<PathBuf>,
    /// A local html page
    #[clap(group = "page", parse(from_os_str), long)]
    pub file: Option<PathBuf>,
    /// A distant html page
    #[clap(group = "page", long)]
    pub url: Option<String>,
    /// URL used to resolve relative links of a local page
    #[clap(long, conflicts_with = "url")]
    pub base_url: Option<String>,
    /// Custom user agent to download the page
    #[clap(long, conflicts_with = "file")]
    pub ua: Option<String>,
}

pub fn extract(args: ExtractArgs) -> anyhow::Result<()> {
    let conf = SkitterConfig::load(args.config.as_ref())?;

    let document = if let Some(url) = args.url {
        let mut builder = reqwest::blocking::ClientBuilder::new();
        if let Some(ua) = args.ua {
            builder = builder.user_agent(ua);
        }
        let client = builder.build()?;
        let page = client.get(&url).send()?.error_for_status()?.bytes()?;
        Document::new(url, page.to_vec())
    } else if let Some(path) = args.file {
        let page = fs::read(&path)?;
        let url = match args.base_url {
            Some(base_url) => base_url,
            None => reqwest::Url::from_file_path(fs::canonicalize(&path)?)
                .map_err(|_| anyhow!("Couldn't turn {} into a URL", path.display()))?
                .into(),
        };
        Document::new(url, page)
    } else {
        bail!("Missing `url` or `file`");
    };

    let columns = conf.rules.columns();
    let result = RulesHandler::new(conf.rules)?.extract(&document)?;

    let sink = CsvSink::stdout(columns, &conf.csv)?;
    for item in result.items {
        sink.accept(item)?;
    }
    sink.finish();
    for url in result.discovered_urls {
        eprintln!("{url}");
    }
    Ok(())
}

fn init_logger() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("skitter_crawler=warn,skitter_extract=warn"),
    )
    .init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.cmd {
        SubCommand::Crawl(args) => {
            if !args.quiet {
                init_logger();
            }
            crawl(args)
        }
        SubCommand::Extract(args) => {
            init_logger();
            extract(args)
        }
        SubCommand::Completion => {
            generate(Shell::Bash, &mut Args::command(), "skitter", &mut io::stdout());
            Ok(())
        }
    }
}
