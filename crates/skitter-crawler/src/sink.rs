use std::fs::File;
use std::io;
use std::path::Path;
use std::thread;

use anyhow::anyhow;
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};

use crate::handler::{Item, ItemSink};

/// Output format of a [`CsvSink`]. Every field is optional in a config file.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CsvWriterConfig {
    pub delimiter: char,
    pub quote: char,
    /// Escapes quotes with this character instead of doubling them
    pub escape: Option<char>,
    /// Allows rows of different lengths
    pub flexible: bool,
    pub line_ending: LineEnding,
    pub has_headers: bool,
}

impl Default for CsvWriterConfig {
    fn default() -> Self {
        Self {
            delimiter: ',',
            quote: '"',
            escape: None,
            flexible: false,
            line_ending: LineEnding::Lf,
            has_headers: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    #[default]
    Lf,
    Crlf,
}

impl CsvWriterConfig {
    /// A CSV writer over `wtr` in this format, which must only use ASCII separators.
    pub fn writer<W: io::Write>(&self, wtr: W) -> anyhow::Result<csv::Writer<W>> {
        let mut builder = csv::WriterBuilder::new();
        builder
            .delimiter(ascii(self.delimiter, "delimiter")?)
            .quote(ascii(self.quote, "quote")?)
            .flexible(self.flexible)
            .has_headers(false)
            .terminator(match self.line_ending {
                LineEnding::Lf => csv::Terminator::Any(b'\n'),
                LineEnding::Crlf => csv::Terminator::CRLF,
            });
        match self.escape {
            Some(escape) => builder.double_quote(false).escape(ascii(escape, "escape")?),
            None => builder.double_quote(true),
        };
        Ok(builder.from_writer(wtr))
    }
}

fn ascii(c: char, what: &str) -> anyhow::Result<u8> {
    if c.is_ascii() {
        Ok(c as u8)
    } else {
        Err(anyhow!("CSV {what} must be an ASCII character, got {c:?}"))
    }
}

/// Writes items as CSV rows with a fixed set of columns.
///
/// Rows go through a channel to a single writer thread, so `accept` can be called from
/// any number of parse workers. Missing columns are written as empty fields.
#[derive(Debug)]
pub struct CsvSink {
    tx_item: Sender<Item>,
    tx_stop: Sender<()>,
    rx_done: Receiver<()>,
}

impl CsvSink {
    pub fn new<W>(wtr: W, columns: Vec<String>, config: &CsvWriterConfig) -> anyhow::Result<Self>
    where
        W: io::Write + Send + 'static,
    {
        let mut wtr = config.writer(wtr)?;
        if config.has_headers {
            wtr.write_record(&columns)?;
        }

        let (tx_item, rx_item) = unbounded::<Item>();
        let (tx_stop, rx_stop) = bounded::<()>(1);
        let (tx_done, rx_done) = bounded::<()>(1);

        thread::Builder::new()
            .name("csv-writer".into())
            .spawn(move || {
                loop {
                    select! {
                        recv(rx_item) -> item => match item {
                            Ok(item) => write_item(&mut wtr, &columns, &item),
                            Err(_) => break,
                        },
                        recv(rx_stop) -> _ => {
                            for item in rx_item.try_iter() {
                                write_item(&mut wtr, &columns, &item);
                            }
                            break;
                        }
                    }
                }
                drop(rx_item);
                if let Err(e) = wtr.flush() {
                    log::error!("Couldn't flush CSV output: {e}");
                }
                tx_done.send(()).ok();
            })?;

        Ok(Self {
            tx_item,
            tx_stop,
            rx_done,
        })
    }

    pub fn create<P: AsRef<Path>>(
        path: P,
        columns: Vec<String>,
        config: &CsvWriterConfig,
    ) -> anyhow::Result<Self> {
        Self::new(File::create(path)?, columns, config)
    }

    pub fn stdout(columns: Vec<String>, config: &CsvWriterConfig) -> anyhow::Result<Self> {
        Self::new(io::stdout(), columns, config)
    }

    /// Writes every queued item and flushes. Items sent afterwards are rejected.
    pub fn finish(&self) {
        if self.tx_stop.send(()).is_ok() {
            self.rx_done.recv().ok();
        }
    }
}

impl Drop for CsvSink {
    fn drop(&mut self) {
        self.finish();
    }
}

impl ItemSink for CsvSink {
    fn accept(&self, item: Item) -> anyhow::Result<()> {
        self.tx_item
            .send(item)
            .map_err(|_| anyhow!("CSV writer is stopped"))
    }
}

fn write_item<W: io::Write>(wtr: &mut csv::Writer<W>, columns: &[String], item: &Item) {
    let record = columns
        .iter()
        .map(|c| item.get(c).map(String::as_str).unwrap_or_default());
    if let Err(e) = wtr.write_record(record) {
        log::error!("Couldn't write record: {e}");
    }
}
