//! CSV time series output, one row per poll.

use std::fs::OpenOptions;
use std::path::Path;

use anyhow::Context;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Sample {
    #[serde(rename = "Time (s)")]
    pub time_s: f64,
    #[serde(rename = "actual_pH")]
    pub actual_ph: f64,
    #[serde(rename = "HCl_pump_state")]
    pub pump_state: bool,
}

pub struct Recorder {
    writer: csv::Writer<std::fs::File>,
}

impl Recorder {
    /// Opens `path` for appending; the header row is written only when
    /// the file starts out empty.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let empty = file
            .metadata()
            .with_context(|| format!("Failed to stat {}", path.display()))?
            .len()
            == 0;

        let writer = csv::WriterBuilder::new()
            .has_headers(empty)
            .from_writer(file);
        Ok(Self { writer })
    }

    pub fn record(&mut self, sample: &Sample) -> anyhow::Result<()> {
        self.writer.serialize(sample).context("CSV write failed")?;
        self.writer.flush().context("CSV flush failed")?;
        Ok(())
    }
}
