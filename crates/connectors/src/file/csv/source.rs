use crate::{
    error::ConnectorError,
    file::csv::{HEADERS, series::parse_selector},
};
use async_trait::async_trait;
use engine_core::{
    connectors::{BlockContext, source::SampleReader},
    error::ExecutionError,
};
use model::{
    core::timestamp::parse_timestamp,
    records::batch::{Sample, SampleBatch, Series},
};
use planner::Block;
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Rows between two cancellation checks while scanning.
const CANCEL_CHECK_INTERVAL: usize = 4096;

#[derive(Debug, Deserialize)]
struct SampleRow {
    series: String,
    timestamp: String,
    value: f64,
}

/// Reads samples from a `series,timestamp,value` CSV export.
///
/// The file is scanned once per block and only rows with
/// `mint <= timestamp <= maxt` are kept, so the reader holds no state
/// between blocks and any block can be fetched in any order.
pub struct CsvSampleReader {
    path: PathBuf,
}

impl CsvSampleReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_block(
        path: &Path,
        block: Block,
        cancel: &CancellationToken,
    ) -> Result<SampleBatch, ConnectorError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|err| match err.into_kind() {
                csv::ErrorKind::Io(io_err) => ConnectorError::from_io(io_err, path),
                kind => ConnectorError::InvalidFormat(format!("{kind:?}")),
            })?;

        let headers = reader.headers()?;
        if headers.iter().collect::<Vec<_>>() != HEADERS {
            return Err(ConnectorError::InvalidFormat(format!(
                "expected header '{}' in {}, found '{}'",
                HEADERS.join(","),
                path.display(),
                headers.iter().collect::<Vec<_>>().join(",")
            )));
        }

        // Parsed label sets keyed by the raw selector text, so each distinct
        // selector is parsed once.
        let mut selectors: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        let mut series: BTreeMap<BTreeMap<String, String>, Vec<Sample>> = BTreeMap::new();

        for (line, row) in reader.deserialize::<SampleRow>().enumerate() {
            if line % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                return Err(ConnectorError::Cancelled);
            }

            let row = row?;
            let timestamp = parse_timestamp(&row.timestamp)
                .map_err(|e| ConnectorError::InvalidFormat(format!("row {}: {e}", line + 2)))?;
            if !block.contains(timestamp) {
                continue;
            }

            let labels = match selectors.get(&row.series) {
                Some(labels) => labels.clone(),
                None => {
                    let labels = parse_selector(&row.series)?;
                    selectors.insert(row.series, labels.clone());
                    labels
                }
            };

            series.entry(labels).or_default().push(Sample {
                timestamp,
                value: row.value,
            });
        }

        let series = series
            .into_iter()
            .map(|(labels, mut samples)| {
                samples.sort_by_key(|s| s.timestamp);
                Series { labels, samples }
            })
            .collect();

        Ok(SampleBatch::new(series))
    }
}

#[async_trait]
impl SampleReader for CsvSampleReader {
    fn name(&self) -> &str {
        "csv"
    }

    async fn fetch(&self, block: &Block, ctx: &BlockContext) -> Result<SampleBatch, ExecutionError> {
        let started = Instant::now();
        let path = self.path.clone();
        let block = *block;
        let cancel = ctx.cancel.clone();

        let batch = tokio::task::spawn_blocking(move || Self::read_block(&path, block, &cancel))
            .await
            .map_err(|e| ExecutionError::from(ConnectorError::Task(e.to_string())))?
            .map_err(ExecutionError::from)?;

        debug!(
            block.mint = block.mint(),
            block.maxt = block.maxt(),
            series = batch.series.len(),
            samples = batch.sample_count(),
            took_ms = started.elapsed().as_millis() as u64,
            "Read block from CSV"
        );

        Ok(batch)
    }
}
