use crate::{error::ConnectorError, file::csv::HEADERS};
use async_trait::async_trait;
use engine_core::{
    connectors::{BlockContext, destination::SampleWriter},
    error::ExecutionError,
};
use model::records::batch::SampleBatch;
use planner::Block;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::debug;

/// Writes each block to its own `block-<mint>-<maxt>.csv` file.
///
/// The file is written under a temporary name and renamed into place, so a
/// block file is either absent or complete, and writing a block again
/// replaces it instead of appending duplicate samples.
pub struct CsvBlockWriter {
    dir: PathBuf,
}

impl CsvBlockWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn block_path(&self, block: &Block) -> PathBuf {
        self.dir
            .join(format!("block-{}-{}.csv", block.mint(), block.maxt()))
    }

    fn write_block(
        dir: &Path,
        target: &Path,
        tmp: &Path,
        batch: &SampleBatch,
    ) -> Result<(), ConnectorError> {
        fs::create_dir_all(dir).map_err(|e| ConnectorError::from_io(e, dir))?;

        let mut writer = csv::Writer::from_path(tmp)?;
        writer.write_record(HEADERS)?;
        for series in &batch.series {
            let selector = series.to_string();
            for sample in &series.samples {
                let timestamp = sample.timestamp.to_string();
                let value = sample.value.to_string();
                writer.write_record([selector.as_str(), timestamp.as_str(), value.as_str()])?;
            }
        }

        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        fs::rename(tmp, target).map_err(|e| ConnectorError::from_io(e, target))?;
        Ok(())
    }
}

#[async_trait]
impl SampleWriter for CsvBlockWriter {
    fn name(&self) -> &str {
        "csv"
    }

    async fn store(
        &self,
        block: &Block,
        batch: SampleBatch,
        ctx: &BlockContext,
    ) -> Result<(), ExecutionError> {
        let dir = self.dir.clone();
        let target = self.block_path(block);
        // Attempt-scoped so a timed-out attempt still writing in the
        // background never shares a temp file with its retry.
        let tmp = self.dir.join(format!(
            ".block-{}-{}.csv.{}.tmp",
            block.mint(),
            block.maxt(),
            ctx.attempt
        ));
        let samples = batch.sample_count();

        let written = target.clone();
        tokio::task::spawn_blocking(move || Self::write_block(&dir, &target, &tmp, &batch))
            .await
            .map_err(|e| ExecutionError::from(ConnectorError::Task(e.to_string())))?
            .map_err(ExecutionError::from)?;

        debug!(
            block.mint = block.mint(),
            block.maxt = block.maxt(),
            samples,
            path = %written.display(),
            "Wrote block file"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::csv::source::CsvSampleReader;
    use engine_core::connectors::source::SampleReader;
    use model::records::batch::{Sample, Series};
    use planner::{BlockSize, Plan, Window};
    use std::collections::BTreeMap;
    use tempfile::tempdir;
    use tokio_util::sync::CancellationToken;

    fn ctx(attempt: u32) -> BlockContext {
        BlockContext {
            run_id: "run".into(),
            attempt,
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }

    fn block() -> Block {
        Plan::new(Window::new(-50, 49).unwrap(), BlockSize::Duration(99))
            .unwrap()
            .block(0)
            .unwrap()
    }

    fn batch() -> SampleBatch {
        let mut labels = BTreeMap::new();
        labels.insert("__name__".to_string(), "temp".to_string());
        labels.insert("room".to_string(), "lab \"B\"".to_string());
        let mut series = Series::new(labels);
        series.samples = vec![
            Sample {
                timestamp: -50,
                value: 21.5,
            },
            Sample {
                timestamp: 49,
                value: 22.0,
            },
        ];
        SampleBatch::new(vec![series])
    }

    #[tokio::test]
    async fn writes_a_readable_block_file() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out");
        let writer = CsvBlockWriter::new(&out);
        let block = block();

        writer.store(&block, batch(), &ctx(1)).await.unwrap();

        let path = writer.block_path(&block);
        assert_eq!(path.file_name().unwrap(), "block--50-49.csv");

        let read_back = CsvSampleReader::new(&path)
            .fetch(&block, &ctx(1))
            .await
            .unwrap();
        assert_eq!(read_back, batch());
    }

    #[tokio::test]
    async fn rewriting_a_block_replaces_it() {
        let dir = tempdir().unwrap();
        let writer = CsvBlockWriter::new(dir.path());
        let block = block();

        writer.store(&block, batch(), &ctx(1)).await.unwrap();
        writer.store(&block, batch(), &ctx(2)).await.unwrap();

        let contents = fs::read_to_string(writer.block_path(&block)).unwrap();
        assert_eq!(contents.lines().count(), 3);

        // No temp files left behind.
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn writes_header_for_empty_blocks() {
        let dir = tempdir().unwrap();
        let writer = CsvBlockWriter::new(dir.path());
        let block = block();

        writer
            .store(&block, SampleBatch::default(), &ctx(1))
            .await
            .unwrap();

        let contents = fs::read_to_string(writer.block_path(&block)).unwrap();
        assert_eq!(contents.trim(), "series,timestamp,value");
    }
}
