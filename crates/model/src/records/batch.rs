use crate::core::timestamp::Timestamp;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

pub const METRIC_NAME_LABEL: &str = "__name__";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: Timestamp,
    pub value: f64,
}

/// A single time series: an ordered label set plus its samples.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub labels: BTreeMap<String, String>,
    pub samples: Vec<Sample>,
}

impl Series {
    pub fn new(labels: BTreeMap<String, String>) -> Self {
        Self {
            labels,
            samples: Vec::new(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.labels.get(METRIC_NAME_LABEL).map(String::as_str)
    }
}

/// Renders the series in the familiar `name{k="v",...}` selector form.
impl fmt::Display for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = self.name() {
            f.write_str(name)?;
        }

        let mut labels = self
            .labels
            .iter()
            .filter(|(k, _)| k.as_str() != METRIC_NAME_LABEL)
            .peekable();

        if labels.peek().is_none() {
            return Ok(());
        }

        f.write_str("{")?;
        let mut first = true;
        for (k, v) in labels {
            if !first {
                f.write_str(",")?;
            }
            first = false;
            write!(f, "{k}=\"")?;
            for c in v.chars() {
                match c {
                    '\\' => f.write_str("\\\\")?,
                    '"' => f.write_str("\\\"")?,
                    '\n' => f.write_str("\\n")?,
                    c => write!(f, "{c}")?,
                }
            }
            f.write_str("\"")?;
        }
        f.write_str("}")
    }
}

/// The dataset moved for one block: every series that had samples in the
/// block's time range.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleBatch {
    pub series: Vec<Series>,
}

impl SampleBatch {
    pub fn new(series: Vec<Series>) -> Self {
        Self { series }
    }

    pub fn sample_count(&self) -> u64 {
        self.series.iter().map(|s| s.samples.len() as u64).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.series.iter().all(|s| s.samples.is_empty())
    }
}
