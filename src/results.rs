// SHOREBENCH RESULTS
// THROUGHPUT EXTRACTION FROM ENGINE LOGS AND THE APPEND-ONLY OUTPUT LOG.
//
// TWO LOG PHRASINGS MAP TO THE SAME METRIC. IF THE ENGINE EVER EMITS BOTH IN
// ONE RUN, BOTH ARE RECORDED. SAMPLES STAY RAW STRINGS.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{BenchError, Result};

pub const THROUGHPUT: &str = "TPS";

const PATTERNS: [(&str, &str); 2] = [
    (THROUGHPUT, r"MQTh/s:[ ]*\((?P<data>[0-9.]*)\)"),
    (THROUGHPUT, r"TPS:[ ]*\((?P<data>[0-9.]*)\)"),
];

fn patterns() -> &'static [(&'static str, Regex)] {
    static COMPILED: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        PATTERNS
            .iter()
            .map(|(metric, re)| (*metric, Regex::new(re).expect("static pattern compiles")))
            .collect()
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    metrics: BTreeMap<String, Vec<String>>,
}

impl ResultSet {
    pub fn push(&mut self, metric: &str, sample: &str) {
        self.metrics.entry(metric.to_string()).or_default().push(sample.to_string());
    }

    // EMPTY SLICE FOR A METRIC THAT NEVER MATCHED
    pub fn samples(&self, metric: &str) -> &[String] {
        self.metrics.get(metric).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.metrics.iter()
    }
}

pub fn parse_log<S: AsRef<str>>(lines: &[S]) -> ResultSet {
    let mut results = ResultSet::default();
    for line in lines {
        let line = line.as_ref();
        for (metric, re) in patterns() {
            if let Some(caps) = re.captures(line) {
                results.push(metric, &caps["data"]);
            }
        }
    }
    results
}

// ---------------------------------------------------------------------------
// OUTPUT LOG
// ---------------------------------------------------------------------------

pub struct ResultLog {
    path: PathBuf,
}

impl ResultLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, text: &str) -> Result<()> {
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| BenchError::io(&self.path, e))?;
        f.write_all(text.as_bytes()).map_err(|e| BenchError::io(&self.path, e))
    }

    pub fn begin_run(&self, name: &str) -> Result<()> {
        self.append(&format!("Run\t{}\n", name))
    }

    pub fn append_results(&self, results: &ResultSet) -> Result<()> {
        let mut text = String::new();
        for (metric, samples) in results.iter() {
            text.push_str(metric);
            for s in samples {
                text.push('\t');
                text.push_str(s);
            }
            text.push('\n');
        }
        if text.is_empty() {
            return Ok(());
        }
        self.append(&text)
    }
}
