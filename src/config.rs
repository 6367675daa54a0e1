// SHOREBENCH CONFIG MATERIALIZER
// shore.conf = TEMPLATE BYTES + AN AUTO-GENERATED BLOCK OF `key = value` LINES

use std::fmt::Write as _;
use std::path::Path;

use crate::catalog::Configuration;
use crate::error::{BenchError, Result};

pub const GENERATED_HEADER: &str = "\n\n# AUTO-GENERATED ENTRIES\n";

// OPAQUE TEMPLATE BLOB
#[derive(Debug, Clone)]
pub struct Template {
    bytes: Vec<u8>,
}

impl Template {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(BenchError::Provision(format!(
                "Cannot find template file {}",
                path.display()
            )));
        }
        let bytes = std::fs::read(path).map_err(|e| BenchError::io(path, e))?;
        Ok(Self { bytes })
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self { bytes: bytes.into() }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

// EVERYTHING THE GENERATED BLOCK NEEDS FOR ONE INSTANCE
pub struct ConfigInputs<'a> {
    pub config_name: &'a str,
    pub configuration: &'a Configuration,
    pub device_dir: &'a Path,
    pub log_dir: &'a Path,
    // WORKERS AND LOADERS BOTH MATCH THE AFFINITY SET SIZE
    pub workers: usize,
}

pub fn generated_block(inputs: &ConfigInputs<'_>) -> String {
    let name = inputs.config_name;
    let mut out = String::from(GENERATED_HEADER);
    // WRITING INTO A String CANNOT FAIL
    let _ = writeln!(out, "db-workers = {}", inputs.workers);
    let _ = writeln!(out, "db-loaders = {}", inputs.workers);
    let _ = writeln!(out, "db-config = {}", name);
    let _ = writeln!(out, "{}-device = {}/db-{}", name, inputs.device_dir.display(), name);
    let _ = writeln!(out, "{}-logdir = {}", name, inputs.log_dir.display());
    for (key, value) in inputs.configuration.params() {
        let _ = writeln!(out, "{}-{} = {}", name, key, value);
    }
    out
}

pub fn render(template: &Template, inputs: &ConfigInputs<'_>) -> Vec<u8> {
    let mut out = template.bytes().to_vec();
    out.extend_from_slice(generated_block(inputs).as_bytes());
    out
}

pub fn materialize(template: &Template, inputs: &ConfigInputs<'_>, dest: &Path) -> Result<()> {
    std::fs::write(dest, render(template, inputs))
        .map_err(|source| BenchError::Config { path: dest.to_path_buf(), source })
}
