// SHOREBENCH CATALOG
// DECLARATIVE INPUT: NAMED ENGINE CONFIGURATIONS AND THE RUNS THAT USE THEM.
// BUILT-IN CATALOG MIRRORS THE DIAS SERVER SWEEPS; A JSON FILE CAN REPLACE IT.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::affinity::CoreSet;
use crate::error::{BenchError, Result};

// SIZES ARE IN KB
pub const MB: u64 = 1024;
pub const GB: u64 = 1024 * MB;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Configuration {
    #[serde(rename = "sf")]
    pub scale_factor: u32,
    #[serde(rename = "devicequota")]
    pub device_quota: u64,
    #[serde(rename = "bufpoolsize")]
    pub buffer_pool_size: u64,
    #[serde(rename = "logsize")]
    pub log_size: u64,
    #[serde(rename = "logbufsize")]
    pub log_buffer_size: u64,
    pub system: String,
    pub benchmark: String,
    pub design: String,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            scale_factor: 1,
            device_quota: 2 * GB,
            buffer_pool_size: 2 * GB,
            log_size: 2 * GB,
            log_buffer_size: 80 * MB,
            system: "baseline".to_string(),
            benchmark: "tpcc".to_string(),
            design: "normal".to_string(),
        }
    }
}

impl Configuration {
    pub fn tpcc(scale_factor: u32, size: u64) -> Self {
        Self {
            scale_factor,
            device_quota: size,
            buffer_pool_size: size,
            log_size: size,
            ..Self::default()
        }
    }

    // (KEY, VALUE) IN THE ORDER THEY ARE WRITTEN TO shore.conf
    pub fn params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("sf", self.scale_factor.to_string()),
            ("devicequota", self.device_quota.to_string()),
            ("bufpoolsize", self.buffer_pool_size.to_string()),
            ("logsize", self.log_size.to_string()),
            ("logbufsize", self.log_buffer_size.to_string()),
            ("system", self.system.clone()),
            ("benchmark", self.benchmark.clone()),
            ("design", self.design.clone()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Run {
    pub configuration: String,
    // ONE GROUP PER INSTANCE
    pub affinity: Vec<CoreSet>,
    pub commands: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Catalog {
    pub configurations: BTreeMap<String, Configuration>,
    pub runs: BTreeMap<String, Run>,
}

impl Catalog {
    pub fn from_json(text: &str) -> Result<Self> {
        let catalog: Catalog =
            serde_json::from_str(text).map_err(|e| BenchError::Catalog(e.to_string()))?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| BenchError::io(path, e))?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, run) in &self.runs {
            if !self.configurations.contains_key(&run.configuration) {
                return Err(BenchError::Catalog(format!(
                    "run {} references unknown configuration {}",
                    name, run.configuration
                )));
            }
            if run.affinity.is_empty() {
                return Err(BenchError::Catalog(format!("run {} has no affinity groups", name)));
            }
            if let Some(i) = run.affinity.iter().position(|g| g.is_empty()) {
                return Err(BenchError::Catalog(format!("run {} group {} is empty", name, i)));
            }
        }
        Ok(())
    }

    pub fn configuration(&self, name: &str) -> Result<&Configuration> {
        self.configurations
            .get(name)
            .ok_or_else(|| BenchError::Catalog(format!("unknown configuration {}", name)))
    }

    // ASCENDING NAME ORDER
    pub fn runs(&self) -> impl Iterator<Item = (&String, &Run)> {
        self.runs.iter()
    }

    // RESTRICT TO THE NAMED RUNS. UNKNOWN NAMES ARE AN ERROR.
    pub fn select(&self, names: &[String]) -> Result<Catalog> {
        if names.is_empty() {
            return Ok(self.clone());
        }
        let mut runs = BTreeMap::new();
        for name in names {
            let run = self
                .runs
                .get(name)
                .ok_or_else(|| BenchError::Catalog(format!("unknown run {}", name)))?;
            runs.insert(name.clone(), run.clone());
        }
        Ok(Catalog { configurations: self.configurations.clone(), runs })
    }

    pub fn builtin() -> Self {
        let mut configurations = BTreeMap::new();
        configurations.insert("tpcc-1".to_string(), Configuration::tpcc(1, 2 * GB));
        configurations.insert("tpcc-2".to_string(), Configuration::tpcc(2, 2 * GB));
        configurations.insert("tpcc-4".to_string(), Configuration::tpcc(4, 2 * GB));
        configurations.insert("tpcc-16".to_string(), Configuration::tpcc(16, 4 * GB));

        let cmds = |n: u32| -> Vec<String> {
            vec![
                "sli".to_string(),
                "elr".to_string(),
                format!("measure {} 1 {} 30 1 3", n, n),
            ]
        };
        let run = |cfg: &str, affinity: Vec<CoreSet>, n: u32| Run {
            configuration: cfg.to_string(),
            affinity,
            commands: cmds(n),
        };

        let mut runs = BTreeMap::new();

        // 16-CORE BOX: PARTITION CORES 0..16 INTO EQUAL CONTIGUOUS GROUPS
        for n in [1u32, 2, 4] {
            let groups = (0..16).step_by(n as usize).map(|i| CoreSet::range(i, n)).collect();
            runs.insert(format!("tpcc-{n}-{n}"), run(&format!("tpcc-{n}"), groups, n));
        }
        runs.insert("tpcc-16-16".to_string(), run("tpcc-16", vec![CoreSet::range(0, 16)], 16));

        // STRIDED: FOUR INSTANCES, EACH SPREAD ACROSS THE FOUR SOCKETS
        let strided = (0..4).map(|i| CoreSet::new(vec![i, i + 4, i + 8, i + 12])).collect();
        runs.insert("tpcc-4-4mix".to_string(), run("tpcc-4", strided, 4));

        // 256-CORE BOX: FOUR 16-CORE INSTANCES, ONE PER 64-CORE BLOCK
        let wide = (0..256).step_by(64).map(|i| CoreSet::range(i, 16)).collect();
        runs.insert("tpcc-16".to_string(), run("tpcc-16", wide, 16));

        Catalog { configurations, runs }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_is_valid() {
        let c = Catalog::builtin();
        c.validate().unwrap();
        assert_eq!(c.runs["tpcc-1-1"].affinity.len(), 16);
        assert_eq!(c.runs["tpcc-2-2"].affinity[3].cores(), &[6, 7]);
        assert_eq!(c.runs["tpcc-4-4mix"].affinity[1].cores(), &[1, 5, 9, 13]);
        assert_eq!(c.runs["tpcc-16"].affinity[3].cores()[0], 192);
        assert_eq!(c.runs["tpcc-16-16"].commands[2], "measure 16 1 16 30 1 3");
    }

    #[test]
    fn builtin_runs_iterate_in_name_order() {
        let c = Catalog::builtin();
        let names: Vec<&String> = c.runs().map(|(n, _)| n).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn params_fixed_order() {
        let keys: Vec<&str> = Configuration::default().params().iter().map(|(k, _)| *k).collect();
        assert_eq!(
            keys,
            [
                "sf",
                "devicequota",
                "bufpoolsize",
                "logsize",
                "logbufsize",
                "system",
                "benchmark",
                "design",
            ]
        );
    }

    #[test]
    fn json_fills_defaults() {
        let c = Catalog::from_json(
            r#"{
                "configurations": { "small": { "sf": 3 } },
                "runs": { "r": { "configuration": "small", "affinity": [[0]], "commands": ["sli"] } }
            }"#,
        )
        .unwrap();
        let cfg = c.configuration("small").unwrap();
        assert_eq!(cfg.scale_factor, 3);
        assert_eq!(cfg.log_buffer_size, 80 * MB);
        assert_eq!(cfg.benchmark, "tpcc");
    }

    #[test]
    fn json_rejects_unknown_configuration() {
        let err = Catalog::from_json(
            r#"{ "configurations": {}, "runs": { "r": { "configuration": "x", "affinity": [[0]], "commands": [] } } }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown configuration x"));
    }

    #[test]
    fn json_rejects_empty_group() {
        let err = Catalog::from_json(
            r#"{ "configurations": { "c": {} }, "runs": { "r": { "configuration": "c", "affinity": [[0], []], "commands": [] } } }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("group 1 is empty"));
    }

    #[test]
    fn select_keeps_named_runs() {
        let c = Catalog::builtin();
        let s = c.select(&["tpcc-2-2".to_string()]).unwrap();
        assert_eq!(s.runs.len(), 1);
        assert!(c.select(&["nope".to_string()]).is_err());
        assert_eq!(c.select(&[]).unwrap().runs.len(), c.runs.len());
    }
}
