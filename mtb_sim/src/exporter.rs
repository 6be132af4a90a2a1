//! JSON export of driver runs for post-mortem replay.

use crate::driver::RunReport;
use mtb_proxy::Call;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};

/// A recorded run: enough to replay it against fresh implementations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogExport {
    /// Seed the run was driven by
    pub seed: u64,

    /// Wrong PIN limit of the real ATM under test
    pub pin_limit: u32,

    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,

    /// Calls in interception order
    pub calls: Vec<Call>,
}

impl LogExport {
    pub fn from_report(report: &RunReport, pin_limit: u32) -> Self {
        Self {
            seed: report.seed,
            pin_limit,
            passed: report.passed,
            failure: report.failure.clone(),
            calls: report.calls.clone(),
        }
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    /// Reads an export written by [`LogExport::write_to_file`].
    pub fn read_from_file(path: &str) -> std::io::Result<Self> {
        let mut json = String::new();
        File::open(path)?.read_to_string(&mut json)?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{run_seeded, DriverConfig};

    #[test]
    fn test_export_file_round_trip() {
        let report = run_seeded(&DriverConfig::default().with_seed(3).with_steps(30)).unwrap();
        let export = LogExport::from_report(&report, 3);

        let path = std::env::temp_dir().join(format!("mtb_export_{}.json", std::process::id()));
        let path = path.to_string_lossy().to_string();
        export.write_to_file(&path).unwrap();
        let loaded = LogExport::read_from_file(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded, export);
        assert_eq!(loaded.calls.len(), report.applied);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        assert!(LogExport::read_from_file("/nonexistent/mtb/export.json").is_err());
    }
}
