//! One case from text to report.

use std::path::Path;

use log::{info, warn};

use crate::case::Network;
use crate::config::PwfConfig;
use crate::error::PwfError;
use crate::parse::{self, ImportResult};
use crate::report::{self, BusReport};
use crate::solver::PowerFlowSolver;

/// Owns the configuration for a run. Each import builds an independent
/// network, so one pipeline can process many cases.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: PwfConfig,
}

impl Pipeline {
    pub fn new(config: PwfConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PwfConfig {
        &self.config
    }

    pub fn import_str(&self, text: &str, case_name: &str) -> Result<ImportResult, PwfError> {
        parse::parse_pwf_str(text, case_name.to_string(), &self.config.import)
    }

    pub fn import_bytes(&self, bytes: &[u8], case_name: &str) -> Result<ImportResult, PwfError> {
        parse::parse_pwf_bytes(bytes, case_name.to_string(), &self.config.import)
    }

    pub fn import_file(&self, path: &Path) -> Result<ImportResult, PwfError> {
        parse::read_pwf(path, &self.config.import)
    }

    /// Solves the network and aggregates the results.
    ///
    /// A solver failure is returned as is and no report is produced.
    pub fn run(&self, network: &Network, solver: &impl PowerFlowSolver) -> Result<BusReport, PwfError> {
        if network.buses.is_empty() {
            return Err(PwfError::NoBuses);
        }
        match network.slack_buses().as_slice() {
            [] => return Err(PwfError::NoSlack),
            [_] => {}
            several => return Err(PwfError::MultipleSlack(several.to_vec())),
        }

        let results = solver.solve(network).inspect_err(|e| {
            warn!("Solver failed on case {}: {}", network.case_name, e);
        })?;
        let report =
            report::aggregate_with_precision(network, &results, self.config.report.precision)?;
        info!(
            "Case {}: {:.4} MW generated, {:.4} MW of load",
            network.case_name,
            report.total_generation_mw(),
            report.total_load_mw()
        );
        Ok(report)
    }

    pub fn import_and_run(
        &self,
        path: &Path,
        solver: &impl PowerFlowSolver,
    ) -> Result<(ImportResult, BusReport), PwfError> {
        let imported = self.import_file(path)?;
        let report = self.run(&imported.network, solver)?;
        Ok((imported, report))
    }
}
