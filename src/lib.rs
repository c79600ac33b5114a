//! Import of ANAREDE PWF cases into a network model, and per-bus reporting
//! of power-flow results.
//!
//! ```text
//! PWF text -> scan -> records -> Network -> PowerFlowSolver -> BusReport -> CSV
//! ```

pub mod case;
pub mod compare;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod export;
pub mod field;
pub mod loadflow;
pub mod parse;
pub mod pipeline;
pub mod records;
pub mod report;
pub mod scan;
pub mod solver;
pub mod units;

pub use case::{Branch, BranchModel, Bus, BusType, Device, DeviceKind, GeneratorRole, Network};
pub use config::{ImportConfig, PwfConfig, ReportFormat};
pub use diagnostics::{ImportDiagnostics, ImportStats};
pub use error::{ConfigError, PwfError, PwfResult, SolveError};
pub use loadflow::DcPowerFlow;
pub use parse::ImportResult;
pub use pipeline::Pipeline;
pub use report::{BusReport, BusRow};
pub use solver::{BusResult, DeviceResult, PowerFlowResults, PowerFlowSolver};
pub use units::SystemBase;
