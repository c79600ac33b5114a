//! Percent-error comparison of two reports, column by column.

use std::fmt;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::str::FromStr;

use serde::Serialize;

use crate::config::ReportFormat;
use crate::error::PwfError;
use crate::export::REPORT_COLUMNS;
use crate::report::{BusReport, BusRow};

/// Numeric report column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReportColumn {
    Voltage,
    Angle,
    LoadActive,
    LoadReactive,
    GenerationActive,
    GenerationReactive,
    Shunt,
}

impl ReportColumn {
    pub const ALL: [ReportColumn; 7] = [
        ReportColumn::Voltage,
        ReportColumn::Angle,
        ReportColumn::LoadActive,
        ReportColumn::LoadReactive,
        ReportColumn::GenerationActive,
        ReportColumn::GenerationReactive,
        ReportColumn::Shunt,
    ];

    pub fn value(&self, row: &BusRow) -> f64 {
        match self {
            ReportColumn::Voltage => row.vm_pu,
            ReportColumn::Angle => row.va_degree,
            ReportColumn::LoadActive => row.load_p_mw,
            ReportColumn::LoadReactive => row.load_q_mvar,
            ReportColumn::GenerationActive => row.gen_p_mw,
            ReportColumn::GenerationReactive => row.gen_q_mvar,
            ReportColumn::Shunt => row.shunt_q_mvar,
        }
    }

    /// Header of the column in the exported report.
    pub fn header(&self) -> &'static str {
        let index = ReportColumn::ALL
            .iter()
            .position(|c| c == self)
            .unwrap_or_default();
        REPORT_COLUMNS[index + 1]
    }
}

impl fmt::Display for ReportColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header())
    }
}

impl FromStr for ReportColumn {
    type Err = PwfError;

    /// Accepts the report header (`"Tensao (p.u.)"`) or a short name (`"vm_pu"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(column) = ReportColumn::ALL.iter().find(|c| c.header() == s) {
            return Ok(*column);
        }
        match s.to_ascii_lowercase().as_str() {
            "vm_pu" | "voltage" => Ok(ReportColumn::Voltage),
            "va_degree" | "angle" => Ok(ReportColumn::Angle),
            "load_p_mw" => Ok(ReportColumn::LoadActive),
            "load_q_mvar" => Ok(ReportColumn::LoadReactive),
            "gen_p_mw" => Ok(ReportColumn::GenerationActive),
            "gen_q_mvar" => Ok(ReportColumn::GenerationReactive),
            "shunt_q_mvar" | "shunt" => Ok(ReportColumn::Shunt),
            _ => Err(PwfError::Report(format!("unknown report column {:?}", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BusError {
    pub bus_id: usize,
    pub reference: f64,
    pub candidate: f64,
    /// `|reference - candidate| / |reference| * 100`
    pub error_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub column: ReportColumn,
    pub errors: Vec<BusError>,
    /// Reference buses with a zero value, where the percent error is undefined.
    pub zero_reference: Vec<usize>,
    /// Reference buses absent from the candidate.
    pub missing: Vec<usize>,
}

impl Comparison {
    pub fn max_error(&self) -> Option<&BusError> {
        self.errors
            .iter()
            .max_by(|a, b| a.error_percent.total_cmp(&b.error_percent))
    }

    pub fn mean_error(&self) -> Option<f64> {
        if self.errors.is_empty() {
            return None;
        }
        let sum: f64 = self.errors.iter().map(|e| e.error_percent).sum();
        Some(sum / self.errors.len() as f64)
    }

    pub fn write_csv(&self, writer: impl Write, format: &ReportFormat) -> Result<(), PwfError> {
        format.validate()?;
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(format.delimiter as u8)
            .from_writer(writer);
        wtr.write_record(["Numero", "Referencia", "Calculado", "Erro (%)"])?;
        for e in &self.errors {
            wtr.write_record(&[
                e.bus_id.to_string(),
                format.format_value(e.reference),
                format.format_value(e.candidate),
                format.format_value(e.error_percent),
            ])?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn export_csv(&self, path: &Path, format: &ReportFormat) -> Result<(), PwfError> {
        let file = File::create(path)?;
        self.write_csv(io::BufWriter::new(file), format)
    }
}

/// Per-bus absolute percent error of `candidate` against `reference`.
pub fn compare_reports(reference: &BusReport, candidate: &BusReport, column: ReportColumn) -> Comparison {
    let mut comparison = Comparison {
        column,
        errors: Vec::new(),
        zero_reference: Vec::new(),
        missing: Vec::new(),
    };

    for ref_row in &reference.rows {
        let Some(cand_row) = candidate.row(ref_row.bus_id) else {
            comparison.missing.push(ref_row.bus_id);
            continue;
        };
        let r = column.value(ref_row);
        let c = column.value(cand_row);
        if r == 0.0 {
            comparison.zero_reference.push(ref_row.bus_id);
            continue;
        }
        comparison.errors.push(BusError {
            bus_id: ref_row.bus_id,
            reference: r,
            candidate: c,
            error_percent: ((r - c) / r * 100.0).abs(),
        });
    }
    comparison
}
