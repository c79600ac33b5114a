use std::fs;
use std::path::Path;

use log::{debug, info};

use crate::case::*;
use crate::config::ImportConfig;
use crate::diagnostics::ImportDiagnostics;
use crate::error::PwfError;
use crate::records::{BranchOutcome, BranchRecord, BusRecord, RecordError};
use crate::scan::{RecordKind, Scanner};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Network plus everything the importer had to recover from.
#[derive(Debug, Clone)]
pub struct ImportResult {
    pub network: Network,
    pub diagnostics: ImportDiagnostics,
}

/// Decodes case bytes.
///
/// Cases come from Windows tools and are ISO-8859-1, where every byte is a
/// character. A UTF-8 byte-order mark switches to UTF-8, falling back to
/// ISO-8859-1 if the rest is not valid UTF-8.
pub fn decode_text(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(UTF8_BOM) {
        if let Ok(text) = std::str::from_utf8(rest) {
            return text.to_string();
        }
        debug!("UTF-8 BOM present but content is not UTF-8, reading as ISO-8859-1");
    }
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Reads and parses a PWF file. The case name is the file stem.
pub fn read_pwf(path: &Path, config: &ImportConfig) -> Result<ImportResult, PwfError> {
    let bytes = fs::read(path)?;
    let case_name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    info!("Reading {}", path.display());
    parse_pwf_bytes(&bytes, case_name, config)
}

/// True for BOM-less input that is valid UTF-8 with multibyte sequences.
///
/// Such a file is still read as ISO-8859-1, which widens every accented
/// character to two and shifts the columns after it.
pub fn looks_like_utf8(bytes: &[u8]) -> bool {
    !bytes.starts_with(UTF8_BOM) && !bytes.is_ascii() && std::str::from_utf8(bytes).is_ok()
}

pub fn parse_pwf_bytes(
    bytes: &[u8],
    case_name: String,
    config: &ImportConfig,
) -> Result<ImportResult, PwfError> {
    let mut diag = ImportDiagnostics::new();
    if looks_like_utf8(bytes) {
        diag.review_input(
            "input is valid UTF-8 without a byte-order mark but is read as ISO-8859-1; \
             accented names shift the columns after them",
        );
    }
    parse_with(&decode_text(bytes), case_name, config, diag)
}

/// Parses PWF text into a solve-ready network.
///
/// Malformed fields and records are recovered from and reported in the
/// diagnostics. The only failures are an invalid configuration, a case with
/// no buses, and a case where no slack can be placed.
pub fn parse_pwf_str(
    text: &str,
    case_name: String,
    config: &ImportConfig,
) -> Result<ImportResult, PwfError> {
    parse_with(text, case_name, config, ImportDiagnostics::new())
}

fn parse_with(
    text: &str,
    case_name: String,
    config: &ImportConfig,
    mut diag: ImportDiagnostics,
) -> Result<ImportResult, PwfError> {
    config.validate()?;
    let base = config.system_base()?;
    let mut network = Network::new(case_name, base);

    for record in Scanner::new(text, config) {
        match record.kind {
            RecordKind::Bus => {
                let parsed = BusRecord::parse(record.text, record.line, config, &mut diag)
                    .and_then(|bus| {
                        if network.add_bus(bus.to_bus(base.base_kv)) {
                            Ok(bus)
                        } else {
                            Err(RecordError::DuplicateBus(bus.id))
                        }
                    });
                match parsed {
                    Ok(bus) => {
                        diag.stats.buses += 1;
                        for kind in bus.devices() {
                            match kind {
                                DeviceKind::Load { .. } => diag.stats.loads += 1,
                                DeviceKind::Generator { .. } => diag.stats.generators += 1,
                                DeviceKind::Shunt { .. } => diag.stats.shunts += 1,
                            }
                            network.add_device(bus.id, kind);
                        }
                    }
                    Err(e) => {
                        debug!("line {}: bus record skipped: {}", record.line, e);
                        diag.skipped(record.line, format!("bus record skipped: {}", e));
                    }
                }
            }

            RecordKind::Branch => {
                let branch = match BranchRecord::parse(record.text, record.line, config, &mut diag) {
                    Ok(branch) => branch,
                    Err(RecordError::BadId(_)) => {
                        // an unreadable endpoint cannot be in the bus set
                        diag.stats.dropped_branches += 1;
                        continue;
                    }
                    Err(e) => {
                        diag.skipped(record.line, format!("branch record skipped: {}", e));
                        continue;
                    }
                };
                match branch.attach(&mut network, config)? {
                    BranchOutcome::Added(id) => {
                        if network.branches[id].model.is_transformer() {
                            diag.stats.transformers += 1;
                        } else {
                            diag.stats.lines += 1;
                        }
                    }
                    BranchOutcome::Dropped => diag.stats.dropped_branches += 1,
                }
            }

            RecordKind::Generator => {
                diag.stats.generator_records += 1;
            }
        }
    }

    if network.buses.is_empty() {
        return Err(PwfError::NoBuses);
    }
    network.ensure_slack(config, &mut diag)?;

    info!(
        "Parsed {} buses, {} lines, {} transformers, {} devices ({} skipped lines, {} defaulted values, {} dropped branches)",
        network.buses.len(),
        network.line_count(),
        network.transformer_count(),
        network.devices.len(),
        diag.stats.skipped_lines,
        diag.stats.defaulted_values,
        diag.stats.dropped_branches,
    );

    Ok(ImportResult {
        network,
        diagnostics: diag,
    })
}
