//! Delimited report files.
//!
//! The report is written for spreadsheet tools in a comma-decimal locale by
//! default (`;` between fields, `,` before the decimals). [`read_report`]
//! parses the same layout back.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use crate::config::ReportFormat;
use crate::error::PwfError;
use crate::report::{BusReport, BusRow, NetInjectionRow};

/// Column headers of the per-bus report, in order.
pub const REPORT_COLUMNS: [&str; 8] = [
    "Numero",
    "Tensao (p.u.)",
    "Angulo (graus)",
    "Carga Ativa (MW)",
    "Carga Reativa (Mvar)",
    "Geracao Ativa (MW)",
    "Geracao Reativa (Mvar)",
    "Shunt (Mvar)",
];

/// Column headers of the net injection report.
pub const NET_INJECTION_COLUMNS: [&str; 7] = [
    "Numero",
    "VM_PU",
    "VA_GRAU",
    "P_GER_LIQ",
    "P_CARGA_LIQ",
    "Q_GER_LIQ",
    "Q_CARGA_LIQ",
];

impl ReportFormat {
    pub fn format_value(&self, value: f64) -> String {
        let text = format!("{:.*}", self.precision, value);
        if self.decimal_separator == '.' {
            text
        } else {
            text.replace('.', &self.decimal_separator.to_string())
        }
    }

    pub fn parse_value(&self, text: &str) -> Option<f64> {
        let text = text.trim();
        let normalized = if self.decimal_separator == '.' {
            text.to_string()
        } else {
            text.replace(self.decimal_separator, ".")
        };
        normalized.parse().ok()
    }

    fn delimiter_byte(&self) -> u8 {
        // validated to be ASCII
        self.delimiter as u8
    }
}

fn writer<W: Write>(writer: W, format: &ReportFormat) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .delimiter(format.delimiter_byte())
        .from_writer(writer)
}

/// Writes the per-bus report to any writer.
pub fn write_report(
    report: &BusReport,
    writer_out: impl Write,
    format: &ReportFormat,
) -> Result<(), PwfError> {
    format.validate()?;
    let mut wtr = writer(writer_out, format);
    wtr.write_record(REPORT_COLUMNS)?;

    for r in &report.rows {
        wtr.write_record(&[
            r.bus_id.to_string(),
            format.format_value(r.vm_pu),
            format.format_value(r.va_degree),
            format.format_value(r.load_p_mw),
            format.format_value(r.load_q_mvar),
            format.format_value(r.gen_p_mw),
            format.format_value(r.gen_q_mvar),
            format.format_value(r.shunt_q_mvar),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// Writes the per-bus report to a file.
pub fn export_report(report: &BusReport, path: &Path, format: &ReportFormat) -> Result<(), PwfError> {
    let file = File::create(path)?;
    write_report(report, io::BufWriter::new(file), format)
}

pub fn write_net_injection(
    rows: &[NetInjectionRow],
    writer_out: impl Write,
    format: &ReportFormat,
) -> Result<(), PwfError> {
    format.validate()?;
    let mut wtr = writer(writer_out, format);
    wtr.write_record(NET_INJECTION_COLUMNS)?;
    for r in rows {
        wtr.write_record(&[
            r.bus_id.to_string(),
            format.format_value(r.vm_pu),
            format.format_value(r.va_degree),
            format.format_value(r.p_gen_mw),
            format.format_value(r.p_load_mw),
            format.format_value(r.q_gen_mvar),
            format.format_value(r.q_load_mvar),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn export_net_injection(
    rows: &[NetInjectionRow],
    path: &Path,
    format: &ReportFormat,
) -> Result<(), PwfError> {
    let file = File::create(path)?;
    write_net_injection(rows, io::BufWriter::new(file), format)
}

/// Parses a report written by [`write_report`] (or any file with the same
/// columns and locale).
pub fn read_report(reader: impl Read, format: &ReportFormat) -> Result<BusReport, PwfError> {
    format.validate()?;
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(format.delimiter_byte())
        .from_reader(reader);

    let headers = rdr.headers()?;
    if headers.len() != REPORT_COLUMNS.len() {
        return Err(PwfError::Report(format!(
            "expected {} columns, found {}",
            REPORT_COLUMNS.len(),
            headers.len()
        )));
    }

    let mut rows = Vec::new();
    for (index, record) in rdr.records().enumerate() {
        let record = record?;
        // header is line 1
        let line = index + 2;
        let bus_id = record
            .get(0)
            .and_then(|s| s.trim().parse::<usize>().ok())
            .ok_or_else(|| PwfError::Report(format!("line {line}: unreadable bus number")))?;

        let mut values = [0.0; 7];
        for (i, slot) in values.iter_mut().enumerate() {
            let column = i + 1;
            *slot = record
                .get(column)
                .and_then(|s| format.parse_value(s))
                .ok_or_else(|| {
                    PwfError::Report(format!(
                        "line {line}: unreadable value in column {:?}",
                        REPORT_COLUMNS[column]
                    ))
                })?;
        }
        let [vm_pu, va_degree, load_p_mw, load_q_mvar, gen_p_mw, gen_q_mvar, shunt_q_mvar] = values;
        rows.push(BusRow {
            bus_id,
            vm_pu,
            va_degree,
            load_p_mw,
            load_q_mvar,
            gen_p_mw,
            gen_q_mvar,
            shunt_q_mvar,
        });
    }

    Ok(BusReport { rows })
}

pub fn import_report(path: &Path, format: &ReportFormat) -> Result<BusReport, PwfError> {
    let file = File::open(path)?;
    read_report(io::BufReader::new(file), format)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> BusReport {
        BusReport {
            rows: vec![
                BusRow {
                    bus_id: 1,
                    vm_pu: 1.06,
                    va_degree: 0.0,
                    gen_p_mw: 232.3933,
                    gen_q_mvar: -16.5493,
                    ..BusRow::default()
                },
                BusRow {
                    bus_id: 9,
                    vm_pu: 1.0559,
                    va_degree: -14.9389,
                    load_p_mw: 29.5,
                    load_q_mvar: 16.6,
                    shunt_q_mvar: 21.2834,
                    ..BusRow::default()
                },
            ],
        }
    }

    fn written(format: &ReportFormat) -> String {
        let mut buf = Vec::new();
        write_report(&report(), &mut buf, format).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn header_and_locale() {
        let text = written(&ReportFormat::default());
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "Numero;Tensao (p.u.);Angulo (graus);Carga Ativa (MW);Carga Reativa (Mvar);\
             Geracao Ativa (MW);Geracao Reativa (Mvar);Shunt (Mvar)"
        );
        assert_eq!(
            lines.next().unwrap(),
            "1;1,0600;0,0000;0,0000;0,0000;232,3933;-16,5493;0,0000"
        );
        assert_eq!(lines.count(), 1);
    }

    #[test]
    fn round_trip_reproduces_values() {
        let format = ReportFormat::default();
        let text = written(&format);
        let back = read_report(text.as_bytes(), &format).unwrap();
        assert_eq!(back, report());
    }

    #[test]
    fn dot_decimal_locale() {
        let format = ReportFormat {
            delimiter: ',',
            decimal_separator: '.',
            precision: 2,
        };
        let text = written(&format);
        assert!(text.contains("9,1.06,-14.94,29.50,16.60,0.00,0.00,21.28"));
    }

    #[test]
    fn malformed_value_reported() {
        let text = "Numero;Tensao (p.u.);Angulo (graus);Carga Ativa (MW);Carga Reativa (Mvar);\
                    Geracao Ativa (MW);Geracao Reativa (Mvar);Shunt (Mvar)\n\
                    1;1,0;0,0;abc;0,0;0,0;0,0;0,0\n";
        let err = read_report(text.as_bytes(), &ReportFormat::default()).unwrap_err();
        match err {
            PwfError::Report(msg) => {
                assert!(msg.contains("line 2"));
                assert!(msg.contains("Carga Ativa"));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn wrong_column_count_rejected() {
        let err = read_report("a;b\n1;2\n".as_bytes(), &ReportFormat::default()).unwrap_err();
        assert!(matches!(err, PwfError::Report(_)));
    }

    #[test]
    fn net_injection_header() {
        let mut buf = Vec::new();
        write_net_injection(&report().net_injection(4), &mut buf, &ReportFormat::default()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("Numero;VM_PU;VA_GRAU;P_GER_LIQ;"));
        assert!(text.contains("9;1,0559;-14,9389;0,0000;29,5000;4,6834;0,0000"));
    }
}
