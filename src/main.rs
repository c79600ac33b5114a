use std::env;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use log::{error, info, warn};

use pwflow::compare::{ReportColumn, compare_reports};
use pwflow::export::{export_net_injection, export_report, import_report};
use pwflow::{DcPowerFlow, Pipeline, PwfConfig, PwfError};

const USAGE: &str = "usage: pwflow <case.pwf> [report.csv] [--config file.toml] [--net net.csv] \
[--compare reference.csv column] [--errors errors.csv] [--dump-diagnostics]";

struct Args {
    case: PathBuf,
    report: Option<PathBuf>,
    net_report: Option<PathBuf>,
    config: Option<PathBuf>,
    /// Reference report and the column to compare.
    compare: Option<(PathBuf, ReportColumn)>,
    errors: Option<PathBuf>,
    dump_diagnostics: bool,
}

fn parse_args() -> Option<Args> {
    let mut positional = Vec::new();
    let mut config = None;
    let mut net_report = None;
    let mut compare = None;
    let mut errors = None;
    let mut dump_diagnostics = false;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config = Some(PathBuf::from(args.next()?)),
            "--net" => net_report = Some(PathBuf::from(args.next()?)),
            "--compare" => {
                let reference = PathBuf::from(args.next()?);
                let column: ReportColumn = args.next()?.parse().ok()?;
                compare = Some((reference, column));
            }
            "--errors" => errors = Some(PathBuf::from(args.next()?)),
            "--dump-diagnostics" => dump_diagnostics = true,
            "-h" | "--help" => return None,
            _ => positional.push(PathBuf::from(arg)),
        }
    }

    let mut positional = positional.into_iter();
    let case = positional.next()?;
    Some(Args {
        case,
        report: positional.next(),
        net_report,
        config,
        compare,
        errors,
        dump_diagnostics,
    })
}

fn run(args: &Args) -> Result<(), PwfError> {
    let config = match &args.config {
        Some(path) => PwfConfig::from_toml_file(path)?,
        None => PwfConfig::default(),
    };
    let pipeline = Pipeline::new(config);

    let imported = pipeline.import_file(&args.case)?;
    let diag = &imported.diagnostics;
    if diag.has_issues() {
        warn!(
            "Import finished with {} warnings and {} skipped records",
            diag.warning_count(),
            diag.error_count()
        );
    }
    if args.dump_diagnostics {
        match diag.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => warn!("Could not serialize diagnostics: {}", e),
        }
    }

    let report = pipeline.run(&imported.network, &DcPowerFlow)?;
    print!("{}", report);

    let format = &pipeline.config().report;
    if let Some(path) = &args.report {
        export_report(&report, path, format)?;
        info!("Report written to {}", path.display());
    }
    if let Some(path) = &args.net_report {
        export_net_injection(&report.net_injection(format.precision), path, format)?;
        info!("Net injection report written to {}", path.display());
    }

    if let Some((reference_path, column)) = &args.compare {
        let reference = import_report(reference_path, format)?;
        let comparison = compare_reports(&reference, &report, *column);
        if let (Some(worst), Some(mean)) = (comparison.max_error(), comparison.mean_error()) {
            info!(
                "{}: mean error {:.4} %, max {:.4} % at bus {}",
                column, mean, worst.error_percent, worst.bus_id
            );
        }
        if !comparison.missing.is_empty() {
            warn!("Buses missing from the computed report: {:?}", comparison.missing);
        }
        match &args.errors {
            Some(path) => {
                comparison.export_csv(path, format)?;
                info!("Comparison written to {}", path.display());
            }
            None => comparison.write_csv(io::stdout().lock(), format)?,
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    // default level info, overridable through RUST_LOG
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let Some(args) = parse_args() else {
        eprintln!("{}", USAGE);
        return ExitCode::from(2);
    };

    info!("Beginning run...");
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
