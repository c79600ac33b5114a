use std::fs;

use pwflow::compare::{ReportColumn, compare_reports};
use pwflow::export::{export_report, import_report, read_report, write_report};
use pwflow::{
    BusType, DcPowerFlow, GeneratorRole, ImportConfig, Pipeline, PwfConfig, PwfError,
    ReportFormat, SolveError,
};

const THREE_BUS: &str = "\
TITU
 TRES BARRAS
DBAR
(Num)OETGb(   nome   )Gl( V)( A)( Pg)( Qg)( Qn)( Qm)(Bc  )( Pl)( Ql)( Sh)
    1 L2  SLACK         1000   0          -999.9999.
    2 L0  CARGA         1000                                50.  20.
    3 L1  GERADOR       1000      60.      -50.  50.
99999
DLIN
(De )d O d(Pa )NcEP ( R% )( X% )(Mvar)(Tap)
    1         2       1.00  10.0  5.00
    2         3       1.00  10.0  5.00
99999
FIM
";

/// Three-bus case plus a dangling branch, a transformer, a flow limit in the
/// tap column, a malformed voltage and a shunt.
const FIVE_BUS: &str = "\
TITU
 CINCO BARRAS
DBAR
(Num)OETGb(   nome   )Gl( V)( A)( Pg)( Qg)( Qn)( Qm)(Bc  )( Pl)( Ql)( Sh)
    1 L2  SLACK         1000   0          -999.9999.
    2 L0  CARGA         1000                                50.  20.
    3 L1  GERADOR       1000      60.      -50.  50.
    4 L0  BARRA 4       1.0x
    5 L0  SÃO JOÃO       985                                10.       15.
99999
DGER
(No ) O (Pmn ) (Pmx ) ( Fp) (FpR) (FPn) (Fa) (Fr) (Ag) ( Xq) (Sno)
    3     0.   100.
99999
DLIN
(De )d O d(Pa )NcEP ( R% )( X% )(Mvar)(Tap)
    1         2       1.00  10.0  5.00
    2         3       1.00  10.0  5.00
    3         9       1.00  10.0
    3         4       0.50  8.00      0.979
    4         5       1.00  10.0        330
99999
";

#[test]
fn three_bus_model() {
    let pipeline = Pipeline::default();
    let imported = pipeline.import_str(THREE_BUS, "three").unwrap();
    let net = &imported.network;

    assert_eq!(net.buses.len(), 3);
    assert_eq!(net.line_count(), 2);
    assert_eq!(net.transformer_count(), 0);
    assert_eq!(net.loads().count(), 1);

    let roles: Vec<(usize, Option<GeneratorRole>)> = net
        .generators()
        .map(|g| (g.bus_id, g.generator_role()))
        .collect();
    assert_eq!(
        roles,
        vec![(1, Some(GeneratorRole::Slack)), (3, Some(GeneratorRole::PV))]
    );
    assert_eq!(net.bus(1).unwrap().bus_type, BusType::Slack);
    assert_eq!(net.bus(1).unwrap().voltage, 1.0);
    assert!(!imported.diagnostics.has_issues());
}

#[test]
fn three_bus_report() {
    let pipeline = Pipeline::default();
    let imported = pipeline.import_str(THREE_BUS, "three").unwrap();
    let report = pipeline.run(&imported.network, &DcPowerFlow).unwrap();

    let ids: Vec<usize> = report.rows.iter().map(|r| r.bus_id).collect();
    assert_eq!(ids, vec![1, 2, 3]);

    let bus1 = report.row(1).unwrap();
    let bus2 = report.row(2).unwrap();
    let bus3 = report.row(3).unwrap();
    assert_eq!((bus1.load_p_mw, bus1.load_q_mvar), (0.0, 0.0));
    assert_eq!((bus3.load_p_mw, bus3.load_q_mvar), (0.0, 0.0));
    assert_eq!((bus2.gen_p_mw, bus2.gen_q_mvar), (0.0, 0.0));

    assert_eq!((bus2.load_p_mw, bus2.load_q_mvar), (50.0, 20.0));
    assert_eq!(bus3.gen_p_mw, 60.0);
    // the slack takes the surplus of bus 3
    assert_eq!(bus1.gen_p_mw, -10.0);
    assert_eq!(bus1.va_degree, 0.0);
}

#[test]
fn five_bus_recovers_from_bad_records() {
    let pipeline = Pipeline::default();
    let imported = pipeline.import_str(FIVE_BUS, "five").unwrap();
    let net = &imported.network;
    let stats = &imported.diagnostics.stats;

    assert_eq!(net.buses.len(), 5);
    assert_eq!(net.branches.len(), 4);
    assert_eq!(stats.dropped_branches, 1);
    assert_eq!(stats.lines, 3);
    assert_eq!(stats.transformers, 1);
    assert_eq!(stats.generator_records, 1);
    assert_eq!(stats.defaulted_values, 1);

    // malformed voltage falls back to the default
    assert_eq!(net.bus(4).unwrap().voltage, ImportConfig::default().default_voltage_pu);
    assert!((net.bus(5).unwrap().voltage - 0.985).abs() < 1e-12);
    assert_eq!(net.bus(5).unwrap().bus_name, "SÃO JOÃO");

    let transformer = net.branches.iter().find(|b| b.model.is_transformer()).unwrap();
    assert_eq!(transformer.endpoints(), (3, 4));

    let report = pipeline.run(net, &DcPowerFlow).unwrap();
    let bus5 = report.row(5).unwrap();
    assert_eq!(bus5.shunt_q_mvar, 15.0);
    assert_eq!(bus5.load_p_mw, 10.0);
    assert_eq!(report.row(1).unwrap().gen_p_mw, 0.0);
}

#[test]
fn latin1_file_import() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cinco.pwf");
    let latin1: Vec<u8> = FIVE_BUS.chars().map(|c| c as u32 as u8).collect();
    fs::write(&path, latin1).unwrap();

    let imported = Pipeline::default().import_file(&path).unwrap();
    assert_eq!(imported.network.case_name, "cinco");
    assert_eq!(imported.network.bus(5).unwrap().bus_name, "SÃO JOÃO");
}

#[test]
fn report_round_trip_through_file() {
    let pipeline = Pipeline::default();
    let imported = pipeline.import_str(FIVE_BUS, "five").unwrap();
    let report = pipeline.run(&imported.network, &DcPowerFlow).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.csv");
    let format = ReportFormat::default();
    export_report(&report, &path, &format).unwrap();

    let back = import_report(&path, &format).unwrap();
    assert_eq!(back, report);

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("Numero;Tensao (p.u.);"));
    assert!(text.lines().nth(1).unwrap().starts_with("1;1,0000;0,0000;"));
}

#[test]
fn comparing_a_report_with_itself() {
    let pipeline = Pipeline::default();
    let imported = pipeline.import_str(THREE_BUS, "three").unwrap();
    let report = pipeline.run(&imported.network, &DcPowerFlow).unwrap();

    let mut buf = Vec::new();
    write_report(&report, &mut buf, &ReportFormat::default()).unwrap();
    let reference = read_report(buf.as_slice(), &ReportFormat::default()).unwrap();

    let cmp = compare_reports(&reference, &report, ReportColumn::Angle);
    // bus 1 is the zero-angle reference
    assert_eq!(cmp.zero_reference, vec![1]);
    assert!(cmp.errors.iter().all(|e| e.error_percent == 0.0));
    assert!(cmp.missing.is_empty());
}

#[test]
fn compare_against_reference_file() {
    let dir = tempfile::tempdir().unwrap();
    let case_path = dir.path().join("tres.pwf");
    fs::write(&case_path, THREE_BUS).unwrap();

    let pipeline = Pipeline::default();
    let (imported, report) = pipeline.import_and_run(&case_path, &DcPowerFlow).unwrap();
    assert_eq!(imported.network.case_name, "tres");

    // reference with bus 2 load 10 % above the computed value
    let mut reference = report.clone();
    reference.rows[1].load_p_mw = 55.0;
    let format = ReportFormat::default();
    let reference_path = dir.path().join("referencia.csv");
    export_report(&reference, &reference_path, &format).unwrap();

    let reference = import_report(&reference_path, &format).unwrap();
    let column: ReportColumn = "Carga Ativa (MW)".parse().unwrap();
    let cmp = compare_reports(&reference, &report, column);
    assert_eq!(cmp.zero_reference, vec![1, 3]);
    assert_eq!(cmp.errors.len(), 1);

    let errors_path = dir.path().join("erro.csv");
    cmp.export_csv(&errors_path, &format).unwrap();
    let text = fs::read_to_string(&errors_path).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("Numero;Referencia;Calculado;Erro (%)"));
    let row = lines.next().unwrap();
    assert!(row.starts_with("2;55,0000;50,0000;9,0909"));
}

#[test]
fn config_file_sets_fallback_slack_and_precision() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pwflow.toml");
    fs::write(
        &path,
        "[import]\nfallback_slack_bus = 3\n\n[report]\nprecision = 2\n",
    )
    .unwrap();
    let config = PwfConfig::from_toml_file(&path).unwrap();
    let pipeline = Pipeline::new(config);

    // bus 1 declared PQ: no slack in the case
    let no_slack = THREE_BUS.replacen("    1 L2  SLACK", "    1 L0  SLACK", 1);
    let imported = pipeline.import_str(&no_slack, "fallback").unwrap();
    let net = &imported.network;
    assert_eq!(net.slack_buses(), vec![3]);
    assert_eq!(imported.diagnostics.in_category("model").count(), 1);

    let report = pipeline.run(net, &DcPowerFlow).unwrap();
    // PV unit keeps 60 MW, the synthesized slack takes -10 MW
    assert_eq!(report.row(3).unwrap().gen_p_mw, 50.0);
    let mut buf = Vec::new();
    write_report(&report, &mut buf, &pipeline.config().report).unwrap();
    let text = String::from_utf8(buf).unwrap();
    assert!(text.contains("\n2;1,00;"));
}

#[test]
fn unknown_config_key_rejected() {
    let err = PwfConfig::from_toml_str("[import]\nbase_kvv = 230.0\n").unwrap_err();
    assert!(matches!(err, PwfError::ConfigSyntax(_)));
}

#[test]
fn empty_case_is_structural_error() {
    let err = Pipeline::default()
        .import_str("TITU\n SEM BARRAS\nDLIN\n    1         2       1.00  10.0\n99999\n", "empty")
        .unwrap_err();
    assert!(matches!(err, PwfError::NoBuses));
}

#[test]
fn contingency_toggle_and_restore() {
    let pipeline = Pipeline::default();
    let mut net = pipeline.import_str(THREE_BUS, "three").unwrap().network;

    // 2-3 out of service islands bus 3
    assert!(net.set_branch_in_service(1, false));
    let err = pipeline.run(&net, &DcPowerFlow).unwrap_err();
    assert!(matches!(err, PwfError::Solve(SolveError::NonConvergence(_))));

    assert!(net.set_branch_in_service(1, true));
    let report = pipeline.run(&net, &DcPowerFlow).unwrap();
    assert_eq!(report.rows.len(), 3);
}
