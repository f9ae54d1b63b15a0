use chrono::NaiveDate;
use fpa_load_builder::*;
use std::collections::BTreeSet;

const SOURCE_PATH: &str = r"\\share\plans\Plan.xlsx|||Sheet1$";
const SUBMITTER: &str = "e12345@example.com";

fn run_config(year: i32) -> PipelineConfig {
    PipelineConfig::default()
        .with_run_at(
            NaiveDate::from_ymd_opt(year, 3, 15)
                .unwrap()
                .and_hms_opt(10, 5, 0)
                .unwrap(),
        )
        .with_minimum_catalog_rows(0)
}

fn leaf(name: &str, alias: Option<&str>) -> DimensionMember {
    DimensionMember::new(name, alias, 0)
}

fn catalog() -> ReferenceCatalog {
    let accounts = (0..10)
        .map(|i| {
            leaf(
                &format!("GL:10000{}", i),
                Some(&format!("Fuel {} (10000{})", i, i)),
            )
            .with_attribute("Data Storage", "Store Data")
        })
        .chain(std::iter::once(
            leaf("GL:200000", Some("Fuel Tax (200000)")).with_attribute("Data Storage", "Dynamic Calc"),
        ))
        .collect();

    let months = [
        ("Jan", Some("January")),
        ("Feb", Some("February")),
        ("Mar", Some("March")),
        ("May", None),
    ];

    ReferenceCatalog::new()
        .with_table(DimensionTable::new(Dimension::Account, accounts))
        .with_table(DimensionTable::new(
            Dimension::CostCenter,
            vec![
                leaf("CC:12345", Some("Ramp (12345)")),
                leaf("CC:40001", Some("Non Operating (40001)")),
            ],
        ))
        .with_table(DimensionTable::new(
            Dimension::InternalOrder,
            vec![leaf("IO:None", Some("No Internal Order"))],
        ))
        .with_table(DimensionTable::new(
            Dimension::Company,
            vec![leaf("CO:9001", Some("Airline (9001)")), leaf("CO:9002", Some("Cargo (9002)"))],
        ))
        .with_table(DimensionTable::new(
            Dimension::ProfitCenter,
            vec![leaf("PC:1000", Some("HDQ (1000)"))],
        ))
        .with_table(DimensionTable::new(
            Dimension::EquipmentType,
            vec![leaf("ET:None", Some("No Equipment"))],
        ))
        .with_table(DimensionTable::new(
            Dimension::Scenario,
            vec![leaf("Forecast", None), leaf("Actual", None)],
        ))
        .with_table(DimensionTable::new(
            Dimension::Version,
            vec![
                leaf("Working", None),
                leaf("Final", None),
                leaf("Current Capacity", None),
            ],
        ))
        .with_table(DimensionTable::new(
            Dimension::Type,
            vec![leaf("Amount", None), leaf("Adjustment", None)],
        ))
        .with_table(DimensionTable::new(
            Dimension::Year,
            vec![
                leaf("FY22", Some("FY 2022")),
                leaf("FY23", Some("FY 2023")),
                leaf("FY24", Some("FY 2024")),
            ],
        ))
        .with_table(DimensionTable::new(
            Dimension::Period,
            months.iter().map(|(m, a)| leaf(m, *a)).collect(),
        ))
}

/// Dimension values of one sheet row, in F1..F9 order.
fn key_row(account: &str, cost_center: &str, version: &str) -> Vec<String> {
    [
        account,
        cost_center,
        "IO:None",
        "CO:9001",
        "PC:1000",
        "ET:None",
        "Forecast",
        version,
        "Amount",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Year-in-header template sheet with one column per `(header, month)`.
fn template_sheet(periods: &[(&str, &str)], rows: &[Vec<String>]) -> Worksheet {
    let mut headers: Vec<String> = (1..=9).map(|i| format!("F{}", i)).collect();
    headers.extend(periods.iter().map(|(h, _)| h.to_string()));
    headers.push("FileName".to_string());
    headers.push("UserEmail".to_string());

    let mut month_row = vec![Cell::from(""); 9];
    month_row.extend(periods.iter().map(|(_, m)| Cell::from(*m)));
    month_row.push(Cell::from(SOURCE_PATH));
    month_row.push(Cell::from(SUBMITTER));

    let mut sheet_rows = vec![month_row];
    for (i, key) in rows.iter().enumerate() {
        let mut row: Vec<Cell> = key.iter().map(|v| Cell::text(v.clone())).collect();
        row.extend((0..periods.len()).map(|p| Cell::Number((i * 10 + p) as f64 + 1.0)));
        row.push(Cell::from(SOURCE_PATH));
        row.push(Cell::from(SUBMITTER));
        sheet_rows.push(row);
    }
    Worksheet::new(headers, sheet_rows)
}

fn ten_rows() -> Vec<Vec<String>> {
    (0..10)
        .map(|i| key_row(&format!("GL:10000{}", i), "CC:12345", "Working"))
        .collect()
}

fn inputs(worksheet: Worksheet) -> PipelineInputs {
    PipelineInputs {
        worksheet,
        catalog: catalog(),
        backup: BackupSnapshot::default(),
        capacity_accounts: BTreeSet::new(),
    }
}

#[test]
fn test_single_period_sheet_loads_one_fact_per_row() -> anyhow::Result<()> {
    let sheet = template_sheet(&[("FY23_Jan", "Jan")], &ten_rows());
    let output = LoadSheetProcessor::process(&inputs(sheet), &run_config(2024))?;

    assert_eq!(output.facts.len(), 10);
    assert!(output.facts.iter().all(|f| f.year == "FY23" && f.period == "Jan"));
    assert_eq!(output.facts[3].account, "GL:100003");
    assert_eq!(output.facts[3].value, 31.0);
    assert_eq!(output.kind, LoadKind::Working);
    assert_eq!(output.file_name, "Working_Load_e12345_Plan_Sheet1_2024-03-15-1005");
    assert!(output.facts.iter().all(|f| f.file_name == output.file_name));
    assert!(output.capacity_flags.is_none());
    Ok(())
}

#[test]
fn test_fact_count_is_rows_times_periods() -> anyhow::Result<()> {
    let sheet = template_sheet(
        &[("FY 2024", "January"), ("FY2024_2", "Fcst February"), ("FY2024_3", "March")],
        &ten_rows(),
    );
    let output = LoadSheetProcessor::process(&inputs(sheet), &run_config(2024))?;

    assert_eq!(output.facts.len(), 30);
    let periods: Vec<&str> = output.facts.iter().map(|f| f.period.as_str()).collect();
    assert_eq!(periods[0], "Jan");
    assert_eq!(periods[10], "Feb");
    assert_eq!(periods[29], "Mar");
    assert!(output.facts.iter().all(|f| f.year == "FY24"));
    Ok(())
}

#[test]
fn test_duplicate_rows_abort_with_both_row_numbers() {
    let mut rows = ten_rows();
    rows[5] = rows[0].clone();
    let sheet = template_sheet(&[("FY23_Jan", "Jan")], &rows);

    let err = LoadSheetProcessor::process(&inputs(sheet), &run_config(2024)).unwrap_err();
    match err {
        LoadSheetError::DuplicateKeys { rows } => {
            let numbers: Vec<usize> = rows.iter().map(|r| r.row_number).collect();
            assert_eq!(numbers, vec![3, 8]);
            assert_eq!(rows[0].key[0], "GL:100000");
        }
        other => panic!("expected duplicate keys, got {:?}", other),
    }
}

#[test]
fn test_fleet_capacity_load() -> anyhow::Result<()> {
    let rows: Vec<Vec<String>> = (0..3)
        .map(|i| key_row(&format!("GL:10000{}", i), "CC:40001", "Current Capacity"))
        .collect();
    let sheet = template_sheet(&[("FY24_1", "Jan"), ("FY24_2", "Feb")], &rows);
    let output = LoadSheetProcessor::process(&inputs(sheet), &run_config(2024))?;

    assert_eq!(output.kind, LoadKind::CapacityFleetOnly);
    assert!(output.file_name.starts_with("CurrentCapacity_Load_FleetOnly_Plan_"));

    let flags = output.capacity_flags.expect("capacity flag table");
    assert_eq!(flags.len(), 2);
    assert!(flags.iter().all(|f| f.flag == 2 && f.version == "Current Capacity"));
    assert_eq!(flags[0].account, "CL:09962");
    assert_eq!(flags[1].period, "Feb");
    Ok(())
}

#[test]
fn test_invalid_account_is_reported_before_reshape() {
    let mut rows = ten_rows();
    rows[2][0] = "GL:999999".to_string();
    rows[4][0] = "GL:200000".to_string();
    let sheet = template_sheet(&[("FY23_Jan", "Jan")], &rows);

    let mut sink = RecordingSink::new();
    let err = LoadSheetProcessor::process_with_sink(&inputs(sheet), &run_config(2024), &mut sink)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::MembershipError);
    let details: Vec<(&str, &str)> = err
        .issues()
        .iter()
        .map(|i| (i.rule.as_str(), i.detail.as_str()))
        .collect();
    assert_eq!(details, vec![("Account", "GL:200000"), ("Account", "GL:999999")]);

    let failure = sink.failure().expect("a failed stage");
    assert_eq!(failure.stage, Stage::Members);
    assert!(!sink.stages().contains(&Stage::Reshape));
}

#[test]
fn test_actual_final_sheet_matches_alias_less_members() -> anyhow::Result<()> {
    let rows: Vec<Vec<String>> = ten_rows()
        .into_iter()
        .map(|mut row| {
            row[6] = "Actual".to_string();
            row[7] = "Final".to_string();
            row
        })
        .collect();
    let sheet = template_sheet(&[("FY24_1", "Jan")], &rows);
    let output = LoadSheetProcessor::process(&inputs(sheet), &run_config(2024))?;

    assert_eq!(output.facts.len(), 10);
    assert!(output.facts.iter().all(|f| f.scenario == "Actual" && f.version == "Final"));
    assert_eq!(output.kind, LoadKind::Actual);
    assert_eq!(output.file_name, "Actual_Load_Plan_2024-03-15-1005");
    Ok(())
}

#[test]
fn test_period_header_without_year_is_rejected() {
    let sheet = template_sheet(&[("FY24_1", "Jan"), ("Budget", "Feb")], &ten_rows());

    let mut sink = RecordingSink::new();
    let err = LoadSheetProcessor::process_with_sink(&inputs(sheet), &run_config(2024), &mut sink)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::MembershipError);
    let details: Vec<(&str, &str)> = err
        .issues()
        .iter()
        .map(|i| (i.rule.as_str(), i.detail.as_str()))
        .collect();
    assert_eq!(details, vec![("Year", "Budget")]);
    assert!(!sink.stages().contains(&Stage::Reshape));
}

#[test]
fn test_shared_alias_is_reported_not_resolved() {
    let mut catalog = catalog();
    catalog.insert(DimensionTable::new(
        Dimension::CostCenter,
        vec![
            leaf("CC:12345", Some("Ramp (12345)")),
            leaf("CC:54321", Some("Ramp (12345)")),
            leaf("CC:40001", Some("Non Operating (40001)")),
        ],
    ));
    let rows: Vec<Vec<String>> = (0..2)
        .map(|i| key_row(&format!("GL:10000{}", i), "Ramp (12345)", "Working"))
        .collect();
    let sheet = template_sheet(&[("FY24_1", "Jan")], &rows);
    let mut inputs = inputs(sheet);
    inputs.catalog = catalog;

    let err = LoadSheetProcessor::process(&inputs, &run_config(2024)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MembershipError);
    assert_eq!(err.issues().len(), 1);
    assert_eq!(err.issues()[0].rule, "Cost Center");
    assert_eq!(
        err.issues()[0].detail,
        "Ramp (12345) (alias shared by CC:12345, CC:54321)"
    );
}

#[test]
fn test_old_years_and_disallowed_companies_are_rejected() {
    let mut rows = ten_rows();
    rows[1][3] = "CO:9002".to_string();
    let sheet = template_sheet(&[("FY22_Jan", "Jan")], &rows);

    let err = LoadSheetProcessor::process(&inputs(sheet), &run_config(2024)).unwrap_err();
    let rules: Vec<&str> = err.issues().iter().map(|i| i.rule.as_str()).collect();
    assert_eq!(rules, vec!["Company Code", "Year"]);
    assert_eq!(err.issues()[1].detail, "FY22");
}

#[test]
fn test_alias_sheet_resolves_to_member_names() -> anyhow::Result<()> {
    let rows: Vec<Vec<String>> = (0..4)
        .map(|i| {
            let mut row = key_row(&format!("Fuel {} (10000{})", i, i), "Ramp (12345)", "Working");
            row[3] = "Airline (9001)".to_string();
            row
        })
        .collect();
    let sheet = template_sheet(&[("FY24_1", "Jan")], &rows);

    let config = run_config(2024);
    let prepared = prepare_worksheet(&sheet, &config);
    let index = MemberIndex::build(&catalog(), &config);
    let classification = classify_columns(&prepared, SheetForm::YearInHeader, &index);
    let load_sheet = relabel(&prepared, &classification, &index)?;
    assert!(load_sheet.headers.contains(&"ACCT_Alias".to_string()));
    assert_eq!(
        load_sheet.rows[2].aliases.get(&Dimension::Account).map(String::as_str),
        Some("Fuel 2 (100002)")
    );

    let output = LoadSheetProcessor::process(&inputs(sheet), &config)?;
    let accounts: Vec<&str> = output.facts.iter().map(|f| f.account.as_str()).collect();
    assert_eq!(accounts, vec!["GL:100000", "GL:100001", "GL:100002", "GL:100003"]);
    assert!(output.facts.iter().all(|f| f.cost_center == "CC:12345"));
    assert!(output.facts.iter().all(|f| f.company == "CO:9001"));

    // A member name resolves back to itself.
    let allowed = index.allowed(Dimension::Account);
    for account in accounts {
        assert_eq!(allowed.resolve(account, MemberEncoding::MemberName), Some(account));
    }
    Ok(())
}

#[test]
fn test_backup_join_never_adds_rows() -> anyhow::Result<()> {
    let fields = |account: &str, jan: &str| -> Vec<String> {
        let mut f: Vec<String> = [
            "ET:None", "PC:1000", "CO:9001", "Amount", "IO:None", "CC:12345", "FY23", "Working",
            "Forecast", account, jan,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        f.extend((0..11).map(|_| "0".to_string()));
        f.push("CORPPLN_Forecast_CY".to_string());
        f
    };
    let backup = BackupSnapshot::new(vec![
        BackupRow::from_fields(&fields("GL:100001", "250"))?,
        BackupRow::from_fields(&fields("GL:555555", "999"))?,
    ]);

    let sheet = template_sheet(&[("FY23_Jan", "Jan")], &ten_rows());
    let mut inputs = inputs(sheet);
    inputs.backup = backup;
    let output = LoadSheetProcessor::process(&inputs, &run_config(2024))?;

    assert_eq!(output.facts.len(), 10);
    assert_eq!(output.facts[1].backup_value, 250.0);
    assert!(output
        .facts
        .iter()
        .filter(|f| f.account != "GL:100001")
        .all(|f| f.backup_value == 0.0));
    Ok(())
}

#[test]
fn test_year_in_row_extract() -> anyhow::Result<()> {
    let headers: Vec<String> = [
        "ET", "ACCT", "CC", "IO", "CO", "PC", "SCEN", "VER", "TYPE", "YEAR", "Jan", "Feb",
        "FileName", "UserEmail",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    let rows = (0..3)
        .map(|i| {
            let mut row: Vec<Cell> = [
                "ET:None",
                format!("GL:10000{}", i).as_str(),
                "CC:12345",
                "IO:None",
                "CO:9001",
                "PC:1000",
                "Forecast",
                "Working",
                "Adjustment",
                "FY24",
            ]
            .iter()
            .map(|s| Cell::from(*s))
            .collect();
            row.extend([Cell::Number(1.5), Cell::Number(-2.0)]);
            row.extend([Cell::from(SOURCE_PATH), Cell::from(SUBMITTER)]);
            row
        })
        .collect();

    let output = LoadSheetProcessor::process(&inputs(Worksheet::new(headers, rows)), &run_config(2024))?;

    assert_eq!(output.facts.len(), 6);
    assert!(output.facts.iter().all(|f| f.scenario == "Actual" && f.version == "Final"));
    assert!(output.facts.iter().all(|f| f.year == "FY24"));
    assert_eq!(output.kind, LoadKind::Actual);
    assert!(output.file_name.starts_with("Actual_Load_Plan_"));
    Ok(())
}

#[test]
fn test_layout_failures_become_a_report() {
    let mut sheet = template_sheet(&[("FY23_Jan", "Jan")], &ten_rows());
    sheet.headers[0] = "Account".to_string();
    sheet.rows[3][9] = Cell::from("n/a");

    let config = run_config(2024);
    match LoadSheetProcessor::process_or_report(&inputs(sheet), &config) {
        PipelineOutcome::Rejected(report) => {
            assert_eq!(report.kind, ErrorKind::LayoutError);
            assert_eq!(report.rows.len(), 1);
            assert_eq!(report.rows[0].rule, "Year");
            assert_eq!(report.recipient, SUBMITTER);
            assert_eq!(report.report_name, "Validation_Errors_e12345_Plan_Sheet1.txt");
        }
        PipelineOutcome::Loaded(_) => panic!("layout errors must reject the sheet"),
    }
}

#[test]
fn test_incomplete_catalog_is_reported_first() {
    let sheet = template_sheet(&[("FY23_Jan", "Jan")], &ten_rows());
    let config = PipelineConfig::default();

    let mut sink = RecordingSink::new();
    let err = LoadSheetProcessor::process_with_sink(&inputs(sheet), &config, &mut sink).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ReferenceDataError);
    assert_eq!(err.issues().len(), 11);
    assert_eq!(
        sink.stages(),
        vec![Stage::Preparation, Stage::SheetName, Stage::ReferenceData]
    );
}

#[test]
fn test_short_submitter_address_uses_fallback() -> anyhow::Result<()> {
    let mut sheet = template_sheet(&[("FY23_Jan", "Jan")], &ten_rows());
    let email_col = sheet.width() - 1;
    for row in sheet.rows.iter_mut() {
        row[email_col] = Cell::from("e1234@abc");
    }

    let config = run_config(2024);
    let output = LoadSheetProcessor::process(&inputs(sheet), &config)?;
    assert!(output
        .facts
        .iter()
        .all(|f| f.user_email == config.fallback_recipient));
    Ok(())
}

#[test]
fn test_sheet_from_csv() -> anyhow::Result<()> {
    let mut csv = String::from("F1,F2,F3,F4,F5,F6,F7,F8,F9,FY24,FileName,UserEmail\n");
    csv.push_str(",,,,,,,,,January,x,y\n");
    csv.push_str(&format!(
        "GL:100000,CC:12345,IO:None,CO:9001,PC:1000,ET:None,Forecast,Working,Amount,,\"{}\",{}\n",
        SOURCE_PATH, SUBMITTER
    ));
    let sheet = read_worksheet_csv(csv.as_bytes())?;
    let output = LoadSheetProcessor::process(&inputs(sheet), &run_config(2024))?;

    assert_eq!(output.facts.len(), 1);
    assert_eq!(output.facts[0].year, "FY24");
    assert_eq!(output.facts[0].period, "Jan");
    assert_eq!(output.facts[0].value, 0.0);
    Ok(())
}

#[test]
fn test_schema_generation() {
    let schema = PipelineConfig::schema_as_json().expect("schema serializes");
    assert!(schema.contains("member_allowlists"));
    assert!(schema.contains("fleet_cost_centers"));
}
