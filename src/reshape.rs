use crate::classify::LoadSheet;
use crate::error::{LoadSheetError, Result};
use crate::schema::{FactRow, SheetForm};
use log::debug;

/// Year-in-row extracts are actuals and always load as final.
const YEAR_IN_ROW_SCENARIO: &str = "Actual";
const YEAR_IN_ROW_VERSION: &str = "Final";

/// Melts the wide period columns into one fact row per row and period.
///
/// Output is ordered by period column first, then sheet row. Values that do
/// not coerce to a number load as zero. The backup value, output file name
/// and recipient columns are filled by later stages.
pub fn reshape(sheet: &LoadSheet) -> Result<Vec<FactRow>> {
    let expected = sheet.rows.len() * sheet.periods.len();
    let mut facts = Vec::with_capacity(expected);

    for (p, period) in sheet.periods.iter().enumerate() {
        for row in &sheet.rows {
            let year = match sheet.form {
                SheetForm::YearInHeader => period.year.clone(),
                SheetForm::YearInRow => row.year.clone(),
            }
            .unwrap_or_default();

            let (scenario, version) = match sheet.form {
                SheetForm::YearInHeader => (row.key.scenario.clone(), row.key.version.clone()),
                SheetForm::YearInRow => (
                    YEAR_IN_ROW_SCENARIO.to_string(),
                    YEAR_IN_ROW_VERSION.to_string(),
                ),
            };

            let value = row
                .values
                .get(p)
                .and_then(|cell| cell.to_number())
                .unwrap_or(0.0);

            facts.push(FactRow {
                account: row.key.account.clone(),
                cost_center: row.key.cost_center.clone(),
                internal_order: row.key.internal_order.clone(),
                company: row.key.company.clone(),
                profit_center: row.key.profit_center.clone(),
                equipment_type: row.key.equipment_type.clone(),
                scenario,
                version,
                load_type: row.key.load_type.clone(),
                year,
                period: period.period.clone(),
                value,
                backup_value: 0.0,
                file_name: row.file_name.clone(),
                user_email: row.user_email.clone(),
                cc_email: None,
            });
        }
    }

    if facts.len() != expected {
        return Err(LoadSheetError::Malformed(format!(
            "reshape produced {} rows, expected {}",
            facts.len(),
            expected
        )));
    }

    debug!(
        "Reshaped {} rows x {} periods into {} fact rows",
        sheet.rows.len(),
        sheet.periods.len(),
        facts.len()
    );
    Ok(facts)
}
