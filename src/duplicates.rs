use crate::classify::Classification;
use crate::error::{LoadSheetError, Result};
use crate::schema::{Dimension, DuplicateRow, SheetForm, Worksheet};
use log::info;
use std::collections::HashMap;

const POSITIONAL_KEY_COLUMNS: usize = 9;

/// Every data row whose dimension key is shared with another row.
///
/// The key is read from the classified dimension columns in ACCT..TYPE order
/// (plus YEAR on year-in-row sheets); when classification could not place all
/// nine dimensions the first nine columns are used as they stand. The result
/// holds all members of each group, sorted by key then row number.
pub fn find_duplicates(sheet: &Worksheet, classification: &Classification) -> Vec<DuplicateRow> {
    let mut key_columns = classification
        .key_columns()
        .unwrap_or_else(|| (0..POSITIONAL_KEY_COLUMNS.min(sheet.width())).collect());
    if classification.form == SheetForm::YearInRow {
        if let Some(year) = classification.dimension_column(Dimension::Year) {
            key_columns.push(year.index);
        }
    }

    let keyed: Vec<(usize, Vec<String>)> = (classification.form.first_data_row()..sheet.height())
        .map(|row| {
            let key = key_columns
                .iter()
                .map(|col| sheet.cell(row, *col).to_text())
                .collect();
            (row, key)
        })
        .collect();

    let mut counts: HashMap<&[String], usize> = HashMap::new();
    for (_, key) in &keyed {
        *counts.entry(key.as_slice()).or_default() += 1;
    }

    let mut duplicates: Vec<DuplicateRow> = keyed
        .iter()
        .filter(|(_, key)| counts.get(key.as_slice()).copied().unwrap_or(0) > 1)
        .map(|(row, key)| DuplicateRow {
            row_number: Worksheet::sheet_row_number(*row),
            key: key.clone(),
        })
        .collect();
    duplicates.sort_by(|a, b| a.key.cmp(&b.key).then(a.row_number.cmp(&b.row_number)));
    duplicates
}

pub fn check_duplicates(sheet: &Worksheet, classification: &Classification) -> Result<()> {
    let rows = find_duplicates(sheet, classification);
    if rows.is_empty() {
        info!("No duplicate rows found.");
        Ok(())
    } else {
        Err(LoadSheetError::DuplicateKeys { rows })
    }
}
