//! Member Validator: checks sheet values against the loadable members of
//! each dimension.

use crate::catalog::MemberIndex;
use crate::classify::Classification;
use crate::error::{LoadSheetError, Result};
use crate::schema::{Cell, Dimension, SheetForm, ValidationIssue, Worksheet};
use log::{debug, info};
use std::collections::BTreeSet;

/// "May" has no alias in the Period extract and is never reported.
const ALIASLESS_MEMBER: &str = "MAY";

/// Distinct sheet values of `dimension` that match no loadable member name
/// or alias, sorted. Empty strings are skipped; an alias shared by several
/// members matches none of them.
pub fn validate_members<'a, I>(values: I, dimension: Dimension, index: &MemberIndex) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let allowed = index.allowed(dimension);
    let invalid: BTreeSet<String> = values
        .into_iter()
        .filter(|v| !v.is_empty())
        .filter(|v| !allowed.contains(v))
        .filter(|v| v.to_uppercase() != ALIASLESS_MEMBER)
        .map(str::to_string)
        .collect();
    debug!("{} dimension: {} invalid value(s)", dimension.label(), invalid.len());
    invalid
}

/// Validates every classified dimension column plus the Year and Period
/// labels of the period columns, aggregating all findings.
///
/// Issues are keyed by dimension label and carry one invalid value each. A
/// key dimension with no classified column, or a column nothing could be
/// matched to, is reported here as well.
pub fn check_sheet_members(
    sheet: &Worksheet,
    classification: &Classification,
    index: &MemberIndex,
) -> Result<()> {
    let mut issues = Vec::new();
    let first_data_row = classification.form.first_data_row();

    let mut dimensions: Vec<Dimension> = Dimension::KEY.to_vec();
    if classification.form == SheetForm::YearInRow {
        dimensions.push(Dimension::Year);
    }

    for dimension in dimensions {
        let Some(column) = classification.dimension_column(dimension) else {
            issues.push(ValidationIssue::new(
                dimension.label(),
                format!("No column could be matched to the {} dimension", dimension.label()),
            ));
            continue;
        };
        let values: Vec<String> = sheet
            .rows
            .iter()
            .skip(first_data_row)
            .filter_map(|row| row.get(column.index).map(Cell::to_text))
            .collect();
        push_invalid(
            &mut issues,
            dimension,
            validate_members(values.iter().map(String::as_str), dimension, index),
            index,
        );
    }

    let labels = classification.time_labels();
    if classification.form == SheetForm::YearInHeader {
        if labels.years.iter().any(|y| y.is_empty()) {
            issues.push(ValidationIssue::new(
                Dimension::Year.label(),
                "A period column header carries no year label",
            ));
        }
        push_invalid(
            &mut issues,
            Dimension::Year,
            validate_members(labels.years.iter().map(String::as_str), Dimension::Year, index),
            index,
        );
    }
    push_invalid(
        &mut issues,
        Dimension::Period,
        validate_members(labels.periods.iter().map(String::as_str), Dimension::Period, index),
        index,
    );

    for column in classification.unrecognized() {
        issues.push(ValidationIssue::new(
            "Column",
            format!(
                "Column '{}' could not be matched to any dimension or period",
                column.header
            ),
        ));
    }

    if issues.is_empty() {
        info!("All members validated.");
        Ok(())
    } else {
        Err(LoadSheetError::Membership { issues })
    }
}

fn push_invalid(
    issues: &mut Vec<ValidationIssue>,
    dimension: Dimension,
    invalid: BTreeSet<String>,
    index: &MemberIndex,
) {
    let allowed = index.allowed(dimension);
    issues.extend(invalid.into_iter().map(|value| {
        let detail = match allowed.shared_alias(&value) {
            Some(names) => format!(
                "{} (alias shared by {})",
                value,
                names.iter().cloned().collect::<Vec<_>>().join(", ")
            ),
            None => value,
        };
        ValidationIssue::new(dimension.label(), detail)
    }));
}
