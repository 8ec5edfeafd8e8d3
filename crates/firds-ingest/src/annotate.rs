//! Derived columns for extracted instrument tables
//!
//! Each operation reads one existing column and appends one new column to
//! every row. Missing source columns fail with `MissingColumn`; row order and
//! row count never change.

use firds_common::{Result, Table};
use tracing::info;

/// Column whose names are scanned for the letter `a`
pub const FULL_NAME_COLUMN: &str = "FinInstrmGnlAttrbts.FullNm";

/// Count of lowercase `a` in the full name
pub const A_COUNT_COLUMN: &str = "a_count";

/// `YES` when `a_count` is positive, else `NO`
pub const CONTAINS_A_COLUMN: &str = "contains_a";

/// Append `target` with the number of exact, case-sensitive occurrences of
/// `character` in each row's `source` cell. Empty cells count zero.
pub fn add_occurrence_count_column(
    table: &mut Table,
    source: &str,
    character: char,
    target: &str,
) -> Result<()> {
    let idx = table.column_index(source)?;
    table.append_derived_column(target, |row| {
        row[idx].chars().filter(|c| *c == character).count().to_string()
    })?;

    info!(source, target, %character, rows = table.len(), "Added occurrence count column");
    Ok(())
}

/// Append `target` holding `true_label` where the row's `source` cell is a
/// number strictly greater than zero, and `false_label` otherwise (including
/// empty and non-numeric cells).
pub fn add_boolean_label_column(
    table: &mut Table,
    source: &str,
    true_label: &str,
    false_label: &str,
    target: &str,
) -> Result<()> {
    let idx = table.column_index(source)?;
    table.append_derived_column(target, |row| {
        let positive = row[idx]
            .trim()
            .parse::<f64>()
            .map(|n| n > 0.0)
            .unwrap_or(false);
        let label = if positive { true_label } else { false_label };
        label.to_string()
    })?;

    info!(source, target, rows = table.len(), "Added label column");
    Ok(())
}

/// `a_count`: occurrences of `a` in the instrument full name
pub fn add_a_count_column(table: &mut Table) -> Result<()> {
    add_occurrence_count_column(table, FULL_NAME_COLUMN, 'a', A_COUNT_COLUMN)
}

/// `contains_a`: `YES`/`NO` from `a_count`; run [`add_a_count_column`] first
pub fn add_contains_a_column(table: &mut Table) -> Result<()> {
    add_boolean_label_column(table, A_COUNT_COLUMN, "YES", "NO", CONTAINS_A_COLUMN)
}

/// Both derived columns, in dependency order
pub fn annotate(table: &mut Table) -> Result<()> {
    add_a_count_column(table)?;
    add_contains_a_column(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use firds_common::FirdsError;

    fn single_column(name: &str, values: &[&str]) -> Table {
        let mut table = Table::new([name]);
        for value in values {
            table.push_row(vec![value.to_string()]).unwrap();
        }
        table
    }

    #[test]
    fn test_a_count_is_case_sensitive() {
        let mut table = single_column(
            FULL_NAME_COLUMN,
            &["Alpha Asset", "Beta", "Gamma Capital", "", ""],
        );
        add_a_count_column(&mut table).unwrap();

        assert_eq!(table.columns(), &[FULL_NAME_COLUMN, A_COUNT_COLUMN]);
        assert_eq!(table.column(A_COUNT_COLUMN).unwrap(), vec!["1", "1", "4", "0", "0"]);
    }

    #[test]
    fn test_contains_a_labels() {
        let mut table = Table::new([FULL_NAME_COLUMN, A_COUNT_COLUMN]);
        for (name, count) in [("Alpha", "1"), ("Beta", "2"), ("Espsilon", "0"), ("Uno", "0")] {
            table.push_row(vec![name.into(), count.into()]).unwrap();
        }
        add_contains_a_column(&mut table).unwrap();

        assert_eq!(
            table.column(CONTAINS_A_COLUMN).unwrap(),
            vec!["YES", "YES", "NO", "NO"]
        );
    }

    #[test]
    fn test_label_before_count_fails() {
        let mut table = single_column(FULL_NAME_COLUMN, &["Alpha"]);
        let err = add_contains_a_column(&mut table).unwrap_err();

        assert!(matches!(err, FirdsError::MissingColumn(ref c) if c == A_COUNT_COLUMN));
        assert_eq!(table.columns(), &[FULL_NAME_COLUMN]);
    }

    #[test]
    fn test_count_requires_source_column() {
        let mut table = single_column("Issr", &["LEI"]);
        let err = add_a_count_column(&mut table).unwrap_err();
        assert!(matches!(err, FirdsError::MissingColumn(ref c) if c == FULL_NAME_COLUMN));
    }

    #[test]
    fn test_counts_exact_character_only() {
        let mut table = single_column("name", &["aAáa", "ÄÄ", "banana"]);
        add_occurrence_count_column(&mut table, "name", 'a', "n").unwrap();
        assert_eq!(table.column("n").unwrap(), vec!["2", "0", "3"]);
    }

    #[test]
    fn test_label_treats_non_numeric_as_false() {
        let mut table = single_column("n", &["", "abc", "-1", "0.0", "0.5", " 3 "]);
        add_boolean_label_column(&mut table, "n", "Y", "N", "flag").unwrap();
        assert_eq!(table.column("flag").unwrap(), vec!["N", "N", "N", "N", "Y", "Y"]);
    }

    #[test]
    fn test_annotate_keeps_rows_in_order() {
        let names = ["Gamma Capital", "", "Beta", "Alpha Asset"];
        let mut table = single_column(FULL_NAME_COLUMN, &names);
        annotate(&mut table).unwrap();

        assert_eq!(table.len(), names.len());
        assert_eq!(table.column(FULL_NAME_COLUMN).unwrap(), names.to_vec());
        assert_eq!(table.column(CONTAINS_A_COLUMN).unwrap(), vec!["YES", "NO", "YES", "YES"]);
    }

    #[test]
    fn test_annotate_twice_rejects_duplicate_column() {
        let mut table = single_column(FULL_NAME_COLUMN, &["Alpha"]);
        annotate(&mut table).unwrap();
        assert!(matches!(
            annotate(&mut table),
            Err(FirdsError::DuplicateColumn(ref c)) if c == A_COUNT_COLUMN
        ));
    }
}
