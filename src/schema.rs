//! Static catalog of the crime-incident source layout.
//!
//! The catalog is the single place where column names, the retained subset,
//! the rename mapping and the fixed output layout live. Everything here is
//! `const` data; nothing can fail.

/// All 28 source columns, in physical file order.
pub const SOURCE_COLUMNS: [&str; 28] = [
    "DR_NO",
    "Date Rptd",
    "DATE OCC",
    "TIME OCC",
    "AREA",
    "AREA NAME",
    "Rpt Dist No",
    "Part 1-2",
    "Crm Cd",
    "Crm Cd Desc",
    "Mocodes",
    "Vict Age",
    "Vict Sex",
    "Vict Descent",
    "Premis Cd",
    "Premis Desc",
    "Weapon Used Cd",
    "Weapon Desc",
    "Status",
    "Status Desc",
    "Crm Cd 1",
    "Crm Cd 2",
    "Crm Cd 3",
    "Crm Cd 4",
    "LOCATION",
    "Cross Street",
    "LAT",
    "LON",
];

/// Source columns needed downstream, paired with their output names.
///
/// Order matches the output layout, so iterating this table also yields the
/// first six output columns in order.
pub const RENAMES: [(&str, &str); 6] = [
    ("DATE OCC", "date"),
    ("TIME OCC", "time"),
    ("AREA NAME", "area"),
    ("Vict Age", "age"),
    ("Vict Sex", "sex"),
    ("Vict Descent", "descent"),
];

/// Name of the derived elapsed-time column.
pub const DATE_MATH: &str = "date_math";

/// Final column order of every output table.
pub const OUTPUT_COLUMNS: [&str; 7] = ["date", "time", "area", "age", "sex", "descent", DATE_MATH];

/// Rows are kept only when their `date` falls strictly before this instant.
///
/// See [`is_before_cutoff`](crate::transform::is_before_cutoff).
pub const DATE_CUTOFF: &str = "01/01/2022 12:00:00 AM";

/// Rows are kept only when `area` starts with this prefix.
pub const AREA_PREFIX: &str = "P";

/// `chrono` format of the `date` column (day/month/year, 12-hour clock).
pub const DATE_FORMAT: &str = "%d/%m/%Y %I:%M:%S %p";

/// Scale applied to the elapsed whole seconds when computing `date_math`.
pub const DATE_MATH_FACTOR: f64 = 123_456_789.545;

/// Source column holding the victim age; the only non-string required column.
pub const AGE_COLUMN: &str = "Vict Age";

/// Iterate the six required source column names.
pub fn required_columns() -> impl Iterator<Item = &'static str> {
    RENAMES.iter().map(|(src, _)| *src)
}

/// Output name for a source column, if it is one of the required ones.
#[must_use]
pub fn output_name(source: &str) -> Option<&'static str> {
    RENAMES
        .iter()
        .find(|(src, _)| *src == source)
        .map(|(_, out)| *out)
}

/// Physical position of a source column.
#[must_use]
pub fn source_index(name: &str) -> Option<usize> {
    SOURCE_COLUMNS.iter().position(|c| *c == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_columns_exist_in_source() {
        for col in required_columns() {
            assert!(source_index(col).is_some(), "{col} missing from source");
        }
    }

    #[test]
    fn renames_follow_output_order() {
        let renamed: Vec<_> = RENAMES.iter().map(|(_, out)| *out).collect();
        assert_eq!(renamed, OUTPUT_COLUMNS[..6]);
        assert_eq!(output_name("AREA NAME"), Some("area"));
        assert_eq!(output_name("LAT"), None);
    }
}
