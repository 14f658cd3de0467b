//! Validation and reshaping of client highlight submissions.
//!
//! Clients address rows by ordinal and send token indices in a doubled
//! space where separators sit at odd positions. A submission is first
//! parsed into a [`HighlightSubmission`], which only exists once every
//! check has passed, and then re-keyed by row `id` with each index halved.

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::error::{HighlightError, Result};
use crate::table::DatasetTable;

/// Canonical token indices keyed by row `id`, as persisted.
pub type StoredHighlights = IndexMap<String, Vec<i64>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionEntry {
    ordinal: usize,
    /// Doubled token indices; all even and non-negative.
    indices: Vec<u64>,
}

impl SubmissionEntry {
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn indices(&self) -> &[u64] {
        &self.indices
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightSubmission {
    /// Checked against the column set but not used when storing.
    selected_column: String,
    /// Entries in the order their keys appeared in the request.
    entries: Vec<SubmissionEntry>,
}

impl HighlightSubmission {
    pub fn selected_column(&self) -> &str {
        &self.selected_column
    }

    pub fn entries(&self) -> &[SubmissionEntry] {
        &self.entries
    }

    /// Validates a full request body of the form
    /// `{"selected_column": str, "highlights": {"<ordinal>": [int, ...]}}`.
    pub fn from_body(body: &Value, table: &DatasetTable) -> Result<Self> {
        let fields = match body {
            Value::Object(fields) if !fields.is_empty() => fields,
            _ => return Err(HighlightError::NoData),
        };
        Self::parse(fields.get("selected_column"), fields.get("highlights"), table)
    }

    /// Runs the checks in order and stops at the first violation.
    pub fn parse(
        selected_column: Option<&Value>,
        highlights: Option<&Value>,
        table: &DatasetTable,
    ) -> Result<Self> {
        let selected_column = match selected_column {
            None => return Err(HighlightError::MissingColumn),
            Some(value) if is_falsy(value) => return Err(HighlightError::MissingColumn),
            Some(Value::String(name)) => Ok(name.clone()),
            // Non-string names can never match a column.
            Some(other) => Err(other.to_string()),
        };
        let highlights = match highlights {
            None => return Err(HighlightError::MissingHighlights),
            Some(value) if is_falsy(value) => return Err(HighlightError::MissingHighlights),
            Some(Value::Object(map)) => map,
            Some(_) => return Err(HighlightError::InvalidHighlights),
        };
        let selected_column = selected_column.map_err(HighlightError::InvalidColumn)?;
        if !table.has_column(&selected_column) {
            return Err(HighlightError::InvalidColumn(selected_column));
        }
        let entries = parse_entries(highlights, table.total_rows())?;
        Ok(Self {
            selected_column,
            entries,
        })
    }

    /// Halves every index and re-keys entries by row `id`. A later entry
    /// for the same `id` replaces an earlier one.
    ///
    /// Fails if `table` is not the table the submission was parsed against
    /// and an ordinal has no row in it.
    pub fn into_stored(self, table: &DatasetTable) -> Result<StoredHighlights> {
        let mut stored = StoredHighlights::with_capacity(self.entries.len());
        for entry in self.entries {
            let id = table
                .row_id(entry.ordinal)
                .ok_or(HighlightError::RowOutOfRange(entry.ordinal as u64))?;
            let halved = entry.indices.iter().map(|idx| (idx / 2) as i64).collect();
            stored.insert(id.to_string(), halved);
        }
        Ok(stored)
    }
}

/// Mirrors the client's notion of "not provided": null, false, zero and
/// empty strings, arrays and objects.
fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

fn parse_entries(highlights: &Map<String, Value>, total_rows: usize) -> Result<Vec<SubmissionEntry>> {
    let mut entries = Vec::with_capacity(highlights.len());
    for (row_key, value) in highlights {
        let values = value
            .as_array()
            .ok_or_else(|| HighlightError::MalformedEntry(row_key.clone()))?;
        let indices = parse_indices(row_key, values)?;
        let ordinal = parse_ordinal(row_key, total_rows)?;
        entries.push(SubmissionEntry { ordinal, indices });
    }
    Ok(entries)
}

fn parse_indices(row_key: &str, values: &[Value]) -> Result<Vec<u64>> {
    let mut integers = Vec::with_capacity(values.len());
    for value in values {
        let n = match value {
            Value::Number(n) => n
                .as_i64()
                .map(i128::from)
                .or_else(|| n.as_u64().map(i128::from)),
            _ => None,
        };
        let n = n.ok_or_else(|| HighlightError::NonIntegerIndex(row_key.to_string()))?;
        integers.push(n);
    }
    if integers.iter().any(|n| *n < 0) {
        return Err(HighlightError::NegativeIndex(row_key.to_string()));
    }
    if integers.iter().any(|n| n % 2 != 0) {
        return Err(HighlightError::OddIndex(row_key.to_string()));
    }
    Ok(integers.into_iter().map(|n| n as u64).collect())
}

fn parse_ordinal(row_key: &str, total_rows: usize) -> Result<usize> {
    let ordinal: u64 = row_key
        .trim()
        .parse()
        .map_err(|_| HighlightError::InvalidRowKey(row_key.to_string()))?;
    match usize::try_from(ordinal) {
        Ok(ordinal) if ordinal < total_rows => Ok(ordinal),
        _ => Err(HighlightError::RowOutOfRange(ordinal)),
    }
}

/// Validates `body` against `table` and returns the entries to merge into
/// the store.
pub fn ingest(body: &Value, table: &DatasetTable) -> Result<StoredHighlights> {
    HighlightSubmission::from_body(body, table)?.into_stored(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::Path;

    fn table() -> DatasetTable {
        DatasetTable::from_reader(
            Path::new("rows.csv"),
            "id,text\nr-a,the quick fox\nr-b,lazy dog\nr-c,hello\n".as_bytes(),
            b',',
        )
        .unwrap()
    }

    fn submit(highlights: Value) -> Result<StoredHighlights> {
        ingest(
            &json!({"selected_column": "text", "highlights": highlights}),
            &table(),
        )
    }

    #[test]
    fn even_indices_are_halved_and_keyed_by_id() {
        let stored = submit(json!({"0": [4], "2": [0, 2, 10]})).unwrap();
        assert_eq!(stored["r-a"], vec![2]);
        assert_eq!(stored["r-c"], vec![0, 1, 5]);
        assert_eq!(stored.len(), 2);
    }

    #[test]
    fn output_follows_request_order() {
        let stored = submit(json!({"2": [2], "0": [2], "1": [2]})).unwrap();
        let keys: Vec<_> = stored.keys().map(String::as_str).collect();
        assert_eq!(keys, ["r-c", "r-a", "r-b"]);
    }

    #[test]
    fn empty_index_list_is_stored() {
        let stored = submit(json!({"1": []})).unwrap();
        assert_eq!(stored["r-b"], Vec::<i64>::new());
    }

    #[test]
    fn odd_index_is_rejected() {
        let err = submit(json!({"0": [3]})).unwrap_err();
        assert!(matches!(err, HighlightError::OddIndex(ref row) if row == "0"));
        assert_eq!(err.to_string(), "Token indices must be even numbers in row 0.");
    }

    #[test]
    fn non_integer_indices_are_rejected() {
        for bad in [json!([1.5]), json!(["a"]), json!([4.0]), json!([true]), json!([null])] {
            let err = submit(json!({ "0": bad })).unwrap_err();
            assert!(matches!(err, HighlightError::NonIntegerIndex(_)), "{err:?}");
        }
    }

    #[test]
    fn negative_index_is_rejected() {
        let err = submit(json!({"0": [-2]})).unwrap_err();
        assert!(matches!(err, HighlightError::NegativeIndex(_)));
    }

    #[test]
    fn non_list_entry_is_malformed() {
        let err = submit(json!({"1": 4})).unwrap_err();
        assert!(matches!(err, HighlightError::MalformedEntry(ref row) if row == "1"));
        assert_eq!(err.to_string(), "Invalid data format for row 1.");
    }

    #[test]
    fn ordinal_past_end_is_out_of_range() {
        let err = submit(json!({"3": [2]})).unwrap_err();
        assert!(matches!(err, HighlightError::RowOutOfRange(3)));
        assert_eq!(err.to_string(), "Row index 3 out of range.");
    }

    #[test]
    fn unparsable_row_keys_are_rejected() {
        for key in ["-1", "abc", "1.0", ""] {
            let err = submit(json!({ key: [2] })).unwrap_err();
            assert!(matches!(err, HighlightError::InvalidRowKey(_)), "{key}: {err:?}");
        }
    }

    #[test]
    fn index_checks_run_before_row_check() {
        let err = submit(json!({"99": [1]})).unwrap_err();
        assert!(matches!(err, HighlightError::OddIndex(_)));
    }

    #[test]
    fn first_violation_in_request_order_wins() {
        let err = submit(json!({"1": [3], "0": "x"})).unwrap_err();
        assert!(matches!(err, HighlightError::OddIndex(ref row) if row == "1"));
    }

    #[test]
    fn missing_fields_are_invalid_requests() {
        let table = table();
        let cases = [
            (json!({}), "No data provided."),
            (json!([]), "No data provided."),
            (json!({"highlights": {"0": [2]}}), "selected_column is missing."),
            (
                json!({"selected_column": "", "highlights": {"0": [2]}}),
                "selected_column is missing.",
            ),
            (json!({"selected_column": "text"}), "highlights data is missing."),
            (
                json!({"selected_column": "text", "highlights": {}}),
                "highlights data is missing.",
            ),
        ];
        for (body, message) in cases {
            let err = ingest(&body, &table).unwrap_err();
            assert_eq!(err.to_string(), message);
            assert_eq!(err.status(), 400);
        }
    }

    #[test]
    fn column_is_checked_before_entries() {
        let err = ingest(
            &json!({"selected_column": "title", "highlights": {"0": [1]}}),
            &table(),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "selected_column \"title\" does not exist in the CSV."
        );
    }

    #[test]
    fn non_string_column_is_invalid_after_presence_checks() {
        let table = table();
        let err = ingest(&json!({"selected_column": 5}), &table).unwrap_err();
        assert!(matches!(err, HighlightError::MissingHighlights));
        let err = ingest(
            &json!({"selected_column": 5, "highlights": {"0": [2]}}),
            &table,
        )
        .unwrap_err();
        assert!(matches!(err, HighlightError::InvalidColumn(ref name) if name == "5"));
    }

    #[test]
    fn falsy_values_count_as_missing() {
        let table = table();
        for falsy in [json!(false), json!(0), json!(0.0), json!([]), json!({}), json!("")] {
            let err = ingest(
                &json!({"selected_column": falsy.clone(), "highlights": {"0": [2]}}),
                &table,
            )
            .unwrap_err();
            assert!(matches!(err, HighlightError::MissingColumn), "{falsy}: {err:?}");
            let err = ingest(
                &json!({"selected_column": "text", "highlights": falsy.clone()}),
                &table,
            )
            .unwrap_err();
            assert!(matches!(err, HighlightError::MissingHighlights), "{falsy}: {err:?}");
        }
    }

    #[test]
    fn submission_parsed_against_another_table_fails_to_store() {
        let submission = HighlightSubmission::from_body(
            &json!({"selected_column": "text", "highlights": {"2": [4]}}),
            &table(),
        )
        .unwrap();
        assert_eq!(submission.selected_column(), "text");
        assert_eq!(submission.entries()[0].ordinal(), 2);
        assert_eq!(submission.entries()[0].indices(), [4]);

        let smaller = DatasetTable::from_reader(
            Path::new("rows.csv"),
            "id,text
only,row
".as_bytes(),
            b',',
        )
        .unwrap();
        let err = submission.into_stored(&smaller).unwrap_err();
        assert!(matches!(err, HighlightError::RowOutOfRange(2)));
    }

    #[test]
    fn highlights_must_be_an_object() {
        let err = ingest(
            &json!({"selected_column": "text", "highlights": [[2]]}),
            &table(),
        )
        .unwrap_err();
        assert!(matches!(err, HighlightError::InvalidHighlights));
    }

    #[test]
    fn selected_column_does_not_change_stored_indices() {
        let table = table();
        let highlights = json!({"0": [6]});
        let by_text = ingest(
            &json!({"selected_column": "text", "highlights": highlights.clone()}),
            &table,
        )
        .unwrap();
        let by_id = ingest(
            &json!({"selected_column": "id", "highlights": highlights}),
            &table,
        )
        .unwrap();
        assert_eq!(by_text, by_id);
    }

    #[test]
    fn large_unsigned_indices_halve_without_overflow() {
        let stored = submit(json!({"0": [u64::MAX - 1]})).unwrap();
        assert_eq!(stored["r-a"], vec![i64::MAX]);
    }
}
