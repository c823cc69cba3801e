//! Unified in-memory record table

use std::collections::HashSet;

use serde_json::Value;

/// One merged input record
pub type Record = serde_json::Map<String, Value>;

/// Ordered rows merged from many input files
///
/// Columns are the union of all record fields in first-seen order. Rows keep
/// their own fields; a column absent from a row reads as null.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordTable {
    columns: Vec<String>,
    known: HashSet<String>,
    rows: Vec<Record>,
}

impl RecordTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record, extending the column set with any new fields
    pub fn push(&mut self, record: Record) {
        for key in record.keys() {
            if self.known.insert(key.clone()) {
                self.columns.push(key.clone());
            }
        }
        self.rows.push(record);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.known.contains(column)
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// New table holding the rows whose `column` equals the string `value`
    pub fn filter_eq(&self, column: &str, value: &str) -> RecordTable {
        let mut filtered = RecordTable::new();
        for row in &self.rows {
            if row.get(column).and_then(Value::as_str) == Some(value) {
                filtered.push(row.clone());
            }
        }
        filtered
    }
}

impl FromIterator<Record> for RecordTable {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        let mut table = RecordTable::new();
        for record in iter {
            table.push(record);
        }
        table
    }
}
