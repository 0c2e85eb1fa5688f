//! Row materialization
//!
//! Turns raw string cells into typed key/value structs under the active
//! schema. Coercion never fails a row: a cell that does not parse under its
//! declared kind is kept as the raw string and a warning is logged.

use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::warn;

use crate::error::MissingRows;
use crate::report::Report;
use crate::schema::{
    sanitize_field_name, FieldKind, RecordSchema, PATH_FIELD, TIMESTAMP_FIELD, URL_HASH_FIELD,
};
use reportsync_common::fingerprint::fingerprint;

/// A typed cell value
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int64(i64),
    Float64(f64),
    Bool(bool),
    String(String),
}

impl FieldValue {
    /// Parse `raw` as `kind`, or `None` if it does not fit
    pub fn parse(kind: FieldKind, raw: &str) -> Option<Self> {
        match kind {
            FieldKind::String => Some(FieldValue::String(raw.to_string())),
            FieldKind::Int64 => raw.trim().parse().ok().map(FieldValue::Int64),
            FieldKind::Float64 => raw.trim().parse().ok().map(FieldValue::Float64),
            FieldKind::Bool => match raw.trim().to_ascii_lowercase().as_str() {
                "true" => Some(FieldValue::Bool(true)),
                "false" => Some(FieldValue::Bool(false)),
                _ => None,
            },
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Coerce a cell for `field`, degrading to the raw string on mismatch
pub fn coerce_cell(field: &str, kind: Option<FieldKind>, raw: &str) -> FieldValue {
    let Some(kind) = kind else {
        warn!(field = %field, value = %raw, "Field missing from schema, storing as string");
        return FieldValue::String(raw.to_string());
    };

    FieldValue::parse(kind, raw).unwrap_or_else(|| {
        warn!(
            field = %field,
            kind = %kind,
            value = %raw,
            "Value does not match declared type, storing as string"
        );
        FieldValue::String(raw.to_string())
    })
}

/// Field values laid out in schema order
///
/// Fields that were never written stay unset and serialize as `null`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordStruct {
    entries: Vec<(String, Option<FieldValue>)>,
}

impl RecordStruct {
    /// An empty struct with one unset slot per schema field
    pub fn for_schema(schema: &RecordSchema) -> Self {
        Self {
            entries: schema
                .fields()
                .iter()
                .map(|f| (f.name.clone(), None))
                .collect(),
        }
    }

    /// Set a field; names unknown to the schema are appended
    pub fn put(&mut self, name: &str, value: FieldValue) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => *slot = Some(value),
            None => self.entries.push((name.to_string(), Some(value))),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.as_ref())
    }

    /// Iterate over fields that hold a value
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries
            .iter()
            .filter_map(|(n, v)| v.as_ref().map(|v| (n.as_str(), v)))
    }

    pub fn set_count(&self) -> usize {
        self.iter().count()
    }
}

impl Serialize for RecordStruct {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// The key/value pair produced for one report row
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct KeyedRecord {
    pub key: RecordStruct,
    pub value: RecordStruct,
}

/// Materialize every row of `report` under the given schemas
///
/// Rows are zipped against the sanitized column names (dimensions, then
/// metrics). A report without rows is an error: callers decide whether an
/// empty page is acceptable for the window being fetched.
pub fn materialize(
    report: &Report,
    key_schema: &RecordSchema,
    value_schema: &RecordSchema,
) -> Result<Vec<KeyedRecord>, MissingRows> {
    let rows = match report.rows() {
        Some(rows) if !rows.is_empty() => rows,
        _ => return Err(MissingRows),
    };

    let names: Vec<String> = report
        .column_header
        .column_names()
        .map(sanitize_field_name)
        .collect();

    let records = rows
        .iter()
        .map(|row| {
            let cells: Vec<&str> = row.cells().collect();
            if cells.len() != names.len() {
                warn!(
                    columns = names.len(),
                    cells = cells.len(),
                    "Row width does not match column header"
                );
            }

            let mut key = RecordStruct::for_schema(key_schema);
            let mut value = RecordStruct::for_schema(value_schema);

            for (name, raw) in names.iter().zip(cells) {
                let kind = value_schema.field(name).map(|f| f.kind);
                value.put(name, coerce_cell(name, kind, raw));

                match name.as_str() {
                    PATH_FIELD => {
                        if let Some(hash) = fingerprint(Some(raw)) {
                            value.put(URL_HASH_FIELD, FieldValue::String(hash.clone()));
                            key.put(URL_HASH_FIELD, FieldValue::String(hash));
                        }
                    },
                    TIMESTAMP_FIELD => {
                        key.put(TIMESTAMP_FIELD, FieldValue::String(raw.to_string()));
                    },
                    _ => {},
                }
            }

            KeyedRecord { key, value }
        })
        .collect();

    Ok(records)
}
