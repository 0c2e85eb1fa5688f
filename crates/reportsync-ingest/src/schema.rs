//! Record schema synthesis
//!
//! Report metadata changes over time: an operator adds a metric, the API
//! retypes a column. Every page is turned into a candidate schema and
//! compared with the active one. The version only moves when the set of
//! `(name, kind)` pairs changes, so identical metadata never churns the
//! schema registry downstream.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::report::{ColumnHeader, Report};

/// Provider prefix stripped from column names
pub const FIELD_PREFIX: &str = "ga:";

/// Sanitized name of the path-like dimension that feeds `urlHash`
pub const PATH_FIELD: &str = "pagePath";

/// Sanitized name of the time-bucket dimension copied into the key
pub const TIMESTAMP_FIELD: &str = "dateHourMinute";

/// Synthetic fingerprint field present in both key and value
pub const URL_HASH_FIELD: &str = "urlHash";

/// First version assigned to a schema
pub const INITIAL_VERSION: u32 = 1;

/// Primitive type of a record field
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Int64,
    Float64,
    Bool,
}

impl FieldKind {
    /// Map a declared metric type onto a field kind
    ///
    /// Unknown declarations fall back to `String` so a new API type never
    /// stops ingestion.
    pub fn from_metric_type(declared: &str) -> Self {
        match declared.to_ascii_uppercase().as_str() {
            "INTEGER" => FieldKind::Int64,
            "FLOAT" | "DECIMAL" => FieldKind::Float64,
            "BOOLEAN" => FieldKind::Bool,
            _ => {
                warn!(
                    metric_type = %declared,
                    "Unrecognized metric type, defaulting field to string"
                );
                FieldKind::String
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Int64 => "int64",
            FieldKind::Float64 => "float64",
            FieldKind::Bool => "bool",
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named, typed field
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
}

impl Field {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// An ordered, versioned struct schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSchema {
    name: String,
    version: u32,
    fields: Vec<Field>,
}

impl RecordSchema {
    pub fn new(name: impl Into<String>, version: u32, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            version,
            fields,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields as an unordered set of `(name, kind)` pairs
    pub fn field_set(&self) -> BTreeSet<(&str, FieldKind)> {
        self.fields.iter().map(|f| (f.name.as_str(), f.kind)).collect()
    }

    /// Structural equality that ignores field order, name and version
    pub fn same_fields(&self, other: &RecordSchema) -> bool {
        self.field_set() == other.field_set()
    }

    fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }
}

/// Key and value schema that always move together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaPair {
    pub key: RecordSchema,
    pub value: RecordSchema,
}

impl SchemaPair {
    pub fn version(&self) -> u32 {
        self.value.version()
    }

    pub fn same_fields(&self, other: &SchemaPair) -> bool {
        self.key.same_fields(&other.key) && self.value.same_fields(&other.value)
    }

    fn with_version(self, version: u32) -> Self {
        Self {
            key: self.key.with_version(version),
            value: self.value.with_version(version),
        }
    }
}

/// Turn an API column name into a safe schema identifier
///
/// `ga:landingPagePath.level1` becomes `landingPagePath_level1`.
pub fn sanitize_field_name(raw: &str) -> String {
    raw.replace(FIELD_PREFIX, "").replace('.', "_")
}

/// Derive the key and value schema described by a report header
pub fn derive_schema(header: &ColumnHeader, schema_name: &str, version: u32) -> SchemaPair {
    let mut value_fields: Vec<Field> = header
        .dimensions
        .iter()
        .map(|d| Field::new(sanitize_field_name(d), FieldKind::String))
        .collect();
    value_fields.extend(header.metrics().iter().map(|m| {
        Field::new(
            sanitize_field_name(&m.name),
            FieldKind::from_metric_type(&m.metric_type),
        )
    }));
    value_fields.push(Field::new(URL_HASH_FIELD, FieldKind::String));

    let key_fields = vec![
        Field::new(TIMESTAMP_FIELD, FieldKind::String),
        Field::new(URL_HASH_FIELD, FieldKind::String),
    ];

    SchemaPair {
        key: RecordSchema::new(schema_name, version, key_fields),
        value: RecordSchema::new(schema_name, version, value_fields),
    }
}

/// Owns the active schema for one report configuration
#[derive(Debug, Clone)]
pub struct SchemaSynthesizer {
    schema_name: String,
    active: Option<SchemaPair>,
}

impl SchemaSynthesizer {
    pub fn new(schema_name: impl Into<String>) -> Self {
        Self {
            schema_name: schema_name.into(),
            active: None,
        }
    }

    pub fn schema_name(&self) -> &str {
        &self.schema_name
    }

    pub fn active(&self) -> Option<&SchemaPair> {
        self.active.as_ref()
    }

    /// Adopt the schema described by `report`, bumping the version if its
    /// field set differs from the active one
    pub fn maybe_update_schema(&mut self, report: &Report) -> &SchemaPair {
        let current_version = self.active.as_ref().map_or(INITIAL_VERSION, SchemaPair::version);
        let candidate = derive_schema(&report.column_header, &self.schema_name, current_version);

        let next = match self.active.take() {
            None => {
                info!(
                    schema = %self.schema_name,
                    version = INITIAL_VERSION,
                    fields = candidate.value.fields().len(),
                    "Adopted initial schema"
                );
                candidate
            },
            Some(active) if active.same_fields(&candidate) => {
                debug!(
                    schema = %self.schema_name,
                    version = current_version,
                    "Schema has not changed"
                );
                active
            },
            Some(_) => {
                let to = current_version + 1;
                info!(
                    schema = %self.schema_name,
                    from = current_version,
                    to,
                    "Schema has changed, adopting new version"
                );
                candidate.with_version(to)
            },
        };

        self.active.insert(next)
    }
}
