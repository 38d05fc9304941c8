//! Field schemas and column mapping resolution
//!
//! A [`FieldSchema`] is the set of logical fields an import type accepts.
//! The first declared column is the primary field: it must always be mapped,
//! together with at least one other field.

use serde::{Deserialize, Serialize};

use crate::core::encoding::CharacterEncoding;
use crate::core::error::ImportError;

/// A logical field a CSV column can be mapped onto
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub key: String,
    pub label: String,
}

impl FieldDef {
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
        }
    }
}

/// Fields accepted by one import type
#[derive(Debug, Clone)]
pub struct FieldSchema {
    title: String,
    columns: Vec<FieldDef>,
    meta_fields: Vec<FieldDef>,
}

impl FieldSchema {
    /// Build a schema; `columns` must not be empty
    pub fn new(title: String, columns: Vec<FieldDef>, meta_fields: Vec<FieldDef>) -> Self {
        debug_assert!(!columns.is_empty(), "a schema needs a primary column");
        Self {
            title,
            columns,
            meta_fields,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// The field every mapping must include
    pub fn primary(&self) -> &FieldDef {
        &self.columns[0]
    }

    pub fn columns(&self) -> &[FieldDef] {
        &self.columns
    }

    pub fn meta_fields(&self) -> &[FieldDef] {
        &self.meta_fields
    }

    /// Table columns followed by meta fields, in declaration order
    pub fn fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.columns.iter().chain(self.meta_fields.iter())
    }

    pub fn field(&self, key: &str) -> Option<&FieldDef> {
        self.fields().find(|f| f.key == key)
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.fields().position(|f| f.key == key)
    }
}

/// One mapped field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappedColumn {
    pub key: String,
    pub index: usize,
}

/// Frozen mapping from field key to source column index
///
/// Keys are unique and kept in schema order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnMapping {
    columns: Vec<MappedColumn>,
}

impl ColumnMapping {
    pub fn iter(&self) -> impl Iterator<Item = &MappedColumn> {
        self.columns.iter()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.columns.iter().find(|c| c.key == key).map(|c| c.index)
    }

    /// Pick the mapped values out of a parsed row
    ///
    /// Columns missing from a short row map to an empty string.
    pub fn apply(&self, values: &[String]) -> Vec<(String, String)> {
        self.columns
            .iter()
            .map(|c| {
                let value = values.get(c.index).cloned().unwrap_or_default();
                (c.key.clone(), value)
            })
            .collect()
    }
}

/// User input for the mapping confirmation step
#[derive(Debug, Clone)]
pub struct MappingRequest {
    pub encoding: CharacterEncoding,
    pub has_header: bool,
    /// Field key to column index, both as entered; an empty index leaves the field unmapped
    pub assignments: Vec<(String, String)>,
}

/// Parse a `key=index` assignment as given on the command line
pub fn parse_assignment(s: &str) -> Result<(String, String), String> {
    let (key, index) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=INDEX, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing field key in '{}'", s));
    }
    Ok((key.to_string(), index.trim().to_string()))
}

/// Validate raw assignments against a schema and freeze them
///
/// `column_count` is the width of the first row; indices at or beyond it are
/// rejected unless the count is unknown (zero).
pub fn resolve(
    schema: &FieldSchema,
    assignments: &[(String, String)],
    column_count: usize,
) -> Result<ColumnMapping, ImportError> {
    let mut columns: Vec<MappedColumn> = Vec::new();

    for (key, raw_index) in assignments {
        if schema.field(key).is_none() {
            return Err(ImportError::validation(
                35,
                format!("Unknown field '{}' for {}.", key, schema.title()),
            ));
        }
        let raw_index = raw_index.trim();
        if raw_index.is_empty() {
            continue;
        }
        let index: usize = raw_index.parse().map_err(|_| {
            ImportError::validation(
                36,
                format!("Column index '{}' for '{}' is not a number.", raw_index, key),
            )
        })?;
        if column_count > 0 && index >= column_count {
            return Err(ImportError::validation(
                37,
                format!(
                    "Column index {} for '{}' is out of range (the file has {} columns).",
                    index, key, column_count
                ),
            ));
        }
        if columns.iter().any(|c| &c.key == key) {
            return Err(ImportError::validation(
                38,
                format!("Field '{}' is mapped more than once.", key),
            ));
        }
        columns.push(MappedColumn {
            key: key.clone(),
            index,
        });
    }

    let primary_mapped = columns.iter().any(|c| c.key == schema.primary().key);
    if !primary_mapped || columns.len() < 2 {
        return Err(ImportError::validation(
            33,
            "Required fields have not been selected.",
        ));
    }

    columns.sort_by_key(|c| schema.position(&c.key));
    Ok(ColumnMapping { columns })
}

/// Suggest a mapping by matching column labels against field labels and keys
pub fn suggest(schema: &FieldSchema, column_labels: &[String]) -> Vec<MappedColumn> {
    let normalize = |s: &str| s.trim().to_lowercase();
    schema
        .fields()
        .filter_map(|field| {
            let label = normalize(&field.label);
            let key = normalize(&field.key);
            column_labels
                .iter()
                .position(|c| {
                    let c = normalize(c);
                    c == label || c == key
                })
                .map(|index| MappedColumn {
                    key: field.key.clone(),
                    index,
                })
        })
        .collect()
}
