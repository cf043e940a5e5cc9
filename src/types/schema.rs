use crate::error::{FlakersError, Result};
use crate::types::SqlValue;

/// Column types that can be declared in a [`StructType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Integer,
    Long,
    Double,
    Boolean,
    String,
}

impl DataType {
    /// The SQL type name used when casting values of this type.
    pub fn sql_name(&self) -> &'static str {
        match self {
            DataType::Integer => "INTEGER",
            DataType::Long => "BIGINT",
            DataType::Double => "DOUBLE PRECISION",
            DataType::Boolean => "BOOLEAN",
            DataType::String => "VARCHAR",
        }
    }

    /// Human-readable name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            DataType::Integer => "integer",
            DataType::Long => "long",
            DataType::Double => "double",
            DataType::Boolean => "boolean",
            DataType::String => "string",
        }
    }

    /// Converts `value` to the representation stored in a column of this type.
    /// Returns `None` if the value cannot be stored without loss.
    pub(crate) fn coerce(&self, value: &SqlValue) -> Option<SqlValue> {
        match (self, value) {
            (_, SqlValue::Null) => Some(SqlValue::Null),
            (DataType::Integer, SqlValue::Int32(i)) => Some(SqlValue::Int32(*i)),
            (DataType::Integer, SqlValue::Int64(i)) => i32::try_from(*i).ok().map(SqlValue::Int32),
            (DataType::Long, SqlValue::Int32(i)) => Some(SqlValue::Int64(i64::from(*i))),
            (DataType::Long, SqlValue::Int64(i)) => Some(SqlValue::Int64(*i)),
            (DataType::Double, SqlValue::Int32(i)) => Some(SqlValue::Float64(f64::from(*i))),
            (DataType::Double, SqlValue::Float64(v)) => Some(SqlValue::Float64(*v)),
            (DataType::Boolean, SqlValue::Bool(b)) => Some(SqlValue::Bool(*b)),
            (DataType::String, SqlValue::Text(s)) => Some(SqlValue::Text(s.clone())),
            _ => None,
        }
    }
}

/// A single named, typed column of a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct StructField {
    name: String,
    data_type: DataType,
}

impl StructField {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// The column identifier as it appears in generated SQL.
    /// Plain identifiers are case-folded to upper case; anything else is quoted verbatim.
    pub fn quoted_name(&self) -> String {
        quote_identifier(&self.name)
    }
}

/// An ordered list of fields describing the columns of a dataframe.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StructType {
    fields: Vec<StructField>,
}

impl StructType {
    pub fn new(fields: impl IntoIterator<Item = StructField>) -> Self {
        Self {
            fields: fields.into_iter().collect(),
        }
    }

    /// Returns a new schema with `field` appended.
    pub fn add(mut self, field: StructField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(&self) -> &[StructField] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Checks `values` positionally against this schema and returns the coerced values.
    /// `row` is the zero-based row index reported in errors.
    pub(crate) fn conform(&self, row: usize, values: &[SqlValue]) -> Result<Vec<SqlValue>> {
        if values.len() != self.fields.len() {
            return Err(FlakersError::SchemaMismatch {
                row,
                expected: self.fields.len(),
                actual: values.len(),
            });
        }
        self.fields
            .iter()
            .zip(values)
            .map(|(field, value)| {
                field
                    .data_type
                    .coerce(value)
                    .ok_or_else(|| FlakersError::TypeMismatch {
                        row,
                        field: field.name.clone(),
                        expected: field.data_type.type_name(),
                    })
            })
            .collect()
    }
}

/// Quotes an identifier for use in SQL.
pub(crate) fn quote_identifier(name: &str) -> String {
    if name.len() >= 2 && name.starts_with('"') && name.ends_with('"') {
        return name.to_string();
    }
    if is_plain_identifier(name) {
        format!("\"{}\"", name.to_ascii_uppercase())
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}
