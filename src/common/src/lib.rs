#[macro_use]
extern crate serde;

use rusqlite::types::ValueRef;
use rusqlite::ErrorCode;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::Arc;
use thiserror::Error;

pub mod config;
pub mod testutil;

pub use config::{FailurePolicy, FlightsConfig};

/// Normalized alias for the flight identifier.
pub const FLIGHT_ID: &str = "FLIGHT_ID";
/// Normalized alias for the airline display name.
pub const AIRLINE: &str = "AIRLINE";
/// Normalized alias for the departure delay in minutes.
pub const DELAY: &str = "DELAY";
pub const AIRLINE_ID: &str = "AIRLINE_ID";
pub const ORIGIN_AIRPORT: &str = "ORIGIN_AIRPORT";
pub const DESTINATION_AIRPORT: &str = "DESTINATION_AIRPORT";
pub const SCHEDULED_DEPARTURE: &str = "SCHEDULED_DEPARTURE";
pub const DEPARTURE_DELAY: &str = "DEPARTURE_DELAY";
pub const YEAR: &str = "YEAR";
pub const MONTH: &str = "MONTH";
pub const DAY: &str = "DAY";
pub const FLIGHT_COUNT: &str = "FLIGHT_COUNT";
pub const AVERAGE_DELAY: &str = "AVERAGE_DELAY";
pub const TOTAL_FLIGHTS: &str = "TOTAL_FLIGHTS";
pub const DELAYED_FLIGHTS: &str = "DELAYED_FLIGHTS";

/// Custom error type.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FlightError {
    /// IO Errors.
    #[error("{0}")]
    IOError(String),
    /// The data source could not be reached or opened.
    #[error("Connection Error: {0}")]
    ConnectionError(String),
    /// Malformed statement or schema mismatch.
    #[error("Execution Error: {0}")]
    ExecutionError(String),
    /// Malformed caller input.
    #[error("Validation Error: {0}")]
    ValidationError(String),
    /// Invalid or unreadable configuration.
    #[error("Config Error: {0}")]
    ConfigError(String),
}

impl From<io::Error> for FlightError {
    fn from(error: io::Error) -> Self {
        FlightError::IOError(error.to_string())
    }
}

impl From<rusqlite::Error> for FlightError {
    fn from(error: rusqlite::Error) -> Self {
        match &error {
            rusqlite::Error::SqliteFailure(err, _) => match err.code {
                ErrorCode::CannotOpen
                | ErrorCode::NotADatabase
                | ErrorCode::DatabaseCorrupt
                | ErrorCode::PermissionDenied
                | ErrorCode::SystemIoFailure
                | ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked => FlightError::ConnectionError(error.to_string()),
                _ => FlightError::ExecutionError(error.to_string()),
            },
            rusqlite::Error::InvalidPath(_) => FlightError::ConnectionError(error.to_string()),
            _ => FlightError::ExecutionError(error.to_string()),
        }
    }
}

impl From<serde_json::Error> for FlightError {
    fn from(error: serde_json::Error) -> Self {
        FlightError::ConfigError(error.to_string())
    }
}

/// Return type for a rendered query result.
pub struct QueryResult {
    result: String,
}

impl QueryResult {
    /// Return a result with string.
    ///
    /// # Arguments
    ///
    /// * `result` - Result to return.
    pub fn new(result: &str) -> Self {
        Self {
            result: result.to_string(),
        }
    }

    /// Renders records as a padded text table, one header line followed by one line per record.
    ///
    /// All records are expected to share the schema of the first one.
    pub fn from_records(records: &[Record]) -> Self {
        let first = match records.first() {
            Some(r) => r,
            None => return QueryResult::new("No results\n"),
        };
        let schema = first.schema();
        let width = schema
            .columns()
            .map(|c| c.len())
            .chain(
                records
                    .iter()
                    .flat_map(|r| r.field_vals().map(|f| f.to_string().len())),
            )
            .max()
            .unwrap_or(10)
            + 2;
        let mut res = String::new();
        for col in schema.columns() {
            res += &format!("{:width$}", col, width = width);
        }
        res += "\n";
        for record in records {
            for f in record.field_vals() {
                res += &format!("{:width$}", f.to_string(), width = width);
            }
            res += "\n";
        }
        QueryResult::new(&res)
    }

    /// Get the result.
    pub fn result(&self) -> &str {
        &self.result
    }
}

/// Column names of one result set.
#[derive(PartialEq, Clone, Debug, Default)]
pub struct RecordSchema {
    /// Column names in the order the statement returned them.
    columns: Vec<String>,
    /// Mapping from column name to position.
    name_map: HashMap<String, usize>,
}

impl RecordSchema {
    /// Create a new schema.
    ///
    /// When a name repeats, lookups by name resolve to its last position.
    ///
    /// # Arguments
    ///
    /// * `columns` - Column names in result order.
    pub fn new(columns: Vec<String>) -> Self {
        let mut name_map = HashMap::new();
        for (i, name) in columns.iter().enumerate() {
            name_map.insert(name.clone(), i);
        }
        Self { columns, name_map }
    }

    /// Create a new schema from string slices.
    pub fn from_names(names: &[&str]) -> Self {
        RecordSchema::new(names.iter().map(|n| n.to_string()).collect())
    }

    /// Get the index of the column.
    ///
    /// # Arguments
    ///
    /// * `name` - Name of the column to get the index for.
    pub fn get_field_index(&self, name: &str) -> Option<&usize> {
        self.name_map.get(name)
    }

    /// Check if the column name is in the schema.
    pub fn contains(&self, name: &str) -> bool {
        self.name_map.contains_key(name)
    }

    /// Get an iterator of the column names.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.as_str())
    }

    /// Returns the columns of `expected` that this schema lacks.
    pub fn missing<'a>(&self, expected: &[&'a str]) -> Vec<&'a str> {
        expected
            .iter()
            .filter(|c| !self.contains(c))
            .copied()
            .collect()
    }

    /// Returns the number of columns.
    pub fn size(&self) -> usize {
        self.columns.len()
    }
}

/// The value of one column in one record.
#[derive(Debug, PartialEq, PartialOrd, Clone)]
pub enum Field {
    Null,
    IntField(i64),
    FloatField(f64),
    StringField(String),
    BlobField(Vec<u8>),
}

impl Field {
    pub fn is_null(&self) -> bool {
        matches!(self, Field::Null)
    }

    /// Integer value. REAL values count when they hold a whole number.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Field::IntField(i) => Some(*i),
            Field::FloatField(f)
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 =>
            {
                Some(*f as i64)
            }
            _ => None,
        }
    }

    /// Numeric value; integers are widened.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Field::IntField(i) => Some(*i as f64),
            Field::FloatField(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Field::StringField(s) => Some(s),
            _ => None,
        }
    }
}

impl<'a> From<ValueRef<'a>> for Field {
    fn from(value: ValueRef<'a>) -> Self {
        match value {
            ValueRef::Null => Field::Null,
            ValueRef::Integer(i) => Field::IntField(i),
            ValueRef::Real(f) => Field::FloatField(f),
            ValueRef::Text(t) => Field::StringField(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Field::BlobField(b.to_vec()),
        }
    }
}

impl Serialize for Field {
    /// Serializes as the bare value so records read as plain JSON objects.
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Field::Null => serializer.serialize_none(),
            Field::IntField(i) => serializer.serialize_i64(*i),
            Field::FloatField(f) => serializer.serialize_f64(*f),
            Field::StringField(s) => serializer.serialize_str(s),
            Field::BlobField(b) => serializer.serialize_bytes(b),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Null => write!(f, "NULL"),
            Field::IntField(x) => write!(f, "{}", x),
            Field::FloatField(x) => write!(f, "{:.2}", x),
            Field::StringField(x) => write!(f, "{}", x),
            Field::BlobField(x) => write!(f, "<{} bytes>", x.len()),
        }
    }
}

/// One result row: an ordered mapping from column name to value.
#[derive(Debug, PartialEq, Clone)]
pub struct Record {
    schema: Arc<RecordSchema>,
    field_vals: Vec<Field>,
}

impl Record {
    /// Create a new record.
    ///
    /// # Arguments
    ///
    /// * `schema` - Column names shared by every record of the result set.
    /// * `field_vals` - Values, one per column.
    pub fn new(schema: Arc<RecordSchema>, field_vals: Vec<Field>) -> Self {
        debug_assert_eq!(schema.size(), field_vals.len());
        Self { schema, field_vals }
    }

    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    /// Get the field by column name.
    pub fn get(&self, name: &str) -> Option<&Field> {
        self.schema
            .get_field_index(name)
            .and_then(|i| self.field_vals.get(*i))
    }

    /// Returns an iterator over the field values.
    pub fn field_vals(&self) -> impl Iterator<Item = &Field> {
        self.field_vals.iter()
    }

    /// Returns (column, value) pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.schema.columns().zip(self.field_vals.iter())
    }

    /// Return the number of columns.
    pub fn size(&self) -> usize {
        self.field_vals.len()
    }

    /// Departure delay in minutes; `None` when unreported or absent.
    pub fn delay(&self) -> Option<i64> {
        self.get(DELAY).and_then(Field::as_int)
    }

    /// Airline display name.
    pub fn airline(&self) -> Option<&str> {
        self.get(AIRLINE).and_then(Field::as_str)
    }

    pub fn flight_id(&self) -> Option<i64> {
        self.get(FLIGHT_ID).and_then(Field::as_int)
    }
}

impl Serialize for Record {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.size()))?;
        for (col, field) in self.iter() {
            map.serialize_entry(col, field)?;
        }
        map.end()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut res = String::new();
        for field in &self.field_vals {
            res.push_str(&field.to_string());
            res.push('\t');
        }
        write!(f, "{}", res)
    }
}
