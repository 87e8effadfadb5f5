use crate::query::QueryTemplate;
use common::{FailurePolicy, Field, FlightError, FlightsConfig, Record, RecordSchema};
use rusqlite::ToSql;
use sqlstore::ConnectionManager;
use std::sync::Arc;

/// Runs parameterized statements and turns their rows into `Record`s.
///
/// Cloning is cheap; clones share the same connection pool.
#[derive(Clone)]
pub struct Executor {
    connections: Arc<ConnectionManager>,
    /// What to do when a statement fails.
    policy: FailurePolicy,
}

impl Executor {
    /// Creates an executor over an existing pool.
    ///
    /// # Arguments
    ///
    /// * `connections` - Pool every statement borrows a connection from.
    /// * `policy` - Whether failures degrade to empty results or propagate.
    pub fn new(connections: Arc<ConnectionManager>, policy: FailurePolicy) -> Self {
        Self {
            connections,
            policy,
        }
    }

    /// Opens a new pool for `config` and wraps it.
    pub fn from_config(config: &FlightsConfig) -> Result<Self, FlightError> {
        let connections = Arc::new(ConnectionManager::new(config)?);
        Ok(Executor::new(connections, config.failure_policy))
    }

    /// Same pool, different failure policy.
    pub fn with_policy(&self, policy: FailurePolicy) -> Self {
        Executor::new(Arc::clone(&self.connections), policy)
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    /// Runs a statement with named parameters and returns its rows in source order.
    ///
    /// Parameters are always bound, never spliced into the statement text.
    /// Under `FailurePolicy::DegradeToEmpty` a failure is logged and an empty
    /// result comes back instead of the error.
    ///
    /// # Arguments
    ///
    /// * `statement` - SQL using `:name` placeholders.
    /// * `params` - Values for the placeholders, e.g. from `rusqlite::named_params!`.
    pub fn execute(
        &self,
        statement: &str,
        params: &[(&str, &dyn ToSql)],
    ) -> Result<Vec<Record>, FlightError> {
        let result = self.fetch(statement, params).map(|(_, records)| records);
        self.apply_policy(statement, result)
    }

    /// Runs a template and checks that its declared columns came back.
    pub fn run(
        &self,
        template: &QueryTemplate,
        params: &[(&str, &dyn ToSql)],
    ) -> Result<Vec<Record>, FlightError> {
        let result = self.fetch(template.sql, params).and_then(|(schema, records)| {
            template.check_shape(&schema)?;
            Ok(records)
        });
        self.apply_policy(template.name, result)
    }

    /// Like `execute`, but always returns failures regardless of policy.
    pub fn try_execute(
        &self,
        statement: &str,
        params: &[(&str, &dyn ToSql)],
    ) -> Result<Vec<Record>, FlightError> {
        self.fetch(statement, params).map(|(_, records)| records)
    }

    /// Borrows a connection for exactly one statement and drains its rows.
    fn fetch(
        &self,
        statement: &str,
        params: &[(&str, &dyn ToSql)],
    ) -> Result<(Arc<RecordSchema>, Vec<Record>), FlightError> {
        debug!("Executing statement: {}", statement);
        let conn = self.connections.acquire()?;
        let mut stmt = conn.prepare(statement)?;
        let columns = stmt
            .column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();
        let schema = Arc::new(RecordSchema::new(columns));

        let mut rows = stmt.query(params)?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let mut field_vals = Vec::with_capacity(schema.size());
            for i in 0..schema.size() {
                field_vals.push(Field::from(row.get_ref(i)?));
            }
            records.push(Record::new(Arc::clone(&schema), field_vals));
        }
        debug!("Statement returned {} records", records.len());
        Ok((schema, records))
    }

    fn apply_policy(
        &self,
        what: &str,
        result: Result<Vec<Record>, FlightError>,
    ) -> Result<Vec<Record>, FlightError> {
        match (result, self.policy) {
            (Ok(records), _) => Ok(records),
            (Err(e), FailurePolicy::DegradeToEmpty) => {
                error!("Query {} failed, returning no records: {}", what, e);
                Ok(Vec::new())
            }
            (Err(e), FailurePolicy::Propagate) => Err(e),
        }
    }
}
