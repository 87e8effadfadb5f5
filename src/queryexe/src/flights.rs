use crate::query::template;
use crate::query::Executor;
use common::{FlightError, Record};
use rusqlite::named_params;
use std::convert::TryFrom;

/// How many flights `top_delays_by_date` returns unless asked otherwise.
pub const DEFAULT_TOP_DELAYS: usize = 5;
/// How many airlines `top_busiest_airlines` returns unless asked otherwise.
pub const DEFAULT_BUSIEST_AIRLINES: usize = 10;

/// Named flight and airline queries.
///
/// Every flight-row result carries the same columns, including the
/// normalized `FLIGHT_ID`, `AIRLINE` (display name) and `DELAY` aliases.
/// Unknown airlines, airports, ids or dates give an empty result.
#[derive(Clone)]
pub struct FlightQueryService {
    executor: Executor,
}

impl FlightQueryService {
    pub fn new(executor: Executor) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// The flight with the given id, if any.
    pub fn flight_by_id(&self, flight_id: i64) -> Result<Vec<Record>, FlightError> {
        let records = self
            .executor
            .run(&template::FLIGHT_BY_ID, named_params! { ":id": flight_id })?;
        if records.len() > 1 {
            warn!("{} flights share id {}", records.len(), flight_id);
        }
        Ok(records)
    }

    /// Flights of the named airline that left late.
    ///
    /// # Arguments
    ///
    /// * `airline` - Exact airline display name.
    pub fn delayed_flights_by_airline(&self, airline: &str) -> Result<Vec<Record>, FlightError> {
        self.executor.run(
            &template::DELAYED_FLIGHTS_BY_AIRLINE,
            named_params! { ":airline": airline },
        )
    }

    /// Flights out of the given origin airport that left late.
    ///
    /// # Arguments
    ///
    /// * `airport` - Three-letter IATA code, matched exactly.
    pub fn delayed_flights_by_airport(&self, airport: &str) -> Result<Vec<Record>, FlightError> {
        self.executor.run(
            &template::DELAYED_FLIGHTS_BY_AIRPORT,
            named_params! { ":airport": airport },
        )
    }

    /// The `limit` largest delays on one calendar date, largest first.
    ///
    /// Flights with an unreported delay are left out. Equal delays keep
    /// the order the database returns them in.
    pub fn top_delays_by_date(
        &self,
        day: u32,
        month: u32,
        year: i32,
        limit: usize,
    ) -> Result<Vec<Record>, FlightError> {
        self.executor.run(
            &template::TOP_DELAYS_BY_DATE,
            named_params! {
                ":day": day,
                ":month": month,
                ":year": year,
                ":limit": sql_limit(limit)
            },
        )
    }

    /// Airlines ordered by number of flights, most first.
    ///
    /// Records carry `AIRLINE` and `FLIGHT_COUNT`.
    pub fn top_busiest_airlines(&self, limit: usize) -> Result<Vec<Record>, FlightError> {
        self.executor.run(
            &template::BUSIEST_AIRLINES,
            named_params! { ":limit": sql_limit(limit) },
        )
    }

    /// Mean non-negative delay per airline, highest first.
    ///
    /// Records carry `AIRLINE` and `AVERAGE_DELAY`. `AVERAGE_DELAY` is NULL
    /// for an airline whose reported delays are all negative.
    pub fn average_delay_per_airline(&self) -> Result<Vec<Record>, FlightError> {
        self.executor.run(&template::AVERAGE_DELAY_PER_AIRLINE, &[])
    }

    /// Mean non-negative delay per origin airport, highest first.
    ///
    /// Records carry `ORIGIN_AIRPORT` and `AVERAGE_DELAY`.
    pub fn average_delay_per_origin(&self) -> Result<Vec<Record>, FlightError> {
        self.executor.run(&template::AVERAGE_DELAY_PER_ORIGIN, &[])
    }
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}
