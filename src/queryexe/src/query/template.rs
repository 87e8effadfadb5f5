use common::*;

/// A fixed SQL statement with named parameters and the columns it returns.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryTemplate {
    /// Short name used in logs.
    pub name: &'static str,
    pub sql: &'static str,
    /// Columns every result of this statement must carry.
    pub shape: &'static [&'static str],
}

impl QueryTemplate {
    /// Checks that `schema` carries every declared column.
    pub fn check_shape(&self, schema: &RecordSchema) -> Result<(), FlightError> {
        let missing = schema.missing(self.shape);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(FlightError::ExecutionError(format!(
                "{} did not return declared columns {:?}",
                self.name, missing
            )))
        }
    }
}

/// Projection shared by every query that returns one record per flight.
macro_rules! flight_rows {
    () => {
        "SELECT flights.ID AS FLIGHT_ID, \
                airlines.AIRLINE AS AIRLINE, \
                flights.AIRLINE AS AIRLINE_ID, \
                flights.ORIGIN_AIRPORT AS ORIGIN_AIRPORT, \
                flights.DESTINATION_AIRPORT AS DESTINATION_AIRPORT, \
                flights.SCHEDULED_DEPARTURE AS SCHEDULED_DEPARTURE, \
                flights.DEPARTURE_DELAY AS DEPARTURE_DELAY, \
                flights.DEPARTURE_DELAY AS DELAY, \
                flights.YEAR AS YEAR, \
                flights.MONTH AS MONTH, \
                flights.DAY AS DAY \
         FROM flights \
         JOIN airlines ON flights.AIRLINE = airlines.ID "
    };
}

/// Counts all flights and the delayed ones (delay > 0; NULL counts as not delayed).
macro_rules! delay_counts {
    () => {
        "COUNT(*) AS TOTAL_FLIGHTS, \
         SUM(CASE WHEN flights.DEPARTURE_DELAY > 0 THEN 1 ELSE 0 END) AS DELAYED_FLIGHTS "
    };
}

/// Averages non-negative delays only; early departures are left out entirely.
macro_rules! average_delay {
    () => {
        "AVG(CASE WHEN flights.DEPARTURE_DELAY >= 0 THEN flights.DEPARTURE_DELAY END) AS AVERAGE_DELAY "
    };
}

pub const FLIGHT_SHAPE: &[&str] = &[
    FLIGHT_ID,
    AIRLINE,
    AIRLINE_ID,
    ORIGIN_AIRPORT,
    DESTINATION_AIRPORT,
    SCHEDULED_DEPARTURE,
    DEPARTURE_DELAY,
    DELAY,
    YEAR,
    MONTH,
    DAY,
];

pub const FLIGHT_BY_ID: QueryTemplate = QueryTemplate {
    name: "flight_by_id",
    sql: concat!(flight_rows!(), "WHERE flights.ID = :id"),
    shape: FLIGHT_SHAPE,
};

pub const DELAYED_FLIGHTS_BY_AIRLINE: QueryTemplate = QueryTemplate {
    name: "delayed_flights_by_airline",
    sql: concat!(
        flight_rows!(),
        "WHERE airlines.AIRLINE = :airline \
         AND flights.DEPARTURE_DELAY IS NOT NULL \
         AND flights.DEPARTURE_DELAY > 0"
    ),
    shape: FLIGHT_SHAPE,
};

pub const DELAYED_FLIGHTS_BY_AIRPORT: QueryTemplate = QueryTemplate {
    name: "delayed_flights_by_airport",
    sql: concat!(
        flight_rows!(),
        "WHERE flights.ORIGIN_AIRPORT = :airport \
         AND flights.DEPARTURE_DELAY IS NOT NULL \
         AND flights.DEPARTURE_DELAY > 0"
    ),
    shape: FLIGHT_SHAPE,
};

// No secondary sort key: equal delays come back in storage order.
pub const TOP_DELAYS_BY_DATE: QueryTemplate = QueryTemplate {
    name: "top_delays_by_date",
    sql: concat!(
        flight_rows!(),
        "WHERE flights.YEAR = :year \
         AND flights.MONTH = :month \
         AND flights.DAY = :day \
         AND flights.DEPARTURE_DELAY IS NOT NULL \
         ORDER BY flights.DEPARTURE_DELAY DESC \
         LIMIT :limit"
    ),
    shape: FLIGHT_SHAPE,
};

pub const BUSIEST_AIRLINES: QueryTemplate = QueryTemplate {
    name: "busiest_airlines",
    sql: "SELECT airlines.AIRLINE AS AIRLINE, COUNT(*) AS FLIGHT_COUNT \
          FROM flights \
          JOIN airlines ON flights.AIRLINE = airlines.ID \
          GROUP BY airlines.AIRLINE \
          ORDER BY FLIGHT_COUNT DESC \
          LIMIT :limit",
    shape: &[AIRLINE, FLIGHT_COUNT],
};

pub const AVERAGE_DELAY_PER_AIRLINE: QueryTemplate = QueryTemplate {
    name: "average_delay_per_airline",
    sql: concat!(
        "SELECT airlines.AIRLINE AS AIRLINE, ",
        average_delay!(),
        "FROM flights \
         JOIN airlines ON flights.AIRLINE = airlines.ID \
         WHERE flights.DEPARTURE_DELAY IS NOT NULL \
         GROUP BY airlines.AIRLINE \
         ORDER BY AVERAGE_DELAY DESC"
    ),
    shape: &[AIRLINE, AVERAGE_DELAY],
};

pub const AVERAGE_DELAY_PER_ORIGIN: QueryTemplate = QueryTemplate {
    name: "average_delay_per_origin",
    sql: concat!(
        "SELECT flights.ORIGIN_AIRPORT AS ORIGIN_AIRPORT, ",
        average_delay!(),
        "FROM flights \
         WHERE flights.DEPARTURE_DELAY IS NOT NULL \
         GROUP BY flights.ORIGIN_AIRPORT \
         ORDER BY AVERAGE_DELAY DESC"
    ),
    shape: &[ORIGIN_AIRPORT, AVERAGE_DELAY],
};

pub const DELAY_COUNTS_PER_AIRLINE: QueryTemplate = QueryTemplate {
    name: "delay_counts_per_airline",
    sql: concat!(
        "SELECT airlines.AIRLINE AS AIRLINE, ",
        delay_counts!(),
        "FROM flights \
         JOIN airlines ON flights.AIRLINE = airlines.ID \
         GROUP BY airlines.AIRLINE"
    ),
    shape: &[AIRLINE, TOTAL_FLIGHTS, DELAYED_FLIGHTS],
};

/// Grouped by the raw timestamp; hours are derived afterwards.
pub const DELAY_COUNTS_PER_DEPARTURE: QueryTemplate = QueryTemplate {
    name: "delay_counts_per_departure",
    sql: concat!(
        "SELECT flights.SCHEDULED_DEPARTURE AS SCHEDULED_DEPARTURE, ",
        delay_counts!(),
        "FROM flights \
         GROUP BY flights.SCHEDULED_DEPARTURE"
    ),
    shape: &[SCHEDULED_DEPARTURE, TOTAL_FLIGHTS, DELAYED_FLIGHTS],
};

pub const DELAY_COUNTS_PER_ROUTE: QueryTemplate = QueryTemplate {
    name: "delay_counts_per_route",
    sql: concat!(
        "SELECT flights.ORIGIN_AIRPORT AS ORIGIN_AIRPORT, \
                flights.DESTINATION_AIRPORT AS DESTINATION_AIRPORT, ",
        delay_counts!(),
        "FROM flights \
         GROUP BY flights.ORIGIN_AIRPORT, flights.DESTINATION_AIRPORT"
    ),
    shape: &[
        ORIGIN_AIRPORT,
        DESTINATION_AIRPORT,
        TOTAL_FLIGHTS,
        DELAYED_FLIGHTS,
    ],
};
