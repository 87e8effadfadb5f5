use crate::{FlightError, FlightsConfig};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use rusqlite::{params, Connection};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn gen_rand_string(n: usize) -> String {
    thread_rng().sample_iter(Alphanumeric).take(n).map(char::from).collect()
}

/// Returns a fresh path under the temp dir. The directory is not created.
pub fn gen_random_dir() -> PathBuf {
    init();
    let mut dir = env::temp_dir();
    dir.push(String::from("flightdelays"));
    let rand_string = gen_rand_string(10);
    dir.push(rand_string);
    dir
}

const SCHEMA: &str = "
CREATE TABLE airlines (
    ID INTEGER PRIMARY KEY,
    AIRLINE TEXT NOT NULL
);
CREATE TABLE flights (
    ID INTEGER PRIMARY KEY,
    AIRLINE INTEGER NOT NULL REFERENCES airlines(ID),
    ORIGIN_AIRPORT CHAR(3) NOT NULL,
    DESTINATION_AIRPORT CHAR(3) NOT NULL,
    SCHEDULED_DEPARTURE TEXT,
    DEPARTURE_DELAY INTEGER,
    YEAR INTEGER NOT NULL,
    MONTH INTEGER NOT NULL,
    DAY INTEGER NOT NULL
);
";

/// One row of the `flights` fixture table.
#[derive(Debug, Clone)]
pub struct FixtureFlight {
    pub id: i64,
    pub airline_id: i64,
    pub origin: &'static str,
    pub destination: &'static str,
    pub scheduled_departure: String,
    pub delay: Option<i64>,
    pub year: i64,
    pub month: i64,
    pub day: i64,
}

impl FixtureFlight {
    pub fn new(
        id: i64,
        airline_id: i64,
        origin: &'static str,
        destination: &'static str,
        scheduled_departure: &str,
        delay: Option<i64>,
        (year, month, day): (i64, i64, i64),
    ) -> Self {
        FixtureFlight {
            id,
            airline_id,
            origin,
            destination,
            scheduled_departure: scheduled_departure.to_string(),
            delay,
            year,
            month,
            day,
        }
    }
}

pub fn sample_airlines() -> Vec<(i64, &'static str)> {
    vec![
        (1, "Delta Air Lines"),
        (2, "United Air Lines"),
        (3, "Ghost Air"),
    ]
}

/// Delta (1) holds delays [-10, 5, 15, null]; Ghost Air (3) has no flights.
pub fn sample_flights() -> Vec<FixtureFlight> {
    let jan1 = (2015, 1, 1);
    let jan2 = (2015, 1, 2);
    vec![
        FixtureFlight::new(1, 1, "JFK", "LAX", "2015-01-01 05:30:00", Some(-10), jan1),
        FixtureFlight::new(2, 1, "JFK", "LAX", "2015-01-01 09:15:00", Some(5), jan1),
        FixtureFlight::new(3, 1, "ATL", "JFK", "2015-01-01 09:45:00", Some(15), jan1),
        FixtureFlight::new(4, 1, "ATL", "LAX", "2015-01-02 17:00:00", None, jan2),
        FixtureFlight::new(5, 2, "LAX", "JFK", "2015-01-01 17:20:00", Some(30), jan1),
        FixtureFlight::new(6, 2, "LAX", "ATL", "2015-01-01 23:05:00", Some(0), jan1),
        FixtureFlight::new(7, 2, "JFK", "ATL", "2015-01-01 09:00:00", Some(45), jan1),
        FixtureFlight::new(8, 2, "JFK", "LAX", "2015-01-01 12:10:00", Some(60), jan1),
        FixtureFlight::new(9, 2, "ATL", "JFK", "2015-01-01 13:00:00", Some(120), jan1),
        FixtureFlight::new(10, 2, "LAX", "JFK", "2015-01-01 14:00:00", Some(2), jan1),
        FixtureFlight::new(11, 2, "JFK", "LAX", "2015-01-02 05:10:00", Some(-3), jan2),
    ]
}

/// Creates the airline/flight schema at `path` and loads the given rows.
pub fn create_flights_db(
    path: &Path,
    airlines: &[(i64, &str)],
    flights: &[FixtureFlight],
) -> Result<(), FlightError> {
    let mut conn = Connection::open(path)?;
    let tx = conn.transaction()?;
    tx.execute_batch(SCHEMA)?;
    for (id, name) in airlines {
        tx.execute(
            "INSERT INTO airlines (ID, AIRLINE) VALUES (?1, ?2)",
            params![id, name],
        )?;
    }
    for f in flights {
        tx.execute(
            "INSERT INTO flights (ID, AIRLINE, ORIGIN_AIRPORT, DESTINATION_AIRPORT, \
             SCHEDULED_DEPARTURE, DEPARTURE_DELAY, YEAR, MONTH, DAY) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                f.id,
                f.airline_id,
                f.origin,
                f.destination,
                f.scheduled_departure,
                f.delay,
                f.year,
                f.month,
                f.day
            ],
        )?;
    }
    tx.commit()?;
    Ok(())
}

/// A throwaway SQLite database file. The directory holding it is removed on drop.
pub struct TestDb {
    dir: PathBuf,
    path: PathBuf,
}

impl TestDb {
    pub fn new(airlines: &[(i64, &str)], flights: &[FixtureFlight]) -> Self {
        let dir = gen_random_dir();
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("flights.sqlite3");
        create_flights_db(&path, airlines, flights).unwrap();
        TestDb { dir, path }
    }

    /// Database loaded with `sample_airlines` and `sample_flights`.
    pub fn sample() -> Self {
        TestDb::new(&sample_airlines(), &sample_flights())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Default config pointing at this database.
    pub fn config(&self) -> FlightsConfig {
        FlightsConfig::new(&self.path.to_string_lossy())
    }
}

impl Drop for TestDb {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.dir);
    }
}
