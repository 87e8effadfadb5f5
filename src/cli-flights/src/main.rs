extern crate clap;
extern crate rustyline;
use chrono::{Datelike, NaiveDate};
use clap::{App, Arg, ArgMatches};
use common::{FailurePolicy, FlightError, FlightsConfig, QueryResult, Record};
use env_logger::Env;
use log::{error, info};
use queryexe::aggregate::{sort_metrics_desc, DelayMetric};
use queryexe::flights::{DEFAULT_BUSIEST_AIRLINES, DEFAULT_TOP_DELAYS};
use queryexe::{DelayAggregator, Executor, FlightQueryService};

use rustyline::error::ReadlineError;
use rustyline::Editor;
use std::fmt::Display;

const HISTORY: &str = "history.txt";
const EXIT_CHOICE: u32 = 11;

const MENU: &str = "
 1. Flight by id
 2. Delayed flights by airline
 3. Delayed flights by origin airport
 4. Top 5 delays on a date
 5. Average delay per airline
 6. Average delay per origin airport
 7. Top 10 busiest airlines
 8. Percentage of delayed flights per airline
 9. Percentage of delayed flights per hour
10. Percentage of delayed flights per route
11. Exit";

fn parse_choice(input: &str) -> Result<u32, FlightError> {
    match input.trim().parse::<u32>() {
        Ok(n) if (1..=EXIT_CHOICE).contains(&n) => Ok(n),
        _ => Err(FlightError::ValidationError(format!(
            "'{}' is not a menu option (1-{})",
            input.trim(),
            EXIT_CHOICE
        ))),
    }
}

fn parse_flight_id(input: &str) -> Result<i64, FlightError> {
    input
        .trim()
        .parse::<i64>()
        .map_err(|_| FlightError::ValidationError(format!("'{}' is not a flight id", input.trim())))
}

fn parse_airline(input: &str) -> Result<String, FlightError> {
    let name = input.trim();
    if name.is_empty() {
        Err(FlightError::ValidationError(String::from(
            "airline name is empty",
        )))
    } else {
        Ok(name.to_string())
    }
}

/// Three ASCII letters, returned upper-cased.
fn parse_airport(input: &str) -> Result<String, FlightError> {
    let code = input.trim();
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(code.to_ascii_uppercase())
    } else {
        Err(FlightError::ValidationError(format!(
            "'{}' is not a 3-letter IATA code",
            code
        )))
    }
}

/// `DD/MM/YYYY` into (day, month, year).
fn parse_date(input: &str) -> Result<(u32, u32, i32), FlightError> {
    let date = NaiveDate::parse_from_str(input.trim(), "%d/%m/%Y").map_err(|_| {
        FlightError::ValidationError(format!("'{}' is not a DD/MM/YYYY date", input.trim()))
    })?;
    Ok((date.day(), date.month(), date.year()))
}

fn format_metrics<K: Display>(metrics: &[DelayMetric<K>]) -> String {
    if metrics.is_empty() {
        return String::from("No results\n");
    }
    metrics
        .iter()
        .map(|m| format!("{}: {:.2}\n", m.key, m.value))
        .collect()
}

fn format_records(records: &[Record]) -> String {
    QueryResult::from_records(records).result().to_string()
}

/// Reads lines until `parse` accepts one. `None` once input is closed.
fn prompt_until<T, F>(rl: &mut Editor<()>, prompt: &str, parse: F) -> Option<T>
where
    F: Fn(&str) -> Result<T, FlightError>,
{
    loop {
        match rl.readline(prompt) {
            Ok(line) => {
                rl.add_history_entry(line.as_str());
                match parse(&line) {
                    Ok(v) => return Some(v),
                    Err(e) => println!("{}", e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                info!("CTRL-C");
                return None;
            }
            Err(ReadlineError::Eof) => {
                info!("CTRL-D");
                return None;
            }
            Err(err) => {
                error!("Error: {:?}", err);
                return None;
            }
        }
    }
}

struct Menu {
    service: FlightQueryService,
    aggregator: DelayAggregator,
}

impl Menu {
    fn new(executor: Executor) -> Self {
        Menu {
            service: FlightQueryService::new(executor.clone()),
            aggregator: DelayAggregator::new(executor),
        }
    }

    /// Runs one menu entry. `Ok(None)` means input was closed mid-prompt.
    fn run(&self, choice: u32, rl: &mut Editor<()>) -> Result<Option<String>, FlightError> {
        let out = match choice {
            1 => match prompt_until(rl, "flight id> ", parse_flight_id) {
                Some(id) => format_records(&self.service.flight_by_id(id)?),
                None => return Ok(None),
            },
            2 => match prompt_until(rl, "airline> ", parse_airline) {
                Some(name) => format_records(&self.service.delayed_flights_by_airline(&name)?),
                None => return Ok(None),
            },
            3 => match prompt_until(rl, "origin airport> ", parse_airport) {
                Some(code) => format_records(&self.service.delayed_flights_by_airport(&code)?),
                None => return Ok(None),
            },
            4 => match prompt_until(rl, "date (DD/MM/YYYY)> ", parse_date) {
                Some((day, month, year)) => format_records(&self.service.top_delays_by_date(
                    day,
                    month,
                    year,
                    DEFAULT_TOP_DELAYS,
                )?),
                None => return Ok(None),
            },
            5 => format_records(&self.service.average_delay_per_airline()?),
            6 => format_records(&self.service.average_delay_per_origin()?),
            7 => format_records(&self.service.top_busiest_airlines(DEFAULT_BUSIEST_AIRLINES)?),
            8 => {
                let mut metrics = self.aggregator.percentage_delayed_per_airline()?;
                sort_metrics_desc(&mut metrics);
                format_metrics(&metrics)
            }
            9 => format_metrics(&self.aggregator.percentage_delayed_per_hour()?),
            10 => {
                let mut metrics = self.aggregator.percentage_delayed_per_route()?;
                sort_metrics_desc(&mut metrics);
                format_metrics(&metrics)
            }
            _ => String::new(),
        };
        Ok(Some(out))
    }
}

fn process_cli_input(menu: &Menu) {
    let mut rl = Editor::<()>::new();
    if rl.load_history(HISTORY).is_err() {
        info!("No previous history.");
    }
    loop {
        println!("{}", MENU);
        let choice = match prompt_until(&mut rl, "[flights]>> ", parse_choice) {
            Some(c) => c,
            None => break,
        };
        if choice == EXIT_CHOICE {
            break;
        }
        match menu.run(choice, &mut rl) {
            Ok(Some(out)) => print!("{}", out),
            Ok(None) => break,
            Err(e) => println!("{}", e),
        }
    }
    if let Err(e) = rl.save_history(HISTORY) {
        error!("Could not save history: {}", e);
    }
}

fn load_config(matches: &ArgMatches) -> Result<FlightsConfig, FlightError> {
    let mut config = match matches.value_of("config") {
        Some(path) => FlightsConfig::from_file(path)?,
        None => FlightsConfig::default(),
    };
    if let Some(db_path) = matches.value_of("db_path") {
        config.db_path = db_path.to_string();
    }
    if let Some(pool_size) = matches.value_of("pool_size") {
        config.pool_size = pool_size.parse().map_err(|_| {
            FlightError::ConfigError(format!("'{}' is not a pool size", pool_size))
        })?;
    }
    if matches.is_present("strict") {
        config.failure_policy = FailurePolicy::Propagate;
    }
    config.validate()?;
    Ok(config)
}

fn main() {
    // Configure log environment
    env_logger::from_env(Env::default().default_filter_or("info")).init();

    let matches = App::new(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("Sets a custom config file")
                .takes_value(true)
                .required(false),
        )
        .arg(
            Arg::with_name("db_path")
                .short("d")
                .long("db_path")
                .value_name("db_path")
                .help("Path of the SQLite flights database")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("pool_size")
                .short("p")
                .long("pool_size")
                .value_name("pool_size")
                .help("Number of read-only connections to open")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("strict")
                .short("s")
                .long("strict")
                .help("Report query failures instead of showing empty results"),
        )
        .get_matches();

    let config = match load_config(&matches) {
        Ok(config) => config,
        Err(e) => {
            error!("Bad configuration: {}", e);
            return;
        }
    };
    info!("Starting with config: {:?}", config);

    match Executor::from_config(&config) {
        Ok(executor) => {
            let menu = Menu::new(executor);
            process_cli_input(&menu);
            menu.service.executor().connections().shutdown();
        }
        Err(e) => {
            error!("Failed to open {}: {}", config.db_path, e);
        }
    }
    info!("Terminated.");
}

#[cfg(test)]
mod test {
    use super::*;
    use queryexe::Route;

    #[test]
    fn test_parse_choice() {
        assert_eq!(1, parse_choice(" 1 ").unwrap());
        assert_eq!(11, parse_choice("11").unwrap());
        assert!(parse_choice("0").is_err());
        assert!(parse_choice("12").is_err());
        assert!(parse_choice("one").is_err());
    }

    #[test]
    fn test_parse_flight_id() {
        assert_eq!(42, parse_flight_id("42").unwrap());
        assert!(matches!(
            parse_flight_id("4x2"),
            Err(FlightError::ValidationError(_))
        ));
        assert!(parse_flight_id("").is_err());
    }

    #[test]
    fn test_parse_airport() {
        assert_eq!("JFK", parse_airport("jfk").unwrap());
        assert_eq!("LAX", parse_airport(" LAX ").unwrap());
        assert!(parse_airport("JF").is_err());
        assert!(parse_airport("JFKX").is_err());
        assert!(parse_airport("J1K").is_err());
    }

    #[test]
    fn test_parse_airline() {
        assert_eq!("Delta Air Lines", parse_airline(" Delta Air Lines ").unwrap());
        assert!(parse_airline("   ").is_err());
    }

    #[test]
    fn test_parse_date() {
        assert_eq!((1, 2, 2015), parse_date("01/02/2015").unwrap());
        assert_eq!((31, 12, 2015), parse_date("31/12/2015").unwrap());
        assert!(parse_date("31/02/2015").is_err());
        assert!(parse_date("2015-01-01").is_err());
        assert!(parse_date("").is_err());
    }

    #[test]
    fn test_format_metrics() {
        let metrics = vec![
            DelayMetric {
                key: Route::new("JFK", "LAX"),
                value: 50.0,
            },
            DelayMetric {
                key: Route::new("ATL", "JFK"),
                value: 100.0 / 3.0,
            },
        ];
        assert_eq!(
            "JFK -> LAX: 50.00\nATL -> JFK: 33.33\n",
            format_metrics(&metrics)
        );
        let none: Vec<DelayMetric<u32>> = Vec::new();
        assert_eq!("No results\n", format_metrics(&none));
    }

    #[test]
    fn test_format_records_empty() {
        assert_eq!("No results\n", format_records(&[]));
    }
}
