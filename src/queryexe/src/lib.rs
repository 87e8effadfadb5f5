#[macro_use]
extern crate log;
#[macro_use]
extern crate serde;

pub mod aggregate;
pub mod flights;
pub mod query;

pub use aggregate::{DelayAggregator, DelayMetric, GroupCounts, Route};
pub use flights::FlightQueryService;
pub use query::{Executor, QueryTemplate};
