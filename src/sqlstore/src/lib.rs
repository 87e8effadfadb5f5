#[macro_use]
extern crate log;

pub mod connection_manager;

pub use connection_manager::{ConnectionManager, ScopedConnection};
