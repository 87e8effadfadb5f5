pub use executor::Executor;
pub use template::QueryTemplate;
mod executor;
pub mod template;

// Every statement the crate issues is a `QueryTemplate` in `template`.
// Each one declares the column aliases it promises, and `Executor::run`
// checks them against what SQLite actually returned. Callers read records
// by those aliases (see the column constants in `common`), so a renamed or
// dropped alias fails loudly at the executor instead of producing records
// with silently missing keys further up.
//
// Flight-row templates all share one projection (`flight_rows!`) so that
// every record describing a single flight has the same shape no matter
// which filter produced it.
