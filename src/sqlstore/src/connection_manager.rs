use common::{FlightError, FlightsConfig};
use r2d2::{ManageConnection, Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags, Statement};

use std::convert::TryFrom;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

type SqlitePool = Pool<SqliteConnectionManager>;

/// Owns a fixed pool of read-only connections to one SQLite database.
///
/// Built once at startup and shared (usually behind an `Arc`) by everything
/// that runs statements. Each statement borrows a connection through
/// `acquire` and gives it back when the returned `ScopedConnection` drops.
pub struct ConnectionManager {
    db_path: PathBuf,
    pool_size: usize,
    /// `None` once the manager is shut down.
    pool: RwLock<Option<SqlitePool>>,
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        info!("Dropping Connection Manager for {:?}", self.db_path);
    }
}

impl ConnectionManager {
    /// Opens `pool_size` connections to `db_path`.
    ///
    /// Fails with `ConnectionError` if the file is missing or is not a
    /// SQLite database, and with `ConfigError` on an invalid config.
    pub fn new(config: &FlightsConfig) -> Result<Self, FlightError> {
        config.validate()?;
        let max_size = u32::try_from(config.pool_size).map_err(|_| {
            FlightError::ConfigError(format!("pool_size {} is too large", config.pool_size))
        })?;
        info!(
            "Opening {} read connections to {:?}",
            config.pool_size, config.db_path
        );
        let db_path = PathBuf::from(&config.db_path);
        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
        let manager = SqliteConnectionManager::file(&db_path)
            .with_flags(
                OpenFlags::SQLITE_OPEN_READ_ONLY
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .with_init(move |conn| conn.busy_timeout(busy_timeout));

        // The pool retries failed opens until its timeout; one direct open
        // reports a missing or corrupt file right away.
        let probe = manager.connect()?;
        check_database(&probe)?;
        drop(probe);

        let pool = Pool::builder()
            .max_size(max_size)
            .connection_timeout(Duration::from_millis(config.acquire_timeout_ms))
            .build(manager)
            .map_err(pool_error)?;
        Ok(ConnectionManager {
            db_path,
            pool_size: config.pool_size,
            pool: RwLock::new(Some(pool)),
        })
    }

    /// Borrows a connection until the returned guard is dropped.
    ///
    /// Waits up to the configured acquire timeout for any connection to be
    /// released when all of them are in use.
    pub fn acquire(&self) -> Result<ScopedConnection, FlightError> {
        let pool = self
            .pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .cloned()
            .ok_or_else(|| {
                FlightError::ConnectionError(String::from(
                    "connection manager has been shut down",
                ))
            })?;
        let conn = pool.get().map_err(pool_error)?;
        debug!("Acquired connection to {:?}", self.db_path);
        Ok(ScopedConnection { conn })
    }

    /// Closes the pool. Later `acquire` calls fail.
    ///
    /// Idle connections close now; connections still on loan close when
    /// they are released. Calling it again is a no-op.
    pub fn shutdown(&self) {
        let pool = self
            .pool
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match pool {
            Some(pool) => {
                let state = pool.state();
                info!(
                    "Connection manager for {:?} shut down, {} idle of {} connections closed",
                    self.db_path, state.idle_connections, state.connections
                );
            }
            None => debug!("Connection manager for {:?} already shut down", self.db_path),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

/// SQLite opens lazily; touching the catalog surfaces NotADatabase here.
fn check_database(conn: &Connection) -> Result<(), FlightError> {
    conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| {
        row.get::<_, i64>(0)
    })?;
    Ok(())
}

fn pool_error(e: r2d2::Error) -> FlightError {
    FlightError::ConnectionError(e.to_string())
}

/// A pooled connection on loan. Dropping it returns it to the pool.
pub struct ScopedConnection {
    conn: PooledConnection<SqliteConnectionManager>,
}

impl ScopedConnection {
    /// Prepares a statement on the borrowed connection.
    pub fn prepare(&self, sql: &str) -> Result<Statement<'_>, FlightError> {
        Ok(self.conn.prepare(sql)?)
    }
}

impl Drop for ScopedConnection {
    fn drop(&mut self) {
        debug!("Releasing pooled connection");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::testutil::*;
    use std::fs;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;

    fn count_flights(conn: &ScopedConnection) -> i64 {
        let mut stmt = conn.prepare("SELECT COUNT(*) FROM flights").unwrap();
        stmt.query_row([], |row| row.get(0)).unwrap()
    }

    #[test]
    fn test_acquire_and_query() {
        let db = TestDb::sample();
        let cm = ConnectionManager::new(&db.config()).unwrap();
        assert_eq!(4, cm.pool_size());
        let conn = cm.acquire().unwrap();
        assert_eq!(sample_flights().len() as i64, count_flights(&conn));
    }

    #[test]
    fn test_missing_database() {
        let path = gen_random_dir().join("missing.sqlite3");
        let config = FlightsConfig::new(&path.to_string_lossy());
        match ConnectionManager::new(&config) {
            Err(FlightError::ConnectionError(_)) => {}
            Err(e) => panic!("unexpected error {:?}", e),
            Ok(_) => panic!("opened a missing database"),
        }
    }

    #[test]
    fn test_not_a_database() {
        let dir = gen_random_dir();
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("garbage.sqlite3");
        fs::write(&path, vec![7u8; 4096]).unwrap();
        let config = FlightsConfig::new(&path.to_string_lossy());
        assert!(matches!(
            ConnectionManager::new(&config),
            Err(FlightError::ConnectionError(_))
        ));
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_invalid_pool_size() {
        let db = TestDb::sample();
        let mut config = db.config();
        config.pool_size = 0;
        assert!(matches!(
            ConnectionManager::new(&config),
            Err(FlightError::ConfigError(_))
        ));
    }

    #[test]
    fn test_exhausted_pool_times_out() {
        let db = TestDb::sample();
        let mut config = db.config();
        config.pool_size = 1;
        config.acquire_timeout_ms = 200;
        let cm = ConnectionManager::new(&config).unwrap();
        let held = cm.acquire().unwrap();
        assert!(matches!(
            cm.acquire(),
            Err(FlightError::ConnectionError(_))
        ));
        drop(held);
        assert!(cm.acquire().is_ok());
    }

    #[test]
    fn test_waiter_takes_whichever_connection_is_released() {
        let db = TestDb::sample();
        let mut config = db.config();
        config.pool_size = 2;
        let cm = Arc::new(ConnectionManager::new(&config).unwrap());
        let first = cm.acquire().unwrap();
        let second = cm.acquire().unwrap();

        let (tx, rx) = mpsc::channel();
        let waiter = {
            let cm = Arc::clone(&cm);
            thread::spawn(move || {
                let res = cm.acquire().map(|conn| count_flights(&conn));
                tx.send(res).unwrap();
            })
        };
        thread::sleep(Duration::from_millis(100));
        assert!(rx.try_recv().is_err());

        // Releasing the later connection must wake the waiter.
        drop(second);
        let got = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(sample_flights().len() as i64, got.unwrap());
        drop(first);
        waiter.join().unwrap();
    }

    #[test]
    fn test_connection_released_on_drop() {
        let db = TestDb::sample();
        let mut config = db.config();
        config.pool_size = 1;
        config.acquire_timeout_ms = 1000;
        let cm = ConnectionManager::new(&config).unwrap();
        for _ in 0..3 {
            let conn = cm.acquire().unwrap();
            assert_eq!(sample_flights().len() as i64, count_flights(&conn));
        }
        // Release on an early error path too.
        let failed: Result<(), FlightError> = (|| {
            let conn = cm.acquire()?;
            conn.prepare("SELECT * FROM no_such_table")?;
            Ok(())
        })();
        assert!(failed.is_err());
        assert!(cm.acquire().is_ok());
    }

    #[test]
    fn test_shutdown() {
        let db = TestDb::sample();
        let cm = ConnectionManager::new(&db.config()).unwrap();
        cm.shutdown();
        assert!(matches!(
            cm.acquire(),
            Err(FlightError::ConnectionError(_))
        ));
        cm.shutdown();
    }

    #[test]
    fn test_concurrent_acquire() {
        let db = TestDb::sample();
        let mut config = db.config();
        config.pool_size = 2;
        let cm = Arc::new(ConnectionManager::new(&config).unwrap());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let cm = Arc::clone(&cm);
            handles.push(thread::spawn(move || {
                let conn = cm.acquire().unwrap();
                count_flights(&conn)
            }));
        }
        for handle in handles {
            assert_eq!(sample_flights().len() as i64, handle.join().unwrap());
        }
    }
}
