mod from_row;
pub mod queries;
mod schema;

pub use from_row::{FromRow, query_all, query_one};
pub use schema::init_db;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state shared by every handler.
///
/// The store handle is built once in `main` (or by a test) and passed in
/// here; nothing reaches for a global connection.
#[derive(Clone)]
pub struct AppState {
    /// Key store and webhook event log
    pub db: DbPool,
    /// Shared secret for webhook deliveries (None = endpoint refuses everything)
    pub webhook_secret: Option<String>,
    /// Bearer secret for /admin (None = admin API refuses everything)
    pub admin_secret: Option<String>,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path).with_init(|conn| {
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")
    });
    Pool::builder().max_size(10).build(manager)
}
