//! Local catalog store (libSQL)

mod connection;
mod local_state;
mod migrations;
mod repository;
mod settings_repository;
pub mod snapshot;
mod table;

pub use connection::Database;
pub use local_state::LocalStateStore;
pub use migrations::CURRENT_VERSION;
pub use repository::{CatalogRepository, LibSqlCatalogRepository};
pub use settings_repository::{LibSqlSettingsRepository, SettingsRepository};
pub use table::{LinkTable, Table};
