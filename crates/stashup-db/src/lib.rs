//! Stashup Database Layer
//!
//! SQLite repositories for the upload queue, integrity audit records, the place
//! cache and not-for-upload marks, plus pool setup with embedded migrations.

pub mod db;

pub use db::pool::{connect, run_migrations, setup_database};
pub use db::transaction::TransactionGuard;
pub use db::{
    ContributionRepository, NotForUploadRepository, PlaceRepository, UploadedStatusRepository,
};
