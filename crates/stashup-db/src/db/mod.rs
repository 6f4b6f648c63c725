//! Database repositories
//!
//! One repository per table. The worker only sees them through the store traits
//! of `stashup-core`; the CLI also uses their inherent query helpers.

pub mod contribution;
pub mod place;
pub mod pool;
pub mod transaction;
pub mod uploaded_status;

pub use contribution::ContributionRepository;
pub use place::PlaceRepository;
pub use uploaded_status::{NotForUploadRepository, UploadedStatusRepository};
