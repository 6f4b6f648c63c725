//! HTTP client for a MediaWiki-style media repository.
//!
//! [`MediaWikiClient`] implements the two-phase upload (chunked stash, then
//! commit) and file lookups; [`StructuredDataClient`] performs the structured-data
//! edits. Both authenticate with an OAuth 2 bearer token and map API errors onto
//! the upload error taxonomy.

pub mod api;
pub mod error;
pub mod structured_data;
pub mod upload;

pub use api::{ApiClient, Auth};
pub use error::{ClientError, Phase};
pub use structured_data::StructuredDataClient;
pub use upload::MediaWikiClient;
