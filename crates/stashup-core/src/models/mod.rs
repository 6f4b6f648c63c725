//! Data models for the application
//!
//! Each sub-module represents one feature area: the upload queue, the remote
//! protocol results, structured-data targets, audit records and the gallery.

mod contribution;
mod image;
mod media;
mod notification;
mod place;
mod upload;
mod uploaded_status;

// Re-export all models for convenient imports
pub use contribution::*;
pub use image::*;
pub use media::*;
pub use notification::*;
pub use place::*;
pub use upload::*;
pub use uploaded_status::*;
