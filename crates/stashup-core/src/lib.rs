//! Stashup Core Library
//!
//! This crate provides the domain models, error types, configuration and the
//! collaborator traits shared by the store, the HTTP client and the upload worker.

pub mod config;
pub mod error;
pub mod hashing;
pub mod models;
pub mod naming;
pub mod selector;
pub mod services;
pub mod transfer;

// Re-export commonly used types
pub use config::{ClientConfig, Config, WorkerConfig};
pub use error::{AppError, ErrorClass, LogLevel, UploadError, INVALID_TOKEN_ERROR_MESSAGE};
pub use selector::{ActionedImages, ImageSelector, SelectorConfig};
pub use services::{
    ContributionStore, MetadataService, NoOpSessionHook, NotificationSink, PlaceStore,
    SessionHook, StructuredDataService, TracingNotificationSink, UploadService,
    UploadedStatusStore,
};
pub use transfer::{TransferHandle, TransferSignal};
