//! FitPass enrollment daemon.
//!
//! SQLite persistence and the transactional enrollment orchestrator on top
//! of the IO-free types in `fitpass-core`.

pub mod config;
pub mod db;
pub mod services;
pub mod store;

pub use config::{Config, ConfigError};
pub use db::{Database, UnitOfWork};
pub use services::{BlockAdmin, BlockAdminError, EnrollmentContext, EnrollmentOrchestrator};
pub use store::StoreError;
