//! Transactional services built on the store.

mod blocks;
mod enrollment;

pub use blocks::{BlockAdmin, BlockAdminError};
pub use enrollment::{EnrollmentContext, EnrollmentOrchestrator};
