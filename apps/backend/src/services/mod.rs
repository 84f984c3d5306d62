//! Application services for the SoundVault backend.

pub mod auth;
pub mod delivery;
pub mod storage;

pub use auth::{AuthService, Claims};
pub use delivery::{DeliveryError, DeliveryOutcome, DeliveryResolver};
pub use storage::{StorageAdapter, StorageError, StorageKind};
