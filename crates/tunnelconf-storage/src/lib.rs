//! Filesystem store for sealed tunnel configurations and the migration of
//! legacy plaintext files into it.
//! Sealing uses AES-GCM with keys sourced from the OS keyring (or test doubles).

pub mod key_provider;
pub mod migration;
pub mod names;
pub mod record_io;
pub mod sealer;
pub mod store;

pub use migration::{
    MigrationCoordinator, MigrationEngine, MigrationOutcome, MigrationReport, RetryTimer,
};
pub use names::{NameCodec, ENCRYPTED_SUFFIX, LEGACY_SUFFIX};
pub use sealer::AesGcmSealer;
pub use store::ConfigStore;
