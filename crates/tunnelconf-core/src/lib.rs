//! Core model and contracts for the tunnel configuration store: the `Config`
//! record, the shared error type, and the collaborator traits (text format,
//! sealing, name validation) the storage crate is built on.

pub mod config;
pub mod error;
pub mod format;
pub mod name;
pub mod sealer;

pub use config::{Config, Section};
pub use error::ConfError;
pub use format::{ConfigFormat, WgQuickFormat};
pub use name::{is_valid_tunnel_name, NameValidator};
pub use sealer::{MaskingSealer, Sealer};
