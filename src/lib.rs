//! KBase: a markdown note vault with a dual rich/plain editor core.
//!
//! The vault layer ([`vault`]) owns notes on disk. The client core keeps
//! open tabs ([`tabs`]), per-note editor view state ([`note_state`]) and the
//! two editors of the active note in step ([`sync`]); [`workspace`] wires
//! them to the vault through [`vault_store`].

pub mod autosave;
pub mod broadcast;
pub mod error;
pub mod markdown;
pub mod note_state;
pub mod path;
pub mod storage;
pub mod sync;
pub mod tabs;
pub mod vault;
pub mod vault_store;
pub mod workspace;

pub use error::{ErrorKind, KbaseError, Result};
pub use path::VaultPath;
pub use vault::Vault;
