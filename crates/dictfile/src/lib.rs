//! # dictfile
//!
//! A file-backed dictionary store: an in-memory key/value mapping bound to
//! one backing file, with explicit save/load, a `synced` flag tracking
//! whether memory and disk agree, a single-level revert journal for
//! overwritten values, and self-deleting temporary backing files.
//!
//! ## Format Structure
//!
//! Little-endian throughout:
//!
//! ```text
//! i32                 pair count
//! repeat per pair:
//!     i32             key length
//!     bytes           UTF-8 JSON key
//!     i32             value length
//!     bytes           UTF-8 JSON value
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use dictfile::DictFile;
//!
//! let mut store = DictFile::temporary()?;
//! store.set("greeting".to_string(), "hello".to_string());
//! assert!(!store.is_synced());
//!
//! store.save()?;
//! assert!(store.is_synced());
//! assert_eq!(store.get(&"greeting".to_string())?, "hello");
//! # Ok::<(), dictfile::Error>(())
//! ```
//!
//! Stores bound to an explicit path keep their backing file across drops:
//!
//! ```rust,no_run
//! use dictfile::DictFile;
//!
//! let mut store: DictFile<String, u32> = DictFile::open("scores.dict");
//! store.load()?;
//! store.set("alice".to_string(), 41);
//! store.save()?;
//! # Ok::<(), dictfile::Error>(())
//! ```

mod codec;
pub mod error;
mod path;
pub mod store;

pub use error::{Error, Result};
pub use store::{DictFile, Retention};
