//! # inishare
//!
//! A key/value store over plain INI files that several processes on one host
//! read and write at the same time.
//!
//! ```no_run
//! use inishare::{IniStore, StoreConfig};
//!
//! let store = IniStore::new(StoreConfig::default());
//! let port: i32 = store.get("/etc/acme/printer.ini", "Printer", "Port", 9100);
//! store.set("/etc/acme/printer.ini", "Printer", "Port", port + 1);
//! ```
//!
//! ## Layers
//!
//! - [`api`]: the [`IniStore`] facade, the only surface meant for callers.
//! - [`sections`]: maps caller labels onto namespaced section names.
//! - [`store`]: document cache, change watcher and the systemwide lock.
//! - [`codec`] / [`model`]: the INI text format and its in-memory form.
//! - [`value`]: typed values to and from INI text.
//!
//! Logging goes through `tracing`; installing a subscriber is up to the host
//! application.

pub mod api;
pub mod codec;
pub mod config;
pub mod error;
pub mod model;
pub mod sections;
pub mod store;
pub mod value;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use api::IniStore;
pub use codec::{Codec, IniCodec};
pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use model::Document;
pub use sections::{Resolution, Resolve, SectionResolver};
pub use value::{FromIni, ToIni};
