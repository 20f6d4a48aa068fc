//! Storage layer: object storage for uploaded bytes, and a relational
//! metadata store for users, chats, messages, and the read-only project
//! document tree (spec §6).
//!
//! # Example
//!
//! ```rust,no_run
//! use doc_agent_storage::object_store::{ObjectStore, ObjectStoreConfig, S3ObjectStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = S3ObjectStore::new(ObjectStoreConfig::default()).await?;
//!     store.upload("hello.txt", b"hi", "text/plain").await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod metadata_store;
pub mod models;
pub mod object_store;
pub mod project_store;

pub use error::{StorageError, StorageResult};
pub use metadata_store::{MetadataStore, PostgresConfig, PostgresMetadataStore};
pub use object_store::{ObjectStore, ObjectStoreConfig, S3ObjectStore};
pub use project_store::ProjectStore;
