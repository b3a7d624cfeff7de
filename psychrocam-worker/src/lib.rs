//! Refresh worker for Psychrocam
//!
//! Glues the core cache and aggregator to the outside world:
//! - [`RefreshOrchestrator`] runs single-flight refresh cycles
//! - [`ConfigReconciler`] persists edited configuration after a good render
//! - [`FileConfigStorage`] keeps YAML defaults and customizations on disk
//! - [`CommandRenderer`] hands the aggregated state to an external chart maker
//! - [`SqliteStore`] shares one cache between worker processes
//! - [`ApiSurface`] is what the web layer calls
//!
//! ```no_run
//! use std::sync::Arc;
//! use psychrocam_connectors::HaSourceFactory;
//! use psychrocam_core::TypedCache;
//! use psychrocam_worker::{CommandRenderer, FileConfigStorage, RefreshOrchestrator, SqliteStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = TypedCache::new(Arc::new(SqliteStore::open("/var/lib/psychrocam/cache.sqlite")?));
//! let orchestrator = RefreshOrchestrator::new(
//!     cache,
//!     Arc::new(FileConfigStorage::new("/etc/psychrocam")),
//!     Arc::new(HaSourceFactory::default()),
//!     Arc::new(CommandRenderer::new("psychrochart-render")),
//! );
//! orchestrator.force_full_reset()?;
//! println!("{:?}", orchestrator.run_cycle().await);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod orchestrator;
pub mod reconciler;
pub mod render;
pub mod sqlite_store;
pub mod storage;
pub mod surface;

pub use error::{RenderError, StorageError, WorkerError, WorkerResult};
pub use orchestrator::{CycleOutcome, RefreshOrchestrator, Stage};
pub use reconciler::{ConfigReconciler, Persisted, ReconcileReport};
pub use render::{ChartRenderer, CommandRenderer, RenderContext};
pub use sqlite_store::SqliteStore;
pub use storage::{ConfigName, ConfigStorage, FileConfigStorage};
pub use surface::ApiSurface;
