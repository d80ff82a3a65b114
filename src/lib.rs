//! # Cellfill - Template-Driven Spreadsheet Fill Engine
//!
//! Cellfill renders a flat record into a multi-sheet spreadsheet template:
//! values land in predetermined cells, checkbox groups get exactly one
//! marker, pictures are dropped into cell ranges, and the result is saved
//! under a collision-free name.
//!
//! - **Normalization**: blank and "n/a"-like values become `N/A`
//! - **Mapping**: validated field → cell and choice-group configuration
//! - **Concurrency**: a bounded worker pool computes writes, a single writer
//!   thread applies them to the non-thread-safe document handle
//! - **Caching**: TTL cache for file digests, template inspection and image
//!   probes, degrading to misses when its store is down
//!
//! ## Quick Start
//!
//! ```no_run
//! use cellfill::{
//!     assembler::{Assembler, GenerationRequest},
//!     config::EngineConfig,
//!     fill::CancelToken,
//!     host::MemoryHost,
//!     mapping::MappingBuilder,
//!     normalize::Record,
//! };
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), cellfill::CellfillError> {
//! let mapping = MappingBuilder::new()
//!     .field("Sheet1", "ID", ["B5"])
//!     .field("Sheet1", "NOMBRE DEL SITIO", ["J9"])
//!     .build()?;
//!
//! let config = EngineConfig::default();
//! let assembler = Assembler::new(
//!     Arc::new(MemoryHost::new()),
//!     Arc::new(mapping),
//!     config.build_cache(),
//!     config,
//! )?;
//!
//! let record = Record::new().with("ID", "42").with("NOMBRE DEL SITIO", "");
//! let request = GenerationRequest::new("42", "plantilla.xlsx", record);
//! let report = assembler.generate(request, &CancelToken::new()).await?;
//! println!("saved {}", report.output.display());
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`normalize`] | Value normalization, `Record` |
//! | [`address`] | A1-style cell and range addresses |
//! | [`mapping`] | Field and choice-group mapping, presets |
//! | [`cache`] | TTL cache with hit/miss accounting |
//! | [`host`] | Document-editing capability and in-memory host |
//! | [`fill`] | Fill orchestrator and serialized writer |
//! | [`images`] | Image placement |
//! | [`assembler`] | End-to-end generation and reporting |
//! | [`config`] | Engine configuration |
//! | [`error`] | Error types |

pub mod address;
pub mod assembler;
pub mod cache;
pub mod config;
pub mod error;
pub mod fill;
pub mod host;
pub mod images;
pub mod mapping;
pub mod normalize;

// Re-exports for convenience
pub use assembler::{Assembler, GenerationReport, GenerationRequest};
pub use config::EngineConfig;
pub use error::CellfillError;
pub use mapping::TemplateMapping;
pub use normalize::{Record, normalize};
