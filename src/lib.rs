//! # Resnap: Checkpointing for Expensive Computations
//!
//! Resnap memoizes deterministic computations across process restarts. A
//! checkpointed call fingerprints its arguments, replays the newest stored
//! result with the same fingerprint, or runs the computation and persists
//! its result plus a metadata record.
//!
//! ## Design Principles (Toyota Way Aligned)
//!
//! - **Muda elimination**: A hit never re-runs the computation
//! - **Poka-Yoke safety**: Artifacts are written before the metadata that
//!   references them
//! - **Jidoka**: A corrupt record is skipped, never fatal to the lookup
//! - **Genchi Genbutsu**: Stored history is plain files (JSON metadata and
//!   standard formats) that can be inspected directly
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use resnap::{Arguments, Config, Resnap, Signature};
//! use resnap::payload::Json;
//!
//! let resnap = Resnap::new(Config::load()?);
//! let totals = resnap
//!     .checkpoint("monthly_totals")
//!     .signature(Signature::new().param("month").param_with_default("currency", "EUR"))
//!     .format("json");
//!
//! let month = "2024-03";
//! let Json(sums) = totals.call(Arguments::new().with("month", month), || {
//!     // expensive aggregation
//!     Ok::<_, std::io::Error>(Json(vec![120.5, 99.0]))
//! })?;
//! assert_eq!(sums.len(), 2);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Layout
//!
//! ```text
//! {output_base_path}/{function}/{function}_{timestamp}.resnap          metadata
//! {output_base_path}/{function}/{function}_{timestamp}.resnap.{format} artifact
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod factory;
pub mod fingerprint;
pub mod format;
pub mod metadata;
pub mod payload;
pub mod retention;
pub mod store;

pub use checkpoint::{CallContext, Checkpoint, Resnap};
pub use config::{Config, RemoteConfig, Services};
pub use error::{CallError, Error, Result};
pub use factory::ServiceFactory;
pub use fingerprint::{fingerprint, ArgValue, Arguments, BoundArguments, Fingerprint, Signature};
pub use metadata::{Metadata, Status, EXT};
pub use retention::{duration_ago, PruneReport, PruneScope, RetentionManager, RetentionPolicy, TimeUnit};
