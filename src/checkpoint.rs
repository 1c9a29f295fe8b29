//! Checkpoint orchestrator
//!
//! Per invocation:
//!
//! ```text
//! INVOKED -> FINGERPRINT -> LOOKUP -> HIT  -> REPLAY -> RETURN
//!                                  -> MISS -> EXECUTE -> Ok  -> PERSIST_SUCCESS -> RETURN
//!                                                     -> Err -> PERSIST_FAILURE -> RETURN Err
//! ```
//!
//! Expired history is pruned before the lookup, so a record never
//! satisfies the lookup of the pass that expires it. The computation's own
//! error is always handed back unchanged as [`CallError::Computation`];
//! engine failures surface as [`CallError::Checkpoint`].
//!
//! Nothing serializes concurrent calls with the same fingerprint: both may
//! miss, execute and persist. The artifact is written before its metadata
//! and lookups prefer the newest success, so history converges on the last
//! write.
//!
//! ```rust,no_run
//! use resnap::{Arguments, Config, Resnap, Signature};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let resnap = Resnap::new(Config::load()?);
//! let square = resnap
//!     .checkpoint("square")
//!     .signature(Signature::new().param("x"))
//!     .format("json");
//!
//! let x = 12_i64;
//! let value: i64 = square.call(Arguments::new().with("x", x), || {
//!     Ok::<_, std::convert::Infallible>(x * x)
//! })?;
//! assert_eq!(value, 144);
//! # Ok(())
//! # }
//! ```

use crate::config::Config;
use crate::error::CallError;
use crate::factory::ServiceFactory;
use crate::fingerprint::{fingerprint, Arguments, BoundArguments, Fingerprint, Signature};
use crate::format::{FormatCodec, FormatRegistry};
use crate::payload::{FromPayload, IntoPayload, Payload};
use crate::retention::{PruneScope, RetentionManager};
use crate::store::{Attempt, MetadataStore};
use crate::{Error, Result};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// Format recorded for a failed attempt of a checkpoint without an
/// explicit format
pub const UNSPECIFIED_FORMAT: &str = "unspecified";

struct Inner {
    config: Config,
    factory: ServiceFactory,
    formats: FormatRegistry,
}

/// Checkpoint engine: configuration, backend factory and format registry.
///
/// Cheap to clone; clones share the same factory, so a backend override
/// applies to all of them.
#[derive(Clone)]
pub struct Resnap {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Resnap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resnap")
            .field("config", &self.inner.config)
            .field("factory", &self.inner.factory)
            .field("formats", &self.inner.formats.names())
            .finish()
    }
}

impl Resnap {
    /// Engine with the built-in formats and a factory for `config`
    #[must_use]
    pub fn new(config: Config) -> Self {
        let factory = ServiceFactory::new(config.clone());
        Self::with_parts(factory, FormatRegistry::new())
    }

    /// Engine from an existing factory and registry.
    ///
    /// The configuration is the factory's.
    #[must_use]
    pub fn with_parts(factory: ServiceFactory, formats: FormatRegistry) -> Self {
        Self {
            inner: Arc::new(Inner {
                config: factory.config().clone(),
                factory,
                formats,
            }),
        }
    }

    /// Engine configured from the working directory's manifests.
    ///
    /// # Errors
    /// Returns `Configuration` if a manifest section is invalid
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(Config::load()?))
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Backend factory (override and reset live here)
    #[must_use]
    pub fn factory(&self) -> &ServiceFactory {
        &self.inner.factory
    }

    /// Registered result formats
    #[must_use]
    pub fn formats(&self) -> &FormatRegistry {
        &self.inner.formats
    }

    /// Metadata store over the active backend.
    ///
    /// # Errors
    /// Returns the factory's error if no backend can be resolved
    pub fn store(&self) -> Result<MetadataStore> {
        Ok(MetadataStore::new(
            self.inner.factory.backend()?,
            self.inner.config.output_base_path.clone(),
        ))
    }

    /// Retention manager over the active backend.
    ///
    /// # Errors
    /// Returns the factory's error if no backend can be resolved
    pub fn retention(&self) -> Result<RetentionManager> {
        Ok(RetentionManager::new(
            self.inner.factory.backend()?,
            self.inner.config.output_base_path.clone(),
            self.inner.config.retention(),
        ))
    }

    /// Start configuring a checkpoint for `function_name`
    #[must_use]
    pub fn checkpoint(&self, function_name: impl Into<String>) -> Checkpoint {
        Checkpoint::new(self.clone(), function_name)
    }
}

/// Handle passed to a computation to annotate its own record.
///
/// Entries end up in the `extra_metadata` of the record written for the
/// attempt, success or failure.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    extra: Arc<Mutex<serde_json::Map<String, serde_json::Value>>>,
}

impl CallContext {
    /// Attach a metadata entry, replacing an earlier one with the same key
    pub fn add_metadata(&self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.extra
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }

    fn take(&self) -> serde_json::Map<String, serde_json::Value> {
        std::mem::take(&mut *self.extra.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Result of the blocking steps before execution
struct Prepared {
    store: MetadataStore,
    fingerprint: Fingerprint,
    replay: Option<Payload>,
}

/// A checkpointed function: name plus options.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    engine: Resnap,
    function_name: String,
    signature: Option<Signature>,
    format: Option<String>,
    output_folder: Option<String>,
    ignored: Vec<String>,
    enable_recovery: bool,
    consider_args: bool,
}

impl Checkpoint {
    fn new(engine: Resnap, function_name: impl Into<String>) -> Self {
        Self {
            engine,
            function_name: function_name.into(),
            signature: None,
            format: None,
            output_folder: None,
            ignored: Vec::new(),
            enable_recovery: true,
            consider_args: true,
        }
    }

    /// Declared parameters; call arguments are bound against them
    #[must_use]
    pub fn signature(mut self, signature: Signature) -> Self {
        self.signature = Some(signature);
        self
    }

    /// Result format (a registered name). Defaults per result kind.
    #[must_use]
    pub fn format(mut self, name: impl Into<String>) -> Self {
        self.format = Some(name.into());
        self
    }

    /// Folder under the output base path (defaults to the function name)
    #[must_use]
    pub fn output_folder(mut self, folder: impl Into<String>) -> Self {
        self.output_folder = Some(folder.into());
        self
    }

    /// Exclude a parameter from the fingerprint
    #[must_use]
    pub fn ignore(mut self, param: impl Into<String>) -> Self {
        self.ignored.push(param.into());
        self
    }

    /// When false the lookup is skipped and the computation always runs
    #[must_use]
    pub const fn enable_recovery(mut self, enable: bool) -> Self {
        self.enable_recovery = enable;
        self
    }

    /// When false every call shares the fingerprint of no arguments
    #[must_use]
    pub const fn consider_args(mut self, consider: bool) -> Self {
        self.consider_args = consider;
        self
    }

    /// Checkpointed function name
    #[must_use]
    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    /// Folder holding this function's records
    #[must_use]
    pub fn folder(&self) -> &str {
        self.output_folder.as_deref().unwrap_or(&self.function_name)
    }

    /// Bind arguments the way a call does, ignored parameters removed.
    ///
    /// # Errors
    /// Returns `Binding` if the arguments do not fit the signature
    pub fn bind(&self, args: Arguments) -> Result<BoundArguments> {
        if !self.consider_args {
            return Ok(BoundArguments::default());
        }
        let bound = match &self.signature {
            Some(signature) => signature.bind(&args)?,
            None => args.into_bound(),
        };
        Ok(bound.without(&self.ignored))
    }

    /// Fingerprint a call with `args` would be stored under.
    ///
    /// # Errors
    /// Returns `Binding` or `Serialization` errors
    pub fn fingerprint(&self, args: Arguments) -> Result<Fingerprint> {
        fingerprint(&self.bind(args)?)
    }

    /// Run `compute` through the checkpoint.
    ///
    /// # Errors
    /// `Computation` carries the computation's own error; `Checkpoint`
    /// means the engine could not bind, read or write
    pub fn call<T, E, F>(&self, args: Arguments, compute: F) -> std::result::Result<T, CallError<E>>
    where
        T: IntoPayload + FromPayload,
        F: FnOnce() -> std::result::Result<T, E>,
    {
        self.call_with_context(args, |_| compute())
    }

    /// [`call`](Self::call) with a [`CallContext`] for extra metadata.
    ///
    /// # Errors
    /// As [`call`](Self::call)
    pub fn call_with_context<T, E, F>(
        &self,
        args: Arguments,
        compute: F,
    ) -> std::result::Result<T, CallError<E>>
    where
        T: IntoPayload + FromPayload,
        F: FnOnce(&CallContext) -> std::result::Result<T, E>,
    {
        let context = CallContext::default();
        if !self.engine.config().enabled {
            return compute(&context).map_err(CallError::Computation);
        }

        let prepared = self.prepare(args)?;
        if let Some(value) = prepared.replay.and_then(|payload| self.restore(payload)) {
            return Ok(value);
        }

        match compute(&context) {
            Ok(value) => {
                let payload = value.to_payload()?;
                self.persist_success(&prepared.store, &prepared.fingerprint, &payload, context.take())?;
                Ok(value)
            }
            Err(e) => {
                self.persist_failure(&prepared.store, &prepared.fingerprint, context.take());
                Err(CallError::Computation(e))
            }
        }
    }

    /// Run an async computation through the checkpoint.
    ///
    /// Storage steps run on the blocking pool; only the computation runs on
    /// the caller's task.
    ///
    /// # Errors
    /// As [`call`](Self::call)
    pub async fn call_async<T, E, F, Fut>(
        &self,
        args: Arguments,
        compute: F,
    ) -> std::result::Result<T, CallError<E>>
    where
        T: IntoPayload + FromPayload,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        self.call_async_with_context(args, |_| compute()).await
    }

    /// [`call_async`](Self::call_async) with a [`CallContext`].
    ///
    /// # Errors
    /// As [`call`](Self::call)
    pub async fn call_async_with_context<T, E, F, Fut>(
        &self,
        args: Arguments,
        compute: F,
    ) -> std::result::Result<T, CallError<E>>
    where
        T: IntoPayload + FromPayload,
        F: FnOnce(CallContext) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let context = CallContext::default();
        if !self.engine.config().enabled {
            return compute(context).await.map_err(CallError::Computation);
        }

        let this = self.clone();
        let prepared = blocking(move || this.prepare(args)).await?;
        if let Some(value) = prepared.replay.and_then(|payload| self.restore(payload)) {
            return Ok(value);
        }

        match compute(context.clone()).await {
            Ok(value) => {
                let payload = value.to_payload()?;
                let this = self.clone();
                let extra = context.take();
                blocking(move || {
                    this.persist_success(&prepared.store, &prepared.fingerprint, &payload, extra)
                })
                .await?;
                Ok(value)
            }
            Err(e) => {
                let this = self.clone();
                let extra = context.take();
                let persisted = blocking(move || {
                    this.persist_failure(&prepared.store, &prepared.fingerprint, extra);
                    Ok(())
                })
                .await;
                if let Err(join) = persisted {
                    warn!(function = %self.function_name, error = %join, "Failure record task did not complete");
                }
                Err(CallError::Computation(e))
            }
        }
    }

    fn codec(&self, name: &str) -> Result<&FormatCodec> {
        self.engine.formats().get(name)
    }

    /// Blocking steps up to the hit/miss decision
    fn prepare(&self, args: Arguments) -> Result<Prepared> {
        if let Some(name) = &self.format {
            self.codec(name)?;
        }
        let store = self.engine.store()?;

        let report = self.engine.retention()?.prune(PruneScope::All)?;
        if report.deleted_files > 0 {
            debug!(
                deleted = report.deleted_files,
                folders = report.removed_folders,
                "Pruned expired checkpoints"
            );
        }

        let fingerprint = self.fingerprint(args)?;
        let replay = if self.enable_recovery {
            self.replay(&store, &fingerprint)?
        } else {
            None
        };
        Ok(Prepared {
            store,
            fingerprint,
            replay,
        })
    }

    fn replay(&self, store: &MetadataStore, fingerprint: &Fingerprint) -> Result<Option<Payload>> {
        let Some(record) = store.lookup_in(&self.function_name, self.folder(), fingerprint)? else {
            debug!(function = %self.function_name, %fingerprint, "Checkpoint miss");
            return Ok(None);
        };
        let codec = match self.codec(record.result_format()) {
            Ok(codec) => codec,
            Err(e) => {
                warn!(
                    function = %self.function_name,
                    %fingerprint,
                    error = %e,
                    "Checkpoint format no longer registered, recomputing"
                );
                return Ok(None);
            }
        };
        match store.read_result(&record, codec) {
            Ok(payload) => {
                debug!(
                    function = %self.function_name,
                    %fingerprint,
                    timestamp = %record.timestamp(),
                    "Checkpoint hit"
                );
                Ok(Some(payload))
            }
            Err(e) if e.is_not_found() => {
                warn!(
                    function = %self.function_name,
                    %fingerprint,
                    error = %e,
                    "Checkpoint artifact missing, recomputing"
                );
                Ok(None)
            }
            Err(e @ (Error::Backend(_) | Error::Io(_))) => Err(e),
            Err(e) => {
                warn!(
                    function = %self.function_name,
                    %fingerprint,
                    error = %e,
                    "Checkpoint artifact unreadable, recomputing"
                );
                Ok(None)
            }
        }
    }

    /// Rebuild the caller's type from a replayed payload; `None` recomputes
    fn restore<T: FromPayload>(&self, payload: Payload) -> Option<T> {
        match T::from_payload(payload) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(
                    function = %self.function_name,
                    error = %e,
                    "Checkpoint result does not match the return type, recomputing"
                );
                None
            }
        }
    }

    fn persist_success(
        &self,
        store: &MetadataStore,
        fingerprint: &Fingerprint,
        payload: &Payload,
        extra: serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        let name = self.format.as_deref().unwrap_or_else(|| payload.default_format());
        let codec = self.codec(name)?;
        let encoded = codec.encode(payload)?;
        store.record(
            &self.function_name,
            self.folder(),
            fingerprint,
            Attempt::Success {
                codec,
                encoded: &encoded,
            },
            extra,
        )?;
        Ok(())
    }

    fn persist_failure(
        &self,
        store: &MetadataStore,
        fingerprint: &Fingerprint,
        extra: serde_json::Map<String, serde_json::Value>,
    ) {
        let format = self.format.as_deref().unwrap_or(UNSPECIFIED_FORMAT);
        if let Err(e) = store.record(
            &self.function_name,
            self.folder(),
            fingerprint,
            Attempt::Failure { format },
            extra,
        ) {
            warn!(
                function = %self.function_name,
                %fingerprint,
                error = %e,
                "Could not record failed attempt"
            );
        }
    }
}

async fn blocking<R, F>(work: F) -> Result<R>
where
    F: FnOnce() -> Result<R> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::Other(format!("checkpoint storage task failed: {e}")))?
}
