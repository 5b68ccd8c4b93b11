//! Deferred values: single-assignment placeholders for provisioned outputs.
//!
//! A [`Deferred`] stands for a value that only exists once a resource has been
//! provisioned, such as a generated identifier or an ARN. Declarations never
//! block on it. Instead they register a [`Deferred::transform`], which runs
//! exactly once when the source value arrives and yields a new `Deferred`.
//!
//! The write side is a [`Completer`]. It is handed to the driver when the
//! value is created and consumed by `resolve`/`fail`, so a value can be
//! assigned at most once.
//!
//! # Example
//!
//! ```
//! use stackdecl_lib::deferred::{Deferred, DeferredState, OutputRef};
//! use stackdecl_lib::resource::{ResourceType, Urn};
//!
//! let source = OutputRef::new(Urn::new(ResourceType::AwsS3Bucket, "logs"), "arn");
//! let (completer, arn) = Deferred::<String>::channel(source);
//! let objects = arn.transform(|arn| format!("{arn}/*"));
//!
//! completer.resolve("arn:aws:s3:::logs-1a2b3c4".to_string());
//! assert_eq!(objects.try_get().as_deref(), Some("arn:aws:s3:::logs-1a2b3c4/*"));
//! ```

use std::collections::BTreeSet;
use std::convert::Infallible;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Notify;

use crate::resource::Urn;

/// A reference to one output attribute of one resource.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OutputRef {
  pub urn: Urn,
  pub attr: String,
}

impl OutputRef {
  pub fn new(urn: Urn, attr: impl Into<String>) -> Self {
    Self { urn, attr: attr.into() }
  }
}

impl fmt::Display for OutputRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{}", self.urn, self.attr)
  }
}

/// Why a deferred value could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeferredError {
  #[error("transform failed: {0}")]
  Transform(String),

  #[error("{urn} did not report output '{attr}'")]
  MissingOutput { urn: Urn, attr: String },

  #[error("provisioning {urn} failed: {message}")]
  Provisioning { urn: Urn, message: String },
}

/// Snapshot of a deferred value's progress.
#[derive(Debug, Clone, PartialEq)]
pub enum DeferredState<T> {
  Pending,
  Resolved(T),
  Failed(DeferredError),
}

type Callback<T> = Box<dyn FnOnce(Result<T, DeferredError>) + Send>;

enum Slot<T> {
  Pending(Vec<Callback<T>>),
  Resolved(T),
  Failed(DeferredError),
}

struct Shared<T> {
  slot: Mutex<Slot<T>>,
  notify: Notify,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A value known only after provisioning.
///
/// Cloning a `Deferred` shares the same slot: every clone observes the same
/// resolution.
pub struct Deferred<T> {
  shared: Arc<Shared<T>>,
  sources: Arc<BTreeSet<OutputRef>>,
  origin: Option<OutputRef>,
}

impl<T> Clone for Deferred<T> {
  fn clone(&self) -> Self {
    Self {
      shared: Arc::clone(&self.shared),
      sources: Arc::clone(&self.sources),
      origin: self.origin.clone(),
    }
  }
}

impl<T: fmt::Debug> fmt::Debug for Deferred<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut out = f.debug_struct("Deferred");
    match &*lock(&self.shared.slot) {
      Slot::Pending(callbacks) => out.field("state", &"pending").field("callbacks", &callbacks.len()),
      Slot::Resolved(value) => out.field("value", value),
      Slot::Failed(err) => out.field("error", err),
    };
    out.field("sources", &self.sources).finish()
  }
}

impl<T> Deferred<T>
where
  T: Clone + Send + 'static,
{
  fn with_slot(slot: Slot<T>, sources: Arc<BTreeSet<OutputRef>>, origin: Option<OutputRef>) -> Self {
    Self {
      shared: Arc::new(Shared {
        slot: Mutex::new(slot),
        notify: Notify::new(),
      }),
      sources,
      origin,
    }
  }

  fn derived(sources: Arc<BTreeSet<OutputRef>>, origin: Option<OutputRef>) -> (Completer<T>, Self) {
    let deferred = Self::with_slot(Slot::Pending(Vec::new()), sources, origin);
    let completer = Completer {
      shared: Arc::clone(&deferred.shared),
    };
    (completer, deferred)
  }

  /// A value that is already resolved and depends on no resource.
  pub fn known(value: T) -> Self {
    Self::with_slot(Slot::Resolved(value), Arc::new(BTreeSet::new()), None)
  }

  /// A pending value for the output attribute `source`, plus its write end.
  pub fn channel(source: OutputRef) -> (Completer<T>, Self) {
    let sources = Arc::new(BTreeSet::from([source.clone()]));
    Self::derived(sources, Some(source))
  }

  /// The output attributes this value was derived from.
  pub fn sources(&self) -> &BTreeSet<OutputRef> {
    &self.sources
  }

  /// The attribute this value reads directly, if it is not a transform result.
  pub fn origin(&self) -> Option<&OutputRef> {
    self.origin.as_ref()
  }

  /// Mark a conversion of an attribute as still reading that attribute.
  pub(crate) fn with_origin(mut self, origin: Option<OutputRef>) -> Self {
    self.origin = origin;
    self
  }

  pub fn state(&self) -> DeferredState<T> {
    match &*lock(&self.shared.slot) {
      Slot::Pending(_) => DeferredState::Pending,
      Slot::Resolved(value) => DeferredState::Resolved(value.clone()),
      Slot::Failed(err) => DeferredState::Failed(err.clone()),
    }
  }

  /// The resolved value, or `None` while pending or after a failure.
  pub fn try_get(&self) -> Option<T> {
    match self.state() {
      DeferredState::Resolved(value) => Some(value),
      _ => None,
    }
  }

  pub fn is_pending(&self) -> bool {
    matches!(&*lock(&self.shared.slot), Slot::Pending(_))
  }

  /// Register `f` to run once this value resolves.
  ///
  /// `f` is invoked exactly once with the resolved value. If the value is
  /// already resolved it runs immediately. If this value fails, `f` never
  /// runs and the returned value fails with the same error.
  pub fn transform<U, F>(&self, f: F) -> Deferred<U>
  where
    U: Clone + Send + 'static,
    F: FnOnce(T) -> U + Send + 'static,
  {
    self.try_transform(move |value| Ok::<U, Infallible>(f(value)))
  }

  /// Like [`transform`](Self::transform), but `f` may fail.
  ///
  /// An `Err` from `f` fails the returned value with
  /// [`DeferredError::Transform`].
  pub fn try_transform<U, E, F>(&self, f: F) -> Deferred<U>
  where
    U: Clone + Send + 'static,
    E: fmt::Display,
    F: FnOnce(T) -> Result<U, E> + Send + 'static,
  {
    let (completer, child) = Deferred::derived(Arc::clone(&self.sources), None);
    self.on_complete(move |result| {
      let outcome = result.and_then(|value| f(value).map_err(|e| DeferredError::Transform(e.to_string())));
      completer.complete(outcome);
    });
    child
  }

  /// Combine several values into one that resolves when all of them have.
  ///
  /// The first failure fails the combined value.
  pub fn all(items: Vec<Deferred<T>>) -> Deferred<Vec<T>> {
    if items.is_empty() {
      return Deferred::known(Vec::new());
    }

    let sources: BTreeSet<OutputRef> = items.iter().flat_map(|d| d.sources.iter().cloned()).collect();
    let (completer, combined) = Deferred::derived(Arc::new(sources), None);

    let gather = Arc::new(Mutex::new(Gather {
      values: vec![None; items.len()],
      remaining: items.len(),
      completer: Some(completer),
    }));

    for (index, item) in items.iter().enumerate() {
      let gather = Arc::clone(&gather);
      item.on_complete(move |result| {
        let finished = {
          let mut state = lock(&gather);
          if state.completer.is_none() {
            return;
          }
          match result {
            Ok(value) => {
              state.values[index] = Some(value);
              state.remaining -= 1;
              if state.remaining == 0 {
                let values: Vec<T> = state.values.iter_mut().filter_map(Option::take).collect();
                state.completer.take().map(|c| (c, Ok(values)))
              } else {
                None
              }
            }
            Err(err) => state.completer.take().map(|c| (c, Err(err))),
          }
        };
        if let Some((completer, outcome)) = finished {
          completer.complete(outcome);
        }
      });
    }

    combined
  }

  /// Wait until the value is resolved or failed.
  pub async fn wait(&self) -> Result<T, DeferredError> {
    loop {
      let notified = self.shared.notify.notified();
      match self.state() {
        DeferredState::Resolved(value) => return Ok(value),
        DeferredState::Failed(err) => return Err(err),
        DeferredState::Pending => notified.await,
      }
    }
  }

  fn on_complete(&self, callback: impl FnOnce(Result<T, DeferredError>) + Send + 'static) {
    let mut slot = lock(&self.shared.slot);
    let ready = match &mut *slot {
      Slot::Pending(callbacks) => {
        callbacks.push(Box::new(callback));
        return;
      }
      Slot::Resolved(value) => Ok(value.clone()),
      Slot::Failed(err) => Err(err.clone()),
    };
    drop(slot);
    callback(ready);
  }
}

impl<T> Deferred<T>
where
  T: Serialize + Clone + Send + 'static,
{
  /// Re-type this value as JSON, keeping its origin attribute.
  pub fn into_value(&self) -> Deferred<serde_json::Value> {
    let (completer, child) = Deferred::derived(Arc::clone(&self.sources), self.origin.clone());
    self.on_complete(move |result| {
      let outcome = result.and_then(|value| serde_json::to_value(value).map_err(|e| DeferredError::Transform(e.to_string())));
      completer.complete(outcome);
    });
    child
  }
}

struct Gather<T> {
  values: Vec<Option<T>>,
  remaining: usize,
  completer: Option<Completer<Vec<T>>>,
}

/// The write-once end of a [`Deferred`].
pub struct Completer<T> {
  shared: Arc<Shared<T>>,
}

impl<T> fmt::Debug for Completer<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Completer").finish_non_exhaustive()
  }
}

impl<T> Completer<T>
where
  T: Clone + Send + 'static,
{
  pub fn resolve(self, value: T) {
    self.complete(Ok(value));
  }

  pub fn fail(self, error: DeferredError) {
    self.complete(Err(error));
  }

  fn complete(self, result: Result<T, DeferredError>) {
    let callbacks = {
      let mut slot = lock(&self.shared.slot);
      let next = match &result {
        Ok(value) => Slot::Resolved(value.clone()),
        Err(err) => Slot::Failed(err.clone()),
      };
      match std::mem::replace(&mut *slot, next) {
        Slot::Pending(callbacks) => callbacks,
        // A completer is unique per slot, so the slot is always pending here.
        Slot::Resolved(_) | Slot::Failed(_) => Vec::new(),
      }
    };

    self.shared.notify.notify_waiters();

    for callback in callbacks {
      callback(result.clone());
    }
  }
}
