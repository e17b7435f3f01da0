/// Method interception with non-recursive error reporting.
///
/// Every public method of an instrumented type is registered once in a
/// [`MethodRegistry`] and invoked through the handle it returns
/// ([`SyncMethod`] or [`AsyncMethod`]). The handle is a stable trampoline:
///
/// 1. If the receiver is already executing this method in the current call
///    chain, the call is a re-entry through the type-level handle. It returns
///    the re-entry value without running the original or reporting anything.
/// 2. Otherwise, if the registry has been instrumented, the receiver enters the
///    method's [`ExecutingSet`] for the duration of the original call and any
///    trackable error is handed to the sink before being returned unchanged.
/// 3. Uninstrumented methods call straight through.
///
/// Call chains are carried in a tokio task-local, so two independent calls on
/// the same instance (different tasks or threads) never see each other as
/// re-entry.
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use futures_util::future::BoxFuture;
use log::{debug, trace, warn};

use crate::errors::CdpError;

use super::event::{ErrorEventData, EventData};
use super::policy::Trackable;
use super::sink::{dispatch, dispatch_blocking, EventSink};

tokio::task_local! {
    static CALL_CHAIN: u64;
}

static NEXT_CHAIN: AtomicU64 = AtomicU64::new(1);

fn current_chain() -> Option<u64> {
    CALL_CHAIN.try_with(|chain| *chain).ok()
}

fn next_chain() -> u64 {
    NEXT_CHAIN.fetch_add(1, Ordering::Relaxed)
}

// ---------------------------------------------------------------------------
// Instance identity
// ---------------------------------------------------------------------------

/// Identity of a receiver: its address, never its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceKey(usize);

impl InstanceKey {
    /// `None` for zero-sized receivers, which share addresses and so have no
    /// identity of their own.
    pub fn of<R: ?Sized>(receiver: &R) -> Option<Self> {
        if std::mem::size_of_val(receiver) == 0 {
            return None;
        }
        Some(InstanceKey(receiver as *const R as *const () as usize))
    }
}

/// Receivers currently inside a call to one method.
///
/// Entries are keyed by instance identity and call chain. An entry only exists
/// while the receiver is borrowed by the call, so it never outlives the
/// instance and never keeps it alive.
#[derive(Debug, Default)]
pub struct ExecutingSet {
    members: DashSet<(InstanceKey, u64)>,
}

impl ExecutingSet {
    pub fn contains(&self, key: InstanceKey, chain: u64) -> bool {
        self.members.contains(&(key, chain))
    }

    fn enter(&self, key: InstanceKey, chain: u64) -> ExecutionGuard<'_> {
        self.members.insert((key, chain));
        ExecutionGuard {
            set: self,
            member: (key, chain),
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Removes its member on drop: normal return, error, panic or a dropped future.
struct ExecutionGuard<'a> {
    set: &'a ExecutingSet,
    member: (InstanceKey, u64),
}

impl Drop for ExecutionGuard<'_> {
    fn drop(&mut self) {
        self.set.members.remove(&self.member);
    }
}

// ---------------------------------------------------------------------------
// Re-entry values
// ---------------------------------------------------------------------------

/// Extracts the value a re-entrant call returns by default: its first
/// positional argument.
pub trait FirstArgument<T> {
    fn into_first(self) -> T;
}

impl<T> FirstArgument<T> for (T,) {
    fn into_first(self) -> T {
        self.0
    }
}

impl<T, B> FirstArgument<T> for (T, B) {
    fn into_first(self) -> T {
        self.0
    }
}

impl<T, B, C> FirstArgument<T> for (T, B, C) {
    fn into_first(self) -> T {
        self.0
    }
}

/// No arguments: re-entry yields `T::default()`.
impl<T: Default> FirstArgument<T> for () {
    fn into_first(self) -> T {
        T::default()
    }
}

type ReentryFn<A, T, E> = dyn Fn(A) -> Result<T, E> + Send + Sync;

/// Signature of a synchronous original.
pub type SyncFn<R, A, T, E> = dyn Fn(&R, A) -> Result<T, E> + Send + Sync;

/// Signature of an asynchronous original.
pub type AsyncFn<R, A, T, E> = dyn for<'a> Fn(&'a R, A) -> BoxFuture<'a, Result<T, E>> + Send + Sync;

// ---------------------------------------------------------------------------
// Error tracker
// ---------------------------------------------------------------------------

/// Classifies errors and hands trackable ones to a sink.
pub struct ErrorTracker<E> {
    sink: Arc<dyn EventSink>,
    policy: fn(&E) -> bool,
    timeout: Duration,
}

impl<E> Clone for ErrorTracker<E> {
    fn clone(&self) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
            policy: self.policy,
            timeout: self.timeout,
        }
    }
}

impl<E> fmt::Debug for ErrorTracker<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorTracker")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl<E: Trackable> ErrorTracker<E> {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self::with_policy(sink, <E as Trackable>::is_trackable)
    }
}

impl<E> ErrorTracker<E> {
    pub fn with_policy(sink: Arc<dyn EventSink>, policy: fn(&E) -> bool) -> Self {
        Self {
            sink,
            policy,
            timeout: Duration::from_secs(1),
        }
    }

    /// Upper bound on a single dispatch.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn should_track(&self, error: &E) -> bool {
        (self.policy)(error)
    }
}

impl<E: fmt::Display> ErrorTracker<E> {
    /// The event for `error`, or `None` when the policy ignores it.
    pub fn error_event(&self, method: &str, error: &E) -> Option<EventData> {
        if !self.should_track(error) {
            return None;
        }
        Some(EventData::Error(ErrorEventData {
            method: method.to_string(),
            message: error.to_string(),
            stack: capture_stack(),
        }))
    }

    /// Run `call` and report its error, if trackable. The result is returned
    /// unchanged.
    pub async fn observe<T, F>(&self, method: &str, call: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
    {
        let result = call.await;
        let event = result
            .as_ref()
            .err()
            .and_then(|error| self.error_event(method, error));
        if let Some(event) = event {
            debug!("analytics.report method={}", method);
            dispatch(self.sink.as_ref(), event, self.timeout).await;
        }
        result
    }

    /// Blocking counterpart of [`ErrorTracker::observe`].
    pub fn observe_blocking<T, F>(&self, method: &str, call: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let result = call();
        if let Some(event) = result
            .as_ref()
            .err()
            .and_then(|error| self.error_event(method, error))
        {
            debug!("analytics.report method={}", method);
            dispatch_blocking(Arc::clone(&self.sink), event, self.timeout);
        }
        result
    }
}

/// Captured regardless of `RUST_BACKTRACE`; `None` only on platforms without
/// unwinding support.
fn capture_stack() -> Option<String> {
    let backtrace = std::backtrace::Backtrace::force_capture();
    match backtrace.status() {
        std::backtrace::BacktraceStatus::Captured => Some(backtrace.to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Method slots
// ---------------------------------------------------------------------------

trait Instrument<E>: Send + Sync {
    fn attach(&self, tracker: &Arc<ErrorTracker<E>>);
    fn is_instrumented(&self) -> bool;
}

struct Slot<F: ?Sized, A, T, E> {
    name: &'static str,
    executing: ExecutingSet,
    tracker: OnceLock<Arc<ErrorTracker<E>>>,
    on_reentry: Box<ReentryFn<A, T, E>>,
    original: Box<F>,
}

impl<F, A, T, E> Slot<F, A, T, E>
where
    F: ?Sized,
{
    /// Re-entry check shared by both trampolines. `Err` carries the value to
    /// short-circuit with.
    fn check(&self, key: Option<InstanceKey>, args: A) -> Result<A, Result<T, E>> {
        if let (Some(key), Some(chain)) = (key, current_chain()) {
            if self.executing.contains(key, chain) {
                trace!("analytics.reentry method={}", self.name);
                return Err((self.on_reentry)(args));
            }
        }
        Ok(args)
    }
}

impl<F, A, T, E> Instrument<E> for Slot<F, A, T, E>
where
    F: ?Sized + Send + Sync,
    E: 'static,
{
    fn attach(&self, tracker: &Arc<ErrorTracker<E>>) {
        // A slot keeps the tracker from its first pass.
        let _ = self.tracker.set(Arc::clone(tracker));
    }

    fn is_instrumented(&self) -> bool {
        self.tracker.get().is_some()
    }
}

/// Handle to a registered synchronous method.
pub struct SyncMethod<R, A, T, E = CdpError> {
    slot: Arc<Slot<SyncFn<R, A, T, E>, A, T, E>>,
}

impl<R, A, T, E> fmt::Debug for SyncMethod<R, A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncMethod")
            .field("name", &self.slot.name)
            .field("instrumented", &self.slot.tracker.get().is_some())
            .field("executing", &self.slot.executing.len())
            .finish()
    }
}

impl<R, A, T, E> Clone for SyncMethod<R, A, T, E> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<R, A, T, E> SyncMethod<R, A, T, E>
where
    E: fmt::Display,
{
    pub fn name(&self) -> &'static str {
        self.slot.name
    }

    pub fn is_instrumented(&self) -> bool {
        self.slot.tracker.get().is_some()
    }

    /// Receivers currently inside this method.
    pub fn executing(&self) -> &ExecutingSet {
        &self.slot.executing
    }

    pub fn call(&self, receiver: &R, args: A) -> Result<T, E> {
        let slot = &self.slot;
        let key = InstanceKey::of(receiver);
        let args = match slot.check(key, args) {
            Ok(args) => args,
            Err(reentry) => return reentry,
        };

        let Some(tracker) = slot.tracker.get() else {
            return (slot.original)(receiver, args);
        };

        let chain = current_chain().unwrap_or_else(next_chain);
        let _guard = key.map(|key| slot.executing.enter(key, chain));
        tracker.observe_blocking(slot.name, || {
            CALL_CHAIN.sync_scope(chain, || (slot.original)(receiver, args))
        })
    }
}

/// Handle to a registered asynchronous method.
pub struct AsyncMethod<R, A, T, E = CdpError> {
    slot: Arc<Slot<AsyncFn<R, A, T, E>, A, T, E>>,
}

impl<R, A, T, E> fmt::Debug for AsyncMethod<R, A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncMethod")
            .field("name", &self.slot.name)
            .field("instrumented", &self.slot.tracker.get().is_some())
            .field("executing", &self.slot.executing.len())
            .finish()
    }
}

impl<R, A, T, E> Clone for AsyncMethod<R, A, T, E> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<R, A, T, E> AsyncMethod<R, A, T, E>
where
    R: Sync,
    A: Send,
    T: Send,
    E: fmt::Display + Send,
{
    pub fn name(&self) -> &'static str {
        self.slot.name
    }

    pub fn is_instrumented(&self) -> bool {
        self.slot.tracker.get().is_some()
    }

    /// Receivers currently inside this method.
    pub fn executing(&self) -> &ExecutingSet {
        &self.slot.executing
    }

    pub async fn call(&self, receiver: &R, args: A) -> Result<T, E> {
        let slot = &self.slot;
        let key = InstanceKey::of(receiver);
        let args = match slot.check(key, args) {
            Ok(args) => args,
            Err(reentry) => return reentry,
        };

        let Some(tracker) = slot.tracker.get() else {
            return (slot.original)(receiver, args).await;
        };

        let chain = current_chain().unwrap_or_else(next_chain);
        let _guard = key.map(|key| slot.executing.enter(key, chain));
        tracker
            .observe(slot.name, CALL_CHAIN.scope(chain, (slot.original)(receiver, args)))
            .await
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Per-type table of instrumentable methods.
///
/// Methods are registered explicitly, once each, and keep their canonical
/// original for the registry's lifetime. [`MethodRegistry::instrument`] may be
/// applied any number of times; every pass after the first is counted but
/// changes nothing.
pub struct MethodRegistry<R, E = CdpError> {
    type_name: &'static str,
    slots: DashMap<&'static str, Arc<dyn Instrument<E>>>,
    tracker: Arc<ErrorTracker<E>>,
    error_reporting: bool,
    layers: AtomicUsize,
    _receiver: PhantomData<fn(&R)>,
}

impl<R, E> fmt::Debug for MethodRegistry<R, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodRegistry")
            .field("type_name", &self.type_name)
            .field("methods", &self.slots.len())
            .field("error_reporting", &self.error_reporting)
            .field("layers", &self.layers.load(Ordering::Relaxed))
            .finish()
    }
}

impl<R, E> MethodRegistry<R, E>
where
    E: Trackable + 'static,
{
    /// A registry using the error type's own [`Trackable`] policy.
    pub fn new(type_name: &'static str, sink: Arc<dyn EventSink>) -> Self {
        Self::from_tracker(type_name, ErrorTracker::new(sink))
    }
}

impl<R, E> MethodRegistry<R, E>
where
    E: 'static,
{
    pub fn from_tracker(type_name: &'static str, tracker: ErrorTracker<E>) -> Self {
        Self {
            type_name,
            slots: DashMap::new(),
            tracker: Arc::new(tracker),
            error_reporting: true,
            layers: AtomicUsize::new(0),
            _receiver: PhantomData,
        }
    }

    /// Replace the tracking policy. Only affects later `instrument` passes.
    pub fn with_policy(mut self, policy: fn(&E) -> bool) -> Self {
        let mut tracker = (*self.tracker).clone();
        tracker.policy = policy;
        self.tracker = Arc::new(tracker);
        self
    }

    /// When `false`, [`MethodRegistry::instrument`] does nothing.
    pub fn error_reporting(mut self, enabled: bool) -> Self {
        self.error_reporting = enabled;
        self
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Number of `instrument` passes that took effect.
    pub fn layers(&self) -> usize {
        self.layers.load(Ordering::Relaxed)
    }

    pub fn method_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.slots.iter().map(|entry| *entry.key()).collect();
        names.sort_unstable();
        names
    }

    pub fn is_instrumented(&self, name: &str) -> bool {
        self.slots
            .get(name)
            .map(|slot| slot.is_instrumented())
            .unwrap_or(false)
    }

    /// Attach error tracking to every registered method.
    pub fn instrument(&self) -> &Self {
        if !self.error_reporting {
            debug!(
                "analytics.instrument type={} skipped=error_reporting_disabled",
                self.type_name
            );
            return self;
        }
        for slot in self.slots.iter() {
            slot.value().attach(&self.tracker);
        }
        let layers = self.layers.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(
            "analytics.instrument type={} methods={} layers={}",
            self.type_name,
            self.slots.len(),
            layers
        );
        self
    }

    /// Each name keeps exactly one original: a second registration is refused
    /// and the existing handle stays the canonical one.
    fn insert(&self, name: &'static str, slot: Arc<dyn Instrument<E>>) -> Result<(), CdpError> {
        match self.slots.entry(name) {
            Entry::Occupied(_) => {
                warn!(
                    "analytics.register type={} method={} duplicate=true",
                    self.type_name, name
                );
                Err(CdpError::Config(format!(
                    "Method {}::{} is already registered",
                    self.type_name, name
                )))
            }
            Entry::Vacant(entry) => {
                entry.insert(slot);
                Ok(())
            }
        }
    }
}

impl<R, E> MethodRegistry<R, E>
where
    R: 'static,
    E: 'static,
{
    /// Register a synchronous method that returns its first argument on re-entry.
    ///
    /// Fails with [`CdpError::Config`] when `name` is already registered.
    pub fn sync_method<A, T, F>(
        &self,
        name: &'static str,
        original: F,
    ) -> Result<SyncMethod<R, A, T, E>, CdpError>
    where
        A: FirstArgument<T> + 'static,
        T: 'static,
        F: Fn(&R, A) -> Result<T, E> + Send + Sync + 'static,
    {
        self.sync_method_with_reentry(name, original, |args: A| Ok(args.into_first()))
    }

    /// Register a synchronous method with a custom re-entry value.
    pub fn sync_method_with_reentry<A, T, F, G>(
        &self,
        name: &'static str,
        original: F,
        on_reentry: G,
    ) -> Result<SyncMethod<R, A, T, E>, CdpError>
    where
        A: 'static,
        T: 'static,
        F: Fn(&R, A) -> Result<T, E> + Send + Sync + 'static,
        G: Fn(A) -> Result<T, E> + Send + Sync + 'static,
    {
        let original: Box<SyncFn<R, A, T, E>> = Box::new(original);
        let slot = Arc::new(Slot {
            name,
            executing: ExecutingSet::default(),
            tracker: OnceLock::new(),
            on_reentry: Box::new(on_reentry),
            original,
        });
        self.insert(name, slot.clone())?;
        Ok(SyncMethod { slot })
    }

    /// Register an asynchronous method that returns its first argument on re-entry.
    pub fn async_method<A, T, F>(
        &self,
        name: &'static str,
        original: F,
    ) -> Result<AsyncMethod<R, A, T, E>, CdpError>
    where
        A: FirstArgument<T> + 'static,
        T: 'static,
        F: for<'a> Fn(&'a R, A) -> BoxFuture<'a, Result<T, E>> + Send + Sync + 'static,
    {
        self.async_method_with_reentry(name, original, |args: A| Ok(args.into_first()))
    }

    /// Register an asynchronous method with a custom re-entry value.
    pub fn async_method_with_reentry<A, T, F, G>(
        &self,
        name: &'static str,
        original: F,
        on_reentry: G,
    ) -> Result<AsyncMethod<R, A, T, E>, CdpError>
    where
        A: 'static,
        T: 'static,
        F: for<'a> Fn(&'a R, A) -> BoxFuture<'a, Result<T, E>> + Send + Sync + 'static,
        G: Fn(A) -> Result<T, E> + Send + Sync + 'static,
    {
        let original: Box<AsyncFn<R, A, T, E>> = Box::new(original);
        let slot = Arc::new(Slot {
            name,
            executing: ExecutingSet::default(),
            tracker: OnceLock::new(),
            on_reentry: Box::new(on_reentry),
            original,
        });
        self.insert(name, slot.clone())?;
        Ok(AsyncMethod { slot })
    }
}

/// Instrument every method in `registry` and hand it back.
pub fn instrument<R, E: 'static>(registry: &MethodRegistry<R, E>) -> &MethodRegistry<R, E> {
    registry.instrument()
}
