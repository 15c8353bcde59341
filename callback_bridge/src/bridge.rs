use std::{
    future::Future,
    panic::{AssertUnwindSafe, catch_unwind, resume_unwind},
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use log::{debug, warn};
use ractor::{ActorRef, SpawnErr, concurrency::JoinHandle};
use static_assertions::assert_impl_all;
use tokio::sync::oneshot;

use crate::{
    config::BridgeConfig,
    dispatcher::{DispatchStats, Dispatcher, DispatcherMessage, start_dispatcher_actor},
    error::{BridgeError, DecodeError},
    error_code::ErrorCode,
    handle::Handle,
    payload::RawPayload,
    registry::{PendingOperation, PendingRegistry, RawOutcome},
    trampoline::{self, ErrorDetailsFn, TrampolineError, TrampolineRoute},
    translate::{FailureChannel, SUCCESS, translate},
};

// -------------------------------------------------------------------------------------------------------

type BoxedDecoder<T> = Box<dyn FnOnce(RawPayload) -> Result<T, DecodeError> + Send>;

/// Turns "call now, get the result through a callback later" native entry
/// points into futures.
///
/// Every bridge owns its registry explicitly; nothing here is process-global
/// except the C trampolines, which have to be bound to one dispatcher (see
/// [`AsyncBridge::bind_trampolines`]).
pub struct AsyncBridge {
    config: BridgeConfig,
    registry: Arc<PendingRegistry>,
    dispatcher: Dispatcher,
    error_details: Option<ErrorDetailsFn>,
}

assert_impl_all!(AsyncBridge: Send, Sync);
assert_impl_all!(PendingRegistry: Send, Sync);
assert_impl_all!(Dispatcher: Send, Sync, Clone);

impl AsyncBridge {
    pub fn new(config: BridgeConfig) -> Self {
        let registry = Arc::new(PendingRegistry::with_first_handle(config.first_handle));
        Self::with_registry(config, registry)
    }

    /// Build a bridge around an existing registry. Handles are drawn from the
    /// registry's counter, `config.first_handle` is not used.
    pub fn with_registry(config: BridgeConfig, registry: Arc<PendingRegistry>) -> Self {
        let dispatcher = Dispatcher::new(registry.clone());
        AsyncBridge {
            config,
            registry,
            dispatcher,
            error_details: None,
        }
    }

    /// Read the native library's error details (message and backtrace) whenever
    /// a call is rejected synchronously.
    pub fn with_error_details(mut self, hook: ErrorDetailsFn) -> Self {
        self.error_details = Some(hook);
        self
    }

    /// Issue a native call and return a future for its callback's result.
    ///
    /// `native_call` receives the correlation handle, must pass it (and one of
    /// the trampolines) to the native entry point, and returns the entry
    /// point's immediate status. The operation is registered before
    /// `native_call` runs, so a callback that fires before the entry point
    /// returns still finds it.
    ///
    /// A non-zero immediate status resolves the returned future right away
    /// with [`BridgeError::ImmediateRejection`] and the handle is no longer
    /// registered when `submit` returns.
    pub fn submit<T, F, D>(&self, native_call: F, decoder: D) -> PendingResult<T>
    where
        F: FnOnce(Handle) -> i32,
        D: FnOnce(RawPayload) -> Result<T, DecodeError> + Send + 'static,
    {
        let handle = self.registry.allocate();
        let (operation, receiver) = PendingOperation::new(handle);
        self.registry.insert(operation);

        debug!("Submitting native call {}", handle);

        let status = match catch_unwind(AssertUnwindSafe(|| native_call(handle))) {
            Ok(status) => status,
            Err(panic) => {
                self.registry.remove(handle);
                resume_unwind(panic);
            }
        };

        if status != SUCCESS {
            // this operation will never be delivered through the dispatcher
            if self.registry.remove(handle).is_none() {
                warn!(
                    "Native call {} was rejected with {} although a callback already arrived for it",
                    handle, status
                );
            }

            let details = self.error_details.and_then(trampoline::read_error_details);
            let code = ErrorCode::lookup(status);
            warn!("Native call {} was rejected immediately: {}", handle, code);

            return PendingResult::ready(
                handle,
                Err(BridgeError::ImmediateRejection {
                    handle,
                    code,
                    raw: status,
                    details,
                }),
            );
        }

        PendingResult::waiting(
            handle,
            receiver,
            Box::new(decoder),
            self.config.default_timeout(),
        )
    }

    /// `submit`, then await the result, giving up after the configured default timeout.
    pub async fn call<T, F, D>(&self, native_call: F, decoder: D) -> Result<T, BridgeError>
    where
        F: FnOnce(Handle) -> i32,
        D: FnOnce(RawPayload) -> Result<T, DecodeError> + Send + 'static,
    {
        let pending = self.submit(native_call, decoder);
        match self.config.default_timeout() {
            Some(after) => pending.with_timeout(after).await,
            None => pending.await,
        }
    }

    /// Stop tracking a pending operation. A callback that still arrives for it
    /// is treated as an orphan, and whoever awaits it sees [`BridgeError::Abandoned`].
    /// Returns `false` if the handle was not pending.
    pub fn abandon(&self, handle: Handle) -> bool {
        let abandoned = self.registry.remove(handle).is_some();
        if abandoned {
            debug!("Abandoned native call {}", handle);
        }
        abandoned
    }

    pub fn is_pending(&self, handle: Handle) -> bool {
        self.registry.contains(handle)
    }

    pub fn pending_count(&self) -> usize {
        self.registry.len()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn registry(&self) -> &Arc<PendingRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Start a dispatcher actor that resolves this bridge's operations.
    pub async fn spawn_dispatcher_actor(
        &self,
    ) -> Result<(ActorRef<DispatcherMessage>, JoinHandle<()>), SpawnErr> {
        start_dispatcher_actor(self.dispatcher.clone()).await
    }

    /// Bind the C trampolines to this bridge's dispatcher. Callbacks are
    /// resolved directly on the native thread that delivers them.
    pub fn bind_trampolines(&self) -> Result<(), TrampolineError> {
        trampoline::install(
            TrampolineRoute::Direct(self.dispatcher.clone()),
            self.error_details,
        )
    }

    /// Bind the C trampolines to a new dispatcher actor. Native threads only
    /// enqueue deliveries; resolution happens on the async runtime.
    pub async fn bind_trampolines_via_actor(
        &self,
    ) -> Result<(ActorRef<DispatcherMessage>, JoinHandle<()>), anyhow::Error> {
        let (actor, join_handle) = self.spawn_dispatcher_actor().await?;
        if let Err(err) = trampoline::install(TrampolineRoute::Actor(actor.clone()), self.error_details)
        {
            actor.stop(Some("trampolines already bound".to_string()));
            return Err(err.into());
        }
        Ok((actor, join_handle))
    }
}

// -------------------------------------------------------------------------------------------------------

/// The eventual result of a submitted native call.
///
/// Dropping it only stops waiting; the native operation keeps running and its
/// callback still clears the registry entry.
pub struct PendingResult<T> {
    handle: Handle,
    default_timeout: Option<Duration>,
    state: PendingState<T>,
}

enum PendingState<T> {
    Ready(Option<Result<T, BridgeError>>),
    Waiting {
        receiver: oneshot::Receiver<RawOutcome>,
        decoder: Option<BoxedDecoder<T>>,
    },
}

// nothing is ever pinned through a PendingResult
impl<T> Unpin for PendingResult<T> {}

impl<T> PendingResult<T> {
    fn ready(handle: Handle, result: Result<T, BridgeError>) -> Self {
        PendingResult {
            handle,
            default_timeout: None,
            state: PendingState::Ready(Some(result)),
        }
    }

    fn waiting(
        handle: Handle,
        receiver: oneshot::Receiver<RawOutcome>,
        decoder: BoxedDecoder<T>,
        default_timeout: Option<Duration>,
    ) -> Self {
        PendingResult {
            handle,
            default_timeout,
            state: PendingState::Waiting {
                receiver,
                decoder: Some(decoder),
            },
        }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// `true` once the result can be taken without waiting.
    pub fn is_resolved(&self) -> bool {
        matches!(self.state, PendingState::Ready(Some(_)))
    }

    /// Wait at most `after`. Timing out abandons only the wait, the operation
    /// stays registered until its callback arrives.
    ///
    /// Requires a tokio runtime with the time driver enabled.
    pub async fn with_timeout(self, after: Duration) -> Result<T, BridgeError> {
        let handle = self.handle;
        match tokio::time::timeout(after, self).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Timed out after {:?} waiting for native call {}", after, handle);
                Err(BridgeError::Timeout { handle, after })
            }
        }
    }

    /// Block the current thread until the result arrives, honoring the
    /// bridge's default timeout. For synchronous call-sites; must not be
    /// called from inside an async runtime.
    pub fn wait(self) -> Result<T, BridgeError> {
        let Some(after) = self.default_timeout else {
            return futures::executor::block_on(self);
        };

        match tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
        {
            Ok(runtime) => runtime.block_on(self.with_timeout(after)),
            Err(err) => {
                warn!(
                    "Could not build a timer runtime ({}), waiting for {} without timeout",
                    err, self.handle
                );
                futures::executor::block_on(self)
            }
        }
    }
}

impl<T> Future for PendingResult<T> {
    type Output = Result<T, BridgeError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let handle = this.handle;

        let result = match &mut this.state {
            PendingState::Ready(result) => {
                return Poll::Ready(result.take().expect("PendingResult polled after completion"));
            }
            PendingState::Waiting { receiver, decoder } => match Pin::new(receiver).poll(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Err(_)) => Err(BridgeError::Abandoned { handle }),
                Poll::Ready(Ok(outcome)) => {
                    let decoder = decoder
                        .take()
                        .expect("PendingResult polled after completion");
                    translate(outcome.error_code, outcome.payload, decoder).map_err(|err| {
                        err.into_bridge_error(handle, FailureChannel::Callback, outcome.details)
                    })
                }
            },
        };

        this.state = PendingState::Ready(None);
        Poll::Ready(result)
    }
}

// -------------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------------

#[cfg(test)]
mod bridge_tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{
        dispatcher::CallbackDelivery,
        payload::{PayloadField, decode},
    };

    fn string_payload(s: &str) -> RawPayload {
        RawPayload::new(vec![PayloadField::Str(Some(s.to_string()))])
    }

    #[tokio::test]
    async fn callback_success_resolves_future() {
        let bridge = AsyncBridge::new(BridgeConfig::default());
        let captured = Mutex::new(None);

        let pending = bridge.submit(
            |handle| {
                *captured.lock().unwrap() = Some(handle);
                0
            },
            decode::string,
        );
        let handle = captured.lock().unwrap().unwrap();
        assert_eq!(pending.handle(), handle);
        assert!(bridge.is_pending(handle));

        let dispatcher = bridge.dispatcher().clone();
        std::thread::spawn(move || {
            dispatcher.dispatch(CallbackDelivery::new(handle, 0, string_payload("payload")));
        });

        assert_eq!(pending.await.unwrap(), "payload");
        assert!(!bridge.is_pending(handle));
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test]
    async fn callback_failure_is_async_failure() {
        let bridge = AsyncBridge::new(BridgeConfig::default());
        let pending = bridge.submit(|_| 0, decode::unit);
        let handle = pending.handle();

        bridge
            .dispatcher()
            .dispatch(CallbackDelivery::new(handle, 113, RawPayload::empty()));

        match pending.await {
            Err(BridgeError::AsyncFailure { raw, code, .. }) => {
                assert_eq!(raw, 113);
                assert_eq!(code, ErrorCode::CommonInvalidStructure);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(!bridge.is_pending(handle));
    }

    #[test]
    fn immediate_rejection_resolves_without_callback() {
        let bridge = AsyncBridge::new(BridgeConfig::default());
        let pending = bridge.submit(|_| 100, decode::string);
        let handle = pending.handle();

        // gone before anyone waits
        assert!(!bridge.is_pending(handle));
        assert!(bridge.registry().is_empty());
        assert!(pending.is_resolved());

        match pending.wait() {
            Err(err @ BridgeError::ImmediateRejection { .. }) => {
                assert_eq!(err.raw_code(), Some(100));
                assert_eq!(err.native_code(), Some(ErrorCode::CommonInvalidParam1));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn synchronous_callback_is_not_an_orphan() {
        let bridge = AsyncBridge::new(BridgeConfig::default());
        let dispatcher = bridge.dispatcher().clone();

        // the native side calls back before its entry point returns
        let pending = bridge.submit(
            |handle| {
                dispatcher.dispatch(CallbackDelivery::new(
                    handle,
                    0,
                    RawPayload::new(vec![PayloadField::I32(17)]),
                ));
                0
            },
            decode::int,
        );

        assert_eq!(pending.wait().unwrap(), 17);
        assert_eq!(bridge.stats().orphaned, 0);
        assert!(bridge.registry().is_empty());
    }

    #[test]
    fn decode_failure_is_reported() {
        let bridge = AsyncBridge::new(BridgeConfig::default());
        let pending = bridge.submit(|_| 0, decode::int);
        bridge
            .dispatcher()
            .dispatch(CallbackDelivery::new(pending.handle(), 0, string_payload("x")));

        assert!(matches!(pending.wait(), Err(BridgeError::Decode { .. })));
    }

    #[test]
    fn abandoned_operation() {
        let bridge = AsyncBridge::new(BridgeConfig::default());
        let pending = bridge.submit(|_| 0, decode::unit);
        let handle = pending.handle();

        assert!(bridge.abandon(handle));
        assert!(!bridge.abandon(handle));
        assert!(matches!(pending.wait(), Err(BridgeError::Abandoned { .. })));

        // the late callback is an orphan now
        bridge
            .dispatcher()
            .dispatch(CallbackDelivery::new(handle, 0, RawPayload::empty()));
        assert_eq!(bridge.stats().orphaned, 1);
    }

    #[tokio::test]
    async fn timeout_only_stops_waiting() {
        let bridge = AsyncBridge::new(BridgeConfig::default());
        let pending = bridge.submit(|_| 0, decode::unit);
        let handle = pending.handle();

        let result = pending.with_timeout(Duration::from_millis(20)).await;
        assert!(matches!(result, Err(BridgeError::Timeout { .. })));

        // still registered, the native operation was not cancelled
        assert!(bridge.is_pending(handle));

        bridge
            .dispatcher()
            .dispatch(CallbackDelivery::new(handle, 0, RawPayload::empty()));
        assert!(!bridge.is_pending(handle));
        assert_eq!(bridge.stats().caller_gone, 1);
    }

    #[tokio::test]
    async fn call_applies_default_timeout() {
        let config = BridgeConfig {
            default_timeout_ms: Some(20),
            ..BridgeConfig::default()
        };
        let bridge = AsyncBridge::new(config);

        let result = bridge.call(|_| 0, decode::unit).await;
        assert!(matches!(result, Err(BridgeError::Timeout { .. })));
        assert_eq!(bridge.pending_count(), 1);
    }

    #[test]
    fn bridges_sharing_a_registry_never_collide() {
        let registry = Arc::new(PendingRegistry::new());
        let first = AsyncBridge::with_registry(BridgeConfig::default(), registry.clone());
        let second = AsyncBridge::with_registry(BridgeConfig::default(), registry.clone());

        let a = first.submit(|_| 0, decode::unit);
        let b = second.submit(|_| 0, decode::unit);
        assert_ne!(a.handle(), b.handle());
        assert_eq!(registry.len(), 2);

        // either dispatcher resolves operations submitted through the other bridge
        second
            .dispatcher()
            .dispatch(CallbackDelivery::new(a.handle(), 0, RawPayload::empty()));
        first
            .dispatcher()
            .dispatch(CallbackDelivery::new(b.handle(), 0, RawPayload::empty()));
        assert!(a.wait().is_ok());
        assert!(b.wait().is_ok());
        assert!(registry.is_empty());
    }

    #[test]
    fn panicking_native_call_leaves_no_entry() {
        let bridge = AsyncBridge::new(BridgeConfig::default());
        let result = catch_unwind(AssertUnwindSafe(|| {
            bridge.submit(|_| -> i32 { panic!("native call blew up") }, decode::unit)
        }));

        assert!(result.is_err());
        assert!(bridge.registry().is_empty());
    }

    #[test]
    fn many_threads_share_one_bridge() {
        let bridge = Arc::new(AsyncBridge::new(BridgeConfig::default()));

        let workers: Vec<_> = (0..8)
            .map(|worker| {
                let bridge = bridge.clone();
                std::thread::spawn(move || {
                    (0..100)
                        .map(|i| {
                            let dispatcher = bridge.dispatcher().clone();
                            let value = worker * 1000 + i;
                            let pending = bridge.submit(
                                move |handle| {
                                    std::thread::spawn(move || {
                                        dispatcher.dispatch(CallbackDelivery::new(
                                            handle,
                                            0,
                                            RawPayload::new(vec![PayloadField::I32(value)]),
                                        ));
                                    });
                                    0
                                },
                                decode::int,
                            );
                            assert_eq!(pending.wait().unwrap(), value);
                        })
                        .count()
                })
            })
            .collect();

        let completed: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();
        assert_eq!(completed, 800);
        assert!(bridge.registry().is_empty());
        assert_eq!(bridge.stats().resolved, 800);
    }
}
