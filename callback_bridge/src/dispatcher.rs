use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use anyhow::anyhow;
use log::{debug, error, info, warn};
use ractor::{
    Actor, ActorProcessingErr, ActorRef, RpcReplyPort, SpawnErr,
    concurrency::{Duration, JoinHandle},
    rpc::CallResult,
};
use serde::Serialize;

use crate::{
    error::ErrorDetails,
    handle::Handle,
    payload::RawPayload,
    registry::{PendingRegistry, RawOutcome},
};

// -------------------------------------------------------------------------------------------------------

/// One invocation of a native callback, copied into owned data on the native thread.
#[derive(Debug)]
pub struct CallbackDelivery {
    pub handle: Handle,
    pub error_code: i32,
    pub payload: RawPayload,
    pub details: Option<ErrorDetails>,
}

impl CallbackDelivery {
    pub fn new(handle: Handle, error_code: i32, payload: RawPayload) -> Self {
        CallbackDelivery {
            handle,
            error_code,
            payload,
            details: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// the waiting caller received the outcome
    Resolved,
    /// the operation was pending, but nobody awaits its result anymore
    CallerGone,
    /// no pending operation for this handle
    Orphan,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub resolved: u64,
    pub orphaned: u64,
    pub caller_gone: u64,
}

#[derive(Debug, Default)]
struct Counters {
    resolved: AtomicU64,
    orphaned: AtomicU64,
    caller_gone: AtomicU64,
}

// -------------------------------------------------------------------------------------------------------

/// Resolves pending operations when their callback arrives.
///
/// Safe to call from any thread, including threads owned by the native
/// library. It never panics and never reports an error back to the caller of
/// the callback; anomalies are logged and counted.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    registry: Arc<PendingRegistry>,
    counters: Arc<Counters>,
}

impl Dispatcher {
    pub fn new(registry: Arc<PendingRegistry>) -> Self {
        Dispatcher {
            registry,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn dispatch(&self, delivery: CallbackDelivery) -> DispatchOutcome {
        let CallbackDelivery {
            handle,
            error_code,
            payload,
            details,
        } = delivery;

        // the remove is the only place that decides who resolves a handle
        let Some(operation) = self.registry.remove(handle) else {
            error!(
                "Received callback for unknown handle {} (error code {}), dropping it",
                handle, error_code
            );
            self.counters.orphaned.fetch_add(1, Ordering::Relaxed);
            return DispatchOutcome::Orphan;
        };

        let elapsed = operation.elapsed();
        let outcome = RawOutcome {
            error_code,
            payload,
            details,
        };

        // count before waking the caller, so the stats already include this
        // resolution once the caller observes it
        self.counters.resolved.fetch_add(1, Ordering::Relaxed);

        match operation.complete(outcome) {
            Ok(()) => {
                debug!(
                    "Resolved {} with error code {} after {:?}",
                    handle, error_code, elapsed
                );
                DispatchOutcome::Resolved
            }
            Err(_) => {
                info!(
                    "Callback for {} arrived after the caller stopped waiting ({:?})",
                    handle, elapsed
                );
                self.counters.resolved.fetch_sub(1, Ordering::Relaxed);
                self.counters.caller_gone.fetch_add(1, Ordering::Relaxed);
                DispatchOutcome::CallerGone
            }
        }
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            resolved: self.counters.resolved.load(Ordering::Relaxed),
            orphaned: self.counters.orphaned.load(Ordering::Relaxed),
            caller_gone: self.counters.caller_gone.load(Ordering::Relaxed),
        }
    }

    pub fn registry(&self) -> &Arc<PendingRegistry> {
        &self.registry
    }
}

// Dispatcher actor
// -------------------------------------------------------------------------------------------------------

/// Messages for the dispatcher actor.
///
/// Native trampolines only enqueue `Deliver`; the registry work happens on the
/// actor's task inside the async runtime.
pub enum DispatcherMessage {
    Deliver(CallbackDelivery),
    GetStats(RpcReplyPort<DispatchStats>),
}

pub struct DispatcherActor;

pub struct DispatcherActorState {
    dispatcher: Dispatcher,
}

#[cfg_attr(feature = "async-trait", ractor::async_trait)]
impl Actor for DispatcherActor {
    type Msg = DispatcherMessage;
    type State = DispatcherActorState;
    type Arguments = Dispatcher;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        dispatcher: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        info!("Callback dispatcher actor started");
        Ok(DispatcherActorState { dispatcher })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            DispatcherMessage::Deliver(delivery) => {
                state.dispatcher.dispatch(delivery);
            }
            DispatcherMessage::GetStats(reply) => {
                // the asker may have timed out already, that must not stop the dispatcher
                if reply.send(state.dispatcher.stats()).is_err() {
                    warn!("Stats requester went away before the reply was sent");
                }
            }
        }
        Ok(())
    }
}

pub async fn start_dispatcher_actor(
    dispatcher: Dispatcher,
) -> Result<(ActorRef<DispatcherMessage>, JoinHandle<()>), SpawnErr> {
    Actor::spawn(None, DispatcherActor, dispatcher).await
}

/// Ask a running dispatcher actor for its counters.
pub async fn query_stats(
    actor: &ActorRef<DispatcherMessage>,
    timeout: Option<Duration>,
) -> Result<DispatchStats, anyhow::Error> {
    let call_result = actor
        .call(DispatcherMessage::GetStats, timeout)
        .await
        .map_err(|err| anyhow!("query_stats: failed to reach dispatcher: {}", err))?;

    match call_result {
        CallResult::Success(stats) => Ok(stats),
        CallResult::Timeout => Err(anyhow!(
            "query_stats: timeout ({:?}) of dispatcher actor {}",
            timeout,
            actor.get_id()
        )),
        CallResult::SenderError => Err(anyhow!(
            "query_stats: SenderError of dispatcher actor {}",
            actor.get_id()
        )),
    }
}

// -------------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------------
