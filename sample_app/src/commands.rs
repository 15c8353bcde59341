use std::time::{Duration, Instant};

use anyhow::Context;
use callback_bridge::{
    AsyncBridge, BridgeConfig, BridgeError, DispatchStats, DispatcherMessage, PendingResult,
    dispatcher::query_stats,
};
use callback_bridge_tests::{api, native};
use log::info;
use ractor::{ActorRef, concurrency::JoinHandle};

use crate::Route;

pub struct Session {
    bridge: AsyncBridge,
    actor: Option<(ActorRef<DispatcherMessage>, JoinHandle<()>)>,
}

impl Session {
    pub async fn start(config: BridgeConfig, route: Route) -> anyhow::Result<Self> {
        info!("Starting bridge with {:?}, routing callbacks {:?}", config, route);

        let bridge = AsyncBridge::new(config).with_error_details(native::native_get_current_error);
        let actor = match route {
            Route::Direct => {
                bridge.bind_trampolines()?;
                None
            }
            Route::Actor => Some(bridge.bind_trampolines_via_actor().await?),
        };

        Ok(Session { bridge, actor })
    }

    pub async fn echo(&self, message: &str) -> anyhow::Result<()> {
        let echoed = self.await_result(api::echo(&self.bridge, message)?).await?;
        println!("{}", echoed);
        Ok(())
    }

    pub async fn open_wallet(&self, id: &str) -> anyhow::Result<()> {
        let config = serde_json::json!({ "id": id }).to_string();
        let wallet = self
            .await_result(api::open_wallet(&self.bridge, &config)?)
            .await
            .with_context(|| format!("opening wallet '{}'", id))?;

        let info = self.await_result(api::wallet_info(&self.bridge, wallet)).await?;
        println!("wallet '{}': handle {}, storage {}", id, info.handle, info.storage);
        Ok(())
    }

    pub async fn sign(&self, data: &[u8]) -> anyhow::Result<()> {
        let signature = self.await_result(api::sign(&self.bridge, data)).await?;
        let hex: String = signature.iter().map(|b| format!("{:02x}", b)).collect();
        println!("{}", hex);
        Ok(())
    }

    pub async fn stress(&self, count: usize) -> anyhow::Result<()> {
        let started = Instant::now();

        let pending = (0..count)
            .map(|i| api::echo(&self.bridge, &format!("call {}", i)))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let results =
            futures::future::join_all(pending.into_iter().map(|p| self.await_result(p))).await;

        let failed = results.iter().filter(|r| r.is_err()).count();
        info!(
            "{} calls finished in {:?}, {} failed",
            count,
            started.elapsed(),
            failed
        );

        let stats = self.stats().await?;
        println!("{}", serde_json::to_string_pretty(&stats)?);
        Ok(())
    }

    pub async fn shutdown(self) -> anyhow::Result<()> {
        let stats = self.stats().await?;
        info!(
            "Shutting down: {} resolved, {} orphaned, {} still pending",
            stats.resolved,
            stats.orphaned,
            self.bridge.pending_count()
        );

        if let Some((actor, join_handle)) = self.actor {
            actor.stop(None);
            join_handle.await?;
        }
        Ok(())
    }

    async fn await_result<T>(&self, pending: PendingResult<T>) -> Result<T, BridgeError> {
        match self.bridge.config().default_timeout() {
            Some(after) => pending.with_timeout(after).await,
            None => pending.await,
        }
    }

    async fn stats(&self) -> anyhow::Result<DispatchStats> {
        match &self.actor {
            Some((actor, _)) => query_stats(actor, Some(Duration::from_secs(5))).await,
            None => Ok(self.bridge.stats()),
        }
    }
}
