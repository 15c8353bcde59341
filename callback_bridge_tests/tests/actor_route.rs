use std::time::Duration;

use callback_bridge::{
    AsyncBridge, BridgeConfig, BridgeError, ErrorCode, decode, dispatcher::query_stats, trampoline,
};
use callback_bridge_tests::{api, native};

// everything runs in one test: the dispatcher actor lives on this test's runtime,
// and the trampolines can be bound only once per process.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
pub async fn test_actor_routed_bridge() -> anyhow::Result<()> {
    let config = BridgeConfig::from_json_str(r#"{"first_handle": 1000, "default_timeout_ms": 5000}"#)?;
    let bridge = AsyncBridge::new(config).with_error_details(native::native_get_current_error);

    assert!(!trampoline::is_installed());
    let (actor, join_handle) = bridge.bind_trampolines_via_actor().await?;
    assert!(trampoline::is_installed());

    // only one route per process
    let other = AsyncBridge::new(BridgeConfig::default());
    assert!(other.bind_trampolines().is_err());

    let pending = api::echo(&bridge, "via actor")?;
    assert!(pending.handle().as_raw() >= 1000);
    assert_eq!(pending.await?, "via actor");

    let echoed = bridge
        .call(
            |handle| unsafe {
                native::native_echo(handle.as_raw(), c"called".as_ptr(), Some(trampoline::string_callback))
            },
            decode::string,
        )
        .await?;
    assert_eq!(echoed, "called");

    let err = api::fail(&bridge, native::WALLET_NOT_FOUND, "no such wallet")?
        .await
        .unwrap_err();
    match err {
        BridgeError::AsyncFailure { code, details, .. } => {
            assert_eq!(code, ErrorCode::WalletNotFoundError);
            assert_eq!(details.map(|d| d.message), Some("no such wallet".to_string()));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // the synchronous callback is queued to the actor before submit returns
    assert_eq!(api::ping_sync(&bridge).await?, 42);

    let handles: Vec<_> = (0..50)
        .map(|i| api::echo(&bridge, &format!("{i}")))
        .collect::<anyhow::Result<_>>()?;
    let results = futures::future::try_join_all(handles).await?;
    assert_eq!(results.len(), 50);
    assert_eq!(results[49], "49");

    trampoline::empty_callback(999, 0);

    let stats = query_stats(&actor, Some(Duration::from_secs(1))).await?;
    assert_eq!(stats.orphaned, 1);
    assert_eq!(stats.resolved, 54);
    assert_eq!(stats.caller_gone, 0);
    assert_eq!(stats, bridge.stats());
    assert_eq!(bridge.pending_count(), 0);

    actor.stop(None);
    join_handle.await?;

    Ok(())
}
