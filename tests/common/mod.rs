#![allow(dead_code)]

use std::sync::Once;
use std::time::Duration;

use kodegen_push_notify::{
    InMemoryRegistry, PlatformBindings, PushAgent, PushConfig, SimulatedBrowser,
};

static INIT: Once = Once::new();

pub fn setup_tracing() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "warn".into())
            .add_directive("kodegen_push_notify=debug".parse().unwrap());

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Default configuration with a short readiness timeout
pub fn test_config() -> PushConfig {
    let mut config = PushConfig::default();
    config.worker.ready_timeout_ms = 500;
    config
}

pub struct Harness {
    pub browser: SimulatedBrowser,
    pub registry: InMemoryRegistry,
    pub agent: PushAgent,
}

pub fn harness(browser: SimulatedBrowser, registry: InMemoryRegistry) -> Harness {
    harness_with(test_config(), browser, registry)
}

pub fn harness_with(
    config: PushConfig,
    browser: SimulatedBrowser,
    registry: InMemoryRegistry,
) -> Harness {
    setup_tracing();
    let agent = PushAgent::builder(config)
        .with_platform(PlatformBindings::simulated(&browser, Some(registry.clone())))
        .build()
        .expect("agent builds from simulated platform");
    Harness {
        browser,
        registry,
        agent,
    }
}

/// Poll `condition` until it holds or a second passes
pub async fn eventually<F>(condition: F) -> bool
where
    F: Fn() -> bool,
{
    tokio::time::timeout(Duration::from_secs(1), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .is_ok()
}
