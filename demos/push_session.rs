// Walks one push session against the simulated browser
// Run with: cargo run --example push_session

use kodegen_push_notify::telemetry::init_tracing;
use kodegen_push_notify::{
    InMemoryRegistry, InteractionKind, PermissionState, PlatformBindings, PushAgent, PushConfig,
    PushPayload, SimulatedBrowser, Visibility, WorkerBindings, WorkerEvent, worker_runtime,
};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = PushConfig::default();
    init_tracing(&config.log)?;

    let browser = SimulatedBrowser::new();
    browser.set_prompt_response(PermissionState::Granted);
    let registry = InMemoryRegistry::new();

    let agent = PushAgent::builder(config.clone())
        .with_platform(PlatformBindings::simulated(&browser, Some(registry.clone())))
        .build()?;

    agent.start().await;
    println!("after start: {:?}", agent.state());

    // Scrolling is not a gesture; a click is
    agent.handle_interaction(InteractionKind::Scroll).await;
    let granted = agent.handle_interaction(InteractionKind::Click).await;
    println!("prompt outcome: {granted:?}");
    println!("registry records: {:?}", registry.records());

    let _handler = agent.on_foreground_message(|payload| {
        println!("foreground handler saw: {}", payload.title());
    });
    let payload = PushPayload::from_value(json!({
        "notification": { "title": "New Lead Assigned", "body": "Swift Dzire, Sector 21" },
        "data": { "url": "/leads/981" }
    }))?;

    let delivery = agent.deliver_foreground(&payload).await;
    if let Some(shown) = &delivery.shown {
        println!("clicking in-page notification -> {:?}", agent.handle_foreground_click(shown));
    }

    agent.set_visibility(Visibility::Hidden);
    let delivery = agent.deliver_foreground(&payload).await;
    println!("hidden page routes to: {:?}", delivery.path);

    // Worker side: the provider pushes while the page is hidden
    let runtime = worker_runtime(&config, WorkerBindings::simulated(&browser));
    runtime.dispatch(WorkerEvent::Install).await?;
    runtime.dispatch(WorkerEvent::Activate).await?;
    runtime
        .dispatch(WorkerEvent::Push {
            data: Some(serde_json::to_vec(&json!({
                "notification": { "title": "Follow-up due" },
                "data": { "url": "/followups" }
            }))?),
        })
        .await?;
    if let Some((id, spec)) = browser.shown_notifications().pop() {
        println!("worker displayed: {}", spec.title);
        let notification = kodegen_push_notify::ShownNotification { id, spec };
        runtime
            .dispatch(WorkerEvent::NotificationClick {
                notification,
                action: None,
            })
            .await?;
        println!("windows opened: {:?}", browser.opened_windows());
    }

    println!("unsubscribed: {}", agent.unsubscribe().await);
    println!("final state: {:?}", agent.state());
    agent.shutdown();
    Ok(())
}
