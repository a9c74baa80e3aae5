//! Courier Development Binary
//!
//! Runs the configured communication agents against the in-process manual
//! fabric. With no configured agents a single bidirectional `demo` agent is
//! used. Each agent gets a catch-all filter, a few demo transmissions are
//! looped back through its listeners, and statistics are logged periodically
//! until Ctrl+C.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};

use courier_comms::{
    CommunicationAgent, EventCollector, ManualClientFactory, ManualFabric, ResourceTracker,
};
use courier_common::{
    AgentSettings, Capabilities, EventSeverity, MessageFilterWrapper, ServiceMessage,
    TransmissionPayload,
};
use courier_config::{AppConfig, ConfigLoader};

#[derive(Parser, Debug)]
#[command(name = "courier-dev")]
#[command(about = "Courier development binary - agents on the in-process fabric")]
struct Args {
    /// Configuration file path
    #[arg(long, env = "COURIER_CONFIG")]
    config: Option<PathBuf>,

    /// Demo messages sent per agent at startup
    #[arg(long, env = "COURIER_DEMO_MESSAGES", default_value = "5")]
    demo_messages: usize,

    /// Statistics log interval in seconds
    #[arg(long, env = "COURIER_STATS_INTERVAL_SECS", default_value = "30")]
    stats_interval_secs: u64,

    /// Print an example configuration and exit
    #[arg(long)]
    print_example_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_example_config {
        println!("{}", AppConfig::example_toml());
        return Ok(());
    }

    courier_common::logging::init_logging("courier-dev");
    info!("Starting Courier development binary");

    let loader = match &args.config {
        Some(path) => ConfigLoader::with_path(path),
        None => ConfigLoader::new(),
    };
    let mut config = loader.load().context("loading configuration")?;
    if config.agents.is_empty() {
        info!("No agents configured, using the demo agent");
        config.agents.push(AgentSettings {
            sender_default_priority: Some(0),
            ..AgentSettings::new("demo", Capabilities::Bidirectional)
        });
    }
    config.validate().context("validating configuration")?;

    // Shared collaborators
    let tracker = Arc::new(ResourceTracker::with_stats_settings(config.statistics));
    for profile in &config.resource_profiles {
        tracker.register(&profile.id, profile.rate_limit_cutout_percentage);
        info!(profile = %profile.id, cutout = profile.rate_limit_cutout_percentage, "Registered resource profile");
    }
    let collector = Arc::new(EventCollector::default());
    let fabric = Arc::new(ManualFabric::new());
    let factory = Arc::new(ManualClientFactory::new(fabric.clone()));

    let mut agents = Vec::new();
    for settings in config.agents.clone() {
        let channel_id = settings.channel_id.clone();
        let agent = Arc::new(
            CommunicationAgent::new(settings, factory.clone())
                .with_collector(collector.clone())
                .with_resource_tracker(tracker.clone())
                .with_stats_settings(config.statistics),
        );

        if let Err(e) = agent.start().await {
            error!(channel_id = %channel_id, error = %e, "Agent failed to start");
            continue;
        }
        agents.push(agent);
    }

    if agents.is_empty() {
        anyhow::bail!("no agent started");
    }

    // Subscribe every listening agent to everything on its channel
    let filters: Vec<MessageFilterWrapper> = agents
        .iter()
        .map(|a| MessageFilterWrapper::new(a.listening_channel_id(), None, None))
        .collect();
    for agent in &agents {
        if let Err(e) = agent.listener_commands_active_change(&filters).await {
            warn!(channel_id = %agent.channel_id(), error = %e, "Filter activation failed");
        }
    }

    for agent in agents.iter().filter(|a| a.can_send()) {
        run_demo(agent, args.demo_messages).await;
    }

    let mut stats_interval = tokio::time::interval(Duration::from_secs(args.stats_interval_secs.max(1)));
    stats_interval.tick().await;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = stats_interval.tick() => log_statistics(&agents, &tracker),
        }
    }

    info!("Shutdown signal received, stopping agents");
    for agent in &agents {
        if let Err(e) = agent.stop().await {
            warn!(channel_id = %agent.channel_id(), error = %e, "Agent stop reported an error");
        }
    }
    log_statistics(&agents, &tracker);

    info!(
        events = collector.count(),
        errors = collector.count_by_severity(EventSeverity::Error),
        critical = collector.count_by_severity(EventSeverity::Critical),
        "Courier development binary stopped"
    );
    Ok(())
}

/// Transmit demo messages across the agent's sender partitions and pull them
/// back through its listeners.
async fn run_demo(agent: &CommunicationAgent, count: usize) {
    let priorities = agent.sender_priority_partitions();
    if priorities.is_empty() {
        return;
    }

    for i in 0..count {
        let priority = priorities[i % priorities.len()];
        let message = ServiceMessage::new(agent.channel_id(), "demo", "ping")
            .with_priority(priority)
            .with_body(serde_json::json!({ "sequence": i }));
        let mut payload = TransmissionPayload::new(message);

        if let Err(e) = agent.sender_transmit(&mut payload).await {
            warn!(channel_id = %agent.channel_id(), error = %e, "Demo transmission failed");
        }
    }

    if !agent.can_listen() {
        return;
    }

    for priority in agent.listener_priority_partitions() {
        match agent
            .listener_messages_pull(priority, count, Some(Duration::from_millis(100)))
            .await
        {
            Ok(payloads) => {
                for payload in &payloads {
                    info!(
                        payload_id = %payload.id,
                        source = payload.source.as_deref().unwrap_or("-"),
                        trace = payload.trace.len(),
                        "Demo payload received"
                    );
                }
            }
            Err(e) => warn!(priority = priority, error = %e, "Demo pull failed"),
        }
    }
}

fn log_statistics(agents: &[Arc<CommunicationAgent>], tracker: &ResourceTracker) {
    for agent in agents {
        match serde_json::to_string(&agent.statistics()) {
            Ok(json) => info!(channel_id = %agent.channel_id(), statistics = %json, "Agent statistics"),
            Err(e) => warn!(error = %e, "Failed to serialize agent statistics"),
        }
        info!(
            channel_id = %agent.channel_id(),
            adjustment = agent.listener_rate_limit_adjustment(),
            "Listener admission factor"
        );
    }

    for snapshot in tracker.snapshot() {
        info!(
            profile = %snapshot.id,
            active = snapshot.active,
            retry_ratio = snapshot.retry_ratio,
            adjustment = snapshot.rate_limit_adjustment_percentage,
            "Resource profile"
        );
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
