use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use jenkins_agent_operator::config::StaticConfig;
use jenkins_agent_operator::controller::{
    self, resources, AgentUnit, Dispatcher, HostInfo, UnitEvent,
};
use jenkins_agent_operator::peers::{JsonLinesPeerBus, PeerRegistry};
use jenkins_agent_operator::runtime::{KubeRuntime, MemoryRuntime, WorkloadRuntime};
use jenkins_agent_operator::host;
use serde::Deserialize;
use tokio::io::BufReader;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the unit, reading host events from stdin
    Run(RunArgs),
    /// Print the workload that the given configuration resolves to
    Render(RenderArgs),
    /// Show version information
    Version,
}

#[derive(Parser, Debug)]
struct ConfigArgs {
    /// YAML file with the static configuration
    #[arg(long, env = "STATIC_CONFIG")]
    config: Option<PathBuf>,

    /// Override a configuration option (key=value), may be repeated
    #[arg(long = "set", value_name = "KEY=VALUE")]
    overrides: Vec<String>,

    /// Name of this unit on the peer bus (defaults to the host name)
    #[arg(long, env = "UNIT_NAME")]
    unit_name: Option<String>,

    /// Namespace of the agent workload
    #[arg(long, env = "AGENT_NAMESPACE", default_value = "default")]
    namespace: String,
}

#[derive(Parser, Debug)]
struct RunArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// ConfigMap to watch for static configuration changes
    #[arg(long, env = "CONFIG_MAP_NAME")]
    config_map: Option<String>,

    /// Keep the workload in memory instead of applying it to the cluster
    #[arg(long, env = "DRY_RUN")]
    dry_run: bool,

    /// Seconds to wait before redelivering a deferred event
    #[arg(long, env = "REQUEUE_SECONDS", default_value_t = 5)]
    requeue_seconds: u64,

    #[arg(long, value_enum, env = "LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// YAML list of peer announcements ({unit, url, secret}) to replay
    #[arg(long)]
    peers: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "layer")]
    output: RenderOutput,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RenderOutput {
    Spec,
    Layer,
    Deployment,
}

#[derive(Debug, Deserialize)]
struct PeerAnnouncement {
    unit: String,
    url: Option<String>,
    secret: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Version => {
            println!("jenkins-agent-operator v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Render(render_args) => run_render(render_args),
        Commands::Run(run_args) => run_unit(run_args).await,
    }
}

fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    // stdout carries peer announcements, so logs go to stderr
    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}

fn load_config(args: &ConfigArgs) -> anyhow::Result<StaticConfig> {
    let config = match &args.config {
        Some(path) => StaticConfig::from_file(path)
            .with_context(|| format!("reading configuration from {}", path.display()))?,
        None => StaticConfig::default(),
    };
    Ok(config.with_overrides(args.overrides.iter().map(String::as_str))?)
}

fn unit_name(args: &ConfigArgs) -> String {
    args.unit_name.clone().unwrap_or_else(|| {
        hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown-host".to_string())
    })
}

fn run_render(args: RenderArgs) -> anyhow::Result<()> {
    let config = load_config(&args.config)?;
    let unit_name = unit_name(&args.config);

    let mut registry = PeerRegistry::new();
    if let Some(path) = &args.peers {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading peers from {}", path.display()))?;
        let announcements: Vec<PeerAnnouncement> = serde_yaml::from_str(&raw)?;
        for peer in &announcements {
            registry.register_or_update(&peer.unit, peer.url.as_deref(), peer.secret.as_deref());
        }
    }

    if let Err(message) = controller::validate(&config, &registry) {
        anyhow::bail!(message);
    }

    let spec = controller::build_workload_spec(&controller::resolve(&config, &registry), &config);
    let rendered = match args.output {
        RenderOutput::Spec => serde_yaml::to_string(&spec)?,
        RenderOutput::Layer => serde_yaml::to_string(&spec.layer())?,
        RenderOutput::Deployment => serde_yaml::to_string(&resources::build_deployment(
            &spec,
            &args.config.namespace,
            &unit_name,
        )?)?,
    };
    print!("{rendered}");
    Ok(())
}

async fn run_unit(args: RunArgs) -> anyhow::Result<()> {
    init_tracing(args.log_format);

    let config = load_config(&args.config)?;
    let unit_name = unit_name(&args.config);
    let namespace = args.config.namespace.clone();

    info!(
        "Starting jenkins-agent-operator v{} as unit {}",
        env!("CARGO_PKG_VERSION"),
        unit_name
    );

    let client = if args.dry_run && args.config_map.is_none() {
        None
    } else {
        Some(
            kube::Client::try_default()
                .await
                .context("connecting to Kubernetes")?,
        )
    };

    let runtime: Arc<dyn WorkloadRuntime> = match (&client, args.dry_run) {
        (Some(client), false) => Arc::new(KubeRuntime::new(
            client.clone(),
            namespace.clone(),
            unit_name.clone(),
        )),
        _ => {
            info!("Dry run: workload specs are kept in memory");
            Arc::new(MemoryRuntime::ready())
        }
    };
    let bus = Arc::new(JsonLinesPeerBus::new(tokio::io::stdout()));

    let unit = AgentUnit::new(unit_name, config, HostInfo::detect());
    let (dispatcher, handle) = Dispatcher::new(
        unit,
        runtime,
        bus,
        Duration::from_secs(args.requeue_seconds),
    );
    let dispatcher_task = tokio::spawn(dispatcher.run());

    let watch_task = match (&client, &args.config_map) {
        (Some(client), Some(name)) => {
            let client = client.clone();
            let name = name.clone();
            let watch_handle = handle.clone();
            Some(tokio::spawn(async move {
                if let Err(e) =
                    controller::watch_static_config(client, &namespace, &name, watch_handle).await
                {
                    tracing::error!("ConfigMap watcher stopped: {:?}", e);
                }
            }))
        }
        _ => None,
    };

    handle.send(UnitEvent::Start).await?;

    let stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        forwarded = host::forward_events(stdin, &handle) => {
            let forwarded = forwarded?;
            info!("Host event stream closed after {} events", forwarded);
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, shutting down");
        }
    }

    if let Some(task) = watch_task {
        task.abort();
    }
    drop(handle);
    dispatcher_task.await??;
    Ok(())
}
