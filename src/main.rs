//! Straylight binary: wiring and lifecycle.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use straylight::agent::autonomy::AutonomyGate;
use straylight::agent::journal::ActionJournal;
use straylight::agent::monitor::AgentMonitor;
use straylight::agent::{Agent, AgentDeps};
use straylight::config::Config;
use straylight::interfaces::console::{ConsoleInterface, DEFAULT_APPROVAL_TIMEOUT_SECS};
use straylight::interfaces::Interface;
use straylight::memory::ConversationStore;
use straylight::providers::openai::OpenAiCompatProvider;
use straylight::scheduler::run::{ScheduledTaskRunner, SchedulerLoop};
use straylight::scheduler::store::TaskStore;
use straylight::tools::schedule::{CancelTaskTool, ListTasksTool, ScheduleTaskTool};
use straylight::tools::shell::ShellTool;
use straylight::tools::status::CheckStatusTool;
use straylight::tools::web_fetch::WebFetchTool;
use straylight::tools::ToolRegistry;
use straylight::{db, logging};

#[derive(Debug, Parser)]
#[command(name = "straylight", version, about = "Autonomous assistant runtime")]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the agent with the console interface.
    Start,
    /// Validate and print the resolved configuration.
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::CheckConfig => {
            logging::init_cli();
            let config = Config::load(cli.config.as_deref())?;
            print_config(&config);
            Ok(())
        }
        Command::Start => {
            let config = Config::load(cli.config.as_deref())?;
            let _logging_guard = logging::init_production(&config.paths.logs_dir())?;
            run(config).await
        }
    }
}

fn print_config(config: &Config) {
    println!("agent.name            = {}", config.agent.name);
    println!("agent.max_iterations  = {}", config.agent.max_iterations);
    println!("agent.autonomy        = {}", config.agent.autonomy().name());
    println!("llm.base_url          = {}", config.llm.base_url);
    println!("llm.model             = {}", config.llm.model);
    println!(
        "llm.api_key           = {}",
        if config.llm.api_key.is_empty() {
            "(not set)"
        } else {
            "(set)"
        }
    );
    println!("scheduler.tick        = {}s", config.scheduler.tick_seconds);
    println!("scheduler.batch_size  = {}", config.scheduler.batch_size);
    println!(
        "scheduler.rate_limit  = {}/min",
        config.scheduler.max_exec_per_minute
    );
    println!("journal.capacity      = {}", config.journal.capacity);
    println!("paths.data_dir        = {}", config.paths.data_dir().display());
    println!("paths.logs_dir        = {}", config.paths.logs_dir().display());
}

async fn run(config: Config) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "straylight starting");

    if config.llm.api_key.is_empty() {
        warn!("no API key configured; only keyless local endpoints will work");
    }
    let provider = Arc::new(
        OpenAiCompatProvider::new(
            config.llm.base_url.clone(),
            config.llm.model.clone(),
            config.llm.api_key.clone(),
            Duration::from_secs(config.llm.timeout_secs),
        )
        .context("failed to build LLM provider")?,
    );

    let pool = db::open(&config.paths.database_path()).await?;
    let task_store = Arc::new(TaskStore::new(pool.clone()));
    task_store.init().await.context("failed to init task store")?;
    let conversations = Arc::new(ConversationStore::new(pool));
    conversations
        .init()
        .await
        .context("failed to init conversation store")?;

    let journal = Arc::new(ActionJournal::new(config.journal.capacity));
    let monitor = Arc::new(AgentMonitor::new());
    let gate = Arc::new(AutonomyGate::new(config.agent.autonomy()));

    let registry = Arc::new(build_registry(&config, &task_store, &journal)?);
    info!(count = registry.len(), tools = ?registry.names(), "tools registered");

    let interface = Arc::new(ConsoleInterface::new(
        config.agent.name.clone(),
        Duration::from_secs(DEFAULT_APPROVAL_TIMEOUT_SECS),
    ));
    gate.set_approval_transport(Arc::clone(&interface) as Arc<dyn Interface>);

    let agent = Arc::new(Agent::new(AgentDeps {
        llm: provider,
        tools: Arc::clone(&registry),
        gate: Arc::clone(&gate),
        interface: Arc::clone(&interface) as Arc<dyn Interface>,
        journal: Arc::clone(&journal),
        monitor: Arc::clone(&monitor),
        conversations: Some(Arc::clone(&conversations)),
        agent_name: config.agent.name.clone(),
        persona: config.agent.persona.clone(),
        max_iterations: config.agent.max_iterations,
    }));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler = SchedulerLoop::new(
        Arc::clone(&task_store),
        Arc::clone(&agent) as Arc<dyn ScheduledTaskRunner>,
        Arc::clone(&journal),
        Duration::from_secs(config.scheduler.tick_seconds.max(1)),
        config.scheduler.batch_size,
        config.scheduler.max_exec_per_minute,
    );
    let scheduler_rx = shutdown_rx.clone();
    let scheduler_handle = tokio::spawn(async move {
        scheduler.run(scheduler_rx).await;
    });

    let console_rx = shutdown_rx;
    let console_handle = tokio::spawn(Arc::clone(&interface).run(agent, console_rx));

    info!("straylight ready");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
        _ = console_handle => {
            info!("console closed");
        }
    }

    let _ = shutdown_tx.send(true);
    if tokio::time::timeout(Duration::from_secs(5), scheduler_handle)
        .await
        .is_err()
    {
        warn!("scheduler loop did not stop in time");
    }

    info!("straylight stopped");
    Ok(())
}

fn build_registry(
    config: &Config,
    task_store: &Arc<TaskStore>,
    journal: &Arc<ActionJournal>,
) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();

    registry.register(Arc::new(ScheduleTaskTool::new(Arc::clone(task_store))));
    registry.register(Arc::new(ListTasksTool::new(Arc::clone(task_store))));
    registry.register(Arc::new(CancelTaskTool::new(Arc::clone(task_store))));
    registry.register(Arc::new(CheckStatusTool::new(Arc::clone(journal))));

    if config.tools.enable_shell {
        registry.register(Arc::new(ShellTool::new(
            Duration::from_secs(config.tools.shell_timeout_secs),
            config.tools.shell_working_directory.clone(),
        )));
    }
    if config.tools.enable_web_fetch {
        registry.register(Arc::new(
            WebFetchTool::new(
                &config.tools.web_fetch_user_agent,
                Duration::from_secs(config.tools.web_fetch_timeout_secs),
            )
            .context("failed to build web_fetch client")?,
        ));
    }

    Ok(registry)
}
