//! # Autoflow — business process automation daemon
//!
//! Wires the store, workflow engine, delay queue, job orchestrator, and
//! channel selector together and runs the background poll loop.
//!
//! Usage:
//!   autoflow run                     # Start the daemon
//!   autoflow demo                    # Seed a sample workflow and trigger it
//!   autoflow --db-path ./flow.db run

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use autoflow_channels::{ChannelSelector, ContactProfile, MessageHistory, MessageRecord};
use autoflow_core::AutoflowConfig;
use autoflow_db::{SqliteStore, WorkflowStore};
use autoflow_engine::{ActionHandler, HandlerRegistry, TriggerContext, WorkflowEngine};
use autoflow_jobs::{ComposedPipeline, JobOrchestrator, PipelineStep, StepRunner};
use autoflow_queue::{ActionExecutor, DelayQueue};

#[derive(Parser)]
#[command(name = "autoflow", version, about = "⚙️ Autoflow — business process automation engine")]
struct Cli {
    /// Config file path (default: ~/.autoflow/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Database path (overrides the config file)
    #[arg(long)]
    db_path: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the daemon: poll loop + wired engine
    Run,
    /// Seed a sample workflow, fire a trigger, run an intake pipeline
    Demo,
}

struct Services {
    engine: Arc<WorkflowEngine>,
    queue: Arc<DelayQueue>,
    orchestrator: Arc<JobOrchestrator>,
    store: Arc<SqliteStore>,
    config: AutoflowConfig,
}

fn wire(config: AutoflowConfig) -> Result<Services> {
    let store = Arc::new(SqliteStore::open(std::path::Path::new(&config.db_path))?);

    let mut registry = HandlerRegistry::new();
    registry.register("send_message", Arc::new(LogHandler { tag: "send_message" }));
    registry.register("change_status", Arc::new(LogHandler { tag: "change_status" }));
    registry.register("create_task", Arc::new(LogHandler { tag: "create_task" }));

    let engine = Arc::new(WorkflowEngine::new(store.clone(), Arc::new(registry)));
    let inner = Arc::clone(&engine);
    let executor: ActionExecutor = Arc::new(move |enrollment_id, action_id| {
        let engine = Arc::clone(&inner);
        Box::pin(async move { engine.execute_scheduled(&enrollment_id, &action_id).await })
    });
    let queue = Arc::new(DelayQueue::new(
        store.clone(),
        config.queue.clone(),
        executor,
    ));
    engine.attach_queue(Arc::clone(&queue));

    let orchestrator = Arc::new(JobOrchestrator::new(store.clone(), config.jobs.clone()));
    Ok(Services {
        engine,
        queue,
        orchestrator,
        store,
        config,
    })
}

/// Stand-in action handler: logs its config and reports success. Real
/// deployments register their own collaborators here.
struct LogHandler {
    tag: &'static str,
}

#[async_trait]
impl ActionHandler for LogHandler {
    async fn execute(&self, config: &Value, _data: &Value) -> autoflow_core::Result<Value> {
        tracing::info!("📣 [{}] {config}", self.tag);
        Ok(json!({"action": self.tag, "status": "done"}))
    }
}

struct DemoRunner;

#[async_trait]
impl StepRunner for DemoRunner {
    async fn run(&self, step: &PipelineStep, _input: &Value) -> autoflow_core::Result<Value> {
        tracing::info!("🔧 Pipeline step '{}' running", step.name);
        if step.config.action == "create_record" {
            Ok(json!({"record_id": format!("rec-{}", uuid_suffix())}))
        } else {
            Ok(json!({"done": step.config.action}))
        }
    }
}

fn uuid_suffix() -> String {
    uuid::Uuid::new_v4().to_string()
}

struct EmptyHistory;

#[async_trait]
impl MessageHistory for EmptyHistory {
    async fn records(&self, _contact_id: &str) -> autoflow_core::Result<Vec<MessageRecord>> {
        Ok(Vec::new())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "autoflow=debug" } else { "autoflow=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let mut config = match &cli.config {
        Some(path) => AutoflowConfig::load_from(path)?,
        None => AutoflowConfig::load()?,
    };
    if let Some(db_path) = cli.db_path {
        config.db_path = db_path;
    }

    let services = wire(config)?;

    match cli.command {
        Command::Run => run(services).await,
        Command::Demo => demo(services).await,
    }
}

async fn run(services: Services) -> Result<()> {
    let poll = services.queue.start();
    println!("⚙️ Autoflow running (db: {})", services.config.db_path);
    println!("   Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;
    poll.abort();
    println!("\n👋 Stopped.");
    Ok(())
}

async fn demo(services: Services) -> Result<()> {
    use autoflow_core::types::WorkflowDefinition;

    // A keyword-gated workflow with one inline and one delayed action
    let mut wf = WorkflowDefinition::new(
        "pricing-inquiry",
        "message_received",
        json!({"keywords": ["pricing", "quote"]}),
    );
    wf.add_action("send_message", 0, json!({"message": "Hi {{contact_id}}, our pricing is attached."}));
    wf.add_action("create_task", 1, json!({"title": "Follow up on pricing inquiry"}));
    services.store.save_workflow(&wf).await?;
    println!("🧩 Seeded workflow '{}'", wf.name);

    let ctx = TriggerContext::for_contact("demo-contact")
        .with_channel("sms")
        .with_message("Could you send me PRICING details?");
    let enrollments = services
        .engine
        .trigger_workflow("message_received", &ctx, &Value::Null)
        .await?;
    for enrollment in &enrollments {
        println!("📌 Enrollment {} → {:?}", enrollment.id, enrollment.status);
    }

    // One poll pass so the demo shows the due-row machinery (the delayed
    // action itself is due in a minute)
    let attempted = services.queue.poll_once().await?;
    println!("⏰ Poll pass attempted {attempted} due execution(s)");

    // Intake pipeline backed by the job orchestrator
    let pipeline = ComposedPipeline::intake(Arc::clone(&services.orchestrator));
    let result = pipeline.run("demo-owner", &DemoRunner, &json!({"lead_name": "Ada"})).await?;
    println!(
        "🚀 Pipeline {} → {:?} (record {})",
        result.pipeline_id, result.status, result.record_id
    );
    for step in &result.steps {
        println!("   - {} [{:?}]", step.step, step.status);
    }

    // Channel pick for an email-only contact
    let selector = ChannelSelector::new(
        Arc::new(EmptyHistory),
        vec!["sms".into(), "whatsapp".into(), "email".into()],
        services.config.channels.clone(),
    );
    let contact = ContactProfile::new("demo-contact").with_email("ada@example.com");
    let choice = selector.select_channel(&contact).await?;
    println!("📨 Best channel: {} (priority {})", choice.channel, choice.priority);

    Ok(())
}
