//! lockevents CLI: inspect serialized lock events and run a local demo.

use std::io::Read as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use storage_lock_events::action::names;
use storage_lock_events::config::Config;
use storage_lock_events::telemetry::{TelemetryConfig, init_telemetry};
use storage_lock_events::{
    Action, Event, EventType, Listener, ListenerFn, LockInformation, PublishContext,
};

#[derive(Parser)]
#[command(name = "lockevents", about = "Lock event inspection and demo")]
struct Cli {
    /// Optional TOML config file; environment variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a summary of a JSON-encoded event
    Inspect {
        /// Path to the event JSON, or "-" for stdin
        file: String,
    },
    /// Create a lock event tree, publish it, and print the root as JSON
    Demo {
        /// Lock id for the root event
        #[arg(long, default_value = "L1")]
        lock_id: String,
        /// Number of child events forked concurrently from the root
        #[arg(long, default_value_t = 3)]
        children: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Inspect { file } => cmd_inspect(&file),
        Command::Demo { lock_id, children } => cmd_demo(&config, lock_id, children).await,
    }
}

fn cmd_inspect(file: &str) -> anyhow::Result<()> {
    let json = if file == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(file).with_context(|| format!("reading {file}"))?
    };
    let event = Event::from_json_str(&json)?;

    println!("id:       {}", event.id());
    println!("root:     {}", event.root_id());
    let parent = event.get_parent_id();
    println!("parent:   {}", if parent.is_empty() { "-" } else { parent.as_str() });
    println!("type:     {}", event.event_type());
    println!("lock:     {}", event.lock_id());
    if !event.owner_id().is_empty() {
        println!("owner:    {}", event.owner_id());
    }
    if !event.storage_name().is_empty() {
        println!("storage:  {}", event.storage_name());
    }
    match event.end_time() {
        Some(_) => println!("duration: {:?}", event.cost()),
        None => println!("duration: (not ended)"),
    }
    if event.err().is_some() {
        println!("error:    {}", event.err_msg());
    }
    println!("actions:  {}", event.actions().len());
    for action in event.actions() {
        let err = action.err_msg();
        if err.is_empty() {
            println!("  {:<32} {:?}", action.name, action.cost());
        } else {
            println!("  {:<32} {:?}  error: {err}", action.name, action.cost());
        }
    }
    Ok(())
}

async fn cmd_demo(config: &Config, lock_id: String, children: usize) -> anyhow::Result<()> {
    let _guard = init_telemetry(TelemetryConfig::from_config(config))?;

    let log_listener: Arc<dyn Listener> = Arc::new(ListenerFn::new(
        "log",
        |ctx: &PublishContext, event: &Event| -> anyhow::Result<()> {
            if ctx.is_done() {
                return Ok(());
            }
            tracing::info!(
                event.id = event.id(),
                event.parent = %event.get_parent_id(),
                event.actions = event.actions().len(),
                cost_ms = event.cost().as_millis() as u64,
                "lock event"
            );
            Ok(())
        },
    ));

    let mut root = Event::new(lock_id);
    root.set_type(EventType::Lock)
        .set_storage_name("memory")
        .set_owner_id("demo-owner")
        .set_lock_information(Arc::new(LockInformation::new("demo-owner", 1)))
        .add_listener(log_listener);
    let mut get = Action::new(names::STORAGE_GET);
    get.add_payload("attempt", 1).end();
    root.append_action(get);

    let root = Arc::new(root);
    let mut handles = Vec::with_capacity(children);
    for n in 0..children {
        let root = Arc::clone(&root);
        let ctx = config.publish_context();
        handles.push(tokio::spawn(async move {
            let mut child = root.fork();
            child.set_owner_id(format!("demo-worker-{n}"));
            let mut update = Action::new(names::STORAGE_UPDATE_WITH_VERSION);
            update.add_payload("worker", n as i64).end();
            child.append_action(update);
            child.publish(&ctx, &[])
        }));
    }
    for handle in handles {
        handle.await??;
    }

    let mut root = Arc::try_unwrap(root)
        .map_err(|_| anyhow::anyhow!("root event still shared after children finished"))?;
    root.publish(&config.publish_context(), &[])?;
    println!("{}", root.to_json_string_strict()?);
    Ok(())
}
