mod commands;
mod hooks;
mod invocation;
mod logging;

use anyhow::Result;
use clap::{Parser, Subcommand};
use hooks::{HookEvent, Hooks};
use invocation::InvocationContext;
use logging::{init_logging, load_config_logged};
use memlink_core::HostId;
use memlink_remote::HttpMemoryClient;
use tracing::{debug, warn};

#[derive(Parser, Debug)]
#[command(name = "memlink")]
#[command(about = "Local-first memory sync for coding assistants", long_about = None)]
struct Cli {
    /// Host integration to act for (claude_code, cursor, codex)
    #[arg(long, global = true)]
    host: Option<HostId>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Handle a host lifecycle event; always exits successfully
    Hook {
        #[command(subcommand)]
        event: HookEvent,
    },
    /// Show configuration and local cache state
    Status,
    /// Inspect or edit config.json
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
    /// Inspect or upload queued messages
    Queue {
        #[command(subcommand)]
        action: QueueCommands,
    },
    /// Manage local caches
    Cache {
        #[command(subcommand)]
        action: CacheCommands,
    },
    /// Ask the memory service a question about the user
    Ask { query: String },
    /// Search messages in the current session
    Search {
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Store a fact about the user
    Remember { text: String },
    /// Print recent work log entries
    WorkLog {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    Show,
    Set { key: String, value: String },
}

#[derive(Subcommand, Debug)]
enum QueueCommands {
    List {
        /// Include every working directory
        #[arg(long)]
        all: bool,
    },
    Flush,
}

#[derive(Subcommand, Debug)]
enum CacheCommands {
    /// Remove caches; config and work log are kept
    Clear,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Hook { event } = cli.command {
        run_hook(cli.host, event).await;
        return Ok(());
    }

    let ctx = InvocationContext::from_process(cli.host)?;
    let logging =
        load_config_logged(&ctx.cache_dir, ctx.host).map_or(false, |config| config.logging);
    let _log_guard = init_logging(&ctx.cache_dir, logging);

    match cli.command {
        Commands::Hook { .. } => {}
        Commands::Status => commands::status(&ctx)?,
        Commands::Config { action } => match action {
            ConfigCommands::Show => commands::config_show(&ctx)?,
            ConfigCommands::Set { key, value } => commands::config_set(&ctx, &key, &value)?,
        },
        Commands::Queue { action } => match action {
            QueueCommands::List { all } => commands::queue_list(&ctx, all)?,
            QueueCommands::Flush => commands::queue_flush(&ctx).await?,
        },
        Commands::Cache { action } => match action {
            CacheCommands::Clear => commands::cache_clear(&ctx)?,
        },
        Commands::Ask { query } => commands::ask(&ctx, &query).await?,
        Commands::Search { query, limit } => commands::search(&ctx, &query, limit).await?,
        Commands::Remember { text } => commands::remember(&ctx, &text).await?,
        Commands::WorkLog { limit } => commands::work_log(&ctx, limit)?,
    }

    Ok(())
}

/// Hooks report problems through the log only.
async fn run_hook(host: Option<HostId>, event: HookEvent) {
    let ctx = match InvocationContext::from_process(host) {
        Ok(ctx) => ctx,
        Err(err) => {
            eprintln!("memlink: {err:#}");
            return;
        }
    };
    let config = load_config_logged(&ctx.cache_dir, ctx.host);
    let logging = config.as_ref().map_or(false, |config| config.logging);
    let _log_guard = init_logging(&ctx.cache_dir, logging);

    let payload = hooks::read_payload();
    let ctx = ctx.with_cwd(payload.cwd.as_deref());

    let Some(config) = config else {
        debug!("hook_skipped: {} not configured", event.as_str());
        return;
    };
    if !config.enabled {
        debug!("hook_skipped: {} disabled", event.as_str());
        return;
    }
    let api = match HttpMemoryClient::from_config(&config) {
        Ok(api) => api,
        Err(err) => {
            warn!("client_init_failed: {err}");
            return;
        }
    };

    match Hooks::new(&ctx, &config, &api).run(event, &payload).await {
        Ok(Some(output)) => println!("{output}"),
        Ok(None) => {}
        Err(err) => warn!("hook_failed: {}: {err:#}", event.as_str()),
    }
}
