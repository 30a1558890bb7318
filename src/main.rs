//! Interactive CLI: chat with a PDF through a remote content cache.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use rustyline::error::ReadlineError;
use tracing_subscriber::EnvFilter;

use pdfchat::{
    CacheManager, CacheScope, CacheStatusStore, Config, ConversationService, CostModel,
    DocumentSource, GeminiClient, SessionState,
};

#[derive(Debug, Parser)]
#[command(
    name = "pdfchat",
    about = "Chat with a PDF in formal English and Telugu, via a Gemini content cache"
)]
struct Args {
    /// Path to the PDF document.
    #[arg(long)]
    pdf: PathBuf,

    /// Share one 24-hour cache across sessions instead of a 10-minute
    /// per-session cache.
    #[arg(long)]
    global_cache: bool,

    /// Override the cache-status record location (global cache only).
    #[arg(long)]
    status_file: Option<PathBuf>,

    /// Config file (defaults to ~/.pdfchat/config.toml when present).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pdfchat=info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;

    let api = Arc::new(GeminiClient::from_config(
        config.api_key.as_deref(),
        &config.model,
    )?);

    let (scope, store) = if args.global_cache {
        let path = args.status_file.clone().unwrap_or_else(|| config.status_path());
        (CacheScope::Global, Some(CacheStatusStore::new(path)))
    } else {
        (CacheScope::PerSession, None)
    };

    let cost = CostModel::new(
        config.pricing.clone(),
        config.tier_mode,
        Some(config.cost_log_path()),
    );
    let manager = CacheManager::new(api.clone(), scope, store, cost.clone());
    let service = ConversationService::new(api, cost);
    let document = DocumentSource::File(args.pdf.clone());
    let mut session = SessionState::new();

    // Warm the cache up front so the first question does not pay the
    // creation latency.
    manager
        .ensure_cache(&document, &mut session)
        .await
        .with_context(|| format!("failed to cache {}", args.pdf.display()))?;
    println!("PDF cached. Ask a question, or /reset, /cost, /status, /quit.");

    let mut rl = rustyline::DefaultEditor::new()?;
    loop {
        match rl.readline("> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);
                match line {
                    "/quit" | "/exit" => break,
                    "/reset" => {
                        session.reset();
                        tracing::info!("session reset by user");
                        println!("session reset");
                    }
                    "/cost" => println!("{}", session.ledger.summary()),
                    "/status" => println!("{}", manager.status_line().await),
                    question => {
                        // Re-ensure on every question so TTL expiry is
                        // handled transparently mid-session.
                        let cache = match manager.ensure_cache(&document, &mut session).await {
                            Ok(cache) => cache,
                            Err(e) => {
                                eprintln!("error: {}", e);
                                continue;
                            }
                        };
                        match service.ask(&cache, &mut session, question).await {
                            Ok(answer) => {
                                session.append_turn(question, answer.as_str());
                                println!("\n{}\n", answer);
                                println!("{}", session.ledger.summary());
                            }
                            Err(e) => {
                                // Failed turn: surfaced, not recorded; the
                                // user may simply re-ask.
                                eprintln!("question failed: {}", e);
                            }
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}
