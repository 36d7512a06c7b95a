use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use portal_core::{CancellationToken, Message, Sequencer};
use portal_llm::{CompletionProvider, OpenAiCompatProvider};
use portal_tasks::registry::executor_task;
use portal_tasks::{default_items, demo_sequence, ChatExecutor, ExecutorBackend, Portal, TaskSpec};

mod config;
mod logging;
mod render;

use config::PortalConfig;
use logging::init_logging;
use render::Renderer;

#[derive(Parser, Debug)]
#[command(name = "portal")]
#[command(about = "Run portal conversations against an OpenAI-compatible endpoint")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(long, short, default_value = "false")]
    debug: bool,

    /// API base URL
    #[arg(long, env = "PORTAL_API_BASE")]
    api_base: Option<String>,

    /// API key
    #[arg(long, env = "PORTAL_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Model for chat, search and classification
    #[arg(long, env = "PORTAL_CHAT_MODEL")]
    model: Option<String>,

    /// Model for document and sheet generation
    #[arg(long, env = "PORTAL_CODER_MODEL")]
    coder_model: Option<String>,

    /// Wait for whole replies instead of streaming
    #[arg(long)]
    no_stream: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify the message and run the resulting tasks
    Chat {
        message: String,
    },
    /// Single completion, no classification
    Ask {
        message: String,
    },
    /// Offline demo stream
    Demo {
        /// Delay between fragments in milliseconds
        #[arg(long, default_value = "100")]
        delay_ms: u64,
    },
}

impl Cli {
    fn config(&self) -> PortalConfig {
        let mut config = PortalConfig::load();
        if let Some(api_base) = &self.api_base {
            config.api_base = Some(api_base.clone());
        }
        if let Some(api_key) = &self.api_key {
            config.api_key = Some(api_key.clone());
        }
        if let Some(model) = &self.model {
            config.chat_model = Some(model.clone());
        }
        if let Some(model) = &self.coder_model {
            config.coder_model = Some(model.clone());
        }
        if self.no_stream {
            config.stream = false;
        }
        config
    }
}

fn provider(config: &PortalConfig) -> anyhow::Result<Arc<dyn CompletionProvider>> {
    let api_key = config
        .api_key
        .clone()
        .context("no API key configured (set PORTAL_API_KEY or api_key in ~/.portal/config.json)")?;

    let mut provider = OpenAiCompatProvider::new(api_key);
    if let Some(api_base) = &config.api_base {
        provider = provider.with_base_url(api_base.clone());
    }
    if let Some(model) = &config.chat_model {
        provider = provider.with_model(model.clone());
    }
    log::info!("Using model '{}'", provider.model());
    Ok(Arc::new(provider))
}

/// Pull outputs until done, cancelling on Ctrl-C.
async fn drive(mut sequencer: Sequencer) -> anyhow::Result<()> {
    let cancel = sequencer.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let mut renderer = Renderer::new(io::stdout());
    loop {
        let output = sequencer.produce_next().await;
        renderer.render(&output)?;
        if output.done {
            break;
        }
    }
    renderer.finish()?;

    if sequencer.cancellation_token().is_cancelled() {
        eprintln!("{}", "Cancelled".yellow());
    }
    log::debug!(
        "[{}] Finished with {} slot(s)",
        sequencer.id(),
        sequencer.buffer().len()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    match &cli.command {
        Commands::Demo { delay_ms } => {
            let sequencer = demo_sequence(
                vec![Message::user("Hello, how are you?")],
                default_items(),
                Duration::from_millis(*delay_ms),
            );
            drive(sequencer).await
        }
        Commands::Chat { message } => {
            let config = cli.config();
            let provider = provider(&config)?;
            let chat = ExecutorBackend::new(Arc::clone(&provider)).with_model(config.chat_model.clone());
            let artifact = ExecutorBackend::new(provider).with_model(config.artifact_model());
            let portal = Portal::from_backends(chat, artifact)?;

            let sequencer = portal.sequence(
                vec![Message::user(message.clone())],
                config.stream,
                CancellationToken::new(),
            );
            drive(sequencer).await
        }
        Commands::Ask { message } => {
            let config = cli.config();
            let backend = ExecutorBackend::new(provider(&config)?).with_model(config.chat_model.clone());
            let executor = Arc::new(ChatExecutor::new(backend));

            let sequencer = Sequencer::new(vec![Message::user(message.clone())])
                .with_stream(config.stream)
                .with_task(executor_task(executor, TaskSpec::new("chat", message.clone())));
            drive(sequencer).await
        }
    }
}
