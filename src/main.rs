mod bots;
mod delivery;
mod gateway;
mod i18n;
mod outbox;
mod resolver;
mod telemetry;

#[cfg(test)]
mod testing;

use bots::{Bot, CaptionBot, OcrBot};
use clap::{Parser, Subcommand};
use delivery::Delivery;
use iris_channels::{HttpUploader, TeamsChannel};
use iris_core::{
    config::{self, BotConfig, Config, MemoryBackend},
    shellexpand,
    traits::{Analyzer, ConversationStore, TelemetrySink},
    vision::AnalysisRequest,
};
use iris_memory::{MemoryStore, ResultStager, SqliteStore, TelemetryLog};
use iris_vision::VisionClient;
use outbox::Outbox;
use std::sync::Arc;
use telemetry::{Telemetry, TracingSink};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "iris",
    version,
    about = "Iris: image caption and text recognition bots"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, default_value = "config.toml", env = "IRIS_CONFIG")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the bot messaging endpoints.
    Start,
    /// Show configuration and credential status.
    Status,
    /// Caption one image by URL.
    Caption {
        /// Image URL.
        url: String,
    },
    /// Recognize the text in one image by URL.
    Ocr {
        /// Image URL.
        url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load(&cli.config)?;
    init_logging(&cfg);

    match cli.command {
        Commands::Start => {
            let state = build_state(&cfg).await?;
            gateway::serve(&cfg.server, state).await?;
        }
        Commands::Status => {
            println!("{} status\n", cfg.iris.name);
            println!("Config: {}", cli.config);
            println!("Listen: {}:{}", cfg.server.host, cfg.server.port);
            println!(
                "Vision: {}",
                if cfg.vision.endpoint.is_empty() {
                    "endpoint not set".to_string()
                } else if cfg.vision.access_key.is_empty() {
                    format!("{} (missing access key)", cfg.vision.endpoint)
                } else {
                    cfg.vision.endpoint.clone()
                }
            );
            println!("Memory: {:?} ({})", cfg.memory.backend, cfg.memory.db_path);
            println!();
            println!("  caption: {}", bot_status(&cfg.caption_bot));
            println!("  ocr: {}", bot_status(&cfg.ocr_bot));
        }
        Commands::Caption { url } => {
            let vision = vision_client(&cfg)?;
            let result = vision
                .describe(&AnalysisRequest::Url(url), Some(cfg.vision.language.as_str()), None)
                .await?;
            match result.best_caption() {
                Some(c) => println!("{} ({:.2})", c.text, c.confidence),
                None => println!("(no caption)"),
            }
        }
        Commands::Ocr { url } => {
            let vision = vision_client(&cfg)?;
            let result = vision
                .recognize_text(&AnalysisRequest::Url(url), Some(cfg.vision.language.as_str()))
                .await?;
            let text = result.recognized_text();
            if text.is_empty() {
                println!("(no text found)");
            } else {
                println!("[{}]\n{text}", i18n::language_name(&result.language));
            }
        }
    }

    Ok(())
}

/// Console logging, plus a daily rolling file when `[logging] dir` is set.
fn init_logging(cfg: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.iris.log_level));

    let file_layer = cfg.logging.dir.as_ref().map(|dir| {
        let appender = tracing_appender::rolling::daily(shellexpand(dir), "iris.log");
        fmt::layer().with_writer(appender).with_ansi(false)
    });

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init();
}

fn bot_status(bot: &BotConfig) -> &'static str {
    if !bot.enabled {
        "disabled"
    } else if bot.has_credentials() {
        "configured"
    } else {
        "enabled without credentials (emulator only)"
    }
}

fn vision_client(cfg: &Config) -> anyhow::Result<VisionClient> {
    if cfg.vision.endpoint.is_empty() {
        anyhow::bail!("vision endpoint is not set. Set [vision] endpoint or IRIS_VISION_ENDPOINT.");
    }
    Ok(VisionClient::from_config(&cfg.vision))
}

/// Wire stores, telemetry, analysis, and channels into the gateway state.
async fn build_state(cfg: &Config) -> anyhow::Result<gateway::AppState> {
    if !cfg.caption_bot.enabled && !cfg.ocr_bot.enabled {
        anyhow::bail!("No bots enabled. Enable [caption_bot] or [ocr_bot] in config.toml.");
    }

    let analyzer: Arc<dyn Analyzer> = Arc::new(vision_client(cfg)?);

    let sqlite = match cfg.memory.backend {
        MemoryBackend::Sqlite => Some(SqliteStore::new(&cfg.memory).await?),
        MemoryBackend::Memory => None,
    };
    let store: Arc<dyn ConversationStore> = match &sqlite {
        Some(s) => Arc::new(s.clone()),
        None => Arc::new(MemoryStore::new()),
    };

    let mut sinks: Vec<Arc<dyn TelemetrySink>> = Vec::new();
    if cfg.telemetry.enabled {
        sinks.push(Arc::new(TracingSink));
        if cfg.telemetry.persist {
            let pool = match &sqlite {
                Some(s) => s.pool().clone(),
                None => anyhow::bail!("[telemetry] persist requires the sqlite memory backend"),
            };
            sinks.push(Arc::new(TelemetryLog::new(pool)));
        }
    }
    let telemetry = Telemetry::new(sinks);

    let caption: Option<Arc<dyn Bot>> = if cfg.caption_bot.enabled {
        let channel = Arc::new(TeamsChannel::new("caption", &cfg.caption_bot));
        let outbox = Outbox::new(channel, telemetry.clone());
        Some(Arc::new(CaptionBot::new(
            outbox,
            analyzer.clone(),
            &cfg.vision.language,
        )))
    } else {
        None
    };

    let ocr: Option<Arc<dyn Bot>> = if cfg.ocr_bot.enabled {
        let channel = Arc::new(TeamsChannel::new("ocr", &cfg.ocr_bot));
        let outbox = Outbox::new(channel, telemetry.clone());
        let delivery = Delivery::new(
            ResultStager::new(store),
            Arc::new(HttpUploader::new()),
            outbox.clone(),
        );
        Some(Arc::new(OcrBot::new(
            outbox,
            analyzer,
            delivery,
            &cfg.vision.language,
        )))
    } else {
        None
    };

    info!(
        "{} starting | memory: {:?} | telemetry: {}",
        cfg.iris.name,
        cfg.memory.backend,
        if cfg.telemetry.enabled { "on" } else { "off" }
    );
    Ok(gateway::AppState::new(caption, ocr, telemetry))
}
