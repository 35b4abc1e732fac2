mod app;
mod handler;
mod tui;
mod ui;

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::runtime::Handle;
use tracing_subscriber::EnvFilter;

use chatbot_core::voice::{
    CloudSpeaker, Listen, MicListener, SpeechQueue, SpeechToText, Speaker, TextToSpeech,
};
use chatbot_core::{ChatbotClient, Config, VoiceConfig};

use app::{App, ListenerFactory};
use tui::EventHandler;

/// Terminal chat client for a remote chatbot, with hands-free voice calls
#[derive(Parser)]
#[command(name = "chatbot", version, about)]
struct Cli {
    /// Config file (defaults to <config dir>/chatbot/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Chatbot endpoint URL
    #[arg(long, env = "CHATBOT_ENDPOINT")]
    endpoint: Option<String>,

    /// API key sent with every query
    #[arg(long, env = "CHATBOT_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// User id sent with every query
    #[arg(long, env = "CHATBOT_USER_ID")]
    user_id: Option<String>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log file (defaults to <data dir>/chatbot/chatbot.log)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose, cli.log_file.as_deref()) {
        eprintln!("chatbot: {e:#}");
        return ExitCode::FAILURE;
    }

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("startup failed: {e:#}");
            eprintln!("chatbot: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            eprintln!("chatbot: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn log_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn,chatbot_core=info,chatbot_tui=info",
        1 => "warn,chatbot_core=debug,chatbot_tui=debug",
        2 => "debug",
        _ => "trace",
    }
}

/// Log to a file; the terminal belongs to the UI
fn init_logging(verbose: u8, log_file: Option<&Path>) -> Result<()> {
    let path = match log_file {
        Some(path) => path.to_path_buf(),
        None => dirs::data_local_dir()
            .context("could not determine data directory for the log file")?
            .join("chatbot")
            .join("chatbot.log"),
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create log directory {}", parent.display()))?;
    }
    let file = File::options()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_filter(verbose)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();

    Ok(())
}

/// Config file, then CLI flags and env vars on top
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::load().context("failed to load config")?,
    };

    if let Some(endpoint) = &cli.endpoint {
        config.endpoint = endpoint.clone();
    }
    if let Some(api_key) = &cli.api_key {
        config.api_key = api_key.clone();
    }
    if let Some(user_id) = &cli.user_id {
        config.user_id = user_id.clone();
    }

    config.validate()?;
    Ok(config)
}

fn speech_queue(voice: &VoiceConfig, runtime: Handle) -> SpeechQueue {
    let voice = voice.clone();
    SpeechQueue::spawn(move || {
        let api_key = voice.tts_api_key().unwrap_or_default();
        let tts = TextToSpeech::new(
            voice.tts_provider,
            api_key,
            voice.tts_voice(),
            voice.tts_speed,
            voice.tts_model(),
        )?;
        Ok(Box::new(CloudSpeaker::new(tts, runtime)?) as Box<dyn Speaker>)
    })
}

fn listener_factory(voice: &VoiceConfig, runtime: Handle) -> ListenerFactory {
    let voice = voice.clone();
    Arc::new(move || {
        let api_key = voice.stt_api_key().unwrap_or_default();
        let stt = SpeechToText::new(voice.stt_provider, api_key, voice.stt_model.clone())?;
        let timeout = Duration::from_secs(voice.listen_timeout_secs);
        Ok(Box::new(MicListener::new(stt, runtime.clone(), timeout)?) as Box<dyn Listen>)
    })
}

async fn run(config: Config) -> Result<()> {
    let runtime = Handle::current();
    let client = ChatbotClient::new(&config.endpoint, &config.api_key, &config.user_id);
    tracing::info!(endpoint = %client.endpoint(), "starting chatbot");
    let speech = speech_queue(&config.voice, runtime.clone());
    let listeners = listener_factory(&config.voice, runtime);

    let mut events = EventHandler::new();
    let mut app = App::new(client, config.trimmer(), speech, listeners, events.sender());

    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let result = run_app(&mut terminal, &mut app, &mut events).await;

    app.end_call();
    tui::restore()?;
    result
}

async fn run_app(terminal: &mut tui::Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event).await?,
            None => break,
        }
    }

    Ok(())
}
