mod console;
mod debug_report;

use anyhow::Context as _;
use botislav::settings::Settings;
use botislav::stats::OpenDotaClient;
use botislav::{DialogManager, HandlerSet, InboundMessage, IntentClassifier, JsonFileCacheStore};
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_USER: u64 = 1;

fn main() {
    let config = match parse_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };

    init_tracing();

    let result = match &config.command {
        Command::Classify(input) => classify(input, config.color),
        Command::Chat => chat(&config),
    };
    if let Err(err) = result {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "botislav=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn classify(input: &str, color: bool) -> anyhow::Result<()> {
    let classifier = IntentClassifier::new()?;
    let run = classifier.classify_verbose(input);
    debug_report::print_classification(input, &run, color);
    Ok(())
}

fn chat(config: &CliConfig) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    runtime.block_on(run_chat(config))
}

async fn run_chat(config: &CliConfig) -> anyhow::Result<()> {
    let mut settings = Settings::from_env()?;
    if let Some(path) = &config.cache_path {
        settings.cache_path = path.clone();
    }

    let store = JsonFileCacheStore::open(&settings.cache_path)
        .await
        .with_context(|| format!("opening cache store {}", settings.cache_path.display()))?;
    let stats = OpenDotaClient::new(&settings.opendota_base_url, settings.opendota_timeout);
    let handlers = HandlerSet::standard(Arc::new(stats), &settings);
    let manager = DialogManager::new(
        IntentClassifier::new()?,
        handlers,
        Arc::new(store),
        Arc::new(console::ConsolePlatform::new(config.color)),
    )?
    .with_apology(settings.apology.clone());

    tracing::info!(user = config.user, cache = %settings.cache_path.display(), "chat ready");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut next_id = 1;
    while let Some(line) = lines.next_line().await? {
        let Some((sender, text)) = console::parse_line(&line) else {
            continue;
        };
        let sender = sender.unwrap_or(config.user);
        if sender == console::BOT_USER {
            tracing::debug!("ignoring message authored by the bot");
            continue;
        }

        let message = InboundMessage::new(next_id, sender, text);
        next_id += 1;
        if let Err(err) = manager.handle(message).await {
            tracing::error!(error = %err, "failed to dispatch message");
        }
    }

    tracing::debug!(active = manager.registry().len(), "stdin closed, waiting for sessions");
    manager.wait_idle().await;
    Ok(())
}

enum Command {
    Classify(String),
    Chat,
}

struct CliConfig {
    command: Command,
    user: u64,
    cache_path: Option<PathBuf>,
    color: bool,
}

fn parse_args() -> Result<CliConfig, String> {
    let mut command: Option<Command> = None;
    let mut user = DEFAULT_USER;
    let mut cache_path: Option<PathBuf> = None;
    let mut color = io::stdout().is_terminal();
    let mut args = std::env::args().skip(1).peekable();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-V" | "--version" => {
                println!("botislav {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--color" => color = true,
            "--no-color" => color = false,
            "--user" => {
                let value = args.next().ok_or_else(|| "error: --user expects a value".to_string())?;
                user = parse_user(&value)?;
            }
            "--cache" => {
                let value = args.next().ok_or_else(|| "error: --cache expects a value".to_string())?;
                cache_path = Some(PathBuf::from(value));
            }
            _ if arg.starts_with("--user=") => {
                user = parse_user(arg.trim_start_matches("--user="))?;
            }
            _ if arg.starts_with("--cache=") => {
                cache_path = Some(PathBuf::from(arg.trim_start_matches("--cache=")));
            }
            _ if arg.starts_with('-') => {
                return Err(format!("error: unknown option '{arg}'"));
            }
            "chat" if command.is_none() => command = Some(Command::Chat),
            "classify" if command.is_none() => {
                let rest = args.by_ref().skip_while(|a| a == "--").collect::<Vec<_>>().join(" ");
                let input = if rest.trim().is_empty() { read_stdin_input()? } else { rest };
                if input.trim().is_empty() {
                    return Err(format!("error: no phrase provided\n\n{}", help_text()));
                }
                command = Some(Command::Classify(input));
            }
            _ => return Err(format!("error: unexpected argument '{arg}'\n\n{}", help_text())),
        }
    }

    let command = command.ok_or_else(|| format!("error: no command given\n\n{}", help_text()))?;
    Ok(CliConfig { command, user, cache_path, color })
}

fn parse_user(value: &str) -> Result<u64, String> {
    match value.parse::<u64>() {
        Ok(id) if id != console::BOT_USER => Ok(id),
        _ => Err(format!("error: invalid --user '{value}' (expected a non-zero integer)")),
    }
}

fn read_stdin_input() -> Result<String, String> {
    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer).map_err(|err| format!("error: failed to read stdin: {err}"))?;
    Ok(buffer)
}

fn print_help() {
    println!("{}", help_text());
}

fn help_text() -> String {
    format!(
        "botislav {version}

Rule-based chat bot: intent classifier and dialog engine.

Usage:
  botislav [OPTIONS] classify [--] <phrase...>
  botislav [OPTIONS] chat

Commands:
  classify                   Classify a phrase and print the grammar trace.
                             Reads stdin when no phrase is given.
  chat                       Talk to the bot on the console. Each stdin line
                             is a message, optionally prefixed with `<user>:`.

Options:
  --user <id>                Sender id for unprefixed lines. Default: {default_user}
  --cache <path>             Cache file (overrides BOTISLAV_CACHE_PATH).
  --color                    Force ANSI color output.
  --no-color                 Disable ANSI color output.
  -h, --help                 Show this help message.
  -V, --version              Print version information.

Environment:
  RUST_LOG                   Log filter. Default: botislav=info
  BOTISLAV_REPLY_TIMEOUT_SECS, BOTISLAV_REPLY_ATTEMPTS, BOTISLAV_APOLOGY,
  OPENDOTA_BASE_URL, OPENDOTA_TIMEOUT_SECS (a .env file is read if present)

Exit codes:
  0  Success.
  1  Internal error.
  2  Invalid arguments or missing input.
",
        version = env!("CARGO_PKG_VERSION"),
        default_user = DEFAULT_USER
    )
}
