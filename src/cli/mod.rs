//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod chat;
pub mod say;

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::auth::{CredentialStore, API_KEY_ENV};
use crate::core::config::data::check_base_url;
use crate::core::config::{Config, ConfigKey};
use crate::core::session::ChatSession;
use crate::core::transport::GeminiClient;
use crate::utils::logging::TranscriptLog;

/// Environment variable holding the tracing filter directives.
pub const LOG_FILTER_ENV: &str = "GEMCHAT_LOG";
const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Parser)]
#[command(name = "gemchat")]
#[command(about = "A terminal chat client for Google Gemini")]
#[command(
    long_about = "gemchat is a line-oriented terminal chat client for the Gemini generateContent API. \
Each message is sent together with the whole conversation so far, and a single image \
can be attached to any message.\n\n\
Authentication:\n\
  Use 'gemchat auth' to store your Gemini API key in the system keyring.\n\n\
Environment Variables:\n\
  GEMINI_API_KEY    API key used when none is stored\n\
  GEMCHAT_LOG       Diagnostic log filter (e.g. debug, gemchat=trace)\n\n\
Commands inside the chat:\n\
  /image <path>     Attach an image to the next message\n\
  /clear-image      Drop the attached image\n\
  /send             Send the attached image without text\n\
  /auth             Enter an API key\n\
  /history          Show the number of turns so far\n\
  /log <filename>   Enable logging to specified file\n\
  /log              Toggle logging pause/resume\n\
  /quit             Leave the chat"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Gemini model to use (e.g. gemini-2.0-flash)
    #[arg(short = 'm', long, global = true, value_name = "MODEL")]
    pub model: Option<String>,

    /// Base URL of the models collection
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    /// Enable logging to specified file
    #[arg(short = 'l', long, global = true)]
    pub log: Option<String>,

    /// Keep the API key in memory only for this run
    #[arg(long, global = true)]
    pub no_keyring: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Store a Gemini API key
    Auth,
    /// Remove the stored Gemini API key
    Deauth,
    /// Start the chat interface (default)
    Chat,
    /// Send a single prompt and print the reply
    Say {
        /// Image file to attach to the prompt
        #[arg(short = 'i', long, value_name = "PATH")]
        image: Option<PathBuf>,
        /// Prompt text (multiple words are joined with spaces)
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
    },
    /// Set configuration values, or print them when no value is given
    Set {
        /// Configuration key to set (model, base-url, use-keyring)
        key: Option<String>,
        /// Value to set for the key
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        value: Vec<String>,
    },
    /// Unset configuration values
    Unset {
        /// Configuration key to unset
        key: String,
    },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    // A subscriber may already be installed when embedded; keep that one.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let mut args = Args::parse();
    let config = Config::load()?;

    match args.command.take() {
        Some(Commands::Auth) => {
            let store = persistent_credential_store(&args, &config)?;
            let mut input = std::io::stdin().lock();
            let mut output = std::io::stdout();
            if let Err(e) = store.interactive_auth(&mut input, &mut output) {
                eprintln!("❌ Authentication failed: {e}");
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Commands::Deauth) => {
            let store = persistent_credential_store(&args, &config)?;
            let mut input = std::io::stdin().lock();
            let mut output = std::io::stdout();
            if let Err(e) = store.interactive_deauth(&mut input, &mut output) {
                eprintln!("❌ Deauthentication failed: {e}");
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Commands::Set { key, value }) => run_set(config, key, value),
        Some(Commands::Unset { key }) => {
            let key = parse_key(&key);
            Config::mutate(|config| {
                config.unset_value(key);
                Ok(())
            })?;
            println!("✅ Unset {key}");
            Ok(())
        }
        Some(Commands::Say { image, prompt }) => {
            let session = build_session(&args, &config)?;
            say::run_say(&session, &prompt.join(" "), image.as_deref()).await
        }
        Some(Commands::Chat) | None => {
            let session = build_session(&args, &config)?;
            let log = TranscriptLog::new(args.log.as_ref().map(PathBuf::from))?;
            chat::run_chat(&session, log).await
        }
    }
}

fn run_set(config: Config, key: Option<String>, value: Vec<String>) -> Result<(), Box<dyn Error>> {
    let Some(key) = key else {
        config.print_all();
        return Ok(());
    };
    let key = parse_key(&key);
    if value.is_empty() {
        config.print_all();
        return Ok(());
    }

    let value = value.join(" ");
    Config::mutate(|config| config.set_value(key, &value).map_err(Into::into))?;
    println!("✅ Set {key} to: {}", value.trim());
    Ok(())
}

fn parse_key(key: &str) -> ConfigKey {
    ConfigKey::try_from(key).unwrap_or_else(|err| {
        eprintln!("❌ {err}");
        std::process::exit(1);
    })
}

fn keyring_enabled(args: &Args, config: &Config) -> bool {
    !args.no_keyring && config.use_keyring()
}

fn credential_store(args: &Args, config: &Config) -> CredentialStore {
    CredentialStore::with_keyring(keyring_enabled(args, config))
}

/// The keyring-backed store for `auth` and `deauth`. With the keyring off a
/// key would only live until the process exits, so both commands refuse.
pub fn persistent_credential_store(
    args: &Args,
    config: &Config,
) -> Result<CredentialStore, String> {
    if keyring_enabled(args, config) {
        return Ok(CredentialStore::keyring());
    }
    Err(format!(
        "The system keyring is disabled (--no-keyring or use-keyring off), so there is \
         no stored key to manage. Export {API_KEY_ENV} instead, or run \
         'gemchat set use-keyring on'."
    ))
}

/// Wires the credential store and a transport for the resolved model and
/// base URL into a fresh session.
pub fn build_session(args: &Args, config: &Config) -> Result<ChatSession, Box<dyn Error>> {
    if let Some(base_url) = args.base_url.as_deref() {
        check_base_url(base_url)?;
    }
    let transport = GeminiClient::new(
        config.resolve_base_url(args.base_url.as_deref()),
        config.resolve_model(args.model.as_deref()),
    );
    Ok(ChatSession::new(credential_store(args, config), Arc::new(transport)))
}
