//! colloquy-ask - one-shot chat from the command line
//!
//! Lists models, probes endpoints, asks single questions and handles
//! image analysis and generation without starting the TUI.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colloquy_core::format::{byte_size, chat_list_label};
use colloquy_core::render::{EntryBody, Segment};
use colloquy_core::session::{describe_auth_failure, AuthAction};
use colloquy_core::{
    AuthFlow, ChatContext, ChatService, Config, ConversationStore, Database,
    LocalIdentityProvider, SendOutcome, UploadOutcome,
};

#[derive(Parser)]
#[command(name = "colloquy-ask")]
#[command(about = "Ask a hosted language model from the command line")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

/// Account options for commands that touch stored chats
#[derive(clap::Args)]
struct Account {
    /// Sign in with this email to store the exchange
    #[arg(long, requires = "password")]
    email: Option<String>,

    /// Password for --email
    #[arg(long, requires = "email")]
    password: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// List models grouped by kind
    Models {
        /// Output format: text (default) or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Health-check each completion endpoint
    Probe,

    /// Ask a single question and print the reply
    Ask {
        /// The message to send
        message: String,

        /// Model id (defaults to the configured default)
        #[arg(short, long)]
        model: Option<String>,

        /// Skip web search augmentation
        #[arg(long)]
        no_search: bool,

        #[command(flatten)]
        account: Account,
    },

    /// List stored chats for an account
    Chats {
        #[command(flatten)]
        account: Account,
    },

    /// Describe an image file with the vision model
    Image {
        /// Path to a PNG, JPEG, GIF, WebP or BMP file
        path: PathBuf,
    },

    /// Generate an image from a prompt
    Generate {
        prompt: String,

        /// Image model id
        #[arg(short, long)]
        model: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;
    let _log_guard =
        colloquy_core::logging::init(&config.logging).context("failed to initialize logging")?;

    match args.command {
        Command::Models { format } => list_models(&config, &format),
        Command::Probe => probe(&config).await,
        Command::Ask {
            message,
            model,
            no_search,
            account,
        } => ask(&config, &message, model.as_deref(), no_search, &account).await,
        Command::Chats { account } => list_chats(&config, &account),
        Command::Image { path } => analyze_image(&config, &path).await,
        Command::Generate { prompt, model } => generate(&config, &prompt, model.as_deref()).await,
    }
}

fn list_models(config: &Config, format: &str) -> Result<()> {
    let service = ChatService::from_config(config, in_memory_store()?)?;
    let models = service.models();
    let default = models.default_model().id;

    if format == "json" {
        let output: Vec<_> = models
            .list_models()
            .iter()
            .map(|model| {
                serde_json::json!({
                    "id": model.id,
                    "name": model.name,
                    "kind": model.kind,
                    "default": model.id == default,
                    "available": models.is_available(model.id),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    for (kind, group) in models.grouped() {
        println!("{}:", kind.group_label());
        for model in group {
            let mut flags = Vec::new();
            if model.id == default {
                flags.push("default");
            }
            if !models.is_available(model.id) {
                flags.push("upgrade required");
            }
            let flags = if flags.is_empty() {
                String::new()
            } else {
                format!(" ({})", flags.join(", "))
            };
            println!("  {:<32} {}{}", model.id, model.name, flags);
        }
        println!();
    }
    Ok(())
}

async fn probe(config: &Config) -> Result<()> {
    let service = ChatService::from_config(config, in_memory_store()?)?;
    let model = service.models().default_model().id;
    let results = service.completion().probe_endpoints(model).await;

    for result in &results {
        if result.healthy {
            println!(
                "ok    {} ({} ms)",
                result.endpoint,
                result.latency.as_millis()
            );
        } else {
            println!(
                "fail  {} ({})",
                result.endpoint,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    match service.completion().current_endpoint() {
        Some(endpoint) if results.iter().any(|r| r.healthy) => {
            println!("Using {}", endpoint);
            Ok(())
        }
        _ => anyhow::bail!("no completion endpoint is healthy"),
    }
}

async fn ask(
    config: &Config,
    message: &str,
    model: Option<&str>,
    no_search: bool,
    account: &Account,
) -> Result<()> {
    let (service, uid) = open_service(config, account)?;
    let mut ctx = service.context(&uid);
    if let Some(model) = model {
        service.select_model(&mut ctx, model);
    }
    if no_search {
        ctx.web_search_enabled = false;
    }

    match service
        .send_message(&mut ctx, message)
        .await
        .context("failed to store message")?
    {
        SendOutcome::Replied { content, used_search } => {
            println!("{}", content);
            if used_search {
                eprintln!("(web search results were included)");
            }
            Ok(())
        }
        SendOutcome::Failed(e) => {
            eprintln!("{}", e.user_message());
            Err(e).context("completion failed")
        }
        SendOutcome::Ignored => anyhow::bail!("message is empty"),
    }
}

fn list_chats(config: &Config, account: &Account) -> Result<()> {
    if account.email.is_none() {
        anyhow::bail!("--email and --password are required to list chats");
    }
    let (service, uid) = open_service(config, account)?;
    let chats = service.store().list_chats(&uid)?;

    if chats.is_empty() {
        println!("No chats yet");
    }
    for chat in &chats {
        println!("{}  {}", chat.id, chat_list_label(chat));
    }
    Ok(())
}

async fn analyze_image(config: &Config, path: &Path) -> Result<()> {
    let service = ChatService::from_config(config, in_memory_store()?)?;
    let mut ctx = service.context("cli");

    let size = std::fs::metadata(path)
        .with_context(|| format!("failed to read {}", path.display()))?
        .len();
    let outcome = service.images().upload(&mut ctx, path).await?;
    eprintln!("Uploaded {} ({})", path.display(), byte_size(size));

    match outcome {
        UploadOutcome::Analyzed => {
            print_last_reply(&ctx);
            Ok(())
        }
        UploadOutcome::Failed(e) => {
            eprintln!("{}", e.user_message());
            Err(e).context("image analysis failed")
        }
    }
}

async fn generate(config: &Config, prompt: &str, model: Option<&str>) -> Result<()> {
    let service = ChatService::from_config(config, in_memory_store()?)?;
    match service.images().generate(prompt, model).await {
        Ok(image) => {
            println!("{}", image.url);
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", e.user_message());
            Err(e).context("image generation failed")
        }
    }
}

/// Service over the real database when signed in, else a throwaway store
fn open_service(config: &Config, account: &Account) -> Result<(ChatService, String)> {
    let (Some(email), Some(password)) = (&account.email, &account.password) else {
        let service = ChatService::from_config(config, in_memory_store()?)?;
        return Ok((service, "cli".to_string()));
    };

    let db_path = Config::database_path();
    let db = Database::open(&db_path).context("failed to open database")?;
    db.migrate().context("failed to run database migrations")?;
    let db = Arc::new(db);

    let provider = LocalIdentityProvider::new(Arc::clone(&db));
    let store = ConversationStore::new(db);
    let identity = AuthFlow::new(&provider, &store)
        .sign_in(email, password)
        .map_err(|e| anyhow::anyhow!(describe_auth_failure(AuthAction::SignIn, &e)))?;

    let service = ChatService::from_config(config, store)?;
    Ok((service, identity.uid))
}

fn in_memory_store() -> Result<ConversationStore> {
    let db = Database::open_in_memory().context("failed to open in-memory database")?;
    db.migrate().context("failed to run database migrations")?;
    Ok(ConversationStore::new(Arc::new(db)))
}

fn print_last_reply(ctx: &ChatContext) {
    let Some(entry) = ctx.transcript.entries().last() else {
        return;
    };
    if let EntryBody::Text(lines) = &entry.body {
        for line in lines {
            let text: String = line
                .iter()
                .map(|segment| match segment {
                    Segment::Plain(t) | Segment::Bold(t) | Segment::Italic(t) | Segment::Code(t) => {
                        t.as_str()
                    }
                })
                .collect();
            println!("{}", text);
        }
    }
}
