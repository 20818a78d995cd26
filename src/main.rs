// Defensive programming lints - prevent panics and unsafe patterns
#![deny(clippy::indexing_slicing)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::fallible_impl_from)]
#![warn(clippy::wildcard_enum_match_arm)]
#![warn(clippy::fn_params_excessive_bools)]
// Idiomatic Rust lints
#![warn(clippy::needless_return)]
#![warn(clippy::let_and_return)]
#![warn(clippy::must_use_candidate)]
#![warn(clippy::redundant_closure_for_method_calls)]
#![warn(clippy::map_unwrap_or)]
#![warn(clippy::explicit_iter_loop)]

mod agents;
mod app;
mod config;
mod services;
mod storage;

use app::transcript::ChatLogStore;
use app::{BotResponse, ConversationMode, Services, SessionRegistry, SessionSettings};
use color_eyre::Result;
use color_eyre::eyre::{WrapErr, eyre};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use agents::openai_compat::OpenAiCompatClient;
use services::calendar::{CalendarService, GoogleCalendarClient};
use services::dates::parse_timezone;
use services::embeddings::EmbeddingClient;
use services::profiles::UserLocks;
use services::retrieval::SurrealRecipeIndex;
use services::search::GoogleWebSearch;
use storage::{LogMessage, StorageManager};

const USER_NOT_FOUND: &str = "المستخدم غير موجود. من فضلك سجل أولاً.";
const NEW_CHAT: &str = "✅ تم بدء محادثة جديدة تمامًا.";
const MODE_USAGE: &str = "استخدم /mode text أو /mode voice";
const NO_SELECTED_RECIPE: &str = "مفيش وصفة مختارة لسه. اختار وصفة الأول.";
const FAVORITE_FAILED: &str = "🚫 مقدرتش أحفظ الوصفة في المفضلة دلوقتي.";

#[tokio::main]
async fn main() -> Result<()> {
    // Setup error handling
    color_eyre::install()?;
    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let program_name = args.first().map_or("sufra", String::as_str);

    match args.get(1).map(String::as_str) {
        None | Some("--help" | "-h" | "help") => print_help(program_name),
        Some("--version" | "-v") => println!("Sufra v{}", env!("CARGO_PKG_VERSION")),
        Some("chat") => {
            let options = ChatOptions::parse(args.get(2..).unwrap_or_default())?;
            run_chat(options).await?;
        }
        Some(cmd_str) => {
            eprintln!("Unknown command: {}", cmd_str);
            eprintln!("Run with --help for available commands.");
            std::process::exit(1);
        }
    }
    Ok(())
}

/// Logs go to stderr so stdout only carries replies
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sufra=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_help(program_name: &str) {
    println!("Sufra - Egyptian kitchen assistant");
    println!();
    println!("Usage: {} chat --email <email> [--mode text|voice] [--json]", program_name);
    println!();
    println!("Commands:");
    println!("  chat       - Start a conversation for a registered user");
    println!("  --help     - Show this help");
    println!("  --version  - Show version");
    println!();
    println!("Inside a chat:");
    println!("  /new             - Start over with a fresh conversation");
    println!("  /mode text|voice - Switch reply style");
    println!("  /fav             - Save the last selected recipe as a favorite");
    println!("  /quit            - Leave");
}

#[derive(Debug, PartialEq)]
struct ChatOptions {
    email: String,
    mode: ConversationMode,
    json: bool,
}

impl ChatOptions {
    fn parse(args: &[String]) -> Result<Self> {
        let mut email = None;
        let mut mode = ConversationMode::Text;
        let mut json = false;

        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--email" => {
                    let value = iter.next().ok_or_else(|| eyre!("--email needs a value"))?;
                    email = Some(value.trim().to_string());
                }
                "--mode" => {
                    let value = iter.next().ok_or_else(|| eyre!("--mode needs a value"))?;
                    mode = ConversationMode::parse(value)
                        .ok_or_else(|| eyre!("Unknown mode '{}', expected text or voice", value))?;
                }
                "--json" => json = true,
                other => return Err(eyre!("Unknown option: {}", other)),
            }
        }

        let email = email
            .filter(|email| !email.is_empty())
            .ok_or_else(|| eyre!("chat requires --email <email>"))?;
        Ok(Self { email, mode, json })
    }
}

/// A line typed into the chat loop
#[derive(Debug, PartialEq)]
enum Input<'a> {
    NewChat,
    Mode(Option<ConversationMode>),
    Favorite,
    Quit,
    Message(&'a str),
}

impl<'a> Input<'a> {
    fn parse(line: &'a str) -> Self {
        let line = line.trim();
        match line.split_once(char::is_whitespace) {
            Some(("/mode", value)) => Input::Mode(ConversationMode::parse(value)),
            _ => match line {
                "/new" => Input::NewChat,
                "/mode" => Input::Mode(None),
                "/fav" => Input::Favorite,
                "/quit" | "/exit" => Input::Quit,
                message => Input::Message(message),
            },
        }
    }
}

fn build_services(config: &config::Config, storage: &StorageManager) -> Result<Services> {
    let locks = UserLocks::new();
    let timezone = parse_timezone(&config.calendar.timezone)?;

    let llm = OpenAiCompatClient::new(&config.llm).wrap_err("Failed to build LLM client")?;
    let embeddings =
        EmbeddingClient::new(&config.embeddings).wrap_err("Failed to build embedding client")?;
    let search = GoogleWebSearch::new(&config.search).wrap_err("Failed to build search client")?;

    let calendar: Option<Arc<dyn CalendarService>> = match GoogleCalendarClient::new(
        &config.calendar,
        timezone,
        Arc::new(storage.clone()),
        locks.clone(),
    ) {
        Ok(client) => Some(Arc::new(client)),
        Err(error) => {
            tracing::warn!(%error, "calendar client unavailable");
            None
        }
    };

    Ok(Services {
        llm: Arc::new(llm),
        recipes: Arc::new(SurrealRecipeIndex::new(storage.clone(), embeddings)),
        search: Arc::new(search),
        calendar,
        profiles: Arc::new(storage.clone()),
        locks,
    })
}

async fn run_chat(options: ChatOptions) -> Result<()> {
    let config = config::Config::load()?;
    let settings = SessionSettings::from_config(&config)?;
    let storage = StorageManager::new()
        .await
        .wrap_err("Failed to open storage")?;
    let services = build_services(&config, &storage)?;
    let registry = SessionRegistry::new(settings, services);

    let Some(id) = registry.open(&options.email, options.mode).await? else {
        println!("{}", USER_NOT_FOUND);
        return Ok(());
    };
    let input = BufReader::new(tokio::io::stdin());
    let mut output = std::io::stdout();
    run_repl(&registry, id, &storage, input, &mut output, options.json).await;
    Ok(())
}

/// Serves one session until `/quit`, end of input or an I/O failure.
///
/// The chat log is flushed on every way out of the loop.
async fn run_repl<R, W>(
    registry: &SessionRegistry,
    id: u64,
    logs: &dyn ChatLogStore,
    input: R,
    output: &mut W,
    json: bool,
) where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let Some(handle) = registry.get(id).await else {
        tracing::warn!(session_id = id, "no session to serve");
        return;
    };
    let (user_id, name) = {
        let session = handle.lock().await;
        (session.user_id().to_string(), session.profile().name.clone())
    };

    let greeting = if json {
        Ok(())
    } else {
        write_line(output, &format!("أهلاً يا {}! اكتب سؤالك أو /quit للخروج.", name))
    };

    if let Err(error) = greeting {
        tracing::warn!(%error, "could not write to output");
    } else {
        let mut lines = input.lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(error) => {
                    tracing::warn!(%error, "could not read input");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            let outcome = match Input::parse(&line) {
                Input::Quit => break,
                Input::NewChat => match registry.reset(id).await {
                    Ok(log) => {
                        flush_log(logs, &user_id, &log).await;
                        write_notice(output, NEW_CHAT, json)
                    }
                    Err(error) => Err(error),
                },
                Input::Mode(Some(mode)) => {
                    handle.lock().await.set_mode(mode);
                    write_notice(output, &format!("✅ تم التحويل لوضع {}.", mode.as_str()), json)
                }
                Input::Mode(None) => write_notice(output, MODE_USAGE, json),
                Input::Favorite => {
                    let saved = handle.lock().await.add_favorite().await;
                    let notice = match saved {
                        Ok(Some(title)) => format!("⭐ تم حفظ {} في المفضلة.", title),
                        Ok(None) => NO_SELECTED_RECIPE.to_string(),
                        Err(error) => {
                            tracing::warn!(%error, "saving favorite failed");
                            FAVORITE_FAILED.to_string()
                        }
                    };
                    write_notice(output, &notice, json)
                }
                Input::Message(text) => {
                    let mut session = handle.lock().await;
                    let response = session.handle_incoming(text).await;
                    tracing::debug!(
                        awaiting_choice = session.is_awaiting_choice(),
                        selected = ?session.selected_title(),
                        "turn handled"
                    );
                    drop(session);
                    write_response(output, &response, json)
                }
            };

            if let Err(error) = outcome {
                tracing::warn!(%error, "chat loop stopped");
                break;
            }
        }
    }

    if let Some(log) = registry.dispose(id).await {
        flush_log(logs, &user_id, &log).await;
    }
}

/// Chat logs are best effort; a failed write never ends the chat
async fn flush_log(logs: &dyn ChatLogStore, user_id: &str, log: &[LogMessage]) {
    if log.is_empty() {
        return;
    }
    match logs.save_chat_log(user_id, log).await {
        Ok(()) => tracing::info!(user_id, entries = log.len(), "chat log saved"),
        Err(error) => tracing::warn!(user_id, %error, "failed to save chat log"),
    }
}

fn write_line<W: Write>(output: &mut W, text: &str) -> Result<()> {
    writeln!(output, "{}", text)?;
    output.flush()?;
    Ok(())
}

fn write_response<W: Write>(output: &mut W, response: &BotResponse, json: bool) -> Result<()> {
    if json {
        write_line(output, &serde_json::to_string_pretty(response)?)
    } else {
        write_line(output, &response.display_text())
    }
}

fn write_notice<W: Write>(output: &mut W, text: &str, json: bool) -> Result<()> {
    write_response(output, &BotResponse::message(text), json)
}
