//! CLI command execution.

use crate::agent::{Agent, AgentEvent};
use crate::cli::output::{
    OutputFormat, format_answer, format_sessions, format_stats,
};
use crate::cli::parser::{Cli, Commands, SessionCommands};
use crate::config::Config;
use crate::core::CatalogDevice;
use crate::error::{Error, Result};
use crate::retrieval::HybridRetriever;
use crate::session::SessionStore;
use crate::storage::SqliteStore;
use std::fmt::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Executes the parsed CLI command, returning the text to print.
///
/// # Errors
///
/// Returns configuration, storage, transport and agent errors.
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(db_path) = &cli.db_path {
        config.session.store_url = db_path.display().to_string();
    }

    match &cli.command {
        Commands::Init { catalog, force } => init(&config, catalog.as_deref(), *force),
        Commands::Ask {
            question,
            session,
            stream,
        } => ask(config, question, session.as_deref(), *stream, format),
        Commands::Sessions { command } => sessions(&config, command, format),
        Commands::Unlock {
            session,
            passphrase,
        } => unlock(&config, session, passphrase),
        Commands::Status => status(&config, format),
    }
}

fn open_store(config: &Config) -> Result<SqliteStore> {
    let mut store = SqliteStore::open(&config.session.store_url)?;
    store.init()?;
    Ok(store)
}

fn init(config: &Config, catalog: Option<&Path>, force: bool) -> Result<String> {
    let mut store = open_store(config)?;
    if force {
        store.reset()?;
    }

    let imported = match catalog {
        Some(path) => store.insert_devices(&read_catalog_csv(path)?)?,
        None => 0,
    };

    let store = Arc::new(Mutex::new(store));
    let embedder: Arc<dyn crate::embedding::Embedder> =
        Arc::from(crate::embedding::create_embedder()?);
    let retriever = HybridRetriever::new(Arc::clone(&store), embedder);
    let embedded = retriever.bootstrap_corpus()?;

    let mut out = String::from("initialized\n");
    let _ = writeln!(out, "corpus chunks embedded: {embedded}");
    if catalog.is_some() {
        let _ = writeln!(out, "catalog devices imported: {imported}");
    }
    Ok(out)
}

/// Reads a catalog CSV snapshot:
/// `brand_name,company_name,description,product_code[,gmdn_term[,identifier]]`.
fn read_catalog_csv(path: &Path) -> Result<Vec<CatalogDevice>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| Error::Config {
            message: format!("cannot read catalog {}: {e}", path.display()),
        })?;

    let mut devices = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| Error::Config {
            message: format!("bad catalog row: {e}"),
        })?;
        let field = |i: usize| record.get(i).unwrap_or("").trim().to_string();
        let optional = |i: usize| {
            record
                .get(i)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(std::string::ToString::to_string)
        };
        if field(0).is_empty() && field(3).is_empty() {
            continue;
        }
        devices.push(CatalogDevice {
            id: None,
            brand_name: field(0),
            company_name: field(1),
            description: field(2),
            product_code: field(3).to_ascii_uppercase(),
            gmdn_term: optional(4),
            identifier: optional(5),
        });
    }
    Ok(devices)
}

fn ask(
    config: Config,
    question: &str,
    session: Option<&str>,
    stream: bool,
    format: OutputFormat,
) -> Result<String> {
    let agent = Agent::new(config)?;
    let runtime = tokio::runtime::Runtime::new().map_err(|e| Error::Config {
        message: format!("cannot start runtime: {e}"),
    })?;

    if stream {
        return stream_ask(&runtime, agent, question, session);
    }

    let answer = runtime.block_on(agent.ask(session, question))?;
    Ok(format_answer(&answer, format))
}

/// Streams events to stdout as they arrive, returning the final answer.
#[allow(clippy::print_stdout)]
fn stream_ask(
    runtime: &tokio::runtime::Runtime,
    agent: Agent,
    question: &str,
    session: Option<&str>,
) -> Result<String> {
    let agent = Arc::new(agent);
    let session = session.map(String::from);
    let question = question.to_string();

    runtime.block_on(async move {
        let mut receiver = agent.ask_stream(session, question);
        let mut final_output = String::new();
        while let Some(event) = receiver.recv().await {
            match event {
                AgentEvent::Start { session_id } => println!("[start] session {session_id}"),
                AgentEvent::Thinking { message } => println!("[thinking] {message}"),
                AgentEvent::ToolCall { tool_name } => println!("[tool] {tool_name} ..."),
                AgentEvent::ToolResult {
                    tool_name,
                    result_count,
                    error,
                } => match error {
                    Some(reason) => println!("[tool] {tool_name} failed: {reason}"),
                    None => println!("[tool] {tool_name} -> {result_count} records"),
                },
                AgentEvent::Complete { answer } => {
                    final_output = format_answer(&answer, OutputFormat::Text);
                }
                AgentEvent::Error { code, message } => {
                    return Err(Error::Config {
                        message: format!("{code}: {message}"),
                    });
                }
            }
        }
        Ok(final_output)
    })
}

fn sessions(config: &Config, command: &SessionCommands, format: OutputFormat) -> Result<String> {
    let store = Arc::new(Mutex::new(open_store(config)?));
    let sessions = SessionStore::new(store);

    match command {
        SessionCommands::List => Ok(format_sessions(&sessions.list()?, format)),
        SessionCommands::Show { id } => {
            let record = sessions.load(id)?;
            match format {
                OutputFormat::Json => Ok(serde_json::to_string_pretty(&record)
                    .unwrap_or_else(|_| "{}".to_string())),
                OutputFormat::Text => {
                    let mut out = format!(
                        "session {} | {} messages | ${:.4}\n",
                        record.session.id, record.session.message_count, record.session.cost_usd
                    );
                    for message in &record.messages {
                        let role = match message.role {
                            crate::core::Role::System => "system",
                            crate::core::Role::User => "user",
                            crate::core::Role::Assistant => "assistant",
                            crate::core::Role::Tool => "tool",
                        };
                        let _ = writeln!(out, "--- {role}\n{}", message.content);
                    }
                    Ok(out)
                }
            }
        }
        SessionCommands::Delete { id } => {
            sessions.delete(id)?;
            Ok(format!("deleted {id}\n"))
        }
        SessionCommands::ResetContext { id, field } => {
            let resolver_field = match field.to_ascii_lowercase().as_str() {
                "devices" => crate::core::ResolverField::Devices,
                "manufacturers" => crate::core::ResolverField::Manufacturers,
                "location" => crate::core::ResolverField::Location,
                other => {
                    return Err(Error::Config {
                        message: format!(
                            "unknown context field: {other} (devices, manufacturers, location)"
                        ),
                    });
                }
            };
            let mut record = sessions.load(id)?;
            record.resolver_context.reset(resolver_field);
            // Replace the whole context: merge semantics would keep the
            // cleared field alive
            let usage = record.usage.clone();
            let context = record.resolver_context.clone();
            sessions.replace_context(id, context, usage)?;
            Ok(format!("cleared {field} for {id}\n"))
        }
    }
}

fn unlock(config: &Config, session_id: &str, passphrase: &str) -> Result<String> {
    if config.usage.override_passphrase.as_deref() != Some(passphrase) {
        return Ok("passphrase not accepted\n".to_string());
    }
    let store = Arc::new(Mutex::new(open_store(config)?));
    let sessions = SessionStore::new(store);
    let record = sessions.load(session_id)?;
    let mut usage = record.usage;
    usage.limit_usd = config.usage.hard_cap_usd;
    sessions.append(
        session_id,
        Vec::new(),
        crate::core::ResolverContext::default(),
        usage,
    )?;
    Ok(format!(
        "limit extended to ${:.2}\n",
        config.usage.hard_cap_usd
    ))
}

fn status(config: &Config, format: OutputFormat) -> Result<String> {
    let store = open_store(config)?;
    Ok(format_stats(&store.stats()?, format))
}
