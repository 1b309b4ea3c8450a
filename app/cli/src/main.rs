//! strand - a streaming LLM session engine speaking NDJSON over stdio.
//!
//! Prompts arrive on stdin (plain text or JSON lines), are dispatched to a
//! configured provider over streaming HTTP, and every observable step of the
//! session - text deltas, tool calls, step boundaries, errors - is emitted
//! as JSON on stdout. Status and diagnostics go to stderr.
//!
//! Exit codes: 0 on clean completion (EOF + idle), 1 on a fatal error,
//! 130 on interrupt.

mod input;
mod output;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use strand_api::ApiClient;
use strand_bus::EventBus;
use strand_bus::EventFilter;
use strand_loop::ProcessorConfig;
use strand_loop::SessionProcessor;
use strand_loop::StopReason;
use strand_protocol::ModelCatalog;
use strand_protocol::now_ms;
use strand_sdk::AnonymousResolver;
use strand_sdk::CredentialResolver;
use strand_sdk::ProviderCredential;
use strand_sdk::ProviderRegistry;
use strand_sdk::StaticKeyResolver;
use strand_sdk::adapters::openai_compat::OpenAiCompatConfig;
use strand_sdk::adapters::openai_compat::OpenAiCompatProvider;
use strand_session::SessionStore;
use strand_tools::ToolRegistry;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::input::InputMode;
use crate::input::InputQueue;
use crate::output::Dialect;
use crate::output::OutputEmitter;

/// Command-line surface.
#[derive(Parser, Debug)]
#[command(
    name = "strand",
    version,
    about = "Streaming LLM session engine speaking NDJSON over stdio"
)]
struct Cli {
    /// Model to use: `provider/modelId`, or a bare model id resolved
    /// through provider precedence.
    #[arg(long, default_value = "openai/gpt-4o-mini")]
    model: String,

    /// Output dialect.
    #[arg(long, value_enum, default_value = "o")]
    dialect: Dialect,

    /// Emit single-line JSON instead of pretty-printed objects.
    #[arg(long)]
    compact_json: bool,

    /// Treat each stdin line as an independent prompt (no coalescing).
    #[arg(long)]
    literal_input: bool,

    /// Coalescing window for interactive stdin, in milliseconds.
    #[arg(long, default_value_t = 50)]
    coalesce_ms: u64,

    /// Provider id the endpoint is registered under.
    #[arg(long, default_value = "openai")]
    provider: String,

    /// Base URL of the OpenAI-compatible endpoint.
    #[arg(long)]
    base_url: Option<String>,

    /// Environment variable holding the API key.
    #[arg(long, default_value = "OPENAI_API_KEY")]
    api_key_env: String,

    /// System prompt for the session.
    #[arg(long)]
    system: Option<String>,

    /// Maximum steps per turn.
    #[arg(long, default_value_t = 50)]
    max_steps: i32,
}

fn main() -> std::process::ExitCode {
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("failed to start runtime: {error}");
            return std::process::ExitCode::from(1);
        }
    };
    let code = runtime.block_on(run());
    std::process::ExitCode::from(code)
}

async fn run() -> u8 {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Credentials: a static key from the environment, or none.
    let credentials: Arc<dyn CredentialResolver> = match std::env::var(&cli.api_key_env) {
        Ok(key) if !key.is_empty() => Arc::new(
            StaticKeyResolver::new().with(cli.provider.clone(), ProviderCredential::bearer(key)),
        ),
        _ => Arc::new(AnonymousResolver),
    };

    // Static provider registry: adapters are linked at build time and
    // registered here, before the first prompt.
    let registry = ProviderRegistry::with_precedence(vec![cli.provider.clone()]);
    let provider_config = match &cli.base_url {
        Some(base_url) => OpenAiCompatConfig::new(cli.provider.clone(), base_url.clone()),
        None if cli.provider == "openai" => OpenAiCompatConfig::openai(),
        None => {
            fatal("config", "a non-openai provider requires --base-url");
            return 1;
        }
    };
    registry.register(Arc::new(OpenAiCompatProvider::new(
        provider_config,
        credentials,
    )));

    let (model, spec) = match registry.resolve_str(&cli.model) {
        Ok(resolved) => resolved,
        Err(error) => {
            fatal("model_resolution", &error.to_string());
            return 1;
        }
    };

    let bus = EventBus::new();
    let store = Arc::new(SessionStore::new(bus.clone()));
    let session = store.create(spec.clone(), cli.system.clone());

    eprintln!("strand ready: session {} model {spec}", session.id);

    // Emitter: subscribed before the first prompt so no event is missed.
    let emitter_task = tokio::spawn(output::pump(
        bus.subscribe(EventFilter::Session(session.id.clone())),
        OutputEmitter::new(cli.dialect, cli.compact_json),
    ));

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received; cancelling session");
            interrupt.cancel();
        }
    });

    let mut processor = SessionProcessor::builder()
        .store(store.clone())
        .session_id(session.id.clone())
        .model(model)
        .api_client(ApiClient::new())
        .tools(Arc::new(ToolRegistry::new()))
        .catalog(ModelCatalog::builtin())
        .config(ProcessorConfig {
            max_steps: cli.max_steps,
            max_tokens: None,
        })
        .cancel_token(cancel.clone())
        .build();

    let mode = if cli.literal_input {
        InputMode::Literal
    } else {
        InputMode::Coalesce
    };
    let mut queue = InputQueue::stdin(mode, Duration::from_millis(cli.coalesce_ms));

    let mut exit_code: u8 = 0;
    loop {
        let prompt = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            prompt = queue.next_prompt() => prompt,
        };
        let Some(prompt) = prompt else {
            // EOF (or interrupt while idle): stop reading, drain, exit.
            if cancel.is_cancelled() {
                exit_code = 130;
            }
            break;
        };

        match processor.run(&prompt).await {
            Ok(result) => match result.stop_reason {
                StopReason::Interrupted => {
                    exit_code = 130;
                    break;
                }
                StopReason::Error { message, fatal: true } => {
                    fatal("session_failed", &message);
                    exit_code = 1;
                    break;
                }
                _ => {}
            },
            Err(error) => {
                fatal("internal", &error.to_string());
                exit_code = 1;
                break;
            }
        }
    }

    // Close the bus so the emitter drains and terminates.
    drop(processor);
    drop(store);
    drop(bus);
    let _ = emitter_task.await;

    exit_code
}

/// Emit a final JSON error object on stderr.
fn fatal(code: &str, message: &str) {
    let error = serde_json::json!({
        "type": "error",
        "timestamp": now_ms(),
        "error": { "code": code, "message": message },
    });
    eprintln!("{error}");
}
