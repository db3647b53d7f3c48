use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use intake_assist::cli::Repl;
use intake_assist::config::{AppConfig, EmbedderBackend};
use intake_assist::flows::FlowRegistry;
use intake_assist::knowledge::{
    Embedder, HashEmbedder, KnowledgeStore, LibSqlKnowledgeStore, create_openai_embedder,
};
use intake_assist::llm::{ModelGateway, create_provider};
use intake_assist::store::{Database, LibSqlBackend};
use intake_assist::{Assistant, AssistantDeps};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let config = AppConfig::from_env().context("Failed to load configuration")?;

    // Keep the guard alive so buffered log lines are flushed on exit.
    let _log_guard = init_tracing(&config);

    eprintln!("📋 Intake Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {} ({:?})", config.llm.model, config.llm.backend);
    eprintln!("   Model timeout: {}s", config.model_timeout.as_secs());

    // ── Model ───────────────────────────────────────────────────────────
    let provider = create_provider(&config.llm)?;
    let gateway = Arc::new(ModelGateway::new(provider).with_default_timeout(config.model_timeout));
    tracing::info!(
        provider = gateway.provider_name(),
        model = gateway.model_name(),
        "Model gateway ready"
    );

    // ── Database ────────────────────────────────────────────────────────
    let backend = LibSqlBackend::new_local(&config.db_path)
        .await
        .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?;
    eprintln!("   Database: {}", config.db_path.display());

    // ── Knowledge ───────────────────────────────────────────────────────
    let embedder: Arc<dyn Embedder> = match (config.embedder, &config.openai_api_key) {
        (EmbedderBackend::OpenAi, Some(key)) => create_openai_embedder(key, &config.embedding_model)?,
        _ => Arc::new(HashEmbedder::new()),
    };
    eprintln!("   Embedder: {}", embedder.id());
    let knowledge: Arc<dyn KnowledgeStore> =
        Arc::new(LibSqlKnowledgeStore::new(backend.connection(), embedder));
    eprintln!("   Knowledge items: {}", knowledge.count().await?);

    let db: Arc<dyn Database> = Arc::new(backend);

    // ── Flows ───────────────────────────────────────────────────────────
    let flows = match &config.flows_path {
        Some(path) => FlowRegistry::from_file(path)
            .with_context(|| format!("Failed to load flows from {}", path.display()))?,
        None => FlowRegistry::builtin(),
    };
    eprintln!("   Flows: {}", flows.known_flow_ids().join(", "));
    eprintln!("   Type a message and press Enter. /help for commands, /quit to exit.\n");

    let assistant = Arc::new(Assistant::new(AssistantDeps {
        db,
        knowledge: knowledge.clone(),
        gateway,
        flows: Arc::new(flows),
        config: config.assistant.clone(),
    }));

    Repl::new(assistant, knowledge).run().await?;
    Ok(())
}

/// stderr logging filtered by `RUST_LOG` (default `info`), plus a daily
/// rolling file when a log directory is configured.
fn init_tracing(config: &AppConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "intake-assist.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    guard
}
