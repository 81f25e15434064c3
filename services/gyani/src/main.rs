use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gyani_core::capabilities::{Embedder, WindowProbe};
use gyani_core::domain::DomainTable;
use gyani_core::embedding::HashingEmbedder;
use gyani_core::generator::{OfflineGenerator, TextGenerator};
use gyani_core::integrity::Sensors;
use gyani_core::knowledge::{KnowledgePaths, KnowledgeStore};
use gyani_core::rag::RagFacade;
use gyani_core::{Collaborators, SessionRegistry};
use gyani_service::config::{Config, EmbeddingProvider, LlmProvider};
use gyani_service::console::{ConsoleListener, ConsoleSpeaker};
use gyani_service::gemini_adapter::GeminiGenerator;
use gyani_service::openai_adapter::{OpenAiEmbedder, OpenAiGenerator};
use gyani_service::window::XdotoolProbe;
use std::sync::Arc;
use tracing_subscriber::fmt::time::ChronoLocal;

#[derive(Parser)]
#[command(version, about = "Voice-driven interview orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run an interview in this terminal
    Interview,
    /// Ask a one-off question answered with knowledge-base context
    Ask { question: String },
    /// Inspect or extend the knowledge base
    #[command(subcommand)]
    Knowledge(KnowledgeCommand),
}

#[derive(Subcommand)]
enum KnowledgeCommand {
    /// Print every stored entry
    List,
    /// Embed and store a text
    Add { text: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load application configuration")?;

    // --- 2. Initialize Logging ---
    // Logs go to stderr so they do not interleave with the conversation on stdout.
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Configuration loaded successfully. Starting Gyani...");

    // --- 3. Parse Command-Line Arguments ---
    let cli = Cli::parse();

    // --- 4. Initialize Backends ---
    let generator = build_generator(&config);
    let knowledge = Arc::new(
        KnowledgeStore::open(
            KnowledgePaths {
                knowledge_base: config.knowledge_base_path.clone(),
                vector_index: config.vector_index_path.clone(),
            },
            build_embedder(&config),
        )
        .context("Failed to load the knowledge base")?,
    );
    let report = knowledge.load_report();
    if report.recovered() {
        tracing::warn!(?report, "Knowledge base was repaired on load");
    }

    match cli.command {
        Command::Interview => run_interview(&config, generator, knowledge).await?,
        Command::Ask { question } => {
            let rag = RagFacade::new(generator, Some(knowledge), config.interview.retrieval_k);
            println!("{}", rag.generate_with_context(&question, &question).await);
        }
        Command::Knowledge(KnowledgeCommand::List) => {
            for (i, entry) in knowledge.entries().await.iter().enumerate() {
                println!("{i:>4}  {}", entry.text);
            }
        }
        Command::Knowledge(KnowledgeCommand::Add { text }) => {
            knowledge
                .add(&text)
                .await
                .context("Failed to add to the knowledge base")?;
            let (entries, _) = knowledge.counts().await;
            println!("Stored. The knowledge base now holds {entries} entries.");
        }
    }

    tracing::info!("Shutting down...");
    Ok(())
}

fn build_generator(config: &Config) -> Arc<dyn TextGenerator> {
    match (config.provider, &config.gemini_api_key, &config.openai_api_key) {
        (LlmProvider::Gemini, Some(key), _) => {
            Arc::new(GeminiGenerator::new(key.clone(), config.chat_model.clone()))
        }
        (LlmProvider::OpenAI, _, Some(key)) => {
            Arc::new(OpenAiGenerator::new(key.clone(), config.chat_model.clone()))
        }
        _ => {
            tracing::info!("Using the offline text generator");
            Arc::new(OfflineGenerator::default())
        }
    }
}

fn build_embedder(config: &Config) -> Arc<dyn Embedder> {
    match (config.embedding_provider, &config.openai_api_key) {
        (EmbeddingProvider::OpenAI, Some(key)) => {
            Arc::new(OpenAiEmbedder::new(key.clone(), config.vector_dimension))
        }
        _ => Arc::new(HashingEmbedder::new(config.vector_dimension)),
    }
}

async fn run_interview(
    config: &Config,
    generator: Arc<dyn TextGenerator>,
    knowledge: Arc<KnowledgeStore>,
) -> Result<()> {
    let window: Option<Arc<dyn WindowProbe>> = if config.window_monitor {
        match XdotoolProbe::detect().await {
            Ok(probe) => Some(Arc::new(probe)),
            Err(e) => {
                tracing::warn!("Window focus monitoring disabled: {:#}", e);
                None
            }
        }
    } else {
        None
    };

    let registry = SessionRegistry::new(Collaborators {
        speaker: Arc::new(ConsoleSpeaker::stdout()),
        listener: Arc::new(ConsoleListener::stdin()),
        generator,
        knowledge,
        domains: Arc::new(DomainTable::builtin()),
        // No webcam backend ships with the console build.
        sensors: Box::new(move || Sensors {
            camera: None,
            window: window.clone(),
        }),
    });

    let handle = registry
        .start_session(config.interview.clone())
        .await
        .context("Failed to start the interview")?;
    tracing::info!(session = %handle, "Interview started");

    tokio::select! {
        result = registry.wait_until_ended(handle) => {
            result.context("Lost track of the interview session")?;
            tracing::info!("Interview finished");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl-C, ending the interview...");
        }
    }

    match registry.end_session(handle).await? {
        Some(finished) => tracing::info!(
            questions = finished.counters.questions_asked,
            warnings = finished.counters.cheating_warnings,
            "Interview session closed"
        ),
        None => tracing::warn!("Interview did not shut down cleanly"),
    }
    Ok(())
}
