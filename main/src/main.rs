mod args;

use std::{process::ExitCode, sync::Arc};

use anyhow::{Context, Result};
use args::{Cli, Command, IngestArgs, QueryArgs, ReingestArgs};
use async_openai::{config::OpenAIConfig, Client};
use clap::Parser;
use common::{
    storage::{db::SurrealDbClient, document_store::DocumentStore},
    utils::{
        config::{get_config, AppConfig},
        embedding::{EmbeddingProvider, TextEmbedder},
    },
};
use ingestion_pipeline::{IngestionPipeline, NewDocument};
use retrieval_pipeline::{
    ranked_results_to_json, RerankChain, RetrievalConfig, RetrievalRequest, Retriever,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();

    // Get config
    let config = get_config().context("loading configuration")?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await
        .context("connecting to SurrealDB")?,
    );

    // Ensure db is initialized
    db.ensure_schema().await?;

    let openai_client = Arc::new(Client::with_config(
        OpenAIConfig::new()
            .with_api_key(&config.openai_api_key)
            .with_api_base(&config.openai_base_url),
    ));

    let embedding_provider =
        Arc::new(EmbeddingProvider::from_config(&config, Arc::clone(&openai_client)).await?);
    info!(
        embedding_backend = embedding_provider.backend_label(),
        embedding_dimension = embedding_provider.dimension(),
        "Embedding provider initialized"
    );

    let store: Arc<dyn DocumentStore> = db;
    let embedder: Arc<dyn TextEmbedder> = embedding_provider;

    match cli.command {
        Command::Ingest(args) => ingest(store, embedder, args).await,
        Command::Reingest(args) => reingest(store, embedder, args).await,
        Command::Query(args) => query(&config, store, embedder, openai_client, args).await,
    }
}

async fn ingest(
    store: Arc<dyn DocumentStore>,
    embedder: Arc<dyn TextEmbedder>,
    args: IngestArgs,
) -> Result<ExitCode> {
    let text = tokio::fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("reading {}", args.file.display()))?;

    let mut document = NewDocument::new(args.resolved_title(), text)
        .with_tags(args.tags)
        .with_source_file(args.file.to_string_lossy());
    document.citation = args.citation;
    document.category = args.category;
    document.project_id = args.project;

    let outcome = IngestionPipeline::new(store, embedder)
        .ingest_document(document)
        .await;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(if outcome.is_complete() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn reingest(
    store: Arc<dyn DocumentStore>,
    embedder: Arc<dyn TextEmbedder>,
    args: ReingestArgs,
) -> Result<ExitCode> {
    let text = tokio::fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("reading {}", args.file.display()))?;

    let outcome = IngestionPipeline::new(store, embedder)
        .reingest_document(&args.document_id, &text)
        .await?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(if outcome.is_complete() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn query(
    config: &AppConfig,
    store: Arc<dyn DocumentStore>,
    embedder: Arc<dyn TextEmbedder>,
    openai_client: Arc<Client<OpenAIConfig>>,
    args: QueryArgs,
) -> Result<ExitCode> {
    let reranker = Arc::new(RerankChain::from_config(config, openai_client)?);
    info!(tiers = ?reranker.tier_names(), "Reranker chain initialized");

    let retriever = Retriever::new(
        store,
        embedder,
        reranker,
        RetrievalConfig::from_app_config(config),
    )?;

    let top_k = args.top_k.unwrap_or(retriever.config().default_top_k);
    let mut request = RetrievalRequest::new(args.text, top_k).with_tags(args.tags);
    if let Some(project) = args.project {
        request = request.with_project(project);
    }

    let output = if args.diagnostics {
        let run = retriever.retrieve_with_diagnostics(request).await?;
        serde_json::json!({
            "results": ranked_results_to_json(&run.results),
            "diagnostics": run.diagnostics,
            "stages": run.stage_timings.stages_run().iter().map(|stage| format!("{stage:?}")).collect::<Vec<_>>(),
        })
    } else {
        ranked_results_to_json(&retriever.retrieve(request).await?)
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(ExitCode::SUCCESS)
}
