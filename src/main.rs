use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use course_advisor::{
    api::{create_router, AppState},
    config::Config,
    db::{create_pool, create_redis_client, Cache, PgRepository},
    services::{
        embedding::{EmbeddingGenerator, EmbeddingModel},
        fitness::FitnessEvaluator,
        providers::gemini::GeminiProvider,
        recommendations::RecommendationService,
        retriever::SimilarityRetriever,
        seeding::seed_user_vectors,
        throttle::ThrottledQueue,
    },
};

#[derive(Parser)]
#[command(name = "course-advisor", version, about = "Course recommendation and fitness evaluation service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Compute and store profile vectors for stored students
    SeedVectors {
        /// Texts per embedding batch, defaults to EMBEDDING_BATCH_SIZE
        #[arg(long)]
        batch_size: Option<usize>,
        /// Only seed the first N students
        #[arg(long)]
        limit: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "course_advisor=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let pool = create_pool(&config.database_url, config.db_max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    tracing::info!("Database pool ready");

    let redis_client = create_redis_client(&config.redis_url)?;
    let (cache, cache_handle) = Cache::connect(redis_client)
        .await
        .context("Failed to connect to Redis")?;

    let repository = Arc::new(PgRepository::new(
        pool,
        cache,
        config.course_cache_ttl_secs,
    ));

    let embedding =
        EmbeddingModel::initialize(&config.embedding_api_url, &config.embedding_model).await;
    let generator = EmbeddingGenerator::new(embedding.clone(), config.embedding_retry());

    let result = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config, repository, embedding, generator).await,
        Command::SeedVectors { batch_size, limit } => {
            let batch_size = batch_size.unwrap_or(config.embedding_batch_size);
            seed(repository, generator, batch_size, limit).await
        }
    };

    cache_handle.shutdown().await;
    result
}

async fn serve(
    config: &Config,
    repository: Arc<PgRepository>,
    embedding: EmbeddingModel,
    generator: EmbeddingGenerator,
) -> anyhow::Result<()> {
    let gemini = Arc::new(GeminiProvider::new(
        config.gemini_api_key.clone(),
        config.gemini_api_url.clone(),
        config.gemini_model.clone(),
    ));

    let evaluator = FitnessEvaluator::new(
        gemini,
        repository.clone(),
        ThrottledQueue::new(config.evaluation_delay(), config.evaluation_max_in_flight),
        config.evaluation_retry(),
        &config.response_language,
    );

    let retriever = SimilarityRetriever::new(generator, repository.clone());
    let recommender = RecommendationService::new(retriever, repository.clone(), config.peer_count);

    let state = AppState::new(
        repository.clone(),
        repository,
        evaluator,
        recommender,
        embedding,
    );
    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn seed(
    repository: Arc<PgRepository>,
    generator: EmbeddingGenerator,
    batch_size: usize,
    limit: Option<i64>,
) -> anyhow::Result<()> {
    let report = seed_user_vectors(
        repository.as_ref(),
        repository.as_ref(),
        &generator,
        batch_size,
        limit,
    )
    .await?;

    tracing::info!(
        total = report.total,
        updated = report.updated,
        failed = report.failed,
        "Profile vectors seeded"
    );
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
