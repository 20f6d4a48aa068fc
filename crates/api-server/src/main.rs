//! API Server Binary Entry Point (spec §2.1, §6).

use std::sync::Arc;

use doc_agent_api_server::{start_server, ApiState};
use doc_agent_common::config::AppConfig;
use doc_agent_deletion_worker::DeletionWorker;
use doc_agent_dialog_logger::DialogLogger;
use doc_agent_llm_adapter::ReqwestLlmClient;
use doc_agent_materials_builder::PdfiumOpener;
use doc_agent_orchestrator::{Orchestrator, PipelineDeps};
use doc_agent_render_cache::RenderCache;
use doc_agent_request_queue::RequestQueueConfig;
use doc_agent_storage::{ObjectStoreConfig, PostgresConfig, PostgresMetadataStore, S3ObjectStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(AppConfig::load()?);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| format!("doc_agent_api_server={},tower_http=info", config.server.log_level).into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let metadata_store = Arc::new(PostgresMetadataStore::new(PostgresConfig::default()).await?);
    metadata_store.init_schema().await?;
    let object_store = Arc::new(S3ObjectStore::new(ObjectStoreConfig::default()).await?);
    let llm_client = Arc::new(ReqwestLlmClient::new(std::env::var("DOC_AGENT_LLM_BASE_URL").unwrap_or_default(), std::env::var("DOC_AGENT_LLM_API_KEY").unwrap_or_default()));
    let render_cache = Arc::new(RenderCache::open(&config.evidence_cache.dir, config.evidence_cache.max_mb, config.evidence_cache.ttl_days)?);
    let dialog_logger = Arc::new(DialogLogger::new(&config.dialog_log));

    let deletion_backend = Arc::new(doc_agent_orchestrator::deletion_backend::StorageDeletionBackend::new(
        metadata_store.clone(),
        object_store.clone(),
        dialog_logger.clone(),
    ));
    // Kept alive for the rest of `main`'s scope (which only returns at
    // process shutdown, since `start_server` runs until the listener dies):
    // dropping it early would signal the worker to drain and stop.
    let deletion_worker = DeletionWorker::spawn(deletion_backend);
    let deletion_handle = deletion_worker.handle();

    let pipeline_deps = Arc::new(PipelineDeps {
        metadata_store: metadata_store.clone(),
        project_store: metadata_store.clone(),
        object_store: object_store.clone(),
        llm_client,
        render_cache,
        pdf_opener: Arc::new(PdfiumOpener),
        dialog_logger: dialog_logger.clone(),
        config: config.clone(),
    });

    let queue_config: RequestQueueConfig = (&config.queue).into();
    let orchestrator = Arc::new(Orchestrator::new(pipeline_deps, &queue_config));

    let state = ApiState { orchestrator, metadata_store, object_store, deletion_handle, config: config.clone() };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("starting doc agent api server");
    start_server(&addr, state).await?;

    drop(deletion_worker);
    Ok(())
}
