//! The request pipeline (spec §4.1): loads artifacts, routes intent,
//! extracts and assembles materials, streams an answer, runs the quality
//! gate and follow-up loop, and persists the result. One call to [`run`]
//! handles exactly one admitted request.

use std::collections::HashSet;
use std::sync::Arc;

use doc_agent_block_parser::{augment_selection, parse_block_stream, serialize_block_stream, CoverageParams};
use doc_agent_common::config::AppConfig;
use doc_agent_common::{
    AnalysisIntent, AnswerResponse, Block, BlockId, BlockKind, BoundingBox, Classify,
    ComparisonSide, DocumentArtifactKind, DocumentFacts, FlashCollectorResponse, ImageKind,
    ImageRequest, MaterialsPayload, PipelineError, Profile, RoiRequest, SelectedBlock, StreamEvent,
};
use doc_agent_event_bus::EventProducer;
use doc_agent_dialog_logger::DialogLogger;
use doc_agent_evidence_renderer::render::RenderParams;
use doc_agent_html_crop_map::extract_text_by_block;
use doc_agent_llm_adapter::{
    extract_partial_answer_markdown, parse_tolerant, GenerationParams, LlmClient, LlmError,
    StreamChunk, UploadedFile,
};
use doc_agent_materials_builder::{build_materials, PdfOpener};
use doc_agent_render_cache::RenderCache;
use doc_agent_storage::models::MessageRole;
use doc_agent_storage::{MetadataStore, ObjectStore, ProjectStore};
use futures::StreamExt;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::context::RequestContext;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::materials_storage::ProjectMaterialsStorage;
use crate::prompts;

/// The maximum number of follow-up iterations the pipeline will run after
/// the initial answerer pass (spec §4.1 step 8).
const MAX_FOLLOWUP_ITERATIONS: u32 = 5;
/// Rough character bound on the text handed to the facts extractor (spec §4.1 step 4).
const FACTS_INPUT_CHAR_BUDGET: usize = 18_000;
/// Character bound on the snippet handed to the intent router (spec §4.1 step 2).
const INTENT_SNIPPET_CHAR_BUDGET: usize = 1_200;

/// Everything the pipeline needs from the rest of the workspace, composed
/// once at startup and shared across every request.
pub struct PipelineDeps {
    pub metadata_store: Arc<dyn MetadataStore>,
    pub project_store: Arc<dyn ProjectStore>,
    pub object_store: Arc<dyn ObjectStore>,
    pub llm_client: Arc<dyn LlmClient>,
    pub render_cache: Arc<RenderCache>,
    pub pdf_opener: Arc<dyn PdfOpener>,
    pub dialog_logger: Arc<DialogLogger>,
    pub config: Arc<AppConfig>,
}

/// Runs the pipeline for one request, emitting every event through
/// `events`. Any stage failure is logged and surfaced as a single `error`
/// event; this function never panics the caller's task.
pub async fn run(deps: Arc<PipelineDeps>, ctx: RequestContext, events: EventProducer) {
    if let Err(err) = run_inner(&deps, &ctx, &events).await {
        let category = err.category();
        let pipeline_error = PipelineError::new(category, err.to_string());
        warn!(request_id = %ctx.request_id, %err, "pipeline stage failed");
        let message = pipeline_error.client_message(deps.config.server.debug);
        let _ = events.emit(StreamEvent::Error { code: category.code().to_string(), message }).await;
    }
}

async fn run_inner(deps: &PipelineDeps, ctx: &RequestContext, events: &EventProducer) -> OrchestratorResult<()> {
    let storage = ProjectMaterialsStorage::new(Arc::clone(&deps.object_store), Arc::clone(&deps.project_store), ctx.document_ids.clone(), ctx.user_id);
    let render_params = render_params_from_config(&deps.config);

    events.emit(StreamEvent::PhaseStarted { phase: "load_artifacts".to_string() }).await.map_err(|_| OrchestratorError::Cancelled)?;
    let mut documents = Vec::with_capacity(ctx.document_ids.len());
    for node_id in &ctx.document_ids {
        documents.push(load_document_blocks(deps.project_store.as_ref(), deps.object_store.as_ref(), *node_id).await);
    }

    if ctx.cancellation.is_cancelled() {
        return Err(OrchestratorError::Cancelled);
    }

    events.emit(StreamEvent::PhaseStarted { phase: "classify_intent".to_string() }).await.map_err(|_| OrchestratorError::Cancelled)?;
    let all_blocks: Vec<Block> = documents.iter().flatten().cloned().collect();
    let intent = classify_intent(deps, &ctx.user_message, &all_blocks).await;

    let (answer, materials, blocks_for_gate, tier) = match ctx.profile {
        Profile::Simple => run_simple(deps, ctx, events, &all_blocks, &storage, render_params).await?,
        Profile::Complex => run_complex(deps, ctx, events, &documents, &intent, &storage, render_params).await?,
        Profile::Compare => run_compare(deps, ctx, events, &documents, &intent, &storage, render_params).await?,
    };

    events.emit(StreamEvent::PhaseStarted { phase: "quality_gate".to_string() }).await.map_err(|_| OrchestratorError::Cancelled)?;
    let (answer, materials) = run_quality_gate_and_followups(deps, ctx, events, &intent, answer, materials, &blocks_for_gate, &storage, render_params, tier).await?;

    persist_and_finalize(deps, ctx, events, &answer, &materials).await?;
    Ok(())
}

fn render_params_from_config(config: &AppConfig) -> RenderParams {
    RenderParams {
        preview_max_side: config.rendering.preview_max_side,
        zoom_preview_max_side: config.rendering.zoom_preview_max_side,
        auto_quadrants_threshold: config.rendering.auto_quadrants_threshold,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModelTier {
    Flash,
    Pro,
}

impl ModelTier {
    fn model<'a>(self, config: &'a AppConfig) -> &'a str {
        match self {
            Self::Flash => &config.llm.default_flash_model,
            Self::Pro => &config.llm.default_pro_model,
        }
    }
}

fn generation_params(config: &AppConfig, thinking_budget: u32) -> GenerationParams {
    GenerationParams {
        temperature: config.llm.temperature as f32,
        top_p: config.llm.top_p as f32,
        max_output_tokens: config.llm.max_tokens,
        thinking_budget: if config.llm.thinking_enabled { thinking_budget.max(config.llm.thinking_budget) } else { 0 },
        media_resolution: config.llm.media_resolution,
    }
}

/// Loads a document's block stream: the Markdown artifact if present,
/// otherwise a synthetic TEXT-only block set from the HTML OCR mirror
/// (spec §4.1 step 1).
async fn load_document_blocks(project_store: &dyn ProjectStore, object_store: &dyn ObjectStore, node_id: Uuid) -> Vec<Block> {
    if let Some(markdown) = load_artifact_text(project_store, object_store, node_id, DocumentArtifactKind::ResultMd).await {
        return parse_block_stream(&markdown);
    }

    if let Some(html) = load_artifact_text(project_store, object_store, node_id, DocumentArtifactKind::OcrHtml).await {
        return extract_text_by_block(&html)
            .into_iter()
            .map(|(id, content)| Block { id, kind: BlockKind::Text, page: 1, content, linked_ids: Vec::new(), crop_url: None })
            .collect();
    }

    warn!(%node_id, "no markdown or html ocr artifact found for document, proceeding with no block context");
    Vec::new()
}

async fn load_artifact_text(project_store: &dyn ProjectStore, object_store: &dyn ObjectStore, node_id: Uuid, kind: DocumentArtifactKind) -> Option<String> {
    let results = project_store.get_document_results(node_id, Some(kind)).await.ok()?;
    let result = results.first()?;
    let bytes = object_store.download(&result.object_key).await.ok().flatten()?;
    String::from_utf8(bytes).ok()
}

async fn classify_intent(deps: &PipelineDeps, question: &str, blocks: &[Block]) -> AnalysisIntent {
    let mut snippet = format!("QUESTION: {question}\n\n");
    for block in blocks {
        if snippet.chars().count() >= INTENT_SNIPPET_CHAR_BUDGET {
            break;
        }
        snippet.push_str(&block.content);
        snippet.push('\n');
    }
    let snippet: String = snippet.chars().take(INTENT_SNIPPET_CHAR_BUDGET).collect();

    let params = generation_params(&deps.config, 0);
    let result = deps
        .llm_client
        .call_structured(ModelTier::Flash.model(&deps.config), prompts::INTENT_SYSTEM_PROMPT, &snippet, &[], &prompts::intent_schema(), &params)
        .await
        .and_then(|raw| parse_tolerant(&raw))
        .and_then(|value| serde_json::from_value(value).map_err(|err| LlmError::SchemaViolation(err.to_string())));

    match result {
        Ok(intent) => intent,
        Err(err) => {
            warn!(%err, "intent classification failed, defaulting to text-only intent");
            AnalysisIntent::default()
        }
    }
}

struct DocumentSelection {
    selected_blocks: Vec<Block>,
    image_requests: Vec<ImageRequest>,
    roi_requests: Vec<RoiRequest>,
}

/// Runs the per-document flash extractor plus the coverage check for one
/// document (spec §4.1 step 3).
async fn extract_document(deps: &PipelineDeps, question: &str, blocks: &[Block], preferred_pages: &[u32]) -> DocumentSelection {
    if blocks.is_empty() {
        return DocumentSelection { selected_blocks: Vec::new(), image_requests: Vec::new(), roi_requests: Vec::new() };
    }

    let serialized = serialize_block_stream(blocks);
    let params = generation_params(&deps.config, 0);
    let result = deps
        .llm_client
        .call_structured(ModelTier::Flash.model(&deps.config), prompts::FLASH_EXTRACTOR_SYSTEM_PROMPT, &format!("QUESTION: {question}\n\n{serialized}"), &[], &prompts::flash_collector_schema(), &params)
        .await
        .and_then(|raw| parse_tolerant(&raw))
        .and_then(|value| serde_json::from_value::<FlashCollectorResponse>(value).map_err(|err| LlmError::SchemaViolation(err.to_string())));

    let extracted = match result {
        Ok(extracted) => extracted,
        Err(err) => {
            warn!(%err, "per-document extraction failed, falling back to an empty selection");
            FlashCollectorResponse::default()
        }
    };

    let coverage = augment_selection(blocks, &extracted.selected_blocks, question, preferred_pages, &extracted.requested_images, &CoverageParams::default());
    let selected_ids: HashSet<BlockId> = coverage.selected.into_iter().collect();
    let selected_blocks = blocks.iter().filter(|b| selected_ids.contains(&b.id)).cloned().collect();

    let mut image_requests = extracted.requested_images;
    image_requests.extend(coverage.new_image_requests);

    DocumentSelection { selected_blocks, image_requests, roi_requests: extracted.requested_rois }
}

async fn extract_facts(deps: &PipelineDeps, selected_blocks: &[Block]) -> Option<DocumentFacts> {
    if selected_blocks.is_empty() {
        return None;
    }

    let mut content = String::new();
    for block in selected_blocks {
        if content.chars().count() >= FACTS_INPUT_CHAR_BUDGET {
            break;
        }
        content.push_str(block.content.as_str());
        content.push('\n');
    }
    let content: String = content.chars().take(FACTS_INPUT_CHAR_BUDGET).collect();

    let params = generation_params(&deps.config, 0);
    let result = deps
        .llm_client
        .call_structured(ModelTier::Flash.model(&deps.config), prompts::FACTS_EXTRACTOR_SYSTEM_PROMPT, &content, &[], &prompts::document_facts_schema(), &params)
        .await
        .and_then(|raw| parse_tolerant(&raw))
        .and_then(|value| serde_json::from_value(value).map_err(|err| LlmError::SchemaViolation(err.to_string())));

    match result {
        Ok(facts) => Some(facts),
        Err(err) => {
            warn!(%err, "facts extraction failed, continuing without extracted facts");
            None
        }
    }
}

fn materials_json(materials: &MaterialsPayload, intent: &AnalysisIntent, question: &str) -> String {
    let payload = serde_json::json!({
        "materials": materials,
        "analysis_intent": intent,
        "question": question,
    });
    serde_json::to_string(&payload).unwrap_or_default()
}

async fn run_simple(
    deps: &PipelineDeps,
    ctx: &RequestContext,
    events: &EventProducer,
    blocks: &[Block],
    _storage: &ProjectMaterialsStorage,
    _render_params: RenderParams,
) -> OrchestratorResult<(AnswerResponse, MaterialsPayload, Vec<Block>, ModelTier)> {
    let selected: Vec<SelectedBlock> = blocks.iter().map(|b| SelectedBlock { block_id: b.id.clone(), page: b.page, content: b.content.clone(), side: None }).collect();
    let materials = MaterialsPayload { blocks: selected, images: Vec::new(), source_documents: ctx.document_ids.clone(), extracted_facts: None };

    events.emit(StreamEvent::PhaseStarted { phase: "answer".to_string() }).await.map_err(|_| OrchestratorError::Cancelled)?;
    let intent = AnalysisIntent::default();
    let user_content = materials_json(&materials, &intent, &ctx.user_message);
    let answer = stream_answer(deps, ctx, ModelTier::Flash, prompts::ANSWERER_SYSTEM_PROMPT_SIMPLE, &user_content, &[], events).await?;

    Ok((answer, materials, blocks.to_vec(), ModelTier::Flash))
}

async fn run_complex(
    deps: &PipelineDeps,
    ctx: &RequestContext,
    events: &EventProducer,
    documents: &[Vec<Block>],
    intent: &AnalysisIntent,
    storage: &ProjectMaterialsStorage,
    render_params: RenderParams,
) -> OrchestratorResult<(AnswerResponse, MaterialsPayload, Vec<Block>, ModelTier)> {
    events.emit(StreamEvent::PhaseStarted { phase: "extract".to_string() }).await.map_err(|_| OrchestratorError::Cancelled)?;

    let mut handles = Vec::new();
    for blocks in documents {
        let deps = deps_for_task(deps);
        let question = ctx.user_message.clone();
        let preferred_pages = intent.preferred_pages.clone();
        let blocks = blocks.clone();
        handles.push(tokio::spawn(async move { extract_document(&deps, &question, &blocks, &preferred_pages).await }));
    }

    let mut all_blocks = Vec::new();
    let mut all_selected = Vec::new();
    let mut image_requests = Vec::new();
    let mut roi_requests = Vec::new();
    for (handle, blocks) in handles.into_iter().zip(documents.iter()) {
        all_blocks.extend(blocks.iter().cloned());
        match handle.await {
            Ok(selection) => {
                all_selected.extend(selection.selected_blocks);
                image_requests.extend(selection.image_requests);
                roi_requests.extend(selection.roi_requests);
            }
            Err(err) => warn!(%err, "per-document extraction task panicked, skipping its selection"),
        }
    }

    events.emit(StreamEvent::PhaseStarted { phase: "extract_facts".to_string() }).await.map_err(|_| OrchestratorError::Cancelled)?;
    let facts = extract_facts(deps, &all_selected).await;

    events.emit(StreamEvent::PhaseStarted { phase: "assemble_materials".to_string() }).await.map_err(|_| OrchestratorError::Cancelled)?;
    let selected_payload: Vec<SelectedBlock> = all_selected.iter().map(|b| SelectedBlock { block_id: b.id.clone(), page: b.page, content: b.content.clone(), side: None }).collect();
    let base = MaterialsPayload { blocks: selected_payload, images: Vec::new(), source_documents: ctx.document_ids.clone(), extracted_facts: facts };
    let chat_id = ctx.chat_id.to_string();
    let materials = build_materials(storage, deps.render_cache.as_ref(), deps.pdf_opener.as_ref(), deps.dialog_logger.as_ref(), &chat_id, render_params, &image_requests, &roi_requests, base).await;
    emit_image_ready_events(events, &materials, &HashSet::new()).await;

    events.emit(StreamEvent::PhaseStarted { phase: "answer".to_string() }).await.map_err(|_| OrchestratorError::Cancelled)?;
    let user_content = materials_json(&materials, intent, &ctx.user_message);
    let files = uploaded_files(&materials);
    let answer = stream_answer(deps, ctx, ModelTier::Pro, prompts::ANSWERER_SYSTEM_PROMPT_COMPLEX, &user_content, &files, events).await?;

    Ok((answer, materials, all_blocks, ModelTier::Pro))
}

async fn run_compare(
    deps: &PipelineDeps,
    ctx: &RequestContext,
    events: &EventProducer,
    documents: &[Vec<Block>],
    intent: &AnalysisIntent,
    storage: &ProjectMaterialsStorage,
    render_params: RenderParams,
) -> OrchestratorResult<(AnswerResponse, MaterialsPayload, Vec<Block>, ModelTier)> {
    events.emit(StreamEvent::PhaseStarted { phase: "extract".to_string() }).await.map_err(|_| OrchestratorError::Cancelled)?;

    let split = documents.len().div_ceil(2);
    let (side_a, side_b) = documents.split_at(split.min(documents.len()));

    let mut all_blocks = Vec::new();
    let mut all_selected = Vec::new();
    let mut image_requests = Vec::new();
    let mut roi_requests = Vec::new();

    for (side_docs, side) in [(side_a, ComparisonSide::DocA), (side_b, ComparisonSide::DocB)] {
        for blocks in side_docs {
            all_blocks.extend(blocks.iter().cloned());
            let selection = extract_document(deps, &ctx.user_message, blocks, &intent.preferred_pages).await;
            for mut block in selection.selected_blocks {
                block.content = format!("[{side}] {}", block.content);
                all_selected.push((block, side));
            }
            image_requests.extend(selection.image_requests);
            roi_requests.extend(selection.roi_requests);
        }
    }

    events.emit(StreamEvent::PhaseStarted { phase: "assemble_materials".to_string() }).await.map_err(|_| OrchestratorError::Cancelled)?;
    let selected_payload: Vec<SelectedBlock> = all_selected.iter().map(|(b, side)| SelectedBlock { block_id: b.id.clone(), page: b.page, content: b.content.clone(), side: Some(*side) }).collect();
    let base = MaterialsPayload { blocks: selected_payload, images: Vec::new(), source_documents: ctx.document_ids.clone(), extracted_facts: None };
    let chat_id = ctx.chat_id.to_string();
    let materials = build_materials(storage, deps.render_cache.as_ref(), deps.pdf_opener.as_ref(), deps.dialog_logger.as_ref(), &chat_id, render_params, &image_requests, &roi_requests, base).await;
    emit_image_ready_events(events, &materials, &HashSet::new()).await;

    events.emit(StreamEvent::PhaseStarted { phase: "answer".to_string() }).await.map_err(|_| OrchestratorError::Cancelled)?;
    let user_content = materials_json(&materials, intent, &ctx.user_message);
    let files = uploaded_files(&materials);
    let answer = stream_answer(deps, ctx, ModelTier::Pro, prompts::ANSWERER_SYSTEM_PROMPT_COMPARE, &user_content, &files, events).await?;

    Ok((answer, materials, all_blocks, ModelTier::Pro))
}

fn deps_for_task(deps: &PipelineDeps) -> PipelineDeps {
    PipelineDeps {
        metadata_store: Arc::clone(&deps.metadata_store),
        project_store: Arc::clone(&deps.project_store),
        object_store: Arc::clone(&deps.object_store),
        llm_client: Arc::clone(&deps.llm_client),
        render_cache: Arc::clone(&deps.render_cache),
        pdf_opener: Arc::clone(&deps.pdf_opener),
        dialog_logger: Arc::clone(&deps.dialog_logger),
        config: Arc::clone(&deps.config),
    }
}

fn uploaded_files(materials: &MaterialsPayload) -> Vec<UploadedFile> {
    materials.images.iter().map(|image| UploadedFile::new(image.uploaded_file_ref.clone(), Some("image/png".to_string()))).collect()
}

async fn emit_image_ready_events(events: &EventProducer, materials: &MaterialsPayload, already_emitted: &HashSet<(BlockId, ImageKind, Option<String>)>) {
    for image in &materials.images {
        if already_emitted.contains(&image.dedup_key()) {
            continue;
        }
        let _ = events.emit(StreamEvent::ImageReady { block_id: image.block_id.clone(), kind: image.kind, bbox: image.bbox }).await;
    }
}

/// Runs `call_streaming`, forwarding `llm_thinking`/`llm_token` deltas and
/// emitting the terminal `llm_final` event (spec §4.1 step 6, §5 monotonic
/// delta invariant).
async fn stream_answer(deps: &PipelineDeps, ctx: &RequestContext, tier: ModelTier, system_prompt: &str, user_content: &str, files: &[UploadedFile], events: &EventProducer) -> OrchestratorResult<AnswerResponse> {
    let params = generation_params(&deps.config, 1024);
    let mut stream = deps.llm_client.call_streaming(tier.model(&deps.config), system_prompt, user_content, files, &params).await?;

    let mut accumulated_raw = String::new();
    let mut accumulated_answer = String::new();
    let mut done: Option<(String, String)> = None;

    while let Some(chunk) = stream.next().await {
        match chunk? {
            StreamChunk::Thinking(delta) => {
                if events.emit(StreamEvent::LlmThinking { delta }).await.is_err() {
                    return Err(OrchestratorError::Cancelled);
                }
            }
            StreamChunk::Text(delta) => {
                accumulated_raw.push_str(&delta);
                if let Some(partial) = extract_partial_answer_markdown(&accumulated_raw) {
                    if partial.len() > accumulated_answer.len() && partial.starts_with(&accumulated_answer) {
                        let token_delta = partial[accumulated_answer.len()..].to_string();
                        accumulated_answer = partial;
                        if events.emit(StreamEvent::LlmToken { accumulated: accumulated_answer.clone(), delta: token_delta }).await.is_err() {
                            return Err(OrchestratorError::Cancelled);
                        }
                    }
                }
            }
            StreamChunk::Done { full_content, model } => {
                done = Some((full_content, model));
            }
        }
    }

    let (full_content, model) = done.ok_or_else(|| OrchestratorError::Llm(LlmError::Provider("stream ended without a terminal chunk".to_string())))?;
    let chat_id = ctx.chat_id.to_string();
    let answer = match parse_tolerant(&full_content) {
        Ok(mut value) => {
            sanitize_answer_value(&mut value, deps.dialog_logger.as_ref(), &chat_id).await;
            serde_json::from_value::<AnswerResponse>(value).unwrap_or_else(|err| {
                warn!(%err, "answer JSON still did not deserialize after sanitization, falling back to raw markdown");
                AnswerResponse { answer_markdown: if accumulated_answer.is_empty() { full_content.clone() } else { accumulated_answer.clone() }, ..Default::default() }
            })
        }
        Err(_) => AnswerResponse { answer_markdown: if accumulated_answer.is_empty() { full_content.clone() } else { accumulated_answer.clone() }, ..Default::default() },
    };

    events.emit(StreamEvent::LlmFinal { content: answer.answer_markdown.clone(), model }).await.map_err(|_| OrchestratorError::Cancelled)?;
    Ok(answer)
}

/// Drops hallucinated block IDs out of `citations`/`followup_images`/
/// `followup_rois` in place, rather than failing the whole answer (spec §3
/// block-id rule, §8 scenario 6). Each drop is logged under `INVALID_BLOCK_ID`.
async fn sanitize_answer_value(value: &mut Value, dialog_logger: &DialogLogger, chat_id: &str) {
    if let Some(citations) = value.get_mut("citations").and_then(Value::as_array_mut) {
        let drained = std::mem::take(citations);
        for citation in drained {
            let raw_id = citation.get("block_id").and_then(Value::as_str).map(str::to_string);
            if raw_id.as_deref().and_then(BlockId::parse).is_some() {
                citations.push(citation);
            } else {
                log_invalid_block_id(dialog_logger, chat_id, "citations", raw_id.as_deref()).await;
            }
        }
    }

    if let Some(images) = value.get_mut("followup_images").and_then(Value::as_array_mut) {
        let drained = std::mem::take(images);
        for image in drained {
            let raw_id = image.as_str().map(str::to_string);
            if raw_id.as_deref().and_then(BlockId::parse).is_some() {
                images.push(image);
            } else {
                log_invalid_block_id(dialog_logger, chat_id, "followup_images", raw_id.as_deref()).await;
            }
        }
    }

    if let Some(rois) = value.get_mut("followup_rois").and_then(Value::as_array_mut) {
        let drained = std::mem::take(rois);
        for roi in drained {
            let raw_id = roi.get("block_id").and_then(Value::as_str).map(str::to_string);
            if raw_id.as_deref().and_then(BlockId::parse).is_some() {
                rois.push(roi);
            } else {
                log_invalid_block_id(dialog_logger, chat_id, "followup_rois", raw_id.as_deref()).await;
            }
        }
    }
}

async fn log_invalid_block_id(dialog_logger: &DialogLogger, chat_id: &str, field: &str, raw_id: Option<&str>) {
    let body = format!("field={field} block_id={}", raw_id.unwrap_or("<missing>"));
    let _ = dialog_logger.log_text(chat_id, "INVALID_BLOCK_ID", &body).await;
}

/// Parses `followup_rois` out of a raw JSON value, dropping any entry whose
/// block id fails canonical validation (logged as `INVALID_BLOCK_ID`, spec
/// §3 block-id rule) or whose bbox is degenerate.
async fn extract_valid_roi_requests(value: &Value, dialog_logger: &DialogLogger, chat_id: &str) -> Vec<RoiRequest> {
    let Some(array) = value.get("followup_rois").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut out = Vec::with_capacity(array.len());
    for item in array {
        let Some(raw_id) = item.get("block_id").and_then(Value::as_str) else { continue };
        let Some(block_id) = BlockId::parse(raw_id) else {
            log_invalid_block_id(dialog_logger, chat_id, "followup_rois", Some(raw_id)).await;
            continue;
        };
        let Some(bbox_value) = item.get("bbox") else { continue };
        let Some(x1) = bbox_value.get("x1").and_then(Value::as_f64) else { continue };
        let Some(y1) = bbox_value.get("y1").and_then(Value::as_f64) else { continue };
        let Some(x2) = bbox_value.get("x2").and_then(Value::as_f64) else { continue };
        let Some(y2) = bbox_value.get("y2").and_then(Value::as_f64) else { continue };
        let Some(bbox) = BoundingBox::clamped(x1, y1, x2, y2) else { continue };
        let dpi = item.get("dpi").and_then(Value::as_u64).map(|v| v as u32);
        out.push(RoiRequest { block_id, bbox, dpi });
    }
    out
}

#[allow(clippy::too_many_arguments)]
async fn run_quality_gate_and_followups(
    deps: &PipelineDeps,
    ctx: &RequestContext,
    events: &EventProducer,
    intent: &AnalysisIntent,
    mut answer: AnswerResponse,
    mut materials: MaterialsPayload,
    blocks: &[Block],
    storage: &ProjectMaterialsStorage,
    render_params: RenderParams,
    tier: ModelTier,
) -> OrchestratorResult<(AnswerResponse, MaterialsPayload)> {
    if intent.requires_visual_detail && !answer.has_roi_citation() && !answer.has_followups() {
        if !materials.has_images() {
            let represented: HashSet<&BlockId> = materials.images.iter().map(|i| &i.block_id).collect();
            answer.followup_images = blocks.iter().filter(|b| b.is_image() && !represented.contains(&b.id)).take(3).map(|b| b.id.clone()).collect();
        } else {
            let params = generation_params(&deps.config, 512);
            let prior = format!("QUESTION: {}\n\nPRIOR ANSWER:\n{}", ctx.user_message, answer.answer_markdown);
            let chat_id = ctx.chat_id.to_string();
            if let Ok(raw) = deps.llm_client.call_structured(tier.model(&deps.config), prompts::ROI_REQUESTER_SYSTEM_PROMPT, &prior, &[], &prompts::answer_schema(), &params).await {
                if let Ok(value) = parse_tolerant(&raw) {
                    let rois = extract_valid_roi_requests(&value, deps.dialog_logger.as_ref(), &chat_id).await;
                    if !rois.is_empty() {
                        answer.followup_rois = rois;
                    }
                }
            }
        }
    }

    let mut emitted: HashSet<(BlockId, ImageKind, Option<String>)> = materials.images.iter().map(|i| i.dedup_key()).collect();
    let mut iteration = 0;
    while answer.has_followups() && iteration < MAX_FOLLOWUP_ITERATIONS {
        iteration += 1;
        let image_requests: Vec<ImageRequest> = answer.followup_images.iter().map(|id| ImageRequest { block_id: id.clone() }).collect();
        let roi_requests = answer.followup_rois.clone();

        let chat_id = ctx.chat_id.to_string();
        materials = build_materials(storage, deps.render_cache.as_ref(), deps.pdf_opener.as_ref(), deps.dialog_logger.as_ref(), &chat_id, render_params, &image_requests, &roi_requests, materials).await;
        emit_image_ready_events(events, &materials, &emitted).await;
        emitted = materials.images.iter().map(|i| i.dedup_key()).collect();

        let system_prompt = match ctx.profile {
            Profile::Simple => prompts::ANSWERER_SYSTEM_PROMPT_SIMPLE,
            Profile::Complex => prompts::ANSWERER_SYSTEM_PROMPT_COMPLEX,
            Profile::Compare => prompts::ANSWERER_SYSTEM_PROMPT_COMPARE,
        };
        let user_content = materials_json(&materials, intent, &ctx.user_message);
        let files = uploaded_files(&materials);
        answer = stream_answer(deps, ctx, tier, system_prompt, &user_content, &files, events).await?;
    }

    Ok((answer, materials))
}

fn image_kind_str(kind: ImageKind) -> &'static str {
    match kind {
        ImageKind::Overview => "overview",
        ImageKind::Quadrant => "quadrant",
        ImageKind::Roi => "roi",
    }
}

async fn persist_and_finalize(deps: &PipelineDeps, ctx: &RequestContext, events: &EventProducer, answer: &AnswerResponse, materials: &MaterialsPayload) -> OrchestratorResult<()> {
    let user_message = deps.metadata_store.add_message(ctx.chat_id, MessageRole::User, &ctx.user_message, "text").await?;
    deps.metadata_store.add_message(ctx.chat_id, MessageRole::Assistant, &answer.answer_markdown, "text").await?;

    for image in &materials.images {
        let object_key = image.public_url.clone().unwrap_or_else(|| image.uploaded_file_ref.clone());
        if let Err(err) = deps
            .metadata_store
            .add_chat_image(ctx.chat_id, user_message.id, None, image_kind_str(image.kind), "", Some(image.width), Some(image.height), &object_key)
            .await
        {
            warn!(%err, block_id = %image.block_id.as_str(), "failed to record chat image, continuing");
        }
    }

    let dialog_payload = serde_json::json!({ "request_id": ctx.request_id, "answer": answer });
    let _ = deps.dialog_logger.log_json(&ctx.chat_id.to_string(), "ANSWER", &dialog_payload).await;

    events.emit(StreamEvent::Completed).await.map_err(|_| OrchestratorError::Cancelled)?;
    Ok(())
}
