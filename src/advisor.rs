//! The top-level facade tying scanner, index, sessions, and orchestrator
//! together. The CLI and the HTTP server both talk to [`Advisor`] and
//! nothing below it.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::chunk;
use crate::completion;
use crate::config::Config;
use crate::conversation::SessionStore;
use crate::db;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::{AdvisorError, Result};
use crate::functions::FunctionRegistry;
use crate::index::{EmbeddingIndex, ReembedReport};
use crate::migrate;
use crate::models::{AskResponse, ProjectProfile, SearchResult};
use crate::orchestrator::QueryOrchestrator;
use crate::registry_client;
use crate::scanner;

/// What one ingestion run produced.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub project_id: String,
    pub framework: String,
    pub files: usize,
    pub chunks: usize,
    pub embedded: bool,
    pub warnings: Vec<String>,
}

pub struct Advisor {
    config: Arc<Config>,
    index: Arc<EmbeddingIndex>,
    orchestrator: QueryOrchestrator,
    sessions: SessionStore,
    // Per-project write gates: re-ingestion of one project is serialized,
    // different projects proceed concurrently.
    ingest_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Advisor {
    /// Connect to storage, apply the schema, and wire up the providers
    /// named in `config`.
    pub async fn open(config: Config) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        let pool = db::connect(&config).await?;
        migrate::apply_schema(&pool).await?;

        let provider: Arc<dyn EmbeddingProvider> =
            Arc::from(embedding::create_provider(&config.embedding)?);
        let index = Arc::new(EmbeddingIndex::new(pool, provider, Arc::clone(&config)));

        let completion = completion::create_completion(&config.completion)?;
        let registry = registry_client::create_registry(&config)?;
        let orchestrator = QueryOrchestrator::new(
            Arc::clone(&index),
            FunctionRegistry::with_builtins(),
            completion,
            registry,
            Arc::clone(&config),
        );

        Ok(Self {
            sessions: SessionStore::new(config.context.max_turns),
            config,
            index,
            orchestrator,
            ingest_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn index(&self) -> &Arc<EmbeddingIndex> {
        &self.index
    }

    /// Scan `root_path` and (re-)ingest it as one project: previous chunks
    /// and vectors for the same root are replaced wholesale.
    ///
    /// With embeddings enabled a provider failure fails the whole run and
    /// leaves no partial vector batch behind; the project can be re-ingested
    /// once the provider recovers.
    pub async fn ingest_project(&self, root_path: &Path) -> Result<IngestReport> {
        let outcome = scanner::scan_project(&self.config, root_path)?;
        let project_id = outcome.profile.project_id.clone();

        let gate = self.ingest_gate(&project_id);
        let _guard = gate.lock().await;

        self.index.delete_project(&project_id).await?;
        self.index
            .save_project(&outcome.profile, &outcome.files)
            .await?;

        let mut chunks = Vec::new();
        for file in &outcome.files {
            chunks.extend(chunk::chunk_file(
                &project_id,
                &file.relative_path,
                &file.text,
                self.config.chunking.max_chunk_size,
                self.config.chunking.overlap,
            ));
        }

        let embedded = self.config.embedding.is_enabled();
        if embedded {
            self.index.embed_and_store(&chunks).await?;
        } else {
            self.index.store_chunks(&chunks).await?;
        }

        tracing::info!(
            project = %project_id,
            framework = outcome.profile.detected_framework.as_str(),
            files = outcome.files.len(),
            chunks = chunks.len(),
            embedded,
            "project ingested"
        );

        Ok(IngestReport {
            project_id,
            framework: outcome.profile.detected_framework.as_str().to_string(),
            files: outcome.files.len(),
            chunks: chunks.len(),
            embedded,
            warnings: outcome.warnings,
        })
    }

    /// Answer one query within a session. A missing or empty `session_id`
    /// starts a fresh session; the returned response carries the id to use
    /// for follow-ups. Turns within one session are strictly ordered.
    pub async fn ask(
        &self,
        session_id: Option<&str>,
        project_id: &str,
        query: &str,
    ) -> Result<AskResponse> {
        let (session_id, gate) = self.sessions.resolve(session_id);
        let _guard = gate.lock().await;

        let history = self.sessions.history(&session_id);
        let response = self
            .orchestrator
            .run(&session_id, project_id, query, &history)
            .await?;
        self.sessions.record_exchange(&session_id, query, &response);
        Ok(response)
    }

    /// Raw retrieval, for inspection: the ranked hits without the
    /// completion step.
    pub async fn search(
        &self,
        project_id: &str,
        query: &str,
        top_k: Option<usize>,
        keyword: bool,
    ) -> Result<Vec<SearchResult>> {
        if self.index.get_profile(project_id).await?.is_none() {
            return Err(AdvisorError::InvalidQuery(format!(
                "unknown project: {}",
                project_id
            )));
        }
        let top_k = top_k.unwrap_or(self.config.retrieval.top_k);
        if keyword {
            self.index.keyword_search(query, top_k, project_id).await
        } else {
            self.index.search(query, top_k, project_id).await
        }
    }

    pub async fn list_projects(&self) -> Result<Vec<ProjectProfile>> {
        self.index.list_profiles().await
    }

    pub async fn get_project(&self, project_id: &str) -> Result<Option<ProjectProfile>> {
        self.index.get_profile(project_id).await
    }

    /// Remove a project and everything derived from it. Returns whether the
    /// project existed.
    pub async fn delete_project(&self, project_id: &str) -> Result<bool> {
        if self.index.get_profile(project_id).await?.is_none() {
            return Ok(false);
        }
        self.index.delete_project(project_id).await?;
        tracing::info!(project = project_id, "project deleted");
        Ok(true)
    }

    /// Re-embed every stored chunk under the active model. Requires an
    /// enabled embedding provider.
    pub async fn reembed(&self) -> Result<ReembedReport> {
        if !self.config.embedding.is_enabled() {
            return Err(AdvisorError::EmbeddingService(
                "embedding provider is disabled; set [embedding] provider in config".to_string(),
            ));
        }
        self.index.reembed_all().await
    }

    fn ingest_gate(&self, project_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.ingest_locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(project_id.to_string()).or_default())
    }
}
