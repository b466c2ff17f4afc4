//! The embedding index: persistent storage for projects, chunks, and
//! vectors, plus similarity search over them.
//!
//! All persistence lives here. Chunk batches are written atomically: every
//! vector for a batch is computed before a transaction opens, so a provider
//! failure leaves the index exactly as it was. Vectors carry the
//! `model_version` that produced them, and search refuses to compare vectors
//! across model versions — `reembed` migrates a database to the active model.
//!
//! Score contract: similarity is cosine, clamped to `[0.0, 1.0]`. Results
//! come back sorted by descending score; ties resolve by ascending chunk id
//! so a fixed corpus and query always rank identically.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use sqlx::SqlitePool;

use crate::config::Config;
use crate::embedding::{
    blob_to_vec, cosine_similarity, embed_query, vec_to_blob, EmbeddingProvider,
};
use crate::error::{AdvisorError, Result};
use crate::models::{
    Chunk, Dependency, Embedding, FileKind, Framework, ProjectProfile, ScannedFile, SearchResult,
};

const SNIPPET_CHARS: usize = 160;

pub struct EmbeddingIndex {
    pool: SqlitePool,
    provider: Arc<dyn EmbeddingProvider>,
    config: Arc<Config>,
}

impl EmbeddingIndex {
    pub fn new(pool: SqlitePool, provider: Arc<dyn EmbeddingProvider>, config: Arc<Config>) -> Self {
        Self {
            pool,
            provider,
            config,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn active_model_version(&self) -> String {
        self.provider.model_version()
    }

    // ============ Project records ============

    /// Upserts the profile and replaces its dependency and file rows in one
    /// transaction.
    pub async fn save_project(
        &self,
        profile: &ProjectProfile,
        files: &[ScannedFile],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO projects (id, root_path, framework, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                root_path = excluded.root_path,
                framework = excluded.framework,
                created_at = excluded.created_at
            "#,
        )
        .bind(&profile.project_id)
        .bind(&profile.root_path)
        .bind(profile.detected_framework.as_str())
        .bind(profile.created_at.timestamp())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM dependencies WHERE project_id = ?")
            .bind(&profile.project_id)
            .execute(&mut *tx)
            .await?;
        for (position, dep) in profile.dependencies.iter().enumerate() {
            sqlx::query(
                "INSERT INTO dependencies (project_id, position, name, declared_version) VALUES (?, ?, ?, ?)",
            )
            .bind(&profile.project_id)
            .bind(position as i64)
            .bind(&dep.name)
            .bind(&dep.declared_version)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("DELETE FROM files WHERE project_id = ?")
            .bind(&profile.project_id)
            .execute(&mut *tx)
            .await?;
        for file in files {
            sqlx::query(
                "INSERT INTO files (project_id, relative_path, kind, content) VALUES (?, ?, ?, ?)",
            )
            .bind(&profile.project_id)
            .bind(&file.relative_path)
            .bind(file.kind.as_str())
            .bind(&file.text)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_profile(&self, project_id: &str) -> Result<Option<ProjectProfile>> {
        let row = sqlx::query_as::<_, (String, String, String, i64)>(
            "SELECT id, root_path, framework, created_at FROM projects WHERE id = ?",
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((id, root_path, framework, created_at)) = row else {
            return Ok(None);
        };

        let deps = sqlx::query_as::<_, (String, String)>(
            "SELECT name, declared_version FROM dependencies WHERE project_id = ? ORDER BY position",
        )
        .bind(&id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(ProjectProfile {
            project_id: id,
            root_path,
            detected_framework: Framework::parse(&framework),
            dependencies: deps
                .into_iter()
                .map(|(name, declared_version)| Dependency {
                    name,
                    declared_version,
                })
                .collect(),
            created_at: Utc.timestamp_opt(created_at, 0).unwrap(),
        }))
    }

    pub async fn list_profiles(&self) -> Result<Vec<ProjectProfile>> {
        let ids = sqlx::query_scalar::<_, String>("SELECT id FROM projects ORDER BY created_at, id")
            .fetch_all(&self.pool)
            .await?;

        let mut profiles = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(profile) = self.get_profile(&id).await? {
                profiles.push(profile);
            }
        }
        Ok(profiles)
    }

    /// All stored file texts for a project, in path order.
    pub async fn project_files(&self, project_id: &str) -> Result<Vec<ScannedFile>> {
        let rows = sqlx::query_as::<_, (String, String, String)>(
            "SELECT relative_path, kind, content FROM files WHERE project_id = ? ORDER BY relative_path",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(relative_path, kind, text)| ScannedFile {
                relative_path,
                kind: FileKind::parse(&kind),
                text,
            })
            .collect())
    }

    // ============ Chunk storage ============

    /// Computes one vector per chunk, then writes chunks, keyword rows, and
    /// vectors in a single transaction. Either the whole batch lands or none
    /// of it does.
    pub async fn embed_and_store(&self, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        // All embedding calls happen before the transaction opens; a
        // provider failure here leaves the index untouched.
        let mut embeddings: Vec<Embedding> = Vec::with_capacity(chunks.len());
        let model_version = self.provider.model_version();
        for batch in chunks.chunks(self.config.embedding.batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.provider.embed(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(AdvisorError::EmbeddingService(format!(
                    "provider returned {} vectors for {} texts",
                    vectors.len(),
                    batch.len()
                )));
            }
            for (chunk, vector) in batch.iter().zip(vectors) {
                embeddings.push(Embedding {
                    chunk_id: chunk.id.clone(),
                    vector,
                    model_version: model_version.clone(),
                });
            }
        }

        let mut tx = self.pool.begin().await?;
        for (chunk, embedding) in chunks.iter().zip(&embeddings) {
            insert_chunk(&mut tx, chunk).await?;
            sqlx::query(
                r#"
                INSERT INTO vectors (chunk_id, project_id, embedding, model_version, dims)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(chunk_id) DO UPDATE SET
                    embedding = excluded.embedding,
                    model_version = excluded.model_version,
                    dims = excluded.dims
                "#,
            )
            .bind(&embedding.chunk_id)
            .bind(&chunk.project_id)
            .bind(vec_to_blob(&embedding.vector))
            .bind(&embedding.model_version)
            .bind(embedding.vector.len() as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        tracing::info!(
            chunks = chunks.len(),
            model = %model_version,
            "stored embedded batch"
        );
        Ok(())
    }

    /// Writes chunks and their keyword rows without vectors. Used when the
    /// embedding provider is disabled so keyword search still works.
    pub async fn store_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for chunk in chunks {
            insert_chunk(&mut tx, chunk).await?;
        }
        tx.commit().await?;

        tracing::info!(chunks = chunks.len(), "stored keyword-only batch");
        Ok(())
    }

    /// Removes every trace of a project: vectors, keyword rows, chunks,
    /// files, dependencies, and the profile itself.
    pub async fn delete_project(&self, project_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM vectors WHERE project_id = ?")
            .bind(project_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chunks_fts WHERE project_id = ?")
            .bind(project_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chunks WHERE project_id = ?")
            .bind(project_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM files WHERE project_id = ?")
            .bind(project_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM dependencies WHERE project_id = ?")
            .bind(project_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(project_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(project_id, "deleted project");
        Ok(())
    }

    // ============ Search ============

    /// Vector similarity search scoped to one project. Fails with
    /// [`AdvisorError::StaleEmbeddings`] when stored vectors were computed
    /// under a different model than the active one.
    pub async fn search(
        &self,
        query_text: &str,
        top_k: usize,
        project_id: &str,
    ) -> Result<Vec<SearchResult>> {
        if top_k < 1 {
            return Err(AdvisorError::InvalidQuery(
                "top_k must be >= 1".to_string(),
            ));
        }

        let chunk_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE project_id = ?")
                .bind(project_id)
                .fetch_one(&self.pool)
                .await?;
        if chunk_count == 0 {
            return Ok(Vec::new());
        }

        self.check_model_version(project_id).await?;

        let query_vector = embed_query(self.provider.as_ref(), query_text).await?;

        let rows = sqlx::query_as::<_, (String, Vec<u8>, String, String)>(
            r#"
            SELECT v.chunk_id, v.embedding, c.source_file, c.text
            FROM vectors v
            JOIN chunks c ON c.id = v.chunk_id
            WHERE v.project_id = ?
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<SearchResult> = rows
            .into_iter()
            .map(|(chunk_id, blob, source_file, text)| {
                let score = cosine_similarity(&query_vector, &blob_to_vec(&blob)).clamp(0.0, 1.0);
                SearchResult {
                    chunk_id,
                    source_file,
                    similarity_score: score,
                    rank: 0,
                    snippet: make_snippet(&text),
                }
            })
            .filter(|r| r.similarity_score >= self.config.retrieval.min_score)
            .collect();

        sort_and_rank(&mut scored, top_k);
        Ok(scored)
    }

    /// FTS5 keyword search, used when query embedding is unavailable.
    /// BM25-derived scores are min-max normalized into `[0.0, 1.0]`.
    pub async fn keyword_search(
        &self,
        query_text: &str,
        top_k: usize,
        project_id: &str,
    ) -> Result<Vec<SearchResult>> {
        if top_k < 1 {
            return Err(AdvisorError::InvalidQuery(
                "top_k must be >= 1".to_string(),
            ));
        }

        let match_expr = fts_match_expression(query_text);
        if match_expr.is_empty() {
            return Ok(Vec::new());
        }

        let candidate_k = (top_k * 8).max(64) as i64;
        let rows = sqlx::query_as::<_, (String, f64)>(
            r#"
            SELECT chunk_id, -rank AS score
            FROM chunks_fts
            WHERE chunks_fts MATCH ? AND project_id = ?
            ORDER BY rank
            LIMIT ?
            "#,
        )
        .bind(&match_expr)
        .bind(project_id)
        .bind(candidate_k)
        .fetch_all(&self.pool)
        .await?;

        let raw: Vec<f64> = rows.iter().map(|(_, s)| *s).collect();
        let normalized = normalize_scores(&raw);

        let mut scored = Vec::with_capacity(rows.len());
        for ((chunk_id, _), score) in rows.into_iter().zip(normalized) {
            let (source_file, text) = sqlx::query_as::<_, (String, String)>(
                "SELECT source_file, text FROM chunks WHERE id = ?",
            )
            .bind(&chunk_id)
            .fetch_one(&self.pool)
            .await?;
            let score = score as f32;
            if score < self.config.retrieval.min_score {
                continue;
            }
            scored.push(SearchResult {
                chunk_id,
                source_file,
                similarity_score: score,
                rank: 0,
                snippet: make_snippet(&text),
            });
        }

        sort_and_rank(&mut scored, top_k);
        Ok(scored)
    }

    /// Loads full chunk texts for context assembly, preserving input order.
    pub async fn chunks_by_ids(&self, ids: &[String]) -> Result<Vec<Chunk>> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let row = sqlx::query_as::<_, (String, String, String, i64, i64, String, i64)>(
                r#"
                SELECT id, project_id, source_file, byte_start, byte_end, text, chunk_index
                FROM chunks WHERE id = ?
                "#,
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            if let Some((id, project_id, source_file, byte_start, byte_end, text, chunk_index)) =
                row
            {
                out.push(Chunk {
                    id,
                    project_id,
                    source_file,
                    byte_start,
                    byte_end,
                    text,
                    chunk_index,
                });
            }
        }
        Ok(out)
    }

    // ============ Model migration ============

    /// Re-computes every stored vector under the active model, one project
    /// at a time. Each project's replacement happens in its own transaction.
    pub async fn reembed_all(&self) -> Result<ReembedReport> {
        let project_ids =
            sqlx::query_scalar::<_, String>("SELECT DISTINCT project_id FROM chunks ORDER BY project_id")
                .fetch_all(&self.pool)
                .await?;

        let model_version = self.provider.model_version();
        let mut report = ReembedReport::default();

        for project_id in project_ids {
            let chunks = self.project_chunks(&project_id).await?;

            let mut embeddings: Vec<Embedding> = Vec::with_capacity(chunks.len());
            for batch in chunks.chunks(self.config.embedding.batch_size.max(1)) {
                let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
                let vectors = self.provider.embed(&texts).await?;
                for (chunk, vector) in batch.iter().zip(vectors) {
                    embeddings.push(Embedding {
                        chunk_id: chunk.id.clone(),
                        vector,
                        model_version: model_version.clone(),
                    });
                }
            }

            let mut tx = self.pool.begin().await?;
            sqlx::query("DELETE FROM vectors WHERE project_id = ?")
                .bind(&project_id)
                .execute(&mut *tx)
                .await?;
            for embedding in &embeddings {
                sqlx::query(
                    "INSERT INTO vectors (chunk_id, project_id, embedding, model_version, dims) VALUES (?, ?, ?, ?, ?)",
                )
                .bind(&embedding.chunk_id)
                .bind(&project_id)
                .bind(vec_to_blob(&embedding.vector))
                .bind(&embedding.model_version)
                .bind(embedding.vector.len() as i64)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;

            tracing::info!(
                project_id = %project_id,
                chunks = embeddings.len(),
                model = %model_version,
                "re-embedded project"
            );
            report.projects += 1;
            report.chunks += embeddings.len();
        }

        Ok(report)
    }

    async fn project_chunks(&self, project_id: &str) -> Result<Vec<Chunk>> {
        let rows = sqlx::query_as::<_, (String, String, String, i64, i64, String, i64)>(
            r#"
            SELECT id, project_id, source_file, byte_start, byte_end, text, chunk_index
            FROM chunks WHERE project_id = ?
            ORDER BY source_file, chunk_index
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(id, project_id, source_file, byte_start, byte_end, text, chunk_index)| Chunk {
                    id,
                    project_id,
                    source_file,
                    byte_start,
                    byte_end,
                    text,
                    chunk_index,
                },
            )
            .collect())
    }

    async fn check_model_version(&self, project_id: &str) -> Result<()> {
        let stored: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT model_version FROM vectors WHERE project_id = ?",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        let active = self.provider.model_version();
        if let Some(mismatch) = stored.iter().find(|m| **m != active) {
            return Err(AdvisorError::StaleEmbeddings {
                stored: mismatch.clone(),
                active,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct ReembedReport {
    pub projects: usize,
    pub chunks: usize,
}

async fn insert_chunk(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    chunk: &Chunk,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO chunks (id, project_id, source_file, byte_start, byte_end, text, chunk_index)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO NOTHING
        "#,
    )
    .bind(&chunk.id)
    .bind(&chunk.project_id)
    .bind(&chunk.source_file)
    .bind(chunk.byte_start)
    .bind(chunk.byte_end)
    .bind(&chunk.text)
    .bind(chunk.chunk_index)
    .execute(&mut **tx)
    .await?;

    // Keep the keyword mirror free of duplicate rows on idempotent re-runs.
    sqlx::query("DELETE FROM chunks_fts WHERE chunk_id = ?")
        .bind(&chunk.id)
        .execute(&mut **tx)
        .await?;
    sqlx::query("INSERT INTO chunks_fts (chunk_id, project_id, text) VALUES (?, ?, ?)")
        .bind(&chunk.id)
        .bind(&chunk.project_id)
        .bind(&chunk.text)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

/// Descending score, ties by ascending chunk id, then cut to `top_k` and
/// assign 1-based ranks.
fn sort_and_rank(results: &mut Vec<SearchResult>, top_k: usize) {
    results.sort_by(|a, b| {
        b.similarity_score
            .partial_cmp(&a.similarity_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    results.truncate(top_k);
    for (i, result) in results.iter_mut().enumerate() {
        result.rank = i + 1;
    }
}

/// Min-max normalization to [0.0, 1.0]. All-equal inputs map to 1.0.
fn normalize_scores(scores: &[f64]) -> Vec<f64> {
    if scores.is_empty() {
        return Vec::new();
    }
    let min = scores.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if (max - min).abs() < f64::EPSILON {
        return vec![1.0; scores.len()];
    }
    scores.iter().map(|s| (s - min) / (max - min)).collect()
}

/// Quotes each term so FTS5 treats user text as plain words, not syntax.
fn fts_match_expression(query: &str) -> String {
    query
        .split_whitespace()
        .map(|term| term.replace(|c: char| !c.is_alphanumeric(), ""))
        .filter(|term| !term.is_empty())
        .map(|term| format!("\"{}\"", term))
        .collect::<Vec<_>>()
        .join(" OR ")
}

fn make_snippet(text: &str) -> String {
    let flat = text.replace(['\n', '\r'], " ");
    let trimmed = flat.trim();
    if trimmed.chars().count() <= SNIPPET_CHARS {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(SNIPPET_CHARS).collect();
    format!("{}…", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::chunk_file;
    use crate::migrate;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Maps exact texts to fixed vectors; optionally fails from the Nth
    /// batch call onward.
    struct ScriptedProvider {
        model: String,
        dims: usize,
        vectors: HashMap<String, Vec<f32>>,
        fail_from_call: Option<usize>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(model: &str, dims: usize) -> Self {
            Self {
                model: model.to_string(),
                dims,
                vectors: HashMap::new(),
                fail_from_call: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn with_vector(mut self, text: &str, vector: Vec<f32>) -> Self {
            self.vectors.insert(text.to_string(), vector);
            self
        }

        fn failing_from(mut self, call: usize) -> Self {
            self.fail_from_call = Some(call);
            self
        }
    }

    #[async_trait]
    impl EmbeddingProvider for ScriptedProvider {
        fn model_version(&self) -> String {
            self.model.clone()
        }
        fn dims(&self) -> usize {
            self.dims
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(from) = self.fail_from_call {
                if call >= from {
                    return Err(AdvisorError::EmbeddingService(
                        "synthetic provider outage".to_string(),
                    ));
                }
            }
            texts
                .iter()
                .map(|t| {
                    self.vectors.get(t).cloned().ok_or_else(|| {
                        AdvisorError::EmbeddingService(format!("unscripted text: {}", t))
                    })
                })
                .collect()
        }
    }

    async fn test_index(tmp: &TempDir, provider: ScriptedProvider) -> EmbeddingIndex {
        let config = Config::minimal(tmp.path().join("advisor.db"));
        let pool = crate::db::connect(&config).await.unwrap();
        migrate::apply_schema(&pool).await.unwrap();
        EmbeddingIndex::new(pool, Arc::new(provider), Arc::new(config))
    }

    fn manual_chunk(id: &str, project_id: &str, source_file: &str, text: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            project_id: project_id.to_string(),
            source_file: source_file.to_string(),
            byte_start: 0,
            byte_end: text.len() as i64,
            text: text.to_string(),
            chunk_index: 0,
        }
    }

    /// Unit vector whose cosine against the unit query [1, 0] is exactly `c`.
    fn at_similarity(c: f32) -> Vec<f32> {
        vec![c, (1.0 - c * c).sqrt()]
    }

    #[tokio::test]
    async fn test_search_orders_by_score_and_cuts_to_top_k() {
        let tmp = TempDir::new().unwrap();
        let provider = ScriptedProvider::new("fake:v1", 2)
            .with_vector("query", vec![1.0, 0.0])
            .with_vector("high", at_similarity(0.91))
            .with_vector("mid", at_similarity(0.75))
            .with_vector("low", at_similarity(0.40));
        let index = test_index(&tmp, provider).await;

        let chunks = vec![
            manual_chunk("c-high", "p1", "a.js", "high"),
            manual_chunk("c-mid", "p1", "b.js", "mid"),
            manual_chunk("c-low", "p1", "c.js", "low"),
        ];
        index.embed_and_store(&chunks).await.unwrap();

        let results = index.search("query", 2, "p1").await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk_id, "c-high");
        assert_eq!(results[1].chunk_id, "c-mid");
        assert!((results[0].similarity_score - 0.91).abs() < 1e-3);
        assert!((results[1].similarity_score - 0.75).abs() < 1e-3);
        assert_eq!(results[0].rank, 1);
        assert_eq!(results[1].rank, 2);
        assert!(results[0].similarity_score >= results[1].similarity_score);
    }

    #[tokio::test]
    async fn test_equal_scores_tie_break_by_chunk_id() {
        let tmp = TempDir::new().unwrap();
        let provider = ScriptedProvider::new("fake:v1", 2)
            .with_vector("query", vec![1.0, 0.0])
            .with_vector("twin one", vec![1.0, 0.0])
            .with_vector("twin two", vec![1.0, 0.0]);
        let index = test_index(&tmp, provider).await;

        // Insert in reverse id order to prove the sort does the work.
        let chunks = vec![
            manual_chunk("zzzz", "p1", "z.js", "twin two"),
            manual_chunk("aaaa", "p1", "a.js", "twin one"),
        ];
        index.embed_and_store(&chunks).await.unwrap();

        let results = index.search("query", 5, "p1").await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk_id, "aaaa");
        assert_eq!(results[1].chunk_id, "zzzz");
    }

    #[tokio::test]
    async fn test_partial_batch_failure_stores_nothing() {
        let tmp = TempDir::new().unwrap();
        // Batch size 10 with default config; force two calls with 10 chunks
        // by shrinking the batch size.
        let mut config = Config::minimal(tmp.path().join("advisor.db"));
        config.embedding.batch_size = 5;
        let provider = {
            let mut p = ScriptedProvider::new("fake:v1", 2).failing_from(1);
            for i in 0..10 {
                p.vectors
                    .insert(format!("chunk text {}", i), vec![1.0, 0.0]);
            }
            p
        };
        let pool = crate::db::connect(&config).await.unwrap();
        migrate::apply_schema(&pool).await.unwrap();
        let index = EmbeddingIndex::new(pool.clone(), Arc::new(provider), Arc::new(config));

        let chunks: Vec<Chunk> = (0..10)
            .map(|i| {
                manual_chunk(
                    &format!("chunk-{:02}", i),
                    "p1",
                    "f.js",
                    &format!("chunk text {}", i),
                )
            })
            .collect();

        let err = index.embed_and_store(&chunks).await.unwrap_err();
        assert!(matches!(err, AdvisorError::EmbeddingService(_)));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE project_id = 'p1'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
        let vectors: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM vectors WHERE project_id = 'p1'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(vectors, 0);

        let results = index.search("chunk text 0", 5, "p1").await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_delete_project_then_search_is_empty() {
        let tmp = TempDir::new().unwrap();
        let provider = ScriptedProvider::new("fake:v1", 2)
            .with_vector("query", vec![1.0, 0.0])
            .with_vector("body", vec![1.0, 0.0]);
        let index = test_index(&tmp, provider).await;

        index
            .embed_and_store(&[manual_chunk("c1", "p1", "a.js", "body")])
            .await
            .unwrap();
        assert_eq!(index.search("query", 3, "p1").await.unwrap().len(), 1);

        index.delete_project("p1").await.unwrap();
        let results = index.search("query", 3, "p1").await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_reingest_identical_content_reproduces_ids_and_ranking() {
        let tmp = TempDir::new().unwrap();
        let text = "redux store setup\n\nconnect the provider\n\nselectors and reducers";
        let chunks = chunk_file("p1", "store.js", text, 30, 8);
        let mut provider = ScriptedProvider::new("fake:v1", 2).with_vector("query", vec![1.0, 0.0]);
        for (i, chunk) in chunks.iter().enumerate() {
            provider
                .vectors
                .insert(chunk.text.clone(), at_similarity(0.9 - 0.1 * i as f32));
        }
        let index = test_index(&tmp, provider).await;

        index.embed_and_store(&chunks).await.unwrap();
        let first = index.search("query", 5, "p1").await.unwrap();

        index.delete_project("p1").await.unwrap();
        let rechunked = chunk_file("p1", "store.js", text, 30, 8);
        let ids_a: Vec<_> = chunks.iter().map(|c| c.id.clone()).collect();
        let ids_b: Vec<_> = rechunked.iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids_a, ids_b);

        index.embed_and_store(&rechunked).await.unwrap();
        let second = index.search("query", 5, "p1").await.unwrap();

        let ranks_a: Vec<_> = first.iter().map(|r| r.chunk_id.clone()).collect();
        let ranks_b: Vec<_> = second.iter().map(|r| r.chunk_id.clone()).collect();
        assert_eq!(ranks_a, ranks_b);
    }

    #[tokio::test]
    async fn test_stale_model_version_blocks_search() {
        let tmp = TempDir::new().unwrap();
        let provider = ScriptedProvider::new("fake:v1", 2)
            .with_vector("query", vec![1.0, 0.0])
            .with_vector("body", vec![1.0, 0.0]);
        let config = Config::minimal(tmp.path().join("advisor.db"));
        let pool = crate::db::connect(&config).await.unwrap();
        migrate::apply_schema(&pool).await.unwrap();
        let config = Arc::new(config);
        let index = EmbeddingIndex::new(pool.clone(), Arc::new(provider), config.clone());
        index
            .embed_and_store(&[manual_chunk("c1", "p1", "a.js", "body")])
            .await
            .unwrap();

        let upgraded = ScriptedProvider::new("fake:v2", 2).with_vector("query", vec![1.0, 0.0]);
        let index_v2 = EmbeddingIndex::new(pool, Arc::new(upgraded), config);
        let err = index_v2.search("query", 3, "p1").await.unwrap_err();
        match err {
            AdvisorError::StaleEmbeddings { stored, active } => {
                assert_eq!(stored, "fake:v1");
                assert_eq!(active, "fake:v2");
            }
            other => panic!("expected StaleEmbeddings, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reembed_migrates_to_active_model() {
        let tmp = TempDir::new().unwrap();
        let provider = ScriptedProvider::new("fake:v1", 2)
            .with_vector("query", vec![1.0, 0.0])
            .with_vector("body", vec![1.0, 0.0]);
        let config = Config::minimal(tmp.path().join("advisor.db"));
        let pool = crate::db::connect(&config).await.unwrap();
        migrate::apply_schema(&pool).await.unwrap();
        let config = Arc::new(config);
        let index = EmbeddingIndex::new(pool.clone(), Arc::new(provider), config.clone());
        index
            .embed_and_store(&[manual_chunk("c1", "p1", "a.js", "body")])
            .await
            .unwrap();

        let upgraded = ScriptedProvider::new("fake:v2", 2)
            .with_vector("query", vec![1.0, 0.0])
            .with_vector("body", vec![0.0, 1.0]);
        let index_v2 = EmbeddingIndex::new(pool, Arc::new(upgraded), config);
        let report = index_v2.reembed_all().await.unwrap();
        assert_eq!(report.projects, 1);
        assert_eq!(report.chunks, 1);

        // Search works again and reflects the new vectors.
        let results = index_v2.search("query", 3, "p1").await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].similarity_score.abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_keyword_search_over_unvectored_chunks() {
        let tmp = TempDir::new().unwrap();
        let provider = ScriptedProvider::new("disabled", 0);
        let index = test_index(&tmp, provider).await;

        index
            .store_chunks(&[
                manual_chunk("c1", "p1", "store.js", "redux store configuration"),
                manual_chunk("c2", "p1", "view.js", "template rendering helpers"),
            ])
            .await
            .unwrap();

        let results = index.keyword_search("redux", 5, "p1").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk_id, "c1");
        assert!(results[0].similarity_score > 0.0);
        assert!(results[0].similarity_score <= 1.0);
    }

    #[tokio::test]
    async fn test_keyword_search_quotes_hostile_input() {
        let tmp = TempDir::new().unwrap();
        let provider = ScriptedProvider::new("disabled", 0);
        let index = test_index(&tmp, provider).await;
        index
            .store_chunks(&[manual_chunk("c1", "p1", "a.js", "plain text body")])
            .await
            .unwrap();

        // Unbalanced quote and operators must not produce an FTS syntax error.
        let results = index
            .keyword_search("\"plain AND (text", 5, "p1")
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_search_rejects_zero_top_k() {
        let tmp = TempDir::new().unwrap();
        let provider = ScriptedProvider::new("fake:v1", 2);
        let index = test_index(&tmp, provider).await;
        let err = index.search("query", 0, "p1").await.unwrap_err();
        assert!(matches!(err, AdvisorError::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn test_min_score_filters_low_matches() {
        let tmp = TempDir::new().unwrap();
        let provider = ScriptedProvider::new("fake:v1", 2)
            .with_vector("query", vec![1.0, 0.0])
            .with_vector("near", at_similarity(0.9))
            .with_vector("far", at_similarity(0.2));
        let mut config = Config::minimal(tmp.path().join("advisor.db"));
        config.retrieval.min_score = 0.5;
        let pool = crate::db::connect(&config).await.unwrap();
        migrate::apply_schema(&pool).await.unwrap();
        let index = EmbeddingIndex::new(pool, Arc::new(provider), Arc::new(config));

        index
            .embed_and_store(&[
                manual_chunk("c1", "p1", "a.js", "near"),
                manual_chunk("c2", "p1", "b.js", "far"),
            ])
            .await
            .unwrap();

        let results = index.search("query", 5, "p1").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk_id, "c1");
    }

    #[tokio::test]
    async fn test_profile_round_trip() {
        let tmp = TempDir::new().unwrap();
        let provider = ScriptedProvider::new("disabled", 0);
        let index = test_index(&tmp, provider).await;

        let profile = ProjectProfile {
            project_id: "p1".to_string(),
            root_path: "/work/shop".to_string(),
            detected_framework: Framework::React,
            dependencies: vec![
                Dependency {
                    name: "react".to_string(),
                    declared_version: "^18.2.0".to_string(),
                },
                Dependency {
                    name: "redux".to_string(),
                    declared_version: "^4.2.0".to_string(),
                },
            ],
            created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        };
        let files = vec![ScannedFile {
            relative_path: "src/app.jsx".to_string(),
            kind: FileKind::Source,
            text: "import React from 'react';".to_string(),
        }];
        index.save_project(&profile, &files).await.unwrap();

        let loaded = index.get_profile("p1").await.unwrap().unwrap();
        assert_eq!(loaded.detected_framework, Framework::React);
        let names: Vec<_> = loaded.dependencies.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["react", "redux"]);

        let files = index.project_files("p1").await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].kind, FileKind::Source);

        assert!(index.get_profile("missing").await.unwrap().is_none());
        assert_eq!(index.list_profiles().await.unwrap().len(), 1);
    }
}
