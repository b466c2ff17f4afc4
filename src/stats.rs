//! Database statistics and health overview.
//!
//! Summarizes what is indexed: project counts, chunk counts, embedding
//! coverage, and which models produced the stored vectors. Used by
//! `depad stats` to give confidence that ingestion and embedding are
//! working as expected.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;

/// Per-project breakdown of file, dependency, chunk, and vector counts.
struct ProjectStats {
    project_id: String,
    framework: String,
    file_count: i64,
    dependency_count: i64,
    chunk_count: i64,
    embedded_count: i64,
    created_at: i64,
}

/// Run the stats command: query the database and print a summary,
/// optionally narrowed to one project.
pub async fn run_stats(config: &Config, project: Option<&str>) -> Result<()> {
    let pool = db::connect(config).await?;

    let total_projects: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM projects")
        .fetch_one(&pool)
        .await?;

    let total_chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(&pool)
        .await?;

    let total_embedded: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vectors")
        .fetch_one(&pool)
        .await?;

    let db_size = std::fs::metadata(&config.storage.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Dependency Advisor — Database Stats");
    println!("===================================");
    println!();
    println!("  Database:    {}", config.storage.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Projects:    {}", total_projects);
    println!("  Chunks:      {}", total_chunks);
    println!(
        "  Embedded:    {} / {} ({}%)",
        total_embedded,
        total_chunks,
        if total_chunks > 0 {
            (total_embedded * 100) / total_chunks
        } else {
            0
        }
    );

    // Which models produced the stored vectors; more than one line here
    // means a reembed is pending.
    let model_rows = sqlx::query(
        "SELECT model_version, COUNT(*) AS vector_count FROM vectors \
         GROUP BY model_version ORDER BY vector_count DESC",
    )
    .fetch_all(&pool)
    .await?;
    if !model_rows.is_empty() {
        println!();
        println!("  By model:");
        for row in &model_rows {
            println!(
                "    {:<32} {}",
                row.get::<String, _>("model_version"),
                row.get::<i64, _>("vector_count")
            );
        }
    }

    // Per-project breakdown
    let project_rows = sqlx::query(
        r#"
        SELECT
            p.id,
            p.framework,
            p.created_at,
            COUNT(DISTINCT f.relative_path) AS file_count,
            COUNT(DISTINCT d.position) AS dependency_count,
            COUNT(DISTINCT c.id) AS chunk_count,
            COUNT(DISTINCT v.chunk_id) AS embedded_count
        FROM projects p
        LEFT JOIN files f ON f.project_id = p.id
        LEFT JOIN dependencies d ON d.project_id = p.id
        LEFT JOIN chunks c ON c.project_id = p.id
        LEFT JOIN vectors v ON v.project_id = p.id
        GROUP BY p.id
        ORDER BY p.created_at, p.id
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let mut project_stats: Vec<ProjectStats> = Vec::new();
    for row in &project_rows {
        let stats = ProjectStats {
            project_id: row.get("id"),
            framework: row.get("framework"),
            file_count: row.get("file_count"),
            dependency_count: row.get("dependency_count"),
            chunk_count: row.get("chunk_count"),
            embedded_count: row.get("embedded_count"),
            created_at: row.get("created_at"),
        };
        if project.map_or(true, |p| p == stats.project_id) {
            project_stats.push(stats);
        }
    }

    if let Some(id) = project {
        if project_stats.is_empty() {
            pool.close().await;
            anyhow::bail!("Project not found: {}", id);
        }
    }

    if !project_stats.is_empty() {
        println!();
        println!("  By project:");
        println!(
            "  {:<14} {:<10} {:>6} {:>6} {:>8} {:>10}   {}",
            "PROJECT", "FRAMEWORK", "FILES", "DEPS", "CHUNKS", "EMBEDDED", "INGESTED"
        );
        println!("  {}", "-".repeat(79));

        for s in &project_stats {
            println!(
                "  {:<14} {:<10} {:>6} {:>6} {:>8} {:>10}   {}",
                s.project_id,
                s.framework,
                s.file_count,
                s.dependency_count,
                s.chunk_count,
                s.embedded_count,
                format_ts_relative(s.created_at)
            );
        }
    }

    // Narrowed to one project: break its files down by classification.
    if let Some(id) = project {
        let kind_rows = sqlx::query(
            "SELECT kind, COUNT(*) AS file_count FROM files \
             WHERE project_id = ? GROUP BY kind ORDER BY kind",
        )
        .bind(id)
        .fetch_all(&pool)
        .await?;
        if !kind_rows.is_empty() {
            println!();
            println!("  Files by kind:");
            for row in &kind_rows {
                println!(
                    "    {:<10} {}",
                    row.get::<String, _>("kind"),
                    row.get::<i64, _>("file_count")
                );
            }
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
