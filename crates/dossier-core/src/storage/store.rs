use crate::model::{
    AggregateScores, FieldMap, FieldScore, OutputValidation, ProcessingRun, PromptVersion,
    QueryStatus, ResearchQuery, SearchResult, TestRun, TokenUsage, ValidationResult,
};
use anyhow::Context;
use rusqlite::{params, Connection, Row};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// SQLite-backed persistence for the research pipeline. All pipeline writes
/// are append-only; only the research_queries.status column is ever updated,
/// and only pending→completed / pending→failed.
#[derive(Clone)]
pub struct Store {
    pub conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path).context("failed to open sqlite db")?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory sqlite db")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(crate::storage::schema::DDL)?;
        Ok(())
    }

    // --- research queries ---

    pub fn insert_query(&self, q: &ResearchQuery) -> anyhow::Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO research_queries(company, query_type, query_text, status)
             VALUES (?1, ?2, ?3, ?4)",
            params![q.company, q.query_type, q.query_text, q.status.as_str()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_query(&self, id: i64) -> anyhow::Result<ResearchQuery> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, company, query_type, query_text, status
             FROM research_queries WHERE id=?1",
        )?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => query_from_row(row),
            None => anyhow::bail!("research query {} not found", id),
        }
    }

    /// Completed queries never regress; failed queries may be retried, which
    /// re-terminalizes them through the executor.
    pub fn set_query_status(&self, id: i64, status: QueryStatus) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE research_queries SET status=?1 WHERE id=?2 AND status != 'completed'",
            params![status.as_str(), id],
        )?;
        Ok(())
    }

    pub fn queries_for_company(&self, company: &str) -> anyhow::Result<Vec<ResearchQuery>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, company, query_type, query_text, status
             FROM research_queries WHERE company=?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![company], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;
        let mut out = Vec::new();
        for r in rows {
            let (id, company, query_type, query_text, status) = r?;
            out.push(ResearchQuery {
                id,
                company,
                query_type,
                query_text,
                status: QueryStatus::parse(&status),
            });
        }
        Ok(out)
    }

    // --- search results ---

    pub fn insert_search_result(&self, r: &SearchResult) -> anyhow::Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO search_results(
                query_id, provider, raw_json, result_count, latency_ms, success, error, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                r.query_id,
                r.provider,
                r.raw_json.to_string(),
                r.result_count,
                r.latency_ms as i64,
                r.success,
                r.error,
                now_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Latest stored result for a query (a retried query has several rows;
    /// the newest is the authoritative attempt).
    pub fn search_result_for_query(&self, query_id: i64) -> anyhow::Result<Option<SearchResult>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, query_id, provider, raw_json, result_count, latency_ms, success, error
             FROM search_results WHERE query_id=?1 ORDER BY id DESC LIMIT 1",
        )?;
        let mut rows = stmt.query(params![query_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(search_result_from_row(row)?)),
            None => Ok(None),
        }
    }

    /// All successful results for a company's completed queries, in id order.
    pub fn evidence_for_company(&self, company: &str) -> anyhow::Result<Vec<SearchResult>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT r.id, r.query_id, r.provider, r.raw_json, r.result_count,
                    r.latency_ms, r.success, r.error
             FROM search_results r
             JOIN research_queries q ON r.query_id = q.id
             WHERE q.company=?1 AND q.status='completed' AND r.success=1
             ORDER BY r.id ASC",
        )?;
        let mut rows = stmt.query(params![company])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(search_result_from_row(row)?);
        }
        Ok(out)
    }

    // --- prompt versions ---

    /// Persists a prompt version, enforcing (name, version) uniqueness.
    /// Re-registering identical content is a no-op returning the stored id;
    /// re-registering different content under the same (name, version) is an
    /// error.
    pub fn register_prompt_version(&self, pv: &PromptVersion) -> anyhow::Result<i64> {
        let conn = self.conn.lock().unwrap();
        let existing: Option<(i64, String)> = {
            let mut stmt = conn.prepare(
                "SELECT id, content_hash FROM prompt_versions WHERE name=?1 AND version=?2",
            )?;
            let mut rows = stmt.query(params![pv.name, pv.version])?;
            match rows.next()? {
                Some(row) => Some((row.get(0)?, row.get(1)?)),
                None => None,
            }
        };

        if let Some((id, hash)) = existing {
            if hash != pv.content_hash {
                anyhow::bail!(
                    "prompt version {}/{} already registered with different content",
                    pv.name,
                    pv.version
                );
            }
            return Ok(id);
        }

        conn.execute(
            "INSERT INTO prompt_versions(
                name, version, instructions, content, content_hash, active, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                pv.name,
                pv.version,
                pv.instructions,
                pv.content,
                pv.content_hash,
                pv.active,
                now_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_prompt_version(
        &self,
        name: &str,
        version: &str,
    ) -> anyhow::Result<Option<PromptVersion>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, version, instructions, content, content_hash, active
             FROM prompt_versions WHERE name=?1 AND version=?2",
        )?;
        let mut rows = stmt.query(params![name, version])?;
        match rows.next()? {
            Some(row) => Ok(Some(PromptVersion {
                id: row.get(0)?,
                name: row.get(1)?,
                version: row.get(2)?,
                instructions: row.get(3)?,
                content: row.get(4)?,
                content_hash: row.get(5)?,
                active: row.get(6)?,
            })),
            None => Ok(None),
        }
    }

    // --- processing runs ---

    pub fn insert_processing_run(&self, run: &ProcessingRun) -> anyhow::Result<i64> {
        let conn = self.conn.lock().unwrap();
        let ids_json = serde_json::to_string(&run.search_result_ids)?;
        let structured_json = match &run.structured {
            Some(m) => Some(serde_json::to_string(m)?),
            None => None,
        };
        conn.execute(
            "INSERT INTO processing_runs(
                company, prompt_version_id, provider, model_id, temperature,
                search_result_ids, evidence_fingerprint, prompt, structured_json,
                raw_output, parse_failed, prompt_tokens, completion_tokens,
                estimated_cost_usd, duration_ms, success, error, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                       ?15, ?16, ?17, ?18)",
            params![
                run.company,
                run.prompt_version_id,
                run.provider,
                run.model_id,
                run.temperature as f64,
                ids_json,
                run.evidence_fingerprint,
                run.prompt,
                structured_json,
                run.raw_output,
                run.parse_failed,
                run.usage.prompt_tokens as i64,
                run.usage.completion_tokens as i64,
                run.estimated_cost_usd,
                run.duration_ms as i64,
                run.success,
                run.error,
                run.created_at,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    // --- test runs ---

    pub fn create_test_run(
        &self,
        prompt_version_id: i64,
        company: &str,
        suite: Option<&str>,
    ) -> anyhow::Result<TestRun> {
        let conn = self.conn.lock().unwrap();
        let created_at = now_rfc3339();
        conn.execute(
            "INSERT INTO test_runs(prompt_version_id, company, suite, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![prompt_version_id, company, suite, created_at],
        )?;
        Ok(TestRun {
            id: conn.last_insert_rowid(),
            prompt_version_id,
            company: company.to_string(),
            suite: suite.map(|s| s.to_string()),
            created_at,
        })
    }

    // --- output validations ---

    pub fn insert_output_validation(&self, v: &OutputValidation) -> anyhow::Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO llm_output_validations(
                test_run_id, provider, model_id, fields_json,
                prompt_tokens, completion_tokens, estimated_cost_usd,
                is_ground_truth, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                v.test_run_id,
                v.provider,
                v.model_id,
                serde_json::to_string(&v.fields)?,
                v.usage.prompt_tokens as i64,
                v.usage.completion_tokens as i64,
                v.estimated_cost_usd,
                v.is_ground_truth,
                v.created_at,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Newest ground-truth row for (company, prompt version), across all
    /// test runs. Superseded rows stay in place as the audit trail.
    pub fn latest_ground_truth(
        &self,
        company: &str,
        prompt_version_id: i64,
    ) -> anyhow::Result<Option<OutputValidation>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT v.id, v.test_run_id, v.provider, v.model_id, v.fields_json,
                    v.prompt_tokens, v.completion_tokens, v.estimated_cost_usd,
                    v.is_ground_truth, v.created_at
             FROM llm_output_validations v
             JOIN test_runs t ON v.test_run_id = t.id
             WHERE v.is_ground_truth=1 AND t.company=?1 AND t.prompt_version_id=?2
             ORDER BY v.id DESC LIMIT 1",
        )?;
        let mut rows = stmt.query(params![company, prompt_version_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(validation_from_row(row)?)),
            None => Ok(None),
        }
    }

    // --- validation results ---

    pub fn insert_validation_result(&self, r: &ValidationResult) -> anyhow::Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO validation_results(
                output_id, test_run_id, field_accuracy_scores,
                overall_accuracy, required_accuracy, optional_accuracy, weighted_accuracy,
                grader_provider, grader_model,
                grading_prompt_tokens, grading_completion_tokens, grading_cost_usd,
                created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                r.output_id,
                r.test_run_id,
                serde_json::to_string(&r.field_scores)?,
                r.aggregates.overall,
                r.aggregates.required,
                r.aggregates.optional,
                r.aggregates.weighted,
                r.grader_provider,
                r.grader_model,
                r.grading_usage.prompt_tokens as i64,
                r.grading_usage.completion_tokens as i64,
                r.grading_cost_usd,
                now_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn validation_results_for_test_run(
        &self,
        test_run_id: i64,
    ) -> anyhow::Result<Vec<ValidationResult>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, output_id, test_run_id, field_accuracy_scores,
                    overall_accuracy, required_accuracy, optional_accuracy, weighted_accuracy,
                    grader_provider, grader_model,
                    grading_prompt_tokens, grading_completion_tokens, grading_cost_usd
             FROM validation_results WHERE test_run_id=?1 ORDER BY id ASC",
        )?;
        let mut rows = stmt.query(params![test_run_id])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let scores_json: String = row.get(3)?;
            let field_scores: BTreeMap<String, FieldScore> = serde_json::from_str(&scores_json)?;
            out.push(ValidationResult {
                id: row.get(0)?,
                output_id: row.get(1)?,
                test_run_id: row.get(2)?,
                field_scores,
                aggregates: AggregateScores {
                    overall: row.get(4)?,
                    required: row.get(5)?,
                    optional: row.get(6)?,
                    weighted: row.get(7)?,
                },
                grader_provider: row.get(8)?,
                grader_model: row.get(9)?,
                grading_usage: TokenUsage {
                    prompt_tokens: row.get::<_, i64>(10)? as u64,
                    completion_tokens: row.get::<_, i64>(11)? as u64,
                },
                grading_cost_usd: row.get(12)?,
            });
        }
        Ok(out)
    }

    // --- judge cache ---

    pub fn judge_cache_get(&self, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT payload_json FROM judge_cache WHERE key=?1")?;
        let mut rows = stmt.query(params![key])?;
        if let Some(row) = rows.next()? {
            let s: String = row.get(0)?;
            let val: serde_json::Value = serde_json::from_str(&s)?;
            Ok(Some(val))
        } else {
            Ok(None)
        }
    }

    pub fn judge_cache_put(
        &self,
        key: &str,
        provider: &str,
        model: &str,
        field: &str,
        payload: &serde_json::Value,
    ) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO judge_cache(key, provider, model, field, created_at, payload_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(key) DO UPDATE SET
                payload_json=excluded.payload_json,
                created_at=excluded.created_at",
            params![
                key,
                provider,
                model,
                field,
                now_rfc3339(),
                serde_json::to_string(payload)?
            ],
        )?;
        Ok(())
    }

    pub fn count_rows(&self, table: &str) -> anyhow::Result<i64> {
        let conn = self.conn.lock().unwrap();
        // Allowlist to keep the format! safe.
        if ![
            "research_queries",
            "search_results",
            "prompt_versions",
            "processing_runs",
            "test_runs",
            "llm_output_validations",
            "validation_results",
            "judge_cache",
        ]
        .contains(&table)
        {
            anyhow::bail!("invalid table name for count_rows: {}", table);
        }
        let sql = format!("SELECT COUNT(*) FROM {}", table);
        let n: i64 = conn.query_row(&sql, [], |r| r.get(0))?;
        Ok(n)
    }
}

fn query_from_row(row: &Row<'_>) -> anyhow::Result<ResearchQuery> {
    let status: String = row.get(4)?;
    Ok(ResearchQuery {
        id: row.get(0)?,
        company: row.get(1)?,
        query_type: row.get(2)?,
        query_text: row.get(3)?,
        status: QueryStatus::parse(&status),
    })
}

fn search_result_from_row(row: &Row<'_>) -> anyhow::Result<SearchResult> {
    let raw: String = row.get(3)?;
    Ok(SearchResult {
        id: row.get(0)?,
        query_id: row.get(1)?,
        provider: row.get(2)?,
        raw_json: serde_json::from_str(&raw)?,
        result_count: row.get::<_, i64>(4)? as u32,
        latency_ms: row.get::<_, i64>(5)? as u64,
        success: row.get(6)?,
        error: row.get(7)?,
    })
}

fn validation_from_row(row: &Row<'_>) -> anyhow::Result<OutputValidation> {
    let fields_json: String = row.get(4)?;
    let fields: FieldMap = serde_json::from_str(&fields_json)?;
    Ok(OutputValidation {
        id: row.get(0)?,
        test_run_id: row.get(1)?,
        provider: row.get(2)?,
        model_id: row.get(3)?,
        fields,
        usage: TokenUsage {
            prompt_tokens: row.get::<_, i64>(5)? as u64,
            completion_tokens: row.get::<_, i64>(6)? as u64,
        },
        estimated_cost_usd: row.get(7)?,
        is_ground_truth: row.get(8)?,
        created_at: row.get(9)?,
    })
}

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
