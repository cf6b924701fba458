use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Extracted field values keyed by field name. BTreeMap keeps serialized
/// output deterministic across runs.
pub type FieldMap = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Pending,
    Completed,
    Failed,
}

impl QueryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryStatus::Pending => "pending",
            QueryStatus::Completed => "completed",
            QueryStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "completed" => QueryStatus::Completed,
            "failed" => QueryStatus::Failed,
            _ => QueryStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryTemplate {
    pub query_type: String,
    pub pattern: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchQuery {
    /// 0 until persisted.
    #[serde(default)]
    pub id: i64,
    pub company: String,
    pub query_type: String,
    pub query_text: String,
    pub status: QueryStatus,
}

/// Raw payload of one executed search call. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(default)]
    pub id: i64,
    pub query_id: i64,
    pub provider: String,
    pub raw_json: serde_json::Value,
    pub result_count: u32,
    pub latency_ms: u64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A named, content-hashed snapshot of the extraction instructions.
///
/// `content` is the fully rendered document (instructions plus the schema
/// hints for the field registry it was created against); `content_hash` is
/// sha256 of `content`, so identical content always yields the same hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptVersion {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    pub version: String,
    pub instructions: String,
    pub content: String,
    pub content_hash: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }

    pub fn add(&mut self, other: TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub provider: String,
    pub model_id: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.0
}

fn default_max_tokens() -> u32 {
    2048
}

/// One recorded LLM extraction attempt. Replayable, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingRun {
    #[serde(default)]
    pub id: i64,
    pub company: String,
    pub prompt_version_id: i64,
    pub provider: String,
    pub model_id: String,
    pub temperature: f32,
    pub search_result_ids: Vec<i64>,
    /// Content-addresses the extraction input (prompt content hash,
    /// evidence set, company). Runs with equal fingerprints saw
    /// byte-identical prompts.
    #[serde(default)]
    pub evidence_fingerprint: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured: Option<FieldMap>,
    pub raw_output: String,
    #[serde(default)]
    pub parse_failed: bool,
    #[serde(default)]
    pub usage: TokenUsage,
    #[serde(default)]
    pub estimated_cost_usd: f64,
    #[serde(default)]
    pub duration_ms: u64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRun {
    #[serde(default)]
    pub id: i64,
    pub prompt_version_id: i64,
    pub company: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suite: Option<String>,
    pub created_at: String,
}

/// A stored structured output (ground truth or candidate) for one TestRun.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputValidation {
    #[serde(default)]
    pub id: i64,
    pub test_run_id: i64,
    pub provider: String,
    pub model_id: String,
    pub fields: FieldMap,
    #[serde(default)]
    pub usage: TokenUsage,
    #[serde(default)]
    pub estimated_cost_usd: f64,
    #[serde(default)]
    pub is_ground_truth: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Semantic,
    Partial,
    None,
}

impl MatchKind {
    pub fn parse(s: &str) -> Self {
        match s {
            "exact" => MatchKind::Exact,
            "semantic" => MatchKind::Semantic,
            "partial" => MatchKind::Partial,
            _ => MatchKind::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    Exact,
    Keyword,
    Fuzzy,
    Similarity,
    Judge,
}

/// Per-field grading outcome.
///
/// `excluded` marks scores the aggregator must skip (optional fields with no
/// actual value, and fields with no baseline value to verify against).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldScore {
    pub field: String,
    pub score: f64,
    pub match_kind: MatchKind,
    pub explanation: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub excluded: bool,
}

/// Aggregate metrics for one (test run, model) pair. `None` when the class
/// has no graded fields.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AggregateScores {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optional: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weighted: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    #[serde(default)]
    pub id: i64,
    pub output_id: i64,
    pub test_run_id: i64,
    pub field_scores: BTreeMap<String, FieldScore>,
    pub aggregates: AggregateScores,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grader_provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grader_model: Option<String>,
    #[serde(default)]
    pub grading_usage: TokenUsage,
    #[serde(default)]
    pub grading_cost_usd: f64,
}

// --- Collaborator payloads ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Full response from one search provider call. `raw` keeps the provider
/// payload verbatim; `hits` is a convenience parse and may be empty for
/// providers we do not know how to flatten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub provider: String,
    pub raw: serde_json::Value,
    #[serde(default)]
    pub hits: Vec<SearchHit>,
}

/// One LLM completion. `structured` is None when the model could not
/// guarantee schema-constrained output; `raw_text` is then authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmCompletion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured: Option<FieldMap>,
    pub raw_text: String,
    #[serde(default)]
    pub usage: TokenUsage,
}

// --- Suite results ---

/// Grading summary for one candidate model on one company. `error` is set
/// when this model's extraction failed; the aggregates are then empty and
/// the model is left out of suite-level means.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelScores {
    pub provider: String,
    pub model_id: String,
    pub aggregates: AggregateScores,
    #[serde(default)]
    pub usage: TokenUsage,
    #[serde(default)]
    pub estimated_cost_usd: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyOutcome {
    pub company: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub models: Vec<ModelScores>,
    #[serde(default)]
    pub consensus: Vec<crate::consensus::FieldConsensus>,
}

/// Cross-company mean of one candidate model's aggregates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteAggregate {
    pub provider: String,
    pub model_id: String,
    pub companies: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optional: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weighted: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub prompt_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suite: Option<String>,
    pub companies: Vec<CompanyOutcome>,
    pub aggregates: Vec<SuiteAggregate>,
    pub failure_count: u32,
}
