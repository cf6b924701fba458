pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS research_queries (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  company TEXT NOT NULL,
  query_type TEXT NOT NULL,
  query_text TEXT NOT NULL,
  status TEXT NOT NULL DEFAULT 'pending'
);

CREATE TABLE IF NOT EXISTS search_results (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  query_id INTEGER NOT NULL REFERENCES research_queries(id),
  provider TEXT NOT NULL,
  raw_json TEXT NOT NULL,
  result_count INTEGER NOT NULL DEFAULT 0,
  latency_ms INTEGER NOT NULL DEFAULT 0,
  success INTEGER NOT NULL,
  error TEXT,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS prompt_versions (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT NOT NULL,
  version TEXT NOT NULL,
  instructions TEXT NOT NULL,
  content TEXT NOT NULL,
  content_hash TEXT NOT NULL,
  active INTEGER NOT NULL DEFAULT 1,
  created_at TEXT NOT NULL,
  UNIQUE(name, version)
);

CREATE TABLE IF NOT EXISTS processing_runs (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  company TEXT NOT NULL,
  prompt_version_id INTEGER NOT NULL REFERENCES prompt_versions(id),
  provider TEXT NOT NULL,
  model_id TEXT NOT NULL,
  temperature REAL NOT NULL DEFAULT 0,
  search_result_ids TEXT NOT NULL,
  evidence_fingerprint TEXT NOT NULL DEFAULT '',
  prompt TEXT NOT NULL,
  structured_json TEXT,
  raw_output TEXT NOT NULL,
  parse_failed INTEGER NOT NULL DEFAULT 0,
  prompt_tokens INTEGER NOT NULL DEFAULT 0,
  completion_tokens INTEGER NOT NULL DEFAULT 0,
  estimated_cost_usd REAL NOT NULL DEFAULT 0,
  duration_ms INTEGER NOT NULL DEFAULT 0,
  success INTEGER NOT NULL,
  error TEXT,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS test_runs (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  prompt_version_id INTEGER NOT NULL REFERENCES prompt_versions(id),
  company TEXT NOT NULL,
  suite TEXT,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS llm_output_validations (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  test_run_id INTEGER NOT NULL REFERENCES test_runs(id),
  provider TEXT NOT NULL,
  model_id TEXT NOT NULL,
  fields_json TEXT NOT NULL,
  prompt_tokens INTEGER NOT NULL DEFAULT 0,
  completion_tokens INTEGER NOT NULL DEFAULT 0,
  estimated_cost_usd REAL NOT NULL DEFAULT 0,
  is_ground_truth INTEGER NOT NULL DEFAULT 0,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS validation_results (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  output_id INTEGER NOT NULL REFERENCES llm_output_validations(id),
  test_run_id INTEGER NOT NULL REFERENCES test_runs(id),
  field_accuracy_scores TEXT NOT NULL,
  overall_accuracy REAL,
  required_accuracy REAL,
  optional_accuracy REAL,
  weighted_accuracy REAL,
  grader_provider TEXT,
  grader_model TEXT,
  grading_prompt_tokens INTEGER NOT NULL DEFAULT 0,
  grading_completion_tokens INTEGER NOT NULL DEFAULT 0,
  grading_cost_usd REAL NOT NULL DEFAULT 0,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS judge_cache (
  key TEXT PRIMARY KEY,
  provider TEXT NOT NULL,
  model TEXT NOT NULL,
  field TEXT NOT NULL,
  created_at TEXT NOT NULL,
  payload_json TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_queries_company_status
  ON research_queries(company, status);
CREATE INDEX IF NOT EXISTS idx_search_results_query
  ON search_results(query_id);
CREATE INDEX IF NOT EXISTS idx_validations_ground_truth
  ON llm_output_validations(is_ground_truth, test_run_id);
"#;
