use dossier_core::clock::SystemClock;
use dossier_core::engine::runner::Runner;
use dossier_core::fields::FieldRegistry;
use dossier_core::model::{FieldMap, ModelConfig, PromptVersion};
use dossier_core::providers::llm::fake::FakeLlmClient;
use dossier_core::providers::search::fake::FakeSearchProvider;
use dossier_core::queries;
use dossier_core::storage::Store;
use serde_json::json;
use std::sync::Arc;

fn model(id: &str) -> ModelConfig {
    ModelConfig {
        provider: "fake".to_string(),
        model_id: id.to_string(),
        temperature: 0.0,
        max_tokens: 2048,
    }
}

fn profile(industry: &str) -> FieldMap {
    let mut fields = FieldMap::new();
    fields.insert("company_name".into(), json!("Acme"));
    fields.insert("industry".into(), json!(industry));
    fields.insert("description".into(), json!("Makes widgets for everyone."));
    fields.insert("company_size".into(), json!("51-200 employees"));
    fields.insert("headquarters".into(), json!("San Francisco, USA"));
    fields.insert("founded_year".into(), json!("2015"));
    fields.insert("key_products".into(), json!(["widgets", "gadgets"]));
    fields
}

struct Fixture {
    runner: Arc<Runner>,
    store: Store,
    search: Arc<FakeSearchProvider>,
    llm: Arc<FakeLlmClient>,
    pv: PromptVersion,
}

fn fixture(candidates: &[&str]) -> Fixture {
    let store = Store::memory().unwrap();
    store.init_schema().unwrap();

    let search = Arc::new(FakeSearchProvider::new());
    let llm = Arc::new(FakeLlmClient::new());
    llm.set_output("reference", profile("Video Streaming"));

    let runner = Runner::new(
        store.clone(),
        Arc::clone(&search) as _,
        Arc::clone(&llm) as _,
        Arc::new(SystemClock),
        model("reference"),
        candidates.iter().map(|id| model(id)).collect(),
    );
    let pv = PromptVersion::new(
        "company-profile",
        "v1",
        "Extract the company profile.",
        &FieldRegistry::company_profile(),
    );

    Fixture {
        runner: Arc::new(runner),
        store,
        search,
        llm,
        pv,
    }
}

#[tokio::test]
async fn one_failing_company_does_not_abort_the_suite() {
    let f = fixture(&["cand-a", "cand-b"]);
    f.llm.set_output("cand-a", profile("Video Streaming"));
    f.llm.set_output("cand-b", profile("Fintech"));
    // Every query for this company contains its name, so all of them fail
    // and it ends up with no evidence at all.
    f.search.fail_queries_containing("Umbrella");

    let companies = vec![
        "Acme".to_string(),
        "Umbrella".to_string(),
        "Globex".to_string(),
    ];
    let result = f.runner.run_suite(&companies, &f.pv).await.unwrap();

    assert_eq!(result.failure_count, 1);
    assert_eq!(result.companies.len(), 3);
    assert_eq!(result.companies[0].company, "Acme");
    assert_eq!(result.companies[1].company, "Umbrella");

    let failed = &result.companies[1];
    assert!(!failed.success);
    assert!(failed.error.as_ref().unwrap().contains("no search evidence"));
    assert!(failed.models.is_empty());

    for outcome in [&result.companies[0], &result.companies[2]] {
        assert!(outcome.success);
        assert_eq!(outcome.models.len(), 2);
        for scores in &outcome.models {
            assert!(scores.error.is_none());
            assert!(scores.aggregates.overall.is_some());
        }
    }
}

#[tokio::test]
async fn matching_candidate_outscores_a_divergent_one() {
    let f = fixture(&["cand-a", "cand-b"]);
    f.llm.set_output("cand-a", profile("Video Streaming"));
    f.llm.set_output("cand-b", profile("Fintech"));

    let result = f
        .runner
        .run_suite(&["Acme".to_string()], &f.pv)
        .await
        .unwrap();
    assert_eq!(result.failure_count, 0);

    let outcome = &result.companies[0];
    let a = outcome.models.iter().find(|m| m.model_id == "cand-a").unwrap();
    let b = outcome.models.iter().find(|m| m.model_id == "cand-b").unwrap();
    assert_eq!(a.aggregates.overall.unwrap(), 100.0);
    assert!(b.aggregates.overall.unwrap() < a.aggregates.overall.unwrap());

    // The two candidates disagree on industry and agree on the name.
    let industry = outcome
        .consensus
        .iter()
        .find(|c| c.field == "industry")
        .unwrap();
    assert!(!industry.unanimous);
    let name = outcome
        .consensus
        .iter()
        .find(|c| c.field == "company_name")
        .unwrap();
    assert!(name.unanimous);

    // Suite aggregates carry per-model means over the graded companies.
    let agg = result
        .aggregates
        .iter()
        .find(|a| a.model_id == "cand-a")
        .unwrap();
    assert_eq!(agg.companies, 1);
    assert_eq!(agg.overall.unwrap(), 100.0);

    // Grading results are persisted per (test run, candidate output), and
    // the stored aggregates agree with the reported ones.
    let stored = f.store.validation_results_for_test_run(1).unwrap();
    assert_eq!(stored.len(), 2);
    for vr in &stored {
        assert!(!vr.field_scores.is_empty());
    }
    let best = stored
        .iter()
        .filter_map(|vr| vr.aggregates.overall)
        .fold(f64::MIN, f64::max);
    assert_eq!(best, a.aggregates.overall.unwrap());
}

#[tokio::test]
async fn second_suite_run_reuses_evidence_and_ground_truth() {
    let f = fixture(&["cand-a"]);
    f.llm.set_output("cand-a", profile("Video Streaming"));
    let companies = vec!["Acme".to_string()];

    f.runner.run_suite(&companies, &f.pv).await.unwrap();
    let searches = f.search.call_count();
    let llm_calls = f.llm.call_count();
    assert_eq!(searches, queries::default_templates().len());
    // Reference plus one candidate.
    assert_eq!(llm_calls, 2);

    f.runner.run_suite(&companies, &f.pv).await.unwrap();
    assert_eq!(f.search.call_count(), searches, "evidence is collected once");
    assert_eq!(
        f.llm.call_count(),
        llm_calls + 1,
        "only the candidate runs again; ground truth is cached"
    );
}

#[tokio::test]
async fn candidate_failure_is_scoped_to_that_model() {
    let f = fixture(&["cand-a", "cand-broken"]);
    f.llm.set_output("cand-a", profile("Video Streaming"));
    f.llm.fail_model("cand-broken", "simulated provider outage");

    let result = f
        .runner
        .run_suite(&["Acme".to_string()], &f.pv)
        .await
        .unwrap();
    assert_eq!(result.failure_count, 0, "the company itself still grades");

    let outcome = &result.companies[0];
    assert!(outcome.success);
    let broken = outcome
        .models
        .iter()
        .find(|m| m.model_id == "cand-broken")
        .unwrap();
    assert!(broken.error.as_ref().unwrap().contains("outage"));
    assert!(broken.aggregates.overall.is_none());

    let agg = result
        .aggregates
        .iter()
        .find(|a| a.model_id == "cand-broken")
        .unwrap();
    assert_eq!(agg.companies, 0);
    assert!(agg.overall.is_none());
}

#[tokio::test]
async fn configured_suite_runs_end_to_end() {
    let yaml = "\
reference_model:
  provider: fake
  model_id: reference
candidate_models:
  - provider: fake
    model_id: cand-a
parallel: 2
suite: launch-batch
companies:
  - Acme
  - Globex
";
    let config: dossier_core::ResearchConfig = serde_yaml::from_str(yaml).unwrap();
    config.validate().unwrap();

    let store = Store::memory().unwrap();
    store.init_schema().unwrap();
    let llm = Arc::new(FakeLlmClient::new());
    llm.set_output("reference", profile("Video Streaming"));
    llm.set_output("cand-a", profile("Video Streaming"));

    let runner = Arc::new(
        Runner::from_config(
            store,
            Arc::new(FakeSearchProvider::new()),
            llm,
            Arc::new(SystemClock),
            &config,
        )
        .unwrap(),
    );
    let pv = PromptVersion::new(
        "company-profile",
        "v1",
        "Extract the company profile.",
        &config.field_registry(),
    );

    let result = runner.run_suite(&config.companies, &pv).await.unwrap();
    assert_eq!(result.companies.len(), 2);
    assert_eq!(result.failure_count, 0);
    assert_eq!(result.suite.as_deref(), Some("launch-batch"));
    let agg = &result.aggregates[0];
    assert_eq!(agg.companies, 2);
    assert_eq!(agg.overall.unwrap(), 100.0);
}

#[tokio::test]
async fn unparseable_candidate_output_is_kept_and_scored_low() {
    let f = fixture(&["cand-raw"]);
    f.llm.set_raw_output("cand-raw", "Acme is a lovely company, no JSON from me.");

    let result = f
        .runner
        .run_suite(&["Acme".to_string()], &f.pv)
        .await
        .unwrap();
    assert_eq!(result.failure_count, 0);

    let outcome = &result.companies[0];
    let raw = &outcome.models[0];
    assert!(raw.error.is_none(), "unparseable output is not a failure");
    // Every required field is missing against a populated ground truth.
    assert_eq!(raw.aggregates.required.unwrap(), 0.0);
}
