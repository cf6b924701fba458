use async_trait::async_trait;
use chrono::Utc;
use dossier_core::clock::{Clock, ManualClock};
use dossier_core::fields::FieldRegistry;
use dossier_core::ground_truth::{GroundTruthManager, ProfilePipeline};
use dossier_core::model::{FieldMap, ModelConfig, OutputValidation, PromptVersion, TokenUsage};
use dossier_core::storage::Store;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Pipeline stand-in that writes a canned ground-truth row stamped with the
/// injected clock, and counts how often it is invoked.
struct CountingPipeline {
    store: Store,
    clock: Arc<ManualClock>,
    calls: AtomicUsize,
}

#[async_trait]
impl ProfilePipeline for CountingPipeline {
    async fn extract(
        &self,
        _company: &str,
        _prompt_version: &PromptVersion,
        model: &ModelConfig,
        test_run_id: i64,
        ground_truth: bool,
    ) -> anyhow::Result<OutputValidation> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut fields = FieldMap::new();
        fields.insert("industry".to_string(), json!("Video Streaming"));
        let mut validation = OutputValidation {
            id: 0,
            test_run_id,
            provider: model.provider.clone(),
            model_id: model.model_id.clone(),
            fields,
            usage: TokenUsage::default(),
            estimated_cost_usd: 0.0,
            is_ground_truth: ground_truth,
            created_at: self.clock.now().to_rfc3339(),
        };
        validation.id = self.store.insert_output_validation(&validation)?;
        Ok(validation)
    }
}

struct Fixture {
    manager: GroundTruthManager,
    pipeline: Arc<CountingPipeline>,
    pv: PromptVersion,
    test_run_id: i64,
    clock: Arc<ManualClock>,
}

fn fixture() -> Fixture {
    let store = Store::memory().unwrap();
    store.init_schema().unwrap();

    let registry = FieldRegistry::company_profile();
    let mut pv = PromptVersion::new("company-profile", "v1", "Extract facts.", &registry);
    pv.id = store.register_prompt_version(&pv).unwrap();
    let test_run = store.create_test_run(pv.id, "Acme", None).unwrap();

    let clock = Arc::new(ManualClock::new(Utc::now()));
    let pipeline = Arc::new(CountingPipeline {
        store: store.clone(),
        clock: Arc::clone(&clock),
        calls: AtomicUsize::new(0),
    });

    let manager = GroundTruthManager {
        store,
        pipeline: Arc::clone(&pipeline) as Arc<dyn ProfilePipeline>,
        clock: Arc::clone(&clock) as Arc<dyn Clock>,
        reference_model: ModelConfig {
            provider: "openai".into(),
            model_id: "gpt-4o".into(),
            temperature: 0.0,
            max_tokens: 2048,
        },
        default_ttl_hours: 24.0,
    };

    Fixture {
        manager,
        pipeline,
        pv,
        test_run_id: test_run.id,
        clock,
    }
}

#[tokio::test]
async fn fresh_ground_truth_is_reused() {
    let f = fixture();

    let first = f
        .manager
        .ensure("Acme", &f.pv, f.test_run_id, None, false)
        .await
        .unwrap();
    assert_eq!(f.pipeline.calls.load(Ordering::SeqCst), 1);
    assert!(first.is_ground_truth);

    f.clock.advance_hours(23.0);
    let second = f
        .manager
        .ensure("Acme", &f.pv, f.test_run_id, None, false)
        .await
        .unwrap();
    assert_eq!(f.pipeline.calls.load(Ordering::SeqCst), 1, "within TTL, cached");
    assert_eq!(second.id, first.id);
}

#[tokio::test]
async fn expired_ground_truth_is_regenerated() {
    let f = fixture();

    f.manager
        .ensure("Acme", &f.pv, f.test_run_id, None, false)
        .await
        .unwrap();
    f.clock.advance_hours(25.0);
    f.manager
        .ensure("Acme", &f.pv, f.test_run_id, None, false)
        .await
        .unwrap();
    assert_eq!(f.pipeline.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn force_refresh_bypasses_a_fresh_cache() {
    let f = fixture();

    let first = f
        .manager
        .ensure("Acme", &f.pv, f.test_run_id, None, false)
        .await
        .unwrap();
    let refreshed = f
        .manager
        .ensure("Acme", &f.pv, f.test_run_id, None, true)
        .await
        .unwrap();
    assert_eq!(f.pipeline.calls.load(Ordering::SeqCst), 2);
    assert_ne!(refreshed.id, first.id, "superseded row stays, new row wins");

    // And the new row is what subsequent lookups see.
    let third = f
        .manager
        .ensure("Acme", &f.pv, f.test_run_id, None, false)
        .await
        .unwrap();
    assert_eq!(third.id, refreshed.id);
}

#[tokio::test]
async fn explicit_ttl_overrides_the_default() {
    let f = fixture();

    f.manager
        .ensure("Acme", &f.pv, f.test_run_id, Some(1.0), false)
        .await
        .unwrap();
    f.clock.advance_hours(2.0);
    f.manager
        .ensure("Acme", &f.pv, f.test_run_id, Some(1.0), false)
        .await
        .unwrap();
    assert_eq!(f.pipeline.calls.load(Ordering::SeqCst), 2);
}
