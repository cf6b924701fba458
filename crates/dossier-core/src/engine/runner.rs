use crate::clock::Clock;
use crate::consensus;
use crate::engine::executor;
use crate::engine::processor::Processor;
use crate::fields::FieldRegistry;
use crate::grading::judge::FieldJudge;
use crate::grading::Grader;
use crate::ground_truth::{GroundTruthManager, ProfilePipeline, DEFAULT_GROUND_TRUTH_TTL_HOURS};
use crate::model::{
    CompanyOutcome, FieldMap, ModelConfig, ModelScores, OutputValidation, PromptVersion,
    QueryTemplate, SearchResult, SuiteAggregate, SuiteResult, TokenUsage, ValidationResult,
};
use crate::pricing::PriceTable;
use crate::providers::llm::LlmClient;
use crate::providers::search::SearchProvider;
use crate::queries;
use crate::scoring;
use crate::storage::store::now_rfc3339;
use crate::storage::Store;
use anyhow::Context;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Orchestrates the full pipeline over a company suite: evidence gathering,
/// reference-model ground truth, candidate extraction, grading, consensus.
///
/// One company failing never aborts the suite; its outcome carries the
/// error and the rest of the companies are graded normally.
pub struct Runner {
    pub store: Store,
    pub search: Arc<dyn SearchProvider>,
    pub llm: Arc<dyn LlmClient>,
    pub clock: Arc<dyn Clock>,
    pub registry: FieldRegistry,
    pub prices: PriceTable,
    pub judge: Option<FieldJudge>,
    pub templates: Vec<QueryTemplate>,
    pub reference_model: ModelConfig,
    pub candidate_models: Vec<ModelConfig>,
    pub fuzzy_tolerance: f64,
    pub parallel: usize,
    pub timeout: Duration,
    pub result_char_budget: Option<usize>,
    pub ground_truth_ttl_hours: f64,
    pub force_refresh: bool,
    pub suite: Option<String>,
}

impl Runner {
    pub fn new(
        store: Store,
        search: Arc<dyn SearchProvider>,
        llm: Arc<dyn LlmClient>,
        clock: Arc<dyn Clock>,
        reference_model: ModelConfig,
        candidate_models: Vec<ModelConfig>,
    ) -> Self {
        Self {
            store,
            search,
            llm,
            clock,
            registry: FieldRegistry::company_profile(),
            prices: PriceTable::builtin(),
            judge: None,
            templates: queries::default_templates(),
            reference_model,
            candidate_models,
            fuzzy_tolerance: crate::grading::DEFAULT_FUZZY_TOLERANCE,
            parallel: 4,
            timeout: Duration::from_secs(120),
            result_char_budget: None,
            ground_truth_ttl_hours: DEFAULT_GROUND_TRUTH_TTL_HOURS,
            force_refresh: false,
            suite: None,
        }
    }

    /// Applies a loaded configuration on top of the builtin defaults. The
    /// judge, when configured, grades through the same LLM client and caches
    /// verdicts in the same store.
    pub fn from_config(
        store: Store,
        search: Arc<dyn SearchProvider>,
        llm: Arc<dyn LlmClient>,
        clock: Arc<dyn Clock>,
        config: &crate::config::ResearchConfig,
    ) -> anyhow::Result<Self> {
        let judge = config
            .judge_model
            .clone()
            .map(|model| FieldJudge::new(model, store.clone(), Arc::clone(&llm)));
        let mut runner = Self::new(
            store,
            search,
            llm,
            clock,
            config.reference_model.clone(),
            config.candidate_models.clone(),
        );
        runner.registry = config.field_registry();
        runner.prices = config.price_table()?;
        runner.judge = judge;
        runner.templates = config.effective_templates();
        runner.fuzzy_tolerance = config.fuzzy_tolerance;
        runner.parallel = config.parallel;
        runner.timeout = config.timeout();
        runner.result_char_budget = config.result_char_budget;
        runner.ground_truth_ttl_hours = config.ground_truth_ttl_hours;
        runner.suite = config.suite.clone();
        Ok(runner)
    }

    fn processor(&self) -> Processor {
        Processor {
            store: self.store.clone(),
            client: Arc::clone(&self.llm),
            prices: self.prices.clone(),
            registry: self.registry.clone(),
            result_char_budget: self.result_char_budget,
            timeout: self.timeout,
        }
    }

    fn grader(&self) -> Grader {
        let mut grader = Grader::new(self.registry.clone());
        grader.tolerance = self.fuzzy_tolerance;
        if let Some(judge) = &self.judge {
            grader = grader.with_judge(judge.clone());
        }
        grader
    }

    /// Returns the stored search evidence for a company, running Phase 1
    /// first when none has been collected yet. Completed queries are never
    /// re-issued, so repeated extractions reuse the same evidence.
    pub async fn gather_evidence(&self, company: &str) -> anyhow::Result<Vec<SearchResult>> {
        let existing = self.store.evidence_for_company(company)?;
        if !existing.is_empty() {
            tracing::debug!(company, results = existing.len(), "reusing stored evidence");
            return Ok(existing);
        }

        if self.store.queries_for_company(company)?.is_empty() {
            for q in queries::generate(company, &self.templates)? {
                self.store.insert_query(&q)?;
            }
        }
        executor::execute_batch(&self.store, self.search.as_ref(), company).await?;

        let evidence = self.store.evidence_for_company(company)?;
        if evidence.is_empty() {
            anyhow::bail!("no search evidence could be collected for '{}'", company);
        }
        Ok(evidence)
    }

    /// Registers the prompt version and runs every company through the
    /// pipeline, at most `parallel` companies in flight at once. Outcomes
    /// keep the input order.
    pub async fn run_suite(
        self: &Arc<Self>,
        companies: &[String],
        prompt_version: &PromptVersion,
    ) -> anyhow::Result<SuiteResult> {
        let pv_id = self.store.register_prompt_version(prompt_version)?;
        let pv = PromptVersion {
            id: pv_id,
            ..prompt_version.clone()
        };

        let semaphore = Arc::new(Semaphore::new(self.parallel.max(1)));
        let mut handles = Vec::with_capacity(companies.len());
        for company in companies {
            let runner = Arc::clone(self);
            let pv = pv.clone();
            let company = company.clone();
            let semaphore = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                runner.run_company(&company, &pv).await
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            outcomes.push(handle.await.context("company task panicked")?);
        }

        let failure_count = outcomes.iter().filter(|o| !o.success).count() as u32;
        let aggregates = suite_aggregates(&self.candidate_models, &outcomes);

        Ok(SuiteResult {
            prompt_version: format!("{}/{}", pv.name, pv.version),
            suite: self.suite.clone(),
            companies: outcomes,
            aggregates,
            failure_count,
        })
    }

    /// One company end to end. Errors are absorbed into the outcome.
    pub async fn run_company(self: &Arc<Self>, company: &str, pv: &PromptVersion) -> CompanyOutcome {
        match self.try_run_company(company, pv).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(company, error = %e, "company pipeline failed");
                CompanyOutcome {
                    company: company.to_string(),
                    success: false,
                    error: Some(e.to_string()),
                    models: Vec::new(),
                    consensus: Vec::new(),
                }
            }
        }
    }

    async fn try_run_company(
        self: &Arc<Self>,
        company: &str,
        pv: &PromptVersion,
    ) -> anyhow::Result<CompanyOutcome> {
        let test_run = self
            .store
            .create_test_run(pv.id, company, self.suite.as_deref())?;

        let manager = GroundTruthManager {
            store: self.store.clone(),
            pipeline: Arc::clone(self) as Arc<dyn ProfilePipeline>,
            clock: Arc::clone(&self.clock),
            reference_model: self.reference_model.clone(),
            default_ttl_hours: self.ground_truth_ttl_hours,
        };
        let ground_truth = manager
            .ensure(company, pv, test_run.id, None, self.force_refresh)
            .await?;

        let grader = self.grader();
        let mut models = Vec::new();
        let mut outputs: BTreeMap<String, FieldMap> = BTreeMap::new();

        for model in &self.candidate_models {
            match self.extract(company, pv, model, test_run.id, false).await {
                Ok(output) => {
                    let (field_scores, grading_usage) =
                        grader.grade_output(&ground_truth.fields, &output.fields).await;
                    let aggregates = scoring::aggregate(&field_scores, &self.registry);

                    let grading_cost_usd = match &self.judge {
                        Some(j) => self.prices.estimate(&j.model.model_id, grading_usage),
                        None => 0.0,
                    };
                    self.store.insert_validation_result(&ValidationResult {
                        id: 0,
                        output_id: output.id,
                        test_run_id: test_run.id,
                        field_scores,
                        aggregates,
                        grader_provider: self.judge.as_ref().map(|j| j.model.provider.clone()),
                        grader_model: self.judge.as_ref().map(|j| j.model.model_id.clone()),
                        grading_usage,
                        grading_cost_usd,
                    })?;

                    outputs.insert(model.model_id.clone(), output.fields.clone());
                    models.push(ModelScores {
                        provider: model.provider.clone(),
                        model_id: model.model_id.clone(),
                        aggregates,
                        usage: output.usage,
                        estimated_cost_usd: output.estimated_cost_usd,
                        error: None,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        company,
                        model = %model.model_id,
                        error = %e,
                        "candidate extraction failed"
                    );
                    models.push(ModelScores {
                        provider: model.provider.clone(),
                        model_id: model.model_id.clone(),
                        aggregates: Default::default(),
                        usage: TokenUsage::default(),
                        estimated_cost_usd: 0.0,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let consensus = consensus::detect(&outputs, &self.registry);

        Ok(CompanyOutcome {
            company: company.to_string(),
            success: true,
            error: None,
            models,
            consensus,
        })
    }
}

#[async_trait]
impl ProfilePipeline for Runner {
    /// Runs both phases for one (company, model) and persists the structured
    /// output as an OutputValidation row.
    async fn extract(
        &self,
        company: &str,
        prompt_version: &PromptVersion,
        model: &ModelConfig,
        test_run_id: i64,
        ground_truth: bool,
    ) -> anyhow::Result<OutputValidation> {
        let evidence = self.gather_evidence(company).await?;
        let run = self
            .processor()
            .process(company, prompt_version, model, &evidence)
            .await?;

        if !run.success {
            anyhow::bail!(
                "extraction with {} failed: {}",
                model.model_id,
                run.error.as_deref().unwrap_or("unknown error")
            );
        }
        if ground_truth && run.parse_failed {
            anyhow::bail!(
                "reference model {} returned unparseable output",
                model.model_id
            );
        }

        let mut validation = OutputValidation {
            id: 0,
            test_run_id,
            provider: model.provider.clone(),
            model_id: model.model_id.clone(),
            fields: run.structured.unwrap_or_default(),
            usage: run.usage,
            estimated_cost_usd: run.estimated_cost_usd,
            is_ground_truth: ground_truth,
            created_at: now_rfc3339(),
        };
        validation.id = self.store.insert_output_validation(&validation)?;
        Ok(validation)
    }
}

/// Cross-company means per candidate model, over the companies where that
/// model's extraction succeeded.
fn suite_aggregates(
    candidates: &[ModelConfig],
    outcomes: &[CompanyOutcome],
) -> Vec<SuiteAggregate> {
    let mut out = Vec::with_capacity(candidates.len());
    for model in candidates {
        let mut overall = Vec::new();
        let mut required = Vec::new();
        let mut optional = Vec::new();
        let mut weighted = Vec::new();
        let mut companies = 0u32;

        for outcome in outcomes.iter().filter(|o| o.success) {
            let Some(scores) = outcome
                .models
                .iter()
                .find(|m| m.model_id == model.model_id && m.error.is_none())
            else {
                continue;
            };
            companies += 1;
            overall.extend(scores.aggregates.overall);
            required.extend(scores.aggregates.required);
            optional.extend(scores.aggregates.optional);
            weighted.extend(scores.aggregates.weighted);
        }

        out.push(SuiteAggregate {
            provider: model.provider.clone(),
            model_id: model.model_id.clone(),
            companies,
            overall: scoring::mean(&overall),
            required: scoring::mean(&required),
            optional: scoring::mean(&optional),
            weighted: scoring::mean(&weighted),
        });
    }
    out
}
