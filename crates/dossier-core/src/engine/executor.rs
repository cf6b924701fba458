use crate::model::{QueryStatus, SearchResult};
use crate::providers::search::SearchProvider;
use crate::storage::Store;

/// Executes one research query against the search provider.
///
/// Idempotent: a completed query is never re-issued, its stored result is
/// returned instead. Provider failures are recorded as failed SearchResults
/// (the query stays retryable) and never propagated.
pub async fn execute(
    store: &Store,
    provider: &dyn SearchProvider,
    query_id: i64,
) -> anyhow::Result<SearchResult> {
    let query = store.get_query(query_id)?;

    if query.status == QueryStatus::Completed {
        match store.search_result_for_query(query_id)? {
            Some(existing) => {
                tracing::debug!(query_id, "query already completed, reusing stored result");
                return Ok(existing);
            }
            None => anyhow::bail!(
                "query {} is completed but has no stored search result",
                query_id
            ),
        }
    }

    let start = std::time::Instant::now();
    let (result, status) = match provider.search(&query.query_text).await {
        Ok(resp) => (
            SearchResult {
                id: 0,
                query_id,
                provider: resp.provider,
                result_count: resp.hits.len() as u32,
                raw_json: resp.raw,
                latency_ms: start.elapsed().as_millis() as u64,
                success: true,
                error: None,
            },
            QueryStatus::Completed,
        ),
        Err(e) => {
            tracing::warn!(query_id, error = %e, "search provider call failed");
            (
                SearchResult {
                    id: 0,
                    query_id,
                    provider: provider.provider_name().to_string(),
                    raw_json: serde_json::json!({}),
                    result_count: 0,
                    latency_ms: start.elapsed().as_millis() as u64,
                    success: false,
                    error: Some(e.to_string()),
                },
                QueryStatus::Failed,
            )
        }
    };

    // The result row goes in before the status flips, so a query is only
    // ever marked completed once its result is durably stored.
    let id = store.insert_search_result(&result)?;
    store.set_query_status(query_id, status)?;
    Ok(SearchResult { id, ..result })
}

/// Runs every pending or failed query for a company; completed queries are
/// skipped via the idempotency rule above. Partial provider failures leave
/// the rest of the batch untouched.
pub async fn execute_batch(
    store: &Store,
    provider: &dyn SearchProvider,
    company: &str,
) -> anyhow::Result<Vec<SearchResult>> {
    let queries = store.queries_for_company(company)?;
    let mut out = Vec::with_capacity(queries.len());
    for q in queries {
        out.push(execute(store, provider, q.id).await?);
    }
    Ok(out)
}
