use crate::model::{QueryStatus, QueryTemplate, ResearchQuery};

pub const COMPANY_PLACEHOLDER: &str = "{company}";

/// Turns a company name plus a template set into concrete search queries.
/// Pure; persisting the queries is the caller's responsibility.
pub fn generate(company: &str, templates: &[QueryTemplate]) -> anyhow::Result<Vec<ResearchQuery>> {
    if company.trim().is_empty() {
        anyhow::bail!("company name must not be empty");
    }

    let mut out = Vec::with_capacity(templates.len());
    for t in templates {
        if !t.pattern.contains(COMPANY_PLACEHOLDER) {
            anyhow::bail!(
                "query template '{}' is missing the {} placeholder",
                t.query_type,
                COMPANY_PLACEHOLDER
            );
        }
        out.push(ResearchQuery {
            id: 0,
            company: company.to_string(),
            query_type: t.query_type.clone(),
            query_text: t.pattern.replace(COMPANY_PLACEHOLDER, company),
            status: QueryStatus::Pending,
        });
    }
    Ok(out)
}

pub fn default_templates() -> Vec<QueryTemplate> {
    let patterns = [
        ("overview", "{company} company overview"),
        ("industry", "{company} industry sector"),
        ("size", "{company} number of employees"),
        ("headquarters", "{company} headquarters location"),
        ("founding", "{company} founding year history"),
        ("funding", "{company} funding raised"),
        ("products", "{company} products and services"),
    ];
    patterns
        .iter()
        .map(|(ty, pat)| QueryTemplate {
            query_type: ty.to_string(),
            pattern: pat.to_string(),
        })
        .collect()
}
