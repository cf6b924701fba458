pub mod llm;
pub mod search;
