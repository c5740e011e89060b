//! One-shot pipeline run from the command line.
//!
//! `finance-rag-ask "What is the current repo rate?"`

use std::env;
use std::sync::Arc;

use anyhow::{bail, Context};

use finance_rag::core::config::{AppPaths, ConfigService};
use finance_rag::core::logging;
use finance_rag::pipeline::FinancePipeline;
use finance_rag::state::build_collaborators;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let query = env::args().skip(1).collect::<Vec<_>>().join(" ");
    if query.trim().is_empty() {
        bail!("usage: finance-rag-ask <question>");
    }

    let paths = Arc::new(AppPaths::new());
    logging::init(&paths);

    let settings = ConfigService::new(paths.clone())
        .settings()
        .context("Failed to load configuration")?;
    let (collaborators, _store) = build_collaborators(&settings, &paths)
        .await
        .context("Failed to build pipeline")?;
    let pipeline = FinancePipeline::new(collaborators, &settings);

    let result = pipeline.run(&query).await?;

    println!("\nANSWER:\n{}\n", result.answer);
    println!("SOURCES:");
    for (i, source) in result.sources.iter().enumerate() {
        println!("  [{}] {} ({})", i + 1, source.title, source.source);
    }
    println!("\nEVALUATION:");
    println!("  score: {:.2}", result.evaluation.score);
    for note in &result.evaluation.feedback {
        println!("  - {}", note);
    }
    Ok(())
}
