//! `ragline query`: answer one query from the terminal.

use std::fmt::Write as _;
use std::path::Path;

use clap::Args;
use ragline_core::{DateRange, Filters, GenerationRequest, GenerationResult};
use ragline_engine::QueryEngine;
use tracing::warn;

#[derive(Args, Debug, Default)]
pub struct QueryArgs {
    /// The question to ask
    pub text: String,

    /// Model id from the registry (defaults to the configured default)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Number of fragments to retrieve
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Only documents from this source
    #[arg(long)]
    pub source: Option<String>,

    /// Earliest date, YYYY-MM-DD
    #[arg(long)]
    pub from: Option<String>,

    /// Latest date, YYYY-MM-DD
    #[arg(long)]
    pub to: Option<String>,

    /// Subject tag (repeatable)
    #[arg(long = "subject")]
    pub subjects: Vec<String>,

    /// Location tag (repeatable)
    #[arg(long = "location")]
    pub locations: Vec<String>,

    /// Print the raw JSON result
    #[arg(long)]
    pub json: bool,
}

impl QueryArgs {
    pub fn to_request(&self) -> GenerationRequest {
        let date_range = (self.from.is_some() || self.to.is_some()).then(|| DateRange {
            from: self.from.clone(),
            to: self.to.clone(),
        });

        GenerationRequest {
            query: self.text.clone(),
            model_name: self.model.clone(),
            filters: Filters {
                source: self.source.clone(),
                date_range,
                subjects: self.subjects.clone(),
                locations: self.locations.clone(),
            },
            top_k: self.top_k,
        }
    }
}

pub async fn run(config_path: &Path, args: QueryArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let engine = QueryEngine::from_config(&config)?;

    match engine.query(args.to_request()).await {
        Ok(result) if args.json => println!("{}", serde_json::to_string_pretty(&result)?),
        Ok(result) => print!("{}", render(&result)),
        Err(failure) => {
            warn!(stage = ?failure.stage, kind = ?failure.kind, "Query failed");
            if args.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({ "error": failure }))?
                );
            }
            return Err(failure.into());
        }
    }

    Ok(())
}

fn render(result: &GenerationResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}\n", result.answer.trim());

    if !result.sources.is_empty() {
        let _ = writeln!(out, "Sources:");
        for (i, source) in result.sources.iter().enumerate() {
            let mut label = source.title.clone();
            let details: Vec<&str> = [source.source.as_str(), source.date.as_str()]
                .into_iter()
                .filter(|s| !s.is_empty())
                .collect();
            if !details.is_empty() {
                let _ = write!(label, " ({})", details.join(", "));
            }
            let _ = writeln!(out, "  [{}] {}  {}", i + 1, label, source.link);
        }
        out.push('\n');
    }

    let _ = writeln!(
        out,
        "model {} | prompt {} tokens | answer {} tokens | {:.2}s",
        result.model_id, result.prompt_token_count, result.answer_token_count, result.query_time
    );
    out
}
