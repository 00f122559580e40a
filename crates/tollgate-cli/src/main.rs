//! tollgate CLI - inspect routing policies and routing plans offline

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use tollgate_core::{
    effective_max_tokens, estimate_attempt, estimate_cost, select_initial, Classifier, ComplexityScore,
    CostEstimate, RoutingPolicy, SelectionReason, Task, TaskFlags, TaskKind,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tollgate")]
#[command(author, version, about = "Cost-governed request routing", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Routing policy (YAML or JSON); the built-in default when omitted
    #[arg(short, long, global = true)]
    policy: Option<PathBuf>,

    /// Output format (text, json or yaml)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Shorthand for --format json
    #[arg(long, global = true)]
    json: bool,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
    Yaml,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a routing policy file
    Validate {
        /// Policy file to check
        file: PathBuf,
    },

    /// Score and label a task
    Classify {
        #[command(flatten)]
        task: TaskArgs,
    },

    /// Price an attempt on one backend
    Estimate {
        /// Backend id from the policy
        #[arg(short, long)]
        backend: String,

        #[arg(long)]
        tokens_in: u64,

        #[arg(long)]
        tokens_out: u64,
    },

    /// Show how a task would be routed
    Plan {
        #[command(flatten)]
        task: TaskArgs,

        /// Pin the initial backend
        #[arg(long)]
        force_backend: Option<String>,

        /// Cap on output tokens
        #[arg(long)]
        token_ceiling: Option<u32>,
    },
}

#[derive(Args)]
struct TaskArgs {
    /// Task text, or '-' to read stdin
    text: String,

    /// generation, classification, validation, compression or reasoning
    #[arg(short, long, default_value = "generation")]
    kind: TaskKind,

    #[arg(long)]
    structured: bool,

    #[arg(long)]
    reasoning: bool,

    #[arg(long)]
    client_facing: bool,

    #[arg(long = "final")]
    final_deliverable: bool,
}

impl TaskArgs {
    fn to_task(&self) -> Result<Task> {
        let input = if self.text == "-" {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read task text from stdin")?;
            buf
        } else {
            self.text.clone()
        };
        if input.trim().is_empty() {
            bail!("Task text is empty");
        }
        Ok(Task::new("cli", self.kind, input).with_flags(TaskFlags {
            client_facing: self.client_facing,
            final_deliverable: self.final_deliverable,
            structured_output: self.structured,
            requires_reasoning: self.reasoning,
        }))
    }
}

#[derive(Serialize)]
struct PlanReport {
    complexity: ComplexityScore,
    backend: String,
    reason: SelectionReason,
    max_tokens: u32,
    estimate: CostEstimate,
    within_ceiling: bool,

    /// Rungs an escalation would climb, in order
    escalation: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let format = if cli.json { OutputFormat::Json } else { cli.format };

    match &cli.command {
        Commands::Validate { file } => validate(file, format),
        Commands::Classify { task } => {
            let policy = load_policy(cli.policy.as_deref())?;
            classify(&policy, task, format)
        }
        Commands::Estimate {
            backend,
            tokens_in,
            tokens_out,
        } => {
            let policy = load_policy(cli.policy.as_deref())?;
            estimate(&policy, backend, *tokens_in, *tokens_out, format)
        }
        Commands::Plan {
            task,
            force_backend,
            token_ceiling,
        } => {
            let policy = load_policy(cli.policy.as_deref())?;
            plan(&policy, task, force_backend.as_deref(), *token_ceiling, format)
        }
    }
}

fn load_policy(path: Option<&Path>) -> Result<RoutingPolicy> {
    match path {
        Some(path) => {
            let policy = RoutingPolicy::from_file(path)
                .with_context(|| format!("Failed to load policy {}", path.display()))?;
            tracing::debug!(policy = %policy.name, path = %path.display(), "Policy loaded");
            Ok(policy)
        }
        None => Ok(RoutingPolicy::default()),
    }
}

fn print_structured<T: Serialize>(format: OutputFormat, value: &T) -> Result<()> {
    match format {
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
        _ => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}

fn validate(file: &Path, format: OutputFormat) -> Result<()> {
    let policy = load_policy(Some(file))?;

    if format != OutputFormat::Text {
        return print_structured(format, &serde_json::json!({
            "valid": true,
            "name": policy.name,
            "policy_version": policy.policy_version,
            "backends": policy.ladder().iter().map(|b| &b.id).collect::<Vec<_>>(),
        }));
    }

    println!("✓ {} (v{}) is valid", policy.name, policy.policy_version);
    println!("  Ladder:");
    for backend in policy.ladder() {
        println!(
            "    {}. {:<12} ${:.2}/M in, ${:.2}/M out, max {} tokens",
            backend.tier_rank,
            backend.id,
            backend.cost_per_million_input,
            backend.cost_per_million_output,
            backend.max_tokens
        );
    }
    let b = &policy.budget;
    println!(
        "  Budget: ${:.2}/request, ${:.2}/hour, ${:.2}/day, ${:.2}/month",
        b.per_request_ceiling_usd, b.hourly_limit_usd, b.daily_limit_usd, b.monthly_limit_usd
    );
    Ok(())
}

fn classify(policy: &RoutingPolicy, args: &TaskArgs, format: OutputFormat) -> Result<()> {
    let task = args.to_task()?;
    let score = Classifier::new(policy.classifier.clone()).classify(&task);

    if format != OutputFormat::Text {
        return print_structured(format, &score);
    }

    println!("Score: {:.2} ({:?})", score.value, score.band);
    println!("Shape: {}", score.shape);
    for factor in &score.contributing_factors {
        println!("  + {:<20} {:.2}", factor.name, factor.weight);
    }
    Ok(())
}

fn estimate(
    policy: &RoutingPolicy,
    backend: &str,
    tokens_in: u64,
    tokens_out: u64,
    format: OutputFormat,
) -> Result<()> {
    let profile = policy.backend(backend)?;
    let cost = estimate_cost(profile, tokens_in, tokens_out);

    if format != OutputFormat::Text {
        return print_structured(format, &CostEstimate {
            backend_id: profile.id.clone(),
            tokens_in,
            tokens_out,
            cost_usd: cost,
        });
    }

    println!(
        "{}: {} in + {} out = ${:.6}",
        profile.id, tokens_in, tokens_out, cost
    );
    if cost > policy.budget.per_request_ceiling_usd {
        println!(
            "  ! exceeds the per-request ceiling of ${:.2}",
            policy.budget.per_request_ceiling_usd
        );
    }
    Ok(())
}

fn plan(
    policy: &RoutingPolicy,
    args: &TaskArgs,
    force_backend: Option<&str>,
    token_ceiling: Option<u32>,
    format: OutputFormat,
) -> Result<()> {
    let mut task = args.to_task()?;
    if let Some(id) = force_backend {
        task = task.with_forced_backend(id);
    }
    if let Some(ceiling) = token_ceiling {
        task = task.with_token_ceiling(ceiling);
    }

    let complexity = Classifier::new(policy.classifier.clone()).classify(&task);
    let (backend, reason) = select_initial(policy, &complexity, &task, policy.routing.premium_threshold)?;
    let estimate = estimate_attempt(backend, &task, &task.input);
    let escalation = policy
        .ladder()
        .into_iter()
        .skip_while(|b| b.id != backend.id)
        .skip(1)
        .map(|b| b.id.clone())
        .collect();

    let report = PlanReport {
        within_ceiling: estimate.cost_usd <= policy.budget.per_request_ceiling_usd,
        max_tokens: effective_max_tokens(backend, &task),
        backend: backend.id.clone(),
        complexity,
        reason,
        estimate,
        escalation,
    };

    if format != OutputFormat::Text {
        return print_structured(format, &report);
    }

    println!(
        "Complexity: {:.2} ({:?}, {})",
        report.complexity.value, report.complexity.band, report.complexity.shape
    );
    println!("Backend:    {} ({:?})", report.backend, report.reason);
    println!(
        "Estimate:   ${:.6} ({} in, up to {} out)",
        report.estimate.cost_usd, report.estimate.tokens_in, report.estimate.tokens_out
    );
    if !report.within_ceiling {
        println!("  ! estimate exceeds the per-request ceiling; the router would reject this task");
    }
    if report.escalation.is_empty() {
        println!("Escalation: none (top rung)");
    } else {
        println!("Escalation: {}", report.escalation.join(" -> "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_plan() {
        let cli = Cli::try_parse_from([
            "tollgate",
            "plan",
            "Convert this table to JSON",
            "--structured",
            "--json",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Plan { task, .. } => {
                assert!(task.structured);
                assert_eq!(task.kind, TaskKind::Generation);
            }
            _ => panic!("expected plan"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_kind() {
        assert!(Cli::try_parse_from(["tollgate", "classify", "hi", "--kind", "poetry"]).is_err());
    }

    #[test]
    fn test_plan_report_for_structural_task() {
        let args = TaskArgs {
            text: "Convert this table to JSON".into(),
            kind: TaskKind::Generation,
            structured: false,
            reasoning: false,
            client_facing: false,
            final_deliverable: false,
        };
        assert!(plan(&RoutingPolicy::default(), &args, None, Some(256), OutputFormat::Json).is_ok());
        assert!(plan(&RoutingPolicy::default(), &args, Some("nope"), None, OutputFormat::Text).is_err());
    }
}
