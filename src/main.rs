//! Toolgate CLI entry point.
//!
//! Provides `validate`, `evaluate` and `rules` subcommands for checking a
//! policy configuration, asking it for a single decision, or printing the
//! effective rule order.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::debug;

use toolgate::config::Config;
use toolgate::policy::PolicyEngine;
use toolgate::types::{TaintLevel, ToolIdentity};

/// Toolgate: tool access policy engine for LLM agents.
#[derive(Parser)]
#[command(name = "toolgate", version, about)]
struct Cli {
    /// Config file. Defaults to `$TOOLGATE_CONFIG` or `~/.toolgate/toolgate.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also append JSON logs to daily files in this directory.
    #[arg(long, global = true, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Load every layer and the metadata, reporting all problems at once.
    Validate {
        /// In-house tool names that must have metadata. Defaults to the
        /// tools declared under `[metadata.tools]`.
        #[arg(long = "in-house", value_name = "NAME")]
        in_house: Vec<String>,
    },
    /// Print the decision for one tool.
    Evaluate {
        /// Tool name.
        #[arg(long)]
        tool: String,
        /// Origin id for tools from a pluggable origin.
        #[arg(long)]
        origin: Option<String>,
        /// Turn taint level.
        #[arg(long, default_value = "trusted")]
        taint: TaintLevel,
        /// Active policy profile.
        #[arg(long)]
        profile: Option<String>,
        /// Print the evaluation as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print the effective rules in evaluation order.
    Rules {
        /// Active policy profile.
        #[arg(long)]
        profile: Option<String>,
        /// Only list rules active at this taint level.
        #[arg(long, default_value = "untrusted")]
        taint: TaintLevel,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _logging = toolgate::logging::init(cli.log_dir.as_deref())?;

    let config = load(cli.config.as_deref())?;

    match cli.command {
        Command::Validate { in_house } => handle_validate(&config, in_house),
        Command::Evaluate {
            tool,
            origin,
            taint,
            profile,
            json,
        } => handle_evaluate(&config, tool, origin, taint, profile.as_deref(), json),
        Command::Rules { profile, taint } => handle_rules(&config, profile.as_deref(), taint),
    }
}

/// Load `path`, or the default location when unset, then apply env overrides.
fn load(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        return Config::load();
    };
    let mut config =
        Config::load_from(path).with_context(|| format!("failed to load {}", path.display()))?;
    config.apply_overrides(|key| std::env::var(key).ok());
    debug!(path = %path.display(), "configuration loaded");
    Ok(config)
}

/// Build the engine, treating every declared in-house tool as live.
fn engine(config: &Config) -> anyhow::Result<PolicyEngine> {
    config
        .build_engine(config.metadata.tools.keys())
        .context("invalid policy configuration")
}

fn handle_validate(config: &Config, in_house: Vec<String>) -> anyhow::Result<()> {
    let engine = if in_house.is_empty() {
        engine(config)?
    } else {
        config
            .build_engine(&in_house)
            .context("invalid policy configuration")?
    };

    let profiles = engine.profile_names();
    println!(
        "ok: {} in-house tools, {} origins, {} profiles{}",
        engine.metadata().in_house_names().len(),
        engine.metadata().origin_count(),
        profiles.len(),
        if profiles.is_empty() {
            String::new()
        } else {
            format!(" ({})", profiles.join(", "))
        }
    );
    Ok(())
}

fn handle_evaluate(
    config: &Config,
    tool: String,
    origin: Option<String>,
    taint: TaintLevel,
    profile: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let engine = engine(config)?;
    let identity = match origin {
        Some(origin) => ToolIdentity::from_origin(origin, tool),
        None => ToolIdentity::in_house(tool),
    };
    let tags = engine.tags_for(&identity);
    let evaluation = engine.evaluate_with_tags(&identity, &tags, profile, taint);

    if json {
        let out = serde_json::json!({
            "tool": identity.to_string(),
            "tags": tags,
            "taint": taint,
            "decision": evaluation.decision,
            "rule": evaluation.rule,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&out).context("failed to serialize evaluation")?
        );
        return Ok(());
    }

    let tags: Vec<&str> = tags.iter().map(|t| t.as_str()).collect();
    println!("tool:     {identity}");
    println!("tags:     {}", tags.join(", "));
    println!("taint:    {taint}");
    println!("decision: {}", evaluation.decision);
    match evaluation.rule {
        Some(rule) if rule.description.is_empty() => {
            println!("rule:     #{} (priority {})", rule.index, rule.priority);
        }
        Some(rule) => println!(
            "rule:     #{} (priority {}) {}",
            rule.index, rule.priority, rule.description
        ),
        None => println!("rule:     <default decision>"),
    }
    Ok(())
}

fn handle_rules(config: &Config, profile: Option<&str>, taint: TaintLevel) -> anyhow::Result<()> {
    let engine = engine(config)?;
    let rules = engine.rule_set(profile);

    for (index, rule) in rules.ordered(taint) {
        println!("#{index:<4} {rule}");
    }
    println!("default: {}", rules.default_decision);
    Ok(())
}
