//! Magistrate command line interface.
//!
//! `magistrate check` runs one validation check against a backend from
//! the config file and exits 0 on pass, 1 on fail, 2 on error; the
//! verdict goes to stdout, logs to stderr. `magistrate backends` lists
//! what the config declares.

mod config;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde_json::Value as JsonValue;
use tracing_subscriber::EnvFilter;

use magistrate_core::{CheckOptions, Fidelity, Template, Verdict};
use magistrate_runtime::{Backend, OpenAiBackend, Validator, OPENAI_API_KEY_ENV};

use crate::config::{BackendEntry, BackendKind, Config};

#[derive(Parser)]
#[command(name = "magistrate", version, about = "Ask an LLM backend whether text satisfies a property")]
struct Cli {
    /// Path to the backends config file.
    #[arg(long, global = true, default_value = "magistrate.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one validation check.
    Check(CheckArgs),

    /// List the backends declared in the config file.
    Backends,
}

#[derive(Args)]
struct CheckArgs {
    /// The property to check, e.g. "The text must be about dogs".
    #[arg(long, conflicts_with = "template")]
    instructions: Option<String>,

    /// Built-in template family: on-topic, tone, coherent, or
    /// safe-for-audience.
    #[arg(long)]
    template: Option<String>,

    /// Argument for single-argument template families (the topic, the
    /// tone).
    #[arg(long, requires = "template")]
    arg: Option<String>,

    /// Template fidelity: fast, balanced, or accurate.
    #[arg(long, default_value_t = Fidelity::Balanced)]
    fidelity: Fidelity,

    /// Subject text to judge.
    #[arg(long, conflicts_with = "file")]
    text: Option<String>,

    /// Read the subject text from a file ("-" reads stdin).
    #[arg(long)]
    file: Option<PathBuf>,

    /// Backend name from the config; omitted means the config default.
    #[arg(long)]
    backend: Option<String>,

    /// Override the system preamble.
    #[arg(long)]
    preamble: Option<String>,

    /// Maximum output length, in tokens.
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Sampling temperature.
    #[arg(long)]
    temperature: Option<f32>,

    /// Fail the verdict when backend confidence is below this value.
    #[arg(long)]
    confidence_floor: Option<f32>,

    /// Per-call deadline, e.g. "30s" or "2m".
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Message reported on failure instead of the backend's reason.
    #[arg(long)]
    failure_message: Option<String>,

    /// Backend pass-through entries as KEY=VALUE; VALUE is parsed as
    /// JSON when possible, kept as a string otherwise. Repeatable.
    #[arg(long = "meta", value_name = "KEY=VALUE")]
    meta: Vec<String>,

    /// Print the verdict as a JSON report instead of plain text.
    #[arg(long)]
    json: bool,
}

/// JSON report for one check.
#[derive(serde::Serialize)]
struct Report<'a> {
    pass: bool,
    message: Option<&'a str>,
    backend: &'a str,
    checked_at: DateTime<Utc>,
    raw: Option<&'a str>,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::from(2)
        }
    }
}

/// Reads `MAGISTRATE_LOG` for filter directives; logs go to stderr so
/// stdout stays parseable.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("MAGISTRATE_LOG").unwrap_or_else(|_| EnvFilter::new("magistrate=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Command::Check(args) => check(&cli.config, args).await,
        Command::Backends => backends(&cli.config),
    }
}

async fn check(config_path: &Path, args: CheckArgs) -> Result<ExitCode> {
    let config = Config::from_file(config_path)?;
    tracing::debug!(backends = config.backends.len(), "Loaded config");
    let validator = build_validator(&config)?;

    let options = build_options(&args)?;
    let subject = read_subject(&args)?;

    let backend_label = match &args.backend {
        Some(name) => name.clone(),
        None => config.default.clone().unwrap_or_else(|| "default".to_string()),
    };

    let verdict = validator.check(&options, &subject).await?;
    print_verdict(&verdict, &backend_label, args.json)?;

    Ok(if verdict.pass {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn backends(config_path: &Path) -> Result<ExitCode> {
    let config = Config::from_file(config_path)?;

    for (name, entry) in &config.backends {
        let marker = if config.default.as_deref() == Some(name.as_str()) {
            " (default)"
        } else {
            ""
        };
        println!("{name}{marker}: {} model={}", entry.kind.as_str(), entry.model);
    }

    Ok(ExitCode::SUCCESS)
}

/// Wire every configured backend (and its defaults) into a validator.
fn build_validator(config: &Config) -> Result<Validator> {
    let mut builder = Validator::builder();

    for (name, entry) in &config.backends {
        let backend = make_backend(name, entry)
            .with_context(|| format!("Failed to configure backend '{name}'"))?;

        if config.default.as_deref() == Some(name.as_str()) {
            builder = builder
                .default_backend(Arc::clone(&backend))
                // Empty-name merges use the default backend's defaults.
                .defaults("", entry.defaults.clone());
        }

        builder = builder
            .defaults(name.clone(), entry.defaults.clone())
            .backend(name.clone(), backend);
    }

    Ok(builder.build())
}

fn make_backend(name: &str, entry: &BackendEntry) -> Result<Arc<dyn Backend>> {
    match entry.kind {
        BackendKind::Openai => {
            let env_var = entry.api_key_env.as_deref().unwrap_or(OPENAI_API_KEY_ENV);
            let api_key = std::env::var(env_var)
                .with_context(|| format!("API key variable '{env_var}' is not set"))?;

            let mut backend = OpenAiBackend::new(entry.model.clone(), api_key).with_name(name);
            if let Some(base_url) = &entry.base_url {
                backend = backend.with_base_url(base_url);
            }
            Ok(Arc::new(backend))
        }
    }
}

fn build_options(args: &CheckArgs) -> Result<CheckOptions> {
    let mut options = CheckOptions::new(instructions_from(args)?);

    if let Some(backend) = args.backend.as_deref() {
        options = options.with_backend(backend);
    }
    if let Some(preamble) = args.preamble.as_deref() {
        options = options.with_preamble(preamble);
    }
    if let Some(max_tokens) = args.max_tokens {
        options = options.with_max_tokens(max_tokens);
    }
    if let Some(temperature) = args.temperature {
        options = options.with_temperature(temperature);
    }
    if let Some(floor) = args.confidence_floor {
        options = options.with_confidence_floor(floor);
    }
    if let Some(timeout) = args.timeout {
        options = options.with_timeout(timeout);
    }
    if let Some(message) = args.failure_message.as_deref() {
        options = options.with_failure_message(message);
    }
    for (key, value) in parse_meta(&args.meta)? {
        options = options.with_metadata(key, value);
    }

    Ok(options)
}

fn instructions_from(args: &CheckArgs) -> Result<String> {
    if let Some(instructions) = &args.instructions {
        return Ok(instructions.clone());
    }

    let Some(family) = args.template.as_deref() else {
        bail!("Provide --instructions or --template");
    };

    let template = match family {
        "on-topic" => Template::OnTopic(require_arg(args, family)?),
        "tone" => Template::Tone(require_arg(args, family)?),
        "coherent" => no_arg(args, family, Template::Coherent)?,
        "safe-for-audience" => no_arg(args, family, Template::SafeForAudience)?,
        other => bail!(
            "Unknown template family '{other}' (expected on-topic, tone, coherent, or safe-for-audience)"
        ),
    };

    Ok(template.instructions(args.fidelity))
}

fn require_arg<'a>(args: &'a CheckArgs, family: &str) -> Result<&'a str> {
    args.arg
        .as_deref()
        .with_context(|| format!("Template '{family}' needs --arg"))
}

fn no_arg<'a>(args: &CheckArgs, family: &str, template: Template<'a>) -> Result<Template<'a>> {
    if args.arg.is_some() {
        bail!("Template '{family}' takes no --arg");
    }
    Ok(template)
}

fn read_subject(args: &CheckArgs) -> Result<String> {
    if let Some(text) = &args.text {
        return Ok(text.clone());
    }

    match &args.file {
        Some(path) if path.as_os_str() == "-" => read_stdin(),
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read subject file {}", path.display())),
        None => read_stdin(),
    }
}

fn read_stdin() -> Result<String> {
    let mut buffer = String::new();
    std::io::stdin()
        .read_to_string(&mut buffer)
        .context("Failed to read subject text from stdin")?;
    if buffer.is_empty() {
        bail!("Subject text is empty; pass --text, --file, or pipe stdin");
    }
    Ok(buffer)
}

fn parse_meta(entries: &[String]) -> Result<Vec<(String, JsonValue)>> {
    entries
        .iter()
        .map(|entry| {
            let (key, value) = entry
                .split_once('=')
                .with_context(|| format!("Metadata entry '{entry}' is not KEY=VALUE"))?;
            let value = serde_json::from_str(value)
                .unwrap_or_else(|_| JsonValue::String(value.to_string()));
            Ok((key.to_string(), value))
        })
        .collect()
}

fn print_verdict(verdict: &Verdict, backend: &str, as_json: bool) -> Result<()> {
    if as_json {
        let report = Report {
            pass: verdict.pass,
            message: verdict.message.as_deref(),
            backend,
            checked_at: Utc::now(),
            raw: verdict.raw.as_deref(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    match (verdict.pass, verdict.message.as_deref()) {
        (true, Some(message)) => println!("PASS: {message}"),
        (true, None) => println!("PASS"),
        (false, Some(message)) => println!("FAIL: {message}"),
        (false, None) => println!("FAIL"),
    }
    Ok(())
}
