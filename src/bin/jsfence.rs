//! jsfence CLI
//!
//! Evaluates expressions, renders templates and runs transforms from the
//! command line. Started with `js-sandbox` as its only argument it acts as
//! the sandbox worker instead.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use jsfence::config::{self, Config};
use jsfence::expr::{Bindings, Evaluator};
use jsfence::sandbox::{self, Supervisor};
use jsfence::template::TemplateRenderer;
use jsfence::VERSION;
use serde_json::Value;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "jsfence",
    author = "jsfence Contributors",
    version = VERSION,
    about = "jsfence - bounded JavaScript expressions, templates and transforms",
    long_about = None
)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a template expression
    Eval {
        /// Expression, e.g. "(page - 1) * limit"
        expr: String,
        /// Binding as name=value; the value is parsed as JSON, else taken as a string
        #[arg(short = 'v', long = "var", value_name = "NAME=VALUE")]
        vars: Vec<String>,
    },

    /// Render the placeholders in a JSON template
    Render {
        /// Template file, or - for stdin
        template: String,
        /// Binding as name=value
        #[arg(short = 'v', long = "var", value_name = "NAME=VALUE")]
        vars: Vec<String>,
    },

    /// Run a transform in the process sandbox
    Transform {
        /// File holding the function expression
        code: PathBuf,
        /// JSON payload file, or - for stdin
        #[arg(short, long)]
        input: Option<String>,
    },

    /// Show the effective configuration and any validation issues
    Config {
        /// Only print the config file location
        #[arg(long)]
        path: bool,
    },
}

fn main() -> ExitCode {
    // Worker mode must not build a runtime or touch stdout before serving
    if sandbox::is_worker_invocation(std::env::args_os()) {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("warn"))
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .init();
        return sandbox::worker::run();
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("jsfence=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Commands::Config { path: true } = cli.command {
        let path = cli.config.unwrap_or_else(config::config_path);
        println!("{}", path.display());
        return Ok(());
    }

    let config = load(cli.config.as_deref())?;
    match cli.command {
        Commands::Eval { expr, vars } => eval(&config, &expr, &vars).await,
        Commands::Render { template, vars } => render(&config, &template, &vars).await,
        Commands::Transform { code, input } => transform(config, &code, input.as_deref()).await,
        Commands::Config { .. } => show_config(&config),
    }
}

fn load(path: Option<&Path>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => {
            let mut config = config::load_config_from_path(path)
                .with_context(|| format!("loading {}", path.display()))?;
            config::apply_env_overrides(&mut config);
            config
        }
        None => Config::from_env()?,
    };
    Ok(config)
}

fn parse_bindings(vars: &[String]) -> anyhow::Result<Bindings> {
    let mut bindings = Bindings::new();
    for var in vars {
        let Some((name, raw)) = var.split_once('=') else {
            bail!("binding {:?} is not NAME=VALUE", var);
        };
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        bindings.insert(name.trim().to_string(), value);
    }
    Ok(bindings)
}

fn read_source(source: &str) -> anyhow::Result<String> {
    if source == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("reading stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(source).with_context(|| format!("reading {}", source))
}

async fn eval(config: &Config, expr: &str, vars: &[String]) -> anyhow::Result<()> {
    let bindings = parse_bindings(vars)?;
    let evaluator = Evaluator::new(config.evaluator.clone());
    let expr = expr.to_string();
    let value =
        tokio::task::spawn_blocking(move || evaluator.evaluate(&expr, &bindings)).await??;
    println!("{}", value);
    Ok(())
}

async fn render(config: &Config, template: &str, vars: &[String]) -> anyhow::Result<()> {
    let bindings = parse_bindings(vars)?;
    let template: Value = serde_json::from_str(&read_source(template)?)
        .context("template is not valid JSON")?;
    let renderer = TemplateRenderer::new(Evaluator::new(config.evaluator.clone()));
    let rendered =
        tokio::task::spawn_blocking(move || renderer.render(&template, &bindings)).await??;
    println!("{}", serde_json::to_string_pretty(&rendered)?);
    Ok(())
}

async fn transform(config: Config, code: &Path, input: Option<&str>) -> anyhow::Result<()> {
    let code = std::fs::read_to_string(code)
        .with_context(|| format!("reading {}", code.display()))?;
    let payload: Value = match input {
        Some(source) => {
            serde_json::from_str(&read_source(source)?).context("input is not valid JSON")?
        }
        None => Value::Null,
    };

    let supervisor = Supervisor::new(config.sandbox)?;
    let result = supervisor.run_transform(&code, &payload).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn show_config(config: &Config) -> anyhow::Result<()> {
    println!("{}", toml::to_string_pretty(config)?);

    let result = config::validate_config(config);
    for issue in &result.errors {
        eprintln!("error: {}", issue);
    }
    for issue in &result.warnings {
        eprintln!("warning: {}", issue);
    }
    if !result.valid {
        bail!("configuration has {} error(s)", result.errors.len());
    }
    Ok(())
}
