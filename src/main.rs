#![forbid(unsafe_code)]

//! Command line front end for the tool host.
//!
//! Lists configured tools, runs a generic tool against a given file and
//! selection, or starts a language server, optionally makes one call and
//! shuts it down again.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use sce_toolhost::ansi::{strip_control_sequences, StyledSpan};
use sce_toolhost::config::GlobalConfig;
use sce_toolhost::editor::{EditorSnapshot, TracingStatus};
use sce_toolhost::lsp::{Client, Response};
use sce_toolhost::models::ToolType;
use sce_toolhost::output::Presentation;
use sce_toolhost::runner::ToolRunner;
use sce_toolhost::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "sce-toolhost", about = "Run SCE editor tools and language servers", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the configured tools.
    Tools,
    /// Run a generic tool and print its output per its targets.
    Run {
        /// Tool name.
        tool: String,
        /// Value for `$FilePath`.
        #[arg(long, default_value = "")]
        file: String,
        /// Value for `$Selection`.
        #[arg(long, default_value = "")]
        selection: String,
        /// Print both streams without control sequences, ignoring targets.
        #[arg(long)]
        strip: bool,
    },
    /// Start a language server, optionally make one call, then shut it down.
    Lsp {
        /// Tool name.
        tool: String,
        /// Project root sent in `initialize`.
        #[arg(long)]
        root: PathBuf,
        /// Method to call after the handshake.
        #[arg(long)]
        method: Option<String>,
        /// JSON parameters for the call.
        #[arg(long, requires = "method")]
        params: Option<String>,
    },
}

fn main() -> Result<ExitCode> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<ExitCode> {
    let config = GlobalConfig::load_from_path(&args.config)?;
    info!(tools = config.tools.len(), "configuration loaded");

    match args.command {
        Command::Tools => {
            list_tools(&config);
            Ok(ExitCode::SUCCESS)
        }
        Command::Run {
            tool,
            file,
            selection,
            strip,
        } => run_generic(&config, &tool, file, selection, strip).await,
        Command::Lsp {
            tool,
            root,
            method,
            params,
        } => {
            run_language_server(&config, &tool, &root, method.as_deref(), params.as_deref()).await
        }
    }
}

fn list_tools(config: &GlobalConfig) {
    for tool in &config.tools {
        let kind = match tool.tool_type {
            ToolType::Generic => "generic",
            ToolType::LspServer => "lsp",
        };
        let state = if tool.enabled { "" } else { " (disabled)" };
        println!(
            "{}\t{kind}\t{}\t{} {}{state}",
            tool.name, tool.activation, tool.path, tool.arguments
        );
    }
}

async fn run_generic(
    config: &GlobalConfig,
    name: &str,
    file: String,
    selection: String,
    strip: bool,
) -> Result<ExitCode> {
    let tool = config.tool(name)?;
    if tool.tool_type != ToolType::Generic {
        warn!(tool = name, "running a language server as a generic tool");
    }

    let editor = Arc::new(EditorSnapshot {
        file_path: file,
        selection,
        buffer: String::new(),
        token: 0,
    });
    let runner = ToolRunner::new(config.terminal.clone(), editor, Arc::new(TracingStatus));
    let report = runner.run(tool).await?;

    if strip {
        print!("{}", strip_control_sequences(&report.output.stdout));
        eprint!("{}", strip_control_sequences(&report.output.stderr));
    } else {
        show(&report.stdout);
        show(&report.stderr);
    }

    let completion = &report.output.completion;
    info!(
        tool = name,
        exit_code = ?completion.exit_code,
        timed_out = completion.timed_out,
        "tool run complete"
    );
    Ok(if completion.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn show(presentation: &Presentation) {
    match presentation {
        Presentation::Ignored => {}
        Presentation::Popup {
            title,
            is_error,
            spans,
        } => {
            let kind = if *is_error { "Error" } else { "Output" };
            println!("── {kind}: {title} ──");
            println!("{}", joined(spans));
        }
        Presentation::Console(spans) | Presentation::ReplaceDocument(spans) => {
            print!("{}", joined(spans));
        }
        Presentation::Paste(text) => print!("{text}"),
        Presentation::Stale { target } => {
            warn!(?target, "output discarded because the document changed");
        }
    }
}

fn joined(spans: &[StyledSpan]) -> String {
    spans.iter().map(|span| span.text.as_str()).collect()
}

async fn run_language_server(
    config: &GlobalConfig,
    name: &str,
    root: &Path,
    method: Option<&str>,
    params: Option<&str>,
) -> Result<ExitCode> {
    let tool = config.tool(name)?;
    let root = root
        .canonicalize()
        .map_err(|err| AppError::Config(format!("invalid project root: {err}")))?;

    let client = Client::spawn(tool, &EditorSnapshot::default(), &root, &config.lsp).await?;
    println!("{}", serde_json::to_string_pretty(client.capabilities())?);

    let mut exit = ExitCode::SUCCESS;
    if let Some(method) = method {
        let params: Value = match params {
            Some(raw) => serde_json::from_str(raw)?,
            None => Value::Null,
        };
        match client.call(method, params).await? {
            Response::Result(result) => println!("{}", serde_json::to_string_pretty(&result)?),
            Response::Error(error) => {
                eprintln!("{method} failed: {error}");
                exit = ExitCode::FAILURE;
            }
        }
    }

    let completion = client.shutdown().await?;
    info!(tool = name, exit_code = ?completion.exit_code, "language server stopped");
    Ok(exit)
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
