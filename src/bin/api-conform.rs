//! API conformance CLI
//!
//! Command-line interface for checking request descriptions against a
//! schema registry and linting schema definition files.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use api_conform::{
    lint, load_schemas, AuthDecision, ConformanceEngine, EngineConfig, FileStatus, Method,
    RequestDescriptor, ResourceData, ResponseEnvelope, SchemaRegistry,
};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use serde_json::Value;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "api-conform")]
#[command(about = "Check requests against house API style rules")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check one request description and print the response envelope
    Check {
        /// Request description file (JSON: method, path, query, headers, body)
        request: PathBuf,

        /// Schema definitions: a file or a directory of .json files
        #[arg(long)]
        schemas: PathBuf,

        /// Resource data handed to the envelope builder (JSON)
        #[arg(long)]
        data: Option<PathBuf>,

        /// Supported API versions
        #[arg(long, value_delimiter = ',', default_value = "1,2,3")]
        supported_versions: Vec<u8>,

        /// Languages offered for Accept-Language negotiation
        #[arg(long, value_delimiter = ',', default_value = "en")]
        languages: Vec<String>,

        /// Credential validator outcome to simulate
        #[arg(long, value_enum, default_value = "granted")]
        auth: AuthArg,

        /// Reject requests without granted credentials
        #[arg(long)]
        require_credentials: bool,

        /// Pretty-print the response body
        #[arg(long)]
        pretty: bool,

        /// Output the whole envelope as JSON (for automation)
        #[arg(long)]
        json: bool,
    },

    /// Lint schema definition files for errors
    Lint {
        /// File or directory to lint
        path: PathBuf,

        /// Output format: text (default) or json
        #[arg(long, default_value = "text")]
        format: String,

        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,

        /// Suppress progress output, only show errors
        #[arg(long, short)]
        quiet: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum AuthArg {
    Granted,
    Missing,
    Denied,
}

impl From<AuthArg> for AuthDecision {
    fn from(arg: AuthArg) -> Self {
        match arg {
            AuthArg::Granted => AuthDecision::Granted,
            AuthArg::Missing => AuthDecision::MissingCredential,
            AuthArg::Denied => AuthDecision::Denied,
        }
    }
}

/// On-disk request description.
#[derive(Deserialize)]
struct RawRequest {
    method: String,
    path: String,
    #[serde(default)]
    query: serde_json::Map<String, Value>,
    #[serde(default)]
    headers: serde_json::Map<String, Value>,
    #[serde(default)]
    body: Option<Value>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let result = match cli.command {
        Commands::Check {
            request,
            schemas,
            data,
            supported_versions,
            languages,
            auth,
            require_credentials,
            pretty,
            json,
        } => run_check(CheckArgs {
            request,
            schemas,
            data,
            supported_versions,
            languages,
            auth,
            require_credentials,
            pretty,
            json_output: json,
        }),

        Commands::Lint {
            path,
            format,
            strict,
            quiet,
        } => run_lint(&path, &format, strict, quiet),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

struct CheckArgs {
    request: PathBuf,
    schemas: PathBuf,
    data: Option<PathBuf>,
    supported_versions: Vec<u8>,
    languages: Vec<String>,
    auth: AuthArg,
    require_credentials: bool,
    pretty: bool,
    json_output: bool,
}

fn run_check(args: CheckArgs) -> Result<(), u8> {
    let schemas = load_schemas(&args.schemas).map_err(|e| {
        eprintln!("Error loading schemas: {}", e);
        e.exit_code() as u8
    })?;
    let registry = Arc::new(SchemaRegistry::new(schemas));

    let config = EngineConfig::new(args.supported_versions)
        .languages(args.languages)
        .require_credentials(args.require_credentials);

    let raw = read_json(&args.request)?;
    let raw: RawRequest = serde_json::from_value(raw).map_err(|e| {
        eprintln!("Error: invalid request description: {}", e);
        2u8
    })?;

    let data = match &args.data {
        Some(path) => {
            let value = read_json(path)?;
            serde_json::from_value(value).map_err(|e| {
                eprintln!("Error: invalid resource data: {}", e);
                2u8
            })?
        }
        None => ResourceData::Absent,
    };

    // A method outside GET/POST/PUT/DELETE (PATCH included) never reaches
    // the engine: it is rejected up front as a 405.
    let envelope = match Method::parse(&raw.method) {
        Some(method) => {
            let mut request = RequestDescriptor::new(method, &raw.path);
            for (name, value) in &raw.query {
                request = request.with_query(name, &scalar_string(value));
            }
            for (name, value) in &raw.headers {
                request = request.with_header(name, &scalar_string(value));
            }
            if let Some(body) = raw.body {
                request = request.with_body(body);
            }

            let engine = ConformanceEngine::new(config, registry);
            engine.process(&request, args.auth.into(), &data)
        }
        None => ResponseEnvelope::from_error(
            &api_conform::ConformError::MethodNotAllowed {
                method: raw.method.clone(),
            },
            &config,
        ),
    };

    print_envelope(&envelope, args.pretty, args.json_output);

    if envelope.is_success() {
        Ok(())
    } else {
        Err(1)
    }
}

fn read_json(path: &Path) -> Result<Value, u8> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        eprintln!("Error reading {}: {}", path.display(), e);
        3u8
    })?;
    serde_json::from_str(&content).map_err(|e| {
        eprintln!("Error: invalid JSON in {}: {}", path.display(), e);
        2u8
    })
}

fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn print_envelope(envelope: &ResponseEnvelope, pretty: bool, json_output: bool) {
    if json_output {
        let out = serde_json::json!({
            "status": envelope.status(),
            "link": envelope.link_header(),
            "pagination": envelope.pagination(),
            "body": envelope.to_json(),
        });
        println!("{}", out);
        return;
    }

    println!("HTTP {}", envelope.status());
    if let Some(header) = envelope.link_header() {
        println!("Link: {}", header);
    }
    if let Some(meta) = envelope.pagination() {
        println!("X-Total-Count: {}", meta.total);
    }

    let body = envelope.to_json();
    if !body.is_null() {
        let rendered = if pretty {
            serde_json::to_string_pretty(&body)
        } else {
            serde_json::to_string(&body)
        };
        match rendered {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Error serializing body: {}", e),
        }
    }
}

fn run_lint(path: &Path, format: &str, strict: bool, quiet: bool) -> Result<(), u8> {
    use api_conform::Severity;

    if !path.exists() {
        eprintln!("Error: path not found: {}", path.display());
        return Err(2);
    }

    let result = lint(path, strict);

    if format == "json" {
        match serde_json::to_string_pretty(&result) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error serializing report: {}", e);
                return Err(2);
            }
        }
    } else {
        // Text output
        if !quiet {
            println!("Linting {} ...\n", path.display());
        }

        for file_result in &result.results {
            let status_icon = match file_result.status {
                FileStatus::Ok => "\x1b[32m✓\x1b[0m",
                FileStatus::Warning => "\x1b[33m⚠\x1b[0m",
                FileStatus::Error => "\x1b[31m✗\x1b[0m",
            };

            if !quiet || file_result.status != FileStatus::Ok {
                println!("  {} {}", status_icon, file_result.file.display());
            }

            for diag in &file_result.diagnostics {
                let color = match diag.severity {
                    Severity::Error => "\x1b[31m",
                    Severity::Warning => "\x1b[33m",
                };
                if !quiet || diag.severity == Severity::Error {
                    println!(
                        "    {}{}[{}]\x1b[0m: {} - {}",
                        color,
                        match diag.severity {
                            Severity::Error => "error",
                            Severity::Warning => "warning",
                        },
                        diag.code,
                        diag.path,
                        diag.message
                    );
                }
            }
        }

        println!();
        if result.is_ok() && (!strict || result.warnings == 0) {
            println!(
                "\x1b[32m✓ {} files checked, all passed\x1b[0m",
                result.files_checked
            );
        } else {
            println!(
                "\x1b[31m✗ {} files checked: {} passed, {} failed ({} errors, {} warnings)\x1b[0m",
                result.files_checked, result.passed, result.failed, result.errors, result.warnings
            );
        }
    }

    if result.is_ok() && (!strict || result.warnings == 0) {
        Ok(())
    } else {
        Err(1)
    }
}
