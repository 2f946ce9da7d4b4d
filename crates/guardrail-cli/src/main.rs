use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use guardrail_core::{
    variables, EventLog, ObjectSchema, SchemaValidator, TemplateRegistry, Variables,
};
use guardrail_runtime::{Pipeline, PipelineConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const FALLBACK_ANSWER: &str = "Sorry, I couldn't generate a response.";
const FAREWELL: &str = "Goodbye 👋";

#[derive(Parser)]
#[command(name = "guardrail", version, about = "Validated, retrying prompts for LLMs")]
struct Cli {
    /// Pipeline config file (YAML or JSON)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Print the event trace as JSON lines on stderr
    #[arg(long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive Q&A; type `exit` to quit
    Chat(ModelArgs),

    /// One free-text answer
    Ask {
        #[command(flatten)]
        model: ModelArgs,

        /// Template name
        #[arg(long, short, default_value = "qa")]
        template: String,

        /// Template variable as key=value (repeatable)
        #[arg(long = "var", value_parser = parse_var)]
        vars: Vec<(String, String)>,

        /// Returned when every attempt fails
        #[arg(long, default_value = FALLBACK_ANSWER)]
        fallback: String,
    },

    /// One structured answer, validated against required keys
    Extract {
        #[command(flatten)]
        model: ModelArgs,

        /// Template name
        #[arg(long, short, default_value = "json_extract")]
        template: String,

        /// Template variable as key=value (repeatable)
        #[arg(long = "var", value_parser = parse_var)]
        vars: Vec<(String, String)>,

        #[command(flatten)]
        schema: SchemaArgs,

        /// Returned (and validated) when every attempt fails
        #[arg(long, default_value = "{}")]
        fallback: String,
    },

    /// List templates, or print one
    Templates {
        /// Template to print
        name: Option<String>,
    },

    /// Validate JSON text offline (file or stdin)
    Validate {
        #[command(flatten)]
        schema: SchemaArgs,

        /// Require the whole input to be one JSON object
        #[arg(long)]
        strict: bool,

        /// Input file; stdin if omitted
        input: Option<PathBuf>,
    },
}

#[derive(Args)]
struct ModelArgs {
    /// Override the configured model
    #[arg(long, short)]
    model: Option<String>,

    /// Override the configured attempt count
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Override the per-call timeout (e.g. "10s")
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,
}

#[derive(Args)]
struct SchemaArgs {
    /// Required key (repeatable)
    #[arg(long = "key", short = 'k')]
    keys: Vec<String>,

    /// Tolerate keys beyond the required ones
    #[arg(long)]
    allow_extra: bool,
}

impl SchemaArgs {
    fn schema(&self) -> ObjectSchema {
        ObjectSchema::new(self.keys.iter().cloned()).allow_extra_keys(self.allow_extra)
    }
}

fn parse_var(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got '{s}'")),
    }
}

fn is_exit(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case("exit")
}

fn load_config(path: Option<&Path>, overrides: &ModelArgs) -> Result<PipelineConfig> {
    let mut config = match path {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    if let Some(model) = &overrides.model {
        config.model = model.clone();
    }
    if let Some(max_attempts) = overrides.max_attempts {
        config.max_attempts = max_attempts;
    }
    if let Some(timeout) = overrides.timeout {
        config.timeout = timeout;
    }
    config.validate()?;
    Ok(config)
}

fn build_pipeline(path: Option<&Path>, overrides: &ModelArgs) -> Result<Pipeline> {
    let config = load_config(path, overrides)?;
    tracing::info!(model = %config.model, max_attempts = config.max_attempts, "Initializing pipeline");
    Pipeline::gemini_from_env(config).context("Cannot start without a model provider")
}

/// Read questions line by line until EOF or `exit`, writing one answer
/// per question.
fn run_chat<R, W, F>(input: R, mut output: W, mut answer: F) -> Result<()>
where
    R: BufRead,
    W: Write,
    F: FnMut(&str) -> Result<String>,
{
    writeln!(output, "LLM chat. Type 'exit' to quit.")?;
    let mut lines = input.lines();

    loop {
        write!(output, "You: ")?;
        output.flush()?;

        let Some(line) = lines.next() else {
            writeln!(output)?;
            break;
        };
        let line = line?;

        if is_exit(&line) {
            writeln!(output, "LLM: {FAREWELL}")?;
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        let reply = answer(line.trim())?;
        writeln!(output, "LLM: {reply}\n")?;
    }
    Ok(())
}

fn print_trace(enabled: bool, log: &EventLog) -> Result<()> {
    if enabled {
        eprint!("{}", log.to_json_lines()?);
    }
    Ok(())
}

fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read stdin")?;
            Ok(text)
        }
    }
}

fn templates_for(path: Option<&Path>) -> Result<TemplateRegistry> {
    let config = match path {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    Ok(config.templates()?)
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Command::Chat(model) => {
            let pipeline = build_pipeline(config_path, &model)?;
            let stdin = io::stdin();
            run_chat(stdin.lock(), io::stdout(), |question| {
                let mut log = EventLog::new();
                let outcome =
                    pipeline.ask("qa", &variables([("question", question)]), FALLBACK_ANSWER, &mut log)?;
                print_trace(cli.trace, &log)?;
                Ok(outcome.value)
            })?;
            tracing::info!("Goodbye!");
            Ok(ExitCode::SUCCESS)
        }

        Command::Ask {
            model,
            template,
            vars,
            fallback,
        } => {
            let pipeline = build_pipeline(config_path, &model)?;
            let vars: Variables = vars.into_iter().collect();
            let mut log = EventLog::new();

            let outcome = pipeline.ask(&template, &vars, &fallback, &mut log)?;
            print_trace(cli.trace, &log)?;
            println!("{}", outcome.value);

            Ok(if outcome.succeeded_via_fallback {
                ExitCode::from(2)
            } else {
                ExitCode::SUCCESS
            })
        }

        Command::Extract {
            model,
            template,
            vars,
            schema,
            fallback,
        } => {
            let pipeline = build_pipeline(config_path, &model)?;
            let vars: Variables = vars.into_iter().collect();
            let mut log = EventLog::new();

            let outcome = pipeline.extract(&template, &vars, &schema.schema(), &fallback, &mut log)?;
            print_trace(cli.trace, &log)?;
            println!("{}", serde_json::to_string_pretty(&outcome.value)?);

            Ok(match (outcome.value.success, outcome.succeeded_via_fallback) {
                (false, _) => ExitCode::FAILURE,
                (true, true) => ExitCode::from(2),
                (true, false) => ExitCode::SUCCESS,
            })
        }

        Command::Templates { name } => {
            let templates = templates_for(config_path)?;
            match name {
                Some(name) => println!("{}", templates.get(&name)?),
                None => {
                    for name in templates.names() {
                        let vars = templates.placeholders(name)?;
                        println!("{name}: {}", vars.join(", "));
                    }
                }
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Validate {
            schema,
            strict,
            input,
        } => {
            let text = read_input(input.as_deref())?;
            let validator = if strict {
                SchemaValidator::strict()
            } else {
                SchemaValidator::new()
            };

            let result = validator.validate_schema(&text, &schema.schema());
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(if result.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("guardrail=info")))
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %err, "Command failed");
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
