use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mcai_contracts::response::decompose;
use mcai_contracts::targets::Target;
use mcai_contracts::validation::validate;
use mcai_contracts::McaiError;
use mcai_engine::{GenerationService, Settings};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

const EXIT_CALLER_ERROR: i32 = 2;
const EXIT_NON_COMPLIANT: i32 = 3;

#[derive(Debug, Parser)]
#[command(name = "mcai", version, about = "MakeCode AI code generator")]
struct Cli {
    /// Config file holding the active preset. Overrides MCAI_CONFIG_PATH.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// JSONL event log. Overrides MCAI_EVENTS_PATH.
    #[arg(long, global = true)]
    events: Option<PathBuf>,
    /// Bearer credential checked against SERVER_APP_TOKEN.
    #[arg(long, global = true)]
    token: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Config,
    SetPreset(SetPresetArgs),
    Generate(GenerateArgs),
    Validate(ValidateArgs),
}

#[derive(Debug, Parser)]
struct SetPresetArgs {
    #[arg(long)]
    preset: String,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    target: String,
    #[arg(long)]
    request: String,
    #[arg(long)]
    current_code_file: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct ValidateArgs {
    #[arg(long)]
    target: String,
    #[arg(long)]
    file: PathBuf,
    /// Treat the file as a raw model reply and extract its code first.
    #[arg(long)]
    decompose: bool,
}

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("mcai error: {err:#}");
            let caller = err
                .downcast_ref::<McaiError>()
                .is_some_and(McaiError::is_caller_error);
            std::process::exit(if caller { EXIT_CALLER_ERROR } else { 1 });
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("MCAI_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let session = SessionArgs {
        config: cli.config,
        events: cli.events,
        token: cli.token,
    };
    match cli.command {
        Command::Config => {
            let service = session.open()?;
            print_json(&serde_json::to_value(service.get_config())?)?;
            Ok(0)
        }
        Command::SetPreset(args) => {
            let service = session.open()?;
            let response = service.set_config(Some(&args.preset))?;
            print_json(&serde_json::to_value(response)?)?;
            Ok(0)
        }
        Command::Generate(args) => run_generate(&session, args),
        Command::Validate(args) => run_validate(&args),
    }
}

struct SessionArgs {
    config: Option<PathBuf>,
    events: Option<PathBuf>,
    token: Option<String>,
}

impl SessionArgs {
    /// Builds the service from env settings plus flag overrides, then checks the token.
    fn open(&self) -> Result<GenerationService> {
        let mut settings = Settings::from_env();
        if let Some(path) = &self.config {
            settings.config_path = Some(path.clone());
        }
        if let Some(path) = &self.events {
            settings.events_path = Some(path.clone());
        }
        let service = GenerationService::from_settings(&settings)?;
        service.authorize(self.token.as_deref())?;
        Ok(service)
    }
}

fn run_generate(session: &SessionArgs, args: GenerateArgs) -> Result<i32> {
    let current_code = match args.current_code_file {
        Some(path) => Some(
            fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?,
        ),
        None => None,
    };
    let service = session.open()?;
    let outcome = service.generate(
        Some(&args.target),
        Some(&args.request),
        current_code.as_deref(),
    )?;
    print_json(&serde_json::to_value(outcome)?)?;
    Ok(0)
}

fn run_validate(args: &ValidateArgs) -> Result<i32> {
    let target: Target = args.target.parse()?;
    let raw = fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let (code, feedback) = if args.decompose {
        let decomposed = decompose(&raw);
        (decomposed.code_body, decomposed.feedback_lines)
    } else {
        (raw, Vec::new())
    };
    let result = validate(&code, target);
    let mut output = json!({
        "target": target.as_str(),
        "ok": result.is_ok(),
        "violations": result.violations(),
    });
    if args.decompose {
        output["code"] = Value::String(code);
        output["feedback"] = json!(feedback);
    }
    print_json(&output)?;
    Ok(if result.is_ok() { 0 } else { EXIT_NON_COMPLIANT })
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};

    use super::{run_validate, Cli, Command, ValidateArgs, EXIT_NON_COMPLIANT};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_parse_after_the_subcommand() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from([
            "mcai", "validate", "--target", "arcade", "--file", "game.ts", "--token", "t",
        ])?;
        assert_eq!(cli.token.as_deref(), Some("t"));
        assert!(matches!(cli.command, Command::Validate(ref args) if !args.decompose));
        Ok(())
    }

    #[test]
    fn validate_needs_no_service_and_reports_violations() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let file = temp.path().join("reply.txt");

        std::fs::write(&file, "FEEDBACK: done\n```ts\nbasic.pause(1)\n```")?;
        let args = ValidateArgs {
            target: "microbit".to_string(),
            file: file.clone(),
            decompose: true,
        };
        assert_eq!(run_validate(&args)?, 0);

        std::fs::write(&file, "let f = () => 1")?;
        let args = ValidateArgs {
            decompose: false,
            ..args
        };
        assert_eq!(run_validate(&args)?, EXIT_NON_COMPLIANT);
        Ok(())
    }
}
