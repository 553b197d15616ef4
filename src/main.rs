use clap::{ArgAction, Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use async_feedback::config::OrchestratorConfig;
use async_feedback::error::{ClassifierConfig, ErrorClassifier, MaskingPolicy};
use async_feedback::logging::{init_logging, LoggingConfig};
use async_feedback::orchestrator::Orchestrator;
use async_feedback::presentation::StatusRenderer;
use async_feedback::RunMessages;

#[derive(Parser, Debug)]
#[command(name = "feedbackctl")]
#[command(version)]
#[command(about = "Inspect and exercise async operation feedback")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Disable colors (also respects NO_COLOR environment variable)
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show what a user would see for a raw failure message
    Classify {
        /// Raw failure message
        message: String,

        /// Print the classification as JSON
        #[arg(long)]
        json: bool,

        /// Mask every message that matches no known rule
        #[arg(long)]
        allow_list: bool,
    },
    /// Run a simulated operation and print each feedback change
    Simulate {
        /// How long the simulated operation takes
        #[arg(long, value_name = "MS", default_value = "100")]
        delay_ms: u64,

        /// Fail the operation with this raw message
        #[arg(long, value_name = "MESSAGE")]
        fail: Option<String>,

        /// Success copy to show on completion
        #[arg(long, value_name = "TEXT")]
        success: Option<String>,

        /// Loading watchdog (overrides the default)
        #[arg(long, value_name = "MS")]
        watchdog_ms: Option<u64>,

        /// Load settings from a TOML file
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
    /// Validate a configuration file
    CheckConfig {
        /// Path to the TOML file
        path: PathBuf,
    },
}

mod exit_codes {
    use std::process::ExitCode;

    /// The simulated operation failed
    pub fn operation_failed() -> ExitCode {
        ExitCode::from(1)
    }

    /// The configuration could not be loaded
    pub fn bad_config() -> ExitCode {
        ExitCode::from(2)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let colored =
        !cli.no_color && std::env::var_os("NO_COLOR").is_none() && std::io::stdout().is_terminal();
    init_logging(LoggingConfig::from_verbosity(cli.verbose).with_ansi(colored));

    match cli.command {
        Commands::Classify {
            message,
            json,
            allow_list,
        } => {
            let policy = if allow_list {
                MaskingPolicy::AllowList
            } else {
                MaskingPolicy::DenyList
            };
            let classifier = ErrorClassifier::with_config(ClassifierConfig {
                policy,
                ..ClassifierConfig::default()
            });
            let sanitized = classifier.classify(&message);
            if json {
                println!("{}", serde_json::to_string_pretty(&sanitized)?);
            } else {
                println!("{}", sanitized.display_text);
                println!("category: {}", sanitized.category);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Simulate {
            delay_ms,
            fail,
            success,
            watchdog_ms,
            config,
        } => {
            let mut settings = match config {
                Some(path) => match OrchestratorConfig::load(&path) {
                    Ok(settings) => settings,
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        return Ok(exit_codes::bad_config());
                    }
                },
                None => OrchestratorConfig::default(),
            };
            if let Some(ms) = watchdog_ms {
                settings.feedback.watchdog = Duration::from_millis(ms);
            }
            simulate(settings, delay_ms, fail, success, colored).await
        }
        Commands::CheckConfig { path } => match OrchestratorConfig::load(&path) {
            Ok(settings) => {
                println!("Configuration OK: {}", path.display());
                println!(
                    "  watchdog: {}ms",
                    settings.feedback.watchdog.as_millis()
                );
                println!(
                    "  retry attempt timeout: {}ms",
                    settings.retry.attempt_timeout.as_millis()
                );
                match settings.retry.max_manual_retries {
                    Some(max) => println!("  manual retries: up to {}", max),
                    None => println!("  manual retries: unlimited"),
                }
                println!(
                    "  inactivity window: {}ms",
                    settings.session.inactivity_window.as_millis()
                );
                println!("  login route: {}", settings.session.login_route);
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                Ok(exit_codes::bad_config())
            }
        },
    }
}

async fn simulate(
    settings: OrchestratorConfig,
    delay_ms: u64,
    fail: Option<String>,
    success: Option<String>,
    colored: bool,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let orchestrator = Orchestrator::global(settings)?;
    let renderer = StatusRenderer::new().with_color(colored);
    let mut presenter = orchestrator.presenter();

    let printer = tokio::spawn(async move {
        println!("{}", renderer.render(&presenter.snapshot()));
        while let Some(snapshot) = presenter.changed().await {
            println!("{}", renderer.render(&snapshot));
        }
    });

    let messages = match success {
        Some(text) => RunMessages::new().with_success(text),
        None => RunMessages::new(),
    };
    let outcome = orchestrator
        .run(
            move || async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                match fail {
                    Some(message) => Err(message),
                    None => Ok(()),
                }
            },
            messages,
        )
        .await;

    // Let the printer flush the final transition.
    tokio::time::sleep(Duration::from_millis(20)).await;
    printer.abort();

    match outcome {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(_) => Ok(exit_codes::operation_failed()),
    }
}
