use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use sensei_core::{Config, Session, SessionError, TurnOutput};
use sensei_exec::{
    AuditLogger, Diagnoser, EventSink, ExecError, NullSink, Orchestrator, RiskClassifier,
    ShellRunner, TurnEvent, TurnProgress,
};
use sensei_learning::Tracker;
use sensei_llm::{GeminiProvider, Oracle};
use sensei_profile::SystemProfile;

mod init;

#[derive(Parser)]
#[command(name = "sensei", version, about = "System-aware terminal assistant")]
struct Cli {
    /// Config file path. Defaults to ~/.sensei/config.toml.
    #[arg(long, env = "SENSEI_CONFIG")]
    config: Option<PathBuf>,

    /// Rescan the system profile before starting.
    #[arg(long)]
    refresh_profile: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive configuration wizard.
    Init {
        /// Where to write the config file. Defaults to ~/.sensei/config.toml.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Answer a single request and exit.
    Ask {
        /// The natural-language request.
        words: Vec<String>,
    },
}

/// Event sink chosen at startup: progress tracking on or off.
enum ProgressSink {
    Tracker(Arc<Tracker>),
    Disabled(NullSink),
}

impl EventSink for ProgressSink {
    async fn record(&self, event: &TurnEvent) {
        match self {
            Self::Tracker(tracker) => tracker.record(event).await,
            Self::Disabled(sink) => sink.record(event).await,
        }
    }
}

type CliSession = Session<GeminiProvider, ShellRunner, ProgressSink>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);

    if let Some(Command::Init { output }) = &cli.command {
        return init::run(output.clone().unwrap_or(config_path));
    }

    let config = Config::load(&config_path)?;
    let data_dir = config.data_dir();
    tokio::fs::create_dir_all(&data_dir)
        .await
        .with_context(|| format!("failed to create {}", data_dir.display()))?;

    let profile = load_profile(&data_dir, &config, cli.refresh_profile).await;

    let api_key = config.llm.api_key.clone().context(
        "no API key configured; set SENSEI_GEMINI_API_KEY or run `sensei init`",
    )?;
    let provider = GeminiProvider::new(
        api_key,
        config.llm.model.clone(),
        config.llm.max_output_tokens,
        config.llm.temperature,
    );

    let tracker = if config.learning.enabled {
        Some(Arc::new(Tracker::load(data_dir.join("progress.json")).await))
    } else {
        None
    };
    let sink = match &tracker {
        Some(tracker) => ProgressSink::Tracker(Arc::clone(tracker)),
        None => ProgressSink::Disabled(NullSink),
    };

    let classifier = RiskClassifier::new(&config.exec.risk)?;
    let mut orchestrator = Orchestrator::new(
        classifier,
        ShellRunner::new(&config.exec),
        Diagnoser::new(profile.package_manager.clone()),
        sink,
        config.exec.max_retries,
    );
    if config.exec.audit.enabled {
        match AuditLogger::from_config(&config.exec.audit).await {
            Ok(logger) => orchestrator = orchestrator.with_audit(logger),
            Err(err) => tracing::warn!(%err, "audit log unavailable"),
        }
    }

    let mut session = Session::new(Oracle::new(provider), orchestrator, profile.to_markdown());

    if let Some(Command::Ask { words }) = cli.command {
        let query = words.join(" ");
        anyhow::ensure!(!query.trim().is_empty(), "empty request");
        run_turn(&mut session, tracker.as_deref(), Turn::Ask(&query)).await?;
        return Ok(());
    }

    repl(&mut session, tracker.as_deref(), &profile).await
}

async fn load_profile(data_dir: &std::path::Path, config: &Config, refresh: bool) -> SystemProfile {
    if !refresh
        && let Some(profile) = SystemProfile::load(data_dir).await
        && !profile.is_stale(config.profile.refresh_days)
    {
        return profile;
    }
    println!("Scanning system (first run or stale profile)...");
    let profile = SystemProfile::scan().await;
    if let Err(err) = profile.save(data_dir).await {
        tracing::warn!(%err, "failed to save system profile");
    }
    profile
}

async fn repl(
    session: &mut CliSession,
    tracker: Option<&Tracker>,
    profile: &SystemProfile,
) -> anyhow::Result<()> {
    println!("sensei v{}", env!("CARGO_PKG_VERSION"));
    println!("Describe what you want to do, or type `help`.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt();
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => {}
            "exit" | "quit" => break,
            "help" => print_help(),
            "profile" => {
                // Rendered context, exactly as the model sees it.
                println!("{}", profile.to_markdown());
            }
            "progress" => {
                if let Some(tracker) = tracker {
                    for rendered in tracker.progress().await.render_lines() {
                        println!("{rendered}");
                    }
                } else {
                    println!("Progress tracking is disabled in the config.");
                }
            }
            _ => {
                let turn = if let Some(command) = line.strip_prefix("run ") {
                    Turn::Verbatim(command)
                } else if let Ok(ordinal) = line.parse::<usize>() {
                    Turn::Pick(ordinal)
                } else {
                    Turn::Ask(line)
                };
                run_turn(session, tracker, turn).await?;
            }
        }
    }
    Ok(())
}

enum Turn<'a> {
    Ask(&'a str),
    Verbatim(&'a str),
    Pick(usize),
}

async fn run_turn(
    session: &mut CliSession,
    tracker: Option<&Tracker>,
    turn: Turn<'_>,
) -> anyhow::Result<()> {
    // Interrupts go through the cancellation token so the running
    // command's whole process group is killed, not just the shell.
    let cancel = session.cancellation_token();
    let outcome = {
        let turn = async {
            match turn {
                Turn::Ask(query) => session.ask(query).await,
                Turn::Verbatim(command) => session.run_verbatim(command).await,
                Turn::Pick(ordinal) => session.pick(ordinal).await,
            }
        };
        tokio::pin!(turn);
        let outcome = tokio::select! {
            outcome = &mut turn => Some(outcome),
            _ = tokio::signal::ctrl_c() => None,
        };
        match outcome {
            Some(outcome) => outcome,
            None => {
                // Kill the in-flight process group, then let the turn
                // observe the cancellation and wind down.
                cancel.cancel();
                turn.await
            }
        }
    };

    match outcome {
        Err(SessionError::Exec(ExecError::Cancelled)) => println!("\ninterrupted"),
        Ok(mut output) => {
            // A retried fix can itself need confirmation, so keep
            // resolving until the turn reaches a terminal state.
            while render(&output) {
                let decision = ask_confirmation(&output).await?;
                match session.confirm(decision).await {
                    Ok(next) => output = next,
                    Err(err) => {
                        report_session_error(&err);
                        break;
                    }
                }
            }
        }
        Err(err) => report_session_error(&err),
    }

    if let Some(tracker) = tracker {
        for achievement in tracker.take_unlocked().await {
            println!(
                "\nAchievement unlocked: {} {}  -  {}",
                achievement.icon, achievement.name, achievement.description
            );
        }
    }
    Ok(())
}

/// Print one turn's outcome. Returns true when a confirmation is pending.
fn render(output: &TurnOutput) -> bool {
    match &output.progress {
        TurnProgress::Noop => {}
        TurnProgress::Blocked { pattern } => {
            println!("Refused: this command matches a destructive pattern ({pattern}).");
            println!("It will not be run, even with confirmation.");
        }
        TurnProgress::AwaitingConfirmation { proposal, reasons } => {
            if let Some(explanation) = &output.explanation {
                println!("{explanation}");
            }
            println!("\n  $ {}", proposal.text);
            if !reasons.is_empty() {
                println!("\nNeeds confirmation: {}", reasons.join(", "));
            }
            if let Some(warning) = &output.warning {
                println!("Warning: {warning}");
            }
            return true;
        }
        TurnProgress::Cancelled => println!("Okay, not running it."),
        TurnProgress::Completed(report) => {
            if let Some(explanation) = &output.explanation {
                println!("{explanation}");
            }
            println!("\n  $ {}", report.result.command);
            if let Some(warning) = &output.warning {
                println!("Warning: {warning}");
            }
            print_streams(&report.result.stdout_lossy(), &report.result.stderr_lossy());
            if report.recovered {
                println!("(recovered after {} attempts)", report.attempts);
            }
            print_next_steps(output);
        }
        TurnProgress::Exhausted(failure) => {
            println!("\n  $ {}", failure.result.command);
            print_streams(&failure.result.stdout_lossy(), &failure.result.stderr_lossy());
            if failure.result.timed_out {
                println!("Command timed out.");
            } else {
                println!("Command failed (exit code {}).", failure.result.exit_code);
            }
            println!("Likely cause: {}", failure.report.likely_cause);
            if let Some(diagnosis) = &output.diagnosis {
                println!("\n{}", diagnosis.diagnosis);
                if !diagnosis.fix_command.is_empty() {
                    println!("Possible fix: run {}", diagnosis.fix_command);
                    if !diagnosis.explanation.is_empty() {
                        println!("  {}", diagnosis.explanation);
                    }
                }
            }
        }
    }
    false
}

fn print_streams(stdout: &str, stderr: &str) {
    if !stdout.trim().is_empty() {
        println!("{}", stdout.trim_end());
    }
    if !stderr.trim().is_empty() {
        eprintln!("{}", stderr.trim_end());
    }
}

fn print_next_steps(output: &TurnOutput) {
    if output.next_steps.is_empty() {
        return;
    }
    println!("\nNext steps (type the number to run):");
    for (i, step) in output.next_steps.iter().enumerate() {
        println!("  {}. {}  -  {}", i + 1, step.command, step.description);
    }
}

async fn ask_confirmation(output: &TurnOutput) -> anyhow::Result<bool> {
    let TurnProgress::AwaitingConfirmation { proposal, .. } = &output.progress else {
        return Ok(false);
    };
    let prompt = format!("Run `{}`?", proposal.text);
    // dialoguer blocks on the terminal; keep it off the runtime threads.
    let decision = tokio::task::spawn_blocking(move || {
        dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
    })
    .await?
    .unwrap_or(false);
    Ok(decision)
}

fn report_session_error(err: &SessionError) {
    match err {
        SessionError::Llm(inner) => eprintln!("model error: {inner}"),
        SessionError::Exec(inner) => eprintln!("execution error: {inner}"),
        SessionError::NoSuchNextStep { .. } => eprintln!("{err}"),
    }
}

fn print_help() {
    println!("Type a request in plain language, e.g. `show the biggest files here`.");
    println!("Commands:");
    println!("  run <command>   run a shell command as typed (still safety-checked)");
    println!("  1 / 2 / 3       run a suggested next step from the last answer");
    println!("  profile         show what sensei knows about this system");
    println!("  progress        show learning progress and achievements");
    println!("  exit            quit");
}

fn prompt() {
    use std::io::Write as _;
    print!("sensei> ");
    let _ = std::io::stdout().flush();
}

fn default_config_path() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".sensei")
        .join("config.toml")
}

fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn ask_subcommand_collects_words() {
        let cli = Cli::parse_from(["sensei", "ask", "show", "disk", "usage"]);
        let Some(Command::Ask { words }) = cli.command else {
            panic!("expected ask subcommand");
        };
        assert_eq!(words.join(" "), "show disk usage");
    }

    #[test]
    fn config_flag_overrides_default() {
        let cli = Cli::parse_from(["sensei", "--config", "/tmp/c.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
    }

    #[test]
    fn default_config_path_is_under_home() {
        assert!(default_config_path().ends_with(".sensei/config.toml"));
    }
}
