// ABOUTME: Interactive configuration wizard for the ttirc master.
// ABOUTME: Prompts for database, worker variant, and timings, then writes the TOML file.

use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};
use std::path::Path;
use ttirc_master_core::{Config, WorkerKind};

fn read_answer(input: &mut impl BufRead) -> Result<String> {
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn prompt(
    input: &mut impl BufRead,
    output: &mut impl Write,
    message: &str,
    default: &str,
) -> Result<String> {
    write!(output, "{} [{}]: ", message, default)?;
    output.flush()?;

    let answer = read_answer(input)?;
    if answer.is_empty() {
        Ok(default.to_string())
    } else {
        Ok(answer)
    }
}

fn prompt_secs(
    input: &mut impl BufRead,
    output: &mut impl Write,
    message: &str,
    default: u64,
) -> Result<u64> {
    let answer = prompt(input, output, message, &default.to_string())?;
    answer
        .parse()
        .with_context(|| format!("{}: expected a number of seconds, got {:?}", message, answer))
}

fn prompt_choice(
    input: &mut impl BufRead,
    output: &mut impl Write,
    message: &str,
    choices: &[&str],
    default: usize,
) -> Result<usize> {
    writeln!(output, "{}:", message)?;
    for (i, choice) in choices.iter().enumerate() {
        let marker = if i == default { "*" } else { " " };
        writeln!(output, "  {} [{}] {}", marker, i + 1, choice)?;
    }

    write!(output, "Choice [{}]: ", default + 1)?;
    output.flush()?;

    let answer = read_answer(input)?;
    if answer.is_empty() {
        return Ok(default);
    }
    let choice: usize = answer.parse().context("Invalid choice")?;
    if choice < 1 || choice > choices.len() {
        anyhow::bail!("Choice must be between 1 and {}", choices.len());
    }
    Ok(choice - 1)
}

/// Empty input counts as yes.
fn confirm(input: &mut impl BufRead, output: &mut impl Write, message: &str) -> Result<bool> {
    write!(output, "{} [Y/n]: ", message)?;
    output.flush()?;

    let answer = read_answer(input)?.to_ascii_lowercase();
    Ok(!matches!(answer.as_str(), "n" | "no"))
}

/// Walk through every setting, starting from `config`, until the user accepts.
fn configure_with(
    input: &mut impl BufRead,
    output: &mut impl Write,
    mut config: Config,
) -> Result<Config> {
    loop {
        writeln!(output, "ttirc master configuration\n")?;

        config.database = prompt(input, output, "Database file", &config.database)?;

        let workers = ["external", "native"];
        let current = match config.worker {
            WorkerKind::External => 0,
            WorkerKind::Native => 1,
        };
        config.worker = match prompt_choice(input, output, "Worker variant", &workers, current)? {
            0 => WorkerKind::External,
            _ => WorkerKind::Native,
        };

        if config.worker == WorkerKind::External {
            config.session_command =
                prompt(input, output, "Session command", &config.session_command)?;
            let args = prompt(
                input,
                output,
                "Session arguments ({id} is the connection id)",
                &config.session_args.join(" "),
            )?;
            config.session_args = args.split_whitespace().map(str::to_string).collect();
        }

        config.idle_interval_secs =
            prompt_secs(input, output, "Seconds between ticks", config.idle_interval_secs)?;
        config.freshness_window_secs = prompt_secs(
            input,
            output,
            "Seconds a client heartbeat stays fresh",
            config.freshness_window_secs,
        )?;
        config.shutdown_timeout_secs = prompt_secs(
            input,
            output,
            "Seconds to wait for workers on shutdown",
            config.shutdown_timeout_secs,
        )?;

        config.validate().context("Invalid settings")?;

        writeln!(output)?;
        writeln!(output, "  database:         {}", config.database)?;
        writeln!(output, "  worker:           {}", config.worker)?;
        if config.worker == WorkerKind::External {
            writeln!(
                output,
                "  session:          {} {}",
                config.session_command,
                config.session_args.join(" ")
            )?;
        }
        writeln!(output, "  idle interval:    {}s", config.idle_interval_secs)?;
        writeln!(output, "  freshness window: {}s", config.freshness_window_secs)?;
        writeln!(output, "  shutdown timeout: {}s", config.shutdown_timeout_secs)?;
        writeln!(output)?;

        if confirm(input, output, "Done?")? {
            return Ok(config);
        }
        writeln!(output)?;
    }
}

/// Run the wizard on the terminal and save the result to `path`.
///
/// Values from `existing` are offered as defaults.
pub fn run_configure(path: &Path, existing: Option<Config>) -> Result<Config> {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();

    let config = configure_with(&mut input, &mut output, existing.unwrap_or_default())?;
    config.save(path)?;
    println!("\nConfig written to {}", path.display());

    Ok(config)
}
