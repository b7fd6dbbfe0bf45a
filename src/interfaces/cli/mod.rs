pub mod client;
mod prompts;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use console::{Term, style};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::core::catalog::Actor;
use crate::core::executions::ExecutionStatus;
use crate::core::form::InputForm;
use crate::core::poller::{ExecutionPoller, PollState};
use crate::core::terminal::{self, print_error, print_info, print_step, print_success, print_warn};
use client::DashboardClient;

const PREVIEW_LIMIT: usize = 10;

pub struct DashboardOptions {
    pub api_base: String,
    pub api_key: Option<String>,
    pub actor: Option<String>,
    pub output: Option<PathBuf>,
    /// JSON object of previously used inputs; its fields are not prompted for.
    pub inputs: Option<PathBuf>,
    pub poll_interval: Duration,
    pub progress_ceiling: f64,
}

struct ActorChoice(Actor);

impl fmt::Display for ActorChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {} runs)", self.0.name, self.0.external_actor_id, self.0.run_count)
    }
}

/// Authenticate, pick an actor, fill its form, run it and follow it to the end.
pub async fn run_dashboard(options: DashboardOptions) -> Result<()> {
    terminal::print_banner();

    let api_key = match options.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
        Some(key) => key.to_string(),
        None => inquire::Password::new("Apify API key:")
            .without_confirmation()
            .with_help_message("Find it under Settings > Integrations in the Apify console")
            .prompt()?,
    };
    if api_key.trim().is_empty() {
        bail!("An API key is required.");
    }

    let mut client = DashboardClient::new(&options.api_base);
    let login = client.authenticate(api_key.trim()).await?;
    print_success(&format!(
        "Authenticated as {} ({} actor(s))",
        login.user.username,
        login.actors.len()
    ));

    let actors = client.list_actors().await?;
    if actors.is_empty() {
        print_warn("This account has no actors yet. Create one in the Apify console first.");
        return Ok(());
    }

    let actor = choose_actor(actors, options.actor.as_deref())?;
    client.select_actor(&actor.external_actor_id).await?;
    print_step(&format!("Selected {}", actor.name));
    if let Some(description) = actor.description.as_deref().filter(|d| !d.is_empty()) {
        println!("  {}", style(description).dim());
    }

    let descriptor = client.form(&actor.external_actor_id).await?;
    let mut form = InputForm::default();
    form.switch_actor(&descriptor.actor_id, descriptor.fields);
    if let Some(path) = &options.inputs {
        form.load(&read_inputs(path).await?);
    }

    if descriptor.empty {
        print_info(descriptor.message.as_deref().unwrap_or("No parameters."));
    } else {
        println!();
        for field in form.fields().to_vec() {
            if form.value(&field.key).is_some() {
                continue;
            }
            if let Some(value) = prompts::prompt_field(&field)? {
                form.set(&field.key, value);
            }
        }
    }

    let actor_id = form
        .actor_id()
        .unwrap_or(actor.external_actor_id.as_str())
        .to_string();
    let payload = form.payload();
    terminal::print_status("Inputs", &Value::Object(payload.clone()).to_string());

    let started = client.execute(&actor_id, &payload).await?;
    print_step(&format!(
        "Execution {} {} (run {})",
        started.execution_id,
        started.status.to_string().to_lowercase(),
        started.run_id
    ));

    let final_state = follow_execution(&client, &started.execution_id, &options).await?;

    match final_state.status {
        ExecutionStatus::Succeeded => {
            print_success("Actor run completed successfully.");
            let results = final_state.results.unwrap_or_default();
            print_results_preview(&results);
            if let Some(path) = &options.output {
                let bytes = client.download_results(&started.execution_id).await?;
                tokio::fs::write(path, bytes)
                    .await
                    .with_context(|| format!("Failed to write results to {}", path.display()))?;
                print_success(&format!("Results saved to {}", path.display()));
            }
        }
        ExecutionStatus::Failed => {
            print_error("Actor run failed. Check the run log in the Apify console.");
        }
        other => debug!("Stopped following execution in state {}", other),
    }
    Ok(())
}

async fn read_inputs(path: &Path) -> Result<Map<String, Value>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read inputs from {}", path.display()))?;
    match serde_json::from_str::<Value>(&content)
        .with_context(|| format!("{} is not valid JSON", path.display()))?
    {
        Value::Object(map) => Ok(map),
        _ => bail!("{} must contain a JSON object", path.display()),
    }
}

fn choose_actor(actors: Vec<Actor>, wanted: Option<&str>) -> Result<Actor> {
    if let Some(wanted) = wanted {
        return actors
            .into_iter()
            .find(|a| a.external_actor_id == wanted || a.name == wanted)
            .with_context(|| format!("No actor named '{}' on this account", wanted));
    }
    let choices: Vec<ActorChoice> = actors.into_iter().map(ActorChoice).collect();
    let picked = inquire::Select::new("Which actor do you want to run?", choices).prompt()?;
    Ok(picked.0)
}

async fn follow_execution(
    client: &DashboardClient,
    execution_id: &str,
    options: &DashboardOptions,
) -> Result<PollState> {
    let mut poller = ExecutionPoller::new(
        Arc::new(client.clone()),
        options.poll_interval,
        options.progress_ceiling,
    );
    let mut rx = poller.subscribe();
    let handle = poller.track(execution_id);

    let term = Term::stdout();
    let since = Instant::now();
    loop {
        let state = rx.borrow_and_update().clone();
        term.clear_line()?;
        term.write_str(&progress_line(&state, since.elapsed()))?;
        if state.is_finished() {
            break;
        }
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                poller.cancel();
                term.write_line("")?;
                bail!("Polling canceled; the run keeps going on the platform.");
            }
        }
    }
    term.write_line("")?;

    let _ = handle.await;
    Ok(poller.state())
}

/// Elapsed time comes from the run's own timestamps once known, and from
/// `local_elapsed` before the first status arrives.
pub(crate) fn progress_line(state: &PollState, local_elapsed: Duration) -> String {
    const WIDTH: usize = 20;
    let percent = state.progress.value().clamp(0.0, 100.0);
    let filled = ((percent / 100.0) * WIDTH as f64).round() as usize;
    let bar = format!("{}{}", "#".repeat(filled), "-".repeat(WIDTH - filled));
    let elapsed = match state.started_at {
        Some(start) => (state.finished_at.unwrap_or_else(Utc::now) - start)
            .to_std()
            .unwrap_or(local_elapsed),
        None => local_elapsed,
    };
    let secs = elapsed.as_secs();

    let mut line = format!(
        "  [{}] {:>3.0}%  {:<9}  {:02}:{:02}",
        bar,
        percent,
        state.status.to_string(),
        secs / 60,
        secs % 60
    );
    if let Some(stats) = state.stats.as_ref().and_then(Value::as_object) {
        let shown: Vec<String> = stats
            .iter()
            .filter(|(_, v)| v.is_number())
            .take(3)
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        if !shown.is_empty() {
            line.push_str("  ");
            line.push_str(&shown.join(" "));
        }
    }
    line
}

fn print_results_preview(results: &[Value]) {
    if results.is_empty() {
        print_info("The run produced no results.");
        return;
    }
    let (shown, rest) = preview(results, PREVIEW_LIMIT);
    println!(
        "\n  {} ({} item(s))",
        style("Results preview").bold().cyan(),
        results.len()
    );
    for (i, item) in shown.iter().enumerate() {
        let text = serde_json::to_string_pretty(item).unwrap_or_else(|_| item.to_string());
        println!("  {} {}", style(format!("#{}", i + 1)).dim(), text);
    }
    if rest > 0 {
        println!("  {}", style(format!("... and {} more", rest)).dim());
    }
}

pub(crate) fn preview(results: &[Value], limit: usize) -> (&[Value], usize) {
    let shown = &results[..results.len().min(limit)];
    (shown, results.len() - shown.len())
}
