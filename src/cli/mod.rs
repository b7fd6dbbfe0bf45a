use anyhow::Result;
use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::core::config::{AppConfig, resolve_config_path};
use crate::core::gateway::apify::ApifyGateway;
use crate::core::ids::{SystemClock, UuidGenerator};
use crate::core::terminal::{self, GuideSection, print_error};
use crate::interfaces::cli::{DashboardOptions, run_dashboard};
use crate::interfaces::web::{ApiServer, ApiServerConfig};
use crate::logging;

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Commands")
        .command("serve", "Start the dashboard API server")
        .command("run", "Pick an actor, fill its inputs and run it")
        .command("help", "Show this message")
        .print();

    GuideSection::new("serve")
        .text("--host <addr>        Bind address (default: 127.0.0.1)")
        .text("--port <port>        Bind port (default: 17900)")
        .text("--config <path>      Config file (default: ~/.actordeck/config.toml)")
        .print();

    GuideSection::new("run")
        .text("--api-url <url>      Dashboard API base (default: http://127.0.0.1:17900/api)")
        .text("--api-key <key>      Apify API key (default: $APIFY_TOKEN, else prompt)")
        .text("--actor <id|name>    Actor to run without the picker")
        .text("--output <file>      Save the results download to this file")
        .text("--inputs <file>      JSON object of inputs to use instead of prompting")
        .text("--config <path>      Config file")
        .print();

    println!(
        "\n {} {} <command> [flags]\n",
        style("Usage:").bold(),
        style("actordeck").green()
    );
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ServeArgs {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub config: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct RunArgs {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub actor: Option<String>,
    pub output: Option<String>,
    pub inputs: Option<String>,
    pub config: Option<String>,
}

pub(crate) fn parse_serve_args(args: &[String], start: usize) -> ServeArgs {
    let mut parsed = ServeArgs::default();
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--host" => {
                if i + 1 < args.len() {
                    parsed.host = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--port" => {
                if i + 1 < args.len() {
                    parsed.port = args[i + 1].parse().ok();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--config" => {
                if i + 1 < args.len() {
                    parsed.config = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    parsed
}

pub(crate) fn parse_run_args(args: &[String], start: usize) -> RunArgs {
    let mut parsed = RunArgs::default();
    let mut i = start;
    while i < args.len() {
        let slot = match args[i].as_str() {
            "--api-url" => &mut parsed.api_url,
            "--api-key" => &mut parsed.api_key,
            "--actor" | "-a" => &mut parsed.actor,
            "--output" | "-o" => &mut parsed.output,
            "--inputs" | "-i" => &mut parsed.inputs,
            "--config" => &mut parsed.config,
            _ => {
                i += 1;
                continue;
            }
        };
        if i + 1 < args.len() {
            *slot = Some(args[i + 1].clone());
            i += 2;
        } else {
            i += 1;
        }
    }
    parsed
}

async fn run_serve(parsed: ServeArgs) -> Result<()> {
    let mut config = AppConfig::load(resolve_config_path(parsed.config.as_deref())).await?;
    if let Some(host) = parsed.host {
        config.server.host = host;
    }
    if let Some(port) = parsed.port {
        config.server.port = port;
    }
    logging::init_logging(&config.logging.level, false)?;

    let gateway = ApifyGateway::new(
        &config.gateway.base_url,
        config.gateway.request_timeout_secs.map(Duration::from_secs),
    )?;
    let server = ApiServer::new(ApiServerConfig {
        gateway: Arc::new(gateway),
        ids: Arc::new(UuidGenerator),
        clock: Arc::new(SystemClock),
        session_ttl: config.session_ttl(),
        api_host: config.server.host.clone(),
        api_port: config.server.port,
    });

    GuideSection::new("actordeck API")
        .status(
            "Endpoint",
            &format!(
                "{}",
                style(format!(
                    "http://{}:{}/api",
                    config.server.host, config.server.port
                ))
                .underlined()
                .cyan()
            ),
        )
        .status("Actor platform", &config.gateway.base_url)
        .blank()
        .text(&format!("Press {} to stop.", style("Ctrl+C").bold().yellow()))
        .print();
    println!();

    server.run().await
}

async fn run_client(parsed: RunArgs) -> Result<()> {
    let config = AppConfig::load(resolve_config_path(parsed.config.as_deref())).await?;
    logging::init_logging("warn", true)?;

    let api_base = parsed.api_url.unwrap_or_else(|| {
        format!(
            "http://{}:{}/api",
            config.server.host, config.server.port
        )
    });
    let api_key = parsed
        .api_key
        .or_else(|| std::env::var("APIFY_TOKEN").ok());

    run_dashboard(DashboardOptions {
        api_base,
        api_key,
        actor: parsed.actor,
        output: parsed.output.map(PathBuf::from),
        inputs: parsed.inputs.map(PathBuf::from),
        poll_interval: config.poll_interval(),
        progress_ceiling: config.poller.progress_ceiling,
    })
    .await
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("serve") => run_serve(parse_serve_args(&args, 2)).await,
        Some("run") => run_client(parse_run_args(&args, 2)).await,
        None | Some("help") | Some("--help") | Some("-h") => {
            print_help();
            Ok(())
        }
        Some(other) => {
            print_error(&format!("Unknown command '{}'.", other));
            print_help();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn serve_flags_override_only_what_is_given() {
        let parsed = parse_serve_args(&argv("actordeck serve --port 8080"), 2);
        assert_eq!(
            parsed,
            ServeArgs {
                host: None,
                port: Some(8080),
                config: None,
            }
        );

        let parsed = parse_serve_args(
            &argv("actordeck serve --host 0.0.0.0 --config /tmp/a.toml --port nope"),
            2,
        );
        assert_eq!(parsed.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(parsed.config.as_deref(), Some("/tmp/a.toml"));
        assert_eq!(parsed.port, None);
    }

    #[test]
    fn run_flags_accept_short_forms() {
        let parsed = parse_run_args(
            &argv("actordeck run -a web-scraper -o out.json -i last.json --api-url http://h:1/api --api-key k"),
            2,
        );
        assert_eq!(parsed.inputs.as_deref(), Some("last.json"));
        assert_eq!(parsed.actor.as_deref(), Some("web-scraper"));
        assert_eq!(parsed.output.as_deref(), Some("out.json"));
        assert_eq!(parsed.api_url.as_deref(), Some("http://h:1/api"));
        assert_eq!(parsed.api_key.as_deref(), Some("k"));
        assert_eq!(parsed.config, None);
    }

    #[test]
    fn dangling_flag_is_ignored() {
        let parsed = parse_run_args(&argv("actordeck run stray --actor"), 2);
        assert_eq!(parsed, RunArgs::default());
    }
}
