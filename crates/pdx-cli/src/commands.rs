use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use colored::Colorize;
use pdx_exchange::{ExchangeClient, Inbox, OpMetrics};
use pdx_runtime::{Clock, ExchangeConfig, ManualClock, RecordProcessor, SweepReport, Sweeper};
use pdx_store::InMemoryRecordStore;
use pdx_types::Payload;
use serde_json::json;

use crate::cli::{CheckConfigArgs, Cli, Command, DemoArgs, OutputFormat};

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Demo(args) => cmd_demo(args, cli.format).await,
        Command::CheckConfig(args) => cmd_check_config(args, cli.format),
    }
}

fn cmd_check_config(args: CheckConfigArgs, format: OutputFormat) -> anyhow::Result<()> {
    let config = ExchangeConfig::load(&args.path)
        .with_context(|| format!("invalid configuration {}", args.path.display()))?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
        OutputFormat::Text => {
            println!(
                "{} {} is valid",
                "✓".green().bold(),
                args.path.display().to_string().bold()
            );
            print!("{}", config.to_toml_string()?);
        }
    }
    Ok(())
}

async fn cmd_demo(args: DemoArgs, format: OutputFormat) -> anyhow::Result<()> {
    let store = Arc::new(InMemoryRecordStore::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let metrics = Arc::new(OpMetrics::new());

    let requester_inbox = Arc::new(Inbox::new(Payload::new(json!({ "ack": true }))));
    let requester = participant(&args.requester, &store, &clock, requester_inbox.clone())?;
    let responder = participant(
        &args.responder,
        &store,
        &clock,
        Arc::new(Inbox::new(Payload::new(
            json!({ "answer": "approved", "from": args.responder }),
        ))),
    )?;

    let client = ExchangeClient::new(requester.gateway().clone(), requester.participant().clone());
    for n in 0..args.requests {
        client
            .submit_request(&Payload::new(json!({ "query": n })), Some(args.ttl_days), clock.now())
            .await?;
    }
    step(format, &format!("{} submitted {} requests", args.requester, args.requests), None);

    let answered = sweep(&responder, &metrics).await?;
    step(format, &format!("{} swept", args.responder), Some(&answered));

    let consumed = sweep(&requester, &metrics).await?;
    step(format, &format!("{} swept", args.requester), Some(&consumed));

    clock.advance(chrono::Duration::days(i64::from(args.ttl_days)));
    let purged = sweep(&responder, &metrics).await?;
    step(
        format,
        &format!("{} swept after {} days", args.responder, args.ttl_days),
        Some(&purged),
    );

    if format == OutputFormat::Text {
        println!(
            "\n{} {} responses received, {} payloads left",
            "✓".green().bold(),
            requester_inbox.received().len().to_string().bold(),
            store.private_len().to_string().bold()
        );
        for p in [&requester, &responder] {
            println!("\n{} {}", p.participant().to_string().bold(), "store timings");
            print!("{}", p.metrics().summary());
        }
        println!("\n{}", "Sweep timings".bold());
        print!("{}", metrics.summary());
    }
    Ok(())
}

fn participant(
    org: &str,
    store: &Arc<InMemoryRecordStore>,
    clock: &Arc<ManualClock>,
    inbox: Arc<Inbox>,
) -> anyhow::Result<Arc<RecordProcessor>> {
    let config = ExchangeConfig::for_participant(org);
    let processor = RecordProcessor::from_config(&config, store.clone(), inbox, clock.clone())
        .with_context(|| format!("cannot configure participant {org}"))?;
    Ok(Arc::new(processor))
}

async fn sweep(processor: &Arc<RecordProcessor>, metrics: &OpMetrics) -> anyhow::Result<SweepReport> {
    let sweeper = Sweeper::new(processor.clone(), std::time::Duration::from_secs(1), 4);
    let start = std::time::Instant::now();
    let report = sweeper.sweep_once().await?;
    metrics.record("sweep", start.elapsed());
    Ok(report)
}

fn step(format: OutputFormat, label: &str, report: Option<&SweepReport>) {
    match format {
        OutputFormat::Json => {
            let line = match report {
                Some(r) => json!({
                    "step": label,
                    "records": r.records,
                    "answered": r.answered,
                    "consumed": r.consumed,
                    "purged": r.purged,
                    "anomalies": r.anomalies,
                    "errors": r.errors,
                    "deferred": r.deferred,
                }),
                None => json!({ "step": label }),
            };
            println!("{line}");
        }
        OutputFormat::Text => match report {
            Some(r) => println!(
                "{} {}: {} records, {} answered, {} consumed, {} purged, {} anomalies",
                "•".blue(),
                label.bold(),
                r.records,
                r.answered.to_string().green(),
                r.consumed.to_string().green(),
                r.purged.to_string().yellow(),
                r.anomalies.to_string().red()
            ),
            None => println!("{} {}", "•".blue(), label.bold()),
        },
    }
}
