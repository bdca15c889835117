//! CivicPulse operator CLI
//!
//! The webhook transport is deployed separately; this binary covers the
//! operator surfaces: feeding inbound turns for testing, the scheduled
//! sweep, on-demand recomputes, corrective-action uploads, and office
//! fixtures.
//!
//! ```bash
//! civicpulse add-office --id OFF-1 --name "Pune Tehsil Office" \
//!     --department Revenue --location Pune --head-phone 9800000001
//! civicpulse message --from +919800000010 --body "feedback for OFF-1"
//! civicpulse sweep
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use civicpulse::{AppConfig, FeedbackPipeline, FeedbackStore, Office, OfficeMetrics};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database path (overrides CIVICPULSE_DB)
    #[arg(long)]
    db: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Feed one inbound message through the intake pipeline
    Message {
        /// Sender phone, e.g. +919800000010
        #[arg(long)]
        from: String,
        /// Message text
        #[arg(long)]
        body: String,
    },

    /// Evaluate escalation state for every active office
    Sweep,

    /// Recompute one office's metrics summary
    Recompute {
        #[arg(long)]
        office: String,
    },

    /// Upload a corrective-action note for an escalation
    Action {
        #[arg(long)]
        escalation: String,
        #[arg(long)]
        note: String,
        /// Uploading official's name
        #[arg(long)]
        by: String,
    },

    /// Register or replace an office record
    AddOffice {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        department: String,
        #[arg(long)]
        location: String,
        #[arg(long)]
        head_name: Option<String>,
        #[arg(long)]
        head_phone: Option<String>,
        #[arg(long)]
        collector_name: Option<String>,
        #[arg(long)]
        collector_phone: Option<String>,
        #[arg(long)]
        commissioner_name: Option<String>,
        #[arg(long)]
        commissioner_phone: Option<String>,
    },

    /// Force an office's stored score (operator fixture)
    SetScore {
        #[arg(long)]
        office: String,
        #[arg(long)]
        score: f64,
    },

    /// Print an office's metrics and escalation history
    Show {
        #[arg(long)]
        office: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "civicpulse=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::default();
    if let Some(db) = cli.db {
        config.store_path = db;
    }

    let store = FeedbackStore::open(&config.store_path)
        .with_context(|| format!("opening store at {}", config.store_path.display()))?
        .shared();
    let pipeline = FeedbackPipeline::new(store.clone(), &config);

    match cli.command {
        Command::Message { from, body } => {
            let reply = pipeline.handle_inbound(&from, &body).await?;
            println!("{reply}");
        }

        Command::Sweep => {
            let report = pipeline.run_sweep().await?;
            println!(
                "offices checked: {}, escalations raised: {}",
                report.offices_checked, report.escalations_raised
            );
        }

        Command::Recompute { office } => {
            let metrics = pipeline.recompute_metrics(&office)?;
            print_metrics(&metrics);
        }

        Command::Action {
            escalation,
            note,
            by,
        } => {
            let updated = pipeline.record_corrective_action(&escalation, note, by)?;
            println!(
                "escalation {} now {} at {}",
                updated.id,
                updated.status.as_str(),
                updated.level
            );
        }

        Command::AddOffice {
            id,
            name,
            department,
            location,
            head_name,
            head_phone,
            collector_name,
            collector_phone,
            commissioner_name,
            commissioner_phone,
        } => {
            let office = Office {
                id: id.clone(),
                name,
                department,
                location,
                active: true,
                head_name,
                head_phone,
                collector_name,
                collector_phone,
                commissioner_name,
                commissioner_phone,
            };
            store.upsert_office(&office)?;
            println!("office {id} saved");
        }

        Command::SetScore { office, score } => {
            store
                .get_office(&office)?
                .with_context(|| format!("unknown office {office}"))?;
            store.put_metrics(&OfficeMetrics::forced(&office, score))?;
            println!("office {office} score forced to {score:.2}");
        }

        Command::Show { office } => {
            let record = store
                .get_office(&office)?
                .with_context(|| format!("unknown office {office}"))?;
            println!("{} — {} ({}, {})", record.id, record.name, record.department, record.location);

            match store.get_metrics(&office)? {
                Some(metrics) => print_metrics(&metrics),
                None => println!("no metrics computed yet"),
            }

            let escalations = store.escalations_for_office(&office)?;
            if escalations.is_empty() {
                println!("no escalations");
            }
            for e in escalations {
                println!(
                    "{} {} [{}] score {:.2} months_below {} triggered {}",
                    e.id,
                    e.level,
                    e.status.as_str(),
                    e.omes_at_trigger,
                    e.consecutive_months_below,
                    e.triggered_at.format("%Y-%m-%d")
                );
            }
        }
    }

    Ok(())
}

fn print_metrics(metrics: &OfficeMetrics) {
    println!(
        "score {:.2} ({}) trend {} confidence {} submissions-this-month {} themes [{}]",
        metrics.score,
        metrics.data_window.as_str(),
        metrics.trend.as_str(),
        metrics.confidence.as_str(),
        metrics.monthly_submission_count,
        metrics.top_themes.join(", ")
    );
}
