mod config;
mod loader;
mod models;
mod pipeline;
mod scraper;
mod storage;
mod utils;

use anyhow::{Result, bail};
use clap::{ArgGroup, Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::AppConfig;
use crate::loader::{read_json, write_json};
use crate::models::{AppealRecord, FetchBatch, ParsedBatch};
use crate::pipeline::Pipeline;
use crate::storage::Repository;
use crate::utils::{fmt_date, fmt_text};

#[derive(Parser)]
#[command(name = "arb-scraper", about = "Assessment Review Board appeal scraper", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch, parse and store every roll number in one go
    Run,

    /// Fetch listing pages for every roll number
    Fetch {
        /// Where to write fetch results (default: pipeline.fetched_path)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Parse previously fetched pages
    Parse {
        /// Fetch results JSON
        #[arg(short, long)]
        input: PathBuf,

        /// Where to write parsed results (default: pipeline.parsed_path)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip following appeal links to their detail pages
        #[arg(long)]
        no_details: bool,
    },

    /// Store parsed results in the database
    Store {
        /// Parsed results JSON
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Apply schema migrations without loading data
    Migrate,

    /// Look up stored properties and appeals
    Query(QueryArgs),

    /// Write one property and its appeals to a JSON file
    Export {
        #[arg(long)]
        roll_number: String,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Show database statistics
    Stats,
}

#[derive(Args)]
#[command(group = ArgGroup::new("selector").required(true).multiple(false))]
struct QueryArgs {
    #[arg(long, group = "selector")]
    roll_number: Option<String>,

    #[arg(long, group = "selector")]
    appeal_number: Option<String>,

    #[arg(long, group = "selector")]
    status: Option<String>,

    /// Include filing and decision details
    #[arg(long)]
    detailed: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "arb_scraper=info,warn",
        1 => "arb_scraper=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let mut config = AppConfig::load()?;

    match cli.command {
        Command::Run => {
            let _t = utils::Timer::start("Full run");
            Pipeline::new(config).run().await?;
        }

        Command::Fetch { output } => {
            let _t = utils::Timer::start("Fetch");
            if let Some(path) = output {
                config.pipeline.fetched_path = path;
            }
            let fetched = Pipeline::new(config).fetch_stage().await?;
            let ok = fetched.values().filter(|r| r.success).count();
            println!("Fetch completed: {} successful, {} failed", ok, fetched.len() - ok);
        }

        Command::Parse { input, output, no_details } => {
            let _t = utils::Timer::start("Parse");
            if let Some(path) = output {
                config.pipeline.parsed_path = path;
            }
            let fetch_details = config.pipeline.fetch_details && !no_details;
            let fetched: FetchBatch = read_json(&input)?;
            let parsed = Pipeline::new(config).parse_stage(&fetched, fetch_details).await?;
            println!("Parsed {} pages", parsed.len());
        }

        Command::Store { input } => {
            let _t = utils::Timer::start("Store");
            let parsed: ParsedBatch = read_json(&input)?;
            let stats = Pipeline::new(config).store_stage(&parsed)?;
            println!("{}", stats);
        }

        Command::Migrate => {
            Repository::open(&config.storage.db_path)?.run_migrations()?;
            println!("Migrations applied.");
        }

        Command::Query(args) => {
            let repo = Repository::open(&config.storage.db_path)?;
            query(&repo, &args)?;
        }

        Command::Export { roll_number, output } => {
            let repo = Repository::open(&config.storage.db_path)?;
            match repo.export_property(&roll_number)? {
                Some(export) => {
                    write_json(&output, &export)?;
                    println!("Exported property {} data to {:?}", roll_number, output);
                }
                None => println!("No property found with roll number: {}", roll_number),
            }
        }

        Command::Stats => {
            let repo = Repository::open(&config.storage.db_path)?;
            let counts = repo.table_counts()?;
            println!("─────────────────────────────────");
            println!("  ARB scraper: Database Stats");
            println!("─────────────────────────────────");
            println!("  Properties      : {}", counts.properties);
            println!("  Appeals         : {}", counts.appeals);
            println!("  Appeal details  : {}", counts.appeal_details);
            println!("  Representatives : {}", counts.representatives);
            println!("  Hearings        : {}", counts.hearings);
            println!("─────────────────────────────────");
        }
    }

    Ok(())
}

fn query(repo: &Repository, args: &QueryArgs) -> Result<()> {
    if let Some(roll) = &args.roll_number {
        let Some(property) = repo.property_by_roll_number(roll)? else {
            println!("No property found with roll number: {}", roll);
            return Ok(());
        };
        println!("Property: {}", property.roll_number);
        println!("Description: {}", fmt_text(property.description.as_deref()));
        println!("Municipality: {}", fmt_text(property.municipality.as_deref()));
        println!("Classification: {}", fmt_text(property.classification.as_deref()));

        let appeals = repo.appeals_by_property(roll)?;
        println!("\nAppeals ({}):", appeals.len());
        for (i, record) in appeals.iter().enumerate() {
            println!("\n--- Appeal {} ---", i + 1);
            print_appeal(record, args.detailed);
        }
    } else if let Some(number) = &args.appeal_number {
        match repo.appeal_by_number(number)? {
            Some(record) => print_appeal(&record, args.detailed),
            None => println!("No appeal found with number: {}", number),
        }
    } else if let Some(status) = &args.status {
        let appeals = repo.appeals_by_status(status)?;
        println!("Found {} appeals with status '{}':", appeals.len(), status);
        for (i, record) in appeals.iter().enumerate() {
            println!("\n--- Appeal {} ---", i + 1);
            print_appeal(record, args.detailed);
        }
    } else {
        bail!("one of --roll-number, --appeal-number or --status is required");
    }
    info!("Query complete");
    Ok(())
}

fn print_appeal(record: &AppealRecord, detailed: bool) {
    let appeal = &record.appeal;
    println!("Appeal Number: {}", appeal.appeal_number);
    println!("Appellant: {}", fmt_text(appeal.appellant.as_deref()));
    println!("Status: {}", fmt_text(appeal.status.as_deref()));
    println!("Tax Date: {}", fmt_date(appeal.tax_date));
    println!("Section: {}", fmt_text(appeal.section.as_deref()));
    if let Some(order) = appeal.board_order_no.as_deref().filter(|o| !o.is_empty()) {
        println!("Board Order No: {}", order);
    }

    if !record.representatives.is_empty() {
        let names: Vec<&str> = record.representatives.iter().map(|r| r.name.as_str()).collect();
        println!("Representatives: {}", names.join(", "));
    }
    for hearing in &record.hearings {
        println!(
            "Hearing {}: {}",
            fmt_text(hearing.hearing_number.as_deref()),
            fmt_date(hearing.hearing_date)
        );
    }

    if let (true, Some(detail)) = (detailed, &record.detail) {
        println!("\nAppeal Details:");
        println!("Filing Date: {}", fmt_date(detail.filing_date));
        println!("Reason: {}", fmt_text(detail.reason_for_appeal.as_deref()));
        println!("Decision Mailed: {}", fmt_date(detail.decision_mailing_date));
        println!("Decision: {}", fmt_text(detail.decision_text.as_deref()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_requires_exactly_one_selector() {
        assert!(Cli::try_parse_from(["arb-scraper", "query"]).is_err());
        assert!(
            Cli::try_parse_from(["arb-scraper", "query", "--status", "Open", "--roll-number", "1"])
                .is_err()
        );
        assert!(Cli::try_parse_from(["arb-scraper", "query", "--status", "Open", "--detailed"]).is_ok());
    }

    #[test]
    fn export_requires_roll_number_and_output() {
        assert!(Cli::try_parse_from(["arb-scraper", "export", "--roll-number", "R1"]).is_err());
        let cli = Cli::try_parse_from(["arb-scraper", "export", "--roll-number", "R1", "-o", "out.json"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Command::Export { ref roll_number, ref output }
                if roll_number == "R1" && output == &PathBuf::from("out.json")
        ));
    }
}
