use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rollcall_engine::{Config, Engine};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall attendance recognition CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll an identity from an image containing exactly one face
    Enroll {
        /// Identity name to enroll
        #[arg(short, long)]
        name: String,
        /// Path to the image file
        #[arg(short, long)]
        image: PathBuf,
        /// Opaque details stored in the student directory
        #[arg(short, long)]
        details: Option<String>,
    },
    /// Diagnostic scan: show every face region and its match outcome
    Scan {
        /// Path to the image file
        image: PathBuf,
    },
    /// Run an attendance session over a sequence of frame images
    Run {
        /// Image files, processed in order
        images: Vec<PathBuf>,
    },
    /// List enrolled identities
    List,
    /// Remove an identity's enrollment (attendance history is kept)
    Remove { name: String },
    /// Rename an enrolled identity
    Rename { old: String, new: String },
    /// Dump attendance records as JSON
    Report {
        /// Restrict to one month (YYYY-MM)
        #[arg(short, long)]
        month: Option<String>,
        /// Maximum rows without a month filter
        #[arg(short, long, default_value_t = 50)]
        limit: u32,
    },
    /// Months that have attendance records
    Months,
    /// Attendance summary for one identity
    Summary { name: String },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let engine = Engine::new(&Config::load())?;

    match cli.command {
        Commands::Enroll {
            name,
            image,
            details,
        } => {
            let bytes = read_image(&image)?;
            engine.enroll_image(&name, &bytes, details.as_deref())?;
            println!("{name} enrolled");
        }
        Commands::Scan { image } => {
            let bytes = read_image(&image)?;
            let scans = engine.scan_image(&bytes)?;
            if scans.is_empty() {
                println!("no faces found");
            }
            for scan in scans {
                let identity = scan.outcome.identity.as_deref().unwrap_or("Unknown");
                println!(
                    "({}, {}) {}x{}  {}  distance={:.2} confidence={:.1}",
                    scan.region.x,
                    scan.region.y,
                    scan.region.width,
                    scan.region.height,
                    identity,
                    scan.outcome.distance,
                    scan.outcome.confidence,
                );
            }
        }
        Commands::Run { images } => {
            engine.start_session();
            for image in &images {
                let bytes = read_image(image)?;
                match engine.recognize_image(&bytes) {
                    Ok(identified) if identified.is_empty() => {
                        println!("{}: nobody recognized", image.display());
                    }
                    Ok(identified) => {
                        println!("{}: {}", image.display(), identified.join(", "));
                    }
                    Err(err) => {
                        tracing::warn!(image = %image.display(), error = %err, "frame skipped");
                    }
                }
            }
            engine.stop_session();
        }
        Commands::List => {
            for name in engine.roster() {
                println!("{name}");
            }
        }
        Commands::Remove { name } => {
            engine.remove(&name)?;
            println!("{name} removed");
        }
        Commands::Rename { old, new } => {
            engine.rename(&old, &new)?;
            println!("{old} renamed to {new}");
        }
        Commands::Report { month, limit } => {
            let rows = match month {
                Some(ym) => engine.ledger().for_month(&ym)?,
                None => engine.ledger().recent(limit)?,
            };
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        Commands::Months => {
            for ym in engine.ledger().months()? {
                println!("{ym}");
            }
        }
        Commands::Summary { name } => {
            let summary = engine.ledger().summary(&name)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}

fn read_image(path: &std::path::Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading image {}", path.display()))
}
