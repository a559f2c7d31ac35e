use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use corrnet::config::RunConfig;
use corrnet::export::RunReport;
use corrnet::run::{AnnotationRun, Stage};
use corrnet::Result;
use log::{info, trace, warn, LevelFilter};
use mscorr::chemistry::library::IonLibrary;
use mscorr::data::feature::FeatureRow;

/// Feature correlation grouping and ion identity networking
#[derive(Parser)]
#[command(name = "corrnet")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Correlate, group and annotate a feature table
    Run {
        /// Rows as a JSON array
        #[arg(short, long)]
        input: PathBuf,

        /// Run configuration JSON, defaults if omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Report JSON, stdout if omitted
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Flag lines per annotated row
        #[arg(long)]
        flags: Option<PathBuf>,

        /// Worker threads
        #[arg(short, long, default_value_t = 4)]
        threads: usize,
    },

    /// Print the enumerated ion identity space
    Candidates {
        /// Run configuration JSON, defaults if omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<RunConfig> {
    match path {
        Some(p) => RunConfig::from_json_file(p),
        None => Ok(RunConfig::default()),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { LevelFilter::Debug } else { LevelFilter::Info };
    env_logger::Builder::new().filter_level(level).parse_default_env().init();

    match cli.command {
        Commands::Run { input, config, output, flags, threads } => {
            let config = load_config(config.as_ref())?;
            let rows: Vec<FeatureRow> = serde_json::from_reader(File::open(&input)?)?;
            info!("{} rows from {}", rows.len(), input.display());

            let run = AnnotationRun::new(config)?.with_observer(Arc::new(|stage: Stage, fraction: f64| {
                trace!("{stage:?}: {:.0}%", fraction * 100.0);
            }));
            let outcome = run.execute_with_threads(&rows, threads.max(1))?;
            if outcome.is_canceled() {
                warn!("run was canceled, writing partial results");
            }

            let report = RunReport::new(&rows, &outcome);
            match output {
                Some(path) => serde_json::to_writer_pretty(BufWriter::new(File::create(&path)?), &report)?,
                None => println!("{}", report.to_json()?),
            }
            if let Some(path) = flags {
                report.write_flags(BufWriter::new(File::create(&path)?))?;
                info!("flags written to {}", path.display());
            }
        }
        Commands::Candidates { config } => {
            let config = load_config(config.as_ref())?;
            let library = IonLibrary::build(&config.library)?;
            for ion in library.candidates() {
                println!("{}\t{:.6}\t{}", ion, ion.mass_difference(), ion.charge());
            }
        }
    }
    Ok(())
}
