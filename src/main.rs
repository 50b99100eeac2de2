//! sheaf CLI

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use sheaf::collect::{CollectOptions, Collector, concat_json};
use sheaf::io::Codec;
use sheaf::io::SaveOptions;
use sheaf::io::glob::expand_inputs;
use sheaf::partition::{WorkerRank, group_files, write_partitions};
use sheaf::serialize::{nested_from_assignments, write_serialized};
use sheaf::stack::Stacker;
use sheaf::translate::{Schema, TranslateOptions, Translator};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "sheaf")]
#[command(about = "Sheaf - aggregate and flatten hierarchical sample records")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SaveArgs {
    /// Leaf compression codec for binary outputs (zstd, gzip, xz, bzip2, none)
    #[arg(long)]
    compression: Option<String>,

    /// Leaves at least this many bytes are compressed
    #[arg(long, default_value = "2000")]
    chunk_threshold: usize,
}

impl SaveArgs {
    fn options(&self) -> SaveOptions {
        let compression = match self.compression.as_deref() {
            Some("none") => None,
            Some(name) => Some(name.to_string()),
            None => SaveOptions::default().compression,
        };
        SaveOptions {
            compression,
            chunk_threshold: self.chunk_threshold,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Merge per-sample files into one bundle (or one per chunk)
    Collect {
        /// Input files or glob patterns
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Output bundle; chunked runs write <stem>_000.<ext>, ...
        #[arg(short, long)]
        output: PathBuf,

        /// Files per output bundle
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Nest each file under a fresh UUID
        #[arg(long)]
        add_uuid: bool,

        #[command(flatten)]
        save: SaveArgs,
    },

    /// Concatenate JSON files into one JSON list
    CollectJson {
        /// Input files or glob patterns
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Output JSON file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Merge this worker's share of a partition file
    CollectPartition {
        /// Partition side file written by `group-files`
        #[arg(short, long)]
        partitions: PathBuf,

        /// Output template; the worker writes <stem>_<rank>.<ext>
        #[arg(short, long)]
        output: PathBuf,

        /// Worker rank. Defaults to the launcher environment.
        #[arg(long)]
        rank: Option<usize>,

        /// Worker count, with `--rank`
        #[arg(long, requires = "rank")]
        world_size: Option<usize>,

        /// Nest each file under a fresh UUID
        #[arg(long)]
        add_uuid: bool,

        #[command(flatten)]
        save: SaveArgs,
    },

    /// Flatten a bundle into one column per leaf path
    Translate {
        /// Input bundle
        #[arg(short, long)]
        input: PathBuf,

        /// Output (.npz for a column archive, otherwise a tree)
        #[arg(short, long)]
        output: PathBuf,

        /// "auto", comma-separated paths, or a schema file
        #[arg(long, default_value = "auto")]
        schema: String,

        /// Translate every <stem>_<n>.<ext> chunk next to the input
        #[arg(long)]
        chunks: bool,

        /// Worker threads for --chunks (default: one per CPU)
        #[arg(long)]
        workers: Option<usize>,

        #[command(flatten)]
        save: SaveArgs,
    },

    /// Stack column archives into one
    Stack {
        /// Overwrite the target
        #[arg(short, long)]
        force: bool,

        /// Target archive
        target: PathBuf,

        /// Source archives or glob patterns
        #[arg(required = true)]
        sources: Vec<String>,
    },

    /// Split input files into a partition side file
    GroupFiles {
        /// Input files or glob patterns
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Number of groups
        #[arg(short = 'n', long)]
        groups: usize,

        /// Side file to write (JSON)
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Write a JSON file from name=VALUE assignments
    Serialize {
        /// Output file
        #[arg(long, default_value = "output.json")]
        output: PathBuf,

        /// Assignments, e.g. run/n=3
        #[arg(long, num_args = 1.., required = true)]
        vars: Vec<String>,

        /// Separator for nested keys
        #[arg(long, default_value = "/")]
        splitter: String,

        /// Separator between key and value
        #[arg(long, default_value = "=")]
        delimiter: String,

        /// Also print the document
        #[arg(long)]
        verbose: bool,

        /// Indent with four spaces
        #[arg(long)]
        indent: bool,
    },
}

fn print_report<T: Serialize>(report: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

fn exit_code(success: bool) -> ExitCode {
    if success { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_max_level(cli.log_level).with_target(false).init();

    match cli.command {
        Commands::Collect { inputs, output, chunk_size, add_uuid, save } => {
            let inputs = expand_inputs(&inputs)?;
            let collector = Collector::new(
                Codec::new(),
                CollectOptions { chunk_size, add_uuid, save: save.options() },
            );
            let report = collector.collect(&inputs, &output)?;
            print_report(&report)?;
            Ok(exit_code(report.is_success()))
        }
        Commands::CollectJson { inputs, output } => {
            let inputs = expand_inputs(&inputs)?;
            concat_json(&inputs, &output)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::CollectPartition { partitions, output, rank, world_size, add_uuid, save } => {
            let rank = match rank {
                Some(index) => WorkerRank::new(index, world_size.unwrap_or(index + 1))?,
                None => WorkerRank::from_env()?,
            };
            let collector = Collector::new(
                Codec::new(),
                CollectOptions { chunk_size: None, add_uuid, save: save.options() },
            );
            let report = collector.collect_partition(&partitions, &output, rank)?;
            print_report(&report)?;
            Ok(exit_code(report.is_success()))
        }
        Commands::Translate { input, output, schema, chunks, workers, save } => {
            let translator = Translator::new(Codec::new(), TranslateOptions { save: save.options() });
            let schema = Schema::parse(&schema);
            if chunks {
                let report = translator.translate_chunks(&input, &output, &schema, workers)?;
                print_report(&report)?;
                Ok(exit_code(report.is_success()))
            } else {
                let report = translator.translate(&input, &output, &schema)?;
                print_report(&report)?;
                Ok(ExitCode::SUCCESS)
            }
        }
        Commands::Stack { force, target, sources } => {
            let sources = expand_inputs(&sources)?;
            let report = Stacker::new(force).run(&target, &sources)?;
            print_report(&report)?;
            Ok(exit_code(report.is_success()))
        }
        Commands::GroupFiles { inputs, groups, output } => {
            let inputs = expand_inputs(&inputs)?;
            let partitions = group_files(&inputs, groups);
            write_partitions(&output, &partitions)?;
            tracing::info!(files = inputs.len(), groups = partitions.len(), output = %output.display(), "wrote partitions");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Serialize { output, vars, splitter, delimiter, verbose, indent } => {
            let doc = nested_from_assignments(&vars, &splitter, &delimiter)?;
            if verbose {
                println!("{}", serde_json::to_string(&doc).context("render document")?);
            }
            write_serialized(&output, &doc, indent)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
