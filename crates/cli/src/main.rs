use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use regex::Regex;
use serde_json::json;

use stexmap_core::coverage::{build_graph, CoverageMode, CyclePolicy, GraphOptions};
use stexmap_core::report::DiagnosticKind;
use stexmap_core::{infer_corpus_root, FileSystemProvider, Harvester, Report};

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// sTeX corpus harvester and symbol model extractor.
#[derive(Parser)]
#[command(name = "stexmap", version, about = "sTeX corpus harvester")]
struct Cli {
    /// Log verbosity (0 = fatal only .. 4 = debug)
    #[arg(long, global = true, default_value_t = 2, value_parser = clap::value_parser!(u8).range(0..=4))]
    verbosity: u8,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest a corpus and print the resolved symbol model
    Harvest {
        /// Corpus root directory containing the repositories
        corpus_root: PathBuf,
        /// Only harvest repositories whose id matches this regex
        #[arg(long)]
        filter: Option<String>,
    },

    /// Build the coverage/import graph for a root document
    Graph {
        /// Path to the root document (the corpus root is inferred from it)
        root_doc: PathBuf,
        /// Stop the traversal at the coverage marker
        #[arg(long)]
        covered_only: bool,
        /// Skip document-inclusion cycles silently instead of reporting them
        #[arg(long)]
        skip_cycles: bool,
        /// Write the graph JSON to this file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Harvest {
            corpus_root,
            filter,
        } => {
            cmd_harvest(&corpus_root, filter.as_deref(), cli.output, cli.verbosity);
        }
        Commands::Graph {
            root_doc,
            covered_only,
            skip_cycles,
            out,
        } => {
            cmd_graph(
                &root_doc,
                covered_only,
                skip_cycles,
                out.as_deref(),
                cli.verbosity,
            );
        }
    }
}

fn cmd_harvest(corpus_root: &Path, filter: Option<&str>, output: OutputFormat, verbosity: u8) {
    let filter = match filter.map(Regex::new).transpose() {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("error: invalid --filter regex: {}", e);
            process::exit(2);
        }
    };

    let provider = FileSystemProvider;
    let mut report = Report::new();
    let mut harvester = match Harvester::new(&provider, corpus_root, &mut report) {
        Ok(harvester) => harvester,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };
    harvester.load_all(filter.as_ref(), &mut report);
    harvester.compile(&mut report);

    match output {
        OutputFormat::Text => {
            for line in report.render(verbosity) {
                eprintln!("{}", line);
            }
            println!(
                "{} repositories, {} files, {} symbols, {} unresolved references",
                harvester.corpus.repos.len(),
                harvester.files.len(),
                harvester.referencer.symbols().len(),
                report.count_kind(DiagnosticKind::UnresolvedReference),
            );
        }
        OutputFormat::Json => {
            let repositories: Vec<_> = harvester
                .corpus
                .repos
                .iter()
                .map(|r| {
                    json!({
                        "id": r.id,
                        "namespace": r.namespace,
                        "dependencies": r.dependencies,
                    })
                })
                .collect();
            let symbols: Vec<_> = harvester
                .referencer
                .symbols()
                .iter()
                .map(|s| {
                    json!({
                        "name": s.name,
                        "repo": s.repo,
                        "directory": s.directory,
                        "module": s.module,
                        "declared": s.declared.len(),
                        "used": s.used.len(),
                    })
                })
                .collect();
            let value = json!({
                "repositories": repositories,
                "files": harvester.files.len(),
                "symbols": symbols,
                "diagnostics": report.to_json_value(verbosity),
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&value).expect("serializable value")
            );
        }
    }
}

fn cmd_graph(
    root_doc: &Path,
    covered_only: bool,
    skip_cycles: bool,
    out: Option<&Path>,
    verbosity: u8,
) {
    let provider = FileSystemProvider;
    let root_doc = match std::fs::canonicalize(root_doc) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("error: cannot open {}: {}", root_doc.display(), e);
            process::exit(1);
        }
    };
    let corpus_root = match infer_corpus_root(&root_doc, &provider) {
        Ok(root) => root,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };

    let mut report = Report::new();
    let mut harvester = match Harvester::new(&provider, &corpus_root, &mut report) {
        Ok(harvester) => harvester,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };
    harvester.load_all(None, &mut report);
    harvester.compile(&mut report);

    let Some(root) = harvester.find_loaded(&root_doc) else {
        eprintln!(
            "error: {} was not processed during harvesting",
            root_doc.display()
        );
        process::exit(1);
    };

    let options = GraphOptions {
        mode: if covered_only {
            CoverageMode::CoveredOnly
        } else {
            CoverageMode::Full
        },
        cycle_policy: if skip_cycles {
            CyclePolicy::Skip
        } else {
            CyclePolicy::FatalBranch
        },
    };
    let graph = build_graph(&harvester.files, root, options, &mut report);

    for line in report.render(verbosity) {
        eprintln!("{}", line);
    }
    let rendered = serde_json::to_string_pretty(&graph.to_json()).expect("serializable value");
    match out {
        Some(path) => {
            if let Err(e) = std::fs::write(path, rendered) {
                eprintln!("error: cannot write {}: {}", path.display(), e);
                process::exit(1);
            }
        }
        None => println!("{}", rendered),
    }
}
