//! Ontology CLI
//!
//! Checks definition files and inspects the ontologies a registry would hold.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use ontology_client::{definitions, ClientConfig, OntologyRegistry};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ontology")]
#[command(about = "Check ontology definitions and inspect the registry")]
struct Cli {
    /// Config file (defaults to ontology.toml lookup)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate definition files or directories
    Check {
        /// Files or directories holding .toml/.json definitions
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// List the queryable field paths of an ontology
    Paths {
        /// Ontology tag
        tag: String,
    },

    /// Fuzzy-search registered tags
    Search {
        query: String,

        /// Maximum number of results
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Print the definition of an ontology as JSON
    Show {
        tag: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match ClientConfig::load_from(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(cli.command, &config) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(command: Commands, config: &ClientConfig) -> anyhow::Result<()> {
    match command {
        Commands::Check { paths } => {
            // A fresh registry so definitions are also checked for tag clashes
            let registry = if config.registry.builtins {
                OntologyRegistry::with_builtins()?
            } else {
                OntologyRegistry::new()
            };
            let before = registry.len();
            let mut failed = 0;

            for path in &paths {
                let loaded = definitions::load_path(path)
                    .with_context(|| format!("failed to load {}", path.display()));
                let defs = match loaded {
                    Ok(defs) => defs,
                    Err(e) => {
                        println!("  ❌ {:#}", e);
                        failed += 1;
                        continue;
                    }
                };
                for def in defs {
                    let tag = def.tag.clone();
                    let fingerprint = def.fingerprint();
                    match registry.register_definition(def) {
                        Ok(()) => println!("  ✅ {} ({})", tag, fingerprint.short()),
                        Err(e) => {
                            println!("  ❌ {}: {}", tag, e);
                            failed += 1;
                        }
                    }
                }
            }

            println!();
            println!("{} definitions valid, {} failed", registry.len() - before, failed);
            if failed > 0 {
                bail!("{} definitions failed validation", failed);
            }
            Ok(())
        }

        Commands::Paths { tag } => {
            let registry = config.build_registry()?;
            let entry = match registry.get(&tag) {
                Some(entry) => entry,
                None => {
                    let hint = registry.search(&tag, 1);
                    match hint.first() {
                        Some(s) => bail!("unknown ontology tag '{}' (did you mean '{}'?)", tag, s),
                        None => bail!("unknown ontology tag '{}'", tag),
                    }
                }
            };
            println!("{} [{}]", entry.tag, entry.serialization_format.as_str());
            for (path, data_type) in entry.schema.leaf_paths() {
                println!("  {}.{}: {}", entry.tag, path, data_type);
            }
            Ok(())
        }

        Commands::Search { query, limit } => {
            let registry = config.build_registry()?;
            let hits = registry.search(&query, limit);
            if hits.is_empty() {
                println!("No ontologies match '{}'", query);
            }
            for tag in hits {
                println!("{}", tag);
            }
            Ok(())
        }

        Commands::Show { tag } => {
            let registry = config.build_registry()?;
            let entry = registry.resolve(&tag)?;
            let json = serde_json::to_string_pretty(&entry.definition())
                .context("failed to render definition")?;
            println!("{}", json);
            Ok(())
        }
    }
}
