//! Command-line driver: load a class hierarchy and inspect its resolution

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use gado::ClassRegistry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gado")]
#[command(about = "Method resolution order engine - linearize dynamic class hierarchies and inspect their caches", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print linearizations for a hierarchy description
    Linearize {
        /// Hierarchy description (JSON)
        file: PathBuf,

        /// Restrict output to one class
        #[arg(short, long)]
        class: Option<String>,

        /// Linearize under this algorithm instead of each class's own
        #[arg(short, long)]
        algo: Option<String>,

        /// Emit machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the reverse-subclass index
    Isarev {
        /// Hierarchy description (JSON)
        file: PathBuf,

        /// Restrict output to the subclasses of one name
        #[arg(short, long)]
        class: Option<String>,
    },

    /// Print per-class generation counters
    Gen {
        /// Hierarchy description (JSON)
        file: PathBuf,
    },
}

/// On-disk description of a hierarchy: class definitions in order, plus an
/// optional algorithm selection per class.
#[derive(Debug, Deserialize)]
struct HierarchyDoc {
    classes: Vec<ClassDoc>,
    #[serde(default)]
    algorithms: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ClassDoc {
    name: String,
    #[serde(default)]
    parents: Vec<String>,
    #[serde(default)]
    methods: Vec<String>,
}

#[derive(Debug, Serialize)]
struct LinearReport {
    class: String,
    algorithm: String,
    linearization: Vec<String>,
}

fn load_hierarchy(path: &PathBuf) -> Result<(ClassRegistry, Vec<String>)> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read hierarchy description {}", path.display()))?;
    let doc: HierarchyDoc = serde_json::from_str(&source)
        .with_context(|| format!("malformed hierarchy description {}", path.display()))?;

    let mut registry = ClassRegistry::new();
    let mut order = Vec::with_capacity(doc.classes.len());
    for class_doc in &doc.classes {
        let parents: Vec<&str> = class_doc.parents.iter().map(String::as_str).collect();
        let id = registry
            .define_class(&class_doc.name, &parents)
            .with_context(|| format!("defining class '{}'", class_doc.name))?;
        for method in &class_doc.methods {
            registry
                .define_method(id, method)
                .with_context(|| format!("defining method '{}::{}'", class_doc.name, method))?;
        }
        order.push(class_doc.name.clone());
    }
    for (class_name, algo) in &doc.algorithms {
        let id = registry
            .resolve(class_name)
            .ok_or_else(|| anyhow!("algorithm selection for unknown class '{}'", class_name))?;
        registry
            .set_algo(id, algo)
            .with_context(|| format!("selecting algorithm for '{}'", class_name))?;
    }
    Ok((registry, order))
}

fn linearize(
    registry: &mut ClassRegistry,
    order: &[String],
    only: Option<&str>,
    algo: Option<&str>,
    json: bool,
) -> Result<()> {
    let mut reports = Vec::new();
    for name in order {
        if only.map_or(false, |c| c != name.as_str()) {
            continue;
        }
        let id = registry
            .resolve(name)
            .ok_or_else(|| anyhow!("no such class: '{}'", name))?;
        let lin = match algo {
            Some(algo) => registry.get_linear_isa_with(id, algo),
            None => registry.get_linear_isa(id),
        }
        .with_context(|| format!("linearizing '{}'", name))?;
        reports.push(LinearReport {
            class: name.clone(),
            algorithm: algo.unwrap_or(registry.get_algo_name(id)).to_string(),
            linearization: lin.names().to_vec(),
        });
    }
    if only.is_some() && reports.is_empty() {
        return Err(anyhow!("no such class in description: '{}'", only.unwrap_or_default()));
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            println!(
                "{} ({}): {}",
                report.class,
                report.algorithm,
                report.linearization.join(" -> ")
            );
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Linearize {
            file,
            class,
            algo,
            json,
        } => {
            let (mut registry, order) = load_hierarchy(&file)?;
            linearize(&mut registry, &order, class.as_deref(), algo.as_deref(), json)?;
        }
        Commands::Isarev { file, class } => {
            let (registry, order) = load_hierarchy(&file)?;
            match class {
                Some(name) => {
                    println!("{}: {}", name, registry.get_isarev(&name).join(", "));
                }
                None => {
                    for name in &order {
                        let subs = registry.get_isarev(name);
                        if !subs.is_empty() {
                            println!("{}: {}", name, subs.join(", "));
                        }
                    }
                }
            }
        }
        Commands::Gen { file } => {
            let (mut registry, order) = load_hierarchy(&file)?;
            for name in &order {
                if let Some(id) = registry.resolve(name) {
                    println!(
                        "{}: pkg_gen={} cache_gen={}",
                        name,
                        registry.get_pkg_gen(id),
                        registry.get_cache_gen(id)
                    );
                }
            }
            println!("sub_generation={}", registry.sub_generation());
        }
    }
    Ok(())
}
