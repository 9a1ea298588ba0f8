use std::io::Read;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spec_manifest::config::ConfigLoader;
use spec_manifest::graph::{self, EdgePolicy, SortOrder};
use spec_manifest::history::{BackfillOptions, Backfiller, GitCli};
use spec_manifest::mcp;
use spec_manifest::models::{SpecPriority, SpecStatus};
use spec_manifest::store::SpecStore;

#[derive(Parser)]
#[command(name = "spec-manifest")]
#[command(about = "Versioned spec documents with atomic edits and git-derived history")]
struct Cli {
    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List specs
    List {
        #[arg(long)]
        status: Option<SpecStatus>,
        #[arg(long)]
        priority: Option<SpecPriority>,
    },
    /// Print a spec document and its content hash
    View {
        spec: String,
        /// Another file in the spec directory, e.g. DESIGN.md
        #[arg(long)]
        file: Option<String>,
    },
    /// Show the parent/child hierarchy
    Tree {
        /// id-asc, id-desc, updated, title or priority
        #[arg(long, default_value = "id-asc")]
        sort: SortOrder,
    },
    /// Show dependencies of one spec, or every dependency edge
    Deps {
        spec: Option<String>,
        /// keep, prune or reject self and dangling references
        #[arg(long, default_value = "keep")]
        policy: EdgePolicy,
    },
    /// Fill missing header fields from git history
    Backfill {
        /// Specs to process; all when omitted
        specs: Vec<String>,
        /// Set assignee from the first commit's author
        #[arg(long)]
        assignee: bool,
        /// Replay status transitions from earlier revisions
        #[arg(long)]
        transitions: bool,
        /// Overwrite values already present
        #[arg(long)]
        force: bool,
        /// Create status and created for specs without a valid header
        #[arg(long)]
        bootstrap: bool,
        /// Report changes without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// Check or uncheck a checklist item
    Toggle {
        spec: String,
        item: String,
        /// Uncheck instead of check
        #[arg(long)]
        uncheck: bool,
        /// Refuse to write unless the file still has this content hash
        #[arg(long)]
        expected_hash: Option<String>,
    },
    /// Replace or append to a `## ` section; content is read from stdin if omitted
    Section {
        spec: String,
        title: String,
        content: Option<String>,
        #[arg(long)]
        append: bool,
        /// Refuse to write unless the file still has this content hash
        #[arg(long)]
        expected_hash: Option<String>,
    },
    /// Start MCP server via stdio
    Mcp,
}

/// Logs go to stderr: stdout carries command output, or the protocol in MCP mode.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "spec_manifest=info".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let root = std::env::current_dir().context("Failed to read current directory")?;
    let config = ConfigLoader::new(root).load()?;
    tracing::debug!("Using specs directory {}", config.specs_dir.display());
    let store = SpecStore::new(config);

    match cli.command {
        Commands::List { status, priority } => {
            let specs: Vec<_> = store
                .summaries()?
                .into_iter()
                .filter(|s| status.is_none() || s.status == status)
                .filter(|s| priority.is_none() || s.priority == priority)
                .collect();
            if cli.json {
                return print_json(&specs);
            }
            for spec in specs {
                println!(
                    "{:<32} {:<12} {:<9} {}",
                    spec.id,
                    spec.status.map_or("-", |s| s.as_str()),
                    spec.priority.map_or("-", |p| p.as_str()),
                    spec.title
                );
            }
        }
        Commands::View { spec, file } => {
            let raw = match file {
                Some(file) => store.get_sub_raw(&spec, &file)?,
                None => store.get_raw(&spec)?,
            };
            if cli.json {
                return print_json(&raw);
            }
            eprintln!("{} ({})", raw.path.display(), raw.content_hash);
            print!("{}", raw.content);
        }
        Commands::Tree { sort } => {
            let roots = graph::build_hierarchy(&store.summaries()?, sort);
            if cli.json {
                return print_json(&roots);
            }
            print!("{}", graph::render_tree(&roots));
        }
        Commands::Deps { spec, policy } => {
            let deps = graph::build_dependency_graph(&store.summaries()?, policy)?;
            match spec {
                Some(spec) => {
                    let id = store.resolve(&spec)?.id;
                    let depends_on = deps.depends_on(&id);
                    let required_by = deps.required_by(&id);
                    if cli.json {
                        return print_json(&serde_json::json!({
                            "id": id,
                            "dependsOn": depends_on,
                            "requiredBy": required_by,
                        }));
                    }
                    println!("{}", id);
                    println!("  depends on:  {}", depends_on.join(", "));
                    println!("  required by: {}", required_by.join(", "));
                }
                None if cli.json => return print_json(&deps),
                None => {
                    for edge in &deps.edges {
                        println!("{} -> {}", edge.source, edge.target);
                    }
                }
            }
        }
        Commands::Backfill {
            specs,
            assignee,
            transitions,
            force,
            bootstrap,
            dry_run,
        } => {
            let git = GitCli::default();
            if !git.is_available() {
                anyhow::bail!("git is not available on PATH");
            }
            let options = BackfillOptions {
                assignee,
                transitions,
                force,
                bootstrap,
                dry_run,
            };
            let backfiller = Backfiller::new(&store, git, options);
            let report = if specs.is_empty() {
                backfiller.run_all()?
            } else {
                backfiller.run(&specs)
            };

            let failed = report.failed();
            if cli.json {
                print_json(&mcp::BackfillResponse::from_report(report, dry_run))?;
            } else {
                for entry in &report.entries {
                    match &entry.result {
                        Ok(outcome) => {
                            let applied: Vec<_> =
                                outcome.changes.iter().filter(|c| c.applied).collect();
                            if applied.is_empty() {
                                println!("{}: up to date", entry.spec);
                            }
                            for change in applied {
                                println!(
                                    "{}: {} = {} ({:?})",
                                    entry.spec, change.field, change.value, change.source
                                );
                            }
                        }
                        Err(e) => eprintln!("{}: {}", entry.spec, e),
                    }
                }
                println!(
                    "{} updated, {} failed{}",
                    report.updated(),
                    failed,
                    if dry_run { " (dry run, nothing written)" } else { "" }
                );
            }
            if failed > 0 {
                std::process::exit(1);
            }
        }
        Commands::Toggle {
            spec,
            item,
            uncheck,
            expected_hash,
        } => {
            let hash = store.toggle_checklist(&spec, &item, !uncheck, expected_hash.as_deref())?;
            println!("{}", hash);
        }
        Commands::Section {
            spec,
            title,
            content,
            append,
            expected_hash,
        } => {
            let content = match content {
                Some(content) => content,
                None => {
                    let mut buf = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .context("Failed to read section content from stdin")?;
                    buf
                }
            };
            let expected = expected_hash.as_deref();
            let hash = if append {
                store.append_section(&spec, &title, &content, expected)?
            } else {
                store.update_section(&spec, &title, &content, expected)?
            };
            println!("{}", hash);
        }
        Commands::Mcp => {
            mcp::run_stdio_server(store).await?;
        }
    }

    Ok(())
}
