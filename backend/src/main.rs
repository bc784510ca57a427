//! Orderload CLI - Normalize client order exports
//!
//! # Main Commands
//!
//! ```bash
//! orderload transform orders.csv -o out.csv   # Full pipeline
//! orderload serve                             # Start HTTP server (port 3000)
//! orderload template list                     # Manage stored plans
//! ```
//!
//! # Debug Commands
//!
//! ```bash
//! orderload extract orders.csv --header-row 4  # Just cut out the data table
//! orderload validate-plan plan.json            # Check a plan document
//! orderload example-plan --wide                # Show an example plan
//! orderload example-schema                     # Show the default target schema
//! ```

use clap::{Parser, Subcommand};
use orderload::parser::parse_file_auto;
use orderload::transform::pipeline::{format_delimiter, locate_table};
use orderload::transform::{example_long_plan, example_wide_plan};
use orderload::{
    default_order_schema, output, transform_file, PipelineResult, PlanDocument, PlanRegistry,
    Table, TransformOptions,
};
use std::fs;
use std::path::{Path, PathBuf};

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "orderload")]
#[command(about = "Normalize client order exports into a canonical order schema", long_about = None)]
struct Cli {
    /// Plan registry directory
    #[arg(long, global = true)]
    registry: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct RunArgs {
    /// Zero-based header row (AI discovery if not specified)
    #[arg(long)]
    header_row: Option<usize>,

    /// Lookup snapshot JSON file (database from DB_* variables otherwise)
    #[arg(long)]
    lookups: Option<PathBuf>,

    /// Target schema JSON file (built-in order schema otherwise)
    #[arg(short, long)]
    schema: Option<PathBuf>,

    /// Output CSV file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print JSON instead of CSV
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Locate the data table of an export and print it as CSV
    Extract {
        /// Input file
        input: PathBuf,

        /// Zero-based header row (AI discovery if not specified)
        #[arg(long)]
        header_row: Option<usize>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Full pipeline: export -> plan -> canonical orders
    Transform {
        /// Input file
        input: PathBuf,

        #[command(flatten)]
        run: RunArgs,

        /// Use an existing plan file instead of registry/AI
        #[arg(short, long)]
        plan: Option<PathBuf>,

        /// Save the plan that was used to a file
        #[arg(long)]
        save_plan: Option<PathBuf>,

        /// Number of sample rows sent to the AI
        #[arg(long, default_value = "20")]
        preview_rows: usize,

        /// Don't try stored plans
        #[arg(long)]
        no_cache: bool,

        /// Don't store AI plans
        #[arg(long)]
        no_save: bool,
    },

    /// Validate a plan document
    ValidatePlan {
        /// Plan JSON file
        input: PathBuf,
    },

    /// Show the default target schema
    ExampleSchema,

    /// Show an example plan
    ExamplePlan {
        /// Show the wide (unpivot) example
        #[arg(long)]
        wide: bool,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Lookup snapshot JSON file (database from DB_* variables otherwise)
        #[arg(long)]
        lookups: Option<PathBuf>,

        /// Don't store AI plans
        #[arg(long)]
        no_save: bool,
    },

    /// Manage stored plans
    Template {
        #[command(subcommand)]
        action: TemplateAction,
    },
}

#[derive(Subcommand)]
enum TemplateAction {
    /// List all stored plans
    List,

    /// Import a plan JSON file
    Import {
        /// Plan JSON file to import
        file: PathBuf,
        /// Name for the plan
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Show details of a stored plan
    Show {
        /// Plan ID
        id: String,
    },

    /// Delete a stored plan
    Delete {
        /// Plan ID
        id: String,
    },

    /// Transform an export with a specific stored plan
    Use {
        /// Plan ID
        id: String,
        /// Input file
        input: PathBuf,
        #[command(flatten)]
        run: RunArgs,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let registry = cli.registry;

    let result = match cli.command {
        Commands::Extract {
            input,
            header_row,
            output,
        } => cmd_extract(&input, header_row, output.as_deref()).await,

        Commands::Transform {
            input,
            run,
            plan,
            save_plan,
            preview_rows,
            no_cache,
            no_save,
        } => {
            let options = TransformOptions {
                plan_path: plan,
                preview_rows,
                no_cache,
                no_save,
                ..run.options(registry)
            };
            cmd_transform(&input, options, &run, save_plan.as_deref()).await
        }

        Commands::ValidatePlan { input } => cmd_validate_plan(&input),

        Commands::ExampleSchema => cmd_example_schema(),

        Commands::ExamplePlan { wide } => cmd_example_plan(wide),

        Commands::Serve {
            port,
            lookups,
            no_save,
        } => {
            let defaults = TransformOptions {
                lookups_path: lookups,
                no_save,
                registry_dir: registry,
                ..TransformOptions::default()
            };
            orderload::api::start_server(port, defaults)
                .await
                .map_err(Into::into)
        }

        Commands::Template { action } => cmd_template(action, registry).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

impl RunArgs {
    fn options(&self, registry: Option<PathBuf>) -> TransformOptions {
        TransformOptions {
            schema_path: self.schema.clone(),
            header_row: self.header_row,
            lookups_path: self.lookups.clone(),
            registry_dir: registry,
            ..TransformOptions::default()
        }
    }

    fn write(&self, table: &Table) -> CliResult {
        if self.json {
            let json = serde_json::to_string_pretty(&output::to_json(table))?;
            return write_text(&json, self.output.as_deref());
        }
        write_table(table, self.output.as_deref())
    }
}

async fn cmd_extract(input: &Path, header_row: Option<usize>, output: Option<&Path>) -> CliResult {
    let sheet = parse_file_auto(input)?;
    eprintln!("   Encoding: {}", sheet.encoding);
    eprintln!("   Delimiter: '{}'", format_delimiter(sheet.delimiter));

    let (row, table) = locate_table(&sheet, header_row).await?;
    eprintln!("   Header row: {}", row);
    eprintln!("   Columns: {}", table.headers().join(", "));
    eprintln!("   Rows: {}", table.height());

    write_table(&table, output)
}

async fn cmd_transform(
    input: &Path,
    options: TransformOptions,
    run: &RunArgs,
    save_plan: Option<&Path>,
) -> CliResult {
    eprintln!("Processing: {}", input.display());
    let result = transform_file(input, options).await?;
    print_summary(&result);

    if let Some(path) = save_plan {
        fs::write(path, result.plan.to_json()?)?;
        eprintln!("   Plan saved to: {}", path.display());
    }

    run.write(&result.table)
}

fn print_summary(result: &PipelineResult) {
    eprintln!("   Encoding: {}", result.csv_info.encoding);
    eprintln!("   Delimiter: '{}'", format_delimiter(result.csv_info.delimiter));
    eprintln!("   Input rows: {}", result.csv_info.row_count);
    eprintln!("   Output rows: {}", result.table.height());
    if let Some(ref tid) = result.template_id {
        eprintln!("   Plan: {}", tid);
    }
    for (column, counts) in &result.status_counts {
        eprintln!("   {}:", column);
        for (status, count) in counts {
            eprintln!("     {:<24} {}", status, count);
        }
    }
}

fn cmd_validate_plan(input: &Path) -> CliResult {
    let content = fs::read_to_string(input)?;
    let document = PlanDocument::from_json(&content)?;
    let plan = document.resolve()?;

    eprintln!("Plan is valid: '{}' format", plan.format_name());
    eprintln!("   Reads columns: {}", plan.source_columns().join(", "));
    Ok(())
}

fn cmd_example_schema() -> CliResult {
    println!("{}", default_order_schema().to_json()?);
    Ok(())
}

fn cmd_example_plan(wide: bool) -> CliResult {
    let plan = if wide {
        example_wide_plan()
    } else {
        example_long_plan()
    };
    println!("{}", plan.to_json()?);
    Ok(())
}

fn write_table(table: &Table, path: Option<&Path>) -> CliResult {
    match path {
        Some(p) => {
            output::write_csv_file(table, p)?;
            eprintln!("Output written to: {}", p.display());
        }
        None => output::write_csv(table, std::io::stdout().lock())?,
    }
    Ok(())
}

fn write_text(content: &str, path: Option<&Path>) -> CliResult {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("Output written to: {}", p.display());
        }
        None => println!("{}", content),
    }
    Ok(())
}

async fn cmd_template(action: TemplateAction, registry_dir: Option<PathBuf>) -> CliResult {
    let mut registry = match &registry_dir {
        Some(dir) => PlanRegistry::with_dir(dir),
        None => PlanRegistry::new(),
    };

    match action {
        TemplateAction::List => {
            let plans = registry.list();
            if plans.is_empty() {
                eprintln!("No plans stored yet.");
                eprintln!("   Use 'orderload template import <file>' to add one.");
                return Ok(());
            }

            eprintln!("Stored plans ({}):\n", plans.len());
            for p in plans {
                println!("  {} ({})", p.name, p.id);
                println!("     Columns: {}", p.source_columns.join(", "));
                println!("     Success rate: {:.0}%", p.success_rate * 100.0);
                println!("     Uses: {}", p.use_count);
                if let Some(ref last) = p.last_used {
                    println!("     Last used: {}", last);
                }
                println!();
            }
        }

        TemplateAction::Import { file, name } => {
            let id = registry.import(&file, name.as_deref())?;
            eprintln!("Plan saved with ID: {}", id);
        }

        TemplateAction::Show { id } => {
            let p = registry
                .get(&id)
                .ok_or_else(|| format!("Plan not found: {}", id))?;
            println!("Plan: {} ({})\n", p.name, p.id);
            println!("Columns: {}", p.source_columns.join(", "));
            println!("Created: {}", p.created_at);
            println!("Success rate: {:.0}%", p.success_rate * 100.0);
            println!("Uses: {}", p.use_count);
            println!("\n{}", p.plan.to_json()?);
        }

        TemplateAction::Delete { id } => {
            registry.delete(&id)?;
            eprintln!("Plan deleted: {}", id);
        }

        TemplateAction::Use { id, input, run } => {
            let stored = registry
                .get(&id)
                .ok_or_else(|| format!("Plan not found: {}", id))?;
            eprintln!("Using plan: {} ({})", stored.name, stored.id);

            let options = TransformOptions {
                plan: Some(stored.plan.clone()),
                ..run.options(registry_dir)
            };
            let outcome = transform_file(&input, options).await;
            registry.update_stats(&id, outcome.is_ok())?;

            let result = outcome?;
            print_summary(&result);
            run.write(&result.table)?;
        }
    }

    Ok(())
}
