use anyhow::{Context, Result};
use apigen::config::{load_config, merge_with_cli_args, CliOverrides};
use apigen::{generate, render, Dialect, Severity, SourceDocument};
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the OpenAPI 3 or Swagger 2 document (YAML or JSON)
    #[arg(short, long)]
    spec: Option<PathBuf>,

    /// Output directory for the bucket manifests and summary
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Path to config file (overrides default location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Force the document dialect (openapi3 or swagger2) instead of detecting it
    #[arg(short, long)]
    dialect: Option<String>,

    /// Router strategy: stdlib, chi, gorilla, echo, or none
    #[arg(short, long)]
    router: Option<String>,

    /// Fail on empty extensions and on any critical issue
    #[arg(long)]
    strict: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    // Load configuration
    let config = load_config(args.config.as_deref())?;
    let merged_config = merge_with_cli_args(
        config,
        CliOverrides {
            spec: args.spec,
            output: args.output,
            dialect: args.dialect,
            router: args.router,
            strict: args.strict,
        },
    );

    // Validate we have input
    let input_config = merged_config
        .input
        .ok_or_else(|| anyhow::anyhow!("No input source specified. Use --spec or configure input in config file"))?;

    println!("📖 Reading input from: {:?}", input_config.source);

    let text = fs::read_to_string(&input_config.source)
        .with_context(|| format!("Failed to read input file: {:?}", input_config.source))?;

    let hint = input_config
        .dialect
        .as_deref()
        .map(str::parse::<Dialect>)
        .transpose()?;

    let document = SourceDocument::parse(&text, hint)
        .with_context(|| format!("Failed to parse {:?}", input_config.source))?;

    println!("🔍 Detected format: {}", document.dialect().label());

    let options = merged_config.generation;
    let output = generate(&document, &options).context("Generation failed")?;

    println!(
        "✅ Planned {} types and {} operations across {} file(s)",
        output.stats.types, output.stats.operations, output.stats.files
    );

    // Determine output directory
    let output_dir = merged_config.output.unwrap_or_else(|| PathBuf::from("generated"));
    let written = render::write_artifacts(&output, &output_dir)?;
    for path in &written {
        println!("✅ Generated: {:?}", path);
    }

    for issue in output.issues.iter().filter(|i| i.severity > Severity::Info) {
        println!("⚠️  {}", issue);
    }

    if options.strict && output.has_critical() {
        anyhow::bail!("Strict mode: generation reported critical issues");
    }

    println!(
        "🎉 Successfully generated {} file(s) in {} ms!",
        written.len(),
        output.stats.elapsed_ms()
    );

    Ok(())
}
