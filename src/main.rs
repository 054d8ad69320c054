//! Main entry point for Portraitgen
//!
//! Runs one portrait session end to end: upload, customize, generate, then
//! download and optionally share the result.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use portraitgen::{
    config::Config,
    export::{ClipboardSharer, DirectoryExporter},
    gallery::sample_gallery,
    job::JobEvent,
    transform::SimulatedTransformer,
    ParameterField, StyleCatalog, Workflow,
};

#[derive(Debug, Parser)]
#[command(name = "portraitgen", version, about = "Turn a photo into a themed portrait")]
struct Cli {
    /// Photo to transform
    #[arg(long, required_unless_present = "list_styles")]
    image: Option<PathBuf>,

    /// Style id (see --list-styles)
    #[arg(long)]
    style: Option<String>,

    #[arg(long, value_name = "70-100")]
    face_accuracy: Option<i32>,

    #[arg(long, value_name = "50-100")]
    detail_level: Option<i32>,

    #[arg(long, value_name = "30-100")]
    color_intensity: Option<i32>,

    #[arg(long, value_name = "0-100")]
    background_style: Option<i32>,

    /// Directory for the downloaded portrait
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Minimum delay between progress milestones, in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Config file to use instead of the default location
    #[arg(long)]
    config: Option<PathBuf>,

    /// Copy the finished portrait to the clipboard
    #[arg(long)]
    share: bool,

    /// Print the available styles and sample gallery, then exit
    #[arg(long)]
    list_styles: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Load configuration
    let loaded = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let mut config = loaded.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "using default configuration");
        Config::default()
    });
    if let Some(delay) = cli.delay_ms {
        config.job.milestone_delay_ms = delay;
    }

    let catalog = Arc::new(StyleCatalog::builtin());

    if cli.list_styles {
        print_styles(&catalog);
        return Ok(());
    }

    let mut workflow = Workflow::new(&config, catalog, Arc::new(SimulatedTransformer));

    let Some(image_path) = cli.image.as_deref() else {
        bail!("--image is required");
    };
    workflow
        .upload_file(image_path)
        .with_context(|| format!("Failed to load image: {:?}", image_path))?;

    if let Some(style) = &cli.style {
        workflow.select_style(style)?;
    }

    let overrides = [
        (ParameterField::FaceAccuracy, cli.face_accuracy),
        (ParameterField::DetailLevel, cli.detail_level),
        (ParameterField::ColorIntensity, cli.color_intensity),
        (ParameterField::BackgroundStyle, cli.background_style),
    ];
    for (field, value) in overrides {
        if let Some(value) = value {
            let stored = workflow.set_parameter(field, value);
            if i32::from(stored) != value {
                println!("{} adjusted to {}", field, stored);
            }
        }
    }

    let style = workflow.state().selected_style_id.clone();
    println!("Generating '{}' portrait...", style);
    workflow.generate()?;

    workflow
        .run_to_completion(|event| {
            if let JobEvent::Progress { percent, phase, .. } = event {
                println!("[{:>3}%] {}", percent, phase);
            }
        })
        .await
        .context("Generation failed, adjust the settings and try again")?;

    let output_dir = cli
        .output
        .or_else(|| config.export.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));
    let notice = workflow.download(&DirectoryExporter::new(output_dir));
    report(notice.message(), notice.is_warning());

    if cli.share {
        let notice = workflow.share_result(&ClipboardSharer);
        report(notice.message(), notice.is_warning());
    }

    Ok(())
}

fn print_styles(catalog: &StyleCatalog) {
    println!("Styles:");
    for style in catalog.list_styles() {
        let premium = if style.is_premium { " [premium]" } else { "" };
        println!(
            "  {:<10} {}{} - {}",
            style.id, style.display_name, premium, style.description
        );
    }

    println!("Gallery:");
    for sample in sample_gallery() {
        if let Some(uri) = sample.uri() {
            println!("  {}", uri);
        }
    }
}

fn report(message: &str, is_warning: bool) {
    if is_warning {
        eprintln!("Warning: {}", message);
    } else {
        println!("{}", message);
    }
}
