use anyhow::{Context, Result};
use clap::Parser;
use medical_report_service::{
    AppConfig,
    collaborators::GeminiClient,
    export::{Block, ExportOptions, layout, render_report_pdf},
};
use report_flow::{Collaborators, InputDocument, Language, WorkflowController};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Analyze a medical report from the command line.
#[derive(Debug, Parser)]
#[command(name = "analyze_report", version)]
struct Args {
    /// PDF, PNG, JPEG or plain-text report to analyze
    file: PathBuf,

    /// Show the report in this language (English, Hindi or Gujarati)
    #[arg(short, long)]
    language: Option<Language>,

    /// Also write the displayed report to this PDF file
    #[arg(short, long)]
    export: Option<PathBuf>,

    /// Print the report as JSON instead of text
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let args = Args::parse();
    let config = AppConfig::from_env();

    let gemini = Arc::new(GeminiClient::new(config.gemini.clone())?);
    let controller =
        WorkflowController::new(config.flow_config(), Collaborators::from_shared(gemini));

    let document = InputDocument::from_path(&args.file)
        .await
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    info!(file = %document.name, media_type = %document.media_type, size = document.size(), "Analyzing report");

    controller.select_file(document).await;
    exit_on_error(&controller);

    if let Some(language) = args.language {
        controller.change_language(language).await;
        exit_on_error(&controller);
    }

    let state = controller.state();
    let Some(report) = state.displayed_report() else {
        anyhow::bail!("the workflow finished without a report");
    };

    if args.json {
        let output = serde_json::json!({
            "file": state.file_name(),
            "language": state.current_language,
            "report": report,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_report(&layout(report));
    }

    if let Some(path) = args.export {
        let options = ExportOptions {
            font_path: config.pdf_font.clone(),
        };
        let pdf = render_report_pdf(report, state.current_language, &options)?;
        tokio::fs::write(&path, &pdf.bytes)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        eprintln!("Saved {} page(s) to {}", pdf.pages, path.display());
    }

    Ok(())
}

fn exit_on_error(controller: &WorkflowController) {
    if let Some(error) = controller.state().last_error {
        eprintln!("Error: {}", error);
        std::process::exit(1);
    }
}

fn print_report(blocks: &[Block]) {
    for block in blocks {
        match block {
            Block::Title(text) => {
                println!("{}", text);
                println!("{}", "=".repeat(text.chars().count()));
            }
            Block::Disclaimer(text) => println!("{}", text),
            Block::Heading(text) => {
                println!();
                println!("{}", text);
                println!("{}", "-".repeat(text.chars().count()));
            }
            Block::Paragraph(text) => println!("{}", text),
            Block::Bullet(text) => println!("  \u{2022} {}", text),
            Block::Numbered(n, text) => println!("  {}. {}", n, text),
        }
    }
}
