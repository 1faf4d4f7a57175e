use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use slide_genie::logging::{self, LogOptions};

#[derive(Parser, Debug)]
#[command(
    name = "slide-genie",
    version,
    about = "Generate slide decks for every topic of a chapter with an LLM"
)]
struct Cli {
    /// Chapter name; also names the output folder and document
    #[arg(short = 'c', long = "chapter", default_value = slide_genie::DEFAULT_CHAPTER)]
    chapter: String,

    /// Topics file, one topic per line (default: <data_dir>/Topics.txt)
    #[arg(short = 't', long = "topics")]
    topics: Option<PathBuf>,

    /// Output directory for chapter folders (default: [paths].output_dir)
    #[arg(short = 'o', long = "output-dir")]
    output_dir: Option<PathBuf>,

    /// Base presentation template (default: [paths].template)
    #[arg(short = 'T', long = "template")]
    template: Option<PathBuf>,

    /// Model name (overrides [api].model)
    #[arg(short = 'm', long = "model")]
    model: Option<String>,

    /// API key (overrides environment variables)
    #[arg(short = 'k', long = "key")]
    key: Option<String>,

    /// Language of the generated slide content
    #[arg(short = 'l', long = "language")]
    language: Option<String>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<PathBuf>,

    /// Log file path
    #[arg(long = "log-file", default_value = logging::DEFAULT_LOG_FILE)]
    log_file: PathBuf,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,

    /// Write a blank widescreen template to this path and exit
    #[arg(long = "init-template")]
    init_template: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&LogOptions {
        verbose: cli.verbose,
        file: Some(cli.log_file.clone()),
    })?;

    if let Some(path) = cli.init_template.as_deref() {
        slide_genie::pptx::write_default_template(path)?;
        println!("Template written to {}", path.display());
        return Ok(());
    }

    let run = slide_genie::run(slide_genie::Config {
        chapter: cli.chapter,
        topics_file: cli.topics,
        output_dir: cli.output_dir,
        template: cli.template,
        model: cli.model,
        key: cli.key,
        language: cli.language,
        settings_path: cli.read_settings,
    })
    .await?;

    println!(
        "Generated {} topic(s), skipped {}, failed {}. Document: {}",
        run.generated.len(),
        run.skipped.len(),
        run.failed.len(),
        run.document.display()
    );
    for topic in &run.failed {
        println!("  placeholder deck written for: {}", topic);
    }
    Ok(())
}
