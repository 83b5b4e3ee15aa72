//! certrender - certificate PDF renderer
//!
//! Renders approved certificate requests to PDF files, checks certificate
//! hashes against the verification endpoint, and lists the template table.

use std::path::PathBuf;

use anyhow::{Context, Result};
use certrender::{Renderer, RendererConfig, VerificationOutcome, Verifier};
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// certrender - certificate PDF renderer
#[derive(Parser, Debug)]
#[command(name = "certrender")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base URL of the REST API
    #[arg(long, env = "CERTRENDER_API_BASE")]
    api_base: Option<String>,

    /// Base URL serving /templates
    #[arg(long, env = "CERTRENDER_ASSETS_BASE")]
    assets_base: Option<String>,

    /// Bearer token for authenticated endpoints
    #[arg(long, env = "CERTRENDER_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Directory PDFs are written to
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Font file used for certificate text
    #[arg(long)]
    font: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render certificate requests to PDF
    Render {
        /// Request ids to render; they are rendered concurrently
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Look a certificate hash up on the verification endpoint
    Verify {
        /// Certificate content hash
        hash: String,
    },

    /// List the certificate type to template table
    Templates,
}

impl Cli {
    fn load_config(&self) -> Result<RendererConfig> {
        let mut config = match &self.config {
            Some(path) => RendererConfig::from_file(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => RendererConfig::default(),
        };
        if let Some(api_base) = &self.api_base {
            config.api_base_url = api_base.clone();
        }
        if let Some(assets_base) = &self.assets_base {
            config.assets_base_url = assets_base.clone();
        }
        if let Some(token) = &self.token {
            config.token = Some(token.clone());
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(font) = &self.font {
            config.font_path = Some(font.clone());
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = cli.load_config()?;
    match cli.command {
        Commands::Render { ids } => render(config, ids).await,
        Commands::Verify { hash } => verify(config, &hash).await,
        Commands::Templates => {
            for (certificate_type, file) in config.templates.iter() {
                println!("{:<36} {}", certificate_type, file);
            }
            Ok(())
        }
    }
}

async fn render(config: RendererConfig, ids: Vec<String>) -> Result<()> {
    let renderer = Renderer::new(config).context("failed to set up renderer")?;
    let handles: Vec<_> = ids.iter().map(|id| renderer.start(id.as_str())).collect();

    let mut failed = 0usize;
    for handle in handles {
        let id = handle.request_id().to_string();
        let mut stages = handle.subscribe();
        let progress = tokio::spawn(async move {
            while stages.changed().await.is_ok() {
                let stage = *stages.borrow_and_update();
                log::debug!("{}: {}", id, stage);
                if stage.is_finished() {
                    break;
                }
            }
        });
        let request_id = handle.request_id().to_string();
        match handle.wait().await {
            Ok(download) => println!(
                "{}: saved {} ({} bytes, {}x{} px)",
                request_id,
                download.path.display(),
                download.size,
                download.bitmap_width,
                download.bitmap_height
            ),
            Err(e) => {
                failed += 1;
                eprintln!("{}: {}", request_id, e.user_message());
            }
        }
        progress.abort();
    }

    if failed > 0 {
        anyhow::bail!("{} of {} downloads failed", failed, ids.len());
    }
    Ok(())
}

async fn verify(config: RendererConfig, hash: &str) -> Result<()> {
    let client = certrender::ApiClient::new(&config)?;
    let outcome = Verifier::new(client).verify(hash).await?;
    match outcome {
        VerificationOutcome::Valid { record, block } => {
            println!("Certificate verified");
            println!("Hash:        {}", hash);
            println!("Student:     {}", record.student_name.unwrap_or_default());
            println!("Institute:   {}", record.institute_name.unwrap_or_default());
            println!("Certificate: {}", record.template_name.unwrap_or_default());
            println!("Type:        {}", record.template_type.unwrap_or_default());
            println!("Issued on:   {}", record.request_date.unwrap_or_default());
            println!("Block hash:  {}", block.hash);
            println!("Previous:    {}", block.previous_hash);
            println!("Timestamp:   {}", block.timestamp);
            Ok(())
        }
        VerificationOutcome::Invalid { reason } => {
            anyhow::bail!("verification failed: {}", reason)
        }
    }
}
