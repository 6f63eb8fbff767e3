use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use faceswap_core::types::SWAP_ENDPOINT;
use faceswap_core::workflow::error_message_from_body;
use faceswap_core::{ImageRole, SelectedImage, SubmitRequest, SwapResponse, Workflow};
use reqwest::multipart::{Form, Part};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "faceswap", about = "Face swap client for faceswapd")]
struct Cli {
    /// Base URL of the faceswapd instance
    #[arg(long, env = "FACESWAP_SERVER", default_value = "http://127.0.0.1:3000")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Swap the face from SOURCE into TARGET
    Swap {
        /// Image providing the face
        #[arg(short, long)]
        source: PathBuf,
        /// Image receiving the face
        #[arg(short, long)]
        target: PathBuf,
        /// Blend strength, 0-100
        #[arg(long, default_value_t = 50, allow_negative_numbers = true)]
        blend: i64,
        /// Face alignment, 0-100
        #[arg(long, default_value_t = 50, allow_negative_numbers = true)]
        alignment: i64,
        /// Save the result to this path
        #[arg(long, conflicts_with = "download")]
        save: Option<PathBuf>,
        /// Save the result as face-swap-result.jpg in the current directory
        #[arg(long)]
        download: bool,
    },
    /// Show daemon health
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Swap {
            source,
            target,
            blend,
            alignment,
            save,
            download,
        } => {
            let mut workflow = Workflow::new();
            workflow.select_source(load_image(&source)?)?;
            workflow.select_target(load_image(&target)?)?;
            workflow.set_blend_strength(blend);
            workflow.set_face_alignment(alignment);

            let request = workflow.begin_submit()?;
            println!("Processing...");

            match submit(&client, &server, &request).await {
                Ok(response) => {
                    workflow.finish_success(&response, chrono::Utc::now().timestamp_millis());
                }
                Err(message) => {
                    workflow.finish_failure(message);
                }
            }

            if let Some(message) = workflow.last_error() {
                bail!("An error occurred while processing the images: {message}");
            }
            let Some(result) = workflow.result() else {
                bail!("no result recorded");
            };

            println!("Result: {server}{}", result.display_url);
            if !result.message.trim().is_empty() {
                println!("{}", result.message.trim_end());
            }

            let destination = match (save, download) {
                (Some(path), _) => Some(path),
                (None, true) => Some(PathBuf::from(workflow.download_file_name())),
                (None, false) => None,
            };
            if let Some(path) = destination {
                fetch_result(&client, &server, &result.display_url, &path).await?;
                println!("Saved to {}", path.display());
            }
        }
        Commands::Health => {
            let body: serde_json::Value = client
                .get(format!("{server}/health"))
                .send()
                .await
                .context("faceswapd: not reachable")?
                .error_for_status()?
                .json()
                .await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
    }

    Ok(())
}

fn load_image(path: &Path) -> Result<SelectedImage> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let image = SelectedImage::from_bytes(file_name, bytes)?;
    tracing::debug!(
        file = %image.file_name,
        format = ?image.format,
        dimensions = ?image.dimensions,
        "image selected"
    );
    Ok(image)
}

/// Post the form once. Every failure is reduced to a user-facing message.
async fn submit(
    client: &reqwest::Client,
    server: &str,
    request: &SubmitRequest,
) -> std::result::Result<SwapResponse, String> {
    let form = build_form(request).map_err(|e| e.to_string())?;

    let response = client
        .post(format!("{server}{SWAP_ENDPOINT}"))
        .multipart(form)
        .send()
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "request failed");
            e.to_string()
        })?;

    let status = response.status();
    let body = response.text().await.map_err(|e| e.to_string())?;
    if !status.is_success() {
        tracing::debug!(%status, body = %body, "endpoint returned error");
        return Err(error_message_from_body(&body));
    }
    serde_json::from_str(&body).map_err(|e| format!("unexpected response: {e}"))
}

/// One multipart part, before it is handed to reqwest.
#[derive(Debug, PartialEq)]
enum FormField<'a> {
    File {
        name: &'static str,
        file_name: &'a str,
        mime: &'static str,
        bytes: &'a [u8],
    },
    Text {
        name: &'static str,
        value: String,
    },
}

/// Both image parts followed by both parameters, in form order.
fn form_fields(request: &SubmitRequest) -> Vec<FormField<'_>> {
    let mut fields = Vec::with_capacity(4);
    for (role, image) in [
        (ImageRole::Source, &request.source),
        (ImageRole::Target, &request.target),
    ] {
        fields.push(FormField::File {
            name: role.field_name(),
            file_name: &image.file_name,
            mime: image.mime_type(),
            bytes: &image.bytes,
        });
    }
    for (name, value) in request.text_fields() {
        fields.push(FormField::Text { name, value });
    }
    fields
}

fn build_form(request: &SubmitRequest) -> reqwest::Result<Form> {
    let mut form = Form::new();
    for field in form_fields(request) {
        form = match field {
            FormField::File {
                name,
                file_name,
                mime,
                bytes,
            } => {
                let part = Part::bytes(bytes.to_vec())
                    .file_name(file_name.to_string())
                    .mime_str(mime)?;
                form.part(name, part)
            }
            FormField::Text { name, value } => form.text(name, value),
        };
    }
    Ok(form)
}

async fn fetch_result(
    client: &reqwest::Client,
    server: &str,
    display_url: &str,
    path: &Path,
) -> Result<()> {
    let bytes = client
        .get(format!("{server}{display_url}"))
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;
    tokio::fs::write(path, &bytes)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
