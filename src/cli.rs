//! # IUCCTL CLI
//!
//! Command-line interface for the Image Update Controller.
//!
//! ## Usage
//!
//! ```bash
//! # List all ImageUpdateConfig resources
//! iucctl list
//!
//! # Show status of an ImageUpdateConfig
//! iucctl status --namespace default --name nginx
//!
//! # Make the next pass due immediately
//! iucctl reconcile --namespace default --name nginx
//!
//! # Try a path against a local file without writing it
//! iucctl check --file deployment.yaml --path 'spec.template.spec.containers[0].image' \
//!     --value 1.21 --image-tag-only
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use image_update_controller::constants::CONDITION_READY;
use image_update_controller::crd::ImageUpdateConfig;
use image_update_controller::document::{self, codec_for_path, Value};
use kube::{
    api::{Api, ListParams, Patch, PatchParams},
    Client,
};
use serde_json::json;
use std::path::PathBuf;

/// Image Update Controller CLI
#[derive(Parser)]
#[command(name = "iucctl")]
#[command(about = "Image Update Controller CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List ImageUpdateConfig resources
    List {
        /// Namespace to list resources in (defaults to all namespaces)
        #[arg(short, long)]
        namespace: Option<String>,
    },
    /// Show status of an ImageUpdateConfig resource as YAML
    Status {
        /// Name of the ImageUpdateConfig resource
        #[arg(long)]
        name: String,

        /// Namespace of the ImageUpdateConfig resource
        #[arg(short, long, default_value = "default")]
        namespace: String,
    },
    /// Clear the last check time so the next pass runs immediately
    Reconcile {
        /// Name of the ImageUpdateConfig resource
        #[arg(long)]
        name: String,

        /// Namespace of the ImageUpdateConfig resource
        #[arg(short, long, default_value = "default")]
        namespace: String,
    },
    /// Validate a path against a local YAML/JSON file
    Check {
        /// File to read
        #[arg(short, long)]
        file: PathBuf,

        /// Path expression, e.g. `spec.template.spec.containers[0].image`
        #[arg(short, long)]
        path: String,

        /// Print the document rewritten with this value (the file is not modified)
        #[arg(long)]
        value: Option<String>,

        /// Replace only the tag part of an image reference
        #[arg(long)]
        image_tag_only: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "iucctl=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check {
            file,
            path,
            value,
            image_tag_only,
        } => check_command(&file, &path, value.as_deref(), image_tag_only).await,
        Commands::List { namespace } => list_command(client().await?, namespace).await,
        Commands::Status { name, namespace } => {
            status_command(client().await?, &name, &namespace).await
        }
        Commands::Reconcile { name, namespace } => {
            reconcile_command(client().await?, &name, &namespace).await
        }
    }
}

async fn client() -> Result<Client> {
    Client::try_default()
        .await
        .context("Failed to create Kubernetes client. Ensure kubeconfig is configured.")
}

/// List ImageUpdateConfig resources with their tags and readiness
async fn list_command(client: Client, namespace: Option<String>) -> Result<()> {
    let api: Api<ImageUpdateConfig> = if let Some(ns) = namespace {
        println!("Listing ImageUpdateConfig resources in namespace '{ns}'...");
        Api::namespaced(client, &ns)
    } else {
        println!("Listing ImageUpdateConfig resources in all namespaces...");
        Api::all(client)
    };

    let configs = api
        .list(&ListParams::default())
        .await
        .context("Failed to list ImageUpdateConfig resources")?;

    if configs.items.is_empty() {
        println!("No ImageUpdateConfig resources found.");
        return Ok(());
    }

    println!(
        "\n{:<30} {:<20} {:<20} {:<20} {:<8}",
        "NAME", "NAMESPACE", "CURRENT TAG", "LATEST TAG", "READY"
    );
    println!("{}", "-".repeat(100));

    for config in configs.items {
        let name = config.metadata.name.as_deref().unwrap_or("<unknown>");
        let ns = config.metadata.namespace.as_deref().unwrap_or("<unknown>");
        let status = config.status.unwrap_or_default();
        let ready = status
            .condition(CONDITION_READY)
            .map_or("Unknown", |c| c.status.as_str());
        let ready = if config.spec.disabled { "Disabled" } else { ready };

        println!(
            "{:<30} {:<20} {:<20} {:<20} {:<8}",
            name,
            ns,
            status.current_tag.as_deref().unwrap_or("-"),
            status.latest_tag.as_deref().unwrap_or("-"),
            ready
        );
    }

    Ok(())
}

/// Print the status subresource as YAML
async fn status_command(client: Client, name: &str, namespace: &str) -> Result<()> {
    let api: Api<ImageUpdateConfig> = Api::namespaced(client, namespace);
    let config = api
        .get_status(name)
        .await
        .with_context(|| format!("Failed to get ImageUpdateConfig '{namespace}/{name}'"))?;

    match config.status {
        Some(status) => {
            let yaml = serde_yaml::to_string(&status).context("Failed to render status")?;
            print!("{yaml}");
        }
        None => println!("No status available (resource may not have been reconciled yet)"),
    }
    Ok(())
}

/// Clear `status.lastChecked` so the interval gate lets the next pass through
async fn reconcile_command(client: Client, name: &str, namespace: &str) -> Result<()> {
    println!("Triggering reconciliation for ImageUpdateConfig '{namespace}/{name}'...");

    let api: Api<ImageUpdateConfig> = Api::namespaced(client, namespace);
    let patch = json!({ "status": { "lastChecked": null } });
    api.patch_status(name, &PatchParams::apply("iucctl"), &Patch::Merge(&patch))
        .await
        .with_context(|| format!("Failed to trigger reconciliation for '{namespace}/{name}'"))?;

    println!("Reconciliation triggered for {namespace}/{name}");
    println!("The controller will check the repository on its next pass.");
    Ok(())
}

fn render_value(value: &Value) -> Result<String> {
    match value.as_str() {
        Some(s) => Ok(s.to_string()),
        None => Ok(serde_yaml::to_string(value)
            .context("Failed to render value")?
            .trim_end()
            .to_string()),
    }
}

/// Validate `path`, print its current value and optionally the rewritten document
async fn check_command(
    file: &std::path::Path,
    path: &str,
    value: Option<&str>,
    image_tag_only: bool,
) -> Result<()> {
    document::validate(path).with_context(|| format!("Invalid path '{path}'"))?;

    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let codec = codec_for_path(file);

    let current = document::value_at(codec, &bytes, path)
        .map_err(|e| e.in_file(&file.display().to_string()))?;
    println!("Current value: {}", render_value(&current)?);

    if let Some(new_value) = value {
        let updated = document::apply_mutation(codec, &bytes, path, new_value, image_tag_only)
            .map_err(|e| e.in_file(&file.display().to_string()))?;
        println!("---");
        print!("{}", String::from_utf8_lossy(&updated));
    }
    Ok(())
}
