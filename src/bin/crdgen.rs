//! Prints the `ImageUpdateConfig` CustomResourceDefinition as YAML.
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/imageupdateconfig.yaml
//! ```

use anyhow::{Context, Result};
use image_update_controller::crd::ImageUpdateConfig;
use kube::CustomResourceExt;

fn main() -> Result<()> {
    let crd = ImageUpdateConfig::crd();
    let yaml = serde_yaml::to_string(&crd).context("Failed to serialize CRD")?;
    print!("{yaml}");
    Ok(())
}
