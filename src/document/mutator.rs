//! # Document Mutator
//!
//! Applies path mutations to whole documents. A document is either fully
//! rewritten or left untouched: every mutation is applied to an in-memory tree
//! and bytes are only produced once all of them succeeded.

use super::codec::{codec_for_path, CodecError, DocumentCodec};
use super::path::{self, PathError, PathExpr};
use super::value::Value;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Mutation failures, wrapped with the originating path and file when known
#[derive(Debug, Error)]
pub enum MutationError {
    #[error("path '{path}' in {}: {source}", .file.as_deref().unwrap_or("document"))]
    Path {
        path: String,
        file: Option<String>,
        #[source]
        source: PathError,
    },
    #[error("failed to decode {}: {source}", .file.as_deref().unwrap_or("document"))]
    Decode {
        file: Option<String>,
        #[source]
        source: CodecError,
    },
    #[error("failed to encode {}: {source}", .file.as_deref().unwrap_or("document"))]
    Encode {
        file: Option<String>,
        #[source]
        source: CodecError,
    },
    #[error("failed to access {file}: {source}")]
    Io {
        file: String,
        #[source]
        source: std::io::Error,
    },
}

impl MutationError {
    /// Attach a file identity to an error produced on raw bytes
    #[must_use]
    pub fn in_file(self, file: &str) -> Self {
        let file = Some(file.to_string());
        match self {
            MutationError::Path { path, source, .. } => MutationError::Path { path, file, source },
            MutationError::Decode { source, .. } => MutationError::Decode { file, source },
            MutationError::Encode { source, .. } => MutationError::Encode { file, source },
            io @ MutationError::Io { .. } => io,
        }
    }

    /// Underlying path engine error, if any
    pub fn path_error(&self) -> Option<&PathError> {
        match self {
            MutationError::Path { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// One path rewrite
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub path: String,
    pub value: String,
    pub image_tag_only: bool,
}

impl Mutation {
    pub fn new(path: impl Into<String>, value: impl Into<String>, image_tag_only: bool) -> Self {
        Self {
            path: path.into(),
            value: value.into(),
            image_tag_only,
        }
    }
}

fn path_err(path: &str, source: PathError) -> MutationError {
    MutationError::Path {
        path: path.to_string(),
        file: None,
        source,
    }
}

fn mutate_tree(root: &mut Value, mutation: &Mutation) -> Result<(), MutationError> {
    let expr = PathExpr::parse(&mutation.path).map_err(|e| path_err(&mutation.path, e))?;
    let (parents, terminal) = expr.split_terminal();
    let container = path::navigate_mut(root, parents).map_err(|e| path_err(&mutation.path, e))?;
    path::set_value(container, terminal, &mutation.value, mutation.image_tag_only)
        .map_err(|e| path_err(&mutation.path, e))
}

/// Apply several mutations to one document, all-or-nothing
///
/// Every path is checked against the grammar before the document is decoded.
pub fn apply_mutations(
    codec: &dyn DocumentCodec,
    document: &[u8],
    mutations: &[Mutation],
) -> Result<Vec<u8>, MutationError> {
    for mutation in mutations {
        path::validate(&mutation.path).map_err(|e| path_err(&mutation.path, e))?;
    }

    let mut root = codec
        .decode(document)
        .map_err(|source| MutationError::Decode { file: None, source })?;
    for mutation in mutations {
        mutate_tree(&mut root, mutation)?;
    }
    codec
        .encode(&root)
        .map_err(|source| MutationError::Encode { file: None, source })
}

/// Apply a single mutation to document bytes
pub fn apply_mutation(
    codec: &dyn DocumentCodec,
    document: &[u8],
    path: &str,
    new_value: &str,
    image_tag_only: bool,
) -> Result<Vec<u8>, MutationError> {
    apply_mutations(
        codec,
        document,
        &[Mutation::new(path, new_value, image_tag_only)],
    )
}

/// Read the value at `path` inside document bytes
pub fn value_at(codec: &dyn DocumentCodec, document: &[u8], path: &str) -> Result<Value, MutationError> {
    let steps = path::parse(path).map_err(|e| path_err(path, e))?;
    let root = codec
        .decode(document)
        .map_err(|source| MutationError::Decode { file: None, source })?;
    path::navigate(&root, &steps)
        .cloned()
        .map_err(|e| path_err(path, e))
}

/// Rewrite one path inside a file on disk
///
/// The file is only written after the in-memory transform succeeded.
pub async fn update_path(
    file: &Path,
    path: &str,
    new_value: &str,
    image_tag_only: bool,
) -> Result<(), MutationError> {
    let display = file.display().to_string();
    path::validate(path).map_err(|e| path_err(path, e).in_file(&display))?;

    let codec = codec_for_path(file);
    let original = tokio::fs::read(file).await.map_err(|source| MutationError::Io {
        file: display.clone(),
        source,
    })?;
    let updated = apply_mutation(codec, &original, path, new_value, image_tag_only)
        .map_err(|e| e.in_file(&display))?;

    tokio::fs::write(file, updated)
        .await
        .map_err(|source| MutationError::Io {
            file: display.clone(),
            source,
        })?;
    debug!(file = %file.display(), path = %path, codec = codec.name(), "Updated document path");
    Ok(())
}

/// Read the value at `path` inside a file on disk
pub async fn read_path(file: &Path, path: &str) -> Result<Value, MutationError> {
    let display = file.display().to_string();
    path::validate(path).map_err(|e| path_err(path, e).in_file(&display))?;

    let bytes = tokio::fs::read(file).await.map_err(|source| MutationError::Io {
        file: display.clone(),
        source,
    })?;
    value_at(codec_for_path(file), &bytes, path).map_err(|e| e.in_file(&display))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::codec::{JsonCodec, YamlCodec};

    const DEPLOYMENT: &str = r"spec:
  template:
    spec:
      containers:
        - name: web
          image: docker.io/nginx:1.20
        - name: sidecar
          image: busybox:1.36
";

    #[test]
    fn test_apply_mutation_image_tag_only() {
        let out = apply_mutation(
            &YamlCodec,
            DEPLOYMENT.as_bytes(),
            "spec.template.spec.containers[0].image",
            "1.21",
            true,
        )
        .unwrap();
        let value = value_at(&YamlCodec, &out, "spec.template.spec.containers[0].image").unwrap();
        assert_eq!(value.as_str(), Some("docker.io/nginx:1.21"));
        let sidecar = value_at(&YamlCodec, &out, "spec.template.spec.containers[1].image").unwrap();
        assert_eq!(sidecar.as_str(), Some("busybox:1.36"));
    }

    #[test]
    fn test_apply_mutation_is_idempotent() {
        let path = "spec.template.spec.containers[0].image";
        let once = apply_mutation(&YamlCodec, DEPLOYMENT.as_bytes(), path, "1.21", true).unwrap();
        let twice = apply_mutation(&YamlCodec, &once, path, "1.21", true).unwrap();
        assert_eq!(
            YamlCodec.decode(&once).unwrap(),
            YamlCodec.decode(&twice).unwrap()
        );
    }

    #[test]
    fn test_apply_mutations_is_all_or_nothing() {
        let mutations = vec![
            Mutation::new("spec.template.spec.containers[0].image", "1.21", true),
            Mutation::new("spec.template.spec.containers[5].image", "1.21", true),
        ];
        let err = apply_mutations(&YamlCodec, DEPLOYMENT.as_bytes(), &mutations).unwrap_err();
        assert_eq!(
            err.path_error(),
            Some(&PathError::IndexOutOfRange { index: 5, len: 2 })
        );
    }

    #[test]
    fn test_malformed_path_fails_before_decode() {
        // Not valid YAML either; the path error must win
        let err = apply_mutation(&YamlCodec, b"key: [unclosed", "spec..bad", "x", false).unwrap_err();
        assert!(matches!(
            err.path_error(),
            Some(PathError::Malformed { .. })
        ));
    }

    #[test]
    fn test_error_message_carries_file() {
        let err = apply_mutation(&YamlCodec, DEPLOYMENT.as_bytes(), "spec.missing.image", "x", false)
            .unwrap_err()
            .in_file("deploy.yaml");
        let message = err.to_string();
        assert!(message.contains("spec.missing.image"), "{message}");
        assert!(message.contains("deploy.yaml"), "{message}");
    }

    #[test]
    fn test_json_document() {
        let doc = br#"{"image": {"repository": "nginx", "tag": "1.20"}}"#;
        let out = apply_mutation(&JsonCodec, doc, "image.tag", "1.21", false).unwrap();
        assert_eq!(
            value_at(&JsonCodec, &out, "image.tag").unwrap().as_str(),
            Some("1.21")
        );
    }

    #[tokio::test]
    async fn test_update_path_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("deployment.yaml");
        tokio::fs::write(&file, DEPLOYMENT).await.unwrap();

        update_path(&file, "spec.template.spec.containers[0].image", "1.21", true)
            .await
            .unwrap();

        let value = read_path(&file, "spec.template.spec.containers[0].image")
            .await
            .unwrap();
        assert_eq!(value.as_str(), Some("docker.io/nginx:1.21"));
    }

    #[tokio::test]
    async fn test_update_path_failure_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("deployment.yaml");
        tokio::fs::write(&file, DEPLOYMENT).await.unwrap();

        let err = update_path(&file, "spec.template.spec.initContainers[0].image", "1.21", true)
            .await
            .unwrap_err();
        assert!(matches!(err, MutationError::Path { file: Some(_), .. }));
        assert_eq!(tokio::fs::read_to_string(&file).await.unwrap(), DEPLOYMENT);
    }

    #[tokio::test]
    async fn test_update_path_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = update_path(&dir.path().join("absent.yaml"), "a.b", "1", false)
            .await
            .unwrap_err();
        assert!(matches!(err, MutationError::Io { .. }));
    }
}
