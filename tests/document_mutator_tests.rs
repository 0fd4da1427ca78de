//! File-level tests for the document mutator: YAML and JSON files on disk,
//! failure atomicity and multi-path rewrites.

use image_update_controller::document::{
    apply_mutations, read_path, update_path, Mutation, MutationError, PathError, YamlCodec,
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const DEPLOYMENT_YAML: &str = r"apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
  labels:
    app: web
spec:
  replicas: 3
  template:
    spec:
      containers:
        - name: web
          image: registry.local:5000/team/web:2.4.1
        - name: proxy
          image: envoyproxy/envoy:v1.29.0
";

const VALUES_JSON: &str = r#"{
  "image": {
    "repository": "nginx",
    "tag": "1.20"
  },
  "replicaCount": 2,
  "ingress": {
    "enabled": false
  }
}
"#;

fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn read_file(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

fn yaml(text: &str) -> serde_yaml::Value {
    serde_yaml::from_str(text).unwrap()
}

#[tokio::test]
async fn updates_yaml_file_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_file(&dir, "deployment.yaml", DEPLOYMENT_YAML);

    update_path(&file, "spec.template.spec.containers[0].image", "2.5.0", true)
        .await
        .unwrap();

    let updated = yaml(&read_file(&file));
    assert_eq!(
        updated["spec"]["template"]["spec"]["containers"][0]["image"],
        "registry.local:5000/team/web:2.5.0"
    );
    assert_eq!(
        updated["spec"]["template"]["spec"]["containers"][1]["image"],
        "envoyproxy/envoy:v1.29.0"
    );
    assert_eq!(updated["spec"]["replicas"], 3);
    assert_eq!(updated["metadata"]["labels"]["app"], "web");
}

#[tokio::test]
async fn updates_json_file_and_keeps_json_format() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_file(&dir, "values.json", VALUES_JSON);

    update_path(&file, "image.tag", "1.21", false).await.unwrap();

    let updated: serde_json::Value = serde_json::from_str(&read_file(&file)).unwrap();
    assert_eq!(updated["image"]["tag"], "1.21");
    assert_eq!(updated["image"]["repository"], "nginx");
    assert_eq!(updated["replicaCount"], 2);
    assert_eq!(updated["ingress"]["enabled"], false);

    // Key order survives the rewrite
    let keys: Vec<&String> = updated.as_object().unwrap().keys().collect();
    assert_eq!(keys, ["image", "replicaCount", "ingress"]);
}

#[tokio::test]
async fn read_path_returns_current_value() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_file(&dir, "deployment.yml", DEPLOYMENT_YAML);

    let image = read_path(&file, "spec.template.spec.containers[1].image")
        .await
        .unwrap();
    assert_eq!(image.as_str(), Some("envoyproxy/envoy:v1.29.0"));

    let replicas = read_path(&file, "spec.replicas").await.unwrap();
    assert_eq!(replicas.kind(), "number");
}

#[tokio::test]
async fn missing_key_leaves_file_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_file(&dir, "deployment.yaml", DEPLOYMENT_YAML);

    let err = update_path(&file, "spec.strategy.type", "Recreate", false)
        .await
        .unwrap_err();

    assert!(matches!(err.path_error(), Some(PathError::NotFound { key }) if key == "strategy"));
    assert!(err.to_string().contains("deployment.yaml"), "{err}");
    assert_eq!(read_file(&file), DEPLOYMENT_YAML);
}

#[tokio::test]
async fn index_out_of_range_leaves_file_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_file(&dir, "deployment.yaml", DEPLOYMENT_YAML);

    let err = update_path(&file, "spec.template.spec.containers[5].image", "1.0", true)
        .await
        .unwrap_err();

    assert!(matches!(
        err.path_error(),
        Some(PathError::IndexOutOfRange { index: 5, len: 2 })
    ));
    assert_eq!(read_file(&file), DEPLOYMENT_YAML);
}

#[tokio::test]
async fn type_mismatch_leaves_file_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_file(&dir, "deployment.yaml", DEPLOYMENT_YAML);

    let err = update_path(&file, "spec.replicas.count", "4", false)
        .await
        .unwrap_err();

    assert!(matches!(
        err.path_error(),
        Some(PathError::TypeMismatch { .. })
    ));
    assert_eq!(read_file(&file), DEPLOYMENT_YAML);
}

#[tokio::test]
async fn malformed_path_is_rejected_without_reading() {
    let dir = tempfile::tempdir().unwrap();
    // The file does not exist; the path check must fail first
    let file = dir.path().join("absent.yaml");

    let err = update_path(&file, "spec[abc]", "1.0", false).await.unwrap_err();
    assert!(matches!(err.path_error(), Some(PathError::Malformed { .. })));
}

#[tokio::test]
async fn unreadable_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("absent.yaml");

    let err = update_path(&file, "spec.replicas", "4", false).await.unwrap_err();
    assert!(matches!(err, MutationError::Io { .. }), "{err}");
}

#[tokio::test]
async fn undecodable_file_is_left_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let broken = "spec: [unclosed\n";
    let file = write_file(&dir, "broken.yaml", broken);

    let err = update_path(&file, "spec", "1.0", false).await.unwrap_err();
    assert!(matches!(err, MutationError::Decode { file: Some(_), .. }), "{err}");
    assert_eq!(read_file(&file), broken);
}

#[test]
fn apply_mutations_is_all_or_nothing() {
    let mutations = [
        Mutation::new("spec.template.spec.containers[0].image", "2.5.0", true),
        Mutation::new("spec.template.spec.containers[2].image", "2.5.0", true),
    ];

    let err = apply_mutations(&YamlCodec, DEPLOYMENT_YAML.as_bytes(), &mutations).unwrap_err();
    assert!(matches!(
        err.path_error(),
        Some(PathError::IndexOutOfRange { index: 2, .. })
    ));
}

#[test]
fn apply_mutations_rewrites_every_path() {
    let mutations = [
        Mutation::new("spec.template.spec.containers[0].image", "2.5.0", true),
        Mutation::new("spec.template.spec.containers[1].image", "v1.30.1", true),
        Mutation::new("metadata.labels.version", "2.5.0", false),
    ];

    let updated = apply_mutations(&YamlCodec, DEPLOYMENT_YAML.as_bytes(), &mutations).unwrap();
    let updated = yaml(std::str::from_utf8(&updated).unwrap());

    let containers = &updated["spec"]["template"]["spec"]["containers"];
    assert_eq!(containers[0]["image"], "registry.local:5000/team/web:2.5.0");
    assert_eq!(containers[1]["image"], "envoyproxy/envoy:v1.30.1");
    // Terminal map keys are inserted when absent
    assert_eq!(updated["metadata"]["labels"]["version"], "2.5.0");
    assert_eq!(updated["metadata"]["labels"]["app"], "web");
}

#[test]
fn one_malformed_path_rejects_the_batch_before_decoding() {
    let mutations = [
        Mutation::new("spec.replicas", "4", false),
        Mutation::new("spec..replicas", "4", false),
    ];

    let err = apply_mutations(&YamlCodec, b"not: [valid", &mutations).unwrap_err();
    assert!(matches!(err.path_error(), Some(PathError::Malformed { .. })));
}

#[tokio::test]
async fn keys_colliding_as_strings_leave_file_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let mixed = "ports:\n  8080: http\n  \"8080\": web\nimage: nginx:1.20\n";
    let file = write_file(&dir, "ports.yaml", mixed);

    let err = update_path(&file, "image", "1.21", true).await.unwrap_err();
    assert!(matches!(err, MutationError::Decode { .. }), "{err}");
    assert_eq!(read_file(&file), mixed);
}

#[tokio::test]
async fn tag_only_splits_on_last_colon() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_file(&dir, "pod.yaml", "image: localhost:5000/nginx\n");

    update_path(&file, "image", "1.21", true).await.unwrap();

    assert_eq!(yaml(&read_file(&file))["image"], "localhost:1.21");
}
