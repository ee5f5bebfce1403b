// tests/pipeline_loading.rs

use std::fs;
use std::io::Write;

use tempfile::{NamedTempFile, TempDir};

use assetdag::errors::AssetdagError;
use assetdag::pipeline::{load_and_validate, loader::PIPELINE_FILE_NAME};

fn write_pipeline(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

#[test]
fn cycle_returns_structured_error() {
    let file = write_pipeline(
        r#"
[[asset]]
name = "A"
type = "empty"
depends = ["B"]

[[asset]]
name = "B"
type = "empty"
depends = ["A"]
"#,
    );

    match load_and_validate(file.path()) {
        Err(AssetdagError::DagCycle(msg)) => {
            assert!(msg.contains("cycle detected"));
            assert!(msg.contains('A') || msg.contains('B'));
        }
        Err(e) => panic!("Expected DagCycle error, got: {e:?}"),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn unknown_dependency_returns_config_error() {
    let file = write_pipeline(
        r#"
[[asset]]
name = "A"
type = "empty"
depends = ["NonExistent"]
"#,
    );

    match load_and_validate(file.path()) {
        Err(AssetdagError::ConfigError(msg)) => {
            assert!(msg.contains("unknown dependency"));
            assert!(msg.contains("NonExistent"));
        }
        Err(e) => panic!("Expected ConfigError, got: {e:?}"),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn invalid_toml_returns_toml_error() {
    let file = write_pipeline("[[asset]\nname = ");
    assert!(matches!(
        load_and_validate(file.path()),
        Err(AssetdagError::TomlError(_))
    ));
}

#[test]
fn missing_file_returns_io_error() {
    let dir = TempDir::new().unwrap();
    // Directory without pipeline.toml.
    assert!(matches!(
        load_and_validate(dir.path()),
        Err(AssetdagError::IoError(_))
    ));
}

#[test]
fn directory_resolves_to_pipeline_toml_and_sets_root() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join(PIPELINE_FILE_NAME),
        r#"
[pipeline]
name = "analytics"
retries = 1
concurrency = 3

[environment.prod]
production = true

[environment.dev]
variables = { SCHEMA = "dev" }

[[asset]]
name = "raw_orders"
type = "shell"
cmd = "echo raw"
tags = ["core"]

[[asset]]
name = "orders"
type = "shell"
cmd = "echo orders"
depends = ["raw_orders"]
retries = 3
materialization = { type = "table", strategy = "merge" }

[[asset.columns]]
name = "id"
type = "integer"
checks = [{ name = "not_null", cmd = "true" }]

[[asset.custom_checks]]
name = "Row count"
cmd = "true"
"#,
    )
    .unwrap();

    let pipeline = load_and_validate(dir.path()).unwrap();

    assert_eq!(pipeline.name(), "analytics");
    assert_eq!(pipeline.settings.concurrency, Some(3));
    assert_eq!(pipeline.root_dir.as_deref(), Some(dir.path()));
    assert!(pipeline.environments["prod"].production);
    assert_eq!(pipeline.environments["dev"].variables["SCHEMA"], "dev");

    let names: Vec<&str> = pipeline.assets.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["raw_orders", "orders"]);

    let orders = pipeline.asset("orders").unwrap();
    assert_eq!(orders.effective_retries(&pipeline.settings), 3);
    assert_eq!(
        pipeline.asset("raw_orders").unwrap().effective_retries(&pipeline.settings),
        1
    );
    assert_eq!(orders.columns[0].checks[0].cmd.as_deref(), Some("true"));
    assert_eq!(orders.materialization.as_ref().unwrap().kind, "table");
}

#[test]
fn duplicate_column_check_is_rejected() {
    let file = write_pipeline(
        r#"
[[asset]]
name = "A"
type = "empty"

[[asset.columns]]
name = "id"
checks = [{ name = "unique" }, { name = "unique" }]
"#,
    );

    match load_and_validate(file.path()) {
        Err(AssetdagError::ConfigError(msg)) => assert!(msg.contains("duplicate check")),
        other => panic!("Expected ConfigError, got: {other:?}"),
    }
}
