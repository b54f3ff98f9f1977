#![allow(dead_code)]

use std::fs;
use std::path::Path;

use quarry_common::config::{AppConfig, DiskConfig, SourceKind};
use quarry_common::spec::{Row, ScalarValue};

/// Writes one JSON Lines blob below `root`, creating parent directories.
pub fn write_blob(root: &Path, path: &str, lines: &[&str]) {
    let path = root.join(path);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, lines.join("\n")).unwrap();
}

/// A configuration that serves `warehouse.*` relations from a local directory.
pub fn disk_config(root: &Path) -> AppConfig {
    let mut config = AppConfig::default().with_relation("warehouse", SourceKind::Disk);
    config.disk = Some(DiskConfig {
        root: Some(root.to_string_lossy().to_string()),
    });
    config
}

pub fn column(rows: &[Row], name: &str) -> Vec<ScalarValue> {
    rows.iter()
        .map(|row| row.get(name).cloned().unwrap_or(ScalarValue::Null))
        .collect()
}

pub fn strings(values: &[&str]) -> Vec<ScalarValue> {
    values.iter().map(|x| ScalarValue::from(*x)).collect()
}
