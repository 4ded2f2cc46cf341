//! JSON Schema generation for the public schema types

use anyhow::{Context, Result};
use schemars::schema::RootSchema;
use schemars::schema_for;
use schema::{DaemonConfig, Message, ProcessInfo, Response};
use std::fs;
use std::path::{Path, PathBuf};

fn schemas() -> Vec<(&'static str, RootSchema)> {
    vec![
        ("message", schema_for!(Message)),
        ("response", schema_for!(Response)),
        ("process-info", schema_for!(ProcessInfo)),
        ("daemon-config", schema_for!(DaemonConfig)),
    ]
}

/// Write one `<name>.schema.json` per type into `out`
pub fn run(out: &Path) -> Result<()> {
    for path in write_all(out)? {
        println!("wrote {}", path.display());
    }
    Ok(())
}

fn write_all(out: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(out).with_context(|| format!("creating {}", out.display()))?;

    let mut written = Vec::new();
    for (name, schema) in schemas() {
        let path = out.join(format!("{name}.schema.json"));
        let mut json = serde_json::to_string_pretty(&schema)
            .with_context(|| format!("serializing {name} schema"))?;
        json.push('\n');
        fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}
