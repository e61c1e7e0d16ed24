//! `rollcall records`: validate exported attendance records against the embedded schema.

use anyhow::{Context, Result};
use serde_json::Value as JsonValue;
use std::fs;
use std::path::Path;
use tracing::debug;

const ATTENDANCE_RECORD_SCHEMA: &str = include_str!("../../../../schemas/AttendanceRecord.schema.json");

/// Schema violations per record, keyed by the record's position in the file.
pub fn validate(document: &JsonValue) -> Result<Vec<(usize, Vec<String>)>> {
    let schema: JsonValue =
        serde_json::from_str(ATTENDANCE_RECORD_SCHEMA).context("embedded record schema is not valid JSON")?;
    let validator = jsonschema::draft202012::options()
        .build(&schema)
        .map_err(|err| anyhow::anyhow!("embedded record schema does not compile: {}", err))?;

    let records: Vec<&JsonValue> = match document {
        JsonValue::Array(items) => items.iter().collect(),
        other => vec![other],
    };

    debug!(records = records.len(), "validating records");
    let mut failures = Vec::new();
    for (index, record) in records.into_iter().enumerate() {
        let errors: Vec<String> = validator
            .iter_errors(record)
            .map(|err| format!("{} at {}", err, err.instance_path()))
            .collect();
        if !errors.is_empty() {
            failures.push((index, errors));
        }
    }
    Ok(failures)
}

pub fn run(path: &Path) -> Result<()> {
    let content = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let document: JsonValue =
        serde_json::from_str(&content).with_context(|| format!("{} is not valid JSON", path.display()))?;

    let failures = validate(&document)?;
    if failures.is_empty() {
        println!("All records match the schema.");
        return Ok(());
    }

    for (index, errors) in &failures {
        println!("record {}:", index);
        for error in errors {
            println!("  - {}", error);
        }
    }
    anyhow::bail!("{} record(s) failed schema validation", failures.len())
}
