//! Shreds one incoming record into rows across a stream's table tree.

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use sluice_core::message::RecordMessage;
use sluice_core::schema::PARENT_CHILD_SPLITTER;
use sluice_core::{StreamBinding, EMITTED_AT_COLUMN, IDENTITY_COLUMN};

use crate::spool::RowSpool;

/// Shreds `record` into every table of `stream`, appending projected rows to
/// the spools (keyed by final-table full name).
///
/// The payload is wrapped under the stream name so the root traverses like
/// any nested level. Tables are visited shortest dotted path first, and
/// identities are written back into the traversed payload, so parent rows
/// carry their identity before any child pass needs it for a reference key.
pub fn shred_record(
    stream: &StreamBinding,
    record: &RecordMessage,
    spools: &mut HashMap<String, RowSpool>,
) -> Result<()> {
    let mut wrapped = Value::Object(Map::from_iter([(
        stream.name.clone(),
        record.data.clone(),
    )]));
    let emitted_at = render_emitted_at(record.emitted_at)?;

    let mut paths: Vec<&String> = stream.final_tables.keys().collect();
    paths.sort_by_key(|key| key.split(PARENT_CHILD_SPLITTER).count());

    for path in paths {
        let table = &stream.final_tables[path];
        let segments: Vec<&str> = path.split(PARENT_CHILD_SPLITTER).collect();
        let reference_key = table.reference_key().map(|field| field.name);
        let rows = collect_target_rows(&mut wrapped, &segments, reference_key.as_deref());
        if rows.is_empty() {
            continue;
        }

        let field_names = table.field_names();
        let declared_keys: Vec<String> = table
            .primary_keys
            .iter()
            .filter(|key| key.as_str() != IDENTITY_COLUMN)
            .cloned()
            .collect();
        let hashing_keys = if declared_keys.is_empty() {
            field_names.clone()
        } else {
            declared_keys
        };

        let spool = spools
            .get_mut(&table.full_name())
            .with_context(|| format!("no spool allocated for table {}", table.full_name()))?;

        for row in rows {
            let Value::Object(object) = row else {
                continue;
            };
            if !object.contains_key(IDENTITY_COLUMN) {
                let identity = row_identity(object, &hashing_keys);
                object.insert(IDENTITY_COLUMN.to_string(), Value::String(identity));
            }
            object.insert(
                EMITTED_AT_COLUMN.to_string(),
                Value::String(emitted_at.clone()),
            );

            let cells: Vec<String> = field_names
                .iter()
                .map(|name| csv_cell(object.get(name)))
                .collect();
            spool.write(&cells)?;
        }
    }

    Ok(())
}

/// Walks `root` along `segments`, flattening arrays and dropping nulls at
/// every hop. On the final hop each surviving row gets `reference_key` set to
/// its parent's identity, when the target table has a parent.
fn collect_target_rows<'a>(
    root: &'a mut Value,
    segments: &[&str],
    reference_key: Option<&str>,
) -> Vec<&'a mut Value> {
    let mut current: Vec<&'a mut Value> = vec![root];

    for (depth, segment) in segments.iter().enumerate() {
        let last = depth + 1 == segments.len();
        let mut next: Vec<&'a mut Value> = Vec::new();

        for parent in current {
            let parent_identity = parent
                .get(IDENTITY_COLUMN)
                .cloned()
                .unwrap_or(Value::Null);
            let Some(child) = parent.get_mut(*segment) else {
                continue;
            };
            match child {
                Value::Null => {}
                Value::Array(items) => {
                    for item in items.iter_mut() {
                        if item.is_null() {
                            continue;
                        }
                        if last {
                            attach_reference(item, reference_key, &parent_identity);
                        }
                        next.push(item);
                    }
                }
                other => {
                    if last {
                        attach_reference(other, reference_key, &parent_identity);
                    }
                    next.push(other);
                }
            }
        }

        current = next;
    }

    current
}

fn attach_reference(row: &mut Value, reference_key: Option<&str>, parent_identity: &Value) {
    if let (Some(key), Some(object)) = (reference_key, row.as_object_mut()) {
        object.insert(key.to_string(), parent_identity.clone());
    }
}

/// Last 32 hex characters of SHA-256 over the concatenated hashing-key values.
fn row_identity(object: &Map<String, Value>, hashing_keys: &[String]) -> String {
    let mut hasher = Sha256::new();
    for key in hashing_keys {
        hasher.update(hash_text(object.get(key)).as_bytes());
    }
    let digest = hex::encode(hasher.finalize());
    digest[digest.len() - 32..].to_string()
}

/// Hash rendering of one value. Missing keys and nulls render as the literal
/// `"None"`; strings contribute their raw text; everything else contributes
/// its JSON text.
fn hash_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "None".to_string(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

/// CSV rendering of one value. Missing keys and falsy values serialize as
/// empty cells; arrays and objects serialize as JSON text.
fn csv_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::Bool(false)) => String::new(),
        Some(Value::Bool(true)) => "true".to_string(),
        Some(Value::Number(number)) if number.as_f64() == Some(0.0) => String::new(),
        Some(Value::Number(number)) => number.to_string(),
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(items)) if items.is_empty() => String::new(),
        Some(Value::Object(map)) if map.is_empty() => String::new(),
        Some(other) => other.to_string(),
    }
}

/// ISO-8601 seconds-precision UTC rendering of an epoch-milliseconds stamp.
fn render_emitted_at(emitted_at_ms: i64) -> Result<String> {
    let timestamp = Utc
        .timestamp_millis_opt(emitted_at_ms)
        .single()
        .with_context(|| format!("emitted_at out of range: {emitted_at_ms}"))?;
    Ok(timestamp.format("%Y-%m-%dT%H:%M:%S").to_string())
}
