//! Command implementations.

pub mod check;
pub mod convert;
pub mod fix_ids;
pub mod init_config;
pub mod remap;

pub use self::check::{check_bundle, execute_check, CheckFindings};
pub use self::convert::{convert_text, execute_convert};
pub use self::fix_ids::execute_fix_ids;
pub use self::init_config::execute_init_config;
pub use self::remap::execute_remap;

use crate::error::{CliError, Result};
use serde_json::Value;
use std::fs;
use std::io::{self, Read};
use std::path::Path;
use stixweave_domain::{Bundle, StixObject};

/// Read a file, or stdin when `input` is `-`.
pub fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

/// Parse a bundle, or a bare array of objects.
///
/// A bundle without an id gets a fresh one; the id normalizer repairs
/// malformed ones.
pub fn parse_bundle(json: &str) -> Result<Bundle> {
    let (bundle_id, items) = match serde_json::from_str::<Value>(json)? {
        Value::Array(items) => (None, items),
        Value::Object(mut map) => {
            let id = map.get("id").and_then(Value::as_str).map(str::to_string);
            match map.remove("objects") {
                Some(Value::Array(items)) => (id, items),
                _ => {
                    return Err(CliError::InvalidInput(
                        "expected a bundle with an 'objects' array".to_string(),
                    ))
                }
            }
        }
        _ => {
            return Err(CliError::InvalidInput(
                "expected a bundle or an array of objects".to_string(),
            ))
        }
    };

    let objects = items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| {
            StixObject::from_value(item)
                .map_err(|e| CliError::InvalidInput(format!("object {}: {}", idx, e)))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut bundle = Bundle::new(objects);
    if let Some(id) = bundle_id {
        bundle.id = id;
    }
    Ok(bundle)
}

/// Write a bundle as pretty JSON to `output`, or stdout.
pub fn write_bundle(bundle: &Bundle, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(bundle)?;
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, json)?;
        }
        None => println!("{}", json),
    }
    Ok(())
}
