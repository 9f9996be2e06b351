//! Optional JSON shell configuration.
//!
//! ```json
//! {
//!     "shell": "2x4x4x4x8x8x8",
//!     "margin": 1.0,
//!     "growth_law": "geometric",
//!     "growth_rate": 2.0,
//!     "tolerance": 1e-8,
//!     "mark_outer_boundary": true,
//!     "scale": 1e-9
//! }
//! ```
//!
//! Every key is optional. Command-line flags take precedence.

use std::path::Path;

use json::JsonValue;
use tracing::warn;

use crate::cli::{parse_shell_spec, ShellRequest};
use crate::error::{Result, ShellmeshError};
use crate::io::read_source;
use crate::mesher::{GrowthLaw, DEFAULT_GROWTH_RATIO};

const KNOWN_KEYS: [&str; 7] = [
    "shell",
    "margin",
    "growth_law",
    "growth_rate",
    "tolerance",
    "mark_outer_boundary",
    "scale",
];

const DEFAULT_GROWTH_STEP: f64 = 1.0;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShellConfig {
    pub shell: Option<ShellRequest>,
    pub margin: Option<f64>,
    pub growth: Option<GrowthLaw>,
    pub tolerance: Option<f64>,
    pub mark_outer_boundary: Option<bool>,
    pub scale: Option<f64>,
}

/// Reads and parses a configuration file
///
/// # Arguments
/// * `path` - The path to the JSON file
pub fn load_config_file(path: &Path) -> Result<ShellConfig> {
    let contents = read_source(path)?;
    parse_config(&contents)
}

fn number(json: &JsonValue, key: &str) -> Result<Option<f64>> {
    let value = &json[key];
    if value.is_null() {
        return Ok(None);
    }
    match value.as_f64() {
        Some(n) => Ok(Some(n)),
        None => Err(ShellmeshError::config(format!("'{key}' must be a number"))),
    }
}

/// Parses configuration JSON into a ShellConfig
pub fn parse_config(contents: &str) -> Result<ShellConfig> {
    let json = match json::parse(contents) {
        Ok(j) => j,
        Err(err) => return Err(ShellmeshError::config(format!("invalid JSON: {err}"))),
    };
    if !json.is_object() {
        return Err(ShellmeshError::config(
            "configuration must be a JSON object",
        ));
    }

    for (key, _) in json.entries() {
        if !KNOWN_KEYS.contains(&key) {
            warn!("ignoring unknown configuration key '{key}'");
        }
    }

    let shell = if json["shell"].is_null() {
        None
    } else {
        let spec = json["shell"]
            .as_str()
            .ok_or_else(|| ShellmeshError::config("'shell' must be a string"))?;
        Some(parse_shell_spec(spec)?)
    };

    let mark_outer_boundary = if json["mark_outer_boundary"].is_null() {
        None
    } else {
        Some(json["mark_outer_boundary"].as_bool().ok_or_else(|| {
            ShellmeshError::config("'mark_outer_boundary' must be a boolean")
        })?)
    };

    let rate = number(&json, "growth_rate")?;
    let growth = if json["growth_law"].is_null() {
        rate.map(|ratio| GrowthLaw::Geometric { ratio })
    } else {
        match json["growth_law"].as_str() {
            Some("geometric") => Some(GrowthLaw::Geometric {
                ratio: rate.unwrap_or(DEFAULT_GROWTH_RATIO),
            }),
            Some("linear") => Some(GrowthLaw::Linear {
                step: rate.unwrap_or(DEFAULT_GROWTH_STEP),
            }),
            _ => {
                return Err(ShellmeshError::config(
                    "'growth_law' must be \"geometric\" or \"linear\"",
                ))
            }
        }
    };

    Ok(ShellConfig {
        shell,
        margin: number(&json, "margin")?,
        growth,
        tolerance: number(&json, "tolerance")?,
        mark_outer_boundary,
        scale: number(&json, "scale")?,
    })
}
