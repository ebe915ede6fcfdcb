//! Build script for ecore-runtime
//!
//! Handles configuration merging:
//! 1. Start with library defaults
//! 2. If ECORE_CONFIG_RS env var is set, parse user's config file
//! 3. Merge user values over defaults (user wins)
//! 4. Generate OUT_DIR/ecore_merged_config.rs
//!
//! User only needs to specify values they want to change.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

/// Configuration parameter definition
struct ConfigParam {
    name: &'static str,
    rust_type: &'static str,
    default_value: &'static str,
}

/// All configuration parameters with their defaults
const CONFIG_PARAMS: &[ConfigParam] = &[
    ConfigParam {
        name: "THREAD_STACK_SIZE",
        rust_type: "usize",
        default_value: "0", // platform default
    },
    ConfigParam {
        name: "THREAD_SIGNAL_SCOPE",
        rust_type: "bool",
        default_value: "false",
    },
    ConfigParam {
        name: "THREAD_NAME_PREFIX",
        rust_type: "&str",
        default_value: "\"thread#\"",
    },
    ConfigParam {
        name: "QUEUE_CAPACITY",
        rust_type: "usize",
        default_value: "1024",
    },
];

fn main() {
    let out_dir = env::var("OUT_DIR").expect("OUT_DIR not set");
    let dest_path = Path::new(&out_dir).join("ecore_merged_config.rs");

    // Start with defaults
    let mut config: HashMap<&str, String> = CONFIG_PARAMS
        .iter()
        .map(|p| (p.name, p.default_value.to_string()))
        .collect();

    let user_config = env::var("ECORE_CONFIG_RS").ok();
    if let Some(user_path) = &user_config {
        println!("cargo:rerun-if-changed={}", user_path);

        match fs::read_to_string(user_path) {
            Ok(content) => {
                parse_and_merge(&content, &mut config);
                println!("cargo:warning=Using custom config: {}", user_path);
            }
            Err(e) => {
                println!(
                    "cargo:warning=Failed to read ECORE_CONFIG_RS ({}): {}",
                    user_path, e
                );
            }
        }
    }

    println!("cargo:rerun-if-env-changed=ECORE_CONFIG_RS");

    let output = generate_config(&config, user_config.is_some());
    fs::write(&dest_path, output).expect("Failed to write merged config");
}

/// Parse user's config file and merge known values into config map
fn parse_and_merge(content: &str, config: &mut HashMap<&str, String>) {
    // Accepts lines of the form: pub const NAME: TYPE = VALUE;
    for line in content.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with("//") || !line.starts_with("pub const ") {
            continue;
        }

        if let Some((name, value)) = parse_const_line(line) {
            match CONFIG_PARAMS.iter().find(|p| p.name == name) {
                Some(param) => {
                    config.insert(param.name, value);
                }
                None => println!("cargo:warning=Unknown config parameter: {}", name),
            }
        }
    }
}

/// Parse a single const line and return (name, value)
fn parse_const_line(line: &str) -> Option<(String, String)> {
    let rest = line.strip_prefix("pub const ")?.trim();

    let colon_pos = rest.find(':')?;
    let name = rest[..colon_pos].trim().to_string();

    let eq_pos = rest.find('=')?;
    let semi_pos = rest.rfind(';').unwrap_or(rest.len());
    let value = rest[eq_pos + 1..semi_pos].trim().to_string();

    Some((name, value))
}

/// Generate the merged config Rust file
fn generate_config(config: &HashMap<&str, String>, has_user: bool) -> String {
    let mut output = String::new();

    output.push_str("// Auto-generated by build.rs - do not edit\n");
    output.push_str("// Configuration merged from library defaults");
    if has_user {
        output.push_str(" and user's ecore_config.rs");
    }
    output.push_str("\n\n");

    for param in CONFIG_PARAMS {
        let value = config
            .get(param.name)
            .map(String::as_str)
            .unwrap_or(param.default_value);
        output.push_str(&format!(
            "pub const {}: {} = {};\n",
            param.name, param.rust_type, value
        ));
    }

    output
}
