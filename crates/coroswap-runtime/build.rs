//! Build script for coroswap-runtime
//!
//! Handles configuration merging:
//! 1. Start with library defaults
//! 2. If COROSWAP_CONFIG_RS env var is set, parse the user's config file
//! 3. Merge user values over defaults (user wins)
//! 4. Generate OUT_DIR/coroswap_merged_config.rs
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
        name: "MAX_IMAGE_SIZE",
        rust_type: "usize",
        default_value: "8 * 1024 * 1024", // 8MB
    },
    ConfigParam {
        name: "PREALLOC_IMAGE",
        rust_type: "usize",
        default_value: "0",
    },
    ConfigParam {
        name: "ROUND_ROBIN",
        rust_type: "bool",
        default_value: "true",
    },
    ConfigParam {
        name: "CHECK_THREAD_STACK",
        rust_type: "bool",
        default_value: "true",
    },
    ConfigParam {
        name: "DEBUG_LOGGING",
        rust_type: "bool",
        default_value: "false",
    },
    ConfigParam {
        name: "RESTORE_PROBE_BYTES",
        rust_type: "usize",
        default_value: "256",
    },
];

fn main() {
    let out_dir = match env::var("OUT_DIR") {
        Ok(dir) => dir,
        Err(e) => panic!("OUT_DIR not set: {}", e),
    };
    let dest_path = Path::new(&out_dir).join("coroswap_merged_config.rs");

    let mut config: HashMap<&str, String> = CONFIG_PARAMS
        .iter()
        .map(|p| (p.name, p.default_value.to_string()))
        .collect();

    if let Ok(user_path) = env::var("COROSWAP_CONFIG_RS") {
        println!("cargo:rerun-if-changed={}", user_path);

        match fs::read_to_string(&user_path) {
            Ok(content) => {
                parse_and_merge(&content, &mut config);
                println!("cargo:warning=Using custom config: {}", user_path);
            }
            Err(e) => {
                println!(
                    "cargo:warning=Failed to read COROSWAP_CONFIG_RS ({}): {}",
                    user_path, e
                );
            }
        }
    }

    println!("cargo:rerun-if-env-changed=COROSWAP_CONFIG_RS");

    let output = generate_config(&config);
    if let Err(e) = fs::write(&dest_path, &output) {
        panic!("Failed to write merged config: {}", e);
    }
}

/// Parse user's config file and merge values into config map
fn parse_and_merge(content: &str, config: &mut HashMap<&str, String>) {
    // Accepts lines of the form: pub const NAME: TYPE = VALUE;
    for line in content.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with("//") || !line.starts_with("pub const ") {
            continue;
        }

        let Some((name, value)) = parse_const_line(line) else {
            continue;
        };

        match CONFIG_PARAMS.iter().find(|p| p.name == name) {
            Some(param) => {
                config.insert(param.name, value);
            }
            None => println!("cargo:warning=Unknown config parameter: {}", name),
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
fn generate_config(config: &HashMap<&str, String>) -> String {
    let mut output = String::new();

    output.push_str("// Auto-generated by build.rs - do not edit\n");
    output.push_str("// Configuration merged from library defaults");
    if env::var("COROSWAP_CONFIG_RS").is_ok() {
        output.push_str(" and user's coroswap_config.rs");
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_const_line() {
        let result = parse_const_line("pub const PREALLOC_IMAGE: usize = 4096;");
        assert_eq!(result, Some(("PREALLOC_IMAGE".into(), "4096".into())));

        let result = parse_const_line("pub const MAX_IMAGE_SIZE: usize = 64 * 1024;");
        assert_eq!(result, Some(("MAX_IMAGE_SIZE".into(), "64 * 1024".into())));
    }

    #[test]
    fn test_parse_and_merge() {
        let mut config: HashMap<&str, String> = HashMap::new();
        config.insert("ROUND_ROBIN", "true".into());

        let user_config = r#"
            // Custom config
            pub const ROUND_ROBIN: bool = false;
            pub const NOT_A_PARAM: usize = 1;
        "#;

        parse_and_merge(user_config, &mut config);

        assert_eq!(config.get("ROUND_ROBIN"), Some(&"false".to_string()));
        assert!(!config.contains_key("NOT_A_PARAM"));
    }
}
