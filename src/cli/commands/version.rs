//! Version command - machine-readable version information

use crate::config::Config;
use crate::definition::API_VERSION_V1;
use crate::error::KilnResult;
use serde_json::json;

/// Execute the version command
pub async fn execute(config: &Config) -> KilnResult<()> {
    println!("{}", version_info(config));
    Ok(())
}

fn version_info(config: &Config) -> String {
    let info = json!({
        "version": env!("CARGO_PKG_VERSION"),
        "apiVersion": API_VERSION_V1,
        "syntaxImage": config.builder.syntax_image,
    });
    info.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_info_is_json() {
        let info: serde_json::Value = serde_json::from_str(&version_info(&Config::default())).unwrap();
        assert_eq!(info["apiVersion"], "kiln/v1");
        assert_eq!(info["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(info["syntaxImage"], "docker/dockerfile:1.4");
    }
}
