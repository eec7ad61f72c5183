//! Command-line arguments for the `ocr-api` binary.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "ocr-api")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Token-authenticated OCR endpoint for CTC recognition models", long_about = None)]
pub struct Cli {
    /// Path to the YAML config file
    #[arg(short = 'c', long = "config", env = "OCR_API_CONFIG")]
    pub config: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_short_and_long_flags() {
        let cli = Cli::try_parse_from(["ocr-api", "-c", "conf.yaml"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("conf.yaml"));

        let cli = Cli::try_parse_from(["ocr-api", "--config", "/etc/ocr.yaml"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/ocr.yaml"));
    }
}
