//! Command-line argument parsing for docio.
//!
//! This module provides the `Cli` struct which encapsulates all command-line
//! options and methods for parsing them.

use docio::config::Config;
use std::path::PathBuf;

/// Command-line interface configuration.
#[derive(Debug, Default, PartialEq)]
pub struct Cli {
    /// File(s) to open; `-` reads standard input
    pub files: Vec<PathBuf>,

    /// Load and save everything on the main thread
    pub sync: bool,

    /// Save each file back after it has loaded
    pub resave: bool,

    /// Answer yes to every confirmation
    pub yes: bool,

    /// `KEY=VALUE` configuration overrides, applied in order
    pub overrides: Vec<String>,

    /// Log at debug level
    pub verbose: bool,
}

impl Cli {
    /// Parse the process arguments.
    pub fn parse() -> Result<Self, Box<dyn std::error::Error>> {
        Self::parse_from(std::env::args().skip(1))
    }

    /// Parse an argument list (without the program name).
    ///
    /// Returns an error if a flag is unknown or a required value is missing.
    pub fn parse_from<I>(args: I) -> Result<Self, Box<dyn std::error::Error>>
    where
        I: IntoIterator<Item = String>,
    {
        let mut cli = Self::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-s" | "--sync" => cli.sync = true,
                "-r" | "--resave" => cli.resave = true,
                "-y" | "--yes" => cli.yes = true,
                "-v" | "--verbose" => cli.verbose = true,
                "-c" | "--set" => {
                    if let Some(assignment) = args.next() {
                        cli.overrides.push(assignment);
                    } else {
                        return Err("--set requires a KEY=VALUE argument".into());
                    }
                }
                "-h" | "--help" => {
                    println!("docio - load and save documents like a multi-document editor");
                    println!();
                    println!("Usage: docio [OPTIONS] FILES...");
                    println!();
                    println!("Options:");
                    println!("  -h, --help           Show this help message");
                    println!("  -s, --sync           Never use background threads");
                    println!("  -r, --resave         Save each file back after loading it");
                    println!("  -y, --yes            Answer yes to confirmations");
                    println!("  -c, --set KEY=VALUE  Override a configuration setting");
                    println!("  -v, --verbose        Log at debug level");
                    println!();
                    println!("A file named - reads standard input.");
                    std::process::exit(0);
                }
                "-" => cli.files.push(PathBuf::from("-")),
                arg if arg.starts_with('-') => {
                    return Err(format!("Unknown flag: {}. Use --help for usage.", arg).into());
                }
                _ => {
                    // Positional arguments are files
                    cli.files.push(PathBuf::from(arg));
                }
            }
        }

        Ok(cli)
    }

    /// Apply CLI overrides to a configuration object.
    pub fn apply_to_config(&self, config: &mut Config) -> Result<(), Box<dyn std::error::Error>> {
        for assignment in &self.overrides {
            config.set_from_assignment(assignment)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, Box<dyn std::error::Error>> {
        Cli::parse_from(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_flags_and_files() {
        let cli = parse(&["-s", "--resave", "a.txt", "-", "-c", "eol_mode=CRLF"]).unwrap();
        assert!(cli.sync);
        assert!(cli.resave);
        assert!(!cli.yes);
        assert_eq!(cli.files, vec![PathBuf::from("a.txt"), PathBuf::from("-")]);
        assert_eq!(cli.overrides, vec!["eol_mode=CRLF".to_string()]);
    }

    #[test]
    fn test_errors() {
        assert!(parse(&["--bogus"]).is_err());
        assert!(parse(&["--set"]).is_err());
    }

    #[test]
    fn test_overrides_reach_config() {
        let cli = parse(&["--set", "tab_size=4"]).unwrap();
        let mut config = Config::default();
        cli.apply_to_config(&mut config).unwrap();
        assert_eq!(config.get_int("tab_size"), Some(4));

        let bad = parse(&["--set", "nonsense"]).unwrap();
        assert!(bad.apply_to_config(&mut config).is_err());
    }
}
