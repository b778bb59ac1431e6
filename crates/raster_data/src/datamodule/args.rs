//! src/datamodule/args.rs
//!
//! Command-line surface of the data module.
//!
//! `DataModuleArgs` is a clap `Args` struct, so a training binary can mount it
//! next to its own options:
//!
//! ```ignore
//! #[derive(Parser)]
//! struct Cli {
//!     #[command(flatten)]
//!     data: DataModuleArgs,
//!     #[arg(long, default_value_t = 10)]
//!     epochs: usize,
//! }
//! ```

use clap::Args;
use std::path::PathBuf;

use super::params::DEFAULT_CACHE_SIZE;

#[derive(Args, Debug, Clone)]
pub struct DataModuleArgs {
    /// Dataset root folder path
    #[arg(long)]
    pub data_root: PathBuf,

    #[command(flatten)]
    pub overrides: DataModuleOverrides,
}

/// Optional overrides of the configured loader sections.
///
/// Unset fields fall through to the configuration, then to defaults.
#[derive(Args, Debug, Clone, PartialEq)]
pub struct DataModuleOverrides {
    /// Chunk cache size in bytes for each opened split
    #[arg(long, default_value_t = DEFAULT_CACHE_SIZE)]
    pub cache_size: f64,

    /// Train split key under the data root
    #[arg(long)]
    pub train_split: Option<String>,
    /// Train batch size
    #[arg(long)]
    pub train_batch_size: Option<usize>,
    /// Shuffle training data (true/false, yes/no, 1/0, on/off)
    #[arg(long, value_parser = parse_boolish)]
    pub train_shuffle: Option<bool>,
    /// Train loader worker threads
    #[arg(long)]
    pub train_num_workers: Option<usize>,
    /// CSV file whose `idx` column restricts the training view
    #[arg(long)]
    pub train_idxs: Option<PathBuf>,

    /// Share of the training view held out for validation
    #[arg(long)]
    pub val_proportion: Option<f64>,
    /// Validation split key under the data root
    #[arg(long)]
    pub val_split: Option<String>,
    /// Validation batch size
    #[arg(long)]
    pub val_batch_size: Option<usize>,
    /// Shuffle validation data (true/false, yes/no, 1/0, on/off)
    #[arg(long, value_parser = parse_boolish)]
    pub val_shuffle: Option<bool>,
    /// Validation loader worker threads
    #[arg(long)]
    pub val_num_workers: Option<usize>,
    /// CSV file whose `idx` column restricts the validation view
    #[arg(long)]
    pub val_idxs: Option<PathBuf>,

    /// Seed for the train/validation partition
    #[arg(long)]
    pub split_seed: Option<u64>,
    /// Apply --val-idxs to the training view instead (legacy behaviour)
    #[arg(long)]
    pub val_idxs_from_train_view: bool,
}

impl Default for DataModuleOverrides {
    fn default() -> Self {
        Self {
            cache_size: DEFAULT_CACHE_SIZE,
            train_split: None,
            train_batch_size: None,
            train_shuffle: None,
            train_num_workers: None,
            train_idxs: None,
            val_proportion: None,
            val_split: None,
            val_batch_size: None,
            val_shuffle: None,
            val_num_workers: None,
            val_idxs: None,
            split_seed: None,
            val_idxs_from_train_view: false,
        }
    }
}

/// Parses a bool-like flag value, case-insensitively.
pub fn parse_boolish(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" | "on" => Ok(true),
        "false" | "f" | "no" | "n" | "0" | "off" => Ok(false),
        other => Err(format!("'{}' is not a boolean value", other)),
    }
}

#[cfg(test)]
mod args_tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct Cli {
        #[command(flatten)]
        data: DataModuleArgs,
    }

    #[test]
    fn test_parse_boolish() {
        for yes in ["true", "T", "Yes", "y", "1", "ON"] {
            assert_eq!(parse_boolish(yes), Ok(true), "{}", yes);
        }
        for no in ["false", "F", "no", "N", "0", "off"] {
            assert_eq!(parse_boolish(no), Ok(false), "{}", no);
        }
        assert!(parse_boolish("maybe").is_err());
    }

    #[test]
    fn test_flags_map_onto_overrides() {
        let cli = Cli::try_parse_from([
            "prog",
            "--data-root",
            "/data/lyft",
            "--train-batch-size",
            "8",
            "--train-shuffle",
            "no",
            "--val-proportion",
            "0.1",
            "--val-idxs",
            "val.csv",
            "--cache-size",
            "2e8",
        ])
        .unwrap();

        assert_eq!(cli.data.data_root, PathBuf::from("/data/lyft"));
        let overrides = cli.data.overrides;
        assert_eq!(overrides.train_batch_size, Some(8));
        assert_eq!(overrides.train_shuffle, Some(false));
        assert_eq!(overrides.val_proportion, Some(0.1));
        assert_eq!(overrides.val_idxs, Some(PathBuf::from("val.csv")));
        assert_eq!(overrides.cache_size, 2e8);
        assert_eq!(overrides.val_shuffle, None);
        assert!(!overrides.val_idxs_from_train_view);
    }

    #[test]
    fn test_defaults_without_flags() {
        let cli = Cli::try_parse_from(["prog", "--data-root", "/data"]).unwrap();
        assert_eq!(cli.data.overrides, DataModuleOverrides::default());
    }

    #[test]
    fn test_data_root_required_and_bad_bool_rejected() {
        assert!(Cli::try_parse_from(["prog"]).is_err());
        assert!(Cli::try_parse_from(["prog", "--data-root", "/d", "--val-shuffle", "sometimes"]).is_err());
    }
}
