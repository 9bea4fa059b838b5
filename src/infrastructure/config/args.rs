//! Command-line arguments.

use super::app_config::LogLevel;
use crate::domain::entities::SizeVariant;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Global flags and the subcommand to run.
#[derive(Debug, Parser)]
#[command(
    name = "fieldsync",
    version,
    about = "Offline-first photo cache and upload queue for field work",
    long_about = None
)]
pub struct CliArgs {
    /// Configuration file path.
    #[arg(short, long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH", global = true)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum, global = true)]
    pub log_level: Option<LogLevel>,

    /// Directory for the thumbnail cache and upload queue.
    #[arg(long, value_name = "PATH", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Backend base URL.
    #[arg(long, value_name = "URL", global = true)]
    pub api_url: Option<String>,

    /// Storage bucket for uploaded photos.
    #[arg(long, global = true)]
    pub bucket: Option<String>,

    /// Subcommand; `status` when omitted.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Watch connectivity and drain the queue until interrupted.
    Run,
    /// Print queue and connectivity status.
    Status,
    /// Drain the queue once and exit.
    Sync,
    /// Queue a photo for upload to a record slot.
    Enqueue {
        /// Image file to upload.
        file: PathBuf,
        /// Remote table that owns the record.
        #[arg(long)]
        entity: String,
        /// Primary key of the record.
        #[arg(long)]
        record_id: String,
        /// Column receiving the uploaded object path.
        #[arg(long)]
        slot: String,
        /// Upload kind.
        #[arg(long, default_value = "stage-photo")]
        kind: String,
        /// Upload the file as-is instead of recompressing it.
        #[arg(long)]
        raw: bool,
    },
    /// List uploads that stopped retrying.
    Failed,
    /// Put a failed upload back in the queue.
    Retry {
        /// Upload id.
        id: String,
    },
    /// Delete a failed upload.
    Discard {
        /// Upload id.
        id: String,
    },
    /// Resolve an image through the cache and write it to a file.
    Thumb {
        /// Object path, URL, or data URI.
        reference: String,
        /// Size variant.
        #[arg(long, value_enum, default_value_t = SizeVariant::Small)]
        variant: SizeVariant,
        /// Output file.
        #[arg(short, long, value_name = "PATH")]
        output: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_enqueue() {
        let args = CliArgs::parse_from([
            "fieldsync",
            "enqueue",
            "photo.jpg",
            "--entity",
            "project_stages",
            "--record-id",
            "42",
            "--slot",
            "wiring_photo",
        ]);

        match args.command {
            Some(Command::Enqueue {
                file,
                entity,
                kind,
                raw,
                ..
            }) => {
                assert_eq!(file, PathBuf::from("photo.jpg"));
                assert_eq!(entity, "project_stages");
                assert_eq!(kind, "stage-photo");
                assert!(!raw);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_thumb_variant() {
        let args = CliArgs::parse_from([
            "fieldsync", "thumb", "a/b.jpg", "--variant", "large", "-o", "out.jpg",
        ]);
        assert!(matches!(
            args.command,
            Some(Command::Thumb {
                variant: SizeVariant::Large,
                ..
            })
        ));
    }
}
