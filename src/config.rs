//! Command-line configuration for the `volume-stack` binary.
//!
//! Options can be given as flags or through environment variables with the
//! `VOLUME_` prefix:
//!
//! - `VOLUME_BLOCK_SIZE` - Block size of the per-file read cache (default: 64KB)
//! - `VOLUME_CACHE_BLOCKS` - Blocks cached per open file (default: 256)
//! - `VOLUME_SCENE` - Scene to read from multi-scene containers (default: 0)
//! - `VOLUME_TIME` - Timepoint to load (default: 0)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::io::{DEFAULT_BLOCK_SIZE, DEFAULT_CACHE_CAPACITY};
use crate::loader::LoaderOptions;

// =============================================================================
// Default Values
// =============================================================================

/// Smallest accepted block size.
pub const MIN_BLOCK_SIZE: usize = 1024;

/// Largest accepted block size.
pub const MAX_BLOCK_SIZE: usize = 16 * 1024 * 1024;

/// Default scene index.
pub const DEFAULT_SCENE: u32 = 0;

/// Default timepoint.
pub const DEFAULT_TIME: u32 = 0;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Volume Stack - decode microscopy volumes into 16-bit stacks.
///
/// Reads OME-TIFF, ImageJ TIFF and CZI files, reports their dimensions and
/// assembles single timepoints in memory.
#[derive(Parser, Debug, Clone)]
#[command(name = "volume-stack")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub io: IoArgs,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true, default_value_t = false, env = "VOLUME_VERBOSE")]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the dimensions of a volume file.
    Info(InfoArgs),

    /// Assemble one timepoint and summarise it.
    Load(LoadArgs),
}

/// Read cache tuning shared by every command.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct IoArgs {
    /// Block size in bytes for the per-file read cache.
    #[arg(long, global = true, default_value_t = DEFAULT_BLOCK_SIZE, env = "VOLUME_BLOCK_SIZE")]
    pub block_size: usize,

    /// Maximum number of blocks cached per open file.
    #[arg(
        long,
        global = true,
        default_value_t = DEFAULT_CACHE_CAPACITY,
        env = "VOLUME_CACHE_BLOCKS"
    )]
    pub cache_blocks: usize,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct InfoArgs {
    /// Path to a .tif, .tiff, .btf or .czi file.
    pub path: PathBuf,

    /// Scene to describe (CZI only).
    #[arg(long, default_value_t = DEFAULT_SCENE, env = "VOLUME_SCENE")]
    pub scene: u32,

    /// Print the dimensions as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct LoadArgs {
    /// Path to a .tif, .tiff, .btf or .czi file.
    pub path: PathBuf,

    /// Timepoint to load.
    #[arg(short, long, default_value_t = DEFAULT_TIME, env = "VOLUME_TIME")]
    pub time: u32,

    /// Scene to load (CZI only).
    #[arg(short, long, default_value_t = DEFAULT_SCENE, env = "VOLUME_SCENE")]
    pub scene: u32,

    /// Channel of the plane to export as PNG.
    #[arg(long, requires = "output")]
    pub export_channel: Option<u32>,

    /// Z slice of the plane to export as PNG.
    #[arg(long, requires = "output")]
    pub export_slice: Option<u32>,

    /// Destination of the exported 16-bit grayscale PNG.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl Cli {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.io.block_size < MIN_BLOCK_SIZE || self.io.block_size > MAX_BLOCK_SIZE {
            return Err("block_size must be between 1KB and 16MB".to_string());
        }
        if self.io.cache_blocks == 0 {
            return Err("cache_blocks must be greater than 0".to_string());
        }

        if let Command::Load(load) = &self.command {
            load.export()?;
        }
        Ok(())
    }

    pub fn loader_options(&self) -> LoaderOptions {
        LoaderOptions {
            block_size: self.io.block_size,
            cache_blocks: self.io.cache_blocks,
        }
    }
}

/// A single plane to write out after loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaneExport {
    pub channel: u32,
    pub slice: u32,
    pub output: PathBuf,
}

impl LoadArgs {
    /// The requested export, if any.
    ///
    /// Channel, slice and output must be given together.
    pub fn export(&self) -> Result<Option<PlaneExport>, String> {
        match (self.export_channel, self.export_slice, &self.output) {
            (None, None, None) => Ok(None),
            (Some(channel), Some(slice), Some(output)) => {
                let is_png = output
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("png"));
                if !is_png {
                    return Err(format!(
                        "export output must be a .png file, got {}",
                        output.display()
                    ));
                }
                Ok(Some(PlaneExport {
                    channel,
                    slice,
                    output: output.clone(),
                }))
            }
            _ => Err(
                "--export-channel, --export-slice and --output must be given together".to_string(),
            ),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
