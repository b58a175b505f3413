//! Volume Stack - inspect and load microscopy volumes from the command line.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use image::{ImageBuffer, Luma};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use volume_stack::{
    config::{Cli, Command, InfoArgs, LoadArgs, PlaneExport},
    FormatRegistry, ImageCache, ImageXyzc, LoadRequest, VolumeDimensions, VolumeLoader,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = cli.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let loader = VolumeLoader::with_registry(
        Arc::new(ImageCache::new()),
        FormatRegistry::default(),
        cli.loader_options(),
    );

    match &cli.command {
        Command::Info(args) => run_info(&loader, args).await,
        Command::Load(args) => run_load(&loader, args).await,
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "volume_stack=debug"
    } else {
        "volume_stack=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

// =============================================================================
// Info Command
// =============================================================================

async fn run_info(loader: &VolumeLoader, args: &InfoArgs) -> ExitCode {
    let dims = match loader.load_dimensions(&args.path, args.scene).await {
        Ok(dims) => dims,
        Err(e) => {
            error!("Failed to read {}: {}", args.path.display(), e);
            return ExitCode::FAILURE;
        }
    };

    if args.json {
        match serde_json::to_string_pretty(&dims) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Failed to serialize dimensions: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        print_dimensions(&args.path.display().to_string(), &dims);
    }
    ExitCode::SUCCESS
}

fn print_dimensions(name: &str, dims: &VolumeDimensions) {
    println!("{}", name);
    println!(
        "  Size:       {} x {} x {}, {} channel(s), {} timepoint(s)",
        dims.size_x, dims.size_y, dims.size_z, dims.size_c, dims.size_t
    );
    println!("  Order:      {}", dims.dimension_order);
    println!(
        "  Voxel size: {} x {} x {} um",
        dims.physical_size_x, dims.physical_size_y, dims.physical_size_z
    );
    println!("  Bits:       {}", dims.bits_per_pixel);
    println!(
        "  Channels:   {}",
        dims.channel_names_or_indices().join(", ")
    );
}

// =============================================================================
// Load Command
// =============================================================================

async fn run_load(loader: &VolumeLoader, args: &LoadArgs) -> ExitCode {
    let request = LoadRequest::new(&args.path)
        .time(args.time)
        .scene(args.scene);
    let image = match loader.load_from_file(&request).await {
        Ok(image) => image,
        Err(e) => {
            error!("Failed to load {}: {}", args.path.display(), e);
            return ExitCode::FAILURE;
        }
    };

    print_summary(&args.path.display().to_string(), args.time, &image);

    // validate() already checked the export options
    if let Ok(Some(export)) = args.export() {
        if let Err(e) = export_plane(&image, &export) {
            error!("Export failed: {}", e);
            return ExitCode::FAILURE;
        }
        info!(
            "Wrote channel {} slice {} to {}",
            export.channel,
            export.slice,
            export.output.display()
        );
    }
    ExitCode::SUCCESS
}

fn print_summary(name: &str, time: u32, image: &ImageXyzc) {
    let [px, py, pz] = image.physical_size();
    println!("{} (t={})", name, time);
    println!(
        "  Size:       {} x {} x {}, {} channel(s)",
        image.size_x(),
        image.size_y(),
        image.size_z(),
        image.size_c()
    );
    println!("  Voxel size: {} x {} x {} um", px, py, pz);
    println!(
        "  Memory:     {:.2} MB",
        image.data().len() as f64 / (1024.0 * 1024.0)
    );
    for c in 0..image.size_c() {
        let name = image.channel_name(c).unwrap_or_default();
        match image.channel_range(c) {
            Some((min, max)) => println!("  [{}] {:<20} min {:>5}  max {:>5}", c, name, min, max),
            None => println!("  [{}] {}", c, name),
        }
    }
}

/// Write one plane as a 16-bit grayscale PNG.
fn export_plane(image: &ImageXyzc, export: &PlaneExport) -> Result<(), String> {
    let plane = image.plane(export.channel, export.slice).ok_or_else(|| {
        format!(
            "no plane at channel {} slice {} (volume has {} channels, {} slices)",
            export.channel,
            export.slice,
            image.size_c(),
            image.size_z()
        )
    })?;

    let samples: Vec<u16> = plane
        .chunks_exact(2)
        .map(|s| u16::from_le_bytes([s[0], s[1]]))
        .collect();
    let buffer: ImageBuffer<Luma<u16>, Vec<u16>> =
        ImageBuffer::from_raw(image.size_x(), image.size_y(), samples)
            .ok_or_else(|| "plane size does not match the image extents".to_string())?;

    buffer
        .save(&export.output)
        .map_err(|e| format!("{}: {}", export.output.display(), e))
}
