//! Load entry points.
//!
//! [`VolumeLoader`] turns a path or an in-memory array into a shared
//! [`ImageXyzc`]:
//!
//! 1. The image cache is consulted by path (or array name)
//! 2. The format is chosen from the file extension, then confirmed by sniffing
//! 3. The file is opened behind a block cache and its dimensions extracted
//! 4. Every plane of the requested timepoint is assembled
//!
//! Loads that should be cached run under the cache's single-flight guard, so
//! concurrent requests for one path read the file once.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::error::VolumeError;
use crate::format::czi::CziVolume;
use crate::format::tiff::TiffVolume;
use crate::format::{detect_format, FormatRegistry, VolumeFormat};
use crate::io::{BlockCache, LocalFileReader, DEFAULT_BLOCK_SIZE, DEFAULT_CACHE_CAPACITY};
use crate::volume::{ImageXyzc, VolumeDimensions};

use super::array::{ArraySource, ArrayVolume};
use super::assembler::assemble_volume;
use super::cache::ImageCache;
use super::source::PlaneSource;

// =============================================================================
// Options
// =============================================================================

/// I/O tuning for opened files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderOptions {
    /// Block size of the per-file read cache, in bytes
    pub block_size: usize,

    /// Number of blocks kept per open file
    pub cache_blocks: usize,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            cache_blocks: DEFAULT_CACHE_CAPACITY,
        }
    }
}

// =============================================================================
// LoadRequest
// =============================================================================

/// Parameters of a single file load.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRequest {
    pub path: PathBuf,

    /// Dimensions to use instead of the file's own metadata
    pub dimensions: Option<VolumeDimensions>,

    pub time: u32,
    pub scene: u32,

    /// Store the result in the image cache
    pub add_to_cache: bool,
}

impl LoadRequest {
    /// Timepoint 0 of scene 0, not cached.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            dimensions: None,
            time: 0,
            scene: 0,
            add_to_cache: false,
        }
    }

    pub fn time(mut self, time: u32) -> Self {
        self.time = time;
        self
    }

    pub fn scene(mut self, scene: u32) -> Self {
        self.scene = scene;
        self
    }

    pub fn dimensions(mut self, dimensions: VolumeDimensions) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    pub fn cached(mut self, add_to_cache: bool) -> Self {
        self.add_to_cache = add_to_cache;
        self
    }

    /// Key of this request in the image cache.
    pub fn cache_key(&self) -> String {
        cache_key(&self.path)
    }
}

fn cache_key(path: &Path) -> String {
    path.display().to_string()
}

// =============================================================================
// VolumeLoader
// =============================================================================

/// Loads volumes from files and arrays into a shared [`ImageCache`].
pub struct VolumeLoader {
    cache: Arc<ImageCache>,
    registry: FormatRegistry,
    options: LoaderOptions,
}

impl VolumeLoader {
    /// Loader with the default format registry and I/O options.
    pub fn new(cache: Arc<ImageCache>) -> Self {
        Self::with_registry(cache, FormatRegistry::default(), LoaderOptions::default())
    }

    pub fn with_registry(
        cache: Arc<ImageCache>,
        registry: FormatRegistry,
        options: LoaderOptions,
    ) -> Self {
        Self {
            cache,
            registry,
            options,
        }
    }

    pub fn cache(&self) -> &Arc<ImageCache> {
        &self.cache
    }

    pub fn registry(&self) -> &FormatRegistry {
        &self.registry
    }

    pub fn options(&self) -> LoaderOptions {
        self.options
    }

    /// Load one timepoint of a file.
    ///
    /// A cached image for the path is returned as is, whatever time or scene
    /// it was loaded with.
    pub async fn load_from_file(
        &self,
        request: &LoadRequest,
    ) -> Result<Arc<ImageXyzc>, VolumeError> {
        let key = request.cache_key();
        if let Some(image) = self.cache.get(&key).await {
            debug!(path = %key, "Image cache hit");
            return Ok(image);
        }

        let result = if request.add_to_cache {
            self.cache
                .get_or_load(&key, || self.read_file(request))
                .await
        } else {
            self.read_file(request).await.map(Arc::new)
        };
        result.inspect_err(|e| error!(path = %key, "Failed to load volume: {}", e))
    }

    /// Load timepoint 0 of scene 0 and cache it.
    pub async fn load_from_file_4d(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<Arc<ImageXyzc>, VolumeError> {
        let request = LoadRequest::new(path.as_ref()).cached(true);
        self.load_from_file(&request).await
    }

    /// Extract and validate the dimensions of a file without reading planes.
    pub async fn load_dimensions(
        &self,
        path: impl AsRef<Path>,
        scene: u32,
    ) -> Result<VolumeDimensions, VolumeError> {
        let path = path.as_ref();
        let source = self
            .open_source(path, scene, None)
            .await
            .inspect_err(|e| error!(path = %path.display(), "Failed to read dimensions: {}", e))?;
        Ok(source.dimensions().clone())
    }

    /// Wrap an in-memory array, keyed by its name in the cache.
    pub async fn load_from_array(
        &self,
        volume: ArrayVolume,
        add_to_cache: bool,
    ) -> Result<Arc<ImageXyzc>, VolumeError> {
        if let Some(image) = self.cache.get(&volume.name).await {
            debug!(name = %volume.name, "Image cache hit");
            return Ok(image);
        }

        let array = &volume;
        let load = || async move {
            let source = ArraySource::new(array)?;
            assemble_volume(&source, 0, 0).await
        };
        let result = if add_to_cache {
            self.cache.get_or_load(&volume.name, load).await
        } else {
            load().await.map(Arc::new)
        };
        result.inspect_err(|e| error!(name = %volume.name, "Failed to load array: {}", e))
    }

    async fn read_file(&self, request: &LoadRequest) -> Result<ImageXyzc, VolumeError> {
        let source = self
            .open_source(&request.path, request.scene, request.dimensions.as_ref())
            .await?;
        let image = assemble_volume(source.as_ref(), request.time, request.scene).await?;
        info!(
            path = %request.path.display(),
            time = request.time,
            scene = request.scene,
            bytes = image.data().len(),
            "Loaded volume"
        );
        Ok(image)
    }

    /// Open a file as a plane source, extracting or checking its dimensions.
    async fn open_source(
        &self,
        path: &Path,
        scene: u32,
        dimensions: Option<&VolumeDimensions>,
    ) -> Result<Box<dyn PlaneSource>, VolumeError> {
        let registered = self.registry.format_for_path(path)?;
        let file = LocalFileReader::open(path).await?;
        let reader =
            BlockCache::with_capacity(file, self.options.block_size, self.options.cache_blocks);

        let format = match detect_format(&reader).await? {
            Some(sniffed) if sniffed != registered => {
                warn!(
                    path = %path.display(),
                    extension = %registered,
                    content = %sniffed,
                    "File content does not match its extension, reading as {}",
                    sniffed
                );
                sniffed
            }
            _ => registered,
        };

        let source: Box<dyn PlaneSource> = match (format, dimensions) {
            (VolumeFormat::Tiff, None) => Box::new(TiffVolume::open(reader).await?),
            (VolumeFormat::Tiff, Some(dims)) => {
                Box::new(TiffVolume::open_with_dimensions(reader, dims.clone()).await?)
            }
            (VolumeFormat::Czi, None) => Box::new(CziVolume::open(reader, scene).await?),
            (VolumeFormat::Czi, Some(dims)) => {
                Box::new(CziVolume::open_with_dimensions(reader, scene, dims.clone()).await?)
            }
        };
        source.dimensions().log();
        Ok(source)
    }
}
