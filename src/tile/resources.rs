//! Non-tile resources: bitmap icons and map format descriptors.
//!
//! Bitmaps are loaded once at startup from a directory:
//!
//! ```text
//! <dir>/<name>.<ext>         B<name>
//! <dir>/large/<name>.<ext>   Q<name>
//! <dir>/small/<name>.<ext>   q<name>
//! ```
//!
//! Format descriptors come from the origin and are cached like tile groups,
//! keyed with the server prefix they were generated for. Their checksum
//! resources (`C`/`c`) are the four big-endian bytes of the descriptor's
//! checksum.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info};

use crate::descriptor::{BitmapSize, Language, ResourceDescriptor};
use crate::error::ResourceError;

use super::buffer::TileBuffer;
use super::cache::{CacheLookup, CacheStore};
use super::origin::Generator;
use super::record::CacheEntryGroup;

// =============================================================================
// Bitmap Table
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct BitmapTable {
    bitmaps: HashMap<(char, String), Bytes>,
}

impl BitmapTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bitmap(mut self, size: BitmapSize, name: impl Into<String>, data: Bytes) -> Self {
        self.bitmaps.insert((size.tag(), name.into()), data);
        self
    }

    /// Load every bitmap below `dir`.
    pub fn load_dir(dir: &Path) -> Result<Self, ResourceError> {
        let mut table = Self::new();
        for (size, sub) in [
            (BitmapSize::Normal, None),
            (BitmapSize::Large, Some("large")),
            (BitmapSize::Small, Some("small")),
        ] {
            let path = match sub {
                Some(sub) => dir.join(sub),
                None => dir.to_path_buf(),
            };
            if sub.is_some() && !path.is_dir() {
                continue;
            }
            table.load_variant(size, &path)?;
        }
        info!(path = %dir.display(), bitmaps = table.len(), "Loaded bitmaps");
        Ok(table)
    }

    fn load_variant(&mut self, size: BitmapSize, dir: &Path) -> Result<(), ResourceError> {
        let load_err = |e: std::io::Error| ResourceError::Load {
            path: dir.display().to_string(),
            message: e.to_string(),
        };
        for entry in std::fs::read_dir(dir).map_err(load_err)? {
            let path = entry.map_err(load_err)?.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let data = std::fs::read(&path).map_err(load_err)?;
            self.bitmaps
                .insert((size.tag(), name.to_string()), Bytes::from(data));
        }
        Ok(())
    }

    pub fn get(&self, size: BitmapSize, name: &str) -> Option<Bytes> {
        self.bitmaps.get(&(size.tag(), name.to_string())).cloned()
    }

    /// Names from `required` (normal size) that are not loaded.
    pub fn missing<S: AsRef<str>>(&self, required: &[S]) -> Vec<String> {
        required
            .iter()
            .map(|name| name.as_ref())
            .filter(|name| self.get(BitmapSize::Normal, name).is_none())
            .map(str::to_string)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.bitmaps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bitmaps.is_empty()
    }
}

// =============================================================================
// Resource Resolver
// =============================================================================

/// Resolves non-tile descriptors to buffers.
pub struct ResourceResolver {
    bitmaps: BitmapTable,
    cache: Arc<CacheStore>,
    generator: Generator,
    server_prefix: u32,
}

impl ResourceResolver {
    pub fn new(
        bitmaps: BitmapTable,
        cache: Arc<CacheStore>,
        generator: Generator,
        server_prefix: u32,
    ) -> Self {
        Self {
            bitmaps,
            cache,
            generator,
            server_prefix,
        }
    }

    pub fn bitmaps(&self) -> &BitmapTable {
        &self.bitmaps
    }

    /// Buffer for `resource`, named as requested.
    pub async fn resolve(&self, resource: &ResourceDescriptor) -> Result<TileBuffer, ResourceError> {
        let requested = resource.to_string();
        match resource {
            ResourceDescriptor::Bitmap { size, name } => self
                .bitmaps
                .get(*size, name)
                .map(|data| TileBuffer::new(requested.clone(), data))
                .ok_or(ResourceError::UnknownBitmap(requested)),
            ResourceDescriptor::FormatDesc {
                language,
                night,
                server_prefix,
            } => {
                let mut buffer = self
                    .format_descriptor(*language, *night, *server_prefix)
                    .await?;
                buffer.descriptor = requested;
                Ok(buffer)
            }
            ResourceDescriptor::FormatDescChecksum {
                language,
                night,
                server_prefix,
            } => {
                let source = self
                    .format_descriptor(*language, *night, *server_prefix)
                    .await?;
                Ok(TileBuffer::new(
                    requested,
                    Bytes::copy_from_slice(&source.checksum.to_be_bytes()),
                ))
            }
            ResourceDescriptor::Container(_) => Err(ResourceError::Unsupported(requested)),
        }
    }

    /// Current day-mode format descriptor for `language`, sent to clients
    /// that still use an old server prefix.
    pub async fn current_format_descriptor(
        &self,
        language: Language,
    ) -> Result<TileBuffer, ResourceError> {
        self.resolve(&ResourceDescriptor::FormatDesc {
            language,
            night: false,
            server_prefix: None,
        })
        .await
    }

    async fn format_descriptor(
        &self,
        language: Language,
        night: bool,
        server_prefix: Option<u32>,
    ) -> Result<TileBuffer, ResourceError> {
        let server_prefix = server_prefix.unwrap_or(self.server_prefix);
        let key = ResourceDescriptor::FormatDesc {
            language,
            night,
            server_prefix: Some(server_prefix),
        }
        .to_string();

        if let CacheLookup::Hit(group) = self.cache.lookup(&key).await {
            if let Some(buffer) = group.into_buffers().into_iter().next() {
                return Ok(buffer);
            }
        }

        debug!(key = %key, "Generating format descriptor");
        let payload = self
            .generator
            .format_descriptor(language, night, server_prefix)
            .await?;
        let buffer = TileBuffer::new(key.clone(), payload);
        self.cache
            .store(&key, &CacheEntryGroup::single(buffer.clone()))
            .await;
        Ok(buffer)
    }
}
