use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use image::ImageReader;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::app::Rgba;

use super::asset_keys::validate_asset_key;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssetError {
    #[error("asset queue was empty")]
    EmptyQueue,
    #[error("failed to download asset '{path}': {reason}")]
    DownloadFailed { path: String, reason: String },
}

/// Decoded RGBA8 image, row-major, four bytes per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpriteImage {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl SpriteImage {
    /// `None` when `rgba` does not hold exactly `width * height` pixels.
    pub fn from_rgba(width: u32, height: u32, rgba: Vec<u8>) -> Option<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(4)?;
        (rgba.len() == expected).then_some(Self {
            width,
            height,
            rgba,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = ((y as usize) * (self.width as usize) + x as usize) * 4;
        let bytes = self.rgba.get(offset..offset + 4)?;
        Some([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    pub successes: Vec<String>,
    pub failures: Vec<AssetError>,
}

/// Queue of image paths to load plus the cache of everything that loaded.
///
/// A path that fails is put back on the queue once so a later
/// [`AssetLoader::force_download_all`] can retry it; a second failure drops it.
#[derive(Debug)]
pub struct AssetLoader {
    root: PathBuf,
    queue: VecDeque<String>,
    cache: HashMap<String, SpriteImage>,
    retried: HashSet<String>,
}

impl AssetLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            queue: VecDeque::new(),
            cache: HashMap::new(),
            retried: HashSet::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn enqueue(&mut self, path_id: impl Into<String>) {
        let path_id = path_id.into();
        debug!(path = path_id.as_str(), "asset_enqueued");
        self.queue.push_back(path_id);
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    pub fn force_download_all(&mut self) -> Result<DownloadSummary, AssetError> {
        if self.queue.is_empty() {
            return Err(AssetError::EmptyQueue);
        }

        let pending = self.queue.drain(..).collect::<Vec<_>>();
        let mut summary = DownloadSummary::default();
        for path_id in pending {
            if self.cache.contains_key(&path_id) {
                summary.successes.push(path_id);
                continue;
            }
            match load_sprite_rgba(&self.root, &path_id) {
                Ok(image) => {
                    info!(
                        path = path_id.as_str(),
                        width = image.width(),
                        height = image.height(),
                        "asset_downloaded"
                    );
                    self.cache.insert(path_id.clone(), image);
                    summary.successes.push(path_id);
                }
                Err(reason) => {
                    let requeued = self.retried.insert(path_id.clone());
                    warn!(
                        path = path_id.as_str(),
                        reason = reason.as_str(),
                        requeued,
                        "asset_download_failed"
                    );
                    if requeued {
                        self.queue.push_back(path_id.clone());
                    }
                    summary.failures.push(AssetError::DownloadFailed {
                        path: path_id,
                        reason,
                    });
                }
            }
        }
        Ok(summary)
    }

    pub fn get(&self, path_id: &str) -> Option<&SpriteImage> {
        self.cache.get(path_id)
    }

    pub fn exists(&self, path_id: &str) -> bool {
        self.cache.contains_key(path_id)
    }
}

fn load_sprite_rgba(root: &Path, key: &str) -> Result<SpriteImage, String> {
    validate_asset_key(key).map_err(|error| format!("invalid_key:{error}"))?;
    let path = root.join(key);
    let reader = ImageReader::open(&path).map_err(|error| format!("file_open_failed:{error}"))?;
    let decoded = reader
        .decode()
        .map_err(|error| format!("decode_failed:{error}"))?;
    let image = decoded.to_rgba8();
    let (width, height) = image.dimensions();
    SpriteImage::from_rgba(width, height, image.into_raw())
        .ok_or_else(|| "decode_failed:unexpected buffer length".to_string())
}
