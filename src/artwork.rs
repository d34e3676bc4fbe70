use std::{io::Cursor, sync::Arc};

use image::{imageops::FilterType, DynamicImage, ImageError, ImageReader, Limits};

use crate::error::Result;

pub const DEFAULT_ARTWORK_SIZE: u32 = 300;

/// Allocation ceiling for the bounded decode path.
const THUMBNAIL_ALLOC_LIMIT: u64 = 48 * 1024 * 1024;

/// Decoded, display-sized RGBA artwork.
#[derive(Clone, Debug, PartialEq)]
pub struct Artwork {
    pub size: [usize; 2],
    pub rgba: Vec<u8>,
}

/// Identity of the cached payload. Only the byte length is compared.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Fingerprint {
    #[default]
    Unknown,
    Length(usize),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArtworkChange {
    Unchanged,
    Replaced,
    Cleared,
}

/// Single-slot artwork cache.
#[derive(Debug)]
pub struct ArtworkCache {
    fingerprint: Fingerprint,
    image: Option<Arc<Artwork>>,
    target_px: u32,
    generation: u64,
    decodes: u64,
}

impl Default for ArtworkCache {
    fn default() -> Self {
        Self::new(DEFAULT_ARTWORK_SIZE)
    }
}

impl ArtworkCache {
    pub fn new(target_px: u32) -> Self {
        Self {
            fingerprint: Fingerprint::Unknown,
            image: None,
            target_px: target_px.max(1),
            generation: 0,
            decodes: 0,
        }
    }

    pub fn set_target_px(&mut self, target_px: u32) {
        self.target_px = target_px.max(1);
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub fn image(&self) -> Option<&Arc<Artwork>> {
        self.image.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.image.is_none()
    }

    /// Bumped whenever the displayed image changes.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn decode_count(&self) -> u64 {
        self.decodes
    }

    /// Forget the current payload so the next one is always decoded.
    pub fn invalidate(&mut self) {
        self.fingerprint = Fingerprint::Unknown;
        if self.image.take().is_some() {
            self.generation += 1;
        }
    }

    pub fn update(&mut self, payload: &[u8]) -> ArtworkChange {
        let fingerprint = Fingerprint::Length(payload.len());
        if fingerprint == self.fingerprint {
            return ArtworkChange::Unchanged;
        }

        // Recorded before decoding so broken bytes are not retried on every query.
        self.fingerprint = fingerprint;
        self.decodes += 1;
        self.generation += 1;

        match decode_artwork(payload, self.target_px) {
            Ok(artwork) => {
                self.image = Some(Arc::new(artwork));
                ArtworkChange::Replaced
            }
            Err(err) => {
                tracing::warn!(bytes = payload.len(), "artwork dropped: {err}");
                self.image = None;
                ArtworkChange::Cleared
            }
        }
    }
}

/// Decode into at most `target_px` square.
///
/// The first attempt caps decoder allocations at 48 MB and shrinks with
/// `thumbnail`. If that fails the image is decoded again without limits and
/// resized.
pub fn decode_artwork(bytes: &[u8], target_px: u32) -> Result<Artwork> {
    match decode_thumbnail(bytes, target_px) {
        Ok(artwork) => Ok(artwork),
        Err(err) => {
            tracing::debug!("bounded artwork decode failed, retrying full decode: {err}");
            decode_full(bytes, target_px)
        }
    }
}

fn decode_thumbnail(bytes: &[u8], target_px: u32) -> Result<Artwork> {
    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(ImageError::IoError)?;
    let mut limits = Limits::default();
    limits.max_alloc = Some(THUMBNAIL_ALLOC_LIMIT);
    reader.limits(limits);

    let image = reader.decode()?;
    let image = if image.width() > target_px || image.height() > target_px {
        image.thumbnail(target_px, target_px)
    } else {
        image
    };
    Ok(into_artwork(image))
}

fn decode_full(bytes: &[u8], target_px: u32) -> Result<Artwork> {
    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(ImageError::IoError)?;
    reader.no_limits();

    let image = reader.decode()?;
    let image = if image.width() > target_px || image.height() > target_px {
        image.resize(target_px, target_px, FilterType::Triangle)
    } else {
        image
    };
    Ok(into_artwork(image))
}

fn into_artwork(image: DynamicImage) -> Artwork {
    let image = image.to_rgba8();
    let size = [image.width() as usize, image.height() as usize];
    Artwork {
        size,
        rgba: image.into_raw(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([200, 40, 90, 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn decode_fails_on_garbage_input() {
        assert!(decode_artwork(&[0u8, 1, 2, 3], 300).is_err());
    }

    #[test]
    fn large_artwork_is_bounded() {
        let artwork = decode_artwork(&png(1200, 600), 300).unwrap();
        assert_eq!(artwork.size, [300, 150]);
        assert_eq!(artwork.rgba.len(), 300 * 150 * 4);
    }

    #[test]
    fn uncapped_decode_also_shrinks() {
        let artwork = decode_full(&png(900, 1800), 200).unwrap();
        assert_eq!(artwork.size, [100, 200]);
    }

    #[test]
    fn small_artwork_is_not_upscaled() {
        let artwork = decode_artwork(&png(64, 64), 300).unwrap();
        assert_eq!(artwork.size, [64, 64]);
    }

    #[test]
    fn identical_payloads_decode_once() {
        let mut cache = ArtworkCache::new(300);
        let bytes = png(32, 32);
        assert_eq!(cache.update(&bytes), ArtworkChange::Replaced);
        for _ in 0..5 {
            assert_eq!(cache.update(&bytes), ArtworkChange::Unchanged);
        }
        assert_eq!(cache.decode_count(), 1);
        assert_eq!(cache.fingerprint(), Fingerprint::Length(bytes.len()));
    }

    #[test]
    fn invalidate_forces_redecode() {
        let mut cache = ArtworkCache::new(300);
        let bytes = png(16, 16);
        cache.update(&bytes);
        let generation = cache.generation();
        cache.invalidate();
        assert!(cache.is_empty());
        assert_eq!(cache.fingerprint(), Fingerprint::Unknown);
        assert!(cache.generation() > generation);
        assert_eq!(cache.update(&bytes), ArtworkChange::Replaced);
        assert_eq!(cache.decode_count(), 2);
    }

    #[test]
    fn broken_payload_clears_and_is_not_retried() {
        let mut cache = ArtworkCache::new(300);
        cache.update(&png(8, 8));
        assert_eq!(cache.update(b"not an image"), ArtworkChange::Cleared);
        assert!(cache.is_empty());
        assert_eq!(cache.update(b"not an image"), ArtworkChange::Unchanged);
        assert_eq!(cache.decode_count(), 2);
    }
}
