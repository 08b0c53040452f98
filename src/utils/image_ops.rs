use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use crate::core::errors::{OcrError, OcrResult, PipelineError, PipelineResult};
use crate::core::types::Rect;
use crate::services::translation::cache::image_hash;

/// Crop a box out of an image, clamped to its bounds.
///
/// Returns `None` when nothing of the box lies inside the image.
pub fn crop_region(img: &DynamicImage, rect: &Rect) -> Option<DynamicImage> {
    let (img_w, img_h) = img.dimensions();
    let x0 = rect.x.max(0.0).floor() as u32;
    let y0 = rect.y.max(0.0).floor() as u32;
    let x1 = (rect.max_x().ceil().max(0.0) as u32).min(img_w);
    let y1 = (rect.max_y().ceil().max(0.0) as u32).min(img_h);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(img.crop_imm(x0, y0, x1 - x0, y1 - y0))
}

/// Asynchronously encode an image to PNG bytes using spawn_blocking.
pub async fn encode_png_async(img: Arc<DynamicImage>) -> OcrResult<Vec<u8>> {
    tokio::task::spawn_blocking(move || {
        let mut png_bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut png_bytes), ImageFormat::Png)
            .map_err(|e| OcrError::InvalidImage(format!("PNG encoding failed: {}", e)))?;
        Ok(png_bytes)
    })
    .await
    .map_err(|e| OcrError::InferenceError(format!("PNG encoding task failed: {}", e)))?
}

/// Asynchronously decode image bytes using spawn_blocking.
pub async fn decode_image_async(bytes: Vec<u8>) -> OcrResult<DynamicImage> {
    tokio::task::spawn_blocking(move || {
        image::load_from_memory(&bytes).map_err(|e| OcrError::InvalidImage(e.to_string()))
    })
    .await
    .map_err(|e| OcrError::InferenceError(format!("image decoding task failed: {}", e)))?
}

/// Read a page from disk, returning its decoded pixels and content hash
pub async fn load_page_image(path: &Path) -> PipelineResult<(Arc<DynamicImage>, String)> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| PipelineError::ImageLoad {
            path: path.display().to_string(),
            detail: e.to_string(),
        })?;
    let hash = image_hash(&bytes);
    let image = decode_image_async(bytes).await?;
    Ok((Arc::new(image), hash))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crop_region_clamps_to_bounds() {
        let img = DynamicImage::new_rgb8(100, 50);
        let crop = crop_region(&img, &Rect::new(80.0, 40.0, 50.0, 50.0)).unwrap();
        assert_eq!(crop.dimensions(), (20, 10));

        let crop = crop_region(&img, &Rect::new(-5.0, 10.5, 20.0, 10.0)).unwrap();
        assert_eq!(crop.dimensions(), (15, 11));
    }

    #[test]
    fn test_crop_region_outside_is_none() {
        let img = DynamicImage::new_rgb8(100, 50);
        assert!(crop_region(&img, &Rect::new(120.0, 0.0, 10.0, 10.0)).is_none());
        assert!(crop_region(&img, &Rect::new(10.0, 10.0, 0.0, 0.0)).is_none());
    }

    #[tokio::test]
    async fn test_decode_rejects_garbage() {
        let err = decode_image_async(b"not an image".to_vec()).await.unwrap_err();
        assert!(matches!(err, OcrError::InvalidImage(_)));
    }

    #[tokio::test]
    async fn test_load_page_image_hashes_raw_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.png");
        DynamicImage::new_rgb8(4, 3).save(&path).unwrap();

        let (image, hash) = load_page_image(&path).await.unwrap();
        assert_eq!(image.dimensions(), (4, 3));
        assert_eq!(hash, image_hash(&std::fs::read(&path).unwrap()));
    }

    #[tokio::test]
    async fn test_load_missing_page() {
        let err = load_page_image(Path::new("/nonexistent/page.png")).await.unwrap_err();
        assert!(matches!(err, PipelineError::ImageLoad { .. }));
    }
}
