//! Image header probing.

use image::ImageReader;
use std::io::Cursor;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Bytes of an original read when only its dimensions are needed.
pub const PROBE_PREFIX_BYTES: u64 = 256 * 1024;

/// Natural dimensions of an encoded image, from its header only.
/// `None` for non-images and formats the decoder does not know.
pub fn probe_image_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .ok()?;
    reader.format()?;
    reader.into_dimensions().ok()
}

/// Read at most `limit` bytes from `reader`.
pub async fn read_prefix<R>(reader: &mut R, limit: u64) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buffer = Vec::new();
    reader.take(limit).read_to_end(&mut buffer).await?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        RgbImage::new(width, height)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn reads_png_dimensions() {
        assert_eq!(probe_image_dimensions(&png(12, 8)), Some((12, 8)));
    }

    #[test]
    fn non_images_have_no_dimensions() {
        assert_eq!(probe_image_dimensions(b"ID3 not an image"), None);
        assert_eq!(probe_image_dimensions(b""), None);
    }

    #[tokio::test]
    async fn prefix_is_bounded() {
        let mut source: &[u8] = &[7u8; 1000];
        let prefix = read_prefix(&mut source, 100).await.unwrap();
        assert_eq!(prefix.len(), 100);
    }
}
