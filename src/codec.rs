use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageResult, RgbImage};

/// Encode a frame as JPEG at the given quality (1-100)
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> ImageResult<Vec<u8>> {
    let mut buf = Vec::with_capacity((image.width() * image.height()) as usize / 4);
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100)).encode_image(image)?;
    Ok(buf)
}

/// JPEG-encode and base64 the result for JSON transport
pub fn jpeg_base64(image: &RgbImage, quality: u8) -> ImageResult<String> {
    encode_jpeg(image, quality).map(|bytes| BASE64.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jpeg_has_soi_marker() {
        let image = RgbImage::from_pixel(16, 16, image::Rgb([200, 10, 10]));
        let bytes = encode_jpeg(&image, 75).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn base64_decodes_back_to_jpeg() {
        let image = RgbImage::new(8, 8);
        let encoded = jpeg_base64(&image, 85).unwrap();
        let decoded = BASE64.decode(encoded).unwrap();
        assert_eq!(&decoded[..2], &[0xFF, 0xD8]);
    }
}
