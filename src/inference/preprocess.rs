//! Image normalization shared by both pipeline stages.
//!
//! Weights were trained against a specific transform, so every prediction
//! goes through exactly this sequence: decode, 601-2 luma, 224×224 bicubic
//! resize, scale to `[0, 1]`.

use std::io::Cursor;

use image::{DynamicImage, GrayImage, ImageReader, Limits, Luma};

use super::resample::resize_bicubic;
use super::InferenceError;

/// Side length of the square model input.
pub const INPUT_SIZE: u32 = 224;

/// Largest accepted width or height, checked against the header before decoding.
pub const MAX_SIDE: u32 = 8192;

/// Decoder allocation ceiling per image.
const MAX_DECODE_BYTES: u64 = 128 * 1024 * 1024;

/// Normalized single-channel pixels in row-major order, logically `[1, H, W, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    data: Vec<f32>,
}

impl ImageTensor {
    pub fn shape() -> [usize; 4] {
        [1, INPUT_SIZE as usize, INPUT_SIZE as usize, 1]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    #[cfg(test)]
    pub(crate) fn filled(value: f32) -> Self {
        Self {
            data: vec![value; (INPUT_SIZE * INPUT_SIZE) as usize],
        }
    }
}

/// Decode `bytes` and produce the model input tensor.
pub fn preprocess(bytes: &[u8]) -> Result<ImageTensor, InferenceError> {
    if bytes.is_empty() {
        return Err(InferenceError::InvalidImage("empty upload".into()));
    }
    let img = decode(bytes)?;
    Ok(tensor_from_gray(&to_grayscale(&img)))
}

fn decode(bytes: &[u8]) -> Result<DynamicImage, InferenceError> {
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_SIDE);
    limits.max_image_height = Some(MAX_SIDE);
    limits.max_alloc = Some(MAX_DECODE_BYTES);

    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| InferenceError::InvalidImage(e.to_string()))?;
    reader.limits(limits);
    reader
        .decode()
        .map_err(|e| InferenceError::InvalidImage(e.to_string()))
}

/// ITU-R 601-2 luma in 16-bit fixed point, rounding half up.
fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((r as u32 * 19595 + g as u32 * 38470 + b as u32 * 7471 + 0x8000) >> 16) as u8
}

/// Collapse to one channel. Alpha is dropped, not composited.
pub fn to_grayscale(img: &DynamicImage) -> GrayImage {
    match img {
        DynamicImage::ImageLuma8(gray) => gray.clone(),
        DynamicImage::ImageRgb8(rgb) => GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
            let p = rgb.get_pixel(x, y);
            Luma([luma(p[0], p[1], p[2])])
        }),
        DynamicImage::ImageRgba8(rgba) => GrayImage::from_fn(rgba.width(), rgba.height(), |x, y| {
            let p = rgba.get_pixel(x, y);
            Luma([luma(p[0], p[1], p[2])])
        }),
        other => {
            let rgb = other.to_rgb8();
            GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
                let p = rgb.get_pixel(x, y);
                Luma([luma(p[0], p[1], p[2])])
            })
        }
    }
}

fn tensor_from_gray(gray: &GrayImage) -> ImageTensor {
    let resized;
    let src = if gray.dimensions() == (INPUT_SIZE, INPUT_SIZE) {
        gray
    } else {
        resized = resize_bicubic(gray, INPUT_SIZE, INPUT_SIZE);
        &resized
    };
    let data = src.as_raw().iter().map(|&v| v as f32 / 255.0).collect();
    ImageTensor { data }
}

#[cfg(test)]
pub(crate) fn encode_png(img: DynamicImage) -> Vec<u8> {
    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png)
        .expect("png encode");
    buf.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb, Rgba};

    #[test]
    fn luma_matches_reference_weights() {
        assert_eq!(luma(0, 0, 0), 0);
        assert_eq!(luma(255, 255, 255), 255);
        assert_eq!(luma(255, 0, 0), 76);
        assert_eq!(luma(0, 255, 0), 150);
        assert_eq!(luma(0, 0, 255), 29);
    }

    #[test]
    fn output_has_model_shape_and_unit_range() {
        let img = ImageBuffer::from_fn(640, 480, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]));
        let bytes = encode_png(DynamicImage::ImageRgb8(img));
        let tensor = preprocess(&bytes).expect("preprocess");

        assert_eq!(ImageTensor::shape(), [1, 224, 224, 1]);
        assert_eq!(tensor.as_slice().len(), 224 * 224);
        assert!(tensor.as_slice().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn native_size_color_input_is_exact() {
        let img = ImageBuffer::from_pixel(INPUT_SIZE, INPUT_SIZE, Rgb([255u8, 0, 0]));
        let bytes = encode_png(DynamicImage::ImageRgb8(img));
        let tensor = preprocess(&bytes).unwrap();
        let expected = 76.0 / 255.0;
        assert!(tensor.as_slice().iter().all(|&v| v == expected));
    }

    #[test]
    fn alpha_channel_is_ignored() {
        let opaque = ImageBuffer::from_pixel(INPUT_SIZE, INPUT_SIZE, Rgba([10u8, 200, 30, 255]));
        let clear = ImageBuffer::from_pixel(INPUT_SIZE, INPUT_SIZE, Rgba([10u8, 200, 30, 0]));
        let a = preprocess(&encode_png(DynamicImage::ImageRgba8(opaque))).unwrap();
        let b = preprocess(&encode_png(DynamicImage::ImageRgba8(clear))).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn uniform_image_stays_uniform_after_resize() {
        let img = ImageBuffer::from_pixel(50, 900, Luma([200u8]));
        let tensor = preprocess(&encode_png(DynamicImage::ImageLuma8(img))).unwrap();
        let expected = 200.0 / 255.0;
        assert!(tensor
            .as_slice()
            .iter()
            .all(|&v| (v - expected).abs() <= 1.0 / 255.0));
    }

    #[test]
    fn same_bytes_same_tensor() {
        let img = ImageBuffer::from_fn(300, 120, |x, y| Luma([((x * y) % 256) as u8]));
        let bytes = encode_png(DynamicImage::ImageLuma8(img));
        assert_eq!(preprocess(&bytes).unwrap(), preprocess(&bytes).unwrap());
    }

    #[test]
    fn oversized_dimensions_are_rejected_before_decoding() {
        let img = ImageBuffer::from_pixel(MAX_SIDE + 1, 1, Luma([0u8]));
        let err = preprocess(&encode_png(DynamicImage::ImageLuma8(img))).unwrap_err();
        assert!(matches!(err, InferenceError::InvalidImage(_)));

        let tall = ImageBuffer::from_pixel(1, MAX_SIDE + 1, Luma([0u8]));
        let err = preprocess(&encode_png(DynamicImage::ImageLuma8(tall))).unwrap_err();
        assert!(matches!(err, InferenceError::InvalidImage(_)));
    }

    #[test]
    fn resize_follows_fixed_point_resampler() {
        let gray = ImageBuffer::from_fn(300, 500, |x, y| {
            Luma([((x * 7 + y * 13 + (x * y) % 31) % 256) as u8])
        });
        let tensor = preprocess(&encode_png(DynamicImage::ImageLuma8(gray.clone()))).unwrap();
        let expected = resize_bicubic(&gray, INPUT_SIZE, INPUT_SIZE);
        let expected: Vec<f32> = expected.as_raw().iter().map(|&v| v as f32 / 255.0).collect();
        assert_eq!(tensor.as_slice(), expected.as_slice());
        // top-left pixel of the known 300x500 fixture
        assert_eq!(tensor.as_slice()[0], 10.0 / 255.0);
    }

    #[test]
    fn garbage_is_invalid_image() {
        let err = preprocess(b"definitely not an image").unwrap_err();
        assert!(matches!(err, InferenceError::InvalidImage(_)));
        assert!(matches!(preprocess(&[]).unwrap_err(), InferenceError::InvalidImage(_)));
    }
}
