//! Image normalization for the Kobo renderer.
//!
//! Any image the device asks for comes back as a baseline JPEG. When the
//! source cannot be fetched or decoded the caller still gets a JPEG: a white
//! 800x600 canvas captioned with what went wrong.

use bytes::Bytes;
use font8x8::{BASIC_FONTS, UnicodeFonts};
use futures_util::StreamExt;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageReader, ImageResult, Rgb, RgbImage};
use reqwest::Client;
use std::collections::HashMap;
use std::io::Cursor;

pub const JPEG_QUALITY: u8 = 85;
pub const PLACEHOLDER_WIDTH: u32 = 800;
pub const PLACEHOLDER_HEIGHT: u32 = 600;
const CAPTION_X: u32 = 20;
const CAPTION_BASELINE: u32 = 300;
const GLYPH_SIZE: u32 = 8;

const CONVERTED_CACHE_CONTROL: &str = "public, max-age=3600";
const PLACEHOLDER_CACHE_CONTROL: &str = "public, max-age=300";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Failure {
    FetchFailed,
    NotFound,
    TooLarge,
    DecodeFailed,
    EncodeFailed,
}

impl Failure {
    pub const ALL: [Failure; 5] = [
        Failure::FetchFailed,
        Failure::NotFound,
        Failure::TooLarge,
        Failure::DecodeFailed,
        Failure::EncodeFailed,
    ];

    pub fn caption(self) -> &'static str {
        match self {
            Failure::FetchFailed => "Image fetch failed",
            Failure::NotFound => "Image not found",
            Failure::TooLarge => "Image too large",
            Failure::DecodeFailed => "Image decoding failed",
            Failure::EncodeFailed => "Image encoding failed",
        }
    }
}

#[derive(Debug, Clone)]
pub enum ConvertedImage {
    Converted(Bytes),
    Placeholder(Failure, Bytes),
}

impl ConvertedImage {
    pub fn bytes(&self) -> Bytes {
        match self {
            ConvertedImage::Converted(bytes) | ConvertedImage::Placeholder(_, bytes) => bytes.clone(),
        }
    }

    pub fn cache_control(&self) -> &'static str {
        match self {
            ConvertedImage::Converted(_) => CONVERTED_CACHE_CONTROL,
            ConvertedImage::Placeholder(..) => PLACEHOLDER_CACHE_CONTROL,
        }
    }

    pub fn failure(&self) -> Option<Failure> {
        match self {
            ConvertedImage::Converted(_) => None,
            ConvertedImage::Placeholder(failure, _) => Some(*failure),
        }
    }
}

pub struct ImageConverter {
    http: Client,
    max_bytes: usize,
    placeholders: HashMap<Failure, Bytes>,
}

impl ImageConverter {
    /// Placeholders are rendered up front so that `convert` has no failure
    /// path of its own. `http` should carry the image fetch timeout.
    pub fn new(http: Client, max_bytes: usize) -> ImageResult<Self> {
        let mut placeholders = HashMap::new();
        for failure in Failure::ALL {
            placeholders.insert(failure, Bytes::from(render_placeholder(failure.caption())?));
        }

        Ok(Self {
            http,
            max_bytes,
            placeholders,
        })
    }

    pub async fn convert(&self, url: &str) -> ConvertedImage {
        let result = match self.fetch(url).await {
            Ok(body) => to_jpeg(&body),
            Err(failure) => Err(failure),
        };

        match result {
            Ok(jpeg) => ConvertedImage::Converted(Bytes::from(jpeg)),
            Err(failure) => {
                tracing::warn!(image_url = %url, reason = failure.caption(), "serving placeholder image");
                ConvertedImage::Placeholder(failure, self.placeholder(failure))
            }
        }
    }

    pub fn placeholder(&self, failure: Failure) -> Bytes {
        self.placeholders.get(&failure).cloned().unwrap_or_default()
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, Failure> {
        let response = self.http.get(url).send().await.map_err(|e| {
            tracing::warn!(image_url = %url, error = %e, "failed to fetch image");
            Failure::FetchFailed
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(image_url = %url, status = status.as_u16(), "image host returned an error");
            return Err(Failure::NotFound);
        }

        if let Some(length) = response.content_length() {
            if length > self.max_bytes as u64 {
                return Err(Failure::TooLarge);
            }
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                tracing::warn!(image_url = %url, error = %e, "failed to read image body");
                Failure::FetchFailed
            })?;
            if body.len() + chunk.len() > self.max_bytes {
                return Err(Failure::TooLarge);
            }
            body.extend_from_slice(&chunk);
        }

        Ok(body)
    }
}

/// Decodes any supported format and re-encodes it as an RGB JPEG.
pub fn to_jpeg(source: &[u8]) -> Result<Vec<u8>, Failure> {
    let decoded = ImageReader::new(Cursor::new(source))
        .with_guessed_format()
        .map_err(|_| Failure::DecodeFailed)?
        .decode()
        .map_err(|e| {
            tracing::debug!(error = %e, "image decode failed");
            Failure::DecodeFailed
        })?;

    encode_jpeg(&decoded.to_rgb8()).map_err(|e| {
        tracing::warn!(error = %e, "jpeg encode failed");
        Failure::EncodeFailed
    })
}

fn encode_jpeg(image: &RgbImage) -> ImageResult<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    let mut encoder = JpegEncoder::new_with_quality(&mut cursor, JPEG_QUALITY);
    encoder.encode_image(image)?;
    Ok(cursor.into_inner())
}

pub fn render_placeholder(caption: &str) -> ImageResult<Vec<u8>> {
    let mut canvas = RgbImage::from_pixel(PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT, Rgb([255, 255, 255]));
    draw_text(&mut canvas, caption, CAPTION_X, CAPTION_BASELINE);
    encode_jpeg(&canvas)
}

fn draw_text(canvas: &mut RgbImage, text: &str, x: u32, baseline: u32) {
    let top = baseline.saturating_sub(GLYPH_SIZE);
    for (i, ch) in text.chars().enumerate() {
        let Some(glyph) = BASIC_FONTS.get(ch) else {
            continue;
        };
        let left = x + i as u32 * GLYPH_SIZE;
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..GLYPH_SIZE {
                // bit 0 is the leftmost pixel
                if bits & (1 << col) == 0 {
                    continue;
                }
                let (px, py) = (left + col, top + row as u32);
                if px < canvas.width() && py < canvas.height() {
                    canvas.put_pixel(px, py, Rgb([0, 0, 0]));
                }
            }
        }
    }
}
