//! Transformation backends
//!
//! The job controller treats the actual portrait transformation as an opaque
//! step behind [`Transformer`]. [`SimulatedTransformer`] stands in for a real
//! model: it tints, softens and vignettes the photo according to the style and
//! parameters so results are visibly different per request.

use image::{DynamicImage, RgbImage};
use palette::{LinSrgb, Mix, Srgb};

use crate::catalog::StyleDefinition;
use crate::error::JobError;
use crate::image_loader::ImageHandle;
use crate::params::ParameterSet;

/// Everything a backend needs to produce one portrait
#[derive(Debug, Clone, Copy)]
pub struct TransformRequest<'a> {
    pub source: &'a ImageHandle,
    pub style: &'a StyleDefinition,
    pub parameters: &'a ParameterSet,
}

/// A backend that turns a source photo into a styled portrait
pub trait Transformer: Send + Sync {
    fn name(&self) -> &str;

    /// Produce the result image, or fail without side effects
    fn transform(&self, request: &TransformRequest<'_>) -> Result<ImageHandle, JobError>;
}

/// Local stand-in for a generation model
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedTransformer;

/// Edge length of placeholder results for URI sources
const PLACEHOLDER_SIZE: u32 = 400;

impl Transformer for SimulatedTransformer {
    fn name(&self) -> &str {
        "simulated"
    }

    fn transform(&self, request: &TransformRequest<'_>) -> Result<ImageHandle, JobError> {
        if request.source.uri().is_some() {
            return Ok(ImageHandle::from_uri(
                format!(
                    "/placeholder.svg?height={0}&width={0}&text=Generated+{1}+Portrait",
                    PLACEHOLDER_SIZE, request.style.id
                ),
                PLACEHOLDER_SIZE,
                PLACEHOLDER_SIZE,
            ));
        }

        let decoded = request
            .source
            .decode()
            .map_err(|e| JobError::Transform(e.to_string()))?;
        let styled = stylize(&decoded.to_rgb8(), &request.style.id, request.parameters);

        ImageHandle::from_image(&DynamicImage::ImageRgb8(styled))
            .map_err(|e| JobError::Transform(e.to_string()))
    }
}

/// Accent colour blended into each theme
pub fn accent_for(style_id: &str) -> Srgb<u8> {
    match style_id {
        "queen" => Srgb::new(214, 150, 120),
        "priest" => Srgb::new(236, 226, 200),
        "scribe" => Srgb::new(200, 172, 120),
        "warrior" => Srgb::new(176, 120, 60),
        "goddess" => Srgb::new(64, 180, 170),
        _ => Srgb::new(212, 175, 55),
    }
}

/// Apply the simulated style to an RGB image
pub fn stylize(image: &RgbImage, style_id: &str, params: &ParameterSet) -> RgbImage {
    let softened = soften(image, params.detail_level());

    let accent: LinSrgb = accent_for(style_id).into_format::<f32>().into_linear();
    let tint = f32::from(params.color_intensity()) / 100.0 * 0.6;
    let vignette = f32::from(params.background_style()) / 100.0 * 0.5;
    // Higher face accuracy keeps the centre of the frame closer to the photo
    let preserve = f32::from(params.face_accuracy().saturating_sub(70)) / 30.0 * 0.5;

    let (width, height) = softened.dimensions();
    let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);
    let max_dist = (cx * cx + cy * cy).sqrt().max(1.0);

    let mut out = RgbImage::new(width, height);
    for (x, y, pixel) in softened.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        let lin: LinSrgb = Srgb::new(r, g, b).into_format::<f32>().into_linear();

        let dx = x as f32 + 0.5 - cx;
        let dy = y as f32 + 0.5 - cy;
        let dist = (dx * dx + dy * dy).sqrt() / max_dist;

        let luminance = 0.2126 * lin.red + 0.7152 * lin.green + 0.0722 * lin.blue;
        let target = accent * luminance * 2.0;
        let strength = (tint * (1.0 - preserve * (1.0 - dist))).clamp(0.0, 1.0);
        let shade = 1.0 - vignette * dist * dist;

        let mixed = lin.mix(target, strength) * shade;
        let srgb: Srgb<f32> = Srgb::from_linear(mixed);
        let srgb = Srgb::new(
            srgb.red.clamp(0.0, 1.0),
            srgb.green.clamp(0.0, 1.0),
            srgb.blue.clamp(0.0, 1.0),
        )
        .into_format::<u8>();
        out.put_pixel(x, y, image::Rgb([srgb.red, srgb.green, srgb.blue]));
    }
    out
}

/// Lower detail levels blur the photo slightly
fn soften(image: &RgbImage, detail_level: u8) -> RgbImage {
    let sigma = f32::from(100u8.saturating_sub(detail_level)) / 25.0;
    if sigma <= 0.0 {
        return image.clone();
    }
    imageproc::filter::gaussian_blur_f32(image, sigma)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StyleCatalog;
    use crate::image_loader::tests::png_bytes;
    use crate::params::ParameterField;

    fn request_for<'a>(
        source: &'a ImageHandle,
        style: &'a StyleDefinition,
        parameters: &'a ParameterSet,
    ) -> TransformRequest<'a> {
        TransformRequest {
            source,
            style,
            parameters,
        }
    }

    #[test]
    fn test_bytes_source_produces_png_of_same_size() {
        let catalog = StyleCatalog::builtin();
        let source = ImageHandle::from_bytes(png_bytes(16, 10)).unwrap();
        let params = ParameterSet::default();
        let result = SimulatedTransformer
            .transform(&request_for(&source, catalog.default_style(), &params))
            .unwrap();

        assert_eq!((result.width(), result.height()), (16, 10));
        assert_eq!(result.extension(), "png");
        assert_ne!(result, source);
    }

    #[test]
    fn test_uri_source_gives_placeholder() {
        let catalog = StyleCatalog::builtin();
        let source = ImageHandle::from_uri("/uploads/me.jpg", 640, 480);
        let params = ParameterSet::default();
        let style = catalog.find_style("queen").unwrap();
        let result = SimulatedTransformer
            .transform(&request_for(&source, style, &params))
            .unwrap();

        assert!(result.uri().unwrap().contains("queen"));
        assert_eq!(result.width(), PLACEHOLDER_SIZE);
    }

    #[test]
    fn test_truncated_source_fails() {
        let catalog = StyleCatalog::builtin();
        let mut bytes = png_bytes(32, 32);
        bytes.truncate(45);
        // Header still parses, body does not
        let source = ImageHandle::from_bytes(bytes).unwrap();
        let params = ParameterSet::default();
        let err = SimulatedTransformer
            .transform(&request_for(&source, catalog.default_style(), &params))
            .unwrap_err();
        assert!(matches!(err, JobError::Transform(_)));
    }

    #[test]
    fn test_zero_intensity_keeps_centre_close() {
        let image = RgbImage::from_pixel(9, 9, image::Rgb([100, 100, 100]));
        let params = ParameterSet::default()
            .with(ParameterField::ColorIntensity, 30)
            .with(ParameterField::BackgroundStyle, 0)
            .with(ParameterField::DetailLevel, 100);
        let out = stylize(&image, "pharaoh", &params);
        let centre = out.get_pixel(4, 4).0;
        for channel in centre {
            assert!((i32::from(channel) - 100).abs() < 40, "{:?}", centre);
        }
    }

    #[test]
    fn test_styles_have_distinct_accents() {
        let catalog = StyleCatalog::builtin();
        let mut accents: Vec<_> = catalog
            .list_styles()
            .iter()
            .map(|s| accent_for(&s.id))
            .collect();
        accents.dedup();
        assert_eq!(accents.len(), catalog.list_styles().len());
    }
}
