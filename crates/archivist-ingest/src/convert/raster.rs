//! Scans and photos wrapped as single-page PDFs.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use image::ExtendedColorType;
use image::codecs::jpeg::JpegEncoder;
use lopdf::{Stream, dictionary};

use super::{ConvertError, Converter};
use crate::formats::IMAGE_EXTENSIONS;
use crate::pdfgen::PdfBuilder;

/// Pixels per inch used to size the page.
const RESOLUTION: f32 = 100.0;
const JPEG_QUALITY: u8 = 90;

/// Built-in renderer for `jpg`, `jpeg`, `png`, `tiff` and `tif`.
pub struct ImageRenderer;

impl Converter for ImageRenderer {
    fn name(&self) -> &'static str {
        "image renderer"
    }

    fn accepts(&self, ext: &str) -> bool {
        IMAGE_EXTENSIONS.contains(&ext)
    }

    fn convert<'a>(
        &'a self,
        input: &'a Path,
        target: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<(), ConvertError>> + Send + 'a>> {
        Box::pin(async move {
            let source = input.to_path_buf();
            let out = target.to_path_buf();

            tokio::task::spawn_blocking(move || {
                let mut doc = render_image_pdf(&source)?;
                doc.save(&out)
                    .map_err(|e| ConvertError::Render(e.to_string()))?;
                Ok::<_, ConvertError>(())
            })
            .await
            .map_err(|e| ConvertError::Render(e.to_string()))?
        })
    }
}

/// Re-encode the image as RGB JPEG and place it on a page of matching size.
pub(crate) fn render_image_pdf(path: &Path) -> Result<lopdf::Document, ConvertError> {
    let img = image::open(path).map_err(|e| ConvertError::Render(e.to_string()))?;
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
        .encode(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
        .map_err(|e| ConvertError::Render(e.to_string()))?;

    let page_w = width as f32 * 72.0 / RESOLUTION;
    let page_h = height as f32 * 72.0 / RESOLUTION;

    let mut builder = PdfBuilder::new();
    let image_id = builder.add_object(
        Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8_i64,
                "Filter" => "DCTDecode",
            },
            jpeg,
        )
        .with_compression(false),
    );

    let content = format!("q {page_w:.2} 0 0 {page_h:.2} 0 0 cm /Im0 Do Q").into_bytes();
    builder
        .add_page_raw(
            page_w,
            page_h,
            content,
            dictionary! { "XObject" => dictionary! { "Im0" => image_id } },
        )
        .map_err(|e| ConvertError::Render(e.to_string()))?;

    tracing::debug!(path = %path.display(), width, height, "rendered image page");
    Ok(builder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use lopdf::Object;

    fn write_png(path: &Path, width: u32, height: u32) {
        let img = RgbaImage::from_pixel(width, height, Rgba([200, 30, 30, 128]));
        img.save(path).unwrap();
    }

    #[test]
    fn page_is_sized_at_100_dpi() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("scan.png");
        write_png(&png, 200, 100);

        let doc = render_image_pdf(&png).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 1);
        let page = doc.get_dictionary(*pages.values().next().unwrap()).unwrap();
        let media_box = page.get(b"MediaBox").unwrap().as_array().unwrap();
        let width = match &media_box[2] {
            Object::Real(w) => *w as f64,
            other => panic!("unexpected media box entry {other:?}"),
        };
        assert!((width - 144.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn converts_png_to_target() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("photo.png");
        write_png(&png, 10, 10);

        let out = dir.path().join("photo.pdf");
        ImageRenderer.convert(&png, &out).await.unwrap();
        assert!(lopdf::Document::load(&out).is_ok());
    }

    #[tokio::test]
    async fn corrupt_image_is_a_render_error() {
        let dir = tempfile::tempdir().unwrap();
        let jpg = dir.path().join("broken.jpg");
        std::fs::write(&jpg, b"not a jpeg").unwrap();

        let err = ImageRenderer
            .convert(&jpg, &dir.path().join("broken.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::Render(_)));
    }
}
