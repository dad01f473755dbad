use image::imageops::FilterType;
use ndarray::{Array, Ix4};
use thiserror::Error;

pub const INPUT_WIDTH: u32 = 224;
pub const INPUT_HEIGHT: u32 = 224;
pub const INPUT_CHANNELS: usize = 3;

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("Error reading image: {0}")]
    Read(#[from] std::io::Error),
    #[error("Error decoding image: {0}")]
    Decode(#[from] image::ImageError),
}

/// Shape of the classifier input: NHWC with a batch of one.
pub fn input_shape() -> (usize, usize, usize, usize) {
    (
        1,
        INPUT_HEIGHT as usize,
        INPUT_WIDTH as usize,
        INPUT_CHANNELS,
    )
}

/// Decodes `image_data`, stretches it to 224x224 RGB and scales every
/// channel into [0, 1].
pub fn transform_image(image_data: &[u8]) -> Result<Array<f32, Ix4>, PreprocessError> {
    let image_reader =
        image::ImageReader::new(std::io::Cursor::new(image_data)).with_guessed_format()?;

    let original_img = image_reader.decode()?;
    tracing::debug!(
        width = original_img.width(),
        height = original_img.height(),
        "decoded image"
    );

    let img = original_img
        .resize_exact(INPUT_WIDTH, INPUT_HEIGHT, FilterType::CatmullRom)
        .to_rgb8();

    let mut input = Array::zeros(input_shape());
    for (x, y, pixel) in img.enumerate_pixels() {
        let x = x as usize;
        let y = y as usize;
        let [r, g, b] = pixel.0;
        input[[0, y, x, 0]] = (r as f32) / 255.;
        input[[0, y, x, 1]] = (g as f32) / 255.;
        input[[0, y, x, 2]] = (b as f32) / 255.;
    }

    Ok(input)
}
