//! PNG export of the final image.

use crate::frame::PixelBuffer;
use anyhow::{anyhow, Context, Result};
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use std::io::{BufWriter, Write};
use std::thread::{self, JoinHandle};
use tracing::debug;

/// Encodes `image` as PNG into `writer`.
pub fn encode_png<W: Write>(image: &PixelBuffer, writer: W) -> Result<()> {
    let mut writer = BufWriter::new(writer);
    let row = image.tight_stride();
    let data: Vec<u8> = if image.is_tight() {
        image.data.clone()
    } else {
        image
            .data
            .chunks(image.stride)
            .flat_map(|line| &line[..row])
            .copied()
            .collect()
    };
    PngEncoder::new(&mut writer)
        .write_image(&data, image.width, image.height, ExtendedColorType::Rgba8)
        .context("failed to encode PNG")?;
    writer.flush().context("failed to flush PNG output")?;
    Ok(())
}

/// A PNG encode running on its own thread.
///
/// The export has to be joined before the process exits, otherwise the
/// output may be truncated.
pub struct PngExport {
    handle: JoinHandle<Result<()>>,
}

impl PngExport {
    pub fn spawn(image: PixelBuffer, writer: Box<dyn Write + Send>) -> Self {
        let handle = thread::spawn(move || {
            debug!("Encoding {}x{} PNG", image.width, image.height);
            encode_png(&image, writer)
        });
        Self { handle }
    }

    /// Waits for the encode to finish and returns its result.
    pub fn join(self) -> Result<()> {
        self.handle
            .join()
            .map_err(|_| anyhow!("PNG encoder thread panicked"))?
    }
}
