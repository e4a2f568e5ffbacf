//! Host-side RGBA8 images and the full-screen vertex data.

use crate::error::{Error, Result};
use bytemuck::{Pod, Zeroable};

/// Bytes per RGBA8 pixel.
pub const BYTES_PER_PIXEL: usize = 4;

/// An RGBA8 image in host memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Distance between the starts of two rows, in bytes
    pub stride: usize,
    /// Raw pixel data, row-major
    pub data: Vec<u8>,
}

impl PixelBuffer {
    /// Creates a tightly packed buffer from existing data.
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        Self::with_stride(width, height, width as usize * BYTES_PER_PIXEL, data)
    }

    /// Creates a buffer whose rows may carry padding.
    pub fn with_stride(width: u32, height: u32, stride: usize, data: Vec<u8>) -> Result<Self> {
        let expected = stride * height as usize;
        if data.len() != expected {
            return Err(Error::PixelDataSize {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            stride,
            data,
        })
    }

    /// Row stride of a tightly packed image of this width.
    pub fn tight_stride(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    pub fn is_tight(&self) -> bool {
        self.stride == self.tight_stride()
    }

    /// Returns the RGBA value at (x, y).
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let start = y as usize * self.stride + x as usize * BYTES_PER_PIXEL;
        let mut out = [0; 4];
        out.copy_from_slice(&self.data[start..start + BYTES_PER_PIXEL]);
        out
    }

    /// Drops row padding, e.g. after a GPU readback with aligned rows.
    pub fn into_tight(self) -> Self {
        if self.is_tight() {
            return self;
        }
        let row = self.tight_stride();
        let mut data = Vec::with_capacity(row * self.height as usize);
        for y in 0..self.height as usize {
            let start = y * self.stride;
            data.extend_from_slice(&self.data[start..start + row]);
        }
        Self {
            width: self.width,
            height: self.height,
            stride: row,
            data,
        }
    }
}

impl From<image::RgbaImage> for PixelBuffer {
    fn from(image: image::RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            stride: width as usize * BYTES_PER_PIXEL,
            data: image.into_raw(),
        }
    }
}

impl TryFrom<PixelBuffer> for image::RgbaImage {
    type Error = Error;

    fn try_from(buffer: PixelBuffer) -> Result<Self> {
        let buffer = buffer.into_tight();
        let expected = buffer.tight_stride() * buffer.height as usize;
        let actual = buffer.data.len();
        image::RgbaImage::from_raw(buffer.width, buffer.height, buffer.data)
            .ok_or(Error::PixelDataSize { expected, actual })
    }
}

/// Vertex for the full-screen triangle.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct ScreenVertex {
    pub position: [f32; 2],
    pub tex_coords: [f32; 2],
}

impl ScreenVertex {
    /// One triangle covering clip space; texture coordinates run 0..1 over
    /// the visible area with v pointing down.
    pub const TRIANGLE: &'static [ScreenVertex] = &[
        ScreenVertex { position: [-1.0, -1.0], tex_coords: [0.0, 1.0] },
        ScreenVertex { position: [3.0, -1.0], tex_coords: [2.0, 1.0] },
        ScreenVertex { position: [-1.0, 3.0], tex_coords: [0.0, -1.0] },
    ];

    /// Returns the vertex buffer layout.
    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<ScreenVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_data_length() {
        let err = PixelBuffer::from_rgba(2, 2, vec![0; 15]).unwrap_err();
        assert!(matches!(err, Error::PixelDataSize { expected: 16, actual: 15 }));
    }

    #[test]
    fn strips_row_padding() {
        // 1x2 image with 4 bytes of padding per row
        let data = vec![1, 2, 3, 4, 0, 0, 0, 0, 5, 6, 7, 8, 0, 0, 0, 0];
        let padded = PixelBuffer::with_stride(1, 2, 8, data).unwrap();
        assert!(!padded.is_tight());

        let tight = padded.into_tight();
        assert!(tight.is_tight());
        assert_eq!(tight.data, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(tight.pixel(0, 1), [5, 6, 7, 8]);
    }

    #[test]
    fn converts_to_and_from_image() {
        let image = image::RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 255]));
        let buffer = PixelBuffer::from(image.clone());
        assert_eq!(buffer.stride, 12);
        assert_eq!(buffer.pixel(2, 1), [10, 20, 30, 255]);

        let back = image::RgbaImage::try_from(buffer).unwrap();
        assert_eq!(back, image);
    }

    #[test]
    fn triangle_covers_clip_space() {
        // uv follows clip position with v flipped
        assert_eq!(ScreenVertex::TRIANGLE.len(), 3);
        for v in ScreenVertex::TRIANGLE {
            let u = (v.position[0] + 1.0) / 2.0;
            let w = (1.0 - v.position[1]) / 2.0;
            assert_eq!([u, w], v.tex_coords);
        }
    }
}
