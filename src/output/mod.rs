//! Output backends for the rendered image.

pub mod png_output;
pub mod window_output;

pub use png_output::{encode_png, PngExport};
pub use window_output::{WindowConfig, WindowPresenter};
