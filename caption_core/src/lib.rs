//! Image captioning core: a lazily loaded BLIP model plus the per-request
//! inference pipeline that turns an image file into a short caption.

mod loader;
mod model;

pub use loader::{CaptionLoader, SharedLoader};
pub use model::{CaptionConfig, CaptionModel, EMPTY_CAPTION};
