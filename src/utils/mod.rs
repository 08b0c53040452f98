pub mod image_ops;
pub mod metrics;

// Re-export commonly used items
pub use image_ops::{crop_region, decode_image_async, encode_png_async, load_page_image};
pub use metrics::{Metrics, MetricsSnapshot};
