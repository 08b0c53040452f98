//! OCR one page and print its bubbles in reading order
//! Run with: cargo run --release --bin ocr_page -- <image_path> [ja|en|zh-Hant]

use anyhow::{Context, Result};
use manga_translator::{
    core::{Config, Language},
    load_page_image,
    services::{OcrRouter, PageOcr},
    Metrics,
};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("manga_translator::services=debug")
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let image_path = args.get(1).map(String::as_str).unwrap_or("test_sample.png");
    let language: Language = match args.get(2) {
        Some(code) => code.parse()?,
        None => Language::Japanese,
    };

    if !Path::new(image_path).exists() {
        eprintln!("Image not found: {}", image_path);
        std::process::exit(1);
    }

    let config = Arc::new(Config::new().context("Failed to load configuration")?);

    info!("Loading image: {}", image_path);
    let (image, hash) = load_page_image(Path::new(image_path)).await?;
    info!(
        "Image dimensions: {}x{} (sha256 {})",
        image.width(),
        image.height(),
        &hash[..12]
    );

    let router = OcrRouter::new(config, Metrics::new());
    let bubbles = router.recognize_page(image, language).await?;

    println!("\n=== {} bubbles ({}) ===", bubbles.len(), language.display_name());
    if bubbles.is_empty() {
        println!("  (none)");
    }
    for bubble in &bubbles {
        println!(
            "  {:>2}. [{:.0},{:.0} {:.0}x{:.0}] {}",
            bubble.index,
            bubble.bbox.x,
            bubble.bbox.y,
            bubble.bbox.width,
            bubble.bbox.height,
            bubble.text
        );
    }

    Ok(())
}
