//! Классический рендер художественного QR из командной строки

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use image::DynamicImage;
use qr_art_core::{parse_color, render_art_qr, BlendMode, ClassicOptions, ScanVerifier, Style};

#[derive(Parser, Debug)]
#[command(version, about = "Render a scannable QR code over a background image")]
struct Args {
    /// Text or URL to encode
    #[arg(long)]
    data: String,

    /// Background image (a green gradient is used when omitted)
    #[arg(long)]
    image: Option<PathBuf>,

    #[arg(long, default_value = "out.png")]
    out: PathBuf,

    /// Output size in pixels
    #[arg(long, default_value_t = 1024, value_parser = clap::value_parser!(u32).range(1..))]
    size: u32,

    /// Quiet zone in modules
    #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(u8).range(0..=10))]
    border: u8,

    #[arg(long, default_value = "#000000")]
    dark: String,

    #[arg(long, default_value = "#ffffff")]
    light: String,

    #[arg(long, default_value_t = 0.62)]
    dark_alpha: f32,

    #[arg(long, default_value_t = 0.18)]
    light_alpha: f32,

    /// How hard modules are forced dark/light (0-1)
    #[arg(long, default_value_t = 1.0)]
    strength: f32,

    /// How much background texture survives (0-1)
    #[arg(long, default_value_t = 0.85)]
    texture: f32,

    /// sharp or organic
    #[arg(long, default_value = "sharp")]
    mode: BlendMode,

    /// Corner radius in pixels
    #[arg(long = "round", default_value_t = 36)]
    rounded: u32,

    /// Let finder patterns take the background like other modules
    #[arg(long)]
    no_preserve_finders: bool,

    /// Decode the result and report whether it scans
    #[arg(long)]
    verify: bool,
}

impl Args {
    fn options(&self) -> anyhow::Result<ClassicOptions> {
        Ok(ClassicOptions {
            out_size: self.size,
            border_modules: self.border as usize,
            dark_color: parse_color(&self.dark)?,
            light_color: parse_color(&self.light)?,
            style: Style {
                dark_alpha: self.dark_alpha,
                light_alpha: self.light_alpha,
                rounded_radius: self.rounded,
                preserve_finders: !self.no_preserve_finders,
                strength: self.strength,
                texture: self.texture,
                mode: self.mode,
            },
        })
    }
}

fn is_jpeg(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let background = args
        .image
        .as_ref()
        .map(|path| image::open(path).with_context(|| format!("failed to open {}", path.display())))
        .transpose()?;

    let mut img = render_art_qr(&args.data, background.as_ref(), &args.options()?)?;

    if args.verify {
        match ScanVerifier::new().verify(&img, &args.data) {
            Ok(_) => log::info!("Result scans"),
            Err(e) => log::warn!("Result does not scan: {}", e),
        }
    }

    // JPEG has no alpha channel
    if is_jpeg(&args.out) {
        img = DynamicImage::ImageRgb8(img.to_rgb8());
    }
    img.save(&args.out)
        .with_context(|| format!("failed to write {}", args.out.display()))?;
    log::info!("Saved {}x{} to {}", img.width(), img.height(), args.out.display());
    Ok(())
}
