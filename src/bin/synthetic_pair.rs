use clap::Parser;
use std::path::Path;
use visual_servo::io::{object_to_json, save_depth};
use visual_servo::synthetic::translated_pair;

/// Writes a textured reference/current pair with a known pixel shift
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Output directory
    #[arg(short, long)]
    output: String,

    #[arg(long, default_value = "320")]
    width: u32,

    #[arg(long, default_value = "240")]
    height: u32,

    /// Horizontal content shift of the current view in pixels
    #[arg(long, default_value = "6", allow_hyphen_values = true)]
    dx: i32,

    /// Vertical content shift of the current view in pixels
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    dy: i32,

    /// Plane depth in metres
    #[arg(long, default_value = "1.5")]
    depth: f64,

    /// Depth PNG units in metres
    #[arg(long, default_value = "0.001")]
    depth_scale: f64,

    #[arg(long, default_value = "0")]
    seed: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let out = Path::new(&args.output);
    std::fs::create_dir_all(out)?;

    let pair = translated_pair(args.width, args.height, (args.dx, args.dy), args.depth, args.seed)?;
    pair.reference.save(out.join("reference.png"))?;
    pair.current.save(out.join("current.png"))?;
    save_depth(out.join("reference_depth.png"), &pair.reference_depth, args.depth_scale)?;
    save_depth(out.join("current_depth.png"), &pair.current_depth, args.depth_scale)?;
    object_to_json(out.join("intrinsics.json"), pair.camera.intrinsics())?;

    let v = pair.expected_linear_velocity();
    log::info!(
        "wrote pair to {}, expected camera velocity [{:.4}, {:.4}, {:.4}]",
        out.display(),
        v.x,
        v.y,
        v.z
    );
    Ok(())
}
