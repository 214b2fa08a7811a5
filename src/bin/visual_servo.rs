use clap::{Parser, Subcommand};
use log::info;
use std::time::Instant;
use visual_servo::config::ServoConfig;
use visual_servo::data_loader::{list_frames, process_sequence};
use visual_servo::geometry::transforms::{pose_to_isometry, FrameChain};
use visual_servo::io::{
    load_camera, load_config, load_depth, load_font, load_frame_chain, load_mask, load_rgb,
    write_report, SequenceReport,
};
use visual_servo::servo::Ibvs;
use visual_servo::visualization::{log_correspondences, log_image_as_compressed};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Servo configuration JSON, defaults are used when omitted
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Camera intrinsics JSON
    #[arg(short, long, global = true, default_value = "intrinsics.json")]
    intrinsics: String,

    /// Exclusion mask image, non-zero pixels are ignored
    #[arg(short, long, global = true)]
    mask: Option<String>,

    /// Use the median depth instead of per-point depth
    #[arg(long, global = true)]
    median_depth: bool,

    /// Font used to write match count and SSIM on the match image
    #[arg(long, global = true)]
    font: Option<String>,

    /// Save a rerun recording to this path
    #[arg(long, global = true)]
    rerun: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Velocity for a single reference/current pair
    Velocity {
        reference: String,
        current: String,
        reference_depth: String,
        current_depth: String,

        /// Camera-to-tool and base-to-world transforms JSON
        #[arg(short, long)]
        frames: Option<String>,

        /// Current TCP pose in the base frame: x,y,z,rx,ry,rz
        #[arg(long, value_delimiter = ',', num_args = 6)]
        tcp_pose: Option<Vec<f64>>,

        /// Where to write the annotated match image
        #[arg(short, long, default_value = "matches.png")]
        output: String,
    },
    /// Every frame of a recording against one reference
    Sequence {
        reference: String,
        reference_depth: String,

        /// Folder with rgb/ and depth/ subfolders
        folder: String,

        #[arg(short, long, default_value = "servo_report.json")]
        output: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ServoConfig::default(),
    };
    if args.median_depth {
        config.depth.use_median_depth = true;
    }
    let camera = load_camera(&args.intrinsics)?;
    let mask = args.mask.as_ref().map(load_mask).transpose()?;
    let recording = args
        .rerun
        .as_ref()
        .map(|path| rerun::RecordingStreamBuilder::new("visual_servo").save(path))
        .transpose()?;
    let mut ibvs = Ibvs::new(camera, &config)?;
    match &args.font {
        Some(path) => ibvs = ibvs.with_font(load_font(path)?),
        None => info!("no --font given, match images carry no text"),
    }

    match args.command {
        Commands::Velocity {
            reference,
            current,
            reference_depth,
            current_depth,
            frames,
            tcp_pose,
            output,
        } => {
            let reference = load_rgb(&reference)?;
            let current = load_rgb(&current)?;
            let reference_depth = load_depth(&reference_depth)?;
            let current_depth = load_depth(&current_depth)?;
            let now = Instant::now();
            let out = ibvs.compute_velocity_from_images(
                &reference,
                &current,
                &reference_depth,
                &current_depth,
                mask.as_ref(),
                config.depth.use_median_depth,
            )?;
            info!("servo tick took {:.3} sec", now.elapsed().as_secs_f64());
            out.annotated.save(&output)?;
            if let Some(recording) = &recording {
                let annotated = image::DynamicImage::ImageRgb8(out.annotated.clone());
                log_image_as_compressed(recording, "matches", &annotated, image::ImageFormat::Png)?;
                log_correspondences(recording, "matches", &out.correspondences)?;
            }

            println!("{}", serde_json::to_string_pretty(&out.estimate)?);
            let chain = match &frames {
                Some(path) => load_frame_chain(path)?,
                None => config.frames.to_chain()?,
            };
            print_frames(&chain, &out.velocity, tcp_pose.as_deref())?;
        }
        Commands::Sequence {
            reference,
            reference_depth,
            folder,
            output,
        } => {
            let reference_name = reference.clone();
            let reference = load_rgb(&reference)?;
            let reference_depth = load_depth(&reference_depth)?;
            let frames = list_frames(&folder)?;
            info!("processing {} frames", frames.len());
            let now = Instant::now();
            let reports = process_sequence(
                &ibvs,
                &reference,
                &reference_depth,
                &frames,
                mask.as_ref(),
                recording.as_ref(),
            );
            let duration_sec = now.elapsed().as_secs_f64();
            info!(
                "sequence took {:.3} sec, avg {:.3} sec per frame",
                duration_sec,
                duration_sec / frames.len().max(1) as f64
            );
            let report = SequenceReport::new(&reference_name, reports);
            info!("{} succeeded, {} failed", report.succeeded, report.failed);
            write_report(&output, &report)?;
        }
    }
    Ok(())
}

fn print_frames(
    chain: &FrameChain,
    camera_twist: &visual_servo::Twist,
    tcp_pose: Option<&[f64]>,
) -> Result<(), Box<dyn std::error::Error>> {
    let tool = chain.camera_to_tool(camera_twist)?;
    println!("tool:  v {} w {}", tool.linear.transpose(), tool.angular.transpose());
    if let Some(pose) = tcp_pose {
        let pose: [f64; 6] = pose.try_into()?;
        let tcp = pose_to_isometry(&pose);
        let base = chain.tool_to_base(&tool, &tcp)?;
        let world = chain.camera_to_world(camera_twist, &tcp)?;
        println!("base:  v {} w {}", base.linear.transpose(), base.angular.transpose());
        println!("world: v {} w {}", world.linear.transpose(), world.angular.transpose());
    }
    Ok(())
}
