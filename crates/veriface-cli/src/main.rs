use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use veriface_core::kyc::{self, KycFields};
use veriface_core::ocr::TesseractOcr;
use veriface_core::onnx::{OnnxFaceEncoder, OnnxFaceLocator};
use veriface_core::reference;
use veriface_core::sampler::{LoopConfig, VerificationLoop};
use veriface_hw::Camera;

mod config;
mod term;

use config::Config;
use term::TerminalSurface;

#[derive(Parser)]
#[command(name = "veriface", about = "Identity-verification demo: webcam face verification and KYC checks")]
struct Cli {
    /// Path to a config file (default: ./veriface.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the webcam verification loop against a reference image
    Watch {
        /// Reference face image
        #[arg(short, long)]
        reference: PathBuf,
        /// V4L2 device path
        #[arg(long)]
        device: Option<String>,
        /// Match tolerance (lower is stricter)
        #[arg(long)]
        tolerance: Option<f32>,
        /// Downscale factor applied before detection
        #[arg(long)]
        downscale: Option<u32>,
        /// Save the annotated frame of each attempt here
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
    /// Check KYC form fields against an uploaded ID image
    Kyc {
        /// ID card image (jpg/png/jpeg)
        #[arg(long)]
        id_image: PathBuf,
        /// Full name as entered on the form
        #[arg(long)]
        name: String,
        /// Date of birth as entered on the form (DD/MM/YYYY)
        #[arg(long)]
        dob: String,
        /// ID number as entered on the form
        #[arg(long)]
        id_number: String,
        /// Face crop from the ID card (enables the face-match extension)
        #[arg(long, requires = "selfie")]
        id_face: Option<PathBuf>,
        /// Selfie to match against the ID face
        #[arg(long, requires = "id_face")]
        selfie: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Watch { reference, device, tolerance, downscale, snapshot } => {
            run_watch(&cfg, reference, device, tolerance, downscale, snapshot)
        }
        Commands::Kyc { id_image, name, dob, id_number, id_face, selfie } => {
            let fields = KycFields { name, dob, id_number };
            run_kyc(&cfg, id_image, fields, id_face.zip(selfie))
        }
    }
}

fn run_watch(
    cfg: &Config,
    reference_path: PathBuf,
    device: Option<String>,
    tolerance: Option<f32>,
    downscale: Option<u32>,
    snapshot: Option<PathBuf>,
) -> Result<()> {
    let mut locator =
        OnnxFaceLocator::load(&cfg.locator_model).context("loading face locator model")?;
    let mut encoder =
        OnnxFaceEncoder::load(&cfg.encoder_model).context("loading face encoder model")?;

    let reference = reference::load_reference(&reference_path, &mut locator, &mut encoder)
        .context("loading reference image")?;
    let Some(encoding) = reference.encoding else {
        bail!(
            "no face found in {} — verification cannot proceed without a reference face",
            reference_path.display()
        );
    };

    let device = device.unwrap_or_else(|| cfg.device.clone());
    let mut camera = Camera::open(&device)
        .with_context(|| format!("opening camera {device}"))?;
    camera.warmup(cfg.warmup_frames);

    let surface = TerminalSurface::new().context("switching terminal to raw mode")?;

    println!("Starting face verification...");
    println!("Press 'q' to quit");
    println!("Press 'v' to verify current face");

    let loop_config = LoopConfig {
        tolerance: tolerance.unwrap_or(cfg.tolerance),
        downscale: downscale.unwrap_or(cfg.downscale),
        snapshot_path: snapshot,
    };
    let stats = VerificationLoop::new(
        loop_config,
        &encoding,
        camera,
        surface,
        &mut locator,
        &mut encoder,
    )
    .run()?;

    println!(
        "{} frames, {} verification attempts, {} matches",
        stats.frames, stats.attempts, stats.matches
    );
    Ok(())
}

fn run_kyc(
    cfg: &Config,
    id_image: PathBuf,
    fields: KycFields,
    face_pair: Option<(PathBuf, PathBuf)>,
) -> Result<()> {
    let ocr = TesseractOcr::new(cfg.ocr_lang.clone());
    let report = kyc::check_document(&id_image, &fields, &ocr)?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    println!("Match Score: {}/{}", report.score, kyc::MAX_SCORE);
    if report.passed {
        println!("KYC Passed");
    } else {
        println!("Some info doesn't match");
    }

    if let Some((id_face, selfie)) = face_pair {
        let staged_id = kyc::stage_upload(&id_face, "veriface-id-face.jpg")?;
        let staged_selfie = kyc::stage_upload(&selfie, "veriface-selfie.jpg")?;

        let mut locator =
            OnnxFaceLocator::load(&cfg.locator_model).context("loading face locator model")?;
        let mut encoder =
            OnnxFaceEncoder::load(&cfg.encoder_model).context("loading face encoder model")?;

        // Face-match failures are surfaced as a message, never retried.
        match kyc::match_faces(&staged_id, &staged_selfie, &mut locator, &mut encoder, cfg.tolerance)
        {
            Ok(result) if result.verified => println!("Face Match Successful"),
            Ok(_) => println!("Face Match Failed"),
            Err(e) => eprintln!("Error: {e}"),
        }
    }

    Ok(())
}
