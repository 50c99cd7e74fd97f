use cv_tracks::nalgebra::{Point2, Vector2};
use cv_tracks::{CameraIntrinsics, Distortion, Rejection, TrackPipeline, TracksSettings};
use log::*;
use std::path::PathBuf;
use structopt::StructOpt;

#[derive(StructOpt, Clone)]
#[structopt(
    name = "tracks-sandbox",
    about = "Builds bundle adjustment correspondences from a set of images"
)]
struct Opt {
    /// The file where settings are specified.
    ///
    /// This is in the format of `cv_tracks::TracksSettings`.
    #[structopt(short, long, default_value = "tracks-settings.json")]
    settings: PathBuf,
    /// The x focal length
    ///
    /// The calibration defaults are for KITTI 2011_09_26 camera 0
    #[structopt(long, default_value = "984.2439")]
    x_focal: f64,
    /// The y focal length
    #[structopt(long, default_value = "980.8141")]
    y_focal: f64,
    /// The x optical center coordinate
    #[structopt(long, default_value = "690.0")]
    x_center: f64,
    /// The y optical center coordinate
    #[structopt(long, default_value = "233.1966")]
    y_center: f64,
    /// The skew
    #[structopt(long, default_value = "0.0")]
    skew: f64,
    /// The K1 radial distortion
    #[structopt(long, default_value = "-0.3728755")]
    k1: f64,
    /// The K2 radial distortion
    #[structopt(long, default_value = "0.0")]
    k2: f64,
    /// The P1 tangential distortion
    #[structopt(long, default_value = "0.0")]
    p1: f64,
    /// The P2 tangential distortion
    #[structopt(long, default_value = "0.0")]
    p2: f64,
    /// The K3 radial distortion
    #[structopt(long, default_value = "0.0")]
    k3: f64,
    /// Overrides the focal scale of the settings file
    #[structopt(long)]
    focal_scale: Option<f64>,
    /// Write normalized image coordinates instead of pixels
    #[structopt(short, long)]
    normalize: bool,
    /// Output file to deposit the correspondences
    #[structopt(short, long, default_value = "correspondences.txt")]
    output: PathBuf,
    /// List of image files
    #[structopt(parse(from_os_str))]
    images: Vec<PathBuf>,
}

fn main() {
    pretty_env_logger::init_timed();
    let opt = Opt::from_args();
    if let Err(e) = run(opt) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(opt: Opt) -> cv_tracks::Result<()> {
    let settings = std::fs::File::open(&opt.settings)
        .ok()
        .and_then(|file| serde_json::from_reader(file).ok());
    if settings.is_some() {
        info!("loaded existing settings");
    } else {
        info!("used default settings");
    }
    let mut settings: TracksSettings = settings.unwrap_or_default();
    if let Some(focal_scale) = opt.focal_scale {
        settings.focal_scale = focal_scale;
    }
    settings.normalize_points |= opt.normalize;

    // Fill intrinsics from args.
    let intrinsics = CameraIntrinsics::new(
        Vector2::new(opt.x_focal, opt.y_focal),
        Point2::new(opt.x_center, opt.y_center),
    )
    .with_skew(opt.skew);
    let distortion = Distortion::from_coefficients(&[opt.k1, opt.k2, opt.p1, opt.p2, opt.k3]);

    let mut pipeline = TrackPipeline::from_settings(settings, intrinsics, distortion)?;
    for path in &opt.images {
        pipeline.add_image_path(path)?;
    }

    let report = pipeline.exhaustive_matching()?;
    for pair in &report.pairs {
        match pair.outcome {
            Ok(accepted) => info!(
                "pair ({}, {}) accepted {:?} with {} of {} matches",
                pair.first, pair.second, accepted.model, accepted.inliers, pair.raw_matches
            ),
            Err(Rejection::TooFewMatches { matches, minimum }) => info!(
                "pair ({}, {}) rejected with {} raw matches (minimum {})",
                pair.first, pair.second, matches, minimum
            ),
            Err(Rejection::NoModel {
                homography,
                essential,
            }) => info!(
                "pair ({}, {}) rejected with {} homography and {} essential matrix inliers",
                pair.first, pair.second, homography, essential
            ),
            Err(Rejection::NoInliers) => info!(
                "pair ({}, {}) rejected without inliers",
                pair.first, pair.second
            ),
        }
    }
    info!(
        "accepted {} pairs and rejected {} pairs",
        report.accepted(),
        report.rejected()
    );
    let graph = pipeline.graph();
    if graph.conflicts() != 0 {
        warn!(
            "{} matches joined features that were already on different points",
            graph.conflicts()
        );
    }

    info!("exporting the correspondences");
    pipeline.write(&opt.output)
}
