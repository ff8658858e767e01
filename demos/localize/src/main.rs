use argh::FromArgs;
use serde::Serialize;
use std::path::PathBuf;
use tagloc::localize::{
    CameraIntrinsics, CorrespondenceBuilder, LocalizeError, MarkerGeometry, MarkerGeometryTable,
    Pose, PoseSolver, TagDetection,
};

/// Localises the camera in every frame of a recorded detection log
#[derive(Debug, FromArgs)]
struct Args {
    /// path to a json file holding, per frame, the list of detected tags
    #[argh(positional)]
    detections: PathBuf,

    /// directory holding one calibration folder per user
    #[argh(option, short = 'c', default = "PathBuf::from(\"calibration\")")]
    calibration_root: PathBuf,

    /// calibration profile to load
    #[argh(option, short = 'u', default = "String::from(\"default\")")]
    user: String,

    /// side length of the marker in millimeters
    #[argh(option, short = 's', default = "24.0")]
    marker_size: f64,

    /// print one json object per frame instead of text
    #[argh(switch, short = 'j')]
    json: bool,
}

#[derive(Serialize)]
struct FramePose<'a> {
    frame: usize,
    pose: &'a Pose,
    extrinsic: [[f64; 4]; 4],
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let params_path = CameraIntrinsics::params_path(&args.calibration_root, &args.user);
    let intrinsics = CameraIntrinsics::load(&params_path)?;
    log::info!("using calibration {}", params_path.display());

    let frames: Vec<Vec<TagDetection>> =
        serde_json::from_reader(std::fs::File::open(&args.detections)?)?;

    let builder = CorrespondenceBuilder::new(MarkerGeometryTable::new(MarkerGeometry::square(
        args.marker_size,
    )));
    let solver = PoseSolver::new(&intrinsics);

    let mut num_solved = 0;
    for (frame, detections) in frames.iter().enumerate() {
        let pose = match builder
            .build(detections)
            .and_then(|corr| solver.solve(&corr))
        {
            Ok(pose) => pose,
            Err(LocalizeError::NoDetection) => {
                log::debug!("frame {frame}: no tag visible");
                continue;
            }
            Err(err) => {
                log::warn!("frame {frame}: skipped, {err}");
                continue;
            }
        };
        num_solved += 1;

        if args.json {
            let out = FramePose {
                frame,
                pose: &pose,
                extrinsic: pose.extrinsic_matrix(),
            };
            println!("{}", serde_json::to_string(&out)?);
        } else {
            let [x, y, z] = pose.position;
            let [yaw, pitch, roll] = pose.orientation.to_array();
            println!(
                "frame {frame}: position [{x:.1}, {y:.1}, {z:.1}] mm, yaw {:.2} pitch {:.2} roll {:.2} deg",
                yaw.to_degrees(),
                pitch.to_degrees(),
                roll.to_degrees()
            );
            for row in pose.extrinsic_matrix() {
                println!("    {:10.4} {:10.4} {:10.4} {:10.4}", row[0], row[1], row[2], row[3]);
            }
        }
    }

    log::info!("solved {num_solved}/{} frames", frames.len());

    Ok(())
}
