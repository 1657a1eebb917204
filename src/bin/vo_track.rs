// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! CLI entry point: drive `DsoSystem` over a TUM-RGBD-style dataset packed
//! in a tar archive (`associations.txt` plus depth/color PNGs, with an
//! optional `groundtruth.txt`).
//!
//! Same tar-entry offset index, same two-argument manual parsing, same
//! big-endian 16-bit PNG depth decode as other tar-driven tracking CLIs.
//! Generalized from RGB-D tracking (feeding a depth map on every frame) to monocular
//! bootstrap: here the first frame's depth map only seeds the external
//! stereo matcher (spec.md §6), every later frame is tracked from grayscale
//! alone.

use std::collections::HashMap;
use std::env;
use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::PathBuf;

use byteorder::{BigEndian, ReadBytesExt};
use nalgebra::{DMatrix, Vector2};

use fishdso::config::Settings;
use fishdso::core::camera::EquidistantFisheye;
use fishdso::core::se3::SE3;
use fishdso::dataset::tum_rgbd::{self, parse, Association, Frame};
use fishdso::matcher::{MatchedFrame, StereoMatch, StereoMatcher};
use fishdso::output::cloud_writer::CloudWriter;
use fishdso::system::DsoSystem;
use fishdso::{Error, Float, Result};

fn main() {
    tracing_subscriber::fmt::init();
    let args: Vec<String> = env::args().collect();
    if let Err(error) = run(&args) {
        eprintln!("{error}");
        std::process::exit(1);
    }
}

const USAGE: &str = "Usage: vo_track <wide|narrow> <archive.tar>";

fn run(args: &[String]) -> Result<()> {
    let parsed = check_args(args)?;
    let cam = create_camera(&parsed.camera_id)?;

    let mut archive_file = File::open(&parsed.archive_path)?;
    let entries = index_entries(&archive_file)?;

    let associations_buffer = get_buffer("associations.txt", &mut archive_file, &entries)?;
    let associations = parse_associations_buf(&associations_buffer)?;
    if associations.len() < 2 {
        return Err(Error::Parse(
            "need at least two associated frames to bootstrap".to_string(),
        ));
    }

    let groundtruth = get_buffer("groundtruth.txt", &mut archive_file, &entries)
        .ok()
        .and_then(|buf| parse_groundtruth_buf(&buf).ok());

    let settings = Settings::default();

    // Bootstrap matcher: depth-backed keypoints sampled on a grid from the
    // first frame, relative motion taken from ground truth when available.
    // A real feature matcher is an external collaborator (spec.md §6); this
    // stands in for it the way `matcher::DummyStereoMatcher` does for
    // tests, but reads an actual depth image instead of a synthetic plane.
    let (depth0, img0) = read_images(&associations[0], &mut archive_file, &entries)?;
    let motion01 = groundtruth
        .as_ref()
        .and_then(|gt| {
            relative_motion(
                gt,
                associations[0].color_timestamp,
                associations[1].color_timestamp,
            )
        })
        .unwrap_or_else(SE3::identity);
    let matcher = GridDepthMatcher::new(&depth0, motion01);

    let mut system = DsoSystem::new(cam, settings.clone(), matcher)?;
    if let Ok(writer) = CloudWriter::new(
        std::path::Path::new(&settings.output_directory),
        "cloud.pcd",
    ) {
        system = system.with_cloud_writer(writer);
    } else {
        tracing::warn!(
            output_directory = %settings.output_directory,
            "could not open cloud writer, running without point cloud output"
        );
    }

    system.add_frame(img0)?;
    for (i, assoc) in associations.iter().enumerate().skip(1) {
        let (_depth, img) = read_images(assoc, &mut archive_file, &entries)?;
        system.add_frame(img)?;

        if let Some(ref gt) = groundtruth {
            if let Some(pose) = nearest_pose(gt, assoc.color_timestamp) {
                system.add_ground_truth_pose(i as u64, pose);
            }
        }
    }

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    system.print_tracking_info(&mut handle)?;

    Ok(())
}

struct Args {
    camera_id: String,
    archive_path: PathBuf,
}

/// Verify that command line arguments are correct.
fn check_args(args: &[String]) -> Result<Args> {
    if let [_, camera_id, archive_path_str] = args {
        let archive_path = PathBuf::from(archive_path_str);
        if archive_path.is_file() {
            Ok(Args {
                camera_id: camera_id.clone(),
                archive_path,
            })
        } else {
            eprintln!("{USAGE}");
            Err(Error::Configuration(format!(
                "the archive does not exist or is not reachable: {archive_path_str}"
            )))
        }
    } else {
        eprintln!("{USAGE}");
        Err(Error::Configuration("wrong number of arguments".to_string()))
    }
}

/// Hand-measured equidistant-fisheye presets. There is no intrinsics
/// calibration file in a TUM-style archive, unlike the teacher's pinhole
/// `INTRINSICS_FR1`/`INTRINSICS_FR2`/`INTRINSICS_FR3`, so this crate ships
/// two plausible stand-ins instead of reading one.
fn create_camera(camera_id: &str) -> Result<EquidistantFisheye> {
    match camera_id {
        "wide" => Ok(EquidistantFisheye::new(
            640,
            480,
            190.0,
            Vector2::new(320.0, 240.0),
            std::f64::consts::FRAC_PI_2 * 1.3,
        )),
        "narrow" => Ok(EquidistantFisheye::new(
            640,
            480,
            320.0,
            Vector2::new(320.0, 240.0),
            std::f64::consts::FRAC_PI_2 * 0.95,
        )),
        other => {
            eprintln!("{USAGE}");
            Err(Error::Configuration(format!("unknown camera id: {other}")))
        }
    }
}

/// A `StereoMatcher` that samples depth-backed keypoints from a real depth
/// image instead of `DummyStereoMatcher`'s synthetic plane. Only
/// `frame0`'s keypoints/depths are read by `DsoInitializer::try_init`;
/// `frame1` is carried as an empty `MatchedFrame` to satisfy the trait.
struct GridDepthMatcher {
    keypoints: Vec<Vector2<Float>>,
    depths: Vec<Float>,
    motion: SE3,
}

impl GridDepthMatcher {
    fn new(depth0: &DMatrix<u16>, motion: SE3) -> Self {
        const STRIDE: usize = 8;
        const BORDER: usize = 8;
        let (height, width) = depth0.shape();
        let mut keypoints = Vec::new();
        let mut depths = Vec::new();
        let mut row = BORDER;
        while row + BORDER < height {
            let mut col = BORDER;
            while col + BORDER < width {
                let raw = depth0[(row, col)];
                if raw > 0 {
                    keypoints.push(Vector2::new(col as Float, row as Float));
                    depths.push(raw as Float / tum_rgbd::DEPTH_SCALE);
                }
                col += STRIDE;
            }
            row += STRIDE;
        }
        GridDepthMatcher {
            keypoints,
            depths,
            motion,
        }
    }
}

impl StereoMatcher for GridDepthMatcher {
    fn match_frames(&self, _frame0_id: u64, _frame1_id: u64) -> Option<StereoMatch> {
        if self.keypoints.len() < 3 {
            return None;
        }
        Some(StereoMatch {
            frame0: MatchedFrame {
                keypoints: self.keypoints.clone(),
                depths: self.depths.clone(),
            },
            frame1: MatchedFrame {
                keypoints: Vec::new(),
                depths: Vec::new(),
            },
            motion: self.motion,
        })
    }
}

/// Nearest-timestamp ground truth lookup, within a loose tolerance; TUM
/// ground truth and color timestamps are not exactly aligned.
fn nearest_pose(frames: &[Frame], timestamp: f64) -> Option<SE3> {
    const MAX_DT: f64 = 0.05;
    frames
        .iter()
        .min_by(|a, b| {
            (a.timestamp - timestamp)
                .abs()
                .partial_cmp(&(b.timestamp - timestamp).abs())
                .unwrap()
        })
        .filter(|f| (f.timestamp - timestamp).abs() <= MAX_DT)
        .map(|f| f.pose)
}

/// Relative motion `frame0 -> frame1`, assuming `frame0`'s ground truth
/// pose becomes the world origin (matching `DsoInitializer::try_init`,
/// which always sets `kf0.world_to_this = SE3::identity()`).
fn relative_motion(frames: &[Frame], ts0: f64, ts1: f64) -> Option<SE3> {
    let p0 = nearest_pose(frames, ts0)?;
    let p1 = nearest_pose(frames, ts1)?;
    Some(p1.compose(&p0.inverse()))
}

fn parse_associations_buf(buffer: &[u8]) -> Result<Vec<Association>> {
    let content = String::from_utf8_lossy(buffer).into_owned();
    parse::associations(content).map_err(Error::Parse)
}

fn parse_groundtruth_buf(buffer: &[u8]) -> Result<Vec<Frame>> {
    let content = String::from_utf8_lossy(buffer).into_owned();
    parse::groundtruth(content).map_err(Error::Parse)
}

struct FileEntry {
    offset: u64,
    length: u64,
}

fn index_entries(file: &File) -> Result<HashMap<String, FileEntry>> {
    let mut archive = tar::Archive::new(file);
    let mut entries = HashMap::new();
    for entry in archive.entries()? {
        let entry = entry?;
        let path = entry
            .header()
            .path()?
            .to_str()
            .ok_or_else(|| Error::Parse("non-UTF8 path in archive".to_string()))?
            .to_owned();
        entries.insert(
            path,
            FileEntry {
                offset: entry.raw_file_position(),
                length: entry.header().size()?,
            },
        );
    }
    Ok(entries)
}

fn get_buffer<R: Read + Seek>(
    name: &str,
    file: &mut R,
    entries: &HashMap<String, FileEntry>,
) -> Result<Vec<u8>> {
    let entry = entries
        .get(name)
        .ok_or_else(|| Error::Parse(format!("entry not in archive: {name}")))?;
    read_file_entry(entry, file)
}

fn read_file_entry<R: Read + Seek>(entry: &FileEntry, file: &mut R) -> Result<Vec<u8>> {
    let mut buffer = vec![0; entry.length as usize];
    file.seek(SeekFrom::Start(entry.offset))?;
    file.read_exact(&mut buffer)?;
    Ok(buffer)
}

/// Read a depth and color image given by an association.
fn read_images<R: Read + Seek>(
    assoc: &Association,
    file: &mut R,
    entries: &HashMap<String, FileEntry>,
) -> Result<(DMatrix<u16>, DMatrix<u8>)> {
    let depth_path = assoc
        .depth_file_path
        .to_str()
        .ok_or_else(|| Error::Parse("non-UTF8 depth path".to_string()))?
        .to_owned();
    let depth_buffer = get_buffer(&depth_path, file, entries)?;
    let (w, h, depth_vec) = read_png_16bits_buf(depth_buffer.as_slice())?;
    let depth_map = DMatrix::from_row_slice(h, w, depth_vec.as_slice());

    let color_path = assoc
        .color_file_path
        .to_str()
        .ok_or_else(|| Error::Parse("non-UTF8 color path".to_string()))?
        .to_owned();
    let color_buffer = get_buffer(&color_path, file, entries)?;
    let img = image::load_from_memory(color_buffer.as_slice())?.to_luma8();
    let (iw, ih) = img.dimensions();
    let img_mat = DMatrix::from_row_slice(ih as usize, iw as usize, img.as_raw());

    Ok((depth_map, img_mat))
}

fn read_png_16bits_buf<R: Read>(r: R) -> Result<(usize, usize, Vec<u16>)> {
    let mut decoder = png::Decoder::new(r);
    // IDENTITY: by default the crate would strip down to 8 bits, which is
    // exactly the precision the depth maps need.
    decoder.set_transformations(png::Transformations::IDENTITY);
    let mut reader = decoder.read_info()?;
    let mut buffer = vec![0u8; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buffer)?;

    let mut buffer_u16 = vec![0u16; (info.width * info.height) as usize];
    let mut cursor = Cursor::new(&buffer[..info.buffer_size()]);
    cursor.read_u16_into::<BigEndian>(&mut buffer_u16)?;

    Ok((info.width as usize, info.height as usize, buffer_u16))
}
