//! PLY/PCD point-cloud serialization (spec.md §6), plus the per-keyframe PLY
//! dump and the immature-point inclusion the distillation dropped.
//!
//! Ported from mdso's `util/PlyHolder.cpp` (the 19-byte ASCII count pad,
//! appended-then-rewritten count) and `output/CloudWriter.cpp`
//! (`keyFramesMarginalized`: one `kfN.ply` per marginalized keyframe plus an
//! append to the running cloud, `MAX_DEPTH` guard, immature points with
//! `numTraced > 0` included alongside optimized points). The original
//! hard-codes the count byte offsets (`countPos = 118`, `countPos2 = 179`);
//! this crate locates them by recording where it wrote the padded fields
//! itself, so a header edit here can't silently desync the rewrite (spec.md
//! §9 REDESIGN FLAG).

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use nalgebra::Point3;

use crate::error::{Error, Result};
use crate::Float;

/// One cloud point: world-space position plus RGB color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CloudPoint {
    pub position: Point3<Float>,
    pub color: [u8; 3],
}

/// Points at or beyond this depth are excluded from every sink (both the
/// original's hard guard and Testable Property 7).
pub const MAX_DEPTH: Float = 100.0;

/// Width in ASCII bytes of the rewritable point-count field.
const COUNT_PAD: usize = 19;

fn keep(p: &CloudPoint) -> bool {
    !p.position.coords.iter().any(|v| v.is_nan()) && p.position.z < MAX_DEPTH
}

fn padded_count(n: u64) -> String {
    format!("{:<width$}", n, width = COUNT_PAD)
}

/// Write a complete, self-contained ASCII PLY file (count known upfront, no
/// rewrite needed): used for the one-shot `kfN.ply` per-keyframe dump.
pub fn write_ply_ascii(path: &Path, points: &[CloudPoint]) -> Result<()> {
    let kept: Vec<&CloudPoint> = points.iter().filter(|p| keep(p)).collect();
    let mut f = File::create(path)?;
    writeln!(f, "ply")?;
    writeln!(f, "format ascii 1.0")?;
    writeln!(f, "element vertex {}", kept.len())?;
    writeln!(f, "property float x")?;
    writeln!(f, "property float y")?;
    writeln!(f, "property float z")?;
    writeln!(f, "property uchar red")?;
    writeln!(f, "property uchar green")?;
    writeln!(f, "property uchar blue")?;
    writeln!(f, "end_header")?;
    for p in kept {
        writeln!(
            f,
            "{} {} {} {} {} {}",
            p.position.x, p.position.y, p.position.z, p.color[0], p.color[1], p.color[2]
        )?;
    }
    Ok(())
}

/// Parse a PLY file written by [`write_ply_ascii`] back into points.
pub fn read_ply_ascii(path: &Path) -> Result<Vec<CloudPoint>> {
    let content = std::fs::read_to_string(path)?;
    let mut lines = content.lines();
    let mut count = 0usize;
    for line in lines.by_ref() {
        if let Some(rest) = line.strip_prefix("element vertex ") {
            count = rest
                .trim()
                .parse()
                .map_err(|_| Error::Parse("bad PLY vertex count".to_string()))?;
        }
        if line == "end_header" {
            break;
        }
    }
    let mut points = Vec::with_capacity(count);
    for line in lines.take(count) {
        let mut it = line.split_whitespace();
        let mut next = || {
            it.next()
                .ok_or_else(|| Error::Parse("truncated PLY data line".to_string()))
        };
        let x: Float = next()?.parse().map_err(|_| Error::Parse("bad x".to_string()))?;
        let y: Float = next()?.parse().map_err(|_| Error::Parse("bad y".to_string()))?;
        let z: Float = next()?.parse().map_err(|_| Error::Parse("bad z".to_string()))?;
        let r: u8 = next()?.parse().map_err(|_| Error::Parse("bad r".to_string()))?;
        let g: u8 = next()?.parse().map_err(|_| Error::Parse("bad g".to_string()))?;
        let b: u8 = next()?.parse().map_err(|_| Error::Parse("bad b".to_string()))?;
        points.push(CloudPoint {
            position: Point3::new(x, y, z),
            color: [r, g, b],
        });
    }
    Ok(points)
}

/// Parse a PCD file written by [`CloudWriter`] back into points.
pub fn read_pcd_ascii(path: &Path) -> Result<Vec<CloudPoint>> {
    let content = std::fs::read_to_string(path)?;
    let mut lines = content.lines();
    for line in lines.by_ref() {
        if line.trim_start() == "DATA ascii" {
            break;
        }
    }
    let mut points = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let mut it = line.split_whitespace();
        let mut next = || {
            it.next()
                .ok_or_else(|| Error::Parse("truncated PCD data line".to_string()))
        };
        let x: Float = next()?.parse().map_err(|_| Error::Parse("bad x".to_string()))?;
        let y: Float = next()?.parse().map_err(|_| Error::Parse("bad y".to_string()))?;
        let z: Float = next()?.parse().map_err(|_| Error::Parse("bad z".to_string()))?;
        let rgb: u32 = next()?.parse().map_err(|_| Error::Parse("bad rgb".to_string()))?;
        let r = ((rgb >> 16) & 0xff) as u8;
        let g = ((rgb >> 8) & 0xff) as u8;
        let b = (rgb & 0xff) as u8;
        points.push(CloudPoint {
            position: Point3::new(x, y, z),
            color: [r, g, b],
        });
    }
    Ok(points)
}

/// The running, session-wide point cloud: an ASCII PCD v0.6 file whose
/// `WIDTH`/`POINTS` fields are rewritten in place after every append.
pub struct CloudWriter {
    path: PathBuf,
    output_directory: PathBuf,
    count: u64,
    width_pos: u64,
    points_pos: u64,
}

impl CloudWriter {
    pub fn new(output_directory: &Path, file_name: &str) -> Result<Self> {
        std::fs::create_dir_all(output_directory)?;
        let path = output_directory.join(file_name);
        let mut f = File::create(&path)?;

        let mut written = 0u64;
        let mut write_line = |f: &mut File, s: &str| -> Result<()> {
            f.write_all(s.as_bytes())?;
            written += s.len() as u64;
            Ok(())
        };
        write_line(&mut f, "VERSION 0.7\n")?;
        write_line(&mut f, "FIELDS x y z rgb\n")?;
        write_line(&mut f, "SIZE 4 4 4 4\n")?;
        write_line(&mut f, "TYPE F F F U\n")?;
        write_line(&mut f, "COUNT 1 1 1 1\n")?;
        write_line(&mut f, "WIDTH ")?;
        let width_pos = written;
        write_line(&mut f, &padded_count(0))?;
        write_line(&mut f, "\n")?;
        write_line(&mut f, "HEIGHT 1\n")?;
        write_line(&mut f, "POINTS ")?;
        let points_pos = written;
        write_line(&mut f, &padded_count(0))?;
        write_line(&mut f, "\n")?;
        write_line(&mut f, "DATA ascii\n")?;

        Ok(CloudWriter {
            path,
            output_directory: output_directory.to_path_buf(),
            count: 0,
            width_pos,
            points_pos,
        })
    }

    /// Append `points` to the running cloud and rewrite the count fields.
    pub fn put_points(&mut self, points: &[CloudPoint]) -> Result<()> {
        let mut f = OpenOptions::new().append(true).open(&self.path)?;
        for p in points.iter().filter(|p| keep(p)) {
            let rgb = ((p.color[0] as u32) << 16) | ((p.color[1] as u32) << 8) | p.color[2] as u32;
            writeln!(f, "{} {} {} {}", p.position.x, p.position.y, p.position.z, rgb)?;
            self.count += 1;
        }
        self.update_point_count()
    }

    fn update_point_count(&self) -> Result<()> {
        let mut f = OpenOptions::new().read(true).write(true).open(&self.path)?;
        let value = padded_count(self.count);
        f.seek(SeekFrom::Start(self.width_pos))?;
        f.write_all(value.as_bytes())?;
        f.seek(SeekFrom::Start(self.points_pos))?;
        f.write_all(value.as_bytes())?;
        Ok(())
    }

    /// Write `kf<id>.ply` for one marginalized keyframe's points and append
    /// the same points to the running cloud.
    pub fn keyframe_marginalized(&mut self, keyframe_id: u64, points: &[CloudPoint]) -> Result<()> {
        let ply_path = self.output_directory.join(format!("kf{keyframe_id}.ply"));
        write_ply_ascii(&ply_path, points)?;
        self.put_points(points)
    }

    pub fn point_count(&self) -> u64 {
        self.count
    }
}

/// Sanity-check that a PCD header is well-formed (used only by tests, since
/// this crate never reads back its own session cloud in production).
#[allow(dead_code)]
fn read_header(path: &Path) -> Result<String> {
    let mut s = String::new();
    File::open(path)?.read_to_string(&mut s)?;
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_points() -> Vec<CloudPoint> {
        vec![
            CloudPoint { position: Point3::new(1.0, 2.0, 3.0), color: [10, 20, 30] },
            CloudPoint { position: Point3::new(-1.5, 0.0, 5.25), color: [255, 0, 128] },
            // Excluded: beyond MAX_DEPTH.
            CloudPoint { position: Point3::new(0.0, 0.0, 200.0), color: [1, 1, 1] },
            // Excluded: NaN coordinate.
            CloudPoint { position: Point3::new(Float::NAN, 0.0, 1.0), color: [1, 1, 1] },
        ]
    }

    #[test]
    fn ply_round_trip_excludes_far_and_nan_points() {
        let dir = std::env::temp_dir().join("fishdso_test_ply_round_trip");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("test.ply");
        write_ply_ascii(&path, &sample_points()).unwrap();
        let back = read_ply_ascii(&path).unwrap();
        assert_eq!(back.len(), 2);
        approx::assert_relative_eq!(back[0].position.z, 3.0);
        assert_eq!(back[0].color, [10, 20, 30]);
    }

    #[test]
    fn pcd_round_trip_and_count_pad_stays_in_place() {
        let dir = std::env::temp_dir().join("fishdso_test_pcd_round_trip");
        let mut writer = CloudWriter::new(&dir, "cloud.pcd").unwrap();
        writer.put_points(&sample_points()[0..2]).unwrap();
        writer.put_points(&sample_points()[2..4]).unwrap();
        assert_eq!(writer.point_count(), 2);

        let header = read_header(&writer.path).unwrap();
        assert!(header.contains("WIDTH 2"));
        assert!(header.contains("POINTS 2"));
        assert!(header.contains("DATA ascii"));

        let back = read_pcd_ascii(&writer.path).unwrap();
        assert_eq!(back.len(), 2);
    }

    #[test]
    fn keyframe_marginalized_writes_per_keyframe_ply_and_appends() {
        let dir = std::env::temp_dir().join("fishdso_test_kf_marginalized");
        let mut writer = CloudWriter::new(&dir, "cloud.pcd").unwrap();
        writer.keyframe_marginalized(7, &sample_points()).unwrap();
        let kf_points = read_ply_ascii(&dir.join("kf7.ply")).unwrap();
        assert_eq!(kf_points.len(), 2);
        assert_eq!(writer.point_count(), 2);
    }
}
