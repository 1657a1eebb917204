//! TUM RGB-D / ICL-NUIM association- and ground-truth-file parsing.
//!
//! Grounded on the teacher's own `dataset` module of the same name: same
//! `nom` macro style (`named!`/`do_parse!`/`alt!`) and the same two file
//! grammars (space-separated `rgb.txt`/`depth.txt` association lines,
//! `groundtruth.txt` `timestamp tx ty tz qx qy qz qw` lines), adapted from
//! `na::Isometry3<f32>` to this crate's [`crate::core::se3::SE3`] so ground
//! truth can feed [`crate::system::DsoSystem::add_ground_truth_pose`]
//! directly.

use std::path::PathBuf;

use nalgebra::{Translation3, UnitQuaternion};

use crate::core::se3::SE3;
use crate::Float;

/// U16 depth values are scaled for better precision: 5000 in the 16-bit gray
/// PNG corresponds to 1 meter.
pub const DEPTH_SCALE: Float = 5000.0;

#[derive(Debug, Clone, Copy)]
pub struct Frame {
    pub timestamp: f64,
    pub pose: SE3,
}

#[derive(Debug, Clone)]
pub struct Association {
    pub depth_timestamp: f64,
    pub depth_file_path: PathBuf,
    pub color_timestamp: f64,
    pub color_file_path: PathBuf,
}

pub mod parse {
    use super::*;
    use nom::{
        alt, anychar, call, do_parse, double, is_not, many0, map, named, space, tag,
        types::CompleteStr,
    };

    pub fn associations(file_content: String) -> Result<Vec<Association>, String> {
        multi_line(association_line, file_content)
    }

    pub fn groundtruth(file_content: String) -> Result<Vec<Frame>, String> {
        multi_line(groundtruth_line, file_content)
    }

    fn multi_line<F, T>(line_parser: F, file_content: String) -> Result<Vec<T>, String>
    where
        F: Fn(CompleteStr) -> nom::IResult<CompleteStr, Option<T>>,
    {
        let mut vec_data = Vec::new();
        for line in file_content.lines() {
            match line_parser(CompleteStr(line)) {
                Ok((_, Some(data))) => vec_data.push(data),
                Ok(_) => (),
                Err(_) => return Err("Parsing error".to_string()),
            }
        }
        Ok(vec_data)
    }

    // Associations --------------------

    named!(association_line<CompleteStr, Option<Association> >,
        alt!( map!(comment, |_| None) | map!(association, |a| Some(a)) )
    );

    named!(association<CompleteStr, Association>,
        do_parse!(
            depth_timestamp: double >> space >>
            depth_file_path: path >> space >>
            color_timestamp: double >> space >>
            color_file_path: path >>
            (Association { depth_timestamp, depth_file_path, color_timestamp, color_file_path })
        )
    );

    named!(path<CompleteStr, PathBuf>,
        map!(is_not!(" \t\r\n"), |s: CompleteStr| PathBuf::from(*s))
    );

    // Ground truth --------------------

    named!(groundtruth_line<CompleteStr, Option<Frame> >,
        alt!( map!(comment, |_| None) | map!(frame, |f| Some(f)) )
    );

    named!(comment<CompleteStr,()>,
        do_parse!( tag!("#") >> many0!(anychar) >> ())
    );

    named!(frame<CompleteStr, Frame>,
        do_parse!(
            t: double >> space >>
            p: pose >>
            (Frame { timestamp: t, pose: p })
        )
    );

    named!(pose<CompleteStr, SE3>,
        do_parse!(
            t: translation >> space >>
            r: rotation >>
            (SE3::from_parts(t.vector, r))
        )
    );

    named!(translation<CompleteStr, Translation3<Float> >,
        do_parse!(
            x: double >> space >>
            y: double >> space >>
            z: double >>
            (Translation3::new(x, y, z))
        )
    );

    named!(rotation<CompleteStr, UnitQuaternion<Float> >,
        do_parse!(
            qx: double >> space >>
            qy: double >> space >>
            qz: double >> space >>
            qw: double >>
            (UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(qw, qx, qy, qz)))
        )
    );

} // pub mod parse

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_groundtruth_lines() {
        let content = "# comment\n0.1 0.0 0.0 1.0 0.0 0.0 0.0 1.0\n".to_string();
        let frames = parse::groundtruth(content).unwrap();
        assert_eq!(frames.len(), 1);
        approx::assert_relative_eq!(frames[0].pose.translation().z, 1.0);
    }

    #[test]
    fn parses_association_lines() {
        let content =
            "1305031102.175304 depth/1305031102.175304.png 1305031102.175304 rgb/1305031102.175304.png\n"
                .to_string();
        let assoc = parse::associations(content).unwrap();
        assert_eq!(assoc.len(), 1);
        assert_eq!(
            assoc[0].color_file_path,
            PathBuf::from("rgb/1305031102.175304.png")
        );
    }
}
