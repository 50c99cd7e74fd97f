//! The correspondence file read by bundle adjustment.
//!
//! The text format follows the Bundle Adjustment in the Large convention:
//!
//! ```text
//! <num_poses> <num_points> <num_observations>
//! <pose> <point> <x> <y>        (num_observations lines)
//! <r> <g> <b>                   (num_points lines, only if every point has a color)
//! ```
//!
//! Coordinates are written with the shortest representation that parses back to the same `f64`.

use crate::{CalibrationModel, Error, Observation, Result};
use itertools::Itertools;
use log::warn;
use nalgebra::Point2;
use std::io::{self, BufRead, Write};

/// A read-only view of a track graph.
#[derive(Debug, Clone, Copy)]
pub struct BundleView<'a> {
    pub num_poses: usize,
    pub num_points: usize,
    pub observations: &'a [Observation],
    pub colors: &'a [[u8; 3]],
}

/// Writes `view` to `writer`.
///
/// With a calibration the observations are written in its normalized image coordinates.
pub fn write_correspondences<W: Write>(
    mut writer: W,
    view: &BundleView<'_>,
    calibration: Option<&CalibrationModel>,
) -> io::Result<()> {
    writeln!(
        writer,
        "{} {} {}",
        view.num_poses,
        view.num_points,
        view.observations.len()
    )?;
    let points = view.observations.iter().map(|observation| observation.xy);
    let points: Vec<Point2<f64>> = match calibration {
        Some(calibration) => calibration.normalize_all(points).collect(),
        None => points.collect(),
    };
    for (observation, xy) in view.observations.iter().zip(points) {
        writeln!(
            writer,
            "{} {} {} {}",
            observation.pose, observation.point, xy.x, xy.y
        )?;
    }
    if view.colors.len() == view.num_points {
        for color in view.colors {
            writeln!(writer, "{}", color.iter().join(" "))?;
        }
    } else {
        warn!(
            "omitting colors, {} colors for {} points",
            view.colors.len(),
            view.num_points
        );
    }
    Ok(())
}

/// The contents of a correspondence file.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleFile {
    pub num_poses: usize,
    pub num_points: usize,
    pub observations: Vec<Observation>,
    /// Empty if the file had no color block.
    pub colors: Vec<[u8; 3]>,
}

pub fn read_correspondences<R: BufRead>(reader: R) -> Result<BundleFile> {
    let mut lines = reader
        .lines()
        .enumerate()
        .map(|(ix, line)| line.map(|line| (ix + 1, line)));

    let (line, header) = lines.next().ok_or(Error::Parse {
        line: 1,
        reason: "missing header".to_string(),
    })??;
    let [num_poses, num_points, num_observations] = fields::<usize, 3>(line, &header)?;

    // The header count is untrusted, so only a bounded amount is reserved up front.
    let mut observations = Vec::with_capacity(num_observations.min(1 << 16));
    for _ in 0..num_observations {
        let (line, text) = lines.next().ok_or_else(|| Error::Parse {
            line: line + observations.len() + 1,
            reason: format!("expected {} observations", num_observations),
        })??;
        let mut parts = text.split_whitespace();
        let [pose, point] = parse_next::<usize, 2>(line, &mut parts)?;
        let [x, y] = parse_next::<f64, 2>(line, &mut parts)?;
        ensure_consumed(line, parts)?;
        if pose >= num_poses || point >= num_points {
            return Err(Error::Parse {
                line,
                reason: format!("observation of pose {} and point {} is out of range", pose, point),
            });
        }
        observations.push(Observation {
            pose,
            point,
            xy: Point2::new(x, y),
        });
    }

    let mut colors = Vec::new();
    let mut first_color_line = None;
    for entry in lines {
        let (line, text) = entry?;
        if text.trim().is_empty() {
            continue;
        }
        first_color_line.get_or_insert(line);
        colors.push(fields::<u8, 3>(line, &text)?);
    }
    if let Some(line) = first_color_line {
        if colors.len() != num_points {
            return Err(Error::Parse {
                line,
                reason: format!("{} colors for {} points", colors.len(), num_points),
            });
        }
    }

    Ok(BundleFile {
        num_poses,
        num_points,
        observations,
        colors,
    })
}

fn fields<T: std::str::FromStr, const N: usize>(line: usize, text: &str) -> Result<[T; N]> {
    let mut parts = text.split_whitespace();
    let values = parse_next(line, &mut parts)?;
    ensure_consumed(line, parts)?;
    Ok(values)
}

fn parse_next<'a, T: std::str::FromStr, const N: usize>(
    line: usize,
    parts: &mut impl Iterator<Item = &'a str>,
) -> Result<[T; N]> {
    let values = parts
        .by_ref()
        .take(N)
        .map(|part| {
            part.parse::<T>().map_err(|_| Error::Parse {
                line,
                reason: format!("invalid value {:?}", part),
            })
        })
        .collect::<Result<Vec<T>>>()?;
    values.try_into().map_err(|values: Vec<T>| Error::Parse {
        line,
        reason: format!("expected {} values, found {}", N, values.len()),
    })
}

fn ensure_consumed<'a>(line: usize, mut parts: impl Iterator<Item = &'a str>) -> Result<()> {
    match parts.next() {
        Some(extra) => Err(Error::Parse {
            line,
            reason: format!("unexpected trailing value {:?}", extra),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CameraIntrinsics, Distortion};
    use nalgebra::Vector2;
    use std::io::BufReader;

    fn observation(pose: usize, point: usize, x: f64, y: f64) -> Observation {
        Observation {
            pose,
            point,
            xy: Point2::new(x, y),
        }
    }

    fn write(view: &BundleView<'_>, calibration: Option<&CalibrationModel>) -> String {
        let mut out = Vec::new();
        write_correspondences(&mut out, view, calibration).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn text_layout() {
        let observations = [observation(0, 0, 1.5, 2.0), observation(1, 0, 0.1, -3.25)];
        let view = BundleView {
            num_poses: 2,
            num_points: 1,
            observations: &observations,
            colors: &[[255, 0, 7]],
        };
        assert_eq!(write(&view, None), "2 1 2\n0 0 1.5 2\n1 0 0.1 -3.25\n255 0 7\n");
    }

    #[test]
    fn incomplete_colors_are_omitted() {
        let observations = [observation(0, 0, 1.0, 1.0), observation(1, 1, 2.0, 2.0)];
        let view = BundleView {
            num_poses: 2,
            num_points: 2,
            observations: &observations,
            colors: &[[1, 2, 3]],
        };
        assert_eq!(write(&view, None), "2 2 2\n0 0 1 1\n1 1 2 2\n");
        let parsed = read_correspondences(BufReader::new(write(&view, None).as_bytes())).unwrap();
        assert!(parsed.colors.is_empty());
    }

    #[test]
    fn normalized_observations() {
        let intrinsics = CameraIntrinsics::new(Vector2::repeat(100.0), Point2::new(50.0, 50.0));
        let calibration = CalibrationModel::new(intrinsics, Distortion::none(), 0.5);
        let observations = [observation(0, 0, 100.0, 25.0)];
        let view = BundleView {
            num_poses: 1,
            num_points: 1,
            observations: &observations,
            colors: &[[0, 0, 0]],
        };
        assert_eq!(write(&view, Some(&calibration)), "1 1 1\n0 0 1 -0.5\n0 0 0\n");
    }

    #[test]
    fn malformed_files_are_rejected() {
        let parse = |text: &str| read_correspondences(BufReader::new(text.as_bytes()));
        assert!(matches!(parse(""), Err(Error::Parse { line: 1, .. })));
        assert!(matches!(parse("1 1 2\n0 0 1 1\n"), Err(Error::Parse { line: 3, .. })));
        assert!(matches!(parse("1 1 1\n0 0 1 x\n"), Err(Error::Parse { line: 2, .. })));
        assert!(matches!(parse("1 1 1\n0 3 1 1\n"), Err(Error::Parse { line: 2, .. })));
        assert!(matches!(parse("1 1 1\n0 0 1 1 9\n"), Err(Error::Parse { line: 2, .. })));
        assert!(matches!(parse("1 1 1\n0 0 1 1\n1 2 300\n"), Err(Error::Parse { line: 3, .. })));
    }

    #[test]
    fn huge_observation_count_is_a_parse_error() {
        let parse = |text: &str| read_correspondences(BufReader::new(text.as_bytes()));
        assert!(matches!(
            parse("1 1 18446744073709551615\n0 0 1 1\n"),
            Err(Error::Parse { line: 3, .. })
        ));
    }

    #[test]
    fn color_count_mismatch_points_at_the_color_block() {
        let parse = |text: &str| read_correspondences(BufReader::new(text.as_bytes()));
        assert!(matches!(
            parse("1 2 1\n0 0 1 1\n\n1 2 3\n"),
            Err(Error::Parse { line: 4, .. })
        ));
    }
}
