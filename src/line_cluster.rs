//! Reading order reconstruction.
//!
//! Detectors return text regions in no particular order. [`order`] groups them
//! into horizontal lines by vertical center, then reads lines top to bottom and
//! regions within a line left to right.
//!
//! Grouping is greedy: a region joins the first line (in creation order) whose
//! representative center is closer than [`LINE_TOLERANCE`], and a line's
//! representative is the center of the region that opened it. It is never
//! re-averaged, so a line can collect regions up to the tolerance away on
//! either side of its first member, and regions that sit between two lines
//! land wherever the input order puts them first.

use tracing::instrument;

use crate::Detection;

/// Maximum distance in pixels between vertical centers of regions on one line.
pub const LINE_TOLERANCE: f32 = 20.0;

struct LineCluster {
    y_center: f32,
    members: Vec<Detection>,
}

/// Returns `detections` in reading order. The output is a permutation of the
/// input.
#[instrument(level = "trace", skip(detections), fields(count = detections.len()))]
pub fn order(detections: Vec<Detection>) -> Vec<Detection> {
    let mut lines: Vec<LineCluster> = Vec::new();

    for detection in detections {
        let y_center = detection.bbox.y_center();
        match lines
            .iter_mut()
            .find(|line| (y_center - line.y_center).abs() < LINE_TOLERANCE)
        {
            Some(line) => line.members.push(detection),
            None => lines.push(LineCluster {
                y_center,
                members: vec![detection],
            }),
        }
    }
    log::trace!("Grouped regions into {} lines", lines.len());

    lines.sort_by(|a, b| a.y_center.total_cmp(&b.y_center));
    lines
        .into_iter()
        .flat_map(|mut line| {
            line.members.sort_by_key(|it| it.bbox.x1);
            line.members
        })
        .collect()
}
