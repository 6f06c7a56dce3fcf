// Retime Cadence Interpolator
// Copyright (c) 2026 Retime Contributors
//
// Timestamp-bucket arithmetic plus a per-sample linear blend. Decides how
// many frames fit between two decoded pictures at the target cadence and
// synthesizes them by blending the endpoint planes.

use ffmpeg_next as ffmpeg;

use ffmpeg::frame;

/// Synthesizes intermediate frames between consecutive decoded pictures.
///
/// `step` is the fixed tick count of one output frame. `total` accumulates
/// the number of synthetic frames produced over the lifetime of the run.
pub struct Interpolator {
    step: i64,
    total: u64,
}

impl Interpolator {
    /// `step` must be positive: ticks per output frame.
    pub fn new(step: i64) -> Self {
        debug_assert!(step > 0);
        Self { step, total: 0 }
    }

    pub fn step(&self) -> i64 {
        self.step
    }

    /// Synthetic frames produced so far.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Returns the frames to insert between `prev` and `cur`, oldest first.
    ///
    /// Pairs inside one cadence bucket, pairs running backward in time and
    /// frames without a timestamp all yield an empty sequence; none of these
    /// is an error.
    pub fn linear(&mut self, prev: &frame::Video, cur: &frame::Video) -> Vec<frame::Video> {
        let (Some(prev_pts), Some(cur_pts)) = (prev.pts(), cur.pts()) else {
            return Vec::new();
        };
        if cur_pts < prev_pts {
            return Vec::new();
        }

        let begin = prev_pts.div_euclid(self.step);
        let end = cur_pts.div_euclid(self.step);
        let n = if begin == end { 0 } else { end - begin - 1 };
        if n == 0 {
            return Vec::new();
        }

        let pts_step = (cur_pts - prev_pts) / (n + 1);
        self.total += n as u64;

        let mut inserted = Vec::with_capacity(n as usize);
        for i in 0..n {
            let mut mid = prev.clone();
            mid.set_pts(Some(prev_pts + pts_step * (i + 1)));

            // Blend scope is the first scanline of each plane carried by all
            // three frames; the rest of the picture stays prev's.
            let planes = prev.planes().min(cur.planes()).min(mid.planes());
            for p in 0..planes {
                let row = prev.stride(p).min(cur.stride(p)).min(mid.stride(p));
                let from = &prev.data(p)[..row];
                let to = &cur.data(p)[..row];
                let out = &mut mid.data_mut(p)[..row];
                for ((px, &a), &b) in out.iter_mut().zip(from).zip(to) {
                    *px = blend(a, b, i + 1, n + 1);
                }
            }
            inserted.push(mid);
        }
        inserted
    }
}

/// Truncating linear blend of one sample pair: grows from the lower-valued
/// endpoint toward the higher one by the position fraction `pos / window`.
fn blend(a: u8, b: u8, pos: i64, window: i64) -> u8 {
    let (wa, wb) = (i64::from(a), i64::from(b));
    if a == b {
        a
    } else if a < b {
        (wa + (wb - wa) / window * pos) as u8
    } else {
        (wb + (wa - wb) / window * pos) as u8
    }
}
