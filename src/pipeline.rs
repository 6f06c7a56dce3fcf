// Retime Pipeline Orchestrator
// Copyright (c) 2026 Retime Contributors
//
// Demux -> route -> decode-drain -> (interpolate ->) encode -> mux, single
// threaded and pull based. Setup failures abort the run; in-loop declines
// never do. Codec-internal buffers are deliberately left unflushed at
// end-of-input.

use std::path::Path;

use anyhow::{bail, Context as _, Result};
use ffmpeg_next as ffmpeg;

use ffmpeg::{format, frame, media, Rational};
use tracing::{debug, info};

use crate::codec::Lane;
use crate::interp::Interpolator;

/// Ticks of one output frame for a stream with `time_base`, targeting
/// `target_fps` frames per second.
pub fn output_step(time_base: Rational, target_fps: u32) -> Result<i64> {
    let num = i64::from(time_base.numerator());
    let den = i64::from(time_base.denominator());
    if num <= 0 || den <= 0 {
        bail!("video stream has no usable time base ({time_base:?})");
    }
    let step = den / (num * i64::from(target_fps));
    if step <= 0 {
        bail!("time base {time_base:?} is too coarse for {target_fps} fps output");
    }
    Ok(step)
}

/// Retime `input` into `output` at `target_fps`. Returns the number of
/// synthetic frames inserted over the whole run.
pub fn run(input: &Path, output: &Path, target_fps: u32) -> Result<u64> {
    ffmpeg::init().context("initializing ffmpeg")?;

    let mut ictx = format::input(&input)
        .with_context(|| format!("opening input {}", input.display()))?;
    let mut octx = format::output(&output)
        .with_context(|| format!("opening output {}", output.display()))?;
    octx.set_metadata(ictx.metadata().to_owned());

    let mut video = Lane::open(media::Type::Video, &ictx, &mut octx)?;
    let mut audio = Lane::open(media::Type::Audio, &ictx, &mut octx)?;

    let step = output_step(video.time_base(), target_fps)?;
    let mut interp = Interpolator::new(step);
    info!(
        "[SETUP] retiming {} -> {} at {target_fps} fps (step {step} ticks)",
        input.display(),
        output.display()
    );

    octx.write_header().context("writing container header")?;

    // Scratch frames, overwritten on every decoder pull.
    let mut vframe = frame::Video::empty();
    let mut aframe = frame::Audio::empty();
    // Detached copy of the last valid video frame; survives the scratch
    // buffer being overwritten, until replaced by the next one.
    let mut prev: Option<frame::Video> = None;

    for (stream, packet) in ictx.packets() {
        if stream.index() == video.in_index() {
            if video.send_packet(&packet).is_err() {
                debug!("[LOOP] video decoder declined packet");
                continue;
            }
            while video.receive_frame(&mut vframe).is_ok() {
                if let Some(ref last) = prev {
                    for mid in interp.linear(last, &vframe) {
                        video.encode(&mid, &mut octx);
                    }
                }
                prev = Some(vframe.clone());
                video.encode(&vframe, &mut octx);
            }
        } else if stream.index() == audio.in_index() {
            if audio.send_packet(&packet).is_err() {
                debug!("[LOOP] audio decoder declined packet");
                continue;
            }
            while audio.receive_frame(&mut aframe).is_ok() {
                audio.encode(&aframe, &mut octx);
            }
        }
    }

    // Finalizes the index for everything already muxed; frames still inside
    // the codecs are not drained.
    octx.write_trailer().context("writing container trailer")?;

    info!("[LOOP] inserted {} synthetic frames", interp.total());
    Ok(interp.total())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_for_90khz_at_60fps() {
        assert_eq!(output_step(Rational::new(1, 90000), 60).unwrap(), 1500);
    }

    #[test]
    fn test_step_for_mp4_timescale_at_60fps() {
        assert_eq!(output_step(Rational::new(1, 12288), 60).unwrap(), 204);
    }

    #[test]
    fn test_step_rejects_coarse_time_base() {
        assert!(output_step(Rational::new(1, 30), 60).is_err());
    }

    #[test]
    fn test_step_rejects_degenerate_time_base() {
        assert!(output_step(Rational::new(0, 1), 60).is_err());
    }
}
