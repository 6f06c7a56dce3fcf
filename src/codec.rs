// Retime Codec Lanes
// Copyright (c) 2026 Retime Contributors
//
// One lane per media stream: the decode capability, a matching encode
// capability opened with mirrored parameters, and the output stream the
// encoded packets land on. The video/audio split lives in two enums; the
// few fields that actually differ sit in `EncoderLayout`.

use anyhow::{bail, Context as _, Result};
use ffmpeg_next as ffmpeg;

use ffmpeg::format::context::{Input, Output};
use ffmpeg::format::{self, Pixel, Sample};
use ffmpeg::{codec, decoder, encoder, media, ChannelLayout, Frame, Packet, Rational};
use tracing::{debug, info};

/// The fields that differ between a video and an audio encoder. The variant
/// selects which capability the builder opens; everything else (codec id,
/// time base, bit rate) is common.
pub enum EncoderLayout {
    Video {
        width: u32,
        height: u32,
        format: Pixel,
        aspect_ratio: Rational,
        frame_rate: Option<Rational>,
    },
    Audio {
        rate: u32,
        format: Sample,
        channel_layout: ChannelLayout,
    },
}

enum Decode {
    Video(decoder::Video),
    Audio(decoder::Audio),
}

enum Encode {
    Video(encoder::Video),
    Audio(encoder::Audio),
}

/// A matched decode/encode pair bound to one input stream and one output
/// stream.
pub struct Lane {
    in_index: usize,
    out_index: usize,
    // Input stream time base; the encoder is opened with the same one.
    time_base: Rational,
    decoder: Decode,
    encoder: Encode,
    // Scratch packet, overwritten on every receive_packet pull.
    scratch: Packet,
}

impl Lane {
    /// Resolves the best stream of `kind` in `ictx`, opens its decoder, and
    /// opens a mirrored encoder registered as a new stream on `octx`.
    /// Any failure here is fatal to the run.
    pub fn open(kind: media::Type, ictx: &Input, octx: &mut Output) -> Result<Self> {
        let ist = ictx
            .streams()
            .best(kind)
            .ok_or(ffmpeg::Error::StreamNotFound)
            .with_context(|| format!("no {kind:?} stream in input"))?;
        let in_index = ist.index();
        let time_base = ist.time_base();

        let ctx = codec::context::Context::from_parameters(ist.parameters())
            .with_context(|| format!("reading {kind:?} decoder parameters"))?;
        let codec_id = ctx.id();

        match kind {
            media::Type::Video => {
                let video = ctx
                    .decoder()
                    .video()
                    .context("opening video decoder")?;
                let layout = EncoderLayout::Video {
                    width: video.width(),
                    height: video.height(),
                    format: video.format(),
                    aspect_ratio: video.aspect_ratio(),
                    frame_rate: video.frame_rate(),
                };
                let (out_index, enc) =
                    layout.open(octx, codec_id, time_base, video.bit_rate())?;
                info!(
                    "[SETUP] video lane: stream {in_index} -> {out_index} ({codec_id:?})"
                );
                Ok(Self {
                    in_index,
                    out_index,
                    time_base,
                    decoder: Decode::Video(video),
                    encoder: enc,
                    scratch: Packet::empty(),
                })
            }
            media::Type::Audio => {
                let audio = ctx
                    .decoder()
                    .audio()
                    .context("opening audio decoder")?;
                let layout = EncoderLayout::Audio {
                    rate: audio.rate(),
                    format: audio.format(),
                    channel_layout: audio.channel_layout(),
                };
                let (out_index, enc) =
                    layout.open(octx, codec_id, time_base, audio.bit_rate())?;
                info!(
                    "[SETUP] audio lane: stream {in_index} -> {out_index} ({codec_id:?})"
                );
                Ok(Self {
                    in_index,
                    out_index,
                    time_base,
                    decoder: Decode::Audio(audio),
                    encoder: enc,
                    scratch: Packet::empty(),
                })
            }
            other => bail!("unsupported media kind {other:?}"),
        }
    }

    pub fn in_index(&self) -> usize {
        self.in_index
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    /// Feeds one compressed packet to the decode capability. An `Err` is the
    /// capability declining, not a failure of the run.
    pub fn send_packet(&mut self, packet: &Packet) -> Result<(), ffmpeg::Error> {
        match &mut self.decoder {
            Decode::Video(d) => d.send_packet(packet),
            Decode::Audio(d) => d.send_packet(packet),
        }
    }

    /// Pulls the next decoded frame into the caller's scratch buffer. The
    /// buffer's previous contents are released by the pull itself.
    pub fn receive_frame(&mut self, frame: &mut Frame) -> Result<(), ffmpeg::Error> {
        match &mut self.decoder {
            Decode::Video(d) => d.receive_frame(frame),
            Decode::Audio(d) => d.receive_frame(frame),
        }
    }

    /// Encode one frame and hand every completed packet to the sink: stream
    /// index set, timestamps rescaled from the encoder time base to the
    /// muxer-assigned stream time base. Declines at any stage are routine;
    /// nothing in here aborts the run.
    pub fn encode(&mut self, frame: &Frame, octx: &mut Output) {
        let accepted = match &mut self.encoder {
            Encode::Video(e) => e.send_frame(frame),
            Encode::Audio(e) => e.send_frame(frame),
        };
        if let Err(err) = accepted {
            debug!("[LANE] encoder declined frame on stream {}: {err}", self.out_index);
            return;
        }

        loop {
            let pulled = match &mut self.encoder {
                Encode::Video(e) => e.receive_packet(&mut self.scratch),
                Encode::Audio(e) => e.receive_packet(&mut self.scratch),
            };
            if pulled.is_err() {
                break;
            }
            self.scratch.set_stream(self.out_index);
            let Some(out_tb) = octx.stream(self.out_index).map(|s| s.time_base()) else {
                break;
            };
            self.scratch.rescale_ts(self.time_base, out_tb);
            if let Err(err) = self.scratch.write_interleaved(octx) {
                debug!("[LANE] muxer refused packet on stream {}: {err}", self.out_index);
            }
        }
    }
}

impl EncoderLayout {
    /// Opens an encoder for `codec_id` configured from this layout and
    /// registers its output stream on `octx`. Returns the new stream's index
    /// and the opened capability.
    fn open(
        self,
        octx: &mut Output,
        codec_id: codec::Id,
        time_base: Rational,
        bit_rate: usize,
    ) -> Result<(usize, Encode)> {
        let codec = encoder::find(codec_id)
            .ok_or(ffmpeg::Error::EncoderNotFound)
            .with_context(|| format!("no encoder for {codec_id:?}"))?;
        let global_header = octx
            .format()
            .flags()
            .contains(format::Flags::GLOBAL_HEADER);

        let mut ost = octx
            .add_stream(codec)
            .context("registering output stream")?;
        ost.set_time_base(time_base);
        let out_index = ost.index();

        let ctx = codec::context::Context::new_with_codec(codec);
        match self {
            EncoderLayout::Video {
                width,
                height,
                format,
                aspect_ratio,
                frame_rate,
            } => {
                let mut video = ctx.encoder().video().context("configuring video encoder")?;
                video.set_width(width);
                video.set_height(height);
                video.set_format(format);
                video.set_aspect_ratio(aspect_ratio);
                video.set_frame_rate(frame_rate);
                video.set_time_base(time_base);
                if bit_rate > 0 {
                    video.set_bit_rate(bit_rate);
                }
                if global_header {
                    video.set_flags(codec::Flags::GLOBAL_HEADER);
                }
                let opened = video.open_as(codec).context("opening video encoder")?;
                ost.set_parameters(&opened);
                Ok((out_index, Encode::Video(opened)))
            }
            EncoderLayout::Audio {
                rate,
                format,
                channel_layout,
            } => {
                let mut audio = ctx.encoder().audio().context("configuring audio encoder")?;
                audio.set_rate(rate as i32);
                audio.set_format(format);
                audio.set_channel_layout(channel_layout);
                audio.set_time_base(time_base);
                if bit_rate > 0 {
                    audio.set_bit_rate(bit_rate);
                }
                if global_header {
                    audio.set_flags(codec::Flags::GLOBAL_HEADER);
                }
                let opened = audio.open_as(codec).context("opening audio encoder")?;
                ost.set_parameters(&opened);
                Ok((out_index, Encode::Audio(opened)))
            }
        }
    }
}
