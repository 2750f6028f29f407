//! Symphonia based audio file decoder, used as black box codec for grains.

use std::{fs::File, io, path::Path};

use symphonia::core::{
    audio::{SampleBuffer, SignalSpec},
    codecs::{CodecParameters, Decoder, DecoderOptions},
    errors::Error as SymphoniaError,
    formats::{FormatOptions, FormatReader, SeekMode, SeekTo},
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
    units::TimeStamp,
};

use crate::error::Error;

// -------------------------------------------------------------------------------------------------

/// Decodes interleaved 16 bit integer samples from an audio file.
///
/// The file is kept open for as long as the decoder lives: drop it to close the file.
pub struct AudioDecoder {
    track_id: u32, // Internal track index.
    decoder: Box<dyn Decoder>,
    format: Box<dyn FormatReader>,
    sample_buffer: Option<SampleBuffer<i16>>,
}

impl AudioDecoder {
    /// Create a new decoder from the given file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = File::open(path.as_ref()).map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                Error::MediaFileNotFound
            } else {
                Error::IoError(err)
            }
        })?;

        // Help the format registry guess what format reader is appropriate.
        let mut hint = Hint::new();
        if let Some(extension) = path.as_ref().extension().and_then(|e| e.to_str()) {
            hint.with_extension(extension);
        }

        let source_stream = MediaSourceStream::new(Box::new(file), Default::default());
        Self::from_source_stream(source_stream, hint)
    }

    /// Create a new decoder from the given Symphonia MediaSourceStream
    pub fn from_source_stream(source_stream: MediaSourceStream, hint: Hint) -> Result<Self, Error> {
        // Use the default options when reading and decoding.
        let format_opts: FormatOptions = Default::default();
        let metadata_opts: MetadataOptions = Default::default();
        let decoder_opts: DecoderOptions = Default::default();

        // Probe the media source stream for a format.
        let probed = symphonia::default::get_probe()
            .format(&hint, source_stream, &format_opts, &metadata_opts)
            .map_err(|_| Error::MediaFileProbeError)?;

        // Get the format reader yielded by the probe operation.
        let format = probed.format;

        // Get the default track.
        let track = match format.default_track() {
            Some(t) => t,
            None => {
                return Err(Error::MediaFileNotFound);
            }
        };
        let track_id = track.id;

        // Create a decoder for the track.
        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &decoder_opts)
            .map_err(|err| Error::AudioDecodingError(Box::new(err)))?;

        Ok(Self {
            track_id,
            decoder,
            format,
            sample_buffer: None,
        })
    }

    pub fn codec_params(&self) -> &CodecParameters {
        self.decoder.codec_params()
    }

    /// Native sample rate and channel layout of the decoded track.
    pub fn signal_spec(&self) -> Result<SignalSpec, Error> {
        let params = self.codec_params();
        match (params.sample_rate, params.channels) {
            (Some(rate), Some(channels)) if rate > 0 && channels.count() > 0 => {
                Ok(SignalSpec { rate, channels })
            }
            _ => Err(Error::MediaFileProbeError),
        }
    }

    /// Total number of frames in the track. When the container doesn't tell, the entire
    /// stream gets decoded to count them, so this should be called once only.
    pub fn total_frames(&mut self) -> Result<u64, Error> {
        if let Some(frames) = self.codec_params().n_frames {
            return Ok(frames);
        }
        log::debug!("Audio file has no frame count: counting frames by decoding...");
        let mut frames = 0;
        while let Some((_, packet_frames)) = self.decode_next_packet()? {
            frames += packet_frames as u64;
        }
        Ok(frames)
    }

    /// Seek to the given frame and read up to `frame_count` interleaved frames from there.
    /// Returns less frames when the stream ends before.
    pub fn read_frames(&mut self, start_frame: u64, frame_count: usize) -> Result<Vec<i16>, Error> {
        let channel_count = self.signal_spec()?.channels.count();

        let seeked_to = self
            .format
            .seek(
                SeekMode::Accurate,
                SeekTo::TimeStamp {
                    ts: start_frame,
                    track_id: self.track_id,
                },
            )
            .map_err(|_| Error::MediaFileSeekError)?;
        // decoders must be reset after seeking
        self.decoder.reset();

        // accurate seeks may land before the requested frame: skip those frames
        let required_ts = seeked_to.required_ts;
        let mut output = Vec::with_capacity(frame_count * channel_count);
        while output.len() < frame_count * channel_count {
            let Some((packet_ts, packet_frames)) = self.decode_next_packet()? else {
                break; // end of stream
            };
            let skip_frames = required_ts.saturating_sub(packet_ts).min(packet_frames as u64);
            let samples = self.decoded_samples();
            let available = &samples[skip_frames as usize * channel_count..];
            let remaining = frame_count * channel_count - output.len();
            output.extend_from_slice(&available[..available.len().min(remaining)]);
        }
        Ok(output)
    }

    /// Samples of the packet that got decoded last.
    fn decoded_samples(&self) -> &[i16] {
        self.sample_buffer
            .as_ref()
            .map(|buffer| buffer.samples())
            .unwrap_or(&[])
    }

    /// Decode the next packet of our track into the sample buffer.
    /// Returns the packet's timestamp and frame count or `None` at the end of the stream.
    fn decode_next_packet(&mut self) -> Result<Option<(TimeStamp, usize)>, Error> {
        loop {
            // Demux an encoded packet from the media format.
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(io)) if io.kind() == io::ErrorKind::UnexpectedEof => {
                    return Ok(None); // End of this stream.
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(err) => {
                    log::error!("Audio file decoder format error: {err}");
                    return Err(err.into()); // We cannot recover from format errors, quit.
                }
            };
            while !self.format.metadata().is_latest() {
                // Consume any new metadata that has been read since the last packet.
                self.format.metadata().pop();
            }
            // If the packet does not belong to the selected track, skip over it.
            if packet.track_id() != self.track_id {
                continue;
            }
            // Decode the packet into an audio buffer.
            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let frames = decoded.frames();
                    // (re)allocate the sample buffer when the packet doesn't fit
                    let required_samples = decoded.capacity() * decoded.spec().channels.count();
                    if self
                        .sample_buffer
                        .as_ref()
                        .map_or(true, |buffer| buffer.capacity() < required_samples)
                    {
                        self.sample_buffer = Some(SampleBuffer::new(
                            decoded.capacity() as u64,
                            *decoded.spec(),
                        ));
                    }
                    // Interleave the samples into the buffer.
                    if let Some(buffer) = &mut self.sample_buffer {
                        buffer.copy_interleaved_ref(decoded);
                    }
                    return Ok(Some((packet.ts(), frames)));
                }
                Err(SymphoniaError::IoError(err)) => {
                    // The packet failed to decode due to an IO error, skip the packet.
                    log::warn!("Audio file decoder I/O error: {err}");
                    continue;
                }
                Err(SymphoniaError::DecodeError(err)) => {
                    // The packet failed to decode due to invalid data, skip the packet.
                    log::warn!("Audio file decoder error: {err}");
                    continue;
                }
                Err(err) => {
                    log::error!("Audio file decoder fatal error: {err}");
                    return Err(err.into());
                }
            };
        }
    }
}

// -------------------------------------------------------------------------------------------------
