use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::RetuneError;

/// Pull-based decoded audio reader.
///
/// Wraps a symphonia format reader + decoder pair and exposes the stream as
/// interleaved f32 frames. Undecodable packets are skipped with a warning;
/// end-of-stream is reported as a zero-frame read.
pub struct AudioSource {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
    total_frames: Option<u64>,
    pending: Vec<f32>,
    pending_pos: usize,
}

impl AudioSource {
    pub fn open(path: &Path) -> Result<Self, RetuneError> {
        let file = File::open(path).map_err(|source| RetuneError::FileOpen {
            path: path.to_path_buf(),
            source,
        })?;

        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| RetuneError::UnsupportedFormat(e.to_string()))?;

        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| RetuneError::UnsupportedFormat("no audio tracks found".into()))?;

        let track_id = track.id;
        let channels = track.codec_params.channels.map_or(1, |c| c.count());
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| RetuneError::UnsupportedFormat("unknown sample rate".into()))?;
        let total_frames = track.codec_params.n_frames;

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| RetuneError::UnsupportedFormat(e.to_string()))?;

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            channels,
            total_frames,
            pending: Vec::new(),
            pending_pos: 0,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Total frame count when the container reports one.
    pub fn total_frames(&self) -> Option<u64> {
        self.total_frames
    }

    /// Fills `buf` (interleaved, length = frames * channels) and returns the
    /// number of whole frames read. 0 signals end-of-stream.
    pub fn read_frames(&mut self, buf: &mut [f32]) -> Result<usize, RetuneError> {
        debug_assert_eq!(buf.len() % self.channels, 0);

        let mut written = 0;
        while written < buf.len() {
            if self.pending_pos < self.pending.len() {
                let n = (buf.len() - written).min(self.pending.len() - self.pending_pos);
                buf[written..written + n]
                    .copy_from_slice(&self.pending[self.pending_pos..self.pending_pos + n]);
                written += n;
                self.pending_pos += n;
                continue;
            }
            if !self.decode_next()? {
                break;
            }
        }
        Ok(written / self.channels)
    }

    /// Drains the remaining stream into one interleaved buffer.
    pub fn read_all(&mut self) -> Result<Vec<f32>, RetuneError> {
        let mut all = Vec::new();
        if let Some(frames) = self.total_frames {
            all.reserve(frames as usize * self.channels);
        }
        loop {
            if self.pending_pos < self.pending.len() {
                all.extend_from_slice(&self.pending[self.pending_pos..]);
                self.pending_pos = self.pending.len();
            }
            if !self.decode_next()? {
                break;
            }
        }
        Ok(all)
    }

    /// Decodes the next packet of our track into `pending`. Returns false at
    /// end-of-stream.
    fn decode_next(&mut self) -> Result<bool, RetuneError> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(false);
                }
                Err(e) => return Err(RetuneError::Decode(e)),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(err)) => {
                    log::warn!("skipping undecodable packet: {}", err);
                    continue;
                }
                Err(e) => return Err(RetuneError::Decode(e)),
            };

            let spec = *decoded.spec();
            let num_frames = decoded.frames();
            if num_frames == 0 {
                continue;
            }

            let mut sample_buf = SampleBuffer::<f32>::new(num_frames as u64, spec);
            sample_buf.copy_interleaved_ref(decoded);

            self.pending.clear();
            self.pending.extend_from_slice(sample_buf.samples());
            self.pending_pos = 0;
            return Ok(true);
        }
    }
}
