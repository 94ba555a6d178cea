//! Clip-level transport-stream façade.

use super::cache::PacketCache;
use super::cursor::TsStreamCursor;
use super::packet::{MIME_TYPE_MPEG2TS, TS_PACKET_SIZE};
use super::parser::{Discontinuity, PacketQueue, SourceKind, TsParser};
use crate::source::ByteSource;
use crate::Result;
use log::{error, info, warn};
use std::sync::{Arc, Mutex};

/// Probe gives up after this many packets without both streams appearing.
const MAX_NUM_TS_PACKETS_FOR_META_DATA: usize = 10000;

/// The clip supports seeking backward.
pub const CAN_SEEK_BACKWARD: u32 = 0x01;
/// The clip supports seeking forward.
pub const CAN_SEEK_FORWARD: u32 = 0x02;
/// The clip supports pausing.
pub const CAN_PAUSE: u32 = 0x04;
/// The clip supports arbitrary seeks.
pub const CAN_SEEK: u32 = 0x08;

/// Construction-time configuration; replaces any ambient property lookup.
#[derive(Debug, Clone, Copy, Default)]
pub struct TsExtractorConfig {
    /// Force seeking off even when both streams report a duration.
    pub disable_seek: bool,
}

impl TsExtractorConfig {
    /// Interpret the conventional property string: `"true"` (any case) or
    /// `"1"` disables seeking.
    pub fn disable_seek_property(value: &str) -> bool {
        value.eq_ignore_ascii_case("true") || value == "1"
    }
}

/// State shared between the extractor and its stream cursors: the byte
/// source, the protocol parser and the probe feed position.
pub(crate) struct TsCore {
    source: Arc<dyn ByteSource>,
    clip_size: u64,
    state: Mutex<CoreState>,
}

struct CoreState {
    parser: Box<dyn TsParser>,
    cache: PacketCache,
    offset: u64,
    seekable: bool,
}

impl TsCore {
    pub fn byte_source(&self) -> &dyn ByteSource {
        self.source.as_ref()
    }

    pub fn clip_size(&self) -> u64 {
        self.clip_size
    }

    pub fn offset(&self) -> u64 {
        self.state.lock().unwrap().offset
    }

    pub fn is_seekable(&self) -> bool {
        self.state.lock().unwrap().seekable
    }

    /// Consume one aligned packet at the feed position and hand it to the
    /// parser.
    pub fn feed_more(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let CoreState {
            parser,
            cache,
            offset,
            ..
        } = &mut *state;

        let packet = cache.get_packet(self.source.as_ref(), *offset)?;
        *offset += TS_PACKET_SIZE as u64;
        parser.feed_packet(packet)
    }

    pub fn feed_packet(&self, packet: &[u8]) -> Result<()> {
        self.state.lock().unwrap().parser.feed_packet(packet)
    }

    pub fn parse_pid(&self, packet: &[u8]) -> Result<u16> {
        self.state.lock().unwrap().parser.parse_pid(packet)
    }

    pub fn parse_pts(&self, packet: &[u8], stream_pid: u16) -> Result<Option<u64>> {
        self.state.lock().unwrap().parser.parse_pts(packet, stream_pid)
    }

    pub fn source_for(&self, kind: SourceKind) -> Option<Arc<dyn PacketQueue>> {
        self.state.lock().unwrap().parser.source(kind)
    }

    /// Flush buffered PES data ahead of a player seek.
    pub fn seek_to(&self, _seek_time_us: i64) {
        let mut state = self.state.lock().unwrap();

        if !state.seekable {
            error!("cannot seek this clip");
            return;
        }

        state
            .parser
            .signal_discontinuity(Discontinuity::PlayerSeek);
    }

    fn set_seekable(&self, seekable: bool) {
        self.state.lock().unwrap().seekable = seekable;
    }
}

/// Transport-stream clip extractor.
///
/// Construction probes the clip for its elementary streams; the discovered
/// tracks are then read and seeked independently through their cursors.
pub struct TsExtractor {
    core: Arc<TsCore>,
    tracks: Vec<Arc<TsStreamCursor>>,
}

impl TsExtractor {
    pub fn new(
        source: Arc<dyn ByteSource>,
        parser: Box<dyn TsParser>,
        config: TsExtractorConfig,
    ) -> Self {
        let raw_size = source.size().unwrap_or(0);

        // A clip that is not packet aligned is treated as unsized: no probe,
        // no tracks, never seekable.
        let aligned = raw_size % TS_PACKET_SIZE as u64 == 0;
        let clip_size = if aligned { raw_size } else { 0 };

        let core = Arc::new(TsCore {
            source,
            clip_size,
            state: Mutex::new(CoreState {
                parser,
                cache: PacketCache::new(clip_size),
                offset: 0,
                seekable: false,
            }),
        });

        let mut extractor = Self {
            core,
            tracks: Vec::new(),
        };

        if aligned {
            extractor.init(&config);
        } else {
            warn!("clip size {raw_size} is not packet aligned");
        }

        extractor
    }

    /// Feed packets until audio and video both appear (or the probe cap is
    /// hit), then size up each discovered stream.
    fn init(&mut self, config: &TsExtractorConfig) {
        let mut have_audio = false;
        let mut have_video = false;
        let mut num_packets_parsed = 0;
        let mut audio_track: Option<Arc<TsStreamCursor>> = None;
        let mut video_track: Option<Arc<TsStreamCursor>> = None;

        while self.core.feed_more().is_ok() {
            if have_audio && have_video {
                break;
            }

            if !have_video {
                if let Some(queue) = self.core.source_for(SourceKind::Video) {
                    have_video = true;
                    let cursor = Arc::new(TsStreamCursor::new(self.core.clone(), queue, true));
                    video_track = Some(cursor.clone());
                    self.tracks.push(cursor);
                }
            }

            if !have_audio {
                if let Some(queue) = self.core.source_for(SourceKind::Audio) {
                    have_audio = true;
                    let mime = queue.format().mime;

                    // Of the MPEG audio family only bare audio/mpeg (mp3) is
                    // supported; anything more specific is dropped.
                    if mime.len() > 10
                        && mime
                            .get(..10)
                            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("audio/mpeg"))
                    {
                        error!("audio is {mime}, dropping this track");
                    } else {
                        info!("audio is {mime}, keeping this track");
                        let cursor =
                            Arc::new(TsStreamCursor::new(self.core.clone(), queue, false));
                        audio_track = Some(cursor.clone());
                        self.tracks.push(cursor);
                    }
                }
            }

            num_packets_parsed += 1;
            if num_packets_parsed > MAX_NUM_TS_PACKETS_FOR_META_DATA {
                warn!("parsed more than {MAX_NUM_TS_PACKETS_FOR_META_DATA} packets without finding AV data");
                break;
            }
        }

        info!("have_audio={have_audio}, have_video={have_video}");

        if !have_audio && !have_video {
            error!("could not find any audio/video data");
            return;
        }

        let mut audio_seekable = true;
        let mut video_seekable = true;

        if let Some(audio) = &audio_track {
            if audio.find_stream_duration().is_err() {
                audio_seekable = false;
            }
        }
        if let Some(video) = &video_track {
            if video.find_stream_duration().is_err() {
                video_seekable = false;
            }
        }

        if config.disable_seek {
            self.core.set_seekable(false);
        } else if audio_seekable && video_seekable {
            self.core.set_seekable(true);
        }
    }

    pub fn count_tracks(&self) -> usize {
        self.tracks.len()
    }

    pub fn track(&self, index: usize) -> Option<Arc<TsStreamCursor>> {
        self.tracks.get(index).cloned()
    }

    /// Container MIME type.
    pub fn mime_type(&self) -> &'static str {
        MIME_TYPE_MPEG2TS
    }

    pub fn is_seekable(&self) -> bool {
        self.core.is_seekable()
    }

    /// Capability flags: pausing always works, seeking only on sized clips
    /// whose streams reported a duration.
    pub fn flags(&self) -> u32 {
        let mut flags = CAN_PAUSE;

        if self.core.is_seekable() {
            flags |= CAN_SEEK_FORWARD | CAN_SEEK_BACKWARD | CAN_SEEK;
        }

        flags
    }
}
