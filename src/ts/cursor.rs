use super::cache::PacketCache;
use super::extractor::TsCore;
use super::packet::TS_PACKET_SIZE;
use crate::{Error, Result};
use log::{debug, error, info, warn};
use std::sync::{Arc, Mutex, MutexGuard};

use super::parser::{AccessUnit, PacketQueue, TrackFormat};

/// A pending seek carried into [`TsStreamCursor::read`].
#[derive(Debug, Clone, Copy)]
pub struct SeekRequest {
    /// Target presentation time in microseconds.
    pub time_us: i64,
}

/// Navigation state of one elementary stream.
struct StreamInfo {
    stream_pid: u16,
    program_pid: u16,
    first_pts: u64,
    first_pts_offset: u64,
    last_pts: u64,
    last_pts_offset: u64,
    duration_us: i64,
    /// Clip offset the next packet for this stream is fed from.
    offset: u64,
}

struct CursorState {
    info: StreamInfo,
    cache: PacketCache,
    format: TrackFormat,
    /// Presentation time of the last sync unit actually handed out; the
    /// fallback target when a later seek cannot land on a sync frame.
    last_known_sync_frame_time_us: Option<i64>,
}

/// A seek that went wrong. `retryable` is set only when the offset was found
/// but no sync frame was reachable from it.
struct SeekFailure {
    error: Error,
    retryable: bool,
}

/// Per-elementary-stream source over the transport stream.
///
/// Owns its own packet cache and read offset; shares the parser and byte
/// source with the extractor through the core handle.
pub struct TsStreamCursor {
    core: Arc<TsCore>,
    queue: Arc<dyn PacketQueue>,
    is_video: bool,
    state: Mutex<CursorState>,
}

impl TsStreamCursor {
    pub(crate) fn new(core: Arc<TsCore>, queue: Arc<dyn PacketQueue>, is_video: bool) -> Self {
        let info = queue.stream_info();
        let offset = core.offset();
        debug!(
            "stream PID {}, program PID {}",
            info.stream_pid, info.program_pid
        );

        let cache = PacketCache::new(core.clip_size());
        let format = queue.format();

        Self {
            core,
            queue,
            is_video,
            state: Mutex::new(CursorState {
                info: StreamInfo {
                    stream_pid: info.stream_pid,
                    program_pid: info.program_pid,
                    first_pts: info.first_pts,
                    first_pts_offset: offset,
                    last_pts: 0,
                    last_pts_offset: 0,
                    duration_us: 0,
                    offset,
                },
                cache,
                format,
                last_known_sync_frame_time_us: None,
            }),
        }
    }

    pub fn is_video(&self) -> bool {
        self.is_video
    }

    /// Track format, including the duration once discovered.
    pub fn format(&self) -> TrackFormat {
        self.state.lock().unwrap().format.clone()
    }

    /// Re-sync the feed offset to wherever the extractor's probe stopped.
    pub fn start(&self) {
        self.state.lock().unwrap().info.offset = self.core.offset();
    }

    /// Determine the clip duration from the first and last PTS of this
    /// stream, scanning raw packets tail-first.
    pub fn find_stream_duration(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();

        if self.core.clip_size() == 0 {
            return Err(Error::InvalidOperation("clip size unknown"));
        }

        debug!(
            "first PTS {} for stream {} at {}",
            state.info.first_pts, state.info.stream_pid, state.info.first_pts_offset
        );

        let mut offset = self.core.clip_size() - TS_PACKET_SIZE as u64;
        let mut packet = [0u8; TS_PACKET_SIZE];
        let mut found = false;

        while offset > 0 {
            let read = self
                .core
                .byte_source()
                .read_at(offset, &mut packet)
                .map_err(Error::Io)?;
            if read < TS_PACKET_SIZE {
                debug!("reached end of stream while searching for the last PTS");
                return Err(Error::EndOfStream);
            }

            match self.core.parse_pts(&packet, state.info.stream_pid) {
                Err(e) => {
                    error!("hit an invalid packet while searching for the last PTS");
                    return Err(e);
                }
                Ok(Some(pts)) => {
                    state.info.last_pts = pts;
                    state.info.last_pts_offset = offset;
                    debug!(
                        "last PTS {} for stream {} at {}",
                        pts, state.info.stream_pid, offset
                    );
                    found = true;
                    break;
                }
                Ok(None) => {}
            }

            offset = offset.saturating_sub(TS_PACKET_SIZE as u64);
        }

        if !found {
            error!("could not find the last PTS");
            return Err(crate::err!(
                "no PTS found for stream {}",
                state.info.stream_pid
            ));
        }

        let duration_us =
            (state.info.last_pts.wrapping_sub(state.info.first_pts) as i64) * 100 / 9;
        if duration_us == 0 {
            return Err(crate::err!("stream duration is zero"));
        }

        state.info.duration_us = duration_us;
        state.format.duration_us = Some(duration_us);
        debug!("stream duration {duration_us}us");

        Ok(())
    }

    /// Dequeue the next access unit, honoring a pending seek first.
    pub fn read(&self, options: Option<SeekRequest>) -> Result<AccessUnit> {
        let mut state = self.state.lock().unwrap();

        if let Some(request) = options {
            if self.core.is_seekable() {
                if let Err(failure) = self.seek_prepare(&mut state, request.time_us) {
                    if matches!(failure.error, Error::DeadObject(_)) || !failure.retryable {
                        return Err(failure.error);
                    }

                    // Reset to the last known sync frame location and retry.
                    let fallback = state.last_known_sync_frame_time_us.unwrap_or(0);
                    self.seek_prepare(&mut state, fallback)
                        .map_err(|failure| failure.error)?;
                }
            }
        }

        loop {
            match self.queue.has_unit_available() {
                Ok(true) => break,
                Ok(false) => {
                    if let Err(e) = self.feed_more_for_stream(&mut state) {
                        self.queue.signal_eos(e);
                    }
                }
                Err(_) => return Err(Error::EndOfStream),
            }
        }

        let is_sync = self.queue.next_unit_is_sync()?;
        let sync_time_us = if is_sync {
            self.queue.next_unit_time_us()?
        } else {
            0
        };

        let unit = self.queue.dequeue_unit()?;
        if is_sync {
            state.last_known_sync_frame_time_us = Some(sync_time_us);
        }

        Ok(unit)
    }

    /// Resolve the seek target to a clip offset and align the stream on it.
    fn seek_prepare(
        &self,
        state: &mut MutexGuard<'_, CursorState>,
        seek_time_us: i64,
    ) -> std::result::Result<(), SeekFailure> {
        let seek_time = seek_time_us.max(0) as u64;
        let seek_pts = seek_time * 9 / 100 + state.info.first_pts;

        if state.info.duration_us <= 0 {
            return Err(SeekFailure {
                error: Error::InvalidOperation("stream duration unknown"),
                retryable: false,
            });
        }

        let proportional = (seek_time as i128 * self.core.clip_size() as i128
            / state.info.duration_us as i128) as u64;
        let seed_offset = proportional / TS_PACKET_SIZE as u64 * TS_PACKET_SIZE as u64;
        debug!("seek PTS {seek_pts}, start searching from offset {seed_offset}");

        let seek_offset = self
            .find_offset_for_pts(&state.info, seed_offset, seek_pts)
            .map_err(|error| {
                error!("cannot seek, unable to find an offset for {seek_time_us}us");
                SeekFailure {
                    error,
                    retryable: false,
                }
            })?;

        debug!("found seek offset at {seek_offset}");
        state.info.offset = seek_offset;
        state.cache.flush();

        // Flush buffered PES data in the parser.
        self.core.seek_to(seek_time_us);

        // Land video on a decodable frame.
        if self.is_video {
            if let Err(error) = self.seek_to_sync(state) {
                error!("cannot seek this clip: {error}");
                return Err(SeekFailure {
                    error,
                    retryable: true,
                });
            }
        }

        Ok(())
    }

    /// Directional walk for the packet whose PTS brackets `seek_pts`, seeded
    /// at `seed_offset`. Returns the bracketing offset whose PTS is closer.
    fn find_offset_for_pts(
        &self,
        info: &StreamInfo,
        seed_offset: u64,
        seek_pts: u64,
    ) -> Result<u64> {
        const PACKET: u64 = TS_PACKET_SIZE as u64;

        if seek_pts <= info.first_pts {
            info!("seek lands at the first PTS");
            return Ok(PACKET);
        }
        if seek_pts >= info.last_pts {
            info!("seek lands at the last PTS");
            return Ok(info.last_pts_offset);
        }

        let mut curr_pts: u64 = 0;
        let mut prev_pts: u64 = 0;
        let mut file_offset = seed_offset;
        let mut prev_offset: u64 = 0;
        let mut search_back = false;

        // A seed beyond either known PTS landmark flips the direction and
        // restarts just inside it.
        if file_offset >= info.last_pts_offset {
            search_back = true;
            file_offset = info.last_pts_offset.saturating_sub(PACKET);
            prev_pts = info.last_pts;
            prev_offset = info.last_pts_offset;
        }
        if file_offset <= info.first_pts_offset {
            search_back = false;
            file_offset = info.first_pts_offset + PACKET;
            prev_offset = info.first_pts_offset;
            prev_pts = info.first_pts;
        }

        let mut packet = [0u8; TS_PACKET_SIZE];
        loop {
            let read = self
                .core
                .byte_source()
                .read_at(file_offset, &mut packet)
                .map_err(Error::Io)?;
            if read < TS_PACKET_SIZE {
                warn!("error while reading data from the byte source");
                return Err(Error::EndOfStream);
            }

            if let Some(pts) = self.core.parse_pts(&packet, info.stream_pid)? {
                curr_pts = pts;

                if seek_pts == curr_pts
                    || (prev_offset != 0
                        && ((seek_pts < curr_pts && seek_pts > prev_pts)
                            || (seek_pts > curr_pts && seek_pts < prev_pts)))
                {
                    debug!(
                        "seek PTS {seek_pts} found for stream {} at {file_offset}",
                        info.stream_pid
                    );
                    break;
                }

                search_back = curr_pts >= seek_pts;
                prev_pts = curr_pts;
                prev_offset = file_offset;
            }

            if search_back {
                if file_offset > PACKET && file_offset - PACKET > info.first_pts_offset {
                    file_offset -= PACKET;
                } else {
                    warn!("reached start of file searching for seek PTS {seek_pts}");
                    file_offset = info.first_pts_offset;
                    break;
                }
            } else if file_offset + PACKET <= info.last_pts_offset {
                file_offset += PACKET;
            } else {
                warn!("reached end of file searching for seek PTS {seek_pts}");
                file_offset = info.last_pts_offset;
                break;
            }
        }

        // Of the two bracketing packets, pick the one closer in PTS.
        let delta_curr = seek_pts.abs_diff(curr_pts);
        let delta_prev = seek_pts.abs_diff(prev_pts);
        Ok(if delta_curr < delta_prev {
            file_offset
        } else {
            prev_offset
        })
    }

    /// Drop queued access units until the next one is a sync frame.
    fn seek_to_sync(&self, state: &mut MutexGuard<'_, CursorState>) -> Result<()> {
        loop {
            if !self.queue.has_unit_available()? {
                self.feed_more_for_stream(state)?;
                continue;
            }

            if self.queue.next_unit_is_sync()? {
                return Ok(());
            }

            info!("dropping access unit");
            self.queue.dequeue_unit()?;
        }
    }

    /// Pull packets through the cache until one for this stream is fed to
    /// the parser. A PAT or our own PMT showing up again means the program
    /// layout changed underneath us.
    fn feed_more_for_stream(&self, state: &mut MutexGuard<'_, CursorState>) -> Result<()> {
        let CursorState { info, cache, .. } = &mut **state;
        let mut offset = info.offset;

        loop {
            let packet = cache.get_packet(self.core.byte_source(), offset)?;

            let pid = self.core.parse_pid(packet).map_err(|e| {
                error!("error parsing PID");
                e
            })?;

            if pid == info.stream_pid {
                offset += TS_PACKET_SIZE as u64;
                info.offset = offset;
                return self.core.feed_packet(packet);
            }

            if pid == 0 || pid == info.program_pid {
                error!("PID changed, these clips are not supported");
                return Err(Error::DeadObject("program layout changed".into()));
            }

            offset += TS_PACKET_SIZE as u64;
        }
    }
}
