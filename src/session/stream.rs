//! Stream session: lifecycle control and the read loop
//!
//! A [`StreamSession`] owns one chunk source, one demuxer, and (for AVC
//! streams) one decoder, for the lifetime of a single device connection.
//! `start` spawns the read loop; `stop` cancels any pending read, closes
//! the decoder, and discards all parser state. Nothing owned by the
//! session outlives `stop`. Reconnecting means constructing a new
//! session.
//!
//! ```text
//! chunk source ──> accumulator ──> demuxer ──┬─ MJPEG: frame event
//!                                            └─ AVC: feeder ─> decoder ─> frame event
//! ```

use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::decode::feeder::{ErrorCallback, FrameCallback};
use crate::decode::{DecoderFactory, FrameFeeder};
use crate::error::{Error, Result};
use crate::media::{AnnexBDemuxer, MjpegDemuxer, NaluKind};
use crate::source::ChunkSource;
use crate::stats::{Counters, StreamStats};

use super::config::{SessionConfig, StreamFormat};
use super::event::{StreamEvent, VideoFrame};

/// Session lifecycle state
///
/// `Stopped` is terminal; a new session must be constructed to restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
    Stopped,
}

/// Format-specific demux/decode pipeline
enum Pipeline {
    Mjpeg {
        demux: MjpegDemuxer,
    },
    Avc {
        demux: AnnexBDemuxer,
        feeder: FrameFeeder,
    },
}

impl Pipeline {
    /// Append one chunk and drain every complete unit it makes available.
    fn ingest(&mut self, chunk: &[u8], counters: &Counters, events: &mpsc::Sender<StreamEvent>) {
        match self {
            Pipeline::Mjpeg { demux } => {
                demux.push(chunk);
                while let Some(frame) = demux.next_frame() {
                    // A full channel means the receiver is behind; this
                    // frame is shed rather than blocking the read loop.
                    match events.try_send(StreamEvent::Frame(VideoFrame::Jpeg(frame))) {
                        Ok(()) => Counters::add(&counters.frames_emitted, 1),
                        Err(_) => Counters::add(&counters.frames_dropped, 1),
                    }
                }
            }
            Pipeline::Avc { demux, feeder } => {
                demux.push(chunk);
                while let Some(unit) = demux.next_unit() {
                    Counters::add(&counters.nal_units, 1);
                    if unit.kind == NaluKind::Idr {
                        Counters::add(&counters.key_units, 1);
                    }
                    feeder.handle_unit(&unit);
                }
            }
        }
    }

    /// Drop accumulated parser state and close the decoder
    fn reset(&mut self) {
        match self {
            Pipeline::Mjpeg { demux } => demux.reset(),
            Pipeline::Avc { demux, feeder } => {
                demux.reset();
                feeder.reset();
            }
        }
    }
}

/// One live mirroring stream
///
/// Constructed with a chunk source and (for AVC) a decoder factory;
/// returns the event receiver the host renders from.
pub struct StreamSession {
    config: SessionConfig,
    state: Arc<Mutex<SessionState>>,
    pipeline: Arc<Mutex<Pipeline>>,
    counters: Arc<Counters>,
    source: Mutex<Option<Box<dyn ChunkSource>>>,
    stop_tx: watch::Sender<bool>,
    event_tx: mpsc::Sender<StreamEvent>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StreamSession {
    /// Create a session around a chunk source.
    ///
    /// `factory` is only used for AVC streams and only when
    /// `config.decoder_available` is set; hosts without decode capability
    /// pass `None` or clear the flag.
    pub fn new(
        config: SessionConfig,
        source: Box<dyn ChunkSource>,
        factory: Option<Arc<dyn DecoderFactory>>,
    ) -> Result<(Self, mpsc::Receiver<StreamEvent>)> {
        if config.format == StreamFormat::Mjpeg && config.boundary.is_empty() {
            return Err(Error::Config("multipart boundary must not be empty".into()));
        }
        if config.frame_interval_us == 0 {
            return Err(Error::Config("frame interval must be non-zero".into()));
        }
        if config.event_capacity == 0 {
            return Err(Error::Config("event capacity must be non-zero".into()));
        }

        let (event_tx, event_rx) = mpsc::channel(config.event_capacity);
        let counters = Arc::new(Counters::new());
        let (stop_tx, _) = watch::channel(false);

        let factory = if config.decoder_available {
            factory
        } else {
            None
        };

        let pipeline = match config.format {
            StreamFormat::Mjpeg => Pipeline::Mjpeg {
                demux: MjpegDemuxer::new(&config.boundary),
            },
            StreamFormat::Avc => {
                let on_frame: FrameCallback = {
                    let tx = event_tx.clone();
                    let counters = counters.clone();
                    Arc::new(move |frame| {
                        match tx.try_send(StreamEvent::Frame(VideoFrame::Decoded(frame))) {
                            Ok(()) => Counters::add(&counters.frames_emitted, 1),
                            Err(_) => Counters::add(&counters.frames_dropped, 1),
                        }
                    })
                };
                let on_error: ErrorCallback = {
                    let tx = event_tx.clone();
                    let counters = counters.clone();
                    Arc::new(move |err| {
                        Counters::add(&counters.decode_errors, 1);
                        let _ = tx.try_send(StreamEvent::Error(err.to_string()));
                    })
                };
                Pipeline::Avc {
                    demux: AnnexBDemuxer::new(),
                    feeder: FrameFeeder::new(
                        factory,
                        config.frame_interval_us,
                        config.coded_width,
                        config.coded_height,
                        on_frame,
                        on_error,
                    ),
                }
            }
        };

        let session = Self {
            config,
            state: Arc::new(Mutex::new(SessionState::Idle)),
            pipeline: Arc::new(Mutex::new(pipeline)),
            counters,
            source: Mutex::new(Some(source)),
            stop_tx,
            event_tx,
            task: Mutex::new(None),
        };
        Ok((session, event_rx))
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap()
    }

    /// Statistics snapshot
    pub fn stats(&self) -> StreamStats {
        self.counters.snapshot()
    }

    /// Begin pulling and demuxing the stream.
    ///
    /// Spawns the read loop; frames and errors arrive on the event
    /// receiver returned by [`new`](Self::new).
    pub fn start(&self) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            match *state {
                SessionState::Idle => *state = SessionState::Active,
                SessionState::Active => {
                    return Err(Error::InvalidState("session already started".into()))
                }
                SessionState::Stopped => {
                    return Err(Error::InvalidState(
                        "session is stopped; construct a new one".into(),
                    ))
                }
            }
        }

        let source = self
            .source
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| Error::InvalidState("chunk source already consumed".into()))?;

        let handle = tokio::spawn(read_loop(
            source,
            self.pipeline.clone(),
            self.counters.clone(),
            self.stop_tx.subscribe(),
            self.event_tx.clone(),
        ));
        *self.task.lock().unwrap() = Some(handle);
        tracing::debug!(format = ?self.config.format, "stream session started");
        Ok(())
    }

    /// Tear the session down.
    ///
    /// Safe to call at any time, from any task, repeatedly: cancels a
    /// pending read immediately, closes the decoder, and discards the
    /// accumulator and held SPS/PPS.
    pub fn stop(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if *state == SessionState::Stopped {
                return;
            }
            *state = SessionState::Stopped;
        }

        // Unblocks the read loop's pending await.
        let _ = self.stop_tx.send(true);
        // Detach the loop task; it observes the cancellation and exits.
        drop(self.task.lock().unwrap().take());
        self.pipeline.lock().unwrap().reset();
        tracing::debug!("stream session stopped");
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The read loop: the only task that touches the accumulator.
///
/// Awaiting the next chunk and the post-drain yield are the sole
/// suspension points; no lock is held across either.
async fn read_loop(
    mut source: Box<dyn ChunkSource>,
    pipeline: Arc<Mutex<Pipeline>>,
    counters: Arc<Counters>,
    mut stop_rx: watch::Receiver<bool>,
    events: mpsc::Sender<StreamEvent>,
) {
    loop {
        if *stop_rx.borrow() {
            break;
        }

        let next = tokio::select! {
            _ = stop_rx.changed() => {
                // Expected shutdown; swallowed.
                tracing::debug!("read cancelled by stop");
                break;
            }
            next = source.next_chunk() => next,
        };

        match next {
            Ok(Some(chunk)) => {
                Counters::add(&counters.chunks, 1);
                Counters::add(&counters.bytes_read, chunk.len() as u64);
                {
                    let mut pipeline = pipeline.lock().unwrap();
                    if *stop_rx.borrow() {
                        break;
                    }
                    pipeline.ingest(&chunk, &counters, &events);
                }
                // Drain every complete unit in the chunk above, then let
                // other scheduled work run before the next read.
                tokio::task::yield_now().await;
            }
            Ok(None) => {
                // Normal termination; the caller decides when to stop().
                tracing::debug!("end of stream");
                let _ = events.send(StreamEvent::Ended).await;
                break;
            }
            Err(e) if e.is_cancellation() => break,
            Err(e) => {
                tracing::warn!(error = %e, "stream read failed");
                let _ = events.send(StreamEvent::Error(e.to_string())).await;
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;
    use tokio::time::timeout;

    use crate::decode::testing::{DecoderCall, ScriptedFactory};
    use crate::decode::DecoderState;
    use crate::source::ChannelSource;

    use super::*;

    const BOUNDARY: &str = "BoundaryString";
    const WAIT: Duration = Duration::from_secs(2);

    async fn next_event(rx: &mut mpsc::Receiver<StreamEvent>) -> StreamEvent {
        timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    fn mjpeg_part(payload: &[u8]) -> Vec<u8> {
        let mut out = format!(
            "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
            BOUNDARY,
            payload.len()
        )
        .into_bytes();
        out.extend_from_slice(payload);
        out
    }

    struct FailingSource;

    #[async_trait]
    impl ChunkSource for FailingSource {
        async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset").into())
        }
    }

    #[tokio::test]
    async fn test_mjpeg_part_split_inside_payload() {
        let (tx, source) = ChannelSource::pair(8);
        let (session, mut rx) =
            StreamSession::new(SessionConfig::mjpeg(BOUNDARY), Box::new(source), None).unwrap();
        session.start().unwrap();

        let part = mjpeg_part(&[0xAA, 0xBB, 0xCC, 0xDD]);
        let split = part.len() - 2; // inside the JPEG payload
        tx.send(Bytes::copy_from_slice(&part[..split])).await.unwrap();
        tx.send(Bytes::copy_from_slice(&part[split..])).await.unwrap();
        drop(tx);

        match next_event(&mut rx).await {
            StreamEvent::Frame(VideoFrame::Jpeg(data)) => {
                assert_eq!(data.as_ref(), &[0xAA, 0xBB, 0xCC, 0xDD]);
            }
            other => panic!("expected frame, got {:?}", other),
        }
        assert!(matches!(next_event(&mut rx).await, StreamEvent::Ended));

        let stats = session.stats();
        assert_eq!(stats.frames_emitted, 1);
        assert_eq!(stats.chunks, 2);
        assert_eq!(stats.bytes_read, part.len() as u64);
    }

    #[tokio::test]
    async fn test_avc_configures_once_then_feeds_idr() {
        let factory = Arc::new(ScriptedFactory::new());
        let (tx, source) = ChannelSource::pair(8);
        let (session, mut rx) = StreamSession::new(
            SessionConfig::avc(),
            Box::new(source),
            Some(factory.clone() as Arc<dyn DecoderFactory>),
        )
        .unwrap();
        session.start().unwrap();

        // SPS, PPS, IDR; a trailing AUD start code closes the IDR unit.
        tx.send(Bytes::from_static(&[
            0, 0, 0, 1, 0x67, 0x42, 0x00, 0x1F, //
            0, 0, 0, 1, 0x68, 0xCE, //
            0, 0, 0, 1, 0x65, 0x11, 0x22, //
            0, 0, 0, 1, 0x09, 0x10,
        ]))
        .await
        .unwrap();
        drop(tx);

        match next_event(&mut rx).await {
            StreamEvent::Frame(VideoFrame::Decoded(frame)) => {
                assert_eq!(frame.timestamp_us, 0);
            }
            other => panic!("expected decoded frame, got {:?}", other),
        }
        assert!(matches!(next_event(&mut rx).await, StreamEvent::Ended));

        assert_eq!(factory.log.configure_count(), 1);
        let chunks = factory.log.decodes();
        assert_eq!(chunks.len(), 1);
        // IDR payload, 4-byte big-endian length prefix.
        assert_eq!(chunks[0].data.as_ref(), &[0, 0, 0, 3, 0x65, 0x11, 0x22]);
        assert!(chunks[0].keyframe);

        let stats = session.stats();
        assert_eq!(stats.nal_units, 3);
        assert_eq!(stats.key_units, 1);
        assert_eq!(stats.frames_emitted, 1);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_closes_decoder() {
        let factory = Arc::new(ScriptedFactory::new());
        let (tx, source) = ChannelSource::pair(8);
        let (session, mut rx) = StreamSession::new(
            SessionConfig::avc(),
            Box::new(source),
            Some(factory.clone() as Arc<dyn DecoderFactory>),
        )
        .unwrap();
        session.start().unwrap();

        tx.send(Bytes::from_static(&[
            0, 0, 0, 1, 0x67, 0x42, 0x00, 0x1F, //
            0, 0, 0, 1, 0x68, 0xCE, //
            0, 0, 0, 1, 0x65, 0x11, //
            0, 0, 0, 1, 0x09, 0x10,
        ]))
        .await
        .unwrap();
        // The frame event proves the pipeline processed everything.
        assert!(matches!(
            next_event(&mut rx).await,
            StreamEvent::Frame(_)
        ));

        session.stop();
        session.stop();
        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(factory.last_state(), Some(DecoderState::Closed));
        assert!(factory
            .log
            .calls()
            .iter()
            .any(|c| matches!(c, DecoderCall::Close)));
    }

    #[tokio::test]
    async fn test_stop_unblocks_pending_read() {
        let (tx, source) = ChannelSource::pair(8);
        let (session, _rx) =
            StreamSession::new(SessionConfig::mjpeg(BOUNDARY), Box::new(source), None).unwrap();
        session.start().unwrap();

        // No data ever arrives; the loop is parked on the read await.
        let handle = session.task.lock().unwrap().take().unwrap();
        session.stop();

        timeout(WAIT, handle)
            .await
            .expect("read loop did not exit after stop")
            .unwrap();
        drop(tx);
    }

    #[tokio::test]
    async fn test_stop_before_start() {
        let (_tx, source) = ChannelSource::pair(8);
        let (session, _rx) =
            StreamSession::new(SessionConfig::mjpeg(BOUNDARY), Box::new(source), None).unwrap();

        session.stop();
        session.stop();
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(session.start().is_err());
    }

    #[tokio::test]
    async fn test_end_of_stream_leaves_session_active() {
        let (tx, source) = ChannelSource::pair(8);
        let (session, mut rx) =
            StreamSession::new(SessionConfig::mjpeg(BOUNDARY), Box::new(source), None).unwrap();
        session.start().unwrap();
        drop(tx);

        assert!(matches!(next_event(&mut rx).await, StreamEvent::Ended));
        // The caller owns the final transition.
        assert_eq!(session.state(), SessionState::Active);
        session.stop();
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn test_reader_error_reported_session_stays_active() {
        let (session, mut rx) = StreamSession::new(
            SessionConfig::mjpeg(BOUNDARY),
            Box::new(FailingSource),
            None,
        )
        .unwrap();
        session.start().unwrap();

        match next_event(&mut rx).await {
            StreamEvent::Error(msg) => assert!(msg.contains("reset")),
            other => panic!("expected error event, got {:?}", other),
        }
        assert_eq!(session.state(), SessionState::Active);
        session.stop();
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let (_tx, source) = ChannelSource::pair(8);
        let (session, _rx) =
            StreamSession::new(SessionConfig::mjpeg(BOUNDARY), Box::new(source), None).unwrap();
        session.start().unwrap();
        assert!(matches!(
            session.start(),
            Err(Error::InvalidState(_))
        ));
        session.stop();
    }

    #[tokio::test]
    async fn test_decoder_unavailable_still_parses() {
        let factory = Arc::new(ScriptedFactory::new());
        let (tx, source) = ChannelSource::pair(8);
        let (session, mut rx) = StreamSession::new(
            SessionConfig::avc().without_decoder(),
            Box::new(source),
            Some(factory.clone() as Arc<dyn DecoderFactory>),
        )
        .unwrap();
        session.start().unwrap();

        tx.send(Bytes::from_static(&[
            0, 0, 0, 1, 0x67, 0x42, 0x00, 0x1F, //
            0, 0, 0, 1, 0x68, 0xCE, //
            0, 0, 0, 1, 0x65, 0x11, //
            0, 0, 0, 1, 0x09, 0x10,
        ]))
        .await
        .unwrap();
        drop(tx);

        assert!(matches!(next_event(&mut rx).await, StreamEvent::Ended));
        assert_eq!(factory.created(), 0);
        let stats = session.stats();
        assert_eq!(stats.nal_units, 3);
        assert_eq!(stats.decode_errors, 0);
        session.stop();
    }

    #[tokio::test]
    async fn test_decode_failure_surfaces_error_and_session_continues() {
        let factory = Arc::new(ScriptedFactory::new());
        factory.fail_decode(true);
        let (tx, source) = ChannelSource::pair(8);
        let (session, mut rx) = StreamSession::new(
            SessionConfig::avc(),
            Box::new(source),
            Some(factory.clone() as Arc<dyn DecoderFactory>),
        )
        .unwrap();
        session.start().unwrap();

        tx.send(Bytes::from_static(&[
            0, 0, 0, 1, 0x67, 0x42, 0x00, 0x1F, //
            0, 0, 0, 1, 0x68, 0xCE, //
            0, 0, 0, 1, 0x65, 0x11, //
            0, 0, 0, 1, 0x09, 0x10,
        ]))
        .await
        .unwrap();
        drop(tx);

        match next_event(&mut rx).await {
            StreamEvent::Error(msg) => assert!(msg.contains("Decode failed")),
            other => panic!("expected error event, got {:?}", other),
        }
        assert!(matches!(next_event(&mut rx).await, StreamEvent::Ended));
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.stats().decode_errors, 1);
        session.stop();
    }

    #[tokio::test]
    async fn test_full_event_channel_sheds_frames_and_counts_drops() {
        let (tx, source) = ChannelSource::pair(8);
        let (session, mut rx) = StreamSession::new(
            SessionConfig::mjpeg(BOUNDARY).event_capacity(1),
            Box::new(source),
            None,
        )
        .unwrap();
        session.start().unwrap();

        // Three complete parts in one chunk while nothing receives: the
        // first fills the channel, the rest are shed.
        let mut data = mjpeg_part(&[0x01]);
        data.extend_from_slice(&mjpeg_part(&[0x02]));
        data.extend_from_slice(&mjpeg_part(&[0x03]));
        tx.send(Bytes::from(data)).await.unwrap();

        timeout(WAIT, async {
            loop {
                let stats = session.stats();
                if stats.frames_emitted + stats.frames_dropped == 3 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("pipeline did not drain all parts");

        let stats = session.stats();
        assert_eq!(stats.frames_emitted, 1);
        assert_eq!(stats.frames_dropped, 2);

        // The queued frame is the first part.
        match next_event(&mut rx).await {
            StreamEvent::Frame(VideoFrame::Jpeg(frame)) => assert_eq!(frame.as_ref(), &[0x01]),
            other => panic!("expected frame, got {:?}", other),
        }
        drop(tx);
        assert!(matches!(next_event(&mut rx).await, StreamEvent::Ended));
        session.stop();
    }

    #[test]
    fn test_invalid_config_rejected() {
        let (_tx, source) = ChannelSource::pair(8);
        let err = StreamSession::new(SessionConfig::mjpeg(""), Box::new(source), None)
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(_)));

        let (_tx, source) = ChannelSource::pair(8);
        let err = StreamSession::new(
            SessionConfig::avc().frame_interval_us(0),
            Box::new(source),
            None,
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::Config(_)));
    }
}
