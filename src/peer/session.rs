//! The per-peer session state machine.
//!
//! A session is a single task multiplexing four event sources: decoded
//! frames from the peer, messages pushed by the coordinator, the
//! adaptive-rate tick, and cancellation. All of its mutable state lives
//! inside the loop; the outside world talks to it only through channels.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::Tuning;
use crate::constants::BLOCK_SIZE;
use crate::metainfo::Metainfo;
use crate::storage::PieceStore;
use crate::torrent::{TorrentStats, WorkQueue};

use super::bitfield::Bitfield;
use super::error::PeerError;
use super::message::{Handshake, Message};
use super::peer_id::PeerId;
use super::rate::{download_rate, queue_target, RateWindow};
use super::transport::{self, spawn_reader, FrameReader, FrameWriter};

const FRAME_CHANNEL_CAPACITY: usize = 64;

/// Everything a peer session needs from its torrent, cheap to clone per
/// spawned peer.
#[derive(Clone)]
pub struct PeerContext {
    pub info: Arc<Metainfo>,
    pub store: Arc<dyn PieceStore>,
    pub stats: Arc<TorrentStats>,
    /// The torrent's global bitfield; written only by the coordinator, read
    /// here to answer inbound requests.
    pub have: Arc<RwLock<Bitfield>>,
    pub work: WorkQueue,
    pub results: mpsc::UnboundedSender<u32>,
    pub dead_peers: mpsc::UnboundedSender<SocketAddr>,
    pub our_id: PeerId,
    pub tuning: Tuning,
}

/// The coordinator's grip on a running session: the send channel and the
/// session's cancellation token.
///
/// The send channel is unbounded so broadcasts are never dropped; its
/// traffic is bounded by the piece count plus lifecycle messages.
pub struct PeerHandle {
    pub send: mpsc::UnboundedSender<Message>,
    pub cancel: CancellationToken,
}

/// Dials `addr`, performs the handshake, and runs a session to completion.
///
/// Every exit path announces the address on `dead_peers`.
pub(crate) fn spawn_outbound(
    ctx: PeerContext,
    addr: SocketAddr,
    cancel: CancellationToken,
) -> PeerHandle {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let handle = PeerHandle {
        send: command_tx,
        cancel: cancel.clone(),
    };

    tokio::spawn(async move {
        match dial(&ctx, addr).await {
            Ok(stream) => run_session(ctx, addr, stream, command_rx, cancel).await,
            Err(err) => {
                debug!(peer = %addr, error = %err, "dial failed");
                let _ = ctx.dead_peers.send(addr);
            }
        }
    });

    handle
}

/// Runs a session on an already-handshaken inbound connection.
pub(crate) fn spawn_inbound(
    ctx: PeerContext,
    stream: TcpStream,
    addr: SocketAddr,
    cancel: CancellationToken,
) -> PeerHandle {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let handle = PeerHandle {
        send: command_tx,
        cancel: cancel.clone(),
    };

    tokio::spawn(run_session(ctx, addr, stream, command_rx, cancel));

    handle
}

/// TCP connect plus handshake exchange, validating the remote's info hash.
async fn dial(ctx: &PeerContext, addr: SocketAddr) -> Result<TcpStream, PeerError> {
    let tuning = ctx.tuning;
    let mut stream = transport::connect(addr, tuning.connect_timeout).await?;
    let ours = Handshake::new(ctx.info.info_hash.0, ctx.our_id.0);
    transport::send_handshake(&mut stream, &ours, tuning.handshake_timeout).await?;
    let theirs = transport::read_handshake(&mut stream, tuning.handshake_timeout).await?;
    if theirs.info_hash != ctx.info.info_hash.0 {
        return Err(PeerError::InfoHashMismatch);
    }
    Ok(stream)
}

async fn run_session(
    ctx: PeerContext,
    addr: SocketAddr,
    stream: TcpStream,
    commands: mpsc::UnboundedReceiver<Message>,
    cancel: CancellationToken,
) {
    ctx.stats.peer_connected();

    let (read_half, write_half) = stream.into_split();
    let (frame_tx, frame_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
    let reader_cancel = cancel.child_token();
    let reader = spawn_reader(
        FrameReader::new(read_half, ctx.tuning.keepalive_timeout),
        frame_tx,
        reader_cancel.clone(),
    );

    let dead_peers = ctx.dead_peers.clone();
    let stats = ctx.stats.clone();
    let mut session = PeerSession::new(ctx, addr, write_half, frame_rx, commands, cancel);

    match session.run().await {
        Ok(()) => debug!(peer = %addr, "session closed"),
        Err(err) => debug!(peer = %addr, error = %err, "session failed"),
    }

    // Work must be back in the queue before the coordinator learns we died.
    session.return_work();
    reader_cancel.cancel();
    let _ = reader.await;

    stats.peer_disconnected();
    let _ = dead_peers.send(addr);
}

struct WorkPiece {
    buf: Vec<u8>,
    /// Bytes of the piece not yet received.
    left: u32,
    /// Next byte offset to request.
    cursor: u32,
    started_at: Instant,
}

struct PeerSession {
    ctx: PeerContext,
    addr: SocketAddr,

    writer: FrameWriter,
    frames: mpsc::Receiver<Bytes>,
    commands: mpsc::UnboundedReceiver<Message>,
    cancel: CancellationToken,

    am_choking: bool,
    am_interested: bool,
    peer_choking: bool,
    peer_interested: bool,

    remote_bitfield: Bitfield,
    /// A Bitfield message is only honored before any other message.
    bitfield_allowed: bool,

    /// In-flight assemblies by piece index; ordered so refills prefer the
    /// lowest missing piece.
    work_pieces: BTreeMap<u32, WorkPiece>,
    /// Outstanding block requests.
    queue: usize,
    /// Allowed outstanding block requests, adapted every tick.
    queue_size: usize,

    bytes_rcvd: RateWindow,
    bytes_sent: RateWindow,

    last_msg_rcvd: Instant,
    last_msg_sent: Instant,
    last_request: Instant,
    last_piece: Instant,
    last_unchoked: Instant,
}

impl PeerSession {
    fn new(
        ctx: PeerContext,
        addr: SocketAddr,
        write_half: tokio::net::tcp::OwnedWriteHalf,
        frames: mpsc::Receiver<Bytes>,
        commands: mpsc::UnboundedReceiver<Message>,
        cancel: CancellationToken,
    ) -> Self {
        let now = Instant::now();
        let piece_count = ctx.info.info.piece_count();
        let tuning = ctx.tuning;
        Self {
            addr,
            writer: FrameWriter::new(write_half, tuning.write_timeout),
            frames,
            commands,
            cancel,
            am_choking: true,
            am_interested: false,
            peer_choking: true,
            peer_interested: false,
            remote_bitfield: Bitfield::new(piece_count),
            bitfield_allowed: true,
            work_pieces: BTreeMap::new(),
            queue: 0,
            queue_size: tuning.min_queue,
            bytes_rcvd: RateWindow::new(tuning.rate_window),
            bytes_sent: RateWindow::new(tuning.rate_window),
            last_msg_rcvd: now,
            last_msg_sent: now,
            last_request: now,
            last_piece: now,
            last_unchoked: now,
            ctx,
        }
    }

    async fn run(&mut self) -> Result<(), PeerError> {
        // Lead with our bitfield so the peer can get interested.
        let ours = self.ctx.have.read().to_bytes();
        if ours.iter().any(|&b| b != 0) {
            self.send_message(Message::Bitfield(ours)).await?;
        }

        let mut tick = tokio::time::interval(self.ctx.tuning.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tick.reset();

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(()),
                maybe = self.frames.recv() => match maybe {
                    Some(payload) => {
                        self.last_msg_rcvd = Instant::now();
                        self.handle_frame(payload).await?;
                    }
                    // Reader gone: EOF, protocol error, or idle expiry.
                    None => return Err(PeerError::ConnectionClosed),
                },
                maybe = self.commands.recv() => match maybe {
                    Some(message) => self.handle_command(message).await?,
                    None => return Ok(()),
                },
                _ = tick.tick() => self.on_tick().await?,
            }

            self.acquire_work().await?;
            if !self.peer_choking {
                self.fill_queue().await?;
            }
        }
    }

    async fn send_message(&mut self, message: Message) -> Result<(), PeerError> {
        self.writer.send(&message).await?;
        self.last_msg_sent = Instant::now();
        Ok(())
    }

    /// Applies a coordinator-pushed message and forwards it to the peer.
    async fn handle_command(&mut self, message: Message) -> Result<(), PeerError> {
        match message {
            Message::Choke => self.am_choking = true,
            Message::Unchoke => self.am_choking = false,
            _ => {}
        }
        self.send_message(message).await
    }

    async fn handle_frame(&mut self, payload: Bytes) -> Result<(), PeerError> {
        let message = match Message::decode(payload) {
            Ok(message) => message,
            Err(PeerError::UnknownMessageId(id)) => {
                trace!(peer = %self.addr, id, "ignoring unknown message");
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        if matches!(message, Message::KeepAlive) {
            return Ok(());
        }
        let bitfield_was_allowed = self.bitfield_allowed;
        self.bitfield_allowed = false;

        match message {
            Message::KeepAlive => {}
            Message::Choke => {
                self.peer_choking = true;
                // The peer won't serve outstanding requests; give the work
                // back rather than betting on a quick unchoke.
                self.return_work();
            }
            Message::Unchoke => {
                self.peer_choking = false;
                self.last_unchoked = Instant::now();
            }
            Message::Interested => {
                self.peer_interested = true;
                if self.am_choking {
                    self.am_choking = false;
                    self.send_message(Message::Unchoke).await?;
                }
            }
            Message::NotInterested => {
                self.peer_interested = false;
                if !self.am_choking {
                    self.am_choking = true;
                    self.send_message(Message::Choke).await?;
                }
            }
            Message::Have { index } => {
                self.remote_bitfield.set(index as usize);
            }
            Message::Bitfield(bits) => {
                if !bitfield_was_allowed {
                    trace!(peer = %self.addr, "ignoring mid-session bitfield");
                    return Ok(());
                }
                if bits.len() != self.ctx.info.info.bitfield_len() {
                    return Err(PeerError::InvalidMessage("bitfield length mismatch"));
                }
                self.remote_bitfield =
                    Bitfield::from_bytes(&bits, self.ctx.info.info.piece_count());
            }
            Message::Request {
                index,
                begin,
                length,
            } => {
                self.handle_request(index, begin, length).await?;
            }
            Message::Piece { index, begin, data } => {
                self.handle_piece(index, begin, data).await?;
            }
            // Validated by the codec, not acted upon.
            Message::Cancel { .. } | Message::Port(_) => {}
        }

        Ok(())
    }

    /// Serves one block to the peer, if we are allowed to and can.
    async fn handle_request(
        &mut self,
        index: u32,
        begin: u32,
        length: u32,
    ) -> Result<(), PeerError> {
        if self.am_choking {
            return Ok(());
        }
        if !self.ctx.have.read().has(index as usize) {
            return Ok(());
        }

        let piece = self.ctx.store.read_piece(index).await?;
        let end = begin as usize + length as usize;
        if end > piece.len() {
            return Ok(());
        }

        self.send_message(Message::Piece {
            index,
            begin,
            data: piece.slice(begin as usize..end),
        })
        .await?;

        self.bytes_sent.record(u64::from(length));
        self.ctx.stats.add_uploaded(u64::from(length));
        Ok(())
    }

    /// Folds a received block into its piece; on completion verifies,
    /// writes, and reports it.
    async fn handle_piece(&mut self, index: u32, begin: u32, block: Bytes) -> Result<(), PeerError> {
        self.bytes_rcvd.record(block.len() as u64);
        self.ctx.stats.add_downloaded(block.len() as u64);

        let Some(work) = self.work_pieces.get_mut(&index) else {
            // Stale block from work we dropped; not ours to count.
            trace!(peer = %self.addr, piece = index, "discarding unsolicited block");
            return Ok(());
        };

        self.queue = self.queue.saturating_sub(1);
        self.last_piece = Instant::now();

        let begin = begin as usize;
        let end = begin + block.len();
        if end > work.buf.len() {
            return Err(PeerError::BadBlock {
                index,
                begin: begin as u32,
            });
        }
        work.buf[begin..end].copy_from_slice(&block);
        work.left = work.left.saturating_sub(block.len() as u32);

        if work.left > 0 {
            return Ok(());
        }

        // Piece assembled: verify, then write, then report. A failure on
        // either path returns the index to the queue and keeps the session.
        let data = &self.work_pieces[&index].buf;
        if !self.ctx.store.verify_piece(index, data) {
            debug!(peer = %self.addr, piece = index, "piece failed verification");
            self.ctx.stats.record_hash_failure();
            self.work_pieces.remove(&index);
            self.ctx.work.push(index);
            return Ok(());
        }

        if let Err(err) = self.ctx.store.write_piece(index, data).await {
            debug!(peer = %self.addr, piece = index, error = %err, "piece write failed");
            self.work_pieces.remove(&index);
            self.ctx.work.push(index);
            return Ok(());
        }

        let elapsed = self.work_pieces[&index].started_at.elapsed();
        trace!(peer = %self.addr, piece = index, ?elapsed, "piece written");

        // Publish before dropping the assembly so a concurrent stop never
        // sees the piece in neither place.
        let _ = self.ctx.results.send(index);
        self.work_pieces.remove(&index);

        if self.work_pieces.is_empty() && self.am_interested {
            self.am_interested = false;
            self.send_message(Message::NotInterested).await?;
        }
        Ok(())
    }

    /// Pulls one piece of work from the shared queue if the pipeline has
    /// room and the remote can serve it.
    async fn acquire_work(&mut self) -> Result<(), PeerError> {
        if self.queue >= self.queue_size {
            return Ok(());
        }
        // While choked, one held piece is enough to signal interest;
        // hoarding more would starve the other sessions.
        if self.peer_choking && !self.work_pieces.is_empty() {
            return Ok(());
        }

        let Some(index) = self.ctx.work.pop() else {
            return Ok(());
        };
        if !self.remote_bitfield.has(index as usize) {
            self.ctx.work.push(index);
            return Ok(());
        }

        let size = self.ctx.info.info.piece_size(index);
        self.work_pieces.insert(
            index,
            WorkPiece {
                buf: vec![0; size as usize],
                left: size,
                cursor: 0,
                started_at: Instant::now(),
            },
        );

        if !self.am_interested {
            self.am_interested = true;
            self.send_message(Message::Interested).await?;
        }
        Ok(())
    }

    /// Sends block requests until the pipeline is full or no work remains.
    async fn fill_queue(&mut self) -> Result<(), PeerError> {
        if !self.am_interested || self.peer_choking {
            return Ok(());
        }

        let indices: Vec<u32> = self.work_pieces.keys().copied().collect();
        for index in indices {
            loop {
                if self.queue >= self.queue_size {
                    return Ok(());
                }
                let (cursor, size) = {
                    let work = &self.work_pieces[&index];
                    (work.cursor, work.buf.len() as u32)
                };
                if cursor >= size {
                    break;
                }

                let length = (size - cursor).min(BLOCK_SIZE);
                self.send_message(Message::Request {
                    index,
                    begin: cursor,
                    length,
                })
                .await?;

                if let Some(work) = self.work_pieces.get_mut(&index) {
                    work.cursor = cursor + length;
                }
                self.queue += 1;
                self.last_request = Instant::now();
            }
        }
        Ok(())
    }

    /// The 5-second housekeeping tick: adapt the pipeline depth, drop
    /// stalled work, keep the connection alive, give up on a dead one.
    async fn on_tick(&mut self) -> Result<(), PeerError> {
        let now = Instant::now();
        let tuning = self.ctx.tuning;

        let bytes = self.bytes_rcvd.total_at(now);
        let rate = download_rate(
            bytes,
            now.duration_since(self.last_unchoked),
            tuning.rate_window,
        );
        self.queue_size = queue_target(rate, tuning.min_queue, tuning.max_queue);
        trace!(
            peer = %self.addr,
            down_rate = rate,
            up_rate = self.bytes_sent.total_at(now) / tuning.rate_window.as_secs().max(1),
            queue_size = self.queue_size,
            interested = self.peer_interested,
            "rate tick"
        );

        if !self.work_pieces.is_empty()
            && self.last_request.saturating_duration_since(self.last_piece)
                >= tuning.stall_timeout
        {
            debug!(peer = %self.addr, "requests stalled, discarding in-flight work");
            self.return_work();
            if self.am_interested {
                self.am_interested = false;
                self.send_message(Message::NotInterested).await?;
            }
        }

        if now.duration_since(self.last_msg_sent) >= tuning.keepalive_interval {
            self.send_message(Message::KeepAlive).await?;
        }

        if now.duration_since(self.last_msg_rcvd) >= tuning.keepalive_timeout {
            return Err(PeerError::Timeout);
        }

        Ok(())
    }

    /// Returns all in-flight piece indices to the shared queue and voids
    /// the outstanding-request counter.
    fn return_work(&mut self) {
        for &index in self.work_pieces.keys() {
            self.ctx.work.push(index);
        }
        self.work_pieces.clear();
        self.queue = 0;
    }
}
