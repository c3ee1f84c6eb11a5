//! Sliding-window ARQ over a packet link
//!
//! Segment layout before protection:
//!
//! ```text
//! [kind: 'D' | 'A'][session: u16 BE][seq: u8][chunk ...]
//! ```
//!
//! Data segments carry up to `mtu` payload bytes; acks carry no chunk and
//! echo the session and sequence of the segment they acknowledge. Every
//! segment goes through the [`ResilienceCodec`] before it hits the wire.
//!
//! The sender keeps at most `window` segments unacknowledged. While waiting
//! for room it polls the link; outstanding segments older than the ack
//! timeout are retransmitted, and a segment that exhausts its retransmit
//! budget fails the call with [`LinkError::AckTimeout`].
//!
//! The receiver acks every valid data segment it sees, including
//! duplicates, and releases payloads strictly in sequence order. Segments
//! that arrive early wait in a reorder buffer no larger than the window.
//! Each link picks a random session id at construction; a peer that shows
//! up with a new session starts a fresh sequence space at 0.

use super::codec::ResilienceCodec;
use super::{FormatError, LinkError};
use crate::config::LinkConfig;
use std::collections::{BTreeMap, VecDeque};
use std::thread;
use std::time::{Duration, Instant};

const KIND_DATA: u8 = b'D';
const KIND_ACK: u8 = b'A';
const HEADER_LEN: usize = 4;

/// Largest window that keeps new and already-delivered sequence numbers apart
pub const MAX_WINDOW: usize = 64;

/// Sleep between polls when the link has nothing for us
const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Packet-granular link beneath the ARQ, e.g. a KISS TNC
pub trait PacketLink {
    fn send_packet(&mut self, packet: &[u8]) -> Result<(), LinkError>;

    /// One complete inbound packet, or `None` if nothing is ready
    fn receive_packet(&mut self) -> Result<Option<Vec<u8>>, LinkError>;
}

struct Outstanding {
    block: Vec<u8>,
    sent_at: Instant,
    retransmits: u32,
}

enum Segment {
    Data { session: u16, seq: u8, chunk: Vec<u8> },
    Ack { session: u16, seq: u8 },
}

fn header(kind: u8, session: u16, seq: u8) -> Vec<u8> {
    let [hi, lo] = session.to_be_bytes();
    vec![kind, hi, lo, seq]
}

fn parse_segment(mut bytes: Vec<u8>) -> Result<Segment, LinkError> {
    if bytes.len() < HEADER_LEN {
        return Err(LinkError::TooShort {
            need: HEADER_LEN,
            got: bytes.len(),
        });
    }
    let session = u16::from_be_bytes([bytes[1], bytes[2]]);
    let seq = bytes[3];
    match bytes[0] {
        KIND_DATA => Ok(Segment::Data {
            session,
            seq,
            chunk: bytes.split_off(HEADER_LEN),
        }),
        KIND_ACK => Ok(Segment::Ack { session, seq }),
        other => Err(FormatError::UnknownSegment(other).into()),
    }
}

/// Receive-side state for one peer session
struct Reassembly {
    session: u16,
    next_expected: u8,
    /// Early segments, all less than `window` ahead of `next_expected`
    early: BTreeMap<u8, Vec<u8>>,
    /// Nothing delivered yet, so no sequence number can be a duplicate
    fresh: bool,
}

impl Reassembly {
    fn new(session: u16) -> Self {
        Self {
            session,
            next_expected: 0,
            early: BTreeMap::new(),
            fresh: true,
        }
    }
}

pub struct ReliableLink<P> {
    link: P,
    codec: ResilienceCodec,
    mtu: usize,
    window: usize,
    ack_timeout: Duration,
    max_retransmits: u32,
    session: u16,
    next_seq: u8,
    unacked: BTreeMap<u8, Outstanding>,
    rx: Option<Reassembly>,
    /// In-order payloads not yet handed to the caller
    inbox: VecDeque<Vec<u8>>,
}

impl<P: PacketLink> ReliableLink<P> {
    /// New link with a random session id
    pub fn new(link: P, config: &LinkConfig) -> Self {
        Self::with_session(link, config, rand::random())
    }

    /// New link with a caller-chosen session id
    ///
    /// `window` is clamped into `1..=MAX_WINDOW`.
    pub fn with_session(link: P, config: &LinkConfig, session: u16) -> Self {
        Self {
            link,
            codec: ResilienceCodec::from_config(config),
            mtu: config.mtu.max(1),
            window: config.window.clamp(1, MAX_WINDOW),
            ack_timeout: config.ack_timeout(),
            max_retransmits: config.max_retransmits,
            session,
            next_seq: 0,
            unacked: BTreeMap::new(),
            rx: None,
            inbox: VecDeque::new(),
        }
    }

    pub fn link(&self) -> &P {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut P {
        &mut self.link
    }

    pub fn into_inner(self) -> P {
        self.link
    }

    pub fn session(&self) -> u16 {
        self.session
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Segments sent but not yet acknowledged
    pub fn in_flight(&self) -> usize {
        self.unacked.len()
    }

    /// Sequence number the next data segment will use
    pub fn next_seq(&self) -> u8 {
        self.next_seq
    }

    /// Send `payload` as one or more segments
    ///
    /// Returns once every segment has been handed to the link; segments may
    /// still be in flight. Call [`flush`](Self::flush) to wait for all acks.
    pub fn send(&mut self, payload: &[u8]) -> Result<(), LinkError> {
        for chunk in payload.chunks(self.mtu) {
            let window = self.window;
            self.wait_until(|link| link.unacked.len() < window)?;
            self.send_chunk(chunk)?;
        }
        Ok(())
    }

    /// Block until every outstanding segment is acknowledged
    pub fn flush(&mut self) -> Result<(), LinkError> {
        self.wait_until(|link| link.unacked.is_empty())
    }

    /// Deliver the next in-order payload, if any
    ///
    /// Corrupt, duplicate, early and ack-only packets yield `None`; only
    /// transport failures surface as errors.
    pub fn receive(&mut self) -> Result<Option<Vec<u8>>, LinkError> {
        if let Some(payload) = self.inbox.pop_front() {
            return Ok(Some(payload));
        }
        self.poll()?;
        Ok(self.inbox.pop_front())
    }

    fn send_chunk(&mut self, chunk: &[u8]) -> Result<(), LinkError> {
        let seq = self.next_seq;
        let mut segment = header(KIND_DATA, self.session, seq);
        segment.extend_from_slice(chunk);

        let block = self.codec.protect(&segment)?;
        self.link.send_packet(&block)?;
        tracing::trace!(seq, len = chunk.len(), "ARQ segment sent");

        self.unacked.insert(
            seq,
            Outstanding {
                block,
                sent_at: Instant::now(),
                retransmits: 0,
            },
        );
        self.next_seq = self.next_seq.wrapping_add(1);
        Ok(())
    }

    fn wait_until(&mut self, done: impl Fn(&Self) -> bool) -> Result<(), LinkError> {
        while !done(self) {
            let got_packet = self.poll()?;
            if done(self) {
                break;
            }
            self.retransmit_expired()?;
            if !got_packet {
                thread::sleep(POLL_INTERVAL);
            }
        }
        Ok(())
    }

    fn retransmit_expired(&mut self) -> Result<(), LinkError> {
        let now = Instant::now();
        let expired: Vec<u8> = self
            .unacked
            .iter()
            .filter(|(_, o)| now.duration_since(o.sent_at) >= self.ack_timeout)
            .map(|(&seq, _)| seq)
            .collect();

        for seq in expired {
            let Some(outstanding) = self.unacked.get_mut(&seq) else {
                continue;
            };
            if outstanding.retransmits >= self.max_retransmits {
                self.unacked.remove(&seq);
                tracing::warn!(seq, "ARQ segment unacknowledged, giving up");
                return Err(LinkError::AckTimeout { seq });
            }
            outstanding.retransmits += 1;
            outstanding.sent_at = now;
            tracing::debug!(seq, attempt = outstanding.retransmits, "ARQ retransmit");
            self.link.send_packet(&outstanding.block)?;
        }
        Ok(())
    }

    /// Read and handle at most one packet; true if one arrived
    fn poll(&mut self) -> Result<bool, LinkError> {
        let Some(packet) = self.link.receive_packet()? else {
            return Ok(false);
        };
        match self.codec.recover(&packet).and_then(parse_segment) {
            Ok(Segment::Ack { session, seq }) => {
                if session != self.session {
                    tracing::debug!(session, seq, "Ignoring ack for another session");
                } else if self.unacked.remove(&seq).is_some() {
                    tracing::trace!(seq, "ARQ ack");
                }
            }
            Ok(Segment::Data {
                session,
                seq,
                chunk,
            }) => self.accept_data(session, seq, chunk)?,
            Err(e) => tracing::debug!(error = %e, "Dropping undecodable ARQ packet"),
        }
        Ok(true)
    }

    fn accept_data(&mut self, session: u16, seq: u8, chunk: Vec<u8>) -> Result<(), LinkError> {
        let ack = self.codec.protect(&header(KIND_ACK, session, seq))?;
        self.link.send_packet(&ack)?;

        if self.rx.as_ref().is_some_and(|rx| rx.session != session) {
            tracing::info!(session, "Peer session changed, resetting reassembly");
            self.rx = None;
        }
        let window = self.window;
        let rx = self.rx.get_or_insert_with(|| Reassembly::new(session));

        let ahead = seq.wrapping_sub(rx.next_expected) as usize;
        if ahead >= window {
            let behind = rx.next_expected.wrapping_sub(seq) as usize;
            if !rx.fresh && behind <= window {
                tracing::debug!(seq, "Duplicate ARQ segment re-acked");
                return Ok(());
            }
            // Out of range for this session: we joined it midway
            tracing::debug!(seq, expected = rx.next_expected, "ARQ receiver resynchronized");
            rx.early.clear();
            rx.next_expected = seq;
        }

        rx.early.entry(seq).or_insert(chunk);
        while let Some(chunk) = rx.early.remove(&rx.next_expected) {
            self.inbox.push_back(chunk);
            rx.next_expected = rx.next_expected.wrapping_add(1);
            rx.fresh = false;
        }
        if !rx.early.is_empty() {
            tracing::trace!(
                expected = rx.next_expected,
                held = rx.early.len(),
                "Holding early ARQ segments"
            );
        }
        Ok(())
    }
}
