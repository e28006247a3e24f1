//! Event record, the unit of the log.
//!
//! # On-disk layout (26 bytes, little-endian, no padding)
//!
//! ```text
//! Offset  Size  Field
//!    0      8   ts_ns        event time, ns since session epoch (LE u64)
//!    8      1   type         event kind 0..=5 (u8)
//!    9      1   side         0=bid 1=ask (u8)
//!   10      4   price_ticks  integer price index, may be negative (LE i32)
//!   14      4   qty          size in lots (LE u32)
//!   18      8   order_id     opaque, preserved for auditing (LE u64)
//! ```
//!
//! `side` is redundant with `type`; it is kept on the wire for cross-checks
//! and round-trips untouched. `order_id` is never consulted by replay.

use crate::error::LogError;

/// Exact on-disk size of one record. The file header re-declares this and
/// readers refuse any other value.
pub const RECORD_SIZE: usize = 26;

// ── Discriminants ────────────────────────────────────────────────────────────

/// Side of the book an event acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Side {
    Bid = 0,
    Ask = 1,
}

impl Side {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Side::Bid),
            1 => Some(Side::Ask),
            _ => None,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Side::Bid => "bid",
            Side::Ask => "ask",
        })
    }
}

/// Event kind. The numeric values are frozen on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EventType {
    AddBid      = 0,
    AddAsk      = 1,
    CancelBid   = 2,
    CancelAsk   = 3,
    ExecuteBuy  = 4,
    ExecuteSell = 5,
}

impl EventType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(EventType::AddBid),
            1 => Some(EventType::AddAsk),
            2 => Some(EventType::CancelBid),
            3 => Some(EventType::CancelAsk),
            4 => Some(EventType::ExecuteBuy),
            5 => Some(EventType::ExecuteSell),
            _ => None,
        }
    }

    /// The side of the book this event mutates. Executions hit the resting
    /// side: a buy consumes the ask, a sell consumes the bid.
    pub fn book_side(self) -> Side {
        match self {
            EventType::AddBid | EventType::CancelBid | EventType::ExecuteSell => Side::Bid,
            EventType::AddAsk | EventType::CancelAsk | EventType::ExecuteBuy  => Side::Ask,
        }
    }

    /// Diagnostic name (never parsed back).
    pub fn name(self) -> &'static str {
        match self {
            EventType::AddBid      => "ADD_BID",
            EventType::AddAsk      => "ADD_ASK",
            EventType::CancelBid   => "CANCEL_BID",
            EventType::CancelAsk   => "CANCEL_ASK",
            EventType::ExecuteBuy  => "EXECUTE_BUY",
            EventType::ExecuteSell => "EXECUTE_SELL",
        }
    }
}

// ── Record ───────────────────────────────────────────────────────────────────

/// One log record. `kind` and `side` stay raw `u8` so that a record read
/// from disk round-trips bit-exactly even if a future generator adds event
/// kinds this build does not know; the replay engine interprets them
/// through [`EventRecord::event_type`] and ignores what it cannot name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRecord {
    pub ts_ns:       u64,
    pub kind:        u8,
    pub side:        u8,
    pub price_ticks: i32,
    pub qty:         u32,
    pub order_id:    u64,
}

impl EventRecord {
    /// Build a record from a known event type; `side` is derived.
    pub fn new(ts_ns: u64, ty: EventType, price_ticks: i32, qty: u32, order_id: u64) -> Self {
        Self {
            ts_ns,
            kind: ty as u8,
            side: ty.book_side() as u8,
            price_ticks,
            qty,
            order_id,
        }
    }

    /// Typed view of `kind`; `None` for kinds unknown to this build.
    #[inline]
    pub fn event_type(&self) -> Option<EventType> {
        EventType::from_u8(self.kind)
    }

    /// Encode into a 26-byte wire image.
    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        buf[0..8].copy_from_slice(&self.ts_ns.to_le_bytes());
        buf[8] = self.kind;
        buf[9] = self.side;
        buf[10..14].copy_from_slice(&self.price_ticks.to_le_bytes());
        buf[14..18].copy_from_slice(&self.qty.to_le_bytes());
        buf[18..26].copy_from_slice(&self.order_id.to_le_bytes());
        buf
    }

    /// Decode from a 26-byte wire image.
    pub fn from_bytes(buf: &[u8; RECORD_SIZE]) -> Self {
        Self {
            ts_ns:       u64::from_le_bytes(buf[0..8].try_into().unwrap()),
            kind:        buf[8],
            side:        buf[9],
            price_ticks: i32::from_le_bytes(buf[10..14].try_into().unwrap()),
            qty:         u32::from_le_bytes(buf[14..18].try_into().unwrap()),
            order_id:    u64::from_le_bytes(buf[18..26].try_into().unwrap()),
        }
    }
}

/// Pack a slice of records into contiguous wire bytes.
pub fn pack_records(records: &[EventRecord]) -> Vec<u8> {
    let mut out = Vec::with_capacity(records.len() * RECORD_SIZE);
    for r in records {
        out.extend_from_slice(&r.to_bytes());
    }
    out
}

/// Reinterpret contiguous wire bytes as `count` records.
///
/// The byte length must be exactly `count * RECORD_SIZE`; anything else
/// means the chunk header lied about its payload.
pub fn unpack_records(bytes: &[u8], count: usize) -> Result<Vec<EventRecord>, LogError> {
    if bytes.len() != count * RECORD_SIZE {
        return Err(LogError::Decompress(format!(
            "payload is {} bytes but {} records need {}",
            bytes.len(),
            count,
            count * RECORD_SIZE,
        )));
    }
    let mut out = Vec::with_capacity(count);
    for raw in bytes.chunks_exact(RECORD_SIZE) {
        let arr: &[u8; RECORD_SIZE] = raw.try_into().unwrap();
        out.push(EventRecord::from_bytes(arr));
    }
    Ok(out)
}
