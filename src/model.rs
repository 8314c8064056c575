// Copyright (c) 2023 xmpp-rs contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! In-memory representation of a Jingle file-transfer session and its
//! negotiated contents. Owned exclusively by [`crate::session_manager::SessionManager`];
//! see its module docs for the ownership discipline the IBB Transport must
//! observe.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::PathBuf;

use jid::Jid;
use xmpp_parsers::hashes::Hash;
use xmpp_parsers::ibb::StreamId;
use xmpp_parsers::jingle::{ContentId, Creator, Senders, SessionId};

/// Which parties may send data for a content. `Unknown` covers a `senders`
/// attribute present on the wire but not one of the values this core
/// understands: per §3 of the specification that's a distinct state, not a
/// validation failure, so the content carrying it is kept rather than
/// discarded (see `session_manager::validate_content`).
#[derive(Debug, Clone, PartialEq)]
pub enum SendersPolicy {
    Known(Senders),
    Unknown,
}

/// A file to be transferred, as described in a Jingle file-transfer
/// `description`. All string fields are kept exactly as received; `size`
/// is parsed to an integer only by callers that need it (`FileInfo::size_bytes`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileInfo {
    /// The file's base name, as offered by the peer.
    pub name: Option<String>,
    /// MIME type, as offered by the peer.
    pub media_type: Option<String>,
    /// Last-modified timestamp, as offered by the peer (raw ISO-8601 text).
    pub date: Option<String>,
    /// Decimal digit string giving the file size in bytes.
    pub size: Option<String>,
    /// A single integrity hash, if the peer supplied one.
    pub hash: Option<Hash>,
}

impl FileInfo {
    /// Parses [`FileInfo::size`] to an integer. Returns `None` if absent
    /// or not a valid non-negative decimal integer.
    pub fn size_bytes(&self) -> Option<u64> {
        self.size.as_deref()?.parse().ok()
    }
}

/// The transport negotiated for a content. A content whose transport
/// isn't in-band-bytestream is rejected during validation and never
/// reaches the table, so this is the only transport representation
/// a stored [`JingleContent`] ever needs.
#[derive(Debug, Clone, PartialEq)]
pub struct Transport {
    /// The transport-sid, unique globally across all active sessions.
    pub sid: StreamId,
    /// Maximum size in bytes of a single IBB data frame.
    pub block_size: u16,
}

/// Lifecycle state of a single negotiated content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentState {
    /// Negotiated, transport not yet finished transferring.
    Pending,
    /// The IBB Transport reported the backing byte-stream is done.
    TransferFinished,
}

/// One negotiated leg of a Jingle session: what's being sent, and how.
#[derive(Debug, Clone, PartialEq)]
pub struct JingleContent {
    /// Unique within its session.
    pub name: ContentId,
    /// Which party created this content (always `Initiator` for contents
    /// accepted from a `session-initiate`, since the receiver role never
    /// originates content; kept as a field instead of inlining the
    /// constant so `session-accept` can echo back what's actually in the
    /// table with the same code path generated content would use).
    pub creator: Creator,
    /// Which parties may send data for this content, echoed verbatim.
    pub senders: SendersPolicy,
    /// A content only ever carries a file-transfer description: any other
    /// (or missing) description is rejected before a content reaches the
    /// table.
    pub description: FileInfo,
    pub transport: Transport,
    pub state: ContentState,
}

/// Lifecycle state of a Jingle session. `Terminated` is not stored: a
/// terminated session is removed from the table entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initiated,
    Accepted,
}

/// A negotiated (or negotiating) Jingle session, keyed by `sid` in
/// [`crate::session_manager::SessionManager`].
#[derive(Debug, Clone, PartialEq)]
pub struct JingleSession {
    pub sid: SessionId,
    pub initiator: Jid,
    pub state: SessionState,
    pub contents: BTreeMap<String, JingleContent>,
}

impl JingleSession {
    /// True once every content has reached `transfer-finished`. A session
    /// with zero contents is never "all finished" (it should have been
    /// terminated with `cancel` at initiate time, see §4.1).
    pub fn all_contents_finished(&self) -> bool {
        !self.contents.is_empty()
            && self
                .contents
                .values()
                .all(|c| c.state == ContentState::TransferFinished)
    }
}

/// An open in-band-bytestream byte-stream, keyed by transport-sid in
/// [`crate::ibb_transport::IbbTransport`].
///
/// Deliberately holds no reference to the `FileInfo` it's writing: every
/// access goes back through the Session Manager by `sid`, so an `IbbSession`
/// structurally cannot outlive the `JingleContent` that backs it.
pub struct IbbSession {
    pub sid: StreamId,
    /// Expected sequence number of the next accepted frame, widened past
    /// the wire's `u16` so that once a transfer exceeds 65535 frames it
    /// stops matching any wire `seq` the peer could send (including a
    /// rollover back to 0), instead of wrapping around and accepting it.
    pub seq: u32,
    /// Open only once the first frame (`seq == 0`) has been accepted.
    pub stream: Option<File>,
    /// Where `stream` is writing to, set at the same time `stream` is.
    /// Kept alongside it so a completion notification can name the file
    /// without going back through `Downloads`.
    pub path: Option<PathBuf>,
    /// Bytes written so far; compared against the negotiated `FileInfo::size`.
    pub bytes_written: u64,
}

impl IbbSession {
    pub fn new(sid: StreamId) -> Self {
        IbbSession {
            sid,
            seq: 0,
            stream: None,
            path: None,
            bytes_written: 0,
        }
    }
}

impl std::fmt::Debug for IbbSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IbbSession")
            .field("sid", &self.sid)
            .field("seq", &self.seq)
            .field("stream_open", &self.stream.is_some())
            .field("path", &self.path)
            .field("bytes_written", &self.bytes_written)
            .finish()
    }
}
