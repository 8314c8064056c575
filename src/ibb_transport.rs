// Copyright (c) 2023 xmpp-rs contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The In-Band Bytestream (XEP-0047) transport, profiled for writing a
//! received file to disk.
//!
//! [`IbbTransport`] owns the set of active byte-stream sessions, keyed by
//! transport-sid. It never stores a [`crate::model::FileInfo`] or block-size
//! of its own; every `open` and every completion check asks the
//! [`crate::session_manager::SessionManager`] for the negotiated content by
//! sid instead, so the two tables can never drift apart.

use std::fs::File;
use std::io::Write;

use jid::Jid;
use minidom::Element;
use xmpp_parsers::ibb::{Close, Data, Open, Stanza, StreamId};
use xmpp_parsers::iq::Iq;
use xmpp_parsers::stanza_error::{DefinedCondition, ErrorType, StanzaError};

use crate::collaborators::{ConnectionContext, Downloads, StanzaSink, Ui};
use crate::error::JftError;
use crate::model::IbbSession;
use crate::session_manager::SessionManager;

/// Owns every open in-band-bytestream, keyed by transport-sid.
pub struct IbbTransport {
    sessions: std::collections::BTreeMap<String, IbbSession>,
}

impl IbbTransport {
    pub fn new() -> Self {
        IbbTransport {
            sessions: std::collections::BTreeMap::new(),
        }
    }

    /// Dispatches one incoming `<iq type='set'/>` payload whose child is
    /// in the IBB namespace. `stanzas` receives every outgoing stanza this
    /// call produces, in order.
    pub fn handle_ibb(
        &mut self,
        from: Jid,
        id: String,
        payload: Element,
        session_manager: &mut SessionManager,
        downloads: &impl Downloads,
        conn: &mut impl ConnectionContext,
        stanzas: &mut impl StanzaSink,
        ui: &mut impl Ui,
    ) {
        match payload.name() {
            "open" => self.handle_open(from, id, payload, session_manager, stanzas),
            "data" => self.handle_data(from, id, payload, session_manager, downloads, conn, stanzas, ui),
            "close" => self.handle_close(from, id, payload, session_manager, conn, stanzas, ui),
            other => {
                log::debug!("ignoring unexpected IBB child <{}/> from {}", other, from);
            }
        }
    }

    fn handle_open(
        &mut self,
        from: Jid,
        id: String,
        elem: Element,
        session_manager: &SessionManager,
        stanzas: &mut impl StanzaSink,
    ) {
        // Taken before `elem` is consumed by `Open::try_from`: the
        // negotiated block-size must be compared character-for-character
        // against this raw string, not the parsed integers, so that a
        // leading-zero variant like `04096` is rejected even though
        // `u16::from_str` would parse it equal to `4096`.
        let raw_block_size = elem.attr("block-size").map(|s| s.to_string());

        let open = match Open::try_from(elem) {
            Ok(o) => o,
            Err(e) => {
                log::debug!("dropping malformed IBB open from {}: {}", from, e);
                return;
            }
        };

        if open.stanza != Stanza::Iq {
            send_error(
                stanzas,
                &id,
                from,
                StanzaError::new(
                    ErrorType::Cancel,
                    DefinedCondition::NotAcceptable,
                    "en",
                    "only iq-mode byte-streams are supported",
                ),
            );
            return;
        }

        if self.sessions.contains_key(&open.sid.0) {
            send_protocol_error(stanzas, &id, from, JftError::AlreadyOpen);
            return;
        }

        let content = match session_manager.lookup_content_by_transport_sid(&open.sid) {
            Some(c) => c,
            None => {
                send_protocol_error(stanzas, &id, from, JftError::NoSuchTransport);
                return;
            }
        };

        if raw_block_size.as_deref() != Some(content.transport.block_size.to_string().as_str()) {
            send_protocol_error(stanzas, &id, from, JftError::BlockSizeMismatch);
            return;
        }

        self.sessions.insert(open.sid.0.clone(), IbbSession::new(open.sid));
        ack(stanzas, &id, from);
    }

    fn handle_data(
        &mut self,
        from: Jid,
        id: String,
        elem: Element,
        session_manager: &mut SessionManager,
        downloads: &impl Downloads,
        conn: &mut impl ConnectionContext,
        stanzas: &mut impl StanzaSink,
        ui: &mut impl Ui,
    ) {
        if elem.attr("sid").is_none() {
            log::debug!("dropping IBB data with no sid from {}", from);
            return;
        }
        if elem.attr("seq").and_then(|s| s.parse::<u16>().ok()).is_none() {
            log::debug!("dropping IBB data with missing or unparsable seq from {}", from);
            return;
        }

        // sid and seq are already known-good at this point, so the only
        // remaining way `Data::try_from` can fail is a malformed base64
        // payload, which the peer must be told about (unlike a structurally
        // broken frame, which is just dropped).
        let data = match Data::try_from(elem) {
            Ok(d) => d,
            Err(e) => {
                send_protocol_error(stanzas, &id, from, JftError::Invalid(e.to_string()));
                return;
            }
        };

        let content = match session_manager.lookup_content_by_transport_sid(&data.sid).cloned() {
            Some(c) => c,
            None => {
                send_protocol_error(stanzas, &id, from, JftError::NoSuchSession);
                return;
            }
        };

        let ibb_session = match self.sessions.get_mut(&data.sid.0) {
            Some(s) => s,
            None => {
                send_protocol_error(stanzas, &id, from, JftError::NoSuchSession);
                return;
            }
        };

        if u32::from(data.seq) != ibb_session.seq {
            log::warn!(
                "out-of-order IBB data on {} (expected seq {}, got {}), closing",
                data.sid.0,
                ibb_session.seq,
                data.seq,
            );
            self.teardown(&data.sid, from, conn, stanzas, session_manager, ui, "out-of-order data");
            return;
        }

        let stream = if let Some(stream) = ibb_session.stream.as_mut() {
            stream
        } else {
            let suggested = content.description.name.as_deref().unwrap_or("received-file");
            let path = match downloads.resolve_path(suggested) {
                Ok(p) => p,
                Err(e) => {
                    log::error!("failed to resolve destination path for {}: {}", data.sid.0, e);
                    self.teardown(&data.sid, from, conn, stanzas, session_manager, ui, "could not create destination file");
                    return;
                }
            };
            let file = match File::create(&path) {
                Ok(file) => file,
                Err(e) => {
                    log::error!("failed to open destination file for {}: {}", data.sid.0, e);
                    self.teardown(&data.sid, from, conn, stanzas, session_manager, ui, "could not create destination file");
                    return;
                }
            };
            ibb_session.path = Some(path);
            ibb_session.stream.insert(file)
        };

        if let Err(e) = stream.write_all(&data.data) {
            log::error!("write failed for IBB session {}: {}", data.sid.0, e);
            self.teardown(&data.sid, from, conn, stanzas, session_manager, ui, "local write error");
            return;
        }
        ibb_session.bytes_written += data.data.len() as u64;
        ibb_session.seq += 1;

        let expected_size = content.description.size_bytes();
        let finished = expected_size.map_or(false, |size| ibb_session.bytes_written >= size);
        let path = ibb_session.path.clone();

        ack(stanzas, &id, from.clone());

        if finished {
            self.sessions.remove(&data.sid.0);
            send_close(stanzas, conn, from.clone(), data.sid.clone());
            session_manager.mark_content_finished(&data.sid, None, conn, stanzas);
            if let Some(path) = path {
                ui.notify_transfer_complete(&from, &path);
            }
        }
    }

    fn handle_close(
        &mut self,
        from: Jid,
        id: String,
        elem: Element,
        session_manager: &mut SessionManager,
        conn: &mut impl ConnectionContext,
        stanzas: &mut impl StanzaSink,
        ui: &mut impl Ui,
    ) {
        let close = match Close::try_from(elem) {
            Ok(c) => c,
            Err(e) => {
                log::debug!("dropping malformed IBB close from {}: {}", from, e);
                return;
            }
        };

        if self.sessions.remove(&close.sid.0).is_none() {
            send_protocol_error(stanzas, &id, from, JftError::NoSuchSession);
            return;
        }

        ack(stanzas, &id, from.clone());
        session_manager.mark_content_finished(
            &close.sid,
            Some("peer closed the byte-stream before the transfer completed"),
            conn,
            stanzas,
        );
        ui.notify_transfer_failed(&from, "peer closed the byte-stream before the transfer completed");
    }

    /// Removes the byte-stream session, notifies the peer with an outbound
    /// `close`, and promotes the backing content to `transfer-finished` so
    /// the session can be terminated the same way a clean finish is. Every
    /// error branch in `handle_data` that invalidates a session goes
    /// through here so the table entry is never left behind.
    fn teardown(
        &mut self,
        sid: &StreamId,
        to: Jid,
        conn: &mut impl ConnectionContext,
        stanzas: &mut impl StanzaSink,
        session_manager: &mut SessionManager,
        ui: &mut impl Ui,
        reason: &str,
    ) {
        self.sessions.remove(&sid.0);
        send_close(stanzas, conn, to.clone(), sid.clone());
        session_manager.mark_content_finished(sid, Some(reason), conn, stanzas);
        ui.notify_transfer_failed(&to, reason);
    }

    /// Destroys every active byte-stream session, without notifying any
    /// peer. Intended for use when the embedder's connection is closing;
    /// the Jingle sessions themselves are torn down separately by
    /// [`SessionManager::shutdown`].
    pub fn shutdown(&mut self) {
        self.sessions.clear();
    }
}

impl Default for IbbTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn ack(stanzas: &mut impl StanzaSink, id: &str, to: Jid) {
    let iq: Iq = Iq::empty_result(to, id.to_string());
    stanzas.send_stanza(iq.into());
}

fn send_error(stanzas: &mut impl StanzaSink, id: &str, to: Jid, error: StanzaError) {
    let iq = Iq::from_error(id.to_string(), error).with_to(to);
    stanzas.send_stanza(iq.into());
}

/// Like [`send_error`], but for a [`JftError`] rather than an already-built
/// [`StanzaError`]. `JftError::Io` has no peer-visible condition, since it
/// describes a local filesystem failure the peer can't act on; that case is
/// logged instead of sent.
fn send_protocol_error(stanzas: &mut impl StanzaSink, id: &str, to: Jid, err: JftError) {
    match err.to_stanza_error() {
        Some(stanza_error) => send_error(stanzas, id, to, stanza_error),
        None => log::error!("local error with no peer-visible condition: {}", err),
    }
}

fn send_close(stanzas: &mut impl StanzaSink, conn: &mut impl ConnectionContext, to: Jid, sid: StreamId) {
    let id = conn.next_id();
    let iq = Iq::from_set(id, Close { sid }).with_to(to).with_from(conn.local_jid().clone());
    stanzas.send_stanza(iq.into());
}
