// Copyright (c) 2023 xmpp-rs contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The Jingle (XEP-0166) session-negotiation state machine, profiled for
//! file transfer (XEP-0234) over in-band-bytestream (XEP-0047) transport,
//! plus the lightweight XEP-0353 (Jingle Message Initiation) pre-negotiation
//! layer.
//!
//! [`SessionManager`] owns every [`crate::model::JingleSession`]. The
//! [`crate::ibb_transport::IbbTransport`] never mutates a content's
//! description or transport parameters; it only asks this module, by
//! transport-sid, what content it's writing into and reports state
//! transitions back by the same key. This keeps the negotiated parameters
//! and the bytes-on-the-wire bookkeeping from drifting out of sync.
//!
//! Every method here is synchronous: a caller (the embedder's IQ router)
//! hands in one stanza at a time and gets back zero or more outgoing
//! stanzas to send. Nothing here blocks or spawns anything.

use std::collections::BTreeMap;
use std::str::FromStr;

use jid::Jid;
use minidom::Element;
use xmpp_parsers::date::DateTime;
use xmpp_parsers::hashes::Hash;
use xmpp_parsers::ibb::StreamId;
use xmpp_parsers::iq::Iq;
use xmpp_parsers::jingle::{
    Action, Content, ContentId, Creator, Description as JingleDescription, Jingle, Reason,
    ReasonElement, Senders, SessionId,
};
use xmpp_parsers::jingle_ft::{Description as FtDescription, File as FtFile};
use xmpp_parsers::jingle_ibb::Transport as IbbTransport;
use xmpp_parsers::jingle_message::JingleMI;
use xmpp_parsers::ns;
use xmpp_parsers::stanza_error::{DefinedCondition, ErrorType, StanzaError};

use crate::collaborators::{ConnectionContext, StanzaSink, Ui};
use crate::config::JftConfig;
use crate::model::{
    ContentState, FileInfo, JingleContent, JingleSession, SendersPolicy, SessionState, Transport,
};

/// Why a `session-initiate` was rejected outright (no content survived
/// validation), used to choose the `<reason/>` on our `session-terminate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RejectReason {
    UnsupportedApplications,
    UnsupportedTransports,
    GeneralError,
}

impl RejectReason {
    fn worsen(self, other: RejectReason) -> RejectReason {
        use RejectReason::*;
        match (self, other) {
            (GeneralError, other) => other,
            (current, _) => current,
        }
    }

    fn into_jingle_reason(self) -> Reason {
        match self {
            RejectReason::UnsupportedApplications => Reason::UnsupportedApplications,
            RejectReason::UnsupportedTransports => Reason::UnsupportedTransports,
            RejectReason::GeneralError => Reason::GeneralError,
        }
    }
}

/// Tracks a `propose`d session that hasn't yet been followed by a Jingle
/// `session-initiate`, per XEP-0353. This crate never originates a
/// `propose` itself (the receiver only answers them); the bookkeeping
/// here exists so a late `retract` can be told apart from one referring
/// to a `sid` we never heard of.
#[derive(Debug, Clone)]
struct ProposedSession {
    from: Jid,
}

/// Owns every negotiated (or negotiating) [`JingleSession`] and answers
/// incoming Jingle and Jingle-Message-Initiation traffic.
pub struct SessionManager {
    config: JftConfig,
    sessions: BTreeMap<String, JingleSession>,
    proposed: BTreeMap<String, ProposedSession>,
}

impl SessionManager {
    pub fn new(config: JftConfig) -> Self {
        SessionManager {
            config,
            sessions: BTreeMap::new(),
            proposed: BTreeMap::new(),
        }
    }

    /// Dispatches one incoming `<iq type='set'/>` payload. `stanzas`
    /// receives every outgoing stanza this call produces, in order (the
    /// ack for `id` always comes first).
    pub fn handle_iq_set(
        &mut self,
        from: Jid,
        id: String,
        payload: Element,
        conn: &mut impl ConnectionContext,
        stanzas: &mut impl StanzaSink,
        ui: &mut impl Ui,
    ) {
        if payload.is("jingle", ns::JINGLE) {
            self.handle_jingle(from, id, payload, conn, stanzas, ui);
        } else {
            send_error(
                stanzas,
                &id,
                from,
                StanzaError::new(
                    ErrorType::Cancel,
                    DefinedCondition::ServiceUnavailable,
                    "en",
                    "No handler defined for this kind of iq.",
                ),
            );
        }
    }

    /// Dispatches one incoming Jingle Message Initiation element found in
    /// a `<message/>` stanza (`propose`, `retract`, `accept`, `proceed`,
    /// or `reject`; see XEP-0353).
    pub fn handle_jingle_message(&mut self, from: Jid, elem: Element, ui: &mut impl Ui) {
        let message = match JingleMI::try_from(elem) {
            Ok(m) => m,
            Err(e) => {
                log::debug!("dropping malformed Jingle Message Initiation element: {}", e);
                return;
            }
        };
        match message {
            JingleMI::Propose { sid, description } => {
                self.proposed
                    .insert(sid.0.clone(), ProposedSession { from: from.clone() });
                // Only a proposal whose description is Jingle RTP (XEP-0167)
                // gets a ring notification; any other application type is
                // tracked silently until a session-initiate follows it.
                if description.has_ns(ns::JINGLE_RTP) {
                    ui.notify_info(&format!("{} is ringing ({})", from, sid.0));
                }
            }
            JingleMI::Retract(sid) => {
                if self.proposed.remove(&sid.0).is_some() {
                    ui.notify_info(&format!("{} retracted its proposal ({})", from, sid.0));
                }
            }
            JingleMI::Accept(sid) => {
                log::debug!("peer acknowledged our own device accepted proposal {}", sid.0);
            }
            JingleMI::Proceed(sid) => {
                // The Jingle session-initiate this unblocks arrives as a
                // separate iq; nothing to do here but stop tracking the
                // proposal.
                self.proposed.remove(&sid.0);
            }
            JingleMI::Reject(sid) => {
                if self.proposed.remove(&sid.0).is_some() {
                    ui.notify_info(&format!("{} rejected the proposed session ({})", from, sid.0));
                }
            }
        }
    }

    fn handle_jingle(
        &mut self,
        from: Jid,
        id: String,
        elem: Element,
        conn: &mut impl ConnectionContext,
        stanzas: &mut impl StanzaSink,
        ui: &mut impl Ui,
    ) {
        let header = match JingleHeader::parse(&elem) {
            Ok(h) => h,
            Err(reason) => {
                log::debug!("dropping malformed jingle element from {}: {}", from, reason);
                return;
            }
        };

        // A session-initiate whose `initiator` doesn't match who actually
        // sent the iq is spoofed (or simply missing, which is just as
        // unusable): drop it silently, before acking, so it leaves no trace
        // (no session, no outbound traffic).
        if header.action == Action::SessionInitiate {
            let matches = elem
                .attr("initiator")
                .and_then(|attr| attr.parse::<Jid>().ok())
                .map(|initiator| initiator == from)
                .unwrap_or(false);
            if !matches {
                log::debug!("dropping session-initiate with missing or mismatched initiator from {}", from);
                return;
            }
        }

        // Every well-formed Jingle iq gets acked before anything else.
        ack(stanzas, &id, from.clone());

        match header.action {
            Action::SessionInitiate => {
                self.handle_session_initiate(from, header, &elem, conn, stanzas, ui)
            }
            Action::SessionTerminate => self.handle_session_terminate(from, header, &elem, ui),
            Action::SessionInfo => {
                log::debug!("answered session-info ping from {}", from);
            }
            other => {
                log::debug!(
                    "ignoring unsupported Jingle action {:?} from {} for session {}",
                    other,
                    from,
                    header.sid.0
                );
            }
        }
    }

    fn handle_session_initiate(
        &mut self,
        from: Jid,
        header: JingleHeader,
        elem: &Element,
        conn: &mut impl ConnectionContext,
        stanzas: &mut impl StanzaSink,
        ui: &mut impl Ui,
    ) {
        if self.sessions.contains_key(&header.sid.0) {
            self.send_terminate(
                from,
                header.sid,
                Reason::GeneralError,
                Some("a session with this sid is already active"),
                conn,
                stanzas,
            );
            return;
        }

        let mut contents = BTreeMap::new();
        let mut reject_reason = RejectReason::GeneralError;
        let mut any_seen = false;

        for child in elem.children().filter(|c| c.is("content", ns::JINGLE)) {
            any_seen = true;
            match self.validate_content(child, &contents) {
                Ok(content) => {
                    contents.insert(content.name.0.clone(), content);
                }
                Err(reason) => reject_reason = reject_reason.worsen(reason),
            }
        }

        if contents.is_empty() {
            let reason = if any_seen {
                reject_reason.into_jingle_reason()
            } else {
                Reason::Cancel
            };
            ui.notify_transfer_failed(&from, "no content in this session is supported");
            self.send_terminate(from, header.sid, reason, Some("no content in this session is supported"), conn, stanzas);
            return;
        }

        let accept = Jingle::new(Action::SessionAccept, header.sid.clone())
            .with_responder(Jid::Bare(conn.local_jid().clone().to_bare()))
            .with_initiator(from.clone());
        let accept = contents.values().fold(accept, |accept, content| {
            accept.add_content(build_content_element(content))
        });

        let session = JingleSession {
            sid: header.sid.clone(),
            initiator: from.clone(),
            state: SessionState::Accepted,
            contents,
        };
        self.sessions.insert(header.sid.0.clone(), session);

        send_jingle_set(stanzas, conn, from, accept);
    }

    fn handle_session_terminate(&mut self, from: Jid, header: JingleHeader, elem: &Element, ui: &mut impl Ui) {
        let removed = self.sessions.remove(&header.sid.0);
        if removed.is_none() {
            log::debug!("session-terminate for unknown session {} from {}", header.sid.0, from);
            return;
        }
        let reason = elem
            .children()
            .find(|c| c.is("reason", ns::JINGLE))
            .and_then(|r| ReasonElement::try_from(r.clone()).ok());
        match reason.map(|r| r.reason) {
            Some(Reason::Success) => ui.notify_info(&format!("{} ended the session", from)),
            Some(other) => ui.notify_transfer_failed(&from, &format!("session ended: {:?}", other)),
            None => ui.notify_transfer_failed(&from, "session ended"),
        }
    }

    /// Validates and converts one `<content/>` child of a `session-initiate`.
    /// Any failure here means "skip this content", not "reject the whole
    /// session": the caller decides what to do if every content fails.
    /// `siblings` holds the contents already accepted from the same
    /// `session-initiate`, so a transport-sid collision between two
    /// contents of the same stanza is caught even though neither is in
    /// `self.sessions` yet.
    fn validate_content(
        &self,
        elem: &Element,
        siblings: &BTreeMap<String, JingleContent>,
    ) -> Result<JingleContent, RejectReason> {
        let creator: Creator = elem
            .attr("creator")
            .ok_or(RejectReason::GeneralError)?
            .parse()
            .map_err(|_| RejectReason::GeneralError)?;
        // Unlike `creator`, an unparsable `senders` doesn't reject the
        // content: §3 of the specification carries an explicit "unknown"
        // state for exactly this, so the content is kept with that state
        // instead of being dropped.
        let senders = match elem.attr("senders") {
            None => SendersPolicy::Known(Senders::default()),
            Some(s) => s
                .parse()
                .map(SendersPolicy::Known)
                .unwrap_or(SendersPolicy::Unknown),
        };
        let name = elem.attr("name").ok_or(RejectReason::GeneralError)?.to_string();

        let description_elem = elem
            .children()
            .find(|c| c.name() == "description")
            .ok_or(RejectReason::UnsupportedApplications)?;
        if !description_elem.is("description", ns::JINGLE_FT) {
            return Err(RejectReason::UnsupportedApplications);
        }
        let description = FtDescription::try_from(description_elem.clone())
            .map_err(|_| RejectReason::UnsupportedApplications)?;

        let transport_elem = elem
            .children()
            .find(|c| c.name() == "transport")
            .ok_or(RejectReason::UnsupportedTransports)?;
        if !transport_elem.is("transport", ns::JINGLE_IBB) {
            return Err(RejectReason::UnsupportedTransports);
        }
        let transport = IbbTransport::try_from(transport_elem.clone())
            .map_err(|_| RejectReason::UnsupportedTransports)?;

        if transport.block_size > self.config.max_block_size {
            return Err(RejectReason::UnsupportedTransports);
        }

        if self.transport_sid_in_use(&transport.sid)
            || siblings.values().any(|c| c.transport.sid == transport.sid)
        {
            return Err(RejectReason::GeneralError);
        }

        Ok(JingleContent {
            name: ContentId(name),
            creator,
            senders,
            description: file_info_from(description.file),
            transport: Transport {
                sid: transport.sid,
                block_size: transport.block_size,
            },
            state: ContentState::Pending,
        })
    }

    fn transport_sid_in_use(&self, sid: &StreamId) -> bool {
        self.sessions
            .values()
            .flat_map(|s| s.contents.values())
            .any(|c| c.transport.sid == *sid)
    }

    fn send_terminate(
        &mut self,
        to: Jid,
        sid: SessionId,
        reason: Reason,
        diagnostic: Option<&str>,
        conn: &mut impl ConnectionContext,
        stanzas: &mut impl StanzaSink,
    ) {
        let jingle = Jingle::new(Action::SessionTerminate, sid).set_reason(reason_element(reason, diagnostic));
        send_jingle_set(stanzas, conn, to, jingle);
    }

    /// Looks up which content a transport-sid belongs to, for the IBB
    /// Transport to consult on `open`.
    pub fn lookup_content_by_transport_sid(&self, sid: &StreamId) -> Option<&JingleContent> {
        self.sessions
            .values()
            .flat_map(|s| s.contents.values())
            .find(|c| c.transport.sid == *sid)
    }

    /// Promotes the content behind `sid` to `transfer-finished`, once its
    /// byte-stream reports completion or is torn down. If this was the
    /// last pending content of its session, emits `session-terminate`
    /// (reason `success`, carrying `diagnostic` as the reason's text child
    /// if given) and removes the session. Returns `false` if no content
    /// matches `sid`.
    pub fn mark_content_finished(
        &mut self,
        sid: &StreamId,
        diagnostic: Option<&str>,
        conn: &mut impl ConnectionContext,
        stanzas: &mut impl StanzaSink,
    ) -> bool {
        let session_key = match self.sessions.iter_mut().find_map(|(key, session)| {
            session
                .contents
                .values_mut()
                .find(|c| c.transport.sid == *sid)
                .map(|content| {
                    content.state = ContentState::TransferFinished;
                    key.clone()
                })
        }) {
            Some(key) => key,
            None => return false,
        };

        let all_finished = self
            .sessions
            .get(&session_key)
            .map(JingleSession::all_contents_finished)
            .unwrap_or(false);
        if all_finished {
            if let Some(session) = self.sessions.remove(&session_key) {
                log::info!("session {} finished, terminating", session.sid.0);
                let jingle = Jingle::new(Action::SessionTerminate, session.sid)
                    .set_reason(reason_element(Reason::Success, diagnostic));
                send_jingle_set(stanzas, conn, session.initiator, jingle);
            }
        }
        true
    }

    /// True once every content across every session this manager holds
    /// has finished transferring — used by an embedder that wants to know
    /// when it's safe to disconnect.
    pub fn all_finished(&self) -> bool {
        self.sessions.values().all(JingleSession::all_contents_finished)
    }

    /// Tears down every open session, telling each peer `gone`. Intended
    /// for use when the embedder's connection is closing.
    pub fn shutdown(&mut self, conn: &mut impl ConnectionContext, stanzas: &mut impl StanzaSink) {
        let sessions = std::mem::take(&mut self.sessions);
        for (_, session) in sessions {
            let jingle = Jingle::new(Action::SessionTerminate, session.sid)
                .set_reason(reason_element(Reason::Gone, Some("the local client is shutting down")));
            send_jingle_set(stanzas, conn, session.initiator, jingle);
        }
        self.proposed.clear();
    }

    pub fn config(&self) -> &JftConfig {
        &self.config
    }

    /// Number of sessions currently tracked. Mostly useful to tests and
    /// diagnostics; nothing in this crate branches on the count itself.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

struct JingleHeader {
    action: Action,
    sid: SessionId,
}

impl JingleHeader {
    fn parse(elem: &Element) -> Result<JingleHeader, &'static str> {
        let action: Action = elem
            .attr("action")
            .ok_or("missing action attribute on jingle element")?
            .parse()
            .map_err(|_| "unknown action attribute on jingle element")?;
        let sid = elem
            .attr("sid")
            .ok_or("missing sid attribute on jingle element")?
            .to_string();
        Ok(JingleHeader {
            action,
            sid: SessionId(sid),
        })
    }
}

fn file_info_from(file: FtFile) -> FileInfo {
    FileInfo {
        name: file.name,
        media_type: file.media_type,
        date: file.date.map(|d| d.0.to_rfc3339()),
        size: file.size.map(|s| s.to_string()),
        hash: file.hashes.into_iter().next(),
    }
}

fn build_content_element(content: &JingleContent) -> Content {
    // Re-parse the raw ISO-8601 text back into the wire `DateTime`: the
    // table in §4.1 requires `date` to be echoed alongside the other file
    // fields, and `FileInfo` only ever kept it as the string it arrived as.
    let date = content
        .description
        .date
        .as_deref()
        .and_then(|d| DateTime::from_str(d).ok());
    let file = FtFile {
        date,
        media_type: content.description.media_type.clone(),
        name: content.description.name.clone(),
        descs: Default::default(),
        size: content.description.size_bytes(),
        range: None,
        hashes: content.description.hash.clone().into_iter().collect::<Vec<Hash>>(),
    };
    let description_elem: Element = FtDescription { file }.into();
    let transport = IbbTransport {
        block_size: content.transport.block_size,
        sid: content.transport.sid.clone(),
        stanza: Default::default(),
    };
    let built = Content::new(content.creator.clone(), content.name.clone());
    let built = match &content.senders {
        // An unknown `senders` has no wire value of its own to re-emit;
        // leaving the attribute off falls back to the protocol default
        // (`both`), which is the best this core can do with a value it
        // never understood in the first place.
        SendersPolicy::Known(senders) => built.with_senders(senders.clone()),
        SendersPolicy::Unknown => built,
    };
    built
        .with_description(JingleDescription::Unknown(description_elem))
        .with_transport(transport)
}

fn ack(stanzas: &mut impl StanzaSink, id: &str, to: Jid) {
    let iq: Iq = Iq::empty_result(to, id.to_string());
    stanzas.send_stanza(iq.into());
}

fn send_error(stanzas: &mut impl StanzaSink, id: &str, to: Jid, error: StanzaError) {
    let iq = Iq::from_error(id.to_string(), error).with_to(to);
    stanzas.send_stanza(iq.into());
}

fn send_jingle_set(
    stanzas: &mut impl StanzaSink,
    conn: &mut impl ConnectionContext,
    to: Jid,
    jingle: Jingle,
) {
    let id = conn.next_id();
    let iq = Iq::from_set(id, jingle).with_to(to).with_from(conn.local_jid().clone());
    stanzas.send_stanza(iq.into());
}

/// Builds a `reason` child for `session-terminate`, logging and attaching
/// `diagnostic` as an untagged (no `xml:lang`) `text` child when given.
fn reason_element(reason: Reason, diagnostic: Option<&str>) -> ReasonElement {
    let mut texts = BTreeMap::new();
    if let Some(text) = diagnostic {
        log::debug!("session-terminate reason {:?}: {}", reason, text);
        texts.insert(String::new(), text.to_string());
    }
    ReasonElement { reason, texts }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::SilentUi;
    use std::cell::RefCell;
    use std::str::FromStr;

    struct RecordingSink {
        sent: Vec<Element>,
    }

    impl StanzaSink for RecordingSink {
        fn send_stanza(&mut self, stanza: Element) {
            self.sent.push(stanza);
        }
    }

    struct TestConn {
        jid: Jid,
        next: RefCell<u32>,
    }

    impl ConnectionContext for TestConn {
        fn local_jid(&self) -> &Jid {
            &self.jid
        }

        fn next_id(&mut self) -> String {
            let mut n = self.next.borrow_mut();
            *n += 1;
            format!("gen-{}", n)
        }
    }

    fn test_conn() -> TestConn {
        TestConn {
            jid: Jid::from_str("receiver@example.org/res").unwrap(),
            next: RefCell::new(0),
        }
    }

    fn initiate_stanza(sid: &str, content_name: &str) -> Element {
        format!(
            r#"<jingle xmlns='urn:xmpp:jingle:1' action='session-initiate' sid='{sid}'
                    initiator='sender@example.org/res'>
                <content creator='initiator' name='{name}'>
                    <description xmlns='urn:xmpp:jingle:apps:file-transfer:5'>
                        <file>
                            <name>photo.jpg</name>
                            <size>4</size>
                        </file>
                    </description>
                    <transport xmlns='urn:xmpp:jingle:transports:ibb:1' block-size='4096' sid='stream-{sid}'/>
                </content>
            </jingle>"#,
            sid = sid,
            name = content_name,
        )
        .parse()
        .unwrap()
    }

    #[test]
    fn accepts_valid_session_initiate() {
        let mut sm = SessionManager::new(JftConfig::new());
        let mut conn = test_conn();
        let mut sink = RecordingSink { sent: vec![] };
        let mut ui = SilentUi;
        let from = Jid::from_str("sender@example.org/res").unwrap();

        sm.handle_iq_set(
            from,
            "req1".to_string(),
            initiate_stanza("abc", "c1"),
            &mut conn,
            &mut sink,
            &mut ui,
        );

        assert_eq!(sink.sent.len(), 2);
        assert!(sink.sent[0].attr("type") == Some("result"));
        assert!(sink.sent[1].attr("type") == Some("set"));
        assert_eq!(sm.sessions.len(), 1);
    }

    #[test]
    fn rejects_duplicate_sid() {
        let mut sm = SessionManager::new(JftConfig::new());
        let mut conn = test_conn();
        let mut sink = RecordingSink { sent: vec![] };
        let mut ui = SilentUi;
        let from = Jid::from_str("sender@example.org/res").unwrap();

        sm.handle_iq_set(
            from.clone(),
            "req1".to_string(),
            initiate_stanza("dupe", "c1"),
            &mut conn,
            &mut sink,
            &mut ui,
        );
        sink.sent.clear();
        sm.handle_iq_set(
            from,
            "req2".to_string(),
            initiate_stanza("dupe", "c2"),
            &mut conn,
            &mut sink,
            &mut ui,
        );

        // ack + session-terminate, session table untouched by the duplicate
        assert_eq!(sink.sent.len(), 2);
        assert_eq!(sm.sessions.len(), 1);
    }

    #[test]
    fn skips_unsupported_content_keeps_supported_one() {
        let mut sm = SessionManager::new(JftConfig::new());
        let mut conn = test_conn();
        let mut sink = RecordingSink { sent: vec![] };
        let mut ui = SilentUi;
        let from = Jid::from_str("sender@example.org/res").unwrap();

        let elem: Element = r#"<jingle xmlns='urn:xmpp:jingle:1' action='session-initiate' sid='mix'
                initiator='sender@example.org/res'>
            <content creator='initiator' name='bad'>
                <description xmlns='urn:xmpp:jingle:apps:rtp:1' media='audio'/>
                <transport xmlns='urn:xmpp:jingle:transports:ibb:1' block-size='10' sid='s1'/>
            </content>
            <content creator='initiator' name='good'>
                <description xmlns='urn:xmpp:jingle:apps:file-transfer:5'>
                    <file><name>a.txt</name></file>
                </description>
                <transport xmlns='urn:xmpp:jingle:transports:ibb:1' block-size='10' sid='s2'/>
            </content>
        </jingle>"#
            .parse()
            .unwrap();

        sm.handle_iq_set(from, "req1".to_string(), elem, &mut conn, &mut sink, &mut ui);

        let session = sm.sessions.get("mix").unwrap();
        assert_eq!(session.contents.len(), 1);
        assert!(session.contents.contains_key("good"));
    }

    #[test]
    fn rejects_spoofed_initiator() {
        let mut sm = SessionManager::new(JftConfig::new());
        let mut conn = test_conn();
        let mut sink = RecordingSink { sent: vec![] };
        let mut ui = SilentUi;
        let from = Jid::from_str("sender@example.org/res").unwrap();

        let elem: Element = r#"<jingle xmlns='urn:xmpp:jingle:1' action='session-initiate' sid='spoof'
                initiator='someone-else@example.org/res'>
            <content creator='initiator' name='c1'>
                <description xmlns='urn:xmpp:jingle:apps:file-transfer:5'>
                    <file><name>a.txt</name></file>
                </description>
                <transport xmlns='urn:xmpp:jingle:transports:ibb:1' block-size='10' sid='s1'/>
            </content>
        </jingle>"#
            .parse()
            .unwrap();

        sm.handle_iq_set(from, "req1".to_string(), elem, &mut conn, &mut sink, &mut ui);

        assert!(sink.sent.is_empty());
        assert!(sm.sessions.is_empty());
    }

    #[test]
    fn session_accept_reemits_file_date() {
        let mut sm = SessionManager::new(JftConfig::new());
        let mut conn = test_conn();
        let mut sink = RecordingSink { sent: vec![] };
        let mut ui = SilentUi;
        let from = Jid::from_str("sender@example.org/res").unwrap();

        let elem: Element = r#"<jingle xmlns='urn:xmpp:jingle:1' action='session-initiate' sid='dated'
                initiator='sender@example.org/res'>
            <content creator='initiator' name='c0'>
                <description xmlns='urn:xmpp:jingle:apps:file-transfer:5'>
                    <file>
                        <name>a.txt</name>
                        <date>2015-07-26T21:46:00+01:00</date>
                        <size>4</size>
                    </file>
                </description>
                <transport xmlns='urn:xmpp:jingle:transports:ibb:1' block-size='10' sid='s-dated'/>
            </content>
        </jingle>"#
            .parse()
            .unwrap();

        sm.handle_iq_set(from, "req1".to_string(), elem, &mut conn, &mut sink, &mut ui);

        let accept = &sink.sent[1];
        let jingle = accept.children().find(|c| c.name() == "jingle").unwrap();
        let file = jingle
            .children()
            .find(|c| c.name() == "content")
            .and_then(|c| c.children().find(|c| c.name() == "description"))
            .and_then(|d| d.children().find(|c| c.name() == "file"))
            .unwrap();
        let date = file.children().find(|c| c.name() == "date").unwrap().text();
        assert_eq!(date, "2015-07-26T21:46:00+01:00");
    }

    #[test]
    fn session_accept_responder_is_bare_jid() {
        let mut sm = SessionManager::new(JftConfig::new());
        let mut conn = test_conn();
        let mut sink = RecordingSink { sent: vec![] };
        let mut ui = SilentUi;
        let from = Jid::from_str("sender@example.org/res").unwrap();

        sm.handle_iq_set(
            from,
            "req1".to_string(),
            initiate_stanza("bare-responder", "c1"),
            &mut conn,
            &mut sink,
            &mut ui,
        );

        let accept = &sink.sent[1];
        let jingle = accept.children().find(|c| c.name() == "jingle").unwrap();
        assert_eq!(jingle.attr("responder"), Some("receiver@example.org"));
    }

    #[test]
    fn rejects_duplicate_transport_sid_within_same_stanza() {
        let mut sm = SessionManager::new(JftConfig::new());
        let mut conn = test_conn();
        let mut sink = RecordingSink { sent: vec![] };
        let mut ui = SilentUi;
        let from = Jid::from_str("sender@example.org/res").unwrap();

        let elem: Element = r#"<jingle xmlns='urn:xmpp:jingle:1' action='session-initiate' sid='dupe-ts'
                initiator='sender@example.org/res'>
            <content creator='initiator' name='first'>
                <description xmlns='urn:xmpp:jingle:apps:file-transfer:5'>
                    <file><name>a.txt</name></file>
                </description>
                <transport xmlns='urn:xmpp:jingle:transports:ibb:1' block-size='10' sid='shared'/>
            </content>
            <content creator='initiator' name='second'>
                <description xmlns='urn:xmpp:jingle:apps:file-transfer:5'>
                    <file><name>b.txt</name></file>
                </description>
                <transport xmlns='urn:xmpp:jingle:transports:ibb:1' block-size='10' sid='shared'/>
            </content>
        </jingle>"#
            .parse()
            .unwrap();

        sm.handle_iq_set(from, "req1".to_string(), elem, &mut conn, &mut sink, &mut ui);

        let session = sm.sessions.get("dupe-ts").unwrap();
        assert_eq!(session.contents.len(), 1);
        assert!(session.contents.contains_key("first"));
    }

    #[test]
    fn rejects_block_size_above_configured_max() {
        let mut sm = SessionManager::new(JftConfig::new().with_max_block_size(1024));
        let mut conn = test_conn();
        let mut sink = RecordingSink { sent: vec![] };
        let mut ui = SilentUi;
        let from = Jid::from_str("sender@example.org/res").unwrap();

        let elem: Element = r#"<jingle xmlns='urn:xmpp:jingle:1' action='session-initiate' sid='too-big'
                initiator='sender@example.org/res'>
            <content creator='initiator' name='c0'>
                <description xmlns='urn:xmpp:jingle:apps:file-transfer:5'>
                    <file><name>a.txt</name></file>
                </description>
                <transport xmlns='urn:xmpp:jingle:transports:ibb:1' block-size='4096' sid='s1'/>
            </content>
        </jingle>"#
            .parse()
            .unwrap();

        sm.handle_iq_set(from, "req1".to_string(), elem, &mut conn, &mut sink, &mut ui);

        assert!(sm.sessions.is_empty());
        assert!(sink
            .sent
            .iter()
            .any(|s| s.children().any(|c| c.name() == "jingle" && c.attr("action") == Some("session-terminate"))));
    }

    #[test]
    fn terminate_removes_session() {
        let mut sm = SessionManager::new(JftConfig::new());
        let mut conn = test_conn();
        let mut sink = RecordingSink { sent: vec![] };
        let mut ui = SilentUi;
        let from = Jid::from_str("sender@example.org/res").unwrap();

        sm.handle_iq_set(
            from.clone(),
            "req1".to_string(),
            initiate_stanza("term", "c1"),
            &mut conn,
            &mut sink,
            &mut ui,
        );
        assert_eq!(sm.sessions.len(), 1);

        let terminate: Element =
            "<jingle xmlns='urn:xmpp:jingle:1' action='session-terminate' sid='term'><reason><success/></reason></jingle>"
                .parse()
                .unwrap();
        sm.handle_iq_set(from, "req2".to_string(), terminate, &mut conn, &mut sink, &mut ui);

        assert!(sm.sessions.is_empty());
    }
}
