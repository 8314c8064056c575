// Copyright (c) 2023 xmpp-rs contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Traits for everything this crate deliberately does not own: sending
//! stanzas, knowing the local JID, telling the user something, and
//! deciding where a received file lands on disk.
//!
//! None of these are implemented here except [`Ui`]'s no-op default and
//! [`Downloads`]'s platform-default implementation in
//! [`crate::downloads::DefaultDownloads`]. An embedder supplies the rest:
//! a real [`StanzaSink`] talks to whatever holds the actual connection
//! (a `tokio_xmpp::Client`, in the style of this crate's own
//! `Agent::client`, but that client itself is out of scope here).

use std::path::{Path, PathBuf};

use jid::Jid;
use minidom::Element;

/// Sends stanzas to the peer. The only channel the Session Manager and
/// IBB Transport have to the network; everything else about the
/// connection (TLS, stream negotiation, reconnection) is the embedder's
/// problem.
pub trait StanzaSink {
    /// Hands a complete stanza (an `<iq/>`, `<message/>`, or `<presence/>`
    /// element) to the connection for sending. Errors are the embedder's
    /// to log; this crate doesn't retry sends.
    fn send_stanza(&mut self, stanza: Element);
}

/// What the Session Manager needs to know about the connection besides
/// "send a stanza": the local full JID, and a source of stanza ids that
/// won't collide with ones already in flight.
pub trait ConnectionContext {
    /// The full JID this session is bound to, used to address outgoing
    /// stanzas (the `from` of every `iq` this crate sends). The Session
    /// Manager reduces this to its bare form before using it as the
    /// `responder` in `session-accept`, per XEP-0166.
    fn local_jid(&self) -> &Jid;

    /// A stanza id not currently in use, for outgoing `iq`s this crate
    /// originates (`session-accept`, `session-terminate` acknowledgements
    /// sent as `iq` results are addressed using the incoming id instead,
    /// per §4.1, and don't call this).
    fn next_id(&mut self) -> String;
}

/// User-facing notifications. All methods have a no-op default so an
/// embedder that only cares about some of them doesn't have to stub the
/// rest.
pub trait Ui {
    /// A file transfer completed successfully and was written to `path`.
    fn notify_transfer_complete(&mut self, _from: &Jid, _path: &Path) {}

    /// A file transfer was rejected, cancelled, or failed.
    fn notify_transfer_failed(&mut self, _from: &Jid, _reason: &str) {}

    /// Something worth surfacing that isn't a transfer outcome (an
    /// unsupported description type was rejected, for instance).
    fn notify_info(&mut self, _message: &str) {}
}

/// A [`Ui`] that discards every notification. Useful for tests and for
/// embedders that only want the transfer side effects, not a UI.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentUi;

impl Ui for SilentUi {}

/// Decides where on disk a received file goes, and makes sure nothing
/// already there gets overwritten.
pub trait Downloads {
    /// Returns a path under the downloads directory, derived from
    /// `suggested_name`, guaranteed not to already exist at the time of
    /// the call. `suggested_name` is the peer-supplied file name verbatim;
    /// no path component from it is honoured, so an implementor must strip
    /// directories itself before using it as a bare name (the default
    /// [`crate::downloads::DefaultDownloads`] does this via `Path::file_name`).
    fn resolve_path(&self, suggested_name: &str) -> std::io::Result<PathBuf>;
}
