// Copyright (c) 2023 xmpp-rs contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

#![deny(bare_trait_objects)]

//! Receiver-side core for Jingle (XEP-0166) file transfer (XEP-0234) over
//! In-Band Bytestreams (XEP-0047), with XEP-0353 (Jingle Message
//! Initiation) pre-negotiation.
//!
//! This crate owns the session-negotiation and byte-stream state machines
//! only. It has no opinion on how stanzas reach it, how a UI is built, or
//! how a connection is authenticated: those are supplied by the embedder
//! through the [`collaborators`] traits. [`session_manager::SessionManager`]
//! and [`ibb_transport::IbbTransport`] are the two entry points; an
//! embedder's IQ router hands each incoming `<iq type='set'/>` to whichever
//! of the two recognises its payload namespace, and forwards Jingle Message
//! Initiation elements found in `<message/>` stanzas to
//! [`session_manager::SessionManager::handle_jingle_message`].

pub use jid;
pub use minidom;
pub use xmpp_parsers as parsers;

pub mod collaborators;
pub mod config;
pub mod downloads;
pub mod error;
pub mod ibb_transport;
pub mod model;
pub mod session_manager;

pub use collaborators::{ConnectionContext, Downloads, SilentUi, StanzaSink, Ui};
pub use config::JftConfig;
pub use downloads::DefaultDownloads;
pub use error::JftError;
pub use ibb_transport::IbbTransport;
pub use session_manager::SessionManager;
