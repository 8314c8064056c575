// Copyright (c) 2023 xmpp-rs contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error conditions the peer is allowed to see, plus local I/O failure.
//!
//! Parse/validation errors that are silently discarded (category 1 of the
//! spec's error taxonomy) are not represented here: they are logged and the
//! offending unit is dropped at the call site instead of being threaded
//! through a `Result`.

use std::fmt;
use std::io;

use xmpp_parsers::stanza_error::{DefinedCondition, ErrorType, StanzaError};

/// A protocol error the peer must be told about, or a local I/O failure
/// that tears down a byte-stream session.
#[derive(Debug)]
pub enum JftError {
    /// An `open` arrived for a `sid` that already has an active session.
    AlreadyOpen,

    /// No negotiated content matches the given transport `sid`, or its
    /// transport isn't in-band-bytestream.
    NoSuchTransport,

    /// The `block-size` on `open` doesn't match what was negotiated.
    BlockSizeMismatch,

    /// An IBB `data` or `close` referenced a `sid` with no active session.
    NoSuchSession,

    /// The `data` payload wasn't valid base64.
    Invalid(String),

    /// Opening or writing the destination file failed.
    Io(io::Error),
}

impl fmt::Display for JftError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JftError::AlreadyOpen => write!(f, "a byte-stream session is already open for this sid"),
            JftError::NoSuchTransport => write!(f, "no negotiated in-band-bytestream transport for this sid"),
            JftError::BlockSizeMismatch => write!(f, "block-size does not match the negotiated value"),
            JftError::NoSuchSession => write!(f, "no active byte-stream session for this sid"),
            JftError::Invalid(reason) => write!(f, "invalid data frame: {}", reason),
            JftError::Io(e) => write!(f, "local I/O error: {}", e),
        }
    }
}

impl std::error::Error for JftError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            JftError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for JftError {
    fn from(e: io::Error) -> Self {
        JftError::Io(e)
    }
}

impl JftError {
    /// Build the `{type, condition}` stanza error the peer is shown for
    /// this error, per §7 category 2. Returns `None` for errors that are
    /// never turned into a stanza error (local I/O failures instead cause
    /// an IBB `close` to be sent, see `ibb_transport`).
    pub fn to_stanza_error(&self) -> Option<StanzaError> {
        let (type_, condition) = match self {
            JftError::AlreadyOpen => (ErrorType::Cancel, DefinedCondition::NotAcceptable),
            JftError::NoSuchTransport => (ErrorType::Cancel, DefinedCondition::NotAcceptable),
            JftError::BlockSizeMismatch => (ErrorType::Modify, DefinedCondition::ResourceConstraint),
            JftError::NoSuchSession => (ErrorType::Cancel, DefinedCondition::ItemNotFound),
            JftError::Invalid(_) => (ErrorType::Cancel, DefinedCondition::BadRequest),
            JftError::Io(_) => return None,
        };
        Some(StanzaError::new(type_, condition, "en", self.to_string()))
    }
}
