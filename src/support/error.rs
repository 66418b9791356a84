//-
// Copyright (c) 2020, Jason Lingle
//
// This file is part of Mailview.
//
// Mailview is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Mailview is distributed  in the hope that  it will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Mailview. If not, see <http://www.gnu.org/licenses/>.

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid value: {0}")]
    InvalidValue(String),
    #[error("Operation not permitted by ACL")]
    AclDenied,
    #[error("Mailbox is locked")]
    Locked,
    #[error("Mailbox was reopened")]
    Reopened,
    #[error("Mailbox is unusable: {0}")]
    BackendFatal(String),
    #[error("Interrupted")]
    Interrupted,
    #[error("Operation not supported by this mailbox type")]
    Unsupported,
    #[error("{0}")]
    Precondition(&'static str),
    #[error(transparent)]
    Window(#[from] crate::tagdb::window::WindowError),
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Cbor(#[from] serde_cbor::error::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    Regex(#[from] regex::Error),
}

impl Error {
    /// Whether the upper layer should simply try again on the next tick.
    pub fn is_transient(&self) -> bool {
        matches!(*self, Error::Locked | Error::Reopened)
    }

    /// Whether the error means the mailbox can no longer be used and must
    /// be closed.
    pub fn is_fatal(&self) -> bool {
        match *self {
            Error::BackendFatal(..) => true,
            Error::Io(ref e) => io::ErrorKind::NotFound == e.kind(),
            _ => false,
        }
    }
}
