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

//! Constants from `sysexits.h`, and the mapping from crate errors onto them
//! used by the command-line front-end.

use crate::support::error::Error;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Sysexit(pub i32);

pub const EX_USAGE: Sysexit = Sysexit(64);
pub const EX_DATAERR: Sysexit = Sysexit(65);
pub const EX_NOINPUT: Sysexit = Sysexit(66);
pub const EX_UNAVAILABLE: Sysexit = Sysexit(69);
pub const EX_SOFTWARE: Sysexit = Sysexit(70);
pub const EX_IOERR: Sysexit = Sysexit(74);
pub const EX_TEMPFAIL: Sysexit = Sysexit(75);
pub const EX_NOPERM: Sysexit = Sysexit(77);
pub const EX_CONFIG: Sysexit = Sysexit(78);

impl Sysexit {
    pub fn exit(self) -> ! {
        std::process::exit(self.0)
    }
}

impl<'a> From<&'a Error> for Sysexit {
    fn from(e: &'a Error) -> Self {
        match *e {
            Error::NotFound(..) => EX_NOINPUT,
            Error::InvalidValue(..)
            | Error::Window(..)
            | Error::Regex(..)
            | Error::Precondition(..) => EX_DATAERR,
            Error::Config(..) | Error::Toml(..) => EX_CONFIG,
            Error::AclDenied => EX_NOPERM,
            Error::Locked | Error::Reopened | Error::Interrupted => {
                EX_TEMPFAIL
            }
            Error::BackendFatal(..) | Error::Unsupported => EX_UNAVAILABLE,
            Error::Io(..) | Error::Cbor(..) => EX_IOERR,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn error_mapping() {
        assert_eq!(EX_NOPERM, Sysexit::from(&Error::AclDenied));
        assert_eq!(EX_TEMPFAIL, Sysexit::from(&Error::Locked));
        assert_eq!(
            EX_NOINPUT,
            Sysexit::from(&Error::NotFound("x".to_owned()))
        );
    }
}
