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

use bitflags::bitflags;

use crate::support::error::Error;

bitflags! {
    /// Operations permitted on a mailbox (RFC 4314 rights).
    pub struct AclRights: u16 {
        const LOOKUP = 1 << 0;
        const READ = 1 << 1;
        /// Change the read/old flags.
        const SEEN = 1 << 2;
        /// Change other flags and keywords.
        const WRITE = 1 << 3;
        const INSERT = 1 << 4;
        const POST = 1 << 5;
        const CREATE = 1 << 6;
        const DELMX = 1 << 7;
        /// Mark messages deleted.
        const DELETE = 1 << 8;
        /// Remove deleted messages.
        const EXPUNGE = 1 << 9;
        const ADMIN = 1 << 10;
    }
}

impl AclRights {
    /// Rights of a mailbox that may only be viewed.
    pub fn read_only() -> Self {
        AclRights::LOOKUP | AclRights::READ
    }
}

/// Fail with `AclDenied` unless every right in `needed` is present.
pub fn check_acl(
    rights: AclRights,
    needed: AclRights,
    action: &str,
) -> Result<(), Error> {
    if rights.contains(needed) {
        Ok(())
    } else {
        log::info!(
            "{} refused; missing rights {:?}",
            action,
            needed - rights
        );
        Err(Error::AclDenied)
    }
}
