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

use super::main::{IndexSubcommand, TagSubcommand};
use crate::context::Context;
use crate::mailbox::account::Accounts;
use crate::mailbox::backend::OpenFlags;
use crate::mailbox::mx::Mx;
use crate::support::error::Error;
use crate::tagdb;
use crate::tagdb::tags::QueryType;

pub(super) fn index(ctx: &Context, cmd: IndexSubcommand) -> Result<(), Error> {
    let stats = tagdb::index_tree(&ctx.config, ctx.root(), &cmd.root)?;
    println!(
        "{} added, {} duplicates, {} renamed, {} removed",
        stats.added, stats.duplicates, stats.renamed, stats.removed
    );
    Ok(())
}

pub(super) fn tag(
    ctx: &mut Context,
    accounts: &mut Accounts,
    cmd: TagSubcommand,
) -> Result<(), Error> {
    let id = cmd.message_id.trim().trim_start_matches('<').trim_end_matches('>');
    let url = tagdb::url_from_query(
        &cmd.url,
        &format!("id:{}", id),
        QueryType::Messages,
        0,
    )?;

    let mut mx = Mx::open(ctx, accounts, &url, OpenFlags::QUIET)?;
    let result = apply_edit(ctx, &mut mx, id, &cmd.edit);
    mx.close(ctx, accounts)?;
    let tags = result?;
    println!("{}: {}", id, tags);
    Ok(())
}

/// Apply `edit` to message `id` of `mx`, returning its new tags.
fn apply_edit(
    ctx: &mut Context,
    mx: &mut Mx,
    id: &str,
    edit: &str,
) -> Result<String, Error> {
    let index = mx
        .mailbox
        .by_id(id)
        .ok_or_else(|| Error::NotFound(format!("message {}", id)))?;
    let edit = mx.tags_edit(edit)?;
    mx.tags_commit(ctx, index, &edit)?;
    Ok(mx.mailbox.emails[index].tags.to_string())
}
