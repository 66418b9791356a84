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

use std::io::{self, Write};

use chrono::NaiveDateTime;

use super::main::ListSubcommand;
use crate::config::mbtable::MbTable;
use crate::context::Context;
use crate::email::Email;
use crate::index::MailboxView;
use crate::mailbox::account::Accounts;
use crate::mailbox::backend::OpenFlags;
use crate::mailbox::mx::Mx;
use crate::support::error::Error;

pub(super) fn list(
    ctx: &mut Context,
    accounts: &mut Accounts,
    cmd: ListSubcommand,
) -> Result<(), Error> {
    let mx = Mx::open(ctx, accounts, &cmd.mailbox, OpenFlags::READONLY)?;
    let mut view = MailboxView::new(ctx, mx)?;

    if let Some(ref text) = cmd.limit {
        let limit = view.compile(ctx, text)?;
        view.set_limit(Some(limit))?;
    }
    if cmd.collapse {
        view.collapsed = true;
        view.threads.collapse_all(&mut view.mx.mailbox, true);
    }

    let flag_chars = ctx.config.get_mbtable(view.scope(), "flag_chars")?;
    {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        for vnum in 0..view.mailbox().vcount() {
            if let Some(e) = view.email_at(vnum) {
                writeln!(out, "{}", format_line(e, flag_chars.as_ref()))?;
            }
        }
        let counts = view.mailbox().counts;
        writeln!(
            out,
            "-- {} shown, {} messages, {} new, {} unread, {} flagged",
            view.mailbox().vcount(),
            counts.total,
            counts.new,
            counts.unread,
            counts.flagged
        )?;
    }

    view.close(ctx, accounts)
}

/// One index line: number, status, date, sender and the subject behind the
/// thread tree. Collapsed threads show how many messages they hide.
fn format_line(e: &Email, flag_chars: Option<&MbTable>) -> String {
    let status = flag_chars.map_or(" ", |t| t.nth_wchar(e.status_char()));
    let date = NaiveDateTime::from_timestamp_opt(e.date_sent(), 0)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "----------".to_owned());
    let from = e
        .env
        .from
        .as_ref()
        .and_then(|f| f.first())
        .map_or("", |a| a.personal_or_mailbox());
    let subject = if e.display_subject || e.tree.is_empty() {
        e.env.subject.as_deref().unwrap_or("")
    } else {
        ""
    };
    let hidden = if e.collapsed && e.num_hidden > 0 {
        format!(" ({})", e.num_hidden + 1)
    } else {
        String::new()
    };

    format!(
        "{:>5} {} {} {:<20.20} {}{}{}",
        e.index + 1,
        status,
        date,
        from,
        e.tree,
        subject,
        hidden
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::address::AddressList;

    #[test]
    fn line_layout() {
        let mut e = Email::new("a@b".to_owned(), "cur/1:2,".to_owned());
        e.index = 6;
        e.env.from = AddressList::parse("Jo Bloggs <jo@example.com>");
        e.env.subject = Some("hello".to_owned());
        e.display_subject = true;
        let chars = MbTable::parse("*!DdrONon- ");

        let line = format_line(&e, Some(&chars));
        assert!(line.starts_with("    7 N "), "{}", line);
        assert!(line.contains("Jo Bloggs"), "{}", line);
        assert!(line.ends_with(" hello"), "{}", line);

        e.tree = "`->".to_owned();
        e.display_subject = false;
        e.read = true;
        let line = format_line(&e, Some(&chars));
        assert!(line.ends_with("`->"), "{}", line);
        assert_eq!(Some(' '), line.chars().nth(6));

        e.collapsed = true;
        e.num_hidden = 2;
        assert!(format_line(&e, None).ends_with("`-> (3)"));
    }
}
