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

use std::thread;
use std::time::Duration;

use log::info;

use super::main::WatchSubcommand;
use crate::context::Context;
use crate::index::state::{Controller, Tick};
use crate::mailbox::account::Accounts;
use crate::mailbox::backend::{MxStatus, OpenFlags};
use crate::mailbox::Counts;
use crate::support::error::Error;
use crate::support::interrupt;

pub(super) fn watch(
    ctx: &mut Context,
    accounts: &mut Accounts,
    cmd: WatchSubcommand,
) -> Result<(), Error> {
    let mut controller = Controller::new();
    controller.open(ctx, accounts, &cmd.mailbox, OpenFlags::empty())?;
    println!("{}", describe_counts(controller.last_counts()));

    let interval = cmd.interval.max(1);
    'ticks: loop {
        // One second at a time so that SIGINT is noticed promptly
        for _ in 0..interval {
            if interrupt::is_raised() {
                break 'ticks;
            }
            thread::sleep(Duration::from_secs(1));
        }

        let report = controller.tick(ctx, accounts)?;
        if let Some(line) = describe_tick(&report, controller.last_counts()) {
            println!("{}", line);
        }
        if report.closed {
            return Err(Error::BackendFatal(
                report.message.unwrap_or_default(),
            ));
        }
    }

    info!("Interrupted; closing {}", cmd.mailbox);
    controller.quit(ctx, accounts)
}

fn describe_counts(counts: Counts) -> String {
    format!(
        "{} messages, {} new, {} unread, {} flagged",
        counts.total, counts.new, counts.unread, counts.flagged
    )
}

/// What to tell the user about one tick, if anything.
fn describe_tick(report: &Tick, counts: Counts) -> Option<String> {
    let what = match report.status {
        _ if report.closed => "Mailbox closed",
        Some(MxStatus::NewMail) => "New mail",
        Some(MxStatus::Reopened) => "Mailbox reopened",
        Some(MxStatus::FlagsChanged) => "Flags changed",
        _ => {
            return report.message.as_ref().map(|m| format!("Warning: {}", m))
        }
    };

    Some(match report.message {
        Some(ref message) => format!("{}: {}", what, message),
        None => format!("{}: {}", what, describe_counts(counts)),
    })
}
