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

use std::env;
use std::path::{Path, PathBuf};

use log::warn;
use structopt::clap;
use structopt::StructOpt;

use crate::context::Context;
use crate::mailbox::account::Accounts;
use crate::support::error::Error;
use crate::support::interrupt;
use crate::support::sysexits::*;
use crate::support::system_config::StartupConfig;

#[derive(StructOpt)]
#[structopt(max_term_width = 80)]
struct Options {
    /// The directory containing `mailview.toml` and `logging.toml`
    /// [default: $XDG_CONFIG_HOME/mailview or ~/.config/mailview]
    #[structopt(long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// Log debugging information when logging to the terminal.
    #[structopt(short, long)]
    verbose: bool,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt)]
enum Command {
    Index(IndexSubcommand),
    List(ListSubcommand),
    Tag(TagSubcommand),
    Watch(WatchSubcommand),
}

/// Build or refresh the tag database of a maildir tree.
///
/// Every maildir below the root is scanned. Messages already known keep
/// their tags; new ones are tagged `unread` and `inbox`. The database is
/// kept in `.mailview/` under the root.
#[derive(StructOpt)]
pub(super) struct IndexSubcommand {
    /// The top of the maildir tree.
    #[structopt(parse(from_os_str))]
    pub(super) root: PathBuf,
}

/// Print the index of a mailbox.
///
/// The mailbox is either the path of a maildir or a `tagdb://` URL such
/// as `tagdb:///home/jo/mail?query=tag:inbox`. Messages are sorted and
/// threaded according to `sort`, `sort_aux` and `use_threads`.
#[derive(StructOpt)]
pub(super) struct ListSubcommand {
    pub(super) mailbox: String,

    /// Only show messages matching this pattern, e.g. '~N | ~F'.
    #[structopt(short, long)]
    pub(super) limit: Option<String>,

    /// Collapse every thread.
    #[structopt(short, long)]
    pub(super) collapse: bool,
}

/// Change the tags of one message in a tag database.
///
/// EDIT is a space-separated list of `+tag` to add, `-tag` to remove, or
/// `!` followed by a list of tags replacing all of them.
#[derive(StructOpt)]
pub(super) struct TagSubcommand {
    /// A `tagdb://` URL naming the database.
    pub(super) url: String,
    /// The Message-ID, with or without angle brackets.
    pub(super) message_id: String,
    pub(super) edit: String,
}

/// Watch a mailbox, reporting new mail and outside changes until
/// interrupted.
#[derive(StructOpt)]
pub(super) struct WatchSubcommand {
    pub(super) mailbox: String,

    /// Seconds between checks.
    #[structopt(short, long, default_value = "5")]
    pub(super) interval: u64,
}

pub fn main() {
    // Clap exits with status 1 instead of EX_USAGE if we use the more concise
    // API
    let options =
        Options::from_clap(&match Options::clap().get_matches_safe() {
            Ok(matches) => matches,
            Err(
                e @ clap::Error {
                    kind: clap::ErrorKind::HelpDisplayed,
                    ..
                },
            )
            | Err(
                e @ clap::Error {
                    kind: clap::ErrorKind::VersionDisplayed,
                    ..
                },
            ) => {
                println!("{}", e.message);
                return;
            }
            Err(e) => {
                eprintln!("{}", e.message);
                EX_USAGE.exit()
            }
        });

    let config_dir = options.config.unwrap_or_else(default_config_dir);
    init_log(&config_dir, options.verbose);

    let mut ctx = match Context::new() {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Unable to set up configuration: {}", e);
            EX_SOFTWARE.exit()
        }
    };
    apply_startup_config(&mut ctx, &config_dir.join("mailview.toml"));

    if let Err(e) = interrupt::install_handler() {
        warn!("Unable to handle SIGINT: {}", e);
    }

    let mut accounts = Accounts::new(ctx.config.notify_node(ctx.root()));
    let result = match options.command {
        Command::Index(cmd) => super::tag::index(&ctx, cmd),
        Command::List(cmd) => super::list::list(&mut ctx, &mut accounts, cmd),
        Command::Tag(cmd) => super::tag::tag(&mut ctx, &mut accounts, cmd),
        Command::Watch(cmd) => {
            super::watch::watch(&mut ctx, &mut accounts, cmd)
        }
    };

    if let Err(e) = result {
        eprintln!("{}", e);
        Sysexit::from(&e).exit();
    }
}

fn default_config_dir() -> PathBuf {
    env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| {
            env::var_os("HOME").map(|home| PathBuf::from(home).join(".config"))
        })
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailview")
}

/// Apply `mailview.toml` if there is one. Start-up is declared complete
/// either way.
fn apply_startup_config(ctx: &mut Context, path: &Path) {
    let startup = if path.is_file() {
        match StartupConfig::load(path) {
            Ok(startup) => startup,
            Err(Error::Toml(e)) => {
                eprintln!("Error in config file at '{}': {}", path.display(), e);
                EX_CONFIG.exit()
            }
            Err(e) => {
                eprintln!("Error reading '{}': {}", path.display(), e);
                EX_CONFIG.exit()
            }
        }
    } else {
        StartupConfig::default()
    };

    for failure in startup.apply(&mut ctx.config, &mut ctx.bus) {
        warn!("{}: {}", path.display(), failure);
    }
}

fn init_log(config_dir: &Path, verbose: bool) {
    if Ok(true) == nix::unistd::isatty(2) {
        // Running interactively; ignore logging configuration and just write
        // to stderr.
        let level = if verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        };
        crate::init_simple_log(level);
        return;
    }

    // log4rs *or* syslog, since there is no log4rs appender for syslog.
    let log_config_file = config_dir.join("logging.toml");
    if log_config_file.is_file() {
        log4rs::init_file(log_config_file, log4rs::file::Deserializers::new())
            .expect("Failed to initialise logging");
    } else {
        let formatter = syslog::Formatter3164 {
            facility: syslog::Facility::LOG_MAIL,
            hostname: None,
            process: env!("CARGO_PKG_NAME").to_owned(),
            pid: nix::unistd::getpid().as_raw(),
        };

        let logger =
            syslog::unix(formatter).expect("Failed to connect to syslog");
        log::set_boxed_logger(Box::new(syslog::BasicLogger::new(logger)))
            .map(|_| log::set_max_level(log::LevelFilter::Info))
            .expect("Failed to initialise logging");
    }
}
