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

//! The tag database backend.
//!
//! A mailbox here is a saved search over the tag database of a maildir
//! tree, written as a URL:
//!
//! ```text
//! tagdb:///home/jo/mail?type=threads&limit=50&query=tag%3Ainbox
//! ```
//!
//! `type` selects whether only the matching messages (`messages`) or the
//! whole threads containing a match (`threads`) are shown; `limit` caps the
//! number of messages (for threads, the cap is checked before each thread
//! is added). Both default to `nm_query_type` and `nm_db_limit`. The
//! optional `folder` parameter names the maildir, relative to the root,
//! that new messages are delivered to.
//!
//! The message files themselves stay ordinary maildir files, so flags are
//! still written by renaming; the database is told about each new name.
//! Paths of messages in a mailbox of this type are relative to the
//! database root.
//!
//! All mailboxes on one root share an account, and through it a single
//! `DbHandle`.

pub mod query;
pub mod store;
pub mod tags;
pub mod window;

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::SystemTime;

use chrono::prelude::*;
use log::{debug, info, warn};

use self::store::{Database, DbGuard, DbHandle, StoredMessage};
use self::tags::{QueryType, TagNames};
use self::window::Window;
use crate::config::{
    Config, ConfigDef, ConfigError, ConfigSet, ItemFlags, Kind, ScopeId,
    Validation, Value,
};
use crate::email::tags::parse_tag_edit;
use crate::email::Email;
use crate::mailbox::account::Account;
use crate::mailbox::backend::{
    canon_local, Message, MxOps, MxStatus, NewMessage,
};
use crate::mailbox::url::MailboxUrl;
use crate::mailbox::{Counts, Mailbox, MailboxType};
use crate::maildir::filename::{self, MaildirFlags};
use crate::maildir::scan::{self, Entry};
use crate::maildir::{self, SyncOutcome};
use crate::notify::EmailChange;
use crate::support::error::Error;
use crate::support::file_ops::IgnoreKinds;
use crate::support::interrupt;
use crate::support::log_prefix::LogPrefix;
use crate::support::progress::Progress;

pub const SCHEME: &str = "tagdb";

/// Whether `path` is a tag database URL.
pub fn probe(path: &str) -> bool {
    path.get(..SCHEME.len() + 3)
        .map_or(false, |p| p.eq_ignore_ascii_case("tagdb://"))
}

pub fn register(set: &mut ConfigSet) -> Result<(), ConfigError> {
    let comma = ItemFlags::SLIST_SEP_COMMA;
    set.register_all(vec![
        ConfigDef::new("nm_default_url", Kind::String, ""),
        ConfigDef::new("nm_exclude_tags", Kind::Slist, "").flags(comma),
        ConfigDef::new("nm_record_tags", Kind::Slist, "").flags(comma),
        ConfigDef::new("nm_unread_tag", Kind::String, "unread"),
        ConfigDef::new("nm_replied_tag", Kind::String, "replied"),
        ConfigDef::new("nm_flagged_tag", Kind::String, "flagged"),
        ConfigDef::new("nm_db_limit", Kind::Number, "0")
            .flags(ItemFlags::NOT_NEGATIVE),
        ConfigDef::new("nm_query_type", Kind::String, "messages")
            .validator(validate_query_type),
        ConfigDef::new("nm_query_window_enable", Kind::Bool, "no"),
        ConfigDef::new("nm_query_window_duration", Kind::Number, "0")
            .flags(ItemFlags::NOT_NEGATIVE),
        ConfigDef::new("nm_query_window_timebase", Kind::String, "week"),
        ConfigDef::new("nm_query_window_current_position", Kind::Number, "0"),
        ConfigDef::new("nm_query_window_current_search", Kind::String, ""),
        ConfigDef::new("nm_query_window_or_terms", Kind::String, ""),
    ])
}

fn validate_query_type(def: &ConfigDef, value: &Value) -> Validation {
    match *value {
        Value::Str(Some(ref s)) if QueryType::parse(s).is_none() => {
            Validation::Reject(format!(
                "{} must be 'messages' or 'threads'",
                def.name
            ))
        }
        _ => Validation::Accept,
    }
}

/// Turn a query typed by the user into a mailbox URL on the database of
/// `base`.
///
/// A `type=` word in the query selects the query type, otherwise
/// `default_type` applies. The limit of `base` is carried over only if it
/// differs from the configured `db_limit`.
pub fn url_from_query(
    base: &str,
    query: &str,
    default_type: QueryType,
    db_limit: usize,
) -> Result<String, Error> {
    let base_url = parse_scheme(base)?;
    let limit = match base_url.get("limit") {
        Some(l) => parse_limit(l)?,
        None => db_limit,
    };
    let (kind, query) = tags::extract_type(query);

    let mut url = MailboxUrl::new(SCHEME, &base_url.path);
    url.set("type", &kind.unwrap_or(default_type).to_string());
    if limit != db_limit {
        url.set("limit", &limit.to_string());
    }
    url.set("query", &query);
    debug!("URL from query: {}", url);
    Ok(url.to_string())
}

/// Add the file `rel` holding `email` to `db`.
///
/// A new message gets the tags of `email`, the tags standing for `flags`
/// and `extra`; a further copy of a known message keeps the tags it has.
/// Returns the message's tags.
pub fn record_message(
    db: &mut Database,
    rel: &str,
    email: &Email,
    flags: &MaildirFlags,
    names: &TagNames,
    extra: &[String],
) -> BTreeSet<String> {
    let mut tags = email
        .tags
        .iter()
        .map(str::to_owned)
        .collect::<BTreeSet<_>>();
    names.sync_from_flags(flags, &mut tags);
    tags.extend(extra.iter().cloned());

    if db.add(StoredMessage::from_email(email, rel.to_owned(), tags)) {
        db.rethread();
    } else {
        debug!("{} is another copy of {}", rel, email.id);
    }
    db.get(&email.id)
        .map(|m| m.tags.clone())
        .unwrap_or_default()
}

/// Bring the database under `root` in line with the maildirs there,
/// creating it if needed.
pub fn index_tree(
    config: &Config,
    scope: ScopeId,
    root: &Path,
) -> Result<store::IndexStats, Error> {
    let settings = Settings::from_config(config, scope)?;
    let opts = store::IndexOptions {
        delim: settings.delim,
        names: settings.names,
        ..store::IndexOptions::default()
    };

    if !Database::exists(root) {
        Database::new().save(root)?;
    }
    let handle = DbHandle::new(root);
    let mut db = handle.open()?;
    let stats = db.index(root, &opts)?;
    db.release()?;
    info!(
        "{}: {} added, {} duplicates, {} renamed, {} removed",
        root.display(),
        stats.added,
        stats.duplicates,
        stats.renamed,
        stats.removed
    );
    Ok(stats)
}

fn parse_scheme(path: &str) -> Result<MailboxUrl, Error> {
    let url = MailboxUrl::parse(path)
        .filter(|u| SCHEME == u.scheme)
        .ok_or_else(|| {
            Error::InvalidValue(format!("{} is not a tagdb URL", path))
        })?;
    if url.path.is_empty() {
        return Err(Error::InvalidValue(format!(
            "{} does not name a database",
            path
        )));
    }
    Ok(url)
}

fn parse_limit(s: &str) -> Result<usize, Error> {
    s.parse::<usize>()
        .map_err(|_| Error::InvalidValue(format!("Invalid limit: {}", s)))
}

fn root_of(path: &str) -> Option<PathBuf> {
    parse_scheme(path).ok().map(|u| PathBuf::from(u.path))
}

/// The backend's copy of the variables it uses.
#[derive(Clone, Debug)]
struct Settings {
    delim: char,
    trash: bool,
    mark_old: bool,
    names: TagNames,
    excludes: Vec<String>,
    record_tags: Vec<String>,
    query_type: QueryType,
    db_limit: usize,
    window: Window,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            delim: ':',
            trash: false,
            mark_old: true,
            names: TagNames::default(),
            excludes: Vec::new(),
            record_tags: Vec::new(),
            query_type: QueryType::Messages,
            db_limit: 0,
            window: Window::default(),
        }
    }
}

impl Settings {
    fn from_config(config: &Config, scope: ScopeId) -> Result<Self, ConfigError> {
        let list = |name: &str| -> Result<Vec<String>, ConfigError> {
            Ok(config
                .get_slist(scope, name)?
                .iter()
                .map(str::to_owned)
                .collect())
        };

        let query_type = config
            .get_str(scope, "nm_query_type")?
            .and_then(|s| QueryType::parse(&s))
            .unwrap_or(QueryType::Messages);

        Ok(Settings {
            delim: config
                .get_str(scope, "maildir_field_delimiter")?
                .and_then(|s| s.chars().next())
                .unwrap_or(':'),
            trash: config.get_bool(scope, "maildir_trash")?,
            mark_old: config.get_bool(scope, "mark_old")?,
            names: TagNames::from_config(config, scope)?,
            excludes: list("nm_exclude_tags")?,
            record_tags: list("nm_record_tags")?,
            query_type,
            db_limit: config.get_number(scope, "nm_db_limit")?.max(0) as usize,
            window: Window::from_config(config, scope)?,
        })
    }
}

/// What a mailbox URL asks for.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Params {
    root: PathBuf,
    query: String,
    kind: QueryType,
    limit: usize,
    folder: String,
}

impl Params {
    fn parse(path: &str, settings: &Settings) -> Result<Self, Error> {
        let url = parse_scheme(path)?;
        let query = url
            .get("query")
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| {
                Error::InvalidValue(format!("{} has no query", path))
            })?;
        let kind = match url.get("type") {
            Some(t) => QueryType::parse(t).ok_or_else(|| {
                Error::InvalidValue(format!("Unknown query type: {}", t))
            })?,
            None => settings.query_type,
        };
        let limit = match url.get("limit") {
            Some(l) => parse_limit(l)?,
            None => settings.db_limit,
        };

        Ok(Params {
            root: PathBuf::from(&url.path),
            query: query.to_owned(),
            kind,
            limit,
            folder: url.get("folder").unwrap_or("").trim_matches('/').to_owned(),
        })
    }

    fn delivery_dir(&self) -> PathBuf {
        self.root.join(&self.folder)
    }
}

#[derive(Debug, Default)]
pub struct TagDbOps {
    settings: Settings,
    db: Option<Rc<DbHandle>>,
    stats_mtime: Option<SystemTime>,
}

impl TagDbOps {
    pub fn new() -> Self {
        TagDbOps::default()
    }

    fn handle(&self) -> Result<Rc<DbHandle>, Error> {
        self.db
            .clone()
            .ok_or(Error::Precondition("Mailbox has no tag database"))
    }

    /// Run the query of `params`, already rewritten to `query`.
    fn run_query<'a>(
        &self,
        db: &'a Database,
        params: &Params,
        query: &str,
    ) -> Result<Vec<&'a StoredMessage>, Error> {
        let parsed = query::parse(query)?;
        let now = Utc::now();
        let excludes = &self.settings.excludes;

        let mut found = Vec::new();
        match params.kind {
            QueryType::Messages => {
                found = db.search(&parsed, excludes, now);
                if params.limit > 0 {
                    found.truncate(params.limit);
                }
            }
            QueryType::Threads => {
                for thread in db.search_threads(&parsed, excludes, now) {
                    if params.limit > 0 && found.len() >= params.limit {
                        break;
                    }
                    found.extend(db.thread_messages(thread));
                }
            }
        }
        Ok(found)
    }

    /// Read the first readable file of `stored`, looking for it under its
    /// unique name if it has been renamed since the database last saw it.
    fn load_stored(
        &self,
        root: &Path,
        stored: &StoredMessage,
    ) -> Result<Option<Email>, Error> {
        let delim = self.settings.delim;
        for file in stored.files.iter().rev() {
            let (folder, within) = store::split_file(file);
            let dir = root.join(folder);
            let unique = filename::unique(within, delim);

            let current = if dir.join(within).is_file() {
                within.to_owned()
            } else {
                match scan::find(&dir, unique, delim)? {
                    Some(current) => {
                        debug!("{} is now {}/{}", file, folder, current);
                        current
                    }
                    None => continue,
                }
            };

            let entry = Entry {
                flags: MaildirFlags::parse(&current, delim),
                in_cur: current.starts_with("cur/"),
                unique: unique.to_owned(),
                rel: current,
            };
            let mut email =
                match scan::load(&dir, &entry, self.settings.mark_old) {
                    Ok(email) => email,
                    Err(Error::Io(ref e))
                        if io::ErrorKind::NotFound == e.kind() =>
                    {
                        continue
                    }
                    Err(e) => return Err(e),
                };
            email.id = stored.id.clone();
            email.path = store::join_rel(folder, &entry.rel);
            email.tags = tags::to_tag_list(&stored.tags);
            return Ok(Some(email));
        }
        Ok(None)
    }

    fn load_all(
        &self,
        m: &mut Mailbox,
        root: &Path,
        found: &[&StoredMessage],
    ) -> Result<Vec<usize>, Error> {
        let mut progress = Progress::new(
            format!("{} Reading messages", m.log_prefix),
            found.len(),
        );
        let mut added = Vec::with_capacity(found.len());
        for (n, stored) in found.iter().enumerate() {
            interrupt::check()?;
            match self.load_stored(root, stored)? {
                Some(email) => added.push(m.push(email)),
                None => warn!(
                    "{} No file of {} could be read",
                    m.log_prefix, stored.id
                ),
            }
            if m.verbose {
                progress.update(n + 1);
            }
        }
        Ok(added)
    }

    /// Bring `email` up to date with what the database says about it.
    /// Returns whether anything visible changed.
    fn merge(&self, email: &mut Email, stored: &StoredMessage) -> bool {
        let mut changed = false;
        let tags = tags::to_tag_list(&stored.tags);
        if tags != email.tags {
            email.tags = tags;
            changed = true;
        }

        if stored.files.iter().any(|f| *f == email.path) {
            return changed;
        }
        let current = match stored.filename() {
            Some(current) => current,
            None => return changed,
        };
        email.path = current.to_owned();

        let (_, within) = store::split_file(current);
        let mut disk = Email::default();
        MaildirFlags::parse(within, self.settings.delim).apply(&mut disk);
        disk.old = within.starts_with("cur/")
            && self.settings.mark_old
            && !disk.read;
        if maildir::disk_state(&disk) == maildir::disk_state(email) {
            return changed;
        }
        if email.changed {
            debug!("Keeping local flag changes to {}", email.path);
            return changed;
        }

        MaildirFlags::parse(within, self.settings.delim).apply(email);
        email.old = disk.old;
        true
    }

    fn sync_all(
        &self,
        m: &mut Mailbox,
        root: &Path,
        db: &DbHandle,
    ) -> Result<(), Error> {
        let mut guard = db.open()?;
        let mut progress =
            Progress::new(format!("{} Writing messages", m.log_prefix), m.len());
        for ix in 0..m.emails.len() {
            interrupt::check()?;
            self.sync_one(&mut guard, root, &mut m.emails[ix], &m.log_prefix)?;
            if m.verbose {
                progress.update(ix + 1);
            }
        }
        guard.release()
    }

    /// Write one message back: rename (or unlink) its file and every copy
    /// of it, then tell the database.
    fn sync_one(
        &self,
        guard: &mut DbGuard<'_>,
        root: &Path,
        email: &mut Email,
        prefix: &LogPrefix,
    ) -> Result<(), Error> {
        let delim = self.settings.delim;

        let mut old = email.path.clone();
        if !root.join(&old).is_file() {
            if let Some(known) =
                guard.get(&email.id).and_then(StoredMessage::filename)
            {
                if known != old {
                    debug!("{} {} is now {}", prefix, old, known);
                    old = known.to_owned();
                }
            }
        }
        let copies = guard
            .get(&email.id)
            .map(|s| {
                s.files
                    .iter()
                    .filter(|f| **f != old)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let (folder, within) = store::split_file(&old);
        let dir = root.join(folder);
        match maildir::sync_file(&dir, within, email, self.settings.trash, delim)?
        {
            SyncOutcome::Kept => email.path = old.clone(),
            SyncOutcome::Unlinked => {
                for copy in &copies {
                    fs::remove_file(root.join(copy)).ignore_not_found()?;
                    guard.remove_filename(copy);
                }
                guard.remove_filename(&old);
                debug!("{} Removed {}", prefix, email.id);
                return Ok(());
            }
            SyncOutcome::Renamed(renamed) => {
                let new = store::join_rel(folder, &renamed);
                guard.rename_filename(&old, &new);
                for copy in &copies {
                    let (copy_folder, copy_within) = store::split_file(copy);
                    match maildir::rename_for_flags(
                        &root.join(copy_folder),
                        copy_within,
                        email,
                        delim,
                    )? {
                        Some(ref r) if r == copy_within => (),
                        Some(r) => {
                            guard.rename_filename(
                                copy,
                                &store::join_rel(copy_folder, &r),
                            );
                        }
                        None => {
                            warn!("{} Copy {} has gone", prefix, copy);
                            guard.remove_filename(copy);
                        }
                    }
                }
                email.path = new;
            }
            SyncOutcome::Vanished => {
                warn!("{} {} was removed by someone else", prefix, old);
                guard.remove_filename(&old);
                email.active = false;
                return Ok(());
            }
        }

        let flags = MaildirFlags::of_email(email);
        let stale = guard.get(&email.id).map_or(false, |s| {
            let mut tags = s.tags.clone();
            self.settings.names.sync_from_flags(&flags, &mut tags)
        });
        if stale {
            guard.sync_flag_tags(&email.id, &self.settings.names, &flags);
            if let Some(s) = guard.get(&email.id) {
                email.tags = tags::to_tag_list(&s.tags);
            }
        }
        Ok(())
    }
}

impl MxOps for TagDbOps {
    fn kind(&self) -> MailboxType {
        MailboxType::TagDb
    }

    fn is_local(&self) -> bool {
        false
    }

    fn configure(&mut self, config: &Config, scope: ScopeId) {
        match Settings::from_config(config, scope) {
            Ok(settings) => self.settings = settings,
            Err(e) => warn!("Tag database settings: {}", e),
        }
    }

    /// Mailboxes on the same database root share an account.
    fn ac_owns_path(&self, account: &Account, path: &str) -> bool {
        match (account.adata::<DbHandle>(), root_of(path)) {
            (Some(db), Some(root)) => db.root() == root,
            _ => false,
        }
    }

    fn ac_add(&mut self, account: &mut Account, path: &str) -> Result<(), Error> {
        let root = root_of(path).ok_or_else(|| {
            Error::InvalidValue(format!("{} is not a tagdb URL", path))
        })?;
        let db = match account.adata::<DbHandle>() {
            Some(db) => db,
            None => {
                let db = Rc::new(DbHandle::new(root));
                account.set_adata(Rc::clone(&db));
                db
            }
        };
        self.db = Some(db);
        Ok(())
    }

    fn mbox_open(&mut self, m: &mut Mailbox) -> Result<(), Error> {
        let params = Params::parse(&m.path, &self.settings)?;
        let db = self.handle()?;
        let query = window::effective_query(&self.settings.window, &params.query);
        info!(
            "{} Query {} ({}, limit {})",
            m.log_prefix, query, params.kind, params.limit
        );

        // Before loading, so a write racing with us is seen by check
        let mtime = db.mtime()?;
        let guard = db.open()?;
        let found = self.run_query(&guard, &params, &query)?;
        if let Err(e) = self.load_all(m, &params.root, &found) {
            m.truncate(0);
            return Err(e);
        }
        drop(found);
        guard.release()?;

        m.mtime = mtime;
        self.stats_mtime = None;
        Ok(())
    }

    fn mbox_check(&mut self, m: &mut Mailbox) -> Result<MxStatus, Error> {
        let db = self.handle()?;
        let mtime = db.mtime()?;
        if mtime.is_none() {
            return Err(Error::BackendFatal(format!(
                "The tag database under {} has gone",
                db.root().display()
            )));
        }
        if mtime <= m.mtime {
            return Ok(MxStatus::Ok);
        }

        let params = Params::parse(&m.path, &self.settings)?;
        let query = window::effective_query(&self.settings.window, &params.query);
        let guard = db.open()?;
        let found = self.run_query(&guard, &params, &query)?;

        // Newcomers first: if reading them is interrupted the mailbox must
        // be left as it was
        let newcomers = found
            .iter()
            .copied()
            .filter(|stored| m.by_id(&stored.id).is_none())
            .collect::<Vec<_>>();
        let oldcount = m.len();
        let added = match self.load_all(m, &params.root, &newcomers) {
            Ok(added) => added,
            Err(e) => {
                m.truncate(oldcount);
                return Err(e);
            }
        };

        for email in &mut m.emails[..oldcount] {
            email.active = false;
        }
        let mut flag_changes = Vec::new();
        for &stored in &found {
            let ix = match m.by_id(&stored.id) {
                Some(ix) if ix < oldcount && !m.emails[ix].active => ix,
                _ => continue,
            };
            let email = &mut m.emails[ix];
            email.active = true;
            if self.merge(email, stored) {
                email.limit_visited = false;
                flag_changes.push(ix);
            }
        }

        drop(newcomers);
        drop(found);
        guard.release()?;
        m.mtime = mtime;

        let occult = m.emails.iter().any(|e| !e.active);
        let flags_changed = !flag_changes.is_empty();
        if flags_changed {
            m.post_email(EmailChange::Change, flag_changes);
        }
        if !added.is_empty() {
            m.post_email(EmailChange::Add, added.clone());
        }

        if occult {
            m.update_tables();
            Ok(MxStatus::Reopened)
        } else if !added.is_empty() {
            Ok(MxStatus::NewMail)
        } else if flags_changed {
            Ok(MxStatus::FlagsChanged)
        } else {
            Ok(MxStatus::Ok)
        }
    }

    fn mbox_check_stats(
        &mut self,
        m: &mut Mailbox,
        force: bool,
    ) -> Result<MxStatus, Error> {
        let db = self.handle()?;
        let mtime = db.mtime()?;
        if !force && mtime.is_some() && mtime == self.stats_mtime {
            return Ok(MxStatus::Ok);
        }

        let params = Params::parse(&m.path, &self.settings)?;
        let parsed = query::parse(&params.query)?;
        let guard = db.open()?;
        let found = guard.search(&parsed, &self.settings.excludes, Utc::now());
        let limit = if 0 == params.limit {
            usize::MAX
        } else {
            params.limit
        };

        let names = &self.settings.names;
        let mut counts = Counts {
            tagged: m.counts.tagged,
            ..Counts::default()
        };
        for stored in found.iter().take(limit) {
            counts.total += 1;
            if stored.tags.contains(&names.unread) {
                counts.unread += 1;
            }
            if stored.tags.contains(&names.flagged) {
                counts.flagged += 1;
            }
        }
        counts.new = counts.unread;
        drop(found);
        guard.release()?;

        self.stats_mtime = mtime;
        m.counts = counts;
        Ok(if counts.new > 0 {
            MxStatus::NewMail
        } else {
            MxStatus::Ok
        })
    }

    fn mbox_sync(&mut self, m: &mut Mailbox) -> Result<MxStatus, Error> {
        let params = Params::parse(&m.path, &self.settings)?;
        let db = self.handle()?;

        db.longrun_init();
        let result = self.sync_all(m, &params.root, &db);
        let done = db.longrun_done();
        result?;
        done?;

        m.mtime = db.mtime()?;
        Ok(MxStatus::Ok)
    }

    fn msg_open(&mut self, m: &Mailbox, index: usize) -> Result<Message, Error> {
        let email = m
            .emails
            .get(index)
            .ok_or_else(|| Error::NotFound(format!("message {}", index)))?;
        let params = Params::parse(&m.path, &self.settings)?;
        match Message::open(params.root.join(&email.path)) {
            Err(Error::Io(ref e)) if io::ErrorKind::NotFound == e.kind() => {
                let delim = self.settings.delim;
                let (folder, within) = store::split_file(&email.path);
                let dir = params.root.join(folder);
                match scan::find(&dir, filename::unique(within, delim), delim)? {
                    Some(rel) => Message::open(dir.join(rel)),
                    None => Err(Error::NotFound(email.id.clone())),
                }
            }
            r => r,
        }
    }

    fn msg_open_new(
        &mut self,
        m: &Mailbox,
        template: Option<&Email>,
    ) -> Result<NewMessage, Error> {
        let params = Params::parse(&m.path, &self.settings)?;
        let dir = params.delivery_dir();
        maildir::create_maildir(&dir)?;
        maildir::open_new(&dir, template)
    }

    fn msg_commit(
        &mut self,
        m: &mut Mailbox,
        msg: NewMessage,
    ) -> Result<usize, Error> {
        let params = Params::parse(&m.path, &self.settings)?;
        let dir = params.delivery_dir();
        let entry = maildir::deliver(&dir, msg, self.settings.delim)?;
        let mut email = scan::load(&dir, &entry, self.settings.mark_old)?;
        let rel = store::join_rel(&params.folder, &entry.rel);

        let db = self.handle()?;
        let mut guard = db.open()?;
        let tags = record_message(
            &mut guard,
            &rel,
            &email,
            &entry.flags,
            &self.settings.names,
            &self.settings.record_tags,
        );
        guard.release()?;

        email.path = rel;
        email.tags = tags::to_tag_list(&tags);
        let index = m.push(email);
        m.post_email(EmailChange::Add, vec![index]);
        debug!("{} Recorded {}", m.log_prefix, m.emails[index].path);
        Ok(index)
    }

    fn tags_edit(&self, _m: &Mailbox, buf: &str) -> Result<String, Error> {
        let ops = parse_tag_edit(buf).map_err(Error::InvalidValue)?;
        Ok(tags::render_ops(&ops))
    }

    /// Apply the edit to the database in one batch, then derive the
    /// message's flags from its new tags.
    fn tags_commit(
        &mut self,
        m: &mut Mailbox,
        index: usize,
        buf: &str,
    ) -> Result<(), Error> {
        let ops = parse_tag_edit(buf).map_err(Error::InvalidValue)?;
        if ops.is_empty() {
            return Ok(());
        }

        let db = self.handle()?;
        let mut guard = db.open()?;
        let email = m
            .emails
            .get_mut(index)
            .ok_or_else(|| Error::NotFound(format!("message {}", index)))?;
        let tags = match guard.update_tags(&email.id, &ops) {
            Some((_, tags)) => tags.clone(),
            None => {
                return Err(Error::NotFound(format!(
                    "{} is not in the tag database",
                    email.id
                )))
            }
        };
        debug!(
            "{} {}: {}",
            m.log_prefix,
            email.id,
            tags::render_ops(&ops)
        );

        email.tags = tags::to_tag_list(&tags);
        self.settings.names.apply_to_email(email);
        email.changed = true;
        m.changed = true;
        m.post_email(EmailChange::Change, vec![index]);

        guard.release()?;
        m.mtime = db.mtime()?;
        Ok(())
    }

    fn msg_still_queried(
        &self,
        m: &Mailbox,
        index: usize,
    ) -> Result<bool, Error> {
        let email = m
            .emails
            .get(index)
            .ok_or_else(|| Error::NotFound(format!("message {}", index)))?;
        let db = self.handle()?;
        let params = Params::parse(&m.path, &self.settings)?;
        let query =
            window::effective_query(&self.settings.window, &params.query);
        let guard = db.open()?;
        let still = self
            .run_query(&guard, &params, &query)?
            .iter()
            .any(|stored| stored.id == email.id);
        guard.release()?;
        Ok(still)
    }

    fn path_canon(&self, path: &str) -> Result<String, Error> {
        let mut url = parse_scheme(path)?;
        url.path = canon_local(&url.path)?;
        Ok(url.to_string())
    }

    fn path_parent(&self, _path: &str) -> Result<String, Error> {
        Err(Error::Unsupported)
    }
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use nix::sys::time::{TimeVal, TimeValLike};
    use tempfile::TempDir;

    use super::store::{IndexOptions, RemoveStatus};
    use super::*;
    use crate::context::Context;
    use crate::email::Flag;
    use crate::mailbox::account::Accounts;
    use crate::mailbox::backend::OpenFlags;
    use crate::mailbox::mx::Mx;

    struct Setup {
        root: TempDir,
        ctx: Context,
        accounts: Accounts,
        bump: i64,
    }

    impl Setup {
        fn new() -> Self {
            crate::init_test_log();
            let root = TempDir::new().unwrap();
            store::test::populate(root.path());
            let mut db = Database::new();
            db.index(root.path(), &IndexOptions::default()).unwrap();
            db.save(root.path()).unwrap();

            let ctx = Context::new().unwrap();
            let accounts =
                Accounts::new(ctx.config.notify_node(ctx.config.root()));
            Setup {
                root,
                ctx,
                accounts,
                bump: 0,
            }
        }

        fn url(&self, params: &str) -> String {
            format!("tagdb://{}?{}", self.root.path().display(), params)
        }

        fn open(&mut self, params: &str) -> Mx {
            self.try_open(params).unwrap()
        }

        fn try_open(&mut self, params: &str) -> Result<Mx, Error> {
            let url = self.url(params);
            Mx::open(&mut self.ctx, &mut self.accounts, &url, OpenFlags::QUIET)
        }

        fn file(&self, rel: &str) -> PathBuf {
            self.root.path().join(rel)
        }

        fn db(&self) -> Database {
            Database::load(self.root.path()).unwrap()
        }

        /// Change the database as another process would, making sure the
        /// change is visible through the file's mtime.
        fn change(&mut self, f: impl FnOnce(&mut Database)) {
            let mut db = self.db();
            f(&mut db);
            db.save(self.root.path()).unwrap();

            self.bump += 10;
            let t = TimeVal::seconds(Utc::now().timestamp() + self.bump);
            nix::sys::stat::utimes(
                Database::path(self.root.path()).as_path(),
                &t,
                &t,
            )
            .unwrap();
        }

        fn duplicate_a(&self) {
            store::test::deliver(
                self.root.path(),
                "lists/rust/cur/9.a:2,S",
                "Message-ID: <a@x>\r\nFrom: Jo <jo@x>\r\nSubject: Lunch\r\n\
                 Date: Mon, 2 Mar 2020 10:00:00 +0000",
            );
            let mut db = self.db();
            let stats =
                db.index(self.root.path(), &IndexOptions::default()).unwrap();
            assert_eq!(1, stats.duplicates);
            db.save(self.root.path()).unwrap();
        }
    }

    fn ids(mx: &Mx) -> Vec<&str> {
        mx.mailbox.emails.iter().map(|e| e.id.as_str()).collect()
    }

    fn edit(s: &str) -> Vec<crate::email::tags::TagOp> {
        parse_tag_edit(s).unwrap()
    }

    #[test]
    fn index_tree_follows_the_maildirs() {
        let root = TempDir::new().unwrap();
        store::test::populate(root.path());
        let ctx = Context::new().unwrap();

        let stats =
            index_tree(&ctx.config, ctx.root(), root.path()).unwrap();
        assert!(stats.added > 0);
        assert!(Database::exists(root.path()));

        let again =
            index_tree(&ctx.config, ctx.root(), root.path()).unwrap();
        assert_eq!(0, again.added);
        assert_eq!(0, again.removed);
    }

    #[test]
    fn probe_and_canon() {
        assert!(probe("tagdb:///mail?query=x"));
        assert!(probe("TagDB://mail"));
        assert!(!probe("/home/jo/Maildir"));
        assert!(!probe("tag"));

        let ops = TagDbOps::new();
        assert_eq!(
            "tagdb:///a/c?query=tag:inbox%20and%20x",
            ops.path_canon("TAGDB:///a/b/../c/?query=tag%3Ainbox%20and%20x")
                .unwrap()
        );
        assert!(ops
            .path_canon("tagdb://mail?query=x")
            .unwrap()
            .starts_with("tagdb:///"));
        assert_matches!(Err(Error::Unsupported), ops.path_parent("tagdb:///a"));
    }

    #[test]
    fn url_parameters() {
        let settings = Settings {
            query_type: QueryType::Threads,
            db_limit: 7,
            ..Settings::default()
        };
        let p = Params::parse("tagdb:///mail?query=tag:inbox", &settings)
            .unwrap();
        assert_eq!(PathBuf::from("/mail"), p.root);
        assert_eq!(QueryType::Threads, p.kind);
        assert_eq!(7, p.limit);
        assert_eq!("", p.folder);

        let p = Params::parse(
            "tagdb:///mail?type=messages&limit=3&query=x&folder=sent/",
            &settings,
        )
        .unwrap();
        assert_eq!(QueryType::Messages, p.kind);
        assert_eq!(3, p.limit);
        assert_eq!(PathBuf::from("/mail/sent"), p.delivery_dir());

        assert_matches!(
            Err(Error::InvalidValue(_)),
            Params::parse("tagdb:///mail", &settings)
        );
        assert_matches!(
            Err(Error::InvalidValue(_)),
            Params::parse("tagdb:///mail?query=x&type=convos", &settings)
        );
        assert_matches!(
            Err(Error::InvalidValue(_)),
            Params::parse("tagdb:///mail?query=x&limit=-1", &settings)
        );
        assert_matches!(
            Err(Error::InvalidValue(_)),
            Params::parse("maildir:///mail?query=x", &settings)
        );
    }

    #[test]
    fn query_to_url() {
        assert_eq!(
            "tagdb:///mail?type=threads&limit=5&query=tag:inbox",
            url_from_query(
                "tagdb:///mail?limit=5&query=old",
                "tag:inbox type=threads",
                QueryType::Messages,
                0
            )
            .unwrap()
        );
        assert_eq!(
            "tagdb:///mail?type=messages&query=from:jo%20and%20x",
            url_from_query(
                "tagdb:///mail?limit=5",
                "from:jo and x",
                QueryType::Messages,
                5
            )
            .unwrap()
        );
        assert!(url_from_query("/mail", "x", QueryType::Messages, 0).is_err());
    }

    #[test]
    fn open_lists_matches() {
        let mut setup = Setup::new();
        let mx = setup.open("query=tag:inbox");
        assert_eq!(MailboxType::TagDb, mx.kind());
        assert!(!mx.is_local());
        assert_eq!(vec!["c@x", "b@x", "a@x"], ids(&mx));

        let c = &mx.mailbox.emails[0];
        assert_eq!("lists/rust/cur/3.c:2,F", c.path);
        assert!(c.flagged);
        assert!(!c.read);
        assert!(c.tags.contains("inbox"));
        assert!(c.tags.contains("flagged"));
        assert_eq!(Some("Release".to_owned()), c.env.subject);

        let a = &mx.mailbox.emails[2];
        assert!(a.read);
        assert_eq!(2, mx.mailbox.counts.unread);

        let mx = setup.open("type=messages&limit=2&query=*");
        assert_eq!(vec!["c@x", "b@x"], ids(&mx));
    }

    #[test]
    fn threads_expand_to_whole_threads() {
        let mut setup = Setup::new();
        let mx = setup.open("type=threads&query=from:al");
        assert_eq!(vec!["a@x", "b@x"], ids(&mx));

        // The limit is checked before each thread
        let mx = setup.open("type=threads&limit=1&query=*");
        assert_eq!(vec!["c@x"], ids(&mx));
        let mx = setup.open("type=threads&limit=2&query=*");
        assert_eq!(vec!["c@x", "a@x", "b@x"], ids(&mx));

        setup.ctx.set("nm_query_type", "threads").unwrap();
        let mx = setup.open("query=from:jo");
        assert_eq!(2, mx.mailbox.len());
        assert!(setup.ctx.set("nm_query_type", "convos").is_err());
    }

    #[test]
    fn excluded_tags() {
        let mut setup = Setup::new();
        setup.ctx.set("nm_exclude_tags", "flagged,spam").unwrap();
        assert_eq!(2, setup.open("query=*").mailbox.len());
        assert_eq!(
            vec!["c@x"],
            ids(&setup.open("query=tag:flagged"))
        );
    }

    #[test]
    fn window_narrows_query() {
        let mut setup = Setup::new();
        setup.ctx.set("nm_query_window_duration", "1").unwrap();
        // The messages are years old
        assert_eq!(0, setup.open("query=*").mailbox.len());
        assert_eq!(
            3,
            setup
                .open("query=date:2020-03-01..2020-03-05")
                .mailbox
                .len()
        );
    }

    #[test]
    fn broken_urls_and_missing_database() {
        let mut setup = Setup::new();
        assert_matches!(Err(Error::InvalidValue(_)), setup.try_open("type=x"));
        assert_matches!(
            Err(Error::InvalidValue(_)),
            setup.try_open("query=tag:inbox)")
        );

        fs::remove_file(Database::path(setup.root.path())).unwrap();
        assert_matches!(Err(Error::NotFound(_)), setup.try_open("query=*"));
    }

    #[test]
    fn mailboxes_share_database() {
        let mut setup = Setup::new();
        let _a = setup.open("query=tag:inbox");
        let _b = setup.open("query=from:jo");
        assert_eq!(1, setup.accounts.len());

        let other = TempDir::new().unwrap();
        store::test::populate(other.path());
        Database::new().save(other.path()).unwrap();
        let url = format!("tagdb://{}?query=*", other.path().display());
        let c =
            Mx::open(&mut setup.ctx, &mut setup.accounts, &url, OpenFlags::QUIET)
                .unwrap();
        assert_eq!(0, c.mailbox.len());
        assert_eq!(2, setup.accounts.len());
    }

    #[test]
    fn tag_edits() {
        let mut setup = Setup::new();
        let mut mx = setup.open("query=*");
        assert!(mx.supports_tags());
        assert_eq!("+a -b !c +d", mx.tags_edit("+a -b !c d").unwrap());
        assert_matches!(Err(Error::InvalidValue(_)), mx.tags_edit("+"));

        let b = mx.mailbox.by_id("b@x").unwrap();
        assert!(!mx.mailbox.emails[b].read);
        mx.tags_commit(&mut setup.ctx, b, "-unread +todo").unwrap();
        {
            let e = &mx.mailbox.emails[b];
            assert!(e.read);
            assert!(e.changed);
            assert!(e.tags.contains("todo"));
            assert!(!e.tags.contains("unread"));
        }
        assert!(mx.mailbox.changed);
        assert_eq!(1, mx.mailbox.counts.unread);

        let stored = setup.db();
        let tags = &stored.get("b@x").unwrap().tags;
        assert!(tags.contains("todo"));
        assert!(!tags.contains("unread"));

        // Nothing to do
        mx.tags_commit(&mut setup.ctx, b, "").unwrap();
        // Our own write is not news
        assert_eq!(MxStatus::Ok, mx.check(&mut setup.ctx).unwrap());

        mx.sync(&mut setup.ctx, false).unwrap();
        assert!(setup.file("inbox/cur/2.b:2,S").is_file());
        assert!(!setup.file("inbox/new/2.b").exists());
        assert_eq!("inbox/cur/2.b:2,S", mx.mailbox.emails[b].path);
        assert_eq!(
            Some("inbox/cur/2.b:2,S"),
            setup.db().get("b@x").unwrap().filename()
        );
    }

    #[test]
    fn flagged_tag_names_follow_config() {
        let mut setup = Setup::new();
        setup.ctx.set("nm_flagged_tag", "star").unwrap();
        let mut mx = setup.open("query=from:al");
        mx.tags_commit(&mut setup.ctx, 0, "+star").unwrap();
        assert!(mx.mailbox.emails[0].flagged);
        mx.tags_commit(&mut setup.ctx, 0, "!star").unwrap();
        assert!(!mx.mailbox.emails[0].flagged);
    }

    #[test]
    fn sync_writes_flags_to_files_and_tags() {
        let mut setup = Setup::new();
        let mut mx = setup.open("query=from:bo");
        mx.mailbox.set_flag(0, Flag::Read, true).unwrap();
        mx.sync(&mut setup.ctx, false).unwrap();

        assert!(setup.file("lists/rust/cur/3.c:2,FS").is_file());
        let db = setup.db();
        let c = db.get("c@x").unwrap();
        assert_eq!(Some("lists/rust/cur/3.c:2,FS"), c.filename());
        assert!(!c.tags.contains("unread"));
        assert!(!mx.mailbox.emails[0].tags.contains("unread"));
    }

    #[test]
    fn duplicates_rename_in_lockstep() {
        let mut setup = Setup::new();
        setup.duplicate_a();
        let mut mx = setup.open("query=id:a@x");
        assert_eq!(1, mx.mailbox.len());
        mx.mailbox.set_flag(0, Flag::Flagged, true).unwrap();
        mx.sync(&mut setup.ctx, false).unwrap();

        assert!(setup.file("inbox/cur/1.a:2,FS").is_file());
        assert!(setup.file("lists/rust/cur/9.a:2,FS").is_file());
        let db = setup.db();
        let a = db.get("a@x").unwrap();
        let mut files = a.files.clone();
        files.sort();
        assert_eq!(
            vec!["inbox/cur/1.a:2,FS", "lists/rust/cur/9.a:2,FS"],
            files
        );
        assert!(a.tags.contains("flagged"));
    }

    #[test]
    fn purge_removes_every_copy() {
        let mut setup = Setup::new();
        setup.duplicate_a();
        let mut mx = setup.open("type=threads&query=from:jo");
        let a = mx.mailbox.by_id("a@x").unwrap();
        mx.mailbox.set_flag(a, Flag::Deleted, true).unwrap();
        mx.sync(&mut setup.ctx, true).unwrap();

        assert!(!setup.file("inbox/cur/1.a:2,S").exists());
        assert!(!setup.file("lists/rust/cur/9.a:2,S").exists());
        assert_eq!(vec!["b@x"], ids(&mx));
        let mut db = setup.db();
        assert!(db.get("a@x").is_none());
        assert_eq!(
            RemoveStatus::NotFound,
            db.remove_filename("inbox/cur/1.a:2,S")
        );
    }

    #[test]
    fn trash_keeps_file() {
        let mut setup = Setup::new();
        setup.ctx.set("maildir_trash", "yes").unwrap();
        let mut mx = setup.open("query=from:bo");
        mx.mailbox.set_flag(0, Flag::Deleted, true).unwrap();
        mx.sync(&mut setup.ctx, true).unwrap();
        assert_eq!(1, mx.mailbox.len());
        assert!(setup.file("lists/rust/cur/3.c:2,FT").is_file());
        assert_eq!(
            Some("lists/rust/cur/3.c:2,FT"),
            setup.db().get("c@x").unwrap().filename()
        );
    }

    #[test]
    fn check_merges_outside_changes() {
        let mut setup = Setup::new();
        let mut mx = setup.open("query=tag:inbox");
        assert_eq!(MxStatus::Ok, mx.check(&mut setup.ctx).unwrap());

        setup.change(|db| {
            db.update_tags("c@x", &edit("+replied +later")).unwrap();
        });
        assert_eq!(
            MxStatus::FlagsChanged,
            mx.check(&mut setup.ctx).unwrap()
        );
        assert!(mx.mailbox.emails[0].tags.contains("later"));

        store::test::deliver(
            setup.root.path(),
            "inbox/new/4.d",
            "Message-ID: <d@x>\r\nSubject: More\r\n\
             Date: Thu, 5 Mar 2020 10:00:00 +0000",
        );
        let root = setup.root.path().to_owned();
        setup.change(|db| {
            db.index(&root, &IndexOptions::default()).unwrap();
        });
        assert_eq!(MxStatus::NewMail, mx.check(&mut setup.ctx).unwrap());
        assert_eq!(4, mx.mailbox.len());
        assert_eq!(Some(3), mx.mailbox.by_id("d@x"));

        setup.change(|db| {
            db.update_tags("a@x", &edit("-inbox")).unwrap();
        });
        assert_eq!(MxStatus::Reopened, mx.check(&mut setup.ctx).unwrap());
        assert_eq!(3, mx.mailbox.len());
        assert_eq!(None, mx.mailbox.by_id("a@x"));
        assert_eq!(Some(2), mx.mailbox.by_id("d@x"));
        assert!(mx.mailbox.verify());
    }

    #[test]
    fn interrupted_check_leaves_mailbox_alone() {
        let mut setup = Setup::new();
        let mut mx = setup.open("query=tag:inbox");
        store::test::deliver(
            setup.root.path(),
            "inbox/new/4.d",
            "Message-ID: <d@x>\r\nSubject: More\r\n\
             Date: Thu, 5 Mar 2020 10:00:00 +0000",
        );
        let root = setup.root.path().to_owned();
        setup.change(|db| {
            db.index(&root, &IndexOptions::default()).unwrap();
            db.update_tags("b@x", &edit("+later")).unwrap();
        });

        crate::support::interrupt::raise();
        assert_matches!(Err(Error::Interrupted), mx.check(&mut setup.ctx));
        assert_eq!(3, mx.mailbox.len());
        assert_eq!(None, mx.mailbox.by_id("d@x"));
        assert!(mx.mailbox.emails.iter().all(|e| !e.tags.contains("later")));
        assert!(mx.mailbox.verify());

        assert_eq!(MxStatus::NewMail, mx.check(&mut setup.ctx).unwrap());
        assert_eq!(Some(3), mx.mailbox.by_id("d@x"));
        let b = mx.mailbox.by_id("b@x").unwrap();
        assert!(mx.mailbox.emails[b].tags.contains("later"));
        assert!(mx.mailbox.verify());
    }

    #[test]
    fn check_follows_renamed_files() {
        let mut setup = Setup::new();
        let mut mx = setup.open("query=from:al");
        fs::rename(setup.file("inbox/new/2.b"), setup.file("inbox/cur/2.b:2,S"))
            .unwrap();
        setup.change(|db| {
            db.rename_filename("inbox/new/2.b", "inbox/cur/2.b:2,S");
        });

        assert_eq!(
            MxStatus::FlagsChanged,
            mx.check(&mut setup.ctx).unwrap()
        );
        let e = &mx.mailbox.emails[0];
        assert!(e.read);
        assert!(!e.changed);
        assert_eq!("inbox/cur/2.b:2,S", e.path);
    }

    #[test]
    fn stats_count_tags() {
        let mut setup = Setup::new();
        let mut mx = setup.open("query=*");
        mx.mailbox.counts = Counts::default();
        assert_eq!(
            MxStatus::NewMail,
            mx.check_stats(&mut setup.ctx, true).unwrap()
        );
        assert_eq!(3, mx.mailbox.counts.total);
        assert_eq!(2, mx.mailbox.counts.unread);
        assert_eq!(2, mx.mailbox.counts.new);
        assert_eq!(1, mx.mailbox.counts.flagged);

        // Unchanged database, nothing to do
        mx.mailbox.counts = Counts::default();
        assert_eq!(
            MxStatus::Ok,
            mx.check_stats(&mut setup.ctx, false).unwrap()
        );
        assert_eq!(0, mx.mailbox.counts.total);
    }

    #[test]
    fn commit_records_message() {
        let mut setup = Setup::new();
        setup.ctx.set("nm_record_tags", "sent,mine").unwrap();
        let mut mx = setup.open("folder=sent&query=tag:sent");
        assert_eq!(0, mx.mailbox.len());

        let mut msg = mx.msg_open_new().unwrap();
        write!(
            msg,
            "Message-ID: <s@x>\nIn-Reply-To: <c@x>\nSubject: Re: Release\n\n\
             thanks\n"
        )
        .unwrap();
        let ix = mx.msg_commit(&mut setup.ctx, msg).unwrap();

        let e = &mx.mailbox.emails[ix];
        assert_eq!("s@x", e.id);
        assert!(e.path.starts_with("sent/new/"));
        assert!(e.tags.contains("sent"));
        assert!(e.tags.contains("mine"));
        assert!(e.tags.contains("unread"));

        let db = setup.db();
        let s = db.get("s@x").unwrap();
        assert_eq!(db.get("c@x").unwrap().thread, s.thread);
        assert_eq!(Some("c@x".to_owned()), s.parent);

        let mut opened = mx.msg_open(ix).unwrap();
        assert!(opened.read_all().unwrap().ends_with(b"thanks\n"));
    }

    #[test]
    fn msg_open_finds_moved_file() {
        let mut setup = Setup::new();
        let mut mx = setup.open("query=from:al");
        fs::rename(setup.file("inbox/new/2.b"), setup.file("inbox/cur/2.b:2,R"))
            .unwrap();
        let mut msg = mx.msg_open(0).unwrap();
        assert!(msg.read_all().unwrap().ends_with(b"body\r\n"));
    }
}
