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

//! The tag database.
//!
//! The database is a single CBOR file, `<root>/.mailview/index.cbor`,
//! describing every message found in the maildirs under `<root>`. It is
//! always rewritten whole, through a temporary file in the same directory,
//! so readers never see a partial update.
//!
//! Each message is keyed by its message id. One message may have several
//! files (copies in different folders); file paths are stored relative to
//! the root. Threads are connected components of the reply graph and get a
//! fresh id whenever the database is re-threaded.

use std::cell::{Cell, RefCell, RefMut};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs;
use std::io;
use std::ops::{Deref, DerefMut};
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::prelude::*;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use super::query::Query;
use super::tags::{self, TagNames};
use crate::email::tags::TagOp;
use crate::email::Email;
use crate::maildir::filename::{self, MaildirFlags};
use crate::maildir::scan;
use crate::support::error::Error;
use crate::support::file_ops;
use crate::support::interrupt;
use crate::support::progress::Progress;

pub const DB_DIR: &str = ".mailview";
const DB_FILE: &str = "index.cbor";
const FORMAT_VERSION: u32 = 1;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    /// Paths relative to the database root, in the order they were found.
    pub files: Vec<String>,
    pub tags: BTreeSet<String>,
    pub thread: String,
    /// The nearest ancestor that is itself in the database.
    pub parent: Option<String>,
    /// Every ancestor id the message claims, nearest first.
    pub ancestry: Vec<String>,
    pub from: String,
    pub subject: String,
    pub date: i64,
}

impl StoredMessage {
    /// Describe `email`, found in the file `rel`, for storage.
    pub fn from_email(
        email: &Email,
        rel: String,
        tags: BTreeSet<String>,
    ) -> Self {
        StoredMessage {
            id: email.id.clone(),
            files: vec![rel],
            tags,
            thread: String::new(),
            parent: None,
            ancestry: email
                .env
                .ancestry()
                .into_iter()
                .map(str::to_owned)
                .collect(),
            from: email
                .env
                .from
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
            subject: email.env.subject.clone().unwrap_or_default(),
            date: email.date_sent(),
        }
    }

    /// The file used to read the message.
    pub fn filename(&self) -> Option<&str> {
        self.files.last().map(String::as_str)
    }

    /// The folders holding a copy of the message, relative to the root.
    pub fn folders(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| folder_of(f))
    }
}

/// The maildir part of a relative file path: `a/b/cur/x` is in `a/b`.
pub fn folder_of(rel: &str) -> &str {
    let parts = rel.rsplitn(3, '/').collect::<Vec<_>>();
    if 3 == parts.len() {
        parts[2]
    } else {
        ""
    }
}

/// Split a relative file path into its maildir and the path within it.
pub fn split_file(rel: &str) -> (&str, &str) {
    let folder = folder_of(rel);
    if folder.is_empty() {
        ("", rel)
    } else {
        (folder, &rel[folder.len() + 1..])
    }
}

/// Result of removing a file from the database.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoveStatus {
    /// The message is gone entirely.
    Removed,
    /// Other copies of the message remain.
    Duplicate,
    NotFound,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub added: usize,
    pub duplicates: usize,
    pub removed: usize,
    pub renamed: usize,
}

/// How the indexer treats files it has not seen before.
#[derive(Clone, Debug)]
pub struct IndexOptions {
    pub delim: char,
    /// Tags given to messages that are new to the database.
    pub new_tags: Vec<String>,
    pub names: TagNames,
}

impl Default for IndexOptions {
    fn default() -> Self {
        IndexOptions {
            delim: ':',
            new_tags: vec!["unread".to_owned(), "inbox".to_owned()],
            names: TagNames::default(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Database {
    version: u32,
    messages: BTreeMap<String, StoredMessage>,
    #[serde(skip)]
    by_file: HashMap<String, String>,
}

impl Database {
    pub fn new() -> Self {
        Database {
            version: FORMAT_VERSION,
            ..Database::default()
        }
    }

    pub fn path(root: &Path) -> PathBuf {
        root.join(DB_DIR).join(DB_FILE)
    }

    pub fn exists(root: &Path) -> bool {
        Database::path(root).is_file()
    }

    /// Modification time of the database file.
    pub fn mtime(root: &Path) -> Result<Option<SystemTime>, Error> {
        Ok(file_ops::mtime(Database::path(root))?)
    }

    pub fn load(root: &Path) -> Result<Self, Error> {
        let path = Database::path(root);
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(e) if io::ErrorKind::NotFound == e.kind() => {
                return Err(Error::NotFound(format!(
                    "No tag database under {}",
                    root.display()
                )))
            }
            Err(e) => return Err(e.into()),
        };

        let mut db: Database =
            serde_cbor::from_reader(io::BufReader::new(file))?;
        if FORMAT_VERSION != db.version {
            return Err(Error::BackendFatal(format!(
                "{}: unsupported database version {}",
                path.display(),
                db.version
            )));
        }
        db.reindex_files();
        Ok(db)
    }

    pub fn save(&self, root: &Path) -> Result<(), Error> {
        let dir = root.join(DB_DIR);
        fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(&dir)?;
        let data = serde_cbor::to_vec(self)?;
        file_ops::spit(&dir, dir.join(DB_FILE), true, 0o600, &data)?;
        Ok(())
    }

    fn reindex_files(&mut self) {
        self.by_file.clear();
        for (id, msg) in &self.messages {
            for file in &msg.files {
                self.by_file.insert(file.clone(), id.clone());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&StoredMessage> {
        self.messages.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoredMessage> {
        self.messages.values()
    }

    pub fn find_by_filename(&self, rel: &str) -> Option<&StoredMessage> {
        self.by_file.get(rel).and_then(|id| self.messages.get(id))
    }

    /// Add `msg`, or if a message with its id already exists, record its
    /// single file as another copy. Returns whether the message is new.
    pub fn add(&mut self, mut msg: StoredMessage) -> bool {
        let file = msg.files.pop();
        let id = msg.id.clone();
        let is_new = !self.messages.contains_key(&id);
        let entry = self.messages.entry(id.clone()).or_insert(msg);
        if let Some(file) = file {
            if !entry.files.contains(&file) {
                entry.files.push(file.clone());
            }
            self.by_file.insert(file, id);
        }
        is_new
    }

    pub fn remove_filename(&mut self, rel: &str) -> RemoveStatus {
        let id = match self.by_file.remove(rel) {
            Some(id) => id,
            None => return RemoveStatus::NotFound,
        };

        let gone = match self.messages.get_mut(&id) {
            Some(msg) => {
                msg.files.retain(|f| f != rel);
                msg.files.is_empty()
            }
            None => return RemoveStatus::NotFound,
        };

        if gone {
            self.messages.remove(&id);
            RemoveStatus::Removed
        } else {
            RemoveStatus::Duplicate
        }
    }

    /// Record that the file `old` is now called `new`.
    pub fn rename_filename(&mut self, old: &str, new: &str) -> bool {
        let id = match self.by_file.remove(old) {
            Some(id) => id,
            None => return false,
        };
        if let Some(msg) = self.messages.get_mut(&id) {
            for f in &mut msg.files {
                if f == old {
                    *f = new.to_owned();
                }
            }
        }
        self.by_file.insert(new.to_owned(), id);
        true
    }

    /// Apply a tag edit to message `id` as one batch.
    ///
    /// Returns the resulting tags, or `None` if there is no such message.
    pub fn update_tags(
        &mut self,
        id: &str,
        ops: &[TagOp],
    ) -> Option<(bool, &BTreeSet<String>)> {
        let msg = self.messages.get_mut(id)?;
        let changed = tags::apply_ops(&mut msg.tags, ops);
        Some((changed, &msg.tags))
    }

    /// Replace the flag tags of message `id` to match `flags`.
    pub fn sync_flag_tags(
        &mut self,
        id: &str,
        names: &TagNames,
        flags: &MaildirFlags,
    ) -> bool {
        match self.messages.get_mut(id) {
            Some(msg) => names.sync_from_flags(flags, &mut msg.tags),
            None => false,
        }
    }

    /// Recompute thread membership and parents from the reply relations.
    pub fn rethread(&mut self) {
        let ids = self.messages.keys().cloned().collect::<Vec<_>>();
        let pos = ids
            .iter()
            .enumerate()
            .map(|(ix, id)| (id.clone(), ix))
            .collect::<HashMap<_, _>>();

        let mut forest = (0..ids.len()).collect::<Vec<_>>();
        fn find(forest: &mut [usize], mut ix: usize) -> usize {
            while forest[ix] != ix {
                forest[ix] = forest[forest[ix]];
                ix = forest[ix];
            }
            ix
        }

        for (ix, msg) in self.messages.values_mut().enumerate() {
            msg.parent = msg
                .ancestry
                .iter()
                .find(|a| pos.contains_key(*a) && *a != &msg.id)
                .cloned();
            for ancestor in &msg.ancestry {
                if let Some(&other) = pos.get(ancestor) {
                    let a = find(&mut forest, ix);
                    let b = find(&mut forest, other);
                    forest[a] = b;
                }
            }
        }

        // Number threads by their earliest message so ids are stable as
        // long as nothing older arrives.
        let mut earliest: HashMap<usize, (i64, usize)> = HashMap::new();
        let dates = self.messages.values().map(|m| m.date).collect::<Vec<_>>();
        for ix in 0..ids.len() {
            let root = find(&mut forest, ix);
            let key = (dates[ix], ix);
            let e = earliest.entry(root).or_insert(key);
            if key < *e {
                *e = key;
            }
        }
        let mut order = earliest.into_iter().collect::<Vec<_>>();
        order.sort_by_key(|&(_, key)| key);
        let numbers = order
            .into_iter()
            .enumerate()
            .map(|(n, (root, _))| (root, n))
            .collect::<HashMap<_, _>>();

        let mut roots = Vec::with_capacity(ids.len());
        for ix in 0..ids.len() {
            roots.push(find(&mut forest, ix));
        }
        for (ix, msg) in self.messages.values_mut().enumerate() {
            msg.thread = format!("{:016x}", numbers[&roots[ix]] + 1);
        }
    }

    /// Messages matching `query`, newest first, leaving out those with an
    /// excluded tag unless the query asks for that tag by name.
    pub fn search(
        &self,
        query: &Query,
        excludes: &[String],
        now: DateTime<Utc>,
    ) -> Vec<&StoredMessage> {
        let excludes = excludes
            .iter()
            .filter(|t| !query.mentions_tag(t))
            .collect::<Vec<_>>();
        let mut found = self
            .messages
            .values()
            .filter(|m| !excludes.iter().any(|t| m.tags.contains(*t)))
            .filter(|m| query.matches(m, now))
            .collect::<Vec<_>>();
        found.sort_by(|a, b| b.date.cmp(&a.date).then(a.id.cmp(&b.id)));
        found
    }

    /// The threads containing a match for `query`, most recently active
    /// first.
    pub fn search_threads(
        &self,
        query: &Query,
        excludes: &[String],
        now: DateTime<Utc>,
    ) -> Vec<&str> {
        let mut threads: Vec<&str> = Vec::new();
        for msg in self.search(query, excludes, now) {
            if !threads.contains(&msg.thread.as_str()) {
                threads.push(&msg.thread);
            }
        }
        threads
    }

    /// Every message of `thread`: each top-level message followed by its
    /// replies, depth first, oldest first within each level.
    pub fn thread_messages(&self, thread: &str) -> Vec<&StoredMessage> {
        let members = self
            .messages
            .values()
            .filter(|m| m.thread == thread)
            .collect::<Vec<_>>();
        let mut children: HashMap<Option<&str>, Vec<&StoredMessage>> =
            HashMap::new();
        for m in &members {
            children.entry(m.parent.as_deref()).or_default().push(m);
        }
        for list in children.values_mut() {
            list.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));
        }

        fn walk<'a>(
            children: &HashMap<Option<&str>, Vec<&'a StoredMessage>>,
            parent: Option<&str>,
            out: &mut Vec<&'a StoredMessage>,
        ) {
            if let Some(list) = children.get(&parent) {
                for &m in list {
                    if out.iter().any(|o| o.id == m.id) {
                        continue;
                    }
                    out.push(m);
                    walk(children, Some(&m.id), out);
                }
            }
        }

        let mut out = Vec::with_capacity(members.len());
        walk(&children, None, &mut out);
        out
    }

    pub fn count(
        &self,
        query: &Query,
        excludes: &[String],
        now: DateTime<Utc>,
    ) -> usize {
        self.search(query, excludes, now).len()
    }

    /// Bring the database in line with the maildirs under `root`.
    ///
    /// Files already known keep their tags. New files of known messages are
    /// recorded as copies and have their flag tags refreshed; new messages
    /// get `opts.new_tags` plus their flag tags. Files that have gone are
    /// forgotten, and with them any message left without a file.
    pub fn index(
        &mut self,
        root: &Path,
        opts: &IndexOptions,
    ) -> Result<IndexStats, Error> {
        let mut folders = Vec::new();
        find_maildirs(root, "", &mut folders)?;

        let mut files = Vec::new();
        for folder in &folders {
            let dir = root.join(folder);
            for entry in scan::list(&dir, opts.delim)? {
                files.push((folder.clone(), entry));
            }
        }

        let present = files
            .iter()
            .map(|&(ref folder, ref entry)| join_rel(folder, &entry.rel))
            .collect::<HashSet<_>>();
        // Known files that are no longer where we left them, by folder and
        // unique name, so renames made outside our control can be followed.
        let mut missing = self
            .by_file
            .keys()
            .filter(|f| !present.contains(*f))
            .map(|f| {
                (
                    (
                        folder_of(f).to_owned(),
                        filename::unique(f, opts.delim).to_owned(),
                    ),
                    f.clone(),
                )
            })
            .collect::<HashMap<_, _>>();

        let mut stats = IndexStats::default();
        let mut progress = Progress::new("Indexing", files.len());
        for (n, &(ref folder, ref entry)) in files.iter().enumerate() {
            interrupt::check()?;
            progress.update(n + 1);

            let rel = join_rel(folder, &entry.rel);
            if self.by_file.contains_key(&rel) {
                continue;
            }

            let key = (folder.clone(), entry.unique.clone());
            if let Some(old) = missing.remove(&key) {
                self.rename_filename(&old, &rel);
                if let Some(id) = self.by_file.get(&rel).cloned() {
                    self.sync_flag_tags(&id, &opts.names, &entry.flags);
                }
                stats.renamed += 1;
                continue;
            }

            let email = match scan::load(&root.join(folder), entry, false) {
                Ok(email) => email,
                Err(Error::Io(ref e)) if io::ErrorKind::NotFound == e.kind() => {
                    debug!("{} vanished during indexing", rel);
                    continue;
                }
                Err(e) => return Err(e),
            };

            let mut tags = BTreeSet::new();
            if !self.messages.contains_key(&email.id) {
                tags.extend(opts.new_tags.iter().cloned());
            }
            opts.names.sync_from_flags(&entry.flags, &mut tags);

            let msg = StoredMessage::from_email(&email, rel, tags);
            if self.add(msg) {
                stats.added += 1;
            } else {
                stats.duplicates += 1;
            }
        }

        for file in missing.into_iter().map(|(_, f)| f) {
            if RemoveStatus::Removed == self.remove_filename(&file) {
                stats.removed += 1;
            }
        }

        self.rethread();
        info!(
            "Indexed {}: {} added, {} copies, {} renamed, {} removed",
            root.display(),
            stats.added,
            stats.duplicates,
            stats.renamed,
            stats.removed
        );
        Ok(stats)
    }
}

/// The path of `rel` within `folder`, relative to the root.
pub fn join_rel(folder: &str, rel: &str) -> String {
    if folder.is_empty() {
        rel.to_owned()
    } else {
        format!("{}/{}", folder, rel)
    }
}

/// Collect every maildir under `root/rel`, relative to `root`.
fn find_maildirs(
    root: &Path,
    rel: &str,
    out: &mut Vec<String>,
) -> Result<(), Error> {
    let dir = root.join(rel);
    if crate::maildir::probe(&dir.to_string_lossy()) {
        out.push(rel.to_owned());
    }

    let mut subdirs = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let entry = entry?;
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(_) => continue,
        };
        if name.starts_with('.')
            || "cur" == name
            || "new" == name
            || "tmp" == name
            || !entry.file_type()?.is_dir()
        {
            continue;
        }
        subdirs.push(join_rel(rel, &name));
    }
    subdirs.sort();
    for sub in subdirs {
        find_maildirs(root, &sub, out)?;
    }
    Ok(())
}

/// The database of one root, shared by every mailbox opened on it.
///
/// The database is loaded on demand and written back when a guard that
/// modified it is released. Between `longrun_init` and `longrun_done` it
/// stays loaded and unwritten, so a batch of operations costs one load and
/// one save.
#[derive(Debug)]
pub struct DbHandle {
    root: PathBuf,
    db: RefCell<Database>,
    loaded: Cell<Option<Option<SystemTime>>>,
    dirty: Cell<bool>,
    longrun: Cell<u32>,
}

impl DbHandle {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DbHandle {
            root: root.into(),
            db: RefCell::new(Database::new()),
            loaded: Cell::new(None),
            dirty: Cell::new(false),
            longrun: Cell::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn mtime(&self) -> Result<Option<SystemTime>, Error> {
        Database::mtime(&self.root)
    }

    /// Borrow the database, loading it if it changed on disk since it was
    /// last read.
    pub fn open(&self) -> Result<DbGuard<'_>, Error> {
        let mut db = self
            .db
            .try_borrow_mut()
            .map_err(|_| Error::Locked)?;

        let on_disk = self.mtime()?;
        let stale = match self.loaded.get() {
            None => true,
            Some(loaded) => 0 == self.longrun.get() && loaded != on_disk,
        };
        if stale {
            if self.dirty.get() {
                warn!(
                    "{}: discarding unsaved changes; the database changed \
                     on disk",
                    self.root.display()
                );
            }
            *db = Database::load(&self.root)?;
            self.loaded.set(Some(on_disk));
            self.dirty.set(false);
        }

        Ok(DbGuard {
            handle: self,
            db,
            released: false,
        })
    }

    pub fn longrun_init(&self) {
        self.longrun.set(self.longrun.get() + 1);
    }

    pub fn is_longrun(&self) -> bool {
        self.longrun.get() > 0
    }

    /// End a batch, writing the database if anything changed.
    pub fn longrun_done(&self) -> Result<(), Error> {
        let depth = self.longrun.get().saturating_sub(1);
        self.longrun.set(depth);
        if 0 == depth && self.dirty.get() {
            let db = self.db.try_borrow().map_err(|_| Error::Locked)?;
            self.flush(&db)?;
        }
        Ok(())
    }

    fn flush(&self, db: &Database) -> Result<(), Error> {
        db.save(&self.root)?;
        self.dirty.set(false);
        self.loaded.set(Some(self.mtime()?));
        Ok(())
    }
}

/// Access to a loaded database. Any mutable access marks it for writing,
/// which happens on `release` or, failing that, on drop.
pub struct DbGuard<'a> {
    handle: &'a DbHandle,
    db: RefMut<'a, Database>,
    released: bool,
}

impl<'a> DbGuard<'a> {
    /// Write back any changes, unless inside a batch.
    pub fn release(mut self) -> Result<(), Error> {
        self.released = true;
        if self.handle.dirty.get() && !self.handle.is_longrun() {
            self.handle.flush(&self.db)?;
        }
        Ok(())
    }
}

impl<'a> Deref for DbGuard<'a> {
    type Target = Database;

    fn deref(&self) -> &Database {
        &self.db
    }
}

impl<'a> DerefMut for DbGuard<'a> {
    fn deref_mut(&mut self) -> &mut Database {
        self.handle.dirty.set(true);
        &mut self.db
    }
}

impl<'a> Drop for DbGuard<'a> {
    fn drop(&mut self) {
        if !self.released
            && self.handle.dirty.get()
            && !self.handle.is_longrun()
        {
            if let Err(e) = self.handle.flush(&self.db) {
                error!(
                    "{}: failed to write tag database: {}",
                    self.handle.root.display(),
                    e
                );
            }
        }
    }
}

#[cfg(test)]
pub(super) mod test {
    use tempfile::TempDir;

    use super::*;
    use crate::support::chronox::NaiveDateX;
    use crate::tagdb::query;

    pub fn deliver(root: &Path, rel: &str, headers: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        for sub in &["cur", "new", "tmp"] {
            fs::create_dir_all(path.parent().unwrap().parent().unwrap().join(sub))
                .unwrap();
        }
        fs::write(path, format!("{}\r\n\r\nbody\r\n", headers)).unwrap();
    }

    /// Three messages in two threads across two folders.
    pub fn populate(root: &Path) {
        deliver(
            root,
            "inbox/cur/1.a:2,S",
            "Message-ID: <a@x>\r\nFrom: Jo <jo@x>\r\nSubject: Lunch\r\n\
             Date: Mon, 2 Mar 2020 10:00:00 +0000",
        );
        deliver(
            root,
            "inbox/new/2.b",
            "Message-ID: <b@x>\r\nFrom: Al <al@x>\r\nSubject: Re: Lunch\r\n\
             In-Reply-To: <a@x>\r\nDate: Tue, 3 Mar 2020 10:00:00 +0000",
        );
        deliver(
            root,
            "lists/rust/cur/3.c:2,F",
            "Message-ID: <c@x>\r\nFrom: Bo <bo@x>\r\nSubject: Release\r\n\
             Date: Wed, 4 Mar 2020 10:00:00 +0000",
        );
    }

    fn now() -> DateTime<Utc> {
        NaiveDate::from_ymdx(2020, 3, 10).and_hmsx_utc(0, 0, 0)
    }

    #[test]
    fn paths_split_into_folders() {
        assert_eq!("inbox", folder_of("inbox/cur/x"));
        assert_eq!("a/b", folder_of("a/b/new/x"));
        assert_eq!("", folder_of("cur/x"));
        assert_eq!(("a/b", "new/x"), split_file("a/b/new/x"));
        assert_eq!(("", "cur/x"), split_file("cur/x"));
    }

    #[test]
    fn index_and_search() {
        let root = TempDir::new().unwrap();
        populate(root.path());

        let mut db = Database::new();
        let stats = db.index(root.path(), &IndexOptions::default()).unwrap();
        assert_eq!(3, stats.added);
        assert_eq!(3, db.len());

        let a = db.get("a@x").unwrap();
        assert_eq!(Some("inbox/cur/1.a:2,S"), a.filename());
        assert!(a.tags.contains("inbox"));
        assert!(!a.tags.contains("unread"));
        let b = db.get("b@x").unwrap();
        assert!(b.tags.contains("unread"));
        assert_eq!(Some("a@x".to_owned()), b.parent);
        assert_eq!(a.thread, b.thread);
        let c = db.get("c@x").unwrap();
        assert_ne!(a.thread, c.thread);
        assert!(c.tags.contains("flagged"));
        assert_eq!(vec!["lists/rust"], c.folders().collect::<Vec<_>>());

        let all = db.search(&query::parse("*").unwrap(), &[], now());
        assert_eq!(
            vec!["c@x", "b@x", "a@x"],
            all.iter().map(|m| m.id.as_str()).collect::<Vec<_>>()
        );

        let threads =
            db.search_threads(&query::parse("from:al").unwrap(), &[], now());
        assert_eq!(1, threads.len());
        assert_eq!(
            vec!["a@x", "b@x"],
            db.thread_messages(threads[0])
                .iter()
                .map(|m| m.id.as_str())
                .collect::<Vec<_>>()
        );

        db.save(root.path()).unwrap();
        let reloaded = Database::load(root.path()).unwrap();
        assert_eq!(db.get("b@x"), reloaded.get("b@x"));
        assert_eq!(
            Some("c@x"),
            reloaded
                .find_by_filename("lists/rust/cur/3.c:2,F")
                .map(|m| m.id.as_str())
        );
    }

    #[test]
    fn excluded_tags_hide_messages() {
        let root = TempDir::new().unwrap();
        populate(root.path());
        let mut db = Database::new();
        db.index(root.path(), &IndexOptions::default()).unwrap();
        let ops = crate::email::tags::parse_tag_edit("+spam").unwrap();
        db.update_tags("c@x", &ops).unwrap();

        let excludes = vec!["spam".to_owned()];
        assert_eq!(2, db.count(&query::parse("*").unwrap(), &excludes, now()));
        assert_eq!(
            1,
            db.count(&query::parse("tag:spam").unwrap(), &excludes, now())
        );
    }

    #[test]
    fn reindex_tracks_renames_and_removals() {
        let root = TempDir::new().unwrap();
        populate(root.path());
        let mut db = Database::new();
        db.index(root.path(), &IndexOptions::default()).unwrap();
        db.update_tags("a@x", &crate::email::tags::parse_tag_edit("+keep").unwrap());

        fs::rename(
            root.path().join("inbox/cur/1.a:2,S"),
            root.path().join("inbox/cur/1.a:2,FS"),
        )
        .unwrap();
        fs::remove_file(root.path().join("lists/rust/cur/3.c:2,F")).unwrap();
        deliver(
            root.path(),
            "archive/cur/9.z:2,S",
            "Message-ID: <a@x>\r\nSubject: Lunch",
        );

        let stats = db.index(root.path(), &IndexOptions::default()).unwrap();
        assert_eq!(
            IndexStats {
                added: 0,
                duplicates: 1,
                removed: 1,
                renamed: 1,
            },
            stats
        );
        let a = db.get("a@x").unwrap();
        assert!(a.tags.contains("keep"));
        assert!(a.tags.contains("flagged"));
        assert_eq!(
            vec!["inbox/cur/1.a:2,FS", "archive/cur/9.z:2,S"],
            a.files
        );
        assert!(db.get("c@x").is_none());

        assert_eq!(RemoveStatus::Duplicate, db.remove_filename("archive/cur/9.z:2,S"));
        assert_eq!(RemoveStatus::NotFound, db.remove_filename("archive/cur/9.z:2,S"));
        assert_eq!(RemoveStatus::Removed, db.remove_filename("inbox/cur/1.a:2,FS"));
    }

    #[test]
    fn handle_saves_on_release() {
        let root = TempDir::new().unwrap();
        populate(root.path());
        let mut db = Database::new();
        db.index(root.path(), &IndexOptions::default()).unwrap();
        db.save(root.path()).unwrap();

        let handle = DbHandle::new(root.path());
        {
            let mut guard = handle.open().unwrap();
            guard.update_tags(
                "a@x",
                &crate::email::tags::parse_tag_edit("+work").unwrap(),
            );
            guard.release().unwrap();
        }
        assert!(Database::load(root.path())
            .unwrap()
            .get("a@x")
            .unwrap()
            .tags
            .contains("work"));

        handle.longrun_init();
        {
            let mut guard = handle.open().unwrap();
            guard.update_tags(
                "a@x",
                &crate::email::tags::parse_tag_edit("-work").unwrap(),
            );
            // Dropped without release; still inside the batch
        }
        assert!(Database::load(root.path())
            .unwrap()
            .get("a@x")
            .unwrap()
            .tags
            .contains("work"));
        handle.longrun_done().unwrap();
        assert!(!Database::load(root.path())
            .unwrap()
            .get("a@x")
            .unwrap()
            .tags
            .contains("work"));
    }

    #[test]
    fn missing_database_is_not_found() {
        let root = TempDir::new().unwrap();
        assert_matches!(Err(Error::NotFound(_)), Database::load(root.path()));
        assert!(DbHandle::new(root.path()).open().is_err());
    }
}
