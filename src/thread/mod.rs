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

//! Reply threading.
//!
//! A `ThreadsContext` owns an arena of thread nodes built from the reply
//! headers of a mailbox's messages. Messages point into the arena through
//! `Email::thread`; those pointers are only meaningful until the next
//! `rebuild`, so everything here revalidates them with `node_of` rather than
//! trusting them.
//!
//! The context also owns the display order of the mailbox (`linear`), which
//! is what `set_vnum` projects onto `vnum` and `v2r`. In the flat style there
//! are no nodes and the display order is just the sorted message vector.

pub mod build;
pub mod tree;
pub mod visibility;

use log::debug;

use crate::config::regex::ConfigRegex;
use crate::config::sort::SortValue;
use crate::config::{Config, ConfigDef, ConfigError, ConfigSet, Kind, ScopeId};
use crate::email::sort::{SORT_DATE, SORT_THREADS};
use crate::mailbox::acl::{check_acl, AclRights};
use crate::mailbox::Mailbox;
use crate::notify::EmailChange;
use crate::support::error::Error;

/// Index of a node in a `ThreadsContext`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

pub const USE_THREADS_UNSET: u32 = 0;
pub const USE_THREADS_FLAT: u32 = 1;
pub const USE_THREADS_THREADS: u32 = 2;
pub const USE_THREADS_REVERSE: u32 = 3;

pub const USE_THREADS_NAMES: &[(&str, u32)] = &[
    ("unset", USE_THREADS_UNSET),
    ("flat", USE_THREADS_FLAT),
    ("threads", USE_THREADS_THREADS),
    ("reverse", USE_THREADS_REVERSE),
    ("no", USE_THREADS_FLAT),
    ("yes", USE_THREADS_THREADS),
];

pub fn register(set: &mut ConfigSet) -> Result<(), ConfigError> {
    set.register_all(vec![
        ConfigDef::new("use_threads", Kind::Enum(USE_THREADS_NAMES), "unset"),
        ConfigDef::new("strict_threads", Kind::Bool, "no"),
        ConfigDef::new("duplicate_threads", Kind::Bool, "yes"),
        ConfigDef::new("hide_missing", Kind::Bool, "yes"),
        ConfigDef::new("hide_top_missing", Kind::Bool, "yes"),
        ConfigDef::new("hide_limited", Kind::Bool, "no"),
        ConfigDef::new("hide_top_limited", Kind::Bool, "no"),
        ConfigDef::new("hide_thread_subject", Kind::Bool, "yes"),
        ConfigDef::new("narrow_tree", Kind::Bool, "no"),
        ConfigDef::new("collapse_unread", Kind::Bool, "yes"),
        ConfigDef::new("collapse_flagged", Kind::Bool, "yes"),
        ConfigDef::new("uncollapse_new", Kind::Bool, "yes"),
        ConfigDef::new("uncollapse_jump", Kind::Bool, "no"),
    ])
}

/// How the view arranges messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadStyle {
    /// No threading; messages in `sort` order.
    Flat,
    /// Threads in `sort` order, each root above its replies.
    Threads,
    /// Threads in the opposite order to `Threads`.
    Reverse,
}

impl ThreadStyle {
    /// The style in effect for `use_threads`. When that is unset, sorting
    /// by `threads` (or `reverse-threads`) selects threading.
    pub fn resolve(use_threads: u32, sort: SortValue) -> Self {
        match use_threads {
            USE_THREADS_FLAT => ThreadStyle::Flat,
            USE_THREADS_THREADS => ThreadStyle::Threads,
            USE_THREADS_REVERSE => ThreadStyle::Reverse,
            _ if SORT_THREADS == sort.method && sort.reverse => {
                ThreadStyle::Reverse
            }
            _ if SORT_THREADS == sort.method => ThreadStyle::Threads,
            _ => ThreadStyle::Flat,
        }
    }

    pub fn is_threaded(self) -> bool {
        ThreadStyle::Flat != self
    }
}

/// The configuration the threading engine works from, captured so that a
/// rebuild sees one consistent snapshot.
#[derive(Clone, Debug)]
pub struct ThreadSettings {
    pub style: ThreadStyle,
    pub sort: SortValue,
    pub sort_aux: SortValue,
    pub strict: bool,
    pub duplicates: bool,
    pub hide_missing: bool,
    pub hide_top_missing: bool,
    pub hide_limited: bool,
    pub hide_top_limited: bool,
    pub hide_thread_subject: bool,
    pub narrow_tree: bool,
    pub collapse_unread: bool,
    pub collapse_flagged: bool,
    pub reply_regex: Option<ConfigRegex>,
}

impl Default for ThreadSettings {
    fn default() -> Self {
        ThreadSettings {
            style: ThreadStyle::Threads,
            sort: SortValue::new(SORT_DATE),
            sort_aux: SortValue::new(SORT_DATE),
            strict: false,
            duplicates: true,
            hide_missing: true,
            hide_top_missing: true,
            hide_limited: false,
            hide_top_limited: false,
            hide_thread_subject: true,
            narrow_tree: false,
            collapse_unread: true,
            collapse_flagged: true,
            reply_regex: None,
        }
    }
}

impl ThreadSettings {
    pub fn from_config(
        config: &Config,
        scope: ScopeId,
    ) -> Result<Self, ConfigError> {
        let sort = config.get_sort(scope, "sort")?;
        let flag = |name: &str| config.get_bool(scope, name);
        Ok(ThreadSettings {
            style: ThreadStyle::resolve(
                config.get_enum(scope, "use_threads")?,
                sort,
            ),
            sort,
            sort_aux: config.get_sort(scope, "sort_aux")?,
            strict: flag("strict_threads")?,
            duplicates: flag("duplicate_threads")?,
            hide_missing: flag("hide_missing")?,
            hide_top_missing: flag("hide_top_missing")?,
            hide_limited: flag("hide_limited")?,
            hide_top_limited: flag("hide_top_limited")?,
            hide_thread_subject: flag("hide_thread_subject")?,
            narrow_tree: flag("narrow_tree")?,
            collapse_unread: flag("collapse_unread")?,
            collapse_flagged: flag("collapse_flagged")?,
            reply_regex: config.get_regex(scope, "reply_regex")?,
        })
    }
}

/// One node of a thread tree.
#[derive(Clone, Debug, Default)]
pub struct Node {
    /// The message at this node; `None` for a placeholder standing in for a
    /// message that is referenced but not present.
    pub message: Option<usize>,
    pub parent: Option<NodeId>,
    /// In `sort_aux` order once the tree is sorted.
    pub children: Vec<NodeId>,
    /// A second copy of its parent's message.
    pub duplicate: bool,
    /// Attached to its parent by subject alone.
    pub fake: bool,
}

/// What `traverse` computes over the thread containing a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Traverse {
    /// Collapse the thread; yields the message left in view.
    Collapse,
    /// Expand the thread; yields the message the cursor should stay on.
    Uncollapse,
    /// Yields 2 if some message is new, 1 if some is unread but all unread
    /// ones are old, 0 otherwise.
    ContainsUnread,
    /// Yields 1 if some message is flagged.
    ContainsFlagged,
    /// Yields the first unread message in thread order.
    NextUnread,
}

#[derive(Debug, Default)]
pub struct ThreadsContext {
    settings: ThreadSettings,
    nodes: Vec<Node>,
    /// Top-level nodes in display order.
    roots: Vec<NodeId>,
    /// Every message index, in display order.
    linear: Vec<usize>,
}

impl ThreadsContext {
    pub fn new(settings: ThreadSettings) -> Self {
        ThreadsContext {
            settings,
            ..ThreadsContext::default()
        }
    }

    pub fn settings(&self) -> &ThreadSettings {
        &self.settings
    }

    /// Replace the settings. Takes effect on the next `rebuild`.
    pub fn set_settings(&mut self, settings: ThreadSettings) {
        self.settings = settings;
    }

    pub fn is_threaded(&self) -> bool {
        self.settings.style.is_threaded()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Every message index in display order, including hidden ones.
    pub fn linear(&self) -> &[usize] {
        &self.linear
    }

    /// Forget the tree, detaching every message from it.
    pub fn clear(&mut self, m: &mut Mailbox) {
        self.nodes.clear();
        self.roots.clear();
        self.linear.clear();
        for e in &mut m.emails {
            e.thread = None;
            e.tree.clear();
            e.depth = 0;
        }
    }

    /// Sort and thread `m` from scratch and renumber the view.
    ///
    /// With `full_init`, per-message thread state carried over from the
    /// previous tree (collapse marks) is discarded too.
    pub fn rebuild(
        &mut self,
        m: &mut Mailbox,
        full_init: bool,
    ) -> Result<(), Error> {
        if full_init {
            for e in &mut m.emails {
                e.collapsed = false;
            }
        }
        self.clear(m);

        if self.is_threaded() {
            if let Err(e) = self.assemble(m).and_then(|()| self.sort_tree(m)) {
                // Leave an unthreaded view in arrival order behind
                self.clear(m);
                self.linear = (0..m.len()).collect();
                self.set_vnum(m);
                return Err(e);
            }
            for (ix, node) in self.nodes.iter().enumerate() {
                if let Some(msg) = node.message {
                    m.emails[msg].thread = Some(NodeId(ix));
                }
            }
        } else {
            self.sort_flat(m);
        }

        self.set_vnum(m);
        debug!(
            "{} Sorted {} messages into {} threads",
            m.log_prefix,
            m.len(),
            if self.is_threaded() {
                self.roots.len()
            } else {
                m.len()
            }
        );
        Ok(())
    }

    /// The node of the message at `index`, if it is in this tree.
    pub fn node_of(&self, m: &Mailbox, index: usize) -> Option<NodeId> {
        let id = m.emails.get(index)?.thread?;
        if self.nodes.get(id.0)?.message == Some(index) {
            Some(id)
        } else {
            None
        }
    }

    fn root_of(&self, mut id: NodeId) -> NodeId {
        while let Some(parent) = self.nodes[id.0].parent {
            id = parent;
        }
        id
    }

    /// The messages of the subtree at `id`, in display order.
    fn subtree_messages(&self, id: NodeId) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            let node = &self.nodes[n.0];
            if let Some(ix) = node.message {
                out.push(ix);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    /// The messages of the thread containing `index`, in display order.
    /// Outside threading every message is a thread of its own.
    pub fn thread_of(&self, m: &Mailbox, index: usize) -> Vec<usize> {
        match self.node_of(m, index) {
            Some(id) => self.subtree_messages(self.root_of(id)),
            None => vec![index],
        }
    }

    /// The messages below `index` in its thread, in display order.
    pub fn descendants(&self, m: &Mailbox, index: usize) -> Vec<usize> {
        match self.node_of(m, index) {
            Some(id) => self
                .subtree_messages(id)
                .into_iter()
                .filter(|&ix| ix != index)
                .collect(),
            None => Vec::new(),
        }
    }

    /// `(contains_unread, contains_flagged)` over `messages`.
    fn aggregates(m: &Mailbox, messages: &[usize]) -> (u8, bool) {
        let mut unread = 0;
        let mut flagged = false;
        for &ix in messages {
            let e = &m.emails[ix];
            if e.is_new() {
                unread = 2;
            } else if !e.read && 0 == unread {
                unread = 1;
            }
            flagged |= e.flagged;
        }
        (unread, flagged)
    }

    pub fn contains_unread(&self, m: &Mailbox, index: usize) -> u8 {
        Self::aggregates(m, &self.thread_of(m, index)).0
    }

    pub fn contains_flagged(&self, m: &Mailbox, index: usize) -> bool {
        Self::aggregates(m, &self.thread_of(m, index)).1
    }

    fn can_collapse_messages(&self, m: &Mailbox, messages: &[usize]) -> bool {
        let (unread, flagged) = Self::aggregates(m, messages);
        (self.settings.collapse_unread || 0 == unread)
            && (self.settings.collapse_flagged || !flagged)
    }

    /// Whether `collapse_unread` and `collapse_flagged` allow the thread of
    /// `index` to be collapsed.
    pub fn can_collapse(&self, m: &Mailbox, index: usize) -> bool {
        self.can_collapse_messages(m, &self.thread_of(m, index))
    }

    pub fn is_collapsed(&self, m: &Mailbox, index: usize) -> bool {
        self.is_threaded()
            && self
                .thread_of(m, index)
                .iter()
                .any(|&ix| m.emails[ix].collapsed)
    }

    /// Collapse the thread of `index`, returning the message left in view.
    pub fn collapse_thread(
        &mut self,
        m: &mut Mailbox,
        index: usize,
    ) -> Option<usize> {
        let thread = self.thread_of(m, index);
        for &ix in &thread {
            m.emails[ix].collapsed = true;
        }
        self.set_vnum(m);
        thread.into_iter().find(|&ix| m.emails[ix].vnum.is_some())
    }

    /// Expand the thread of `index`, returning `index` if it is now in view
    /// or else the first message of the thread that is.
    pub fn uncollapse_thread(
        &mut self,
        m: &mut Mailbox,
        index: usize,
    ) -> Option<usize> {
        let thread = self.thread_of(m, index);
        for &ix in &thread {
            m.emails[ix].collapsed = false;
        }
        self.set_vnum(m);
        if m.emails[index].vnum.is_some() {
            Some(index)
        } else {
            thread.into_iter().find(|&ix| m.emails[ix].vnum.is_some())
        }
    }

    /// The first unread message of the thread of `index`.
    pub fn next_unread(&self, m: &Mailbox, index: usize) -> Option<usize> {
        self.thread_of(m, index)
            .into_iter()
            .find(|&ix| !m.emails[ix].read)
    }

    pub fn traverse(
        &mut self,
        m: &mut Mailbox,
        index: usize,
        op: Traverse,
    ) -> Option<usize> {
        match op {
            Traverse::Collapse => self.collapse_thread(m, index),
            Traverse::Uncollapse => self.uncollapse_thread(m, index),
            Traverse::ContainsUnread => {
                Some(usize::from(self.contains_unread(m, index)))
            }
            Traverse::ContainsFlagged => {
                Some(usize::from(self.contains_flagged(m, index)))
            }
            Traverse::NextUnread => self.next_unread(m, index),
        }
    }

    /// Collapse (or expand) every thread. Threads held open by
    /// `collapse_unread` or `collapse_flagged` are left expanded.
    pub fn collapse_all(&mut self, m: &mut Mailbox, collapse: bool) {
        if !self.is_threaded() {
            return;
        }

        for &root in &self.roots {
            let thread = self.subtree_messages(root);
            let on = collapse && self.can_collapse_messages(m, &thread);
            for ix in thread {
                m.emails[ix].collapsed = on;
            }
        }
        self.set_vnum(m);
    }

    /// Re-apply the collapse marks carried by the messages, spreading a
    /// mark on any message of a thread to the whole thread.
    pub fn collapse_collapsed(&mut self, m: &mut Mailbox) {
        for &root in &self.roots {
            let thread = self.subtree_messages(root);
            if thread.iter().any(|&ix| m.emails[ix].collapsed) {
                for ix in thread {
                    m.emails[ix].collapsed = true;
                }
            }
        }
        self.set_vnum(m);
    }

    /// The message `index` replies to, or with `find_root` the top message
    /// of its thread (which may be `index` itself).
    pub fn parent_message(
        &self,
        m: &Mailbox,
        index: usize,
        find_root: bool,
    ) -> Option<usize> {
        let mut cur = self.node_of(m, index)?;
        let mut top = index;
        while let Some(parent) = self.nodes[cur.0].parent {
            cur = parent;
            if let Some(ix) = self.nodes[parent.0].message {
                if !find_root {
                    return Some(ix);
                }
                top = ix;
            }
        }

        if find_root {
            Some(top)
        } else {
            None
        }
    }

    fn first_vnum(&self, m: &Mailbox, id: NodeId) -> Option<usize> {
        self.subtree_messages(id)
            .into_iter()
            .find_map(|ix| m.emails[ix].vnum)
    }

    /// The view position of the next (or previous) thread, or with
    /// `subthreads` the next (or previous) subthread.
    ///
    /// Moving backwards first goes to the top of the current thread or
    /// subthread if the cursor is not already there.
    pub fn aside(
        &self,
        m: &Mailbox,
        index: usize,
        forward: bool,
        subthreads: bool,
    ) -> Option<usize> {
        let node = self.node_of(m, index)?;
        let here = m.emails[index].vnum;

        if !subthreads {
            let root = self.root_of(node);
            let pos = self.roots.iter().position(|&r| r == root)?;
            return if forward {
                self.roots[pos + 1..]
                    .iter()
                    .find_map(|&r| self.first_vnum(m, r))
            } else {
                match self.first_vnum(m, root) {
                    Some(top) if Some(top) < here => Some(top),
                    _ => self.roots[..pos]
                        .iter()
                        .rev()
                        .find_map(|&r| self.first_vnum(m, r)),
                }
            };
        }

        if forward {
            let mut cur = node;
            loop {
                let parent = self.nodes[cur.0].parent;
                let siblings = self.siblings(parent);
                let pos = siblings.iter().position(|&s| s == cur)?;
                if let Some(v) = siblings[pos + 1..]
                    .iter()
                    .find_map(|&s| self.first_vnum(m, s))
                {
                    return Some(v);
                }
                cur = parent?;
            }
        } else {
            let parent = self.nodes[node.0].parent;
            let siblings = self.siblings(parent);
            let pos = siblings.iter().position(|&s| s == node)?;
            siblings[..pos]
                .iter()
                .rev()
                .find_map(|&s| self.first_vnum(m, s))
                .or_else(|| {
                    let mut cur = parent;
                    while let Some(p) = cur {
                        let v = self.nodes[p.0]
                            .message
                            .and_then(|ix| m.emails[ix].vnum);
                        if v.is_some() {
                            return v;
                        }
                        cur = self.nodes[p.0].parent;
                    }
                    None
                })
        }
    }

    fn siblings(&self, parent: Option<NodeId>) -> &[NodeId] {
        match parent {
            Some(p) => &self.nodes[p.0].children,
            None => &self.roots,
        }
    }

    /// The number of messages in the thread of `index`, or with `position`
    /// the 1-based position of `index` within it.
    pub fn messages_in_thread(
        &self,
        m: &Mailbox,
        index: usize,
        position: bool,
    ) -> usize {
        let thread = self.thread_of(m, index);
        if position {
            thread.iter().position(|&ix| ix == index).map_or(0, |p| p + 1)
        } else {
            thread.len()
        }
    }

    /// Detach `index` from its parent. Replies below it stay with it. The
    /// caller rebuilds the threads afterwards.
    pub fn break_thread(
        &self,
        m: &mut Mailbox,
        index: usize,
    ) -> Result<(), Error> {
        check_writable(m, "Breaking threads")?;
        let e = m
            .emails
            .get(index)
            .ok_or_else(|| Error::NotFound(format!("message {}", index)))?;
        let ancestors: Vec<String> =
            e.env.ancestry().into_iter().map(str::to_owned).collect();
        if ancestors.is_empty() {
            return Ok(());
        }

        let mut changed = vec![index];
        m.emails[index].env.clear_parent();
        m.emails[index].changed = true;

        // Replies must not re-link through the ids just removed
        for ix in self.descendants(m, index) {
            let env = &mut m.emails[ix].env;
            let before = env.references.len() + env.in_reply_to.len();
            env.references.retain(|r| !ancestors.contains(r));
            env.in_reply_to.retain(|r| !ancestors.contains(r));
            if before != env.references.len() + env.in_reply_to.len() {
                env.changed |= crate::email::envelope::EnvelopeChanged::REFERENCES
                    | crate::email::envelope::EnvelopeChanged::IN_REPLY_TO;
                m.emails[ix].changed = true;
                changed.push(ix);
            }
        }

        m.changed = true;
        m.post_email(EmailChange::Change, changed);
        Ok(())
    }
}

fn check_writable(m: &Mailbox, action: &str) -> Result<(), Error> {
    if m.readonly {
        return Err(Error::AclDenied);
    }
    check_acl(m.rights, AclRights::WRITE, action)
}

/// Make each of `children` a reply to `parent`, merging their threads into
/// the parent's. Returns whether any message changed; the caller rebuilds
/// the threads afterwards.
pub fn link_threads(
    m: &mut Mailbox,
    parent: usize,
    children: &[usize],
) -> Result<bool, Error> {
    check_writable(m, "Linking threads")?;
    let parent_id = m
        .emails
        .get(parent)
        .ok_or_else(|| Error::NotFound(format!("message {}", parent)))?
        .id
        .clone();
    if parent_id.is_empty() {
        return Err(Error::InvalidValue(
            "Parent message has no Message-ID".to_owned(),
        ));
    }

    let mut changed = Vec::new();
    for &child in children {
        if child == parent {
            continue;
        }
        let e = m
            .emails
            .get_mut(child)
            .ok_or_else(|| Error::NotFound(format!("message {}", child)))?;
        if e.env.parent_id() == Some(parent_id.as_str()) {
            continue;
        }
        e.env.set_parent(&parent_id);
        e.changed = true;
        changed.push(child);
    }

    if changed.is_empty() {
        return Ok(false);
    }
    debug!(
        "{} Linked {} messages to {}",
        m.log_prefix,
        changed.len(),
        parent_id
    );
    m.changed = true;
    m.post_email(EmailChange::Change, changed);
    Ok(true)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::config::ItemFlags;
    use crate::mailbox::test_support::mailbox;

    /// Messages `n@test` where each `(child, parent)` pair makes `child`
    /// reply to `parent`.
    pub fn threaded_mailbox(n: usize, replies: &[(usize, usize)]) -> Mailbox {
        let mut m = mailbox(n);
        for &(child, parent) in replies {
            m.emails[child].env.references = vec![format!("{}@test", parent)];
        }
        m
    }

    pub fn reply_regex() -> ConfigRegex {
        ConfigRegex::compile(
            r"^((re|aw|sv)(\[[0-9]+\])*:[ \t]*)*",
            ItemFlags::REGEX_NOSUB,
        )
        .unwrap()
    }

    pub fn threads(m: &mut Mailbox, settings: ThreadSettings) -> ThreadsContext {
        let mut t = ThreadsContext::new(settings);
        t.rebuild(m, true).unwrap();
        assert!(m.verify());
        t
    }

    pub fn depths(m: &Mailbox) -> Vec<usize> {
        m.v2r.iter().map(|&ix| m.emails[ix].depth).collect()
    }

    pub fn trees(m: &Mailbox) -> Vec<&str> {
        m.v2r.iter().map(|&ix| m.emails[ix].tree.as_str()).collect()
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::test_support::*;
    use super::*;
    use crate::email::sort::SORT_SIZE;
    use crate::mailbox::test_support::mailbox;

    /// A(0), B(1) replying to A, C(2) replying to B, D(3) alone.
    fn abcd() -> Mailbox {
        threaded_mailbox(4, &[(1, 0), (2, 1)])
    }

    #[test]
    fn threads_linearise_root_first() {
        let mut m = abcd();
        let t = threads(&mut m, ThreadSettings::default());
        assert_eq!(vec![0, 1, 2, 3], m.v2r);
        assert_eq!(vec![0, 1, 2, 0], depths(&m));
        assert_eq!(vec!["", "└─>", "  └─>", ""], trees(&m));
        assert_eq!(2, t.roots().len());
        assert_eq!(3, t.messages_in_thread(&m, 2, false));
        assert_eq!(3, t.messages_in_thread(&m, 2, true));
        assert_eq!(1, t.messages_in_thread(&m, 3, false));
    }

    #[test]
    fn reverse_threads_put_newest_thread_first() {
        let mut m = abcd();
        threads(
            &mut m,
            ThreadSettings {
                style: ThreadStyle::Reverse,
                ..ThreadSettings::default()
            },
        );
        assert_eq!(vec![3, 0, 1, 2], m.v2r);
        assert_eq!(vec![0, 0, 1, 2], depths(&m));
    }

    #[test]
    fn style_resolution() {
        let threads = SortValue::new(SORT_THREADS);
        let date = SortValue::new(SORT_DATE);
        assert_eq!(ThreadStyle::Flat, ThreadStyle::resolve(0, date));
        assert_eq!(ThreadStyle::Threads, ThreadStyle::resolve(0, threads));
        assert_eq!(
            ThreadStyle::Reverse,
            ThreadStyle::resolve(
                0,
                SortValue {
                    reverse: true,
                    ..threads
                }
            )
        );
        assert_eq!(ThreadStyle::Flat, ThreadStyle::resolve(1, threads));
        assert_eq!(ThreadStyle::Reverse, ThreadStyle::resolve(3, date));
    }

    #[test]
    fn flat_style_sorts_without_threading() {
        let mut m = abcd();
        m.emails[0].size = 30;
        m.emails[1].size = 10;
        m.emails[2].size = 20;
        m.emails[3].size = 10;
        let t = threads(
            &mut m,
            ThreadSettings {
                style: ThreadStyle::Flat,
                sort: SortValue::new(SORT_SIZE),
                ..ThreadSettings::default()
            },
        );
        assert_eq!(vec![1, 3, 2, 0], m.v2r);
        assert_eq!(vec![0, 0, 0, 0], depths(&m));
        assert!(m.emails.iter().all(|e| e.thread.is_none()));
        assert_eq!(None, t.parent_message(&m, 2, false));
        assert_eq!(1, t.messages_in_thread(&m, 2, false));
    }

    #[test]
    fn missing_parents_group_replies() {
        let mut m = mailbox(3);
        m.emails[1].env.references = vec!["gone@test".to_owned()];
        m.emails[2].env.references = vec!["gone@test".to_owned()];

        let t = threads(&mut m, ThreadSettings::default());
        assert_eq!(vec![0, 1, 2], m.v2r);
        assert_eq!(vec![0, 0, 0], depths(&m));
        assert_eq!(2, t.messages_in_thread(&m, 1, false));
        assert_eq!(Some(2), t.parent_message(&m, 2, true));
        assert_eq!(None, t.parent_message(&m, 2, false));

        threads(
            &mut m,
            ThreadSettings {
                hide_missing: false,
                hide_top_missing: false,
                ..ThreadSettings::default()
            },
        );
        assert_eq!(vec![0, 1, 1], depths(&m));
        assert_eq!(vec!["", "├?>", "└?>"], trees(&m));
    }

    #[test]
    fn missing_middle_keeps_chain() {
        let mut m = mailbox(2);
        m.emails[1].env.references =
            vec!["0@test".to_owned(), "gone@test".to_owned()];
        let t = threads(&mut m, ThreadSettings::default());
        assert_eq!(vec![0, 1], depths(&m));
        assert_eq!(Some(0), t.parent_message(&m, 1, false));
    }

    #[test]
    fn duplicates_hang_under_first_copy() {
        let mut m = mailbox(3);
        m.emails[2].id = "0@test".to_owned();
        m.rehash();

        let t = threads(&mut m, ThreadSettings::default());
        assert_eq!(vec![0, 2, 1], m.v2r);
        assert_eq!(vec!["", "└=>", ""], trees(&m));
        assert_eq!(Some(0), t.parent_message(&m, 2, false));

        let t = threads(
            &mut m,
            ThreadSettings {
                duplicates: false,
                ..ThreadSettings::default()
            },
        );
        assert_eq!(vec![0, 1, 2], m.v2r);
        assert_eq!(3, t.roots().len());
    }

    #[test]
    fn subjects_join_threads_unless_strict() {
        let mut m = mailbox(3);
        m.emails[0].env.subject = Some("lunch".to_owned());
        m.emails[1].env.subject = Some("other".to_owned());
        m.emails[2].env.subject = Some("Re: lunch".to_owned());

        let loose = ThreadSettings {
            reply_regex: Some(reply_regex()),
            ..ThreadSettings::default()
        };
        threads(&mut m, loose.clone());
        assert_eq!(vec![0, 2, 1], m.v2r);
        assert_eq!(vec!["", "└*>", ""], trees(&m));
        // Same subject as the parent, so not repeated
        assert!(!m.emails[2].display_subject);
        assert!(!m.emails[2].subject_changed);
        assert!(m.emails[0].display_subject);

        threads(
            &mut m,
            ThreadSettings {
                strict: true,
                ..loose
            },
        );
        assert_eq!(vec![0, 1, 2], m.v2r);
        assert!(m.emails[2].display_subject);
    }

    #[test]
    fn narrow_tree_drops_padding() {
        let mut m = threaded_mailbox(4, &[(1, 0), (2, 1), (3, 0)]);
        threads(&mut m, ThreadSettings::default());
        assert_eq!(vec!["", "├─>", "│ └─>", "└─>"], trees(&m));

        threads(
            &mut m,
            ThreadSettings {
                narrow_tree: true,
                ..ThreadSettings::default()
            },
        );
        assert_eq!(vec!["", "├>", "│└>", "└>"], trees(&m));
    }

    #[test]
    fn replies_sort_by_aux() {
        let mut m = threaded_mailbox(4, &[(1, 0), (2, 0), (3, 0)]);
        m.emails[1].received = 30;
        m.emails[2].received = 10;
        m.emails[3].received = 20;
        threads(&mut m, ThreadSettings::default());
        assert_eq!(vec![0, 2, 3, 1], m.v2r);

        threads(
            &mut m,
            ThreadSettings {
                sort_aux: SortValue {
                    reverse: true,
                    ..SortValue::new(SORT_DATE)
                },
                ..ThreadSettings::default()
            },
        );
        assert_eq!(vec![0, 1, 3, 2], m.v2r);
    }

    #[test]
    fn last_sort_orders_threads_by_newest_message() {
        // Thread A(0) has a late reply C(2); B(1) is alone
        let mut m = threaded_mailbox(3, &[(2, 0)]);
        m.emails[2].received = 100;
        threads(&mut m, ThreadSettings::default());
        assert_eq!(vec![0, 2, 1], m.v2r);

        threads(
            &mut m,
            ThreadSettings {
                sort: SortValue {
                    last: true,
                    ..SortValue::new(SORT_DATE)
                },
                ..ThreadSettings::default()
            },
        );
        assert_eq!(vec![1, 0, 2], m.v2r);
    }

    #[test]
    fn reference_cycles_are_broken() {
        let mut m = threaded_mailbox(2, &[(0, 1), (1, 0)]);
        let t = threads(&mut m, ThreadSettings::default());
        assert_eq!(2, m.vcount());
        assert_eq!(1, t.roots().len());
    }

    #[test]
    fn collapse_and_expand() {
        let mut m = abcd();
        let mut t = threads(&mut m, ThreadSettings::default());

        assert_eq!(Some(0), t.traverse(&mut m, 2, Traverse::Collapse));
        assert!(m.verify());
        assert_eq!(vec![0, 3], m.v2r);
        assert_eq!(2, m.emails[0].num_hidden);
        assert!(t.is_collapsed(&m, 1));
        assert!(!t.is_collapsed(&m, 3));

        // Collapse marks survive a rebuild
        t.rebuild(&mut m, false).unwrap();
        assert_eq!(vec![0, 3], m.v2r);

        assert_eq!(Some(2), t.traverse(&mut m, 2, Traverse::Uncollapse));
        assert_eq!(vec![0, 1, 2, 3], m.v2r);
        assert_eq!(0, m.emails[0].num_hidden);

        t.collapse_thread(&mut m, 0);
        t.rebuild(&mut m, true).unwrap();
        assert_eq!(4, m.vcount());
    }

    #[test]
    fn collapse_all_respects_unread_and_flagged() {
        let mut m = abcd();
        let mut t = threads(
            &mut m,
            ThreadSettings {
                collapse_unread: false,
                ..ThreadSettings::default()
            },
        );

        assert!(!t.can_collapse(&m, 0));
        t.collapse_all(&mut m, true);
        assert_eq!(4, m.vcount());

        for ix in 0..3 {
            m.emails[ix].read = true;
        }
        m.emails[2].flagged = true;
        assert!(t.can_collapse(&m, 0));
        t.collapse_all(&mut m, true);
        assert_eq!(vec![0, 3], m.v2r);

        t.set_settings(ThreadSettings {
            collapse_flagged: false,
            ..t.settings().clone()
        });
        t.collapse_all(&mut m, false);
        assert_eq!(4, m.vcount());
        t.collapse_all(&mut m, true);
        assert_eq!(4, m.vcount());
    }

    #[test]
    fn collapse_collapsed_spreads_marks() {
        let mut m = abcd();
        let mut t = threads(&mut m, ThreadSettings::default());
        m.emails[2].collapsed = true;
        t.collapse_collapsed(&mut m);
        assert!(m.emails[0].collapsed);
        assert_eq!(vec![0, 3], m.v2r);
    }

    #[test]
    fn limited_root_is_replaced_in_collapsed_thread() {
        let mut m = abcd();
        m.emails[0].limited = false;
        m.emails[0].visible = false;
        let mut t = threads(&mut m, ThreadSettings::default());
        assert_eq!(vec![1, 2, 3], m.v2r);
        assert_eq!(vec!["└&>", "  └─>", ""], trees(&m));
        assert_eq!(0, m.emails[0].num_hidden);

        assert_eq!(Some(1), t.collapse_thread(&mut m, 2));
        assert_eq!(vec![1, 3], m.v2r);
        assert_eq!(2, m.emails[1].num_hidden);

        t.uncollapse_thread(&mut m, 2);
        threads(
            &mut m,
            ThreadSettings {
                hide_limited: true,
                ..ThreadSettings::default()
            },
        );
        assert_eq!(vec![0, 1, 0], depths(&m));
    }

    #[test]
    fn unread_and_flagged_aggregates() {
        let mut m = abcd();
        let mut t = threads(&mut m, ThreadSettings::default());
        assert_eq!(2, t.contains_unread(&m, 0));
        for ix in 0..3 {
            m.emails[ix].old = true;
        }
        assert_eq!(1, t.contains_unread(&m, 1));
        assert_eq!(Some(0), t.next_unread(&m, 2));
        for ix in 0..3 {
            m.emails[ix].read = true;
        }
        assert_eq!(Some(0), t.traverse(&mut m, 0, Traverse::ContainsUnread));
        assert_eq!(None, t.next_unread(&m, 2));

        assert!(!t.contains_flagged(&m, 2));
        m.emails[1].flagged = true;
        assert_eq!(Some(1), t.traverse(&mut m, 2, Traverse::ContainsFlagged));
        assert!(!t.contains_flagged(&m, 3));
    }

    #[test]
    fn parents_and_roots() {
        let mut m = abcd();
        let t = threads(&mut m, ThreadSettings::default());
        assert_eq!(Some(1), t.parent_message(&m, 2, false));
        assert_eq!(Some(0), t.parent_message(&m, 2, true));
        assert_eq!(None, t.parent_message(&m, 0, false));
        assert_eq!(Some(0), t.parent_message(&m, 0, true));
        assert_eq!(vec![1, 2], t.descendants(&m, 0));
    }

    #[test]
    fn moving_between_threads() {
        // A(0) { B(1) { C(2) }, E(4) }, D(3)
        let mut m = threaded_mailbox(5, &[(1, 0), (2, 1), (4, 0)]);
        let t = threads(&mut m, ThreadSettings::default());
        assert_eq!(vec![0, 1, 2, 4, 3], m.v2r);

        assert_eq!(Some(4), t.aside(&m, 1, true, false));
        assert_eq!(None, t.aside(&m, 3, true, false));
        assert_eq!(Some(0), t.aside(&m, 2, false, false));
        assert_eq!(None, t.aside(&m, 0, false, false));
        assert_eq!(Some(0), t.aside(&m, 3, false, false));

        assert_eq!(Some(3), t.aside(&m, 2, true, true));
        assert_eq!(Some(1), t.aside(&m, 4, false, true));
        assert_eq!(Some(1), t.aside(&m, 2, false, true));
        assert_eq!(None, t.aside(&m, 3, true, true));
    }

    #[test]
    fn link_and_break() {
        let mut m = mailbox(3);
        let mut t = threads(&mut m, ThreadSettings::default());
        assert_eq!(3, t.roots().len());

        assert!(link_threads(&mut m, 0, &[1, 2, 0]).unwrap());
        assert!(!link_threads(&mut m, 0, &[1]).unwrap());
        assert!(m.emails[1].changed);
        assert!(m.changed);
        t.rebuild(&mut m, false).unwrap();
        assert_eq!(1, t.roots().len());
        assert_eq!(vec![0, 1, 1], depths(&m));

        assert!(link_threads(&mut m, 1, &[2]).unwrap());
        t.rebuild(&mut m, false).unwrap();
        assert_eq!(vec![0, 1, 2], depths(&m));

        t.break_thread(&mut m, 1).unwrap();
        t.rebuild(&mut m, false).unwrap();
        assert_eq!(2, t.roots().len());
        assert_eq!(Some(1), t.parent_message(&m, 2, false));
        assert_eq!(None, t.parent_message(&m, 1, false));

        m.readonly = true;
        assert_matches!(Err(Error::AclDenied), link_threads(&mut m, 0, &[1]));
    }

    #[test]
    fn interrupted_rebuild_leaves_arrival_order() {
        let mut m = abcd();
        m.emails[0].received = 50;
        let mut t = ThreadsContext::new(ThreadSettings::default());
        crate::support::interrupt::raise();
        assert_matches!(Err(Error::Interrupted), t.rebuild(&mut m, true));
        assert_eq!(vec![0, 1, 2, 3], m.v2r);
        assert!(m.verify());
        assert!(m.emails.iter().all(|e| e.thread.is_none()));

        t.rebuild(&mut m, true).unwrap();
        assert_eq!(vec![3, 0, 1, 2], m.v2r);
    }

    #[test]
    fn registered_defaults() {
        let mut set = ConfigSet::new();
        register(&mut set).unwrap();
        assert_eq!("unset", set.get_string("use_threads").unwrap());
        set.set_string("use_threads", "yes").unwrap();
        assert_eq!("threads", set.get_string("use_threads").unwrap());
        assert!(set.set_string("use_threads", "sideways").is_err());
    }

    fn arb_forest() -> impl Strategy<Value = Vec<(Option<usize>, bool, bool, bool)>>
    {
        prop::collection::vec(
            (
                prop::option::of(0usize..64),
                any::<bool>(),
                any::<bool>(),
                any::<bool>(),
            ),
            1..24,
        )
    }

    fn forest_mailbox(
        shape: &[(Option<usize>, bool, bool, bool)],
    ) -> Mailbox {
        let mut m = mailbox(shape.len());
        for (ix, &(parent, read, old, collapsed)) in shape.iter().enumerate() {
            if let Some(p) = parent {
                // Parents may be later messages or missing altogether
                m.emails[ix].env.references = vec![format!("{}@test", p)];
            }
            m.emails[ix].read = read;
            m.emails[ix].old = old;
            m.emails[ix].collapsed = collapsed;
        }
        m
    }

    proptest! {
        #[test]
        fn hidden_counts_match_view(shape in arb_forest()) {
            let mut m = forest_mailbox(&shape);
            let mut t = ThreadsContext::new(ThreadSettings::default());
            t.rebuild(&mut m, false).unwrap();
            t.collapse_collapsed(&mut m);
            prop_assert!(m.verify());
            prop_assert_eq!(m.len(), t.linear().len());

            for &root in t.roots() {
                let thread = t.subtree_messages(root);
                if let Some(&top) = thread.first() {
                    if Some(top) != t.nodes[root.0].message {
                        continue;
                    }
                    let hidden = thread[1..]
                        .iter()
                        .filter(|&&ix| m.emails[ix].vnum.is_none())
                        .count();
                    prop_assert_eq!(hidden, m.emails[top].num_hidden);
                }
            }
        }

        #[test]
        fn unread_aggregate_matches_definition(shape in arb_forest()) {
            let mut m = forest_mailbox(&shape);
            let t = threads(&mut m, ThreadSettings::default());
            for ix in 0..m.len() {
                let thread = t.thread_of(&m, ix);
                let any_new = thread.iter().any(|&i| m.emails[i].is_new());
                let any_unread = thread.iter().any(|&i| !m.emails[i].read);
                let expected = if any_new { 2 } else if any_unread { 1 } else { 0 };
                prop_assert_eq!(expected, t.contains_unread(&m, ix));
            }
        }

        #[test]
        fn equal_keys_keep_arrival_order(
            sizes in prop::collection::vec(0u64..3, 1..30)
        ) {
            let mut m = mailbox(sizes.len());
            for (e, &size) in m.emails.iter_mut().zip(&sizes) {
                e.size = size;
            }
            let settings = ThreadSettings {
                style: ThreadStyle::Flat,
                sort: SortValue::new(SORT_SIZE),
                ..ThreadSettings::default()
            };
            let mut t = threads(&mut m, settings);
            t.rebuild(&mut m, false).unwrap();
            for pair in m.v2r.windows(2) {
                let (a, b) = (&m.emails[pair[0]], &m.emails[pair[1]]);
                prop_assert!(a.size < b.size || (a.size == b.size && a.index < b.index));
            }
        }
    }
}
