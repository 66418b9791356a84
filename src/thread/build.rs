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

//! Assembling and ordering the thread tree.

use std::cmp::Ordering;
use std::collections::HashMap;

use super::{Node, NodeId, ThreadStyle, ThreadsContext};
use crate::config::sort::SortValue;
use crate::email::sort::{sort_indices, Sorter, SORT_THREADS};
use crate::email::Email;
use crate::mailbox::Mailbox;
use crate::support::error::Error;
use crate::support::interrupt;

impl ThreadsContext {
    fn alloc(&mut self, message: Option<usize>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            message,
            ..Node::default()
        });
        id
    }

    fn attach(&mut self, child: NodeId, parent: NodeId) {
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    fn detach(&mut self, child: NodeId) {
        if let Some(parent) = self.nodes[child.0].parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != child);
        }
    }

    /// Whether `ancestor` is `id` or above it.
    fn is_under(&self, mut id: NodeId, ancestor: NodeId) -> bool {
        loop {
            if id == ancestor {
                return true;
            }
            match self.nodes[id.0].parent {
                Some(p) => id = p,
                None => return false,
            }
        }
    }

    /// Build the tree from the reply headers, leaving `roots` unordered.
    pub(super) fn assemble(&mut self, m: &Mailbox) -> Result<(), Error> {
        let mut by_id: HashMap<&str, NodeId> = HashMap::new();
        let mut own = Vec::with_capacity(m.len());

        for e in &m.emails {
            interrupt::check()?;
            let node = self.alloc(Some(e.index));
            own.push(node);
            if e.id.is_empty() {
                continue;
            }

            match by_id.get(e.id.as_str()).copied() {
                None => {
                    by_id.insert(&e.id, node);
                }
                Some(first) if self.settings.duplicates => {
                    self.nodes[node.0].duplicate = true;
                    self.attach(node, first);
                }
                // Threaded independently
                Some(_) => (),
            }
        }

        for e in &m.emails {
            interrupt::check()?;
            let node = own[e.index];
            if self.nodes[node.0].duplicate {
                continue;
            }

            let mut child = node;
            for (depth, ancestor) in e
                .env
                .ancestry()
                .into_iter()
                .filter(|&a| a != e.id)
                .enumerate()
            {
                let parent = match by_id.get(ancestor).copied() {
                    Some(p) => p,
                    None => {
                        let p = self.alloc(None);
                        by_id.insert(ancestor, p);
                        p
                    }
                };

                if self.nodes[child.0].parent.is_some() {
                    // A message's own nearest claim overrides what replies to
                    // it guessed; further up, the first guess stands.
                    if 0 != depth {
                        break;
                    }
                    if self.nodes[child.0].parent == Some(parent) {
                        child = parent;
                        continue;
                    }
                    if self.is_under(parent, child) {
                        break;
                    }
                    self.detach(child);
                } else if self.is_under(parent, child) {
                    break;
                }

                self.attach(child, parent);
                child = parent;
            }
        }

        if !self.settings.strict {
            self.join_subjects(m);
        }

        self.roots = (0..self.nodes.len())
            .map(NodeId)
            .filter(|&id| {
                let node = &self.nodes[id.0];
                node.parent.is_none()
                    && (node.message.is_some() || !node.children.is_empty())
            })
            .collect();
        Ok(())
    }

    /// Hang root messages under the oldest root message with the same
    /// reply-stripped subject.
    fn join_subjects(&mut self, m: &Mailbox) {
        let re = self.settings.reply_regex.as_ref();
        let mut oldest: HashMap<&str, usize> = HashMap::new();
        let mut candidates = Vec::new();

        for (ix, node) in self.nodes.iter().enumerate() {
            let msg = match node.message {
                Some(msg) if node.parent.is_none() => msg,
                _ => continue,
            };
            let subject = m.emails[msg].env.real_subject(re);
            if subject.is_empty() {
                continue;
            }

            candidates.push((NodeId(ix), msg, subject));
            oldest
                .entry(subject)
                .and_modify(|best| {
                    if older(&m.emails[msg], &m.emails[*best]) {
                        *best = msg;
                    }
                })
                .or_insert(msg);
        }

        for (node, msg, subject) in candidates {
            let target = oldest[subject];
            if target == msg {
                continue;
            }
            // Message nodes are allocated first, in index order
            let parent = NodeId(target);
            if parent != node && !self.is_under(parent, node) {
                self.nodes[node.0].fake = true;
                self.attach(node, parent);
            }
        }
    }

    /// Order children by `sort_aux` and roots by `sort`, dropping
    /// placeholders that lost all their children, then lay out `linear`.
    pub(super) fn sort_tree(&mut self, m: &Mailbox) -> Result<(), Error> {
        let aux = self.settings.sort_aux;
        let primary = if SORT_THREADS == self.settings.sort.method {
            aux
        } else {
            self.settings.sort
        };
        let reply_regex = self.settings.reply_regex.clone();
        let child_sorter =
            Sorter::new(aux, aux).with_reply_regex(reply_regex.as_ref());
        let root_sorter =
            Sorter::new(primary, aux).with_reply_regex(reply_regex.as_ref());

        // Representative message of each subtree, under each ordering
        let mut aux_key: Vec<Option<usize>> = vec![None; self.nodes.len()];
        let mut root_key: Vec<Option<usize>> = vec![None; self.nodes.len()];

        for id in self.post_order() {
            interrupt::check()?;
            let mut children = std::mem::take(&mut self.nodes[id.0].children);
            children.retain(|&c| aux_key[c.0].is_some());
            children.sort_by(|&a, &b| {
                cmp_keys(&child_sorter, m, aux_key[a.0], aux_key[b.0])
            });

            let own = self.nodes[id.0].message;
            let key = subtree_key(
                &child_sorter,
                aux,
                m,
                own,
                children.iter().map(|c| aux_key[c.0]),
            );
            aux_key[id.0] = key;
            let key = subtree_key(
                &root_sorter,
                primary,
                m,
                own,
                children.iter().map(|c| root_key[c.0]),
            );
            root_key[id.0] = key;
            self.nodes[id.0].children = children;
        }

        let reverse = ThreadStyle::Reverse == self.settings.style;
        let mut roots = std::mem::take(&mut self.roots);
        roots.retain(|&r| root_key[r.0].is_some());
        roots.sort_by(|&a, &b| {
            let ord = cmp_keys(&root_sorter, m, root_key[a.0], root_key[b.0]);
            if reverse {
                ord.reverse()
            } else {
                ord
            }
        });
        self.roots = roots;

        self.linear.clear();
        for &root in &self.roots {
            let messages = self.subtree_messages(root);
            self.linear.extend(messages);
        }
        Ok(())
    }

    fn post_order(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<(NodeId, bool)> = self
            .roots
            .iter()
            .rev()
            .map(|&r| (r, false))
            .collect();
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                out.push(id);
            } else {
                stack.push((id, true));
                stack.extend(
                    self.nodes[id.0].children.iter().rev().map(|&c| (c, false)),
                );
            }
        }
        out
    }

    /// Messages in `sort` order with no tree.
    pub(super) fn sort_flat(&mut self, m: &Mailbox) {
        let primary = if SORT_THREADS == self.settings.sort.method {
            self.settings.sort_aux
        } else {
            self.settings.sort
        };
        let sorter = Sorter::new(primary, self.settings.sort_aux)
            .with_reply_regex(self.settings.reply_regex.as_ref());
        self.linear = (0..m.len()).collect();
        sort_indices(&m.emails, &mut self.linear, &sorter);
    }
}

fn older(a: &Email, b: &Email) -> bool {
    (a.date_sent(), a.index) < (b.date_sent(), b.index)
}

fn cmp_keys(
    sorter: &Sorter,
    m: &Mailbox,
    a: Option<usize>,
    b: Option<usize>,
) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => sorter.cmp(&m.emails[a], &m.emails[b]),
        (a, b) => a.is_none().cmp(&b.is_none()),
    }
}

/// The message standing for a subtree when its siblings are ordered: its own
/// message, or with a `last-` sort the greatest message below it. A
/// placeholder stands in for its first child.
fn subtree_key(
    sorter: &Sorter,
    sort: SortValue,
    m: &Mailbox,
    own: Option<usize>,
    children: impl Iterator<Item = Option<usize>>,
) -> Option<usize> {
    if !sort.last {
        return own.or_else(|| children.flatten().next());
    }

    let forward = SortValue {
        reverse: false,
        ..sort
    };
    own.into_iter()
        .chain(children.flatten())
        .max_by(|&a, &b| {
            sorter
                .cmp_by(forward, &m.emails[a], &m.emails[b])
                .then_with(|| a.cmp(&b))
        })
}

#[cfg(test)]
mod test {
    use super::super::test_support::*;
    use super::super::ThreadSettings;

    #[test]
    fn own_reply_claim_beats_guess_from_references() {
        // 1 implies 0 -> 2 -> 1 through its references, but 2 says it
        // replies to 3
        let mut m = threaded_mailbox(4, &[(2, 3)]);
        m.emails[1].env.references =
            vec!["0@test".to_owned(), "2@test".to_owned()];
        let t = threads(&mut m, ThreadSettings::default());
        assert_eq!(Some(3), t.parent_message(&m, 2, false));
        assert_eq!(Some(2), t.parent_message(&m, 1, false));
        assert_eq!(Some(3), t.parent_message(&m, 1, true));
        assert_eq!(None, t.parent_message(&m, 0, false));
        assert_eq!(2, t.roots().len());
    }

    #[test]
    fn placeholders_without_children_vanish() {
        let mut m = threaded_mailbox(3, &[]);
        m.emails[0].env.references =
            vec!["gone@test".to_owned(), "1@test".to_owned()];
        m.emails[1].env.in_reply_to = vec!["2@test".to_owned()];
        let t = threads(&mut m, ThreadSettings::default());
        assert_eq!(1, t.roots().len());
        assert_eq!(vec![2, 1, 0], m.v2r);
        assert_eq!(vec![0, 1, 2], depths(&m));
    }
}
