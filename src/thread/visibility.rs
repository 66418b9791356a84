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

use super::{NodeId, ThreadsContext};
use crate::mailbox::Mailbox;

impl ThreadsContext {
    /// Recompute which messages are in view and renumber them.
    ///
    /// A message is in view if it matches the limit, is not quasi-deleted,
    /// and is not hidden inside a collapsed thread. A collapsed thread shows
    /// only its first message that matches the limit.
    pub fn set_vnum(&mut self, m: &mut Mailbox) {
        for e in &mut m.emails {
            e.visible = e.limited;
            e.num_hidden = 0;
        }

        let mut representatives = Vec::new();
        if self.is_threaded() {
            for &root in &self.roots {
                let thread = self.subtree_messages(root);
                if !thread.iter().any(|&ix| m.emails[ix].collapsed) {
                    continue;
                }

                let rep = thread.iter().copied().find(|&ix| {
                    let e = &m.emails[ix];
                    e.limited && !e.quasi_deleted
                });
                for &ix in &thread {
                    if Some(ix) != rep {
                        m.emails[ix].visible = false;
                    }
                }
                if let Some(rep) = rep {
                    representatives.push((rep, thread));
                }
            }
        }

        assign_vnums(m, &self.linear);

        if self.is_threaded() {
            self.count_hidden(m);
            // The message standing for a collapsed thread accounts for the
            // whole thread, not just what is below it
            for (rep, thread) in representatives {
                m.emails[rep].num_hidden = thread
                    .iter()
                    .filter(|&&ix| ix != rep && m.emails[ix].vnum.is_none())
                    .count();
            }
        }
        self.draw_tree(m);
    }

    /// Set `num_hidden` of each message to the number of messages below it
    /// that are out of view.
    fn count_hidden(&self, m: &mut Mailbox) {
        let mut hidden = vec![0usize; self.nodes.len()];
        let mut stack: Vec<(NodeId, bool)> =
            self.roots.iter().map(|&r| (r, false)).collect();
        while let Some((id, expanded)) = stack.pop() {
            let node = &self.nodes[id.0];
            if !expanded {
                stack.push((id, true));
                stack.extend(node.children.iter().map(|&c| (c, false)));
                continue;
            }

            let below: usize = node
                .children
                .iter()
                .map(|c| {
                    let own = self.nodes[c.0].message.map_or(0, |ix| {
                        usize::from(m.emails[ix].vnum.is_none())
                    });
                    hidden[c.0] + own
                })
                .sum();
            hidden[id.0] = below;
            if let Some(ix) = node.message {
                m.emails[ix].num_hidden = below;
            }
        }
    }

    /// Whether some message in the subtree of each node is in view.
    pub(super) fn shown_subtrees(&self, m: &Mailbox) -> Vec<bool> {
        let mut shown = vec![false; self.nodes.len()];
        for &ix in m.v2r.iter().rev() {
            let mut cur = m.emails[ix].thread;
            while let Some(id) = cur {
                if shown[id.0] {
                    break;
                }
                shown[id.0] = true;
                cur = self.nodes[id.0].parent;
            }
        }
        shown
    }
}

/// Number the messages of `m` that are visible and not quasi-deleted, in
/// `order`, rebuilding `v2r` and the view size.
pub fn assign_vnums(m: &mut Mailbox, order: &[usize]) {
    for e in &mut m.emails {
        e.vnum = None;
    }
    m.v2r.clear();
    m.vsize = 0;

    for &ix in order {
        let e = &mut m.emails[ix];
        if e.visible && !e.quasi_deleted {
            e.vnum = Some(m.v2r.len());
            m.v2r.push(ix);
            m.vsize += e.size;
        }
    }
}
