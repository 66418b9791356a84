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

//! Tree glyphs and subject suppression.
//!
//! Each message in view gets the run of glyphs drawn before its subject, e.g.
//!
//! ```text
//! root
//! ├─>reply
//! │ └─>reply to reply
//! └=>duplicate of root
//! ```
//!
//! Only levels that are themselves drawn take a column: placeholders for
//! missing messages are skipped under `hide_missing` (`hide_top_missing` at
//! the top) and messages outside the limit under `hide_limited`
//! (`hide_top_limited`). When such a level is drawn, its children are marked
//! with `?` or `&` respectively.

use super::{NodeId, ThreadsContext};
use crate::mailbox::Mailbox;

const VERTICAL: char = '│';
const TEE: char = '├';
const CORNER: char = '└';
const HORIZONTAL: char = '─';
const ARROW: char = '>';
const DUPLICATE: char = '=';
const BY_SUBJECT: char = '*';
const MISSING: char = '?';
const LIMITED: char = '&';

struct Frame {
    node: NodeId,
    depth: usize,
    /// For each drawn level above, whether its line continues past here.
    columns: Vec<bool>,
    last: bool,
    /// Nearest message above.
    parent_message: Option<usize>,
    /// Set when the parent is a drawn placeholder or limited-out message.
    parent_mark: Option<char>,
}

impl ThreadsContext {
    /// Whether the level at `id` takes a column.
    fn is_drawn(&self, m: &Mailbox, id: NodeId, top: bool) -> bool {
        let s = &self.settings;
        match self.nodes[id.0].message {
            None => !(s.hide_missing || (top && s.hide_top_missing)),
            Some(ix) if !m.emails[ix].limited => {
                !(s.hide_limited || (top && s.hide_top_limited))
            }
            Some(_) => true,
        }
    }

    /// Compute `tree`, `depth`, `subject_changed` and `display_subject` for
    /// every message.
    pub fn draw_tree(&self, m: &mut Mailbox) {
        if !self.is_threaded() {
            for e in &mut m.emails {
                e.tree.clear();
                e.depth = 0;
                e.subject_changed = true;
                e.display_subject = true;
            }
            return;
        }

        let shown = self.shown_subtrees(m);
        let re = self.settings.reply_regex.as_ref();
        let mut stack: Vec<Frame> = self
            .roots
            .iter()
            .rev()
            .map(|&node| Frame {
                node,
                depth: 0,
                columns: Vec::new(),
                last: true,
                parent_message: None,
                parent_mark: None,
            })
            .collect();

        while let Some(frame) = stack.pop() {
            let node = &self.nodes[frame.node.0];
            let drawn = self.is_drawn(m, frame.node, node.parent.is_none());

            if let Some(ix) = node.message {
                let tree = if drawn && frame.depth > 0 {
                    let mark = if node.duplicate {
                        Some(DUPLICATE)
                    } else if node.fake {
                        Some(BY_SUBJECT)
                    } else {
                        frame.parent_mark
                    };
                    glyphs(
                        &frame.columns,
                        frame.last,
                        mark,
                        self.settings.narrow_tree,
                    )
                } else {
                    String::new()
                };
                let (changed, parent_shown) = match frame.parent_message {
                    None => (true, false),
                    Some(p) => (
                        m.emails[ix].env.real_subject(re)
                            != m.emails[p].env.real_subject(re),
                        m.emails[p].vnum.is_some(),
                    ),
                };

                let e = &mut m.emails[ix];
                e.tree = tree;
                e.depth = frame.depth;
                e.subject_changed = changed;
                e.display_subject =
                    !self.settings.hide_thread_subject || changed || !parent_shown;
            }

            let (depth, columns) = if !drawn {
                (frame.depth, frame.columns)
            } else if 0 == frame.depth {
                (1, Vec::new())
            } else {
                let mut columns = frame.columns;
                columns.push(!frame.last);
                (frame.depth + 1, columns)
            };
            let parent_mark = match node.message {
                _ if !drawn => None,
                None => Some(MISSING),
                Some(ix) if !m.emails[ix].limited => Some(LIMITED),
                Some(_) => None,
            };
            let parent_message = node.message.or(frame.parent_message);
            let last_shown = node.children.iter().rposition(|c| shown[c.0]);

            for (i, &child) in node.children.iter().enumerate().rev() {
                stack.push(Frame {
                    node: child,
                    depth,
                    columns: columns.clone(),
                    last: last_shown.map_or(true, |l| i >= l),
                    parent_message,
                    parent_mark,
                });
            }
        }
    }
}

fn glyphs(
    columns: &[bool],
    last: bool,
    mark: Option<char>,
    narrow: bool,
) -> String {
    let mut s = String::new();
    for &continues in columns {
        s.push(if continues { VERTICAL } else { ' ' });
        if !narrow {
            s.push(' ');
        }
    }
    s.push(if last { CORNER } else { TEE });
    match mark {
        Some(c) => s.push(c),
        None if !narrow => s.push(HORIZONTAL),
        None => (),
    }
    s.push(ARROW);
    s
}

#[cfg(test)]
mod test {
    use super::super::test_support::*;
    use super::super::ThreadSettings;
    use super::*;

    #[test]
    fn glyph_runs() {
        assert_eq!("└─>", glyphs(&[], true, None, false));
        assert_eq!("│   ├=>", glyphs(&[true, false], false, Some('='), false));
        assert_eq!("│ ├>", glyphs(&[true, false], false, None, true));
    }

    #[test]
    fn hidden_replies_do_not_extend_lines() {
        // A(0) { B(1), C(2) } where C is outside the limit
        let mut m = threaded_mailbox(3, &[(1, 0), (2, 0)]);
        m.emails[2].limited = false;
        threads(&mut m, ThreadSettings::default());
        assert_eq!(vec!["", "└─>"], trees(&m));
    }

    #[test]
    fn repeated_subjects_are_hidden() {
        let mut m = threaded_mailbox(3, &[(1, 0), (2, 1)]);
        m.emails[0].env.subject = Some("plans".to_owned());
        m.emails[1].env.subject = Some("Re: plans".to_owned());
        m.emails[2].env.subject = Some("Re: new plans".to_owned());
        let settings = ThreadSettings {
            reply_regex: Some(reply_regex()),
            ..ThreadSettings::default()
        };
        let mut t = threads(&mut m, settings.clone());
        let shown: Vec<bool> =
            m.emails.iter().map(|e| e.display_subject).collect();
        assert_eq!(vec![true, false, true], shown);
        assert!(m.emails[2].subject_changed);

        // With the parent collapsed away the subject must show
        t.collapse_thread(&mut m, 0);
        t.uncollapse_thread(&mut m, 0);
        m.emails[0].limited = false;
        t.set_vnum(&mut m);
        assert!(m.emails[1].display_subject);

        threads(
            &mut m,
            ThreadSettings {
                hide_thread_subject: false,
                ..settings
            },
        );
        assert!(m.emails.iter().all(|e| e.display_subject));
    }
}
