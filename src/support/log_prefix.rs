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

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Tracks text that should be included in at the start of every log statement
/// concerning a mailbox.
///
/// Clones of a `LogPrefix` share the same underlying data.
#[derive(Clone)]
pub struct LogPrefix {
    inner: Rc<RefCell<Inner>>,
}

#[derive(Clone)]
struct Inner {
    backend: &'static str,
    mailbox: Option<String>,
    scope: Option<String>,
}

impl LogPrefix {
    pub fn new(backend: &'static str) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                backend,
                mailbox: None,
                scope: None,
            })),
        }
    }

    pub fn deep_clone(&self) -> Self {
        let inner = self.inner.borrow();
        Self {
            inner: Rc::new(RefCell::new(Inner::clone(&inner))),
        }
    }

    pub fn set_mailbox(&self, mailbox: String) {
        self.inner.borrow_mut().mailbox = Some(sanitise(mailbox));
    }

    pub fn set_scope(&self, scope: String) {
        self.inner.borrow_mut().scope = Some(sanitise(scope));
    }
}

impl fmt::Display for LogPrefix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let inner = self.inner.borrow();
        write!(f, "{}", inner.backend)?;
        if inner.mailbox.is_some() || inner.scope.is_some() {
            write!(f, "[")?;
            if let Some(ref mailbox) = inner.mailbox {
                write!(f, "{}", mailbox)?;
            }
            if let Some(ref scope) = inner.scope {
                if inner.mailbox.is_some() {
                    write!(f, " ")?;
                }
                write!(f, "scope={}", scope)?;
            }
            write!(f, "]")?;
        }

        Ok(())
    }
}

fn sanitise(mut s: String) -> String {
    s.retain(|c| !c.is_control());
    if let Some((truncate_len, _)) = s.char_indices().nth(96) {
        s.truncate(truncate_len);
    }

    s
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_forms() {
        let prefix = LogPrefix::new("maildir");
        assert_eq!("maildir", prefix.to_string());

        let shared = prefix.clone();
        shared.set_mailbox("/tmp/in\nbox".to_owned());
        assert_eq!("maildir[/tmp/inbox]", prefix.to_string());

        let detached = prefix.deep_clone();
        detached.set_scope("work".to_owned());
        assert_eq!("maildir[/tmp/inbox]", prefix.to_string());
        assert_eq!("maildir[/tmp/inbox scope=work]", detached.to_string());
    }
}
