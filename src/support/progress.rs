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

use log::info;

/// Reports progress of a long scan.
///
/// Scans call `update` once per item. Every `interval` items (and at the
/// end) the registered sink is invoked, or, without one, a log line is
/// written.
pub struct Progress {
    what: String,
    total: usize,
    pos: usize,
    interval: usize,
    sink: Option<Box<dyn FnMut(&str, usize, usize)>>,
}

impl Progress {
    pub fn new(what: impl Into<String>, total: usize) -> Self {
        Progress {
            what: what.into(),
            total,
            pos: 0,
            interval: 100,
            sink: None,
        }
    }

    pub fn with_sink(
        mut self,
        sink: impl FnMut(&str, usize, usize) + 'static,
    ) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn with_interval(mut self, interval: usize) -> Self {
        self.interval = interval.max(1);
        self
    }

    pub fn update(&mut self, pos: usize) {
        self.pos = pos;
        if 0 == pos % self.interval || pos == self.total {
            self.emit();
        }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    fn emit(&mut self) {
        match self.sink {
            Some(ref mut sink) => sink(&self.what, self.pos, self.total),
            None if self.total > self.interval => {
                info!("{}: {}/{}", self.what, self.pos, self.total)
            }
            None => (),
        }
    }
}
