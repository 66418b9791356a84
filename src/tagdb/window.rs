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

//! Windowed queries.
//!
//! With a window, a query only sees a slice of time: `duration` units of
//! `timebase`, ending `position * duration` units before now. Moving
//! "backward" increases the position, so position 0 is the most recent
//! window.
//!
//! The window lives in the `nm_query_window_*` variables so that it
//! survives switching between mailboxes. `current_search` remembers which
//! query the position belongs to; asking for a different query starts again
//! at position 0.

use log::{debug, warn};
use thiserror::Error;

use crate::config::{Config, ConfigError, ScopeId};
use crate::context::Context;
use crate::support::chronox::Timebase;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowError {
    #[error(
        "Invalid nm_query_window_timebase value \
         (valid values are: hour, day, week, month, year)"
    )]
    InvalidTimebase,
    #[error("nm_query_window_duration must be positive unless the window is enabled")]
    InvalidDuration,
}

/// A snapshot of the `nm_query_window_*` variables.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Window {
    pub enable: bool,
    pub duration: i16,
    pub position: i16,
    pub timebase: String,
    pub current_search: Option<String>,
    pub or_terms: Option<String>,
}

impl Default for Window {
    fn default() -> Self {
        Window {
            enable: false,
            duration: 0,
            position: 0,
            timebase: "week".to_owned(),
            current_search: None,
            or_terms: None,
        }
    }
}

impl Window {
    pub fn from_config(
        config: &Config,
        scope: ScopeId,
    ) -> Result<Self, ConfigError> {
        Ok(Window {
            enable: config.get_bool(scope, "nm_query_window_enable")?,
            duration: config.get_number(scope, "nm_query_window_duration")?,
            position: config
                .get_number(scope, "nm_query_window_current_position")?,
            timebase: config
                .get_str(scope, "nm_query_window_timebase")?
                .unwrap_or_default(),
            current_search: config
                .get_str(scope, "nm_query_window_current_search")?,
            or_terms: config
                .get_str(scope, "nm_query_window_or_terms")?
                .filter(|s| !s.is_empty()),
        })
    }

    /// Whether window navigation means anything.
    pub fn is_available(&self) -> bool {
        self.enable || self.duration > 0
    }

    /// Rewrite `query` to cover only the current window.
    ///
    /// A duration of 0 is only accepted when the window is explicitly
    /// enabled; it then selects everything from `position` units ago
    /// onwards.
    pub fn apply(&self, query: &str) -> Result<String, WindowError> {
        if !self.enable && self.duration <= 0 {
            return Err(WindowError::InvalidDuration);
        }
        let timebase = Timebase::parse(&self.timebase)
            .ok_or(WindowError::InvalidTimebase)?
            .name();

        let duration = i32::from(self.duration.max(0));
        let position = i32::from(self.position.max(0));
        let (since, until) = if 0 == duration && 0 != position {
            (position, position)
        } else {
            (duration * (position + 1), duration * position)
        };

        let date = if 0 == until {
            format!("date:{}{}..", since, timebase)
        } else {
            format!("date:{}{}..{}{}", since, timebase, until, timebase)
        };

        let clause = match self.or_terms {
            Some(ref terms) => format!("({} or ({}))", date, terms),
            None => date,
        };
        Ok(format!("{} and {}", clause, query))
    }
}

/// The query a mailbox defined by `query` should actually run.
///
/// Queries that already constrain the date are left alone, as are queries
/// when no usable window is configured. If `query` is not the search the
/// window was positioned for, the position counts as 0.
pub fn effective_query(window: &Window, query: &str) -> String {
    if query.contains("date:") {
        return query.to_owned();
    }

    let mut window = window.clone();
    if window.current_search.as_deref() != Some(query) {
        window.position = 0;
    }

    match window.apply(query) {
        Ok(windowed) => {
            debug!("Windowed query: {}", windowed);
            windowed
        }
        Err(WindowError::InvalidDuration) => query.to_owned(),
        Err(e) => {
            warn!("{}", e);
            query.to_owned()
        }
    }
}

/// Make `query` the search the window is positioned for, starting again
/// from the most recent window if it changed.
pub fn select_search(
    ctx: &mut Context,
    scope: ScopeId,
    query: &str,
) -> Result<(), ConfigError> {
    let current = ctx
        .config
        .get_str(scope, "nm_query_window_current_search")?;
    if current.as_deref() == Some(query) {
        return Ok(());
    }

    ctx.config.set_string(
        &mut ctx.bus,
        scope,
        "nm_query_window_current_search",
        query,
    )?;
    reset(ctx, scope)
}

fn set_position(
    ctx: &mut Context,
    scope: ScopeId,
    position: i16,
) -> Result<(), ConfigError> {
    ctx.config
        .set_string(
            &mut ctx.bus,
            scope,
            "nm_query_window_current_position",
            &position.to_string(),
        )
        .map(|_| ())
}

/// Move the window one step into the past.
pub fn backward(ctx: &mut Context, scope: ScopeId) -> Result<(), ConfigError> {
    let position = ctx
        .config
        .get_number(scope, "nm_query_window_current_position")?;
    set_position(ctx, scope, position.saturating_add(1))
}

/// Move the window one step towards the present. Does nothing at the most
/// recent window.
pub fn forward(ctx: &mut Context, scope: ScopeId) -> Result<(), ConfigError> {
    let position = ctx
        .config
        .get_number(scope, "nm_query_window_current_position")?;
    if position <= 0 {
        return Ok(());
    }
    set_position(ctx, scope, position - 1)
}

/// Return to the most recent window.
pub fn reset(ctx: &mut Context, scope: ScopeId) -> Result<(), ConfigError> {
    set_position(ctx, scope, 0)
}

#[cfg(test)]
mod test {
    use super::*;

    fn window(duration: i16, position: i16, timebase: &str) -> Window {
        Window {
            duration,
            position,
            timebase: timebase.to_owned(),
            current_search: Some("tag:inbox".to_owned()),
            ..Window::default()
        }
    }

    #[test]
    fn window_rewrites_query() {
        assert_eq!(
            "date:4month..3month and tag:inbox",
            window(1, 3, "month").apply("tag:inbox").unwrap()
        );

        let mut w = window(0, 0, "month");
        w.enable = true;
        assert_eq!("date:0month.. and tag:inbox", w.apply("tag:inbox").unwrap());

        assert_eq!(
            Err(WindowError::InvalidTimebase),
            window(1, 3, "months").apply("tag:inbox")
        );
    }

    #[test]
    fn zero_duration_needs_enable() {
        assert_eq!(
            Err(WindowError::InvalidDuration),
            window(0, 0, "week").apply("tag:inbox")
        );

        let mut w = window(0, 2, "day");
        w.enable = true;
        assert_eq!("date:2day..2day and x", w.apply("x").unwrap());
    }

    #[test]
    fn or_terms_widen_window() {
        let mut w = window(2, 0, "week");
        w.or_terms = Some("tag:todo".to_owned());
        assert_eq!(
            "(date:2week.. or (tag:todo)) and tag:inbox",
            w.apply("tag:inbox").unwrap()
        );
    }

    #[test]
    fn effective_query_rules() {
        let w = window(1, 3, "month");
        assert_eq!(
            "date:4month..3month and tag:inbox",
            effective_query(&w, "tag:inbox")
        );
        // A different search starts at the most recent window
        assert_eq!(
            "date:1month.. and tag:sent",
            effective_query(&w, "tag:sent")
        );
        assert_eq!(
            "tag:inbox and date:1d..",
            effective_query(&w, "tag:inbox and date:1d..")
        );
        assert_eq!("tag:inbox", effective_query(&Window::default(), "tag:inbox"));
        assert_eq!(
            "tag:inbox",
            effective_query(&window(1, 0, "fortnight"), "tag:inbox")
        );
    }

    #[test]
    fn navigation_moves_position() {
        let mut ctx = Context::new().unwrap();
        let root = ctx.root();
        ctx.set("nm_query_window_duration", "1").unwrap();
        select_search(&mut ctx, root, "tag:inbox").unwrap();

        backward(&mut ctx, root).unwrap();
        backward(&mut ctx, root).unwrap();
        let w = Window::from_config(&ctx.config, root).unwrap();
        assert_eq!(2, w.position);
        assert!(w.is_available());

        forward(&mut ctx, root).unwrap();
        forward(&mut ctx, root).unwrap();
        forward(&mut ctx, root).unwrap();
        assert_eq!(
            0,
            Window::from_config(&ctx.config, root).unwrap().position
        );

        backward(&mut ctx, root).unwrap();
        select_search(&mut ctx, root, "tag:inbox").unwrap();
        assert_eq!(
            1,
            Window::from_config(&ctx.config, root).unwrap().position
        );
        select_search(&mut ctx, root, "tag:sent").unwrap();
        let w = Window::from_config(&ctx.config, root).unwrap();
        assert_eq!(0, w.position);
        assert_eq!(Some("tag:sent".to_owned()), w.current_search);

        backward(&mut ctx, root).unwrap();
        reset(&mut ctx, root).unwrap();
        assert_eq!(
            0,
            Window::from_config(&ctx.config, root).unwrap().position
        );
    }
}
