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

//! Typed, hierarchical publish/subscribe.
//!
//! The bus is an arena of notification nodes. Each config scope, account and
//! mailbox owns a node, linked to the node of its enclosing scope. Sending an
//! event on a node delivers it to that node's observers in registration
//! order, then to the parent's, and so on up to the root.
//!
//! Observers are invoked synchronously and cannot reach the bus, so they are
//! unable to mutate the subject of the notification while it is being
//! delivered. Anything they need done later goes into the `Deferred` queue,
//! which the owner drains between ticks.

use std::collections::VecDeque;
use std::fmt;

use log::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NotifyId(usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(usize);

/// An opaque handle identifying the object an event concerns, such as a
/// mailbox or a config scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Subject(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventType {
    /// Matches every event when used as an observer filter.
    All,
    Global,
    Config,
    Account,
    Mailbox,
    Email,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GlobalEvent {
    StartupComplete,
    Shutdown,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigChange {
    Set,
    Reset,
    InitialSet,
    Deleted,
    /// The item is deprecated or renamed; carries the user-facing warning.
    Warning(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigEvent {
    pub name: String,
    pub change: ConfigChange,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccountEvent {
    Add,
    Delete,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MailboxEvent {
    Add,
    Delete,
    Change,
    /// The message vector was rebuilt from scratch.
    Invalid,
    Resort,
    Update,
    Untag,
    NewMail,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EmailChange {
    Add,
    Delete,
    Change,
    ChangeEnvelope,
    Visible,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailEvent {
    pub change: EmailChange,
    /// Positions of the affected messages in the mailbox.
    pub indices: Vec<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    Global(GlobalEvent),
    Config(ConfigEvent),
    Account(AccountEvent),
    Mailbox(MailboxEvent),
    Email(EmailEvent),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pub subject: Option<Subject>,
    pub payload: Payload,
}

impl Event {
    pub fn new(subject: Option<Subject>, payload: Payload) -> Self {
        Event { subject, payload }
    }

    pub fn config(name: &str, change: ConfigChange) -> Self {
        Event::new(
            None,
            Payload::Config(ConfigEvent {
                name: name.to_owned(),
                change,
            }),
        )
    }

    pub fn event_type(&self) -> EventType {
        match self.payload {
            Payload::Global(..) => EventType::Global,
            Payload::Config(..) => EventType::Config,
            Payload::Account(..) => EventType::Account,
            Payload::Mailbox(..) => EventType::Mailbox,
            Payload::Email(..) => EventType::Email,
        }
    }

    pub fn as_config(&self) -> Option<&ConfigEvent> {
        match self.payload {
            Payload::Config(ref ce) => Some(ce),
            _ => None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.payload {
            Payload::Config(ref ce) => {
                write!(f, "config {:?} {}", ce.change, ce.name)
            }
            ref other => write!(f, "{:?}", other),
        }
    }
}

/// What an observer wants done with itself after handling an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    Keep,
    Unregister,
}

/// Work queued by observers, delivered by `NotifyBus::drain_deferred`.
#[derive(Default)]
pub struct Deferred {
    queue: VecDeque<(NotifyId, Event)>,
}

impl Deferred {
    pub fn post(&mut self, node: NotifyId, event: Event) {
        self.queue.push_back((node, event));
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

pub type Callback = Box<dyn FnMut(&Event, &mut Deferred) -> Disposition>;

struct Observer {
    id: ObserverId,
    filter: EventType,
    subject: Option<Subject>,
    key: Option<&'static str>,
    callback: Callback,
}

impl Observer {
    fn wants(&self, event: &Event) -> bool {
        (EventType::All == self.filter || event.event_type() == self.filter)
            && (self.subject.is_none() || self.subject == event.subject)
    }
}

struct Node {
    parent: Option<NotifyId>,
    live: bool,
    observers: Vec<Option<Observer>>,
}

/// Guards against observers that keep posting work in response to their own
/// deferred events.
const MAX_DRAIN_ROUNDS: usize = 64;

#[derive(Default)]
pub struct NotifyBus {
    nodes: Vec<Node>,
    deferred: Deferred,
    next_observer: usize,
}

impl NotifyBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a notification node, optionally below `parent`.
    pub fn node_new(&mut self, parent: Option<NotifyId>) -> NotifyId {
        self.nodes.push(Node {
            parent,
            live: true,
            observers: Vec::new(),
        });
        NotifyId(self.nodes.len() - 1)
    }

    /// Retire `node`. Its observers are dropped; events sent to descendants
    /// stop propagating when they reach it.
    pub fn node_free(&mut self, node: NotifyId) {
        if let Some(n) = self.nodes.get_mut(node.0) {
            n.live = false;
            n.observers.clear();
        }
    }

    pub fn set_parent(&mut self, node: NotifyId, parent: Option<NotifyId>) {
        if let Some(n) = self.nodes.get_mut(node.0) {
            n.parent = parent;
        }
    }

    pub fn parent(&self, node: NotifyId) -> Option<NotifyId> {
        self.nodes.get(node.0).and_then(|n| n.parent)
    }

    /// Register an observer on `node` for events of `filter` type, optionally
    /// only those about `subject`.
    pub fn observer_add(
        &mut self,
        node: NotifyId,
        filter: EventType,
        subject: Option<Subject>,
        callback: impl FnMut(&Event, &mut Deferred) -> Disposition + 'static,
    ) -> ObserverId {
        self.add(node, filter, subject, None, Box::new(callback))
    }

    /// Like `observer_add`, but a second registration with the same `key` on
    /// the same node is ignored and returns the existing id.
    pub fn observer_add_keyed(
        &mut self,
        node: NotifyId,
        filter: EventType,
        subject: Option<Subject>,
        key: &'static str,
        callback: impl FnMut(&Event, &mut Deferred) -> Disposition + 'static,
    ) -> ObserverId {
        self.add(node, filter, subject, Some(key), Box::new(callback))
    }

    fn add(
        &mut self,
        node: NotifyId,
        filter: EventType,
        subject: Option<Subject>,
        key: Option<&'static str>,
        callback: Callback,
    ) -> ObserverId {
        if let Some(key) = key {
            if let Some(existing) = self.nodes[node.0]
                .observers
                .iter()
                .flatten()
                .find(|o| Some(key) == o.key)
            {
                debug!("Observer {} already registered", key);
                return existing.id;
            }
        }

        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.nodes[node.0].observers.push(Some(Observer {
            id,
            filter,
            subject,
            key,
            callback,
        }));
        id
    }

    /// Remove the observer with the given id. Returns whether it was found.
    pub fn observer_remove(&mut self, id: ObserverId) -> bool {
        for node in &mut self.nodes {
            let before = node.observers.len();
            node.observers
                .retain(|o| o.as_ref().map_or(false, |o| o.id != id));
            if node.observers.len() != before {
                return true;
            }
        }
        false
    }

    pub fn observer_count(&self, node: NotifyId) -> usize {
        self.nodes
            .get(node.0)
            .map_or(0, |n| n.observers.iter().flatten().count())
    }

    /// Deliver `event` to the observers of `node` and all its ancestors.
    ///
    /// Returns the number of observers that were invoked.
    pub fn send(&mut self, node: NotifyId, event: &Event) -> usize {
        let mut delivered = 0;
        let mut cur = Some(node);
        while let Some(id) = cur {
            let n = match self.nodes.get_mut(id.0) {
                Some(n) if n.live => n,
                _ => break,
            };

            let mut dropped = false;
            for slot in &mut n.observers {
                let unregister = match *slot {
                    Some(ref mut obs) if obs.wants(event) => {
                        delivered += 1;
                        Disposition::Unregister
                            == (obs.callback)(event, &mut self.deferred)
                    }
                    _ => false,
                };

                if unregister {
                    debug!("Observer unregistered itself on {}", event);
                    *slot = None;
                    dropped = true;
                }
            }

            if dropped {
                n.observers.retain(Option::is_some);
            }

            cur = n.parent;
        }

        delivered
    }

    /// Queue `event` for delivery by the next `drain_deferred`.
    pub fn defer(&mut self, node: NotifyId, event: Event) {
        self.deferred.post(node, event);
    }

    pub fn has_deferred(&self) -> bool {
        !self.deferred.is_empty()
    }

    /// Deliver all queued events, including any queued in the process.
    pub fn drain_deferred(&mut self) -> usize {
        let mut count = 0;
        for _ in 0..MAX_DRAIN_ROUNDS {
            if self.deferred.is_empty() {
                return count;
            }

            let batch = std::mem::take(&mut self.deferred.queue);
            for (node, event) in batch {
                self.send(node, &event);
                count += 1;
            }
        }

        warn!(
            "Deferred notification queue did not settle; dropping {} events",
            self.deferred.len()
        );
        self.deferred.queue.clear();
        count
    }
}

#[cfg(test)]
mod test {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    fn recorder(
        log: &Rc<RefCell<Vec<String>>>,
        tag: &'static str,
    ) -> impl FnMut(&Event, &mut Deferred) -> Disposition + 'static {
        let log = Rc::clone(log);
        move |event, _| {
            log.borrow_mut().push(format!("{}:{}", tag, event));
            Disposition::Keep
        }
    }

    #[test]
    fn delivery_order_and_propagation() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut bus = NotifyBus::new();
        let root = bus.node_new(None);
        let child = bus.node_new(Some(root));

        bus.observer_add(root, EventType::All, None, recorder(&log, "root"));
        bus.observer_add(child, EventType::Config, None, recorder(&log, "c1"));
        bus.observer_add(child, EventType::Config, None, recorder(&log, "c2"));
        bus.observer_add(child, EventType::Mailbox, None, recorder(&log, "mb"));

        let delivered =
            bus.send(child, &Event::config("sort", ConfigChange::Set));
        assert_eq!(3, delivered);
        assert_eq!(
            vec![
                "c1:config Set sort".to_owned(),
                "c2:config Set sort".to_owned(),
                "root:config Set sort".to_owned(),
            ],
            *log.borrow()
        );

        log.borrow_mut().clear();
        bus.send(root, &Event::config("sort", ConfigChange::Reset));
        assert_eq!(vec!["root:config Reset sort".to_owned()], *log.borrow());
    }

    #[test]
    fn subject_filter() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut bus = NotifyBus::new();
        let root = bus.node_new(None);
        bus.observer_add(
            root,
            EventType::Mailbox,
            Some(Subject(7)),
            recorder(&log, "seven"),
        );

        bus.send(
            root,
            &Event::new(
                Some(Subject(8)),
                Payload::Mailbox(MailboxEvent::Change),
            ),
        );
        assert!(log.borrow().is_empty());
        bus.send(
            root,
            &Event::new(
                Some(Subject(7)),
                Payload::Mailbox(MailboxEvent::Change),
            ),
        );
        assert_eq!(1, log.borrow().len());
    }

    #[test]
    fn self_unregistration_and_removal() {
        let mut bus = NotifyBus::new();
        let root = bus.node_new(None);
        let calls = Rc::new(RefCell::new(0));
        let calls2 = Rc::clone(&calls);
        bus.observer_add(root, EventType::All, None, move |_, _| {
            *calls2.borrow_mut() += 1;
            Disposition::Unregister
        });
        let other = bus.observer_add(root, EventType::All, None, |_, _| {
            Disposition::Keep
        });

        let ev = Event::new(None, Payload::Global(GlobalEvent::Shutdown));
        assert_eq!(2, bus.send(root, &ev));
        assert_eq!(1, bus.send(root, &ev));
        assert_eq!(1, *calls.borrow());

        assert!(bus.observer_remove(other));
        assert!(!bus.observer_remove(other));
        assert_eq!(0, bus.observer_count(root));
    }

    #[test]
    fn keyed_registration_is_idempotent() {
        let mut bus = NotifyBus::new();
        let root = bus.node_new(None);
        let a = bus.observer_add_keyed(root, EventType::All, None, "k", |_, _| {
            Disposition::Keep
        });
        let b = bus.observer_add_keyed(root, EventType::All, None, "k", |_, _| {
            Disposition::Keep
        });
        assert_eq!(a, b);
        assert_eq!(1, bus.observer_count(root));
    }

    #[test]
    fn deferred_work_runs_on_drain() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut bus = NotifyBus::new();
        let root = bus.node_new(None);
        bus.observer_add(root, EventType::Config, None, move |event, deferred| {
            if let Some(ce) = event.as_config() {
                if ConfigChange::Set == ce.change {
                    deferred.post(
                        root,
                        Event::new(None, Payload::Mailbox(MailboxEvent::Resort)),
                    );
                }
            }
            Disposition::Keep
        });
        bus.observer_add(root, EventType::Mailbox, None, recorder(&log, "mb"));

        bus.send(root, &Event::config("sort", ConfigChange::Set));
        assert!(log.borrow().is_empty());
        assert!(bus.has_deferred());

        assert_eq!(1, bus.drain_deferred());
        assert_eq!(vec!["mb:Mailbox(Resort)".to_owned()], *log.borrow());
        assert!(!bus.has_deferred());
    }

    #[test]
    fn freed_node_stops_propagation() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut bus = NotifyBus::new();
        let root = bus.node_new(None);
        let mid = bus.node_new(Some(root));
        let leaf = bus.node_new(Some(mid));
        bus.observer_add(root, EventType::All, None, recorder(&log, "root"));
        bus.node_free(mid);
        assert_eq!(0, bus.send(leaf, &Event::config("x", ConfigChange::Set)));
        assert!(log.borrow().is_empty());
    }
}
