//! Single-controller input arbitration.
//!
//! Exactly one connected client at a time may drive the GUI. The first
//! client to connect claims control; any connected client can take it with a
//! `TakeControl` event; when the controller leaves, the connected client with
//! the lowest id inherits it.
//!
//! Every keyboard key and mouse button the outgoing controller is holding is
//! released with a synthesized up event at the moment control changes, ahead
//! of any input from the new controller.

use std::collections::BTreeMap;

use incppect_core::ClientId;
use tracing::{info, trace};

use crate::event::{Event, EventKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    Unclaimed,
    Controlled(ClientId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Held {
    Key(i32),
    Button(i32),
}

/// Filters the raw event stream down to the current controller's input.
#[derive(Debug)]
pub struct ControlArbiter {
    state: ControlState,
    clients: BTreeMap<ClientId, [u8; 4]>,
    /// Keys and buttons the controller holds, in press order.
    held: Vec<Held>,
    mouse_pos: [f32; 2],
}

impl Default for ControlArbiter {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlArbiter {
    pub fn new() -> Self {
        Self {
            state: ControlState::Unclaimed,
            clients: BTreeMap::new(),
            held: Vec::new(),
            mouse_pos: [0.0; 2],
        }
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    pub fn controller(&self) -> Option<ClientId> {
        match self.state {
            ControlState::Controlled(id) => Some(id),
            ControlState::Unclaimed => None,
        }
    }

    pub fn controller_ip(&self) -> Option<[u8; 4]> {
        self.controller().and_then(|id| self.clients.get(&id).copied())
    }

    /// Connected clients known to the arbiter, by id.
    pub fn clients(&self) -> impl Iterator<Item = (ClientId, [u8; 4])> + '_ {
        self.clients.iter().map(|(id, ip)| (*id, *ip))
    }

    /// Last known pointer position of the controller.
    pub fn mouse_pos(&self) -> [f32; 2] {
        self.mouse_pos
    }

    /// Run a batch of raw events through the arbiter and return the input
    /// that reaches the consumer, in order.
    pub fn process(&mut self, events: impl IntoIterator<Item = Event>) -> Vec<Event> {
        let mut out = Vec::new();
        for event in events {
            self.handle(event, &mut out);
        }
        out
    }

    fn handle(&mut self, event: Event, out: &mut Vec<Event>) {
        let id = event.client_id;
        match event.kind {
            EventKind::Connected { ip } => {
                self.clients.insert(id, ip);
                if self.state == ControlState::Unclaimed {
                    self.transition(ControlState::Controlled(id), out);
                }
            }
            EventKind::Disconnected => {
                self.clients.remove(&id);
                if self.controller() == Some(id) {
                    let next = match self.clients.keys().next() {
                        Some(&next) => ControlState::Controlled(next),
                        None => ControlState::Unclaimed,
                    };
                    self.transition(next, out);
                }
            }
            EventKind::TakeControl => {
                if self.clients.contains_key(&id) && self.controller() != Some(id) {
                    self.transition(ControlState::Controlled(id), out);
                }
            }
            _ if self.controller() == Some(id) => {
                self.track(&event.kind);
                out.push(event);
            }
            _ => trace!("dropping input from non-controlling client {id}"),
        }
    }

    fn track(&mut self, kind: &EventKind) {
        match *kind {
            EventKind::KeyDown { key } => self.press(Held::Key(key)),
            EventKind::KeyUp { key } => self.held.retain(|h| *h != Held::Key(key)),
            EventKind::MouseDown { button, x, y } => {
                self.mouse_pos = [x, y];
                self.press(Held::Button(button));
            }
            EventKind::MouseUp { button, x, y } => {
                self.mouse_pos = [x, y];
                self.held.retain(|h| *h != Held::Button(button));
            }
            EventKind::MouseMove { x, y } => self.mouse_pos = [x, y],
            _ => {}
        }
    }

    fn press(&mut self, held: Held) {
        if !self.held.contains(&held) {
            self.held.push(held);
        }
    }

    /// Release everything the outgoing controller holds, then switch.
    fn transition(&mut self, next: ControlState, out: &mut Vec<Event>) {
        if let ControlState::Controlled(prev) = self.state {
            let [x, y] = self.mouse_pos;
            for held in self.held.drain(..) {
                let kind = match held {
                    Held::Key(key) => EventKind::KeyUp { key },
                    Held::Button(button) => EventKind::MouseUp { button, x, y },
                };
                out.push(Event::new(prev, kind));
            }
        }
        self.held.clear();

        match next {
            ControlState::Controlled(id) => info!("client {id} has control"),
            ControlState::Unclaimed => info!("control released, no clients connected"),
        }
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(client_id: ClientId, kind: EventKind) -> Event {
        Event::new(client_id, kind)
    }

    fn connected(id: ClientId) -> Event {
        ev(id, EventKind::Connected { ip: [127, 0, 0, id as u8] })
    }

    #[test]
    fn first_client_claims_control() {
        let mut arb = ControlArbiter::new();
        assert_eq!(arb.state(), ControlState::Unclaimed);
        arb.process([connected(1), connected(2)]);
        assert_eq!(arb.controller(), Some(1));
        assert_eq!(arb.controller_ip(), Some([127, 0, 0, 1]));
    }

    #[test]
    fn only_controller_input_passes() {
        let mut arb = ControlArbiter::new();
        let out = arb.process([
            connected(1),
            connected(2),
            ev(2, EventKind::KeyDown { key: 5 }),
            ev(1, EventKind::KeyDown { key: 6 }),
        ]);
        assert_eq!(out, vec![ev(1, EventKind::KeyDown { key: 6 })]);
    }

    #[test]
    fn disconnect_releases_held_keys_before_new_input() {
        let mut arb = ControlArbiter::new();
        arb.process([connected(1), connected(2), ev(1, EventKind::KeyDown { key: 65 })]);

        let out = arb.process([
            ev(1, EventKind::Disconnected),
            ev(2, EventKind::KeyDown { key: 66 }),
        ]);
        assert_eq!(
            out,
            vec![
                ev(1, EventKind::KeyUp { key: 65 }),
                ev(2, EventKind::KeyDown { key: 66 }),
            ]
        );
        assert_eq!(arb.controller(), Some(2));
    }

    #[test]
    fn take_control_releases_buttons_at_last_position() {
        let mut arb = ControlArbiter::new();
        arb.process([
            connected(1),
            connected(2),
            ev(1, EventKind::MouseDown { button: 0, x: 4.0, y: 5.0 }),
            ev(1, EventKind::MouseMove { x: 8.0, y: 9.0 }),
        ]);

        let out = arb.process([ev(2, EventKind::TakeControl)]);
        assert_eq!(
            out,
            vec![ev(1, EventKind::MouseUp { button: 0, x: 8.0, y: 9.0 })]
        );
        assert_eq!(arb.controller(), Some(2));
    }

    #[test]
    fn released_keys_are_not_synthesized_again() {
        let mut arb = ControlArbiter::new();
        arb.process([
            connected(1),
            connected(2),
            ev(1, EventKind::KeyDown { key: 1 }),
            ev(1, EventKind::KeyDown { key: 1 }),
            ev(1, EventKind::KeyUp { key: 1 }),
        ]);
        assert!(arb.process([ev(2, EventKind::TakeControl)]).is_empty());
    }

    #[test]
    fn take_control_requires_connection() {
        let mut arb = ControlArbiter::new();
        arb.process([connected(1)]);
        arb.process([ev(7, EventKind::TakeControl)]);
        assert_eq!(arb.controller(), Some(1));
    }

    #[test]
    fn last_disconnect_unclaims() {
        let mut arb = ControlArbiter::new();
        arb.process([connected(3), ev(3, EventKind::Disconnected)]);
        assert_eq!(arb.state(), ControlState::Unclaimed);

        arb.process([connected(4)]);
        assert_eq!(arb.controller(), Some(4));
    }

    #[test]
    fn lowest_remaining_id_inherits() {
        let mut arb = ControlArbiter::new();
        arb.process([connected(1), connected(5), connected(3), ev(1, EventKind::Disconnected)]);
        assert_eq!(arb.controller(), Some(3));
    }
}
