// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Generic double-buffered events.
//!
//! `Events<T>` is a plain resource: any type `T: Send + Sync + 'static` can
//! be used as an event without a dedicated queue type. Two buffers are kept
//! so readers that run between two writer flushes still see events written
//! during the current frame as well as the previous one; `update()` (called
//! once per frame by the scheduler) rotates them.

use std::marker::PhantomData;

/// Double-buffered queue of events of type `T`.
pub struct Events<T> {
    events_a: Vec<EventInstance<T>>,
    events_b: Vec<EventInstance<T>>,
    event_count: usize,
}

struct EventInstance<T> {
    id: usize,
    event: T,
}

impl<T> Default for Events<T> {
    fn default() -> Self {
        Self { events_a: Vec::new(), events_b: Vec::new(), event_count: 0 }
    }
}

impl<T: Send + Sync + 'static> Events<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, event: T) {
        let id = self.event_count;
        self.event_count += 1;
        self.events_b.push(EventInstance { id, event });
    }

    /// Rotate buffers: the previous `b` becomes `a`, and a fresh `b` starts.
    /// Events still only in the old `a` are dropped.
    pub fn update(&mut self) {
        std::mem::swap(&mut self.events_a, &mut self.events_b);
        self.events_b.clear();
    }

    pub fn len(&self) -> usize {
        self.events_a.len() + self.events_b.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.events_a.clear();
        self.events_b.clear();
    }

    fn iter_from(&self, last_seen: usize) -> impl Iterator<Item = &T> {
        self.events_a.iter().chain(self.events_b.iter()).filter(move |inst| inst.id >= last_seen).map(|inst| &inst.event)
    }
}

/// Per-system cursor into an `Events<T>` resource.
pub struct EventReader<T> {
    last_seen: usize,
    _phantom: PhantomData<T>,
}

impl<T> Default for EventReader<T> {
    fn default() -> Self {
        Self { last_seen: 0, _phantom: PhantomData }
    }
}

impl<T: Send + Sync + 'static> EventReader<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read<'a>(&mut self, events: &'a Events<T>) -> impl Iterator<Item = &'a T> + 'a {
        let last_seen = self.last_seen;
        self.last_seen = events.event_count;
        events.iter_from(last_seen)
    }

    pub fn is_empty(&self, events: &Events<T>) -> bool {
        events.event_count <= self.last_seen
    }
}

/// Write-only handle to an `Events<T>` resource, for use from systems.
pub struct EventWriter<'w, T: Send + Sync + 'static> {
    events: &'w mut Events<T>,
}

impl<'w, T: Send + Sync + 'static> EventWriter<'w, T> {
    pub fn new(events: &'w mut Events<T>) -> Self {
        Self { events }
    }

    pub fn send(&mut self, event: T) {
        self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Clone)]
    struct Damage(u32);

    #[test]
    fn reader_sees_events_sent_before_and_after_one_update() {
        let mut events = Events::<Damage>::new();
        let mut reader = EventReader::<Damage>::new();

        events.send(Damage(10));
        assert_eq!(reader.read(&events).cloned().collect::<Vec<_>>(), vec![Damage(10)]);
        assert!(reader.is_empty(&events));

        events.send(Damage(20));
        events.update();
        events.send(Damage(30));

        let seen: Vec<_> = reader.read(&events).cloned().collect();
        assert_eq!(seen, vec![Damage(20), Damage(30)]);
    }

    #[test]
    fn events_older_than_two_updates_are_dropped() {
        let mut events = Events::<Damage>::new();
        events.send(Damage(1));
        events.update();
        events.update();

        let mut reader = EventReader::<Damage>::new();
        assert!(reader.read(&events).next().is_none());
    }

    #[test]
    fn writer_delegates_to_underlying_queue() {
        let mut events = Events::<Damage>::new();
        {
            let mut writer = EventWriter::new(&mut events);
            writer.send(Damage(5));
        }
        assert_eq!(events.len(), 1);
    }
}
