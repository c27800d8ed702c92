// ── Command table ──
//
// Latest-wins store of pending colors, one entry per light. Callers write
// from any thread; the streaming loop reads once per tick. The lock is only
// ever held for a map update or a clone, never across an await.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::CoreError;
use crate::model::{Color, EntertainmentConfiguration, LightCommand, LightDescriptor, LightId};

/// Point-in-time copy of the table, ordered by light id.
pub type Snapshot = BTreeMap<LightId, LightCommand>;

#[derive(Debug, Default)]
struct Pending {
    commands: Snapshot,
    changed: bool,
}

#[derive(Debug)]
pub struct CommandTable {
    lights: BTreeMap<LightId, LightDescriptor>,
    pending: Mutex<Pending>,
}

impl CommandTable {
    pub fn new(configuration: &EntertainmentConfiguration) -> Self {
        Self {
            lights: configuration.lights.iter().map(|l| (l.id, *l)).collect(),
            pending: Mutex::new(Pending::default()),
        }
    }

    /// Replace the pending color for `light_id`.
    ///
    /// Unknown ids are rejected and leave the table untouched.
    pub fn upsert(&self, light_id: LightId, color: Color) -> Result<(), CoreError> {
        let light = *self
            .lights
            .get(&light_id)
            .ok_or(CoreError::InvalidTarget { light_id })?;

        let mut pending = self.lock();
        pending.commands.insert(light_id, LightCommand { light, color });
        pending.changed = true;
        Ok(())
    }

    pub fn snapshot(&self) -> Snapshot {
        self.lock().commands.clone()
    }

    /// Snapshot and reset the changed flag in one step, or `None` if
    /// nothing was written since the last take.
    pub fn take_changed(&self) -> Option<Snapshot> {
        let mut pending = self.lock();
        if !pending.changed {
            return None;
        }
        pending.changed = false;
        Some(pending.commands.clone())
    }

    /// Force the next tick to re-encode, e.g. after a color-space switch.
    pub fn mark_changed(&self) {
        self.lock().changed = true;
    }

    pub fn clear(&self) {
        let mut pending = self.lock();
        pending.commands.clear();
        pending.changed = false;
    }

    pub fn len(&self) -> usize {
        self.lock().commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().commands.is_empty()
    }

    /// Number of lights the table accepts.
    pub fn capacity(&self) -> usize {
        self.lights.len()
    }

    // A writer that panicked mid-insert leaves a complete map behind, so a
    // poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    fn table(channels: impl IntoIterator<Item = u16>) -> CommandTable {
        let config = EntertainmentConfiguration::with_channels(
            "1a8d99cc-967b-44f2-9202-43f976c0fa6b",
            "test",
            channels,
        );
        CommandTable::new(&config)
    }

    #[test]
    fn latest_write_wins() {
        let table = table([0, 1]);
        table.upsert(LightId(0), Color::rgb(1, 1, 1)).unwrap();
        table.upsert(LightId(0), Color::rgb(9, 9, 9)).unwrap();

        let snapshot = table.take_changed().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[&LightId(0)].color, Color::rgb(9, 9, 9));
    }

    #[test]
    fn unknown_light_is_rejected_without_effect() {
        let table = table([0, 1]);
        let err = table.upsert(LightId(7), Color::BLACK).unwrap_err();

        assert!(matches!(err, CoreError::InvalidTarget { light_id } if light_id == LightId(7)));
        assert!(table.is_empty());
        assert!(table.take_changed().is_none());
    }

    #[test]
    fn take_changed_resets_flag() {
        let table = table([0]);
        assert!(table.take_changed().is_none());

        table.upsert(LightId(0), Color::BLACK).unwrap();
        assert!(table.take_changed().is_some());
        assert!(table.take_changed().is_none());

        table.mark_changed();
        assert_eq!(table.take_changed().unwrap().len(), 1);
    }

    #[test]
    fn clear_drops_commands_and_flag() {
        let table = table([0, 1]);
        table.upsert(LightId(1), Color::BLACK).unwrap();
        table.clear();

        assert!(table.is_empty());
        assert!(table.take_changed().is_none());
        assert_eq!(table.capacity(), 2);
    }

    #[test]
    fn concurrent_writers_keep_one_entry_per_light() {
        let table = Arc::new(table(0..8));

        let writers: Vec<_> = (0..8u16)
            .map(|id| {
                let table = Arc::clone(&table);
                thread::spawn(move || {
                    for step in 0..=255u8 {
                        table.upsert(LightId(id), Color::rgb(step, 0, 0)).unwrap();
                    }
                })
            })
            .collect();

        // Interleave reads with the writers.
        for _ in 0..64 {
            let snapshot = table.snapshot();
            assert!(snapshot.len() <= 8);
        }
        for writer in writers {
            writer.join().unwrap();
        }

        let snapshot = table.take_changed().unwrap();
        assert_eq!(snapshot.len(), 8);
        for command in snapshot.values() {
            assert_eq!(command.color, Color::rgb(255, 0, 0));
        }
    }
}
