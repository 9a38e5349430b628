//! Processor arena
//!
//! Rack processors live in a slot vector addressed by [`NodeHandle`]. The
//! wiring graph stores handles, never references. A freed slot is reused
//! with a bumped generation, so a stale handle can never reach the new
//! occupant.

use std::collections::HashMap;

use sr_core::ModuleType;

use crate::node::RackProcessor;

/// Stable handle to a processor instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    index: u32,
    generation: u32,
}

impl NodeHandle {
    pub fn index(&self) -> usize {
        self.index as usize
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// One cached processor
pub struct ArenaEntry {
    pub id: String,
    pub module_type: ModuleType,
    pub processor: Box<dyn RackProcessor>,
}

struct Slot {
    generation: u32,
    entry: Option<ArenaEntry>,
}

/// Processor instances keyed by module id
#[derive(Default)]
pub struct NodeArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    ids: HashMap<String, NodeHandle>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a processor under `id`, replacing any previous instance for that id
    pub fn insert(
        &mut self,
        id: &str,
        module_type: ModuleType,
        processor: Box<dyn RackProcessor>,
    ) -> NodeHandle {
        self.remove(id);

        let entry = ArenaEntry {
            id: id.to_string(),
            module_type,
            processor,
        };
        let handle = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.entry = Some(entry);
                NodeHandle {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                NodeHandle {
                    index,
                    generation: 0,
                }
            }
        };
        self.ids.insert(id.to_string(), handle);
        handle
    }

    /// Drop the instance for `id`, freeing its slot
    pub fn remove(&mut self, id: &str) -> Option<ArenaEntry> {
        let handle = self.ids.remove(id)?;
        let slot = self.slots.get_mut(handle.index())?;
        if slot.generation != handle.generation {
            return None;
        }
        let entry = slot.entry.take();
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        entry
    }

    pub fn handle_of(&self, id: &str) -> Option<NodeHandle> {
        self.ids.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains_key(id)
    }

    pub fn get(&self, handle: NodeHandle) -> Option<&ArenaEntry> {
        self.slots
            .get(handle.index())
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    pub fn get_mut(&mut self, handle: NodeHandle) -> Option<&mut ArenaEntry> {
        self.slots
            .get_mut(handle.index())
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_mut())
    }

    /// Processor for a module id
    pub fn processor_mut(&mut self, id: &str) -> Option<&mut dyn RackProcessor> {
        let handle = self.handle_of(id)?;
        let entry = self.get_mut(handle)?;
        Some(entry.processor.as_mut())
    }

    /// Ids of every cached instance, in no particular order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.ids.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::PassThrough;

    fn node() -> Box<dyn RackProcessor> {
        Box::new(PassThrough::new(ModuleType::DeClip))
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut arena = NodeArena::new();
        let a = arena.insert("a", ModuleType::DeClip, node());
        let b = arena.insert("b", ModuleType::MonoBass, node());
        assert_ne!(a, b);
        assert_eq!(arena.handle_of("a"), Some(a));
        assert_eq!(arena.get(b).map(|e| e.module_type), Some(ModuleType::MonoBass));
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_freed_slot_gets_new_generation() {
        let mut arena = NodeArena::new();
        let a = arena.insert("a", ModuleType::DeClip, node());
        assert!(arena.remove("a").is_some());
        assert!(arena.get(a).is_none());

        let c = arena.insert("c", ModuleType::DeClip, node());
        assert_eq!(c.index(), a.index());
        assert_ne!(c.generation(), a.generation());
        // The stale handle does not alias the new occupant
        assert!(arena.get(a).is_none());
        assert_eq!(arena.get(c).map(|e| e.id.as_str()), Some("c"));
    }

    #[test]
    fn test_reinsert_same_id_replaces() {
        let mut arena = NodeArena::new();
        let first = arena.insert("a", ModuleType::DeClip, node());
        let second = arena.insert("a", ModuleType::DeClip, node());
        assert_ne!(first, second);
        assert_eq!(arena.len(), 1);
        assert!(arena.get(first).is_none());
        assert!(arena.processor_mut("a").is_some());
        assert!(arena.remove("missing").is_none());
    }
}
