use super::{
    diff::{
        Change,
        TieBreak,
        coalesce,
        edit_script_by,
    },
    errors::HolderError,
    result::HolderResult,
};
use ahash::{AHashMap, AHashSet};
use parking_lot::Mutex;
use std::{
    fmt::Debug,
    hash::Hash,
    sync::Arc,
};
use tracing::debug;

// Callbacks

/// Creates the managed object for a key that appears for the first time and
/// tears it down once the key disappears again.
pub trait EntryLoader<K, V> {
    fn load(&mut self, key: &K) -> HolderResult<V>;

    // called BEFORE the entry is removed from the holder
    fn unload(&mut self, key: &K, value: &mut V) -> HolderResult<()>;
}

pub struct FnLoader<L, U> {
    load: L,
    unload: U,
}

impl<K, V, L, U> EntryLoader<K, V> for FnLoader<L, U>
where
    L: FnMut(&K) -> HolderResult<V>,
    U: FnMut(&K, &mut V) -> HolderResult<()>,
{
    fn load(&mut self, key: &K) -> HolderResult<V> {
        (self.load)(key)
    }

    fn unload(&mut self, key: &K, value: &mut V) -> HolderResult<()> {
        (self.unload)(key, value)
    }
}

pub fn loader_fn<K, V, L, U>(load: L, unload: U) -> FnLoader<L, U>
where
    L: FnMut(&K) -> HolderResult<V>,
    U: FnMut(&K, &mut V) -> HolderResult<()>,
{
    FnLoader { load, unload }
}

// Holder which only tracks the order of its keys
pub struct KeysOnly;

impl<K> EntryLoader<K, ()> for KeysOnly {
    fn load(&mut self, _key: &K) -> HolderResult<()> {
        Ok(())
    }

    fn unload(&mut self, _key: &K, _value: &mut ()) -> HolderResult<()> {
        Ok(())
    }
}

/// Observer of structural changes. `before_change` sees the key list as it
/// was, `after_change` receives the list with the change already applied.
pub trait ChangeListener<K> {
    fn before_change(&mut self, _change: &Change<K>) -> HolderResult<()> {
        Ok(())
    }

    fn after_change(&mut self, _change: &Change<K>, _keys: &[K]) -> HolderResult<()> {
        Ok(())
    }
}

impl<K, L> ChangeListener<K> for Arc<Mutex<L>>
where
    L: ChangeListener<K>,
{
    fn before_change(&mut self, change: &Change<K>) -> HolderResult<()> {
        self.lock().before_change(change)
    }

    fn after_change(&mut self, change: &Change<K>, keys: &[K]) -> HolderResult<()> {
        self.lock().after_change(change, keys)
    }
}

#[derive(Debug,Clone,Copy,PartialEq,Eq,Hash)]
pub struct ListenerId(u64);

#[derive(Debug,Clone,Copy,Default,PartialEq,Eq)]
pub struct UpdateReport {
    pub created: usize,
    pub removed: usize,
    pub changes: usize,
}

impl UpdateReport {
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.removed == 0 && self.changes == 0
    }
}

// Reconciler
//
// Словарь объектов, который всегда хранит заданный порядок ключей.
// Изменить содержимое можно только через update(): он создает новые объекты,
// сообщает слушателям о каждой правке порядка и удаляет ненужные объекты.

pub struct Reconciler<K, V> {
    entries: AHashMap<K, V>,
    keys: Vec<K>,
    loader: Box<dyn EntryLoader<K, V>>,
    listeners: Vec<(ListenerId, Box<dyn ChangeListener<K>>)>,
    next_listener: u64,
    tie_break: TieBreak,
}

impl<K, V> Reconciler<K, V>
where
    K: Clone + Eq + Hash + Debug,
{
    // Constructors

    pub fn new<L>(loader: L) -> Self
    where
        L: EntryLoader<K, V> + 'static,
    {
        Self {
            entries: AHashMap::new(),
            keys: Vec::new(),
            loader: Box::new(loader),
            listeners: Vec::new(),
            next_listener: 0,
            // a row keeps its key, so structural edits win over substitutions
            tie_break: TieBreak::StructuralFirst,
        }
    }

    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    pub fn tie_break(&self) -> TieBreak {
        self.tie_break
    }

    // Observers

    pub fn subscribe<L>(&mut self, listener: L) -> ListenerId
    where
        L: ChangeListener<K> + 'static,
    {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        before != self.listeners.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    // Update

    /// Synchronises the holder with `new_keys`.
    ///
    /// New objects are loaded before the first change is announced, so an
    /// insertion always refers to a ready object. Every change is announced
    /// to the listeners, applied, then announced again. Objects whose keys
    /// vanished are unloaded at the end.
    ///
    /// Callback errors abort the update immediately; the holder may then be
    /// partially updated and the caller decides how to recover.
    pub fn update(&mut self, new_keys: &[K]) -> HolderResult<UpdateReport> {
        let mut incoming: AHashSet<&K> = AHashSet::with_capacity(new_keys.len());
        for key in new_keys {
            if !incoming.insert(key) {
                return Err(HolderError::DuplicateKey {
                    key: format!("{key:?}"),
                });
            }
        }

        let mut created = 0;
        for key in new_keys {
            if !self.entries.contains_key(key) {
                let value = self.loader.load(key)?;
                self.entries.insert(key.clone(), value);
                created += 1;
            }
        }

        let mut outgoing: Vec<K> = self.keys
            .iter()
            .filter(|key| !incoming.contains(*key))
            .cloned()
            .collect();
        // objects left behind by an aborted update never reached the key list
        if self.entries.len() > self.keys.len() {
            let listed: AHashSet<&K> = self.keys.iter().collect();
            outgoing.extend(
                self.entries
                    .keys()
                    .filter(|key| !listed.contains(*key) && !incoming.contains(*key))
                    .cloned(),
            );
        }

        let script = coalesce(edit_script_by(
            &self.keys,
            new_keys,
            self.tie_break,
            |a, b| a == b,
        ));

        for change in &script {
            for (_, listener) in self.listeners.iter_mut() {
                listener.before_change(change)?;
            }
            change.apply(&mut self.keys);
            for (_, listener) in self.listeners.iter_mut() {
                listener.after_change(change, &self.keys)?;
            }
        }

        for key in &outgoing {
            if let Some(value) = self.entries.get_mut(key) {
                self.loader.unload(key, value)?;
            }
            self.entries.remove(key);
        }

        let report = UpdateReport {
            created,
            removed: outgoing.len(),
            changes: script.len(),
        };
        debug!(
            created = report.created,
            removed = report.removed,
            changes = report.changes,
            len = self.keys.len(),
            "reconciled key list"
        );
        Ok(report)
    }

    pub fn clear(&mut self) -> HolderResult<UpdateReport> {
        self.update(&[])
    }

    // Access

    pub fn list_keys(&self) -> Vec<K> {
        self.keys.clone()
    }

    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    pub fn values(&self) -> Vec<&V> {
        self.keys
            .iter()
            .filter_map(|key| self.entries.get(key))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.keys
            .iter()
            .filter_map(|key| self.entries.get(key).map(|value| (key, value)))
    }

    pub fn get_by_key(&self, key: &K) -> HolderResult<&V> {
        self.entries.get(key).ok_or_else(|| HolderError::KeyNotFound {
            key: format!("{key:?}"),
        })
    }

    pub fn get_by_key_mut(&mut self, key: &K) -> HolderResult<&mut V> {
        self.entries.get_mut(key).ok_or_else(|| HolderError::KeyNotFound {
            key: format!("{key:?}"),
        })
    }

    pub fn get_by_position(&self, position: usize) -> HolderResult<(&K, &V)> {
        let key = self.keys.get(position).ok_or(HolderError::PositionOutOfRange {
            position,
            len: self.keys.len(),
        })?;
        let value = self.get_by_key(key)?;
        Ok((key, value))
    }

    pub fn position_of(&self, key: &K) -> Option<usize> {
        self.keys.iter().position(|candidate| candidate == key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    // Visits every held object once, order unspecified
    pub fn forall<F>(&mut self, mut visitor: F)
    where
        F: FnMut(&K, &mut V),
    {
        for (key, value) in self.entries.iter_mut() {
            visitor(key, value);
        }
    }

    pub fn try_forall<E, F>(&mut self, mut visitor: F) -> Result<(), E>
    where
        F: FnMut(&K, &mut V) -> Result<(), E>,
    {
        for (key, value) in self.entries.iter_mut() {
            visitor(key, value)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
