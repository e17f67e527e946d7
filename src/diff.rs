use smallvec::{SmallVec, smallvec};
use std::rc::Rc;

// Change - одна правка упорядоченного списка ключей.
//
// Позиции всегда относятся к состоянию списка на момент применения правки,
// поэтому скрипт применяется строго по порядку.

#[derive(Debug,Clone,Copy,PartialEq,Eq,Hash)]
pub enum ChangeKind {
    Insert,
    Remove,
    Content,
}

#[derive(Debug,Clone,PartialEq,Eq)]
pub enum Change<K> {
    // Insert `elements` before the element currently at `position`.
    // `position == len` appends.
    Insert {
        position: usize,
        elements: Vec<K>,
    },
    // Delete `count` contiguous elements starting at `position`.
    Remove {
        position: usize,
        count: usize,
    },
    // Replace the elements at `positions` (not necessarily contiguous).
    Content {
        positions: SmallVec<[usize; 4]>,
        elements: SmallVec<[K; 4]>,
    },
}

impl<K> Change<K> {

    pub fn kind(&self) -> ChangeKind {
        match self {
            Self::Insert { .. } => ChangeKind::Insert,
            Self::Remove { .. } => ChangeKind::Remove,
            Self::Content { .. } => ChangeKind::Content,
        }
    }

    // Number of rows touched by this change
    pub fn len(&self) -> usize {
        match self {
            Self::Insert { elements, .. } => elements.len(),
            Self::Remove { count, .. } => *count,
            Self::Content { positions, .. } => positions.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Applies the change to `sequence`.
    ///
    /// Panics if the change does not fit the sequence, the same way
    /// `Vec::drain` does for an out-of-range range.
    pub fn apply(&self, sequence: &mut Vec<K>)
    where
        K: Clone,
    {
        match self {
            Self::Insert { position, elements } => {
                sequence.splice(*position..*position, elements.iter().cloned());
            }
            Self::Remove { position, count } => {
                sequence.drain(*position..*position + *count);
            }
            Self::Content { positions, elements } => {
                for (&position, element) in positions.iter().zip(elements.iter()) {
                    sequence[position] = element.clone();
                }
            }
        }
    }

    // Пытаемся склеить следующую правку с текущей.
    // Возвращает правку обратно, если склеить нельзя.
    fn absorb(&mut self, next: Change<K>) -> Option<Change<K>> {
        match (self, next) {
            (
                Self::Insert { position, elements },
                Self::Insert { position: at, elements: more },
            ) if at == *position + elements.len() => {
                elements.extend(more);
                None
            }
            (
                Self::Remove { position, count },
                Self::Remove { position: at, count: more },
            ) if at == *position => {
                *count += more;
                None
            }
            (
                Self::Content { positions, elements },
                Self::Content { positions: more_positions, elements: more_elements },
            ) => {
                positions.extend(more_positions);
                elements.extend(more_elements);
                None
            }
            (_, next) => Some(next),
        }
    }
}

pub fn apply_script<K: Clone>(sequence: &mut Vec<K>, changes: &[Change<K>]) {
    for change in changes {
        change.apply(sequence);
    }
}

// Tie breaking between equally cheap candidates of one DP cell

#[derive(Debug,Clone,Copy,PartialEq,Eq,Default)]
pub enum TieBreak {
    // substitution, then insertion, then deletion
    #[default]
    SubstituteFirst,
    // insertion, then deletion, then substitution
    StructuralFirst,
}

#[derive(Debug,Clone,Copy,PartialEq,Eq)]
enum Move {
    Substitute,
    Insert,
    Delete,
}

impl TieBreak {
    fn preference(self) -> [Move; 3] {
        match self {
            Self::SubstituteFirst => [Move::Substitute, Move::Insert, Move::Delete],
            Self::StructuralFirst => [Move::Insert, Move::Delete, Move::Substitute],
        }
    }
}

// Trace - persistent список правок.
//
// Каждая ячейка DP ссылается на хвост соседней ячейки, поэтому
// правки не копируются при переходе между ячейками.

struct Step<K> {
    change: Change<K>,
    prev: Option<Rc<Step<K>>>,
}

impl<K> Drop for Step<K> {
    // long chains would otherwise be dropped recursively
    fn drop(&mut self) {
        let mut next = self.prev.take();
        while let Some(step) = next {
            match Rc::try_unwrap(step) {
                Ok(mut inner) => next = inner.prev.take(),
                Err(_) => break,
            }
        }
    }
}

struct Cell<K> {
    cost: usize,
    tail: Option<Rc<Step<K>>>,
}

impl<K> Clone for Cell<K> {
    fn clone(&self) -> Self {
        Self {
            cost: self.cost,
            tail: self.tail.clone(),
        }
    }
}

impl<K> Cell<K> {
    fn empty() -> Self {
        Self {
            cost: 0,
            tail: None,
        }
    }

    fn extend(&self, change: Change<K>) -> Self {
        Self {
            cost: self.cost + 1,
            tail: Some(Rc::new(Step {
                change,
                prev: self.tail.clone(),
            })),
        }
    }

    fn into_changes(self) -> Vec<Change<K>>
    where
        K: Clone,
    {
        let mut changes = Vec::with_capacity(self.cost);
        let mut node = self.tail.as_deref();
        while let Some(step) = node {
            changes.push(step.change.clone());
            node = step.prev.as_deref();
        }
        changes.reverse();
        changes
    }
}

// Edit script

pub fn edit_script<K>(old: &[K], new: &[K]) -> Vec<Change<K>>
where
    K: Clone + PartialEq,
{
    edit_script_by(old, new, TieBreak::default(), |a, b| a == b)
}

/// Computes the changes which turn `old` into `new` with as few single-element
/// insertions, removals and substitutions as possible.
///
/// The grid is walked column by column (one column per element of `old`),
/// only the previous and the current column are kept in memory. Cell `(i, j)`
/// holds the cheapest change list transforming `old[..i]` into `new[..j]`;
/// the result is the list of cell `(old.len(), new.len())`, in the order the
/// changes have to be applied.
pub fn edit_script_by<K, F>(
    old: &[K],
    new: &[K],
    tie_break: TieBreak,
    equal: F,
) -> Vec<Change<K>>
where
    K: Clone,
    F: Fn(&K, &K) -> bool,
{
    let rows = new.len() + 1;
    let mut previous: Vec<Cell<K>> = Vec::with_capacity(rows);
    let mut current: Vec<Cell<K>> = Vec::with_capacity(rows);

    for col in 0..=old.len() {
        std::mem::swap(&mut previous, &mut current);
        current.clear();

        for row in 0..rows {
            let insert = (row > 0).then(|| current[row - 1].cost + 1);
            let delete = (col > 0).then(|| previous[row].cost + 1);
            let substitute = (row > 0 && col > 0).then(|| {
                let same = equal(&old[col - 1], &new[row - 1]);
                (previous[row - 1].cost + usize::from(!same), same)
            });

            // первый минимум в порядке предпочтения выигрывает
            let mut best: Option<(Move, usize)> = None;
            for candidate in tie_break.preference() {
                let cost = match candidate {
                    Move::Insert => insert,
                    Move::Delete => delete,
                    Move::Substitute => substitute.map(|(cost, _)| cost),
                };
                let Some(cost) = cost else {
                    continue;
                };
                match best {
                    Some((_, best_cost)) if best_cost <= cost => {}
                    _ => best = Some((candidate, cost)),
                }
            }

            let cell = match best {
                None => Cell::empty(),
                Some((Move::Insert, _)) => current[row - 1].extend(Change::Insert {
                    position: row - 1,
                    elements: vec![new[row - 1].clone()],
                }),
                Some((Move::Delete, _)) => previous[row].extend(Change::Remove {
                    position: row,
                    count: 1,
                }),
                Some((Move::Substitute, _)) => {
                    let diagonal = &previous[row - 1];
                    if substitute.is_some_and(|(_, same)| same) {
                        diagonal.clone()
                    } else {
                        diagonal.extend(Change::Content {
                            positions: smallvec![row - 1],
                            elements: smallvec![new[row - 1].clone()],
                        })
                    }
                }
            };
            current.push(cell);
        }
    }

    current.pop().map(Cell::into_changes).unwrap_or_default()
}

/// Merges neighbouring changes which can be expressed as one: insert runs,
/// removals at the same position and consecutive substitutions.
pub fn coalesce<K>(changes: Vec<Change<K>>) -> Vec<Change<K>> {
    let mut merged: Vec<Change<K>> = Vec::with_capacity(changes.len());
    for change in changes {
        let rest = match merged.last_mut() {
            Some(last) => last.absorb(change),
            None => Some(change),
        };
        if let Some(change) = rest {
            merged.push(change);
        }
    }
    merged
}


#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_empty_to_empty() {
        let script: Vec<Change<u8>> = edit_script(&[], &[]);
        assert!(script.is_empty());
    }

    #[test]
    fn test_tie_break_prefers_substitution_by_default() {
        let script = edit_script(&['a', 'b', 'c'], &['a', 'c', 'd']);
        assert_eq!(
            script,
            vec![
                Change::Content { positions: smallvec![1], elements: smallvec!['c'] },
                Change::Content { positions: smallvec![2], elements: smallvec!['d'] },
            ]
        );
    }

    #[test]
    fn test_tie_break_structural_first() {
        let script = edit_script_by(
            &['a', 'b', 'c'],
            &['a', 'c', 'd'],
            TieBreak::StructuralFirst,
            |a, b| a == b,
        );
        assert_eq!(
            script,
            vec![
                Change::Remove { position: 1, count: 1 },
                Change::Insert { position: 2, elements: vec!['d'] },
            ]
        );
    }

    #[test]
    fn test_absorb_insert_run() {
        let merged = coalesce(vec![
            Change::Insert { position: 0, elements: vec![1] },
            Change::Insert { position: 1, elements: vec![2] },
            Change::Insert { position: 5, elements: vec![3] },
        ]);
        assert_eq!(
            merged,
            vec![
                Change::Insert { position: 0, elements: vec![1, 2] },
                Change::Insert { position: 5, elements: vec![3] },
            ]
        );
    }

    #[test]
    fn test_long_chain_drop() {
        let old: Vec<u32> = (0..20_000).collect();
        let script = edit_script(&old, &[]);
        assert_eq!(script.len(), 20_000);
    }
}
