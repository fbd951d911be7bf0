/*
 *
 *    Copyright (c) 2020-2022 Project CHIP Authors
 *
 *    Licensed under the Apache License, Version 2.0 (the "License");
 *    you may not use this file except in compliance with the License.
 *    You may obtain a copy of the License at
 *
 *        http://www.apache.org/licenses/LICENSE-2.0
 *
 *    Unless required by applicable law or agreed to in writing, software
 *    distributed under the License is distributed on an "AS IS" BASIS,
 *    WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *    See the License for the specific language governing permissions and
 *    limitations under the License.
 */

use crate::im::{AttrId, ClusterId, EndptId, GenericPath};

/// A changed attribute (or a wildcard over attributes, clusters or endpoints)
/// and the generation at which it last changed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DirtyRecord {
    pub path: GenericPath,
    pub generation: u64,
}

/// The set of changed attribute paths shared by all subscriptions.
///
/// Each subscription keeps the generation it last reported up to (its
/// watermark). A record is dirty for a subscription if its generation is
/// above that watermark. When the table is full, the incoming change is
/// widened to its cluster, then its endpoint, then the whole node, so a
/// change is never lost; it may only be over-reported.
#[derive(Debug)]
pub struct DirtySet<const N: usize> {
    records: heapless::Vec<DirtyRecord, N>,
    generation: u64,
}

impl<const N: usize> DirtySet<N> {
    pub const fn new() -> Self {
        Self {
            records: heapless::Vec::new(),
            generation: 0,
        }
    }

    /// The generation of the most recent change.
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Record a change of `attr` (or of every attribute of the cluster, if `None`).
    pub fn mark(&mut self, endpoint: EndptId, cluster: ClusterId, attr: Option<AttrId>) -> u64 {
        self.generation += 1;

        self.insert(
            GenericPath::new(Some(endpoint), Some(cluster), attr),
            self.generation,
        );

        self.generation
    }

    /// Record a change of everything on `endpoint`.
    pub fn mark_endpoint(&mut self, endpoint: EndptId) -> u64 {
        self.generation += 1;

        self.insert(GenericPath::new(Some(endpoint), None, None), self.generation);

        self.generation
    }

    /// Return `true` if anything overlapping `path` changed after `watermark`.
    pub fn is_dirty(&self, path: &GenericPath, watermark: u64) -> bool {
        self.records
            .iter()
            .any(|record| record.generation > watermark && record.path.overlaps(path))
    }

    pub fn has_dirty(&self, watermark: u64) -> bool {
        self.records
            .iter()
            .any(|record| record.generation > watermark)
    }

    /// Drop every record all subscriptions have reported.
    pub fn gc(&mut self, watermark: u64) {
        self.records.retain(|record| record.generation > watermark);
    }

    pub fn iter(&self) -> impl Iterator<Item = &DirtyRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn insert(&mut self, mut path: GenericPath, generation: u64) {
        loop {
            if let Some(record) = self
                .records
                .iter_mut()
                .find(|record| record.path.covers(&path))
            {
                record.generation = generation;
                return;
            }

            self.records.retain(|record| !path.covers(&record.path));

            if self.records.push(DirtyRecord { path, generation }).is_ok() {
                return;
            }

            let wider = widen(&path);
            if wider == path {
                return;
            }

            warn!("Dirty set full, widening {:?} to {:?}", path, wider);

            path = wider;
        }
    }
}

impl<const N: usize> Default for DirtySet<N> {
    fn default() -> Self {
        Self::new()
    }
}

fn widen(path: &GenericPath) -> GenericPath {
    if path.leaf.is_some() {
        GenericPath::new(path.endpoint, path.cluster, None)
    } else if path.cluster.is_some() {
        GenericPath::new(path.endpoint, None, None)
    } else {
        GenericPath::new(None, None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::DirtySet;
    use crate::im::GenericPath;

    #[test]
    fn test_mark_and_watermark() {
        let mut dirty = DirtySet::<4>::new();

        let generation = dirty.mark(1, 6, Some(0));

        let path = GenericPath::new(Some(1), Some(6), Some(0));
        assert!(dirty.is_dirty(&path, 0));
        assert!(!dirty.is_dirty(&path, generation));
        assert!(dirty.is_dirty(&GenericPath::new(None, Some(6), None), 0));
        assert!(!dirty.is_dirty(&GenericPath::new(Some(2), None, None), 0));
    }

    #[test]
    fn test_repeated_change_absorbed() {
        let mut dirty = DirtySet::<4>::new();

        dirty.mark(1, 6, Some(0));
        dirty.mark(1, 6, None);
        let generation = dirty.mark(1, 6, Some(0));

        assert_eq!(dirty.len(), 1);
        assert_eq!(dirty.iter().next().unwrap().generation, generation);
        assert_eq!(
            dirty.iter().next().unwrap().path,
            GenericPath::new(Some(1), Some(6), None)
        );
    }

    #[test]
    fn test_overflow_widens() {
        let mut dirty = DirtySet::<2>::new();

        dirty.mark(1, 6, Some(0));
        dirty.mark(1, 8, Some(0));
        dirty.mark(1, 6, Some(1));

        assert_eq!(dirty.len(), 2);
        assert!(dirty.is_dirty(&GenericPath::new(Some(1), Some(6), Some(0)), 0));
        assert!(dirty.is_dirty(&GenericPath::new(Some(1), Some(6), Some(1)), 0));

        dirty.mark(2, 6, Some(0));

        // Only a node-wide record is left
        assert_eq!(dirty.len(), 1);
        assert!(dirty.is_dirty(&GenericPath::new(Some(1), Some(8), Some(0)), 0));
        assert!(dirty.is_dirty(&GenericPath::new(Some(2), Some(6), Some(0)), 0));
    }

    #[test]
    fn test_gc() {
        let mut dirty = DirtySet::<4>::new();

        let first = dirty.mark(1, 6, Some(0));
        dirty.mark(2, 6, Some(0));

        dirty.gc(first);
        assert_eq!(dirty.len(), 1);
        assert!(dirty.has_dirty(first));

        dirty.gc(dirty.generation());
        assert!(dirty.is_empty());
        assert!(!dirty.has_dirty(0));
    }
}
