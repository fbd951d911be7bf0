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

//! A fixed-capacity arena with generation-checked handles.
//!
//! Handles stay small and `Copy`, and a handle to a freed slot never resolves
//! to whatever was allocated into that slot later.

/// A handle to an entry of a [`Slab`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SlabRef {
    index: u16,
    generation: u16,
}

impl SlabRef {
    pub const fn index(&self) -> usize {
        self.index as usize
    }
}

struct Slot<T> {
    generation: u16,
    value: Option<T>,
}

pub struct Slab<T, const N: usize> {
    slots: heapless::Vec<Slot<T>, N>,
    len: usize,
}

impl<T, const N: usize> Slab<T, N> {
    pub const fn new() -> Self {
        Self {
            slots: heapless::Vec::new(),
            len: 0,
        }
    }

    /// Store `value`, handing it back if every slot is taken.
    pub fn insert(&mut self, value: T) -> Result<SlabRef, T> {
        if let Some(index) = self.slots.iter().position(|slot| slot.value.is_none()) {
            let slot = &mut self.slots[index];

            slot.generation = slot.generation.wrapping_add(1);
            slot.value = Some(value);
            self.len += 1;

            return Ok(SlabRef {
                index: index as u16,
                generation: slot.generation,
            });
        }

        if self.slots.is_full() {
            return Err(value);
        }

        let index = self.slots.len();

        let pushed = self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        debug_assert!(pushed.is_ok());
        self.len += 1;

        Ok(SlabRef {
            index: index as u16,
            generation: 0,
        })
    }

    pub fn get(&self, handle: SlabRef) -> Option<&T> {
        self.slots
            .get(handle.index())
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    pub fn get_mut(&mut self, handle: SlabRef) -> Option<&mut T> {
        self.slots
            .get_mut(handle.index())
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    pub fn remove(&mut self, handle: SlabRef) -> Option<T> {
        let slot = self
            .slots
            .get_mut(handle.index())
            .filter(|slot| slot.generation == handle.generation)?;

        let value = slot.value.take();

        if value.is_some() {
            self.len -= 1;
        }

        value
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlabRef, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    SlabRef {
                        index: index as u16,
                        generation: slot.generation,
                    },
                    value,
                )
            })
        })
    }

    pub fn refs(&self) -> impl Iterator<Item = SlabRef> + '_ {
        self.iter().map(|(handle, _)| handle)
    }

    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub const fn is_full(&self) -> bool {
        self.len == N
    }
}

impl<T, const N: usize> Default for Slab<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
