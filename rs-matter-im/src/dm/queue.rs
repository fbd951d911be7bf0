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

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::{Channel, TrySendError};

use crate::error::{Error, ErrorCode};
use crate::im::{AttrId, ClusterId, EndptId, EventId};

/// A data-model change reported from outside the engine's task.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WorkItem {
    /// An attribute changed; `None` stands for all attributes of the cluster
    AttributeChanged {
        endpoint: EndptId,
        cluster: ClusterId,
        attr: Option<AttrId>,
    },
    EventEmitted {
        endpoint: EndptId,
        cluster: ClusterId,
        event: EventId,
    },
}

/// A bounded queue through which other tasks and threads hand changes over to
/// the engine, which drains it with `Engine::process_work`.
///
/// With `StdRawMutex` the queue can be shared between OS threads; within a
/// single executor `NoopRawMutex` is enough.
pub struct WorkQueue<M, const N: usize>
where
    M: RawMutex,
{
    channel: Channel<M, WorkItem, N>,
}

impl<M, const N: usize> WorkQueue<M, N>
where
    M: RawMutex,
{
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
        }
    }

    /// Queue an item without waiting; fails with `Busy` when the queue is full.
    pub fn post(&self, item: WorkItem) -> Result<(), Error> {
        self.channel.try_send(item).map_err(|e| match e {
            TrySendError::Full(item) => {
                warn!("Work queue full, dropping {:?}", item);
                ErrorCode::Busy.into()
            }
        })
    }

    /// Queue an item, waiting for room.
    pub async fn post_async(&self, item: WorkItem) {
        self.channel.send(item).await;
    }

    pub fn try_take(&self) -> Option<WorkItem> {
        self.channel.try_receive().ok()
    }

    /// Wait until an item is available and take it.
    pub async fn wait(&self) -> WorkItem {
        self.channel.receive().await
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }
}

impl<M, const N: usize> Default for WorkQueue<M, N>
where
    M: RawMutex,
{
    fn default() -> Self {
        Self::new()
    }
}
