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

//! The data model side of the engine: the traits through which the device's
//! data model is enumerated and read, and the machinery that turns read and
//! subscribe interactions into reports.

use crate::error::Error;
use crate::im::{
    AttrId, AttrPath, AttrStatus, ClusterId, EndptId, EventId, EventPath, EventStatus,
    FabricIndex, GenericPath, IMStatusCode, IM_REVISION,
};

pub use dataver::*;
pub use dirty::*;
pub use encoder::*;
pub use engine::*;
pub use expander::*;
pub use node::*;
pub use queue::*;
pub use read_handler::*;
pub use report::*;
pub use scheduler::*;
pub use timer::*;

mod dataver;
mod dirty;
mod encoder;
mod engine;
mod expander;
mod node;
mod queue;
mod read_handler;
mod report;
mod scheduler;
mod timer;

/// The maximum number of attribute (and, separately, event) paths a single
/// read or subscribe request may carry.
pub const MAX_PATHS_PER_REQUEST: usize = 9;

/// The maximum number of data version filters kept per request.
pub const MAX_DATAVER_FILTERS_PER_REQUEST: usize = 8;

/// The default size of a report chunk, IM headers excluded.
pub const MAX_REPORT_SIZE: usize = 1024;

/// Live enumeration of the data model.
///
/// Enumerations do not need to be sorted; the path expander imposes the order.
pub trait Metadata {
    fn endpoints(&self) -> Result<impl Iterator<Item = EndptId> + '_, Error>;

    /// Fails with `EndpointNotFound` for an unknown endpoint.
    fn clusters(&self, endpoint: EndptId) -> Result<impl Iterator<Item = ClusterId> + '_, Error>;

    /// Fails with `EndpointNotFound` or `ClusterNotFound`.
    fn attributes(
        &self,
        endpoint: EndptId,
        cluster: ClusterId,
    ) -> Result<impl Iterator<Item = AttrId> + '_, Error>;

    /// Fails with `EndpointNotFound` or `ClusterNotFound`.
    fn events(
        &self,
        endpoint: EndptId,
        cluster: ClusterId,
    ) -> Result<impl Iterator<Item = EventId> + '_, Error>;
}

impl<T> Metadata for &T
where
    T: Metadata,
{
    fn endpoints(&self) -> Result<impl Iterator<Item = EndptId> + '_, Error> {
        (**self).endpoints()
    }

    fn clusters(&self, endpoint: EndptId) -> Result<impl Iterator<Item = ClusterId> + '_, Error> {
        (**self).clusters(endpoint)
    }

    fn attributes(
        &self,
        endpoint: EndptId,
        cluster: ClusterId,
    ) -> Result<impl Iterator<Item = AttrId> + '_, Error> {
        (**self).attributes(endpoint, cluster)
    }

    fn events(
        &self,
        endpoint: EndptId,
        cluster: ClusterId,
    ) -> Result<impl Iterator<Item = EventId> + '_, Error> {
        (**self).events(endpoint, cluster)
    }
}

/// Reads attribute values and pending events of the data model.
pub trait DataHandler {
    /// Encode the value of one concrete attribute.
    ///
    /// The handler reports the data version of the cluster through
    /// `AttrDataEncoder::with_dataver`; if that returns `None` the value is
    /// filtered out and nothing needs to be written.
    fn read(&self, attr: &AttrDetails, encoder: AttrDataEncoder) -> Result<(), Error>;

    /// Push the events recorded for one concrete event path, in ascending
    /// event number order.
    fn read_events(&self, _event: &EventDetails, _encoder: EventDataEncoder) -> Result<(), Error> {
        Ok(())
    }
}

impl<T> DataHandler for &T
where
    T: DataHandler,
{
    fn read(&self, attr: &AttrDetails, encoder: AttrDataEncoder) -> Result<(), Error> {
        (**self).read(attr, encoder)
    }

    fn read_events(&self, event: &EventDetails, encoder: EventDataEncoder) -> Result<(), Error> {
        (**self).read_events(event, encoder)
    }
}

/// A complete data model provider: metadata and a handler.
pub trait DataModel: Metadata + DataHandler {}

impl<T> DataModel for T where T: Metadata + DataHandler {}

/// Pairs static metadata (typically a [`Node`]) with a separate handler.
impl<M, H> Metadata for (M, H)
where
    M: Metadata,
{
    fn endpoints(&self) -> Result<impl Iterator<Item = EndptId> + '_, Error> {
        self.0.endpoints()
    }

    fn clusters(&self, endpoint: EndptId) -> Result<impl Iterator<Item = ClusterId> + '_, Error> {
        self.0.clusters(endpoint)
    }

    fn attributes(
        &self,
        endpoint: EndptId,
        cluster: ClusterId,
    ) -> Result<impl Iterator<Item = AttrId> + '_, Error> {
        self.0.attributes(endpoint, cluster)
    }

    fn events(
        &self,
        endpoint: EndptId,
        cluster: ClusterId,
    ) -> Result<impl Iterator<Item = EventId> + '_, Error> {
        self.0.events(endpoint, cluster)
    }
}

impl<M, H> DataHandler for (M, H)
where
    H: DataHandler,
{
    fn read(&self, attr: &AttrDetails, encoder: AttrDataEncoder) -> Result<(), Error> {
        self.1.read(attr, encoder)
    }

    fn read_events(&self, event: &EventDetails, encoder: EventDataEncoder) -> Result<(), Error> {
        self.1.read_events(event, encoder)
    }
}

/// A concrete attribute being read, together with the context of the read.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AttrDetails {
    /// The actual endpoint ID
    pub endpoint_id: EndptId,
    /// The actual cluster ID
    pub cluster_id: ClusterId,
    /// The actual attribute ID
    pub attr_id: AttrId,
    /// The accessing fabric index
    pub fab_idx: FabricIndex,
    /// Fabric Filtering Activated
    pub fab_filter: bool,
    pub dataver: Option<u32>,
    /// Whether the path came out of a wildcard request
    pub wildcard: bool,
}

impl AttrDetails {
    pub fn path(&self) -> AttrPath {
        AttrPath {
            endpoint: Some(self.endpoint_id),
            cluster: Some(self.cluster_id),
            attr: Some(self.attr_id),
            ..Default::default()
        }
    }

    /// The status to report for this attribute, if any.
    ///
    /// Unsupported paths and data version mismatches are silently dropped
    /// when they come from a wildcard expansion.
    pub fn status(&self, status: IMStatusCode) -> Option<AttrStatus> {
        should_report(self.wildcard, status).then(|| {
            AttrStatus::from_gp(
                &GenericPath::new(
                    Some(self.endpoint_id),
                    Some(self.cluster_id),
                    Some(self.attr_id),
                ),
                status,
                None,
            )
        })
    }
}

/// A concrete event path being read, together with the context of the read.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EventDetails {
    pub endpoint_id: EndptId,
    pub cluster_id: ClusterId,
    pub event_id: EventId,
    pub fab_idx: FabricIndex,
    pub fab_filter: bool,
    pub wildcard: bool,
}

impl EventDetails {
    pub fn path(&self) -> EventPath {
        EventPath {
            endpoint: Some(self.endpoint_id),
            cluster: Some(self.cluster_id),
            event: Some(self.event_id),
            ..Default::default()
        }
    }

    pub fn status(&self, status: IMStatusCode) -> Option<EventStatus> {
        should_report(self.wildcard, status)
            .then(|| EventStatus::new(self.path(), status, None))
    }
}

fn should_report(wildcard: bool, status: IMStatusCode) -> bool {
    !wildcard
        || !matches!(
            status,
            IMStatusCode::UnsupportedEndpoint
                | IMStatusCode::UnsupportedCluster
                | IMStatusCode::UnsupportedAttribute
                | IMStatusCode::UnsupportedEvent
                | IMStatusCode::UnsupportedAccess
                | IMStatusCode::UnsupportedRead
                | IMStatusCode::DataVersionMismatch
        )
}

/// Tunables of the engine.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ImConfig {
    /// Upper bound of any negotiated max interval, in seconds
    pub max_interval_ceiling_secs: u16,
    /// Lower bound of any negotiated max interval, in seconds
    pub min_keepalive_secs: u16,
    /// Failed report generations tolerated before a subscription is dropped
    pub max_report_retries: u8,
    /// Maximum size of one `ReportData` payload
    pub max_chunk_size: usize,
    pub im_revision: u8,
}

impl ImConfig {
    pub const fn new() -> Self {
        Self {
            max_interval_ceiling_secs: 3600,
            min_keepalive_secs: 40,
            max_report_retries: 3,
            max_chunk_size: MAX_REPORT_SIZE,
            im_revision: IM_REVISION,
        }
    }
}

impl Default for ImConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{AttrDetails, EventDetails};
    use crate::im::IMStatusCode;

    fn attr(wildcard: bool) -> AttrDetails {
        AttrDetails {
            endpoint_id: 1,
            cluster_id: 6,
            attr_id: 0,
            fab_idx: 1,
            fab_filter: false,
            dataver: None,
            wildcard,
        }
    }

    #[test]
    fn test_wildcard_status_suppression() {
        assert!(attr(true).status(IMStatusCode::UnsupportedRead).is_none());
        assert!(attr(true).status(IMStatusCode::Failure).is_some());

        let status = attr(false).status(IMStatusCode::UnsupportedRead).unwrap();
        assert_eq!(status.path.endpoint, Some(1));
        assert_eq!(status.status.status, IMStatusCode::UnsupportedRead);
    }

    #[test]
    fn test_event_status() {
        let event = EventDetails {
            endpoint_id: 0,
            cluster_id: 0x28,
            event_id: 0,
            fab_idx: 0,
            fab_filter: false,
            wildcard: false,
        };

        let status = event.status(IMStatusCode::UnsupportedEvent).unwrap();
        assert_eq!(status.path.cluster, Some(0x28));
    }
}
