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

use num_enum::TryFromPrimitive;

use crate::error::{Error, ErrorCode};
use crate::tlv::{FromTLV, TLVElement, TLVTag, TLVWrite, ToTLV};

use super::{ClusterId, EndptId, EventId, EventNumber, GenericPath, IMStatusCode, NodeId, Status};

/// Event Filter
///
/// Corresponds to the `EventFilterIB` TLV structure in the Interaction Model.
#[derive(Default, Debug, Clone, PartialEq, Eq, Hash, FromTLV, ToTLV)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EventFilter {
    pub node: Option<NodeId>,
    pub event_min: Option<EventNumber>,
}

/// Event Path
///
/// Corresponds to the `EventPathIB` TLV list in the Interaction Model.
#[derive(Default, Debug, Clone, PartialEq, Eq, Hash, FromTLV, ToTLV)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[tlvargs(datatype = "list")]
pub struct EventPath {
    pub node: Option<NodeId>,
    pub endpoint: Option<EndptId>,
    pub cluster: Option<ClusterId>,
    pub event: Option<EventId>,
    pub is_urgent: Option<bool>,
}

impl EventPath {
    pub const fn from_gp(path: &GenericPath) -> Self {
        Self {
            node: None,
            endpoint: path.endpoint,
            cluster: path.cluster,
            event: path.leaf,
            is_urgent: None,
        }
    }

    pub const fn to_gp(&self) -> GenericPath {
        GenericPath::new(self.endpoint, self.cluster, self.event)
    }
}

/// Tags corresponding to the fields in the `EventReportIB` TLV structure.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum EventRespTag {
    Status = 0,
    Data = 1,
}

/// Tags corresponding to the fields in the `EventDataIB` TLV structure.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum EventDataTag {
    Path = 0,
    EventNumber = 1,
    Priority = 2,
    EpochTimestamp = 3,
    SystemTimestamp = 4,
    DeltaEpochTimestamp = 5,
    DeltaSystemTimestamp = 6,
    Data = 7,
}

/// A status response for an event in the Interaction Model.
///
/// Corresponds to the `EventStatusIB` TLV structure in the Interaction Model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, FromTLV, ToTLV)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EventStatus {
    pub path: EventPath,
    pub status: Status,
}

impl EventStatus {
    pub const fn new(path: EventPath, status: IMStatusCode, cluster_status: Option<u16>) -> Self {
        Self {
            path,
            status: Status::new(status, cluster_status),
        }
    }

    pub const fn from_gp(
        path: &GenericPath,
        status: IMStatusCode,
        cluster_status: Option<u16>,
    ) -> Self {
        Self::new(EventPath::from_gp(path), status, cluster_status)
    }
}

/// Event Response
///
/// Corresponds to the `EventReportIB` TLV structure in the Interaction Model.
#[derive(Clone, PartialEq, Debug, FromTLV, ToTLV)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[tlvargs(lifetime = "'a")]
pub enum EventResp<'a> {
    Status(EventStatus),
    Data(EventData<'a>),
}

/// A data response for an event in the Interaction Model.
///
/// Corresponds to the `EventDataIB` TLV structure in the Interaction Model.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EventData<'a> {
    pub path: EventPath,
    /// Monotonically increasing while the node runs
    pub event_number: EventNumber,
    /// Lower means more important
    pub priority: u8,
    pub timestamp: EventDataTimestamp,
    pub data: TLVElement<'a>,
}

impl<'a> EventData<'a> {
    pub const fn new(
        path: EventPath,
        event_number: EventNumber,
        priority: u8,
        timestamp: EventDataTimestamp,
        data: TLVElement<'a>,
    ) -> Self {
        Self {
            path,
            event_number,
            priority,
            timestamp,
            data,
        }
    }
}

// Manual because of the tagged union used for the timestamp
impl ToTLV for EventData<'_> {
    fn to_tlv<W: TLVWrite>(&self, tag: &TLVTag, mut tw: W) -> Result<(), Error> {
        tw.start_struct(tag)?;
        self.path
            .to_tlv(&TLVTag::Context(EventDataTag::Path as _), &mut tw)?;
        tw.u64(
            &TLVTag::Context(EventDataTag::EventNumber as _),
            self.event_number,
        )?;
        tw.u8(&TLVTag::Context(EventDataTag::Priority as _), self.priority)?;

        let (ts_tag, ts) = self.timestamp.tag_and_value();
        tw.u64(&TLVTag::Context(ts_tag as _), ts)?;

        self.data
            .to_tlv(&TLVTag::Context(EventDataTag::Data as _), &mut tw)?;

        tw.end_container()
    }
}

impl<'a> FromTLV<'a> for EventData<'a> {
    fn from_tlv(element: &TLVElement<'a>) -> Result<Self, Error> {
        let mut path = None;
        let mut event_number = None;
        let mut priority = None;
        let mut timestamp = None;
        let mut data = None;

        for field in element.r#struct()?.iter() {
            let el = field?;

            let tag = EventDataTag::try_from(el.ctx()?).map_err(|_| ErrorCode::Invalid)?;

            match tag {
                EventDataTag::Path => path = Some(EventPath::from_tlv(&el)?),
                EventDataTag::EventNumber => event_number = Some(el.u64()?),
                EventDataTag::Priority => priority = Some(el.u8()?),
                EventDataTag::EpochTimestamp => {
                    timestamp = Some(EventDataTimestamp::EpochTimestamp(el.u64()?))
                }
                EventDataTag::SystemTimestamp => {
                    timestamp = Some(EventDataTimestamp::SystemTimestamp(el.u64()?))
                }
                EventDataTag::DeltaEpochTimestamp => {
                    timestamp = Some(EventDataTimestamp::DeltaEpochTimestamp(el.u64()?))
                }
                EventDataTag::DeltaSystemTimestamp => {
                    timestamp = Some(EventDataTimestamp::DeltaSystemTimestamp(el.u64()?))
                }
                EventDataTag::Data => data = Some(el),
            }
        }

        Ok(EventData::new(
            path.ok_or(ErrorCode::Invalid)?,
            event_number.ok_or(ErrorCode::Invalid)?,
            priority.ok_or(ErrorCode::Invalid)?,
            timestamp.ok_or(ErrorCode::Invalid)?,
            data.ok_or(ErrorCode::Invalid)?,
        ))
    }
}

/// The timestamp of an event; `EventDataIB` carries exactly one of these.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventDataTimestamp {
    /// Milliseconds since 1970-01-01 00:00:00 UTC
    EpochTimestamp(u64),
    /// Milliseconds since boot
    SystemTimestamp(u64),
    /// Delta to the previously emitted event, epoch clock
    DeltaEpochTimestamp(u64),
    /// Delta to the previously emitted event, system clock
    DeltaSystemTimestamp(u64),
}

impl EventDataTimestamp {
    pub(crate) const fn tag_and_value(&self) -> (EventDataTag, u64) {
        match *self {
            Self::EpochTimestamp(ts) => (EventDataTag::EpochTimestamp, ts),
            Self::SystemTimestamp(ts) => (EventDataTag::SystemTimestamp, ts),
            Self::DeltaEpochTimestamp(ts) => (EventDataTag::DeltaEpochTimestamp, ts),
            Self::DeltaSystemTimestamp(ts) => (EventDataTag::DeltaSystemTimestamp, ts),
        }
    }
}
