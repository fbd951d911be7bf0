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

//! This module contains the TLV-serde types of the Interaction Model messages and
//! information blocks exchanged by read and subscribe interactions.

use num::FromPrimitive;
use num_derive::FromPrimitive;

use crate::error::{Error, ErrorCode};
use crate::tlv::{FromTLV, TLVElement, TLVTag, TLVWrite, ToTLV};

pub use attr::*;
pub use event::*;
pub use status::*;

mod attr;
mod event;
mod status;

/// Interaction Model ID as per the Matter Core spec
pub const PROTO_ID_INTERACTION_MODEL: u16 = 0x01;

/// The context tag of the `InteractionModelRevision` field present in every IM message.
pub const IM_REVISION_TAG: u8 = 0xff;

/// The Interaction Model revision this engine speaks by default.
pub const IM_REVISION: u8 = 11;

/// An enumeration of all possible status codes that can be returned by the Interaction Model.
#[derive(FromPrimitive, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IMStatusCode {
    Success = 0,
    Failure = 1,
    InvalidSubscription = 0x7D,
    UnsupportedAccess = 0x7E,
    UnsupportedEndpoint = 0x7F,
    InvalidAction = 0x80,
    UnsupportedCommand = 0x81,
    InvalidCommand = 0x85,
    UnsupportedAttribute = 0x86,
    ConstraintError = 0x87,
    UnsupportedWrite = 0x88,
    ResourceExhausted = 0x89,
    NotFound = 0x8b,
    UnreportableAttribute = 0x8c,
    InvalidDataType = 0x8d,
    UnsupportedRead = 0x8f,
    DataVersionMismatch = 0x92,
    Timeout = 0x94,
    Busy = 0x9c,
    UnsupportedCluster = 0xc3,
    NoUpstreamSubscription = 0xc5,
    NeedsTimedInteraction = 0xc6,
    UnsupportedEvent = 0xc7,
    PathsExhausted = 0xc8,
    TimedRequestMisMatch = 0xc9,
    FailSafeRequired = 0xca,
}

impl From<ErrorCode> for IMStatusCode {
    fn from(e: ErrorCode) -> Self {
        match e {
            ErrorCode::EndpointNotFound => IMStatusCode::UnsupportedEndpoint,
            ErrorCode::ClusterNotFound => IMStatusCode::UnsupportedCluster,
            ErrorCode::AttributeNotFound => IMStatusCode::UnsupportedAttribute,
            ErrorCode::EventNotFound => IMStatusCode::UnsupportedEvent,
            ErrorCode::InvalidAction => IMStatusCode::InvalidAction,
            ErrorCode::InvalidDataType => IMStatusCode::InvalidDataType,
            ErrorCode::UnsupportedAccess => IMStatusCode::UnsupportedAccess,
            ErrorCode::UnsupportedRead => IMStatusCode::UnsupportedRead,
            ErrorCode::Busy => IMStatusCode::Busy,
            ErrorCode::DataVersionMismatch => IMStatusCode::DataVersionMismatch,
            ErrorCode::ResourceExhausted => IMStatusCode::ResourceExhausted,
            ErrorCode::PathsExhausted => IMStatusCode::PathsExhausted,
            ErrorCode::ConstraintError => IMStatusCode::ConstraintError,
            ErrorCode::NotFound => IMStatusCode::NotFound,
            ErrorCode::Timeout => IMStatusCode::Timeout,
            _ => IMStatusCode::Failure,
        }
    }
}

impl From<Error> for IMStatusCode {
    fn from(value: Error) -> Self {
        Self::from(value.code())
    }
}

impl FromTLV<'_> for IMStatusCode {
    fn from_tlv(t: &TLVElement) -> Result<Self, Error> {
        FromPrimitive::from_u16(t.u16()?).ok_or_else(|| ErrorCode::Invalid.into())
    }
}

impl ToTLV for IMStatusCode {
    fn to_tlv<W: TLVWrite>(&self, tag: &TLVTag, mut tw: W) -> Result<(), Error> {
        tw.u16(tag, *self as _)
    }
}

/// An enumeration of all possible opcodes used in the Interaction Model.
#[derive(FromPrimitive, Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OpCode {
    Reserved = 0,
    StatusResponse = 1,
    ReadRequest = 2,
    SubscribeRequest = 3,
    SubscribeResponse = 4,
    ReportData = 5,
    WriteRequest = 6,
    WriteResponse = 7,
    InvokeRequest = 8,
    InvokeResponse = 9,
    TimedRequest = 10,
}

impl OpCode {
    pub fn from_u8(opcode: u8) -> Result<Self, Error> {
        FromPrimitive::from_u8(opcode).ok_or_else(|| ErrorCode::InvalidOpcode.into())
    }

    /// Return `true` if the opcode payload is in TLV format.
    pub const fn is_tlv(&self) -> bool {
        !matches!(self, Self::Reserved)
    }
}

// Type aliases for first-class matter types
pub type EndptId = u16;
pub type ClusterId = u32;
pub type AttrId = u32;
pub type EventId = u32;
pub type EventNumber = u64;
pub type DataVersion = u32;
pub type FabricIndex = u8;
pub type NodeId = u64;
pub type ListIndex = u16;
pub type ClusterStatus = u16;
pub type SubscriptionId = u32;
pub type InteractionModelRevision = u8;

/// A generic (possibly a wildcard) path with endpoint, cluster, and a leaf
///
/// The leaf is an attribute or an event id. Look at `AttrPath` and `EventPath` for the
/// TLV structures, which can be turned into a `GenericPath` using their `to_gp()` method.
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GenericPath {
    /// The endpoint ID, if specified, otherwise `None` for wildcard
    pub endpoint: Option<EndptId>,
    /// The cluster ID, if specified, otherwise `None` for wildcard
    pub cluster: Option<ClusterId>,
    /// The leaf ID, if specified, otherwise `None` for wildcard
    pub leaf: Option<u32>,
}

impl GenericPath {
    pub const fn new(
        endpoint: Option<EndptId>,
        cluster: Option<ClusterId>,
        leaf: Option<u32>,
    ) -> Self {
        Self {
            endpoint,
            cluster,
            leaf,
        }
    }

    /// Return the concrete triple, or an error if any of the fields is a wildcard
    pub fn not_wildcard(&self) -> Result<(EndptId, ClusterId, u32), Error> {
        match *self {
            GenericPath {
                endpoint: Some(e),
                cluster: Some(c),
                leaf: Some(l),
            } => Ok((e, c, l)),
            _ => Err(ErrorCode::Invalid.into()),
        }
    }

    pub const fn is_wildcard(&self) -> bool {
        !matches!(
            *self,
            GenericPath {
                endpoint: Some(_),
                cluster: Some(_),
                leaf: Some(_),
            }
        )
    }

    /// Return `true` if the concrete triple is covered by this path.
    pub fn matches(&self, endpoint: EndptId, cluster: ClusterId, leaf: u32) -> bool {
        self.endpoint.is_none_or(|e| e == endpoint)
            && self.cluster.is_none_or(|c| c == cluster)
            && self.leaf.is_none_or(|l| l == leaf)
    }

    /// Return `true` if every concrete path matched by `other` is matched by this path.
    pub fn covers(&self, other: &GenericPath) -> bool {
        fn field<T: PartialEq>(wide: Option<T>, narrow: Option<T>) -> bool {
            wide.is_none() || wide == narrow
        }

        field(self.endpoint, other.endpoint)
            && field(self.cluster, other.cluster)
            && field(self.leaf, other.leaf)
    }

    /// Return `true` if some concrete path is matched by both this path and `other`.
    pub fn overlaps(&self, other: &GenericPath) -> bool {
        fn field<T: PartialEq>(a: Option<T>, b: Option<T>) -> bool {
            match (a, b) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
        }

        field(self.endpoint, other.endpoint)
            && field(self.cluster, other.cluster)
            && field(self.leaf, other.leaf)
    }
}

#[cfg(test)]
mod tests {
    use super::{GenericPath, IMStatusCode, OpCode};
    use crate::error::ErrorCode;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            IMStatusCode::from(ErrorCode::ClusterNotFound),
            IMStatusCode::UnsupportedCluster
        );
        assert_eq!(
            IMStatusCode::from(ErrorCode::EventNotFound),
            IMStatusCode::UnsupportedEvent
        );
        assert_eq!(
            IMStatusCode::from(ErrorCode::TLVTypeMismatch),
            IMStatusCode::Failure
        );
    }

    #[test]
    fn test_opcode() {
        assert_eq!(OpCode::from_u8(3).unwrap(), OpCode::SubscribeRequest);
        assert_eq!(
            OpCode::from_u8(42).map_err(|e| e.code()),
            Err(ErrorCode::InvalidOpcode)
        );
    }

    #[test]
    fn test_path_matching() {
        let path = GenericPath::new(None, Some(6), None);

        assert!(path.is_wildcard());
        assert!(path.matches(2, 6, 0xfffd));
        assert!(!path.matches(2, 8, 0));
        assert_eq!(
            GenericPath::new(Some(1), Some(6), Some(0)).not_wildcard().unwrap(),
            (1, 6, 0)
        );
    }

    #[test]
    fn test_path_overlap() {
        let cluster = GenericPath::new(None, Some(6), None);
        let endpoint = GenericPath::new(Some(1), None, None);
        let attr = GenericPath::new(Some(1), Some(6), Some(0));

        // Wildcards on different fields still share (1, 6, *)
        assert!(cluster.overlaps(&endpoint));
        assert!(endpoint.overlaps(&cluster));
        assert!(!cluster.covers(&endpoint));
        assert!(!endpoint.covers(&cluster));

        assert!(cluster.covers(&attr));
        assert!(!attr.covers(&cluster));
        assert!(attr.overlaps(&cluster));

        assert!(!attr.overlaps(&GenericPath::new(Some(2), None, None)));
        assert!(!cluster.overlaps(&GenericPath::new(None, Some(8), Some(0))));
    }
}
