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

//! Static data model metadata: a `Node` is a tree of endpoints, clusters,
//! attributes and events, usually declared as `const` items.

use core::fmt;

use bitflags::bitflags;

use crate::error::{Error, ErrorCode};
use crate::im::{AttrId, ClusterId, EndptId, EventId};

use super::Metadata;

bitflags! {
    /// Access flags of an attribute.
    #[repr(transparent)]
    #[derive(Default, Debug, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct Access: u16 {
        const NEED_VIEW = 0x0001;
        const NEED_OPERATE = 0x0002;
        const NEED_MANAGE = 0x0004;
        const NEED_ADMIN = 0x0008;

        const READ = 0x0010;
        const WRITE = 0x0020;
        const FAB_SCOPED = 0x0040;
        const FAB_SENSITIVE = 0x0080;

        const RV = Self::READ.bits() | Self::NEED_VIEW.bits();
        const RF = Self::READ.bits() | Self::FAB_SCOPED.bits();
        const RWVM = Self::READ.bits() | Self::WRITE.bits() | Self::NEED_VIEW.bits() | Self::NEED_MANAGE.bits();
        const WO = Self::WRITE.bits() | Self::NEED_OPERATE.bits();
    }
}

/// Global attributes and elements present on every cluster.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum GlobalElements {
    FabricIndex = 0xFE,
    GeneratedCmdList = 0xFFF8,
    AcceptedCmdList = 0xFFF9,
    EventList = 0xFFFA,
    AttributeList = 0xFFFB,
    FeatureMap = 0xFFFC,
    ClusterRevision = 0xFFFD,
}

/// A type modeling the attribute meta-data in the Matter data model.
#[derive(Debug, Clone)]
pub struct Attribute {
    pub id: AttrId,
    pub access: Access,
}

impl Attribute {
    pub const fn new(id: AttrId, access: Access) -> Self {
        Self { id, access }
    }

    /// Return `true` if the attribute ID is a global one.
    pub fn is_system_attr(attr_id: AttrId) -> bool {
        attr_id >= (GlobalElements::GeneratedCmdList as AttrId)
    }

    pub fn is_readable(&self) -> bool {
        self.access.contains(Access::READ)
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

#[derive(Debug, Clone)]
pub struct Cluster<'a> {
    pub id: ClusterId,
    pub revision: u16,
    pub attributes: &'a [Attribute],
    pub events: &'a [EventId],
}

impl<'a> Cluster<'a> {
    pub const fn new(
        id: ClusterId,
        revision: u16,
        attributes: &'a [Attribute],
        events: &'a [EventId],
    ) -> Self {
        Self {
            id,
            revision,
            attributes,
            events,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Endpoint<'a> {
    pub id: EndptId,
    pub clusters: &'a [Cluster<'a>],
}

impl<'a> Endpoint<'a> {
    pub const fn new(id: EndptId, clusters: &'a [Cluster<'a>]) -> Self {
        Self { id, clusters }
    }

    pub fn cluster(&self, id: ClusterId) -> Result<&Cluster<'a>, Error> {
        self.clusters
            .iter()
            .find(|cluster| cluster.id == id)
            .ok_or_else(|| ErrorCode::ClusterNotFound.into())
    }
}

/// The data model of a device.
#[derive(Debug, Clone)]
pub struct Node<'a> {
    pub id: u16,
    pub endpoints: &'a [Endpoint<'a>],
}

impl<'a> Node<'a> {
    pub const fn new(id: u16, endpoints: &'a [Endpoint<'a>]) -> Self {
        Self { id, endpoints }
    }

    pub fn endpoint(&self, id: EndptId) -> Result<&Endpoint<'a>, Error> {
        self.endpoints
            .iter()
            .find(|endpoint| endpoint.id == id)
            .ok_or_else(|| ErrorCode::EndpointNotFound.into())
    }

    pub fn cluster(&self, endpoint: EndptId, cluster: ClusterId) -> Result<&Cluster<'a>, Error> {
        self.endpoint(endpoint)?.cluster(cluster)
    }
}

impl Metadata for Node<'_> {
    fn endpoints(&self) -> Result<impl Iterator<Item = EndptId> + '_, Error> {
        Ok(self.endpoints.iter().map(|endpoint| endpoint.id))
    }

    fn clusters(&self, endpoint: EndptId) -> Result<impl Iterator<Item = ClusterId> + '_, Error> {
        Ok(self
            .endpoint(endpoint)?
            .clusters
            .iter()
            .map(|cluster| cluster.id))
    }

    /// Write-only attributes are not enumerated.
    fn attributes(
        &self,
        endpoint: EndptId,
        cluster: ClusterId,
    ) -> Result<impl Iterator<Item = AttrId> + '_, Error> {
        Ok(self
            .cluster(endpoint, cluster)?
            .attributes
            .iter()
            .filter(|attr| attr.is_readable())
            .map(|attr| attr.id))
    }

    fn events(
        &self,
        endpoint: EndptId,
        cluster: ClusterId,
    ) -> Result<impl Iterator<Item = EventId> + '_, Error> {
        Ok(self.cluster(endpoint, cluster)?.events.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::{Access, Attribute, Cluster, Endpoint, GlobalElements, Node};
    use crate::dm::Metadata;
    use crate::error::ErrorCode;

    const ATTRS: &[Attribute] = &[
        Attribute::new(0, Access::RV),
        Attribute::new(0x4003, Access::WO),
        Attribute::new(GlobalElements::ClusterRevision as _, Access::RV),
    ];

    const NODE: Node<'static> = Node::new(
        0,
        &[Endpoint::new(
            1,
            &[Cluster::new(6, 4, ATTRS, &[0])],
        )],
    );

    #[test]
    fn test_enumeration() {
        assert_eq!(NODE.endpoints().unwrap().collect::<Vec<_>>(), [1]);
        assert_eq!(NODE.clusters(1).unwrap().collect::<Vec<_>>(), [6]);
        assert_eq!(
            NODE.attributes(1, 6).unwrap().collect::<Vec<_>>(),
            [0, 0xfffd]
        );
        assert_eq!(NODE.events(1, 6).unwrap().collect::<Vec<_>>(), [0]);
    }

    #[test]
    fn test_missing_elements() {
        assert_eq!(
            NODE.clusters(2).map(|_| ()).map_err(|e| e.code()),
            Err(ErrorCode::EndpointNotFound)
        );
        assert_eq!(
            NODE.attributes(1, 8).map(|_| ()).map_err(|e| e.code()),
            Err(ErrorCode::ClusterNotFound)
        );
        assert!(Attribute::is_system_attr(0xfffd));
        assert!(!Attribute::is_system_attr(0));
    }
}
