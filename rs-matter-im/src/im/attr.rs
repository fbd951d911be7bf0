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

use crate::tlv::{FromTLV, Nullable, TLVArray, TLVElement, ToTLV};

use super::{
    AttrId, ClusterId, DataVersion, EndptId, EventResp, GenericPath, IMStatusCode, ListIndex,
    NodeId, Status, SubscriptionId,
};

pub use read::*;
pub use subscribe::*;

mod read;
mod subscribe;

/// A path to an attribute in the Interaction Model.
///
/// Corresponds to the `AttrPathIB` TLV list in the Interaction Model.
#[derive(Default, Clone, Debug, PartialEq, Eq, Hash, FromTLV, ToTLV)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[tlvargs(datatype = "list")]
pub struct AttrPath {
    pub tag_compression: Option<bool>,
    pub node: Option<NodeId>,
    pub endpoint: Option<EndptId>,
    pub cluster: Option<ClusterId>,
    pub attr: Option<AttrId>,
    pub list_index: Option<Nullable<ListIndex>>,
}

impl AttrPath {
    /// Create a new `AttrPath` from the provided `GenericPath`,
    /// filling all fields which are not provided with their default values.
    pub const fn from_gp(path: &GenericPath) -> Self {
        Self {
            endpoint: path.endpoint,
            cluster: path.cluster,
            attr: path.leaf,
            tag_compression: None,
            node: None,
            list_index: None,
        }
    }

    pub const fn to_gp(&self) -> GenericPath {
        GenericPath::new(self.endpoint, self.cluster, self.attr)
    }
}

/// A status response for an attribute in the Interaction Model.
///
/// Corresponds to the `AttrStatusIB` TLV structure in the Interaction Model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, FromTLV, ToTLV)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AttrStatus {
    pub path: AttrPath,
    pub status: Status,
}

impl AttrStatus {
    pub const fn new(path: AttrPath, status: IMStatusCode, cluster_status: Option<u16>) -> Self {
        Self {
            path,
            status: Status::new(status, cluster_status),
        }
    }

    /// Create a new `AttrStatus` from a `GenericPath`.
    ///
    /// Only the endpoint, cluster and attribute fields of the reply path get populated.
    pub const fn from_gp(
        path: &GenericPath,
        status: IMStatusCode,
        cluster_status: Option<u16>,
    ) -> Self {
        Self::new(AttrPath::from_gp(path), status, cluster_status)
    }
}

/// A data response for an attribute in the Interaction Model.
///
/// Corresponds to the `AttrDataIB` TLV structure in the Interaction Model.
#[derive(Debug, Clone, PartialEq, FromTLV, ToTLV)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[tlvargs(lifetime = "'a")]
pub struct AttrData<'a> {
    pub data_ver: Option<DataVersion>,
    pub path: AttrPath,
    pub data: TLVElement<'a>,
}

impl<'a> AttrData<'a> {
    pub const fn new(data_ver: Option<DataVersion>, path: AttrPath, data: TLVElement<'a>) -> Self {
        Self {
            data_ver,
            path,
            data,
        }
    }
}

/// Tags corresponding to the fields in the `AttrDataIB` TLV structure.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum AttrDataTag {
    DataVer = 0,
    Path = 1,
    Data = 2,
}

/// Attribute Response
///
/// Corresponds to the `AttributeReportIB` TLV structure in the Interaction Model.
#[derive(Clone, PartialEq, Debug, FromTLV, ToTLV)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[tlvargs(lifetime = "'a")]
pub enum AttrResp<'a> {
    Status(AttrStatus),
    Data(AttrData<'a>),
}

impl<'a> AttrResp<'a> {
    /// The concrete path this report item is about.
    pub fn path(&self) -> &AttrPath {
        match self {
            Self::Status(status) => &status.path,
            Self::Data(data) => &data.path,
        }
    }
}

impl<'a> From<AttrData<'a>> for AttrResp<'a> {
    fn from(value: AttrData<'a>) -> Self {
        Self::Data(value)
    }
}

impl From<AttrStatus> for AttrResp<'_> {
    fn from(value: AttrStatus) -> Self {
        Self::Status(value)
    }
}

/// Tags corresponding to the fields in the `AttributeReportIB` TLV structure.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum AttrRespTag {
    Status = 0,
    Data = 1,
}

/// Cluster Path
///
/// Corresponds to the `ClusterPathIB` TLV list in the Interaction Model.
#[derive(Default, Debug, Clone, PartialEq, Eq, Hash, FromTLV, ToTLV)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[tlvargs(datatype = "list")]
pub struct ClusterPath {
    pub node: Option<NodeId>,
    pub endpoint: EndptId,
    pub cluster: ClusterId,
}

/// Data Version Filter
///
/// Corresponds to the `DataVersionFilterIB` TLV structure in the Interaction Model.
#[derive(Default, Debug, Clone, PartialEq, Eq, Hash, FromTLV, ToTLV)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DataVersionFilter {
    pub path: ClusterPath,
    pub data_ver: DataVersion,
}

/// Report Data Message
///
/// Corresponds to the `ReportDataMessage` TLV structure in the Interaction Model.
///
/// The engine never builds this structure; reports are serialized on the fly
/// through `ReportDataRespTag`. It exists for decoding reports in tests and tools.
#[derive(Debug, FromTLV)]
#[tlvargs(lifetime = "'a")]
pub struct ReportDataResp<'a> {
    pub subscription_id: Option<SubscriptionId>,
    pub attr_reports: Option<TLVArray<'a, AttrResp<'a>>>,
    pub event_reports: Option<TLVArray<'a, EventResp<'a>>>,
    pub more_chunks: Option<bool>,
    pub suppress_response: Option<bool>,
}

/// Tags corresponding to the fields in the `ReportDataMessage` TLV structure.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ReportDataRespTag {
    SubscriptionId = 0,
    AttributeReports = 1,
    EventReports = 2,
    MoreChunkedMsgs = 3,
    SuppressResponse = 4,
}

#[cfg(test)]
mod tests {
    use super::{AttrData, AttrPath, AttrResp, AttrStatus, DataVersionFilter};
    use crate::im::{GenericPath, IMStatusCode};
    use crate::tlv::{FromTLV, TLVElement, TLVTag, ToTLV};
    use crate::utils::writebuf::WriteBuf;

    #[test]
    fn test_attr_path_list() {
        let mut buf = [0; 32];
        let mut wb = WriteBuf::new(&mut buf);

        let path = AttrPath::from_gp(&GenericPath::new(Some(1), None, Some(0)));
        path.to_tlv(&TLVTag::Anonymous, &mut wb).unwrap();

        // Members keep the width of their field types
        assert_eq!(
            wb.as_slice(),
            &[0x17, 0x25, 0x02, 0x01, 0x00, 0x26, 0x04, 0x00, 0x00, 0x00, 0x00, 0x18]
        );
        assert_eq!(
            AttrPath::from_tlv(&TLVElement::new(wb.as_slice())).unwrap(),
            path
        );
    }

    #[test]
    fn test_attr_status_report() {
        let mut buf = [0; 32];
        let mut wb = WriteBuf::new(&mut buf);

        let status = AttrStatus::from_gp(
            &GenericPath::new(Some(3), Some(6), Some(0)),
            IMStatusCode::UnsupportedEndpoint,
            None,
        );
        AttrResp::Status(status.clone())
            .to_tlv(&TLVTag::Anonymous, &mut wb)
            .unwrap();

        let resp = AttrResp::from_tlv(&TLVElement::new(wb.as_slice())).unwrap();
        assert_eq!(resp, AttrResp::Status(status));
        assert_eq!(resp.path().endpoint, Some(3));
    }

    #[test]
    fn test_dataver_filter() {
        // {0: [[1: 1, 2: 6]], 1: 77}
        let b = [
            0x15, 0x37, 0x00, 0x24, 0x01, 0x01, 0x24, 0x02, 0x06, 0x18, 0x24, 0x01, 0x4d, 0x18,
        ];
        let filter = DataVersionFilter::from_tlv(&TLVElement::new(&b)).unwrap();

        assert_eq!(filter.path.endpoint, 1);
        assert_eq!(filter.path.cluster, 6);
        assert_eq!(filter.data_ver, 77);

        // {1: 77}, without the required path
        let b = [0x15, 0x24, 0x01, 0x4d, 0x18];
        assert!(DataVersionFilter::from_tlv(&TLVElement::new(&b)).is_err());
    }

    #[test]
    fn test_attr_data_skips_unknown_members() {
        // {0: 3, 1: [[2: 1, 3: 6, 4: 0]], 2: true, 9: 1}
        let b = [
            0x15, 0x24, 0x00, 0x03, 0x37, 0x01, 0x24, 0x02, 0x01, 0x24, 0x03, 0x06, 0x24, 0x04,
            0x00, 0x18, 0x29, 0x02, 0x24, 0x09, 0x01, 0x18,
        ];
        let data = AttrData::from_tlv(&TLVElement::new(&b)).unwrap();

        assert_eq!(data.data_ver, Some(3));
        assert_eq!(data.path.to_gp(), GenericPath::new(Some(1), Some(6), Some(0)));
        assert!(data.data.bool().unwrap());
    }
}
