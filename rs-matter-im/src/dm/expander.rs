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

//! Expansion of (possibly wildcarded) request paths into concrete paths.
//!
//! The expander walks the request list in order and, for each request, the
//! matching endpoints, clusters and leaves in ascending ID order. It never
//! relies on the enumeration order of the provider: at every level it picks
//! the smallest ID above the one emitted last, so the output only depends on
//! the contents of the data model and on the request list.

use crate::error::Error;
use crate::im::{ClusterId, EndptId, GenericPath, IMStatusCode};

use super::Metadata;

/// A fully resolved (endpoint, cluster, attribute or event) path.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConcretePath {
    pub endpoint: EndptId,
    pub cluster: ClusterId,
    pub leaf: u32,
}

impl ConcretePath {
    pub const fn new(endpoint: EndptId, cluster: ClusterId, leaf: u32) -> Self {
        Self {
            endpoint,
            cluster,
            leaf,
        }
    }

    pub const fn to_gp(&self) -> GenericPath {
        GenericPath::new(Some(self.endpoint), Some(self.cluster), Some(self.leaf))
    }
}

/// What the leaves of the expanded paths are.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PathKind {
    Attribute,
    Event,
}

/// A concrete request naming something the data model does not have.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PathStatus {
    pub path: ConcretePath,
    pub status: IMStatusCode,
}

/// The position of an expander: the request being expanded and the last
/// concrete path emitted for it.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ExpanderCursor {
    index: usize,
    last: Option<ConcretePath>,
}

impl ExpanderCursor {
    pub const fn new() -> Self {
        Self {
            index: 0,
            last: None,
        }
    }

    pub const fn index(&self) -> usize {
        self.index
    }

    pub const fn last(&self) -> Option<ConcretePath> {
        self.last
    }
}

pub type ExpanderItem = Result<Result<ConcretePath, PathStatus>, Error>;

pub struct PathExpander<'a, M> {
    metadata: &'a M,
    kind: PathKind,
    paths: &'a [GenericPath],
    cursor: ExpanderCursor,
    current: Option<ConcretePath>,
}

impl<'a, M> PathExpander<'a, M>
where
    M: Metadata,
{
    pub const fn new(metadata: &'a M, kind: PathKind, paths: &'a [GenericPath]) -> Self {
        Self {
            metadata,
            kind,
            paths,
            cursor: ExpanderCursor::new(),
            current: None,
        }
    }

    /// The concrete path emitted last, if it exists in the data model.
    pub fn get(&self) -> Option<ConcretePath> {
        self.current
    }

    pub fn reset_to(&mut self, paths: &'a [GenericPath]) {
        self.paths = paths;
        self.cursor = ExpanderCursor::new();
        self.current = None;
    }

    pub fn cursor(&self) -> ExpanderCursor {
        self.cursor
    }

    pub fn resume(&mut self, cursor: ExpanderCursor) {
        self.cursor = cursor;
        self.current = None;
    }

    /// The request the cursor currently points at.
    pub fn request(&self) -> Option<&'a GenericPath> {
        self.paths.get(self.cursor.index)
    }

    fn advance(&self) -> Result<(ExpanderCursor, Option<Result<ConcretePath, PathStatus>>), Error> {
        let mut cursor = self.cursor;

        while let Some(request) = self.paths.get(cursor.index) {
            let found = if request.is_wildcard() {
                self.next_wildcard(cursor.index, request, cursor.last)?
                    .map(Ok)
            } else if cursor.last.is_none() {
                self.next_concrete(cursor.index, request)?
            } else {
                None
            };

            if let Some(item) = found {
                cursor.last = Some(match &item {
                    Ok(path) => *path,
                    Err(status) => status.path,
                });

                return Ok((cursor, Some(item)));
            }

            cursor.index += 1;
            cursor.last = None;
        }

        Ok((cursor, None))
    }

    fn next_concrete(
        &self,
        index: usize,
        request: &GenericPath,
    ) -> Result<Option<Result<ConcretePath, PathStatus>>, Error> {
        let (endpoint, cluster, leaf) = request.not_wildcard()?;
        let path = ConcretePath::new(endpoint, cluster, leaf);

        let status = self.resolve(&path)?;
        let earlier = &self.paths[..index];

        let duplicate = if status.is_none() {
            earlier
                .iter()
                .any(|other| other.matches(endpoint, cluster, leaf))
        } else {
            earlier.iter().any(|other| other == request)
        };

        if duplicate {
            return Ok(None);
        }

        Ok(Some(match status {
            None => Ok(path),
            Some(status) => Err(PathStatus { path, status }),
        }))
    }

    fn resolve(&self, path: &ConcretePath) -> Result<Option<IMStatusCode>, Error> {
        if !self.metadata.endpoints()?.any(|id| id == path.endpoint) {
            return Ok(Some(IMStatusCode::UnsupportedEndpoint));
        }

        if !self
            .metadata
            .clusters(path.endpoint)?
            .any(|id| id == path.cluster)
        {
            return Ok(Some(IMStatusCode::UnsupportedCluster));
        }

        let found = match self.kind {
            PathKind::Attribute => self
                .metadata
                .attributes(path.endpoint, path.cluster)?
                .any(|id| id == path.leaf),
            PathKind::Event => self
                .metadata
                .events(path.endpoint, path.cluster)?
                .any(|id| id == path.leaf),
        };

        if found {
            Ok(None)
        } else {
            Ok(Some(match self.kind {
                PathKind::Attribute => IMStatusCode::UnsupportedAttribute,
                PathKind::Event => IMStatusCode::UnsupportedEvent,
            }))
        }
    }

    fn next_wildcard(
        &self,
        index: usize,
        request: &GenericPath,
        last: Option<ConcretePath>,
    ) -> Result<Option<ConcretePath>, Error> {
        let earlier = &self.paths[..index];
        let mut after = last;

        while let Some(path) = self.next_match(request, after)? {
            if !earlier
                .iter()
                .any(|other| other.matches(path.endpoint, path.cluster, path.leaf))
            {
                return Ok(Some(path));
            }

            after = Some(path);
        }

        Ok(None)
    }

    fn next_match(
        &self,
        request: &GenericPath,
        after: Option<ConcretePath>,
    ) -> Result<Option<ConcretePath>, Error> {
        if let Some(after) = after {
            // The endpoint may have gone away since the cursor was taken
            if self.metadata.endpoints()?.any(|id| id == after.endpoint) {
                let path = self.next_in_endpoint(
                    request,
                    after.endpoint,
                    Some((after.cluster, after.leaf)),
                )?;

                if path.is_some() {
                    return Ok(path);
                }
            }
        }

        let mut after_endpoint = after.map(|path| path.endpoint);

        while let Some(endpoint) = smallest_after(
            self.metadata.endpoints()?,
            after_endpoint,
            request.endpoint,
        ) {
            let path = self.next_in_endpoint(request, endpoint, None)?;
            if path.is_some() {
                return Ok(path);
            }

            after_endpoint = Some(endpoint);
        }

        Ok(None)
    }

    fn next_in_endpoint(
        &self,
        request: &GenericPath,
        endpoint: EndptId,
        after: Option<(ClusterId, u32)>,
    ) -> Result<Option<ConcretePath>, Error> {
        if let Some((cluster, leaf)) = after {
            if self.metadata.clusters(endpoint)?.any(|id| id == cluster) {
                if let Some(leaf) = self.next_leaf(endpoint, cluster, Some(leaf), request.leaf)? {
                    return Ok(Some(ConcretePath::new(endpoint, cluster, leaf)));
                }
            }
        }

        let mut after_cluster = after.map(|(cluster, _)| cluster);

        while let Some(cluster) = smallest_after(
            self.metadata.clusters(endpoint)?,
            after_cluster,
            request.cluster,
        ) {
            if let Some(leaf) = self.next_leaf(endpoint, cluster, None, request.leaf)? {
                return Ok(Some(ConcretePath::new(endpoint, cluster, leaf)));
            }

            after_cluster = Some(cluster);
        }

        Ok(None)
    }

    fn next_leaf(
        &self,
        endpoint: EndptId,
        cluster: ClusterId,
        after: Option<u32>,
        only: Option<u32>,
    ) -> Result<Option<u32>, Error> {
        Ok(match self.kind {
            PathKind::Attribute => {
                smallest_after(self.metadata.attributes(endpoint, cluster)?, after, only)
            }
            PathKind::Event => smallest_after(self.metadata.events(endpoint, cluster)?, after, only),
        })
    }
}

impl<M> Iterator for PathExpander<'_, M>
where
    M: Metadata,
{
    type Item = ExpanderItem;

    /// On error the cursor does not move, so the same path is retried next time.
    fn next(&mut self) -> Option<Self::Item> {
        match self.advance() {
            Ok((cursor, item)) => {
                self.cursor = cursor;
                self.current = item.as_ref().and_then(|item| item.as_ref().ok().copied());

                item.map(Ok)
            }
            Err(e) => Some(Err(e)),
        }
    }
}

fn smallest_after<T, I>(ids: I, after: Option<T>, only: Option<T>) -> Option<T>
where
    T: Ord + Copy,
    I: Iterator<Item = T>,
{
    ids.filter(|id| after.is_none_or(|after| *id > after))
        .filter(|id| only.is_none_or(|only| *id == only))
        .min()
}
