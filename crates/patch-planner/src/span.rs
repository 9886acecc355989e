// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Index spans and pixel regions.
//!
//! All reassembly arithmetic in the extraction pipeline is expressed in
//! half-open `[start, stop)` intervals, mirroring slice semantics. A
//! [`Span`] is one such interval on a single axis; a [`PixelRegion`] is a
//! row span × column span bounding box in detector pixel coordinates.

use std::ops::Range;

/// A half-open `[start, stop)` index interval on one array axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Span {
    /// First index covered.
    pub start: usize,
    /// One past the last index covered.
    pub stop: usize,
}

impl Span {
    /// Creates a span. `stop` below `start` is clamped to empty.
    pub fn new(start: usize, stop: usize) -> Self {
        Self {
            start,
            stop: stop.max(start),
        }
    }

    /// Number of indices covered.
    pub fn len(&self) -> usize {
        self.stop - self.start
    }

    /// Returns `true` if the span covers nothing.
    pub fn is_empty(&self) -> bool {
        self.stop == self.start
    }

    /// Returns `true` if `index` falls inside the span.
    pub fn contains(&self, index: usize) -> bool {
        self.start <= index && index < self.stop
    }

    /// Shifts the span left by `offset`.
    ///
    /// # Panics
    /// Panics if `offset > self.start`.
    pub fn shift_left(&self, offset: usize) -> Self {
        Self {
            start: self.start - offset,
            stop: self.stop - offset,
        }
    }

    /// Intersection with another span (empty if disjoint).
    pub fn intersect(&self, other: &Span) -> Self {
        Self::new(self.start.max(other.start), self.stop.min(other.stop))
    }

    /// Converts to a `Range<usize>` for slicing.
    pub fn range(&self) -> Range<usize> {
        self.start..self.stop
    }
}

impl From<Span> for Range<usize> {
    fn from(s: Span) -> Self {
        s.range()
    }
}

/// A rectangular bounding box in detector pixel space.
///
/// `rows` indexes the image's first axis, `cols` the second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PixelRegion {
    pub rows: Span,
    pub cols: Span,
}

impl PixelRegion {
    pub fn new(rows: Span, cols: Span) -> Self {
        Self { rows, cols }
    }

    /// Number of rows covered.
    pub fn nrows(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns covered.
    pub fn ncols(&self) -> usize {
        self.cols.len()
    }

    /// Returns `true` if either axis is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.cols.is_empty()
    }

    /// Smallest region containing both `self` and `other`.
    pub fn union(&self, other: &PixelRegion) -> Self {
        Self {
            rows: Span::new(
                self.rows.start.min(other.rows.start),
                self.rows.stop.max(other.rows.stop),
            ),
            cols: Span::new(
                self.cols.start.min(other.cols.start),
                self.cols.stop.max(other.cols.stop),
            ),
        }
    }

    /// Union over an iterator of regions, or `None` when the iterator is
    /// empty. The empty union is how a bundle with no on-image patches is
    /// represented.
    pub fn union_all<'a, I>(regions: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a PixelRegion>,
    {
        regions
            .into_iter()
            .fold(None, |acc: Option<PixelRegion>, r| match acc {
                Some(u) => Some(u.union(r)),
                None => Some(*r),
            })
    }

    /// This region expressed relative to the origin of `outer`.
    ///
    /// # Panics
    /// Panics if `self` is not contained in `outer`.
    pub fn relative_to(&self, outer: &PixelRegion) -> Self {
        Self {
            rows: self.rows.shift_left(outer.rows.start),
            cols: self.cols.shift_left(outer.cols.start),
        }
    }
}
