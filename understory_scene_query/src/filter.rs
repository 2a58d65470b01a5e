// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Filter callbacks classifying shapes and hits as blocking, touching, or ignored.

use core::fmt::Debug;

use crate::store::ShapeInstance;
use crate::types::{ActorHandle, FilterData, FilterResult, QueryHit};

/// Caller-provided classification of candidates.
///
/// [`pre_filter`](Self::pre_filter) runs before the narrow phase when the query sets
/// [`QueryFlags::PRE_FILTER`](crate::types::QueryFlags::PRE_FILTER);
/// [`post_filter`](Self::post_filter) runs on each geometric hit when it sets
/// [`QueryFlags::POST_FILTER`](crate::types::QueryFlags::POST_FILTER).
/// `filter_data` is the query's filter words. Overlap hits never block, whatever
/// a callback returns.
pub trait QueryFilterCallback {
    /// Classify `shape` of `actor` before any intersection test.
    fn pre_filter(
        &mut self,
        filter_data: &FilterData,
        shape: &ShapeInstance,
        actor: ActorHandle,
    ) -> FilterResult;

    /// Classify a found hit on `shape`. May downgrade a block or reject the hit.
    fn post_filter(
        &mut self,
        filter_data: &FilterData,
        shape: &ShapeInstance,
        hit: &dyn QueryHit,
    ) -> FilterResult;
}

/// Every shape and hit blocks.
#[derive(Copy, Clone, Debug, Default)]
pub struct BlockAll;

impl QueryFilterCallback for BlockAll {
    fn pre_filter(&mut self, _: &FilterData, _: &ShapeInstance, _: ActorHandle) -> FilterResult {
        FilterResult::Block
    }

    fn post_filter(&mut self, _: &FilterData, _: &ShapeInstance, _: &dyn QueryHit) -> FilterResult {
        FilterResult::Block
    }
}

/// Every shape and hit touches.
#[derive(Copy, Clone, Debug, Default)]
pub struct TouchAll;

impl QueryFilterCallback for TouchAll {
    fn pre_filter(&mut self, _: &FilterData, _: &ShapeInstance, _: ActorHandle) -> FilterResult {
        FilterResult::Touch
    }

    fn post_filter(&mut self, _: &FilterData, _: &ShapeInstance, _: &dyn QueryHit) -> FilterResult {
        FilterResult::Touch
    }
}

/// Classify by bit masks.
///
/// A shape blocks when `query.word0 & shape.word1 != 0`, otherwise touches when
/// `query.word0 & shape.word2 != 0`, and is ignored otherwise. The post-filter
/// applies the same rule to the hit shape.
#[derive(Copy, Clone, Debug, Default)]
pub struct LayerMaskFilter;

impl LayerMaskFilter {
    fn classify(query: &FilterData, shape: &FilterData) -> FilterResult {
        if query.word0 & shape.word1 != 0 {
            FilterResult::Block
        } else if query.word0 & shape.word2 != 0 {
            FilterResult::Touch
        } else {
            FilterResult::None
        }
    }
}

impl QueryFilterCallback for LayerMaskFilter {
    fn pre_filter(
        &mut self,
        query: &FilterData,
        shape: &ShapeInstance,
        _: ActorHandle,
    ) -> FilterResult {
        Self::classify(query, &shape.filter_data)
    }

    fn post_filter(
        &mut self,
        query: &FilterData,
        shape: &ShapeInstance,
        _: &dyn QueryHit,
    ) -> FilterResult {
        Self::classify(query, &shape.filter_data)
    }
}

/// Closure-backed filter.
///
/// ```
/// use understory_scene_query::filter::FilterFn;
/// use understory_scene_query::types::FilterResult;
///
/// // Touch shapes tagged with word3 == 1; block everything else, and keep hits as found.
/// let mut filter = FilterFn::new(
///     |_, shape, _| match shape.filter_data.word3 {
///         1 => FilterResult::Touch,
///         _ => FilterResult::Block,
///     },
///     |_, _, _| FilterResult::Block,
/// );
/// # let _ = &mut filter;
/// ```
pub struct FilterFn<Pre, Post> {
    pre: Pre,
    post: Post,
}

impl<Pre, Post> FilterFn<Pre, Post>
where
    Pre: FnMut(&FilterData, &ShapeInstance, ActorHandle) -> FilterResult,
    Post: FnMut(&FilterData, &ShapeInstance, &dyn QueryHit) -> FilterResult,
{
    /// Wrap a pre-filter and a post-filter closure.
    pub fn new(pre: Pre, post: Post) -> Self {
        Self { pre, post }
    }
}

impl<Pre, Post> QueryFilterCallback for FilterFn<Pre, Post>
where
    Pre: FnMut(&FilterData, &ShapeInstance, ActorHandle) -> FilterResult,
    Post: FnMut(&FilterData, &ShapeInstance, &dyn QueryHit) -> FilterResult,
{
    fn pre_filter(
        &mut self,
        filter_data: &FilterData,
        shape: &ShapeInstance,
        actor: ActorHandle,
    ) -> FilterResult {
        (self.pre)(filter_data, shape, actor)
    }

    fn post_filter(
        &mut self,
        filter_data: &FilterData,
        shape: &ShapeInstance,
        hit: &dyn QueryHit,
    ) -> FilterResult {
        (self.post)(filter_data, shape, hit)
    }
}

impl<Pre, Post> Debug for FilterFn<Pre, Post> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FilterFn").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;

    #[test]
    fn layer_masks_pick_block_touch_or_none() {
        let query = FilterData::new(0b0110, 0, 0, 0);
        let shape = |w1, w2| {
            ShapeInstance::new(Geometry::sphere(1.0))
                .with_filter_data(FilterData::new(0, w1, w2, 0))
        };
        let actor = ActorHandle::from_raw_parts(0, 1);
        let mut f = LayerMaskFilter;
        assert_eq!(f.pre_filter(&query, &shape(0b0010, 0b0100), actor), FilterResult::Block);
        assert_eq!(f.pre_filter(&query, &shape(0b1000, 0b0100), actor), FilterResult::Touch);
        assert_eq!(f.pre_filter(&query, &shape(0b1000, 0b0001), actor), FilterResult::None);
    }

    #[test]
    fn closures_receive_shape_and_actor() {
        let actor = ActorHandle::from_raw_parts(3, 2);
        let mut seen = None;
        let mut f = FilterFn::new(
            |_: &FilterData, _: &ShapeInstance, a: ActorHandle| {
                seen = Some(a);
                FilterResult::Touch
            },
            |_: &FilterData, _: &ShapeInstance, _: &dyn QueryHit| FilterResult::None,
        );
        let shape = ShapeInstance::new(Geometry::sphere(1.0));
        assert_eq!(f.pre_filter(&FilterData::default(), &shape, actor), FilterResult::Touch);
        drop(f);
        assert_eq!(seen, Some(actor));
    }
}
