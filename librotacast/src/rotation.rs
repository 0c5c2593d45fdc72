//! Rotation selector
//!
//! Decides which content item a channel posts next. Items are posted in
//! source order, skipping anything already in the channel's history, with one
//! twist: the previous post's category is avoided whenever another category
//! is still available. When everything has been posted the channel either
//! loops back to the start or stops, depending on its [`OnEmpty`] policy.

use std::collections::HashSet;

use tracing::info;

use crate::types::{ChannelPostingState, ContentItem, OnEmpty};

/// Result of a selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Item to publish, or `None` when there is nothing to post
    pub item: Option<ContentItem>,
    /// Whether the channel state was reset during this selection. The caller
    /// must persist the state when this is set, whatever happens next.
    pub looped: bool,
}

impl Selection {
    fn nothing() -> Self {
        Self {
            item: None,
            looped: false,
        }
    }
}

/// Pick the next item to post on a channel.
///
/// `state` is only modified when the rotation is exhausted and `on_empty` is
/// [`OnEmpty::Loop`]; selection is otherwise read-only, so calling this twice
/// without committing returns the same item.
pub fn select_next(
    items: &[ContentItem],
    state: &mut ChannelPostingState,
    on_empty: OnEmpty,
) -> Selection {
    if items.is_empty() {
        return Selection::nothing();
    }

    let posted: HashSet<usize> = state.history.iter().map(|r| r.index).collect();
    let mut candidates: Vec<&ContentItem> = items
        .iter()
        .filter(|item| !posted.contains(&item.index))
        .collect();

    let mut looped = false;
    if candidates.is_empty() {
        match on_empty {
            OnEmpty::Stop => {
                info!("All {} items posted; on_empty is 'stop'", items.len());
                return Selection::nothing();
            }
            OnEmpty::Loop => {
                info!("All {} items posted; looping back to start", items.len());
                state.reset();
                candidates = items.iter().collect();
                looped = true;
            }
        }
    }

    // Avoid repeating the previous category, but only if there is an
    // alternative. With no alternative the repeat is allowed.
    // A blank category counts as no category.
    if let Some(last_category) = state.last_category.as_deref().filter(|c| !c.is_empty()) {
        let different: Vec<&ContentItem> = candidates
            .iter()
            .copied()
            .filter(|item| item.category != last_category)
            .collect();
        if !different.is_empty() {
            candidates = different;
        }
    }

    let item = candidates
        .into_iter()
        .min_by_key(|item| item.index)
        .cloned();

    Selection { item, looped }
}
