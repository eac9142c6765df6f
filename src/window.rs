//! Row window manager: which rows must be materialized, and the block cache
//! that holds them.
//!
//! All indices are absolute row indices of the current query result. The
//! window only ever addresses a contiguous [`Space`] of that result: the
//! whole result when scrolling freely, or a single page when paginating.

use std::collections::HashMap;
use std::ops::Range;

use tracing::{debug, trace};

use crate::value::{RowData, RowKey};

/// The slice of the query result the window may address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Space {
    pub origin: usize,
    pub len: usize,
}

impl Space {
    pub fn new(origin: usize, len: usize) -> Self {
        Self { origin, len }
    }

    /// Space for `page` of a result with `total` rows.
    pub fn page(total: usize, page: usize, page_size: usize) -> Self {
        let origin = page.saturating_mul(page_size);
        Self {
            origin,
            len: total.saturating_sub(origin).min(page_size),
        }
    }

    pub fn end(&self) -> usize {
        self.origin + self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Rows `[first, last]` that intersect a viewport, as a half open range
/// relative to the start of the space. Empty when there is nothing to show.
pub fn visible_range(len: usize, row_height: u32, viewport_height: u32, scroll_top: u32) -> Range<usize> {
    if len == 0 || row_height == 0 || viewport_height == 0 {
        return 0..0;
    }
    let first = ((scroll_top / row_height) as usize).min(len - 1);
    let bottom = scroll_top.saturating_add(viewport_height - 1);
    let last = ((bottom / row_height) as usize).min(len - 1);
    first..last + 1
}

/// `visible` widened by `buffer` rows on both sides, clamped to `[0, len)`.
pub fn buffered_range(visible: &Range<usize>, buffer: usize, len: usize) -> Range<usize> {
    if visible.is_empty() {
        return 0..0;
    }
    visible.start.saturating_sub(buffer)..visible.end.saturating_add(buffer).min(len)
}

/// A row held by the window, tagged with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedRow<R> {
    pub index: usize,
    pub key: Option<RowKey>,
    pub data: R,
}

struct Block<R> {
    rows: Vec<MaterializedRow<R>>,
    last_visible: u64,
}

/// Geometry and cache limits of a [`RowWindow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    pub row_height: u32,
    pub row_buffer: usize,
    pub block_size: usize,
    /// `None` keeps every block.
    pub max_blocks: Option<usize>,
    pub virtualize: bool,
}

pub struct RowWindow<R> {
    config: WindowConfig,
    viewport_height: u32,
    scroll_top: u32,
    space: Space,
    blocks: HashMap<usize, Block<R>>,
    tick: u64,
}

impl<R: RowData> RowWindow<R> {
    pub fn new(config: WindowConfig) -> Self {
        Self {
            config,
            viewport_height: 0,
            scroll_top: 0,
            space: Space::default(),
            blocks: HashMap::new(),
            tick: 0,
        }
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    /// Switching block size invalidates every cached block.
    pub fn set_block_size(&mut self, block_size: usize) {
        if self.config.block_size != block_size {
            self.config.block_size = block_size;
            self.blocks.clear();
        }
    }

    pub fn space(&self) -> Space {
        self.space
    }

    /// Moves the window onto a new space. Cached rows outside it are dropped
    /// and the scroll offset is clamped.
    /// Moves the window onto `space`.
    ///
    /// Blocks outside the new space are dropped, rows outside it are trimmed.
    /// A block whose clipped range grows is dropped too: it was filled for the
    /// smaller space and misses the rows the new space adds.
    pub fn set_space(&mut self, space: Space) {
        let old = self.space;
        self.space = space;
        let block_size = self.config.block_size;
        let clipped = |block: usize, space: Space| {
            let start = (block * block_size).max(space.origin);
            let end = (block * block_size + block_size).min(space.end());
            end.saturating_sub(start)
        };
        self.blocks.retain(|&block, _| {
            let now = clipped(block, space);
            now > 0 && now <= clipped(block, old)
        });
        for block in self.blocks.values_mut() {
            block.rows.retain(|r| r.index >= space.origin && r.index < space.end());
        }
        self.scroll_top = self.clamp_scroll(self.scroll_top, space);
    }

    pub fn viewport_height(&self) -> u32 {
        self.viewport_height
    }

    pub fn set_viewport_height(&mut self, px: u32) {
        self.viewport_height = px;
        self.scroll_top = self.clamp_scroll(self.scroll_top, self.space);
    }

    pub fn scroll_top(&self) -> u32 {
        self.scroll_top
    }

    /// Sets the scroll offset, clamped to the scrollable extent.
    pub fn set_scroll_top(&mut self, px: u32) {
        self.scroll_top = self.clamp_scroll(px, self.space);
    }

    /// Scrolls so that absolute row `index` is the first visible row.
    pub fn scroll_to_row(&mut self, index: usize) {
        let relative = index.saturating_sub(self.space.origin) as u64;
        let px = (relative * self.config.row_height as u64).min(u32::MAX as u64) as u32;
        self.set_scroll_top(px);
    }

    /// Scrolls the least distance needed to show absolute row `index`.
    pub fn ensure_visible(&mut self, index: usize) {
        let visible = self.visible_range();
        if visible.contains(&index) {
            return;
        }
        if index < visible.start || visible.is_empty() {
            self.scroll_to_row(index);
        } else {
            let rows_per_view = (self.viewport_height / self.config.row_height.max(1)).max(1) as usize;
            self.scroll_to_row((index + 1).saturating_sub(rows_per_view));
        }
    }

    pub fn content_height(&self) -> u64 {
        self.space.len as u64 * self.config.row_height as u64
    }

    fn clamp_scroll(&self, px: u32, space: Space) -> u32 {
        let content = space.len as u64 * self.config.row_height as u64;
        let max = content.saturating_sub(self.viewport_height as u64);
        (px as u64).min(max) as u32
    }

    /// Absolute range of the rows intersecting the viewport.
    pub fn visible_range(&self) -> Range<usize> {
        self.visible_range_in(self.space)
    }

    /// Absolute range that must stay materialized.
    pub fn buffered_range(&self) -> Range<usize> {
        self.buffered_range_in(self.space)
    }

    fn visible_range_in(&self, space: Space) -> Range<usize> {
        let scroll_top = self.clamp_scroll(self.scroll_top, space);
        let r = visible_range(space.len, self.config.row_height, self.viewport_height, scroll_top);
        r.start + space.origin..r.end + space.origin
    }

    fn buffered_range_in(&self, space: Space) -> Range<usize> {
        if !self.config.virtualize {
            return space.origin..space.end();
        }
        let scroll_top = self.clamp_scroll(self.scroll_top, space);
        let visible = visible_range(space.len, self.config.row_height, self.viewport_height, scroll_top);
        let r = buffered_range(&visible, self.config.row_buffer, space.len);
        r.start + space.origin..r.end + space.origin
    }

    /// Blocks that cover the buffered range of `space`.
    pub fn blocks_for(&self, space: Space) -> Vec<usize> {
        let range = self.buffered_range_in(space);
        if range.is_empty() {
            return Vec::new();
        }
        let size = self.config.block_size;
        (range.start / size..=(range.end - 1) / size).collect()
    }

    /// Blocks of the buffered range that are not cached.
    pub fn missing_blocks(&self) -> Vec<usize> {
        self.blocks_for(self.space)
            .into_iter()
            .filter(|b| !self.blocks.contains_key(b))
            .collect()
    }

    pub fn covers_buffered(&self) -> bool {
        self.missing_blocks().is_empty()
    }

    /// Absolute rows held by `block`.
    pub fn block_range(&self, block: usize) -> Range<usize> {
        let size = self.config.block_size;
        block * size..(block * size + size)
    }

    pub fn is_cached(&self, block: usize) -> bool {
        self.blocks.contains_key(&block)
    }

    pub fn cached_blocks(&self) -> Vec<usize> {
        let mut blocks: Vec<usize> = self.blocks.keys().copied().collect();
        blocks.sort_unstable();
        blocks
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
    }

    /// Stores the rows of `block`, replacing whatever was cached for it.
    /// Rows past the block or past the space are dropped.
    pub fn insert_block(&mut self, block: usize, rows: Vec<R>) {
        let range = self.block_range(block);
        let end = range.end.min(self.space.end());
        let rows: Vec<MaterializedRow<R>> = rows
            .into_iter()
            .enumerate()
            .map(|(i, data)| MaterializedRow {
                index: range.start + i,
                key: data.row_key(),
                data,
            })
            .filter(|r| r.index < end && r.index >= self.space.origin)
            .collect();
        trace!("Materialize block {block}: {} rows", rows.len());
        self.blocks.insert(
            block,
            Block {
                rows,
                last_visible: self.tick,
            },
        );
    }

    /// Records which blocks are on screen now; feeds the eviction order.
    pub fn touch_visible(&mut self) {
        self.tick += 1;
        let visible = self.visible_range();
        if visible.is_empty() {
            return;
        }
        let size = self.config.block_size;
        for b in visible.start / size..=(visible.end - 1) / size {
            if let Some(block) = self.blocks.get_mut(&b) {
                block.last_visible = self.tick;
            }
        }
    }

    /// Drops least recently visible blocks until the cache fits its limit.
    /// Blocks overlapping the buffered range are kept even above the limit.
    pub fn evict(&mut self) -> Vec<usize> {
        let Some(max) = self.config.max_blocks else {
            return Vec::new();
        };
        let protected = self.blocks_for(self.space);
        let mut evicted = Vec::new();
        while self.blocks.len() > max {
            let victim = self
                .blocks
                .iter()
                .filter(|(b, _)| !protected.contains(b))
                .min_by_key(|(b, block)| (block.last_visible, **b))
                .map(|(b, _)| *b);
            match victim {
                Some(b) => {
                    self.blocks.remove(&b);
                    evicted.push(b);
                }
                None => break,
            }
        }
        if !evicted.is_empty() {
            debug!("Evicted blocks {:?}", evicted);
        }
        evicted
    }

    pub fn row(&self, index: usize) -> Option<&MaterializedRow<R>> {
        let block = self.blocks.get(&(index / self.config.block_size))?;
        block.rows.iter().find(|r| r.index == index)
    }

    pub fn row_mut(&mut self, index: usize) -> Option<&mut MaterializedRow<R>> {
        let block = self.blocks.get_mut(&(index / self.config.block_size))?;
        block.rows.iter_mut().find(|r| r.index == index)
    }

    /// All materialized rows, in no particular order.
    pub fn rows(&self) -> impl Iterator<Item = &MaterializedRow<R>> {
        self.blocks.values().flat_map(|b| b.rows.iter())
    }

    pub fn materialized_len(&self) -> usize {
        self.blocks.values().map(|b| b.rows.len()).sum()
    }

    /// True if every row of `range` is materialized.
    pub fn contains_range(&self, mut range: Range<usize>) -> bool {
        range.all(|i| self.row(i).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Record;

    fn config() -> WindowConfig {
        WindowConfig {
            row_height: 30,
            row_buffer: 10,
            block_size: 10,
            max_blocks: Some(3),
            virtualize: true,
        }
    }

    fn block_rows(block: usize, size: usize) -> Vec<Record> {
        (block * size..(block + 1) * size)
            .map(|i| Record::with_key(format!("k{i}")).set("id", i as i64))
            .collect()
    }

    #[test]
    fn test_visible_range_scenario() {
        let visible = visible_range(1000, 30, 300, 0);
        assert_eq!(visible, 0..10);
        assert_eq!(buffered_range(&visible, 10, 1000), 0..20);
    }

    #[test]
    fn test_visible_range_partial_rows_and_clamping() {
        assert_eq!(visible_range(1000, 30, 300, 15), 0..11);
        assert_eq!(visible_range(5, 30, 300, 0), 0..5);
        assert_eq!(visible_range(0, 30, 300, 0), 0..0);
        let visible = visible_range(1000, 30, 300, 29_700);
        assert_eq!(visible, 990..1000);
        assert_eq!(buffered_range(&visible, 10, 1000), 980..1000);
    }

    #[test]
    fn test_scroll_is_clamped_to_content() {
        let mut window: RowWindow<Record> = RowWindow::new(config());
        window.set_space(Space::new(0, 100));
        window.set_viewport_height(300);
        window.set_scroll_top(1_000_000);
        assert_eq!(window.scroll_top(), 2700);
        assert_eq!(window.visible_range(), 90..100);

        window.set_space(Space::new(0, 5));
        assert_eq!(window.scroll_top(), 0);
    }

    #[test]
    fn test_missing_blocks_cover_buffered_range() {
        let mut window: RowWindow<Record> = RowWindow::new(config());
        window.set_space(Space::new(0, 1000));
        window.set_viewport_height(300);
        window.set_scroll_top(30 * 50);
        assert_eq!(window.buffered_range(), 40..70);
        assert_eq!(window.missing_blocks(), vec![4, 5, 6]);

        for b in [4, 5, 6] {
            window.insert_block(b, block_rows(b, 10));
        }
        assert!(window.covers_buffered());
        assert!(window.contains_range(window.buffered_range()));
        assert_eq!(window.row(55).unwrap().key.as_deref(), Some("k55"));
    }

    #[test]
    fn test_eviction_is_least_recently_visible_first() {
        let mut window: RowWindow<Record> = RowWindow::new(WindowConfig {
            row_buffer: 0,
            ..config()
        });
        window.set_space(Space::new(0, 1000));
        window.set_viewport_height(300);

        for (scroll_row, block) in [(0, 0), (10, 1), (20, 2), (30, 3)] {
            window.set_scroll_top(scroll_row * 30);
            window.insert_block(block, block_rows(block, 10));
            window.touch_visible();
        }
        // Block 1 was seen again after block 0.
        window.set_scroll_top(10 * 30);
        window.touch_visible();
        window.set_scroll_top(30 * 30);
        window.touch_visible();

        assert_eq!(window.evict(), vec![0]);
        assert_eq!(window.cached_blocks(), vec![1, 2, 3]);
    }

    #[test]
    fn test_eviction_never_drops_the_buffered_range() {
        let mut window: RowWindow<Record> = RowWindow::new(WindowConfig {
            max_blocks: Some(1),
            ..config()
        });
        window.set_space(Space::new(0, 1000));
        window.set_viewport_height(300);
        window.set_scroll_top(30 * 50);
        for b in window.missing_blocks() {
            window.insert_block(b, block_rows(b, 10));
        }
        assert!(window.evict().is_empty());
        assert!(window.covers_buffered());
    }

    #[test]
    fn test_paged_space_offsets_indices() {
        let mut window: RowWindow<Record> = RowWindow::new(WindowConfig {
            block_size: 25,
            ..config()
        });
        window.set_space(Space::page(60, 2, 25));
        assert_eq!(window.space(), Space::new(50, 10));
        window.set_viewport_height(300);
        assert_eq!(window.visible_range(), 50..60);
        assert_eq!(window.missing_blocks(), vec![2]);

        let rows: Vec<Record> = (50..60).map(|i| Record::new().set("id", i as i64)).collect();
        window.insert_block(2, rows);
        assert_eq!(window.materialized_len(), 10);
        assert_eq!(window.row(59).unwrap().data.get("id"), Some(&crate::value::Value::Int(59)));
    }

    #[test]
    fn test_without_virtualization_everything_is_buffered() {
        let mut window: RowWindow<Record> = RowWindow::new(WindowConfig {
            virtualize: false,
            max_blocks: None,
            ..config()
        });
        window.set_space(Space::new(0, 35));
        window.set_viewport_height(60);
        assert_eq!(window.buffered_range(), 0..35);
        assert_eq!(window.missing_blocks(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_shrinking_space_drops_rows() {
        let mut window: RowWindow<Record> = RowWindow::new(config());
        window.set_space(Space::new(0, 30));
        window.insert_block(0, block_rows(0, 10));
        window.insert_block(1, block_rows(1, 10));
        window.set_space(Space::new(0, 15));
        assert_eq!(window.cached_blocks(), vec![0, 1]);
        assert_eq!(window.materialized_len(), 15);
        window.set_space(Space::new(0, 0));
        assert!(window.cached_blocks().is_empty());
    }

    #[test]
    fn test_growing_space_drops_short_blocks() {
        let mut window: RowWindow<Record> = RowWindow::new(config());
        window.set_viewport_height(300);
        window.set_space(Space::new(0, 15));
        window.insert_block(0, block_rows(0, 10));
        window.insert_block(1, block_rows(1, 10));
        assert_eq!(window.materialized_len(), 15);
        assert!(window.covers_buffered());

        window.set_space(Space::new(0, 25));
        assert_eq!(window.cached_blocks(), vec![0]);
        assert_eq!(window.missing_blocks(), vec![1]);
        assert!(!window.covers_buffered());
    }
}
