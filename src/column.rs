//! Column definitions and the registry that owns them.

use std::fmt;
use std::sync::Arc;

use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::GridError;
use crate::hooks::{
    CellClass, CellRenderer, CellValidator, HeaderRenderer, ValueFormatter, ValueParser,
};
use crate::value::Value;

/// Width used when a column does not configure one.
pub const DEFAULT_COLUMN_WIDTH: u32 = 100;

/// Outcome of a mutation that is allowed to be refused without being an error.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Applied,
    Unchanged,
    Rejected,
}

impl Change {
    pub fn is_applied(self) -> bool {
        self == Change::Applied
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pinned {
    Left,
    Right,
}

/// A column definition.
///
/// Built with the generated setters:
///
/// ```
/// use tvgrid::{Column, Pinned, Record};
///
/// let age: Column<Record> = Column::new("age", "Age")
///     .width(80)
///     .min_width(40)
///     .pinned(Pinned::Left)
///     .editable(true);
/// assert_eq!(age.field(), "age");
/// ```
#[derive(Setters)]
#[setters(strip_option)]
pub struct Column<R> {
    #[setters(skip)]
    field: String,
    #[setters(into)]
    header_name: String,
    width: Option<u32>,
    min_width: Option<u32>,
    max_width: Option<u32>,
    resizable: bool,
    sortable: bool,
    filterable: bool,
    editable: bool,
    movable: bool,
    hide: bool,
    pinned: Option<Pinned>,
    sanitize: bool,
    header_class: Vec<String>,
    #[setters(skip)]
    cell_class: Option<CellClass<R>>,
    #[setters(skip)]
    cell_renderer: Option<Arc<dyn CellRenderer<R>>>,
    #[setters(skip)]
    header_renderer: Option<Arc<dyn HeaderRenderer<R>>>,
    #[setters(skip)]
    value_formatter: Option<Arc<dyn ValueFormatter<R>>>,
    #[setters(skip)]
    value_parser: Option<Arc<dyn ValueParser>>,
    #[setters(skip)]
    cell_validator: Option<Arc<dyn CellValidator<R>>>,
}

impl<R> Column<R> {
    pub fn new(field: impl Into<String>, header_name: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            header_name: header_name.into(),
            width: None,
            min_width: None,
            max_width: None,
            resizable: true,
            sortable: true,
            filterable: true,
            editable: false,
            movable: true,
            hide: false,
            pinned: None,
            sanitize: false,
            header_class: Vec::new(),
            cell_class: None,
            cell_renderer: None,
            header_renderer: None,
            value_formatter: None,
            value_parser: None,
            cell_validator: None,
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn header(&self) -> &str {
        &self.header_name
    }

    /// Current width in pixels.
    pub fn current_width(&self) -> u32 {
        self.width.unwrap_or_else(|| self.clamp_width(DEFAULT_COLUMN_WIDTH))
    }

    /// `(min_width, max_width)`.
    pub fn bounds(&self) -> (Option<u32>, Option<u32>) {
        (self.min_width, self.max_width)
    }

    pub fn is_resizable(&self) -> bool {
        self.resizable
    }

    pub fn is_sortable(&self) -> bool {
        self.sortable
    }

    pub fn is_filterable(&self) -> bool {
        self.filterable
    }

    pub fn is_editable(&self) -> bool {
        self.editable
    }

    pub fn is_movable(&self) -> bool {
        self.movable
    }

    pub fn is_visible(&self) -> bool {
        !self.hide
    }

    pub fn pinned_side(&self) -> Option<Pinned> {
        self.pinned
    }

    pub fn sanitizes(&self) -> bool {
        self.sanitize
    }

    pub fn header_classes(&self) -> &[String] {
        &self.header_class
    }

    pub fn cell_class_def(&self) -> Option<&CellClass<R>> {
        self.cell_class.as_ref()
    }

    pub fn renderer(&self) -> Option<&Arc<dyn CellRenderer<R>>> {
        self.cell_renderer.as_ref()
    }

    pub fn formatter(&self) -> Option<&Arc<dyn ValueFormatter<R>>> {
        self.value_formatter.as_ref()
    }

    pub fn parser(&self) -> Option<&Arc<dyn ValueParser>> {
        self.value_parser.as_ref()
    }

    pub fn validator(&self) -> Option<&Arc<dyn CellValidator<R>>> {
        self.cell_validator.as_ref()
    }

    /// Header text, through the header renderer if one is set.
    pub fn header_text(&self) -> String {
        match &self.header_renderer {
            Some(renderer) => renderer.render(self),
            None => self.header_name.clone(),
        }
    }

    pub fn clamp_width(&self, px: u32) -> u32 {
        let mut width = px;
        if let Some(min) = self.min_width {
            width = width.max(min);
        }
        if let Some(max) = self.max_width {
            width = width.min(max);
        }
        width
    }

    fn check_bounds(&self) -> Result<(), GridError> {
        let invalid = || GridError::InvalidWidthBounds {
            field: self.field.clone(),
            min: self.min_width,
            width: self.current_width(),
            max: self.max_width,
        };
        if let (Some(min), Some(max)) = (self.min_width, self.max_width)
            && min > max
        {
            return Err(invalid());
        }
        if let Some(width) = self.width
            && self.clamp_width(width) != width
        {
            return Err(invalid());
        }
        Ok(())
    }
}

impl<R: 'static> Column<R> {
    pub fn cell_class(mut self, class: CellClass<R>) -> Self {
        self.cell_class = Some(class);
        self
    }

    pub fn cell_class_fn<F>(self, provider: F) -> Self
    where
        F: Fn(&R) -> Vec<String> + Send + Sync + 'static,
    {
        self.cell_class(CellClass::dynamic(provider))
    }

    pub fn cell_renderer<F>(mut self, renderer: F) -> Self
    where
        F: Fn(&Value, &R, &Column<R>) -> String + Send + Sync + 'static,
    {
        self.cell_renderer = Some(Arc::new(renderer));
        self
    }

    pub fn header_renderer<F>(mut self, renderer: F) -> Self
    where
        F: Fn(&Column<R>) -> String + Send + Sync + 'static,
    {
        self.header_renderer = Some(Arc::new(renderer));
        self
    }

    pub fn value_formatter<F>(mut self, formatter: F) -> Self
    where
        F: Fn(&Value, &R) -> Value + Send + Sync + 'static,
    {
        self.value_formatter = Some(Arc::new(formatter));
        self
    }

    pub fn value_parser<F>(mut self, parser: F) -> Self
    where
        F: Fn(&str) -> Option<Value> + Send + Sync + 'static,
    {
        self.value_parser = Some(Arc::new(parser));
        self
    }

    pub fn cell_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Value, &R) -> bool + Send + Sync + 'static,
    {
        self.cell_validator = Some(Arc::new(validator));
        self
    }
}

impl<R> Clone for Column<R> {
    fn clone(&self) -> Self {
        Self {
            field: self.field.clone(),
            header_name: self.header_name.clone(),
            width: self.width,
            min_width: self.min_width,
            max_width: self.max_width,
            resizable: self.resizable,
            sortable: self.sortable,
            filterable: self.filterable,
            editable: self.editable,
            movable: self.movable,
            hide: self.hide,
            pinned: self.pinned,
            sanitize: self.sanitize,
            header_class: self.header_class.clone(),
            cell_class: self.cell_class.clone(),
            cell_renderer: self.cell_renderer.clone(),
            header_renderer: self.header_renderer.clone(),
            value_formatter: self.value_formatter.clone(),
            value_parser: self.value_parser.clone(),
            cell_validator: self.cell_validator.clone(),
        }
    }
}

impl<R> fmt::Debug for Column<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("field", &self.field)
            .field("header_name", &self.header_name)
            .field("width", &self.width)
            .field("min_width", &self.min_width)
            .field("max_width", &self.max_width)
            .field("pinned", &self.pinned)
            .field("hide", &self.hide)
            .finish_non_exhaustive()
    }
}

/// Partial update of a column's plain attributes.
#[derive(Debug, Clone, Default, Setters)]
#[setters(strip_option)]
pub struct ColumnPatch {
    #[setters(into)]
    pub header_name: Option<String>,
    pub width: Option<u32>,
    pub min_width: Option<u32>,
    pub max_width: Option<u32>,
    pub resizable: Option<bool>,
    pub sortable: Option<bool>,
    pub filterable: Option<bool>,
    pub editable: Option<bool>,
    pub movable: Option<bool>,
    pub hide: Option<bool>,
    pub sanitize: Option<bool>,
}

/// Notification recorded by every successful registry mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnEvent {
    Added { field: String },
    Updated { field: String },
    Moved { field: String, from: usize, to: usize },
    Pinned { field: String, side: Option<Pinned> },
    Resized { field: String, width: u32 },
    VisibilityChanged { field: String, visible: bool },
}

/// Owns the column definitions of a grid, in user order.
pub struct ColumnRegistry<R> {
    columns: Vec<Column<R>>,
    events: Vec<ColumnEvent>,
    allow_resize: bool,
    allow_move: bool,
}

impl<R> Default for ColumnRegistry<R> {
    fn default() -> Self {
        Self::new(true, true)
    }
}

impl<R> ColumnRegistry<R> {
    pub fn new(allow_resize: bool, allow_move: bool) -> Self {
        Self {
            columns: Vec::new(),
            events: Vec::new(),
            allow_resize,
            allow_move,
        }
    }

    /// Builds a registry from a list of columns, failing on the first
    /// invalid definition.
    pub fn from_columns(
        columns: Vec<Column<R>>,
        allow_resize: bool,
        allow_move: bool,
    ) -> Result<Self, GridError> {
        let mut registry = Self::new(allow_resize, allow_move);
        for column in columns {
            registry.add_column(column)?;
        }
        registry.events.clear();
        Ok(registry)
    }

    pub fn add_column(&mut self, mut column: Column<R>) -> Result<(), GridError> {
        if self.position(&column.field).is_some() {
            return Err(GridError::DuplicateColumn {
                field: column.field.clone(),
            });
        }
        column.check_bounds()?;
        column.width = Some(column.current_width());
        trace!("Register column {:?}", column);
        self.events.push(ColumnEvent::Added {
            field: column.field.clone(),
        });
        self.columns.push(column);
        Ok(())
    }

    pub fn update_column(&mut self, field: &str, patch: ColumnPatch) -> Result<(), GridError> {
        let idx = self.require(field)?;
        let mut column = self.columns[idx].clone();
        if let Some(header_name) = patch.header_name {
            column.header_name = header_name;
        }
        if let Some(min_width) = patch.min_width {
            column.min_width = Some(min_width);
        }
        if let Some(max_width) = patch.max_width {
            column.max_width = Some(max_width);
        }
        match patch.width {
            Some(width) => column.width = Some(width),
            // New bounds pull the current width along with them.
            None => column.width = column.width.map(|w| column.clamp_width(w)),
        }
        column.resizable = patch.resizable.unwrap_or(column.resizable);
        column.sortable = patch.sortable.unwrap_or(column.sortable);
        column.filterable = patch.filterable.unwrap_or(column.filterable);
        column.editable = patch.editable.unwrap_or(column.editable);
        column.movable = patch.movable.unwrap_or(column.movable);
        column.hide = patch.hide.unwrap_or(column.hide);
        column.sanitize = patch.sanitize.unwrap_or(column.sanitize);
        column.check_bounds()?;

        self.columns[idx] = column;
        self.events.push(ColumnEvent::Updated {
            field: field.to_string(),
        });
        Ok(())
    }

    /// Moves a column to `index` in user order. The index is clamped.
    pub fn set_order(&mut self, field: &str, index: usize) -> Result<Change, GridError> {
        let from = self.require(field)?;
        if !self.allow_move || !self.columns[from].movable {
            debug!("Reordering column {field} rejected");
            return Ok(Change::Rejected);
        }
        let to = index.min(self.columns.len() - 1);
        if from == to {
            return Ok(Change::Unchanged);
        }
        let column = self.columns.remove(from);
        self.columns.insert(to, column);
        self.events.push(ColumnEvent::Moved {
            field: field.to_string(),
            from,
            to,
        });
        Ok(Change::Applied)
    }

    pub fn set_pinned(&mut self, field: &str, side: Option<Pinned>) -> Result<Change, GridError> {
        let idx = self.require(field)?;
        if self.columns[idx].pinned == side {
            return Ok(Change::Unchanged);
        }
        self.columns[idx].pinned = side;
        self.events.push(ColumnEvent::Pinned {
            field: field.to_string(),
            side,
        });
        Ok(Change::Applied)
    }

    /// Resizes a column, clamping to its bounds.
    pub fn set_width(&mut self, field: &str, px: u32) -> Result<Change, GridError> {
        let idx = self.require(field)?;
        let column = &mut self.columns[idx];
        if !self.allow_resize || !column.resizable {
            debug!("Resizing column {field} rejected");
            return Ok(Change::Rejected);
        }
        let width = column.clamp_width(px);
        if column.width == Some(width) {
            return Ok(Change::Unchanged);
        }
        column.width = Some(width);
        self.events.push(ColumnEvent::Resized {
            field: field.to_string(),
            width,
        });
        Ok(Change::Applied)
    }

    pub fn set_visible(&mut self, field: &str, visible: bool) -> Result<Change, GridError> {
        let idx = self.require(field)?;
        if self.columns[idx].hide != visible {
            return Ok(Change::Unchanged);
        }
        self.columns[idx].hide = !visible;
        self.events.push(ColumnEvent::VisibilityChanged {
            field: field.to_string(),
            visible,
        });
        Ok(Change::Applied)
    }

    /// Visible columns: left pinned, then unpinned, then right pinned, each
    /// group in user order.
    pub fn visible_columns_in_order(&self) -> Vec<&Column<R>> {
        let visible = || self.columns.iter().filter(|c| !c.hide);
        visible()
            .filter(|c| c.pinned == Some(Pinned::Left))
            .chain(visible().filter(|c| c.pinned.is_none()))
            .chain(visible().filter(|c| c.pinned == Some(Pinned::Right)))
            .collect()
    }

    pub fn column(&self, field: &str) -> Option<&Column<R>> {
        self.columns.iter().find(|c| c.field == field)
    }

    /// All columns in user order, hidden ones included.
    pub fn columns(&self) -> &[Column<R>] {
        &self.columns
    }

    pub fn position(&self, field: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.field == field)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn has_pending_events(&self) -> bool {
        !self.events.is_empty()
    }

    pub fn drain_events(&mut self) -> Vec<ColumnEvent> {
        std::mem::take(&mut self.events)
    }

    /// Restores width and visibility without the resize/visibility rules
    /// that apply to interactive changes. Used when importing saved state.
    pub(crate) fn restore(&mut self, field: &str, width: Option<u32>, visible: Option<bool>) {
        if let Some(idx) = self.position(field) {
            let column = &mut self.columns[idx];
            if let Some(width) = width {
                column.width = Some(column.clamp_width(width));
            }
            if let Some(visible) = visible {
                column.hide = !visible;
            }
        }
    }

    /// Reorders columns by the given ranking; unranked columns keep their
    /// relative order after the ranked ones.
    pub(crate) fn restore_order(&mut self, rank: impl Fn(&str) -> Option<usize>) {
        self.columns
            .sort_by_key(|c| rank(&c.field).unwrap_or(usize::MAX));
    }

    fn require(&self, field: &str) -> Result<usize, GridError> {
        self.position(field)
            .ok_or_else(|| GridError::unknown_column(field))
    }
}
