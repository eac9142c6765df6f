use ratatui::{
    Frame,
    layout::{Constraint, Flex, Layout, Position, Rect},
    style::{Style, Stylize},
    text::{Line, Span},
    widgets::{Block, Cell, Clear, Paragraph, Row, Table},
};
use tvgrid::{ColumnView, GridStatus, Pinned, RowView, SortDirection};

use crate::model::UIData;

pub const CMDLINE_HEIGHT: u16 = 1;
pub const STATUSLINE_HEIGHT: u16 = 1;
pub const TABLE_HEADER_HEIGHT: u16 = 1;
const COLUMN_SPACING: u16 = 1;
const PLACEHOLDER: &str = "…";

/// Width of the row number column, including the row marker.
pub fn index_width(total: Option<usize>) -> u16 {
    let digits = total.unwrap_or(0).max(1).to_string().len() as u16;
    digits + 1 + COLUMN_SPACING
}

/// Picks the columns that fit into `width`, starting the scrollable part at
/// `offset`. Pinned columns are always kept. Returns indices into `columns`.
pub fn fit_columns(columns: &[ColumnView], offset: usize, width: u16) -> Vec<usize> {
    let cost = |c: &ColumnView| c.width.min(u16::MAX as u32) as u16 + COLUMN_SPACING;
    let mut used: u16 = columns
        .iter()
        .filter(|c| c.pinned.is_some())
        .map(cost)
        .fold(0, u16::saturating_add);

    let mut fitted: Vec<usize> = Vec::new();
    let mut first = true;
    for (idx, column) in columns.iter().enumerate() {
        if column.pinned.is_some() {
            fitted.push(idx);
            continue;
        }
        if idx < offset {
            continue;
        }
        let needed = used.saturating_add(cost(column));
        // The first scrollable column is shown even if it has to be cut.
        if needed <= width || first {
            fitted.push(idx);
            used = needed;
            first = false;
        } else {
            first = false;
            used = u16::MAX;
        }
    }
    fitted
}

pub fn draw(data: &UIData, frame: &mut Frame) {
    let [table_area, status_area, cmd_area] = Layout::vertical([
        Constraint::Min(TABLE_HEADER_HEIGHT),
        Constraint::Length(STATUSLINE_HEIGHT),
        Constraint::Length(CMDLINE_HEIGHT),
    ])
    .areas(frame.area());

    draw_table(data, frame, table_area);
    draw_statusline(data, frame, status_area);
    draw_cmdline(data, frame, cmd_area);

    if let Some(message) = &data.popup_message {
        draw_popup(message, frame);
    }
}

fn header_cell(column: &ColumnView) -> Cell<'_> {
    let mut header = vec![Span::raw(column.header.as_str())];
    if let Some((direction, pos)) = column.sort {
        let arrow = match direction {
            SortDirection::Asc => "▲",
            SortDirection::Desc => "▼",
        };
        header.push(Span::raw(format!(" {arrow}{}", pos + 1)).cyan());
    }
    if column.pinned == Some(Pinned::Left) || column.pinned == Some(Pinned::Right) {
        header.push(Span::raw(" ¦").dark_gray());
    }
    Cell::from(Line::from(header)).bold()
}

fn row_marker(row: &RowView, expanded: bool) -> char {
    match (row.selected, &row.group) {
        (true, _) => '*',
        (false, Some(_)) if expanded => '-',
        (false, Some(_)) => '+',
        (false, None) => ' ',
    }
}

fn draw_table(data: &UIData, frame: &mut Frame, area: Rect) {
    let view = &data.view;
    let index_width = index_width(view.total);
    let digits = index_width.saturating_sub(1 + COLUMN_SPACING) as usize;

    let mut widths = vec![Constraint::Length(index_width.saturating_sub(COLUMN_SPACING))];
    widths.extend(
        data.columns
            .iter()
            .map(|&c| Constraint::Length(view.columns[c].width.min(u16::MAX as u32) as u16)),
    );

    let mut header = vec![Cell::from("#").bold()];
    header.extend(data.columns.iter().map(|&c| header_cell(&view.columns[c])));

    let rows = view.rows.iter().enumerate().map(|(pos, row)| {
        let expanded = data.group_expanded.get(pos).copied().unwrap_or(false);
        let is_cursor_row = row.index == data.cursor_row;
        let mut cells = vec![
            Cell::from(format!(
                "{}{:>digits$}",
                row_marker(row, expanded),
                row.index + 1
            ))
            .dark_gray(),
        ];
        match &row.cells {
            Some(values) => cells.extend(data.columns.iter().map(|&c| {
                let cell = Cell::from(values[c].text.as_str());
                if is_cursor_row && c == data.cursor_column {
                    cell.reversed()
                } else {
                    cell
                }
            })),
            None => cells.extend(data.columns.iter().map(|_| Cell::from(PLACEHOLDER).dark_gray())),
        }
        let style = match (is_cursor_row, row.selected) {
            (true, _) => Style::default().bold(),
            (false, true) => Style::default().yellow(),
            (false, false) => Style::default(),
        };
        Row::new(cells).style(style)
    });

    let table = Table::new(rows, widths)
        .column_spacing(COLUMN_SPACING)
        .header(Row::new(header).height(TABLE_HEADER_HEIGHT).underlined());
    frame.render_widget(table, area);
}

fn draw_statusline(data: &UIData, frame: &mut Frame, area: Rect) {
    let view = &data.view;
    let total = match view.total {
        Some(total) => format!("{total} rows"),
        None => "? rows".to_string(),
    };
    let mut parts = vec![
        Span::raw(format!(" {} ", data.name)).bold(),
        Span::raw(format!("| {total} ")),
    ];
    if let Some(page) = view.page {
        parts.push(Span::raw(format!(
            "| page {}/{} ",
            page.page + 1,
            page.page_count.max(1)
        )));
    }
    if data.filter_count > 0 {
        parts.push(Span::raw(format!("| {} filter(s) ", data.filter_count)));
    }
    match view.status {
        GridStatus::FetchPending | GridStatus::Reconciling => {
            parts.push(Span::raw("| loading ").yellow())
        }
        GridStatus::Error => parts.push(Span::raw("| error ").red()),
        GridStatus::Idle => {}
    }
    parts.push(Span::raw(format!("| {}", data.status_message)));
    frame.render_widget(Paragraph::new(Line::from(parts)).reversed(), area);
}

fn draw_cmdline(data: &UIData, frame: &mut Frame, area: Rect) {
    let Some(mode) = data.cmd_mode else {
        return;
    };
    let prompt = mode.prompt();
    let line = Line::from(vec![
        Span::raw(prompt).bold(),
        Span::raw(data.cmdinput.input.as_str()),
    ]);
    frame.render_widget(Paragraph::new(line), area);
    let x = area.x + (prompt.chars().count() + data.cmdinput.cursor_pos) as u16;
    frame.set_cursor_position(Position::new(x.min(area.right().saturating_sub(1)), area.y));
}

fn popup_area(area: Rect, width: u16, height: u16) -> Rect {
    let [area] = Layout::vertical([Constraint::Length(height)])
        .flex(Flex::Center)
        .areas(area);
    let [area] = Layout::horizontal([Constraint::Length(width)])
        .flex(Flex::Center)
        .areas(area);
    area
}

fn draw_popup(message: &str, frame: &mut Frame) {
    let width = message.lines().map(|l| l.chars().count()).max().unwrap_or(0) as u16 + 4;
    let height = message.lines().count() as u16 + 2;
    let area = popup_area(frame.area(), width, height);
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(message).block(Block::bordered().title(" Help ")),
        area,
    );
}
