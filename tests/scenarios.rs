use std::sync::{Arc, Mutex};
use std::time::Duration;

use tvgrid::{
    Column, DataSource, Emitter, FilterItem, FilterType, Grid, GridOptions, GridState, GridStatus,
    MemorySource, Record, RowData, SortDirection, SortItem, Value,
};

const SETTLE: Duration = Duration::from_secs(5);

fn people(n: usize) -> Vec<Record> {
    (0..n)
        .map(|i| {
            let age = if i % 100 == 7 {
                Value::from("N/A")
            } else {
                Value::Int((i % 90) as i64)
            };
            Record::with_key(format!("p{i}"))
                .set("name", format!("person {i}"))
                .set("age", age)
        })
        .collect()
}

fn options() -> GridOptions<Record> {
    GridOptions::new(vec![
        Column::new("name", "Name"),
        Column::new("age", "Age").sortable(true),
    ])
}

#[test]
fn test_viewport_materializes_visible_rows_and_buffer() {
    let mut grid = Grid::new(options().row_buffer(10), MemorySource::new(people(1000))).unwrap();
    grid.set_viewport_height(300);
    assert_eq!(grid.wait_settled(SETTLE), GridStatus::Idle);

    assert_eq!(grid.visible_range(), 0..10);
    assert_eq!(grid.buffered_range(), 0..20);
    for index in 0..20 {
        assert!(grid.row(index).is_some(), "row {index} missing");
    }
    let view = grid.view();
    assert_eq!(view.rows.len(), 10);
    assert!(!view.is_loading());
}

#[test]
fn test_greater_than_filter_skips_text_values() {
    let mut grid = Grid::new(options(), MemorySource::new(people(1000))).unwrap();
    grid.set_viewport_height(300);
    grid.set_filter_model(vec![FilterItem::new("age", FilterType::GreaterThan, 30)])
        .unwrap();
    assert_eq!(grid.wait_settled(SETTLE), GridStatus::Idle);

    // Ages cycle through 0..90; every 100th row (offset 7) says "N/A".
    let expected = people(1000)
        .iter()
        .filter(|r| matches!(r.get("age"), Some(Value::Int(age)) if *age > 30))
        .count();
    assert_eq!(grid.total(), Some(expected));
    let first = grid.row(0).unwrap();
    assert_eq!(first.get("age"), Some(&Value::Int(31)));
}

/// A source that never has rows, counting what the grid asks of it.
#[derive(Default, Clone)]
struct EmptySource {
    data_requests: Arc<Mutex<usize>>,
    page_requests: Arc<Mutex<usize>>,
}

impl DataSource<Record> for EmptySource {
    fn set_page(&mut self, _page: usize, _page_size: usize) {
        *self.page_requests.lock().unwrap() += 1;
    }

    fn set_sort_model(&mut self, _sort: &[SortItem]) {}

    fn set_filter_model(&mut self, _filter: &[FilterItem]) {}

    fn get_total(&mut self, emitter: Emitter<Record>) {
        emitter.total(0);
    }

    fn get_data(&mut self, emitter: Emitter<Record>) {
        *self.data_requests.lock().unwrap() += 1;
        emitter.rows(Vec::new());
    }
}

#[test]
fn test_empty_source_issues_no_row_fetch() {
    let source = EmptySource::default();
    let mut grid = Grid::new(options(), source.clone()).unwrap();
    grid.set_viewport_height(300);
    assert_eq!(grid.wait_settled(SETTLE), GridStatus::Idle);
    grid.scroll_to(1000);
    grid.poll();

    assert_eq!(grid.total(), Some(0));
    assert_eq!(grid.visible_range(), 0..0);
    assert!(grid.view().rows.is_empty());
    assert_eq!(*source.data_requests.lock().unwrap(), 0);
    assert_eq!(*source.page_requests.lock().unwrap(), 0);
}

#[test]
fn test_slow_source_shows_placeholders_until_rows_arrive() {
    let source = MemorySource::new(people(10_000)).with_latency(Duration::from_millis(20));
    let mut grid = Grid::new(options().row_height(1), source).unwrap();
    grid.set_viewport_height(20);
    assert_eq!(grid.wait_settled(SETTLE), GridStatus::Idle);

    grid.scroll_to_row(5000);
    assert_eq!(grid.status(), GridStatus::FetchPending);
    assert!(grid.view().is_loading());

    assert_eq!(grid.wait_settled(SETTLE), GridStatus::Idle);
    let view = grid.view();
    assert!(!view.is_loading());
    assert_eq!(view.rows[0].index, 5000);
    assert_eq!(view.rows[0].key.as_deref(), Some("p5000"));
}

#[test]
fn test_superseded_query_answers_are_dropped() {
    let source = MemorySource::new(people(500)).with_latency(Duration::from_millis(10));
    let mut grid = Grid::new(options().row_height(1), source).unwrap();
    grid.set_viewport_height(10);
    assert_eq!(grid.wait_settled(SETTLE), GridStatus::Idle);

    grid.set_sort_model(vec![SortItem::asc("age")]).unwrap();
    let first = grid.generation();
    grid.set_sort_model(vec![SortItem::desc("name")]).unwrap();
    assert!(grid.generation() > first);
    assert_eq!(grid.wait_settled(SETTLE), GridStatus::Idle);

    // "person 99" is the largest name in descending string order.
    assert_eq!(grid.row(0).unwrap().value("name"), Some(Value::from("person 99")));
    assert_eq!(grid.query().sort, vec![SortItem::desc("name")]);
}

#[test]
fn test_state_moves_between_grids() {
    let mut grid = Grid::new(options().row_height(1), MemorySource::new(people(300))).unwrap();
    grid.set_viewport_height(10);
    grid.set_column_width("name", 240).unwrap();
    grid.set_column_visible("age", false).unwrap();
    grid.set_sort_model(vec![SortItem::desc("age")]).unwrap();
    grid.set_filter_model(vec![FilterItem::new("name", FilterType::Contains, "PERSON 1")])
        .unwrap();
    assert_eq!(grid.wait_settled(SETTLE), GridStatus::Idle);
    let json = grid.export_state().to_json().unwrap();

    let mut restored =
        Grid::new(options().row_height(1), MemorySource::new(people(300))).unwrap();
    restored.set_viewport_height(10);
    restored
        .import_state(&GridState::from_json(&json).unwrap())
        .unwrap();
    assert_eq!(restored.wait_settled(SETTLE), GridStatus::Idle);

    assert_eq!(restored.query(), grid.query());
    assert_eq!(restored.total(), grid.total());
    assert_eq!(restored.columns().column("name").unwrap().current_width(), 240);
    assert!(!restored.columns().column("age").unwrap().is_visible());
    let sort = &restored.view().columns;
    assert_eq!(sort.len(), 1);
    assert_eq!(
        restored.row(0).unwrap().value("name"),
        grid.row(0).unwrap().value("name")
    );
    assert_eq!(restored.query().sort[0].direction, SortDirection::Desc);
}
