// End-to-end scenarios through the public API: record against an in-memory
// document, then resolve.

use redline_core::{Axis, BigRange, CellAddress, CellRange, CellValue};
use redline_engine::{
    ActionId, ActionKind, ChangeTrack, DescribeAction, MemoryDocument, PlainDescriber, TrackError,
};

fn at(row: u32, col: u32) -> CellAddress {
    CellAddress::new(0, row, col)
}

#[test]
fn insert_rows_rebases_prior_content() {
    let mut doc = MemoryDocument::new(1, 10, 4);
    let mut track = ChangeTrack::default();
    let c = track.set_cell(&mut doc, at(8, 0), "x".into()).unwrap();
    let ins = track.insert(&mut doc, Axis::Rows, 0, 5, 3).unwrap();

    let record = track.get(ins).unwrap();
    assert_eq!(record.kind(), ActionKind::InsertRows);
    assert_eq!(record.range(), BigRange::whole_rows(0, 5, 7));
    assert!(record.is_virgin());
    assert_eq!(track.get(c).unwrap().range(), BigRange::cell(0, 11, 0));
}

#[test]
fn reject_delete_restores_rows_and_content() {
    let mut doc = MemoryDocument::new(1, 20, 4);
    let mut track = ChangeTrack::default();
    let c = track.set_cell(&mut doc, at(6, 1), "kept".into()).unwrap();
    doc.set(at(7, 2), "untracked");
    doc.set(at(12, 0), "below");

    let del = track.delete(&mut doc, Axis::Rows, 0..=0, 5, 3).unwrap()[0];
    assert!(track.is_deleted_in(c, del));
    assert_eq!(doc.get(at(9, 0)), CellValue::from("below"));

    assert!(track.reject(&mut doc, del));
    assert_eq!(doc.get(at(6, 1)), CellValue::from("kept"));
    assert_eq!(doc.get(at(7, 2)), CellValue::from("untracked"));
    assert_eq!(doc.get(at(12, 0)), CellValue::from("below"));

    let content = track.get(c).unwrap();
    assert!(content.is_live());
    assert_eq!(content.range(), BigRange::cell(0, 6, 1));
    assert!(track.get(del).unwrap().is_rejected());
    assert_eq!(track.get(del).unwrap().range(), BigRange::whole_rows(0, 5, 7));
    assert!(track.chain().generated_ids().is_empty());

    let comp = track.get(track.last_id().unwrap()).unwrap();
    assert_eq!(comp.kind(), ActionKind::InsertRows);
    assert_eq!(comp.reject_target(), Some(del));
    assert!(comp.is_accepted());
}

#[test]
fn select_keep_oldest_writes_first_value_back() {
    let mut doc = MemoryDocument::new(1, 10, 4);
    let mut track = ChangeTrack::default();
    let first = track.set_cell(&mut doc, at(0, 0), "1".into()).unwrap();
    let second = track.set_cell(&mut doc, at(0, 0), "2".into()).unwrap();
    assert_eq!(track.content_chain(first), vec![first, second]);

    assert!(track.select(&mut doc, first, true));
    assert_eq!(doc.get(at(0, 0)), CellValue::Number(1.0));
    assert!(track.get(first).unwrap().is_accepted());
    assert!(track.get(second).unwrap().is_rejected());

    let comp = track.get(track.last_id().unwrap()).unwrap();
    let info = comp.content().unwrap();
    assert_eq!(info.old, CellValue::Number(2.0));
    assert_eq!(info.new, CellValue::Number(1.0));
    assert_eq!(comp.reject_target(), Some(second));
    assert_eq!(track.top_content(first), Some(comp.id()));
}

#[test]
fn reject_move_puts_cells_back() {
    let mut doc = MemoryDocument::new(1, 20, 6);
    doc.set(at(0, 0), "a");
    doc.set(at(1, 0), "b");
    doc.set(at(10, 0), "overwritten");
    let mut track = ChangeTrack::default();
    let tracked = track.set_cell(&mut doc, at(0, 1), "t".into()).unwrap();

    let from = CellRange::new(at(0, 0), at(1, 1));
    let mv = track.move_range(&mut doc, from, at(10, 0)).unwrap();
    assert_eq!(doc.get(at(10, 0)), CellValue::from("a"));
    assert_eq!(track.get(tracked).unwrap().range(), BigRange::cell(0, 10, 1));

    assert!(track.reject(&mut doc, mv));
    assert_eq!(doc.get(at(0, 0)), CellValue::from("a"));
    assert_eq!(doc.get(at(1, 0)), CellValue::from("b"));
    assert_eq!(doc.get(at(10, 0)), CellValue::from("overwritten"));
    assert_eq!(track.get(tracked).unwrap().range(), BigRange::cell(0, 0, 1));
}

#[test]
fn reject_on_protected_document_changes_nothing() {
    let mut doc = MemoryDocument::new(1, 20, 4);
    let mut track = ChangeTrack::default();
    let c = track.set_cell(&mut doc, at(6, 0), "x".into()).unwrap();
    let del = track.delete(&mut doc, Axis::Rows, 0..=0, 5, 3).unwrap()[0];
    doc.protect(CellRange::single(at(15, 3)));
    let before = doc.clone();
    let len = track.len();

    assert!(matches!(track.try_reject(&mut doc, del), Err(TrackError::Document(_))));
    assert!(track.get(del).unwrap().is_virgin());
    assert!(track.is_deleted_in(c, del));
    assert_eq!(track.len(), len);
    assert_eq!(doc.cells(0), before.cells(0));

    doc.unprotect_all();
    assert!(track.reject(&mut doc, del));
    assert_eq!(doc.get(at(6, 0)), CellValue::from("x"));
}

#[test]
fn reject_insert_fails_whole_when_dependent_delete_cannot_be_undone() {
    let mut doc = MemoryDocument::new(1, 20, 4);
    doc.set(at(8, 0), "x");
    let mut track = ChangeTrack::default();
    let ins = track.insert(&mut doc, Axis::Rows, 0, 2, 2).unwrap();
    let del = track.delete(&mut doc, Axis::Rows, 0..=0, 3, 4).unwrap()[0];
    assert_eq!(track.dependents(ins), vec![del]);

    doc.protect(CellRange::single(at(18, 0)));
    let before = doc.clone();
    let ids: Vec<ActionId> = track.actions().map(|a| a.id()).collect();

    assert!(!track.reject(&mut doc, ins));
    assert!(track.get(ins).unwrap().is_virgin());
    assert!(track.get(del).unwrap().is_virgin());
    assert_eq!(track.actions().map(|a| a.id()).collect::<Vec<_>>(), ids);
    assert_eq!(doc.cells(0), before.cells(0));

    doc.unprotect_all();
    assert!(track.reject(&mut doc, ins));
    assert!(track.get(ins).unwrap().is_rejected());
    assert!(track.get(del).unwrap().is_rejected());
}

#[test]
fn reject_insert_fails_whole_when_dependent_move_cannot_be_undone() {
    let mut doc = MemoryDocument::new(1, 20, 4);
    let mut track = ChangeTrack::default();
    let ins = track.insert(&mut doc, Axis::Rows, 0, 2, 2).unwrap();
    doc.set(at(2, 0), "moved");
    let mv = track.move_range(&mut doc, CellRange::single(at(2, 0)), at(10, 0)).unwrap();
    assert_eq!(track.dependents(ins), vec![mv]);

    doc.protect(CellRange::single(at(10, 0)));
    let before = doc.clone();
    let len = track.len();

    assert!(matches!(track.try_reject(&mut doc, ins), Err(TrackError::NotEditable(_))));
    assert!(track.get(ins).unwrap().is_virgin());
    assert!(track.get(mv).unwrap().is_virgin());
    assert_eq!(track.len(), len);
    assert_eq!(doc.cells(0), before.cells(0));

    doc.unprotect_all();
    assert!(track.reject(&mut doc, ins));
    assert!(track.get(mv).unwrap().is_rejected());
    assert_eq!(doc.get(at(10, 0)), CellValue::Empty);
}

#[test]
fn multi_sheet_delete_resolves_as_group() {
    let mut doc = MemoryDocument::new(3, 10, 4);
    let mut track = ChangeTrack::default();
    let ids = track.delete(&mut doc, Axis::Cols, 0..=2, 1, 1).unwrap();
    assert_eq!(ids.len(), 3);

    assert!(track.accept(ids[1]));
    assert!(ids.iter().all(|id| track.get(*id).unwrap().is_accepted()));
}

#[test]
fn stacked_single_row_deletes_resolve_independently() {
    let mut doc = MemoryDocument::new(1, 10, 4);
    let mut track = ChangeTrack::default();
    let first = track.delete(&mut doc, Axis::Rows, 0..=0, 4, 1).unwrap()[0];
    let second = track.delete(&mut doc, Axis::Rows, 0..=0, 6, 1).unwrap()[0];
    assert_eq!(track.get(first).unwrap().delete_info().unwrap().offset, 0);
    assert_eq!(track.get(second).unwrap().delete_info().unwrap().offset, 0);

    assert!(track.accept(second));
    assert!(track.get(first).unwrap().is_virgin());
}

#[test]
fn accept_all_and_reject_all_count_touchable_records() {
    let mut doc = MemoryDocument::new(1, 10, 4);
    let mut track = ChangeTrack::default();
    track.set_cell(&mut doc, at(0, 0), "1".into()).unwrap();
    track.set_cell(&mut doc, at(0, 0), "2".into()).unwrap();
    track.set_cell(&mut doc, at(1, 0), "3".into()).unwrap();
    assert_eq!(track.accept_all(), 2);
    assert_eq!(track.accept_all(), 0);

    let c = track.set_cell(&mut doc, at(2, 0), "4".into()).unwrap();
    assert_eq!(track.reject_all(&mut doc), 1);
    assert!(track.get(c).unwrap().is_rejected());
    assert_eq!(doc.get(at(2, 0)), CellValue::Empty);
}

#[test]
fn unknown_ids_are_rejected_cleanly() {
    let mut doc = MemoryDocument::new(1, 10, 4);
    let mut track = ChangeTrack::default();
    assert!(!track.accept(ActionId(42)));
    assert_eq!(track.try_reject(&mut doc, ActionId(42)), Err(TrackError::UnknownAction(ActionId(42))));
    assert_eq!(track.remove(ActionId(42)), Err(TrackError::UnknownAction(ActionId(42))));
}

#[test]
fn descriptions_follow_the_log() {
    let mut doc = MemoryDocument::new(1, 10, 4);
    let mut track = ChangeTrack::default();
    let ins = track.insert(&mut doc, Axis::Rows, 0, 5, 3).unwrap();
    let c = track.set_cell(&mut doc, at(0, 0), "hello".into()).unwrap();

    let describer = PlainDescriber::new(track.settings());
    assert_eq!(describer.describe(track.get(ins).unwrap()), "Inserted rows 6-8 on Sheet1");
    assert_eq!(describer.describe(track.get(c).unwrap()), "Changed Sheet1!A1 from (empty) to 'hello'");
}
