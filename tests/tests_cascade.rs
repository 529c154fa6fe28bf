//! Cascaded updates and erases across link groups: in-place rewrites,
//! child splitting, blanking, and duplicate-key rejection.

use std::io::Cursor;
use std::sync::Arc;

use cif::{Condition, File, Validator, key, load_dictionary};
use once_cell::sync::Lazy;

/// Three link groups from `child` into `parent`, one per child column.
const FAN_DICT: &str = r#"data_fan_dict.dic
_dictionary.title fan_dict.dic
_dictionary.version 1.0

loop_
_item_type_list.code
_item_type_list.primitive_code
_item_type_list.construct
code char '[_.;:A-Za-z0-9-]+'
int numb '[+-]?[0-9]+'

save_parent
_category.id parent
_category.mandatory_code no
_category_key.name '_parent.id'
save_

save__parent.id
_item.name '_parent.id'
_item.category_id parent
_item.mandatory_code yes
_item_type.code int
save_

save_child
_category.id child
_category.mandatory_code no
_category_key.name '_child.id'
save_

save__child.id
_item.name '_child.id'
_item.category_id child
_item.mandatory_code yes
_item_type.code int
save_

save__child.parent_id
_item.name '_child.parent_id'
_item.category_id child
_item.mandatory_code no
save_

save__child.parent_id2
_item.name '_child.parent_id2'
_item.category_id child
_item.mandatory_code no
save_

save__child.parent_id3
_item.name '_child.parent_id3'
_item.category_id child
_item.mandatory_code no
save_

loop_
_pdbx_item_linked_group_list.child_category_id
_pdbx_item_linked_group_list.link_group_id
_pdbx_item_linked_group_list.child_name
_pdbx_item_linked_group_list.parent_name
_pdbx_item_linked_group_list.parent_category_id
child 1 '_child.parent_id'  '_parent.id' parent
child 2 '_child.parent_id2' '_parent.id' parent
child 3 '_child.parent_id3' '_parent.id' parent
"#;

/// Two parent categories joined through the same child column: the
/// split case.
const SHARED_DICT: &str = r#"data_shared_dict.dic
_dictionary.title shared_dict.dic
_dictionary.version 1.0

loop_
_item_type_list.code
_item_type_list.primitive_code
_item_type_list.construct
int numb '[+-]?[0-9]+'

save_parenta
_category.id parenta
_category.mandatory_code no
_category_key.name '_parenta.id'
save_

save__parenta.id
_item.name '_parenta.id'
_item.category_id parenta
_item.mandatory_code yes
_item_type.code int
save_

save_parentb
_category.id parentb
_category.mandatory_code no
_category_key.name '_parentb.id'
save_

save__parentb.id
_item.name '_parentb.id'
_item.category_id parentb
_item.mandatory_code yes
_item_type.code int
save_

save_child
_category.id child
_category.mandatory_code no
_category_key.name '_child.parent_id'
save_

save__child.parent_id
_item.name '_child.parent_id'
_item.category_id child
_item.mandatory_code yes
save_

loop_
_pdbx_item_linked_group_list.child_category_id
_pdbx_item_linked_group_list.link_group_id
_pdbx_item_linked_group_list.child_name
_pdbx_item_linked_group_list.parent_name
_pdbx_item_linked_group_list.parent_category_id
child 1 '_child.parent_id' '_parenta.id' parenta
child 2 '_child.parent_id' '_parentb.id' parentb
"#;

static FAN: Lazy<Arc<Validator>> =
    Lazy::new(|| Arc::new(load_dictionary(Cursor::new(FAN_DICT)).expect("fan dictionary")));
static SHARED: Lazy<Arc<Validator>> =
    Lazy::new(|| Arc::new(load_dictionary(Cursor::new(SHARED_DICT)).expect("shared dictionary")));

fn fan_file(child_rows: &str) -> File {
    let input = format!(
        "data_TEST\nloop_ _parent.id\n1 2 3\n\
         loop_ _child.id _child.parent_id _child.parent_id2 _child.parent_id3\n{child_rows}"
    );
    let mut file = File::load(Cursor::new(input)).expect("parse");
    file.set_validator(Some(FAN.clone()));
    file
}

fn child_tuples(file: &File) -> Vec<(Option<String>, Option<String>, Option<String>)> {
    file.get_block("TEST")
        .and_then(|b| b.get_category("child"))
        .expect("child category")
        .rows()
        .map(|r| {
            (
                r.get("parent_id").map(str::to_string),
                r.get("parent_id2").map(str::to_string),
                r.get("parent_id3").map(str::to_string),
            )
        })
        .collect()
}

#[test]
fn test_rename_updates_all_link_groups_in_place() {
    let mut file = fan_file("10 1 1 1\n");
    let block = file.get_block_mut("TEST").expect("block");
    let row = block
        .get_category("parent")
        .expect("parent")
        .find_one(&key("id").is(1))
        .expect("row")
        .id();
    block.update_value("parent", row, "id", "10").expect("update");

    // Exactly one child, renamed on every column, no splits.
    let tuples = child_tuples(&file);
    assert_eq!(
        tuples,
        vec![(
            Some("10".into()),
            Some("10".into()),
            Some("10".into())
        )]
    );
}

#[test]
fn test_rename_with_partial_children_keeps_row_count() {
    let mut file = fan_file(
        "10 1 1 1\n\
         11 1 ? ?\n\
         12 ? 1 ?\n\
         13 ? ? 1\n\
         14 2 ? ?\n",
    );
    let block = file.get_block_mut("TEST").expect("block");
    let row = block
        .get_category("parent")
        .expect("parent")
        .find_one(&key("id").is(1))
        .expect("row")
        .id();
    block.update_value("parent", row, "id", "10").expect("update");

    let tuples = child_tuples(&file);
    assert_eq!(tuples.len(), 5, "no rows may be added or lost");
    // Every 1 that referenced the renamed parent is now 10; the row
    // referencing parent 2 is untouched.
    assert_eq!(
        tuples,
        vec![
            (Some("10".into()), Some("10".into()), Some("10".into())),
            (Some("10".into()), None, None),
            (None, Some("10".into()), None),
            (None, None, Some("10".into())),
            (Some("2".into()), None, None),
        ]
    );
}

#[test]
fn test_shared_column_splits_the_child() {
    let input = "data_TEST\n\
        loop_ _parenta.id\n1 2\n\
        loop_ _parentb.id\n1 9\n\
        loop_ _child.parent_id\n1\n";
    let mut file = File::load(Cursor::new(input)).expect("parse");
    file.set_validator(Some(SHARED.clone()));
    let block = file.get_block_mut("TEST").expect("block");
    let row = block
        .get_category("parenta")
        .expect("parenta")
        .find_one(&key("id").is(1))
        .expect("row")
        .id();
    block.update_value("parenta", row, "id", "10").expect("update");

    // The child served two parents through the same column: it must be
    // split, not reparented under parentb.
    let values: Vec<Option<String>> = block
        .get_category("child")
        .expect("child")
        .rows()
        .map(|r| r.get("parent_id").map(str::to_string))
        .collect();
    assert_eq!(values, vec![Some("1".into()), Some("10".into())]);
}

#[test]
fn test_cascade_collision_is_rejected_atomically() {
    // Renaming parent 1 to 2 would make the two children collide on the
    // child primary key (parent_id).
    let input = "data_TEST\n\
        loop_ _parenta.id\n1\n\
        loop_ _parentb.id\n9\n\
        loop_ _child.parent_id\n1 2\n";
    let mut file = File::load(Cursor::new(input)).expect("parse");
    file.set_validator(Some(SHARED.clone()));
    let block = file.get_block_mut("TEST").expect("block");
    let row = block
        .get_category("parenta")
        .expect("parenta")
        .find_one(&key("id").is(1))
        .expect("row")
        .id();
    let err = block.update_value("parenta", row, "id", "2").unwrap_err();
    assert!(err.is_duplicate_key(), "got {err}");

    // Fail-fast: nothing changed.
    let values: Vec<Option<String>> = block
        .get_category("child")
        .expect("child")
        .rows()
        .map(|r| r.get("parent_id").map(str::to_string))
        .collect();
    assert_eq!(values, vec![Some("1".into()), Some("2".into())]);
    assert!(block.get_category("parenta").expect("parenta").exists(&key("id").is(1)));
}

#[test]
fn test_erase_cascades_to_sole_children() {
    let mut file = fan_file("10 1 ? ?\n11 2 ? ?\n");
    let block = file.get_block_mut("TEST").expect("block");
    let erased = block
        .erase_rows("parent", &key("id").is(1))
        .expect("erase");
    assert_eq!(erased, 1);

    let child = block.get_category("child").expect("child");
    assert_eq!(child.len(), 1, "the child of parent 1 goes with it");
    assert!(child.exists(&key("id").is(11)));
    assert_eq!(block.get_category("parent").expect("parent").len(), 2);
}

#[test]
fn test_erase_blanks_children_with_surviving_parents() {
    // Child 10 is joined to parent 1 (group 1) and parent 2 (group 2):
    // erasing parent 1 must only blank the group-1 column.
    let mut file = fan_file("10 1 2 ?\n");
    let block = file.get_block_mut("TEST").expect("block");
    block.erase_rows("parent", &key("id").is(1)).expect("erase");

    let tuples = child_tuples(&file);
    assert_eq!(tuples, vec![(None, Some("2".into()), None)]);
}

#[test]
fn test_validate_links_reports_orphans() {
    let mut file = fan_file("10 1 ? ?\n11 7 ? ?\n");
    let block = file.get_block_mut("TEST").expect("block");
    let issues = block.validate_links();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].link_group_id, 1);
    assert_eq!(issues[0].parent_category, "parent");
    assert_eq!(issues[0].child_category, "child");
}

#[test]
fn test_update_without_links_is_local() {
    let mut file = fan_file("10 1 ? ?\n");
    let block = file.get_block_mut("TEST").expect("block");
    let row = block
        .get_category("child")
        .expect("child")
        .find_one(&key("id").is(10))
        .expect("row")
        .id();
    // `id` is the child's own key, not a parent key of any link group.
    block.update_value("child", row, "id", "99").expect("update");
    let child = block.get_category("child").expect("child");
    assert!(child.exists(&key("id").is(99)));
    assert_eq!(child.len(), 1);
}

#[test]
fn test_erase_all_rows_with_condition_all() {
    let mut file = fan_file("10 1 ? ?\n11 2 ? ?\n12 3 ? ?\n");
    let block = file.get_block_mut("TEST").expect("block");
    let erased = block.erase_rows("parent", &Condition::All).expect("erase");
    assert_eq!(erased, 3);
    assert!(block.get_category("parent").expect("parent").is_empty());
    assert!(block.get_category("child").expect("child").is_empty());
}
