//! End-to-end parse → serialize → parse identity checks, plus the
//! boundary behaviors of the three null-ish values.

use std::io::Cursor;

use cif::{File, key};

fn load(input: &str) -> File {
    File::load(Cursor::new(input)).expect("parse")
}

fn save(file: &File) -> String {
    let mut out = Vec::new();
    file.save(&mut out).expect("save");
    String::from_utf8(out).expect("utf8 output")
}

fn round_trip(input: &str) -> (File, File) {
    let original = load(input);
    let reloaded = load(&save(&original));
    (original, reloaded)
}

#[test]
fn test_basic_loop_parses_into_rows() {
    let file = load("data_TEST\nloop_ _t.id _t.n\n1 aap  2 noot  3 mies\n");
    let block = file.get_block("TEST").expect("block");
    assert_eq!(block.name(), "TEST");
    let cat = block.get_category("t").expect("category");
    assert_eq!(cat.len(), 3);
    let row = cat.find_one(&key("id").is(1)).expect("row");
    assert_eq!(row.get("n"), Some("aap"));
}

#[test]
fn test_round_trip_identity() {
    let (original, reloaded) = round_trip(
        "data_TEST\n\
         _entry.id XXXX\n\
         loop_ _t.id _t.n\n1 aap 2 noot 3 mies\n\
         loop_ _s.x _s.y\n1.0 'two words' -.2e11 \"it's\"\n",
    );
    assert!(original.same_data(&reloaded));
}

#[test]
fn test_unknown_inapplicable_and_empty_are_distinct() {
    let (original, reloaded) = round_trip("data_D\nloop_ _t.id _t.v\n1 ?\n2 .\n3 ''\n");
    assert!(original.same_data(&reloaded));

    let cat = reloaded
        .get_block("d")
        .and_then(|b| b.get_category("t"))
        .expect("category");
    let rows: Vec<_> = cat.rows().collect();
    assert_eq!(rows[0].get("v"), None);
    assert_eq!(rows[1].get("v"), Some("."));
    assert_eq!(rows[2].get("v"), Some(""));
}

#[test]
fn test_null_condition_counts_both_null_kinds() {
    let file = load("data_D\nloop_ _t.id _t.n\n1 aap 2 noot 3 mies 4 . 5 ?\n");
    let cat = file
        .get_block("d")
        .and_then(|b| b.get_category("t"))
        .expect("category");
    assert_eq!(cat.count(&key("n").is(cif::Value::Null)), 2);
}

#[test]
fn test_reserved_word_values_round_trip() {
    let input = "data_D\nloop_ _t.id _t.v\n\
        1 'stop_the_crap'\n\
        2 'and stop_ this too'\n\
        3 'data_dinges'\n\
        4 boo.data_.whatever\n";
    let (original, reloaded) = round_trip(input);
    assert!(original.same_data(&reloaded));

    let text = save(&original);
    // The first three need quoting, the last goes bare.
    assert!(text.contains("'stop_the_crap'"));
    assert!(text.contains("'and stop_ this too'"));
    assert!(text.contains("'data_dinges'"));
    assert!(text.contains(" boo.data_.whatever"));
}

#[test]
fn test_numeric_tokens_compare_to_ieee_values() {
    let file = load("data_D\nloop_ _t.id _t.v\n1 1.0\n2 -.2e11\n3 1.3e-10\n4 3.000000\n");
    let cat = file
        .get_block("d")
        .and_then(|b| b.get_category("t"))
        .expect("category");
    let values: Vec<f64> = cat
        .rows()
        .map(|r| r.get_as::<f64>("v").expect("float"))
        .collect();
    assert_eq!(values, vec![1.0, -0.2e11, 1.3e-10, 3.0]);
    // Integers stay integers.
    let ids: Vec<i64> = cat
        .rows()
        .map(|r| r.get_as::<i64>("id").expect("int"))
        .collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
}

#[test]
fn test_text_field_preserves_internal_whitespace() {
    let input = "data_D\n_t.v\n;\nline one\n\n   indented line\n;\n";
    let (original, reloaded) = round_trip(input);
    assert!(original.same_data(&reloaded));
    let cat = reloaded
        .get_block("d")
        .and_then(|b| b.get_category("t"))
        .expect("category");
    let row = cat.rows().next().expect("row");
    assert_eq!(row.get("v"), Some("line one\n\n   indented line"));
}

#[test]
fn test_crlf_input_round_trips() {
    let input = "data_D\r\nloop_ _t.id _t.n\r\n1 aap\r\n2 noot\r\n";
    let (original, reloaded) = round_trip(input);
    assert!(original.same_data(&reloaded));
}

#[test]
fn test_save_and_reload_through_a_real_file() {
    let file = load("data_TEST\nloop_ _t.id _t.n\n1 aap 2 noot\n");
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("out.cif");
    {
        let out = std::fs::File::create(&path).expect("create");
        file.save(out).expect("save");
    }
    let reloaded =
        File::load(std::io::BufReader::new(std::fs::File::open(&path).expect("open")))
            .expect("reload");
    assert!(file.same_data(&reloaded));
}

#[test]
fn test_index_datablocks_offsets_match_headers() {
    let input = "# comment\ndata_one\n_a.x 1\ndata_two\n_a.x 'data_three is not real'\ndata_four\n_a.x 3\n";
    let index = cif::index_datablocks(Cursor::new(input)).expect("index");
    let names: Vec<_> = index.keys().cloned().collect();
    assert_eq!(names, vec!["one", "two", "four"]);
    for (name, offset) in &index {
        let at = &input[*offset as usize..];
        assert!(at.starts_with(&format!("data_{name}")));
    }
}

#[test]
fn test_load_single_block_skips_the_rest() {
    let input = "data_one\n_a.x 1\ndata_two\n_a.x 2\ndata_three\n_a.x 3\n";
    let file = File::load_single(Cursor::new(input), "two").expect("load");
    assert_eq!(file.len(), 1);
    let block = file.first_block().expect("block");
    assert_eq!(block.name(), "two");
    let row = block
        .get_category("a")
        .and_then(|c| c.rows().next())
        .expect("row");
    assert_eq!(row.get("x"), Some("2"));
}

#[test]
fn test_parse_errors_carry_line_numbers() {
    let err = File::load(Cursor::new("data_D\n_t.v 'unterminated\n")).unwrap_err();
    match err {
        cif::Error::Parse { line, .. } => assert_eq!(line, 2),
        other => panic!("expected a parse error, got {other}"),
    }

    let err = File::load(Cursor::new("data_D\nloop_ _a.x _b.y\n1 2\n")).unwrap_err();
    assert!(err.to_string().contains("heterogeneous"));
}
