// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use proptest::prelude::*;

#[test]
fn plain_paths() {
    let list = build_concat_list(["/out/seg0.ts", "/out/seg1.ts"]).unwrap();
    assert_eq!(list, "file '/out/seg0.ts'\nfile '/out/seg1.ts'\n");
    assert_eq!(parse_concat_list(&list).unwrap(), vec!["/out/seg0.ts", "/out/seg1.ts"]);
}

#[test]
fn quote_escape_matches_demuxer_convention() {
    let list = build_concat_list(["/x/with'quote.ts"]).unwrap();
    assert_eq!(list, "file '/x/with'\\''quote.ts'\n");
    assert_eq!(parse_concat_list(&list).unwrap(), vec!["/x/with'quote.ts"]);
}

#[test]
fn newline_in_path_is_rejected() {
    let err = build_concat_list(["/bad\npath.ts"]).unwrap_err();
    assert!(matches!(err, ConcatError::NewlineInPath(_)));
}

#[test]
fn parse_tolerates_comments_and_blanks() {
    let list = "# stitched by castforge\n\nfile '/a.ts'\n\nfile '/b.ts'\n";
    assert_eq!(parse_concat_list(list).unwrap(), vec!["/a.ts", "/b.ts"]);
}

#[test]
fn parse_rejects_non_entries() {
    let err = parse_concat_list("duration 20\n").unwrap_err();
    assert!(matches!(err, ConcatError::NotAFileEntry { line: 1, .. }));

    let err = parse_concat_list("file /unquoted.ts\n").unwrap_err();
    assert!(matches!(err, ConcatError::NotAFileEntry { .. }));
}

#[test]
fn empty_list_roundtrips() {
    let list = build_concat_list(Vec::<String>::new()).unwrap();
    assert_eq!(list, "");
    assert!(parse_concat_list(&list).unwrap().is_empty());
}

#[test]
fn pathological_quotes() {
    for path in ["'", "''", "'\\''", "a'b'c", "\\", "\\'"] {
        let list = build_concat_list([path]).unwrap();
        assert_eq!(parse_concat_list(&list).unwrap(), vec![path], "path {path:?}");
    }
}

proptest! {
    /// BuildConcatList | ParseConcatList reproduces any newline-free
    /// path set, including quotes and backslashes.
    #[test]
    fn roundtrip(paths in proptest::collection::vec("[^\n]{0,40}", 0..8)) {
        let list = build_concat_list(&paths).unwrap();
        let parsed = parse_concat_list(&list).unwrap();
        prop_assert_eq!(parsed, paths);
    }

    #[test]
    fn roundtrip_quote_heavy(paths in proptest::collection::vec("['\\\\a-z/\\.]{0,20}", 1..6)) {
        let list = build_concat_list(&paths).unwrap();
        let parsed = parse_concat_list(&list).unwrap();
        prop_assert_eq!(parsed, paths);
    }
}
