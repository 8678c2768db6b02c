use graft_core::apply::Applier;
use graft_core::{
    FnTransformer, Node, Patcher, Path, PatchError, Target, Transformation, TreeError,
};
use proptest::prelude::*;

fn letters(items: &[&str]) -> Node {
    Node::list(items.iter().map(|&s| Node::from(s)).collect())
}

fn strings(tree: &Node, pointer: &str) -> Vec<String> {
    tree.get(&Path::parse(pointer))
        .unwrap()
        .as_list()
        .unwrap()
        .iter()
        .map(|n| n.as_str().unwrap().to_string())
        .collect()
}

fn tree() -> Node {
    Node::map([
        ("l", letters(&["A", "B", "C", "D"])),
        ("out", Node::null()),
        ("name", Node::from("main")),
    ])
}

fn l() -> Path {
    Path::parse("/l")
}

fn apply_all(tree: &mut Node, ts: Vec<Transformation>) -> Result<usize, PatchError> {
    let order: Vec<usize> = (0..ts.len()).collect();
    Applier::new(tree, ts).apply_in_order(&order)
}

#[test]
fn growing_slice_shifts_later_targets() {
    let mut t = tree();
    let ts = vec![
        FnTransformer::new("splice", |_| {
            Ok(vec![Transformation::replace_with(
                Target::slice(l(), 1..3),
                letters(&["X1", "X2", "X3"]),
            )])
        })
        .boxed(),
        FnTransformer::new("rename", |_| {
            Ok(vec![Transformation::replace_with(
                Target::node(Path::parse("/l/3")),
                Node::from("D'"),
            )])
        })
        .boxed(),
    ];
    let report = Patcher::new(ts).unwrap().run(&mut t).unwrap();
    assert_eq!(report.applied(), 2);
    assert_eq!(report.rounds.len(), 1);
    assert_eq!(strings(&t, "/l"), ["A", "X1", "X2", "X3", "D'"]);
}

#[test]
fn insertion_shifts_by_inserted_count() {
    let mut t = tree();
    let ts = vec![
        Transformation::replace_with(Target::insertion(l(), 0), letters(&["Y", "Z"])),
        Transformation::replace_with(Target::node(Path::parse("/l/2")), Node::from("c")),
        Transformation::replace_with(Target::node(Path::parse("/l/0")), Node::from("a")),
    ];
    assert_eq!(apply_all(&mut t, ts).unwrap(), 3);
    assert_eq!(strings(&t, "/l"), ["Y", "Z", "a", "B", "c", "D"]);
}

#[test]
fn removal_shifts_back() {
    let mut t = tree();
    let ts = vec![
        Transformation::replace_with(Target::slice(l(), 0..2), letters(&[])),
        Transformation::replace_with(Target::node(Path::parse("/l/3")), Node::from("d")),
    ];
    apply_all(&mut t, ts).unwrap();
    assert_eq!(strings(&t, "/l"), ["C", "d"]);
}

#[test]
fn same_length_splice_moves_nothing() {
    let mut t = tree();
    let ts = vec![
        Transformation::replace_with(Target::slice(l(), 1..3), letters(&["b", "c"])),
        Transformation::replace_with(Target::node(Path::parse("/l/3")), Node::from("d")),
    ];
    apply_all(&mut t, ts).unwrap();
    assert_eq!(strings(&t, "/l"), ["A", "b", "c", "d"]);
}

#[test]
fn slice_ending_at_an_insertion_keeps_inserted_items() {
    let mut t = tree();
    let ts = vec![
        FnTransformer::new("ins", |_| {
            Ok(vec![Transformation::replace_with(
                Target::insertion(l(), 2),
                letters(&["X"]),
            )])
        })
        .boxed(),
        FnTransformer::new("rep", |_| {
            Ok(vec![Transformation::replace_with(
                Target::slice(l(), 0..2),
                letters(&["Z"]),
            )])
        })
        .boxed(),
    ];
    Patcher::new(ts).unwrap().run(&mut t).unwrap();
    assert_eq!(strings(&t, "/l"), ["Z", "X", "C", "D"]);

    // same edits, applied in the other order
    let mut t = tree();
    let ts = vec![
        Transformation::replace_with(Target::slice(l(), 0..2), letters(&["Z"])),
        Transformation::replace_with(Target::insertion(l(), 2), letters(&["X"])),
    ];
    apply_all(&mut t, ts).unwrap();
    assert_eq!(strings(&t, "/l"), ["Z", "X", "C", "D"]);
}

#[test]
fn insertions_at_one_gap_keep_production_order() {
    let mut t = tree();
    let ts = vec![
        Transformation::replace_with(Target::insertion(l(), 2), letters(&["X"])),
        Transformation::replace_with(Target::insertion(l(), 2), letters(&["Y"])),
    ];
    apply_all(&mut t, ts).unwrap();
    assert_eq!(strings(&t, "/l"), ["A", "B", "X", "Y", "C", "D"]);
}

#[test]
fn pending_slices_after_the_edit_move_whole() {
    let mut t = tree();
    let ts = vec![
        Transformation::replace_with(Target::slice(l(), 0..1), letters(&["P", "Q"])),
        Transformation::replace_with(Target::slice(l(), 2..4), letters(&["z"])),
    ];
    apply_all(&mut t, ts).unwrap();
    assert_eq!(strings(&t, "/l"), ["P", "Q", "B", "z"]);

    let mut t = tree();
    let ts = vec![
        Transformation::replace_with(Target::slice(l(), 0..2), letters(&[])),
        Transformation::replace_with(Target::slice(l(), 3..4), letters(&["d", "e"])),
    ];
    apply_all(&mut t, ts).unwrap();
    assert_eq!(strings(&t, "/l"), ["C", "d", "e"]);
}

fn copy_of(source: Target) -> Transformation {
    Transformation::new(Target::insertion(Path::parse("/copy"), 0), |_, mut sources| {
        sources
            .swap_remove("all")
            .ok_or_else(|| "missing source".into())
    })
    .with_source("all", source)
}

#[test]
fn enclosing_slice_sources_stretch_with_the_edit() {
    let with_copy = || {
        Node::map([
            ("l", letters(&["A", "B", "C", "D"])),
            ("copy", letters(&[])),
        ])
    };

    let mut t = with_copy();
    let ts = vec![
        Transformation::replace_with(Target::slice(l(), 1..2), letters(&["X1", "X2"])),
        copy_of(Target::slice(l(), 0..4)),
    ];
    apply_all(&mut t, ts).unwrap();
    assert_eq!(strings(&t, "/copy"), ["A", "X1", "X2", "C", "D"]);

    // edit flush with the end of the enclosing slice, shrinking
    let mut t = with_copy();
    let ts = vec![
        Transformation::replace_with(Target::slice(l(), 2..4), letters(&["x"])),
        copy_of(Target::slice(l(), 0..4)),
    ];
    apply_all(&mut t, ts).unwrap();
    assert_eq!(strings(&t, "/copy"), ["A", "B", "x"]);
}

#[test]
fn sources_are_shifted_too() {
    let mut t = tree();
    let ts = vec![
        Transformation::replace_with(Target::insertion(l(), 1), letters(&["new"])),
        Transformation::new(Target::node(Path::parse("/out")), |_, mut sources| {
            sources
                .swap_remove("last")
                .ok_or_else(|| "missing source".into())
        })
        .with_source("last", Target::node(Path::parse("/l/3"))),
    ];
    apply_all(&mut t, ts).unwrap();
    assert_eq!(t.get(&Path::parse("/out")).unwrap().as_str(), Some("D"));
}

#[test]
fn slice_sources_resolve_to_fresh_lists() {
    let mut t = tree();
    let ts = vec![
        Transformation::new(Target::slice(l(), 4..4), |_, mut sources| {
            sources
                .swap_remove("head")
                .ok_or_else(|| "missing source".into())
        })
        .with_source("head", Target::slice(l(), 0..2)),
    ];
    apply_all(&mut t, ts).unwrap();
    assert_eq!(strings(&t, "/l"), ["A", "B", "C", "D", "A", "B"]);
    let copied = t.get(&Path::parse("/l/5")).unwrap();
    assert_eq!(copied.path().to_string(), "/l/5");
}

#[test]
fn apply_receives_current_value() {
    let mut t = tree();
    let ts = vec![Transformation::new(
        Target::node(Path::parse("/name")),
        |current, _| {
            let name = current.as_str().unwrap_or_default();
            Ok(Node::from(format!("{name}_patched")))
        },
    )];
    apply_all(&mut t, ts).unwrap();
    assert_eq!(
        t.get(&Path::parse("/name")).unwrap().as_str(),
        Some("main_patched")
    );
}

#[test]
fn incompatible_replacements_are_rejected() {
    let mut t = tree();
    let ts = vec![Transformation::replace_with(
        Target::node(Path::parse("/name")),
        letters(&["x"]),
    )];
    match apply_all(&mut t, ts).unwrap_err() {
        PatchError::Replacement { source, .. } => assert!(matches!(
            source,
            TreeError::ShapeMismatch {
                expected: "value",
                found: "list",
                ..
            }
        )),
        other => panic!("unexpected error: {other}"),
    }

    let ts = vec![Transformation::replace_with(
        Target::slice(l(), 0..1),
        Node::from("x"),
    )];
    let err = apply_all(&mut t, ts).unwrap_err();
    assert!(matches!(err, PatchError::Replacement { .. }));
}

#[test]
fn unresolvable_targets_fail() {
    let mut t = tree();
    let ts = vec![Transformation::replace_with(
        Target::node(Path::parse("/missing")),
        Node::null(),
    )];
    let err = apply_all(&mut t, ts).unwrap_err();
    assert!(matches!(
        err,
        PatchError::Resolution {
            source: TreeError::MissingKey { .. },
            ..
        }
    ));

    let ts = vec![Transformation::replace_with(
        Target::slice(l(), 2..9),
        letters(&[]),
    )];
    let err = apply_all(&mut t, ts).unwrap_err();
    assert!(matches!(
        err,
        PatchError::Resolution {
            source: TreeError::InvalidSlice { .. },
            ..
        }
    ));
}

#[test]
fn failing_round_leaves_tree_unchanged() {
    let mut t = tree();
    let ts = vec![
        FnTransformer::new("good", |_| {
            Ok(vec![Transformation::replace_with(
                Target::node(Path::parse("/name")),
                Node::from("changed"),
            )])
        })
        .boxed(),
        FnTransformer::new("bad", |_| {
            Ok(vec![Transformation::new(
                Target::node(Path::parse("/out")),
                |_, _| Err("boom".into()),
            )])
        })
        .boxed(),
    ];
    let err = Patcher::new(ts).unwrap().run(&mut t).unwrap_err();
    match err {
        PatchError::Apply { transformation, .. } => {
            assert_eq!(transformation.to_string(), "bad#0")
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(t.get(&Path::parse("/name")).unwrap().as_str(), Some("main"));
}

#[test]
fn completed_rounds_are_kept() {
    let mut t = tree();
    let ts = vec![
        FnTransformer::new("good", |_| {
            Ok(vec![Transformation::replace_with(
                Target::node(Path::parse("/name")),
                Node::from("changed"),
            )])
        })
        .boxed(),
        FnTransformer::new("bad", |_| Err("no transformations today".into()))
            .round_after("good")
            .boxed(),
    ];
    let err = Patcher::new(ts).unwrap().run(&mut t).unwrap_err();
    assert!(matches!(err, PatchError::Produce { ref transformer, .. } if transformer == "bad"));
    assert_eq!(
        t.get(&Path::parse("/name")).unwrap().as_str(),
        Some("changed")
    );
}

#[test]
fn later_rounds_see_earlier_changes() {
    let mut t = tree();
    let ts = vec![
        FnTransformer::new("count", |tree| {
            let len = tree.get(&Path::parse("/l"))?.len().unwrap_or(0) as i64;
            Ok(vec![Transformation::replace_with(
                Target::node(Path::parse("/out")),
                Node::from(len),
            )])
        })
        .round_after("grow")
        .boxed(),
        FnTransformer::new("grow", |tree| {
            let len = tree.get(&Path::parse("/l"))?.len().unwrap_or(0);
            Ok(vec![Transformation::replace_with(
                Target::insertion(l(), len),
                letters(&["E"]),
            )])
        })
        .boxed(),
    ];
    let report = Patcher::new(ts).unwrap().run(&mut t).unwrap();
    assert_eq!(report.rounds.len(), 2);
    assert_eq!(report.rounds[0].transformers, ["grow"]);
    assert_eq!(t.get(&Path::parse("/out")).unwrap().as_int(), Some(5));
}

#[test]
fn empty_patcher_is_a_no_op() {
    let mut t = tree();
    let report = Patcher::new(Vec::new()).unwrap().run(&mut t).unwrap();
    assert!(report.rounds.is_empty());
    assert_eq!(t, tree());
}

fn shout(at: usize) -> Transformation {
    Transformation::new(Target::node(l().index(at)), |current, _| {
        Ok(Node::from(format!("{}!", current.as_str().unwrap_or_default())))
    })
}

proptest! {
    #[test]
    fn slice_writes_shift_later_targets_by_length_change(
        n in 1usize..8,
        a in 0usize..8,
        b in 0usize..8,
        m in 0usize..4,
    ) {
        let (s, e) = (a.min(b).min(n), a.max(b).min(n));
        let mut t = Node::map([(
            "l",
            Node::list((0..n).map(|i| Node::from(format!("v{i}"))).collect()),
        )]);
        let replacement = Node::list((0..m).map(|i| Node::from(format!("r{i}"))).collect());
        let mut ts = vec![Transformation::replace_with(Target::slice(l(), s..e), replacement)];
        ts.extend((e..n).map(shout));

        apply_all(&mut t, ts).unwrap();

        let mut expected: Vec<String> = (0..s).map(|i| format!("v{i}")).collect();
        expected.extend((0..m).map(|i| format!("r{i}")));
        expected.extend((e..n).map(|i| format!("v{i}!")));
        prop_assert_eq!(strings(&t, "/l"), expected);
    }
}
