use graft_core::json::{JsonOpts, dump_dir_json};
use graft_core::units::{find_unit_files, zip_backup_dir};
use graft_core::{
    CodecError, DecodeOpts, Node, Patcher, Path, PatchError, PlanError, Scalar, decode_unit,
    encode_unit, json_to_node, load_plan, node_to_json, read_unit_file, write_unit_file,
};

fn sample() -> Node {
    Node::map([
        ("name", Node::from("main")),
        ("n", Node::from(-5i64)),
        ("f", Node::from(1.5f64)),
        ("ok", Node::from(true)),
        ("blob", Node::value(Scalar::Bytes(vec![1, 2, 3]))),
        (
            "attr",
            Node::value(Scalar::Raw {
                tag: "Code".into(),
                bytes: vec![9],
            }),
        ),
        (
            "body",
            Node::list(vec![Node::null(), Node::list(vec![Node::from(1i64)])]),
        ),
    ])
}

#[test]
fn unit_round_trip() {
    let tree = sample();
    let bytes = encode_unit(&tree).unwrap();
    assert!(bytes.starts_with(b"GRFT"));
    let decoded = decode_unit(bytes.clone(), DecodeOpts::default()).unwrap();
    assert_eq!(decoded, tree);
    assert_eq!(encode_unit(&decoded).unwrap(), bytes);
    assert_eq!(
        decoded.get(&Path::parse("/body/1/0")).unwrap().path().to_string(),
        "/body/1/0"
    );
}

#[test]
fn lazy_decode_defers_containers() {
    let bytes = encode_unit(&sample()).unwrap();
    let root = decode_unit(bytes, DecodeOpts { lazy_depth: Some(1) }).unwrap();
    let body = &root.as_map().unwrap()["body"];
    assert!(body.is_lazy());
    assert_eq!(root.get(&Path::parse("/body/1/0")).unwrap().as_int(), Some(1));
    assert_eq!(root, sample());
}

#[test]
fn decode_errors() {
    let err = decode_unit(b"NOPE\x01\x00".to_vec(), DecodeOpts::default()).unwrap_err();
    assert!(matches!(err, CodecError::BadMagic));
    let err = decode_unit(b"GRFT\x02\x00".to_vec(), DecodeOpts::default()).unwrap_err();
    assert!(matches!(err, CodecError::UnsupportedVersion { version: 2 }));
    let err = decode_unit(b"GRFT\x01\x63".to_vec(), DecodeOpts::default()).unwrap_err();
    assert!(matches!(err, CodecError::UnknownTag { tag: 0x63, pos: 5 }));

    let mut bytes = encode_unit(&sample()).unwrap();
    bytes.push(0);
    let err = decode_unit(bytes.clone(), DecodeOpts::default()).unwrap_err();
    assert!(matches!(err, CodecError::TrailingBytes { .. }));
    bytes.truncate(bytes.len() - 3);
    assert!(decode_unit(bytes, DecodeOpts::default()).is_err());
}

#[test]
fn duplicate_map_keys_are_rejected() {
    // map of two members, both named "a"
    let bytes = b"GRFT\x01\x09\x07\x02\x01a\x00\x01a\x01".to_vec();
    let err = decode_unit(bytes.clone(), DecodeOpts::default()).unwrap_err();
    assert!(matches!(err, CodecError::DuplicateKey { ref key, pos: 11 } if key == "a"));

    let lazy = decode_unit(bytes, DecodeOpts { lazy_depth: Some(0) }).unwrap();
    let err = lazy.get(&Path::parse("/a")).unwrap_err();
    assert!(err.to_string().contains("duplicate map key"));
}

#[test]
fn unit_files_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("main.unit");
    write_unit_file(&p, &sample()).unwrap();
    let root = read_unit_file(&p, DecodeOpts::default()).expect("read unit");
    assert_eq!(root, sample());

    let missing = read_unit_file(&dir.path().join("nope.unit"), DecodeOpts::default());
    assert!(matches!(missing, Err(CodecError::Io(_))));
}

#[test]
fn lossless_json_converts_back() {
    let tree = sample();
    let js = node_to_json(&tree, JsonOpts::lossless());
    assert_eq!(js["blob"], serde_json::json!({ "$bytes": [1, 2, 3] }));
    assert_eq!(js["attr"], serde_json::json!({ "$raw": "Code", "$bytes": [9] }));
    assert_eq!(json_to_node(&js), tree);
}

#[test]
fn json_summaries_and_truncation() {
    let long = Node::list((0..200i64).map(Node::from).collect());
    let tree = Node::map([("long", long), ("blob", Node::value(Scalar::Bytes(vec![0; 64])))]);
    let js = node_to_json(&tree, JsonOpts::default());
    assert_eq!(js["blob"], serde_json::json!({ "$type": "bytes", "len": 64 }));
    let arr = js["long"].as_array().unwrap();
    assert_eq!(arr.len(), 129);
    assert_eq!(arr[128]["$omitted"], serde_json::json!(72));
}

#[test]
fn dump_directory_of_units() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    write_unit_file(&dir.path().join("a.unit"), &sample()).unwrap();
    write_unit_file(&dir.path().join("sub/b.unit"), &Node::from(7i64)).unwrap();
    std::fs::write(dir.path().join("notes.txt"), "not a unit").unwrap();
    std::fs::write(dir.path().join("broken.unit"), "GRFT").unwrap();

    let files = find_unit_files(dir.path()).unwrap();
    assert_eq!(files.len(), 3);

    let js: serde_json::Value =
        serde_json::from_str(&dump_dir_json(dir.path(), JsonOpts::default()).unwrap()).unwrap();
    assert_eq!(js["sub/b.unit"], serde_json::json!(7));
    assert_eq!(js["a.unit"]["name"], serde_json::json!("main"));
    assert!(js["broken.unit"]["$error"].is_string());
    assert!(js.get("notes.txt").is_none());
}

#[test]
fn backup_zips_directory() {
    let dir = tempfile::tempdir().unwrap();
    let units = dir.path().join("units");
    std::fs::create_dir(&units).unwrap();
    write_unit_file(&units.join("a.unit"), &sample()).unwrap();

    let backup = zip_backup_dir(&units).unwrap();
    assert_eq!(backup.parent(), Some(dir.path()));
    let name = backup.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("units_") && name.ends_with(".zip"));

    let mut archive = zip::ZipArchive::new(std::fs::File::open(&backup).unwrap()).unwrap();
    assert!(archive.by_name("a.unit").is_ok());

    assert!(zip_backup_dir(&units.join("a.unit")).is_err());
}

const PLAN: &str = r#"{
  "transformers": [
    {
      "id": "grow",
      "edits": [
        { "op": "append", "list": "/body", "items": [4] },
        { "op": "insert", "list": "/body", "index": 0, "items": [0] }
      ]
    },
    {
      "id": "rename",
      "mustRunRoundAfter": ["grow"],
      "edits": [
        { "op": "set", "path": "/name", "value": "entry" },
        { "op": "copy", "from": "/body/4", "to": "/last" }
      ]
    },
    {
      "id": "trim",
      "mustRunAfter": ["rename"],
      "edits": [
        { "op": "remove", "list": "/body", "start": 0, "end": 1 },
        { "op": "splice", "list": "/body", "start": 1, "end": 2, "items": ["two", "deux"] }
      ]
    }
  ]
}"#;

#[test]
fn plans_drive_the_patcher() {
    let mut tree = Node::map([
        ("name", Node::from("main")),
        (
            "body",
            Node::list(vec![Node::from(1i64), Node::from(2i64), Node::from(3i64)]),
        ),
        ("last", Node::null()),
    ]);
    let plan = load_plan(PLAN).unwrap();
    let patcher = Patcher::new(plan.into_transformers()).unwrap();
    assert_eq!(patcher.round_ids(), vec![vec!["grow"], vec!["rename", "trim"]]);

    let report = patcher.run(&mut tree).unwrap();
    assert_eq!(report.applied(), 6);
    assert_eq!(tree.get(&Path::parse("/name")).unwrap().as_str(), Some("entry"));
    assert_eq!(tree.get(&Path::parse("/last")).unwrap().as_int(), Some(4));

    let body = node_to_json(tree.get(&Path::parse("/body")).unwrap(), JsonOpts::default());
    assert_eq!(body, serde_json::json!(["two", "deux", 2, 3, 4]));
}

#[test]
fn plan_errors() {
    assert!(matches!(load_plan("{"), Err(PlanError::Json(_))));

    let plan = load_plan(
        r#"{ "transformers": [ { "id": "bad",
             "edits": [ { "op": "remove", "list": "/name", "start": 0, "end": 1 } ] } ] }"#,
    )
    .unwrap();
    let mut tree = Node::map([("name", Node::from("main"))]);
    let err = Patcher::new(plan.into_transformers())
        .unwrap()
        .run(&mut tree)
        .unwrap_err();
    assert!(matches!(err, PatchError::Resolution { .. }));

    let plan = load_plan(
        r#"{ "transformers": [ { "id": "bad",
             "edits": [ { "op": "append", "list": "/name", "items": [] } ] } ] }"#,
    )
    .unwrap();
    let err = Patcher::new(plan.into_transformers())
        .unwrap()
        .run(&mut tree)
        .unwrap_err();
    assert!(matches!(err, PatchError::Produce { ref transformer, .. } if transformer == "bad"));
}
