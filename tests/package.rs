use certgrid::package::{ArtifactKind, package, part_name, write_artifact};
use std::io::{Cursor, Read};
use zip::ZipArchive;

#[test]
fn one_page_is_delivered_as_pdf() {
    let artifact = package(vec![b"%PDF-page-1".to_vec()], "05-03-2024-01-07-09-pm").unwrap();
    assert_eq!(artifact.kind, ArtifactKind::Single);
    assert_eq!(artifact.file_name, "05-03-2024-01-07-09-pm.pdf");
    assert_eq!(artifact.bytes, b"%PDF-page-1");
    assert!(artifact.parts.is_empty());
}

#[test]
fn several_pages_are_zipped_in_order() {
    let blobs: Vec<Vec<u8>> = (1..=3).map(|i| format!("%PDF-page-{i}").into_bytes()).collect();
    let artifact = package(blobs, "root").unwrap();
    assert_eq!(artifact.kind, ArtifactKind::Archive);
    assert_eq!(artifact.file_name, "root.zip");
    assert_eq!(
        artifact.parts,
        vec!["1-part-root.pdf", "2-part-root.pdf", "3-part-root.pdf"]
    );

    let mut archive = ZipArchive::new(Cursor::new(artifact.bytes)).unwrap();
    assert_eq!(archive.len(), 3);
    for i in 0..3 {
        let mut entry = archive.by_index(i).unwrap();
        assert_eq!(entry.name(), part_name(i, "root"));
        let mut body = String::new();
        entry.read_to_string(&mut body).unwrap();
        assert_eq!(body, format!("%PDF-page-{}", i + 1));
    }
}

#[test]
#[should_panic]
fn nothing_to_package_panics() {
    let _ = package(Vec::new(), "root");
}

#[test]
fn artifact_is_written_under_its_name() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = package(vec![b"a".to_vec(), b"b".to_vec()], "r").unwrap();
    let path = write_artifact(&artifact, &dir.path().join("nested")).unwrap();
    assert_eq!(path.file_name().unwrap(), "r.zip");
    assert_eq!(std::fs::read(path).unwrap(), artifact.bytes);
}
