//! Shared fixtures: a tiny ConceptNet dump, TransE embeddings and grounded examples.

#![allow(dead_code)]

use std::path::Path;

/// Four assertions over dog, animal, organism and kennel (vocabulary IDs 0..4 in
/// first-seen order), plus a non-English assertion that extraction drops.
pub const DUMP: &str = "\
/a/1\t/r/IsA\t/c/en/dog/n\t/c/en/animal\t{\"weight\": 2.0}
/a/2\t/r/IsA\t/c/en/animal\t/c/en/organism\t{\"weight\": 1.0}
/a/3\t/r/AtLocation\t/c/en/dog\t/c/en/kennel\t{\"weight\": 1.0}
/a/4\t/r/AtLocation\t/c/en/animal\t/c/en/kennel\t{\"weight\": 1.0}
/a/5\t/r/IsA\t/c/fr/chien\t/c/en/dog\t{\"weight\": 1.0}
";

pub const DOG: u32 = 0;
pub const ANIMAL: u32 = 1;
pub const ORGANISM: u32 = 2;
pub const KENNEL: u32 = 3;
pub const CONCEPTS: usize = 4;

pub const ATLOCATION: u16 = 1;
pub const ISA: u16 = 5;

/// One example with paths to score, one empty example.
pub const GROUNDED: &str = "\
{\"id\": \"q1\", \"qc\": [\"dog\"], \"ac\": [\"organism\", \"kennel\"]}
{\"id\": \"q2\", \"qc\": [], \"ac\": []}
";

/// Entity rows chosen so that `isa` hops along the x axis score 1 and every
/// `atlocation` hop scores close to 0.
pub fn entity_rows() -> Vec<Vec<f32>> {
    vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![2.0, 0.0], vec![0.0, 5.0]]
}

pub fn relation_rows() -> Vec<Vec<f32>> {
    let mut rows = vec![vec![0.0, 1.0]; 17];
    rows[ISA as usize] = vec![1.0, 0.0];
    rows[ATLOCATION as usize] = vec![1.0, -5.0];
    rows
}

/// Write a version 1 `.npy` file of `<f4` rows.
pub fn write_npy(path: &Path, rows: &[Vec<f32>]) {
    let dim = rows.first().map_or(0, Vec::len);
    let mut header = format!(
        "{{'descr': '<f4', 'fortran_order': False, 'shape': ({}, {}), }}",
        rows.len(),
        dim
    );
    while (10 + header.len() + 1) % 64 != 0 {
        header.push(' ');
    }
    header.push('\n');

    let mut bytes = b"\x93NUMPY\x01\x00".to_vec();
    bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
    bytes.extend_from_slice(header.as_bytes());
    for v in rows.iter().flatten() {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    std::fs::write(path, bytes).unwrap();
}
