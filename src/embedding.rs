//! Dense embedding matrices.
//!
//! Entity and relation embeddings are stored as 2-D NumPy `.npy` arrays, one row
//! per concept or relation ID. The file is memory-mapped, the header parsed, and
//! the rows decoded into an owned `f32` buffer that workers share by reference.

use std::path::Path;

use memmap2::Mmap;

use crate::error::LoadError;

const NPY_MAGIC: &[u8; 6] = b"\x93NUMPY";

/// Row-major `rows x dim` matrix of `f32`.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatrix {
    rows: usize,
    dim: usize,
    data: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DType {
    F32,
    F64,
}

impl DType {
    fn size(self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F64 => 8,
        }
    }
}

impl EmbeddingMatrix {
    /// Build a matrix from equally sized rows.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self, LoadError> {
        let dim = rows.first().map_or(0, Vec::len);
        if let Some(bad) = rows.iter().position(|r| r.len() != dim) {
            return Err(LoadError::Embedding {
                path: "<memory>".into(),
                message: format!("row {bad} has {} columns, expected {dim}", rows[bad].len()),
            });
        }
        Ok(Self {
            rows: rows.len(),
            dim,
            data: rows.into_iter().flatten().collect(),
        })
    }

    /// Load a `.npy` file holding a 2-D `<f4` or `<f8` array in C order.
    pub fn load_npy(path: &Path) -> Result<Self, LoadError> {
        let shown = path.display().to_string();
        let invalid = |message: String| LoadError::Embedding {
            path: shown.clone(),
            message,
        };
        let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
            path: shown.clone(),
            source,
        })?;
        // Safety: read-only map, dropped before return.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|source| LoadError::Io {
            path: shown.clone(),
            source,
        })?;

        if mmap.len() < 10 || &mmap[..6] != NPY_MAGIC {
            return Err(invalid("missing .npy magic".into()));
        }
        let major = mmap[6];
        let (header_len, header_start) = match major {
            1 => (u16::from_le_bytes([mmap[8], mmap[9]]) as usize, 10),
            2 | 3 => {
                if mmap.len() < 12 {
                    return Err(invalid("truncated header".into()));
                }
                (
                    u32::from_le_bytes([mmap[8], mmap[9], mmap[10], mmap[11]]) as usize,
                    12,
                )
            }
            v => return Err(invalid(format!("unsupported .npy version {v}"))),
        };
        let data_start = header_start + header_len;
        if mmap.len() < data_start {
            return Err(invalid("truncated header".into()));
        }
        let header = std::str::from_utf8(&mmap[header_start..data_start])
            .map_err(|_| invalid("header is not ASCII".into()))?;
        let (dtype, rows, dim) = parse_header(header).map_err(invalid)?;

        let expected = rows
            .checked_mul(dim)
            .and_then(|n| n.checked_mul(dtype.size()))
            .ok_or_else(|| invalid(format!("shape ({rows}, {dim}) overflows")))?;
        let body = &mmap[data_start..];
        if body.len() < expected {
            return Err(invalid(format!(
                "expected {expected} data bytes for shape ({rows}, {dim}), found {}",
                body.len()
            )));
        }
        let data: Vec<f32> = match dtype {
            DType::F32 => body[..expected]
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
            DType::F64 => body[..expected]
                .chunks_exact(8)
                .map(|b| {
                    f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f32
                })
                .collect(),
        };

        tracing::info!(path = %shown, rows, dim, "loaded embeddings");
        Ok(Self { rows, dim, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// The embedding at `index`, if the matrix has that many rows.
    pub fn row(&self, index: usize) -> Option<&[f32]> {
        (index < self.rows).then(|| &self.data[index * self.dim..(index + 1) * self.dim])
    }
}

/// Extract dtype and 2-D shape from a header such as
/// `{'descr': '<f4', 'fortran_order': False, 'shape': (3, 2), }`.
fn parse_header(header: &str) -> Result<(DType, usize, usize), String> {
    fn value_of<'h>(header: &'h str, key: &str) -> Result<&'h str, String> {
        let needle = format!("'{key}':");
        let start = header
            .find(&needle)
            .ok_or_else(|| format!("header has no '{key}' entry"))?
            + needle.len();
        Ok(header[start..].trim_start())
    }

    let descr = value_of(header, "descr")?;
    let dtype = if descr.starts_with("'<f4'") {
        DType::F32
    } else if descr.starts_with("'<f8'") {
        DType::F64
    } else {
        let end = descr.find(',').unwrap_or(descr.len());
        return Err(format!("unsupported dtype {}", &descr[..end]));
    };

    if !value_of(header, "fortran_order")?.starts_with("False") {
        return Err("Fortran-ordered arrays are not supported".into());
    }

    let shape = value_of(header, "shape")?;
    let close = shape.find(')').ok_or("unterminated shape")?;
    let dims: Vec<usize> = shape[1..close]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>().map_err(|e| format!("bad shape entry {s:?}: {e}")))
        .collect::<Result<_, _>>()?;
    match dims.as_slice() {
        [rows, dim] => Ok((dtype, *rows, *dim)),
        other => Err(format!("expected a 2-D array, found shape {other:?}")),
    }
}
