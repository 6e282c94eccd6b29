//! Plain-text vector tables
//!
//! One entity per line followed by its components, separated by
//! whitespace. An optional first line `N D` gives the row count and width.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{info, warn};

use crate::error::{Result, VectorError};
use crate::vector::{KeyedVectors, Matrix};

fn parse_header(line: &str) -> Option<(usize, usize)> {
    let mut parts = line.split_whitespace();
    let rows = parts.next()?.parse().ok()?;
    let cols = parts.next()?.parse().ok()?;
    parts.next().is_none().then_some((rows, cols))
}

/// Read a vector table, keeping at most `limit` entities
///
/// Repeated entities keep their first vector.
pub fn read_text<R: BufRead>(reader: R, limit: Option<usize>) -> Result<KeyedVectors> {
    let mut header: Option<(usize, usize)> = None;
    let mut width: Option<usize> = None;
    let mut entities: Vec<String> = Vec::new();
    let mut data: Vec<f32> = Vec::new();
    let mut seen = hashbrown::HashSet::new();
    let mut first_line = true;

    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = number + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if first_line {
            first_line = false;
            if let Some((rows, cols)) = parse_header(trimmed) {
                header = Some((rows, cols));
                width = Some(cols);
                continue;
            }
        }
        if limit.is_some_and(|limit| entities.len() >= limit) {
            break;
        }

        let mut parts = trimmed.split_whitespace();
        let Some(entity) = parts.next() else {
            continue;
        };
        let values = parts
            .map(|p| {
                p.parse::<f32>().map_err(|e| VectorError::Parse {
                    line: line_no,
                    message: format!("invalid component {:?}: {}", p, e),
                })
            })
            .collect::<Result<Vec<f32>>>()?;

        let expected = *width.get_or_insert(values.len());
        if values.len() != expected || expected == 0 {
            return Err(VectorError::Parse {
                line: line_no,
                message: format!("expected {} components, found {}", expected, values.len()),
            });
        }

        if !seen.insert(entity.to_string()) {
            warn!("Duplicate entity {:?} on line {}, keeping the first vector", entity, line_no);
            continue;
        }
        entities.push(entity.to_string());
        data.extend_from_slice(&values);
    }

    if let Some((rows, _)) = header {
        let expected = limit.map_or(rows, |limit| limit.min(rows));
        if entities.len() != expected {
            warn!("Header declares {} vectors, read {}", rows, entities.len());
        }
    }

    let cols = width.unwrap_or(0);
    let matrix = Matrix::from_vec(data, cols)?;
    info!("Loaded {} vectors of size {}", entities.len(), cols);
    KeyedVectors::from_parts(entities, matrix)
}

/// Read a vector table from a file
pub fn read_text_file<P: AsRef<Path>>(path: P, limit: Option<usize>) -> Result<KeyedVectors> {
    let file = File::open(path.as_ref())?;
    read_text(BufReader::new(file), limit)
}
