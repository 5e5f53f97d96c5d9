//! Reader for plain-text node classification files.
//!
//! One line per node in the native mesh's canonical iteration order:
//!
//! ```text
//! # dim id
//! 0 3
//! 1 12
//! 2 1
//! ```
//!
//! Blank lines and `#` comments are skipped. The result feeds
//! [`ReverseClassification::from_node_classification`].
//!
//! [`ReverseClassification::from_node_classification`]:
//! crate::topology::classification::ReverseClassification::from_node_classification

use std::io::Read;

use crate::coupling_error::CouplingError;
use crate::topology::classification::NodeClassification;

fn parse_field<T: std::str::FromStr>(
    raw: Option<&str>,
    what: &str,
    line: usize,
) -> Result<T, CouplingError> {
    let raw = raw.ok_or_else(|| CouplingError::Parse {
        line,
        message: format!("missing {what}"),
    })?;
    raw.parse::<T>().map_err(|_| CouplingError::Parse {
        line,
        message: format!("invalid {what}: {raw}"),
    })
}

/// Read a node classification, one `<dim> <geometric id>` pair per line.
///
/// # Errors
/// `Parse` with the 1-based line number on malformed input; read failures are
/// reported against line 0.
pub fn read_node_classification<R: Read>(
    mut reader: R,
) -> Result<NodeClassification, CouplingError> {
    let mut contents = String::new();
    reader
        .read_to_string(&mut contents)
        .map_err(|e| CouplingError::Parse {
            line: 0,
            message: e.to_string(),
        })?;
    let mut out = NodeClassification::default();
    for (n, raw) in contents.lines().enumerate() {
        let line = n + 1;
        let text = raw.split('#').next().unwrap_or("").trim();
        if text.is_empty() {
            continue;
        }
        let mut parts = text.split_whitespace();
        let dim: i8 = parse_field(parts.next(), "dimension", line)?;
        let id: i32 = parse_field(parts.next(), "geometric id", line)?;
        if let Some(extra) = parts.next() {
            return Err(CouplingError::Parse {
                line,
                message: format!("unexpected trailing token: {extra}"),
            });
        }
        if !(0..=3).contains(&dim) {
            return Err(CouplingError::Parse {
                line,
                message: format!("dimension {dim} out of range 0..=3"),
            });
        }
        out.dimension.push(dim);
        out.geometric_id.push(id);
    }
    log::debug!("read classification for {} nodes", out.len());
    Ok(out)
}
