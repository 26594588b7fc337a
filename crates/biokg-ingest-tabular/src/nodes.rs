//! Node tables: prepared identifier lists that seed the registry.

use biokg_graph::{IdentifierRegistry, NodeKind};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::table::{TableFormat, TableReader};
use crate::TabularError;

/// Column layout of a node table: `identifier[<TAB>kind][<TAB>label]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTableSpec {
    pub name: String,
    /// Kind used when the row has no kind column (or the column is empty).
    #[serde(default)]
    pub default_kind: Option<NodeKind>,
    #[serde(default)]
    pub format: TableFormat,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTableReport {
    pub table: String,
    pub rows: usize,
    pub registered: usize,
    pub labels: usize,
    /// Rows with an invalid identifier or kind; skipped.
    pub invalid: usize,
}

pub fn register_node_table_file(
    registry: &IdentifierRegistry,
    spec: &NodeTableSpec,
    path: &Path,
) -> Result<NodeTableReport, TabularError> {
    let file = File::open(path).map_err(|e| TabularError::io(path, e))?;
    register_node_table(registry, spec, BufReader::new(file))
}

/// Register every row of a node table.
pub fn register_node_table<R: BufRead>(
    registry: &IdentifierRegistry,
    spec: &NodeTableSpec,
    reader: R,
) -> Result<NodeTableReport, TabularError> {
    let mut report = NodeTableReport {
        table: spec.name.clone(),
        ..Default::default()
    };

    for row in TableReader::new(reader, spec.format.clone()) {
        let row = row.map_err(|e| TabularError::io(&spec.name, e))?;
        report.rows += 1;

        let kind = match row.field(1) {
            Some(raw) => NodeKind::parse(raw),
            None => spec.default_kind,
        };
        let (Some(identifier), Some(kind)) = (row.field(0), kind) else {
            report.invalid += 1;
            tracing::debug!(table = %spec.name, line = row.line, "skipping invalid node row");
            continue;
        };

        match registry.register(identifier, kind) {
            Ok(id) => {
                report.registered += 1;
                if let Some(label) = row.field(2) {
                    registry.add_label(&id, label);
                    report.labels += 1;
                }
            }
            Err(err) => {
                report.invalid += 1;
                tracing::debug!(table = %spec.name, line = row.line, error = %err, "skipping invalid node row");
            }
        }
    }

    Ok(report)
}
