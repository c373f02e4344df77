//! MATLAB v7.3 / HDF5 archives
//!
//! The HDF5 hierarchy is converted into the same document model the JSON
//! archives use, so both formats go through one decoding path. MATLAB cell
//! arrays (joint manifest, element names, text log fields) are datasets of
//! object references into `#refs#`; they are dereferenced here, and MATLAB
//! `char` arrays (UTF-16 code units) become strings.

use std::path::Path;

use hdf5::types::{IntSize, Reference, TypeDescriptor};
use hdf5::{Dataset, File, Group, ObjectReference1, ReferencedObject};
use serde_json::{Map, Number, Value};
use tracing::debug;

use super::reader::REFS_KEY;
use super::ArchiveError;

/// Attribute MATLAB puts on empty arrays; their data holds the dimensions
const MATLAB_EMPTY: &str = "MATLAB_empty";

/// Read an HDF5 archive as an archive document
pub fn read_document(path: &Path) -> Result<Value, ArchiveError> {
    let file = File::open(path)?;
    group_to_value(&file, &file, true)
}

fn group_to_value(file: &File, group: &Group, top: bool) -> Result<Value, ArchiveError> {
    let mut object = Map::new();
    for name in group.member_names()? {
        // Reference targets are reached through the cells pointing at them
        if top && name == REFS_KEY {
            continue;
        }
        let value = if let Ok(child) = group.group(&name) {
            group_to_value(file, &child, false)?
        } else if let Ok(dataset) = group.dataset(&name) {
            dataset_to_value(file, &dataset)?
        } else {
            debug!("Skipping HDF5 member '{}'", name);
            continue;
        };
        object.insert(name, value);
    }
    Ok(Value::Object(object))
}

fn dataset_to_value(file: &File, dataset: &Dataset) -> Result<Value, ArchiveError> {
    if dataset.attr(MATLAB_EMPTY).is_ok() {
        return Ok(Value::Array(Vec::new()));
    }
    match dataset.dtype()?.to_descriptor()? {
        TypeDescriptor::Reference(Reference::Object) => {
            let cells = dataset.read_raw::<ObjectReference1>()?;
            cells
                .iter()
                .map(|cell| match file.dereference(cell)? {
                    ReferencedObject::Dataset(target) => dataset_to_value(file, &target),
                    ReferencedObject::Group(target) => group_to_value(file, &target, false),
                    _ => Ok(Value::Null),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        TypeDescriptor::Unsigned(IntSize::U2) => {
            let units = dataset.read_raw::<u16>()?;
            Ok(Value::String(String::from_utf16_lossy(&units)))
        }
        _ => {
            let values = dataset.read_raw::<f64>()?;
            Ok(shape_rows(&dataset.shape(), &values))
        }
    }
}

/// One array entry per index of the first axis, the remaining axes
/// flattened into it. NaN becomes `null`.
fn shape_rows(shape: &[usize], values: &[f64]) -> Value {
    let number = |v: f64| Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null);
    match shape {
        [] => values.first().copied().map(number).unwrap_or(Value::Null),
        [_] => Value::Array(values.iter().copied().map(number).collect()),
        [rows, ..] => {
            let width = if *rows == 0 { 1 } else { (values.len() / rows).max(1) };
            Value::Array(
                values
                    .chunks(width)
                    .map(|row| Value::Array(row.iter().copied().map(number).collect()))
                    .collect(),
            )
        }
    }
}
