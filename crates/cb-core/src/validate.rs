//! Spec validation against a column catalog.
//!
//! Rules run in a fixed order and the first failure wins:
//!
//! 1. required columns are present
//! 2. referenced columns exist (skipped while the catalog is empty)
//! 3. non-numeric value columns only accept `count`; histograms always
//!    count, so they need a numeric value column instead
//! 4. dual-axis charts have a secondary value column
//! 5. histogram bin count is within `[2, 100]`

use crate::columns::ColumnCatalog;
use crate::error::ValidationError;
use crate::spec::{Aggregation, ChartKind, SpecField, VisualizationSpec};

pub const MIN_BINS: u32 = 2;
pub const MAX_BINS: u32 = 100;

pub fn validate(spec: &VisualizationSpec, columns: &ColumnCatalog) -> Result<(), ValidationError> {
    let group_by = required(spec.chart_kind.requires_group_by(), &spec.group_by, SpecField::GroupBy)?;
    let value_column = required(true, &spec.value_column, SpecField::ValueColumn)?;

    if let Some(column) = group_by {
        known_column(columns, SpecField::GroupBy, column)?;
    }
    if let Some(column) = spec.effective_sub_group() {
        known_column(columns, SpecField::SubGroup, column)?;
    }
    if let Some(column) = value_column {
        known_column(columns, SpecField::ValueColumn, column)?;
        if spec.chart_kind == ChartKind::Histogram {
            binnable(columns, column)?;
        } else {
            aggregatable(columns, column, spec.aggregation)?;
        }
    }

    if spec.chart_kind == ChartKind::DualAxis {
        if let Some(column) = required(true, &spec.secondary_value_column, SpecField::SecondaryValueColumn)? {
            known_column(columns, SpecField::SecondaryValueColumn, column)?;
            aggregatable(columns, column, spec.aggregation)?;
        }
    }

    if spec.chart_kind == ChartKind::Histogram {
        let bins = spec.bins.ok_or(ValidationError::missing(SpecField::Bins))?;
        if !(MIN_BINS..=MAX_BINS).contains(&bins) {
            return Err(ValidationError::InvalidBinCount { bins });
        }
    }

    Ok(())
}

fn required<'a>(
    needed: bool,
    value: &'a Option<String>,
    field: SpecField,
) -> Result<Option<&'a str>, ValidationError> {
    match value.as_deref().map(str::trim) {
        Some(column) if !column.is_empty() => Ok(Some(column)),
        _ if needed => Err(ValidationError::missing(field)),
        _ => Ok(None),
    }
}

fn known_column(columns: &ColumnCatalog, field: SpecField, column: &str) -> Result<(), ValidationError> {
    if columns.is_empty() || columns.contains(column) {
        Ok(())
    } else {
        Err(ValidationError::UnknownColumn {
            field,
            column: column.to_string(),
        })
    }
}

fn aggregatable(columns: &ColumnCatalog, column: &str, aggregation: Aggregation) -> Result<(), ValidationError> {
    match columns.dtype_of(column) {
        Some(dtype) if !dtype.is_numeric() && aggregation.requires_numeric() => {
            Err(ValidationError::IncompatibleAggregation {
                column: column.to_string(),
                aggregation,
            })
        }
        _ => Ok(()),
    }
}

fn binnable(columns: &ColumnCatalog, column: &str) -> Result<(), ValidationError> {
    match columns.dtype_of(column) {
        Some(dtype) if !dtype.is_numeric() => Err(ValidationError::NotBinnable {
            column: column.to_string(),
        }),
        _ => Ok(()),
    }
}
