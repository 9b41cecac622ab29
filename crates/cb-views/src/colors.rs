//! Color utilities for render models

use cb_core::ChartKind;
use serde::{Serialize, Serializer};
use std::fmt;

use crate::render::RenderModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Rgb {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

pub const PALETTE: [Rgb; 8] = [
    Rgb::new(100, 150, 250), // Blue
    Rgb::new(250, 150, 100), // Orange
    Rgb::new(150, 250, 100), // Green
    Rgb::new(250, 100, 150), // Pink
    Rgb::new(150, 100, 250), // Purple
    Rgb::new(250, 250, 100), // Yellow
    Rgb::new(100, 250, 250), // Cyan
    Rgb::new(250, 100, 100), // Red
];

/// Get a categorical color from the palette.
///
/// Index is a row or series position, so a category keeps its color only as
/// long as row order is stable between renders.
pub fn categorical_color(index: usize) -> Rgb {
    PALETTE[index % PALETTE.len()]
}

/// Threshold class of a single point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorClass {
    Above,
    Below,
    /// Point has no value
    Neutral,
}

impl ColorClass {
    pub fn color(&self) -> Rgb {
        match self {
            ColorClass::Above => PALETTE[2],
            ColorClass::Below => PALETTE[7],
            ColorClass::Neutral => Rgb::new(160, 160, 160),
        }
    }
}

/// Mark each point of a single-series bar chart as above or below the
/// series mean. Other models, and series with no values, pass through
/// uncolored.
pub fn colorize(model: RenderModel, enabled: bool) -> RenderModel {
    if !enabled {
        return model;
    }
    let RenderModel::Categorical(mut categorical) = model else {
        return model;
    };
    if categorical.chart_kind != ChartKind::Bar || !categorical.is_single_series() {
        return RenderModel::Categorical(categorical);
    }

    for series in categorical.series.iter_mut() {
        let values: Vec<f64> = series.values.iter().flatten().copied().collect();
        if values.is_empty() {
            series.point_classes = None;
            continue;
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        series.point_classes = Some(
            series
                .values
                .iter()
                .map(|value| match value {
                    Some(v) if *v >= mean => ColorClass::Above,
                    Some(_) => ColorClass::Below,
                    None => ColorClass::Neutral,
                })
                .collect(),
        );
    }

    RenderModel::Categorical(categorical)
}
