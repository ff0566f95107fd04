//! Rendering hints handed to the chart layer. Nothing here is interpreted by barvault.

use serde::{Deserialize, Serialize};

use crate::error::DirectiveError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderKind {
    Line,
    Scatter,
    Bar,
    Histogram,
    Area,
}

/// `Price` shares the candle axis; `Secondary` is a separate oscillator axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    Price,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineDash {
    Solid,
    Dot,
    Dash,
    LongDash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Fill {
    None,
    ToZero,
    ToNext,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotDirective {
    pub column: Option<String>,
    pub label: String,
    pub render: RenderKind,
    pub axis: Axis,
    pub color: String,
    pub line_width: f64,
    pub dash: LineDash,
    pub opacity: f64,
    pub fill: Fill,
    pub show_legend: bool,
    pub reference_level: Option<f64>,
}

impl PlotDirective {
    /// A solid line drawn from a derived column on the price axis.
    pub fn line(column: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            column: Some(column.into()),
            label: label.into(),
            render: RenderKind::Line,
            axis: Axis::Price,
            color: String::from("blue"),
            line_width: 2.0,
            dash: LineDash::Solid,
            opacity: 0.8,
            fill: Fill::None,
            show_legend: true,
            reference_level: None,
        }
    }

    /// A horizontal line at a fixed level, not backed by any column.
    pub fn reference(level: f64, label: impl Into<String>) -> Self {
        Self {
            column: None,
            reference_level: Some(level),
            ..Self::line(String::new(), label)
        }
    }

    #[must_use]
    pub fn color(mut self, color: &str) -> Self {
        self.color = color.to_owned();
        self
    }

    #[must_use]
    pub fn width(mut self, width: f64) -> Self {
        self.line_width = width;
        self
    }

    #[must_use]
    pub fn dash(mut self, dash: LineDash) -> Self {
        self.dash = dash;
        self
    }

    #[must_use]
    pub fn opacity(mut self, opacity: f64) -> Self {
        self.opacity = opacity;
        self
    }

    #[must_use]
    pub fn on_axis(mut self, axis: Axis) -> Self {
        self.axis = axis;
        self
    }

    #[must_use]
    pub fn render(mut self, render: RenderKind) -> Self {
        self.render = render;
        self
    }

    #[must_use]
    pub fn fill(mut self, fill: Fill) -> Self {
        self.fill = fill;
        self
    }

    #[must_use]
    pub fn hide_legend(mut self) -> Self {
        self.show_legend = false;
        self
    }

    pub fn validate(&self) -> Result<(), DirectiveError> {
        if self.label.trim().is_empty() {
            return Err(DirectiveError::EmptyLabel);
        }
        if self.color.trim().is_empty() {
            return Err(DirectiveError::EmptyColor {
                label: self.label.clone(),
            });
        }
        let has_column = self.column.as_deref().is_some_and(|column| !column.is_empty());
        if !has_column && self.reference_level.is_none() {
            return Err(DirectiveError::MissingTarget {
                label: self.label.clone(),
            });
        }
        if !(0.0..=1.0).contains(&self.opacity) {
            return Err(DirectiveError::OpacityOutOfRange {
                label: self.label.clone(),
                opacity: self.opacity,
            });
        }
        if self.line_width.is_nan() || self.line_width <= 0.0 {
            return Err(DirectiveError::NonPositiveWidth {
                label: self.label.clone(),
                width: self.line_width,
            });
        }
        Ok(())
    }
}
