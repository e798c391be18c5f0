use std::sync::atomic::{AtomicU64, Ordering};

use serde::Deserialize;

use crate::foundation::core::{Color, Point};
use crate::scene::model::{GradientStop, Spread};

/// Identity of one filter chain instance.
///
/// Chains built with [`FilterChain::new`] or decoded without an explicit id get a fresh,
/// process-unique id, so replacing a chain always changes its identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub u64);

impl ChainId {
    /// Allocate a fresh id, disjoint from small explicit ids.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1 << 32);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Ordered filter stages applied to a list of source bitmaps.
#[derive(Clone, Debug, Deserialize)]
pub struct FilterChain {
    /// Chain identity, part of every cache key derived from it.
    #[serde(default = "ChainId::next")]
    pub id: ChainId,
    /// Stages in submission order.
    #[serde(default)]
    pub filters: Vec<FilterDesc>,
}

impl FilterChain {
    /// Chain with a fresh identity.
    pub fn new(filters: Vec<FilterDesc>) -> Self {
        Self {
            id: ChainId::next(),
            filters,
        }
    }

    /// Same stages under an explicit identity.
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = ChainId(id);
        self
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// `true` when the chain has no stages.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

/// One stage of a chain.
///
/// Indices address the results list, which starts with the chain's source bitmaps followed by
/// the output of every earlier stage. Non-negative indices are absolute; negative ones count
/// back from the newest result (`-1` is the newest).
#[derive(Clone, Debug, Deserialize)]
pub struct FilterDesc {
    /// Operation and its parameters.
    #[serde(flatten)]
    pub kind: FilterKind,
    /// Source index. Defaults to `-1`.
    #[serde(default)]
    pub source: Option<i32>,
    /// Destination index. Blend defaults to `-2`; other filters take none unless given.
    #[serde(default)]
    pub destination: Option<i32>,
}

impl FilterDesc {
    /// Stage with default indices.
    pub fn new(kind: FilterKind) -> Self {
        Self {
            kind,
            source: None,
            destination: None,
        }
    }

    /// Override the source index.
    pub fn with_source(mut self, idx: i32) -> Self {
        self.source = Some(idx);
        self
    }

    /// Override the destination index.
    pub fn with_destination(mut self, idx: i32) -> Self {
        self.destination = Some(idx);
        self
    }

    /// Source index this stage reads, if it reads one.
    pub fn source_index(&self) -> Option<i32> {
        match self.kind {
            FilterKind::Color { .. } | FilterKind::Gradient { .. } => None,
            _ => Some(self.source.unwrap_or(-1)),
        }
    }

    /// Destination index this stage reads, if it reads one.
    pub fn destination_index(&self) -> Option<i32> {
        match self.kind {
            FilterKind::Blend { .. } => Some(self.destination.unwrap_or(-2)),
            FilterKind::Extension { .. } => self.destination,
            _ => None,
        }
    }
}

/// Filter operations.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type")]
pub enum FilterKind {
    /// Flat color result. Takes no inputs.
    Color {
        /// The color.
        color: Color,
    },
    /// Source composited over destination with a blend mode.
    Blend {
        /// Blend mode.
        #[serde(default)]
        mode: BlendMode,
    },
    /// Gaussian blur of the source.
    Blur {
        /// Radius in pixels, clamped to `0..=25`.
        radius: f32,
    },
    /// Desaturation towards luminance.
    Grayscale {
        /// Effect strength in `0..=1`.
        #[serde(default = "default_amount")]
        amount: f32,
    },
    /// Saturation adjustment; `1` is identity and `0` fully gray.
    Saturate {
        /// Saturation in `0..=1`.
        #[serde(default = "default_amount")]
        amount: f32,
    },
    /// Deterministic pixel noise.
    Noise {
        /// Distribution.
        #[serde(default)]
        kind: NoiseKind,
        /// Noise strength in 8-bit channel units.
        #[serde(default = "default_sigma")]
        sigma: f32,
        /// Independent noise per channel instead of one luminance offset.
        #[serde(default)]
        use_color: bool,
    },
    /// Lazily materialized gradient result. Takes no inputs.
    Gradient {
        /// Gradient geometry in fractions of the materialized size.
        gradient: GradientDesc,
    },
    /// Filter implemented by a registered extension.
    Extension {
        /// Extension URI.
        uri: String,
        /// Filter name within the extension.
        name: String,
        /// Opaque parameters handed to the extension.
        #[serde(default)]
        params: serde_json::Value,
    },
    /// Unrecognized filter; passes its source through.
    #[serde(other)]
    Unknown,
}

fn default_amount() -> f32 {
    1.0
}

fn default_sigma() -> f32 {
    10.0
}

impl FilterKind {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Color { .. } => "color",
            Self::Blend { .. } => "blend",
            Self::Blur { .. } => "blur",
            Self::Grayscale { .. } => "grayscale",
            Self::Saturate { .. } => "saturate",
            Self::Noise { .. } => "noise",
            Self::Gradient { .. } => "gradient",
            Self::Extension { .. } => "extension",
            Self::Unknown => "unknown",
        }
    }
}

/// Separable blend modes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlendMode {
    /// Source over.
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
    /// Unrecognized mode, treated as normal.
    #[serde(other)]
    Unknown,
}

/// Noise distribution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseKind {
    /// `(2u - 1) * sigma` with `u` uniform in `[0, 1)`.
    #[default]
    Uniform,
    /// Standard normal scaled by sigma.
    Gaussian,
}

/// Gradient produced by a [`FilterKind::Gradient`] stage.
///
/// Geometry is expressed in fractions of the raster it is materialized into; the radius is a
/// fraction of the larger side.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type")]
pub enum GradientDesc {
    /// Linear ramp.
    Linear {
        /// Ramp start.
        start: Point,
        /// Ramp end.
        end: Point,
        /// Color stops.
        stops: Vec<GradientStop>,
        /// Spread mode.
        #[serde(default)]
        spread: Spread,
    },
    /// Radial ramp.
    Radial {
        /// Center.
        center: Point,
        /// Radius.
        radius: f64,
        /// Color stops.
        stops: Vec<GradientStop>,
        /// Spread mode.
        #[serde(default)]
        spread: Spread,
    },
}

#[cfg(test)]
#[path = "../../tests/unit/filters/model.rs"]
mod tests;
