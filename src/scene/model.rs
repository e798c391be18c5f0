use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Deserializer};

use crate::filters::model::FilterChain;
use crate::foundation::core::{Affine, Color, PixelSize, Point, Rect, Vec2};
use crate::foundation::error::{RenderError, RenderResult};
use crate::render::bitmap::Bitmap;

/// Stable identity the upstream engine assigns to a node.
///
/// [`NodeId::UNASSIGNED`] marks a node decoded without an id; [`Scene::assign_node_ids`]
/// replaces it with a fresh one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Placeholder of a node without an id.
    pub const UNASSIGNED: NodeId = NodeId(0);
}

/// One layer's drawing tree plus the named paints it may reference.
///
/// Decoding checks node identity: every node ends up with an id that is unique within the
/// scene, and a scene naming the same id twice is rejected.
#[derive(Clone, Debug, Deserialize)]
#[serde(try_from = "SceneDoc")]
pub struct Scene {
    /// Logical width of the layer.
    pub width: f64,
    /// Logical height of the layer.
    pub height: f64,
    /// Named paint resources, referenced as `@Name`.
    #[serde(default)]
    pub resources: Resources,
    /// Root of the node tree.
    pub root: SceneNode,
}

#[derive(Deserialize)]
struct SceneDoc {
    width: f64,
    height: f64,
    #[serde(default)]
    resources: Resources,
    root: SceneNode,
}

impl TryFrom<SceneDoc> for Scene {
    type Error = RenderError;

    fn try_from(doc: SceneDoc) -> Result<Self, Self::Error> {
        let mut scene = Scene {
            width: doc.width,
            height: doc.height,
            resources: doc.resources,
            root: doc.root,
        };
        scene.assign_node_ids()?;
        Ok(scene)
    }
}

impl Scene {
    /// Give every unassigned node a fresh id and reject ids used by more than one node.
    ///
    /// Covers the tree under `root` and the content of pattern paints, both inline and named.
    /// Fresh ids count up from the largest id already present.
    pub fn assign_node_ids(&mut self) -> RenderResult<()> {
        let mut seen = HashSet::new();
        let mut duplicate = None;
        self.visit_nodes_mut(&mut |node| {
            if node.id != NodeId::UNASSIGNED && !seen.insert(node.id) {
                duplicate.get_or_insert(node.id);
            }
        });
        if let Some(id) = duplicate {
            return Err(RenderError::validation(format!(
                "node id {} is used by more than one node",
                id.0
            )));
        }

        let mut next = seen.iter().map(|id| id.0).max().unwrap_or(0);
        let mut exhausted = false;
        self.visit_nodes_mut(&mut |node| {
            if node.id != NodeId::UNASSIGNED {
                return;
            }
            match next.checked_add(1) {
                Some(id) => {
                    next = id;
                    node.id = NodeId(id);
                }
                None => exhausted = true,
            }
        });
        if exhausted {
            return Err(RenderError::validation("node id space exhausted"));
        }
        Ok(())
    }

    fn visit_nodes_mut(&mut self, f: &mut dyn FnMut(&mut SceneNode)) {
        visit_node_mut(&mut self.root, f);
        let mut named: Vec<_> = self.resources.0.iter_mut().collect();
        named.sort_by(|a, b| a.0.cmp(b.0));
        for (_, source) in named {
            if let PaintSource::Pattern { content, .. } = source {
                for node in content {
                    visit_node_mut(node, f);
                }
            }
        }
    }
}

fn visit_node_mut(node: &mut SceneNode, f: &mut dyn FnMut(&mut SceneNode)) {
    f(node);
    if let NodeKind::Draw { ops, .. } | NodeKind::Text { ops, .. } = &mut node.kind {
        for op in ops {
            let paint = match op {
                PathOp::Fill { paint, .. } => paint,
                PathOp::Stroke(stroke) => &mut stroke.paint,
            };
            if let PaintSource::Pattern { content, .. } = &mut paint.source {
                for inner in content {
                    visit_node_mut(inner, f);
                }
            }
        }
    }
    for child in &mut node.children {
        visit_node_mut(child, f);
    }
}

/// A node of the retained drawing tree.
///
/// Read-only during a draw pass. The tree is replaced wholesale when the upstream engine
/// re-lays the layer out.
#[derive(Clone, Debug, Deserialize)]
pub struct SceneNode {
    /// Node identity. Keys per-node filter state; [`NodeId::UNASSIGNED`] when absent.
    #[serde(default)]
    pub id: NodeId,
    /// Invisible nodes and their whole subtree are skipped before any side effect.
    #[serde(default = "default_true")]
    pub visible: bool,
    /// Node variant and its payload.
    #[serde(flatten)]
    pub kind: NodeKind,
    /// Child nodes, drawn depth-first after the node's own content.
    #[serde(default)]
    pub children: Vec<SceneNode>,
}

fn default_true() -> bool {
    true
}

fn default_one() -> f32 {
    1.0
}

impl SceneNode {
    /// Visible node without children.
    pub fn new(id: u64, kind: NodeKind) -> Self {
        Self {
            id: NodeId(id),
            visible: true,
            kind,
            children: Vec::new(),
        }
    }

    /// Plain container node.
    pub fn group(id: u64, children: Vec<SceneNode>) -> Self {
        Self::new(id, NodeKind::Group).with_children(children)
    }

    /// Replace the children.
    pub fn with_children(mut self, children: Vec<SceneNode>) -> Self {
        self.children = children;
        self
    }

    /// Mark the node invisible.
    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }
}

/// Node variants. Unrecognized tags decode as [`NodeKind::Unknown`] and behave as containers.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type")]
pub enum NodeKind {
    /// Container without own drawing.
    Group,
    /// A path drawn by an ordered list of fill/stroke operations.
    Draw {
        /// Geometry shared by every operation.
        path: PathDesc,
        /// Operations in draw order.
        #[serde(default)]
        ops: Vec<PathOp>,
    },
    /// Multiplies the cumulative opacity of the subtree.
    Opacity {
        /// Multiplier in `0..=1`.
        opacity: f32,
    },
    /// Concatenates a matrix for the subtree.
    Transform {
        /// Local matrix.
        transform: Affine,
    },
    /// Intersects the clip with a path for the subtree.
    Clip {
        /// Clip geometry.
        path: PathDesc,
    },
    /// Blurred drop shadow of the subtree, drawn behind it.
    Shadow {
        /// Blur radius in logical units. Negative disables the shadow.
        radius: f64,
        /// Offset of the shadow in logical units.
        #[serde(default)]
        offset: Vec2,
        /// Shadow color.
        color: Color,
    },
    /// A block of laid-out text.
    Text {
        /// Text content and layout parameters.
        text: TextBlock,
        /// Fill and stroke operations applied to the glyphs.
        #[serde(default)]
        ops: Vec<PathOp>,
    },
    /// Source bitmaps drawn into a target rectangle, optionally through a filter chain.
    Image {
        /// Source bitmaps, in filter-chain input order.
        #[serde(default, deserialize_with = "bitmaps_from_desc")]
        sources: Vec<Bitmap>,
        /// Filter chain applied to the sources.
        #[serde(default)]
        filters: Option<Arc<FilterChain>>,
        /// Region of the sources to use, in source pixels. Whole source when absent.
        #[serde(default)]
        source_rect: Option<Rect>,
        /// Destination rectangle in local coordinates.
        target: Rect,
    },
    /// Unrecognized node tag.
    #[serde(other)]
    Unknown,
}

/// Abstract geometry handed over by the upstream engine.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type")]
pub enum PathDesc {
    /// Opcode string (`M`, `L`, `Q`, `C`, `Z`) with a flat coordinate buffer.
    General {
        /// One character per command.
        ops: String,
        /// Coordinates consumed by the commands in order.
        #[serde(default)]
        points: Vec<f32>,
    },
    /// Axis-aligned rectangle.
    Rect {
        /// Bounds.
        rect: Rect,
    },
    /// Rectangle with per-corner radii (top-left, top-right, bottom-right, bottom-left).
    RRect {
        /// Bounds.
        rect: Rect,
        /// Corner radii.
        radii: [f64; 4],
    },
    /// Rounded outer boundary and an inset inner boundary forming a ring.
    Frame {
        /// Outer bounds.
        rect: Rect,
        /// Outer corner radii.
        radii: [f64; 4],
        /// Border width between the two contours.
        inset: f64,
    },
}

/// A fill or stroke directive for a path.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type")]
pub enum PathOp {
    /// Fill the path interior.
    Fill {
        /// Paint source and opacity.
        paint: Paint,
        /// Winding rule.
        #[serde(default)]
        fill_rule: FillRule,
    },
    /// Stroke the path outline.
    Stroke(StrokeOp),
}

/// Stroke decoration of a [`PathOp::Stroke`].
#[derive(Clone, Debug, Deserialize)]
pub struct StrokeOp {
    /// Paint source and opacity.
    pub paint: Paint,
    /// Stroke width in logical units.
    #[serde(default = "default_stroke_width")]
    pub width: f64,
    /// Miter limit ratio.
    #[serde(default = "default_miter_limit")]
    pub miter_limit: f64,
    /// Line cap.
    #[serde(default)]
    pub cap: LineCap,
    /// Line join.
    #[serde(default)]
    pub join: LineJoin,
    /// Dash pattern in logical units. Empty means solid.
    #[serde(default)]
    pub dash_array: Vec<f64>,
    /// Dash phase in logical units.
    #[serde(default)]
    pub dash_offset: f64,
    /// Declared logical length of the path. Zero disables dash rescaling.
    #[serde(default)]
    pub path_length: f64,
}

fn default_stroke_width() -> f64 {
    1.0
}

fn default_miter_limit() -> f64 {
    4.0
}

impl StrokeOp {
    /// Solid stroke of `width` with default decoration.
    pub fn new(paint: Paint, width: f64) -> Self {
        Self {
            paint,
            width,
            miter_limit: default_miter_limit(),
            cap: LineCap::default(),
            join: LineJoin::default(),
            dash_array: Vec::new(),
            dash_offset: 0.0,
            path_length: 0.0,
        }
    }
}

/// Fill rule. Encoded upstream as an integer: `0` is even-odd, anything else is non-zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "i64")]
pub enum FillRule {
    /// Even-odd rule.
    EvenOdd,
    /// Non-zero winding rule.
    #[default]
    NonZero,
}

impl From<i64> for FillRule {
    fn from(v: i64) -> Self {
        if v == 0 { Self::EvenOdd } else { Self::NonZero }
    }
}

/// Stroke cap.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineCap {
    /// Flat, ending at the endpoint.
    #[default]
    Butt,
    /// Flat, extended by half the width.
    Square,
    /// Semicircular.
    Round,
    /// Unrecognized value.
    #[serde(other)]
    Unknown,
}

/// Stroke join.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineJoin {
    /// Cut corner.
    #[default]
    Bevel,
    /// Sharp corner up to the miter limit.
    Miter,
    /// Rounded corner.
    Round,
    /// Unrecognized value.
    #[serde(other)]
    Unknown,
}

/// Gradient spread outside the `0..1` stop range.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Spread {
    /// Extend the edge colors.
    #[default]
    Pad,
    /// Mirror the ramp.
    Reflect,
    /// Repeat the ramp.
    Repeat,
    /// Unrecognized value.
    #[serde(other)]
    Unknown,
}

/// Gradient color stop.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct GradientStop {
    /// Position along the ramp in `0..=1`.
    pub offset: f32,
    /// Stop color.
    pub color: Color,
}

/// Abstract paint: a source plus its own opacity.
#[derive(Clone, Debug, Deserialize)]
#[serde(try_from = "PaintRepr")]
pub struct Paint {
    /// What is painted.
    pub source: PaintSource,
    /// Paint-local opacity in `0..=1`.
    pub opacity: f32,
}

impl Paint {
    /// Opaque solid color paint.
    pub fn color(color: Color) -> Self {
        Self {
            source: PaintSource::Color { color },
            opacity: 1.0,
        }
    }

    /// Paint referring to a named resource.
    pub fn reference(name: impl Into<String>) -> Self {
        Self {
            source: PaintSource::Reference { name: name.into() },
            opacity: 1.0,
        }
    }

    /// Replace the paint-local opacity.
    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PaintRepr {
    Short(String),
    Full {
        #[serde(flatten)]
        source: PaintSource,
        #[serde(default = "default_one")]
        opacity: f32,
    },
}

impl TryFrom<PaintRepr> for Paint {
    type Error = RenderError;

    fn try_from(value: PaintRepr) -> Result<Self, Self::Error> {
        match value {
            PaintRepr::Short(s) if s.starts_with('@') => Ok(Self::reference(s)),
            PaintRepr::Short(s) => Ok(Self::color(Color::parse(&s)?)),
            PaintRepr::Full { source, opacity } => Ok(Self { source, opacity }),
        }
    }
}

/// What a paint draws with.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type")]
pub enum PaintSource {
    /// Flat color.
    Color {
        /// The color.
        color: Color,
    },
    /// Linear gradient between two points.
    LinearGradient {
        /// Ramp start.
        start: Point,
        /// Ramp end.
        end: Point,
        /// Color stops.
        stops: Vec<GradientStop>,
        /// Spread mode.
        #[serde(default)]
        spread: Spread,
        /// Control points are fractions of the painted bounds.
        #[serde(default)]
        bounding_box: bool,
        /// Local matrix applied to the shader.
        #[serde(default)]
        transform: Affine,
    },
    /// Radial gradient around a center.
    RadialGradient {
        /// Circle center.
        center: Point,
        /// Circle radius.
        radius: f64,
        /// Color stops.
        stops: Vec<GradientStop>,
        /// Spread mode.
        #[serde(default)]
        spread: Spread,
        /// Center and radius are fractions of the painted bounds.
        #[serde(default)]
        bounding_box: bool,
        /// Local matrix applied to the shader.
        #[serde(default)]
        transform: Affine,
    },
    /// Vector content rasterized once and tiled.
    Pattern {
        /// Tile width in logical units.
        width: f64,
        /// Tile height in logical units.
        height: f64,
        /// Tile content.
        #[serde(default)]
        content: Vec<SceneNode>,
        /// Local matrix applied to the tiling.
        #[serde(default)]
        transform: Affine,
    },
    /// Named resource, written `@Name`.
    Reference {
        /// Resource name, with or without the leading `@`.
        name: String,
    },
}

/// Named paint sources shared by every node of a scene, including pattern content.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct Resources(HashMap<String, PaintSource>);

impl Resources {
    /// Upper bound on reference chains followed before giving up.
    pub const MAX_REFERENCE_DEPTH: usize = 16;

    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named source. A leading `@` in `name` is ignored.
    pub fn insert(&mut self, name: impl AsRef<str>, source: PaintSource) {
        self.0.insert(strip_at(name.as_ref()).to_owned(), source);
    }

    /// Builder form of [`Resources::insert`].
    pub fn with(mut self, name: impl AsRef<str>, source: PaintSource) -> Self {
        self.insert(name, source);
        self
    }

    /// Look up a resource by name.
    pub fn get(&self, name: &str) -> Option<&PaintSource> {
        self.0.get(strip_at(name))
    }

    /// Follow references until a concrete source is reached.
    ///
    /// Returns `None` for unknown names and for chains deeper than
    /// [`Resources::MAX_REFERENCE_DEPTH`] (which covers cycles).
    pub fn resolve<'a>(&'a self, source: &'a PaintSource) -> Option<&'a PaintSource> {
        let mut cur = source;
        for _ in 0..=Self::MAX_REFERENCE_DEPTH {
            match cur {
                PaintSource::Reference { name } => match self.get(name) {
                    Some(next) => cur = next,
                    None => {
                        tracing::warn!(resource = %name, "unknown paint resource");
                        return None;
                    }
                },
                concrete => return Some(concrete),
            }
        }
        tracing::warn!("paint resource chain too deep or cyclic");
        None
    }
}

fn strip_at(name: &str) -> &str {
    name.strip_prefix('@').unwrap_or(name)
}

/// Text content and the parameters it is laid out with.
#[derive(Clone, Debug, Deserialize)]
pub struct TextBlock {
    /// Text to shape.
    pub content: String,
    /// Anchor x in logical units.
    #[serde(default)]
    pub x: f64,
    /// Baseline y of the first line in logical units.
    #[serde(default)]
    pub y: f64,
    /// Font size in logical units.
    #[serde(default = "default_font_size")]
    pub font_size: f32,
    /// Wrapping width. Unbounded when absent.
    #[serde(default)]
    pub width: Option<f32>,
    /// Allotted box height. Overflowing text is truncated when the block is not line-limited.
    #[serde(default)]
    pub height: Option<f32>,
    /// Explicit line limit.
    #[serde(default)]
    pub max_lines: Option<u32>,
    /// Horizontal anchoring of the laid-out block relative to `x`.
    #[serde(default)]
    pub anchor: TextAnchor,
    /// Layout direction the anchor resolves against.
    #[serde(default)]
    pub direction: LayoutDirection,
}

fn default_font_size() -> f32 {
    16.0
}

impl TextBlock {
    /// Single-run block anchored at `(x, y)` with default metrics.
    pub fn new(content: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            content: content.into(),
            x,
            y,
            font_size: default_font_size(),
            width: None,
            height: None,
            max_lines: None,
            anchor: TextAnchor::default(),
            direction: LayoutDirection::default(),
        }
    }
}

/// Text anchor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAnchor {
    /// Leading edge at the anchor point.
    #[default]
    Start,
    /// Centered on the anchor point.
    Middle,
    /// Trailing edge at the anchor point.
    End,
}

/// Layout direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutDirection {
    /// Left to right.
    #[default]
    Ltr,
    /// Right to left.
    Rtl,
}

/// Serialized form of a source bitmap.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type")]
pub enum BitmapDesc {
    /// Solid color raster.
    Solid {
        /// Width in pixels.
        width: u32,
        /// Height in pixels.
        height: u32,
        /// Fill color.
        color: Color,
    },
    /// Image file decoded with the `image` crate.
    File {
        /// Path on disk.
        path: String,
    },
}

impl TryFrom<BitmapDesc> for Bitmap {
    type Error = RenderError;

    fn try_from(desc: BitmapDesc) -> Result<Self, Self::Error> {
        match desc {
            BitmapDesc::Solid {
                width,
                height,
                color,
            } => Bitmap::filled(PixelSize::new(width, height), color),
            BitmapDesc::File { path } => {
                let img = image::open(&path)
                    .map_err(|e| RenderError::validation(format!("decode '{path}': {e}")))?
                    .to_rgba8();
                let size = PixelSize::new(img.width(), img.height());
                let mut px = img.into_raw();
                for chunk in px.chunks_exact_mut(4) {
                    let [r, g, b, a] = [chunk[0], chunk[1], chunk[2], chunk[3]];
                    chunk.copy_from_slice(&Color::from_rgba8(r, g, b, a).to_premul());
                }
                Bitmap::from_premul(size, px)
            }
        }
    }
}

fn bitmaps_from_desc<'de, D>(deserializer: D) -> Result<Vec<Bitmap>, D::Error>
where
    D: Deserializer<'de>,
{
    let descs = Vec::<BitmapDesc>::deserialize(deserializer)?;
    descs
        .into_iter()
        .map(|d| Bitmap::try_from(d).map_err(serde::de::Error::custom))
        .collect()
}

#[cfg(test)]
#[path = "../../tests/unit/scene/model.rs"]
mod tests;
