//! In-memory ontology tree.
//!
//! A [`Node`] keeps the fields the pipeline reasons about in typed slots
//! (`group_size`, `matched_size`, `occurrence_fraction`, `matches`,
//! `pie_data`) and everything else, including columns copied from the data
//! table, in an ordered extension map that is flattened back into the node on
//! serialization. Generic [`Node::get`] / [`Node::set`] accessors dispatch on
//! the field name so that configurable keys work against both kinds of field.
//!
//! Traversal comes in two flavours: pre-order walks run on an explicit stack,
//! post-order walks recurse because every caller needs finalized children
//! before touching the parent. Recursive paths (post-order walks and the
//! `children` (de)serializers) grow the stack on demand, and dropping a tree
//! is iterative, so arbitrarily deep ontologies are handled.

use std::{
    borrow::Cow,
    fmt,
    fs::File,
    io::{BufReader, BufWriter, Write},
    ops::Add,
    path::Path,
};

use anyhow::Context;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::{
    error::{AnnotateError, Result},
    io_utils,
};

pub const NAME_FIELD: &str = "name";
pub const CHILDREN_FIELD: &str = "children";
pub const GROUP_SIZE_FIELD: &str = "group_size";
pub const MATCHED_SIZE_FIELD: &str = "matched_size";
pub const OCCURRENCE_FRACTION_FIELD: &str = "occurrence_fraction";
pub const MATCHES_FIELD: &str = "matches";
pub const PIE_DATA_FIELD: &str = "pie_data";
pub const INDEX_FIELD: &str = "index";

/// Label used in diagnostics for nodes without a `name`.
pub const UNNAMED_NODE: &str = "NONAME";

/// Remaining stack below which recursion switches to a fresh segment.
const RED_ZONE: usize = 128 * 1024;
/// Size of each additional stack segment.
const STACK_SEGMENT: usize = 2 * 1024 * 1024;

/// Numeric population count that keeps integers integral through addition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Measure {
    Integer(i64),
    Float(f64),
}

impl Measure {
    pub const ZERO: Measure = Measure::Integer(0);

    pub fn from_json(value: &Value) -> Option<Self> {
        let number = value.as_number()?;
        match number.as_i64() {
            Some(int) => Some(Measure::Integer(int)),
            None => number.as_f64().map(Measure::Float),
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            Measure::Integer(value) => *value as f64,
            Measure::Float(value) => *value,
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Measure::Integer(value) => *value == 0,
            Measure::Float(value) => *value == 0.0,
        }
    }

    /// Ratio of `self` over `total`, or 0 when `total` is zero.
    pub fn fraction_of(&self, total: Measure) -> f64 {
        if total.is_zero() {
            0.0
        } else {
            self.as_f64() / total.as_f64()
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Measure::Integer(value) => Value::from(*value),
            Measure::Float(value) => Value::from(*value),
        }
    }
}

impl Default for Measure {
    fn default() -> Self {
        Measure::ZERO
    }
}

impl Add for Measure {
    type Output = Measure;

    fn add(self, rhs: Measure) -> Measure {
        match (self, rhs) {
            (Measure::Integer(a), Measure::Integer(b)) => a
                .checked_add(b)
                .map(Measure::Integer)
                .unwrap_or(Measure::Float(a as f64 + b as f64)),
            (a, b) => Measure::Float(a.as_f64() + b.as_f64()),
        }
    }
}

impl std::iter::Sum for Measure {
    fn sum<I: Iterator<Item = Measure>>(iter: I) -> Self {
        iter.fold(Measure::ZERO, Add::add)
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Measure::Integer(value) => write!(f, "{value}"),
            Measure::Float(value) => write!(f, "{value}"),
        }
    }
}

/// One wedge of a node's two-entry pie chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PieSlice {
    pub occurrence_fraction: f64,
    pub index: u8,
    pub group_size: Measure,
    pub matched_size: Measure,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PieSlice {
    pub fn set(&mut self, field: &str, value: Value) -> Result<()> {
        let label = format!("pie_data[{}]", self.index);
        match field {
            OCCURRENCE_FRACTION_FIELD => {
                self.occurrence_fraction = value.as_f64().ok_or_else(|| {
                    AnnotateError::InvalidField {
                        node: label,
                        field: field.to_string(),
                        expected: "a number",
                        value: value.clone(),
                    }
                })?;
            }
            INDEX_FIELD => {
                self.index = value
                    .as_u64()
                    .and_then(|idx| u8::try_from(idx).ok())
                    .ok_or_else(|| AnnotateError::InvalidField {
                        node: label,
                        field: field.to_string(),
                        expected: "a small unsigned integer",
                        value: value.clone(),
                    })?;
            }
            GROUP_SIZE_FIELD | MATCHED_SIZE_FIELD => {
                let measure =
                    Measure::from_json(&value).ok_or_else(|| AnnotateError::InvalidMeasure {
                        node: label,
                        field: field.to_string(),
                        value: value.clone(),
                    })?;
                if field == GROUP_SIZE_FIELD {
                    self.group_size = measure;
                } else {
                    self.matched_size = measure;
                }
            }
            _ => {
                self.extra.insert(field.to_string(), value);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Any JSON value; only its text form is used for labels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_size: Option<Measure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_size: Option<Measure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurrence_fraction: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matches: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pie_data: Option<Vec<PieSlice>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_children",
        deserialize_with = "deserialize_children"
    )]
    pub children: Option<Vec<Node>>,
}

fn serialize_children<S>(
    children: &Option<Vec<Node>>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    stacker::maybe_grow(RED_ZONE, STACK_SEGMENT, || children.serialize(serializer))
}

fn deserialize_children<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<Node>>, D::Error>
where
    D: Deserializer<'de>,
{
    stacker::maybe_grow(RED_ZONE, STACK_SEGMENT, || {
        Option::<Vec<Node>>::deserialize(deserializer)
    })
}

impl Drop for Node {
    fn drop(&mut self) {
        let mut pending = self.children.take().unwrap_or_default();
        while let Some(mut node) = pending.pop() {
            if let Some(children) = node.children.take() {
                pending.extend(children);
            }
        }
    }
}

impl Node {
    pub fn named(name: impl Into<String>) -> Self {
        let mut node = Node::default();
        node.name = Some(Value::String(name.into()));
        node
    }

    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = Some(children);
        self
    }

    /// Display label for diagnostics.
    pub fn label(&self) -> Cow<'_, str> {
        match &self.name {
            None | Some(Value::Null) => Cow::Borrowed(UNNAMED_NODE),
            Some(Value::String(text)) => Cow::Borrowed(text),
            Some(other) => Cow::Owned(other.to_string()),
        }
    }

    pub fn children(&self) -> &[Node] {
        self.children.as_deref().unwrap_or_default()
    }

    /// Returns the value stored under `field`, typed slots included.
    ///
    /// `children` is never exposed through this accessor.
    pub fn get(&self, field: &str) -> Option<Value> {
        match field {
            NAME_FIELD => self.name.clone(),
            GROUP_SIZE_FIELD => self.group_size.map(|m| m.to_json()),
            MATCHED_SIZE_FIELD => self.matched_size.map(|m| m.to_json()),
            OCCURRENCE_FRACTION_FIELD => self.occurrence_fraction.map(Value::from),
            MATCHES_FIELD => self.matches.clone(),
            PIE_DATA_FIELD => self
                .pie_data
                .as_ref()
                .and_then(|slices| serde_json::to_value(slices).ok()),
            CHILDREN_FIELD => None,
            other => self.extra.get(other).cloned(),
        }
    }

    /// True when `field` is present and not null.
    pub fn has(&self, field: &str) -> bool {
        self.get(field).is_some_and(|value| !value.is_null())
    }

    /// Stores `value` under `field`. A null value clears typed slots.
    pub fn set(&mut self, field: &str, value: Value) -> Result<()> {
        match field {
            NAME_FIELD => {
                self.name = (!value.is_null()).then_some(value);
            }
            GROUP_SIZE_FIELD | MATCHED_SIZE_FIELD => {
                let measure = if value.is_null() {
                    None
                } else {
                    Some(Measure::from_json(&value).ok_or_else(|| {
                        AnnotateError::InvalidMeasure {
                            node: self.label().to_string(),
                            field: field.to_string(),
                            value: value.clone(),
                        }
                    })?)
                };
                if field == GROUP_SIZE_FIELD {
                    self.group_size = measure;
                } else {
                    self.matched_size = measure;
                }
            }
            OCCURRENCE_FRACTION_FIELD => {
                self.occurrence_fraction = if value.is_null() {
                    None
                } else {
                    Some(value.as_f64().ok_or_else(|| AnnotateError::InvalidField {
                        node: self.label().to_string(),
                        field: field.to_string(),
                        expected: "a number",
                        value: value.clone(),
                    })?)
                };
            }
            MATCHES_FIELD => {
                self.matches = (!value.is_null()).then_some(value);
            }
            PIE_DATA_FIELD => {
                self.pie_data = if value.is_null() {
                    None
                } else {
                    Some(serde_json::from_value(value.clone()).map_err(|_| {
                        AnnotateError::InvalidField {
                            node: self.label().to_string(),
                            field: field.to_string(),
                            expected: "a pie_data array",
                            value,
                        }
                    })?)
                };
            }
            CHILDREN_FIELD => return Err(AnnotateError::ReservedField(field.to_string())),
            other => {
                self.extra.insert(other.to_string(), value);
            }
        }
        Ok(())
    }

    pub fn measure(&self, field: &str) -> Option<Measure> {
        match field {
            GROUP_SIZE_FIELD => self.group_size,
            MATCHED_SIZE_FIELD => self.matched_size,
            other => self.extra.get(other).and_then(Measure::from_json),
        }
    }

    /// Like [`Node::measure`] but fails when the value is absent or not numeric.
    pub fn require_measure(&self, field: &str) -> Result<Measure> {
        match field {
            GROUP_SIZE_FIELD | MATCHED_SIZE_FIELD => {
                self.measure(field)
                    .ok_or_else(|| AnnotateError::MissingMeasure {
                        node: self.label().to_string(),
                        field: field.to_string(),
                    })
            }
            other => match self.extra.get(other) {
                None | Some(Value::Null) => Err(AnnotateError::MissingMeasure {
                    node: self.label().to_string(),
                    field: other.to_string(),
                }),
                Some(value) => {
                    Measure::from_json(value).ok_or_else(|| AnnotateError::InvalidMeasure {
                        node: self.label().to_string(),
                        field: other.to_string(),
                        value: value.clone(),
                    })
                }
            },
        }
    }

    pub fn set_measure(&mut self, field: &str, measure: Measure) -> Result<()> {
        match field {
            GROUP_SIZE_FIELD => self.group_size = Some(measure),
            MATCHED_SIZE_FIELD => self.matched_size = Some(measure),
            other => self.set(other, measure.to_json())?,
        }
        Ok(())
    }

    pub fn node_count(&self) -> usize {
        let mut count = 0usize;
        self.walk_pre_order(|_| count += 1);
        count
    }

    /// Depth-first pre-order walk, children in input order.
    pub fn walk_pre_order<'a>(&'a self, mut visit: impl FnMut(&'a Node)) {
        let mut stack: Vec<&'a Node> = vec![self];
        while let Some(node) = stack.pop() {
            visit(node);
            stack.extend(node.children().iter().rev());
        }
    }

    pub fn walk_pre_order_mut(&mut self, mut visit: impl FnMut(&mut Node)) {
        let _ = self.try_walk_pre_order_mut(|node| {
            visit(node);
            Ok::<(), std::convert::Infallible>(())
        });
    }

    /// Pre-order walk that stops at the first error returned by `visit`.
    pub fn try_walk_pre_order_mut<E>(
        &mut self,
        mut visit: impl FnMut(&mut Node) -> std::result::Result<(), E>,
    ) -> std::result::Result<(), E> {
        let mut stack: Vec<&mut Node> = vec![self];
        while let Some(node) = stack.pop() {
            visit(node)?;
            if let Some(children) = node.children.as_mut() {
                stack.extend(children.iter_mut().rev());
            }
        }
        Ok(())
    }

    /// Post-order walk: every child subtree is finished before its parent.
    pub fn try_walk_post_order_mut<E, F>(&mut self, visit: &mut F) -> std::result::Result<(), E>
    where
        F: FnMut(&mut Node) -> std::result::Result<(), E>,
    {
        stacker::maybe_grow(RED_ZONE, STACK_SEGMENT, || {
            if let Some(children) = self.children.as_mut() {
                for child in children.iter_mut() {
                    child.try_walk_post_order_mut(visit)?;
                }
            }
            visit(self)
        })
    }

    /// Reads a JSON ontology of any nesting depth.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening ontology file {path:?}"))?;
        let mut deserializer = serde_json::Deserializer::from_reader(BufReader::new(file));
        deserializer.disable_recursion_limit();
        let node = Node::deserialize(&mut deserializer)
            .with_context(|| format!("Parsing ontology JSON {path:?}"))?;
        deserializer
            .end()
            .with_context(|| format!("Trailing data after ontology JSON {path:?}"))?;
        Ok(node)
    }

    /// Writes the tree as one JSON document to `path`, or stdout for `None`/`-`.
    pub fn save(&self, path: Option<&Path>, pretty: bool) -> anyhow::Result<()> {
        let mut writer: Box<dyn Write> = match path {
            Some(p) if !io_utils::is_dash(p) => Box::new(BufWriter::new(
                File::create(p).with_context(|| format!("Creating output file {p:?}"))?,
            )),
            _ => Box::new(std::io::stdout()),
        };
        if pretty {
            serde_json::to_writer_pretty(&mut writer, self).context("Writing ontology JSON")?;
        } else {
            serde_json::to_writer(&mut writer, self).context("Writing ontology JSON")?;
        }
        writeln!(writer).context("Writing ontology JSON")?;
        writer.flush().context("Flushing ontology JSON")
    }
}
