//! Task descriptions and the JSON payload submitted to `POST /task`.
//!
//! The payload is built as a typed object graph and serialized with serde, so
//! user-supplied strings (task names, point ids, categories) are always escaped.

use serde::Serialize;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Kind of extraction task. Serialized as the `task_type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    /// Polygon selection, delivered as raster tiles.
    Area,
    /// Point selection, delivered as a table.
    Point,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Area => "area",
            TaskType::Point => "point",
        }
    }
}

impl FromStr for TaskType {
    type Err = Error;

    /// Accepts the user-facing flags `polygon` and `point`, case-insensitively.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "polygon" => Ok(TaskType::Area),
            "point" => Ok(TaskType::Point),
            other => Err(Error::InvalidRequest(format!(
                "unknown task type [{}], expected `polygon` or `point`",
                other
            ))),
        }
    }
}

/// Polygon vertex in GeoJSON axis order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub longitude: f64,
    pub latitude: f64,
}

impl Coordinate {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }
}

/// Sample location of a point task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Point {
    pub latitude: f64,
    pub longitude: f64,
    pub id: String,
    pub category: String,
}

impl Point {
    pub fn new(
        latitude: f64,
        longitude: f64,
        id: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            latitude,
            longitude,
            id: id.into(),
            category: category.into(),
        }
    }
}

/// Spatial selection of a task.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    /// Ring of vertices. The caller closes the ring; it is sent as given.
    Polygon(Vec<Coordinate>),
    Points(Vec<Point>),
}

impl Geometry {
    pub fn task_type(&self) -> TaskType {
        match self {
            Geometry::Polygon(_) => TaskType::Area,
            Geometry::Points(_) => TaskType::Point,
        }
    }
}

/// Output settings for area tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AreaOutput {
    /// `geotiff` or `netcdf4`.
    pub format: String,
    pub projection: String,
}

impl Default for AreaOutput {
    fn default() -> Self {
        Self {
            format: "geotiff".to_string(),
            projection: "albers_weld_conus".to_string(),
        }
    }
}

/// Everything needed to submit one extraction task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDescriptor {
    pub task_name: String,
    /// Product identifier in `name.version` form, e.g. `MOD11A1.061`.
    pub product: String,
    /// Layers of `product`, in request order.
    pub layers: Vec<String>,
    /// `MM-DD-YYYY`, or `MM-DD` for recurring ranges. Passed through unparsed.
    pub start_date: String,
    pub end_date: String,
    /// Repeat the start/end window every year of this inclusive range.
    pub recurring_years: Option<(i32, i32)>,
    pub geometry: Geometry,
    /// Only used by area tasks.
    pub output: AreaOutput,
}

impl TaskDescriptor {
    pub fn new(
        task_name: impl Into<String>,
        product: impl Into<String>,
        layers: impl IntoIterator<Item = impl Into<String>>,
        start_date: impl Into<String>,
        end_date: impl Into<String>,
        geometry: Geometry,
    ) -> Self {
        Self {
            task_name: task_name.into(),
            product: product.into(),
            layers: layers.into_iter().map(Into::into).collect(),
            start_date: start_date.into(),
            end_date: end_date.into(),
            recurring_years: None,
            geometry,
            output: AreaOutput::default(),
        }
    }

    pub fn with_recurring_years(mut self, from: i32, to: i32) -> Self {
        self.recurring_years = Some((from, to));
        self
    }

    pub fn with_output(mut self, output: AreaOutput) -> Self {
        self.output = output;
        self
    }

    pub fn task_type(&self) -> TaskType {
        self.geometry.task_type()
    }

    /// Builds the submission payload, taking the task type from the geometry.
    pub fn to_request(&self) -> Result<TaskRequest> {
        build_task_request(self, self.task_type())
    }
}

/// Serializable body of `POST /task`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRequest {
    task_type: TaskType,
    task_name: String,
    params: TaskParams,
}

impl TaskRequest {
    pub fn task_type(&self) -> TaskType {
        self.task_type
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct TaskParams {
    dates: Vec<DateRange>,
    layers: Vec<LayerSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<OutputSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    geo: Option<FeatureCollection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    coordinates: Option<Vec<Point>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct DateRange {
    start_date: String,
    end_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    recurring: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    year_range: Option<[i32; 2]>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct LayerSpec {
    product: String,
    layer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct OutputSpec {
    format: FormatSpec,
    projection: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct FormatSpec {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct FeatureCollection {
    #[serde(rename = "type")]
    kind: &'static str,
    features: Vec<Feature>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct Feature {
    #[serde(rename = "type")]
    kind: &'static str,
    properties: serde_json::Map<String, serde_json::Value>,
    geometry: PolygonGeometry,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct PolygonGeometry {
    #[serde(rename = "type")]
    kind: &'static str,
    coordinates: Vec<Vec<[f64; 2]>>,
}

/// Builds the `POST /task` payload for `descriptor`.
///
/// `task_type` is the caller's explicit flag and must agree with the geometry
/// variant; a mismatch is rejected instead of producing a half-formed payload.
pub fn build_task_request(descriptor: &TaskDescriptor, task_type: TaskType) -> Result<TaskRequest> {
    validate(descriptor)?;

    if task_type != descriptor.task_type() {
        return Err(Error::InvalidRequest(format!(
            "task type `{}` does not match the {} geometry",
            task_type.as_str(),
            descriptor.task_type().as_str()
        )));
    }

    let dates = vec![DateRange {
        start_date: descriptor.start_date.clone(),
        end_date: descriptor.end_date.clone(),
        recurring: descriptor.recurring_years.map(|_| true),
        year_range: descriptor.recurring_years.map(|(from, to)| [from, to]),
    }];

    let layers = descriptor
        .layers
        .iter()
        .map(|layer| LayerSpec {
            product: descriptor.product.clone(),
            layer: layer.clone(),
        })
        .collect();

    let mut params = TaskParams {
        dates,
        layers,
        output: None,
        geo: None,
        coordinates: None,
    };

    match &descriptor.geometry {
        Geometry::Polygon(ring) => {
            params.output = Some(OutputSpec {
                format: FormatSpec {
                    kind: descriptor.output.format.clone(),
                },
                projection: descriptor.output.projection.clone(),
            });
            params.geo = Some(FeatureCollection {
                kind: "FeatureCollection",
                features: vec![Feature {
                    kind: "Feature",
                    properties: serde_json::Map::new(),
                    geometry: PolygonGeometry {
                        kind: "Polygon",
                        coordinates: vec![ring.iter().map(|c| [c.longitude, c.latitude]).collect()],
                    },
                }],
            });
        }
        Geometry::Points(points) => {
            params.coordinates = Some(points.clone());
        }
    }

    Ok(TaskRequest {
        task_type,
        task_name: descriptor.task_name.clone(),
        params,
    })
}

fn validate(descriptor: &TaskDescriptor) -> Result<()> {
    let required = [
        ("task name", &descriptor.task_name),
        ("start date", &descriptor.start_date),
        ("end date", &descriptor.end_date),
        ("product", &descriptor.product),
    ];
    for (what, value) in required {
        if value.trim().is_empty() {
            return Err(Error::InvalidRequest(format!("{} must not be empty", what)));
        }
    }

    if descriptor.layers.is_empty() {
        return Err(Error::InvalidRequest("at least one layer is required".into()));
    }
    if descriptor.layers.iter().any(|l| l.trim().is_empty()) {
        return Err(Error::InvalidRequest("layer names must not be empty".into()));
    }

    if let Some((from, to)) = descriptor.recurring_years {
        if from > to {
            return Err(Error::InvalidRequest(format!(
                "recurring year range {}..{} is reversed",
                from, to
            )));
        }
    }

    match &descriptor.geometry {
        Geometry::Polygon(ring) if ring.len() < 3 => Err(Error::InvalidRequest(format!(
            "polygon needs at least 3 vertices, got {}",
            ring.len()
        ))),
        Geometry::Points(points) if points.is_empty() => {
            Err(Error::InvalidRequest("point set must not be empty".into()))
        }
        _ => Ok(()),
    }
}
