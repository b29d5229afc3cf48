//! # Point Model
//!
//! Named, typed locations defined on a robot's live map, plus the roles a task
//! can ask the resolver for.
//!
//! A [`Point`] is always a copy of what the controller's map reported at some
//! moment. Map refreshes may reassign ids, which is why tasks keep both the id
//! and a denormalized copy (see [`crate::points`]).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of location as the controller's map labels it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointType {
    Dropoff,
    Shelf,
    Charger,
    Pickup,
    Docking,
}

impl fmt::Display for PointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dropoff => write!(f, "dropoff"),
            Self::Shelf => write!(f, "shelf"),
            Self::Charger => write!(f, "charger"),
            Self::Pickup => write!(f, "pickup"),
            Self::Docking => write!(f, "docking"),
        }
    }
}

impl std::str::FromStr for PointType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dropoff" => Ok(Self::Dropoff),
            "shelf" => Ok(Self::Shelf),
            "charger" => Ok(Self::Charger),
            "pickup" => Ok(Self::Pickup),
            "docking" => Ok(Self::Docking),
            _ => Err(format!("Invalid point type: {s}")),
        }
    }
}

/// A named location on a robot's map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub id: String,
    pub name: String,
    pub point_type: PointType,
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
    pub area_id: String,
}

impl Point {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        point_type: PointType,
        x: f64,
        y: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            point_type,
            x,
            y,
            yaw: 0.0,
            area_id: String::new(),
        }
    }

    pub fn with_yaw(mut self, yaw: f64) -> Self {
        self.yaw = yaw;
        self
    }

    pub fn with_area(mut self, area_id: impl Into<String>) -> Self {
        self.area_id = area_id.into();
        self
    }
}

/// Role a point plays inside a task workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointRole {
    Dropoff,
    Shelf,
    Charger,
    Return,
}

impl PointRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dropoff => "dropoff",
            Self::Shelf => "shelf",
            Self::Charger => "charger",
            Self::Return => "return",
        }
    }

    /// Map point types that may stand in for this role, most specific first
    pub fn compatible_types(&self) -> &'static [PointType] {
        match self {
            Self::Dropoff => &[PointType::Dropoff, PointType::Pickup],
            Self::Shelf => &[PointType::Shelf],
            Self::Charger | Self::Return => &[PointType::Charger, PointType::Docking],
        }
    }
}

impl fmt::Display for PointRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The active map of a robot as reported by its controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapSnapshot {
    pub map_id: String,
    pub points: Vec<Point>,
}

impl MapSnapshot {
    pub fn new(map_id: impl Into<String>, points: Vec<Point>) -> Self {
        Self {
            map_id: map_id.into(),
            points,
        }
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Point> {
        self.points.iter().find(|p| p.id == id)
    }

    /// Case-insensitive exact name lookup
    pub fn find_by_name(&self, name: &str) -> Option<&Point> {
        let wanted = name.trim();
        self.points
            .iter()
            .find(|p| p.name.trim().eq_ignore_ascii_case(wanted))
    }

    /// First point whose type is in `types`, honouring the order of `types`
    pub fn first_of_types(&self, types: &[PointType]) -> Option<&Point> {
        types
            .iter()
            .find_map(|t| self.points.iter().find(|p| p.point_type == *t))
    }
}
