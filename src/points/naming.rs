//! Name-based heuristics used when a task's stored point id no longer
//! matches the live map.

use crate::models::{MapSnapshot, Point, PointRole};
use regex::Regex;
use std::sync::OnceLock;

fn dropoff_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)^\s*(?:dropoff|drop-off|drop off)\s+from\s+(?P<from>.+?)\s+to\s+(?P<to>.+?)(?:\s*,?\s+and\s+return\s+to\s+(?P<ret>.+?))?\s*$",
        )
        .expect("dropoff task-name pattern is valid")
    })
}

fn pickup_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)^\s*(?:pickup|pick-up|pick up)\s+from\s+(?P<from>.+?)\s+to\s+(?P<to>.+?)(?:\s*,?\s+and\s+return\s+to\s+(?P<ret>.+?))?\s*$",
        )
        .expect("pickup task-name pattern is valid")
    })
}

fn return_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^\s*return\s+to\s+(?P<ret>.+?)\s*$")
            .expect("return task-name pattern is valid")
    })
}

/// Candidate names a point may have on a refreshed map, most literal first.
///
/// Docking stations are commonly published next to their charger under a
/// suffixed name, so charger and return roles also try those spellings.
pub fn derived_names(name: &str, role: PointRole) -> Vec<String> {
    let base = name.trim();
    if base.is_empty() {
        return Vec::new();
    }
    let mut names = vec![base.to_string()];
    if matches!(role, PointRole::Charger | PointRole::Return) {
        names.push(format!("{base}_docking"));
        names.push(format!("{base}-docking"));
        names.push(format!("{base} docking"));
    }
    names
}

/// Extract the name a task's human-readable title gives for `role`.
///
/// Understands "Dropoff from A to B", "Pickup from B to A" and
/// "Return to C", optionally followed by ", and return to C".
pub fn name_from_task_title(title: &str, role: PointRole) -> Option<String> {
    let capture = |caps: regex::Captures<'_>, group: &str| {
        caps.name(group).map(|m| m.as_str().trim().to_string())
    };

    if let Some(caps) = dropoff_pattern().captures(title) {
        return match role {
            PointRole::Dropoff => capture(caps, "from"),
            PointRole::Shelf => capture(caps, "to"),
            PointRole::Charger | PointRole::Return => capture(caps, "ret"),
        };
    }
    if let Some(caps) = pickup_pattern().captures(title) {
        return match role {
            PointRole::Shelf => capture(caps, "from"),
            PointRole::Dropoff => capture(caps, "to"),
            PointRole::Charger | PointRole::Return => capture(caps, "ret"),
        };
    }
    if let Some(caps) = return_pattern().captures(title) {
        return match role {
            PointRole::Charger | PointRole::Return => capture(caps, "ret"),
            _ => None,
        };
    }
    None
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Loose name match for a role: normalized equality on compatible point
/// types, then on any type, then containment on compatible types.
pub fn fuzzy_find<'a>(map: &'a MapSnapshot, name: &str, role: PointRole) -> Option<&'a Point> {
    let wanted = normalize(name);
    if wanted.is_empty() {
        return None;
    }
    let compatible = role.compatible_types();
    let is_compatible = |p: &&Point| compatible.contains(&p.point_type);

    map.points
        .iter()
        .filter(is_compatible)
        .find(|p| normalize(&p.name) == wanted)
        .or_else(|| map.points.iter().find(|p| normalize(&p.name) == wanted))
        .or_else(|| {
            map.points.iter().filter(is_compatible).find(|p| {
                let candidate = normalize(&p.name);
                !candidate.is_empty() && (candidate.contains(&wanted) || wanted.contains(&candidate))
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PointType;

    #[test]
    fn test_dropoff_title_roles() {
        let title = "Dropoff from A to B";
        assert_eq!(name_from_task_title(title, PointRole::Dropoff).as_deref(), Some("A"));
        assert_eq!(name_from_task_title(title, PointRole::Shelf).as_deref(), Some("B"));
        assert_eq!(name_from_task_title(title, PointRole::Return), None);
    }

    #[test]
    fn test_title_with_return_clause() {
        let title = "drop-off from Bay 3 to Rack 12, and return to Charger 1";
        assert_eq!(name_from_task_title(title, PointRole::Dropoff).as_deref(), Some("Bay 3"));
        assert_eq!(name_from_task_title(title, PointRole::Shelf).as_deref(), Some("Rack 12"));
        assert_eq!(
            name_from_task_title(title, PointRole::Return).as_deref(),
            Some("Charger 1")
        );
    }

    #[test]
    fn test_pickup_title_swaps_roles() {
        let title = "Pickup from Rack 4 to Bay 1";
        assert_eq!(name_from_task_title(title, PointRole::Shelf).as_deref(), Some("Rack 4"));
        assert_eq!(name_from_task_title(title, PointRole::Dropoff).as_deref(), Some("Bay 1"));
    }

    #[test]
    fn test_unrecognized_title() {
        assert_eq!(name_from_task_title("Morning patrol", PointRole::Dropoff), None);
    }

    #[test]
    fn test_derived_names_for_charger() {
        assert_eq!(
            derived_names("Charger 1", PointRole::Return),
            vec!["Charger 1", "Charger 1_docking", "Charger 1-docking", "Charger 1 docking"]
        );
        assert_eq!(derived_names("Bay", PointRole::Dropoff), vec!["Bay"]);
        assert!(derived_names("  ", PointRole::Shelf).is_empty());
    }

    #[test]
    fn test_fuzzy_find_prefers_compatible_type() {
        let map = MapSnapshot::new(
            "m",
            vec![
                Point::new("x", "A", PointType::Charger, 9.0, 9.0),
                Point::new("a", "a", PointType::Dropoff, 1.0, 1.0),
                Point::new("s", "Shelf-B (north)", PointType::Shelf, 5.0, 5.0),
            ],
        );
        assert_eq!(fuzzy_find(&map, "A", PointRole::Dropoff).map(|p| p.id.as_str()), Some("a"));
        assert_eq!(
            fuzzy_find(&map, "shelf b", PointRole::Shelf).map(|p| p.id.as_str()),
            Some("s")
        );
        assert!(fuzzy_find(&map, "Z", PointRole::Dropoff).is_none());
    }
}
