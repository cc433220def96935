//! Parsing of provider self-links.

use crate::error::{Error, Result};

/// Where a resource lives inside its project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Global,
    Zone(String),
    Region(String),
}

/// A parsed self-link such as
/// `https://www.googleapis.com/compute/v1/projects/p/regions/r/subnetworks/s`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    pub project: String,
    pub location: Location,
    pub collection: String,
    pub name: String,
}

impl ResourceRef {
    /// Accepts full URLs as well as partial paths starting at `projects/`.
    pub fn parse(link: &str) -> Result<ResourceRef> {
        let invalid = || Error::InvalidReference(link.to_string());
        let segments: Vec<&str> = link.split('/').filter(|s| !s.is_empty()).collect();
        let start = segments
            .iter()
            .position(|s| *s == "projects")
            .ok_or_else(invalid)?;
        let rest = &segments[start + 1..];
        let (project, location, tail) = match rest {
            [project, "global", tail @ ..] => (project, Location::Global, tail),
            [project, "zones", zone, tail @ ..] => {
                (project, Location::Zone(zone.to_string()), tail)
            }
            [project, "regions", region, tail @ ..] => {
                (project, Location::Region(region.to_string()), tail)
            }
            _ => return Err(invalid()),
        };
        match tail {
            [collection, name] => Ok(ResourceRef {
                project: project.to_string(),
                location,
                collection: collection.to_string(),
                name: name.to_string(),
            }),
            _ => Err(invalid()),
        }
    }
}

/// Last path segment of a link, e.g. the zone name in
/// `projects/123/zones/us-central1-a`.
pub fn last_segment(link: &str) -> &str {
    link.trim_end_matches('/').rsplit('/').next().unwrap_or(link)
}
