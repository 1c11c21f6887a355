use proj4rs::errors::Error as Proj4Error;
use proj4rs::proj::Proj;
use proj4rs::transform::transform;
use std::fmt;

mod primitives;

pub use primitives::{Envelope, Interval, PixelRect};

#[derive(Debug)]
pub enum ProjectionError {
    Proj4Error(Proj4Error),
    UnsupportedEpsg(u32),
    NoAuthority(String),
    NonFiniteCorner((f64, f64)),
}

impl From<Proj4Error> for ProjectionError {
    fn from(e: Proj4Error) -> Self {
        ProjectionError::Proj4Error(e)
    }
}

impl fmt::Display for ProjectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for ProjectionError {}

#[derive(Debug, Clone, PartialEq)]
pub enum CrsSource {
    Epsg(u16),
    Proj4(String),
    Wkt(String),
}

impl fmt::Display for CrsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrsSource::Epsg(code) => write!(f, "EPSG:{code}"),
            CrsSource::Proj4(def) => write!(f, "{def}"),
            CrsSource::Wkt(wkt) => write!(f, "WKT({} chars)", wkt.len()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Crs {
    source: CrsSource,
    proj: Proj,
}

impl PartialEq for Crs {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Crs {
    pub fn resolve(source: &CrsSource) -> Result<Self, ProjectionError> {
        let proj = match source {
            CrsSource::Epsg(code) => Proj::from_epsg_code(*code)?,
            CrsSource::Proj4(def) => Proj::from_proj_string(def)?,
            CrsSource::Wkt(wkt) => {
                let code = wkt_epsg_code(wkt)
                    .ok_or_else(|| ProjectionError::NoAuthority(truncate(wkt, 64)))?;
                let code =
                    u16::try_from(code).map_err(|_| ProjectionError::UnsupportedEpsg(code))?;
                Proj::from_epsg_code(code)?
            }
        };
        Ok(Self {
            source: source.clone(),
            proj,
        })
    }

    pub fn from_epsg(code: u16) -> Result<Self, ProjectionError> {
        Self::resolve(&CrsSource::Epsg(code))
    }

    pub fn source(&self) -> &CrsSource {
        &self.source
    }

    pub fn proj(&self) -> &Proj {
        &self.proj
    }

    /// Geographic systems take degrees here; proj4rs works in radians
    pub fn is_geographic(&self) -> bool {
        self.proj.is_latlong()
    }

    /// Project the corners of `envelope` from this CRS into `target`
    pub fn transform_envelope(
        &self,
        target: &Crs,
        envelope: &Envelope,
    ) -> Result<Envelope, ProjectionError> {
        if self == target {
            return Ok(*envelope);
        }
        let corners = [
            (envelope.min_x(), envelope.min_y()),
            (envelope.min_x(), envelope.max_y()),
            (envelope.max_x(), envelope.min_y()),
            (envelope.max_x(), envelope.max_y()),
        ];
        let mut min = (f64::INFINITY, f64::INFINITY);
        let mut max = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for (x, y) in corners {
            let (x, y) = self.transform_point(target, x, y)?;
            min = (min.0.min(x), min.1.min(y));
            max = (max.0.max(x), max.1.max(y));
        }
        Ok(Envelope::new(min.0, min.1, max.0, max.1))
    }

    pub fn transform_point(
        &self,
        target: &Crs,
        x: f64,
        y: f64,
    ) -> Result<(f64, f64), ProjectionError> {
        let mut point = if self.is_geographic() {
            (x.to_radians(), y.to_radians(), 0.0)
        } else {
            (x, y, 0.0)
        };
        transform(&self.proj, &target.proj, &mut point)?;
        let (x, y) = if target.is_geographic() {
            (point.0.to_degrees(), point.1.to_degrees())
        } else {
            (point.0, point.1)
        };
        if !x.is_finite() || !y.is_finite() {
            return Err(ProjectionError::NonFiniteCorner((x, y)));
        }
        Ok((x, y))
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Crs({})", self.source)
    }
}

/// EPSG code of the outermost authority clause of a WKT definition
///
/// WKT1 closes the top-level object with `AUTHORITY["EPSG","code"]`, WKT2 with
/// `ID["EPSG",code]`; nested datum and unit authorities appear earlier.
fn wkt_epsg_code(wkt: &str) -> Option<u32> {
    let upper = wkt.to_ascii_uppercase();
    let start = ["AUTHORITY[", "ID["]
        .iter()
        .filter_map(|keyword| upper.rfind(keyword).map(|i| i + keyword.len()))
        .max()?;
    let body = &upper[start..upper[start..].find(']')? + start];
    let mut parts = body.split(',').map(|p| p.trim().trim_matches('"').trim());
    if parts.next()? != "EPSG" {
        return None;
    }
    parts.next()?.parse().ok()
}

fn truncate(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const WKT_4326: &str = r#"GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],PRIMEM["Greenwich",0],UNIT["degree",0.0174532925199433],AUTHORITY["EPSG","4326"]]"#;

    #[test]
    fn wkt_uses_outermost_authority() {
        assert_eq!(wkt_epsg_code(WKT_4326), Some(4326));
        assert_eq!(wkt_epsg_code(r#"PROJCRS["x",ID["EPSG",3857]]"#), Some(3857));
        assert_eq!(wkt_epsg_code(r#"LOCAL_CS["engineering"]"#), None);
    }

    #[test]
    fn resolves_epsg_and_wkt() {
        let from_code = Crs::from_epsg(4326).unwrap();
        let from_wkt = Crs::resolve(&CrsSource::Wkt(WKT_4326.into())).unwrap();
        assert!(from_code.is_geographic());
        assert!(from_wkt.is_geographic());
    }

    #[test]
    fn unresolvable_wkt_is_reported() {
        let err = Crs::resolve(&CrsSource::Wkt("LOCAL_CS[\"x\"]".into())).unwrap_err();
        assert!(matches!(err, ProjectionError::NoAuthority(_)));
    }

    #[test]
    fn transform_to_same_crs_is_identity() {
        let crs = Crs::from_epsg(3857).unwrap();
        let env = Envelope::new(1.0, 2.0, 3.0, 4.0);
        assert_eq!(crs.transform_envelope(&crs, &env).unwrap(), env);
    }

    #[test]
    fn geographic_origin_maps_to_mercator_origin() {
        let wgs84 = Crs::from_epsg(4326).unwrap();
        let mercator = Crs::from_epsg(3857).unwrap();
        let (x, y) = wgs84.transform_point(&mercator, 0.0, 0.0).unwrap();
        assert!(x.abs() < 1e-6 && y.abs() < 1e-6);
        let (x, _) = wgs84.transform_point(&mercator, 1.0, 0.0).unwrap();
        assert!((x - 111_319.49).abs() < 1.0);
    }
}
