use chrono::NaiveDateTime;
use serde::Deserialize;
use std::time::Duration;

use super::{RateGate, UpstreamError};

const MIN_REQUEST_DELAY: Duration = Duration::from_millis(500);

/// REST client for the area/tick catalog. Requests are serialized through a
/// rate gate with a 500 ms minimum inter-request delay.
pub struct AreaCatalogClient {
    http: reqwest::Client,
    base_url: String,
    gate: RateGate,
}

#[derive(Debug, Clone)]
pub struct CatalogArea {
    pub external_id: i64,
    pub title: String,
    pub children: Vec<CatalogChild>,
}

#[derive(Debug, Clone)]
pub enum CatalogChild {
    Area { external_id: i64, title: String },
    Route(CatalogRoute),
}

#[derive(Debug, Clone)]
pub struct CatalogRoute {
    pub external_id: i64,
    pub title: String,
    pub grade: Option<String>,
    pub kind: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct CatalogTick {
    pub external_id: i64,
    pub climber_name: Option<String>,
    pub style: Option<String>,
    pub comment: Option<String>,
    /// Naive local wall-clock string from upstream; callers interpret it in
    /// the owning location's civic timezone.
    pub climbed_at: Option<NaiveDateTime>,
}

impl AreaCatalogClient {
    pub fn new(http: reqwest::Client, base_url: String) -> Self {
        Self {
            http,
            base_url,
            gate: RateGate::new(MIN_REQUEST_DELAY),
        }
    }

    pub async fn get_area(&self, external_id: i64) -> Result<CatalogArea, UpstreamError> {
        self.gate.wait().await;
        let url = format!("{}/areas/{external_id}", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .get(&url)
            .timeout(Duration::from_secs(20))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::from_status(status, &body));
        }
        let payload: RawArea = response
            .json()
            .await
            .map_err(|err| UpstreamError::Decode(format!("catalog area {external_id}: {err}")))?;
        Ok(decode_area(payload))
    }

    pub async fn get_route_ticks(&self, external_id: i64) -> Result<Vec<CatalogTick>, UpstreamError> {
        self.gate.wait().await;
        let url = format!(
            "{}/routes/{external_id}/ticks",
            self.base_url.trim_end_matches('/')
        );
        let response = self
            .http
            .get(&url)
            .timeout(Duration::from_secs(20))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::from_status(status, &body));
        }
        let payload: RawTicksPayload = response
            .json()
            .await
            .map_err(|err| UpstreamError::Decode(format!("catalog ticks {external_id}: {err}")))?;
        Ok(payload.ticks.into_iter().map(decode_tick).collect())
    }
}

#[derive(Debug, Deserialize)]
struct RawArea {
    id: i64,
    title: String,
    #[serde(default)]
    children: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawChild {
    #[serde(rename = "type")]
    kind: String,
    id: i64,
    title: String,
    #[serde(default)]
    grade: Option<String>,
    #[serde(default)]
    route_type: Option<String>,
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawTicksPayload {
    #[serde(default)]
    ticks: Vec<RawTick>,
}

/// Several tick fields arrive as either `false` or an object depending on
/// whether the upstream user filled them in.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FalseOr<T> {
    Absent(bool),
    Present(T),
}

impl<T> FalseOr<T> {
    fn into_option(self) -> Option<T> {
        match self {
            FalseOr::Absent(_) => None,
            FalseOr::Present(value) => Some(value),
        }
    }
}

impl<T> Default for FalseOr<T> {
    fn default() -> Self {
        FalseOr::Absent(false)
    }
}

#[derive(Debug, Deserialize)]
struct RawTick {
    id: i64,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    style: FalseOr<String>,
    #[serde(default)]
    comment: FalseOr<String>,
    #[serde(default)]
    user: FalseOr<RawTickUser>,
}

#[derive(Debug, Deserialize)]
struct RawTickUser {
    #[serde(default)]
    name: Option<String>,
}

fn decode_area(raw: RawArea) -> CatalogArea {
    let mut children = Vec::with_capacity(raw.children.len());
    for value in raw.children {
        let child: RawChild = match serde_json::from_value(value.clone()) {
            Ok(child) => child,
            Err(err) => {
                tracing::warn!(area_id = raw.id, error = %err, "skipping undecodable catalog child");
                continue;
            }
        };
        match child.kind.as_str() {
            "Area" => children.push(CatalogChild::Area {
                external_id: child.id,
                title: child.title,
            }),
            "Route" => children.push(CatalogChild::Route(CatalogRoute {
                external_id: child.id,
                title: child.title,
                grade: child.grade,
                kind: child.route_type,
                latitude: child.latitude,
                longitude: child.longitude,
            })),
            other => {
                tracing::warn!(area_id = raw.id, child_type = other, "skipping unknown catalog child type");
            }
        }
    }
    CatalogArea {
        external_id: raw.id,
        title: raw.title,
        children,
    }
}

fn decode_tick(raw: RawTick) -> CatalogTick {
    CatalogTick {
        external_id: raw.id,
        climber_name: raw.user.into_option().and_then(|user| user.name),
        style: raw.style.into_option(),
        comment: raw.comment.into_option(),
        climbed_at: raw.date.as_deref().and_then(parse_tick_datetime),
    }
}

fn parse_tick_datetime(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
        return Some(parsed);
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M") {
        return Some(parsed);
    }
    chrono::NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(12, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_mixed_children_and_skips_unknown_types() {
        let raw: RawArea = serde_json::from_value(serde_json::json!({
            "id": 105805,
            "title": "Gold Bar Boulders",
            "children": [
                { "type": "Area", "id": 1, "title": "Clearcut" },
                {
                    "type": "Route", "id": 2, "title": "The Seam",
                    "grade": "V5", "route_type": "Boulder",
                    "latitude": 47.82, "longitude": -121.56
                },
                { "type": "Topo", "id": 3, "title": "overview map" }
            ]
        }))
        .unwrap();
        let area = decode_area(raw);
        assert_eq!(area.children.len(), 2);
        assert!(matches!(area.children[0], CatalogChild::Area { external_id: 1, .. }));
        match &area.children[1] {
            CatalogChild::Route(route) => {
                assert_eq!(route.external_id, 2);
                assert_eq!(route.kind.as_deref(), Some("Boulder"));
            }
            other => panic!("expected route child, got {other:?}"),
        }
    }

    #[test]
    fn tick_fields_tolerate_false_and_object() {
        let payload: RawTicksPayload = serde_json::from_value(serde_json::json!({
            "ticks": [
                {
                    "id": 11,
                    "date": "2026-07-03",
                    "style": "Flash",
                    "comment": false,
                    "user": { "name": "ana" }
                },
                {
                    "id": 12,
                    "date": "2026-07-04 09:30",
                    "style": false,
                    "comment": "greasy topout",
                    "user": false
                }
            ]
        }))
        .unwrap();
        let ticks: Vec<CatalogTick> = payload.ticks.into_iter().map(decode_tick).collect();

        assert_eq!(ticks[0].external_id, 11);
        assert_eq!(ticks[0].style.as_deref(), Some("Flash"));
        assert_eq!(ticks[0].comment, None);
        assert_eq!(ticks[0].climber_name.as_deref(), Some("ana"));
        assert_eq!(
            ticks[0].climbed_at.unwrap().format("%H:%M").to_string(),
            "12:00"
        );

        assert_eq!(ticks[1].style, None);
        assert_eq!(ticks[1].comment.as_deref(), Some("greasy topout"));
        assert_eq!(ticks[1].climber_name, None);
        assert_eq!(
            ticks[1].climbed_at.unwrap().format("%Y-%m-%d %H:%M").to_string(),
            "2026-07-04 09:30"
        );
    }
}
