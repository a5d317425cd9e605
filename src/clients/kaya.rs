use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{RateGate, UpstreamError};

const MIN_REQUEST_DELAY: Duration = Duration::from_millis(1000);

/// Upstream-enforced page sizes. Raising either without verification breaks
/// pagination silently (the server truncates and `has_more` lies).
pub const CLIMBS_PAGE_SIZE: usize = 20;
pub const ASCENTS_PAGE_SIZE: usize = 15;

/// GraphQL client for the social-ascent service. Anonymous access suffices
/// for public data; the bearer token is attached only when configured.
pub struct KayaClient {
    http: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
    gate: RateGate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KayaLocation {
    pub id: String,
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KayaClimb {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub grade: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KayaAscent {
    pub id: String,
    pub climb_id: String,
    #[serde(default)]
    pub climber_name: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KayaPost {
    pub id: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_more: bool,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

const LOCATION_QUERY: &str = r#"
query Location($slug: String!) {
  location(slug: $slug) { id slug name latitude longitude }
}"#;

const SUB_LOCATIONS_QUERY: &str = r#"
query SubLocations($parentId: ID!, $page: Int!) {
  subLocations(parentId: $parentId, page: $page) { id slug name latitude longitude }
}"#;

const CLIMBS_QUERY: &str = r#"
query Climbs($locationId: ID!, $page: Int!, $perPage: Int!) {
  climbs(locationId: $locationId, page: $page, perPage: $perPage) {
    id name grade latitude longitude
  }
}"#;

const ASCENTS_QUERY: &str = r#"
query Ascents($locationId: ID!, $page: Int!, $perPage: Int!) {
  ascents(locationId: $locationId, page: $page, perPage: $perPage) {
    id climbId climberName style comment date
  }
}"#;

const POSTS_QUERY: &str = r#"
query Posts($locationId: ID!, $page: Int!) {
  posts(locationId: $locationId, page: $page) { id body createdAt }
}"#;

impl KayaClient {
    pub fn new(http: reqwest::Client, base_url: String, auth_token: Option<String>) -> Self {
        Self {
            http,
            base_url,
            auth_token,
            gate: RateGate::new(MIN_REQUEST_DELAY),
        }
    }

    async fn post<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T, UpstreamError> {
        self.gate.wait().await;
        let mut request = self
            .http
            .post(&self.base_url)
            .json(&json!({ "query": query, "variables": variables }))
            .timeout(Duration::from_secs(30));
        if let Some(token) = self.auth_token.as_deref() {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::from_status(status, &body));
        }
        let payload: GraphQlResponse<T> = response
            .json()
            .await
            .map_err(|err| UpstreamError::Decode(format!("kaya response: {err}")))?;
        unwrap_graphql(payload)
    }

    pub async fn get_location(&self, slug: &str) -> Result<KayaLocation, UpstreamError> {
        #[derive(Deserialize)]
        struct Data {
            location: Option<KayaLocation>,
        }
        let data: Data = self.post(LOCATION_QUERY, json!({ "slug": slug })).await?;
        data.location
            .ok_or_else(|| UpstreamError::Permanent(format!("unknown kaya location {slug:?}")))
    }

    pub async fn get_sub_locations(
        &self,
        parent_id: &str,
        page: u32,
    ) -> Result<Vec<KayaLocation>, UpstreamError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Data {
            sub_locations: Vec<KayaLocation>,
        }
        let data: Data = self
            .post(SUB_LOCATIONS_QUERY, json!({ "parentId": parent_id, "page": page }))
            .await?;
        Ok(data.sub_locations)
    }

    pub async fn get_climbs(
        &self,
        location_id: &str,
        page: u32,
    ) -> Result<Page<KayaClimb>, UpstreamError> {
        #[derive(Deserialize)]
        struct Data {
            climbs: Vec<KayaClimb>,
        }
        let data: Data = self
            .post(
                CLIMBS_QUERY,
                json!({
                    "locationId": location_id,
                    "page": page,
                    "perPage": CLIMBS_PAGE_SIZE,
                }),
            )
            .await?;
        Ok(page_of(data.climbs, CLIMBS_PAGE_SIZE))
    }

    pub async fn get_ascents(
        &self,
        location_id: &str,
        page: u32,
    ) -> Result<Page<KayaAscent>, UpstreamError> {
        #[derive(Deserialize)]
        struct Data {
            ascents: Vec<RawAscent>,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct RawAscent {
            id: String,
            climb_id: String,
            #[serde(default)]
            climber_name: Option<String>,
            #[serde(default)]
            style: Option<String>,
            #[serde(default)]
            comment: Option<String>,
            #[serde(default)]
            date: Option<String>,
        }
        let data: Data = self
            .post(
                ASCENTS_QUERY,
                json!({
                    "locationId": location_id,
                    "page": page,
                    "perPage": ASCENTS_PAGE_SIZE,
                }),
            )
            .await?;
        let items = data
            .ascents
            .into_iter()
            .map(|raw| KayaAscent {
                id: raw.id,
                climb_id: raw.climb_id,
                climber_name: raw.climber_name,
                style: raw.style,
                comment: raw.comment,
                date: raw.date,
            })
            .collect();
        Ok(page_of(items, ASCENTS_PAGE_SIZE))
    }

    pub async fn get_posts(
        &self,
        location_id: &str,
        page: u32,
    ) -> Result<Vec<KayaPost>, UpstreamError> {
        #[derive(Deserialize)]
        struct Data {
            posts: Vec<KayaPost>,
        }
        let data: Data = self
            .post(POSTS_QUERY, json!({ "locationId": location_id, "page": page }))
            .await?;
        Ok(data.posts)
    }
}

fn page_of<T>(items: Vec<T>, page_size: usize) -> Page<T> {
    let has_more = items.len() >= page_size;
    Page { items, has_more }
}

fn unwrap_graphql<T>(payload: GraphQlResponse<T>) -> Result<T, UpstreamError> {
    if !payload.errors.is_empty() {
        let joined = payload
            .errors
            .iter()
            .map(|err| err.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(UpstreamError::Permanent(format!("graphql errors: {joined}")));
    }
    payload
        .data
        .ok_or_else(|| UpstreamError::Decode("graphql response without data".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graphql_errors_surface_as_typed_failure() {
        let payload: GraphQlResponse<serde_json::Value> = serde_json::from_value(serde_json::json!({
            "data": null,
            "errors": [
                { "message": "location not found" },
                { "message": "rate limited" }
            ]
        }))
        .unwrap();
        let err = unwrap_graphql(payload).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("location not found"));
        assert!(message.contains("rate limited"));
    }

    #[test]
    fn full_page_reports_more() {
        let page = page_of(vec![0u8; CLIMBS_PAGE_SIZE], CLIMBS_PAGE_SIZE);
        assert!(page.has_more);
        let page = page_of(vec![0u8; 3], CLIMBS_PAGE_SIZE);
        assert!(!page.has_more);
    }

    #[test]
    fn decodes_camel_case_ascents() {
        #[derive(Deserialize)]
        struct Data {
            ascents: Vec<serde_json::Value>,
        }
        let payload: GraphQlResponse<Data> = serde_json::from_value(serde_json::json!({
            "data": {
                "ascents": [
                    { "id": "a1", "climbId": "c9", "climberName": "leo", "date": "2026-06-30" }
                ]
            }
        }))
        .unwrap();
        let data = unwrap_graphql(payload).unwrap();
        assert_eq!(data.ascents.len(), 1);
    }
}
