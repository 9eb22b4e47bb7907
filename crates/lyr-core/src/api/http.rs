use std::collections::HashSet;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use lyr_domain::{LayerDescriptor, LayerRecord, LayerVersionInfo};
use reqwest::blocking::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::LayerApi;

const USER_AGENT: &str = concat!("lyr/", env!("CARGO_PKG_VERSION"));
/// Path prefix of the platform's layer endpoints.
pub const LAYERS_API_VERSION: &str = "2018-10-31";

/// Layer API spoken over the platform's REST interface.
///
/// Requests carry an optional bearer token; request signing is left to a
/// proxy in front of `endpoint`.
pub struct HttpLayerApi {
    client: Client,
    endpoint: Url,
    token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListLayersResponse {
    #[serde(default)]
    layers: Vec<LayerRecord>,
    #[serde(default)]
    next_marker: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct PublishLayerBody<'a> {
    description: &'a str,
    content: PublishContent,
    license_info: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct PublishContent {
    zip_file: String,
}

impl HttpLayerApi {
    /// # Errors
    /// Returns an error when `endpoint` is not a usable base URL or the HTTP
    /// client cannot be built.
    pub fn new(endpoint: &str, token: Option<String>, timeout: Option<Duration>) -> Result<Self> {
        let endpoint =
            Url::parse(endpoint.trim()).with_context(|| format!("invalid endpoint {endpoint}"))?;
        if endpoint.cannot_be_a_base() {
            return Err(anyhow!("endpoint {endpoint} cannot carry a path"));
        }
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            client,
            endpoint,
            token,
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow!("endpoint {} cannot carry a path", self.endpoint))?
            .pop_if_empty()
            .push(LAYERS_API_VERSION)
            .push("layers")
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

impl LayerApi for HttpLayerApi {
    fn list_layers(&self) -> Result<Vec<LayerRecord>> {
        let mut layers = Vec::new();
        let mut marker: Option<String> = None;
        let mut seen = HashSet::new();
        loop {
            let mut url = self.url(&[])?;
            if let Some(marker) = &marker {
                url.query_pairs_mut().append_pair("Marker", marker);
            }
            let page: ListLayersResponse = self
                .authorize(self.client.get(url.clone()))
                .send()
                .with_context(|| format!("failed to list layers at {url}"))?
                .error_for_status()
                .with_context(|| format!("unexpected response listing layers at {url}"))?
                .json()
                .context("malformed list-layers response")?;
            debug!(count = page.layers.len(), "listed layer page");
            layers.extend(page.layers);
            match page.next_marker.filter(|next| !next.is_empty()) {
                Some(next) if !seen.insert(next.clone()) => {
                    return Err(anyhow!("list-layers pagination repeated marker {next}"));
                }
                Some(next) => marker = Some(next),
                None => break,
            }
        }
        Ok(layers)
    }

    fn publish_layer_version(&self, layer: &LayerDescriptor) -> Result<LayerVersionInfo> {
        let url = self.url(&[layer.name.as_str(), "versions"])?;
        let body = PublishLayerBody {
            description: &layer.description,
            content: PublishContent {
                zip_file: STANDARD.encode(&layer.content),
            },
            license_info: &layer.license_info,
        };
        self.authorize(self.client.post(url.clone()))
            .json(&body)
            .send()
            .with_context(|| format!("failed to publish layer {}", layer.name))?
            .error_for_status()
            .with_context(|| format!("unexpected response publishing layer {}", layer.name))?
            .json()
            .context("malformed publish-layer-version response")
    }

    fn delete_layer_version(&self, layer_name: &str, version: i64) -> Result<()> {
        let version = version.to_string();
        let url = self.url(&[layer_name, "versions", version.as_str()])?;
        self.authorize(self.client.delete(url))
            .send()
            .with_context(|| format!("failed to delete layer {layer_name}:{version}"))?
            .error_for_status()
            .with_context(|| format!("unexpected response deleting layer {layer_name}:{version}"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httptest::{matchers::*, responders::*, Expectation, Server};
    use serde_json::json;
    use std::panic;

    fn server() -> Option<Server> {
        match panic::catch_unwind(Server::run) {
            Ok(server) => Some(server),
            Err(_) => {
                eprintln!("skipping http layer api test (httptest server unavailable)");
                None
            }
        }
    }

    fn api_for(server: &Server, token: Option<&str>) -> HttpLayerApi {
        HttpLayerApi::new(
            &server.url_str("/"),
            token.map(ToOwned::to_owned),
            Some(Duration::from_secs(10)),
        )
        .expect("api")
    }

    #[test]
    fn list_follows_pagination_markers() {
        let Some(server) = server() else { return };
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/2018-10-31/layers"),
                request::query(url_decoded(contains(("Marker", "page-2")))),
            ])
            .respond_with(json_encoded(json!({
                "Layers": [{
                    "LayerName": "second",
                    "LatestMatchingVersion": {"Version": 1, "LayerVersionArn": "arn:second:1"}
                }]
            }))),
        );
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/2018-10-31/layers"),
                request::query(url_decoded(not(contains(key("Marker"))))),
            ])
            .respond_with(json_encoded(json!({
                "Layers": [{
                    "LayerName": "first",
                    "LatestMatchingVersion": {
                        "Version": 4,
                        "Description": "1.4.0",
                        "LayerVersionArn": "arn:first:4"
                    }
                }],
                "NextMarker": "page-2"
            }))),
        );

        let layers = api_for(&server, None).list_layers().expect("list");
        let names: Vec<&str> = layers.iter().map(|l| l.layer_name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn list_rejects_repeated_pagination_marker() {
        let Some(server) = server() else { return };
        server.expect(
            Expectation::matching(request::method_path("GET", "/2018-10-31/layers"))
                .times(2)
                .respond_with(json_encoded(json!({
                    "Layers": [{"LayerName": "loop", "LatestMatchingVersion": {"Version": 1}}],
                    "NextMarker": "same"
                }))),
        );

        let err = api_for(&server, None)
            .list_layers()
            .expect_err("repeated marker must fail");
        assert!(
            format!("{err:#}").contains("repeated marker same"),
            "error: {err:#}"
        );
    }

    #[test]
    fn publish_sends_base64_content_and_token() {
        let Some(server) = server() else { return };
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/2018-10-31/layers/faas-supervisor/versions"),
                request::headers(contains(("authorization", "Bearer s3cret"))),
                request::body(json_decoded(eq(json!({
                    "Description": "1.5.0",
                    "Content": {"ZipFile": "UEsFBg=="},
                    "LicenseInfo": "Apache 2.0"
                })))),
            ])
            .respond_with(json_encoded(json!({
                "Version": 5,
                "Description": "1.5.0",
                "LayerVersionArn": "arn:faas-supervisor:5",
                "CreatedDate": "2024-05-01T00:00:00.000+0000"
            }))),
        );

        let layer = LayerDescriptor {
            name: "faas-supervisor".into(),
            description: "1.5.0".into(),
            content: b"PK\x05\x06".to_vec(),
            license_info: "Apache 2.0".into(),
        };
        let info = api_for(&server, Some("s3cret"))
            .publish_layer_version(&layer)
            .expect("publish");
        assert_eq!(info.version, 5);
        assert_eq!(info.layer_version_arn, "arn:faas-supervisor:5");
    }

    #[test]
    fn delete_targets_version_path_and_surfaces_errors() {
        let Some(server) = server() else { return };
        server.expect(
            Expectation::matching(request::method_path(
                "DELETE",
                "/2018-10-31/layers/faas-supervisor/versions/3",
            ))
            .respond_with(status_code(204)),
        );
        server.expect(
            Expectation::matching(request::method_path(
                "DELETE",
                "/2018-10-31/layers/faas-supervisor/versions/-1",
            ))
            .respond_with(status_code(400)),
        );

        let api = api_for(&server, None);
        api.delete_layer_version("faas-supervisor", 3)
            .expect("delete");
        let err = api
            .delete_layer_version("faas-supervisor", -1)
            .expect_err("400 must fail");
        assert!(format!("{err:#}").contains("400"), "error: {err:#}");
    }
}
