use color_eyre::{eyre::eyre, Result};
use futures::future::{BoxFuture, FutureExt};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::multipart::Form;
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use url::Url;

use super::error::{FetchError, FetchResult};
use super::types::{SketchDetail, SketchListResponse, SketchSummary, SketchUpdate};
use super::SketchApi;
use crate::config::Config;

/// Sketch API client over HTTP
#[derive(Clone)]
pub struct HttpSketchApi {
  client: reqwest::Client,
  base: Url,
}

impl HttpSketchApi {
  pub fn new(config: &Config) -> Result<Self> {
    let base = config.api.base_url()?;

    let mut headers = HeaderMap::new();
    headers.insert(
      "X-Client-Version",
      HeaderValue::from_static(env!("CARGO_PKG_VERSION")),
    );
    if let Some(token) = Config::get_api_token() {
      let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|e| eyre!("Invalid API token: {}", e))?;
      value.set_sensitive(true);
      headers.insert(AUTHORIZATION, value);
    }

    let client = reqwest::Client::builder()
      .default_headers(headers)
      .timeout(config.api.timeout())
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    info!(base = %base, "sketch API client ready");

    Ok(Self { client, base })
  }

  fn endpoint(&self, segments: &[&str]) -> Url {
    join_endpoint(&self.base, segments)
  }
}

/// Append path segments to a base URL, escaping each one.
fn join_endpoint(base: &Url, segments: &[&str]) -> Url {
  let mut url = base.clone();
  // Base URLs are validated to be http(s), which can always be a base
  if let Ok(mut path) = url.path_segments_mut() {
    path.pop_if_empty().extend(segments);
  }
  url
}

/// Turn a response into a decoded body or a normalized status error.
async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> FetchResult<T> {
  let status = response.status();
  let body = response.bytes().await?;
  if !status.is_success() {
    return Err(FetchError::from_status(status.as_u16(), &body));
  }
  Ok(serde_json::from_slice(&body)?)
}

async fn read_empty(response: reqwest::Response) -> FetchResult<()> {
  let status = response.status();
  if status.is_success() {
    return Ok(());
  }
  let body = response.bytes().await?;
  Err(FetchError::from_status(status.as_u16(), &body))
}

impl SketchApi for HttpSketchApi {
  fn fetch_sketch_list(&self) -> BoxFuture<'static, FetchResult<Vec<SketchSummary>>> {
    let request = self.client.get(self.endpoint(&["sketches"]));
    async move {
      debug!("GET /sketches");
      let response = request.send().await?;
      let list: SketchListResponse = read_json(response).await?;
      Ok(list.into_sketches())
    }
    .boxed()
  }

  fn fetch_sketch_detail(&self, id: &str) -> BoxFuture<'static, FetchResult<SketchDetail>> {
    let request = self.client.get(self.endpoint(&["sketches", id]));
    let id = id.to_string();
    async move {
      debug!(%id, "GET /sketches/{{id}}");
      let response = request.send().await?;
      read_json(response).await
    }
    .boxed()
  }

  fn update_sketch(&self, id: &str, update: SketchUpdate) -> BoxFuture<'static, FetchResult<()>> {
    let form = update
      .form_fields()
      .into_iter()
      .fold(Form::new(), |form, (name, value)| form.text(name, value));
    let request = self
      .client
      .put(self.endpoint(&["sketches", id]))
      .multipart(form);
    let id = id.to_string();
    async move {
      info!(%id, ?update, "updating sketch");
      let response = request.send().await?;
      read_empty(response).await
    }
    .boxed()
  }

  fn delete_sketch(&self, id: &str) -> BoxFuture<'static, FetchResult<()>> {
    let request = self.client.delete(self.endpoint(&["sketches", id]));
    let id = id.to_string();
    async move {
      info!(%id, "deleting sketch");
      let response = request.send().await?;
      read_empty(response).await
    }
    .boxed()
  }
}
