use crate::error::SearchError;
use crate::models::SearchResult;
use crate::traits::RemoteIndex;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

/// Client for a remote index node speaking the same search protocol this
/// crate serves: `GET {endpoint}/ping` for health, `POST {endpoint}/search`
/// for scored results.
pub struct HttpRemoteIndex {
    client: reqwest::Client,
    endpoint: Url,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RemoteSearchRequest<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    document_ids: Option<&'a [String]>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteSearchResponse {
    results: Vec<SearchResult>,
}

impl HttpRemoteIndex {
    pub fn new(endpoint: &str) -> Result<Self, SearchError> {
        let endpoint = Url::parse(endpoint)?;
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
        })
    }

    fn route(&self, path: &str) -> Result<Url, SearchError> {
        Ok(self.endpoint.join(path)?)
    }
}

#[async_trait]
impl RemoteIndex for HttpRemoteIndex {
    async fn ping(&self) -> Result<(), SearchError> {
        let response = self.client.get(self.route("ping")?).send().await?;
        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "remote-index".to_string(),
                details: format!("ping returned {}", response.status()),
            });
        }
        Ok(())
    }

    async fn search(
        &self,
        query: &str,
        document_ids: Option<&[String]>,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let response = self
            .client
            .post(self.route("search")?)
            .json(&RemoteSearchRequest {
                query,
                document_ids,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "remote-index".to_string(),
                details: format!("search returned {}", response.status()),
            });
        }
        let body: RemoteSearchResponse = response.json().await?;
        Ok(body.results)
    }
}
