//! HTTP client for the remote content repository API.
//!
//! Wraps the repository's query endpoints behind [`Client`] and provides
//! the two fetch-side algorithms built on top of it:
//! - [`fetch::fetch_all`] / [`fetch::fetch_by_ids`] — page aggregation
//! - [`refs::resolve_ref`] — ref selection (explicit > release > master)

mod fetch;
mod refs;

use std::time::Duration;

use reqwest::redirect::Policy;
use tracing::debug;
use url::Url;

use contentmirror_shared::{
    ApiInfo, ContentMirrorError, Query, QueryResponse, Ref, ReleaseId, RepositoryConfig, Result,
};

pub use fetch::{FetchOptions, QUERY_PAGE_SIZE, fetch_all, fetch_by_ids};
pub use refs::resolve_ref;

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("ContentMirror/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Query options
// ---------------------------------------------------------------------------

/// Per-request parameters for one page of a query.
#[derive(Debug, Clone, Copy)]
pub struct QueryOptions<'a> {
    /// Snapshot all results must be consistent with.
    pub target_ref: &'a Ref,
    /// 1-based page number.
    pub page: u32,
    /// Requested page size.
    pub page_size: usize,
    /// Link fields to resolve server-side.
    pub fetch_links: &'a [String],
    /// Language filter; `None` fetches all languages.
    pub lang: Option<&'a str>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// A client bound to one remote repository.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    endpoint: Url,
    search_endpoint: Url,
    access_token: Option<String>,
    release_id: Option<ReleaseId>,
}

impl Client {
    /// Create a client for the given repository configuration.
    pub fn new(repository: &RepositoryConfig, endpoint_template: &str) -> Result<Self> {
        let endpoint = repository.endpoint_url(endpoint_template)?;
        let search_endpoint = join_path(&endpoint, "documents/search")?;
        let access_token = repository.access_token()?;

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(Policy::limited(5))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                ContentMirrorError::Transport(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            http,
            endpoint,
            search_endpoint,
            access_token,
            release_id: repository.release_id.clone(),
        })
    }

    /// The staged release this client is configured to target, if any.
    pub fn release_id(&self) -> Option<&ReleaseId> {
        self.release_id.as_ref()
    }

    /// Override the access token (for mock-server tests without env vars).
    #[cfg(test)]
    pub(crate) fn with_access_token(mut self, token: &str) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Fetch the repository's current ref descriptor.
    pub async fn api_info(&self) -> Result<ApiInfo> {
        debug!(endpoint = %self.endpoint, "fetching ref descriptor");

        let mut request = self.http.get(self.endpoint.clone());
        if let Some(token) = &self.access_token {
            request = request.query(&[("access_token", token.as_str())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ContentMirrorError::Transport(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ContentMirrorError::Transport(format!(
                "{}: HTTP {status}",
                self.endpoint
            )));
        }

        response
            .json::<ApiInfo>()
            .await
            .map_err(|e| ContentMirrorError::Transport(format!("{}: {e}", self.endpoint)))
    }

    /// Request one page of a predicate-filtered query.
    pub async fn query(
        &self,
        predicates: &[Query],
        options: &QueryOptions<'_>,
    ) -> Result<QueryResponse> {
        let mut request = self
            .http
            .get(self.search_endpoint.clone())
            .query(&[("ref", options.target_ref.as_str())])
            .query(&[("page", options.page.to_string())])
            .query(&[("pageSize", options.page_size.to_string())]);

        for predicate in predicates {
            request = request.query(&[("q", predicate.as_str())]);
        }
        if !options.fetch_links.is_empty() {
            request = request.query(&[("fetchLinks", options.fetch_links.join(","))]);
        }
        if let Some(lang) = options.lang {
            request = request.query(&[("lang", lang)]);
        }
        if let Some(token) = &self.access_token {
            request = request.query(&[("access_token", token.as_str())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ContentMirrorError::Transport(format!("{}: {e}", self.search_endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ContentMirrorError::Transport(format!(
                "{}: HTTP {status}",
                self.search_endpoint
            )));
        }

        response
            .json::<QueryResponse>()
            .await
            .map_err(|e| ContentMirrorError::Transport(format!("{}: {e}", self.search_endpoint)))
    }

    /// Request one page of the by-IDs query.
    pub async fn get_by_ids(
        &self,
        ids: &[String],
        options: &QueryOptions<'_>,
    ) -> Result<QueryResponse> {
        let predicate = Query::new(ids_predicate(ids));
        self.query(std::slice::from_ref(&predicate), options).await
    }
}

/// Build the server-side `in`-predicate selecting a set of document IDs.
fn ids_predicate(ids: &[String]) -> String {
    // serde_json handles quoting/escaping of the ID list.
    let list = serde_json::to_string(ids).unwrap_or_else(|_| "[]".into());
    format!("[in(document.id, {list})]")
}

/// Join a sub-path onto an endpoint URL, tolerating a trailing slash.
fn join_path(endpoint: &Url, path: &str) -> Result<Url> {
    let base = endpoint.as_str().trim_end_matches('/');
    Url::parse(&format!("{base}/{path}")).map_err(|e| {
        ContentMirrorError::config(format!("invalid endpoint '{endpoint}': {e}"))
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use contentmirror_shared::RepositoryConfig;

    use super::Client;

    /// Client pointed at a mock server base URL.
    pub(crate) fn client_for(endpoint: &str) -> Client {
        let repository = RepositoryConfig {
            name: "test-repo".into(),
            endpoint: Some(endpoint.into()),
            access_token_env: None,
            release_id: None,
            fetch_links: vec![],
            lang: None,
            predicates: vec![],
            schemas_dir: None,
        };
        Client::new(&repository, "https://{repository}.invalid/api/v2").expect("build client")
    }

    /// Same, but configured to target a staged release.
    pub(crate) fn client_with_release(endpoint: &str, release: &str) -> Client {
        let repository = RepositoryConfig {
            name: "test-repo".into(),
            endpoint: Some(endpoint.into()),
            access_token_env: None,
            release_id: Some(contentmirror_shared::ReleaseId::new(release)),
            fetch_links: vec![],
            lang: None,
            predicates: vec![],
            schemas_dir: None,
        };
        Client::new(&repository, "https://{repository}.invalid/api/v2").expect("build client")
    }

    /// JSON body for one document with the given ID.
    pub(crate) fn doc_json(id: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "type": "page",
            "lang": "en-us",
            "tags": [],
            "data": {}
        })
    }

    /// JSON body for one query response page.
    pub(crate) fn page_json(
        page: u32,
        page_size: usize,
        total: usize,
        results: Vec<serde_json::Value>,
    ) -> serde_json::Value {
        let total_pages = total.div_ceil(page_size) as u32;
        serde_json::json!({
            "page": page,
            "results_per_page": page_size,
            "results_size": results.len(),
            "total_results_size": total,
            "total_pages": total_pages,
            "results": results
        })
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use contentmirror_shared::Ref;

    use super::test_support::{client_for, doc_json, page_json};
    use super::*;

    #[test]
    fn ids_predicate_quotes_and_joins() {
        let ids = vec!["a".to_string(), "b".to_string()];
        assert_eq!(ids_predicate(&ids), r#"[in(document.id, ["a","b"])]"#);
    }

    #[test]
    fn join_path_tolerates_trailing_slash() {
        let with_slash = Url::parse("http://localhost:9090/api/v2/").unwrap();
        let without = Url::parse("http://localhost:9090/api/v2").unwrap();
        assert_eq!(
            join_path(&with_slash, "documents/search").unwrap(),
            join_path(&without, "documents/search").unwrap()
        );
    }

    #[tokio::test]
    async fn query_forwards_parameters() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v2/documents/search"))
            .and(query_param("ref", "tok-master"))
            .and(query_param("page", "1"))
            .and(query_param("pageSize", "100"))
            .and(query_param("q", "[at(document.type, \"page\")]"))
            .and(query_param("fetchLinks", "author.name,author.role"))
            .and(query_param("lang", "en-us"))
            .and(query_param("access_token", "tok-secret"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(page_json(1, 100, 1, vec![doc_json("doc-a")])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client =
            client_for(&format!("{}/api/v2", server.uri())).with_access_token("tok-secret");
        let target_ref = Ref::new("tok-master");
        let fetch_links = vec!["author.name".to_string(), "author.role".to_string()];
        let response = client
            .query(
                &[Query::new("[at(document.type, \"page\")]")],
                &QueryOptions {
                    target_ref: &target_ref,
                    page: 1,
                    page_size: 100,
                    fetch_links: &fetch_links,
                    lang: Some("en-us"),
                },
            )
            .await
            .expect("query");

        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].id, "doc-a");
    }

    #[tokio::test]
    async fn query_http_error_is_transport() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v2/documents/search"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = client_for(&format!("{}/api/v2", server.uri()));
        let target_ref = Ref::new("tok-master");
        let err = client
            .query(
                &[Query::new("[any]")],
                &QueryOptions {
                    target_ref: &target_ref,
                    page: 1,
                    page_size: 100,
                    fetch_links: &[],
                    lang: None,
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ContentMirrorError::Transport(_)));
        assert!(err.to_string().contains("503"));
    }
}
