//! Page aggregation over the paginated query API.
//!
//! Queries in one call run concurrently; pages within one query are
//! strictly sequential so result order is preserved and the declared
//! total is known before the next page is requested.

use tracing::{debug, instrument};

use contentmirror_shared::{ContentMirrorError, Document, Query, Ref, Result};

use crate::{Client, QueryOptions};

/// Fixed page size for all aggregating queries.
pub const QUERY_PAGE_SIZE: usize = 100;

/// Caller-supplied options shared by every page of a fetch.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Link fields to resolve server-side.
    pub fetch_links: Vec<String>,
    /// Language filter; `None` fetches all languages.
    pub lang: Option<String>,
}

impl FetchOptions {
    fn page_options<'a>(&'a self, target_ref: &'a Ref, page: u32) -> QueryOptions<'a> {
        QueryOptions {
            target_ref,
            page,
            page_size: QUERY_PAGE_SIZE,
            fetch_links: &self.fetch_links,
            lang: self.lang.as_deref(),
        }
    }
}

/// Fetch every document matched by `queries` at `target_ref`.
///
/// Per-query page lists are concatenated in query submission order, each
/// internally in page order. Results are not deduplicated across
/// queries. Any page failure aborts the whole call; partial results are
/// discarded.
#[instrument(skip_all, fields(queries = queries.len(), target_ref = %target_ref))]
pub async fn fetch_all(
    client: &Client,
    queries: &[Query],
    target_ref: &Ref,
    options: &FetchOptions,
) -> Result<Vec<Document>> {
    let mut handles = Vec::with_capacity(queries.len());

    for query in queries {
        let client = client.clone();
        let query = query.clone();
        let target_ref = target_ref.clone();
        let options = options.clone();

        handles.push(tokio::spawn(async move {
            aggregate_query(&client, &query, &target_ref, &options).await
        }));
    }

    // Awaiting in submission order keeps the concatenation deterministic
    // even though the tasks run concurrently.
    let mut documents = Vec::new();
    for handle in handles {
        let per_query = handle
            .await
            .map_err(|e| ContentMirrorError::Transport(format!("fetch task failed: {e}")))??;
        documents.extend(per_query);
    }

    debug!(documents = documents.len(), "fetch complete");
    Ok(documents)
}

/// Sequentially walk the pages of one query, accumulating results in
/// page order.
///
/// The server-declared `total_results_size` is the primary termination
/// signal; a page shorter than the requested size also terminates the
/// walk so a lying server cannot loop us forever.
async fn aggregate_query(
    client: &Client,
    query: &Query,
    target_ref: &Ref,
    options: &FetchOptions,
) -> Result<Vec<Document>> {
    let mut page: u32 = 1;
    let mut documents = Vec::new();

    loop {
        let response = client
            .query(
                std::slice::from_ref(query),
                &options.page_options(target_ref, page),
            )
            .await?;

        let received = response.results.len();
        documents.extend(response.results);

        debug!(
            page,
            received,
            total = response.total_results_size,
            "aggregated results page"
        );

        if !below_total(page, response.total_results_size) || received < QUERY_PAGE_SIZE {
            break;
        }
        page += 1;
    }

    Ok(documents)
}

/// Fetch the documents with the given IDs at `target_ref`, aggregating
/// pages of the by-IDs query. An empty ID set returns immediately
/// without touching the network.
#[instrument(skip_all, fields(ids = ids.len(), target_ref = %target_ref))]
pub async fn fetch_by_ids(
    client: &Client,
    ids: &[String],
    target_ref: &Ref,
    options: &FetchOptions,
) -> Result<Vec<Document>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut page: u32 = 1;
    let mut documents = Vec::new();

    loop {
        let response = client
            .get_by_ids(ids, &options.page_options(target_ref, page))
            .await?;

        let received = response.results.len();
        documents.extend(response.results);

        if !below_total(page, response.total_results_size) || received < QUERY_PAGE_SIZE {
            break;
        }
        page += 1;
    }

    Ok(documents)
}

/// Whether pages fetched so far cover less than the declared total.
fn below_total(page: u32, total_results_size: usize) -> bool {
    (page as usize) * QUERY_PAGE_SIZE < total_results_size
}
