//! Query building, compilation and responses

pub mod builder;
pub mod document;
pub mod response;

pub use builder::{QueryOntologyCatalog, QuerySequence, QueryTopic, ONTOLOGY_TAG_KEY};
pub use document::{CanonicalQueryDocument, Query, QueryBuilder};
pub use response::{QueryResponse, QueryResponseItem};

use tracing::debug;

use crate::error::Result;
use crate::transport::Transport;

/// Compile `query`, submit it, and normalize the rows that come back
pub fn query<T: Transport + ?Sized>(transport: &T, query: &Query) -> Result<QueryResponse> {
    let document = query.compile();
    debug!(document = %document, "submitting query");
    let rows = transport.submit_query(&document)?;
    let response = QueryResponse::from_rows(rows)?;
    debug!(items = response.len(), "query returned");
    Ok(response)
}
