//! Session token container
//!
//! Process-wide cache of the session tokens a client has observed, keyed by
//! collection. A collection is identified primarily by its numeric resource
//! id; full names are aliases resolved lazily from the owner headers of the
//! first response, so lookups keep working when a request addresses the
//! collection by name. Token writes merge (pointwise max) under a per-key
//! entry lock, so the cached token for a partition range never regresses
//! even when responses race.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, warn};

use crate::Result;
use crate::request::{DocumentRequest, ResponseHeaders, headers};

pub mod vector_token;

pub use vector_token::VectorSessionToken;

/// Per-process session token cache
///
/// Shared by every in-flight request of one client instance. Entries are
/// created on the first response carrying a session token for a collection
/// and live until the collection is explicitly cleared.
#[derive(Debug, Default)]
pub struct SessionContainer {
    /// Collection full name -> numeric resource id. First write wins: the
    /// id association for a name is fixed once established.
    collection_name_to_rid: DashMap<String, u64>,
    /// Numeric resource id -> (partition range id -> token)
    rid_to_tokens: DashMap<u64, DashMap<String, VectorSessionToken>>,
}

impl SessionContainer {
    /// Create an empty container
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the session token a response carried, resolving the owning
    /// collection from the request and the owner headers.
    ///
    /// No-op when the response has no session-token header or the request
    /// addresses a master resource (master queries never populate session
    /// tokens). Name-based requests trust the owner headers over their own
    /// address; rid-based requests always use their own resource id.
    pub fn set_session_token(
        &self,
        request: &DocumentRequest,
        response_headers: &ResponseHeaders,
    ) -> Result<()> {
        let Some(raw_token) = response_headers.get(headers::SESSION_TOKEN) else {
            return Ok(());
        };
        if request.resource_type.is_master_resource() {
            return Ok(());
        }

        let full_name = response_headers
            .get(headers::OWNER_FULL_NAME)
            .map(String::as_str)
            .unwrap_or_else(|| request.collection_path());

        let owner_rid = if request.is_name_based {
            response_headers
                .get(headers::OWNER_ID)
                .and_then(|raw| match raw.parse::<u64>() {
                    Ok(rid) => Some(rid),
                    Err(_) => {
                        warn!(owner_id = %raw, "ignoring unparseable owner-id header");
                        None
                    }
                })
                .or(request.resource_id)
        } else {
            request.resource_id
        };

        let Some(rid) = owner_rid else {
            warn!(
                collection = %full_name,
                "response carried a session token but no resolvable collection rid"
            );
            return Ok(());
        };

        self.record_session_token(rid, full_name, raw_token)
    }

    /// Record a session token when the collection identity is already known,
    /// bypassing owner-header resolution. A missing session-token header is
    /// a no-op.
    pub fn set_session_token_direct(
        &self,
        collection_rid: u64,
        collection_full_name: &str,
        response_headers: &ResponseHeaders,
    ) -> Result<()> {
        let Some(raw_token) = response_headers.get(headers::SESSION_TOKEN) else {
            return Ok(());
        };
        self.record_session_token(collection_rid, collection_full_name, raw_token)
    }

    /// Token to attach for one partition range of the request's collection.
    ///
    /// Falls back through the resolved range's ancestor chain so reads keep
    /// their session guarantee across partition splits. Returns `None` when
    /// the collection or range is unknown at every level.
    pub fn resolve_partition_local_session_token(
        &self,
        request: &DocumentRequest,
        partition_key_range_id: &str,
    ) -> Option<VectorSessionToken> {
        let rid = self.resolve_collection_rid(request)?;
        let tokens = self.rid_to_tokens.get(&rid)?;

        if let Some(token) = tokens.get(partition_key_range_id) {
            return Some(token.value().clone());
        }

        let range = request.context.resolved_partition_key_range.as_ref()?;
        for parent in &range.parents {
            if let Some(token) = tokens.get(parent) {
                return Some(token.value().clone());
            }
        }
        None
    }

    /// Comma-joined `"rangeId:token"` list over every cached partition range
    /// of the request's collection; empty when the collection is unknown.
    pub fn resolve_global_session_token(&self, request: &DocumentRequest) -> String {
        let Some(rid) = self.resolve_collection_rid(request) else {
            return String::new();
        };
        let Some(tokens) = self.rid_to_tokens.get(&rid) else {
            return String::new();
        };
        tokens
            .iter()
            .map(|entry| format!("{}:{}", entry.key(), entry.value()))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Drop all cached tokens and aliases for the collection with this full
    /// name. Unrelated collections are untouched.
    pub fn clear_token_by_collection_full_name(&self, collection_full_name: &str) {
        let Some((_, rid)) = self.collection_name_to_rid.remove(collection_full_name) else {
            return;
        };
        self.clear_token_by_resource_id(rid);
    }

    /// Drop all cached tokens and aliases for the collection with this
    /// resource id. Unrelated collections are untouched.
    pub fn clear_token_by_resource_id(&self, collection_rid: u64) {
        self.collection_name_to_rid
            .retain(|_, rid| *rid != collection_rid);
        self.rid_to_tokens.remove(&collection_rid);
    }

    fn record_session_token(&self, rid: u64, full_name: &str, raw_token: &str) -> Result<()> {
        let Some((range_id, token_str)) = raw_token.split_once(':') else {
            warn!(token = %raw_token, "malformed session token header, expected 'rangeId:token'");
            return Ok(());
        };
        let Some(incoming) = VectorSessionToken::try_parse(token_str) else {
            warn!(token = %token_str, "unparseable vector session token in response header");
            return Ok(());
        };

        if !full_name.is_empty() {
            if let Entry::Vacant(entry) = self.collection_name_to_rid.entry(full_name.to_string())
            {
                debug!(collection = %full_name, rid, "recorded collection name alias");
                entry.insert(rid);
            }
        }

        let tokens = self.rid_to_tokens.entry(rid).or_default();
        // The entry holds the shard lock for this range id, making the
        // read-merge-write below atomic against concurrent responses.
        match tokens.entry(range_id.to_string()) {
            Entry::Occupied(mut entry) => {
                let merged = entry.get().merge(&incoming)?;
                if merged != *entry.get() {
                    *entry.get_mut() = merged;
                } else {
                    debug!(rid, range_id, "kept cached session token, incoming was stale");
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(incoming);
            }
        }
        Ok(())
    }

    /// Resource id first, full-name alias second.
    fn resolve_collection_rid(&self, request: &DocumentRequest) -> Option<u64> {
        if let Some(rid) = request.resource_id {
            return Some(rid);
        }
        self.collection_name_to_rid
            .get(request.collection_path())
            .map(|entry| *entry.value())
    }
}
