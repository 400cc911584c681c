//! Request and response model shared by the session and retry layers
//!
//! The request pipeline hands these types to the core: a `DocumentRequest`
//! describes the outgoing operation, `headers` names the server-contract
//! response headers the session container reads back.

use std::collections::HashMap;

/// Server-contract response header names
pub mod headers {
    /// Per-partition session token: `"<partitionRangeId>:<vectorToken>"`
    pub const SESSION_TOKEN: &str = "x-ms-session-token";
    /// Full name (address path) of the collection that produced the response
    pub const OWNER_FULL_NAME: &str = "x-ms-alt-content-path";
    /// Numeric resource id of the collection that produced the response
    pub const OWNER_ID: &str = "x-ms-content-path";
    /// Server-suggested delay, in milliseconds, after a throttled response
    pub const RETRY_AFTER_MS: &str = "x-ms-retry-after-ms";
}

/// String-keyed response header map
pub type ResponseHeaders = HashMap<String, String>;

/// Operation requested against the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType {
    /// Create a resource
    Create,
    /// Point-read a resource
    Read,
    /// Read a feed (change feed / listing)
    ReadFeed,
    /// Execute a query
    Query,
    /// Replace a resource
    Replace,
    /// Create-or-replace a resource
    Upsert,
    /// Delete a resource
    Delete,
    /// Partially update a resource
    Patch,
    /// Transactional batch
    Batch,
    /// Execute a stored procedure
    Execute,
    /// Metadata-only read
    Head,
    /// Metadata-only feed read
    HeadFeed,
}

impl OperationType {
    /// Whether this operation mutates service state
    pub fn is_write_operation(&self) -> bool {
        matches!(
            self,
            Self::Create
                | Self::Replace
                | Self::Upsert
                | Self::Delete
                | Self::Patch
                | Self::Batch
                | Self::Execute
        )
    }
}

/// Kind of resource a request addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    /// Database
    Database,
    /// Document collection (container)
    DocumentCollection,
    /// Document (data plane)
    Document,
    /// Document attachment (data plane)
    Attachment,
    /// Stored procedure
    StoredProcedure,
    /// Trigger
    Trigger,
    /// User-defined function
    UserDefinedFunction,
    /// Physical partition key range
    PartitionKeyRange,
    /// Throughput offer
    Offer,
    /// User
    User,
    /// Permission
    Permission,
}

impl ResourceType {
    /// Whether this resource lives on the master (metadata) partition.
    /// Master resources never populate or consult session tokens.
    pub fn is_master_resource(&self) -> bool {
        matches!(
            self,
            Self::Database
                | Self::DocumentCollection
                | Self::PartitionKeyRange
                | Self::Offer
                | Self::User
                | Self::Permission
        )
    }
}

/// A physical partition range of a collection, with its split lineage
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PartitionKeyRange {
    /// Range identifier as assigned by the service
    pub id: String,
    /// Ancestor range ids this range was split from, oldest first
    pub parents: Vec<String>,
}

impl PartitionKeyRange {
    /// Create a range with no split lineage
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parents: Vec::new(),
        }
    }

    /// Create a range with the given ancestor chain, oldest first
    pub fn with_parents(id: impl Into<String>, parents: Vec<String>) -> Self {
        Self {
            id: id.into(),
            parents,
        }
    }
}

/// Per-request routing context filled in by the address-resolution layer
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// The partition range the request was routed to, when resolved
    pub resolved_partition_key_range: Option<PartitionKeyRange>,
}

/// An outgoing request as seen by the session and retry layers
#[derive(Debug, Clone)]
pub struct DocumentRequest {
    /// Requested operation
    pub operation_type: OperationType,
    /// Addressed resource kind
    pub resource_type: ResourceType,
    /// Whether the request addresses the resource by name (address path)
    /// rather than by numeric resource id
    pub is_name_based: bool,
    /// Numeric resource id of the owning collection, when known
    pub resource_id: Option<u64>,
    /// Address path, e.g. `dbs/db1/colls/coll1/docs/doc1`
    pub resource_address: String,
    /// Routing context
    pub context: RequestContext,
}

impl DocumentRequest {
    /// Create a name-based request for the given address path
    pub fn name_based(
        operation_type: OperationType,
        resource_type: ResourceType,
        resource_address: impl Into<String>,
    ) -> Self {
        Self {
            operation_type,
            resource_type,
            is_name_based: true,
            resource_id: None,
            resource_address: resource_address.into(),
            context: RequestContext::default(),
        }
    }

    /// Create a resource-id-based request for the given collection rid
    pub fn rid_based(
        operation_type: OperationType,
        resource_type: ResourceType,
        resource_id: u64,
    ) -> Self {
        Self {
            operation_type,
            resource_type,
            is_name_based: false,
            resource_id: Some(resource_id),
            resource_address: String::new(),
            context: RequestContext::default(),
        }
    }

    /// Attach a known collection rid (e.g. from a previous response)
    pub fn with_resource_id(mut self, resource_id: u64) -> Self {
        self.resource_id = Some(resource_id);
        self
    }

    /// Attach the resolved partition range for routing
    pub fn with_partition_key_range(mut self, range: PartitionKeyRange) -> Self {
        self.context.resolved_partition_key_range = Some(range);
        self
    }

    /// Collection portion of the address path: `dbs/{db}/colls/{coll}`,
    /// with any document-level suffix trimmed off
    pub fn collection_path(&self) -> &str {
        collection_path_of(&self.resource_address)
    }
}

/// Trim an address path down to its `dbs/{db}/colls/{coll}` prefix.
/// Paths shorter than a collection address are returned unchanged.
pub(crate) fn collection_path_of(address: &str) -> &str {
    let trimmed = address.trim_start_matches('/');
    let mut slashes = 0;
    for (idx, byte) in trimmed.bytes().enumerate() {
        if byte == b'/' {
            slashes += 1;
            if slashes == 4 {
                return &trimmed[..idx];
            }
        }
    }
    trimmed
}
