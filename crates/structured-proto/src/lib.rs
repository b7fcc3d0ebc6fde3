//! Wire model of the structured table API.
//!
//! The API is a closed set of [`Method`]s. Every method owns one request
//! record and one response record; both embed a header, and the response
//! header carries the application-level [`ApiError`] when a call fails. The
//! records are plain serde data and travel under either [`Encoding`].
//!
//! Code that knows the method statically works with the concrete records
//! through [`TableRequest`] and [`TableResponse`]. Code that routes on a
//! method name at run time works with [`StructuredRequest`],
//! [`StructuredResponse`] and [`StructuredCall`].

mod api;
mod codec;
mod header;
mod messages;
mod method;
mod table;

pub use api::{
    ReplyMismatch, StructuredCall, StructuredRequest, StructuredResponse, TableRequest,
    TableResponse,
};
pub use codec::{
    BINARY_MEDIA_TYPE, CodecError, Encoding, TEXT_MEDIA_TYPE, TEXT_MEDIA_TYPE_ALIAS,
};
pub use header::{ApiError, ErrorClass, RequestHeader, ResponseHeader};
pub use messages::{
    BatchTableRequest, BatchTableResponse, ConditionalPutTableRowRequest,
    ConditionalPutTableRowResponse, CreateTableRequest, CreateTableResponse,
    DeleteTableRowRangeRequest, DeleteTableRowRangeResponse, DeleteTableRowRequest,
    DeleteTableRowResponse, GetTableRowRequest, GetTableRowResponse, IncrementTableRowRequest,
    IncrementTableRowResponse, PutTableRowRequest, PutTableRowResponse, ScanTableRequest,
    ScanTableResponse,
};
pub use method::{Method, UnknownMethod};
pub use table::{ColumnSchema, ColumnType, Columns, Row, TableSchema, Value, key_in_range};
