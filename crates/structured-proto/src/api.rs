//! Request/response capability traits and the closed set of tagged variants.
//!
//! Each method has a concrete request record and a concrete response record.
//! [`TableRequest`] and [`TableResponse`] tie the two together at the type
//! level, while [`StructuredRequest`] and [`StructuredResponse`] carry them
//! through code that routes on the method at run time. Both views are
//! generated from a single method table, so the pairing cannot drift.

use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::{CodecError, Encoding};
use crate::header::{RequestHeader, ResponseHeader};
use crate::messages::{
    BatchTableRequest, BatchTableResponse, ConditionalPutTableRowRequest,
    ConditionalPutTableRowResponse, CreateTableRequest, CreateTableResponse,
    DeleteTableRowRangeRequest, DeleteTableRowRangeResponse, DeleteTableRowRequest,
    DeleteTableRowResponse, GetTableRowRequest, GetTableRowResponse, IncrementTableRowRequest,
    IncrementTableRowResponse, PutTableRowRequest, PutTableRowResponse, ScanTableRequest,
    ScanTableResponse,
};
use crate::method::Method;

/// Capabilities shared by every concrete request.
pub trait TableRequest:
    Debug
    + Clone
    + Default
    + PartialEq
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + Into<StructuredRequest>
    + 'static
{
    /// The only response type this request can produce.
    type Reply: TableResponse<Request = Self>;

    /// The method this request belongs to.
    const METHOD: Method;

    /// Returns the call metadata.
    fn header(&self) -> &RequestHeader;

    /// Returns the call metadata for modification.
    fn header_mut(&mut self) -> &mut RequestHeader;

    /// Returns the method of this request.
    fn method(&self) -> Method {
        Self::METHOD
    }

    /// Produces an empty reply of the matching type.
    fn create_reply(&self) -> Self::Reply {
        Self::Reply::default()
    }
}

/// Capabilities shared by every concrete response.
pub trait TableResponse:
    Debug
    + Clone
    + Default
    + PartialEq
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + Into<StructuredResponse>
    + TryFrom<StructuredResponse, Error = StructuredResponse>
    + 'static
{
    /// The request type that produces this response.
    type Request: TableRequest<Reply = Self>;

    /// Returns the call metadata.
    fn header(&self) -> &ResponseHeader;

    /// Returns the call metadata for modification.
    fn header_mut(&mut self) -> &mut ResponseHeader;

    /// Checks that this reply is structurally compatible with `request`.
    ///
    /// # Errors
    ///
    /// Returns [`ReplyMismatch`] describing the first incompatibility.
    fn verify(&self, request: &Self::Request) -> Result<(), ReplyMismatch>;
}

/// A reply that does not fit the request it answers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplyMismatch {
    /// The reply belongs to another method.
    #[error("reply for {actual} does not answer a {expected} request")]
    WrongMethod {
        /// Method of the request.
        expected: Method,
        /// Method of the reply.
        actual: Method,
    },
    /// The reply names another row.
    #[error("reply names row '{actual}' but '{expected}' was requested")]
    UnexpectedRow {
        /// Requested row key.
        expected: String,
        /// Row key in the reply.
        actual: String,
    },
    /// The reply carries a column that was not requested.
    #[error("reply carries unrequested column '{column}'")]
    UnrequestedColumn {
        /// Offending column.
        column: String,
    },
    /// A scanned row lies outside the requested range.
    #[error("row '{row}' lies outside the scanned range")]
    RowOutOfRange {
        /// Offending row key.
        row: String,
    },
    /// Scanned rows are not in strictly increasing key order.
    #[error("row '{row}' is out of key order")]
    RowsOutOfOrder {
        /// First row key out of order.
        row: String,
    },
    /// A scan returned more rows than allowed.
    #[error("scan returned {actual} rows but at most {limit} were requested")]
    TooManyRows {
        /// Requested maximum.
        limit: u64,
        /// Rows returned.
        actual: u64,
    },
    /// An increment reply does not cover exactly the incremented columns.
    #[error("increment reply covers {actual} columns but {expected} were incremented")]
    IncrementColumns {
        /// Columns incremented.
        expected: usize,
        /// Columns returned.
        actual: usize,
    },
    /// A batch reply has the wrong number of results.
    #[error("batch reply has {actual} results for {expected} commands")]
    ResultCount {
        /// Commands submitted.
        expected: usize,
        /// Results returned.
        actual: usize,
    },
    /// A batch result does not fit its command.
    #[error("batch result {index}: {source}")]
    BatchResult {
        /// Position of the command in the batch.
        index: usize,
        /// Mismatch of that result.
        #[source]
        source: Box<ReplyMismatch>,
    },
}

impl ReplyMismatch {
    /// Checks that a reply method answers a request method.
    ///
    /// # Errors
    ///
    /// Returns [`ReplyMismatch::WrongMethod`] when the two differ.
    pub fn check_method(expected: Method, actual: Method) -> Result<(), Self> {
        if expected == actual {
            Ok(())
        } else {
            Err(Self::WrongMethod { expected, actual })
        }
    }
}

macro_rules! structured_methods {
    ($($method:ident => $request:ident, $response:ident;)+) => {
        /// A request of any method, tagged by method.
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        pub enum StructuredRequest {
            $(
                #[doc = concat!("A `", stringify!($method), "` request.")]
                $method($request),
            )+
        }

        /// A response of any method, tagged by method.
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        pub enum StructuredResponse {
            $(
                #[doc = concat!("A `", stringify!($method), "` response.")]
                $method($response),
            )+
        }

        impl StructuredRequest {
            /// Allocates an empty request of the given method.
            #[must_use]
            pub fn empty(method: Method) -> Self {
                match method {
                    $(Method::$method => Self::$method($request::default()),)+
                }
            }

            /// Returns the method of the wrapped request.
            #[must_use]
            pub fn method(&self) -> Method {
                match self {
                    $(Self::$method(_) => Method::$method,)+
                }
            }

            /// Returns the call metadata.
            #[must_use]
            pub fn header(&self) -> &RequestHeader {
                match self {
                    $(Self::$method(inner) => inner.header(),)+
                }
            }

            /// Returns the call metadata for modification.
            pub fn header_mut(&mut self) -> &mut RequestHeader {
                match self {
                    $(Self::$method(inner) => inner.header_mut(),)+
                }
            }

            /// Produces an empty reply of the matching method.
            #[must_use]
            pub fn create_reply(&self) -> StructuredResponse {
                match self {
                    $(Self::$method(inner) => StructuredResponse::$method(inner.create_reply()),)+
                }
            }

            /// Replaces the wrapped request with one decoded from `bytes`,
            /// keeping the method.
            ///
            /// # Errors
            ///
            /// Returns [`CodecError`] when `bytes` is not a valid request of
            /// this method under `encoding`.
            pub fn decode_in_place(
                &mut self,
                encoding: Encoding,
                bytes: &[u8],
            ) -> Result<(), CodecError> {
                match self {
                    $(Self::$method(inner) => *inner = encoding.decode(bytes)?,)+
                }
                Ok(())
            }

            /// Encodes the wrapped request without the method tag.
            ///
            /// # Errors
            ///
            /// Returns [`CodecError`] when serialisation fails.
            pub fn encode(&self, encoding: Encoding) -> Result<Vec<u8>, CodecError> {
                match self {
                    $(Self::$method(inner) => encoding.encode(inner),)+
                }
            }
        }

        impl StructuredResponse {
            /// Allocates an empty response of the given method.
            #[must_use]
            pub fn empty(method: Method) -> Self {
                match method {
                    $(Method::$method => Self::$method($response::default()),)+
                }
            }

            /// Returns the method of the wrapped response.
            #[must_use]
            pub fn method(&self) -> Method {
                match self {
                    $(Self::$method(_) => Method::$method,)+
                }
            }

            /// Returns the call metadata.
            #[must_use]
            pub fn header(&self) -> &ResponseHeader {
                match self {
                    $(Self::$method(inner) => inner.header(),)+
                }
            }

            /// Returns the call metadata for modification.
            pub fn header_mut(&mut self) -> &mut ResponseHeader {
                match self {
                    $(Self::$method(inner) => inner.header_mut(),)+
                }
            }

            /// Checks that this reply is structurally compatible with
            /// `request`, including that both belong to the same method.
            ///
            /// # Errors
            ///
            /// Returns [`ReplyMismatch`] describing the first incompatibility.
            pub fn verify(&self, request: &StructuredRequest) -> Result<(), ReplyMismatch> {
                match (self, request) {
                    $((Self::$method(reply), StructuredRequest::$method(args)) => reply.verify(args),)+
                    (reply, args) => ReplyMismatch::check_method(args.method(), reply.method()),
                }
            }

            /// Replaces the wrapped response with one decoded from `bytes`,
            /// keeping the method.
            ///
            /// # Errors
            ///
            /// Returns [`CodecError`] when `bytes` is not a valid response of
            /// this method under `encoding`.
            pub fn decode_in_place(
                &mut self,
                encoding: Encoding,
                bytes: &[u8],
            ) -> Result<(), CodecError> {
                match self {
                    $(Self::$method(inner) => *inner = encoding.decode(bytes)?,)+
                }
                Ok(())
            }

            /// Encodes the wrapped response without the method tag.
            ///
            /// # Errors
            ///
            /// Returns [`CodecError`] when serialisation fails.
            pub fn encode(&self, encoding: Encoding) -> Result<Vec<u8>, CodecError> {
                match self {
                    $(Self::$method(inner) => encoding.encode(inner),)+
                }
            }
        }

        $(
            impl TableRequest for $request {
                type Reply = $response;
                const METHOD: Method = Method::$method;

                fn header(&self) -> &RequestHeader {
                    &self.header
                }

                fn header_mut(&mut self) -> &mut RequestHeader {
                    &mut self.header
                }
            }

            impl TableResponse for $response {
                type Request = $request;

                fn header(&self) -> &ResponseHeader {
                    &self.header
                }

                fn header_mut(&mut self) -> &mut ResponseHeader {
                    &mut self.header
                }

                fn verify(&self, request: &$request) -> Result<(), ReplyMismatch> {
                    self.check(request)
                }
            }

            impl From<$request> for StructuredRequest {
                fn from(request: $request) -> Self {
                    Self::$method(request)
                }
            }

            impl From<$response> for StructuredResponse {
                fn from(response: $response) -> Self {
                    Self::$method(response)
                }
            }

            impl TryFrom<StructuredRequest> for $request {
                type Error = StructuredRequest;

                fn try_from(request: StructuredRequest) -> Result<Self, Self::Error> {
                    match request {
                        StructuredRequest::$method(inner) => Ok(inner),
                        other => Err(other),
                    }
                }
            }

            impl TryFrom<StructuredResponse> for $response {
                type Error = StructuredResponse;

                fn try_from(response: StructuredResponse) -> Result<Self, Self::Error> {
                    match response {
                        StructuredResponse::$method(inner) => Ok(inner),
                        other => Err(other),
                    }
                }
            }
        )+
    };
}

structured_methods! {
    CreateTable => CreateTableRequest, CreateTableResponse;
    GetTableRow => GetTableRowRequest, GetTableRowResponse;
    PutTableRow => PutTableRowRequest, PutTableRowResponse;
    ConditionalPutTableRow => ConditionalPutTableRowRequest, ConditionalPutTableRowResponse;
    IncrementTableRow => IncrementTableRowRequest, IncrementTableRowResponse;
    DeleteTableRow => DeleteTableRowRequest, DeleteTableRowResponse;
    DeleteTableRowRange => DeleteTableRowRangeRequest, DeleteTableRowRangeResponse;
    ScanTable => ScanTableRequest, ScanTableResponse;
    BatchTable => BatchTableRequest, BatchTableResponse;
}

/// One invocation: a request and the reply it will fill.
///
/// Built per call and dropped once the reply has been written back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredCall {
    /// Decoded arguments.
    pub args: StructuredRequest,
    /// Reply of the matching method.
    pub reply: StructuredResponse,
}

impl StructuredCall {
    /// Pairs `args` with a fresh reply of the matching method.
    #[must_use]
    pub fn new(args: StructuredRequest) -> Self {
        let reply = args.create_reply();
        Self { args, reply }
    }

    /// Allocates an empty call for `method`.
    #[must_use]
    pub fn empty(method: Method) -> Self {
        Self::new(StructuredRequest::empty(method))
    }

    /// Returns the method of the call.
    #[must_use]
    pub fn method(&self) -> Method {
        self.args.method()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn create_reply_matches_the_request_method(
        #[values(
            Method::CreateTable,
            Method::GetTableRow,
            Method::PutTableRow,
            Method::ConditionalPutTableRow,
            Method::IncrementTableRow,
            Method::DeleteTableRow,
            Method::DeleteTableRowRange,
            Method::ScanTable,
            Method::BatchTable
        )]
        method: Method,
    ) {
        let call = StructuredCall::empty(method);
        assert_eq!(call.method(), method);
        assert_eq!(call.reply.method(), method);
        assert_eq!(call.reply, StructuredResponse::empty(method));
        assert!(call.reply.header().is_ok());
    }

    #[test]
    fn typed_reply_is_the_associated_type() {
        let request = GetTableRowRequest::default();
        let reply: GetTableRowResponse = request.create_reply();
        assert_eq!(<GetTableRowRequest as TableRequest>::METHOD, Method::GetTableRow);
        assert_eq!(reply.verify(&request), Ok(()));
    }

    #[test]
    fn verify_rejects_replies_for_other_methods() {
        let request = StructuredRequest::empty(Method::PutTableRow);
        let reply = StructuredResponse::empty(Method::DeleteTableRow);
        assert_eq!(
            reply.verify(&request),
            Err(ReplyMismatch::WrongMethod {
                expected: Method::PutTableRow,
                actual: Method::DeleteTableRow,
            })
        );
    }

    #[test]
    fn try_from_returns_mismatched_variants() {
        let response = StructuredResponse::empty(Method::ScanTable);
        let result = GetTableRowResponse::try_from(response.clone());
        assert_eq!(result, Err(response));
    }

    #[test]
    fn decode_in_place_keeps_the_method() {
        let mut request = StructuredRequest::empty(Method::DeleteTableRow);
        request
            .decode_in_place(Encoding::Text, br#"{"table":"t","row":"r1"}"#)
            .expect("decode delete request");
        let StructuredRequest::DeleteTableRow(inner) = request else {
            panic!("method changed during decode");
        };
        assert_eq!(inner.row, "r1");
        assert_eq!(inner.table, "t");
    }
}
