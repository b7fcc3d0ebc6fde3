//! Content encodings accepted on the wire.
//!
//! Two encodings are allowed: a compact binary form (`postcard`) and a
//! human-readable text form (JSON). Both encode the same serde data model, so
//! a record decoded under one encoding re-encodes faithfully under the other.

use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Media type of the binary structured encoding.
pub const BINARY_MEDIA_TYPE: &str = "application/x-postcard";

/// Media type of the text structured encoding.
pub const TEXT_MEDIA_TYPE: &str = "application/json";

/// Alternative media type accepted for the text encoding.
pub const TEXT_MEDIA_TYPE_ALIAS: &str = "text/json";

/// An allowed payload encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// Compact binary structured encoding.
    Binary,
    /// Human-readable structured text encoding.
    Text,
}

impl Encoding {
    /// Every allowed encoding.
    pub const ALL: [Self; 2] = [Self::Binary, Self::Text];

    /// Returns the canonical media type.
    #[must_use]
    pub const fn media_type(self) -> &'static str {
        match self {
            Self::Binary => BINARY_MEDIA_TYPE,
            Self::Text => TEXT_MEDIA_TYPE,
        }
    }

    /// Resolves a media type, ignoring parameters such as `charset` and
    /// letter case. Returns `None` for anything outside the allow-list.
    #[must_use]
    pub fn from_media_type(raw: &str) -> Option<Self> {
        let essence = raw.split(';').next().unwrap_or_default().trim();
        if essence.eq_ignore_ascii_case(BINARY_MEDIA_TYPE) {
            Some(Self::Binary)
        } else if essence.eq_ignore_ascii_case(TEXT_MEDIA_TYPE)
            || essence.eq_ignore_ascii_case(TEXT_MEDIA_TYPE_ALIAS)
        {
            Some(Self::Text)
        } else {
            None
        }
    }

    /// Serialises `value`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] when the value cannot be represented.
    pub fn encode<T>(self, value: &T) -> Result<Vec<u8>, CodecError>
    where
        T: Serialize + ?Sized,
    {
        match self {
            Self::Binary => Ok(postcard::to_stdvec(value)?),
            Self::Text => Ok(serde_json::to_vec(value)?),
        }
    }

    /// Deserialises a value, rejecting trailing input.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] when `bytes` is malformed or does not describe a
    /// `T`.
    pub fn decode<T>(self, bytes: &[u8]) -> Result<T, CodecError>
    where
        T: DeserializeOwned,
    {
        match self {
            Self::Binary => {
                let (value, rest) = postcard::take_from_bytes(bytes)?;
                if rest.is_empty() {
                    Ok(value)
                } else {
                    Err(CodecError::TrailingBytes(rest.len()))
                }
            }
            Self::Text => Ok(serde_json::from_slice(bytes)?),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.media_type())
    }
}

/// Failure to encode or decode a payload.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The text encoding failed.
    #[error("text encoding: {0}")]
    Text(#[from] serde_json::Error),
    /// The binary encoding failed.
    #[error("binary encoding: {0}")]
    Binary(#[from] postcard::Error),
    /// Binary input continued past the end of the value.
    #[error("binary encoding: {0} trailing bytes")]
    TrailingBytes(usize),
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::api::{StructuredCall, StructuredRequest, StructuredResponse};
    use crate::header::{ApiError, ErrorClass, RequestHeader};
    use crate::header::ResponseHeader;
    use crate::messages::{
        BatchTableRequest, BatchTableResponse, ConditionalPutTableRowRequest,
        ConditionalPutTableRowResponse, CreateTableRequest, CreateTableResponse,
        DeleteTableRowRangeRequest, DeleteTableRowRangeResponse, DeleteTableRowRequest,
        DeleteTableRowResponse, GetTableRowRequest, GetTableRowResponse, IncrementTableRowRequest,
        IncrementTableRowResponse, PutTableRowRequest, PutTableRowResponse, ScanTableRequest,
        ScanTableResponse,
    };
    use crate::method::Method;
    use crate::table::{ColumnSchema, ColumnType, Row, TableSchema, Value};

    #[rstest]
    #[case("application/json", Some(Encoding::Text))]
    #[case("Application/JSON; charset=utf-8", Some(Encoding::Text))]
    #[case("text/json", Some(Encoding::Text))]
    #[case("application/x-postcard", Some(Encoding::Binary))]
    #[case("application/x-protobuf", None)]
    #[case("text/plain", None)]
    #[case("", None)]
    fn media_types_follow_the_allow_list(#[case] raw: &str, #[case] expected: Option<Encoding>) {
        assert_eq!(Encoding::from_media_type(raw), expected);
    }

    fn sample_batch() -> StructuredRequest {
        let conditional = ConditionalPutTableRowRequest {
            header: RequestHeader::for_user("alice"),
            table: "accounts".to_owned(),
            row: "r1".to_owned(),
            columns: [("balance".to_owned(), Value::Integer(10))].into(),
            expected: [
                ("balance".to_owned(), Some(Value::Integer(5))),
                ("frozen".to_owned(), None),
            ]
            .into(),
        };
        let scan = ScanTableRequest {
            table: "accounts".to_owned(),
            start_row: "a".to_owned(),
            end_row: "m".to_owned(),
            columns: vec!["balance".to_owned()],
            max_results: 10,
            ..ScanTableRequest::default()
        };
        BatchTableRequest {
            header: RequestHeader {
                user: "alice".to_owned(),
                timestamp: 42,
            },
            commands: vec![conditional.into(), scan.into()],
        }
        .into()
    }

    #[rstest]
    fn nested_batches_survive_both_encodings(
        #[values(Encoding::Binary, Encoding::Text)] encoding: Encoding,
    ) {
        let original = sample_batch();
        let bytes = original.encode(encoding).expect("encode batch");
        let mut decoded = StructuredRequest::empty(Method::BatchTable);
        decoded
            .decode_in_place(encoding, &bytes)
            .expect("decode batch");
        assert_eq!(decoded, original);
    }

    fn mixed_row(key: &str) -> Row {
        Row::new(
            key,
            [
                ("blob", Value::Bytes(vec![0, 255, 7])),
                ("name", Value::from("ada")),
                ("count", Value::Integer(i64::MIN)),
                ("live", Value::Bool(true)),
            ],
        )
    }

    fn answered(timestamp: i64) -> ResponseHeader {
        ResponseHeader {
            timestamp,
            error: None,
        }
    }

    /// A request and a reply for `method` with every field populated.
    fn populated(method: Method) -> (StructuredRequest, StructuredResponse) {
        let header = RequestHeader {
            user: "alice".to_owned(),
            timestamp: -3,
        };
        match method {
            Method::CreateTable => (
                CreateTableRequest {
                    header,
                    schema: TableSchema {
                        name: "accounts".to_owned(),
                        columns: [
                            ("blob", ColumnType::Bytes),
                            ("name", ColumnType::String),
                            ("count", ColumnType::Integer),
                            ("live", ColumnType::Bool),
                        ]
                        .into_iter()
                        .map(|(name, kind)| ColumnSchema {
                            name: name.to_owned(),
                            kind,
                        })
                        .collect(),
                    },
                }
                .into(),
                CreateTableResponse {
                    header: answered(1),
                }
                .into(),
            ),
            Method::GetTableRow => (
                GetTableRowRequest {
                    header,
                    table: "accounts".to_owned(),
                    row: "r1".to_owned(),
                    columns: vec!["blob".to_owned(), "live".to_owned()],
                }
                .into(),
                GetTableRowResponse {
                    header: answered(2),
                    row: Some(mixed_row("r1")),
                }
                .into(),
            ),
            Method::PutTableRow => (
                PutTableRowRequest {
                    header,
                    table: "accounts".to_owned(),
                    row: "r1".to_owned(),
                    columns: mixed_row("r1").columns,
                }
                .into(),
                PutTableRowResponse {
                    header: answered(3),
                }
                .into(),
            ),
            Method::ConditionalPutTableRow => (
                ConditionalPutTableRowRequest {
                    header,
                    table: "accounts".to_owned(),
                    row: "r1".to_owned(),
                    columns: mixed_row("r1").columns,
                    expected: [
                        ("live".to_owned(), Some(Value::Bool(false))),
                        ("name".to_owned(), None),
                    ]
                    .into(),
                }
                .into(),
                ConditionalPutTableRowResponse {
                    header: answered(4),
                    actual: Some(mixed_row("r1")),
                }
                .into(),
            ),
            Method::IncrementTableRow => (
                IncrementTableRowRequest {
                    header,
                    table: "accounts".to_owned(),
                    row: "r1".to_owned(),
                    increments: [("count".to_owned(), -17), ("floor".to_owned(), i64::MIN)].into(),
                }
                .into(),
                IncrementTableRowResponse {
                    header: answered(5),
                    columns: [("count".to_owned(), -12), ("floor".to_owned(), i64::MIN)].into(),
                }
                .into(),
            ),
            Method::DeleteTableRow => (
                DeleteTableRowRequest {
                    header,
                    table: "accounts".to_owned(),
                    row: "r1".to_owned(),
                }
                .into(),
                DeleteTableRowResponse {
                    header: answered(6),
                }
                .into(),
            ),
            Method::DeleteTableRowRange => (
                DeleteTableRowRangeRequest {
                    header,
                    table: "accounts".to_owned(),
                    start_row: "a".to_owned(),
                    end_row: "m".to_owned(),
                }
                .into(),
                DeleteTableRowRangeResponse {
                    header: answered(7),
                    deleted: u64::MAX,
                }
                .into(),
            ),
            Method::ScanTable => (
                ScanTableRequest {
                    header,
                    table: "accounts".to_owned(),
                    start_row: "a".to_owned(),
                    end_row: String::new(),
                    columns: vec!["count".to_owned()],
                    max_results: 2,
                }
                .into(),
                ScanTableResponse {
                    header: answered(8),
                    rows: vec![mixed_row("a1"), mixed_row("b2")],
                }
                .into(),
            ),
            Method::BatchTable => {
                let (get, got) = populated(Method::GetTableRow);
                let (put, _) = populated(Method::PutTableRow);
                let mut failed = answered(9);
                failed.error = Some(ApiError::new(ErrorClass::NotFound, "no table 'accounts'"));
                (
                    BatchTableRequest {
                        header,
                        commands: vec![get, put],
                    }
                    .into(),
                    BatchTableResponse {
                        header: answered(9),
                        results: vec![got, PutTableRowResponse { header: failed }.into()],
                    }
                    .into(),
                )
            }
        }
    }

    #[rstest]
    fn every_method_survives_both_encodings(
        #[values(Encoding::Binary, Encoding::Text)] encoding: Encoding,
    ) {
        for method in Method::ALL {
            let (request, reply) = populated(method);
            let mut call = StructuredCall::empty(method);

            let bytes = request.encode(encoding).expect("encode request");
            call.args
                .decode_in_place(encoding, &bytes)
                .expect("decode request");
            assert_eq!(call.args, request, "{method} request");

            let bytes = reply.encode(encoding).expect("encode reply");
            call.reply
                .decode_in_place(encoding, &bytes)
                .expect("decode reply");
            assert_eq!(call.reply, reply, "{method} reply");
        }
    }

    #[rstest]
    fn responses_carry_errors_across_encodings(
        #[values(Encoding::Binary, Encoding::Text)] encoding: Encoding,
    ) {
        let mut reply = GetTableRowResponse {
            row: Some(Row::new("r1", [("c1", Value::Bytes(vec![0, 1, 2]))])),
            ..GetTableRowResponse::default()
        };
        reply.header.error = Some(ApiError::new(ErrorClass::Unavailable, "range offline"));
        let original = StructuredResponse::from(reply);
        let bytes = original.encode(encoding).expect("encode reply");
        let mut decoded = StructuredCall::empty(Method::GetTableRow).reply;
        decoded
            .decode_in_place(encoding, &bytes)
            .expect("decode reply");
        assert_eq!(decoded, original);
    }

    #[test]
    fn binary_decode_rejects_trailing_bytes() {
        let mut bytes = Encoding::Binary
            .encode(&RequestHeader::default())
            .expect("encode header");
        bytes.push(0);
        let error = Encoding::Binary
            .decode::<RequestHeader>(&bytes)
            .expect_err("trailing byte");
        assert!(matches!(error, CodecError::TrailingBytes(1)));
    }

    #[test]
    fn text_decode_fills_omitted_fields_with_defaults() {
        let request: ScanTableRequest = Encoding::Text
            .decode(br#"{"start_row":"a"}"#)
            .expect("decode scan");
        assert_eq!(request.table, "");
        assert_eq!(request.max_results, 0);
        assert_eq!(request.header, RequestHeader::default());
    }
}
