//! Pre-execution checks shared by every transport.
//!
//! A request that fails here never reaches the storage layer. Structural
//! checks always run; authorization runs only when an [`Authorizer`] is
//! attached.

use std::collections::BTreeSet;
use std::sync::Arc;

use structured_proto::{
    BatchTableRequest, Method, StructuredRequest, TableRequest, TableSchema,
};
use thiserror::Error;

use super::permissions::{Access, Authorizer};

/// Reasons a request is refused before execution.
#[derive(Debug, Error)]
pub enum VerificationError {
    /// The request is structurally malformed.
    #[error("invalid {method} request: {message}")]
    Invalid { method: Method, message: String },

    /// A sub-command of a batch failed verification.
    #[error("batch command {index}: {source}")]
    BatchCommand {
        index: usize,
        #[source]
        source: Box<VerificationError>,
    },

    /// The caller lacks the access the method needs.
    #[error("user '{user}' lacks {access} permission on table '{table}'")]
    PermissionDenied {
        user: String,
        table: String,
        access: Access,
    },

    /// The permission config could not be read.
    #[error("failed to read permissions for table '{table}': {message}")]
    PermissionLookup { table: String, message: String },
}

impl VerificationError {
    /// Creates a structural error.
    pub fn invalid(method: Method, message: impl Into<String>) -> Self {
        Self::Invalid {
            method,
            message: message.into(),
        }
    }

    /// Wraps the failure of the batch command at `index`.
    pub fn batch_command(index: usize, source: Self) -> Self {
        Self::BatchCommand {
            index,
            source: Box::new(source),
        }
    }

    /// Creates a permission-denied error.
    pub fn permission_denied(
        user: impl Into<String>,
        table: impl Into<String>,
        access: Access,
    ) -> Self {
        Self::PermissionDenied {
            user: user.into(),
            table: table.into(),
            access,
        }
    }

    /// Creates a permission lookup error.
    pub fn permission_lookup(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PermissionLookup {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Reports whether the caller caused the failure.
    ///
    /// Lookup failures lie with the daemon, so they are the one server-class
    /// outcome of verification.
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::Invalid { .. } | Self::PermissionDenied { .. } => true,
            Self::BatchCommand { source, .. } => source.is_client_error(),
            Self::PermissionLookup { .. } => false,
        }
    }
}

/// Runs structural and authorization checks on decoded requests.
#[derive(Clone)]
pub struct Verifier {
    max_batch_size: usize,
    authorizer: Option<Arc<dyn Authorizer>>,
}

impl Verifier {
    /// Builds a verifier that only checks structure.
    pub fn new(max_batch_size: usize) -> Self {
        Self {
            max_batch_size,
            authorizer: None,
        }
    }

    /// Attaches an authorizer consulted after the structural checks.
    #[must_use]
    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    /// Returns the largest accepted batch.
    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Checks `request` on behalf of the user named in its header.
    ///
    /// # Errors
    ///
    /// Returns the first [`VerificationError`] found.
    pub fn verify(&self, request: &StructuredRequest) -> Result<(), VerificationError> {
        self.verify_as(request, &request.header().user)
    }

    /// Checks a typed request.
    ///
    /// # Errors
    ///
    /// Returns the first [`VerificationError`] found.
    pub fn verify_typed<R: TableRequest>(&self, request: &R) -> Result<(), VerificationError> {
        self.verify(&request.clone().into())
    }

    fn verify_as(&self, request: &StructuredRequest, user: &str) -> Result<(), VerificationError> {
        if let StructuredRequest::BatchTable(batch) = request {
            return self.verify_batch(batch, user);
        }
        check_structure(request)?;
        match (&self.authorizer, target_table(request)) {
            (Some(authorizer), Some(table)) => {
                authorizer.authorize(user, table, required_access(request.method()))
            }
            _ => Ok(()),
        }
    }

    // Sub-commands run as the batch caller; their own headers are ignored.
    fn verify_batch(&self, batch: &BatchTableRequest, user: &str) -> Result<(), VerificationError> {
        let count = batch.commands.len();
        if count == 0 {
            return Err(VerificationError::invalid(
                Method::BatchTable,
                "batch has no commands",
            ));
        }
        if count > self.max_batch_size {
            return Err(VerificationError::invalid(
                Method::BatchTable,
                format!(
                    "batch has {count} commands, more than the limit of {}",
                    self.max_batch_size
                ),
            ));
        }
        for (index, command) in batch.commands.iter().enumerate() {
            if command.method() == Method::BatchTable {
                return Err(VerificationError::batch_command(
                    index,
                    VerificationError::invalid(Method::BatchTable, "batches cannot be nested"),
                ));
            }
            self.verify_as(command, user)
                .map_err(|error| VerificationError::batch_command(index, error))?;
        }
        Ok(())
    }
}

fn required_access(method: Method) -> Access {
    if method.is_read_only() {
        Access::Read
    } else {
        Access::Write
    }
}

fn target_table(request: &StructuredRequest) -> Option<&str> {
    let table = match request {
        StructuredRequest::CreateTable(args) => &args.schema.name,
        StructuredRequest::GetTableRow(args) => &args.table,
        StructuredRequest::PutTableRow(args) => &args.table,
        StructuredRequest::ConditionalPutTableRow(args) => &args.table,
        StructuredRequest::IncrementTableRow(args) => &args.table,
        StructuredRequest::DeleteTableRow(args) => &args.table,
        StructuredRequest::DeleteTableRowRange(args) => &args.table,
        StructuredRequest::ScanTable(args) => &args.table,
        StructuredRequest::BatchTable(_) => return None,
    };
    Some(table)
}

fn check_structure(request: &StructuredRequest) -> Result<(), VerificationError> {
    let method = request.method();
    let fail = |message: &str| Err(VerificationError::invalid(method, message));
    match request {
        StructuredRequest::CreateTable(args) => check_schema(&args.schema),
        StructuredRequest::GetTableRow(args) => require_row(method, &args.row),
        StructuredRequest::DeleteTableRow(args) => require_row(method, &args.row),
        StructuredRequest::PutTableRow(args) => {
            require_row(method, &args.row)?;
            if args.columns.is_empty() {
                return fail("no columns to write");
            }
            Ok(())
        }
        StructuredRequest::ConditionalPutTableRow(args) => {
            require_row(method, &args.row)?;
            if args.columns.is_empty() {
                return fail("no columns to write");
            }
            Ok(())
        }
        StructuredRequest::IncrementTableRow(args) => {
            require_row(method, &args.row)?;
            if args.increments.is_empty() {
                return fail("no columns to increment");
            }
            Ok(())
        }
        StructuredRequest::DeleteTableRowRange(args) => {
            if args.start_row.is_empty() {
                return fail("start row is empty");
            }
            check_range(method, &args.start_row, &args.end_row)
        }
        StructuredRequest::ScanTable(args) => check_range(method, &args.start_row, &args.end_row),
        StructuredRequest::BatchTable(_) => Ok(()),
    }
}

fn require_row(method: Method, row: &str) -> Result<(), VerificationError> {
    if row.is_empty() {
        return Err(VerificationError::invalid(method, "row key is empty"));
    }
    Ok(())
}

fn check_range(method: Method, start: &str, end: &str) -> Result<(), VerificationError> {
    if !end.is_empty() && end <= start {
        return Err(VerificationError::invalid(
            method,
            format!("end row '{end}' does not follow start row '{start}'"),
        ));
    }
    Ok(())
}

fn check_schema(schema: &TableSchema) -> Result<(), VerificationError> {
    let invalid = |message: String| Err(VerificationError::invalid(Method::CreateTable, message));
    if schema.name.is_empty() {
        return invalid("table name is empty".to_owned());
    }
    if schema.columns.is_empty() {
        return invalid(format!("table '{}' has no columns", schema.name));
    }
    let mut seen = BTreeSet::new();
    for column in &schema.columns {
        if column.name.is_empty() {
            return invalid(format!("table '{}' has an unnamed column", schema.name));
        }
        if !seen.insert(column.name.as_str()) {
            return invalid(format!(
                "table '{}' declares column '{}' twice",
                schema.name, column.name
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};
    use structured_proto::{
        ColumnSchema, ColumnType, CreateTableRequest, DeleteTableRowRangeRequest,
        GetTableRowRequest, IncrementTableRowRequest, PutTableRowRequest, RequestHeader,
        ScanTableRequest, Value,
    };

    use super::*;
    use crate::dispatch::permissions::{PermConfig, PermissionAuthorizer, permission_key};
    use crate::storage::MemoryStore;

    fn put(row: &str) -> StructuredRequest {
        PutTableRowRequest {
            row: row.to_owned(),
            columns: [("c1".to_owned(), Value::from("v1"))].into(),
            ..PutTableRowRequest::default()
        }
        .into()
    }

    fn get(table: &str, row: &str) -> StructuredRequest {
        GetTableRowRequest {
            table: table.to_owned(),
            row: row.to_owned(),
            ..GetTableRowRequest::default()
        }
        .into()
    }

    fn batch(commands: Vec<StructuredRequest>) -> StructuredRequest {
        BatchTableRequest {
            commands,
            ..BatchTableRequest::default()
        }
        .into()
    }

    fn schema(name: &str, columns: &[&str]) -> StructuredRequest {
        CreateTableRequest {
            schema: TableSchema {
                name: name.to_owned(),
                columns: columns
                    .iter()
                    .map(|column| ColumnSchema {
                        name: (*column).to_owned(),
                        kind: ColumnType::String,
                    })
                    .collect(),
            },
            ..CreateTableRequest::default()
        }
        .into()
    }

    #[fixture]
    fn verifier() -> Verifier {
        Verifier::new(3)
    }

    #[rstest]
    #[case::put(put("r1"))]
    #[case::get(get("", "r1"))]
    #[case::schema(schema("accounts", &["owner", "balance"]))]
    #[case::open_scan(ScanTableRequest::default().into())]
    #[case::batch(batch(vec![put("a"), get("", "b")]))]
    fn accepts_well_formed_requests(verifier: Verifier, #[case] request: StructuredRequest) {
        verifier.verify(&request).expect("request should verify");
    }

    #[rstest]
    #[case::empty_row(put(""), "row key is empty")]
    #[case::no_columns(PutTableRowRequest { row: "r".into(), ..Default::default() }.into(), "no columns")]
    #[case::no_increments(IncrementTableRowRequest { row: "r".into(), ..Default::default() }.into(), "no columns to increment")]
    #[case::unnamed_table(schema("", &["c"]), "table name is empty")]
    #[case::duplicate_column(schema("t", &["c", "c"]), "twice")]
    #[case::no_schema_columns(schema("t", &[]), "has no columns")]
    #[case::range_without_start(DeleteTableRowRangeRequest::default().into(), "start row is empty")]
    #[case::inverted_scan(ScanTableRequest { start_row: "m".into(), end_row: "c".into(), ..Default::default() }.into(), "does not follow")]
    #[case::empty_batch(batch(Vec::new()), "no commands")]
    #[case::oversized_batch(batch(vec![put("a"), put("b"), put("c"), put("d")]), "more than the limit of 3")]
    fn rejects_malformed_requests(
        verifier: Verifier,
        #[case] request: StructuredRequest,
        #[case] expected: &str,
    ) {
        let error = verifier.verify(&request).expect_err("request should fail");
        assert!(error.is_client_error());
        assert!(
            error.to_string().contains(expected),
            "'{error}' should mention '{expected}'"
        );
    }

    #[rstest]
    fn batch_errors_name_the_failing_command(verifier: Verifier) {
        let error = verifier
            .verify(&batch(vec![put("a"), put(""), put("c")]))
            .expect_err("second command is malformed");
        assert!(matches!(error, VerificationError::BatchCommand { index: 1, .. }));
    }

    #[rstest]
    fn nested_batches_are_rejected(verifier: Verifier) {
        let error = verifier
            .verify(&batch(vec![put("a"), batch(vec![put("b")])]))
            .expect_err("nested batch");
        assert!(error.to_string().contains("cannot be nested"));
    }

    fn guarded() -> Verifier {
        let store = MemoryStore::new();
        let perms = PermConfig {
            read: vec!["reader".to_owned(), "writer".to_owned()],
            write: vec!["writer".to_owned()],
        };
        store
            .put_config(permission_key(""), perms.to_blob().expect("encode"))
            .expect("store config");
        Verifier::new(8).with_authorizer(Arc::new(PermissionAuthorizer::new(Arc::new(store))))
    }

    fn as_user(mut request: StructuredRequest, user: &str) -> StructuredRequest {
        *request.header_mut() = RequestHeader::for_user(user);
        request
    }

    #[rstest]
    #[case("reader", get("", "r"), true)]
    #[case("reader", put("r"), false)]
    #[case("writer", put("r"), true)]
    #[case("stranger", get("", "r"), false)]
    fn authorization_follows_method_access(
        #[case] user: &str,
        #[case] request: StructuredRequest,
        #[case] allowed: bool,
    ) {
        let outcome = guarded().verify(&as_user(request, user));
        assert_eq!(outcome.is_ok(), allowed, "{outcome:?}");
    }

    #[test]
    fn batch_commands_are_authorized_as_the_batch_caller() {
        let inner = as_user(put("r"), "writer");
        let outcome = guarded().verify(&as_user(batch(vec![inner]), "reader"));
        let error = outcome.expect_err("reader cannot write through a batch");
        assert!(matches!(error, VerificationError::BatchCommand { index: 0, .. }));
    }
}
