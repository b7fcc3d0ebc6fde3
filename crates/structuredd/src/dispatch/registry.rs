//! Closed table of public methods.
//!
//! Every method the daemon serves appears in [`PUBLIC_METHODS`] with an
//! allocator written out by hand. Adding or removing a method is an edit to
//! that table and nothing else.

use std::collections::BTreeMap;

use structured_proto::{
    BatchTableRequest, ConditionalPutTableRowRequest, CreateTableRequest,
    DeleteTableRowRangeRequest, DeleteTableRowRequest, GetTableRowRequest,
    IncrementTableRowRequest, Method, PutTableRowRequest, ScanTableRequest, StructuredCall,
    TableRequest, UnknownMethod,
};

/// Allocates an empty call for one method.
pub type Allocator = fn() -> StructuredCall;

fn allocate<R: TableRequest>() -> StructuredCall {
    let args = R::default();
    let reply = args.create_reply();
    StructuredCall {
        args: args.into(),
        reply: reply.into(),
    }
}

/// Every public method and its allocator.
pub const PUBLIC_METHODS: &[(Method, Allocator)] = &[
    (Method::CreateTable, allocate::<CreateTableRequest>),
    (Method::GetTableRow, allocate::<GetTableRowRequest>),
    (Method::PutTableRow, allocate::<PutTableRowRequest>),
    (
        Method::ConditionalPutTableRow,
        allocate::<ConditionalPutTableRowRequest>,
    ),
    (Method::IncrementTableRow, allocate::<IncrementTableRowRequest>),
    (Method::DeleteTableRow, allocate::<DeleteTableRowRequest>),
    (
        Method::DeleteTableRowRange,
        allocate::<DeleteTableRowRangeRequest>,
    ),
    (Method::ScanTable, allocate::<ScanTableRequest>),
    (Method::BatchTable, allocate::<BatchTableRequest>),
];

/// Name-keyed view of [`PUBLIC_METHODS`] minus any disabled methods.
///
/// Built once before serving and shared read-only by every transport.
#[derive(Debug, Clone)]
pub struct MethodRegistry {
    entries: BTreeMap<&'static str, (Method, Allocator)>,
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl MethodRegistry {
    /// Builds the registry without the `disabled` methods.
    pub fn new(disabled: &[Method]) -> Self {
        let entries = PUBLIC_METHODS
            .iter()
            .filter(|(method, _)| !disabled.contains(method))
            .map(|&(method, allocator)| (method.as_str(), (method, allocator)))
            .collect();
        Self { entries }
    }

    /// Builds the registry from configured method names.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownMethod`] for the first name that is not a method.
    pub fn from_names(disabled: &[String]) -> Result<Self, UnknownMethod> {
        let methods = disabled
            .iter()
            .map(|name| name.parse::<Method>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(&methods))
    }

    /// Resolves an enabled method by name.
    pub fn resolve(&self, name: &str) -> Option<Method> {
        self.entries.get(name).map(|&(method, _)| method)
    }

    /// Allocates a fresh call for the named method.
    ///
    /// Unknown and disabled names are indistinguishable.
    pub fn lookup(&self, name: &str) -> Option<StructuredCall> {
        self.entries.get(name).map(|(_, allocator)| allocator())
    }

    /// Reports whether `method` is served.
    pub fn is_enabled(&self, method: Method) -> bool {
        self.entries.contains_key(method.as_str())
    }

    /// Iterates the served methods in method order.
    pub fn methods(&self) -> impl Iterator<Item = Method> + '_ {
        let mut methods: Vec<Method> = self.entries.values().map(|&(method, _)| method).collect();
        methods.sort();
        methods.into_iter()
    }
}
