//! Logical operations and per-service route tables.

use std::collections::HashMap;
use std::fmt;

use crate::request::Verb;

/// A logical CRUD operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Get,
    /// Alias of [`Operation::Get`]; falls back to the `Get` template.
    Retrieve,
    List,
    Update,
    Patch,
    Delete,
    Cancel,
    Query,
}

impl Operation {
    pub const ALL: [Operation; 9] = [
        Operation::Create,
        Operation::Get,
        Operation::Retrieve,
        Operation::List,
        Operation::Update,
        Operation::Patch,
        Operation::Delete,
        Operation::Cancel,
        Operation::Query,
    ];

    /// The HTTP verb conventionally bound to this operation.
    pub fn verb(self) -> Verb {
        match self {
            Operation::Create | Operation::Update | Operation::Cancel | Operation::Query => {
                Verb::Post
            }
            Operation::Get | Operation::Retrieve | Operation::List => Verb::Get,
            Operation::Patch => Verb::Patch,
            Operation::Delete => Verb::Delete,
        }
    }

    /// Whether the operation sends a request body.
    pub fn requires_body(self) -> bool {
        matches!(
            self,
            Operation::Create | Operation::Update | Operation::Patch | Operation::Query
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Get => "get",
            Operation::Retrieve => "retrieve",
            Operation::List => "list",
            Operation::Update => "update",
            Operation::Patch => "patch",
            Operation::Delete => "delete",
            Operation::Cancel => "cancel",
            Operation::Query => "query",
        }
    }

    /// Parse a lowercase operation name.
    pub fn parse(name: &str) -> Option<Operation> {
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Route templates for one API service.
///
/// Templates use `{0}`, `{1}`, … for positional ids and `{ver}` for the
/// version segment:
///
/// ```
/// use crudkit::routing::{Operation, RouteTable};
///
/// let routes = RouteTable::new("messages")
///     .with(Operation::Create, "threads/{0}/messages")
///     .with(Operation::Get, "threads/{0}/messages/{1}");
///
/// assert_eq!(routes.template(Operation::Retrieve), Some("threads/{0}/messages/{1}"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    service: String,
    routes: HashMap<Operation, String>,
}

impl RouteTable {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            routes: HashMap::new(),
        }
    }

    /// Register a template for an operation (builder pattern).
    pub fn with(mut self, operation: Operation, template: impl Into<String>) -> Self {
        self.routes.insert(operation, template.into());
        self
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Template for `operation`. `Retrieve` falls back to `Get`.
    pub fn template(&self, operation: Operation) -> Option<&str> {
        self.routes
            .get(&operation)
            .or_else(|| match operation {
                Operation::Retrieve => self.routes.get(&Operation::Get),
                _ => None,
            })
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbs_follow_convention() {
        assert_eq!(Operation::Create.verb(), Verb::Post);
        assert_eq!(Operation::Update.verb(), Verb::Post);
        assert_eq!(Operation::Cancel.verb(), Verb::Post);
        assert_eq!(Operation::Query.verb(), Verb::Post);
        assert_eq!(Operation::Get.verb(), Verb::Get);
        assert_eq!(Operation::Retrieve.verb(), Verb::Get);
        assert_eq!(Operation::List.verb(), Verb::Get);
        assert_eq!(Operation::Patch.verb(), Verb::Patch);
        assert_eq!(Operation::Delete.verb(), Verb::Delete);
    }

    #[test]
    fn retrieve_falls_back_to_get() {
        let routes = RouteTable::new("files").with(Operation::Get, "files/{0}");
        assert_eq!(routes.template(Operation::Retrieve), Some("files/{0}"));
        assert_eq!(routes.template(Operation::List), None);
    }

    #[test]
    fn explicit_retrieve_wins() {
        let routes = RouteTable::new("files")
            .with(Operation::Get, "files/{0}")
            .with(Operation::Retrieve, "files/{0}/content");
        assert_eq!(routes.template(Operation::Retrieve), Some("files/{0}/content"));
    }

    #[test]
    fn parse_round_trips_names() {
        for op in Operation::ALL {
            assert_eq!(Operation::parse(op.as_str()), Some(op));
        }
        assert_eq!(Operation::parse("LIST"), Some(Operation::List));
        assert_eq!(Operation::parse("upsert"), None);
    }
}
