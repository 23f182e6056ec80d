//! Typed path parameters consumed by the [`RouteBuilder`](super::RouteBuilder).

/// A single typed URL parameter.
///
/// A call carries an ordered list of these. The route builder reads each
/// kind once: the first `Id` and the first `Method` win, every `Query` and
/// `Child` is applied in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathParam {
    /// Positional ids substituted into `{0}`, `{1}`, … in order.
    Id(Vec<String>),
    /// A `key=value` query pair.
    Query { key: String, value: String },
    /// Replaces the `{ver}` placeholder.
    Version(String),
    /// A suffix appended verbatim to the path (e.g. `:generateContent`).
    Method(String),
    /// An extra path segment appended after the template.
    Child(String),
}

impl PathParam {
    /// A single positional id.
    pub fn id(id: impl Into<String>) -> Self {
        PathParam::Id(vec![id.into()])
    }

    /// Several positional ids, in placeholder order.
    pub fn ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PathParam::Id(ids.into_iter().map(Into::into).collect())
    }

    pub fn query(key: impl Into<String>, value: impl ToString) -> Self {
        PathParam::Query {
            key: key.into(),
            value: value.to_string(),
        }
    }

    pub fn version(version: impl Into<String>) -> Self {
        PathParam::Version(version.into())
    }

    pub fn method(suffix: impl Into<String>) -> Self {
        PathParam::Method(suffix.into())
    }

    pub fn child(segment: impl Into<String>) -> Self {
        PathParam::Child(segment.into())
    }

    /// Short kind label used in log messages.
    pub fn kind(&self) -> &'static str {
        match self {
            PathParam::Id(_) => "id",
            PathParam::Query { .. } => "query",
            PathParam::Version(_) => "version",
            PathParam::Method(_) => "method",
            PathParam::Child(_) => "child",
        }
    }

    pub fn is_version(&self) -> bool {
        matches!(self, PathParam::Version(_))
    }
}

/// Extension helpers for a `Vec<PathParam>`.
pub trait PathParamVecExt {
    /// Number of `Version` params in the list.
    fn version_count(&self) -> usize;
    /// Remove every `Query` param with the given key.
    fn remove_query(&mut self, key: &str);
}

impl PathParamVecExt for Vec<PathParam> {
    fn version_count(&self) -> usize {
        self.iter().filter(|p| p.is_version()).count()
    }

    fn remove_query(&mut self, key: &str) {
        self.retain(|p| !matches!(p, PathParam::Query { key: k, .. } if k == key));
    }
}
