//! Query description shared by all backends, plus its PostgREST rendering.

use serde_json::Value;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// Full-text search flavour. Maps onto the PostgREST `*fts` operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextSearch {
    /// `plainto_tsquery`: free text, terms AND-ed.
    #[default]
    Plain,
    /// `phraseto_tsquery`: terms must appear adjacent, in order.
    Phrase,
    /// `websearch_to_tsquery`: quotes, `or`, and `-term` understood.
    Websearch,
    /// `to_tsquery`: caller supplies tsquery syntax.
    Raw,
}

impl TextSearch {
    fn operator(&self) -> &'static str {
        match self {
            TextSearch::Plain => "plfts",
            TextSearch::Phrase => "phfts",
            TextSearch::Websearch => "wfts",
            TextSearch::Raw => "fts",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EqFilter {
    pub column: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Search {
    pub column: String,
    pub query: String,
    pub mode: TextSearch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub direction: Direction,
}

/// Projection, filters, ordering and limit for one table call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub columns: Option<String>,
    pub filters: Vec<EqFilter>,
    pub search: Option<Search>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict the returned columns (`select=`). Defaults to `*`.
    pub fn columns(mut self, columns: &str) -> Self {
        self.columns = Some(columns.to_string());
        self
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(EqFilter {
            column: column.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn text_search(mut self, column: &str, query: &str, mode: TextSearch) -> Self {
        self.search = Some(Search {
            column: column.to_string(),
            query: query.to_string(),
            mode,
        });
        self
    }

    pub fn order(mut self, column: &str, direction: Direction) -> Self {
        self.order = Some(Order {
            column: column.to_string(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether the query narrows the row set at all.
    pub fn has_filters(&self) -> bool {
        !self.filters.is_empty() || self.search.is_some()
    }

    /// Render as PostgREST query-string pairs, unencoded.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        params.push((
            "select".to_string(),
            self.columns.clone().unwrap_or_else(|| "*".to_string()),
        ));
        params.extend(self.filter_params());
        if let Some(order) = &self.order {
            let dir = match order.direction {
                Direction::Asc => "asc",
                Direction::Desc => "desc",
            };
            params.push(("order".to_string(), format!("{}.{dir}", order.column)));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }

    /// Only the row-narrowing pairs. Used by delete, which takes no projection.
    pub fn filter_params(&self) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = self
            .filters
            .iter()
            .map(|f| (f.column.clone(), eq_operand(&f.value)))
            .collect();
        if let Some(search) = &self.search {
            params.push((
                search.column.clone(),
                format!("{}.{}", search.mode.operator(), search.query),
            ));
        }
        params
    }
}

fn eq_operand(value: &Value) -> String {
    match value {
        Value::Null => "is.null".to_string(),
        Value::String(s) => format!("eq.{s}"),
        other => format!("eq.{other}"),
    }
}
