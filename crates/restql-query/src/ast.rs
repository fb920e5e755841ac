//! Request tree produced by the grammar parser.
//!
//! The tree is built once per request and never mutated afterwards; the
//! resolver and synthesizer only read it.

/// A column reference with an optional JSON traversal path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub path: Vec<JsonHop>,
}

impl Field {
    pub fn column(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: Vec::new(),
        }
    }

    /// Default output label: the last named JSON key, or the column itself.
    pub fn label(&self) -> &str {
        self.path
            .iter()
            .rev()
            .find_map(|hop| match &hop.key {
                JsonKey::Name(n) => Some(n.as_str()),
                JsonKey::Index(_) => None,
            })
            .unwrap_or(&self.name)
    }
}

/// One `->`/`->>` step of a JSON path.
///
/// A `->>` hop that is not last is kept as parsed: the database reports the
/// resulting "operator does not exist" itself, which is part of the
/// contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonHop {
    pub key: JsonKey,
    /// True for `->>` (extract as text).
    pub as_text: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsonKey {
    Name(String),
    /// May be negative, counting from the end of the array.
    Index(i64),
}

/// One comma-separated item of `?select=`.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    Column(ColumnItem),
    Embed(EmbedItem),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnItem {
    pub field: Field,
    pub alias: Option<String>,
    pub cast: Option<String>,
    pub aggregate: Option<Aggregate>,
}

impl ColumnItem {
    pub fn output_name(&self) -> &str {
        match (&self.alias, &self.aggregate) {
            (Some(alias), _) => alias,
            (None, Some(agg)) => agg.func.name(),
            (None, None) => self.field.label(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
    Sum,
    Avg,
    Min,
    Max,
    Count,
}

impl AggregateFn {
    pub fn name(&self) -> &'static str {
        match self {
            AggregateFn::Sum => "sum",
            AggregateFn::Avg => "avg",
            AggregateFn::Min => "min",
            AggregateFn::Max => "max",
            AggregateFn::Count => "count",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sum" => Some(AggregateFn::Sum),
            "avg" => Some(AggregateFn::Avg),
            "min" => Some(AggregateFn::Min),
            "max" => Some(AggregateFn::Max),
            "count" => Some(AggregateFn::Count),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub func: AggregateFn,
    /// Cast applied to the aggregated value (`sum()::text`).
    pub cast: Option<String>,
}

/// An embedded relation request inside `?select=`.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbedItem {
    /// Relation name as written.
    pub name: String,
    pub alias: Option<String>,
    /// Disambiguation hint: constraint, column or junction table name.
    pub hint: Option<String>,
    /// `!inner`: parents without matching children are dropped.
    pub inner: bool,
    pub select: Vec<SelectItem>,
}

impl EmbedItem {
    /// The alias this embed is addressed by in dotted parameters.
    pub fn output_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// The logic tree built from filter parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Condition {
        field: Field,
        negated: bool,
        op: Operator,
    },
    Group {
        op: LogicOp,
        negated: bool,
        /// Invariant: never empty; `or=()` is a parse error.
        children: Vec<Filter>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOp {
    And,
    Or,
}

/// Value accepted by the `is` operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trilean {
    Null,
    True,
    False,
    Unknown,
}

impl Trilean {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "null" => Some(Trilean::Null),
            "true" => Some(Trilean::True),
            "false" => Some(Trilean::False),
            "unknown" => Some(Trilean::Unknown),
            _ => None,
        }
    }
}

/// Full-text search operator family (all render to `@@`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FtsKind {
    /// `fts` → `to_tsquery`
    Query,
    /// `plfts` → `plainto_tsquery`
    Plain,
    /// `phfts` → `phraseto_tsquery`
    Phrase,
    /// `wfts` → `websearch_to_tsquery`
    Websearch,
}

impl FtsKind {
    pub fn tsquery_function(&self) -> &'static str {
        match self {
            FtsKind::Query => "to_tsquery",
            FtsKind::Plain => "plainto_tsquery",
            FtsKind::Phrase => "phraseto_tsquery",
            FtsKind::Websearch => "websearch_to_tsquery",
        }
    }
}

/// Closed set of filter operators with their parsed operands.
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    Eq(String),
    Neq(String),
    Gt(String),
    Gte(String),
    Lt(String),
    Lte(String),
    /// Pattern with `*` already translated to `%`.
    Like(String),
    Ilike(String),
    Match(String),
    Imatch(String),
    /// Empty list is valid and matches nothing.
    In(Vec<String>),
    Is(Trilean),
    Fts {
        kind: FtsKind,
        language: Option<String>,
        query: String,
    },
    /// `cs` `@>`
    Contains(String),
    /// `cd` `<@`
    ContainedIn(String),
    /// `ov` `&&`
    Overlaps(String),
    /// `sl` `<<`
    StrictlyLeft(String),
    /// `sr` `>>`
    StrictlyRight(String),
    /// `nxl` `&>`
    NotExtendsLeft(String),
    /// `nxr` `&<`
    NotExtendsRight(String),
    /// `adj` `-|-`
    Adjacent(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderTerm {
    pub field: Field,
    pub descending: bool,
    /// Explicit `nullsfirst`/`nullslast`, if any.
    pub nulls: Option<NullsOrder>,
}
