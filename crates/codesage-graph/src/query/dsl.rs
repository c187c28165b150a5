//! Tokenizer, AST and parser for the graph query language.
//!
//! ```text
//! FIND <node-type> [AS <alias>] [WHERE <conditions>] [LIMIT <n>] [OFFSET <n>]
//! ```
//!
//! Conditions are attribute comparisons (`complexity > 10`,
//! `name LIKE 'parse'`) and relation tests (`CALLING 'helper'`) joined by
//! `AND`/`OR`. There is no precedence and no grouping: the conditions fold
//! strictly left to right, so `a AND b OR c` means `(a AND b) OR c`.
//!
//! ```
//! use codesage_graph::query::{parse_query, Relation};
//!
//! let query = parse_query("FIND function WHERE complexity > 10 AND CALLING 'helper' LIMIT 5").unwrap();
//! assert_eq!(query.find.node_type, "function");
//! assert_eq!(query.limit, Some(5));
//! let relations: Vec<_> = query.relation_conditions().collect();
//! assert_eq!(relations[0].relation, Relation::Calling);
//! ```

use crate::error::{GraphError, Result};
use crate::model::{Direction, EdgeType, PropertyValue};
use crate::storage::FilterOp;
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static TOKEN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"(?P<string>'[^']*'|"[^"]*")"#,
        r"|(?P<number>-?\d+(?:\.\d+)?)",
        r"|(?P<operator>>=|<=|!=|<>|[><=])",
        r"|(?P<identifier>[A-Za-z_][A-Za-z0-9_]*)",
        r"|(?P<lparen>\()",
        r"|(?P<rparen>\))",
        r"|(?P<skip>\s+)",
        r"|(?P<mismatch>.)",
    ))
    .unwrap()
});

/// Reserved words. Identifiers matching one (in any case) become keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Keyword {
    Find,
    Where,
    And,
    Or,
    Not,
    As,
    Calling,
    Inherits,
    Imports,
    Contains,
    References,
    Defines,
    Limit,
    Offset,
    Depth,
    Exists,
}

impl Keyword {
    const ALL: [Keyword; 16] = [
        Keyword::Find,
        Keyword::Where,
        Keyword::And,
        Keyword::Or,
        Keyword::Not,
        Keyword::As,
        Keyword::Calling,
        Keyword::Inherits,
        Keyword::Imports,
        Keyword::Contains,
        Keyword::References,
        Keyword::Defines,
        Keyword::Limit,
        Keyword::Offset,
        Keyword::Depth,
        Keyword::Exists,
    ];

    /// Upper-case spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::Find => "FIND",
            Keyword::Where => "WHERE",
            Keyword::And => "AND",
            Keyword::Or => "OR",
            Keyword::Not => "NOT",
            Keyword::As => "AS",
            Keyword::Calling => "CALLING",
            Keyword::Inherits => "INHERITS",
            Keyword::Imports => "IMPORTS",
            Keyword::Contains => "CONTAINS",
            Keyword::References => "REFERENCES",
            Keyword::Defines => "DEFINES",
            Keyword::Limit => "LIMIT",
            Keyword::Offset => "OFFSET",
            Keyword::Depth => "DEPTH",
            Keyword::Exists => "EXISTS",
        }
    }

    fn lookup(word: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str().eq_ignore_ascii_case(word))
    }
}

/// Comparison operator of an attribute condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOp {
    /// `=`
    Eq,
    /// `!=` or `<>`
    Ne,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// Case-insensitive substring match
    Like,
}

impl ComparisonOp {
    fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "=" => Some(ComparisonOp::Eq),
            "!=" | "<>" => Some(ComparisonOp::Ne),
            ">" => Some(ComparisonOp::Gt),
            ">=" => Some(ComparisonOp::Gte),
            "<" => Some(ComparisonOp::Lt),
            "<=" => Some(ComparisonOp::Lte),
            _ if symbol.eq_ignore_ascii_case("LIKE") => Some(ComparisonOp::Like),
            _ => None,
        }
    }

    /// Storage filter operator, `None` for `LIKE` which storage cannot
    /// evaluate.
    pub fn filter_op(&self) -> Option<FilterOp> {
        match self {
            ComparisonOp::Eq => Some(FilterOp::Eq),
            ComparisonOp::Ne => Some(FilterOp::Ne),
            ComparisonOp::Gt => Some(FilterOp::Gt),
            ComparisonOp::Gte => Some(FilterOp::Gte),
            ComparisonOp::Lt => Some(FilterOp::Lt),
            ComparisonOp::Lte => Some(FilterOp::Lte),
            ComparisonOp::Like => None,
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::Ne => "!=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Gte => ">=",
            ComparisonOp::Lt => "<",
            ComparisonOp::Lte => "<=",
            ComparisonOp::Like => "LIKE",
        };
        f.write_str(symbol)
    }
}

/// Relation keyword of a relation condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    /// `CALLING`, over `calls` edges
    Calling,
    /// `INHERITS`, over `inherits` edges
    Inherits,
    /// `IMPORTS`, over `imports` edges
    Imports,
    /// `CONTAINS`, over `contains` edges
    Contains,
    /// `REFERENCES`, over `references` edges
    References,
    /// `DEFINES`, over `defines` edges
    Defines,
}

impl Relation {
    fn from_keyword(keyword: Keyword) -> Option<Self> {
        match keyword {
            Keyword::Calling => Some(Relation::Calling),
            Keyword::Inherits => Some(Relation::Inherits),
            Keyword::Imports => Some(Relation::Imports),
            Keyword::Contains => Some(Relation::Contains),
            Keyword::References => Some(Relation::References),
            Keyword::Defines => Some(Relation::Defines),
            _ => None,
        }
    }

    /// Edge type the relation walks.
    pub fn edge_type(&self) -> EdgeType {
        match self {
            Relation::Calling => EdgeType::Calls,
            Relation::Inherits => EdgeType::Inherits,
            Relation::Imports => EdgeType::Imports,
            Relation::Contains => EdgeType::Contains,
            Relation::References => EdgeType::References,
            Relation::Defines => EdgeType::Defines,
        }
    }

    /// `CONTAINS` looks for the container of a node; every other relation
    /// follows edges out of it.
    pub fn default_direction(&self) -> Direction {
        match self {
            Relation::Contains => Direction::Incoming,
            _ => Direction::Outgoing,
        }
    }

    /// Keyword spelling.
    pub fn keyword(&self) -> &'static str {
        match self {
            Relation::Calling => "CALLING",
            Relation::Inherits => "INHERITS",
            Relation::Imports => "IMPORTS",
            Relation::Contains => "CONTAINS",
            Relation::References => "REFERENCES",
            Relation::Defines => "DEFINES",
        }
    }
}

/// `FIND <node-type> [AS <alias>]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FindClause {
    /// Node type name as written
    pub node_type: String,
    /// Optional alias
    pub alias: Option<String>,
}

/// `attr OP value`.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeCondition {
    /// Property name
    pub attribute: String,
    /// Operator
    pub op: ComparisonOp,
    /// Literal: integer, float or string
    pub value: PropertyValue,
}

/// `RELATION 'target'`.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationCondition {
    /// Relation keyword
    pub relation: Relation,
    /// Target pattern: an id, an id suffix, or `*`
    pub target: String,
    /// Which end of the edge the node sits on
    pub direction: Direction,
}

impl RelationCondition {
    /// True when `id` is matched by the target pattern.
    pub fn target_matches(&self, id: &str) -> bool {
        self.target == "*" || id.ends_with(&self.target)
    }
}

/// One WHERE condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Property comparison
    Attribute(AttributeCondition),
    /// Edge existence test
    Relation(RelationCondition),
}

/// `AND` / `OR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    /// Both sides
    And,
    /// Either side
    Or,
}

impl LogicalOp {
    /// Combine an accumulated result with the next condition's result.
    pub fn apply(&self, acc: bool, next: bool) -> bool {
        match self {
            LogicalOp::And => acc && next,
            LogicalOp::Or => acc || next,
        }
    }
}

/// WHERE clause: a first condition followed by operator/condition pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    /// First condition
    pub first: Condition,
    /// Each following condition with the operator that joins it
    pub rest: Vec<(LogicalOp, Condition)>,
}

impl WhereClause {
    /// Every condition in source order.
    pub fn conditions(&self) -> impl Iterator<Item = &Condition> {
        std::iter::once(&self.first).chain(self.rest.iter().map(|(_, c)| c))
    }

    /// True when any condition is joined by `OR`.
    pub fn has_or(&self) -> bool {
        self.rest.iter().any(|(op, _)| *op == LogicalOp::Or)
    }

    /// Left fold of the conditions under `eval`.
    ///
    /// Stops at the first error `eval` returns.
    pub fn evaluate<F>(&self, mut eval: F) -> Result<bool>
    where
        F: FnMut(&Condition) -> Result<bool>,
    {
        let mut acc = eval(&self.first)?;
        for (op, condition) in &self.rest {
            let next = eval(condition)?;
            acc = op.apply(acc, next);
        }
        Ok(acc)
    }
}

/// Parsed query.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// FIND clause
    pub find: FindClause,
    /// Optional WHERE clause
    pub where_clause: Option<WhereClause>,
    /// Maximum number of results
    pub limit: Option<usize>,
    /// Results to skip
    pub offset: Option<usize>,
}

impl Query {
    /// Attribute conditions in source order.
    pub fn attribute_conditions(&self) -> impl Iterator<Item = &AttributeCondition> {
        self.where_clause.iter().flat_map(|w| w.conditions()).filter_map(|c| match c {
            Condition::Attribute(a) => Some(a),
            Condition::Relation(_) => None,
        })
    }

    /// Relation conditions in source order.
    pub fn relation_conditions(&self) -> impl Iterator<Item = &RelationCondition> {
        self.where_clause.iter().flat_map(|w| w.conditions()).filter_map(|c| match c {
            Condition::Relation(r) => Some(r),
            Condition::Attribute(_) => None,
        })
    }
}

impl FromStr for Query {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self> {
        parse_query(s)
    }
}

/// A string literal the tokenizer reads back as `s`: single quotes unless
/// the text holds one.
struct Quoted<'a>(&'a str);

impl fmt::Display for Quoted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.contains('\'') {
            write!(f, "\"{}\"", self.0)
        } else {
            write!(f, "'{}'", self.0)
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Attribute(a) => match &a.value {
                PropertyValue::String(s) => write!(f, "{} {} {}", a.attribute, a.op, Quoted(s)),
                other => write!(f, "{} {} {}", a.attribute, a.op, other),
            },
            Condition::Relation(r) => write!(f, "{} {}", r.relation.keyword(), Quoted(&r.target)),
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FIND {}", self.find.node_type)?;
        if let Some(alias) = &self.find.alias {
            write!(f, " AS {alias}")?;
        }
        if let Some(where_clause) = &self.where_clause {
            write!(f, " WHERE {}", where_clause.first)?;
            for (op, condition) in &where_clause.rest {
                let op = match op {
                    LogicalOp::And => "AND",
                    LogicalOp::Or => "OR",
                };
                write!(f, " {op} {condition}")?;
            }
        }
        if let Some(limit) = self.limit {
            write!(f, " LIMIT {limit}")?;
        }
        if let Some(offset) = self.offset {
            write!(f, " OFFSET {offset}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Keyword(Keyword),
    Identifier(String),
    String(String),
    Number(String),
    Operator(ComparisonOp),
    LParen,
    RParen,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Keyword(k) => f.write_str(k.as_str()),
            TokenKind::Identifier(s) | TokenKind::Number(s) => f.write_str(s),
            TokenKind::String(s) => write!(f, "{}", Quoted(s)),
            TokenKind::Operator(op) => write!(f, "{op}"),
            TokenKind::LParen => f.write_str("("),
            TokenKind::RParen => f.write_str(")"),
            TokenKind::Eof => f.write_str("end of query"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    position: usize,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    for caps in TOKEN_PATTERN.captures_iter(input) {
        let Some(m) = caps.get(0) else { continue };
        let position = m.start();
        let text = m.as_str();

        let kind = if caps.name("skip").is_some() {
            continue;
        } else if caps.name("mismatch").is_some() {
            return Err(GraphError::query_syntax(
                format!("Unexpected character '{text}'"),
                Some(position),
            ));
        } else if caps.name("string").is_some() {
            TokenKind::String(text[1..text.len() - 1].to_string())
        } else if caps.name("number").is_some() {
            TokenKind::Number(text.to_string())
        } else if caps.name("operator").is_some() {
            match ComparisonOp::from_symbol(text) {
                Some(op) => TokenKind::Operator(op),
                None => {
                    return Err(GraphError::query_syntax(
                        format!("Unknown operator '{text}'"),
                        Some(position),
                    ))
                }
            }
        } else if caps.name("lparen").is_some() {
            TokenKind::LParen
        } else if caps.name("rparen").is_some() {
            TokenKind::RParen
        } else if text.eq_ignore_ascii_case("LIKE") {
            TokenKind::Operator(ComparisonOp::Like)
        } else if let Some(keyword) = Keyword::lookup(text) {
            TokenKind::Keyword(keyword)
        } else {
            TokenKind::Identifier(text.to_string())
        };
        tokens.push(Token { kind, position });
    }
    tokens.push(Token {
        kind: TokenKind::Eof,
        position: input.len(),
    });
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn current(&self) -> &Token {
        // the token list always ends with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn at_keyword(&self, keyword: Keyword) -> bool {
        self.current().kind == TokenKind::Keyword(keyword)
    }

    fn error(&self, message: impl Into<String>) -> GraphError {
        GraphError::query_syntax(message, Some(self.current().position))
    }

    fn parse_query(&mut self) -> Result<Query> {
        if self.current().kind == TokenKind::Eof {
            return Err(GraphError::query_syntax("Empty query", Some(0)));
        }
        let find = self.parse_find()?;

        let where_clause = if self.at_keyword(Keyword::Where) {
            self.advance();
            Some(self.parse_where()?)
        } else {
            None
        };

        let limit = if self.at_keyword(Keyword::Limit) {
            self.advance();
            Some(self.parse_count("LIMIT")?)
        } else {
            None
        };

        let offset = if self.at_keyword(Keyword::Offset) {
            self.advance();
            Some(self.parse_count("OFFSET")?)
        } else {
            None
        };

        if self.current().kind != TokenKind::Eof {
            return Err(self.error(format!("Unexpected trailing input: {}", self.current().kind)));
        }

        Ok(Query {
            find,
            where_clause,
            limit,
            offset,
        })
    }

    fn parse_find(&mut self) -> Result<FindClause> {
        if !self.at_keyword(Keyword::Find) {
            return Err(self.error("Expected FIND keyword"));
        }
        self.advance();

        let TokenKind::Identifier(node_type) = self.current().kind.clone() else {
            return Err(self.error("Expected node type after FIND"));
        };
        self.advance();

        let alias = if self.at_keyword(Keyword::As) {
            self.advance();
            let TokenKind::Identifier(alias) = self.current().kind.clone() else {
                return Err(self.error("Expected alias after AS"));
            };
            self.advance();
            Some(alias)
        } else {
            None
        };

        Ok(FindClause { node_type, alias })
    }

    fn parse_where(&mut self) -> Result<WhereClause> {
        let first = self.parse_condition()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.current().kind {
                TokenKind::Keyword(Keyword::And) => LogicalOp::And,
                TokenKind::Keyword(Keyword::Or) => LogicalOp::Or,
                _ => break,
            };
            self.advance();
            rest.push((op, self.parse_condition()?));
        }
        Ok(WhereClause { first, rest })
    }

    fn parse_condition(&mut self) -> Result<Condition> {
        match self.current().kind.clone() {
            TokenKind::Keyword(keyword) => match Relation::from_keyword(keyword) {
                Some(relation) => self.parse_relation(relation).map(Condition::Relation),
                None => Err(self.error(format!("Unexpected keyword {}", keyword.as_str()))),
            },
            TokenKind::Identifier(attribute) => {
                self.advance();
                self.parse_attribute(attribute).map(Condition::Attribute)
            }
            other => Err(self.error(format!("Unexpected token: {other}"))),
        }
    }

    fn parse_attribute(&mut self, attribute: String) -> Result<AttributeCondition> {
        let TokenKind::Operator(op) = self.current().kind else {
            return Err(self.error(format!("Expected operator after '{attribute}'")));
        };
        self.advance();

        let value = match self.current().kind.clone() {
            TokenKind::Number(text) => self.parse_number(&text)?,
            TokenKind::String(s) | TokenKind::Identifier(s) => PropertyValue::String(s),
            _ => return Err(self.error("Expected value after operator")),
        };
        self.advance();

        Ok(AttributeCondition { attribute, op, value })
    }

    fn parse_number(&self, text: &str) -> Result<PropertyValue> {
        if text.contains('.') {
            text.parse::<f64>()
                .map(PropertyValue::Float)
                .map_err(|_| self.error(format!("Invalid number '{text}'")))
        } else {
            text.parse::<i64>()
                .map(PropertyValue::Int)
                .map_err(|_| self.error(format!("Integer out of range '{text}'")))
        }
    }

    fn parse_relation(&mut self, relation: Relation) -> Result<RelationCondition> {
        self.advance();
        let TokenKind::String(target) = self.current().kind.clone() else {
            return Err(self.error(format!("Expected string target after {}", relation.keyword())));
        };
        self.advance();

        Ok(RelationCondition {
            relation,
            target,
            direction: relation.default_direction(),
        })
    }

    fn parse_count(&mut self, clause: &str) -> Result<usize> {
        let count = match &self.current().kind {
            TokenKind::Number(text) => text.parse::<usize>().ok(),
            _ => None,
        };
        match count {
            Some(n) => {
                self.advance();
                Ok(n)
            }
            None => Err(self.error(format!("Expected non-negative integer after {clause}"))),
        }
    }
}

/// Parse a query string.
///
/// # Errors
///
/// [`GraphError::QuerySyntax`] for any tokenization or grammar error, with
/// the byte offset where it was detected.
pub fn parse_query(input: &str) -> Result<Query> {
    let tokens = tokenize(input)?;
    Parser { tokens, pos: 0 }.parse_query()
}
