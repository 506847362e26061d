//! Version requirement expressions.
//!
//! A requirement is a small boolean algebra over version comparators:
//!
//! ```text
//! requirement := and_group (("or" | "|" | "||") and_group)*
//! and_group   := term (("and" | "&" | "&&")? term)*
//! term        := ("not" | "!") term
//!              | comparator? version
//!              | "(" requirement ")"
//! comparator  := "=" | "!=" | ">" | ">=" | "<" | "<=" | "~>"
//! ```
//!
//! Adjacent terms without a connective are joined with AND, and AND binds
//! tighter than OR. The text is parsed once into a [`RequirementNode`] tree;
//! malformed input is rejected at construction time.

use std::fmt;

use depns_util::errors::{DepnsError, DepnsResult};

use crate::version::Version;

/// A comparison applied to a candidate version against a literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    /// `~>`: same leading segments, not lower than the literal.
    Pessimistic,
}

impl Comparator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Comparator::Eq => "=",
            Comparator::Ne => "!=",
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Pessimistic => "~>",
        }
    }

    pub fn matches(&self, candidate: &Version, literal: &Version) -> bool {
        match self {
            Comparator::Eq => candidate == literal,
            Comparator::Ne => candidate != literal,
            Comparator::Gt => candidate > literal,
            Comparator::Ge => candidate >= literal,
            Comparator::Lt => candidate < literal,
            Comparator::Le => candidate <= literal,
            Comparator::Pessimistic => candidate.is_pessimistic_match(literal),
        }
    }

    /// Comparators whose literal can serve as a default version.
    fn is_anchor(&self) -> bool {
        matches!(self, Comparator::Eq | Comparator::Ge | Comparator::Le)
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A node of a parsed requirement.
#[derive(Debug, Clone, PartialEq)]
pub enum RequirementNode {
    Literal(Comparator, Version),
    And(Vec<RequirementNode>),
    Or(Vec<RequirementNode>),
    Not(Box<RequirementNode>),
}

impl RequirementNode {
    pub fn matches(&self, version: &Version) -> bool {
        match self {
            RequirementNode::Literal(cmp, literal) => cmp.matches(version, literal),
            RequirementNode::And(children) => children.iter().all(|c| c.matches(version)),
            RequirementNode::Or(children) => children.iter().any(|c| c.matches(version)),
            RequirementNode::Not(child) => !child.matches(version),
        }
    }

    /// The last anchor, scanning right to left. Negations never anchor.
    fn default_version(&self) -> Option<&Version> {
        match self {
            RequirementNode::Literal(cmp, literal) if cmp.is_anchor() => Some(literal),
            RequirementNode::Literal(..) | RequirementNode::Not(_) => None,
            RequirementNode::And(children) | RequirementNode::Or(children) => {
                children.iter().rev().find_map(RequirementNode::default_version)
            }
        }
    }
}

impl fmt::Display for RequirementNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, children: &[RequirementNode], op: &str) -> fmt::Result {
            f.write_str("(")?;
            for (i, child) in children.iter().enumerate() {
                if i > 0 {
                    write!(f, " {op} ")?;
                }
                write!(f, "{child}")?;
            }
            f.write_str(")")
        }
        match self {
            RequirementNode::Literal(cmp, v) => write!(f, "{cmp}{v}"),
            RequirementNode::And(children) => join(f, children, "&"),
            RequirementNode::Or(children) => join(f, children, "|"),
            RequirementNode::Not(child) => write!(f, "!{child}"),
        }
    }
}

/// A parsed, immutable version requirement.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionRequirement {
    source: String,
    root: RequirementNode,
}

impl VersionRequirement {
    /// Parse a requirement expression such as `>1.2 <1.3 !(>=1.2.5 | <=1.2.6)`.
    pub fn create(expr: &str) -> DepnsResult<Self> {
        let tokens = tokenize(expr)?;
        if tokens.is_empty() {
            return Err(DepnsError::parse(expr, 0, expr.len(), "empty requirement"));
        }
        let mut parser = Parser {
            input: expr,
            tokens,
            pos: 0,
        };
        let root = parser.parse_or()?;
        if let Some(token) = parser.peek() {
            // parse_and swallows every term starter, so only `)` can remain
            return Err(parser.error_at(token, format!("unmatched {}", token.kind)));
        }
        Ok(Self {
            source: expr.trim().to_string(),
            root,
        })
    }

    /// A requirement matching exactly `version`.
    pub fn exact(version: &Version) -> Self {
        Self {
            source: version.to_string(),
            root: RequirementNode::Literal(Comparator::Eq, version.clone()),
        }
    }

    /// A requirement that holds when both `self` and `other` hold. Its
    /// default comes from `other` when `other` names one.
    pub fn intersect(&self, other: &VersionRequirement) -> Self {
        let wrap = |req: &VersionRequirement| {
            if req.composed() {
                format!("({})", req.source)
            } else {
                req.source.clone()
            }
        };
        Self {
            source: format!("{} & {}", wrap(self), wrap(other)),
            root: collapse(vec![self.root.clone(), other.root.clone()], true),
        }
    }

    pub fn root(&self) -> &RequirementNode {
        &self.root
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Parse `version` and test it against this requirement.
    pub fn satisfied_by(&self, version: &str) -> DepnsResult<bool> {
        let version = Version::parse(version)?;
        Ok(self.matches(&version))
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.root.matches(version)
    }

    /// True when the top level is an AND/OR of two or more terms.
    pub fn composed(&self) -> bool {
        match &self.root {
            RequirementNode::And(children) | RequirementNode::Or(children) => children.len() >= 2,
            _ => false,
        }
    }

    /// The preferred version named by this requirement, if any.
    ///
    /// Within an AND group the last `=`/bare/`>=`/`<=` term wins; across OR
    /// alternatives the last alternative supplying one wins.
    /// `"1 & 2 | 3"` defaults to `3`, `">1"` has no default.
    pub fn default(&self) -> Option<String> {
        self.root.default_version().map(ToString::to_string)
    }
}

impl fmt::Display for VersionRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    LParen,
    RParen,
    And,
    Or,
    Not,
    Cmp(Comparator),
    Version(Version),
}

impl TokenKind {
    fn starts_term(&self) -> bool {
        matches!(
            self,
            TokenKind::Not | TokenKind::Cmp(_) | TokenKind::Version(_) | TokenKind::LParen
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::LParen => f.write_str("'('"),
            TokenKind::RParen => f.write_str("')'"),
            TokenKind::And => f.write_str("'&'"),
            TokenKind::Or => f.write_str("'|'"),
            TokenKind::Not => f.write_str("'!'"),
            TokenKind::Cmp(cmp) => write!(f, "'{cmp}'"),
            TokenKind::Version(v) => write!(f, "'{v}'"),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    offset: usize,
    len: usize,
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '.' || c == '-'
}

fn tokenize(input: &str) -> DepnsResult<Vec<Token>> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some((offset, ch)) = chars.next() {
        let next = bytes.get(offset + 1).copied();
        let (kind, len) = match ch {
            c if c.is_whitespace() => continue,
            '(' => (TokenKind::LParen, 1),
            ')' => (TokenKind::RParen, 1),
            '&' if next == Some(b'&') => (TokenKind::And, 2),
            '&' => (TokenKind::And, 1),
            '|' if next == Some(b'|') => (TokenKind::Or, 2),
            '|' => (TokenKind::Or, 1),
            '!' if next == Some(b'=') => (TokenKind::Cmp(Comparator::Ne), 2),
            '!' => (TokenKind::Not, 1),
            '=' if next == Some(b'=') => (TokenKind::Cmp(Comparator::Eq), 2),
            '=' => (TokenKind::Cmp(Comparator::Eq), 1),
            '>' if next == Some(b'=') => (TokenKind::Cmp(Comparator::Ge), 2),
            '>' => (TokenKind::Cmp(Comparator::Gt), 1),
            '<' if next == Some(b'=') => (TokenKind::Cmp(Comparator::Le), 2),
            '<' => (TokenKind::Cmp(Comparator::Lt), 1),
            '~' if next == Some(b'>') => (TokenKind::Cmp(Comparator::Pessimistic), 2),
            '~' => {
                return Err(DepnsError::parse(
                    input,
                    offset,
                    1,
                    format!("unknown operator '~' at position {offset}, expected '~>'"),
                ))
            }
            c if is_word_char(c) => {
                let mut end = offset + c.len_utf8();
                while let Some(&(i, c)) = chars.peek() {
                    if !is_word_char(c) {
                        break;
                    }
                    end = i + c.len_utf8();
                    chars.next();
                }
                let word = &input[offset..end];
                let kind = match word.to_ascii_lowercase().as_str() {
                    "and" => TokenKind::And,
                    "or" => TokenKind::Or,
                    "not" => TokenKind::Not,
                    _ if Version::is_valid(word) => TokenKind::Version(Version::parse(word)?),
                    _ => {
                        return Err(DepnsError::parse(
                            input,
                            offset,
                            word.len(),
                            format!("invalid version operand {word:?} at position {offset}"),
                        ))
                    }
                };
                tokens.push(Token {
                    kind,
                    offset,
                    len: word.len(),
                });
                continue;
            }
            c => {
                return Err(DepnsError::parse(
                    input,
                    offset,
                    c.len_utf8(),
                    format!("invalid character {c:?} at position {offset}"),
                ))
            }
        };
        if len == 2 {
            chars.next();
        }
        tokens.push(Token { kind, offset, len });
    }

    Ok(tokens)
}

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error_at(&self, token: &Token, message: String) -> DepnsError {
        DepnsError::parse(self.input, token.offset, token.len, message)
    }

    fn error_at_end(&self, message: &str) -> DepnsError {
        DepnsError::parse(self.input, self.input.len(), 0, message)
    }

    fn parse_or(&mut self) -> DepnsResult<RequirementNode> {
        let mut alternatives = vec![self.parse_and()?];
        while matches!(self.peek(), Some(t) if t.kind == TokenKind::Or) {
            self.next();
            alternatives.push(self.parse_and()?);
        }
        Ok(collapse(alternatives, false))
    }

    fn parse_and(&mut self) -> DepnsResult<RequirementNode> {
        let mut terms = vec![self.parse_unary()?];
        loop {
            match self.peek() {
                Some(t) if t.kind == TokenKind::And => {
                    self.next();
                    terms.push(self.parse_unary()?);
                }
                Some(t) if t.kind.starts_term() => terms.push(self.parse_unary()?),
                _ => break,
            }
        }
        Ok(collapse(terms, true))
    }

    fn parse_unary(&mut self) -> DepnsResult<RequirementNode> {
        if matches!(self.peek(), Some(t) if t.kind == TokenKind::Not) {
            self.next();
            let inner = self.parse_unary()?;
            return Ok(RequirementNode::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> DepnsResult<RequirementNode> {
        let Some(token) = self.next() else {
            return Err(self.error_at_end("unexpected end of requirement, expected a version"));
        };
        match token.kind {
            TokenKind::Version(ref v) => Ok(RequirementNode::Literal(Comparator::Eq, v.clone())),
            TokenKind::Cmp(cmp) => match self.next() {
                Some(Token {
                    kind: TokenKind::Version(v),
                    ..
                }) => Ok(RequirementNode::Literal(cmp, v)),
                Some(other) => Err(self.error_at(
                    &other,
                    format!("expected a version after '{cmp}', found {}", other.kind),
                )),
                None => Err(self.error_at(&token, format!("expected a version after '{cmp}'"))),
            },
            TokenKind::LParen => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token {
                        kind: TokenKind::RParen,
                        ..
                    }) => Ok(inner),
                    _ => Err(self.error_at(&token, "unmatched '('".to_string())),
                }
            }
            TokenKind::RParen => Err(self.error_at(&token, "unmatched ')'".to_string())),
            TokenKind::And | TokenKind::Or | TokenKind::Not => Err(self.error_at(
                &token,
                format!("expected a version or '(' but found {}", token.kind),
            )),
        }
    }
}

/// Build an n-ary node, splicing nested nodes of the same kind.
fn collapse(mut nodes: Vec<RequirementNode>, conjunction: bool) -> RequirementNode {
    if nodes.len() == 1 {
        return nodes.remove(0);
    }
    let mut flat = Vec::with_capacity(nodes.len());
    for node in nodes {
        match (node, conjunction) {
            (RequirementNode::And(children), true) | (RequirementNode::Or(children), false) => {
                flat.extend(children)
            }
            (other, _) => flat.push(other),
        }
    }
    if conjunction {
        RequirementNode::And(flat)
    } else {
        RequirementNode::Or(flat)
    }
}
