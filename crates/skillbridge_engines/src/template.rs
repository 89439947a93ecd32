#![forbid(unsafe_code)]

//! Speech and action-data templates.
//!
//! A small Jinja-flavoured language: `{{ expr }}` output, `{% if %}` /
//! `{% elif %}` / `{% else %}` / `{% endif %}` blocks, `{# comments #}` and
//! `-` whitespace control on every delimiter. Templates are parsed once into an
//! AST and evaluated per request against a [`TemplateContext`]; state lookups
//! go straight to the bound [`StateAccessor`] on every reference.

use std::collections::BTreeMap;

use serde_json::Value as JsonValue;
use skillbridge_contracts::state::{StateAccessor, STATE_UNKNOWN};
use skillbridge_contracts::ReasonCodeId;

pub mod reason_codes {
    use skillbridge_contracts::ReasonCodeId;

    // Template engine reason-code namespace.
    pub const TEMPLATE_SYNTAX_INVALID: ReasonCodeId = ReasonCodeId(0x5442_00F1);
    pub const TEMPLATE_UNKNOWN_FUNCTION: ReasonCodeId = ReasonCodeId(0x5442_00F2);
    pub const TEMPLATE_ARITY_MISMATCH: ReasonCodeId = ReasonCodeId(0x5442_00F3);
    pub const TEMPLATE_BUDGET_EXCEEDED: ReasonCodeId = ReasonCodeId(0x5442_00F4);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplateEngineConfig {
    pub max_source_bytes: usize,
    pub max_nesting_depth: usize,
}

impl TemplateEngineConfig {
    pub fn mvp_v1() -> Self {
        Self {
            max_source_bytes: 16 * 1024,
            max_nesting_depth: 32,
        }
    }
}

impl Default for TemplateEngineConfig {
    fn default() -> Self {
        Self::mvp_v1()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateRenderError {
    #[error("template syntax error at byte {offset}: {message}")]
    Syntax { offset: usize, message: String },
    #[error("unknown template function '{name}'")]
    UnknownFunction { name: String },
    #[error("template function '{name}' takes {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("template nesting deeper than {max}")]
    NestingTooDeep { max: usize },
    #[error("template source larger than {max} bytes")]
    TooLong { max: usize },
}

impl TemplateRenderError {
    pub fn reason_code(&self) -> ReasonCodeId {
        match self {
            Self::Syntax { .. } => reason_codes::TEMPLATE_SYNTAX_INVALID,
            Self::UnknownFunction { .. } => reason_codes::TEMPLATE_UNKNOWN_FUNCTION,
            Self::Arity { .. } => reason_codes::TEMPLATE_ARITY_MISMATCH,
            Self::NestingTooDeep { .. } | Self::TooLong { .. } => {
                reason_codes::TEMPLATE_BUDGET_EXCEEDED
            }
        }
    }

    fn syntax(offset: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            offset,
            message: message.into(),
        }
    }
}

/// Per-request evaluation scope: slot values plus a live state lookup.
pub struct TemplateContext<'a> {
    slots: &'a BTreeMap<String, String>,
    states: &'a dyn StateAccessor,
}

impl<'a> TemplateContext<'a> {
    pub fn new(slots: &'a BTreeMap<String, String>, states: &'a dyn StateAccessor) -> Self {
        Self { slots, states }
    }

    fn slot(&self, name: &str) -> Value {
        match self.slots.get(name) {
            Some(v) => Value::Str(v.clone()),
            None => Value::Undefined,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    nodes: Vec<Node>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateRenderError> {
        Self::parse_with_config(source, &TemplateEngineConfig::mvp_v1())
    }

    pub fn parse_with_config(
        source: &str,
        config: &TemplateEngineConfig,
    ) -> Result<Self, TemplateRenderError> {
        if source.len() > config.max_source_bytes {
            return Err(TemplateRenderError::TooLong {
                max: config.max_source_bytes,
            });
        }
        let segments = apply_whitespace_control(scan_segments(source)?);
        let mut parser = BlockParser {
            segments,
            pos: 0,
            max_depth: config.max_nesting_depth,
            pending_elif: None,
        };
        let (nodes, terminator) = parser.parse_block(0)?;
        if let Some((tag, offset)) = terminator {
            return Err(TemplateRenderError::syntax(
                offset,
                format!("unexpected '{{% {tag} %}}' without open block"),
            ));
        }
        Ok(Self { nodes })
    }

    /// True when rendering can only ever produce the literal source text.
    pub fn is_static(&self) -> bool {
        self.nodes.iter().all(|n| matches!(n, Node::Text(_)))
    }

    /// Renders against `ctx`; the result is trimmed of surrounding whitespace.
    pub fn render(&self, ctx: &TemplateContext<'_>) -> Result<String, TemplateRenderError> {
        let mut out = String::new();
        render_nodes(&self.nodes, ctx, &mut out)?;
        Ok(out.trim().to_string())
    }
}

// ---------------------------------------------------------------------------
// Segment scanning and whitespace control

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Text(String),
    Output { src: String, offset: usize },
    Tag { src: String, offset: usize },
    Comment,
}

#[derive(Debug)]
struct Marked {
    segment: Segment,
    trim_left: bool,
    trim_right: bool,
}

fn scan_segments(source: &str) -> Result<Vec<Marked>, TemplateRenderError> {
    let bytes = source.as_bytes();
    let mut out = Vec::new();
    let mut text_start = 0;
    let mut i = 0;

    while i + 1 < bytes.len() {
        if bytes[i] != b'{' || !matches!(bytes[i + 1], b'{' | b'%' | b'#') {
            i += 1;
            continue;
        }
        let kind = bytes[i + 1];
        if text_start < i {
            out.push(Marked {
                segment: Segment::Text(source[text_start..i].to_string()),
                trim_left: false,
                trim_right: false,
            });
        }
        let open_at = i;
        let mut inner_start = i + 2;
        let trim_left = bytes.get(inner_start) == Some(&b'-');
        if trim_left {
            inner_start += 1;
        }
        let close = match kind {
            b'{' => b'}',
            b'%' => b'%',
            _ => b'#',
        };
        let close_at = find_close(bytes, inner_start, close, kind != b'#').ok_or_else(|| {
            TemplateRenderError::syntax(open_at, "unclosed template delimiter")
        })?;
        let mut inner_end = close_at;
        let trim_right = inner_end > inner_start && bytes[inner_end - 1] == b'-';
        if trim_right {
            inner_end -= 1;
        }
        let inner = source[inner_start..inner_end].to_string();
        let segment = match kind {
            b'{' => Segment::Output {
                src: inner,
                offset: inner_start,
            },
            b'%' => Segment::Tag {
                src: inner,
                offset: inner_start,
            },
            _ => Segment::Comment,
        };
        out.push(Marked {
            segment,
            trim_left,
            trim_right,
        });
        i = close_at + 2;
        text_start = i;
    }

    if text_start < source.len() {
        out.push(Marked {
            segment: Segment::Text(source[text_start..].to_string()),
            trim_left: false,
            trim_right: false,
        });
    }
    Ok(out)
}

/// Finds `<close>}` starting at `from`, skipping quoted strings in expressions.
fn find_close(bytes: &[u8], from: usize, close: u8, quote_aware: bool) -> Option<usize> {
    let mut i = from;
    let mut quote: Option<u8> = None;
    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == q {
                quote = None;
            }
        } else if quote_aware && (b == b'"' || b == b'\'') {
            quote = Some(b);
        } else if b == close && bytes.get(i + 1) == Some(&b'}') {
            return Some(i);
        }
        i += 1;
    }
    None
}

fn apply_whitespace_control(mut marked: Vec<Marked>) -> Vec<Segment> {
    for idx in 0..marked.len() {
        if marked[idx].trim_left && idx > 0 {
            if let Segment::Text(t) = &mut marked[idx - 1].segment {
                let kept = t.trim_end().len();
                t.truncate(kept);
            }
        }
        if marked[idx].trim_right && idx + 1 < marked.len() {
            if let Segment::Text(t) = &mut marked[idx + 1].segment {
                *t = t.trim_start().to_string();
            }
        }
    }
    marked
        .into_iter()
        .map(|m| m.segment)
        .filter(|s| !matches!(s, Segment::Comment) && !matches!(s, Segment::Text(t) if t.is_empty()))
        .collect()
}

// ---------------------------------------------------------------------------
// Block structure

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Output(Expr),
    If {
        branches: Vec<(Expr, Vec<Node>)>,
        otherwise: Vec<Node>,
    },
}

struct BlockParser {
    segments: Vec<Segment>,
    pos: usize,
    max_depth: usize,
    pending_elif: Option<Expr>,
}

enum TagKind {
    If(Expr),
    Elif(Expr),
    Else,
    Endif,
}

impl BlockParser {
    /// Parses nodes until a block-closing tag (`elif`/`else`/`endif`) or the
    /// end of input. The closing tag is consumed and returned.
    fn parse_block(
        &mut self,
        depth: usize,
    ) -> Result<(Vec<Node>, Option<(&'static str, usize)>), TemplateRenderError> {
        let mut nodes = Vec::new();
        while self.pos < self.segments.len() {
            let segment = self.segments[self.pos].clone();
            self.pos += 1;
            match segment {
                Segment::Text(t) => nodes.push(Node::Text(t)),
                Segment::Output { src, offset } => {
                    nodes.push(Node::Output(parse_expr(&src, offset, self.max_depth)?))
                }
                Segment::Comment => {}
                Segment::Tag { src, offset } => match parse_tag(&src, offset, self.max_depth)? {
                    TagKind::If(cond) => nodes.push(self.parse_if(cond, offset, depth + 1)?),
                    TagKind::Elif(cond) => {
                        self.pending_elif = Some(cond);
                        return Ok((nodes, Some(("elif", offset))));
                    }
                    TagKind::Else => return Ok((nodes, Some(("else", offset)))),
                    TagKind::Endif => return Ok((nodes, Some(("endif", offset)))),
                },
            }
        }
        Ok((nodes, None))
    }

    fn parse_if(
        &mut self,
        first: Expr,
        open_offset: usize,
        depth: usize,
    ) -> Result<Node, TemplateRenderError> {
        if depth > self.max_depth {
            return Err(TemplateRenderError::NestingTooDeep {
                max: self.max_depth,
            });
        }
        let mut branches = Vec::new();
        let mut cond = first;
        loop {
            let (body, terminator) = self.parse_block(depth)?;
            branches.push((cond, body));
            match terminator {
                Some(("elif", _)) => {
                    cond = self.pending_elif.take().ok_or_else(|| {
                        TemplateRenderError::syntax(open_offset, "elif without condition")
                    })?;
                }
                Some(("else", else_offset)) => {
                    let (otherwise, end) = self.parse_block(depth)?;
                    return match end {
                        Some(("endif", _)) => Ok(Node::If {
                            branches,
                            otherwise,
                        }),
                        Some((tag, offset)) => Err(TemplateRenderError::syntax(
                            offset,
                            format!("unexpected '{tag}' after else"),
                        )),
                        None => Err(TemplateRenderError::syntax(
                            else_offset,
                            "missing endif after else",
                        )),
                    };
                }
                Some(("endif", _)) => {
                    return Ok(Node::If {
                        branches,
                        otherwise: Vec::new(),
                    })
                }
                _ => return Err(TemplateRenderError::syntax(open_offset, "missing endif")),
            }
        }
    }
}

fn parse_tag(src: &str, offset: usize, max_depth: usize) -> Result<TagKind, TemplateRenderError> {
    let trimmed = src.trim();
    let (keyword, rest) = match trimmed.find(|c: char| c.is_whitespace()) {
        Some(at) => (&trimmed[..at], &trimmed[at..]),
        None => (trimmed, ""),
    };
    let expr_offset = offset + (src.len() - src.trim_start().len()) + keyword.len();
    match keyword {
        "if" => Ok(TagKind::If(parse_expr(rest, expr_offset, max_depth)?)),
        "elif" => Ok(TagKind::Elif(parse_expr(rest, expr_offset, max_depth)?)),
        "else" if rest.trim().is_empty() => Ok(TagKind::Else),
        "endif" if rest.trim().is_empty() => Ok(TagKind::Endif),
        "" => Err(TemplateRenderError::syntax(offset, "empty block tag")),
        other => Err(TemplateRenderError::syntax(
            offset,
            format!("unsupported block tag '{other}'"),
        )),
    }
}

// ---------------------------------------------------------------------------
// Expressions

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Var(String),
    Call { name: String, args: Vec<Expr> },
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Eq(Box<Expr>, Box<Expr>),
    Ne(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    LParen,
    RParen,
    Comma,
    EqEq,
    NotEq,
}

fn tokenize(src: &str, base: usize) -> Result<Vec<(Token, usize)>, TemplateRenderError> {
    let chars: Vec<(usize, char)> = src.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let (at, c) = chars[i];
        let offset = base + at;
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push((Token::LParen, offset));
                i += 1;
            }
            ')' => {
                tokens.push((Token::RParen, offset));
                i += 1;
            }
            ',' => {
                tokens.push((Token::Comma, offset));
                i += 1;
            }
            '=' | '!' => {
                if chars.get(i + 1).map(|(_, n)| *n) != Some('=') {
                    return Err(TemplateRenderError::syntax(offset, format!("unexpected '{c}'")));
                }
                tokens.push((if c == '=' { Token::EqEq } else { Token::NotEq }, offset));
                i += 2;
            }
            '"' | '\'' => {
                let mut value = String::new();
                let mut j = i + 1;
                loop {
                    let Some(&(_, n)) = chars.get(j) else {
                        return Err(TemplateRenderError::syntax(offset, "unterminated string"));
                    };
                    if n == c {
                        break;
                    }
                    if n == '\\' {
                        if let Some(&(_, escaped)) = chars.get(j + 1) {
                            value.push(match escaped {
                                'n' => '\n',
                                't' => '\t',
                                other => other,
                            });
                            j += 2;
                            continue;
                        }
                    }
                    value.push(n);
                    j += 1;
                }
                tokens.push((Token::Str(value), offset));
                i = j + 1;
            }
            c if c.is_ascii_digit() => {
                let mut j = i;
                while chars
                    .get(j)
                    .is_some_and(|(_, n)| n.is_ascii_digit() || *n == '.')
                {
                    j += 1;
                }
                let end = chars.get(j).map_or(src.len(), |(a, _)| *a);
                let num = src[at..end]
                    .parse::<f64>()
                    .map_err(|_| TemplateRenderError::syntax(offset, "invalid number"))?;
                tokens.push((Token::Num(num), offset));
                i = j;
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut j = i;
                while chars
                    .get(j)
                    .is_some_and(|(_, n)| n.is_alphanumeric() || *n == '_')
                {
                    j += 1;
                }
                let end = chars.get(j).map_or(src.len(), |(a, _)| *a);
                tokens.push((Token::Ident(src[at..end].to_string()), offset));
                i = j;
            }
            other => {
                return Err(TemplateRenderError::syntax(
                    offset,
                    format!("unexpected character '{other}'"),
                ))
            }
        }
    }
    Ok(tokens)
}

fn parse_expr(src: &str, offset: usize, max_depth: usize) -> Result<Expr, TemplateRenderError> {
    let tokens = tokenize(src, offset)?;
    if tokens.is_empty() {
        return Err(TemplateRenderError::syntax(offset, "empty expression"));
    }
    let mut p = ExprParser {
        tokens,
        pos: 0,
        end_offset: offset + src.len(),
        depth: 0,
        max_depth,
    };
    let expr = p.parse_or()?;
    if let Some((tok, at)) = p.tokens.get(p.pos) {
        return Err(TemplateRenderError::syntax(
            *at,
            format!("unexpected token {tok:?}"),
        ));
    }
    Ok(expr)
}

/// Recursive descent over the token stream. `depth` counts open parentheses,
/// `not` prefixes and call argument lists; `and`/`or` chains stay flat.
struct ExprParser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    end_offset: usize,
    depth: usize,
    max_depth: usize,
}

impl ExprParser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map_or(self.end_offset, |(_, at)| *at)
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if matches!(self.peek(), Some(Token::Ident(w)) if w == kw) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn expect(&mut self, want: &Token) -> Result<(), TemplateRenderError> {
        if self.peek() == Some(want) {
            self.pos += 1;
            return Ok(());
        }
        Err(TemplateRenderError::syntax(
            self.offset(),
            format!("expected {want:?}"),
        ))
    }

    fn descend(&mut self) -> Result<(), TemplateRenderError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(TemplateRenderError::NestingTooDeep {
                max: self.max_depth,
            });
        }
        Ok(())
    }

    fn ascend(&mut self) {
        self.depth -= 1;
    }

    fn parse_or(&mut self) -> Result<Expr, TemplateRenderError> {
        let mut terms = vec![self.parse_and()?];
        while self.eat_keyword("or") {
            terms.push(self.parse_and()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::Or(terms)
        })
    }

    fn parse_and(&mut self) -> Result<Expr, TemplateRenderError> {
        let mut terms = vec![self.parse_not()?];
        while self.eat_keyword("and") {
            terms.push(self.parse_not()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::And(terms)
        })
    }

    fn parse_not(&mut self) -> Result<Expr, TemplateRenderError> {
        if self.eat_keyword("not") {
            self.descend()?;
            let inner = self.parse_not()?;
            self.ascend();
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<Expr, TemplateRenderError> {
        let lhs = self.parse_primary()?;
        match self.peek() {
            Some(Token::EqEq) => {
                self.pos += 1;
                Ok(Expr::Eq(Box::new(lhs), Box::new(self.parse_primary()?)))
            }
            Some(Token::NotEq) => {
                self.pos += 1;
                Ok(Expr::Ne(Box::new(lhs), Box::new(self.parse_primary()?)))
            }
            _ => Ok(lhs),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, TemplateRenderError> {
        let offset = self.offset();
        let Some((token, _)) = self.tokens.get(self.pos).cloned() else {
            return Err(TemplateRenderError::syntax(offset, "unexpected end of expression"));
        };
        self.pos += 1;
        match token {
            Token::Str(s) => Ok(Expr::Literal(Value::Str(s))),
            Token::Num(n) => Ok(Expr::Literal(Value::Num(n))),
            Token::LParen => {
                self.descend()?;
                let inner = self.parse_or()?;
                self.expect(&Token::RParen)?;
                self.ascend();
                Ok(inner)
            }
            Token::Ident(name) => match name.as_str() {
                "true" | "True" => Ok(Expr::Literal(Value::Bool(true))),
                "false" | "False" => Ok(Expr::Literal(Value::Bool(false))),
                "none" | "None" => Ok(Expr::Literal(Value::None)),
                "and" | "or" | "not" => Err(TemplateRenderError::syntax(
                    offset,
                    format!("unexpected keyword '{name}'"),
                )),
                _ if self.peek() == Some(&Token::LParen) => {
                    self.pos += 1;
                    self.descend()?;
                    let mut args = Vec::new();
                    if self.peek() != Some(&Token::RParen) {
                        loop {
                            args.push(self.parse_or()?);
                            if self.peek() == Some(&Token::Comma) {
                                self.pos += 1;
                                continue;
                            }
                            break;
                        }
                    }
                    self.expect(&Token::RParen)?;
                    self.ascend();
                    Ok(Expr::Call { name, args })
                }
                _ => Ok(Expr::Var(name)),
            },
            other => Err(TemplateRenderError::syntax(
                offset,
                format!("unexpected token {other:?}"),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Str(String),
    Num(f64),
    Bool(bool),
    None,
    Undefined,
}

impl Value {
    fn from_json(v: &JsonValue) -> Self {
        match v {
            JsonValue::Null => Value::None,
            JsonValue::Bool(b) => Value::Bool(*b),
            JsonValue::Number(n) => n.as_f64().map_or(Value::None, Value::Num),
            JsonValue::String(s) => Value::Str(s.clone()),
            other => Value::Str(other.to_string()),
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Value::Str(s) => !s.is_empty(),
            Value::Num(n) => *n != 0.0,
            Value::Bool(b) => *b,
            Value::None | Value::Undefined => false,
        }
    }

    fn render(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Num(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            Value::Num(n) => n.to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::None => "None".to_string(),
            Value::Undefined => String::new(),
        }
    }
}

fn render_nodes(
    nodes: &[Node],
    ctx: &TemplateContext<'_>,
    out: &mut String,
) -> Result<(), TemplateRenderError> {
    for node in nodes {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Output(expr) => out.push_str(&eval(expr, ctx)?.render()),
            Node::If {
                branches,
                otherwise,
            } => {
                let mut taken = false;
                for (cond, body) in branches {
                    if eval(cond, ctx)?.truthy() {
                        render_nodes(body, ctx, out)?;
                        taken = true;
                        break;
                    }
                }
                if !taken {
                    render_nodes(otherwise, ctx, out)?;
                }
            }
        }
    }
    Ok(())
}

fn eval(expr: &Expr, ctx: &TemplateContext<'_>) -> Result<Value, TemplateRenderError> {
    Ok(match expr {
        Expr::Literal(v) => v.clone(),
        Expr::Var(name) => ctx.slot(name),
        Expr::Not(inner) => Value::Bool(!eval(inner, ctx)?.truthy()),
        // Short-circuit: the first falsy (and) or truthy (or) operand wins,
        // otherwise the last one.
        Expr::And(terms) => {
            let mut last = Value::Undefined;
            for term in terms {
                last = eval(term, ctx)?;
                if !last.truthy() {
                    break;
                }
            }
            last
        }
        Expr::Or(terms) => {
            let mut last = Value::Undefined;
            for term in terms {
                last = eval(term, ctx)?;
                if last.truthy() {
                    break;
                }
            }
            last
        }
        Expr::Eq(a, b) => Value::Bool(eval(a, ctx)? == eval(b, ctx)?),
        Expr::Ne(a, b) => Value::Bool(eval(a, ctx)? != eval(b, ctx)?),
        Expr::Call { name, args } => call_function(name, args, ctx)?,
    })
}

fn call_function(
    name: &str,
    args: &[Expr],
    ctx: &TemplateContext<'_>,
) -> Result<Value, TemplateRenderError> {
    let expected = match name {
        "states" => 1,
        "is_state" | "state_attr" => 2,
        "is_state_attr" => 3,
        _ => {
            return Err(TemplateRenderError::UnknownFunction {
                name: name.to_string(),
            })
        }
    };
    if args.len() != expected {
        return Err(TemplateRenderError::Arity {
            name: name.to_string(),
            expected,
            got: args.len(),
        });
    }
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        values.push(eval(arg, ctx)?);
    }
    let entity_id = values[0].render();
    let snapshot = ctx.states.get(&entity_id);

    Ok(match name {
        "states" => Value::Str(
            snapshot.map_or_else(|| STATE_UNKNOWN.to_string(), |s| s.state),
        ),
        "is_state" => Value::Bool(snapshot.is_some_and(|s| s.state == values[1].render())),
        "state_attr" => snapshot
            .and_then(|s| s.attributes.get(&values[1].render()).map(Value::from_json))
            .unwrap_or(Value::Undefined),
        _ => Value::Bool(
            snapshot
                .and_then(|s| s.attributes.get(&values[1].render()).map(Value::from_json))
                .is_some_and(|attr| attr.render() == values[2].render()),
        ),
    })
}
