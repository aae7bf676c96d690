//! Condition expression parser.
//!
//! Parses the boolean condition texts proposed by the model into a small Java
//! expression tree. Only the forms a guard condition needs are accepted;
//! anything else (assignments, ternaries, casts, object creation, lambdas) is
//! a parse error and therefore illegal.
//!
//! ## Grammar
//!
//! ```text
//! <expr>     := <and> ("||" <and>)*
//! <and>      := <bitor> ("&&" <bitor>)*
//! <bitor>    := <bitxor> ("|" <bitxor>)*
//! <bitxor>   := <bitand> ("^" <bitand>)*
//! <bitand>   := <equality> ("&" <equality>)*
//! <equality> := <relation> (("==" | "!=") <relation>)*
//! <relation> := <shift> (("<" | "<=" | ">" | ">=") <shift> | "instanceof" <type>)*
//! <shift>    := <additive> (("<<" | ">>" | ">>>") <additive>)*
//! <additive> := <term> (("+" | "-") <term>)*
//! <term>     := <unary> (("*" | "/" | "%") <unary>)*
//! <unary>    := ("!" | "-" | "+" | "~") <unary> | <postfix>
//! <postfix>  := <primary> ("." ident [<args>] | "[" <expr> "]")*
//! <primary>  := literal | ident [<args>] | "(" <expr> ")"
//! ```

use thiserror::Error;
use winnow::ascii::multispace0;
use winnow::combinator::{delimited, separated};
use winnow::error::{ErrMode, ParserError};
use winnow::prelude::*;
use winnow::token::take_while;
use winnow::ModalResult;

/// Error type for condition parsing.
#[derive(Debug, Error)]
pub enum ExprError {
    /// Invalid expression syntax.
    #[error("invalid condition '{input}': {message}")]
    InvalidExpression { input: String, message: String },
}

// ============================================================================
// Expression Tree
// ============================================================================

/// A literal value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    Null,
    Bool(bool),
    /// Integer literal text (`42`, `0xFF`, `10L`).
    Int(String),
    /// Floating-point literal text (`1.5`, `2e10`, `3f`).
    Float(String),
    /// String literal body, escapes kept verbatim.
    Str(String),
    /// Character literal body, escapes kept verbatim.
    Char(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    BitOr,
    BitXor,
    BitAnd,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Shl,
    Shr,
    UShr,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    pub fn is_equality(self) -> bool {
        matches!(self, BinaryOp::Eq | BinaryOp::Ne)
    }

    pub fn is_relational(self) -> bool {
        matches!(self, BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    pub fn is_bitwise(self) -> bool {
        matches!(self, BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor)
    }

    pub fn is_shift(self) -> bool {
        matches!(self, BinaryOp::Shl | BinaryOp::Shr | BinaryOp::UShr)
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem
        )
    }
}

/// Parsed condition expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CondExpr {
    Literal(Literal),
    /// A bare identifier, including `this`.
    Name(String),
    /// `target.name`
    Field { target: Box<CondExpr>, name: String },
    /// `target.method(args)`, or `method(args)` when `target` is `None`.
    Call {
        target: Option<Box<CondExpr>>,
        method: String,
        args: Vec<CondExpr>,
    },
    /// `target[index]`
    Index {
        target: Box<CondExpr>,
        index: Box<CondExpr>,
    },
    Unary { op: UnaryOp, operand: Box<CondExpr> },
    Binary {
        op: BinaryOp,
        lhs: Box<CondExpr>,
        rhs: Box<CondExpr>,
    },
    /// `operand instanceof type_name`
    InstanceOf {
        operand: Box<CondExpr>,
        type_name: String,
    },
}

impl CondExpr {
    /// Visit this node and every descendant, parents first.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a CondExpr)) {
        visit(self);
        match self {
            CondExpr::Literal(_) | CondExpr::Name(_) => {}
            CondExpr::Field { target, .. } => target.walk(visit),
            CondExpr::Call { target, args, .. } => {
                if let Some(target) = target {
                    target.walk(visit);
                }
                for arg in args {
                    arg.walk(visit);
                }
            }
            CondExpr::Index { target, index } => {
                target.walk(visit);
                index.walk(visit);
            }
            CondExpr::Unary { operand, .. } => operand.walk(visit),
            CondExpr::Binary { lhs, rhs, .. } => {
                lhs.walk(visit);
                rhs.walk(visit);
            }
            CondExpr::InstanceOf { operand, .. } => operand.walk(visit),
        }
    }

    /// Whether the bare identifier `name` occurs anywhere in the tree.
    pub fn references(&self, name: &str) -> bool {
        let mut found = false;
        self.walk(&mut |node| {
            if matches!(node, CondExpr::Name(n) if n == name) {
                found = true;
            }
        });
        found
    }

    /// Whether this node is exactly the identifier `name`.
    pub fn is_name(&self, name: &str) -> bool {
        matches!(self, CondExpr::Name(n) if n == name)
    }

    /// The literal this node denotes, looking through a leading `-` or `+`.
    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            CondExpr::Literal(lit) => Some(lit),
            CondExpr::Unary {
                op: UnaryOp::Neg | UnaryOp::Plus,
                operand,
            } => match operand.as_ref() {
                CondExpr::Literal(lit @ (Literal::Int(_) | Literal::Float(_))) => Some(lit),
                _ => None,
            },
            _ => None,
        }
    }
}

// ============================================================================
// Entry Point
// ============================================================================

/// Parse a condition text into an expression tree.
///
/// # Examples
///
/// ```
/// use faultline_core::filter::{parse_condition, BinaryOp, CondExpr};
///
/// let expr = parse_condition("x == null").unwrap();
/// assert!(matches!(expr, CondExpr::Binary { op: BinaryOp::Eq, .. }));
///
/// assert!(parse_condition("x = null").is_err());
/// ```
pub fn parse_condition(input: &str) -> Result<CondExpr, ExprError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ExprError::InvalidExpression {
            input: input.to_string(),
            message: "empty expression".to_string(),
        });
    }

    parse_expr
        .parse(input)
        .map_err(|e| ExprError::InvalidExpression {
            input: input.to_string(),
            message: format!("{:?}", e),
        })
}

// ============================================================================
// Parser implementation using winnow
// ============================================================================

/// Every Java operator, longest first so prefixes never shadow longer tokens.
const OPERATORS: &[&str] = &[
    ">>>=", "<<=", ">>=", ">>>", "==", "!=", "<=", ">=", "&&", "||", "<<", ">>", "+=", "-=", "*=",
    "/=", "%=", "&=", "|=", "^=", "++", "--", "->", "<", ">", "+", "-", "*", "/", "%", "&", "|",
    "^", "!", "~", "=", "?", ":",
];

/// Reserved words that can never be an identifier in a condition.
const KEYWORDS: &[&str] = &[
    "abstract", "assert", "boolean", "break", "byte", "case", "catch", "char", "class", "const",
    "continue", "default", "do", "double", "else", "enum", "extends", "final", "finally", "float",
    "for", "goto", "if", "implements", "import", "instanceof", "int", "interface", "long",
    "native", "new", "package", "private", "protected", "public", "return", "short", "static",
    "strictfp", "super", "switch", "synchronized", "throw", "throws", "transient", "try", "void",
    "volatile", "while",
];

fn peek_operator(input: &str) -> Option<&'static str> {
    OPERATORS.iter().copied().find(|op| input.starts_with(op))
}

/// Consume the next operator if it is one of `ops`.
fn binary_operator(input: &mut &str, ops: &[(&str, BinaryOp)]) -> Option<BinaryOp> {
    let token = peek_operator(input)?;
    let (_, op) = ops.iter().find(|(text, _)| *text == token)?;
    *input = &input[token.len()..];
    Some(*op)
}

/// Left-associative binary level: `next (op next)*`.
fn binary_level(
    input: &mut &str,
    ops: &[(&str, BinaryOp)],
    next: fn(&mut &str) -> ModalResult<CondExpr>,
) -> ModalResult<CondExpr> {
    let mut lhs = next(input)?;
    loop {
        let _ = multispace0.parse_next(input)?;
        let Some(op) = binary_operator(input, ops) else {
            break;
        };
        let _ = multispace0.parse_next(input)?;
        let rhs = next(input)?;
        lhs = CondExpr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        };
    }
    Ok(lhs)
}

fn parse_expr(input: &mut &str) -> ModalResult<CondExpr> {
    binary_level(input, &[("||", BinaryOp::Or)], parse_and)
}

fn parse_and(input: &mut &str) -> ModalResult<CondExpr> {
    binary_level(input, &[("&&", BinaryOp::And)], parse_bitor)
}

fn parse_bitor(input: &mut &str) -> ModalResult<CondExpr> {
    binary_level(input, &[("|", BinaryOp::BitOr)], parse_bitxor)
}

fn parse_bitxor(input: &mut &str) -> ModalResult<CondExpr> {
    binary_level(input, &[("^", BinaryOp::BitXor)], parse_bitand)
}

fn parse_bitand(input: &mut &str) -> ModalResult<CondExpr> {
    binary_level(input, &[("&", BinaryOp::BitAnd)], parse_equality)
}

fn parse_equality(input: &mut &str) -> ModalResult<CondExpr> {
    binary_level(
        input,
        &[("==", BinaryOp::Eq), ("!=", BinaryOp::Ne)],
        parse_relation,
    )
}

/// Relational level; also handles `instanceof`.
fn parse_relation(input: &mut &str) -> ModalResult<CondExpr> {
    const OPS: &[(&str, BinaryOp)] = &[
        ("<", BinaryOp::Lt),
        ("<=", BinaryOp::Le),
        (">", BinaryOp::Gt),
        (">=", BinaryOp::Ge),
    ];

    let mut lhs = parse_shift(input)?;
    loop {
        let _ = multispace0.parse_next(input)?;
        if let Some(op) = binary_operator(input, OPS) {
            let _ = multispace0.parse_next(input)?;
            let rhs = parse_shift(input)?;
            lhs = CondExpr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        } else if parse_instanceof_keyword(input).is_ok() {
            let _ = multispace0.parse_next(input)?;
            let type_name = parse_type_name(input)?;
            lhs = CondExpr::InstanceOf {
                operand: Box::new(lhs),
                type_name,
            };
        } else {
            break;
        }
    }
    Ok(lhs)
}

fn parse_shift(input: &mut &str) -> ModalResult<CondExpr> {
    binary_level(
        input,
        &[
            ("<<", BinaryOp::Shl),
            (">>", BinaryOp::Shr),
            (">>>", BinaryOp::UShr),
        ],
        parse_additive,
    )
}

fn parse_additive(input: &mut &str) -> ModalResult<CondExpr> {
    binary_level(
        input,
        &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)],
        parse_term,
    )
}

fn parse_term(input: &mut &str) -> ModalResult<CondExpr> {
    binary_level(
        input,
        &[
            ("*", BinaryOp::Mul),
            ("/", BinaryOp::Div),
            ("%", BinaryOp::Rem),
        ],
        parse_unary,
    )
}

fn parse_unary(input: &mut &str) -> ModalResult<CondExpr> {
    let _ = multispace0.parse_next(input)?;

    let op = match peek_operator(input) {
        Some("!") => Some(UnaryOp::Not),
        Some("-") => Some(UnaryOp::Neg),
        Some("+") => Some(UnaryOp::Plus),
        Some("~") => Some(UnaryOp::BitNot),
        _ => None,
    };

    match op {
        Some(op) => {
            *input = &input[1..];
            let operand = parse_unary(input)?;
            Ok(CondExpr::Unary {
                op,
                operand: Box::new(operand),
            })
        }
        None => parse_postfix(input),
    }
}

/// Parse member access, method calls and indexing after a primary.
fn parse_postfix(input: &mut &str) -> ModalResult<CondExpr> {
    let mut expr = parse_primary(input)?;
    loop {
        let checkpoint = *input;
        let _ = multispace0.parse_next(input)?;
        if input.starts_with('.') {
            *input = &input[1..];
            let _ = multispace0.parse_next(input)?;
            let name = parse_identifier(input)?;
            let _ = multispace0.parse_next(input)?;
            if input.starts_with('(') {
                let args = parse_arguments(input)?;
                expr = CondExpr::Call {
                    target: Some(Box::new(expr)),
                    method: name,
                    args,
                };
            } else {
                expr = CondExpr::Field {
                    target: Box::new(expr),
                    name,
                };
            }
        } else if input.starts_with('[') {
            let index = delimited(('[', multispace0), parse_expr, (multispace0, ']'))
                .parse_next(input)?;
            expr = CondExpr::Index {
                target: Box::new(expr),
                index: Box::new(index),
            };
        } else {
            *input = checkpoint;
            break;
        }
    }
    Ok(expr)
}

fn parse_primary(input: &mut &str) -> ModalResult<CondExpr> {
    let _ = multispace0.parse_next(input)?;

    if input.starts_with('(') {
        return delimited(('(', multispace0), parse_expr, (multispace0, ')')).parse_next(input);
    }
    if input.starts_with('"') {
        return parse_string_literal(input).map(CondExpr::Literal);
    }
    if input.starts_with('\'') {
        return parse_char_literal(input).map(CondExpr::Literal);
    }
    if input.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        return parse_number_literal(input).map(CondExpr::Literal);
    }

    let name = parse_identifier(input)?;
    match name.as_str() {
        "null" => return Ok(CondExpr::Literal(Literal::Null)),
        "true" => return Ok(CondExpr::Literal(Literal::Bool(true))),
        "false" => return Ok(CondExpr::Literal(Literal::Bool(false))),
        _ => {}
    }

    let checkpoint = *input;
    let _ = multispace0.parse_next(input)?;
    if input.starts_with('(') {
        let args = parse_arguments(input)?;
        return Ok(CondExpr::Call {
            target: None,
            method: name,
            args,
        });
    }
    *input = checkpoint;
    Ok(CondExpr::Name(name))
}

/// Parse a parenthesized, comma-separated argument list.
fn parse_arguments(input: &mut &str) -> ModalResult<Vec<CondExpr>> {
    delimited(
        ('(', multispace0),
        separated(0.., parse_expr, (multispace0, ',', multispace0)),
        (multispace0, ')'),
    )
    .parse_next(input)
}

/// Parse a Java identifier that is not a reserved word.
fn parse_identifier(input: &mut &str) -> ModalResult<String> {
    let checkpoint = *input;
    if !input.starts_with(|c: char| c.is_alphabetic() || c == '_' || c == '$') {
        return Err(ErrMode::from_input(input));
    }
    let word: &str =
        take_while(1.., |c: char| c.is_alphanumeric() || c == '_' || c == '$').parse_next(input)?;

    if KEYWORDS.contains(&word) {
        *input = checkpoint;
        return Err(ErrMode::from_input(input));
    }
    Ok(word.to_string())
}

/// Parse the `instanceof` keyword, requiring a word boundary after it.
fn parse_instanceof_keyword(input: &mut &str) -> ModalResult<()> {
    let checkpoint = *input;
    let word: &str = take_while(1.., |c: char| c.is_alphanumeric() || c == '_' || c == '$')
        .parse_next(input)?;

    if word == "instanceof" {
        Ok(())
    } else {
        *input = checkpoint;
        Err(ErrMode::from_input(input))
    }
}

/// Parse a (possibly qualified, possibly array) type name after `instanceof`.
fn parse_type_name(input: &mut &str) -> ModalResult<String> {
    let mut name = parse_identifier(input)?;
    while input.starts_with('.') {
        *input = &input[1..];
        name.push('.');
        name.push_str(&parse_identifier(input)?);
    }
    while input.starts_with("[]") {
        *input = &input[2..];
        name.push_str("[]");
    }
    Ok(name)
}

/// Parse `"..."`, honoring backslash escapes.
fn parse_string_literal(input: &mut &str) -> ModalResult<Literal> {
    quoted_body(input, '"').map(Literal::Str)
}

/// Parse `'c'`, honoring backslash escapes.
fn parse_char_literal(input: &mut &str) -> ModalResult<Literal> {
    let checkpoint = *input;
    let body = quoted_body(input, '\'')?;
    if body.is_empty() {
        *input = checkpoint;
        return Err(ErrMode::from_input(input));
    }
    Ok(Literal::Char(body))
}

fn quoted_body(input: &mut &str, quote: char) -> ModalResult<String> {
    let checkpoint = *input;
    let Some(rest) = input.strip_prefix(quote) else {
        return Err(ErrMode::from_input(input));
    };

    let mut escaped = false;
    for (i, c) in rest.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if c == '\\' {
            escaped = true;
        } else if c == quote {
            let body = rest[..i].to_string();
            *input = &rest[i + c.len_utf8()..];
            return Ok(body);
        }
    }

    *input = checkpoint;
    Err(ErrMode::from_input(input))
}

/// Parse an integer or floating-point literal.
fn parse_number_literal(input: &mut &str) -> ModalResult<Literal> {
    let text = *input;
    let bytes = text.as_bytes();
    let hex = text.starts_with("0x") || text.starts_with("0X");

    let mut end = 0;
    let mut prev = 0u8;
    while end < bytes.len() {
        let b = bytes[end];
        let exponent_sign = !hex && matches!(b, b'+' | b'-') && matches!(prev, b'e' | b'E');
        if !(b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || exponent_sign) {
            break;
        }
        prev = b;
        end += 1;
    }

    match classify_number(&text[..end]) {
        Some(literal) => {
            *input = &text[end..];
            Ok(literal)
        }
        None => Err(ErrMode::from_input(input)),
    }
}

fn classify_number(text: &str) -> Option<Literal> {
    if let Some(digits) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        let digits = digits.trim_end_matches(['l', 'L']);
        let valid = !digits.is_empty()
            && digits.chars().all(|c| c.is_ascii_hexdigit() || c == '_');
        return valid.then(|| Literal::Int(text.to_string()));
    }

    if !text.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        return None;
    }

    let is_long = text.ends_with(['l', 'L']);
    let is_float_suffix = text.ends_with(['f', 'F', 'd', 'D']);
    let body = text.trim_end_matches(['l', 'L', 'f', 'F', 'd', 'D']);
    if body.is_empty() || !body.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let mut dots = 0;
    let mut exponents = 0;
    for c in body.chars() {
        match c {
            '0'..='9' | '_' | '+' | '-' => {}
            '.' => dots += 1,
            'e' | 'E' => exponents += 1,
            _ => return None,
        }
    }
    if dots > 1 || exponents > 1 {
        return None;
    }

    if dots == 0 && exponents == 0 && !is_float_suffix {
        Some(Literal::Int(text.to_string()))
    } else if is_long {
        None
    } else {
        Some(Literal::Float(text.to_string()))
    }
}
