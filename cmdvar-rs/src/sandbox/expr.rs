//! Sandboxed expression lexer, AST, parser, and evaluator.
//!
//! Programs are `;`-separated statements:
//!
//! ```text
//! var greeting = 'hi'; `${greeting}, ${upper("bob")}!`
//! ```
//!
//! Operator precedence (lowest → highest):
//!   assign  →  ternary  →  or  →  and  →  equality  →  relational  →
//!   additive  →  multiplicative  →  unary  →  call  →  primary
//!
//! There are no loops and no user functions, and the expression tree is
//! capped at [`MAX_DEPTH`] levels, so every program terminates without
//! deep recursion.  Long operator chains count too: `1+1+…` builds a
//! left-deep tree.

use std::collections::HashMap;

use super::builtins::call_builtin;
use super::value::{check_len, ScriptValue};
use crate::error::SandboxError;

/// Maximum height of the expression tree: every parenthesis, unary or binary
/// operator, call, assignment, ternary and template literal on a path counts.
pub const MAX_DEPTH: usize = 64;

// ── Token ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Num(f64),
    Str(String),
    Template(Vec<TemplateToken>),
    Ident(String),

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,

    Eq,       // ==
    Ne,       // !=
    StrictEq, // ===
    StrictNe, // !==
    Lt,
    Le,
    Gt,
    Ge,

    And, // &&
    Or,  // ||

    Assign,
    Question,
    Colon,
    Comma,
    Semi,
    LParen,
    RParen,
    Eof,
}

/// Piece of a template literal before its `${…}` sources are parsed.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateToken {
    Text(String),
    Source(String),
}

// ── Lexer ─────────────────────────────────────────────────────────────────────

struct Lexer {
    src: Vec<char>,
    pos: usize,
}

impl Lexer {
    fn new(src: &str) -> Self {
        Lexer {
            src: src.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.src.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<char> {
        self.src.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn eat(&mut self, ch: char) -> bool {
        if self.peek() == Some(ch) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn read_number(&mut self, first: char) -> Result<Token, SandboxError> {
        let mut s = String::from(first);
        while let Some(c @ '0'..='9') = self.peek() {
            s.push(c);
            self.pos += 1;
        }
        if self.peek() == Some('.') && self.peek2().is_some_and(|c| c.is_ascii_digit()) {
            s.push('.');
            self.pos += 1;
            while let Some(c @ '0'..='9') = self.peek() {
                s.push(c);
                self.pos += 1;
            }
        }
        s.parse()
            .map(Token::Num)
            .map_err(|_| SandboxError::Syntax(format!("bad number {s:?}")))
    }

    fn read_escape(&mut self) -> Option<char> {
        Some(match self.advance()? {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            c => c,
        })
    }

    fn read_string(&mut self, quote: char) -> Result<Token, SandboxError> {
        let mut s = String::new();
        loop {
            match self.advance() {
                None | Some('\n') => {
                    return Err(SandboxError::Syntax("unterminated string".into()))
                }
                Some('\\') => match self.read_escape() {
                    Some(c) => s.push(c),
                    None => return Err(SandboxError::Syntax("unterminated string".into())),
                },
                Some(c) if c == quote => return Ok(Token::Str(s)),
                Some(c) => s.push(c),
            }
        }
    }

    /// Body of a `` `…` `` literal.  `${…}` sources are captured verbatim,
    /// tracking nested braces and quoted strings so `}` inside them does not
    /// end the interpolation early.
    fn read_template(&mut self) -> Result<Token, SandboxError> {
        let unterminated = || SandboxError::Syntax("unterminated template literal".into());
        let mut parts = Vec::new();
        let mut text = String::new();
        loop {
            match self.advance().ok_or_else(unterminated)? {
                '`' => break,
                '\\' => text.push(self.read_escape().ok_or_else(unterminated)?),
                '$' if self.peek() == Some('{') => {
                    self.pos += 1;
                    if !text.is_empty() {
                        parts.push(TemplateToken::Text(std::mem::take(&mut text)));
                    }
                    let mut source = String::new();
                    let mut depth = 0usize;
                    let mut quote: Option<char> = None;
                    loop {
                        let c = self.advance().ok_or_else(unterminated)?;
                        match (quote, c) {
                            (Some(q), c) if c == q => quote = None,
                            (Some(_), '\\') => {
                                source.push(c);
                                if let Some(next) = self.advance() {
                                    source.push(next);
                                }
                                continue;
                            }
                            (Some(_), _) => {}
                            (None, '\'' | '"' | '`') => quote = Some(c),
                            (None, '{') => depth += 1,
                            (None, '}') if depth == 0 => break,
                            (None, '}') => depth -= 1,
                            (None, _) => {}
                        }
                        source.push(c);
                    }
                    parts.push(TemplateToken::Source(source));
                }
                c => text.push(c),
            }
        }
        if !text.is_empty() {
            parts.push(TemplateToken::Text(text));
        }
        Ok(Token::Template(parts))
    }

    fn read_ident(&mut self, first: char) -> Token {
        let mut s = String::from(first);
        while let Some(c) = self.peek().filter(|c| c.is_alphanumeric() || *c == '_' || *c == '$') {
            s.push(c);
            self.pos += 1;
        }
        Token::Ident(s)
    }

    fn next_token(&mut self) -> Result<Token, SandboxError> {
        self.skip_ws();
        let Some(ch) = self.advance() else {
            return Ok(Token::Eof);
        };

        Ok(match ch {
            '0'..='9' => self.read_number(ch)?,
            '"' | '\'' => self.read_string(ch)?,
            '`' => self.read_template()?,
            c if c.is_alphabetic() || c == '_' || c == '$' => self.read_ident(c),
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '%' => Token::Percent,
            '!' => {
                if self.eat('=') {
                    if self.eat('=') {
                        Token::StrictNe
                    } else {
                        Token::Ne
                    }
                } else {
                    Token::Bang
                }
            }
            '=' => {
                if self.eat('=') {
                    if self.eat('=') {
                        Token::StrictEq
                    } else {
                        Token::Eq
                    }
                } else {
                    Token::Assign
                }
            }
            '<' => {
                if self.eat('=') {
                    Token::Le
                } else {
                    Token::Lt
                }
            }
            '>' => {
                if self.eat('=') {
                    Token::Ge
                } else {
                    Token::Gt
                }
            }
            '&' if self.eat('&') => Token::And,
            '|' if self.eat('|') => Token::Or,
            '?' => Token::Question,
            ':' => Token::Colon,
            ',' => Token::Comma,
            ';' => Token::Semi,
            '(' => Token::LParen,
            ')' => Token::RParen,
            c => return Err(SandboxError::Syntax(format!("unexpected character {c:?}"))),
        })
    }

    fn tokenize(mut self) -> Result<Vec<Token>, SandboxError> {
        let mut tokens = Vec::new();
        loop {
            let t = self.next_token()?;
            let done = t == Token::Eof;
            tokens.push(t);
            if done {
                return Ok(tokens);
            }
        }
    }
}

// ── AST ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Text(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(ScriptValue),
    Var(String),
    Template(Vec<TemplatePart>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Assign(String, Box<Expr>),
    Call(String, Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Declare(String, Expr),
    Expr(Expr),
}

const KEYWORDS: [&str; 7] = ["var", "let", "const", "true", "false", "null", "undefined"];

// ── Parser ────────────────────────────────────────────────────────────────────

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>, depth: usize) -> Self {
        Parser {
            tokens,
            pos: 0,
            depth,
        }
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens.get(self.pos).cloned().unwrap_or(Token::Eof);
        self.pos += 1;
        t
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == expected {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<(), SandboxError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(SandboxError::Syntax(format!("expected {what}, found {:?}", self.peek())))
        }
    }

    fn descend(&mut self) -> Result<(), SandboxError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(SandboxError::TooDeep(MAX_DEPTH));
        }
        Ok(())
    }

    // ── Grammar ───────────────────────────────────────────────────────────────

    fn parse_program(&mut self) -> Result<Vec<Stmt>, SandboxError> {
        let mut stmts = Vec::new();
        loop {
            while self.eat(&Token::Semi) {}
            if self.peek() == &Token::Eof {
                return Ok(stmts);
            }
            stmts.push(self.parse_stmt()?);
            if !self.eat(&Token::Semi) && self.peek() != &Token::Eof {
                return Err(SandboxError::Syntax(format!(
                    "expected ';', found {:?}",
                    self.peek()
                )));
            }
        }
    }

    fn parse_stmt(&mut self) -> Result<Stmt, SandboxError> {
        if let Token::Ident(kw) = self.peek() {
            if matches!(kw.as_str(), "var" | "let" | "const") {
                self.pos += 1;
                let name = match self.advance() {
                    Token::Ident(name) if !KEYWORDS.contains(&name.as_str()) => name,
                    other => {
                        return Err(SandboxError::Syntax(format!(
                            "expected a name after declaration, found {other:?}"
                        )))
                    }
                };
                let init = if self.eat(&Token::Assign) {
                    self.parse_assign()?
                } else {
                    Expr::Literal(ScriptValue::Undefined)
                };
                return Ok(Stmt::Declare(name, init));
            }
        }
        Ok(Stmt::Expr(self.parse_assign()?))
    }

    fn parse_assign(&mut self) -> Result<Expr, SandboxError> {
        if let Token::Ident(name) = self.peek().clone() {
            if self.tokens.get(self.pos + 1) == Some(&Token::Assign)
                && !KEYWORDS.contains(&name.as_str())
            {
                self.pos += 2;
                self.descend()?;
                let rhs = self.parse_assign()?;
                self.depth -= 1;
                return Ok(Expr::Assign(name, Box::new(rhs)));
            }
        }
        self.parse_ternary()
    }

    fn parse_ternary(&mut self) -> Result<Expr, SandboxError> {
        let cond = self.parse_or()?;
        if self.eat(&Token::Question) {
            self.descend()?;
            let then = self.parse_assign()?;
            self.expect(&Token::Colon, "':' in ternary")?;
            let else_ = self.parse_assign()?;
            self.depth -= 1;
            Ok(Expr::Ternary(Box::new(cond), Box::new(then), Box::new(else_)))
        } else {
            Ok(cond)
        }
    }

    fn parse_or(&mut self) -> Result<Expr, SandboxError> {
        let mut lhs = self.parse_and()?;
        let mut nodes = 0;
        while self.eat(&Token::Or) {
            self.descend()?;
            nodes += 1;
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        self.depth -= nodes;
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, SandboxError> {
        let mut lhs = self.parse_equality()?;
        let mut nodes = 0;
        while self.eat(&Token::And) {
            self.descend()?;
            nodes += 1;
            let rhs = self.parse_equality()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        self.depth -= nodes;
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr, SandboxError> {
        let mut lhs = self.parse_relational()?;
        let mut nodes = 0;
        loop {
            let op = match self.peek() {
                Token::Eq => BinOp::Eq,
                Token::Ne => BinOp::Ne,
                Token::StrictEq => BinOp::StrictEq,
                Token::StrictNe => BinOp::StrictNe,
                _ => break,
            };
            self.pos += 1;
            self.descend()?;
            nodes += 1;
            let rhs = self.parse_relational()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        self.depth -= nodes;
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> Result<Expr, SandboxError> {
        let mut lhs = self.parse_additive()?;
        let mut nodes = 0;
        loop {
            let op = match self.peek() {
                Token::Lt => BinOp::Lt,
                Token::Le => BinOp::Le,
                Token::Gt => BinOp::Gt,
                Token::Ge => BinOp::Ge,
                _ => break,
            };
            self.pos += 1;
            self.descend()?;
            nodes += 1;
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        self.depth -= nodes;
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, SandboxError> {
        let mut lhs = self.parse_multiplicative()?;
        let mut nodes = 0;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            self.descend()?;
            nodes += 1;
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        self.depth -= nodes;
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, SandboxError> {
        let mut lhs = self.parse_unary()?;
        let mut nodes = 0;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::Percent => BinOp::Rem,
                _ => break,
            };
            self.pos += 1;
            self.descend()?;
            nodes += 1;
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        self.depth -= nodes;
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, SandboxError> {
        let op = match self.peek() {
            Token::Minus => UnaryOp::Neg,
            Token::Plus => UnaryOp::Plus,
            Token::Bang => UnaryOp::Not,
            _ => return self.parse_primary(),
        };
        self.pos += 1;
        self.descend()?;
        let inner = self.parse_unary()?;
        self.depth -= 1;
        Ok(Expr::Unary(op, Box::new(inner)))
    }

    fn parse_primary(&mut self) -> Result<Expr, SandboxError> {
        match self.advance() {
            Token::Num(n) => Ok(Expr::Literal(ScriptValue::Num(n))),
            Token::Str(s) => Ok(Expr::Literal(ScriptValue::Str(s))),
            Token::Template(parts) => self.parse_template(parts),
            Token::Ident(name) => match name.as_str() {
                "true" => Ok(Expr::Literal(ScriptValue::Bool(true))),
                "false" => Ok(Expr::Literal(ScriptValue::Bool(false))),
                "null" => Ok(Expr::Literal(ScriptValue::Null)),
                "undefined" => Ok(Expr::Literal(ScriptValue::Undefined)),
                "var" | "let" | "const" => Err(SandboxError::Syntax(format!(
                    "unexpected `{name}`"
                ))),
                _ if self.eat(&Token::LParen) => {
                    self.descend()?;
                    let mut args = Vec::new();
                    if self.peek() != &Token::RParen {
                        args.push(self.parse_assign()?);
                        while self.eat(&Token::Comma) {
                            args.push(self.parse_assign()?);
                        }
                    }
                    self.expect(&Token::RParen, &format!("')' after arguments to {name}"))?;
                    self.depth -= 1;
                    Ok(Expr::Call(name, args))
                }
                _ => Ok(Expr::Var(name)),
            },
            Token::LParen => {
                self.descend()?;
                let inner = self.parse_assign()?;
                self.expect(&Token::RParen, "')'")?;
                self.depth -= 1;
                Ok(inner)
            }
            other => Err(SandboxError::Syntax(format!("unexpected token {other:?}"))),
        }
    }

    fn parse_template(&mut self, parts: Vec<TemplateToken>) -> Result<Expr, SandboxError> {
        self.descend()?;
        let mut out = Vec::with_capacity(parts.len());
        for part in parts {
            out.push(match part {
                TemplateToken::Text(s) => TemplatePart::Text(s),
                TemplateToken::Source(src) => {
                    let tokens = Lexer::new(&src).tokenize()?;
                    let mut inner = Parser::new(tokens, self.depth);
                    let expr = inner.parse_assign()?;
                    if inner.peek() != &Token::Eof {
                        return Err(SandboxError::Syntax(format!(
                            "unexpected {:?} in template interpolation",
                            inner.peek()
                        )));
                    }
                    TemplatePart::Expr(expr)
                }
            });
        }
        self.depth -= 1;
        Ok(Expr::Template(out))
    }
}

/// Parse a sandboxed program.
pub fn parse_program(src: &str) -> Result<Vec<Stmt>, SandboxError> {
    let tokens = Lexer::new(src).tokenize()?;
    Parser::new(tokens, 0).parse_program()
}

// ── Evaluator ─────────────────────────────────────────────────────────────────

/// Local bindings of one program run.  Starts empty every time.
#[derive(Debug, Default)]
pub struct Scope {
    vars: HashMap<String, ScriptValue>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&ScriptValue> {
        self.vars.get(name)
    }
}

/// Run `stmts`; the value of the last expression statement is the result.
pub fn exec_program(stmts: &[Stmt], scope: &mut Scope) -> Result<ScriptValue, SandboxError> {
    let mut last = ScriptValue::Undefined;
    for stmt in stmts {
        match stmt {
            Stmt::Declare(name, init) => {
                let v = eval_expr(init, scope)?;
                scope.vars.insert(name.clone(), v);
            }
            Stmt::Expr(e) => last = eval_expr(e, scope)?,
        }
    }
    Ok(last)
}

/// Evaluate an [`Expr`] against `scope`.
pub fn eval_expr(expr: &Expr, scope: &mut Scope) -> Result<ScriptValue, SandboxError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),

        Expr::Var(name) => scope
            .vars
            .get(name)
            .cloned()
            .ok_or_else(|| SandboxError::Eval(format!("{name} is not defined"))),

        Expr::Template(parts) => {
            let mut out = String::new();
            for part in parts {
                match part {
                    TemplatePart::Text(s) => out.push_str(s),
                    TemplatePart::Expr(e) => out.push_str(&eval_expr(e, scope)?.to_string()),
                }
                check_len(&out, "template literal")?;
            }
            Ok(ScriptValue::Str(out))
        }

        Expr::Unary(op, inner) => {
            let v = eval_expr(inner, scope)?;
            Ok(match op {
                UnaryOp::Neg => v.neg(),
                UnaryOp::Plus => ScriptValue::Num(v.as_number()),
                UnaryOp::Not => ScriptValue::Bool(!v.as_bool()),
            })
        }

        Expr::Binary(op, lhs, rhs) => {
            // && and || short-circuit and return an operand, not a bool.
            match op {
                BinOp::And => {
                    let l = eval_expr(lhs, scope)?;
                    return if l.as_bool() { eval_expr(rhs, scope) } else { Ok(l) };
                }
                BinOp::Or => {
                    let l = eval_expr(lhs, scope)?;
                    return if l.as_bool() { Ok(l) } else { eval_expr(rhs, scope) };
                }
                _ => {}
            }
            let l = eval_expr(lhs, scope)?;
            let r = eval_expr(rhs, scope)?;
            eval_binop(*op, &l, &r)
        }

        Expr::Ternary(cond, then, else_) => {
            if eval_expr(cond, scope)?.as_bool() {
                eval_expr(then, scope)
            } else {
                eval_expr(else_, scope)
            }
        }

        Expr::Assign(name, rhs) => {
            if !scope.vars.contains_key(name) {
                return Err(SandboxError::Eval(format!("{name} is not defined")));
            }
            let v = eval_expr(rhs, scope)?;
            scope.vars.insert(name.clone(), v.clone());
            Ok(v)
        }

        Expr::Call(name, arg_exprs) => {
            let mut args = Vec::with_capacity(arg_exprs.len());
            for ae in arg_exprs {
                args.push(eval_expr(ae, scope)?);
            }
            call_builtin(name, args)
                .unwrap_or_else(|| Err(SandboxError::Eval(format!("{name} is not a function"))))
        }
    }
}

fn eval_binop(op: BinOp, l: &ScriptValue, r: &ScriptValue) -> Result<ScriptValue, SandboxError> {
    use std::cmp::Ordering;
    Ok(match op {
        BinOp::Add => l.add(r)?,
        BinOp::Sub => l.sub(r),
        BinOp::Mul => l.mul(r),
        BinOp::Div => l.div(r),
        BinOp::Rem => l.rem(r),
        BinOp::Eq => ScriptValue::Bool(l.loose_eq(r)),
        BinOp::Ne => ScriptValue::Bool(!l.loose_eq(r)),
        BinOp::StrictEq => ScriptValue::Bool(l.strict_eq(r)),
        BinOp::StrictNe => ScriptValue::Bool(!l.strict_eq(r)),
        BinOp::Lt => ScriptValue::Bool(l.compare(r) == Some(Ordering::Less)),
        BinOp::Le => ScriptValue::Bool(matches!(l.compare(r), Some(Ordering::Less | Ordering::Equal))),
        BinOp::Gt => ScriptValue::Bool(l.compare(r) == Some(Ordering::Greater)),
        BinOp::Ge => {
            ScriptValue::Bool(matches!(l.compare(r), Some(Ordering::Greater | Ordering::Equal)))
        }
        BinOp::And | BinOp::Or => unreachable!("short-circuited in eval_expr"),
    })
}

/// Parse and run `src` in a fresh scope.
pub fn eval_str(src: &str) -> Result<ScriptValue, SandboxError> {
    let program = parse_program(src)?;
    exec_program(&program, &mut Scope::new())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
