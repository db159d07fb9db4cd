//! Recursive-descent parser turning a token stream into the host AST.

use super::ast::*;
use super::token::{Token, TokenKind};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

pub fn parse_program(tokens: Vec<Token>) -> Result<Vec<Stmt>, ParseError> {
    let mut parser = Parser { tokens, pos: 0 };
    parser.parse_top_level()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn line(&self) -> usize {
        self.tokens[self.pos].line
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn is_name(&self, name: &str) -> bool {
        matches!(self.peek(), TokenKind::Name(n) if n == name)
    }

    fn is_op(&self, op: &str) -> bool {
        matches!(self.peek(), TokenKind::Op(o) if o == op)
    }

    fn eat_op(&mut self, op: &str) -> Result<(), ParseError> {
        if self.is_op(op) {
            self.advance();
            Ok(())
        } else {
            Err(ParseError {
                line: self.line(),
                message: format!("expected '{op}', found {:?}", self.peek()),
            })
        }
    }

    fn eat_keyword(&mut self, kw: &str) -> Result<(), ParseError> {
        if self.is_name(kw) {
            self.advance();
            Ok(())
        } else {
            Err(ParseError {
                line: self.line(),
                message: format!("expected '{kw}', found {:?}", self.peek()),
            })
        }
    }

    fn expect_name(&mut self) -> Result<String, ParseError> {
        match self.peek().clone() {
            TokenKind::Name(n) => {
                self.advance();
                Ok(n)
            }
            other => Err(ParseError {
                line: self.line(),
                message: format!("expected a name, found {other:?}"),
            }),
        }
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek(), TokenKind::Newline) {
            self.advance();
        }
    }

    fn expect_newline_opt(&mut self) {
        if matches!(self.peek(), TokenKind::Newline) {
            self.advance();
        }
    }

    fn parse_top_level(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        loop {
            match self.peek() {
                TokenKind::Eof => break,
                TokenKind::Newline | TokenKind::Dedent => {
                    self.advance();
                    continue;
                }
                _ => stmts.push(self.parse_stmt()?),
            }
        }
        Ok(stmts)
    }

    fn parse_stmts_until_dedent_or_eof(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        loop {
            match self.peek() {
                TokenKind::Dedent | TokenKind::Eof => break,
                TokenKind::Newline => {
                    self.advance();
                    continue;
                }
                _ => stmts.push(self.parse_stmt()?),
            }
        }
        Ok(stmts)
    }

    fn parse_suite(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect_newline_opt();
        if !matches!(self.peek(), TokenKind::Indent) {
            return Err(ParseError {
                line: self.line(),
                message: "expected an indented block".to_string(),
            });
        }
        self.advance();
        let stmts = self.parse_stmts_until_dedent_or_eof()?;
        if matches!(self.peek(), TokenKind::Dedent) {
            self.advance();
        }
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        let kind = match self.peek().clone() {
            TokenKind::Name(ref n) if n == "if" => self.parse_if()?,
            TokenKind::Name(ref n) if n == "for" => self.parse_for()?,
            TokenKind::Name(ref n) if n == "while" => self.parse_while()?,
            TokenKind::Name(ref n) if n == "try" => self.parse_try()?,
            TokenKind::Name(ref n) if n == "def" => self.parse_def()?,
            TokenKind::Name(ref n) if n == "return" => self.parse_return()?,
            TokenKind::Name(ref n) if n == "pass" => {
                self.advance();
                self.expect_newline_opt();
                StmtKind::Pass
            }
            TokenKind::Name(ref n) if n == "break" => {
                self.advance();
                self.expect_newline_opt();
                StmtKind::Break
            }
            TokenKind::Name(ref n) if n == "continue" => {
                self.advance();
                self.expect_newline_opt();
                StmtKind::Continue
            }
            TokenKind::Name(ref n) if n == "yield" => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect_newline_opt();
                StmtKind::Yield(expr)
            }
            TokenKind::Name(ref n) if n == "import" || n == "from" => self.parse_import()?,
            _ => self.parse_assign_or_expr()?,
        };
        Ok(Stmt { line, kind })
    }

    fn parse_assign_or_expr(&mut self) -> Result<StmtKind, ParseError> {
        if let TokenKind::Name(name) = self.peek().clone() {
            if matches!(self.peek_at(1), TokenKind::Op(op) if op == "=") {
                self.advance();
                self.advance();
                let expr = self.parse_expr()?;
                self.expect_newline_opt();
                return Ok(StmtKind::Assign(name, expr));
            }
        }
        let expr = self.parse_expr()?;
        self.expect_newline_opt();
        Ok(StmtKind::ExprStmt(expr))
    }

    fn parse_if(&mut self) -> Result<StmtKind, ParseError> {
        self.advance();
        let mut branches = Vec::new();
        let cond = self.parse_expr()?;
        self.eat_op(":")?;
        let body = self.parse_suite()?;
        branches.push((cond, body));
        let mut else_body = None;
        loop {
            self.skip_newlines();
            if self.is_name("elif") {
                self.advance();
                let cond = self.parse_expr()?;
                self.eat_op(":")?;
                let body = self.parse_suite()?;
                branches.push((cond, body));
            } else if self.is_name("else") {
                self.advance();
                self.eat_op(":")?;
                else_body = Some(self.parse_suite()?);
                break;
            } else {
                break;
            }
        }
        Ok(StmtKind::If(branches, else_body))
    }

    fn parse_for(&mut self) -> Result<StmtKind, ParseError> {
        self.advance();
        let var = self.expect_name()?;
        self.eat_keyword("in")?;
        let iter = self.parse_expr()?;
        self.eat_op(":")?;
        let body = self.parse_suite()?;
        Ok(StmtKind::For(var, iter, body))
    }

    fn parse_while(&mut self) -> Result<StmtKind, ParseError> {
        self.advance();
        let cond = self.parse_expr()?;
        self.eat_op(":")?;
        let body = self.parse_suite()?;
        Ok(StmtKind::While(cond, body))
    }

    fn parse_try(&mut self) -> Result<StmtKind, ParseError> {
        self.advance();
        self.eat_op(":")?;
        let body = self.parse_suite()?;
        let mut handlers = Vec::new();
        loop {
            self.skip_newlines();
            if !self.is_name("except") {
                break;
            }
            self.advance();
            let exc_name = if let TokenKind::Name(name) = self.peek().clone() {
                self.advance();
                Some(name)
            } else {
                None
            };
            self.eat_op(":")?;
            let hbody = self.parse_suite()?;
            handlers.push(ExceptClause { exc_name, body: hbody });
        }
        let finally = if self.is_name("finally") {
            self.advance();
            self.eat_op(":")?;
            Some(self.parse_suite()?)
        } else {
            None
        };
        Ok(StmtKind::Try(body, handlers, finally))
    }

    fn parse_def(&mut self) -> Result<StmtKind, ParseError> {
        self.advance();
        let name = self.expect_name()?;
        self.eat_op("(")?;
        let mut params = Vec::new();
        if !self.is_op(")") {
            loop {
                params.push(self.expect_name()?);
                if self.is_op(",") {
                    self.advance();
                    continue;
                }
                break;
            }
        }
        self.eat_op(")")?;
        self.eat_op(":")?;
        let body = self.parse_suite()?;
        Ok(StmtKind::FunctionDef(Arc::new(FunctionDef { name, params, body })))
    }

    fn parse_return(&mut self) -> Result<StmtKind, ParseError> {
        self.advance();
        if matches!(self.peek(), TokenKind::Newline | TokenKind::Dedent | TokenKind::Eof) {
            self.expect_newline_opt();
            return Ok(StmtKind::Return(None));
        }
        let expr = self.parse_expr()?;
        self.expect_newline_opt();
        Ok(StmtKind::Return(Some(expr)))
    }

    fn parse_import(&mut self) -> Result<StmtKind, ParseError> {
        if self.is_name("from") {
            self.advance();
            let module = self.expect_name()?;
            self.eat_keyword("import")?;
            let mut names = Vec::new();
            loop {
                names.push(self.expect_name()?);
                if self.is_op(",") {
                    self.advance();
                    continue;
                }
                break;
            }
            self.expect_newline_opt();
            Ok(StmtKind::Import(module, names))
        } else {
            self.advance();
            let module = self.expect_name()?;
            self.expect_newline_opt();
            Ok(StmtKind::Import(module, Vec::new()))
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and()?;
        while self.is_name("or") {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::BoolOp(BoolOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_not()?;
        while self.is_name("and") {
            self.advance();
            let right = self.parse_not()?;
            left = Expr::BoolOp(BoolOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ParseError> {
        if self.is_name("not") {
            self.advance();
            let inner = self.parse_not()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_additive()?;
        let cmp = match self.peek() {
            TokenKind::Op(op) if op == "==" => Some(CmpOp::Eq),
            TokenKind::Op(op) if op == "!=" => Some(CmpOp::Ne),
            TokenKind::Op(op) if op == "<" => Some(CmpOp::Lt),
            TokenKind::Op(op) if op == ">" => Some(CmpOp::Gt),
            TokenKind::Op(op) if op == "<=" => Some(CmpOp::Le),
            TokenKind::Op(op) if op == ">=" => Some(CmpOp::Ge),
            _ => None,
        };
        if let Some(op) = cmp {
            self.advance();
            let right = self.parse_additive()?;
            return Ok(Expr::Compare(op, Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Op(op) if op == "+" => Some(BinOp::Add),
                TokenKind::Op(op) if op == "-" => Some(BinOp::Sub),
                _ => None,
            };
            match op {
                Some(op) => {
                    self.advance();
                    let right = self.parse_multiplicative()?;
                    left = Expr::Binary(op, Box::new(left), Box::new(right));
                }
                None => break,
            }
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Op(op) if op == "*" => Some(BinOp::Mul),
                TokenKind::Op(op) if op == "/" => Some(BinOp::Div),
                TokenKind::Op(op) if op == "%" => Some(BinOp::Mod),
                _ => None,
            };
            match op {
                Some(op) => {
                    self.advance();
                    let right = self.parse_unary()?;
                    left = Expr::Binary(op, Box::new(left), Box::new(right));
                }
                None => break,
            }
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.is_op("-") {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(inner)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.is_op("(") {
                self.advance();
                let mut args = Vec::new();
                if !self.is_op(")") {
                    loop {
                        args.push(self.parse_expr()?);
                        if self.is_op(",") {
                            self.advance();
                            continue;
                        }
                        break;
                    }
                }
                self.eat_op(")")?;
                expr = Expr::Call(Box::new(expr), args);
            } else if self.is_op("[") {
                self.advance();
                let idx = self.parse_expr()?;
                self.eat_op("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(idx));
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.peek().clone() {
            TokenKind::Int(v) => {
                self.advance();
                Ok(Expr::IntLit(v))
            }
            TokenKind::Float(v) => {
                self.advance();
                Ok(Expr::FloatLit(v))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::StrLit(s))
            }
            TokenKind::Name(n) => {
                self.advance();
                match n.as_str() {
                    "True" => Ok(Expr::BoolLit(true)),
                    "False" => Ok(Expr::BoolLit(false)),
                    "None" => Ok(Expr::NoneLit),
                    _ => Ok(Expr::Name(n)),
                }
            }
            TokenKind::Op(op) if op == "(" => {
                self.advance();
                let e = self.parse_expr()?;
                self.eat_op(")")?;
                Ok(e)
            }
            TokenKind::Op(op) if op == "[" => {
                self.advance();
                let mut items = Vec::new();
                if !self.is_op("]") {
                    loop {
                        items.push(self.parse_expr()?);
                        if self.is_op(",") {
                            self.advance();
                            continue;
                        }
                        break;
                    }
                }
                self.eat_op("]")?;
                Ok(Expr::ListLit(items))
            }
            other => Err(ParseError {
                line: self.line(),
                message: format!("unexpected token {other:?}"),
            }),
        }
    }
}
