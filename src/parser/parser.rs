use super::ast::*;
use super::token::{lex, Token, TokenKind};
use super::ParseError;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(src: &str) -> Result<Self, ParseError> {
        Ok(Parser {
            tokens: lex(src)?,
            pos: 0,
        })
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek2(&self) -> &Token {
        &self.tokens[(self.pos + 1).min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            let tok = self.peek();
            Err(ParseError::new(
                format!("expected {what}, found {:?}", tok.kind),
                tok.line,
            ))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<(String, Token), ParseError> {
        let tok = self.peek().clone();
        if let TokenKind::Ident(name) = &tok.kind {
            let name = name.clone();
            self.advance();
            Ok((name, tok))
        } else {
            Err(ParseError::new(
                format!("expected {what}, found {:?}", tok.kind),
                tok.line,
            ))
        }
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    // ---- items ----

    fn parse_items(&mut self) -> Result<Vec<Item>, ParseError> {
        let mut items = Vec::new();
        while !self.at_eof() {
            if self.check(&TokenKind::Fn) {
                items.push(Item::Fn(self.parse_fn_def()?));
            } else {
                items.push(Item::Stmt(self.parse_stmt()?));
            }
        }
        Ok(items)
    }

    fn parse_fn_def(&mut self) -> Result<FnDef, ParseError> {
        let fn_tok = self.expect(&TokenKind::Fn, "`fn`")?;
        let (name, _) = self.expect_ident("function name")?;
        self.expect(&TokenKind::LParen, "`(`")?;
        let mut params = Vec::new();
        while !self.check(&TokenKind::RParen) {
            let (pname, _) = self.expect_ident("parameter name")?;
            let default = if self.eat(&TokenKind::Assign) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            params.push(Param {
                name: pname,
                default,
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen, "`)`")?;
        let (body, body_span) = self.parse_block()?;
        Ok(FnDef {
            name,
            params,
            body,
            body_span,
            line: fn_tok.line,
        })
    }

    /// Parse `{ stmt* tail_expr? }`. Returns the block and the inner span
    /// between the braces.
    fn parse_block(&mut self) -> Result<(Block, Span), ParseError> {
        let open = self.expect(&TokenKind::LBrace, "`{`")?;
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            stmts.push(self.parse_stmt()?);
        }
        let close = self.expect(&TokenKind::RBrace, "`}`")?;
        let inner = Span::new(open.span.end, close.span.start);
        let block = Block {
            stmts,
            span: Span::new(open.span.start, close.span.end),
            line: open.line,
        };
        Ok((block, inner))
    }

    // ---- statements ----

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        let tok = self.peek().clone();
        match &tok.kind {
            TokenKind::Let => {
                self.advance();
                let (name, _) = self.expect_ident("binding name")?;
                self.expect(&TokenKind::Assign, "`=`")?;
                let value = self.parse_expr()?;
                let semi = self.expect(&TokenKind::Semi, "`;`")?;
                Ok(Stmt {
                    kind: StmtKind::Let { name, value },
                    span: Span::new(tok.span.start, semi.span.end),
                    line: tok.line,
                })
            }
            TokenKind::Return => {
                self.advance();
                let value = if self.check(&TokenKind::Semi) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                let semi = self.expect(&TokenKind::Semi, "`;`")?;
                Ok(Stmt {
                    kind: StmtKind::Return(value),
                    span: Span::new(tok.span.start, semi.span.end),
                    line: tok.line,
                })
            }
            TokenKind::If => self.parse_if(),
            TokenKind::While => {
                self.advance();
                let cond = self.parse_expr()?;
                let (body, _) = self.parse_block()?;
                let end = body.span.end;
                Ok(Stmt {
                    kind: StmtKind::While { cond, body },
                    span: Span::new(tok.span.start, end),
                    line: tok.line,
                })
            }
            TokenKind::Ident(name) if matches!(self.peek2().kind, TokenKind::Assign) => {
                let name = name.clone();
                self.advance();
                self.advance();
                let value = self.parse_expr()?;
                let semi = self.expect(&TokenKind::Semi, "`;`")?;
                Ok(Stmt {
                    kind: StmtKind::Assign { name, value },
                    span: Span::new(tok.span.start, semi.span.end),
                    line: tok.line,
                })
            }
            _ => {
                let expr = self.parse_expr()?;
                if self.check(&TokenKind::Semi) {
                    let semi = self.advance();
                    Ok(Stmt {
                        span: Span::new(expr.span.start, semi.span.end),
                        line: expr.line,
                        kind: StmtKind::Expr(expr),
                    })
                } else if self.check(&TokenKind::RBrace) || self.at_eof() {
                    Ok(Stmt {
                        span: expr.span,
                        line: expr.line,
                        kind: StmtKind::Tail(expr),
                    })
                } else {
                    let tok = self.peek();
                    Err(ParseError::new(
                        format!("expected `;` after expression, found {:?}", tok.kind),
                        tok.line,
                    ))
                }
            }
        }
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        let if_tok = self.expect(&TokenKind::If, "`if`")?;
        let cond = self.parse_expr()?;
        let (then_block, _) = self.parse_block()?;
        let mut end = then_block.span.end;
        let else_block = if self.eat(&TokenKind::Else) {
            if self.check(&TokenKind::If) {
                // `else if` chains as an else-block holding a single if.
                let nested = self.parse_if()?;
                end = nested.span.end;
                Some(Block {
                    span: nested.span,
                    line: nested.line,
                    stmts: vec![nested],
                })
            } else {
                let (block, _) = self.parse_block()?;
                end = block.span.end;
                Some(block)
            }
        } else {
            None
        };
        Ok(Stmt {
            kind: StmtKind::If {
                cond,
                then_block,
                else_block,
            },
            span: Span::new(if_tok.span.start, end),
            line: if_tok.line,
        })
    }

    // ---- expressions (precedence climbing) ----

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary(0)
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let (op, prec) = match self.peek().kind {
                TokenKind::OrOr => (BinOp::Or, 1),
                TokenKind::AndAnd => (BinOp::And, 2),
                TokenKind::EqEq => (BinOp::Eq, 3),
                TokenKind::NotEq => (BinOp::Ne, 3),
                TokenKind::Lt => (BinOp::Lt, 4),
                TokenKind::Le => (BinOp::Le, 4),
                TokenKind::Gt => (BinOp::Gt, 4),
                TokenKind::Ge => (BinOp::Ge, 4),
                TokenKind::Plus => (BinOp::Add, 5),
                TokenKind::Minus => (BinOp::Sub, 5),
                TokenKind::Star => (BinOp::Mul, 6),
                TokenKind::Slash => (BinOp::Div, 6),
                TokenKind::Percent => (BinOp::Rem, 6),
                _ => break,
            };
            if prec < min_prec {
                break;
            }
            self.advance();
            let rhs = self.parse_binary(prec + 1)?;
            let span = Span::new(lhs.span.start, rhs.span.end);
            let line = lhs.line;
            lhs = Expr {
                kind: ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
                line,
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let tok = self.peek().clone();
        let op = match tok.kind {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Bang => Some(UnaryOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let rhs = self.parse_unary()?;
            let span = Span::new(tok.span.start, rhs.span.end);
            Ok(Expr {
                kind: ExprKind::Unary {
                    op,
                    rhs: Box::new(rhs),
                },
                span,
                line: tok.line,
            })
        } else {
            self.parse_primary()
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let tok = self.peek().clone();
        match &tok.kind {
            TokenKind::Int(n) => {
                self.advance();
                Ok(Expr {
                    kind: ExprKind::Int(*n),
                    span: tok.span,
                    line: tok.line,
                })
            }
            TokenKind::Float(x) => {
                self.advance();
                Ok(Expr {
                    kind: ExprKind::Float(*x),
                    span: tok.span,
                    line: tok.line,
                })
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr {
                    kind: ExprKind::Bool(true),
                    span: tok.span,
                    line: tok.line,
                })
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr {
                    kind: ExprKind::Bool(false),
                    span: tok.span,
                    line: tok.line,
                })
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr {
                    kind: ExprKind::Str(s.clone()),
                    span: tok.span,
                    line: tok.line,
                })
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(&TokenKind::RParen, "`)`")?;
                Ok(inner)
            }
            TokenKind::Bind => self.parse_bind(),
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                if self.check(&TokenKind::LParen) {
                    self.advance();
                    let mut args = Vec::new();
                    while !self.check(&TokenKind::RParen) {
                        args.push(self.parse_arg()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                    let close = self.expect(&TokenKind::RParen, "`)`")?;
                    Ok(Expr {
                        kind: ExprKind::Call(CallExpr { callee: name, args }),
                        span: Span::new(tok.span.start, close.span.end),
                        line: tok.line,
                    })
                } else {
                    Ok(Expr {
                        kind: ExprKind::Var(name),
                        span: tok.span,
                        line: tok.line,
                    })
                }
            }
            other => Err(ParseError::new(
                format!("expected an expression, found {other:?}"),
                tok.line,
            )),
        }
    }

    fn parse_arg(&mut self) -> Result<Arg, ParseError> {
        // `name = expr` is a keyword argument; plain `name` alone is positional.
        if let TokenKind::Ident(name) = &self.peek().kind {
            if matches!(self.peek2().kind, TokenKind::Assign) {
                let name = name.clone();
                self.advance();
                self.advance();
                let value = self.parse_expr()?;
                return Ok(Arg {
                    name: Some(name),
                    value,
                });
            }
        }
        Ok(Arg {
            name: None,
            value: self.parse_expr()?,
        })
    }

    fn parse_bind(&mut self) -> Result<Expr, ParseError> {
        let bind_tok = self.expect(&TokenKind::Bind, "`bind`")?;
        let id_tok = self.peek().clone();
        let stash_id = match &id_tok.kind {
            TokenKind::Str(s) => {
                self.advance();
                s.clone()
            }
            other => {
                return Err(ParseError::new(
                    format!("expected a quoted stash identifier after `bind`, found {other:?}"),
                    id_tok.line,
                ))
            }
        };
        self.expect(&TokenKind::LParen, "`(`")?;
        let mut names = Vec::new();
        while !self.check(&TokenKind::RParen) {
            let (name, _) = self.expect_ident("binding name")?;
            names.push(name);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen, "`)`")?;
        let (body, _) = self.parse_block()?;
        let end = body.span.end;
        Ok(Expr {
            kind: ExprKind::Bind(BindExpr {
                stash_id,
                names,
                body,
            }),
            span: Span::new(bind_tok.span.start, end),
            line: bind_tok.line,
        })
    }
}

/// Parse a whole script: function definitions and top-level statements.
pub fn parse_program(src: &str) -> Result<Vec<Item>, ParseError> {
    Parser::new(src)?.parse_items()
}

/// Parse an editing-buffer snippet: statements only, no function definitions.
pub fn parse_snippet(src: &str) -> Result<Vec<Stmt>, ParseError> {
    let items = parse_program(src)?;
    let mut stmts = Vec::new();
    for item in items {
        match item {
            Item::Stmt(s) => stmts.push(s),
            Item::Fn(def) => {
                return Err(ParseError::new(
                    format!("function definition `{}` is not allowed in a buffer", def.name),
                    def.line,
                ))
            }
        }
    }
    if stmts.is_empty() {
        return Err(ParseError::new("the buffer is empty", 1));
    }
    Ok(stmts)
}

/// Parse a single expression, e.g. a breakpoint condition.
pub fn parse_expr_text(src: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(src)?;
    let expr = parser.parse_expr()?;
    if !parser.at_eof() {
        let tok = parser.peek();
        return Err(ParseError::new(
            format!("trailing input after expression: {:?}", tok.kind),
            tok.line,
        ));
    }
    Ok(expr)
}

/// Find the smallest call expression whose span contains `offset`.
pub fn call_at(stmts: &[Stmt], offset: usize) -> Option<&Expr> {
    let mut best: Option<&Expr> = None;
    for stmt in stmts {
        visit_stmt(stmt, &mut |expr| {
            if matches!(expr.kind, ExprKind::Call(_)) && expr.span.contains(offset) {
                let smaller = best
                    .map(|b| expr.span.width() < b.span.width())
                    .unwrap_or(true);
                if smaller {
                    best = Some(expr);
                }
            }
        });
    }
    best
}

fn visit_stmt<'a>(stmt: &'a Stmt, f: &mut impl FnMut(&'a Expr)) {
    match &stmt.kind {
        StmtKind::Let { value, .. } | StmtKind::Assign { value, .. } => visit_expr(value, f),
        StmtKind::Return(value) => {
            if let Some(v) = value {
                visit_expr(v, f);
            }
        }
        StmtKind::If {
            cond,
            then_block,
            else_block,
        } => {
            visit_expr(cond, f);
            for s in &then_block.stmts {
                visit_stmt(s, f);
            }
            if let Some(b) = else_block {
                for s in &b.stmts {
                    visit_stmt(s, f);
                }
            }
        }
        StmtKind::While { cond, body } => {
            visit_expr(cond, f);
            for s in &body.stmts {
                visit_stmt(s, f);
            }
        }
        StmtKind::Expr(e) | StmtKind::Tail(e) => visit_expr(e, f),
    }
}

fn visit_expr<'a>(expr: &'a Expr, f: &mut impl FnMut(&'a Expr)) {
    f(expr);
    match &expr.kind {
        ExprKind::Unary { rhs, .. } => visit_expr(rhs, f),
        ExprKind::Binary { lhs, rhs, .. } => {
            visit_expr(lhs, f);
            visit_expr(rhs, f);
        }
        ExprKind::Call(call) => {
            for arg in &call.args {
                visit_expr(&arg.value, f);
            }
        }
        ExprKind::Bind(bind) => {
            for s in &bind.body.stmts {
                visit_stmt(s, f);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fn_with_default() {
        let items = parse_program("fn f(x, y = 1) { x + y }").expect("should parse");
        assert_eq!(items.len(), 1);
        let Item::Fn(def) = &items[0] else {
            panic!("expected a function definition");
        };
        assert_eq!(def.name, "f");
        assert_eq!(def.params.len(), 2);
        assert!(def.params[0].default.is_none());
        assert!(def.params[1].default.is_some());
        assert_eq!(def.body.stmts.len(), 1);
        assert!(matches!(def.body.stmts[0].kind, StmtKind::Tail(_)));
    }

    #[test]
    fn test_body_span_slices_verbatim() {
        let src = "fn f(x) { x * 2 }";
        let items = parse_program(src).expect("should parse");
        let Item::Fn(def) = &items[0] else {
            panic!("expected a function definition");
        };
        assert_eq!(&src[def.body_span.start..def.body_span.end], " x * 2 ");
    }

    #[test]
    fn test_parse_snippet_rejects_fn() {
        assert!(parse_snippet("fn f() { 1 }").is_err());
    }

    #[test]
    fn test_parse_keyword_args() {
        let stmts = parse_snippet("f(3, y = 4);").expect("should parse");
        let StmtKind::Expr(expr) = &stmts[0].kind else {
            panic!("expected expression statement");
        };
        let ExprKind::Call(call) = &expr.kind else {
            panic!("expected call");
        };
        assert_eq!(call.args.len(), 2);
        assert!(call.args[0].name.is_none());
        assert_eq!(call.args[1].name.as_deref(), Some("y"));
    }

    #[test]
    fn test_call_at_picks_smallest_enclosing() {
        let src = "let a = f(g(1), 2);";
        let stmts = parse_snippet(src).expect("should parse");
        let inner_offset = src.find("g(").expect("src has g(") + 1;
        let call = call_at(&stmts, inner_offset).expect("cursor is inside a call");
        let ExprKind::Call(c) = &call.kind else {
            panic!("expected call");
        };
        assert_eq!(c.callee, "g");

        let outer_offset = src.find("f(").expect("src has f(");
        let call = call_at(&stmts, outer_offset).expect("cursor is inside a call");
        let ExprKind::Call(c) = &call.kind else {
            panic!("expected call");
        };
        assert_eq!(c.callee, "f");
    }

    #[test]
    fn test_call_at_none_outside_calls() {
        let src = "let a = 1 + 2;";
        let stmts = parse_snippet(src).expect("should parse");
        assert!(call_at(&stmts, 9).is_none());
    }

    #[test]
    fn test_parse_bind_expression() {
        let src = "bind \"abc\" (x, y) {\n    x + y\n}";
        let stmts = parse_snippet(src).expect("should parse");
        assert_eq!(stmts.len(), 1);
        let StmtKind::Tail(expr) = &stmts[0].kind else {
            panic!("expected tail expression");
        };
        let ExprKind::Bind(bind) = &expr.kind else {
            panic!("expected bind expression");
        };
        assert_eq!(bind.stash_id, "abc");
        assert_eq!(bind.names, vec!["x".to_string(), "y".to_string()]);
        assert_eq!(bind.body.stmts.len(), 1);
    }

    #[test]
    fn test_parse_if_else_chain() {
        let src = "if a < 1 { f(); } else if a < 2 { g(); } else { h(); }";
        let stmts = parse_snippet(src).expect("should parse");
        assert_eq!(stmts.len(), 1);
        let StmtKind::If { else_block, .. } = &stmts[0].kind else {
            panic!("expected if statement");
        };
        let nested = else_block.as_ref().expect("has else");
        assert!(matches!(nested.stmts[0].kind, StmtKind::If { .. }));
    }

    #[test]
    fn test_parse_expr_text_rejects_trailing() {
        assert!(parse_expr_text("x > 0").is_ok());
        assert!(parse_expr_text("x > 0 ;").is_err());
        assert!(parse_expr_text("let x").is_err());
    }

    #[test]
    fn test_precedence() {
        let expr = parse_expr_text("1 + 2 * 3 == 7 && true").expect("should parse");
        let ExprKind::Binary { op, .. } = &expr.kind else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinOp::And);
    }
}
