//! Recursive-descent parser producing the AST of `crate::ast`.
//!
//! Precedence follows the grammar: `||` binds loosest, then `&&`, equality,
//! relational, additive, multiplicative, unary, bitwise, and finally the
//! dereference chain. A parser instance carries reusable scratch state and is
//! not reentrant; the engine serializes access behind a mutex.

use crate::{
    ast::{Node, NodeKind, Span},
    error::{ErrorKind, EvalResult, JexlError},
    lexer::{Tok, Token, tokenize},
};

/// Maximum nesting depth for expressions and statements. Bounds recursion on
/// adversarial input like `((((…))))`.
#[cfg(not(debug_assertions))]
const MAX_NESTING_DEPTH: u16 = 200;
/// Debug stack frames are much larger, so the guard trips earlier.
#[cfg(debug_assertions)]
const MAX_NESTING_DEPTH: u16 = 64;

/// The stateful parser front end. Holds the token scratch buffer reused
/// across parses.
#[derive(Debug, Default)]
pub(crate) struct Parser {
    tokens: Vec<Token>,
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a whole script: a sequence of statements under a `Script` root.
    pub fn parse_script(&mut self, src: &str) -> EvalResult<Node> {
        tokenize(src, &mut self.tokens)?;
        let mut run = Run::new(&self.tokens);
        let mut statements = Vec::new();
        while !run.check(&Tok::Eof) {
            if run.eat(&Tok::Semi) {
                continue;
            }
            statements.push(run.statement()?);
        }
        let span = Span::new(0, src.len());
        Ok(Node::with_children(NodeKind::Script, statements, span))
    }

    /// Parses a single-statement expression and wraps it in the matching
    /// expression-handle root.
    pub fn parse_expression(&mut self, src: &str) -> EvalResult<Node> {
        tokenize(src, &mut self.tokens)?;
        let mut run = Run::new(&self.tokens);
        let statement = run.statement()?;
        while run.eat(&Tok::Semi) {}
        if !run.check(&Tok::Eof) {
            return Err(run.error_here("an expression must be a single statement"));
        }
        let span = statement.span;
        let kind = match statement.kind {
            NodeKind::Reference => NodeKind::ReferenceExpression,
            NodeKind::Assignment
            | NodeKind::IfStatement
            | NodeKind::WhileStatement
            | NodeKind::ForeachStatement
            | NodeKind::Block => NodeKind::StatementExpression,
            _ => NodeKind::ExpressionExpression,
        };
        Ok(Node::with_children(kind, vec![statement], span))
    }
}

struct Run<'t> {
    toks: &'t [Token],
    pos: usize,
    depth: u16,
}

impl<'t> Run<'t> {
    fn new(toks: &'t [Token]) -> Self {
        Self { toks, pos: 0, depth: 0 }
    }

    fn peek(&self) -> &'t Token {
        &self.toks[self.pos.min(self.toks.len() - 1)]
    }

    fn peek_at(&self, offset: usize) -> &'t Token {
        &self.toks[(self.pos + offset).min(self.toks.len() - 1)]
    }

    fn advance(&mut self) -> &'t Token {
        let token = self.peek();
        if self.pos < self.toks.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn check(&self, tok: &Tok) -> bool {
        &self.peek().tok == tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.check(tok) {
            self.advance();
            return true;
        }
        false
    }

    fn expect(&mut self, tok: &Tok, what: &str) -> EvalResult<&'t Token> {
        if self.check(tok) {
            Ok(self.advance())
        } else {
            Err(self.error_here(format!("expected {what}")))
        }
    }

    fn error_here(&self, message: impl Into<String>) -> JexlError {
        JexlError::new(ErrorKind::Parse {
            position: self.peek().start,
            message: message.into(),
        })
    }

    fn enter(&mut self) -> EvalResult<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(self.error_here("expression nests too deeply"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    // --- statements ---

    fn statement(&mut self) -> EvalResult<Node> {
        self.enter()?;
        let result = self.statement_inner();
        self.leave();
        result
    }

    fn statement_inner(&mut self) -> EvalResult<Node> {
        match &self.peek().tok {
            Tok::LBrace => self.block(),
            Tok::If => self.if_statement(),
            Tok::While => self.while_statement(),
            Tok::Foreach => self.foreach_statement(),
            _ => {
                let expr = self.expression()?;
                let node = if self.eat(&Tok::Assign) {
                    if expr.kind != NodeKind::Reference {
                        return Err(self.error_here("assignment target must be a reference"));
                    }
                    let value = self.expression()?;
                    let span = expr.span.cover(value.span);
                    Node::with_children(NodeKind::Assignment, vec![expr, value], span)
                } else {
                    expr
                };
                self.end_of_statement()?;
                Ok(node)
            }
        }
    }

    /// A statement ends with `;`, which is optional just before `}`, `else`,
    /// or the end of input.
    fn end_of_statement(&mut self) -> EvalResult<()> {
        if self.eat(&Tok::Semi) || self.check(&Tok::RBrace) || self.check(&Tok::Else) || self.check(&Tok::Eof) {
            Ok(())
        } else {
            Err(self.error_here("expected ';'"))
        }
    }

    fn block(&mut self) -> EvalResult<Node> {
        let open = self.expect(&Tok::LBrace, "'{'")?.start;
        let mut statements = Vec::new();
        while !self.check(&Tok::RBrace) && !self.check(&Tok::Eof) {
            if self.eat(&Tok::Semi) {
                continue;
            }
            statements.push(self.statement()?);
        }
        let close = self.expect(&Tok::RBrace, "'}'")?.end;
        Ok(Node::with_children(NodeKind::Block, statements, Span::new(open, close)))
    }

    fn if_statement(&mut self) -> EvalResult<Node> {
        let start = self.expect(&Tok::If, "'if'")?.start;
        self.expect(&Tok::LParen, "'('")?;
        let condition = self.expression()?;
        self.expect(&Tok::RParen, "')'")?;
        let then_branch = self.statement()?;
        let mut children = vec![condition, then_branch];
        if self.eat(&Tok::Else) {
            children.push(self.statement()?);
        }
        let end = children.last().map_or(start, |n| n.span.end);
        Ok(Node::with_children(NodeKind::IfStatement, children, Span::new(start, end)))
    }

    fn while_statement(&mut self) -> EvalResult<Node> {
        let start = self.expect(&Tok::While, "'while'")?.start;
        self.expect(&Tok::LParen, "'('")?;
        let condition = self.expression()?;
        self.expect(&Tok::RParen, "')'")?;
        let body = self.statement()?;
        let end = body.span.end;
        Ok(Node::with_children(
            NodeKind::WhileStatement,
            vec![condition, body],
            Span::new(start, end),
        ))
    }

    fn foreach_statement(&mut self) -> EvalResult<Node> {
        let start = self.expect(&Tok::Foreach, "'foreach'")?.start;
        self.expect(&Tok::LParen, "'('")?;
        let var = match &self.peek().tok {
            Tok::Ident(name) => {
                let token = self.peek();
                let ident = Node::with_image(NodeKind::Identifier, name.as_str(), Span::new(token.start, token.end));
                self.advance();
                Node::with_children(NodeKind::Reference, vec![ident], Span::new(token.start, token.end))
            }
            _ => return Err(self.error_here("expected loop variable")),
        };
        self.expect(&Tok::In, "'in'")?;
        let iterable = self.expression()?;
        self.expect(&Tok::RParen, "')'")?;
        let body = self.statement()?;
        let end = body.span.end;
        Ok(Node::with_children(
            NodeKind::ForeachStatement,
            vec![var, iterable, body],
            Span::new(start, end),
        ))
    }

    // --- expressions, loosest binding first ---

    fn expression(&mut self) -> EvalResult<Node> {
        self.enter()?;
        let result = self.or_expr();
        self.leave();
        result
    }

    fn binary(
        &mut self,
        next: fn(&mut Self) -> EvalResult<Node>,
        table: &[(Tok, NodeKind)],
    ) -> EvalResult<Node> {
        let mut node = next(self)?;
        'outer: loop {
            for (tok, kind) in table {
                if self.eat(tok) {
                    let right = next(self)?;
                    let span = node.span.cover(right.span);
                    node = Node::with_children(*kind, vec![node, right], span);
                    continue 'outer;
                }
            }
            return Ok(node);
        }
    }

    fn or_expr(&mut self) -> EvalResult<Node> {
        self.binary(Self::and_expr, &[(Tok::OrOr, NodeKind::Or)])
    }

    fn and_expr(&mut self) -> EvalResult<Node> {
        self.binary(Self::equality_expr, &[(Tok::AndAnd, NodeKind::And)])
    }

    fn equality_expr(&mut self) -> EvalResult<Node> {
        self.binary(
            Self::relational_expr,
            &[(Tok::EqEq, NodeKind::Eq), (Tok::Ne, NodeKind::Ne)],
        )
    }

    fn relational_expr(&mut self) -> EvalResult<Node> {
        self.binary(
            Self::additive_expr,
            &[
                (Tok::Le, NodeKind::Le),
                (Tok::Ge, NodeKind::Ge),
                (Tok::Lt, NodeKind::Lt),
                (Tok::Gt, NodeKind::Gt),
            ],
        )
    }

    fn additive_expr(&mut self) -> EvalResult<Node> {
        self.binary(
            Self::multiplicative_expr,
            &[(Tok::Plus, NodeKind::Add), (Tok::Minus, NodeKind::Sub)],
        )
    }

    fn multiplicative_expr(&mut self) -> EvalResult<Node> {
        self.binary(
            Self::unary_expr,
            &[
                (Tok::Star, NodeKind::Mul),
                (Tok::Slash, NodeKind::Div),
                (Tok::Percent, NodeKind::Mod),
            ],
        )
    }

    fn unary_expr(&mut self) -> EvalResult<Node> {
        let (kind, start) = match &self.peek().tok {
            Tok::Bang => (NodeKind::Not, self.peek().start),
            Tok::Minus => (NodeKind::UnaryMinus, self.peek().start),
            Tok::Tilde => (NodeKind::BitNot, self.peek().start),
            _ => return self.bit_or_expr(),
        };
        self.advance();
        self.enter()?;
        let operand = self.unary_expr();
        self.leave();
        let operand = operand?;
        let span = Span::new(start, operand.span.end);
        Ok(Node::with_children(kind, vec![operand], span))
    }

    fn bit_or_expr(&mut self) -> EvalResult<Node> {
        self.binary(Self::bit_xor_expr, &[(Tok::Pipe, NodeKind::BitOr)])
    }

    fn bit_xor_expr(&mut self) -> EvalResult<Node> {
        self.binary(Self::bit_and_expr, &[(Tok::Caret, NodeKind::BitXor)])
    }

    fn bit_and_expr(&mut self) -> EvalResult<Node> {
        self.binary(Self::postfix_expr, &[(Tok::Amp, NodeKind::BitAnd)])
    }

    // --- dereference chains ---

    fn postfix_expr(&mut self) -> EvalResult<Node> {
        let base = self.primary()?;
        let mut elements = vec![base];

        loop {
            if self.eat(&Tok::Dot) {
                let element = self.chain_member()?;
                elements.push(element);
            } else if self.check(&Tok::LBracket) {
                self.attach_indices(&mut elements)?;
            } else {
                break;
            }
        }

        let wrap = elements.len() > 1
            || matches!(
                elements[0].kind,
                NodeKind::Identifier | NodeKind::Method | NodeKind::ArrayAccess | NodeKind::SizeMethod
            );
        if wrap {
            let span = elements
                .iter()
                .skip(1)
                .fold(elements[0].span, |acc, n| acc.cover(n.span));
            Ok(Node::with_children(NodeKind::Reference, elements, span))
        } else {
            let mut elements = elements;
            Ok(elements.pop().unwrap_or_else(|| Node::leaf(NodeKind::NullLit, Span::default())))
        }
    }

    /// One `.member` of a chain: a property identifier, a method call, or
    /// `size()`.
    fn chain_member(&mut self) -> EvalResult<Node> {
        let token = self.peek();
        let Tok::Ident(name) = &token.tok else {
            return Err(self.error_here("expected property or method name"));
        };
        let name = name.clone();
        let span = Span::new(token.start, token.end);
        self.advance();
        if self.check(&Tok::LParen) {
            if name == "size" && self.peek_at(1).tok == Tok::RParen {
                self.advance();
                self.advance();
                return Ok(Node::leaf(NodeKind::SizeMethod, span));
            }
            let ident = Node::with_image(NodeKind::Identifier, name, span);
            return self.method_call(ident, span);
        }
        Ok(Node::with_image(NodeKind::Identifier, name, span))
    }

    /// Consecutive `[idx]` groups extend the chain's last element into an
    /// `ArrayAccess`; the element becomes the access's base.
    fn attach_indices(&mut self, elements: &mut Vec<Node>) -> EvalResult<()> {
        let base = match elements.pop() {
            Some(node) => node,
            None => return Err(self.error_here("indexed access needs a base")),
        };
        let mut children = if base.kind == NodeKind::ArrayAccess {
            base.children
        } else {
            vec![base]
        };
        let start = children[0].span.begin;
        let mut end = start;
        while self.check(&Tok::LBracket) {
            self.advance();
            let index = self.expression()?;
            end = self.expect(&Tok::RBracket, "']'")?.end;
            children.push(index);
        }
        elements.push(Node::with_children(
            NodeKind::ArrayAccess,
            children,
            Span::new(start, end),
        ));
        Ok(())
    }

    fn method_call(&mut self, name: Node, start: Span) -> EvalResult<Node> {
        self.expect(&Tok::LParen, "'('")?;
        let mut children = vec![name];
        if !self.check(&Tok::RParen) {
            loop {
                children.push(self.expression()?);
                if !self.eat(&Tok::Comma) {
                    break;
                }
            }
        }
        let end = self.expect(&Tok::RParen, "')'")?.end;
        Ok(Node::with_children(NodeKind::Method, children, Span::new(start.begin, end)))
    }

    // --- primaries ---

    fn primary(&mut self) -> EvalResult<Node> {
        let token = self.peek();
        let span = Span::new(token.start, token.end);
        match &token.tok {
            Tok::Int(image) => {
                let node = Node::with_image(NodeKind::IntLit, image.as_str(), span);
                self.advance();
                Ok(node)
            }
            Tok::Float(image) => {
                let node = Node::with_image(NodeKind::FloatLit, image.as_str(), span);
                self.advance();
                Ok(node)
            }
            Tok::Str(content) => {
                let node = Node::with_image(NodeKind::StrLit, content.as_str(), span);
                self.advance();
                Ok(node)
            }
            Tok::True => {
                self.advance();
                Ok(Node::leaf(NodeKind::TrueLit, span))
            }
            Tok::False => {
                self.advance();
                Ok(Node::leaf(NodeKind::FalseLit, span))
            }
            Tok::Null => {
                self.advance();
                Ok(Node::leaf(NodeKind::NullLit, span))
            }
            Tok::LParen => {
                self.advance();
                let inner = self.expression()?;
                self.expect(&Tok::RParen, "')'")?;
                Ok(inner)
            }
            Tok::LBrace => self.map_literal(),
            Tok::Ident(name) => {
                let name = name.clone();
                self.advance();
                // `ns : name (` is a namespaced function call
                if self.check(&Tok::Colon)
                    && matches!(&self.peek_at(1).tok, Tok::Ident(_))
                    && self.peek_at(2).tok == Tok::LParen
                {
                    self.advance();
                    let method_token = self.advance();
                    let Tok::Ident(method) = &method_token.tok else {
                        return Err(self.error_here("expected function name"));
                    };
                    let full = format!("{name}:{method}");
                    let ident = Node::with_image(NodeKind::Identifier, full, span.cover(Span::new(method_token.start, method_token.end)));
                    let ident_span = ident.span;
                    return self.method_call(ident, ident_span);
                }
                if self.check(&Tok::LParen) {
                    if name == "size" {
                        return self.builtin_fn(NodeKind::SizeFn, span);
                    }
                    if name == "empty" {
                        return self.builtin_fn(NodeKind::EmptyFn, span);
                    }
                    let ident = Node::with_image(NodeKind::Identifier, name, span);
                    return self.method_call(ident, span);
                }
                Ok(Node::with_image(NodeKind::Identifier, name, span))
            }
            _ => Err(self.error_here("expected an expression")),
        }
    }

    fn builtin_fn(&mut self, kind: NodeKind, start: Span) -> EvalResult<Node> {
        self.expect(&Tok::LParen, "'('")?;
        let argument = self.expression()?;
        let end = self.expect(&Tok::RParen, "')'")?.end;
        Ok(Node::with_children(kind, vec![argument], Span::new(start.begin, end)))
    }

    fn map_literal(&mut self) -> EvalResult<Node> {
        let open = self.expect(&Tok::LBrace, "'{'")?.start;
        let mut entries = Vec::new();
        if !self.check(&Tok::RBrace) {
            loop {
                let key = self.expression()?;
                self.expect(&Tok::Colon, "':'")?;
                let value = self.expression()?;
                let span = key.span.cover(value.span);
                entries.push(Node::with_children(NodeKind::MapEntry, vec![key, value], span));
                if !self.eat(&Tok::Comma) {
                    break;
                }
            }
        }
        let close = self.expect(&Tok::RBrace, "'}'")?.end;
        Ok(Node::with_children(NodeKind::MapLit, entries, Span::new(open, close)))
    }
}
