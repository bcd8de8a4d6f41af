//! Recursive-descent parser for the pixel script language.

use crate::ast::{BinaryOp, Expr, Program, Stmt, UnaryOp};
use crate::lexer::{SpannedToken, Token};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("line {line}: expected {expected}, found '{found}'")]
    Unexpected {
        expected: &'static str,
        found: String,
        line: u32,
    },

    #[error("unexpected end of script (expected {expected})")]
    UnexpectedEnd { expected: &'static str },

    #[error("script is empty")]
    Empty,
}

pub fn parse(tokens: Vec<SpannedToken>) -> Result<Program, ParseError> {
    if tokens.is_empty() {
        return Err(ParseError::Empty);
    }
    let mut parser = Parser { tokens, pos: 0 };
    let mut body = Vec::new();
    while !parser.at_end() {
        body.push(parser.statement()?);
    }
    Ok(Program { body })
}

struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
}

impl Parser {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    fn line(&self) -> u32 {
        self.tokens
            .get(self.pos.min(self.tokens.len() - 1))
            .map(|t| t.line)
            .unwrap_or(0)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).map(|t| t.token.clone());
        self.pos += 1;
        t
    }

    fn check(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token, expected: &'static str) -> Result<(), ParseError> {
        match self.peek() {
            Some(t) if *t == token => {
                self.pos += 1;
                Ok(())
            }
            Some(t) => Err(ParseError::Unexpected {
                expected,
                found: t.to_string(),
                line: self.line(),
            }),
            None => Err(ParseError::UnexpectedEnd { expected }),
        }
    }

    fn expect_ident(&mut self, expected: &'static str) -> Result<String, ParseError> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            Some(t) => Err(ParseError::Unexpected {
                expected,
                found: t.to_string(),
                line: self.line(),
            }),
            None => Err(ParseError::UnexpectedEnd { expected }),
        }
    }

    // === Statements ===

    fn statement(&mut self) -> Result<Stmt, ParseError> {
        match self.peek() {
            Some(Token::Let) | Some(Token::Const) => self.let_statement(),
            Some(Token::Function) => self.function_statement(),
            Some(Token::If) => self.if_statement(),
            Some(Token::Return) => {
                self.pos += 1;
                let value = self.expression()?;
                self.check(&Token::Semicolon);
                Ok(Stmt::Return(value))
            }
            Some(t) => Err(ParseError::Unexpected {
                expected: "a statement (let, const, function, if, return)",
                found: t.to_string(),
                line: self.line(),
            }),
            None => Err(ParseError::UnexpectedEnd {
                expected: "a statement",
            }),
        }
    }

    fn let_statement(&mut self) -> Result<Stmt, ParseError> {
        self.pos += 1; // let / const
        let (names, destructure) = if self.check(&Token::LBracket) {
            let mut names = vec![self.expect_ident("a binding name")?];
            while self.check(&Token::Comma) {
                names.push(self.expect_ident("a binding name")?);
            }
            self.expect(Token::RBracket, "']' after destructuring pattern")?;
            (names, true)
        } else {
            (vec![self.expect_ident("a binding name")?], false)
        };
        self.expect(Token::Assign, "'=' in binding")?;
        let value = self.expression()?;
        self.check(&Token::Semicolon);
        Ok(Stmt::Let {
            names,
            destructure,
            value,
        })
    }

    fn function_statement(&mut self) -> Result<Stmt, ParseError> {
        self.pos += 1; // function
        let name = self.expect_ident("a function name")?;
        self.expect(Token::LParen, "'(' after function name")?;
        let mut params = Vec::new();
        if self.peek() != Some(&Token::RParen) {
            params.push(self.expect_ident("a parameter name")?);
            while self.check(&Token::Comma) {
                params.push(self.expect_ident("a parameter name")?);
            }
        }
        self.expect(Token::RParen, "')' after parameters")?;
        let body = self.block()?;
        Ok(Stmt::Function { name, params, body })
    }

    fn if_statement(&mut self) -> Result<Stmt, ParseError> {
        self.pos += 1; // if
        self.expect(Token::LParen, "'(' after if")?;
        let cond = self.expression()?;
        self.expect(Token::RParen, "')' after condition")?;
        let then_branch = self.block()?;
        let else_branch = if self.check(&Token::Else) {
            if self.peek() == Some(&Token::If) {
                Some(vec![self.if_statement()?])
            } else {
                Some(self.block()?)
            }
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    fn block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect(Token::LBrace, "'{'")?;
        let mut body = Vec::new();
        while self.peek() != Some(&Token::RBrace) {
            if self.at_end() {
                return Err(ParseError::UnexpectedEnd { expected: "'}'" });
            }
            body.push(self.statement()?);
        }
        self.pos += 1; // }
        Ok(body)
    }

    // === Expressions, by descending precedence ===

    fn expression(&mut self) -> Result<Expr, ParseError> {
        let cond = self.logic_or()?;
        if self.check(&Token::Question) {
            let then = self.expression()?;
            self.expect(Token::Colon, "':' in ternary")?;
            let otherwise = self.expression()?;
            return Ok(Expr::Ternary {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            });
        }
        Ok(cond)
    }

    fn logic_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.logic_and()?;
        while self.check(&Token::OrOr) {
            let right = self.logic_and()?;
            left = Expr::Binary(BinaryOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn logic_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.equality()?;
        while self.check(&Token::AndAnd) {
            let right = self.equality()?;
            left = Expr::Binary(BinaryOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.comparison()?;
        loop {
            let op = match self.peek() {
                Some(Token::EqEq) => BinaryOp::Eq,
                Some(Token::NotEq) => BinaryOp::Ne,
                _ => break,
            };
            self.pos += 1;
            let right = self.comparison()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Ge) => BinaryOp::Ge,
                _ => break,
            };
            self.pos += 1;
            let right = self.additive()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => break,
            };
            self.pos += 1;
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.unary()?)))
            }
            Some(Token::Not) => {
                self.pos += 1;
                Ok(Expr::Unary(UnaryOp::Not, Box::new(self.unary()?)))
            }
            _ => self.postfix(),
        }
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;
        while self.check(&Token::LBracket) {
            let index = self.expression()?;
            self.expect(Token::RBracket, "']' after index")?;
            expr = Expr::Index(Box::new(expr), Box::new(index));
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let line = self.line();
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Ident(name)) => {
                if self.check(&Token::LParen) {
                    let mut args = Vec::new();
                    if self.peek() != Some(&Token::RParen) {
                        args.push(self.expression()?);
                        while self.check(&Token::Comma) {
                            args.push(self.expression()?);
                        }
                    }
                    self.expect(Token::RParen, "')' after arguments")?;
                    Ok(Expr::Call(name, args))
                } else {
                    Ok(Expr::Ident(name))
                }
            }
            Some(Token::LParen) => {
                let expr = self.expression()?;
                self.expect(Token::RParen, "')'")?;
                Ok(expr)
            }
            Some(Token::LBracket) => {
                let mut elements = Vec::new();
                if self.peek() != Some(&Token::RBracket) {
                    elements.push(self.expression()?);
                    while self.check(&Token::Comma) {
                        // Tolerate a trailing comma
                        if self.peek() == Some(&Token::RBracket) {
                            break;
                        }
                        elements.push(self.expression()?);
                    }
                }
                self.expect(Token::RBracket, "']' after array literal")?;
                Ok(Expr::Array(elements))
            }
            Some(t) => Err(ParseError::Unexpected {
                expected: "an expression",
                found: t.to_string(),
                line,
            }),
            None => Err(ParseError::UnexpectedEnd {
                expected: "an expression",
            }),
        }
    }
}
