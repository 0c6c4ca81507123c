//! Recursive-descent parser with Pratt-style precedence for infix
//! operators.
//!
//! Statements are recognized at the start of a line: the parser tracks
//! whether it is still on a fresh line through the lexer's state counter and
//! inserts implicit terminators between statements on different lines.
//! `export`, `import` and `interface` are only legal at module top level;
//! calls are only legal inside a block.

use super::ast::{ArgSpec, ArithOp, CmpOp, FunctionDef, Lit, LogicalOp, Node};
use super::error::ParseError;
use super::lexer::Lexer;
use super::token::{Token, TokenKind};
use super::value::Kind;
use std::rc::Rc;

pub fn parse(src: &str) -> Result<Vec<Node>, ParseError> {
    let mut p = Parser {
        lx: Lexer::new(src),
        block_depth: 0,
        new_line_state: -1,
    };
    p.parse_program()
}

struct Parser {
    lx: Lexer,
    block_depth: u32,
    new_line_state: i64,
}

// Operator precedence, low to high. Arithmetic binds tighter than
// comparison, which binds tighter than equality and the logical operators.
fn precedence_of(kind: TokenKind) -> i32 {
    match kind {
        TokenKind::LogicalOr => 1,
        TokenKind::LogicalAnd => 2,
        TokenKind::Equals | TokenKind::NotEquals => 3,
        TokenKind::LessThan
        | TokenKind::LessThanOrEqual
        | TokenKind::GreaterThan
        | TokenKind::GreaterThanOrEqual => 4,
        TokenKind::Plus | TokenKind::Minus => 5,
        TokenKind::Multiply | TokenKind::Divide | TokenKind::Modulo => 6,
        TokenKind::Exponent => 7,
        _ => 0,
    }
}

// Unary `!` binds tighter than any binary operator.
const NOT_PREC: i32 = 8;

impl Parser {
    fn parse_program(&mut self) -> Result<Vec<Node>, ParseError> {
        let mut prog = Vec::new();
        while let Some(tok) = self.next_statement_token()? {
            prog.push(self.parse_statement_from_token(tok)?);
        }
        Ok(prog)
    }

    /// Returns the next token that could begin a statement, skipping
    /// newlines, whitespace and semicolons. `None` means end of input.
    fn next_statement_token(&mut self) -> Result<Option<Token>, ParseError> {
        loop {
            let tok = self.next()?;
            match tok.kind {
                TokenKind::NewLine | TokenKind::Semicolon | TokenKind::Whitespace => continue,
                TokenKind::Eof => return Ok(None),
                _ => return Ok(Some(tok)),
            }
        }
    }

    fn parse_statement_from_token(&mut self, tok: Token) -> Result<Node, ParseError> {
        match tok.kind {
            TokenKind::Export => self.parse_export(),
            TokenKind::Import => self.parse_import(),
            TokenKind::Interface => self.parse_interface(),
            TokenKind::Fn => self.parse_function(),
            TokenKind::Return => Ok(Node::Return(Box::new(self.parse_expression()?))),
            TokenKind::Throw => Ok(Node::Throw(Box::new(self.parse_expression()?))),
            TokenKind::If => self.parse_if(),
            TokenKind::For => self.parse_for(),
            _ => self.parse_expression_from_token(tok),
        }
    }

    fn parse_export(&mut self) -> Result<Node, ParseError> {
        if self.block_depth != 0 {
            return Err(ParseError::ExportNotAtTopLevel);
        }

        let start = self.expect_token(&[TokenKind::Identifier, TokenKind::Fn])?;
        let node = self.parse_statement_from_token(start)?;
        if !matches!(node, Node::Declaration { .. }) {
            return Err(ParseError::ExportMustHaveDeclaration);
        }
        Ok(Node::Export(Box::new(node)))
    }

    fn parse_import(&mut self) -> Result<Node, ParseError> {
        if self.block_depth != 0 {
            return Err(ParseError::ImportNotAtTopLevel);
        }

        let mut modules = Vec::new();
        loop {
            modules.push(self.parse_pure_string()?);
            let tok = self.next_after_whitespace()?;
            if tok.kind != TokenKind::Comma {
                self.lx.unread(tok);
                return Ok(Node::Import(modules));
            }
        }
    }

    fn parse_interface(&mut self) -> Result<Node, ParseError> {
        if self.block_depth != 0 {
            return Err(ParseError::InterfaceNotAtTopLevel);
        }

        let name = self.expect_token(&[TokenKind::Identifier])?.literal;
        self.expect_token(&[TokenKind::LeftBrace])?;

        let mut fields = Vec::new();
        let mut methods = Vec::new();
        loop {
            let Some(tok) = self.next_statement_token()? else {
                return Err(ParseError::UnexpectedEof);
            };
            match tok.kind {
                TokenKind::RightBrace => {
                    return Ok(Node::InterfaceDecl {
                        name,
                        fields,
                        methods,
                    })
                }
                TokenKind::Identifier => {
                    self.expect_token(&[TokenKind::Colon])?;
                    let kind = self.parse_type()?;
                    fields.push((tok.literal, Some(kind)));
                }
                TokenKind::Fn => {
                    let def = self.parse_function_definition(true)?;
                    methods.push(def.name);
                }
                _ => {
                    return Err(self.unexpected(
                        &[TokenKind::Identifier, TokenKind::Fn, TokenKind::RightBrace],
                        &tok,
                    ))
                }
            }
        }
    }

    fn parse_if(&mut self) -> Result<Node, ParseError> {
        let cond = self.parse_expression()?;

        let next = self.next_after_whitespace()?;
        let body = if next.kind == TokenKind::LeftBrace {
            self.parse_block(false)?
        } else {
            self.parse_expression_from_token(next)?
        };

        let next = self.next_after_whitespace()?;
        let else_ = if next.kind == TokenKind::Else {
            let next = self.next_after_whitespace()?;
            Some(Box::new(match next.kind {
                TokenKind::LeftBrace => self.parse_block(false)?,
                TokenKind::If => self.parse_if()?,
                _ => self.parse_expression_from_token(next)?,
            }))
        } else {
            self.lx.unread(next);
            None
        };

        Ok(Node::If {
            cond: Box::new(cond),
            body: Box::new(body),
            else_,
        })
    }

    fn parse_for(&mut self) -> Result<Node, ParseError> {
        let var = self.expect_token(&[TokenKind::Identifier])?.literal;
        self.expect_token(&[TokenKind::In])?;
        let iterable = self.parse_expression()?;
        self.expect_token(&[TokenKind::LeftBrace])?;
        let body = self.parse_block(false)?;
        Ok(Node::ForIn {
            var,
            iterable: Box::new(iterable),
            body: Box::new(body),
        })
    }

    fn parse_expression(&mut self) -> Result<Node, ParseError> {
        let tok = self.next_after_whitespace()?;
        self.parse_expression_from_token(tok)
    }

    fn parse_expression_from_token(&mut self, tok: Token) -> Result<Node, ParseError> {
        self.parse_expression_prec(tok, 0)
    }

    fn parse_expression_prec(&mut self, tok: Token, min_prec: i32) -> Result<Node, ParseError> {
        let node = match tok.kind {
            TokenKind::Identifier => Node::Identifier(tok.literal),
            TokenKind::NumberLiteral => {
                Node::Literal(Lit::Num(self.parse_number_literal(&tok.literal)?))
            }
            TokenKind::DoubleQuote => self.parse_string('"')?,
            TokenKind::LeftSquareBracket => self.parse_list()?,
            TokenKind::LeftBrace => self.parse_object()?,
            TokenKind::Instance => self.parse_interface_instantiation()?,
            TokenKind::Fn => self.parse_function()?,
            TokenKind::True => Node::Literal(Lit::Bool(true)),
            TokenKind::False => Node::Literal(Lit::Bool(false)),
            TokenKind::LogicalNot => {
                let operand_tok = self.next_after_whitespace()?;
                let operand = self.parse_expression_prec(operand_tok, NOT_PREC)?;
                Node::Not(Box::new(operand))
            }
            _ => return Err(self.unexpected(&[], &tok)),
        };

        self.parse_operation(node, min_prec)
    }

    /// Postfix loop over a primary expression: assignment, key access,
    /// index access, call, lambda arrow and binary operators.
    fn parse_operation(&mut self, mut node: Node, min_prec: i32) -> Result<Node, ParseError> {
        loop {
            let next = self.next_after_whitespace()?;
            node = match next.kind {
                TokenKind::Assign => self.parse_assignment(node)?,
                TokenKind::Dot => {
                    let key = self.expect_token(&[TokenKind::Identifier])?.literal;
                    Node::KeyAccess {
                        value: Box::new(node),
                        key,
                    }
                }
                TokenKind::LeftSquareBracket => {
                    let index = self.parse_expression()?;
                    self.expect_token(&[TokenKind::RightSquareBracket])?;
                    Node::IndexAccess {
                        value: Box::new(node),
                        index: Box::new(index),
                    }
                }
                TokenKind::LeftParen => self.parse_call(node)?,
                TokenKind::Arrow => self.parse_lambda(node)?,
                kind if precedence_of(kind) > 0 => {
                    let prec = precedence_of(kind);
                    if prec < min_prec {
                        self.lx.unread(next);
                        return Ok(node);
                    }
                    self.parse_binary_op(node, kind, prec)?
                }
                _ => {
                    self.lx.unread(next);
                    return Ok(node);
                }
            };
        }
    }

    fn parse_assignment(&mut self, target: Node) -> Result<Node, ParseError> {
        let value = self.parse_expression()?;
        match target {
            Node::Identifier(name) => Ok(Node::Declaration {
                name,
                value: Box::new(value),
            }),
            _ => Err(ParseError::AssignmentNotAllowed {
                line: self.lx.line(),
            }),
        }
    }

    fn parse_call(&mut self, f: Node) -> Result<Node, ParseError> {
        if self.block_depth == 0 {
            return Err(ParseError::CallAtTopLevel);
        }

        let tok = self.next_after_whitespace()?;
        let arg = if tok.kind == TokenKind::RightParen {
            None
        } else {
            let arg = self.parse_expression_from_token(tok)?;
            self.expect_token(&[TokenKind::RightParen])?;
            Some(Box::new(arg))
        };
        Ok(Node::Call {
            f: Box::new(f),
            arg,
        })
    }

    fn parse_lambda(&mut self, arg: Node) -> Result<Node, ParseError> {
        let Node::Identifier(name) = arg else {
            return Err(ParseError::MissingLambdaArg {
                line: self.lx.line(),
            });
        };
        // The lambda body is a function body: calls are legal in it.
        self.block_depth += 1;
        let body = self.parse_expression();
        self.block_depth -= 1;
        Ok(Node::Function(Rc::new(FunctionDef {
            arg: ArgSpec::Named { name, kind: None },
            body: body?,
        })))
    }

    fn parse_binary_op(&mut self, left: Node, op: TokenKind, prec: i32) -> Result<Node, ParseError> {
        let tok = self.next_after_whitespace()?;
        // `**` is right-associative; everything else associates left.
        let next_min = if op == TokenKind::Exponent {
            prec
        } else {
            prec + 1
        };
        let right = self.parse_expression_prec(tok, next_min)?;

        let left = Box::new(left);
        let right = Box::new(right);
        Ok(match op {
            TokenKind::Equals => Node::Equals { left, right },
            TokenKind::NotEquals => Node::Not(Box::new(Node::Equals { left, right })),
            TokenKind::LessThan => Node::Compare {
                op: CmpOp::Lt,
                left,
                right,
            },
            TokenKind::LessThanOrEqual => Node::Compare {
                op: CmpOp::Le,
                left,
                right,
            },
            TokenKind::GreaterThan => Node::Compare {
                op: CmpOp::Gt,
                left,
                right,
            },
            TokenKind::GreaterThanOrEqual => Node::Compare {
                op: CmpOp::Ge,
                left,
                right,
            },
            TokenKind::LogicalAnd => Node::Logical {
                op: LogicalOp::And,
                left,
                right,
            },
            TokenKind::LogicalOr => Node::Logical {
                op: LogicalOp::Or,
                left,
                right,
            },
            TokenKind::Plus => Node::Arith {
                op: ArithOp::Add,
                left,
                right,
            },
            TokenKind::Minus => Node::Arith {
                op: ArithOp::Sub,
                left,
                right,
            },
            TokenKind::Multiply => Node::Arith {
                op: ArithOp::Mul,
                left,
                right,
            },
            TokenKind::Divide => Node::Arith {
                op: ArithOp::Div,
                left,
                right,
            },
            TokenKind::Modulo => Node::Arith {
                op: ArithOp::Mod,
                left,
                right,
            },
            TokenKind::Exponent => Node::Arith {
                op: ArithOp::Pow,
                left,
                right,
            },
            other => {
                return Err(ParseError::UnexpectedToken {
                    line: self.lx.line(),
                    got: other.to_string(),
                })
            }
        })
    }

    fn parse_interface_instantiation(&mut self) -> Result<Node, ParseError> {
        let iface = self.expect_token(&[TokenKind::Identifier])?.literal;
        self.expect_token(&[TokenKind::LeftBrace])?;
        let obj = self.parse_object()?;
        Ok(Node::InterfaceInstantiate {
            interface: Box::new(Node::Identifier(iface)),
            value: Box::new(obj),
        })
    }

    fn parse_list(&mut self) -> Result<Node, ParseError> {
        let mut elements = Vec::new();
        loop {
            let tok = self.next_after_whitespace()?;
            if tok.kind == TokenKind::RightSquareBracket {
                return Ok(Node::ListLiteral(elements));
            }
            elements.push(self.parse_expression_from_token(tok)?);

            let tok =
                self.expect_token(&[TokenKind::RightSquareBracket, TokenKind::Comma])?;
            if tok.kind == TokenKind::RightSquareBracket {
                return Ok(Node::ListLiteral(elements));
            }
        }
    }

    fn parse_object(&mut self) -> Result<Node, ParseError> {
        let Node::Block { body, .. } = self.parse_block(false)? else {
            unreachable!("parse_block returns a block node");
        };
        Ok(Node::ObjectLiteral { body })
    }

    fn parse_function(&mut self) -> Result<Node, ParseError> {
        let def = self.parse_function_definition(false)?;

        let tok = self.expect_token(&[TokenKind::LeftBrace, TokenKind::Arrow])?;
        let body = if tok.kind == TokenKind::LeftBrace {
            self.parse_block(true)?
        } else {
            // Expression bodies still permit calls.
            self.block_depth += 1;
            let body = self.parse_expression();
            self.block_depth -= 1;
            body?
        };

        let function = Node::Function(Rc::new(FunctionDef {
            arg: def.arg,
            body,
        }));
        if def.name.is_empty() {
            Ok(function)
        } else {
            Ok(Node::Declaration {
                name: def.name,
                value: Box::new(function),
            })
        }
    }

    fn parse_function_definition(
        &mut self,
        name_required: bool,
    ) -> Result<FunctionSignature, ParseError> {
        let mut sig = FunctionSignature {
            name: String::new(),
            arg: ArgSpec::None,
        };

        let start = self.expect_token(&[TokenKind::Identifier, TokenKind::LeftParen])?;
        if start.kind == TokenKind::Identifier {
            sig.name = start.literal;
            self.expect_token(&[TokenKind::LeftParen])?;
        } else if name_required {
            return Err(self.unexpected(&[TokenKind::Identifier], &start));
        }

        let tok = self.expect_token(&[
            TokenKind::Identifier,
            TokenKind::RightParen,
            TokenKind::LeftBrace,
        ])?;
        match tok.kind {
            TokenKind::Identifier => {
                let name = tok.literal;
                let next = self.expect_token(&[TokenKind::RightParen, TokenKind::Colon])?;
                let kind = if next.kind == TokenKind::Colon {
                    let kind = self.parse_type()?;
                    self.expect_token(&[TokenKind::RightParen])?;
                    Some(kind)
                } else {
                    None
                };
                sig.arg = ArgSpec::Named { name, kind };
            }
            TokenKind::LeftBrace => {
                sig.arg = ArgSpec::Destructure(self.parse_argument_destructure()?);
                self.expect_token(&[TokenKind::RightParen])?;
            }
            _ => {}
        }

        Ok(sig)
    }

    fn parse_argument_destructure(&mut self) -> Result<Vec<String>, ParseError> {
        let mut names = Vec::new();

        let tok = self.expect_token(&[TokenKind::Identifier, TokenKind::RightBrace])?;
        if tok.kind == TokenKind::RightBrace {
            return Ok(names);
        }
        names.push(tok.literal);

        loop {
            let next = self.expect_token(&[TokenKind::Comma, TokenKind::RightBrace])?;
            if next.kind == TokenKind::RightBrace {
                return Ok(names);
            }
            names.push(self.expect_token(&[TokenKind::Identifier])?.literal);
        }
    }

    fn parse_type(&mut self) -> Result<Kind, ParseError> {
        let tok = self.expect_token(&[
            TokenKind::TypeString,
            TokenKind::TypeBool,
            TokenKind::TypeNumber,
        ])?;
        Ok(match tok.kind {
            TokenKind::TypeString => Kind::String,
            TokenKind::TypeBool => Kind::Bool,
            _ => Kind::Number,
        })
    }

    fn parse_block(&mut self, is_function_body: bool) -> Result<Node, ParseError> {
        self.block_depth += 1;
        let result = self.parse_block_inner(is_function_body);
        self.block_depth -= 1;
        result
    }

    fn parse_block_inner(&mut self, is_function_body: bool) -> Result<Node, ParseError> {
        let mut body = Vec::new();
        loop {
            let Some(first) = self.next_statement_token()? else {
                return Err(ParseError::UnexpectedEof);
            };
            if first.kind == TokenKind::RightBrace {
                return Ok(Node::Block {
                    body,
                    is_function_body,
                });
            }

            body.push(self.parse_statement_from_token(first)?);

            // A newline since the last statement acts as a terminator.
            if self.new_line_state == self.lx.state {
                continue;
            }
            let next = self.expect_token(&[
                TokenKind::RightBrace,
                TokenKind::Eof,
                TokenKind::NewLine,
                TokenKind::Semicolon,
            ])?;
            if next.kind == TokenKind::RightBrace {
                return Ok(Node::Block {
                    body,
                    is_function_body,
                });
            }
        }
    }

    /// Reads a plain string with no escapes or interpolation, as used by
    /// `import` statements.
    fn parse_pure_string(&mut self) -> Result<String, ParseError> {
        self.expect_token(&[TokenKind::DoubleQuote])?;
        let mut out = String::new();
        loop {
            let Some(ch) = self.lx.read_char() else {
                return Err(ParseError::UnterminatedString {
                    line: self.lx.line(),
                });
            };
            if ch == '"' {
                return Ok(out);
            }
            out.push(ch);
        }
    }

    /// Scans a string body directly from the reader so that `${...}` can
    /// recursively invoke expression parsing.
    fn parse_string(&mut self, quote: char) -> Result<Node, ParseError> {
        let mut parts = Vec::new();
        let mut buf = String::new();
        let mut escaped = false;
        let mut dollar = false;

        loop {
            let ch = match self.lx.read_char() {
                Some(ch) if ch != '\n' => ch,
                _ => {
                    return Err(ParseError::UnterminatedString {
                        line: self.lx.line(),
                    })
                }
            };

            if ch == '\\' {
                escaped = !escaped;
                if escaped {
                    continue;
                }
            }

            if escaped {
                buf.push(resolve_escape(ch));
                escaped = false;
                dollar = false;
                continue;
            }

            if dollar && ch == '{' {
                if !buf.is_empty() {
                    parts.push(Node::Literal(Lit::Str(std::mem::take(&mut buf))));
                }
                let expr = self.parse_expression()?;
                parts.push(expr);
                self.expect_token(&[TokenKind::RightBrace])?;
                dollar = false;
                continue;
            } else if dollar {
                buf.push('$');
            }

            if ch == quote {
                if dollar {
                    buf.push('$');
                }
                if !buf.is_empty() {
                    parts.push(Node::Literal(Lit::Str(buf)));
                }
                break;
            } else if ch == '$' {
                dollar = true;
            } else {
                buf.push(ch);
                dollar = false;
            }
        }

        Ok(Node::StringParts(parts))
    }

    fn parse_number_literal(&self, lit: &str) -> Result<f64, ParseError> {
        let cleaned: String = lit.chars().filter(|c| *c != '_').collect();
        let cleaned = cleaned.strip_suffix('n').unwrap_or(&cleaned);

        let invalid = || ParseError::InvalidNumberLiteral {
            line: self.lx.line(),
            literal: lit.to_string(),
        };

        if cleaned.len() > 2 && cleaned.starts_with('0') {
            let radix = match cleaned.as_bytes()[1] {
                b'x' | b'X' => Some(16),
                b'b' | b'B' => Some(2),
                b'o' | b'O' => Some(8),
                _ => None,
            };
            if let Some(radix) = radix {
                let n = i64::from_str_radix(&cleaned[2..], radix).map_err(|_| invalid())?;
                return Ok(n as f64);
            }
        }

        cleaned.parse::<f64>().map_err(|_| invalid())
    }

    fn expect_token(&mut self, kinds: &[TokenKind]) -> Result<Token, ParseError> {
        loop {
            let tok = self.next()?;
            if kinds.contains(&tok.kind) {
                return Ok(tok);
            }
            // Not sensitive to whitespace or newlines between tokens.
            if matches!(tok.kind, TokenKind::NewLine | TokenKind::Whitespace) {
                continue;
            }
            return Err(self.unexpected(kinds, &tok));
        }
    }

    /// Returns the next token, skipping comments and recording newlines.
    fn next(&mut self) -> Result<Token, ParseError> {
        loop {
            let in_new_line = self.new_line_state == self.lx.state;
            let tok = self.lx.next_token()?;
            match tok.kind {
                TokenKind::SingleLineComment | TokenKind::MultiLineComment => continue,
                TokenKind::NewLine => self.new_line_state = self.lx.state,
                TokenKind::Whitespace if in_new_line => self.new_line_state = self.lx.state,
                _ => {}
            }
            return Ok(tok);
        }
    }

    fn next_after_whitespace(&mut self) -> Result<Token, ParseError> {
        loop {
            let tok = self.next()?;
            if !matches!(tok.kind, TokenKind::Whitespace | TokenKind::NewLine) {
                return Ok(tok);
            }
        }
    }

    fn unexpected(&self, expected: &[TokenKind], got: &Token) -> ParseError {
        if expected.is_empty() {
            return ParseError::UnexpectedToken {
                line: self.lx.line(),
                got: got.to_string(),
            };
        }
        ParseError::UnexpectedTokenWanted {
            line: self.lx.line(),
            got: got.to_string(),
            expected: expected
                .iter()
                .map(|k| k.to_string())
                .collect::<Vec<_>>()
                .join(" or "),
        }
    }
}

struct FunctionSignature {
    name: String,
    arg: ArgSpec,
}

fn resolve_escape(ch: char) -> char {
    match ch {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        'b' => '\u{0008}',
        'f' => '\u{000C}',
        'v' => '\u{000B}',
        '\\' => '\\',
        '\'' => '\'',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> Vec<Node> {
        parse(src).unwrap_or_else(|e| panic!("parse failed for {src:?}: {e}"))
    }

    fn display(prog: &[Node]) -> String {
        prog.iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn parses_declaration_and_export() {
        let prog = parse_ok("export x = 1 + 2");
        assert_eq!(display(&prog), "export x = 1 + 2");
    }

    #[test]
    fn parses_interpolated_string() {
        let prog = parse_ok(r#"s = "go${v}.${name}""#);
        assert_eq!(display(&prog), r#"s = "go${v}.${name}""#);
    }

    #[test]
    fn parses_function_forms() {
        let prog = parse_ok("fn install(version) {\n    x = version\n}");
        assert_eq!(display(&prog), "install = fn(version) { x = version }");

        let prog = parse_ok("f = fn(x: string) -> x");
        assert_eq!(display(&prog), "f = fn(x: string) -> x");

        let prog = parse_ok("f = fn({a, b}) -> a");
        assert_eq!(display(&prog), "f = fn({a, b}) -> a");
    }

    #[test]
    fn parses_lambda_shorthand() {
        let prog = parse_ok("f = l -> l.trim_whitespace()");
        assert_eq!(display(&prog), "f = fn(l) -> l.trim_whitespace()");
    }

    #[test]
    fn parses_precedence() {
        let prog = parse_ok("x = 1 + 2 * 3 < 4 && true");
        assert_eq!(display(&prog), "x = 1 + 2 * 3 < 4 && true");
    }

    #[test]
    fn parses_interface_and_instance() {
        let prog = parse_ok(
            "interface Error { message: string }\nfn f() { e = instance Error { message = \"x\" } }",
        );
        assert_eq!(
            display(&prog),
            "interface Error { message: string }\nf = fn() { e = instance Error { message = \"x\" } }"
        );
    }

    #[test]
    fn top_level_rules_are_enforced() {
        assert!(matches!(
            parse("fn f() { export x = 1 }"),
            Err(ParseError::ExportNotAtTopLevel)
        ));
        assert!(matches!(
            parse("fn f() { import \"a\" }"),
            Err(ParseError::ImportNotAtTopLevel)
        ));
        assert!(matches!(
            parse("fn f() { interface I { x: string } }"),
            Err(ParseError::InterfaceNotAtTopLevel)
        ));
        assert!(matches!(parse("f()"), Err(ParseError::CallAtTopLevel)));
    }

    #[test]
    fn export_requires_declaration() {
        assert!(matches!(
            parse("export 1"),
            Err(ParseError::UnexpectedTokenWanted { .. })
        ));
        assert!(matches!(
            parse("export x"),
            Err(ParseError::ExportMustHaveDeclaration)
        ));
    }

    #[test]
    fn assignment_targets_must_be_identifiers() {
        assert!(matches!(
            parse("fn f() { a.b = 1 }"),
            Err(ParseError::AssignmentNotAllowed { .. })
        ));
    }

    #[test]
    fn statements_need_terminators_within_a_line() {
        assert!(parse("fn f() { a = 1; b = 2 }").is_ok());
        assert!(parse("fn f() {\n a = 1\n b = 2\n}").is_ok());
        assert!(parse("fn f() { a = 1 b = 2 }").is_err());
    }

    #[test]
    fn parses_import_list() {
        let prog = parse_ok("import \"semver\", \"urls\"");
        assert_eq!(display(&prog), "import \"semver\", \"urls\"");
    }

    #[test]
    fn round_trips_canonical_form() {
        let sources = [
            "export name = \"go\"",
            "export x = 1 + 2",
            "x = [1, 2, 3]",
            "o = { a = 1; b = \"two\" }",
            "fn f(v) { if v == 1 { return true } else { return false } }",
            "fn g() { for x in [1, 2] { total = total + x } }",
            "fn h() { throw error(\"boom\") }",
            "s = \"pre${a}mid${b}post\"",
            "f = l -> l.inclusive_remove_until(\"go\")",
            "y = a && b || !c",
            "z = items[0]",
            "fn k(v: number) -> v * 2 ** 3",
        ];
        for src in sources {
            let first = parse_ok(src);
            let printed = display(&first);
            let second = parse_ok(&printed);
            assert_eq!(printed, display(&second), "round trip for {src:?}");
        }
    }

    #[test]
    fn number_literal_forms() {
        let prog = parse_ok("x = 0x1F\ny = 0b101\nz = 0o17\nw = 1_000n\nv = 1.5e2");
        assert_eq!(display(&prog), "x = 31\ny = 5\nz = 15\nw = 1000\nv = 150");
    }

    #[test]
    fn unterminated_string_is_fatal() {
        assert!(matches!(
            parse("x = \"abc"),
            Err(ParseError::UnterminatedString { .. })
        ));
    }
}
