//! Textual IR parser implementation

use super::lexer::{Lexer, Spanned, Token};
use super::{ParseError, ParseResult};
use crate::debug::SourceLoc;
use crate::ir::{names, Attr, IntType, Module, OpId, OpKind, Operation, Type, ValueId, Visibility, MAX_INT_BITS};
use std::collections::HashMap;

/// Parse a module, tagging locations with `<input>`.
pub fn parse(input: &str) -> ParseResult<Module> {
    parse_named(input, "<input>")
}

/// Parse a module, tagging locations with `file`.
pub fn parse_named(input: &str, file: &str) -> ParseResult<Module> {
    let tokens = Lexer::new(input).tokenize()?;
    Parser::new(tokens, file).parse_module()
}

fn parse_int_type(text: &str) -> Option<IntType> {
    let (ctor, digits): (fn(u32) -> IntType, &str) = if let Some(d) = text.strip_prefix("si") {
        (IntType::signed, d)
    } else if let Some(d) = text.strip_prefix("ui") {
        (IntType::unsigned, d)
    } else {
        (IntType::signless, text.strip_prefix('i')?)
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let ty = ctor(digits.parse().ok()?);
    (ty.bits >= 1 && ty.bits <= MAX_INT_BITS).then_some(ty)
}

/// Parse a type from its textual form (`i64`, `tensor<2x4xui32>`, `memref<i128>`).
pub fn parse_type(text: &str) -> Option<Type> {
    if let Some(inner) = text.strip_prefix("tensor<").and_then(|t| t.strip_suffix('>')) {
        let mut parts: Vec<&str> = inner.split('x').collect();
        let elem = parse_int_type(parts.pop()?)?;
        let shape = parts
            .into_iter()
            .map(|dim| dim.parse::<u64>().ok())
            .collect::<Option<Vec<u64>>>()?;
        return Some(Type::tensor(shape, elem));
    }
    if let Some(inner) = text.strip_prefix("memref<").and_then(|t| t.strip_suffix('>')) {
        return parse_int_type(inner).map(Type::memref);
    }
    parse_int_type(text).map(Type::Int)
}

pub struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    file: String,
    module: Module,
    values: HashMap<String, ValueId>,
}

impl Parser {
    pub fn new(tokens: Vec<Spanned>, file: &str) -> Self {
        Self {
            tokens,
            pos: 0,
            file: file.to_string(),
            module: Module::default(),
            values: HashMap::new(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    /// Peek, but only at tokens on `line`.
    fn peek_on(&self, line: u32) -> Option<&Token> {
        self.tokens.get(self.pos).filter(|s| s.line == line).map(|s| &s.token)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|s| s.line as usize)
            .unwrap_or(1)
    }

    fn loc(&self) -> Option<SourceLoc> {
        self.tokens.get(self.pos).map(|s| SourceLoc::new(self.file.clone(), s.line, s.col))
    }

    fn next(&mut self) -> ParseResult<Spanned> {
        let tok = self.tokens.get(self.pos).cloned().ok_or(ParseError::UnexpectedEof)?;
        self.pos += 1;
        Ok(tok)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::ParseError { line: self.line(), message: message.into() }
    }

    fn expect(&mut self, expected: Token) -> ParseResult<()> {
        let line = self.line();
        let tok = self.next()?;
        if tok.token == expected {
            Ok(())
        } else {
            Err(ParseError::ParseError {
                line,
                message: format!("Expected {:?}, got {:?}", expected, tok.token),
            })
        }
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn value_name(&mut self) -> ParseResult<String> {
        let line = self.line();
        match self.next()?.token {
            Token::Value(name) => Ok(name),
            tok => Err(ParseError::ParseError { line, message: format!("Expected a value, got {:?}", tok) }),
        }
    }

    fn type_(&mut self) -> ParseResult<Type> {
        let line = self.line();
        match self.next()?.token {
            Token::Ident(text) => parse_type(&text).ok_or(ParseError::InvalidType { line, text }),
            tok => Err(ParseError::InvalidType { line, text: format!("{:?}", tok) }),
        }
    }

    fn lookup(&self, name: &str, line: usize) -> ParseResult<ValueId> {
        self.values
            .get(name)
            .copied()
            .ok_or_else(|| ParseError::UndefinedValue { line, name: name.to_string() })
    }

    fn bind(&mut self, name: String, value: ValueId, line: usize) -> ParseResult<()> {
        if self.values.contains_key(&name) {
            return Err(ParseError::Redefinition { line, name });
        }
        self.values.insert(name, value);
        Ok(())
    }

    pub fn parse_module(mut self) -> ParseResult<Module> {
        let wrapped = matches!(self.peek(), Some(Token::Ident(kw)) if kw == "module");
        if wrapped {
            self.next()?;
            if let Some(Token::Symbol(name)) = self.peek() {
                self.module.name = name.clone();
                self.pos += 1;
            }
            self.expect(Token::LBrace)?;
        }

        loop {
            match self.peek() {
                None if wrapped => return Err(ParseError::UnexpectedEof),
                None => break,
                Some(Token::RBrace) if wrapped => {
                    self.pos += 1;
                    break;
                }
                Some(Token::Ident(name)) if name == names::FUNC => self.parse_function()?,
                Some(_) => {
                    self.parse_op(None)?;
                }
            }
        }

        if self.peek().is_some() {
            return Err(self.error("Unexpected tokens after module"));
        }
        Ok(self.module)
    }

    fn parse_function(&mut self) -> ParseResult<()> {
        let loc = self.loc();
        self.expect(Token::Ident(names::FUNC.to_string()))?;

        let line = self.line();
        let name = match self.next()?.token {
            Token::Symbol(name) => name,
            tok => return Err(ParseError::ParseError { line, message: format!("Expected function name, got {:?}", tok) }),
        };

        // Values are scoped to their function.
        self.values.clear();

        self.expect(Token::LParen)?;
        let mut arg_names = Vec::new();
        let mut arg_types = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                let line = self.line();
                arg_names.push((self.value_name()?, line));
                self.expect(Token::Colon)?;
                arg_types.push(self.type_()?);
                if self.eat(&Token::RParen) {
                    break;
                }
                self.expect(Token::Comma)?;
            }
        }

        let (func, args) = self.module.add_function(name, arg_types, loc)?;
        for ((arg_name, line), value) in arg_names.into_iter().zip(args) {
            self.bind(arg_name, value, line)?;
        }

        self.expect(Token::LBrace)?;
        loop {
            match self.peek() {
                None => return Err(ParseError::UnexpectedEof),
                Some(Token::RBrace) => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(Token::Ident(name)) if name == names::FUNC => {
                    return Err(self.error("Nested functions are not supported"));
                }
                Some(_) => {
                    self.parse_op(Some(func))?;
                }
            }
        }
    }

    fn parse_attrs(&mut self) -> ParseResult<Vec<(String, Attr)>> {
        self.expect(Token::LBrace)?;
        let mut attrs = Vec::new();
        if self.eat(&Token::RBrace) {
            return Ok(attrs);
        }
        loop {
            let line = self.line();
            let key = match self.next()?.token {
                Token::Ident(key) => key,
                tok => return Err(ParseError::ParseError { line, message: format!("Expected attribute name, got {:?}", tok) }),
            };
            let value = if self.eat(&Token::Equals) {
                let line = self.line();
                match self.next()?.token {
                    Token::Int(v) => Attr::Int(v),
                    Token::Str(s) => Attr::Str(s),
                    tok => {
                        return Err(ParseError::ParseError { line, message: format!("Invalid value for '{}': {:?}", key, tok) })
                    }
                }
            } else {
                Attr::Unit
            };
            attrs.push((key, value));
            if self.eat(&Token::RBrace) {
                return Ok(attrs);
            }
            self.expect(Token::Comma)?;
        }
    }

    fn parse_op(&mut self, parent: Option<OpId>) -> ParseResult<OpId> {
        let loc = self.loc();
        let start_line = self.line();

        // Results
        let mut results = Vec::new();
        if matches!(self.peek(), Some(Token::Value(_))) {
            loop {
                results.push(self.value_name()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect(Token::Equals)?;
        }

        let line = self.line();
        let name_tok = self.next()?;
        let name = match name_tok.token {
            Token::Ident(name) if name.contains('.') => name,
            tok => return Err(ParseError::ParseError { line, message: format!("Expected an operation name, got {:?}", tok) }),
        };
        let op_line = name_tok.line;

        let sym = match self.peek_on(op_line) {
            Some(Token::Symbol(sym)) => {
                let sym = sym.clone();
                self.pos += 1;
                Some(sym)
            }
            _ => None,
        };

        let mut operands = Vec::new();
        if matches!(self.peek_on(op_line), Some(Token::Value(_))) {
            loop {
                let operand = self.value_name()?;
                operands.push(self.lookup(&operand, op_line as usize)?);
                if self.peek_on(op_line) != Some(&Token::Comma) {
                    break;
                }
                self.pos += 1;
            }
        }

        let attrs = if self.peek_on(op_line) == Some(&Token::LBrace) {
            self.parse_attrs()?
        } else {
            Vec::new()
        };

        let mut types = Vec::new();
        if self.peek_on(op_line) == Some(&Token::Colon) {
            self.pos += 1;
            loop {
                types.push(self.type_()?);
                if self.peek_on(op_line) != Some(&Token::Comma) {
                    break;
                }
                self.pos += 1;
            }
        }

        let kind = self.build_kind(&name, sym, attrs, &types, line)?;
        let result_types = if matches!(kind, OpKind::Global { .. }) {
            if !results.is_empty() {
                return Err(self.error_at(line, "memref.global has no results"));
            }
            Vec::new()
        } else {
            if results.len() != types.len() {
                return Err(self.error_at(
                    line,
                    format!("'{}' declares {} result(s) but {} type(s)", name, results.len(), types.len()),
                ));
            }
            types
        };

        let id = self
            .module
            .push_op(parent, Operation::new(kind).operands(operands).at(loc), result_types)?;
        let values = self.module.op(id).map(|op| op.results.clone()).unwrap_or_default();
        for (result, value) in results.into_iter().zip(values) {
            self.bind(result, value, start_line)?;
        }
        Ok(id)
    }

    fn error_at(&self, line: usize, message: impl Into<String>) -> ParseError {
        ParseError::ParseError { line, message: message.into() }
    }

    fn build_kind(
        &self,
        name: &str,
        sym: Option<String>,
        attrs: Vec<(String, Attr)>,
        types: &[Type],
        line: usize,
    ) -> ParseResult<OpKind> {
        let attr = |key: &str| attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v);
        let plain = |kind: OpKind| -> ParseResult<OpKind> {
            if sym.is_some() || !attrs.is_empty() {
                return Err(self.error_at(line, format!("'{}' takes no symbol or attributes", name)));
            }
            Ok(kind)
        };

        match name {
            names::CONSTANT => match attr("value") {
                Some(Attr::Int(value)) => {
                    let mask = types.first().map(|ty| ty.element_type().mask()).unwrap_or(u128::MAX);
                    Ok(OpKind::Constant { value: value & mask })
                }
                _ => Err(self.error_at(line, "arith.constant needs an integer 'value' attribute")),
            },
            names::GLOBAL => {
                let sym = sym.ok_or_else(|| self.error_at(line, "memref.global needs a symbol"))?;
                let ty = match types {
                    [ty @ Type::MemRef { .. }] => ty.clone(),
                    _ => return Err(self.error_at(line, "memref.global needs a single memref type")),
                };
                let visibility = match attr("visibility") {
                    None => Visibility::Public,
                    Some(Attr::Str(s)) => Visibility::from_str(s)
                        .ok_or_else(|| self.error_at(line, format!("Unknown visibility '{}'", s)))?,
                    Some(_) => return Err(self.error_at(line, "visibility must be a string")),
                };
                let init = match attr("init") {
                    None => 0,
                    Some(Attr::Int(v)) => v & ty.element_type().mask(),
                    Some(_) => return Err(self.error_at(line, "init must be an integer")),
                };
                let constant = attr("constant").is_some();
                Ok(OpKind::Global { sym, ty, init, visibility, constant })
            }
            names::GET_GLOBAL => match sym {
                Some(sym) if attrs.is_empty() => Ok(OpKind::GetGlobal { sym }),
                _ => Err(self.error_at(line, "memref.get_global needs a symbol and no attributes")),
            },
            names::ADDI => plain(OpKind::AddI),
            names::SHRUI => plain(OpKind::ShRUI),
            names::TRUNCI => plain(OpKind::TruncI),
            names::EXTUI => plain(OpKind::ExtUI),
            names::EXTSI => plain(OpKind::ExtSI),
            names::LOAD => plain(OpKind::Load),
            names::STORE => plain(OpKind::Store),
            names::FROM_ELEMENTS => plain(OpKind::FromElements),
            names::UNREALIZED_CAST => plain(OpKind::UnrealizedCast),
            names::RETURN => plain(OpKind::Return),
            names::RNG_GET_AND_UPDATE_STATE => plain(OpKind::RngGetAndUpdateState),
            _ => Ok(OpKind::Opaque { name: name.to_string(), sym, attrs }),
        }
    }
}
