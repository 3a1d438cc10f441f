//! Tokenizer and recursive-descent parser for guard expressions

use std::iter::Peekable;
use std::str::CharIndices;

use super::error::{GuardError, Result};

/// Maximum nesting of parentheses and negations
pub const MAX_DEPTH: usize = 64;

/// Attribute a guard may read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribute {
    PrincipalUserId,
    PrincipalRoles,
    PrincipalDefaultRealm,
    PrincipalScope,
    PrincipalOrgRefName,
    PrincipalAccountNumber,
    PrincipalTenantId,
    PrincipalDataSegment,
    PrincipalOwnerId,
    PrincipalProperty(String),
    ResourceArea,
    ResourceFunctionalDomain,
    ResourceAction,
    ResourceId,
    ResourceOwnerId,
    ResourceRealm,
    ResourceOrgRefName,
    ResourceAccountNumber,
    ResourceTenantId,
    ResourceDataSegment,
}

impl Attribute {
    /// Resolve a dotted path such as `principal.userId`
    pub fn parse(path: &str) -> Result<Self> {
        let unknown = || GuardError::UnknownAttribute(path.to_string());

        if let Some(field) = path.strip_prefix("principal.") {
            if let Some(key) = field.strip_prefix("properties.") {
                if key.is_empty() || key.contains('.') {
                    return Err(unknown());
                }
                return Ok(Self::PrincipalProperty(key.to_string()));
            }
            return match field {
                "userId" => Ok(Self::PrincipalUserId),
                "roles" => Ok(Self::PrincipalRoles),
                "defaultRealm" => Ok(Self::PrincipalDefaultRealm),
                "scope" => Ok(Self::PrincipalScope),
                "orgRefName" => Ok(Self::PrincipalOrgRefName),
                "accountNumber" => Ok(Self::PrincipalAccountNumber),
                "tenantId" => Ok(Self::PrincipalTenantId),
                "dataSegment" => Ok(Self::PrincipalDataSegment),
                "ownerId" => Ok(Self::PrincipalOwnerId),
                _ => Err(unknown()),
            };
        }

        if let Some(field) = path.strip_prefix("resource.") {
            return match field {
                "area" => Ok(Self::ResourceArea),
                "functionalDomain" => Ok(Self::ResourceFunctionalDomain),
                "action" => Ok(Self::ResourceAction),
                "resourceId" => Ok(Self::ResourceId),
                "ownerId" => Ok(Self::ResourceOwnerId),
                "realm" => Ok(Self::ResourceRealm),
                "orgRefName" => Ok(Self::ResourceOrgRefName),
                "accountNumber" => Ok(Self::ResourceAccountNumber),
                "tenantId" => Ok(Self::ResourceTenantId),
                "dataSegment" => Ok(Self::ResourceDataSegment),
                _ => Err(unknown()),
            };
        }

        Err(unknown())
    }

    /// Dotted path, as written in a guard
    pub fn path(&self) -> String {
        let fixed = match self {
            Self::PrincipalProperty(key) => return format!("principal.properties.{key}"),
            Self::PrincipalUserId => "principal.userId",
            Self::PrincipalRoles => "principal.roles",
            Self::PrincipalDefaultRealm => "principal.defaultRealm",
            Self::PrincipalScope => "principal.scope",
            Self::PrincipalOrgRefName => "principal.orgRefName",
            Self::PrincipalAccountNumber => "principal.accountNumber",
            Self::PrincipalTenantId => "principal.tenantId",
            Self::PrincipalDataSegment => "principal.dataSegment",
            Self::PrincipalOwnerId => "principal.ownerId",
            Self::ResourceArea => "resource.area",
            Self::ResourceFunctionalDomain => "resource.functionalDomain",
            Self::ResourceAction => "resource.action",
            Self::ResourceId => "resource.resourceId",
            Self::ResourceOwnerId => "resource.ownerId",
            Self::ResourceRealm => "resource.realm",
            Self::ResourceOrgRefName => "resource.orgRefName",
            Self::ResourceAccountNumber => "resource.accountNumber",
            Self::ResourceTenantId => "resource.tenantId",
            Self::ResourceDataSegment => "resource.dataSegment",
        };
        fixed.to_string()
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Self::PrincipalRoles)
    }
}

/// Comparison operand
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Literal(String),
    Attr(Attribute),
    List(Vec<String>),
}

impl Operand {
    fn list_name(&self) -> Option<String> {
        match self {
            Operand::Attr(attr) if attr.is_list() => Some(attr.path()),
            Operand::List(_) => Some("[...]".to_string()),
            _ => None,
        }
    }
}

/// Compiled guard expression tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Bool(bool),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Eq(Operand, Operand),
    Ne(Operand, Operand),
    In(Operand, Operand),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Str(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    EqEq,
    NotEq,
    AndAnd,
    OrOr,
    Bang,
    In,
    True,
    False,
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    offset: usize,
}

/// Consume the current char and, if present, `second` after it
fn pair(chars: &mut Peekable<CharIndices<'_>>, second: char) -> bool {
    chars.next();
    match chars.peek() {
        Some(&(_, next)) if next == second => {
            chars.next();
            true
        }
        _ => false,
    }
}

fn tokenize(src: &str) -> Result<Vec<Spanned>> {
    let mut tokens = Vec::new();
    let mut chars = src.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let token = match c {
            '(' => {
                chars.next();
                Token::LParen
            }
            ')' => {
                chars.next();
                Token::RParen
            }
            '[' => {
                chars.next();
                Token::LBracket
            }
            ']' => {
                chars.next();
                Token::RBracket
            }
            ',' => {
                chars.next();
                Token::Comma
            }
            '=' => {
                if !pair(&mut chars, '=') {
                    return Err(GuardError::syntax(offset, "expected '=='"));
                }
                Token::EqEq
            }
            '!' => {
                if pair(&mut chars, '=') {
                    Token::NotEq
                } else {
                    Token::Bang
                }
            }
            '&' => {
                if !pair(&mut chars, '&') {
                    return Err(GuardError::syntax(offset, "expected '&&'"));
                }
                Token::AndAnd
            }
            '|' => {
                if !pair(&mut chars, '|') {
                    return Err(GuardError::syntax(offset, "expected '||'"));
                }
                Token::OrOr
            }
            '\'' | '"' => {
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some((_, ch)) = chars.next() {
                    match ch {
                        '\\' => match chars.next() {
                            Some((_, escaped)) => value.push(escaped),
                            None => break,
                        },
                        ch if ch == c => {
                            closed = true;
                            break;
                        }
                        ch => value.push(ch),
                    }
                }
                if !closed {
                    return Err(GuardError::syntax(offset, "unterminated string literal"));
                }
                Token::Str(value)
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&(_, ch)) = chars.peek() {
                    if ch.is_alphanumeric() || matches!(ch, '_' | '.' | '-') {
                        ident.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match ident.as_str() {
                    "in" => Token::In,
                    "true" => Token::True,
                    "false" => Token::False,
                    _ => Token::Ident(ident),
                }
            }
            other => {
                return Err(GuardError::syntax(
                    offset,
                    format!("unexpected character '{other}'"),
                ))
            }
        };

        tokens.push(Spanned { token, offset });
    }

    Ok(tokens)
}

/// Parse a guard source string into an expression tree
pub fn parse(src: &str) -> Result<Expr> {
    let tokens = tokenize(src)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        end: src.len(),
    };

    let expr = parser.parse_or()?;
    if let Some(extra) = parser.tokens.get(parser.pos) {
        return Err(GuardError::syntax(extra.offset, "unexpected trailing input"));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |s| s.offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|s| s.token.clone());
        self.pos += 1;
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(GuardError::TooDeep(MAX_DEPTH));
        }
        Ok(())
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut terms = vec![self.parse_and()?];
        while self.eat(&Token::OrOr) {
            terms.push(self.parse_and()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::Or(terms)
        })
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut terms = vec![self.parse_unary()?];
        while self.eat(&Token::AndAnd) {
            terms.push(self.parse_unary()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::And(terms)
        })
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.eat(&Token::Bang) {
            self.enter()?;
            let inner = self.parse_unary()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<Expr> {
        match self.peek() {
            Some(Token::LParen) => {
                self.pos += 1;
                self.enter()?;
                let inner = self.parse_or()?;
                if !self.eat(&Token::RParen) {
                    return Err(GuardError::syntax(self.offset(), "expected ')'"));
                }
                self.depth -= 1;
                Ok(inner)
            }
            Some(Token::True) => {
                self.pos += 1;
                Ok(Expr::Bool(true))
            }
            Some(Token::False) => {
                self.pos += 1;
                Ok(Expr::Bool(false))
            }
            _ => self.parse_comparison(),
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let lhs = self.parse_operand()?;
        let offset = self.offset();

        match self.advance() {
            Some(Token::EqEq) => {
                let rhs = self.parse_operand()?;
                scalar_only(&lhs)?;
                scalar_only(&rhs)?;
                Ok(Expr::Eq(lhs, rhs))
            }
            Some(Token::NotEq) => {
                let rhs = self.parse_operand()?;
                scalar_only(&lhs)?;
                scalar_only(&rhs)?;
                Ok(Expr::Ne(lhs, rhs))
            }
            Some(Token::In) => {
                let rhs = self.parse_operand()?;
                scalar_only(&lhs)?;
                if rhs.list_name().is_none() {
                    return Err(GuardError::InRequiresList);
                }
                Ok(Expr::In(lhs, rhs))
            }
            _ => Err(GuardError::syntax(
                offset,
                "expected '==', '!=' or 'in' after operand",
            )),
        }
    }

    fn parse_operand(&mut self) -> Result<Operand> {
        let offset = self.offset();
        match self.advance() {
            Some(Token::Str(value)) => Ok(Operand::Literal(value)),
            Some(Token::Ident(path)) => Attribute::parse(&path).map(Operand::Attr),
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                if self.eat(&Token::RBracket) {
                    return Ok(Operand::List(items));
                }
                loop {
                    let item_offset = self.offset();
                    match self.advance() {
                        Some(Token::Str(value)) => items.push(value),
                        _ => {
                            return Err(GuardError::syntax(
                                item_offset,
                                "list items must be string literals",
                            ))
                        }
                    }
                    if self.eat(&Token::RBracket) {
                        return Ok(Operand::List(items));
                    }
                    if !self.eat(&Token::Comma) {
                        return Err(GuardError::syntax(self.offset(), "expected ',' or ']'"));
                    }
                }
            }
            _ => Err(GuardError::syntax(offset, "expected attribute or string literal")),
        }
    }
}

fn scalar_only(operand: &Operand) -> Result<()> {
    match operand.list_name() {
        Some(name) => Err(GuardError::ListOutsideIn(name)),
        None => Ok(()),
    }
}
