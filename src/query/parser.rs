use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, multispace0, satisfy},
    combinator::{all_consuming, map, peek, value},
    multi::many0,
    sequence::{delimited, terminated},
};
use crate::core::error::{Error, Result};
use crate::query::predicate::Operator;

/// Parsed but unresolved query; fields are still names
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryNode {
    Term(Term),
    And(Vec<QueryNode>),
    Or(Vec<QueryNode>),
    Not(Box<QueryNode>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    pub field: Option<String>,   // None = default field
    pub op: Operator,
    pub value: String,
    pub quoted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    LParen,
    RParen,
    Minus,
    Quoted(&'a str),
    Word(&'a str),
}

fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '(' | ')' | '"')
}

fn token(input: &str) -> IResult<&str, Token<'_>> {
    alt((
        value(Token::LParen, char('(')),
        value(Token::RParen, char(')')),
        map(delimited(char('"'), take_while(|c| c != '"'), char('"')), Token::Quoted),
        value(Token::Minus, terminated(char('-'), peek(satisfy(|c: char| !c.is_whitespace())))),
        map(take_while1(is_word_char), Token::Word),
    ))
    .parse(input)
}

fn tokenize(input: &str) -> Result<Vec<Token<'_>>> {
    let result: IResult<&str, Vec<Token<'_>>> =
        all_consuming(delimited(multispace0, many0(terminated(token, multispace0)), multispace0))
            .parse(input);
    match result {
        Ok((_, tokens)) => Ok(tokens),
        Err(e) => Err(Error::query_parse(format!("cannot tokenize {:?}: {}", input, e))),
    }
}

/// Parse a query string.
///
/// Grammar, loosest binding first:
/// - `a OR b`
/// - `a AND b`, or just `a b`
/// - `-a`, `NOT a`
/// - `(a)`, `field:value`, `field:"quoted value"`, `field:>=10`, `field:pre*`, bare `value`
pub fn parse_query(input: &str) -> Result<QueryNode> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(Error::query_parse("empty query"));
    }

    let mut parser = TokenParser { tokens, pos: 0 };
    let node = parser.parse_or()?;
    match parser.peek() {
        None => Ok(node),
        Some(t) => Err(Error::query_parse(format!("unexpected {:?} at token {}", t, parser.pos))),
    }
}

struct TokenParser<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
}

impl<'a> TokenParser<'a> {
    fn peek(&self) -> Option<Token<'a>> {
        self.tokens.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<Token<'a>> {
        let t = self.peek();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn parse_or(&mut self) -> Result<QueryNode> {
        let mut branches = vec![self.parse_and()?];
        while self.peek() == Some(Token::Word("OR")) {
            self.pos += 1;
            branches.push(self.parse_and()?);
        }
        Ok(collapse(branches, QueryNode::Or))
    }

    fn parse_and(&mut self) -> Result<QueryNode> {
        let mut terms = vec![self.parse_unary()?];
        loop {
            match self.peek() {
                None | Some(Token::RParen) | Some(Token::Word("OR")) => break,
                Some(Token::Word("AND")) => {
                    self.pos += 1;
                    terms.push(self.parse_unary()?);
                }
                Some(_) => terms.push(self.parse_unary()?),
            }
        }
        Ok(collapse(terms, QueryNode::And))
    }

    fn parse_unary(&mut self) -> Result<QueryNode> {
        match self.peek() {
            Some(Token::Minus) | Some(Token::Word("NOT")) => {
                self.pos += 1;
                Ok(QueryNode::Not(Box::new(self.parse_unary()?)))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<QueryNode> {
        match self.advance() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(Error::query_parse("missing ')'")),
                }
            }
            Some(Token::Quoted(text)) => Ok(QueryNode::Term(Term {
                field: None,
                op: Operator::Eq,
                value: text.to_string(),
                quoted: true,
            })),
            Some(Token::Word(w @ ("AND" | "OR"))) => {
                Err(Error::query_parse(format!("missing operand before {}", w)))
            }
            Some(Token::Word(word)) => self.parse_term(word),
            Some(t) => Err(Error::query_parse(format!("unexpected {:?}", t))),
            None => Err(Error::query_parse("unexpected end of query")),
        }
    }

    fn parse_term(&mut self, word: &str) -> Result<QueryNode> {
        let Some((field, rest)) = word.split_once(':').filter(|(f, _)| !f.is_empty()) else {
            return Ok(QueryNode::Term(bare_term(None, word)));
        };

        if rest.is_empty() {
            return match self.advance() {
                Some(Token::Quoted(text)) => Ok(QueryNode::Term(Term {
                    field: Some(field.to_string()),
                    op: Operator::Eq,
                    value: text.to_string(),
                    quoted: true,
                })),
                _ => Err(Error::query_parse(format!("missing value for {}", field))),
            };
        }

        let (op, operand) = [(">=", Operator::Ge), ("<=", Operator::Le), (">", Operator::Gt), ("<", Operator::Lt)]
            .into_iter()
            .find_map(|(sym, op)| rest.strip_prefix(sym).map(|v| (op, v)))
            .unwrap_or((Operator::Eq, rest));

        if operand.is_empty() {
            return Err(Error::query_parse(format!("missing value for {}", field)));
        }
        if op == Operator::Eq {
            return Ok(QueryNode::Term(bare_term(Some(field), operand)));
        }
        Ok(QueryNode::Term(Term {
            field: Some(field.to_string()),
            op,
            value: operand.to_string(),
            quoted: false,
        }))
    }
}

// A trailing `*` on an unquoted value asks for a prefix match.
fn bare_term(field: Option<&str>, text: &str) -> Term {
    let (op, value) = match text.strip_suffix('*') {
        Some(prefix) if !prefix.is_empty() => (Operator::Prefix, prefix),
        _ => (Operator::Eq, text),
    };
    Term {
        field: field.map(str::to_string),
        op,
        value: value.to_string(),
        quoted: false,
    }
}

fn collapse(mut nodes: Vec<QueryNode>, wrap: fn(Vec<QueryNode>) -> QueryNode) -> QueryNode {
    if nodes.len() == 1 {
        nodes.remove(0)
    } else {
        wrap(nodes)
    }
}
