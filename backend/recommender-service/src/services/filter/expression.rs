use crate::error::{RecommenderError, Result};
use std::fmt;

/// Boolean tag expression. `&&` binds tighter than `||`; both are
/// left-associative; parentheses group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagExpr {
    Literal(String),
    And(Box<TagExpr>, Box<TagExpr>),
    Or(Box<TagExpr>, Box<TagExpr>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    And,
    Or,
    Open,
    Close,
}

impl TagExpr {
    pub fn parse(input: &str) -> Result<Self> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err(RecommenderError::Expression("empty tag expression".into()));
        }
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        if let Some(token) = parser.peek() {
            return Err(RecommenderError::Expression(format!(
                "unexpected {:?} at token {}",
                token, parser.pos
            )));
        }
        Ok(expr)
    }

    /// Literals match any tag that contains them as a substring.
    pub fn matches(&self, tags: &[String]) -> bool {
        match self {
            TagExpr::Literal(tag) => tags.iter().any(|t| t.contains(tag.as_str())),
            TagExpr::And(lhs, rhs) => lhs.matches(tags) && rhs.matches(tags),
            TagExpr::Or(lhs, rhs) => lhs.matches(tags) || rhs.matches(tags),
        }
    }

    /// Tag literals in left-to-right order.
    pub fn literals(&self) -> Vec<&str> {
        match self {
            TagExpr::Literal(tag) => vec![tag.as_str()],
            TagExpr::And(lhs, rhs) | TagExpr::Or(lhs, rhs) => {
                let mut out = lhs.literals();
                out.extend(rhs.literals());
                out
            }
        }
    }
}

impl fmt::Display for TagExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagExpr::Literal(tag) => write!(f, "{}", tag),
            TagExpr::And(lhs, rhs) => write!(f, "({} && {})", lhs, rhs),
            TagExpr::Or(lhs, rhs) => write!(f, "({} || {})", lhs, rhs),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            '&' | '|' => {
                chars.next();
                if chars.next() != Some(c) {
                    return Err(RecommenderError::Expression(format!(
                        "expected '{0}{0}' operator",
                        c
                    )));
                }
                tokens.push(if c == '&' { Token::And } else { Token::Or });
            }
            c if is_tag_char(c) => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if !is_tag_char(c) {
                        break;
                    }
                    ident.push(c);
                    chars.next();
                }
                tokens.push(Token::Ident(ident));
            }
            other => {
                return Err(RecommenderError::Expression(format!(
                    "unexpected character '{}'",
                    other
                )))
            }
        }
    }
    Ok(tokens)
}

fn is_tag_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn parse_or(&mut self) -> Result<TagExpr> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let rhs = self.parse_and()?;
            lhs = TagExpr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<TagExpr> {
        let mut lhs = self.parse_atom()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let rhs = self.parse_atom()?;
            lhs = TagExpr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_atom(&mut self) -> Result<TagExpr> {
        match self.next() {
            Some(Token::Ident(tag)) => Ok(TagExpr::Literal(tag)),
            Some(Token::Open) => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token::Close) => Ok(inner),
                    _ => Err(RecommenderError::Expression("unbalanced parenthesis".into())),
                }
            }
            Some(token) => Err(RecommenderError::Expression(format!(
                "expected a tag, found {:?}",
                token
            ))),
            None => Err(RecommenderError::Expression("expression ends with an operator".into())),
        }
    }
}
