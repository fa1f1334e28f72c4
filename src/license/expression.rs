/// A leaf of an SPDX license expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Leaf {
    License(String),
    Exception(String),
}

impl Leaf {
    pub fn id(&self) -> &str {
        match self {
            Leaf::License(id) | Leaf::Exception(id) => id,
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
enum Token {
    Id(String),
    And,
    Or,
    With,
    LParen,
    RParen,
}

/// Tokenize an SPDX license expression. `/` is read as an `OR` shorthand.
fn tokenize(expr: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = expr.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        match c {
            '(' => {
                tokens.push(Token::LParen);
                chars.next();
            }
            ')' => {
                tokens.push(Token::RParen);
                chars.next();
            }
            '/' => {
                tokens.push(Token::Or);
                chars.next();
            }
            _ => {
                let mut s = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || matches!(c, '(' | ')' | '/') {
                        break;
                    }
                    s.push(c);
                    chars.next();
                }
                let token = match s.to_ascii_uppercase().as_str() {
                    "AND" => Token::And,
                    "OR" => Token::Or,
                    "WITH" => Token::With,
                    _ => Token::Id(s),
                };
                tokens.push(token);
            }
        }
    }
    tokens
}

/// License and exception identifiers of `expr`, de-duplicated, first-seen order.
///
/// The operators only shape the tree; every leaf needs its text on disk
/// regardless of which branch of an `OR` a consumer ends up choosing.
pub fn leaves(expr: &str) -> Vec<Leaf> {
    let mut result: Vec<Leaf> = Vec::new();
    let mut after_with = false;

    for token in tokenize(expr) {
        match token {
            Token::With => after_with = true,
            Token::Id(id) => {
                let leaf = if after_with {
                    Leaf::Exception(id)
                } else {
                    Leaf::License(id)
                };
                after_with = false;
                if !result.contains(&leaf) {
                    result.push(leaf);
                }
            }
            Token::And | Token::Or | Token::LParen | Token::RParen => after_with = false,
        }
    }

    result
}
