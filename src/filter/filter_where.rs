//! Where-expression compiler.
//!
//! Clients send a small SQL-like boolean expression (`amount > ? AND
//! narration ILIKE ?`). It is tokenized, parsed against the resource's column
//! whitelist and re-emitted as SQL with every value bound as a numbered
//! parameter cast to the column's type. Nothing the client typed is copied
//! into the query except whitelisted column names and fixed operators.

use serde_json::{Number, Value};

use super::error::FilterError;
use super::types::{lookup_column, Column};

const MAX_NESTED_DEPTH: usize = 16;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Placeholder,
    Str(String),
    Number(Number),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
}

impl Token {
    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Ident(s) if s.eq_ignore_ascii_case(keyword))
    }

    fn literal(&self) -> Option<Value> {
        match self {
            Token::Str(s) => Some(Value::String(s.clone())),
            Token::Number(n) => Some(Value::Number(n.clone())),
            _ => None,
        }
    }

    fn render(&self) -> String {
        match self {
            Token::Ident(s) => s.clone(),
            Token::Placeholder => "?".to_string(),
            Token::Str(s) => format!("'{}'", s.replace('\'', "''")),
            Token::Number(n) => n.to_string(),
            Token::Op(op) => op.to_string(),
            Token::LParen => "(".to_string(),
            Token::RParen => ")".to_string(),
            Token::Comma => ",".to_string(),
        }
    }
}

const KEYWORDS: &[&str] = &["and", "or", "not", "is", "null", "in", "like", "ilike", "between", "true", "false"];

fn is_reserved(word: &str) -> bool {
    KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(word))
}

fn tokenize(input: &str) -> Result<Vec<Token>, FilterError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '?' => {
                tokens.push(Token::Placeholder);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '\'' => {
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(FilterError::InvalidWhereClause("unterminated string literal".to_string())),
                        Some('\'') if chars.get(i + 1) == Some(&'\'') => {
                            value.push('\'');
                            i += 2;
                        }
                        Some('\'') => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            value.push(*ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(value));
            }
            '=' => {
                tokens.push(Token::Op("="));
                i += 1;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op("!="));
                i += 2;
            }
            '<' => match chars.get(i + 1) {
                Some('=') => {
                    tokens.push(Token::Op("<="));
                    i += 2;
                }
                Some('>') => {
                    tokens.push(Token::Op("<>"));
                    i += 2;
                }
                _ => {
                    tokens.push(Token::Op("<"));
                    i += 1;
                }
            },
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Op(">="));
                    i += 2;
                } else {
                    tokens.push(Token::Op(">"));
                    i += 1;
                }
            }
            c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                i += 1;
                let mut seen_dot = false;
                while let Some(ch) = chars.get(i) {
                    if ch.is_ascii_digit() {
                        i += 1;
                    } else if *ch == '.' && !seen_dot {
                        seen_dot = true;
                        i += 1;
                    } else {
                        break;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                tokens.push(Token::Number(parse_number(&text)?));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while chars.get(i).is_some_and(|ch| ch.is_ascii_alphanumeric() || *ch == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(FilterError::InvalidWhereClause(format!("unexpected character '{}'", other)));
            }
        }
    }

    Ok(tokens)
}

fn parse_number(text: &str) -> Result<Number, FilterError> {
    let invalid = || FilterError::InvalidWhereClause(format!("invalid number '{}'", text));
    if text.contains('.') {
        let f: f64 = text.parse().map_err(|_| invalid())?;
        Number::from_f64(f).ok_or_else(invalid)
    } else {
        let n: i64 = text.parse().map_err(|_| invalid())?;
        Ok(Number::from(n))
    }
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    columns: &'a [Column],
    args: std::slice::Iter<'a, Value>,
    params: Vec<Value>,
    start_index: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek().is_some_and(|t| t.is_keyword(keyword)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), FilterError> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected {}", keyword.to_uppercase())))
        }
    }

    fn expect(&mut self, token: Token) -> Result<(), FilterError> {
        if self.peek() == Some(&token) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected '{}'", token.render())))
        }
    }

    fn unexpected(&self, context: &str) -> FilterError {
        match self.peek() {
            Some(token) => FilterError::InvalidWhereClause(format!("{} near '{}'", context, token.render())),
            None => FilterError::InvalidWhereClause(format!("{} at end of expression", context)),
        }
    }

    fn expr(&mut self) -> Result<String, FilterError> {
        let mut sql = self.and_expr()?;
        while self.eat_keyword("or") {
            sql = format!("{} OR {}", sql, self.and_expr()?);
        }
        Ok(sql)
    }

    fn and_expr(&mut self) -> Result<String, FilterError> {
        let mut sql = self.unary()?;
        while self.eat_keyword("and") {
            sql = format!("{} AND {}", sql, self.unary()?);
        }
        Ok(sql)
    }

    fn unary(&mut self) -> Result<String, FilterError> {
        if self.eat_keyword("not") {
            return Ok(format!("NOT {}", self.unary()?));
        }
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            self.depth += 1;
            if self.depth > MAX_NESTED_DEPTH {
                return Err(FilterError::InvalidWhereClause("expression nested too deeply".to_string()));
            }
            let inner = self.expr()?;
            self.expect(Token::RParen)?;
            self.depth -= 1;
            return Ok(format!("({})", inner));
        }
        self.predicate()
    }

    fn predicate(&mut self) -> Result<String, FilterError> {
        let column = match self.next() {
            Some(Token::Ident(name)) if !is_reserved(&name) => *lookup_column(self.columns, &name)
                .ok_or_else(|| FilterError::InvalidColumn(format!("unknown column '{}'", name)))?,
            _ => {
                self.pos -= 1;
                return Err(self.unexpected("expected a column name"));
            }
        };
        let target = format!("\"{}\"", column.name);

        if let Some(Token::Op(op)) = self.peek().cloned() {
            self.pos += 1;
            let value = self.operand(&column)?;
            return Ok(format!("{} {} {}", target, op, value));
        }

        if self.eat_keyword("is") {
            let negated = self.eat_keyword("not");
            self.expect_keyword("null")?;
            return Ok(format!("{} IS {}NULL", target, if negated { "NOT " } else { "" }));
        }

        let negated = if self.eat_keyword("not") { "NOT " } else { "" };

        if self.eat_keyword("in") {
            self.expect(Token::LParen)?;
            let mut values = vec![self.operand(&column)?];
            while self.peek() == Some(&Token::Comma) {
                self.pos += 1;
                values.push(self.operand(&column)?);
            }
            self.expect(Token::RParen)?;
            return Ok(format!("{} {}IN ({})", target, negated, values.join(", ")));
        }

        // patterns are text whatever the column holds
        for keyword in ["like", "ilike"] {
            if self.eat_keyword(keyword) {
                let value = self.bind_operand("text")?;
                return Ok(format!("{}::text {}{} {}", target, negated, keyword.to_uppercase(), value));
            }
        }

        if self.eat_keyword("between") {
            let low = self.operand(&column)?;
            self.expect_keyword("and")?;
            let high = self.operand(&column)?;
            return Ok(format!("{} {}BETWEEN {} AND {}", target, negated, low, high));
        }

        Err(self.unexpected("expected an operator"))
    }

    fn operand(&mut self, column: &Column) -> Result<String, FilterError> {
        self.bind_operand(column.kind.cast())
    }

    fn bind_operand(&mut self, cast: &str) -> Result<String, FilterError> {
        let value = match self.next() {
            Some(Token::Placeholder) => self
                .args
                .next()
                .cloned()
                .ok_or_else(|| FilterError::ArgumentMismatch("more placeholders than arguments".to_string()))?,
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("true") => Value::Bool(true),
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("false") => Value::Bool(false),
            Some(token) if token.literal().is_some() => token.literal().unwrap_or(Value::Null),
            _ => {
                self.pos -= 1;
                return Err(self.unexpected("expected a value"));
            }
        };

        self.params.push(value);
        Ok(format!("${}::{}", self.start_index + self.params.len(), cast))
    }
}

pub struct FilterWhere;

impl FilterWhere {
    /// Compile `expression` against `columns`, numbering placeholders from
    /// `start_index + 1`. Returns the SQL fragment and its parameters in order.
    pub fn compile(
        expression: &str,
        args: &[Value],
        columns: &[Column],
        start_index: usize,
    ) -> Result<(String, Vec<Value>), FilterError> {
        let tokens = tokenize(expression)?;
        if tokens.is_empty() {
            return Err(FilterError::InvalidWhereClause("empty expression".to_string()));
        }

        let mut parser = Parser {
            tokens,
            pos: 0,
            columns,
            args: args.iter(),
            params: Vec::new(),
            start_index,
            depth: 0,
        };

        let sql = parser.expr()?;
        if parser.peek().is_some() {
            return Err(parser.unexpected("unexpected token"));
        }
        if parser.args.next().is_some() {
            return Err(FilterError::ArgumentMismatch("more arguments than placeholders".to_string()));
        }

        Ok((sql, parser.params))
    }

    /// Lift inline literals out of a raw expression, replacing each with `?`.
    pub fn extract_args(expression: &str) -> Result<(String, Vec<Value>), FilterError> {
        let tokens = tokenize(expression)?;
        let mut args = Vec::new();
        let mut parts = Vec::with_capacity(tokens.len());

        for token in tokens {
            match token.literal() {
                Some(value) => {
                    args.push(value);
                    parts.push("?".to_string());
                }
                None => parts.push(token.render()),
            }
        }

        Ok((parts.join(" "), args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const COLUMNS: &[Column] = &[
        Column::uuid("id"),
        Column::float("amount"),
        Column::text("narration"),
        Column::timestamp("created_at"),
    ];

    #[test]
    fn compiles_comparison_with_inline_literal() {
        let (sql, params) = FilterWhere::compile("amount > 1000", &[], COLUMNS, 0).unwrap();
        assert_eq!(sql, "\"amount\" > $1::float8");
        assert_eq!(params, vec![json!(1000)]);
    }

    #[test]
    fn placeholders_and_literals_share_numbering() {
        let (sql, params) =
            FilterWhere::compile("amount >= ? AND (narration ILIKE 'cash%' OR id = ?)", &[json!(5), json!("abc")], COLUMNS, 2)
                .unwrap();
        assert_eq!(sql, "\"amount\" >= $3::float8 AND (\"narration\"::text ILIKE $4::text OR \"id\" = $5::uuid)");
        assert_eq!(params, vec![json!(5), json!("cash%"), json!("abc")]);
    }

    #[test]
    fn supports_null_in_and_between() {
        let (sql, params) = FilterWhere::compile(
            "narration IS NOT NULL and amount not in (1, 2.5) and created_at between ? and ?",
            &[json!("2024-01-01"), json!("2024-02-01")],
            COLUMNS,
            0,
        )
        .unwrap();
        assert_eq!(
            sql,
            "\"narration\" IS NOT NULL AND \"amount\" NOT IN ($1::float8, $2::float8) AND \"created_at\" BETWEEN $3::timestamptz AND $4::timestamptz"
        );
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn like_on_non_text_columns_compares_as_text() {
        let (sql, params) = FilterWhere::compile("amount like '5%'", &[], COLUMNS, 0).unwrap();
        assert_eq!(sql, "\"amount\"::text LIKE $1::text");
        assert_eq!(params, vec![json!("5%")]);

        let (sql, _) = FilterWhere::compile("id not like 'a%' or created_at ilike ?", &[json!("2024%")], COLUMNS, 0).unwrap();
        assert_eq!(sql, "\"id\"::text NOT LIKE $1::text OR \"created_at\"::text ILIKE $2::text");
    }

    #[test]
    fn rejects_unknown_columns() {
        let err = FilterWhere::compile("password = 'x'", &[], COLUMNS, 0).unwrap_err();
        assert!(matches!(err, FilterError::InvalidColumn(_)));
    }

    #[test]
    fn rejects_injection_attempts() {
        for expression in [
            "amount > 1; DROP TABLE deposits",
            "amount > 1 -- comment",
            "narration = 'open",
            "amount > 1 OR 1 = 1",
            "(amount > 1",
            "amount > 1)",
            "amount amount",
        ] {
            assert!(FilterWhere::compile(expression, &[], COLUMNS, 0).is_err(), "accepted: {}", expression);
        }
    }

    #[test]
    fn placeholder_count_must_match() {
        assert!(matches!(
            FilterWhere::compile("amount > ?", &[], COLUMNS, 0),
            Err(FilterError::ArgumentMismatch(_))
        ));
        assert!(matches!(
            FilterWhere::compile("amount > ?", &[json!(1), json!(2)], COLUMNS, 0),
            Err(FilterError::ArgumentMismatch(_))
        ));
    }

    #[test]
    fn extract_args_lifts_literals() {
        let (expression, args) = FilterWhere::extract_args("amount > 1000 and narration = 'it''s'").unwrap();
        assert_eq!(expression, "amount > ? and narration = ?");
        assert_eq!(args, vec![json!(1000), json!("it's")]);
    }

    #[test]
    fn string_literals_are_never_spliced() {
        let (sql, params) = FilterWhere::compile("narration = 'x'' OR ''1''=''1'", &[], COLUMNS, 0).unwrap();
        assert_eq!(sql, "\"narration\" = $1::text");
        assert_eq!(params, vec![json!("x' OR '1'='1")]);
    }
}
