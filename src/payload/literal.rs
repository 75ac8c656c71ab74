//! Permissive decoder for literal-encoded payloads.
//!
//! Some upstream relays hand over rows dumped as language literals rather than
//! JSON: single-quoted strings, `True`/`False`/`None`, parenthesized tuples and
//! trailing commas. This decoder accepts that superset and produces an
//! ordinary `serde_json::Value`.

use serde_json::{Map, Number, Value};

/// Deepest container nesting accepted, the same limit `serde_json` applies.
const MAX_DEPTH: usize = 128;

/// Decode `input` as a literal expression, or `None` if it is not one.
pub fn decode(input: &str) -> Option<Value> {
    let mut parser = Parser {
        chars: input.chars().collect(),
        pos: 0,
        depth: 0,
    };
    let value = parser.value()?;
    parser.skip_ws();
    (parser.pos == parser.chars.len()).then_some(value)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn value(&mut self) -> Option<Value> {
        self.skip_ws();
        match self.peek()? {
            '{' => self.nested(Self::dict),
            '[' => self.nested(|p| p.sequence(']').map(Value::Array)),
            '(' => self.nested(|p| p.sequence(')').map(Value::Array)),
            quote @ ('\'' | '"') => {
                self.pos += 1;
                self.string(quote).map(Value::String)
            }
            c if c.is_ascii_digit() || matches!(c, '-' | '+' | '.') => self.number(),
            c if c.is_ascii_alphabetic() => self.keyword(),
            _ => None,
        }
    }

    /// Step past an opening bracket and parse its contents one level deeper.
    fn nested(&mut self, parse: impl FnOnce(&mut Self) -> Option<Value>) -> Option<Value> {
        if self.depth >= MAX_DEPTH {
            return None;
        }
        self.depth += 1;
        self.pos += 1;
        let value = parse(self);
        self.depth -= 1;
        value
    }

    fn sequence(&mut self, close: char) -> Option<Vec<Value>> {
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek()? == close {
                self.pos += 1;
                return Some(items);
            }
            items.push(self.value()?);
            self.skip_ws();
            match self.bump()? {
                ',' => {}
                c if c == close => return Some(items),
                _ => return None,
            }
        }
    }

    fn dict(&mut self) -> Option<Value> {
        let mut map = Map::new();
        loop {
            self.skip_ws();
            if self.peek()? == '}' {
                self.pos += 1;
                return Some(Value::Object(map));
            }
            let key = match self.value()? {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                _ => return None,
            };
            self.skip_ws();
            if self.bump()? != ':' {
                return None;
            }
            let value = self.value()?;
            map.insert(key, value);
            self.skip_ws();
            match self.bump()? {
                ',' => {}
                '}' => return Some(Value::Object(map)),
                _ => return None,
            }
        }
    }

    fn string(&mut self, quote: char) -> Option<String> {
        let mut out = String::new();
        loop {
            match self.bump()? {
                c if c == quote => return Some(out),
                '\\' => match self.bump()? {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    'u' => {
                        let hex: String = (0..4).filter_map(|_| self.bump()).collect();
                        let code = u32::from_str_radix(&hex, 16).ok()?;
                        out.push(char::from_u32(code)?);
                    }
                    other => out.push(other),
                },
                c => out.push(c),
            }
        }
    }

    fn number(&mut self) -> Option<Value> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'))
        {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        let text = text.strip_prefix('+').unwrap_or(&text);
        if let Ok(n) = text.parse::<i64>() {
            return Some(Value::Number(n.into()));
        }
        let f = text.parse::<f64>().ok()?;
        Number::from_f64(f).map(Value::Number)
    }

    fn keyword(&mut self) -> Option<Value> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        match word.as_str() {
            "True" | "true" => Some(Value::Bool(true)),
            "False" | "false" => Some(Value::Bool(false)),
            "None" | "null" => Some(Value::Null),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_single_quoted_dict() {
        let value = decode("{'success': True, 'code': 0, 'data': None}").unwrap();
        assert_eq!(value, json!({"success": true, "code": 0, "data": null}));
    }

    #[test]
    fn tuples_become_arrays() {
        let value = decode("[(1700000000, '1.5', 2, 1, 1.75, 10), ]").unwrap();
        assert_eq!(value, json!([[1700000000, "1.5", 2, 1, 1.75, 10]]));
    }

    #[test]
    fn plain_json_is_accepted() {
        let value = decode(r#"{"t": -3, "c": 1e3}"#).unwrap();
        assert_eq!(value, json!({"t": -3, "c": 1000.0}));
    }

    #[test]
    fn escapes_inside_strings() {
        let value = decode(r"'it\'s'").unwrap();
        assert_eq!(value, json!("it's"));
    }

    #[test]
    fn nesting_up_to_the_limit_is_accepted() {
        let text = format!("{}1{}", "[".repeat(MAX_DEPTH), "]".repeat(MAX_DEPTH));
        assert!(decode(&text).is_some());
    }

    #[test]
    fn runaway_nesting_is_rejected() {
        assert!(decode(&"[".repeat(100_000)).is_none());
        assert!(decode(&"(".repeat(100_000)).is_none());
        let deep = format!("{}1{}", "[".repeat(MAX_DEPTH + 1), "]".repeat(MAX_DEPTH + 1));
        assert!(decode(&deep).is_none());
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode("not a payload").is_none());
        assert!(decode("[1, 2").is_none());
        assert!(decode("{'a' 1}").is_none());
        assert!(decode("[1] trailing").is_none());
    }
}
