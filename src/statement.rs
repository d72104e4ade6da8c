//! Lexical screening of query text before it reaches the engine.
//!
//! Only a single `SELECT`, `WITH` or `VALUES` statement is accepted. Session
//! control (`PRAGMA`, `ATTACH`, `BEGIN`, ...) is turned away here so it can
//! never change the connection's read-only mode or leave a transaction open.

use crate::error::QueryFault;

const READ_KEYWORDS: &[&str] = &["SELECT", "WITH", "VALUES"];

/// Check that `sql` is one read-only statement. Returns its leading keyword.
pub fn screen_query(sql: &str) -> Result<String, QueryFault> {
    let mut scanner = Scanner::new(sql);
    scanner.skip_trivia();
    let keyword = scanner.keyword().to_ascii_uppercase();
    if keyword.is_empty() {
        return Err(QueryFault::Empty);
    }
    if !READ_KEYWORDS.contains(&keyword.as_str()) {
        return Err(QueryFault::NotReadOnly { keyword });
    }
    if scanner.has_second_statement() {
        return Err(QueryFault::MultipleStatements);
    }
    Ok(keyword)
}

struct Scanner<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(sql: &'a str) -> Self {
        Self {
            bytes: sql.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    /// Skip whitespace, comments and opening parentheses.
    fn skip_trivia(&mut self) {
        loop {
            match self.peek(0) {
                Some(b) if b.is_ascii_whitespace() || b == b'(' => self.pos += 1,
                Some(b'-') if self.peek(1) == Some(b'-') => self.skip_line_comment(),
                Some(b'/') if self.peek(1) == Some(b'*') => self.skip_block_comment(),
                _ => return,
            }
        }
    }

    fn skip_line_comment(&mut self) {
        while let Some(b) = self.peek(0) {
            self.pos += 1;
            if b == b'\n' {
                return;
            }
        }
    }

    fn skip_block_comment(&mut self) {
        self.pos += 2;
        while self.pos < self.bytes.len() {
            if self.peek(0) == Some(b'*') && self.peek(1) == Some(b'/') {
                self.pos += 2;
                return;
            }
            self.pos += 1;
        }
    }

    fn skip_quoted(&mut self, close: u8) {
        self.pos += 1;
        while let Some(b) = self.peek(0) {
            self.pos += 1;
            if b == close {
                // '' and "" escape the quote inside a literal.
                if self.peek(0) == Some(close) && close != b']' {
                    self.pos += 1;
                    continue;
                }
                return;
            }
        }
    }

    fn keyword(&mut self) -> &'a str {
        let start = self.pos;
        while self
            .peek(0)
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_')
        {
            self.pos += 1;
        }
        std::str::from_utf8(&self.bytes[start..self.pos]).unwrap_or_default()
    }

    /// True when anything other than trivia follows a top-level `;`.
    fn has_second_statement(&mut self) -> bool {
        while let Some(b) = self.peek(0) {
            match b {
                b'\'' | b'"' | b'`' => self.skip_quoted(b),
                b'[' => self.skip_quoted(b']'),
                b'-' if self.peek(1) == Some(b'-') => self.skip_line_comment(),
                b'/' if self.peek(1) == Some(b'*') => self.skip_block_comment(),
                b';' => {
                    self.pos += 1;
                    loop {
                        self.skip_trivia();
                        match self.peek(0) {
                            Some(b';') => self.pos += 1,
                            Some(_) => return true,
                            None => return false,
                        }
                    }
                }
                _ => self.pos += 1,
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::screen_query;
    use crate::error::QueryFault;

    #[test]
    fn select_and_cte_queries_pass() {
        for sql in [
            "SELECT Id FROM litify_pm__Matter__c",
            "  select Id from litify_pm__Matter__c;  ",
            "-- attorneys\nSELECT bis_Attorney_Name__c FROM litify_pm__Matter__c",
            "/* grouped */ (SELECT 1)",
            "WITH pi AS (SELECT Id FROM litify_pm__Matter__c) SELECT * FROM pi",
            "VALUES (1)",
        ] {
            assert!(screen_query(sql).is_ok(), "{sql}");
        }
    }

    #[test]
    fn session_and_write_statements_are_rejected() {
        for (sql, expected) in [
            ("PRAGMA query_only = 0", "PRAGMA"),
            ("BEGIN", "BEGIN"),
            ("  commit", "COMMIT"),
            ("ATTACH DATABASE 'x.db' AS x", "ATTACH"),
            ("DELETE FROM litify_pm__Matter__c", "DELETE"),
            ("/* hidden */ DROP TABLE litify_pm__Matter__c", "DROP"),
        ] {
            let err = screen_query(sql).expect_err(sql);
            let QueryFault::NotReadOnly { keyword } = err else {
                panic!("expected NotReadOnly for {sql}");
            };
            assert_eq!(keyword, expected);
        }
    }

    #[test]
    fn trailing_statement_is_rejected() {
        let err = screen_query("SELECT 1; PRAGMA query_only = 0").expect_err("two statements");
        assert!(matches!(err, QueryFault::MultipleStatements));
    }

    #[test]
    fn semicolons_inside_literals_and_comments_are_ignored() {
        assert!(screen_query("SELECT Id FROM litify_pm__Matter__c WHERE Id = 'a;b'").is_ok());
        assert!(screen_query("SELECT 'it''s; fine' -- ; DROP\n").is_ok());
        assert!(screen_query("SELECT [x;y] FROM t /* ; BEGIN */").is_ok());
    }

    #[test]
    fn blank_text_is_empty() {
        assert!(matches!(screen_query("  -- nothing\n"), Err(QueryFault::Empty)));
    }
}
