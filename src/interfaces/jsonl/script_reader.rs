use crate::error::Result;
use crate::interfaces::api::ApiRequest;
use std::io::{BufRead, BufReader, Read};

/// Reads API requests from a JSONL source, one JSON object per line.
///
/// Blank lines and `#` comment lines are skipped, so scripts can be
/// annotated. Requests are yielded lazily; a malformed line becomes an
/// error item without stopping the stream.
pub struct ScriptReader<R: Read> {
    reader: BufReader<R>,
}

impl<R: Read> ScriptReader<R> {
    /// Creates a new `ScriptReader` from any `Read` source (e.g. File,
    /// Stdin).
    pub fn new(source: R) -> Self {
        Self {
            reader: BufReader::new(source),
        }
    }

    /// Returns an iterator that lazily reads and deserializes requests.
    pub fn requests(self) -> impl Iterator<Item = Result<ApiRequest>> {
        self.reader
            .lines()
            .filter(|line| match line {
                Ok(text) => {
                    let text = text.trim();
                    !text.is_empty() && !text.starts_with('#')
                }
                Err(_) => true,
            })
            .map(|line| {
                let line = line?;
                Ok(serde_json::from_str(&line)?)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_skips_blanks_and_comments() {
        let data = "\n# purchase flow\n{\"op\":\"list_my_payments\",\"actor\":\"tok_1\"}\n\n";
        let reader = ScriptReader::new(data.as_bytes());
        let requests: Vec<Result<ApiRequest>> = reader.requests().collect();

        assert_eq!(requests.len(), 1);
        assert!(matches!(
            requests[0].as_ref().unwrap(),
            ApiRequest::ListMyPayments { .. }
        ));
    }

    #[test]
    fn test_reader_malformed_line_is_an_error_item() {
        let data = "{\"op\":\"list_my_payments\"\n{\"op\":\"list_my_payments\",\"actor\":\"tok_1\"}";
        let reader = ScriptReader::new(data.as_bytes());
        let requests: Vec<Result<ApiRequest>> = reader.requests().collect();

        assert_eq!(requests.len(), 2);
        assert!(requests[0].is_err());
        assert!(requests[1].is_ok());
    }
}
