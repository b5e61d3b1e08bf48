//! JSON-lines request batches.

use hybrid_types::TransactionRequest;
use std::io::BufRead;

/// A batch line that is not a valid request.
#[derive(Debug, thiserror::Error)]
pub enum RequestParseError {
    /// Reading the input failed.
    #[error("Failed to read requests: {0}")]
    Io(#[from] std::io::Error),

    /// A line is not a request object.
    #[error("Line {line}: {source}")]
    Malformed {
        /// One-based line number.
        line: usize,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

/// Read one request per line. Blank lines and lines starting with `#` are
/// skipped.
pub fn read_requests(reader: impl BufRead) -> Result<Vec<TransactionRequest>, RequestParseError> {
    let mut requests = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let request = serde_json::from_str(trimmed).map_err(|source| {
            RequestParseError::Malformed {
                line: index + 1,
                source,
            }
        })?;
        requests.push(request);
    }
    Ok(requests)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hybrid_types::Argument;

    #[test]
    fn test_reads_mixed_arguments() {
        let input = r#"
# farmers
{"operation":"registerFarmer","arguments":["F1","Alice","Valley"],"client":"org1"}

{"operation":"transferFunds","arguments":["acct-1",5000],"value":5000}
"#;
        let requests = read_requests(input.as_bytes()).unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].operation(), "registerFarmer");
        assert_eq!(requests[0].client().as_str(), "org1");
        assert_eq!(requests[1].arguments()[1], Argument::number(5000.0));
        assert_eq!(requests[1].value(), Some(5000.0));
        assert_eq!(requests[1].client().as_str(), "anonymous");
    }

    #[test]
    fn test_reports_line_of_bad_request() {
        let input = "{\"operation\":\"query\"}\n\n{\"arguments\":[]}\n";
        match read_requests(input.as_bytes()) {
            Err(RequestParseError::Malformed { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected malformed line, got {other:?}"),
        }
    }
}
