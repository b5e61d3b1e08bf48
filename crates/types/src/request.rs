//! Transaction requests and their digests.

use crate::{Argument, ClientId, Hash, SecurityTier};
use serde::{Deserialize, Serialize};

/// Domain separator mixed into every request digest.
const DIGEST_DOMAIN: &[u8] = b"hybrid-request-v1";

const TAG_TEXT: u8 = 0x01;
const TAG_NUMBER: u8 = 0x02;
const TAG_NONE: u8 = 0x03;

/// A request submitted by a client.
///
/// Fields are private so a request cannot change after its digest has been
/// taken. Use the `with_*` builders while constructing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRequest {
    operation: String,
    #[serde(default)]
    arguments: Vec<Argument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<f64>,
    #[serde(default)]
    security: SecurityTier,
    #[serde(default)]
    submitted_at_ms: u64,
    #[serde(default = "default_client")]
    client: ClientId,
}

fn default_client() -> ClientId {
    ClientId::new("anonymous")
}

impl TransactionRequest {
    /// Create a request for an operation with its arguments.
    pub fn new(operation: impl Into<String>, arguments: Vec<Argument>) -> Self {
        Self {
            operation: operation.into(),
            arguments,
            value: None,
            security: SecurityTier::Standard,
            submitted_at_ms: 0,
            client: default_client(),
        }
    }

    /// Attach a monetary value.
    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    /// Set the requested security tier.
    pub fn with_security(mut self, security: SecurityTier) -> Self {
        self.security = security;
        self
    }

    /// Set the submission timestamp.
    pub fn with_submitted_at(mut self, submitted_at_ms: u64) -> Self {
        self.submitted_at_ms = submitted_at_ms;
        self
    }

    /// Set the submitting client.
    pub fn with_client(mut self, client: impl Into<String>) -> Self {
        self.client = ClientId::new(client);
        self
    }

    /// Operation name.
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Ordered operation arguments.
    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    /// Monetary value, if one was attached.
    pub fn value(&self) -> Option<f64> {
        self.value
    }

    /// Requested security tier.
    pub fn security(&self) -> SecurityTier {
        self.security
    }

    /// Submission timestamp in milliseconds.
    pub fn submitted_at_ms(&self) -> u64 {
        self.submitted_at_ms
    }

    /// Submitting client.
    pub fn client(&self) -> &ClientId {
        &self.client
    }

    /// Largest numeric quantity carried by the request (value or arguments).
    pub fn max_numeric(&self) -> Option<f64> {
        self.value
            .filter(|v| v.is_finite())
            .into_iter()
            .chain(self.arguments.iter().filter_map(Argument::numeric_value))
            .reduce(f64::max)
    }

    /// Compute the request digest.
    ///
    /// Every field is written in order, each prefixed with a type tag and a
    /// length, and the result is hashed with Blake3. Arguments are encoded as
    /// their canonical text, so `5000` and `"5000"` digest the same but
    /// `"001"` and `"1"` do not.
    pub fn digest(&self) -> Hash {
        let mut enc = CanonicalEncoder::new();
        enc.put_text(&self.operation);
        enc.put_len(self.arguments.len());
        for arg in &self.arguments {
            enc.put_text(&arg.canonical_text());
        }
        match self.value {
            Some(v) => enc.put_number(if v == 0.0 { 0.0 } else { v }),
            None => enc.put_none(),
        }
        enc.put_raw(&[self.security.tag()]);
        enc.put_raw(&self.submitted_at_ms.to_be_bytes());
        enc.put_text(self.client.as_str());
        enc.finish()
    }
}

/// Length-prefixed, type-tagged byte encoder.
struct CanonicalEncoder {
    buf: Vec<u8>,
}

impl CanonicalEncoder {
    fn new() -> Self {
        let mut buf = Vec::with_capacity(128);
        buf.extend_from_slice(DIGEST_DOMAIN);
        Self { buf }
    }

    fn put_len(&mut self, len: usize) {
        self.buf.extend_from_slice(&(len as u64).to_be_bytes());
    }

    fn put_text(&mut self, s: &str) {
        self.buf.push(TAG_TEXT);
        self.put_len(s.len());
        self.buf.extend_from_slice(s.as_bytes());
    }

    fn put_number(&mut self, n: f64) {
        self.buf.push(TAG_NUMBER);
        self.buf.extend_from_slice(&n.to_bits().to_be_bytes());
    }

    fn put_none(&mut self) {
        self.buf.push(TAG_NONE);
    }

    fn put_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn finish(self) -> Hash {
        Hash::from_bytes(&self.buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn farmer() -> TransactionRequest {
        TransactionRequest::new(
            "registerFarmer",
            vec!["F1".into(), "Alice".into(), "Valley".into()],
        )
        .with_client("org1")
        .with_submitted_at(1_000)
    }

    #[test]
    fn test_equal_requests_equal_digests() {
        assert_eq!(farmer().digest(), farmer().digest());
    }

    #[test]
    fn test_any_argument_change_changes_digest() {
        let base = farmer().digest();
        let changed = TransactionRequest::new(
            "registerFarmer",
            vec!["F1".into(), "Alicia".into(), "Valley".into()],
        )
        .with_client("org1")
        .with_submitted_at(1_000);
        assert_ne!(base, changed.digest());

        let reordered = TransactionRequest::new(
            "registerFarmer",
            vec!["Alice".into(), "F1".into(), "Valley".into()],
        )
        .with_client("org1")
        .with_submitted_at(1_000);
        assert_ne!(base, reordered.digest());
    }

    #[test]
    fn test_length_prefix_prevents_concatenation_collisions() {
        let a = TransactionRequest::new("op", vec!["ab".into(), "c".into()]);
        let b = TransactionRequest::new("op", vec!["a".into(), "bc".into()]);
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn test_numeric_text_digests_as_number() {
        let text = TransactionRequest::new("placeBid", vec!["B1".into(), "5000".into()]);
        let number =
            TransactionRequest::new("placeBid", vec!["B1".into(), Argument::number(5000.0)]);
        assert_eq!(text.digest(), number.digest());
    }

    #[test]
    fn test_numeric_spellings_digest_apart() {
        let bid = |amount: Argument| TransactionRequest::new("placeBid", vec!["B1".into(), amount]);

        let spellings = ["001", "1", "1e0", "1.0"].map(|s| bid(Argument::text(s)).digest());
        for (i, a) in spellings.iter().enumerate() {
            for b in &spellings[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_ne!(
            bid(Argument::text("1000")).digest(),
            bid(Argument::text("1000.0")).digest()
        );
        assert_eq!(
            bid(Argument::number(1.0)).digest(),
            bid(Argument::text("1")).digest()
        );
        assert_eq!(
            bid(Argument::number(-0.0)).digest(),
            bid(Argument::number(0.0)).digest()
        );
    }

    #[test]
    fn test_value_and_client_are_digested() {
        let base = TransactionRequest::new("op", vec![]);
        assert_ne!(base.digest(), base.clone().with_value(1.0).digest());
        assert_ne!(base.digest(), base.clone().with_client("other").digest());
        assert_ne!(
            base.digest(),
            base.clone().with_security(SecurityTier::High).digest()
        );
    }

    #[test]
    fn test_max_numeric() {
        let req = TransactionRequest::new(
            "op",
            vec!["x".into(), "250".into(), Argument::number(40.0)],
        )
        .with_value(100.0);
        assert_eq!(req.max_numeric(), Some(250.0));
        assert_eq!(TransactionRequest::new("op", vec!["x".into()]).max_numeric(), None);
    }

    #[test]
    fn test_json_defaults() {
        let req: TransactionRequest =
            serde_json::from_str(r#"{"operation":"createTeaBatch","arguments":["B1",12]}"#)
                .unwrap();
        assert_eq!(req.operation(), "createTeaBatch");
        assert_eq!(req.arguments().len(), 2);
        assert_eq!(req.client().as_str(), "anonymous");
        assert_eq!(req.security(), SecurityTier::Standard);
        assert_eq!(req.value(), None);
    }
}
