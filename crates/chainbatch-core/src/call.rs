//! Call identity: [`CallSpec`], [`CallSet`] and the canonical [`BatchKey`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Network (chain) identifier a call is executed against.
pub type Network = u64;

/// A single read against a remote service.
///
/// `caller` is carried along for transports that need a `from` field but is
/// not part of the call's identity: read-only calls from different callers
/// yield the same result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSpec {
    /// Target of the call (contract address, account, service name).
    pub destination: String,
    /// Operation name (function name or RPC method).
    pub operation: String,
    /// Positional arguments. Order is part of the call signature.
    #[serde(default)]
    pub arguments: Vec<Value>,
    /// Network the call runs on.
    pub network: Network,
    /// Optional identity of the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller: Option<String>,
}

impl CallSpec {
    pub fn new(
        destination: impl Into<String>,
        operation: impl Into<String>,
        arguments: Vec<Value>,
        network: Network,
    ) -> Self {
        Self {
            destination: destination.into(),
            operation: operation.into(),
            arguments,
            network,
            caller: None,
        }
    }

    /// Attach a caller identity.
    pub fn with_caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = Some(caller.into());
        self
    }

    /// A call is resolved once it has a destination to send it to.
    pub fn is_resolved(&self) -> bool {
        !self.destination.trim().is_empty()
    }

    /// Canonical identity of this call.
    pub fn key(&self) -> BatchKey {
        BatchKey::canonicalize(&self.destination, &self.operation, &self.arguments, self.network)
    }

    /// Returns `true` if both calls would produce the same upstream result.
    pub fn is_equivalent(&self, other: &CallSpec) -> bool {
        self.key() == other.key()
    }
}

impl std::fmt::Display for CallSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}(", self.destination, self.operation)?;
        for (i, arg) in self.arguments.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ")@{}", self.network)
    }
}

/// Canonical identity of a call, used for deduplication and result routing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BatchKey(String);

impl BatchKey {
    /// Build the key for `(destination, operation, arguments, network)`.
    ///
    /// Hex destinations (`0x…`) are compared case-insensitively, arguments are
    /// serialized with object keys sorted so that structurally equal arguments
    /// always produce the same key.
    pub fn canonicalize(
        destination: &str,
        operation: &str,
        arguments: &[Value],
        network: Network,
    ) -> Self {
        let destination = destination.trim();
        let destination = if destination.starts_with("0x") || destination.starts_with("0X") {
            destination.to_ascii_lowercase()
        } else {
            destination.to_string()
        };

        let mut key = format!("{network}:{destination}:{operation}:");
        key.push('[');
        for (i, arg) in arguments.iter().enumerate() {
            if i > 0 {
                key.push(',');
            }
            write_canonical(arg, &mut key);
        }
        key.push(']');
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BatchKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (k, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(k.clone()).to_string());
                out.push(':');
                write_canonical(v, out);
            }
            out.push('}');
        }
        leaf => out.push_str(&leaf.to_string()),
    }
}

/// Whether a request carries one call or an ordered list of calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Single,
    Multiple,
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single => write!(f, "single"),
            Self::Multiple => write!(f, "multiple"),
        }
    }
}

/// The calls carried by one request.
#[derive(Debug, Clone, PartialEq)]
pub enum CallSet {
    Single(CallSpec),
    Multiple(Vec<CallSpec>),
}

impl CallSet {
    pub fn kind(&self) -> RequestKind {
        match self {
            Self::Single(_) => RequestKind::Single,
            Self::Multiple(_) => RequestKind::Multiple,
        }
    }

    /// The calls in submission order.
    pub fn calls(&self) -> &[CallSpec] {
        match self {
            Self::Single(call) => std::slice::from_ref(call),
            Self::Multiple(calls) => calls,
        }
    }

    pub fn len(&self) -> usize {
        self.calls().len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(dest: &str, op: &str, args: Vec<Value>) -> CallSpec {
        CallSpec::new(dest, op, args, 1)
    }

    #[test]
    fn caller_is_not_part_of_identity() {
        let a = call("0xabc", "balanceOf", vec![json!("0x1")]).with_caller("0xaaa");
        let b = call("0xabc", "balanceOf", vec![json!("0x1")]).with_caller("0xbbb");
        assert_eq!(a.key(), b.key());
        assert!(a.is_equivalent(&b));
    }

    #[test]
    fn argument_order_matters() {
        let a = call("0xabc", "allowance", vec![json!("0x1"), json!("0x2")]);
        let b = call("0xabc", "allowance", vec![json!("0x2"), json!("0x1")]);
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn network_is_part_of_identity() {
        let a = CallSpec::new("0xabc", "getRate", vec![], 1);
        let b = CallSpec::new("0xabc", "getRate", vec![], 146);
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn object_key_order_is_ignored() {
        let a = call("svc", "quote", vec![json!({"a": 1, "b": [1, {"y": 2, "x": 1}]})]);
        let b = call("svc", "quote", vec![json!({"b": [1, {"x": 1, "y": 2}], "a": 1})]);
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn hex_destination_is_case_insensitive() {
        let a = call("0xAbCd", "getRate", vec![]);
        let b = call("0xabcd", "getRate", vec![]);
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn key_format() {
        let k = call("0xAB", "f", vec![json!(1), json!("x")]).key();
        assert_eq!(k.as_str(), r#"1:0xab:f:[1,"x"]"#);
    }

    #[test]
    fn unresolved_destination() {
        assert!(!call("", "f", vec![]).is_resolved());
        assert!(!call("  ", "f", vec![]).is_resolved());
        assert!(call("0x1", "f", vec![]).is_resolved());
    }

    #[test]
    fn call_set_shape() {
        let single = CallSet::Single(call("0x1", "f", vec![]));
        assert_eq!(single.kind(), RequestKind::Single);
        assert_eq!(single.len(), 1);

        let multi = CallSet::Multiple(vec![]);
        assert_eq!(multi.kind(), RequestKind::Multiple);
        assert!(multi.is_empty());
    }

    #[test]
    fn display() {
        let c = call("0x1", "balanceOf", vec![json!("0x2")]);
        assert_eq!(c.to_string(), "0x1.balanceOf(\"0x2\")@1");
    }
}
