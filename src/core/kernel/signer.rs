use crate::core::types::{value_to_wire, CanonicalParams};
use rand::distributions::Alphanumeric;
use rand::Rng;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Digest used for request signatures
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignAlgorithm {
    /// 128-bit MD5, the format existing backends verify
    #[default]
    Md5,
    Sha256,
}

impl FromStr for SignAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha256" | "sha-256" => Ok(Self::Sha256),
            other => Err(format!("Unknown sign algorithm: {}", other)),
        }
    }
}

impl fmt::Display for SignAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Md5 => write!(f, "md5"),
            Self::Sha256 => write!(f, "sha256"),
        }
    }
}

/// Upper-case hex digest, or an empty string for empty input
pub fn digest_hex(algorithm: SignAlgorithm, input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }
    match algorithm {
        SignAlgorithm::Md5 => format!("{:X}", md5::compute(input.as_bytes())),
        SignAlgorithm::Sha256 => hex::encode_upper(Sha256::digest(input.as_bytes())),
    }
}

/// Concatenation of every present value in key order, followed by the secret
pub fn canonical_payload(params: Option<&CanonicalParams>, secret: &str) -> String {
    let mut payload = String::new();
    if let Some(params) = params {
        for (_, value) in params.iter().filter(|(_, v)| !v.is_null()) {
            payload.push_str(&value_to_wire(value));
        }
    }
    payload.push_str(secret);
    payload
}

/// Sign a parameter set with the default digest
///
/// # Arguments
/// * `params` - Parameters to sign, `None` signs the secret alone
/// * `secret` - Shared secret appended after the values
pub fn sign(params: Option<&CanonicalParams>, secret: &str) -> String {
    sign_with(SignAlgorithm::default(), params, secret)
}

pub fn sign_with(
    algorithm: SignAlgorithm,
    params: Option<&CanonicalParams>,
    secret: &str,
) -> String {
    digest_hex(algorithm, &canonical_payload(params, secret))
}

/// Caller-supplied signing policy.
///
/// Receives the full parameter set of a request and may add, override or
/// remove entries. The sign interceptor writes the result back to the wire.
pub trait ParamSigner: Send + Sync {
    fn prepare_signed_params(&self, params: &mut CanonicalParams);
}

impl<F> ParamSigner for F
where
    F: Fn(&mut CanonicalParams) + Send + Sync,
{
    fn prepare_signed_params(&self, params: &mut CanonicalParams) {
        self(params);
    }
}

/// Signing policy that stamps a timestamp and nonce and writes the digest
pub struct CanonicalParamSigner {
    secret: Secret<String>,
    algorithm: SignAlgorithm,
    sign_param: String,
    with_timestamp: bool,
    with_nonce: bool,
}

impl CanonicalParamSigner {
    pub fn new(secret: Secret<String>) -> Self {
        Self {
            secret,
            algorithm: SignAlgorithm::default(),
            sign_param: "sign".to_string(),
            with_timestamp: true,
            with_nonce: true,
        }
    }

    pub fn with_algorithm(mut self, algorithm: SignAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_sign_param(mut self, name: impl Into<String>) -> Self {
        self.sign_param = name.into();
        self
    }

    /// Disable the `timestamp` and `nonce` stamps
    pub fn without_stamps(mut self) -> Self {
        self.with_timestamp = false;
        self.with_nonce = false;
        self
    }

    fn nonce() -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(16)
            .map(char::from)
            .collect()
    }
}

impl fmt::Debug for CanonicalParamSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CanonicalParamSigner")
            .field("algorithm", &self.algorithm)
            .field("sign_param", &self.sign_param)
            .finish_non_exhaustive()
    }
}

impl ParamSigner for CanonicalParamSigner {
    fn prepare_signed_params(&self, params: &mut CanonicalParams) {
        if self.with_timestamp {
            params.put_if_missing("timestamp", chrono::Utc::now().timestamp_millis().to_string());
        }
        if self.with_nonce {
            params.put_if_missing("nonce", Self::nonce());
        }
        params.remove(&self.sign_param);
        let signature = sign_with(self.algorithm, Some(params), self.secret.expose_secret());
        params.insert(self.sign_param.clone(), signature);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_md5_known_vector() {
        assert_eq!(
            digest_hex(SignAlgorithm::Md5, "abc"),
            "900150983CD24FB0D6963F7D28E17F72"
        );
        assert_eq!(digest_hex(SignAlgorithm::Md5, ""), "");
        assert_eq!(
            digest_hex(SignAlgorithm::Sha256, "abc"),
            "BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD"
        );
    }

    #[test]
    fn test_signature_independent_of_insertion_order() {
        let forward: CanonicalParams = vec![("a", json!("1")), ("b", json!("2")), ("c", json!(3))]
            .into_iter()
            .collect();
        let backward: CanonicalParams = vec![("c", json!(3)), ("b", json!("2")), ("a", json!("1"))]
            .into_iter()
            .collect();
        assert_eq!(sign(Some(&forward), "k"), sign(Some(&backward), "k"));
        assert_eq!(canonical_payload(Some(&forward), "k"), "123k");
    }

    #[test]
    fn test_signature_changes_with_values() {
        let base: CanonicalParams = vec![("a", "1")].into_iter().collect();
        let changed: CanonicalParams = vec![("a", "2")].into_iter().collect();
        assert_ne!(sign(Some(&base), "k"), sign(Some(&changed), "k"));
    }

    #[test]
    fn test_absent_params_hash_secret_alone() {
        assert_eq!(sign(None, "secret"), digest_hex(SignAlgorithm::Md5, "secret"));
        let nulls: CanonicalParams = vec![("a", Value::Null)].into_iter().collect();
        assert_eq!(sign(Some(&nulls), "secret"), sign(None, "secret"));
    }

    #[test]
    fn test_nested_values_use_sorted_json() {
        let params: CanonicalParams = vec![("obj", json!({"b": 1, "a": [true]}))]
            .into_iter()
            .collect();
        assert_eq!(
            canonical_payload(Some(&params), ""),
            r#"{"a":[true],"b":1}"#
        );
    }

    #[test]
    fn test_canonical_param_signer_stamps_and_signs() {
        let signer = CanonicalParamSigner::new(Secret::new("k".to_string()));
        let mut params: CanonicalParams = vec![("a", "1"), ("sign", "stale")].into_iter().collect();
        signer.prepare_signed_params(&mut params);

        assert!(params.contains_key("timestamp"));
        assert!(params.contains_key("nonce"));
        let signature = params.remove("sign").unwrap();
        assert_eq!(signature, Value::String(sign(Some(&params), "k")));
    }

    #[test]
    fn test_sign_algorithm_from_str() {
        assert_eq!("MD5".parse::<SignAlgorithm>(), Ok(SignAlgorithm::Md5));
        assert_eq!("sha256".parse::<SignAlgorithm>(), Ok(SignAlgorithm::Sha256));
        assert!("crc".parse::<SignAlgorithm>().is_err());
    }
}
