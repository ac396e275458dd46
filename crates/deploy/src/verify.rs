//! Source verification on Etherscan-compatible explorers.

use std::future::Future;

use alloy_core::primitives::{Address, Bytes};
use anyhow::Context;
use serde::Deserialize;

use crate::{
    artifacts::CompiledContract,
    config::{DeploySettings, VerifierEndpoint},
    error::DeployError,
    retry::{RetryExhausted, RetryPolicy, poll_until},
    rpc::create_client,
};

/// What to verify: a compiled contract living at `address`, deployed with
/// `constructor_args` (ABI-encoded, without the creation code).
#[derive(Debug, Clone)]
pub struct VerificationRequest {
    pub contract: CompiledContract,
    pub address: Address,
    pub constructor_args: Bytes,
}

/// Result of a verification attempt. Never fatal to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationOutcome {
    pub success: bool,
    pub message: String,
}

/// Source verification capability.
pub trait Verifier: Send + Sync {
    /// Submit `request` and wait for a verdict. Returns the explorer's success message.
    fn verify(
        &self,
        request: &VerificationRequest,
    ) -> impl Future<Output = anyhow::Result<String>> + Send;
}

/// Verify a contract, turning every failure into an unsuccessful outcome.
pub async fn verify_contract<V: Verifier>(
    verifier: &V,
    request: &VerificationRequest,
) -> VerificationOutcome {
    tracing::info!(
        contract = %request.contract.name,
        address = %request.address,
        "Verifying contract source"
    );

    match verifier.verify(request).await {
        Ok(message) => {
            tracing::info!(address = %request.address, %message, "Contract verified");
            VerificationOutcome {
                success: true,
                message,
            }
        }
        Err(e) => {
            let err = DeployError::Verification {
                address: request.address.to_string(),
                reason: format!("{e:#}"),
            };
            tracing::warn!(error = %err, kind = %err.kind(), "Verification failed, continuing");
            VerificationOutcome {
                success: false,
                message: err.to_string(),
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    result: serde_json::Value,
}

impl ApiResponse {
    fn result_text(&self) -> String {
        match &self.result {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => self.message.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Submission {
    Accepted { guid: String },
    AlreadyVerified(String),
    /// The explorer has not indexed the deployed code yet.
    NotIndexed,
    Rejected(String),
}

#[derive(Debug, PartialEq, Eq)]
enum Status {
    Verified(String),
    Pending,
    Failed(String),
}

fn classify_submission(response: &ApiResponse) -> Submission {
    let text = response.result_text();
    let lower = text.to_lowercase();

    if response.status == "1" {
        Submission::Accepted { guid: text }
    } else if lower.contains("already verified") {
        Submission::AlreadyVerified(text)
    } else if lower.contains("unable to locate contractcode") {
        Submission::NotIndexed
    } else {
        Submission::Rejected(text)
    }
}

fn classify_status(response: &ApiResponse) -> Status {
    let text = response.result_text();
    let lower = text.to_lowercase();

    if lower.contains("pending") || lower.contains("in queue") {
        Status::Pending
    } else if response.status == "1" || lower.contains("already verified") {
        Status::Verified(text)
    } else {
        Status::Failed(text)
    }
}

/// [`Verifier`] speaking the Etherscan `contract` module API.
///
/// Submits the standard-JSON compiler input from the contract's build info.
#[derive(Debug, Clone)]
pub struct EtherscanVerifier {
    client: reqwest::Client,
    endpoint: Option<VerifierEndpoint>,
    submit_retry: RetryPolicy,
    status_retry: RetryPolicy,
}

impl EtherscanVerifier {
    /// `endpoint` is `None` for networks without a verification API; every
    /// request then fails with an explanatory message.
    pub fn new(endpoint: Option<VerifierEndpoint>, settings: &DeploySettings) -> anyhow::Result<Self> {
        Ok(Self {
            client: create_client()?,
            endpoint,
            submit_retry: settings.verification_retry,
            status_retry: settings.verification_status,
        })
    }

    fn endpoint(&self) -> anyhow::Result<(&VerifierEndpoint, &str)> {
        let endpoint = self
            .endpoint
            .as_ref()
            .context("No verification API is configured for this network")?;
        let api_key = endpoint
            .api_key
            .as_deref()
            .context("No API key for the verification API; set the network's verify_api_key_secret")?;
        Ok((endpoint, api_key))
    }

    /// `verifysourcecode` request. The chain goes in the query string, the
    /// sources in the form body.
    fn submission_request(&self, form: &[(&str, String)]) -> anyhow::Result<reqwest::Request> {
        let (endpoint, _) = self.endpoint()?;
        self.client
            .post(endpoint.api_url.clone())
            .query(&[("chainid", endpoint.chain_id)])
            .form(form)
            .build()
            .context("Failed to build verification request")
    }

    fn status_request(&self, guid: &str) -> anyhow::Result<reqwest::Request> {
        let (endpoint, api_key) = self.endpoint()?;
        let chain_id = endpoint.chain_id.to_string();
        self.client
            .get(endpoint.api_url.clone())
            .query(&[
                ("chainid", chain_id.as_str()),
                ("apikey", api_key),
                ("module", "contract"),
                ("action", "checkverifystatus"),
                ("guid", guid),
            ])
            .build()
            .context("Failed to build verification status request")
    }

    async fn submit(&self, form: &[(&str, String)]) -> anyhow::Result<Submission> {
        let response: ApiResponse = self
            .client
            .execute(self.submission_request(form)?)
            .await
            .context("Failed to send verification request")?
            .json()
            .await
            .context("Failed to parse verification response")?;

        Ok(classify_submission(&response))
    }

    async fn check_status(&self, guid: &str) -> anyhow::Result<Status> {
        let response: ApiResponse = self
            .client
            .execute(self.status_request(guid)?)
            .await
            .context("Failed to send verification status request")?
            .json()
            .await
            .context("Failed to parse verification status response")?;

        Ok(classify_status(&response))
    }
}

/// Form fields of a `verifysourcecode` request.
fn submission_form(
    request: &VerificationRequest,
    api_key: &str,
    standard_json: String,
    compiler_version: &str,
) -> Vec<(&'static str, String)> {
    vec![
        ("apikey", api_key.to_string()),
        ("module", "contract".to_string()),
        ("action", "verifysourcecode".to_string()),
        ("contractaddress", request.address.to_string()),
        ("sourceCode", standard_json),
        ("codeformat", "solidity-standard-json-input".to_string()),
        ("contractname", request.contract.qualified_name()),
        ("compilerversion", format!("v{}", compiler_version)),
        // The field name is misspelled in the Etherscan API.
        ("constructorArguements", hex::encode(&request.constructor_args)),
    ]
}

impl Verifier for EtherscanVerifier {
    async fn verify(&self, request: &VerificationRequest) -> anyhow::Result<String> {
        let (_, api_key) = self.endpoint()?;

        let build_info = request
            .contract
            .build_info()
            .context("Failed to load the compiler input of the contract")?;
        let standard_json = serde_json::to_string(&build_info.input)
            .context("Failed to serialize the compiler input")?;
        let form = submission_form(request, api_key, standard_json, &build_info.solc_long_version);

        let submitted = poll_until(&self.submit_retry, |attempt| {
            let form = &form;
            async move {
                match self.submit(form).await? {
                    Submission::NotIndexed => {
                        tracing::info!(attempt, "Explorer has not indexed the contract yet, retrying");
                        Ok::<_, anyhow::Error>(None)
                    }
                    other => Ok(Some(other)),
                }
            }
        })
        .await;

        let guid = match submitted {
            Ok((Submission::Accepted { guid }, _)) => guid,
            Ok((Submission::AlreadyVerified(message), _)) => return Ok(message),
            Ok((Submission::Rejected(message), _)) => anyhow::bail!("{}", message),
            Ok((Submission::NotIndexed, attempts)) | Err(RetryExhausted { attempts, last_error: None }) => {
                anyhow::bail!("Explorer did not index the contract after {} attempts", attempts)
            }
            Err(RetryExhausted {
                attempts,
                last_error: Some(e),
            }) => return Err(e.context(format!("Verification submission failed after {} attempts", attempts))),
        };

        tracing::debug!(%guid, "Verification submitted, waiting for the verdict");

        let verdict = poll_until(&self.status_retry, |_| {
            let guid = &guid;
            async move {
                match self.check_status(guid).await? {
                    Status::Pending => Ok::<_, anyhow::Error>(None),
                    other => Ok(Some(other)),
                }
            }
        })
        .await;

        match verdict {
            Ok((Status::Verified(message), _)) => Ok(message),
            Ok((Status::Failed(message), _)) => anyhow::bail!("{}", message),
            Ok((Status::Pending, attempts)) | Err(RetryExhausted { attempts, .. }) => {
                anyhow::bail!("Verification still pending after {} status checks (guid {})", attempts, guid)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use alloy_core::json_abi::JsonAbi;

    use super::*;

    fn response(status: &str, result: &str) -> ApiResponse {
        ApiResponse {
            status: status.to_string(),
            message: if status == "1" { "OK" } else { "NOTOK" }.to_string(),
            result: serde_json::Value::String(result.to_string()),
        }
    }

    fn request() -> VerificationRequest {
        VerificationRequest {
            contract: CompiledContract {
                name: "Token".into(),
                source_name: "contracts/Token.sol".into(),
                abi: JsonAbi::new(),
                bytecode: Bytes::from_static(&[0x60, 0x80]),
                artifact_path: PathBuf::from("artifacts/contracts/Token.sol/Token.json"),
            },
            address: Address::repeat_byte(0x11),
            constructor_args: Bytes::from_static(&[0xab, 0xcd]),
        }
    }

    struct FailingVerifier;

    impl Verifier for FailingVerifier {
        async fn verify(&self, _request: &VerificationRequest) -> anyhow::Result<String> {
            anyhow::bail!("explorer unreachable")
        }
    }

    struct OkVerifier;

    impl Verifier for OkVerifier {
        async fn verify(&self, _request: &VerificationRequest) -> anyhow::Result<String> {
            Ok("Pass - Verified".to_string())
        }
    }

    #[test]
    fn test_classify_submission() {
        assert_eq!(
            classify_submission(&response("1", "ezq878u486pzijkvvmerl6a9mzwhv6sefgvqi5tkwceejc7tvn")),
            Submission::Accepted {
                guid: "ezq878u486pzijkvvmerl6a9mzwhv6sefgvqi5tkwceejc7tvn".into()
            }
        );
        assert_eq!(
            classify_submission(&response("0", "Contract source code already verified")),
            Submission::AlreadyVerified("Contract source code already verified".into())
        );
        assert_eq!(
            classify_submission(&response(
                "0",
                "Unable to locate ContractCode at 0x1111111111111111111111111111111111111111"
            )),
            Submission::NotIndexed
        );
        assert_eq!(
            classify_submission(&response("0", "Invalid API Key")),
            Submission::Rejected("Invalid API Key".into())
        );
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(&response("0", "Pending in queue")), Status::Pending);
        assert_eq!(
            classify_status(&response("1", "Pass - Verified")),
            Status::Verified("Pass - Verified".into())
        );
        assert_eq!(
            classify_status(&response("0", "Already Verified")),
            Status::Verified("Already Verified".into())
        );
        assert_eq!(
            classify_status(&response("0", "Fail - Unable to verify")),
            Status::Failed("Fail - Unable to verify".into())
        );
    }

    #[test]
    fn test_response_without_string_result() {
        let response: ApiResponse =
            serde_json::from_str(r#"{"status": "0", "message": "Max rate limit reached", "result": null}"#)
                .unwrap();
        assert_eq!(
            classify_submission(&response),
            Submission::Rejected("Max rate limit reached".into())
        );
    }

    #[test]
    fn test_submission_form() {
        let form = submission_form(&request(), "KEY", "{}".into(), "0.8.21+commit.d9974bed");
        let get = |name: &str| form.iter().find(|(k, _)| *k == name).map(|(_, v)| v.as_str());

        assert_eq!(get("action"), Some("verifysourcecode"));
        assert_eq!(get("contractname"), Some("contracts/Token.sol:Token"));
        assert_eq!(get("compilerversion"), Some("v0.8.21+commit.d9974bed"));
        assert_eq!(get("constructorArguements"), Some("abcd"));
        assert_eq!(
            get("contractaddress"),
            Some(Address::repeat_byte(0x11).to_string().as_str())
        );
    }

    #[tokio::test]
    async fn test_failure_becomes_outcome() {
        let outcome = verify_contract(&FailingVerifier, &request()).await;
        assert!(!outcome.success);
        assert!(outcome.message.contains("explorer unreachable"));
    }

    #[tokio::test]
    async fn test_success_outcome() {
        let outcome = verify_contract(&OkVerifier, &request()).await;
        assert_eq!(
            outcome,
            VerificationOutcome {
                success: true,
                message: "Pass - Verified".into()
            }
        );
    }

    fn sepolia_verifier() -> EtherscanVerifier {
        let endpoint = VerifierEndpoint {
            api_url: crate::ETHERSCAN_V2_API.parse().unwrap(),
            api_key: Some("KEY".into()),
            chain_id: 11155111,
        };
        EtherscanVerifier::new(Some(endpoint), &DeploySettings::default()).unwrap()
    }

    fn query(request: &reqwest::Request) -> Vec<(String, String)> {
        request
            .url()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn test_submission_request_carries_chain_id() {
        let verifier = sepolia_verifier();
        let form = submission_form(&request(), "KEY", "{}".into(), "0.8.21+commit.d9974bed");

        let http = verifier.submission_request(&form).unwrap();

        assert_eq!(http.method(), reqwest::Method::POST);
        assert_eq!(http.url().path(), "/v2/api");
        assert_eq!(query(&http), vec![("chainid".to_string(), "11155111".to_string())]);
        let body = std::str::from_utf8(http.body().unwrap().as_bytes().unwrap()).unwrap();
        assert!(body.contains("action=verifysourcecode"));
        assert!(body.contains("constructorArguements=abcd"));
    }

    #[test]
    fn test_status_request_carries_chain_id() {
        let http = sepolia_verifier().status_request("guid-1").unwrap();

        assert_eq!(http.method(), reqwest::Method::GET);
        let query = query(&http);
        assert_eq!(query[0], ("chainid".to_string(), "11155111".to_string()));
        assert!(query.contains(&("action".to_string(), "checkverifystatus".to_string())));
        assert!(query.contains(&("guid".to_string(), "guid-1".to_string())));
    }

    #[tokio::test]
    async fn test_missing_endpoint_is_reported() {
        let verifier = EtherscanVerifier::new(None, &DeploySettings::default()).unwrap();
        let outcome = verify_contract(&verifier, &request()).await;
        assert!(!outcome.success);
        assert!(outcome.message.contains("No verification API"));
    }
}
