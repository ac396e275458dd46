//! Constructor argument providers and their ABI encoding.
//!
//! Arguments are JSON values, one per constructor input, in declaration order:
//!
//! ```json
//! ["MockName", "MockSymbol", [false, false, true], "1000000000000000", 1000,
//!  "0x5f2B7077a7e5B4fdD97cBb56D9aD02a4f326896d"]
//! ```
//!
//! Scalars may be given as JSON strings or numbers; numbers larger than `u64`
//! must be strings. Tuples accept either a positional array or an object keyed by
//! component name.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    str::FromStr,
};

use alloy_core::{
    dyn_abi::{DynSolType, DynSolValue, Specifier},
    json_abi::{JsonAbi, Param},
    primitives::{Address, Bytes},
};
use anyhow::Context;
use serde_json::Value;

/// Source of the ordered constructor arguments of a contract.
pub trait ArgumentProvider {
    fn constructor_args(&self, contract: &str) -> anyhow::Result<Vec<Value>>;
}

/// Reads `<dir>/<Contract>-args.json`.
///
/// A missing file means the constructor takes no arguments.
#[derive(Debug, Clone)]
pub struct FileArgumentProvider {
    dir: PathBuf,
}

impl FileArgumentProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, contract: &str) -> PathBuf {
        // Qualified names map to the bare contract name.
        let name = contract.rsplit(':').next().unwrap_or(contract);
        self.dir.join(format!("{}-args.json", name))
    }
}

impl ArgumentProvider for FileArgumentProvider {
    fn constructor_args(&self, contract: &str) -> anyhow::Result<Vec<Value>> {
        let path = self.path_for(contract);
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No argument file, using no constructor arguments");
            return Ok(Vec::new());
        }
        read_args_file(&path)
    }
}

impl ArgumentProvider for BTreeMap<String, Vec<Value>> {
    fn constructor_args(&self, contract: &str) -> anyhow::Result<Vec<Value>> {
        Ok(self.get(contract).cloned().unwrap_or_default())
    }
}

/// Read a JSON array of constructor arguments.
pub fn read_args_file(path: &Path) -> anyhow::Result<Vec<Value>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    match value {
        Value::Array(args) => Ok(args),
        _ => anyhow::bail!(
            "Constructor arguments in {} must be a JSON array",
            path.display()
        ),
    }
}

/// ABI-encode constructor arguments against the constructor declared in `abi`.
///
/// The number of arguments must match the number of constructor inputs exactly.
pub fn encode_constructor_args(abi: &JsonAbi, args: &[Value]) -> anyhow::Result<Bytes> {
    let inputs = abi
        .constructor
        .as_ref()
        .map_or(&[][..], |c| c.inputs.as_slice());

    if inputs.len() != args.len() {
        anyhow::bail!(
            "Constructor expects {} argument(s) ({}), got {}",
            inputs.len(),
            inputs
                .iter()
                .map(|p| p.ty.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            args.len()
        );
    }

    if inputs.is_empty() {
        return Ok(Bytes::new());
    }

    let values = inputs
        .iter()
        .zip(args)
        .enumerate()
        .map(|(i, (param, arg))| {
            let ty = param
                .resolve()
                .with_context(|| format!("Unsupported constructor input type '{}'", param.ty))?;
            coerce(&ty, &param.components, arg).with_context(|| {
                format!("Invalid constructor argument #{} ({} {})", i, param.ty, param.name)
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(DynSolValue::Tuple(values).abi_encode_params().into())
}

/// Convert a JSON value into a value of Solidity type `ty`.
///
/// `components` carries the tuple component names, used for object-shaped tuples.
fn coerce(ty: &DynSolType, components: &[Param], value: &Value) -> anyhow::Result<DynSolValue> {
    match ty {
        DynSolType::Array(inner) => {
            let items = expect_array(value)?;
            let values = items
                .iter()
                .map(|v| coerce(inner, components, v))
                .collect::<anyhow::Result<_>>()?;
            Ok(DynSolValue::Array(values))
        }
        DynSolType::FixedArray(inner, len) => {
            let items = expect_array(value)?;
            if items.len() != *len {
                anyhow::bail!("expected {} elements, got {}", len, items.len());
            }
            let values = items
                .iter()
                .map(|v| coerce(inner, components, v))
                .collect::<anyhow::Result<_>>()?;
            Ok(DynSolValue::FixedArray(values))
        }
        DynSolType::Tuple(types) => coerce_tuple(types, components, value),
        DynSolType::Bool => match value {
            Value::Bool(b) => Ok(DynSolValue::Bool(*b)),
            _ => coerce_scalar(ty, value),
        },
        DynSolType::String => match value {
            Value::String(s) => Ok(DynSolValue::String(s.clone())),
            _ => anyhow::bail!("expected a string, got {}", value),
        },
        DynSolType::Address => {
            let raw = value
                .as_str()
                .with_context(|| format!("expected an address string, got {}", value))?;
            let address = Address::from_str(raw.trim())
                .with_context(|| format!("invalid address '{}'", raw))?;
            Ok(DynSolValue::Address(address))
        }
        _ => coerce_scalar(ty, value),
    }
}

fn coerce_tuple(
    types: &[DynSolType],
    components: &[Param],
    value: &Value,
) -> anyhow::Result<DynSolValue> {
    let nested = |i: usize| components.get(i).map_or(&[][..], |p| p.components.as_slice());

    let values = match value {
        Value::Array(items) => {
            if items.len() != types.len() {
                anyhow::bail!("expected a tuple of {} fields, got {}", types.len(), items.len());
            }
            types
                .iter()
                .zip(items)
                .enumerate()
                .map(|(i, (ty, v))| coerce(ty, nested(i), v))
                .collect::<anyhow::Result<Vec<_>>>()?
        }
        Value::Object(fields) => types
            .iter()
            .enumerate()
            .map(|(i, ty)| {
                let name = components
                    .get(i)
                    .map(|p| p.name.as_str())
                    .filter(|n| !n.is_empty())
                    .with_context(|| format!("tuple field #{} has no name, use an array", i))?;
                let v = fields
                    .get(name)
                    .with_context(|| format!("missing tuple field '{}'", name))?;
                coerce(ty, nested(i), v).with_context(|| format!("in tuple field '{}'", name))
            })
            .collect::<anyhow::Result<Vec<_>>>()?,
        _ => anyhow::bail!("expected a tuple (array or object), got {}", value),
    };

    Ok(DynSolValue::Tuple(values))
}

fn coerce_scalar(ty: &DynSolType, value: &Value) -> anyhow::Result<DynSolValue> {
    let raw = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => anyhow::bail!("expected a {} value, got {}", ty, value),
    };
    ty.coerce_str(&raw)
        .map_err(|e| anyhow::anyhow!("cannot parse '{}' as {}: {}", raw, ty, e))
}

fn expect_array(value: &Value) -> anyhow::Result<&Vec<Value>> {
    value
        .as_array()
        .with_context(|| format!("expected an array, got {}", value))
}

#[cfg(test)]
mod tests {
    use alloy_core::primitives::{U256, hex};
    use serde_json::json;
    use tempdir::TempDir;

    use super::*;

    fn abi(inputs: Value) -> JsonAbi {
        serde_json::from_value(json!([{
            "type": "constructor",
            "stateMutability": "nonpayable",
            "inputs": inputs
        }]))
        .unwrap()
    }

    fn word(n: u64) -> String {
        format!("{:064x}", n)
    }

    #[test]
    fn test_encode_static_args() {
        let abi = abi(json!([
            {"name": "token", "type": "address"},
            {"name": "startTime", "type": "uint256"}
        ]));
        let encoded = encode_constructor_args(
            &abi,
            &[json!("0xFfFFfFfF8A9736B44EbF188972725bED67BF694E"), json!(1716890400)],
        )
        .unwrap();

        assert_eq!(
            hex::encode(&encoded),
            format!(
                "000000000000000000000000ffffffff8a9736b44ebf188972725bed67bf694e{}",
                word(1716890400)
            )
        );
    }

    #[test]
    fn test_arity_mismatch() {
        let abi = abi(json!([
            {"name": "token", "type": "address"},
            {"name": "startTime", "type": "uint256"}
        ]));
        let err = encode_constructor_args(&abi, &[json!("0x0000000000000000000000000000000000000001")])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Constructor expects 2 argument(s) (address, uint256), got 1"
        );
    }

    #[test]
    fn test_no_constructor_no_args() {
        let abi = JsonAbi::new();
        assert!(encode_constructor_args(&abi, &[]).unwrap().is_empty());
        assert!(encode_constructor_args(&abi, &[json!(1)]).is_err());
    }

    #[test]
    fn test_numbers_as_strings_and_hex() {
        let abi = abi(json!([
            {"name": "price", "type": "uint256"},
            {"name": "supply", "type": "uint256"}
        ]));
        let encoded =
            encode_constructor_args(&abi, &[json!("1000000000000000"), json!("0x3e8")]).unwrap();
        assert_eq!(hex::encode(&encoded), format!("{}{}", word(1_000_000_000_000_000), word(1000)));
    }

    #[test]
    fn test_ether_units() {
        let abi = abi(json!([{"name": "price", "type": "uint256"}]));
        let encoded = encode_constructor_args(&abi, &[json!("0.01 ether")]).unwrap();
        assert_eq!(hex::encode(&encoded), word(10_000_000_000_000_000));
    }

    #[test]
    fn test_bool_array_and_strings() {
        let abi = abi(json!([
            {"name": "name", "type": "string"},
            {"name": "ext", "type": "string"},
            {"name": "settings", "type": "bool[]"}
        ]));
        let encoded = encode_constructor_args(&abi, &[json!("AB"), json!(""), json!([true, false])]).unwrap();

        let expected = DynSolValue::Tuple(vec![
            DynSolValue::String("AB".into()),
            DynSolValue::String(String::new()),
            DynSolValue::Array(vec![DynSolValue::Bool(true), DynSolValue::Bool(false)]),
        ])
        .abi_encode_params();
        assert_eq!(encoded.to_vec(), expected);
    }

    #[test]
    fn test_tuple_from_object_and_array() {
        let inputs = json!([{
            "name": "config",
            "type": "tuple",
            "components": [
                {"name": "royaltyRecipient", "type": "address"},
                {"name": "royaltyPercentageBps", "type": "uint256"},
                {"name": "tokenUriIsEnumerable", "type": "bool"}
            ]
        }]);
        let abi = abi(inputs);

        let from_object = encode_constructor_args(
            &abi,
            &[json!({
                "tokenUriIsEnumerable": true,
                "royaltyRecipient": "0x1f21f7a70997e3ec5fbd61c047a26cdc88e7089b",
                "royaltyPercentageBps": 500
            })],
        )
        .unwrap();
        let from_array = encode_constructor_args(
            &abi,
            &[json!(["0x1f21f7a70997e3ec5fbd61c047a26cdc88e7089b", "500", true])],
        )
        .unwrap();

        assert_eq!(from_object, from_array);
        assert_eq!(
            hex::encode(&from_object),
            format!(
                "0000000000000000000000001f21f7a70997e3ec5fbd61c047a26cdc88e7089b{}{}",
                word(500),
                word(1)
            )
        );
    }

    #[test]
    fn test_tuple_missing_field() {
        let abi = abi(json!([{
            "name": "config",
            "type": "tuple",
            "components": [
                {"name": "maxSupply", "type": "uint256"},
                {"name": "pricePerMint", "type": "uint256"}
            ]
        }]));
        let err = encode_constructor_args(&abi, &[json!({"maxSupply": 100})]).unwrap_err();
        assert!(format!("{err:#}").contains("missing tuple field 'pricePerMint'"));
    }

    #[test]
    fn test_fixed_array_length_checked() {
        let abi = abi(json!([{"name": "flags", "type": "bool[3]"}]));
        assert!(encode_constructor_args(&abi, &[json!([true, false])]).is_err());
        assert!(encode_constructor_args(&abi, &[json!([true, false, true])]).is_ok());
    }

    #[test]
    fn test_invalid_scalar_reports_argument() {
        let abi = abi(json!([{"name": "supply", "type": "uint256"}]));
        let err = encode_constructor_args(&abi, &[json!("lots")]).unwrap_err();
        assert!(err.to_string().contains("Invalid constructor argument #0 (uint256 supply)"));

        let err = encode_constructor_args(&abi, &[json!(null)]).unwrap_err();
        assert!(format!("{err:#}").contains("expected a uint256 value"));
    }

    #[test]
    fn test_file_provider() {
        let dir = TempDir::new("args").unwrap();
        std::fs::write(dir.path().join("Token-args.json"), r#"["Name", "1000"]"#).unwrap();
        std::fs::write(dir.path().join("Broken-args.json"), r#"{"a": 1}"#).unwrap();

        let provider = FileArgumentProvider::new(dir.path());
        assert_eq!(
            provider.constructor_args("Token").unwrap(),
            vec![json!("Name"), json!("1000")]
        );
        assert_eq!(
            provider.constructor_args("contracts/Token.sol:Token").unwrap(),
            vec![json!("Name"), json!("1000")]
        );
        assert!(provider.constructor_args("Missing").unwrap().is_empty());
        assert!(provider.constructor_args("Broken").is_err());
    }

    #[test]
    fn test_uint_value_is_exact() {
        let abi = abi(json!([{"name": "amount", "type": "uint256"}]));
        let encoded =
            encode_constructor_args(&abi, &[json!("115792089237316195423570985008687907853269984665640564039457584007913129639935")])
                .unwrap();
        assert_eq!(U256::from_be_slice(&encoded), U256::MAX);
    }
}
