//! Built-in network registry.

use std::collections::BTreeMap;

use url::Url;

use crate::config::NetworkConfig;

/// Name of the network used when none is selected.
pub const DEFAULT_NETWORK: &str = "localhost";

/// Etherscan's multichain verification API. Requests select the chain with `chainid`
/// and authenticate with a single Etherscan key.
pub const ETHERSCAN_V2_API: &str = "https://api.etherscan.io/v2/api";

struct Builtin {
    name: &'static str,
    rpc_url: Rpc,
    chain_id: u64,
    gas_price_wei: u64,
    gas_limit: Option<u64>,
    signer: &'static str,
    explorer_url: Option<&'static str>,
    verify_api_url: Option<&'static str>,
    verify_api_key: Option<&'static str>,
}

enum Rpc {
    Url(&'static str),
    Secret(&'static str),
}

const BUILTINS: &[Builtin] = &[
    Builtin {
        name: "localhost",
        rpc_url: Rpc::Url("http://127.0.0.1:8545"),
        chain_id: 31337,
        gas_price_wei: 1_000_000_000,
        gas_limit: None,
        signer: "private_key_local",
        explorer_url: None,
        verify_api_url: None,
        verify_api_key: None,
    },
    Builtin {
        name: "polygonMumbai",
        rpc_url: Rpc::Secret("mumbai_rpc"),
        chain_id: 80001,
        gas_price_wei: 13_000_000_000,
        gas_limit: Some(2_000_000),
        signer: "private_key_testnet",
        explorer_url: Some("https://mumbai.polygonscan.com/"),
        verify_api_url: Some(ETHERSCAN_V2_API),
        verify_api_key: Some("etherscan_api_key"),
    },
    Builtin {
        name: "moonbeam",
        rpc_url: Rpc::Url("https://rpc.api.moonbeam.network"),
        chain_id: 1284,
        gas_price_wei: 150_000_000_000,
        gas_limit: Some(2_000_000),
        signer: "private_key_mainnet",
        explorer_url: Some("https://moonbeam.moonscan.io/"),
        verify_api_url: Some(ETHERSCAN_V2_API),
        verify_api_key: Some("etherscan_api_key"),
    },
    Builtin {
        name: "moonbeamTestnet",
        rpc_url: Rpc::Url("https://moonbeam-alpha.api.onfinality.io/public"),
        chain_id: 1287,
        gas_price_wei: 200_000_000_000,
        gas_limit: Some(2_000_000),
        signer: "private_key_testnet",
        explorer_url: Some("https://moonbase.moonscan.io/"),
        verify_api_url: Some(ETHERSCAN_V2_API),
        verify_api_key: Some("etherscan_api_key"),
    },
    Builtin {
        name: "shibuya",
        rpc_url: Rpc::Url("https://evm.shibuya.astar.network/"),
        chain_id: 81,
        gas_price_wei: 5_000_000_000,
        gas_limit: Some(2_000_000),
        signer: "private_key_testnet",
        explorer_url: Some("https://shibuya.subscan.io/"),
        verify_api_url: None,
        verify_api_key: None,
    },
    Builtin {
        name: "astar",
        rpc_url: Rpc::Url("https://evm.astar.network"),
        chain_id: 592,
        gas_price_wei: 5_000_000_000,
        gas_limit: Some(2_000_000),
        signer: "private_key_testnet",
        explorer_url: Some("https://astar.blockscout.com/"),
        verify_api_url: Some("https://astar.blockscout.com/api"),
        verify_api_key: Some("blockscout_api_key"),
    },
    Builtin {
        name: "sepolia",
        rpc_url: Rpc::Secret("sepolia_rpc"),
        chain_id: 11155111,
        gas_price_wei: 140_000_000_000,
        gas_limit: Some(2_000_000),
        signer: "private_key_testnet",
        explorer_url: Some("https://sepolia.etherscan.io/"),
        verify_api_url: Some(ETHERSCAN_V2_API),
        verify_api_key: Some("etherscan_api_key"),
    },
    Builtin {
        name: "mainnet",
        rpc_url: Rpc::Url("https://ethereum.publicnode.com"),
        chain_id: 1,
        gas_price_wei: 42_000_000_000,
        gas_limit: Some(2_400_000),
        signer: "private_key_mainnet",
        explorer_url: Some("https://etherscan.com/"),
        verify_api_url: Some(ETHERSCAN_V2_API),
        verify_api_key: Some("etherscan_api_key"),
    },
    Builtin {
        name: "base",
        rpc_url: Rpc::Url("https://mainnet.base.org"),
        chain_id: 8453,
        gas_price_wei: 1_000_000_000,
        gas_limit: Some(2_000_000),
        signer: "private_key_mainnet",
        explorer_url: Some("https://basescan.org"),
        verify_api_url: Some(ETHERSCAN_V2_API),
        verify_api_key: Some("etherscan_api_key"),
    },
    Builtin {
        name: "baseSepolia",
        rpc_url: Rpc::Url("https://sepolia.base.org"),
        chain_id: 84532,
        gas_price_wei: 1_000_000_000,
        gas_limit: Some(2_000_000),
        signer: "private_key_testnet",
        explorer_url: Some("https://sepolia.basescan.org"),
        verify_api_url: Some(ETHERSCAN_V2_API),
        verify_api_key: Some("etherscan_api_key"),
    },
];

fn parse_url(raw: &str) -> Option<Url> {
    Url::parse(raw).ok()
}

/// The networks known without any configuration file.
pub fn builtin_networks() -> BTreeMap<String, NetworkConfig> {
    BUILTINS
        .iter()
        .map(|b| {
            let (rpc_url, rpc_url_secret) = match b.rpc_url {
                Rpc::Url(url) => (Some(url.to_string()), None),
                Rpc::Secret(name) => (None, Some(name.to_string())),
            };
            let config = NetworkConfig {
                rpc_url,
                rpc_url_secret,
                chain_id: b.chain_id,
                gas_price_wei: Some(b.gas_price_wei),
                gas_limit: b.gas_limit,
                signer: b.signer.to_string(),
                explorer_url: b.explorer_url.and_then(parse_url),
                verify_api_url: b.verify_api_url.and_then(parse_url),
                verify_api_key_secret: b.verify_api_key.map(String::from),
            };
            (b.name.to_string(), config)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_builtin_names_are_unique() {
        let names: HashSet<_> = BUILTINS.iter().map(|b| b.name).collect();
        assert_eq!(names.len(), BUILTINS.len());
        assert_eq!(builtin_networks().len(), BUILTINS.len());
    }

    #[test]
    fn test_builtin_urls_parse() {
        for (name, network) in builtin_networks() {
            assert!(
                network.rpc_url.is_some() || network.rpc_url_secret.is_some(),
                "{name} has no RPC source"
            );
            if let Some(url) = &network.rpc_url {
                assert!(Url::parse(url).is_ok(), "{name} has a bad RPC URL");
            }
        }
    }

    #[test]
    fn test_builtin_values() {
        let networks = builtin_networks();
        assert!(networks.contains_key(DEFAULT_NETWORK));

        let sepolia = &networks["sepolia"];
        assert_eq!(sepolia.chain_id, 11155111);
        assert_eq!(sepolia.rpc_url_secret.as_deref(), Some("sepolia_rpc"));
        assert_eq!(sepolia.signer, "private_key_testnet");

        let base = &networks["base"];
        assert_eq!(base.chain_id, 8453);
        assert_eq!(base.gas_price_wei, Some(1_000_000_000));
    }

    #[test]
    fn test_etherscan_family_uses_multichain_api() {
        let networks = builtin_networks();
        for name in ["mainnet", "sepolia", "base", "baseSepolia", "moonbeam", "moonbeamTestnet"] {
            let network = &networks[name];
            assert_eq!(
                network.verify_api_url.as_ref().map(Url::as_str),
                Some(ETHERSCAN_V2_API),
                "{name}"
            );
            assert_eq!(network.verify_api_key_secret.as_deref(), Some("etherscan_api_key"));
        }
        assert_eq!(
            networks["astar"].verify_api_url.as_ref().map(Url::as_str),
            Some("https://astar.blockscout.com/api")
        );
    }
}
