//! Command line surface and validated runtime configuration.

use std::net::{SocketAddr, ToSocketAddrs};

use clap::Parser;
use thiserror::Error;

use miner_core::{validate_address, AddressError, ValidatedAddress};

/// Project fee address. Overridable for forks running their own fee
/// collection.
pub const DEFAULT_FEE_ADDRESS: &str =
    "kaspa:qqggvdrxjqdgwql4aac8hg0pq2v4z5p46l86f98hq7ax29k7x55v7sycs9kvm";

/// Default recipient of the secondary allocation.
pub const DEFAULT_SECONDARY_ADDRESS: &str =
    "kaspa:qq2efzv0y3vm97wp2dkeu2vhzjhhjdaz9gzqyqm0402dxj98kgsgs2xf9k3mr";

/// CPU-optimized solo miner.
#[derive(Debug, Parser)]
#[command(name = "solo-miner", version, about)]
pub struct Cli {
    /// Wallet address that receives the net mining rewards.
    pub address: String,

    /// Node endpoint as host:port, or "auto" to probe the local
    /// candidate ports.
    #[arg(long, default_value = "auto")]
    pub node: String,

    /// Worker thread count; 0 uses every logical core.
    #[arg(long, default_value_t = 0)]
    pub cpu_cores: usize,

    /// Fee recipient address.
    #[arg(long, default_value = DEFAULT_FEE_ADDRESS)]
    pub fee_address: String,

    /// Secondary allocation recipient address.
    #[arg(long, default_value = DEFAULT_SECONDARY_ADDRESS)]
    pub secondary_address: String,

    /// Fee in whole percent of each gross reward.
    #[arg(long, default_value_t = 10)]
    pub fee_percent: u8,

    /// Secondary allocation target in USD.
    #[arg(long, default_value_t = 50_000.0)]
    pub allocation_target_usd: f64,

    /// Coin price in USD, if known. Omit to leave the allocation
    /// target unbounded until a price is supplied.
    #[arg(long)]
    pub price: Option<f64>,

    /// Percentage of system RAM reserved for the experimental hash
    /// cache. Accepted but currently inert.
    #[arg(long, default_value_t = 0)]
    pub ram_percent: u8,
}

const RAM_PERCENT_CHOICES: [u8; 5] = [0, 25, 50, 75, 80];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field} address: {source}")]
    Address {
        field: &'static str,
        source: AddressError,
    },
    #[error("cannot resolve node endpoint '{0}'")]
    Endpoint(String),
    #[error("fee percent {0} exceeds 100")]
    FeePercent(u8),
    #[error("allocation target {0} must be finite and non-negative")]
    Target(f64),
    #[error("price {0} must be finite and positive")]
    Price(f64),
    #[error("ram percent {0} must be one of 0, 25, 50, 75 or 80")]
    RamPercent(u8),
}

/// Fully validated runtime configuration.
#[derive(Debug, Clone)]
pub struct MinerConfig {
    pub user_address: ValidatedAddress,
    pub fee_address: ValidatedAddress,
    pub secondary_address: ValidatedAddress,
    /// `None` means auto-discovery over the candidate ports.
    pub endpoint: Option<SocketAddr>,
    pub cpu_cores: usize,
    pub fee_percent: u8,
    pub allocation_target_usd: f64,
    pub price: Option<f64>,
    pub ram_percent: u8,
}

impl MinerConfig {
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let user_address = validate_address(&cli.address).map_err(|source| {
            ConfigError::Address {
                field: "wallet",
                source,
            }
        })?;
        let fee_address =
            validate_address(&cli.fee_address).map_err(|source| ConfigError::Address {
                field: "fee",
                source,
            })?;
        let secondary_address =
            validate_address(&cli.secondary_address).map_err(|source| ConfigError::Address {
                field: "secondary",
                source,
            })?;

        let endpoint = if cli.node == "auto" {
            None
        } else {
            let resolved = cli
                .node
                .to_socket_addrs()
                .map_err(|_| ConfigError::Endpoint(cli.node.clone()))?
                .next()
                .ok_or_else(|| ConfigError::Endpoint(cli.node.clone()))?;
            Some(resolved)
        };

        if cli.fee_percent > 100 {
            return Err(ConfigError::FeePercent(cli.fee_percent));
        }
        if !cli.allocation_target_usd.is_finite() || cli.allocation_target_usd < 0.0 {
            return Err(ConfigError::Target(cli.allocation_target_usd));
        }
        if let Some(price) = cli.price {
            if !price.is_finite() || price <= 0.0 {
                return Err(ConfigError::Price(price));
            }
        }
        if !RAM_PERCENT_CHOICES.contains(&cli.ram_percent) {
            return Err(ConfigError::RamPercent(cli.ram_percent));
        }

        Ok(MinerConfig {
            user_address,
            fee_address,
            secondary_address,
            endpoint,
            cpu_cores: cli.cpu_cores,
            fee_percent: cli.fee_percent,
            allocation_target_usd: cli.allocation_target_usd,
            price: cli.price,
            ram_percent: cli.ram_percent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USER: &str = "kaspa:qzrhasap30pzrth070tx6m0nslk03xl0qgmpguex68nmd68g277fuqfsqg0ls";

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("solo-miner").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults() {
        let config = MinerConfig::from_cli(cli(&[USER])).unwrap();
        assert_eq!(config.user_address.display, USER);
        assert_eq!(config.fee_address.display, DEFAULT_FEE_ADDRESS);
        assert_eq!(config.secondary_address.display, DEFAULT_SECONDARY_ADDRESS);
        assert_eq!(config.endpoint, None);
        assert_eq!(config.cpu_cores, 0);
        assert_eq!(config.fee_percent, 10);
        assert_eq!(config.allocation_target_usd, 50_000.0);
        assert_eq!(config.price, None);
        assert_eq!(config.ram_percent, 0);
    }

    #[test]
    fn test_explicit_endpoint_resolves() {
        let config =
            MinerConfig::from_cli(cli(&[USER, "--node", "127.0.0.1:16110"])).unwrap();
        assert_eq!(
            config.endpoint,
            Some(SocketAddr::from(([127, 0, 0, 1], 16110)))
        );
    }

    #[test]
    fn test_unresolvable_endpoint_is_rejected() {
        let err = MinerConfig::from_cli(cli(&[USER, "--node", "not an endpoint"])).unwrap_err();
        assert!(matches!(err, ConfigError::Endpoint(_)));
    }

    #[test]
    fn test_bad_wallet_address_is_rejected() {
        let err = MinerConfig::from_cli(cli(&["kaspa:tooshort"])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Address {
                field: "wallet",
                ..
            }
        ));
    }

    #[test]
    fn test_fee_percent_bounds() {
        let err = MinerConfig::from_cli(cli(&[USER, "--fee-percent", "101"])).unwrap_err();
        assert!(matches!(err, ConfigError::FeePercent(101)));

        // 100 is extreme but allowed
        let config = MinerConfig::from_cli(cli(&[USER, "--fee-percent", "100"])).unwrap();
        assert_eq!(config.fee_percent, 100);
    }

    #[test]
    fn test_price_must_be_positive() {
        let err = MinerConfig::from_cli(cli(&[USER, "--price", "0"])).unwrap_err();
        assert!(matches!(err, ConfigError::Price(_)));

        let config = MinerConfig::from_cli(cli(&[USER, "--price", "0.12"])).unwrap();
        assert_eq!(config.price, Some(0.12));
    }

    #[test]
    fn test_ram_percent_choices() {
        for ok in [0u8, 25, 50, 75, 80] {
            let config =
                MinerConfig::from_cli(cli(&[USER, "--ram-percent", &ok.to_string()])).unwrap();
            assert_eq!(config.ram_percent, ok);
        }
        let err = MinerConfig::from_cli(cli(&[USER, "--ram-percent", "60"])).unwrap_err();
        assert!(matches!(err, ConfigError::RamPercent(60)));
    }

    #[test]
    fn test_negative_target_is_rejected() {
        let err =
            MinerConfig::from_cli(cli(&[USER, "--allocation-target-usd=-1"])).unwrap_err();
        assert!(matches!(err, ConfigError::Target(_)));
    }
}
