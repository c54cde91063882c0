//! Known token tables per chain
//!
//! Tables are listed in scan priority order: stablecoins, wrapped native,
//! then everything else.

use ethers::types::Address;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRole {
    Stablecoin,
    WrappedNative,
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenInfo {
    pub symbol: &'static str,
    pub address: &'static str,
    pub decimals: u8,
    pub role: TokenRole,
    /// Accepted by the protocol as a fee/funding token
    pub fee_capable: bool,
}

impl TokenInfo {
    pub fn address(&self) -> Address {
        self.address.parse().unwrap_or_default()
    }

    pub fn is_priority(&self) -> bool {
        matches!(self.role, TokenRole::Stablecoin | TokenRole::WrappedNative)
    }
}

const fn token(
    symbol: &'static str,
    address: &'static str,
    decimals: u8,
    role: TokenRole,
    fee_capable: bool,
) -> TokenInfo {
    TokenInfo {
        symbol,
        address,
        decimals,
        role,
        fee_capable,
    }
}

use TokenRole::{Other, Stablecoin, WrappedNative};

const ETHEREUM: &[TokenInfo] = &[
    token("USDC", "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48", 6, Stablecoin, true),
    token("USDT", "0xdAC17F958D2ee523a2206206994597C13D831ec7", 6, Stablecoin, true),
    token("DAI", "0x6B175474E89094C44Da98b954EedeAC495271d0F", 18, Stablecoin, true),
    token("WETH", "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2", 18, WrappedNative, true),
    token("WBTC", "0x2260FAC5E5542a773Aa44fBCfeDf7C193bc2C599", 8, Other, false),
    token("LINK", "0x514910771AF9Ca656af840dff83E8264EcF986CA", 18, Other, false),
];

const OPTIMISM: &[TokenInfo] = &[
    token("USDC", "0x0b2C639c533813f4Aa9D7837CAf62653d097Ff85", 6, Stablecoin, true),
    token("USDT", "0x94b008aA00579c1307B0EF2c499aD98a8ce58e58", 6, Stablecoin, true),
    token("DAI", "0xDA10009cBd5D07dd0CeCc66161FC93D7c9000da1", 18, Stablecoin, false),
    token("WETH", "0x4200000000000000000000000000000000000006", 18, WrappedNative, true),
    token("OP", "0x4200000000000000000000000000000000000042", 18, Other, false),
];

const BSC: &[TokenInfo] = &[
    token("USDC", "0x8AC76a51cc950d9822D68b83fE1Ad97B32Cd580d", 18, Stablecoin, true),
    token("USDT", "0x55d398326f99059fF775485246999027B3197955", 18, Stablecoin, true),
    token("WBNB", "0xbb4CdB9CBd36B01bD1cBaEBF2De08d9173bc095c", 18, WrappedNative, false),
];

const POLYGON: &[TokenInfo] = &[
    token("USDC", "0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359", 6, Stablecoin, true),
    token("USDT", "0xc2132D05D31c914a87C6611C10748AEb04B58e8F", 6, Stablecoin, true),
    token("DAI", "0x8f3Cf7ad23Cd3CaDbD9735AFf958023239c6A063", 18, Stablecoin, false),
    token("WPOL", "0x0d500B1d8E8eF31E21C99d1Db9A6444d3ADf1270", 18, WrappedNative, false),
    token("WETH", "0x7ceB23fD6bC0adD59E62ac25578270cFf1b9f619", 18, Other, true),
];

const BASE: &[TokenInfo] = &[
    token("USDC", "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913", 6, Stablecoin, true),
    token("USDbC", "0xd9aAEc86B65D86f6A7B5B1b0c42FFA531710b6CA", 6, Stablecoin, false),
    token("DAI", "0x50c5725949A6F0c72E6C4a641F24049A917DB0Cb", 18, Stablecoin, false),
    token("WETH", "0x4200000000000000000000000000000000000006", 18, WrappedNative, true),
    token("cbETH", "0x2Ae3F1Ec7F1F5012CFEab0185bfc7aa3cf0DEc22", 18, Other, false),
];

const ARBITRUM: &[TokenInfo] = &[
    token("USDC", "0xaf88d065e77c8cC2239327C5EDb3A432268e5831", 6, Stablecoin, true),
    token("USDT", "0xFd086bC7CD5C481DCC9C85ebE478A1C0b69FCbb9", 6, Stablecoin, true),
    token("DAI", "0xDA10009cBd5D07dd0CeCc66161FC93D7c9000da1", 18, Stablecoin, false),
    token("WETH", "0x82aF49447D8a07e3bd95BD0d56f35241523fBab1", 18, WrappedNative, true),
    token("ARB", "0x912CE59144191C1204E64559FE8253a0e49E6548", 18, Other, false),
];

const AVALANCHE: &[TokenInfo] = &[
    token("USDC", "0xB97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E", 6, Stablecoin, true),
    token("USDT", "0x9702230A8Ea53601f5cD2dc00fDBc13d4dF4A8c7", 6, Stablecoin, true),
    token("WAVAX", "0xB31f66AA3C1e785363F0875A1B74E27b85FD66c7", 18, WrappedNative, false),
];

pub(super) fn for_chain(chain_id: u64) -> &'static [TokenInfo] {
    match chain_id {
        1 => ETHEREUM,
        10 => OPTIMISM,
        56 => BSC,
        137 => POLYGON,
        8453 => BASE,
        42161 => ARBITRUM,
        43114 => AVALANCHE,
        _ => &[],
    }
}

/// Fee-capable tokens for a chain, stablecoins first
pub fn fee_tokens(chain_id: u64) -> Vec<&'static TokenInfo> {
    let mut tokens: Vec<_> = for_chain(chain_id).iter().filter(|t| t.fee_capable).collect();
    tokens.sort_by_key(|t| t.role != TokenRole::Stablecoin);
    tokens
}
