//! Compose-flow construction for withdrawals and weighted rebalances

use super::{ComposeFlow, FlowKind};
use crate::error::{EngineError, EngineResult};
use crate::protocol::QuoteMode;

use ethers::types::{Address, U256};
use serde_json::json;
use tracing::debug;

/// Allowed distance of the weight sum from 1.0
pub const WEIGHT_TOLERANCE: f64 = 0.001;

const ERC20_TRANSFER: &str = "function transfer(address to, uint256 amount)";

/// What a withdrawal moves
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WithdrawAsset {
    /// The protocol cannot resolve a runtime balance for the native
    /// sentinel, so the amount observed at scan time is sent
    Native { amount: U256 },
    /// Sweeps whatever the account holds when the instruction executes
    Erc20 { token: Address },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RebalanceInput {
    pub chain_id: u64,
    pub token_address: Address,
    pub amount: U256,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RebalanceTarget {
    pub chain_id: u64,
    pub token_address: Address,
    pub weight: f64,
}

#[derive(Debug, Clone)]
pub struct IntentComposer {
    slippage: f64,
}

impl IntentComposer {
    pub fn new(slippage: f64) -> Self {
        Self { slippage }
    }

    pub fn build_withdrawal(
        &self,
        asset: WithdrawAsset,
        chain_id: u64,
        recipient: Address,
    ) -> EngineResult<ComposeFlow> {
        if recipient.is_zero() {
            return Err(EngineError::MissingParameters(
                "withdrawal recipient must not be the zero address".to_string(),
            ));
        }

        let flow = match asset {
            WithdrawAsset::Native { amount } => {
                if amount.is_zero() {
                    return Err(EngineError::MissingParameters(format!(
                        "native withdrawal on chain {} needs a non-zero amount",
                        chain_id
                    )));
                }
                ComposeFlow {
                    kind: FlowKind::WithdrawNative,
                    parameters: json!({
                        "chainId": chain_id,
                        "to": recipient,
                        "value": amount.to_string(),
                        "data": "0x",
                    }),
                    batched: true,
                }
            }
            WithdrawAsset::Erc20 { token } => ComposeFlow {
                kind: FlowKind::WithdrawErc20,
                parameters: json!({
                    "chainId": chain_id,
                    "to": token,
                    "functionSignature": ERC20_TRANSFER,
                    "args": [
                        recipient,
                        {
                            "type": "runtimeErc20Balance",
                            "tokenAddress": token,
                            "constraints": { "gte": "1" },
                        },
                    ],
                }),
                batched: true,
            },
        };

        Ok(flow)
    }

    /// Validate inputs and targets and build the rebalance instruction.
    ///
    /// One input into one full-weight target is a simple intent; anything
    /// else is a multi-position intent.
    pub fn build_rebalance(
        &self,
        inputs: &[RebalanceInput],
        targets: &[RebalanceTarget],
    ) -> EngineResult<ComposeFlow> {
        validate_inputs(inputs)?;
        validate_weights(targets)?;

        if let ([input], [target]) = (inputs, targets) {
            return Ok(ComposeFlow {
                kind: FlowKind::RebalanceSimple,
                parameters: json!({
                    "srcChainId": input.chain_id,
                    "dstChainId": target.chain_id,
                    "srcToken": input.token_address,
                    "dstToken": target.token_address,
                    "amount": input.amount.to_string(),
                    "slippage": self.slippage,
                }),
                batched: false,
            });
        }

        let input_positions: Vec<_> = inputs
            .iter()
            .map(|i| {
                json!({
                    "chainToken": { "chainId": i.chain_id, "tokenAddress": i.token_address },
                    "amount": i.amount.to_string(),
                })
            })
            .collect();
        let target_positions: Vec<_> = targets
            .iter()
            .map(|t| {
                json!({
                    "chainToken": { "chainId": t.chain_id, "tokenAddress": t.token_address },
                    "weight": t.weight,
                })
            })
            .collect();

        Ok(ComposeFlow {
            kind: FlowKind::RebalanceMulti,
            parameters: json!({
                "slippage": self.slippage,
                "inputPositions": input_positions,
                "targetPositions": target_positions,
            }),
            batched: false,
        })
    }

    /// Rebalance flow followed, in EOA mode, by one withdrawal per target
    /// token so nothing stays behind in the intermediate account
    pub fn compose_rebalance(
        &self,
        mode: QuoteMode,
        inputs: &[RebalanceInput],
        targets: &[RebalanceTarget],
        recipient: Address,
    ) -> EngineResult<Vec<ComposeFlow>> {
        let mut flows = vec![self.build_rebalance(inputs, targets)?];

        if mode == QuoteMode::Eoa {
            let mut withdrawn: Vec<(u64, Address)> = Vec::new();
            for target in targets {
                let key = (target.chain_id, target.token_address);
                if withdrawn.contains(&key) {
                    continue;
                }
                if target.token_address.is_zero() {
                    return Err(EngineError::MissingParameters(format!(
                        "native target on chain {} has no fixed amount to withdraw; target the wrapped token instead",
                        target.chain_id
                    )));
                }
                flows.push(self.build_withdrawal(
                    WithdrawAsset::Erc20 {
                        token: target.token_address,
                    },
                    target.chain_id,
                    recipient,
                )?);
                withdrawn.push(key);
            }

            check_withdrawal_coverage(&flows, targets)?;
        }

        debug!("Composed {} flows for {:?} rebalance", flows.len(), mode);
        Ok(flows)
    }
}

impl Default for IntentComposer {
    fn default() -> Self {
        Self::new(0.01)
    }
}

/// Every target `(chain, token)` must be swept by a withdrawal flow
fn check_withdrawal_coverage(flows: &[ComposeFlow], targets: &[RebalanceTarget]) -> EngineResult<()> {
    for target in targets {
        let chain_id = json!(target.chain_id);
        let token = json!(target.token_address);
        let covered = flows.iter().any(|flow| {
            flow.kind == FlowKind::WithdrawErc20
                && flow.parameters["chainId"] == chain_id
                && flow.parameters["to"] == token
        });
        if !covered {
            return Err(EngineError::MissingParameters(format!(
                "target {:?} on chain {} has no matching withdrawal",
                target.token_address, target.chain_id
            )));
        }
    }
    Ok(())
}

fn validate_inputs(inputs: &[RebalanceInput]) -> EngineResult<()> {
    if inputs.is_empty() {
        return Err(EngineError::MissingParameters(
            "rebalance needs at least one input position".to_string(),
        ));
    }
    if let Some(zero) = inputs.iter().find(|i| i.amount.is_zero()) {
        return Err(EngineError::MissingParameters(format!(
            "input {:?} on chain {} has a zero amount",
            zero.token_address, zero.chain_id
        )));
    }
    Ok(())
}

/// Weights must be positive and sum to 1.0 within [`WEIGHT_TOLERANCE`]
pub fn validate_weights(targets: &[RebalanceTarget]) -> EngineResult<()> {
    if targets.is_empty() {
        return Err(EngineError::MissingParameters(
            "rebalance needs at least one target position".to_string(),
        ));
    }

    if let Some(bad) = targets
        .iter()
        .find(|t| !t.weight.is_finite() || t.weight <= 0.0 || t.weight > 1.0)
    {
        return Err(EngineError::MissingParameters(format!(
            "target weight {} on chain {} must be in (0, 1]",
            bad.weight, bad.chain_id
        )));
    }

    let sum: f64 = targets.iter().map(|t| t.weight).sum();
    if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(EngineError::InvalidWeights { sum });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    fn input(chain_id: u64, amount: u64) -> RebalanceInput {
        RebalanceInput {
            chain_id,
            token_address: addr(0xaa),
            amount: U256::from(amount),
        }
    }

    fn target(chain_id: u64, token: u8, weight: f64) -> RebalanceTarget {
        RebalanceTarget {
            chain_id,
            token_address: addr(token),
            weight,
        }
    }

    #[test]
    fn weights_summing_to_point_seven_are_rejected() {
        let err = IntentComposer::default()
            .build_rebalance(
                &[input(8453, 1_000)],
                &[target(8453, 0xbb, 0.4), target(10, 0xcc, 0.3)],
            )
            .unwrap_err();
        match err {
            EngineError::InvalidWeights { sum } => assert!((sum - 0.7).abs() < 1e-9),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn weights_within_tolerance_are_accepted() {
        assert!(validate_weights(&[target(1, 1, 0.3333), target(1, 2, 0.3333), target(1, 3, 0.3334)]).is_ok());
        assert!(validate_weights(&[target(1, 1, 0.5), target(1, 2, 0.5009)]).is_ok());
        assert!(validate_weights(&[target(1, 1, 0.5), target(1, 2, 0.502)]).is_err());
    }

    #[test]
    fn rejects_non_positive_or_missing_weights() {
        assert!(matches!(
            validate_weights(&[]),
            Err(EngineError::MissingParameters(_))
        ));
        assert!(matches!(
            validate_weights(&[target(1, 1, 1.2), target(1, 2, -0.2)]),
            Err(EngineError::MissingParameters(_))
        ));
        assert!(matches!(
            validate_weights(&[target(1, 1, f64::NAN)]),
            Err(EngineError::MissingParameters(_))
        ));
    }

    #[test]
    fn rejects_empty_or_zero_inputs() {
        let composer = IntentComposer::default();
        assert!(composer
            .build_rebalance(&[], &[target(1, 1, 1.0)])
            .is_err());
        assert!(composer
            .build_rebalance(&[input(1, 0)], &[target(1, 1, 1.0)])
            .is_err());
    }

    #[test]
    fn single_leg_is_a_simple_intent() {
        let flow = IntentComposer::new(0.005)
            .build_rebalance(&[input(8453, 1_000)], &[target(10, 0xbb, 1.0)])
            .unwrap();
        assert_eq!(flow.kind, FlowKind::RebalanceSimple);
        assert_eq!(flow.parameters["srcChainId"], 8453);
        assert_eq!(flow.parameters["dstChainId"], 10);
        assert_eq!(flow.parameters["amount"], "1000");
        assert_eq!(flow.parameters["slippage"], 0.005);
    }

    #[test]
    fn eoa_rebalance_withdraws_every_target() {
        let targets = [target(8453, 0xbb, 0.6), target(10, 0xcc, 0.4)];
        let flows = IntentComposer::default()
            .compose_rebalance(QuoteMode::Eoa, &[input(8453, 1_000)], &targets, addr(0x11))
            .unwrap();

        assert_eq!(flows.len(), 3);
        assert_eq!(flows[0].kind, FlowKind::RebalanceMulti);
        assert!(flows[1..].iter().all(|f| f.kind == FlowKind::WithdrawErc20));
        assert_eq!(flows[1].parameters["chainId"], 8453);
        assert_eq!(flows[1].parameters["to"], serde_json::to_value(addr(0xbb)).unwrap());
        assert_eq!(flows[2].parameters["chainId"], 10);
        assert_eq!(flows[2].parameters["to"], serde_json::to_value(addr(0xcc)).unwrap());
    }

    #[test]
    fn smart_account_rebalance_keeps_funds_in_place() {
        let flows = IntentComposer::default()
            .compose_rebalance(
                QuoteMode::SmartAccount,
                &[input(8453, 1_000)],
                &[target(8453, 0xbb, 0.6), target(10, 0xcc, 0.4)],
                addr(0x11),
            )
            .unwrap();
        assert_eq!(flows.len(), 1);
    }

    #[test]
    fn duplicate_targets_share_one_withdrawal() {
        let flows = IntentComposer::default()
            .compose_rebalance(
                QuoteMode::Eoa,
                &[input(8453, 1_000)],
                &[target(10, 0xcc, 0.5), target(10, 0xcc, 0.5)],
                addr(0x11),
            )
            .unwrap();
        assert_eq!(flows.iter().filter(|f| f.kind.is_withdrawal()).count(), 1);
    }

    #[test]
    fn coverage_check_spots_a_target_without_withdrawal() {
        let composer = IntentComposer::default();
        let targets = [target(8453, 0xbb, 0.6), target(10, 0xcc, 0.4)];
        let mut flows = vec![
            composer.build_rebalance(&[input(8453, 1_000)], &targets).unwrap(),
            composer
                .build_withdrawal(WithdrawAsset::Erc20 { token: addr(0xbb) }, 8453, addr(0x11))
                .unwrap(),
            // right token, wrong chain
            composer
                .build_withdrawal(WithdrawAsset::Erc20 { token: addr(0xcc) }, 8453, addr(0x11))
                .unwrap(),
        ];
        let err = check_withdrawal_coverage(&flows, &targets).unwrap_err();
        assert!(err.to_string().contains("chain 10"));

        flows.push(
            composer
                .build_withdrawal(WithdrawAsset::Erc20 { token: addr(0xcc) }, 10, addr(0x11))
                .unwrap(),
        );
        assert!(check_withdrawal_coverage(&flows, &targets).is_ok());
    }

    #[test]
    fn native_target_cannot_be_withdrawn_in_eoa_mode() {
        let native = RebalanceTarget {
            chain_id: 10,
            token_address: Address::zero(),
            weight: 1.0,
        };
        let err = IntentComposer::default()
            .compose_rebalance(QuoteMode::Eoa, &[input(8453, 1)], &[native], addr(0x11))
            .unwrap_err();
        assert!(matches!(err, EngineError::MissingParameters(_)));
    }

    #[test]
    fn native_withdrawal_uses_fixed_amount() {
        let composer = IntentComposer::default();
        let flow = composer
            .build_withdrawal(
                WithdrawAsset::Native {
                    amount: U256::exp10(15),
                },
                8453,
                addr(0x11),
            )
            .unwrap();
        assert_eq!(flow.kind, FlowKind::WithdrawNative);
        assert_eq!(flow.parameters["value"], "1000000000000000");
        assert!(flow.parameters.get("args").is_none());

        assert!(composer
            .build_withdrawal(WithdrawAsset::Native { amount: U256::zero() }, 8453, addr(0x11))
            .is_err());
    }

    #[test]
    fn erc20_withdrawal_uses_runtime_balance() {
        let flow = IntentComposer::default()
            .build_withdrawal(WithdrawAsset::Erc20 { token: addr(0xbb) }, 10, addr(0x11))
            .unwrap();
        assert_eq!(flow.parameters["args"][1]["type"], "runtimeErc20Balance");
        assert_eq!(flow.parameters["functionSignature"], ERC20_TRANSFER);
        assert!(flow.batched);
    }

    #[test]
    fn zero_recipient_is_rejected() {
        let err = IntentComposer::default()
            .build_withdrawal(WithdrawAsset::Erc20 { token: addr(0xbb) }, 10, Address::zero())
            .unwrap_err();
        assert!(matches!(err, EngineError::MissingParameters(_)));
    }
}
