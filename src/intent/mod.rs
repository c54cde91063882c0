//! Declarative instructions submitted inside a quote request

pub mod compose;

pub use compose::{IntentComposer, RebalanceInput, RebalanceTarget, WithdrawAsset};

use serde::ser::{Serialize, Serializer};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    WithdrawNative,
    WithdrawErc20,
    RebalanceSimple,
    RebalanceMulti,
}

impl FlowKind {
    /// Instruction path understood by the protocol
    pub fn instruction(&self) -> &'static str {
        match self {
            FlowKind::WithdrawNative | FlowKind::WithdrawErc20 => "/instructions/build",
            FlowKind::RebalanceSimple => "/instructions/intent-simple",
            FlowKind::RebalanceMulti => "/instructions/intent",
        }
    }

    pub fn is_withdrawal(&self) -> bool {
        matches!(self, FlowKind::WithdrawNative | FlowKind::WithdrawErc20)
    }
}

/// One instruction of a supertransaction
#[derive(Debug, Clone, PartialEq)]
pub struct ComposeFlow {
    pub kind: FlowKind,
    pub parameters: Value,
    pub batched: bool,
}

impl Serialize for ComposeFlow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(serde::Serialize)]
        struct Wire<'a> {
            #[serde(rename = "type")]
            kind: &'static str,
            data: &'a Value,
            batch: bool,
        }

        Wire {
            kind: self.kind.instruction(),
            data: &self.parameters,
            batch: self.batched,
        }
        .serialize(serializer)
    }
}
